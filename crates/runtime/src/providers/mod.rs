//! LLM provider backends.

mod openai;

pub use openai::{DEFAULT_MODEL, DEFAULT_TEMPERATURE, OpenAiBackend, OpenAiBackendBuilder};

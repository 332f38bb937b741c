//! Configuration loading from bridgechat.toml and the environment.

use serde::Deserialize;
use std::path::Path;

/// File read from the working directory when `--config` is not given.
pub const CONFIG_FILE: &str = "bridgechat.toml";

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8000/sse";

pub const ENDPOINT_VAR: &str = "MCP_SERVER_URL";
pub const API_KEY_VAR: &str = "OPENROUTER_API_KEY";
pub const BASE_URL_VAR: &str = "OPENROUTER_BASE_URL";
pub const MODEL_VAR: &str = "BRIDGECHAT_MODEL";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    /// SSE endpoint of the MCP server.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Language model provider configuration.
    #[serde(default)]
    pub backend: BackendConfig,
}

/// OpenAI-compatible provider configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BackendConfig {
    pub api_key: Option<String>,

    /// Base URL of the chat-completions API, e.g. `https://openrouter.ai/api/v1`.
    pub base_url: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: default_model(),
            temperature: default_temperature(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            backend: BackendConfig::default(),
        }
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_model() -> String {
    runtime::DEFAULT_MODEL.to_string()
}

fn default_temperature() -> f32 {
    runtime::DEFAULT_TEMPERATURE
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load `path` if given, else `bridgechat.toml` if present, else defaults.
    pub fn discover(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(CONFIG_FILE).exists() => Self::load(CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    /// Overlay values from environment variables; set variables win.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        if let Some(endpoint) = var(ENDPOINT_VAR) {
            self.endpoint = endpoint;
        }
        if let Some(api_key) = var(API_KEY_VAR) {
            self.backend.api_key = Some(api_key);
        }
        if let Some(base_url) = var(BASE_URL_VAR) {
            self.backend.base_url = Some(base_url);
        }
        if let Some(model) = var(MODEL_VAR) {
            self.backend.model = model;
        }
    }

    /// Build the model backend.
    ///
    /// Requires both an API key and a base URL.
    pub fn backend(&self) -> Result<runtime::OpenAiBackend, ConfigError> {
        let api_key = self
            .backend
            .api_key
            .as_deref()
            .ok_or(ConfigError::MissingApiKey)?;
        let base_url = self
            .backend
            .base_url
            .as_deref()
            .ok_or(ConfigError::MissingBaseUrl)?;

        Ok(runtime::OpenAiBackend::builder(api_key, base_url)
            .model(&self.backend.model)
            .temperature(self.backend.temperature)
            .build())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("API key not configured: set OPENROUTER_API_KEY or backend.api_key")]
    MissingApiKey,

    #[error("API base URL not configured: set OPENROUTER_BASE_URL or backend.base_url")]
    MissingBaseUrl,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_when_empty() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.endpoint, "http://localhost:8000/sse");
        assert_eq!(config.backend.model, "openai/gpt-4o-mini");
        assert_eq!(config.backend.temperature, 0.7);
    }

    #[test]
    fn parses_file_values() {
        let config = Config::parse(
            r#"
            endpoint = "http://tools.internal:9000/sse"

            [backend]
            api_key = "sk-or-test"
            base_url = "https://openrouter.ai/api/v1"
            model = "anthropic/claude-3.5-haiku"
            temperature = 0.2
            "#,
        )
        .unwrap();

        assert_eq!(config.endpoint, "http://tools.internal:9000/sse");
        assert_eq!(config.backend.api_key.as_deref(), Some("sk-or-test"));
        assert_eq!(config.backend.model, "anthropic/claude-3.5-haiku");
        assert_eq!(config.backend.temperature, 0.2);
    }

    #[test]
    fn environment_overrides_file() {
        let mut config = Config::parse("[backend]\nmodel = \"from-file\"").unwrap();
        config.apply_env(env(&[
            ("MCP_SERVER_URL", "http://env:8000/sse"),
            ("OPENROUTER_API_KEY", "sk-env"),
            ("BRIDGECHAT_MODEL", ""),
        ]));

        assert_eq!(config.endpoint, "http://env:8000/sse");
        assert_eq!(config.backend.api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.backend.model, "from-file");
    }

    #[test]
    fn backend_requires_key_and_base_url() {
        let mut config = Config::default();
        assert!(matches!(config.backend(), Err(ConfigError::MissingApiKey)));

        config.apply_env(env(&[("OPENROUTER_API_KEY", "sk-env")]));
        let err = config.backend().unwrap_err();
        assert!(matches!(err, ConfigError::MissingBaseUrl));
        assert!(err.to_string().contains("OPENROUTER_BASE_URL"));

        config.apply_env(env(&[("OPENROUTER_BASE_URL", "https://openrouter.ai/api/v1")]));
        let backend = config.backend().unwrap();
        assert_eq!(backend.model(), "openai/gpt-4o-mini");
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        assert!(matches!(Config::parse("endpoint = ["), Err(ConfigError::Parse(_))));
    }
}

//! Tool-using agent loop.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::llm::{Backend, Message, ModelError, ModelRequest, ToolCall, ToolResult, ToolSpec};
use crate::proxy::Catalog;

/// Upper bound on model round-trips for one turn.
pub const MAX_STEPS: usize = 10;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AgentError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("agent did not finish within {0} model steps")]
    StepLimit(usize),
}

/// Build the system instructions that describe the catalog to the model.
pub fn system_prompt(catalog: &Catalog) -> String {
    format!(
        "You are a helpful assistant with access to tools via MCP (Model Context Protocol).\n\n\
         Available tools:\n{}\n\n\
         Use these tools when they help answer the user's request. \
         Call a tool with the arguments its schema asks for, then answer \
         using the results. If a tool returns an error, explain what went \
         wrong instead of guessing.",
        catalog.summary()
    )
}

/// A language model bound to a tool catalog.
#[derive(Debug)]
pub struct Agent<B> {
    backend: B,
    catalog: Catalog,
    system: String,
    specs: Vec<ToolSpec>,
}

impl<B> Agent<B> {
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn system_prompt(&self) -> &str {
        &self.system
    }

    pub fn tool_specs(&self) -> &[ToolSpec] {
        &self.specs
    }
}

impl<B: Backend> Agent<B> {
    pub fn new(backend: B, catalog: Catalog) -> Self {
        let system = system_prompt(&catalog);
        let specs = catalog.specs();
        Self {
            backend,
            catalog,
            system,
            specs,
        }
    }

    /// Answer `message` given the prior conversation.
    ///
    /// Runs model and tool rounds until the model replies without tool calls.
    pub async fn respond(
        &self,
        history: Vec<Message>,
        message: &str,
    ) -> Result<String, AgentError> {
        let mut messages = history;
        messages.push(Message::user(message));

        for step in 1..=MAX_STEPS {
            let request = ModelRequest {
                system: Some(&self.system),
                messages: &messages,
                tools: &self.specs,
            };
            let response = self.backend.call(request).await?;
            debug!(
                step,
                input_tokens = response.usage.input_tokens,
                output_tokens = response.usage.output_tokens,
                "model responded"
            );

            let calls = response.message.tool_calls();
            if calls.is_empty() {
                return Ok(response.message.text());
            }
            messages.push(response.message);

            let mut results = Vec::with_capacity(calls.len());
            for call in &calls {
                results.push(ToolResult {
                    tool_call_id: call.id.clone(),
                    content: self.execute(call).await,
                });
            }
            messages.push(Message::tool_results(results));
        }

        warn!(limit = MAX_STEPS, "agent hit the step limit");
        Err(AgentError::StepLimit(MAX_STEPS))
    }

    async fn execute(&self, call: &ToolCall) -> String {
        let Some(proxy) = self.catalog.get(&call.name) else {
            warn!(tool = %call.name, "model requested an unknown tool");
            return format!("Error: unknown tool: {}", call.name);
        };

        let arguments = match &call.input {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                warn!(tool = %call.name, input = %other, "tool arguments are not an object");
                return format!("Error: arguments for {} must be a JSON object", call.name);
            }
        };

        info!(tool = %call.name, "calling tool");
        proxy.call(arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CALL_TIMEOUT;
    use crate::bridge::Bridge;
    use crate::lifecycle::Lifecycle;
    use crate::llm::{Part, Role};
    use crate::testing::{MockSession, ScriptedBackend, lookup_tool, ready_bridge, test_runtime};
    use serde_json::json;
    use std::sync::Arc;

    fn tool_call(id: &str, name: &str, input: Value) -> Message {
        Message {
            role: Role::Assistant,
            parts: vec![Part::ToolCall(ToolCall {
                id: id.into(),
                name: name.into(),
                input,
            })],
        }
    }

    fn empty_catalog() -> Catalog {
        Catalog::build(vec![], &Bridge::builder(Arc::new(Lifecycle::new())).build())
    }

    #[test]
    fn system_prompt_lists_tools() {
        let prompt = system_prompt(&empty_catalog());
        assert!(prompt.starts_with(
            "You are a helpful assistant with access to tools via MCP (Model Context Protocol)."
        ));
        assert!(prompt.contains("Available tools:\n"));
    }

    #[test]
    fn plain_answer_needs_one_round() {
        let backend = ScriptedBackend::new(vec![Message::assistant("Hello!")]);
        let seen = backend.requests();
        let agent = Agent::new(backend, empty_catalog());

        let history = vec![Message::user("hi"), Message::assistant("hey")];
        let reply = test_runtime("foreground-test").block_on(agent.respond(history, "how are you"));

        assert_eq!(reply.unwrap(), "Hello!");
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].len(), 3);
        assert_eq!(seen[0][2].text(), "how are you");
    }

    #[test]
    fn tool_results_are_fed_back() {
        let session = MockSession::new(vec![lookup_tool()]).with_reply("lookup", "x means ten");
        let (_runtime, bridge, _lifecycle) = ready_bridge(session, CALL_TIMEOUT);
        let catalog = Catalog::build(vec![lookup_tool()], &bridge);

        let backend = ScriptedBackend::new(vec![
            tool_call("c1", "lookup", json!({"term": "x"})),
            Message::assistant("It means ten."),
        ]);
        let seen = backend.requests();
        let agent = Agent::new(backend, catalog);

        let reply = test_runtime("foreground-test").block_on(agent.respond(vec![], "what is x?"));
        assert_eq!(reply.unwrap(), "It means ten.");

        let seen = seen.lock().unwrap();
        let last = seen[1].last().unwrap();
        assert_eq!(
            last.parts,
            vec![Part::ToolResult(ToolResult {
                tool_call_id: "c1".into(),
                content: "x means ten".into(),
            })]
        );
    }

    fn last_result(request: &[Message]) -> String {
        match &request.last().unwrap().parts[0] {
            Part::ToolResult(result) => result.content.clone(),
            other => panic!("expected a tool result, got {other:?}"),
        }
    }

    #[test]
    fn unknown_tool_and_bad_arguments_become_error_text() {
        let session = MockSession::new(vec![lookup_tool()]);
        let calls = session.calls();
        let (_runtime, bridge, _lifecycle) = ready_bridge(session, CALL_TIMEOUT);
        let catalog = Catalog::build(vec![lookup_tool()], &bridge);

        let backend = ScriptedBackend::new(vec![
            tool_call("c1", "missing", json!({})),
            tool_call("c2", "lookup", json!("oops")),
            Message::assistant("done"),
        ]);
        let seen = backend.requests();
        let agent = Agent::new(backend, catalog);

        let reply = test_runtime("foreground-test").block_on(agent.respond(vec![], "go"));
        assert_eq!(reply.unwrap(), "done");

        let seen = seen.lock().unwrap();
        assert_eq!(last_result(&seen[1]), "Error: unknown tool: missing");
        assert_eq!(
            last_result(&seen[2]),
            "Error: arguments for lookup must be a JSON object"
        );
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn endless_tool_calls_hit_step_limit() {
        let replies = (0..MAX_STEPS)
            .map(|i| tool_call(&format!("c{i}"), "missing", Value::Null))
            .collect();
        let agent = Agent::new(ScriptedBackend::new(replies), empty_catalog());

        let err = test_runtime("foreground-test")
            .block_on(agent.respond(vec![], "loop"))
            .unwrap_err();
        assert!(matches!(err, AgentError::StepLimit(MAX_STEPS)));
    }

    #[test]
    fn model_failure_propagates() {
        let agent = Agent::new(ScriptedBackend::new(vec![]), empty_catalog());
        let err = test_runtime("foreground-test")
            .block_on(agent.respond(vec![], "hi"))
            .unwrap_err();
        assert!(matches!(err, AgentError::Model(ModelError::Api(_))));
    }
}

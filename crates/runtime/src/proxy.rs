//! Callable proxies for discovered tools.

use std::collections::HashSet;

use mcp::{CallToolResult, Tool};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::bridge::{Bridge, BridgeError};
use crate::llm::ToolSpec;
use crate::schema::{self, ParameterSpec};

/// Returned when a call succeeds but carries no content at all.
pub const NO_RESULT: &str = "No result returned";

/// Returned when a call succeeds with content but none of it is text.
pub const NO_TEXT_RESULT: &str = "No text result";

/// Immutable description of one discovered tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParameterSpec>,
}

impl ToolDescriptor {
    pub fn from_tool(tool: &Tool) -> Self {
        let description = match tool.description.as_deref() {
            Some(description) if !description.trim().is_empty() => description.to_string(),
            _ => format!("Tool: {}", tool.name),
        };
        Self {
            name: tool.name.clone(),
            description,
            parameters: schema::translate(&tool.input_schema),
        }
    }

    /// First line of the description, trimmed.
    pub fn summary_line(&self) -> &str {
        self.description.lines().next().unwrap_or_default().trim()
    }

    /// Names of required parameters absent from `arguments`.
    pub fn missing_required(&self, arguments: &Map<String, Value>) -> Vec<&str> {
        self.parameters
            .iter()
            .filter(|param| param.required && !arguments.contains_key(&param.name))
            .map(|param| param.name.as_str())
            .collect()
    }
}

/// One tool bound to the invocation bridge.
#[derive(Debug)]
pub struct ToolProxy {
    descriptor: ToolDescriptor,
    bridge: Bridge,
}

impl ToolProxy {
    pub fn new(descriptor: ToolDescriptor, bridge: Bridge) -> Self {
        Self { descriptor, bridge }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn description(&self) -> &str {
        &self.descriptor.description
    }

    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.descriptor.parameters
    }

    pub fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    /// Definition advertised to the language model.
    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.descriptor.name.clone(),
            description: self.descriptor.description.clone(),
            schema: schema::render(&self.descriptor.parameters),
        }
    }

    /// Invoke the tool, awaiting the bridge from an async context.
    ///
    /// Never fails: every failure is folded into the returned text.
    pub async fn call(&self, arguments: Map<String, Value>) -> String {
        if let Some(rejection) = self.reject_missing(&arguments) {
            return rejection;
        }
        let name = self.descriptor.name.clone();
        debug!(tool = %name, "dispatching tool call");
        let outcome = self
            .bridge
            .submit(move |session| async move { session.call_tool(&name, arguments).await })
            .await;
        self.finish(outcome)
    }

    /// Invoke the tool from a thread that is not driving any async runtime.
    pub fn call_blocking(&self, arguments: Map<String, Value>) -> String {
        if let Some(rejection) = self.reject_missing(&arguments) {
            return rejection;
        }
        let name = self.descriptor.name.clone();
        debug!(tool = %name, "dispatching blocking tool call");
        let outcome = self
            .bridge
            .submit_blocking(move |session| async move {
                session.call_tool(&name, arguments).await
            });
        self.finish(outcome)
    }

    fn reject_missing(&self, arguments: &Map<String, Value>) -> Option<String> {
        let missing = self.descriptor.missing_required(arguments);
        if missing.is_empty() {
            return None;
        }
        warn!(tool = %self.descriptor.name, ?missing, "rejecting call with missing arguments");
        Some(format!(
            "Error: missing required argument(s) for {}: {}",
            self.descriptor.name,
            missing.join(", ")
        ))
    }

    fn finish(&self, outcome: Result<mcp::Result<CallToolResult>, BridgeError>) -> String {
        match outcome {
            Ok(Ok(result)) => result_text(&result),
            Ok(Err(e)) => {
                warn!(tool = %self.descriptor.name, error = %e, "tool call failed");
                format!("Error: {e}")
            }
            Err(e) => {
                warn!(tool = %self.descriptor.name, error = %e, "tool call not completed");
                format!("Error: {e}")
            }
        }
    }
}

/// Join every text-bearing part of a result with newlines.
pub fn result_text(result: &CallToolResult) -> String {
    if result.content.is_empty() {
        return NO_RESULT.to_string();
    }
    let texts: Vec<&str> = result.texts().collect();
    if texts.is_empty() {
        NO_TEXT_RESULT.to_string()
    } else {
        texts.join("\n")
    }
}

/// Ordered set of proxies built from one discovery round.
#[derive(Debug, Default)]
pub struct Catalog {
    proxies: Vec<ToolProxy>,
}

impl Catalog {
    /// Build proxies in discovery order. Later duplicates of a name are dropped.
    pub fn build(tools: Vec<Tool>, bridge: &Bridge) -> Self {
        let mut seen = HashSet::new();
        let mut proxies = Vec::with_capacity(tools.len());
        for tool in &tools {
            if !seen.insert(tool.name.clone()) {
                warn!(tool = %tool.name, "duplicate tool name in catalog; keeping the first");
                continue;
            }
            let descriptor = ToolDescriptor::from_tool(tool);
            debug!(
                tool = %descriptor.name,
                params = descriptor.parameters.len(),
                "built tool proxy"
            );
            proxies.push(ToolProxy::new(descriptor, bridge.clone()));
        }
        Self { proxies }
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolProxy> {
        self.proxies.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ToolProxy> {
        self.proxies.iter().find(|proxy| proxy.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.proxies.iter().map(ToolProxy::name).collect()
    }

    pub fn descriptors(&self) -> Vec<&ToolDescriptor> {
        self.proxies.iter().map(ToolProxy::descriptor).collect()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.proxies.iter().map(ToolProxy::spec).collect()
    }

    /// Numbered `name - first line` listing for the system prompt.
    pub fn summary(&self) -> String {
        self.proxies
            .iter()
            .enumerate()
            .map(|(i, proxy)| {
                format!("{}. **{}** - {}", i + 1, proxy.name(), proxy.descriptor.summary_line())
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

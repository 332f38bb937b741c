//! Write-once publication of the agent, and the startup gate that waits for it.

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{error, info};

use crate::agent::Agent;
use crate::lifecycle::{Lifecycle, Phase};

/// Overall bound on how long startup waits for the session to become ready.
pub const READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Startup failed before the agent was published.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ReadinessError {
    #[error(
        "Failed to connect to MCP server at {endpoint} within {waited:?}. \
         Make sure the server is running and reachable."
    )]
    Timeout { endpoint: String, waited: Duration },

    #[error("Failed to connect to MCP server at {endpoint}: {reason}")]
    Faulted { endpoint: String, reason: String },
}

/// Holds the agent built from the catalog, written once by the session.
#[derive(Debug)]
pub struct Publisher<B> {
    lifecycle: Arc<Lifecycle>,
    agent: OnceLock<Arc<Agent<B>>>,
}

impl<B> Publisher<B> {
    pub fn new(lifecycle: Arc<Lifecycle>) -> Self {
        Self {
            lifecycle,
            agent: OnceLock::new(),
        }
    }

    /// Store the agent and mark the session ready.
    ///
    /// Returns `false` if an agent was already published.
    pub(crate) fn publish(&self, agent: Agent<B>) -> bool {
        if self.agent.set(Arc::new(agent)).is_err() {
            return false;
        }
        self.lifecycle.advance(Phase::Ready)
    }

    /// The published agent, if any.
    pub fn get(&self) -> Option<Arc<Agent<B>>> {
        self.agent.get().cloned()
    }

    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }
}

/// One-shot barrier between process start and the first request.
#[derive(Debug)]
pub struct ReadinessGate<B> {
    publisher: Arc<Publisher<B>>,
    endpoint: String,
    bound: Duration,
}

impl<B> ReadinessGate<B> {
    pub fn new(publisher: Arc<Publisher<B>>, endpoint: impl Into<String>, bound: Duration) -> Self {
        Self {
            publisher,
            endpoint: endpoint.into(),
            bound,
        }
    }

    /// Block until the agent is published, the session faults, or the bound elapses.
    pub fn wait(self) -> Result<Arc<Agent<B>>, ReadinessError> {
        let started = Instant::now();
        info!(endpoint = %self.endpoint, bound = ?self.bound, "waiting for MCP session");
        let phase = self.publisher.lifecycle.wait_settled(self.bound);

        match (phase, self.publisher.get()) {
            (Phase::Ready, Some(agent)) => {
                info!(
                    tools = agent.catalog().len(),
                    elapsed = ?started.elapsed(),
                    "MCP session ready"
                );
                Ok(agent)
            }
            (Phase::Faulted, _) => {
                let reason = self
                    .publisher
                    .lifecycle
                    .fault_reason()
                    .unwrap_or_else(|| "session faulted".to_string());
                error!(endpoint = %self.endpoint, %reason, "MCP session failed to start");
                Err(ReadinessError::Faulted {
                    endpoint: self.endpoint,
                    reason,
                })
            }
            _ => {
                error!(endpoint = %self.endpoint, ?phase, "timed out waiting for MCP session");
                Err(ReadinessError::Timeout {
                    endpoint: self.endpoint,
                    waited: self.bound,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::Bridge;
    use crate::proxy::Catalog;
    use crate::testing::ScriptedBackend;
    use std::thread;

    fn agent(lifecycle: &Arc<Lifecycle>) -> Agent<ScriptedBackend> {
        let bridge = Bridge::builder(Arc::clone(lifecycle)).build();
        Agent::new(ScriptedBackend::new(vec![]), Catalog::build(vec![], &bridge))
    }

    #[test]
    fn publish_is_write_once() {
        let lifecycle = Arc::new(Lifecycle::new());
        let publisher = Publisher::new(Arc::clone(&lifecycle));
        assert!(publisher.get().is_none());

        assert!(publisher.publish(agent(&lifecycle)));
        let first = publisher.get().unwrap();
        assert!(!publisher.publish(agent(&lifecycle)));
        assert!(Arc::ptr_eq(&first, &publisher.get().unwrap()));
        assert_eq!(lifecycle.phase(), Phase::Ready);
    }

    #[test]
    fn gate_unblocks_once_published() {
        let lifecycle = Arc::new(Lifecycle::new());
        let publisher = Arc::new(Publisher::new(Arc::clone(&lifecycle)));
        let gate = ReadinessGate::new(
            Arc::clone(&publisher),
            "http://x/sse",
            Duration::from_secs(5),
        );

        let writer = Arc::clone(&publisher);
        let agent = agent(&lifecycle);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            writer.publish(agent);
        });

        let started = Instant::now();
        let ready = gate.wait().unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(advertised(&*ready), (0, 0));
        handle.join().unwrap();
    }

    /// Reads an agent without naming a model backend.
    fn advertised<B>(agent: &Agent<B>) -> (usize, usize) {
        assert!(agent.system_prompt().contains("Available tools:"));
        (agent.catalog().len(), agent.tool_specs().len())
    }

    #[test]
    fn agent_accessors_need_no_backend_bound() {
        let lifecycle = Arc::new(Lifecycle::new());
        let publisher = Publisher::new(Arc::clone(&lifecycle));
        assert!(publisher.publish(agent(&lifecycle)));

        let published = publisher.get().unwrap();
        assert_eq!(advertised(&*published), (0, 0));
    }

    #[test]
    fn gate_times_out_naming_endpoint() {
        let lifecycle = Arc::new(Lifecycle::new());
        lifecycle.advance(Phase::Connecting);
        let publisher = Arc::new(Publisher::<ScriptedBackend>::new(lifecycle));
        let gate = ReadinessGate::new(publisher, "http://x/sse", Duration::from_millis(100));

        let err = gate.wait().unwrap_err();
        assert_eq!(
            err,
            ReadinessError::Timeout {
                endpoint: "http://x/sse".into(),
                waited: Duration::from_millis(100),
            }
        );
        assert!(err.to_string().starts_with("Failed to connect to MCP server at http://x/sse"));
    }

    #[test]
    fn gate_returns_early_on_fault() {
        let lifecycle = Arc::new(Lifecycle::new());
        lifecycle.fault("connection refused");
        let publisher = Arc::new(Publisher::<ScriptedBackend>::new(lifecycle));
        let gate = ReadinessGate::new(publisher, "http://x/sse", Duration::from_secs(30));

        let started = Instant::now();
        let err = gate.wait().unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(
            err.to_string(),
            "Failed to connect to MCP server at http://x/sse: connection refused"
        );
    }
}

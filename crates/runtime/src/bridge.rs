//! Cross-context invocation bridge.
//!
//! The tool-host session lives on a dedicated single-threaded runtime. The
//! bridge lets any other thread or runtime schedule work onto it and wait,
//! up to a fixed deadline, for the result.

use std::future::Future;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::lifecycle::{Lifecycle, Phase};
use crate::session::ToolSession;

/// Deadline for one bridged call.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// What happens to a scheduled operation whose caller stopped waiting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OnTimeout {
    /// Abort the operation on the session's runtime.
    #[default]
    Cancel,
    /// Let the operation run to completion and discard its result.
    Detach,
}

/// Errors from a bridged call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum BridgeError {
    #[error("MCP session not initialized (session is {0})")]
    Uninitialized(Phase),

    #[error("MCP session has faulted; tool calls are unavailable")]
    Faulted,

    #[error("tool call timed out after {0:?}")]
    Timeout(Duration),

    #[error("MCP session ended before the call completed")]
    Dropped,
}

struct Target {
    handle: Handle,
    session: Arc<dyn ToolSession>,
}

struct Inner {
    lifecycle: Arc<Lifecycle>,
    target: OnceLock<Target>,
    deadline: Duration,
    on_timeout: OnTimeout,
}

/// Builder for a [`Bridge`].
#[derive(Debug, Clone)]
pub struct BridgeBuilder {
    lifecycle: Arc<Lifecycle>,
    deadline: Duration,
    on_timeout: OnTimeout,
}

impl BridgeBuilder {
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn on_timeout(mut self, on_timeout: OnTimeout) -> Self {
        self.on_timeout = on_timeout;
        self
    }

    pub fn build(self) -> Bridge {
        Bridge {
            inner: Arc::new(Inner {
                lifecycle: self.lifecycle,
                target: OnceLock::new(),
                deadline: self.deadline,
                on_timeout: self.on_timeout,
            }),
        }
    }
}

/// Handle for scheduling work onto the session's runtime.
///
/// Cheap to clone; every clone targets the same session.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("phase", &self.inner.lifecycle.phase())
            .field("attached", &self.inner.target.get().is_some())
            .field("deadline", &self.inner.deadline)
            .field("on_timeout", &self.inner.on_timeout)
            .finish()
    }
}

impl Bridge {
    pub fn builder(lifecycle: Arc<Lifecycle>) -> BridgeBuilder {
        BridgeBuilder {
            lifecycle,
            deadline: CALL_TIMEOUT,
            on_timeout: OnTimeout::default(),
        }
    }

    pub fn deadline(&self) -> Duration {
        self.inner.deadline
    }

    pub fn phase(&self) -> Phase {
        self.inner.lifecycle.phase()
    }

    /// Bind the bridge to the live session and the runtime hosting it.
    ///
    /// Only the first attachment takes effect.
    pub(crate) fn attach(&self, handle: Handle, session: Arc<dyn ToolSession>) -> bool {
        self.inner.target.set(Target { handle, session }).is_ok()
    }

    /// Run `op` on the session's runtime and await its result.
    ///
    /// Fails immediately unless the session is ready.
    pub async fn submit<F, Fut, T>(&self, op: F) -> Result<T, BridgeError>
    where
        F: FnOnce(Arc<dyn ToolSession>) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let task = self.schedule(op, move |value| {
            let _ = tx.send(value);
        })?;

        match tokio::time::timeout(self.inner.deadline, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(BridgeError::Dropped),
            Err(_) => Err(self.expire(task)),
        }
    }

    /// Blocking form of [`Bridge::submit`] for callers outside any async runtime.
    ///
    /// Must not be called from the session's own runtime thread.
    pub fn submit_blocking<F, Fut, T>(&self, op: F) -> Result<T, BridgeError>
    where
        F: FnOnce(Arc<dyn ToolSession>) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        let task = self.schedule(op, move |value| {
            let _ = tx.send(value);
        })?;

        match rx.recv_timeout(self.inner.deadline) {
            Ok(value) => Ok(value),
            Err(RecvTimeoutError::Disconnected) => Err(BridgeError::Dropped),
            Err(RecvTimeoutError::Timeout) => Err(self.expire(task)),
        }
    }

    fn target(&self) -> Result<&Target, BridgeError> {
        match self.inner.lifecycle.phase() {
            Phase::Ready => self
                .inner
                .target
                .get()
                .ok_or(BridgeError::Uninitialized(Phase::Ready)),
            Phase::Faulted => Err(BridgeError::Faulted),
            phase => Err(BridgeError::Uninitialized(phase)),
        }
    }

    fn schedule<F, Fut, T, D>(&self, op: F, deliver: D) -> Result<JoinHandle<()>, BridgeError>
    where
        F: FnOnce(Arc<dyn ToolSession>) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
        D: FnOnce(T) + Send + 'static,
    {
        let target = self.target()?;
        let session = Arc::clone(&target.session);
        Ok(target.handle.spawn(async move {
            deliver(op(session).await);
        }))
    }

    fn expire(&self, task: JoinHandle<()>) -> BridgeError {
        let deadline = self.inner.deadline;
        match self.inner.on_timeout {
            OnTimeout::Cancel => {
                warn!(?deadline, "bridged call timed out; cancelling it");
                task.abort();
            }
            OnTimeout::Detach => {
                warn!(?deadline, "bridged call timed out; leaving it to finish unobserved");
            }
        }
        BridgeError::Timeout(deadline)
    }
}

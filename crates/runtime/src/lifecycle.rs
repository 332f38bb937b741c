//! Session lifecycle state machine.
//!
//! `Uninitialized -> Connecting -> Discovering -> Ready -> Faulted`, where
//! `Faulted` may be entered from any phase and is terminal.

use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use tracing::info;

/// Phase of the single tool-host session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Connecting,
    Discovering,
    Ready,
    Faulted,
}

impl Phase {
    fn rank(self) -> u8 {
        match self {
            Self::Uninitialized => 0,
            Self::Connecting => 1,
            Self::Discovering => 2,
            Self::Ready => 3,
            Self::Faulted => 4,
        }
    }

    /// Whether no further transition can happen until a terminal outcome.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Ready | Self::Faulted)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Connecting => "connecting",
            Self::Discovering => "discovering",
            Self::Ready => "ready",
            Self::Faulted => "faulted",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct State {
    phase: Phase,
    fault: Option<String>,
}

/// Shared, observable session phase.
///
/// Written only by the session's background context; any thread may read it
/// or block until it changes.
#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<State>,
    changed: Condvar,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                phase: Phase::Uninitialized,
                fault: None,
            }),
            changed: Condvar::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Why the session faulted, once it has.
    pub fn fault_reason(&self) -> Option<String> {
        self.lock().fault.clone()
    }

    /// Move forward to `next`.
    ///
    /// Returns `false` without changing anything if `next` is not later than
    /// the current phase. Use [`Lifecycle::fault`] to enter `Faulted`.
    pub(crate) fn advance(&self, next: Phase) -> bool {
        if next == Phase::Faulted {
            return false;
        }
        let mut state = self.lock();
        if next.rank() <= state.phase.rank() {
            return false;
        }
        info!(from = %state.phase, to = %next, "session phase changed");
        state.phase = next;
        self.changed.notify_all();
        true
    }

    /// Enter the terminal `Faulted` phase. The first reason recorded wins.
    pub(crate) fn fault(&self, reason: impl Into<String>) {
        let mut state = self.lock();
        if state.phase == Phase::Faulted {
            return;
        }
        let reason = reason.into();
        info!(from = %state.phase, %reason, "session faulted");
        state.phase = Phase::Faulted;
        state.fault = Some(reason);
        self.changed.notify_all();
    }

    /// Block until `done` holds for the current phase or `bound` elapses.
    ///
    /// Returns the last phase observed.
    pub fn wait_until(&self, bound: Duration, done: impl Fn(Phase) -> bool) -> Phase {
        let state = self.lock();
        let (state, _) = self
            .changed
            .wait_timeout_while(state, bound, |state| !done(state.phase))
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.phase
    }

    /// Block until the session is ready or faulted, or `bound` elapses.
    pub fn wait_settled(&self, bound: Duration) -> Phase {
        self.wait_until(bound, Phase::is_settled)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

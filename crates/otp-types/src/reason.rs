//! Termination reasons and restart classification.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a process stopped.
///
/// One of `'normal'` | `'shutdown'` | `{error}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Reason {
    /// Deliberate, expected stop.
    Normal,
    /// Deliberate stop as part of a supervised shutdown.
    Shutdown,
    /// An uncaught handler exception, or a supervisor-initiated failure.
    Error(String),
}

impl Reason {
    /// `transient` children restart on these reasons; `permanent` children
    /// restart on any reason including this one.
    pub fn is_error(&self) -> bool {
        matches!(self, Reason::Error(_))
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::Normal => f.write_str("normal"),
            Reason::Shutdown => f.write_str("shutdown"),
            Reason::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}

/// Per-child restart policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Restart {
    /// Always restart, regardless of stop reason.
    Permanent,
    /// Restart only if the reason is an error.
    Transient,
    /// Never restart.
    Temporary,
}

impl Restart {
    /// Whether a child with this policy should be restarted given `reason`.
    pub fn should_restart(self, reason: &Reason) -> bool {
        match self {
            Restart::Permanent => true,
            Restart::Transient => reason.is_error(),
            Restart::Temporary => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_restarts_only_on_error() {
        assert!(Restart::Transient.should_restart(&Reason::Error("boom".into())));
        assert!(!Restart::Transient.should_restart(&Reason::Normal));
        assert!(!Restart::Transient.should_restart(&Reason::Shutdown));
    }

    #[test]
    fn permanent_always_restarts() {
        for reason in [Reason::Normal, Reason::Shutdown, Reason::Error("x".into())] {
            assert!(Restart::Permanent.should_restart(&reason));
        }
    }

    #[test]
    fn temporary_never_restarts() {
        for reason in [Reason::Normal, Reason::Shutdown, Reason::Error("x".into())] {
            assert!(!Restart::Temporary.should_restart(&reason));
        }
    }
}

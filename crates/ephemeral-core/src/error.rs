//! Unified error taxonomy for the coordination plane (§7).
//!
//! A single flat enum rather than a hierarchy of nested error types, in
//! keeping with the rest of this workspace: each variant carries a
//! human-readable `message` and the taxonomy is closed, so call sites match
//! on `category()` rather than downcasting.

use serde::{Deserialize, Serialize};

/// Unified error type for all coordination-plane operations.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum CoordError {
    /// Malformed request or configuration (§7: surfaced synchronously as
    /// HTTP 400, or rejected at startup).
    #[error("validation error: {message}")]
    Validation {
        /// Description of what failed validation.
        message: String,
    },

    /// Unregistered event for the current state, or reuse of a completed
    /// game identifier. Never fatal to the service.
    #[error("protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// TCP check failure, stream read error, or proxy start failure.
    #[error("peer error: {message}")]
    Peer {
        /// Description of the peer-connectivity failure.
        message: String,
    },

    /// MPC subprocess non-zero exit or other runtime failure.
    #[error("runtime error: {message}")]
    Runtime {
        /// Description of the runtime failure.
        message: String,
    },

    /// State or computation timer elapsed.
    #[error("timeout error: {message}")]
    Timeout {
        /// Description of which timer elapsed.
        message: String,
    },

    /// Networker startup failure, unreadable configuration file, or bus
    /// subscription failure. Crashes the service at startup only.
    #[error("fatal error: {message}")]
    Fatal {
        /// Description of the fatal condition.
        message: String,
    },
}

impl CoordError {
    /// Construct a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Construct a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Construct a peer error.
    pub fn peer(message: impl Into<String>) -> Self {
        Self::Peer {
            message: message.into(),
        }
    }

    /// Construct a runtime error.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }

    /// Construct a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Construct a fatal error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    /// Short, stable category name used for structured logging and metrics
    /// (even though metrics themselves are out of scope, the field is cheap
    /// to carry and useful for log-based dashboards).
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Protocol { .. } => "protocol",
            Self::Peer { .. } => "peer",
            Self::Runtime { .. } => "runtime",
            Self::Timeout { .. } => "timeout",
            Self::Fatal { .. } => "fatal",
        }
    }

    /// Whether this error is recoverable: it drives the affected FSM to a
    /// terminal state without affecting other games or players (§7,
    /// "Propagation policy").
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Fatal { .. })
    }
}

/// Standard result type for coordination-plane operations.
pub type Result<T> = std::result::Result<T, CoordError>;

impl From<serde_json::Error> for CoordError {
    fn from(err: serde_json::Error) -> Self {
        Self::validation(format!("malformed JSON: {err}"))
    }
}

impl From<std::io::Error> for CoordError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => Self::timeout(err.to_string()),
            std::io::ErrorKind::NotFound => Self::validation(err.to_string()),
            _ => Self::peer(err.to_string()),
        }
    }
}

impl From<uuid::Error> for CoordError {
    fn from(err: uuid::Error) -> Self {
        Self::validation(format!("invalid UUID: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_matches_constructor() {
        let err = CoordError::protocol("duplicate gameID");
        assert_eq!(err.category(), "protocol");
        assert_eq!(err.to_string(), "protocol error: duplicate gameID");
    }

    #[test]
    fn only_fatal_errors_are_unrecoverable() {
        assert!(CoordError::protocol("x").is_recoverable());
        assert!(CoordError::peer("x").is_recoverable());
        assert!(CoordError::timeout("x").is_recoverable());
        assert!(!CoordError::fatal("x").is_recoverable());
    }
}

//! Error types for the Crystalys client
//!
//! Every public operation returns exactly one of the variants of
//! [`CrystalysError`]. Transport and state-machine failures have their own
//! enums and convert into it with `?`.

use core::time::Duration;

use crate::types::EResult;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Failures reported by a [`CoordinatorTransport`](crate::transport::CoordinatorTransport)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Transport has no event channel attached")]
    NotAttached,
    #[error("Transport event channel already attached")]
    AlreadyAttached,
    #[error("Send failed: {reason}")]
    SendFailed { reason: String },
    #[error("Transport shutdown: {reason}")]
    Shutdown { reason: String },
}

/// Why the account server refused a log-on
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LoginDenial {
    #[error("Steam Guard code required, generate a sentry first")]
    GuardRequired,
    #[error("two-factor code required, generate a sentry first")]
    TwoFactorRequired,
    #[error("log-on rejected with result {}", result_name(.0))]
    Other(u32),
}

impl LoginDenial {
    /// Classify a log-on result. Returns `None` for [`EResult::Ok`].
    pub fn from_result(result: EResult) -> Option<Self> {
        match result {
            EResult::Ok => None,
            EResult::AccountLogonDenied => Some(LoginDenial::GuardRequired),
            EResult::AccountLoginDeniedNeedTwoFactor => Some(LoginDenial::TwoFactorRequired),
            other => Some(LoginDenial::Other(other.code())),
        }
    }
}

/// Rejected handshake state transition
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateTransitionError {
    #[error("Invalid transition from {from_state} on {event}")]
    InvalidTransition { from_state: String, event: String },
}

fn result_name(code: &u32) -> String {
    EResult::from_code(*code).name()
}

// ----------------------------------------------------------------------------
// Main Error Type
// ----------------------------------------------------------------------------

/// Core error type for session, query and artifact operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CrystalysError {
    #[error("Failed to connect: {reason}")]
    ConnectFailed { reason: String },

    #[error("Login denied: {0}")]
    LoginDenied(LoginDenial),

    #[error("Coordinator handshake did not complete within {duration_ms}ms")]
    HandshakeTimeout { duration_ms: u64 },

    #[error("Session is not connected to the coordinator")]
    NotConnected,

    #[error("{operation} timed out after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },

    #[error("Match {match_id} not found (result {result})")]
    MatchNotFound { match_id: u64, result: u32 },

    #[error("Invalid coordinator message: {reason}")]
    InvalidMessage { reason: String },

    #[error("Artifact unavailable at {url}: {reason}")]
    ArtifactUnavailable { url: String, reason: String },

    #[error("Corrupt artifact: {reason}")]
    CorruptArtifact { reason: String },

    #[error("Session has been disposed")]
    Disposed,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("State transition error: {0}")]
    StateTransition(#[from] StateTransitionError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl CrystalysError {
    /// Create a connect failure with a reason
    pub fn connect_failed<T: Into<String>>(reason: T) -> Self {
        CrystalysError::ConnectFailed {
            reason: reason.into(),
        }
    }

    /// Create a handshake timeout for the given deadline
    pub fn handshake_timeout(duration: Duration) -> Self {
        CrystalysError::HandshakeTimeout {
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// Create a per-call timeout for the named operation
    pub fn timeout<T: Into<String>>(operation: T, duration: Duration) -> Self {
        CrystalysError::Timeout {
            operation: operation.into(),
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// Create an invalid message error
    pub fn invalid_message<T: Into<String>>(reason: T) -> Self {
        CrystalysError::InvalidMessage {
            reason: reason.into(),
        }
    }

    /// Create an artifact transfer failure
    pub fn artifact_unavailable<U: Into<String>, R: Into<String>>(url: U, reason: R) -> Self {
        CrystalysError::ArtifactUnavailable {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create a decompression or decode failure
    pub fn corrupt_artifact<T: Into<String>>(reason: T) -> Self {
        CrystalysError::CorruptArtifact {
            reason: reason.into(),
        }
    }

    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        CrystalysError::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a transport send failure
    pub fn send_failed<T: Into<String>>(reason: T) -> Self {
        CrystalysError::Transport(TransportError::SendFailed {
            reason: reason.into(),
        })
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type CrystalysResult<T> = core::result::Result<T, CrystalysError>;

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

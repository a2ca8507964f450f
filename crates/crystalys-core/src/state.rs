//! Session Handshake State Machine
//!
//! Pure transitions for the connect → log on → announce → hello/welcome
//! sequence. The runtime drives it from transport events; this module only
//! decides which transitions are legal.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::StateTransitionError;

// ----------------------------------------------------------------------------
// Session State
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SessionState {
    /// No connection and no handshake in flight
    #[default]
    Disconnected,
    /// Transport connect requested
    Connecting,
    /// Account log-on submitted
    LoggingOn,
    /// Games-played sent, settling before the hello
    AnnouncingActivity,
    /// Hello sent, waiting for the coordinator welcome
    AwaitingWelcome,
    /// Coordinator session established
    Ready { version: u32 },
    /// Last attempt failed
    Failed { reason: String },
}

/// Inputs to the handshake state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandshakeEvent {
    /// Start a new attempt
    Connect,
    /// Transport reported a successful connect
    Connected,
    /// Account server accepted the log-on
    LoggedOn,
    /// Games-played sent and settle delay elapsed
    ActivityAnnounced,
    /// Coordinator welcome received
    Welcome { version: u32 },
    /// Attempt failed
    Fail { reason: String },
    /// Connection dropped; `reconnecting` marks a drop that the supervisor
    /// will recover from
    Disconnected { reconnecting: bool },
}

impl HandshakeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            HandshakeEvent::Connect => "Connect",
            HandshakeEvent::Connected => "Connected",
            HandshakeEvent::LoggedOn => "LoggedOn",
            HandshakeEvent::ActivityAnnounced => "ActivityAnnounced",
            HandshakeEvent::Welcome { .. } => "Welcome",
            HandshakeEvent::Fail { .. } => "Fail",
            HandshakeEvent::Disconnected { .. } => "Disconnected",
        }
    }
}

impl SessionState {
    /// State name for logs and transition errors
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "Disconnected",
            SessionState::Connecting => "Connecting",
            SessionState::LoggingOn => "LoggingOn",
            SessionState::AnnouncingActivity => "AnnouncingActivity",
            SessionState::AwaitingWelcome => "AwaitingWelcome",
            SessionState::Ready { .. } => "Ready",
            SessionState::Failed { .. } => "Failed",
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, SessionState::Ready { .. })
    }

    /// True between `Connecting` and `AwaitingWelcome` inclusive
    pub fn is_handshaking(&self) -> bool {
        matches!(
            self,
            SessionState::Connecting
                | SessionState::LoggingOn
                | SessionState::AnnouncingActivity
                | SessionState::AwaitingWelcome
        )
    }

    /// Negotiated coordinator version, only while ready
    pub fn version(&self) -> Option<u32> {
        match self {
            SessionState::Ready { version } => Some(*version),
            _ => None,
        }
    }

    /// Process an event and return the next state (consumes self)
    pub fn transition(self, event: HandshakeEvent) -> Result<SessionState, StateTransitionError> {
        let next = match (&self, &event) {
            (SessionState::Disconnected | SessionState::Failed { .. }, HandshakeEvent::Connect) => {
                SessionState::Connecting
            }
            (SessionState::Connecting, HandshakeEvent::Connected) => SessionState::LoggingOn,
            (SessionState::LoggingOn, HandshakeEvent::LoggedOn) => {
                SessionState::AnnouncingActivity
            }
            (SessionState::AnnouncingActivity, HandshakeEvent::ActivityAnnounced) => {
                SessionState::AwaitingWelcome
            }
            (SessionState::AwaitingWelcome, HandshakeEvent::Welcome { version }) => {
                SessionState::Ready { version: *version }
            }
            (state, HandshakeEvent::Fail { reason })
                if state.is_handshaking() || state.is_ready() =>
            {
                SessionState::Failed {
                    reason: reason.clone(),
                }
            }
            (SessionState::Ready { .. }, HandshakeEvent::Disconnected { reconnecting: true }) => {
                SessionState::Connecting
            }
            (_, HandshakeEvent::Disconnected { .. }) => SessionState::Disconnected,
            _ => {
                return Err(StateTransitionError::InvalidTransition {
                    from_state: self.name().to_string(),
                    event: event.name().to_string(),
                })
            }
        };

        Ok(next)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Ready { version } => write!(f, "Ready(v{})", version),
            SessionState::Failed { reason } => write!(f, "Failed({})", reason),
            other => f.write_str(other.name()),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

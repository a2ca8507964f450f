//! Core domain types
//!
//! Identity credentials, account-server result codes, request job identifiers
//! and the match record returned by the coordinator.

use core::fmt;

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Fixed Identifiers
// ----------------------------------------------------------------------------

/// Application id announced as "playing" and used for every GC send
pub const APP_ID: u32 = 570;

/// Engine advertised in the coordinator hello
pub const ENGINE: SourceEngine = SourceEngine::Source2;

/// Source engine generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceEngine {
    Source1,
    Source2,
}

// ----------------------------------------------------------------------------
// Account Server Results
// ----------------------------------------------------------------------------

/// Result codes reported by the account server for connect and log-on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EResult {
    Ok,
    Fail,
    NoConnection,
    InvalidPassword,
    ServiceUnavailable,
    AccountLogonDenied,
    AccountLoginDeniedNeedTwoFactor,
    Other(u32),
}

impl EResult {
    /// Map a raw result code
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => EResult::Ok,
            2 => EResult::Fail,
            3 => EResult::NoConnection,
            5 => EResult::InvalidPassword,
            20 => EResult::ServiceUnavailable,
            63 => EResult::AccountLogonDenied,
            85 => EResult::AccountLoginDeniedNeedTwoFactor,
            other => EResult::Other(other),
        }
    }

    /// Raw result code
    pub fn code(self) -> u32 {
        match self {
            EResult::Ok => 1,
            EResult::Fail => 2,
            EResult::NoConnection => 3,
            EResult::InvalidPassword => 5,
            EResult::ServiceUnavailable => 20,
            EResult::AccountLogonDenied => 63,
            EResult::AccountLoginDeniedNeedTwoFactor => 85,
            EResult::Other(code) => code,
        }
    }

    /// Symbolic name, used in connect failure reasons
    pub fn name(self) -> String {
        match self {
            EResult::Ok => "OK".to_string(),
            EResult::Fail => "Fail".to_string(),
            EResult::NoConnection => "NoConnection".to_string(),
            EResult::InvalidPassword => "InvalidPassword".to_string(),
            EResult::ServiceUnavailable => "ServiceUnavailable".to_string(),
            EResult::AccountLogonDenied => "AccountLogonDenied".to_string(),
            EResult::AccountLoginDeniedNeedTwoFactor => {
                "AccountLoginDeniedNeedTwoFactor".to_string()
            }
            EResult::Other(code) => format!("Unknown({})", code),
        }
    }

    pub fn is_ok(self) -> bool {
        self == EResult::Ok
    }
}

impl fmt::Display for EResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ----------------------------------------------------------------------------
// Job Identifiers
// ----------------------------------------------------------------------------

/// Request-local identifier carried as the source job of a GC request and
/// echoed back as the target job of its reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job#{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Credentials
// ----------------------------------------------------------------------------

/// Account identity used for log-on; reused verbatim on reconnect
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Persisted sentry / auth token from a previous guard exchange
    pub sentry: Option<Vec<u8>>,
}

impl Credentials {
    pub fn new<U: Into<String>, P: Into<String>>(username: U, password: P) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            sentry: None,
        }
    }

    /// Attach a previously persisted sentry token
    pub fn with_sentry(mut self, sentry: Vec<u8>) -> Self {
        self.sentry = Some(sentry);
        self
    }
}

// Never print the password or sentry bytes.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("sentry", &self.sentry.as_ref().map(|s| s.len()))
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Match Record
// ----------------------------------------------------------------------------

/// Replay availability as reported by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ReplayState {
    #[default]
    Available,
    NotRecorded,
    Expired,
}

/// Match details returned by the coordinator
///
/// `cluster`, `match_id` and `replay_salt` locate the match's artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_id: u64,
    pub cluster: u32,
    pub replay_salt: u32,
    pub replay_state: ReplayState,
    pub start_time: u32,
    pub duration: u32,
    pub game_mode: u32,
    pub radiant_win: bool,
}

impl MatchRecord {
    /// Record carrying only the fields needed to locate artifacts
    pub fn locator(match_id: u64, cluster: u32, replay_salt: u32) -> Self {
        Self {
            match_id,
            cluster,
            replay_salt,
            replay_state: ReplayState::Available,
            start_time: 0,
            duration: 0,
            game_mode: 0,
            radiant_win: false,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

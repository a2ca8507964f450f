//! Game coordinator message envelope
//!
//! A [`GcMessage`] is the unit the transport delivers for the coordinator: a
//! discriminator (`msg_type`), optional source/target job ids, and an opaque
//! payload. Bodies the client understands implement [`GcBody`] and are encoded
//! with bincode.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::errors::{CrystalysError, CrystalysResult};
use crate::types::{JobId, MatchRecord, SourceEngine};

// ----------------------------------------------------------------------------
// Discriminators
// ----------------------------------------------------------------------------

/// GC message types used by the session
pub mod msg_type {
    pub const CLIENT_WELCOME: u32 = 4004;
    pub const CLIENT_HELLO: u32 = 4006;
    pub const MATCH_DETAILS_REQUEST: u32 = 7095;
    pub const MATCH_DETAILS_RESPONSE: u32 = 7096;

    /// Human-readable name for logs
    pub fn name(msg_type: u32) -> &'static str {
        match msg_type {
            CLIENT_WELCOME => "ClientWelcome",
            CLIENT_HELLO => "ClientHello",
            MATCH_DETAILS_REQUEST => "MatchDetailsRequest",
            MATCH_DETAILS_RESPONSE => "MatchDetailsResponse",
            _ => "Unknown",
        }
    }
}

// ----------------------------------------------------------------------------
// Message Bodies
// ----------------------------------------------------------------------------

/// A typed GC message body bound to its discriminator
pub trait GcBody: Serialize + DeserializeOwned {
    const MSG_TYPE: u32;
}

/// Requests a coordinator session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientHello {
    pub engine: SourceEngine,
    pub version: u32,
}

impl GcBody for ClientHello {
    const MSG_TYPE: u32 = msg_type::CLIENT_HELLO;
}

/// Coordinator session confirmation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientWelcome {
    pub version: u32,
}

impl GcBody for ClientWelcome {
    const MSG_TYPE: u32 = msg_type::CLIENT_WELCOME;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchDetailsRequest {
    pub match_id: u64,
}

impl GcBody for MatchDetailsRequest {
    const MSG_TYPE: u32 = msg_type::MATCH_DETAILS_REQUEST;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchDetailsResponse {
    /// Coordinator result code, 1 on success
    pub result: u32,
    pub match_record: Option<MatchRecord>,
}

impl GcBody for MatchDetailsResponse {
    const MSG_TYPE: u32 = msg_type::MATCH_DETAILS_RESPONSE;
}

// ----------------------------------------------------------------------------
// Envelope
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcMessage {
    pub msg_type: u32,
    pub source_job_id: Option<JobId>,
    pub target_job_id: Option<JobId>,
    pub payload: Vec<u8>,
}

impl GcMessage {
    /// Encode a typed body into a fresh envelope with no job routing
    pub fn new<B: GcBody>(body: &B) -> CrystalysResult<Self> {
        let payload = bincode::serialize(body).map_err(|e| {
            CrystalysError::invalid_message(format!(
                "failed to encode {}: {}",
                msg_type::name(B::MSG_TYPE),
                e
            ))
        })?;

        Ok(Self {
            msg_type: B::MSG_TYPE,
            source_job_id: None,
            target_job_id: None,
            payload,
        })
    }

    /// Tag the message as a request expecting a reply for `job`
    pub fn with_source_job(mut self, job: JobId) -> Self {
        self.source_job_id = Some(job);
        self
    }

    /// Route the message as the reply to `job`
    pub fn reply_to(mut self, job: JobId) -> Self {
        self.target_job_id = Some(job);
        self
    }

    /// Decode the payload as `B`, checking the discriminator first
    pub fn decode<B: GcBody>(&self) -> CrystalysResult<B> {
        if self.msg_type != B::MSG_TYPE {
            return Err(CrystalysError::invalid_message(format!(
                "expected {} ({}), got {} ({})",
                msg_type::name(B::MSG_TYPE),
                B::MSG_TYPE,
                msg_type::name(self.msg_type),
                self.msg_type
            )));
        }

        bincode::deserialize(&self.payload).map_err(|e| {
            CrystalysError::invalid_message(format!(
                "failed to decode {}: {}",
                msg_type::name(self.msg_type),
                e
            ))
        })
    }

    pub fn name(&self) -> &'static str {
        msg_type::name(self.msg_type)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_checks_discriminator() {
        let message = GcMessage::new(&ClientWelcome { version: 7 }).unwrap();
        assert_eq!(message.msg_type, msg_type::CLIENT_WELCOME);

        let err = message.decode::<MatchDetailsResponse>().unwrap_err();
        assert!(matches!(err, CrystalysError::InvalidMessage { .. }));
        assert_eq!(message.decode::<ClientWelcome>().unwrap().version, 7);
    }

    #[test]
    fn test_truncated_payload_is_invalid() {
        let mut message = GcMessage::new(&MatchDetailsResponse {
            result: 1,
            match_record: Some(MatchRecord::locator(1, 2, 3)),
        })
        .unwrap();
        message.payload.truncate(4);

        assert!(matches!(
            message.decode::<MatchDetailsResponse>(),
            Err(CrystalysError::InvalidMessage { .. })
        ));
    }

    #[test]
    fn test_job_routing() {
        let request = GcMessage::new(&MatchDetailsRequest { match_id: 42 })
            .unwrap()
            .with_source_job(JobId(9));
        assert_eq!(request.source_job_id, Some(JobId(9)));
        assert_eq!(request.target_job_id, None);

        let reply = GcMessage::new(&MatchDetailsResponse {
            result: 1,
            match_record: None,
        })
        .unwrap()
        .reply_to(JobId(9));
        assert_eq!(reply.target_job_id, Some(JobId(9)));
        assert_eq!(reply.name(), "MatchDetailsResponse");
    }
}

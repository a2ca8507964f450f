//! Mock Coordinator Transport for Testing
//!
//! A deterministic [`CoordinatorTransport`] that plays both the account server
//! and the game coordinator. Connect and log-on results, the welcome, and
//! match-details replies are scripted through [`MockCoordinatorConfig`];
//! every outbound call is recorded in a [`MockCoordinatorLog`].

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use crystalys_core::{
    msg_type, ClientWelcome, CoordinatorTransport, Credentials, CrystalysResult, EResult,
    GcMessage, MatchDetailsRequest, MatchDetailsResponse, MatchRecord, TransportError,
    TransportEvent, TransportEventSender,
};
use tokio::time::{sleep, Duration};
use tracing::{debug, trace};

use crate::fixtures::DEFAULT_WELCOME_VERSION;

/// Coordinator result code for a successful lookup
pub const RESULT_OK: u32 = 1;
/// Coordinator result code for an unknown match
pub const RESULT_NOT_FOUND: u32 = 2;

// ----------------------------------------------------------------------------
// Mock Coordinator Configuration
// ----------------------------------------------------------------------------

/// Scripted behavior of the mock coordinator
#[derive(Debug, Clone)]
pub struct MockCoordinatorConfig {
    /// Result reported for every connect
    pub connect_result: EResult,
    /// Error returned by the connect call itself (None = connect succeeds)
    pub connect_error: Option<String>,
    /// Result reported for every log-on
    pub logon_result: EResult,
    /// Version sent in reply to a hello (None = never welcome)
    pub welcome_version: Option<u32>,
    /// Whether replies carry the request's job id as target
    pub echo_job_ids: bool,
    /// Delay before GC replies are delivered
    pub response_delay: Option<Duration>,
    /// Whether match-details requests go unanswered
    pub drop_match_requests: bool,
}

impl Default for MockCoordinatorConfig {
    fn default() -> Self {
        Self {
            connect_result: EResult::Ok,
            connect_error: None,
            logon_result: EResult::Ok,
            welcome_version: Some(DEFAULT_WELCOME_VERSION),
            echo_job_ids: true,
            response_delay: None,
            drop_match_requests: false,
        }
    }
}

impl MockCoordinatorConfig {
    /// Account requires a Steam Guard code
    pub fn guard_required() -> Self {
        Self {
            logon_result: EResult::AccountLogonDenied,
            ..Self::default()
        }
    }

    /// Account requires a two-factor code
    pub fn two_factor_required() -> Self {
        Self {
            logon_result: EResult::AccountLoginDeniedNeedTwoFactor,
            ..Self::default()
        }
    }

    /// Coordinator never answers the hello
    pub fn silent_coordinator() -> Self {
        Self {
            welcome_version: None,
            ..Self::default()
        }
    }
}

/// Everything the session asked the transport to do
#[derive(Debug, Clone, Default)]
pub struct MockCoordinatorLog {
    pub connect_calls: u32,
    pub disconnect_calls: u32,
    pub logons: Vec<Credentials>,
    pub games_played: Vec<Vec<u32>>,
    pub gc_sent: Vec<(u32, GcMessage)>,
}

impl MockCoordinatorLog {
    /// Outbound GC messages of one type
    pub fn gc_of_type(&self, msg_type: u32) -> Vec<GcMessage> {
        self.gc_sent
            .iter()
            .filter(|(_, message)| message.msg_type == msg_type)
            .map(|(_, message)| message.clone())
            .collect()
    }
}

// ----------------------------------------------------------------------------
// Mock Coordinator
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MockCoordinator {
    config: Mutex<MockCoordinatorConfig>,
    events: Mutex<Option<TransportEventSender>>,
    matches: Mutex<HashMap<u64, MatchRecord>>,
    log: Mutex<MockCoordinatorLog>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: MockCoordinatorConfig) -> Self {
        Self {
            config: Mutex::new(config),
            ..Self::default()
        }
    }

    /// Change the scripted behavior in place
    pub fn update_config(&self, update: impl FnOnce(&mut MockCoordinatorConfig)) {
        update(&mut *lock(&self.config));
    }

    /// Make `record` available to match-details requests
    pub fn insert_match(&self, record: MatchRecord) {
        lock(&self.matches).insert(record.match_id, record);
    }

    /// Drop the connection as if the network failed
    pub fn simulate_disconnect(&self) -> CrystalysResult<()> {
        debug!("Mock coordinator dropping connection");
        self.emit(TransportEvent::Disconnected {
            user_initiated: false,
        })
    }

    /// Deliver an arbitrary event to the session
    pub fn inject(&self, event: TransportEvent) -> CrystalysResult<()> {
        self.emit(event)
    }

    /// Snapshot of the call log
    pub fn log(&self) -> MockCoordinatorLog {
        lock(&self.log).clone()
    }

    pub fn connect_calls(&self) -> u32 {
        lock(&self.log).connect_calls
    }

    pub fn logons(&self) -> Vec<Credentials> {
        lock(&self.log).logons.clone()
    }

    pub fn games_played(&self) -> Vec<Vec<u32>> {
        lock(&self.log).games_played.clone()
    }

    /// Outbound GC messages of one type
    pub fn sent_of_type(&self, msg_type: u32) -> Vec<GcMessage> {
        lock(&self.log).gc_of_type(msg_type)
    }

    fn config(&self) -> MockCoordinatorConfig {
        lock(&self.config).clone()
    }

    fn sender(&self) -> CrystalysResult<TransportEventSender> {
        lock(&self.events)
            .clone()
            .ok_or_else(|| TransportError::NotAttached.into())
    }

    fn emit(&self, event: TransportEvent) -> CrystalysResult<()> {
        let sender = self.sender()?;
        trace!("Mock coordinator emitting {}", event.name());
        // The session may already be gone
        let _ = sender.send(event);
        Ok(())
    }

    /// Deliver a GC reply now or after the configured delay
    fn reply(&self, message: GcMessage) -> CrystalysResult<()> {
        let event = TransportEvent::GcMessage(message);
        match self.config().response_delay {
            None => self.emit(event),
            Some(delay) => {
                let sender = self.sender()?;
                tokio::spawn(async move {
                    sleep(delay).await;
                    let _ = sender.send(event);
                });
                Ok(())
            }
        }
    }

    fn answer_match_details(&self, request: &GcMessage) -> CrystalysResult<()> {
        let config = self.config();
        if config.drop_match_requests {
            trace!("Mock coordinator dropping match request");
            return Ok(());
        }

        let body: MatchDetailsRequest = request.decode()?;
        let record = lock(&self.matches).get(&body.match_id).cloned();
        let response = MatchDetailsResponse {
            result: if record.is_some() {
                RESULT_OK
            } else {
                RESULT_NOT_FOUND
            },
            match_record: record,
        };

        let mut reply = GcMessage::new(&response)?;
        if config.echo_job_ids {
            if let Some(job) = request.source_job_id {
                reply = reply.reply_to(job);
            }
        }
        self.reply(reply)
    }
}

#[async_trait]
impl CoordinatorTransport for MockCoordinator {
    fn attach_events(&self, sender: TransportEventSender) -> CrystalysResult<()> {
        let mut events = lock(&self.events);
        if events.is_some() {
            return Err(TransportError::AlreadyAttached.into());
        }
        *events = Some(sender);
        Ok(())
    }

    async fn connect(&self) -> CrystalysResult<()> {
        lock(&self.log).connect_calls += 1;
        let config = self.config();
        if let Some(reason) = config.connect_error {
            return Err(TransportError::SendFailed { reason }.into());
        }
        self.emit(TransportEvent::Connected {
            result: config.connect_result,
        })
    }

    async fn disconnect(&self) -> CrystalysResult<()> {
        lock(&self.log).disconnect_calls += 1;
        self.emit(TransportEvent::Disconnected {
            user_initiated: true,
        })
    }

    async fn log_on(&self, credentials: &Credentials) -> CrystalysResult<()> {
        lock(&self.log).logons.push(credentials.clone());
        let result = self.config().logon_result;
        self.emit(TransportEvent::LoggedOn { result })
    }

    async fn send_games_played(&self, app_ids: &[u32]) -> CrystalysResult<()> {
        lock(&self.log).games_played.push(app_ids.to_vec());
        Ok(())
    }

    async fn send_gc(&self, app_id: u32, message: GcMessage) -> CrystalysResult<()> {
        lock(&self.log).gc_sent.push((app_id, message.clone()));

        match message.msg_type {
            msg_type::CLIENT_HELLO => match self.config().welcome_version {
                Some(version) => self.reply(GcMessage::new(&ClientWelcome { version })?),
                None => Ok(()),
            },
            msg_type::MATCH_DETAILS_REQUEST => self.answer_match_details(&message),
            _ => Ok(()),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::sample_match_record;
    use crystalys_core::{create_event_channel, JobId};

    #[tokio::test]
    async fn test_scripted_handshake_events() {
        let mock = MockCoordinator::new();
        let (sender, mut receiver) = create_event_channel();
        mock.attach_events(sender).unwrap();

        mock.connect().await.unwrap();
        assert_eq!(
            receiver.recv().await,
            Some(TransportEvent::Connected { result: EResult::Ok })
        );

        mock.log_on(&Credentials::new("user", "pass")).await.unwrap();
        assert_eq!(
            receiver.recv().await,
            Some(TransportEvent::LoggedOn { result: EResult::Ok })
        );

        let hello = GcMessage::new(&crystalys_core::ClientHello {
            engine: crystalys_core::ENGINE,
            version: 0,
        })
        .unwrap();
        mock.send_gc(570, hello).await.unwrap();
        match receiver.recv().await {
            Some(TransportEvent::GcMessage(message)) => {
                let welcome: ClientWelcome = message.decode().unwrap();
                assert_eq!(welcome.version, DEFAULT_WELCOME_VERSION);
            }
            other => panic!("expected welcome, got {:?}", other),
        }

        assert_eq!(mock.connect_calls(), 1);
        assert_eq!(mock.logons().len(), 1);
    }

    #[tokio::test]
    async fn test_match_reply_echoes_job() {
        let mock = MockCoordinator::new();
        let (sender, mut receiver) = create_event_channel();
        mock.attach_events(sender).unwrap();
        mock.insert_match(sample_match_record(42));

        let request = GcMessage::new(&MatchDetailsRequest { match_id: 42 })
            .unwrap()
            .with_source_job(JobId(7));
        mock.send_gc(570, request).await.unwrap();

        match receiver.recv().await {
            Some(TransportEvent::GcMessage(message)) => {
                assert_eq!(message.target_job_id, Some(JobId(7)));
                let response: MatchDetailsResponse = message.decode().unwrap();
                assert_eq!(response.result, RESULT_OK);
                assert_eq!(response.match_record, Some(sample_match_record(42)));
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_attach_twice_rejected() {
        let mock = MockCoordinator::new();
        let (sender, _receiver) = create_event_channel();
        mock.attach_events(sender.clone()).unwrap();
        assert!(mock.attach_events(sender).is_err());
        assert!(MockCoordinator::new().simulate_disconnect().is_err());
    }
}

//! Transport abstraction for the coordinator session
//!
//! The authenticated transport (connection, account log-on, framing and
//! encryption) lives outside this workspace. The session only needs the
//! operations below and an ordered stream of [`TransportEvent`]s.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::errors::CrystalysResult;
use crate::message::GcMessage;
use crate::types::{Credentials, EResult};

// ----------------------------------------------------------------------------
// Transport Events
// ----------------------------------------------------------------------------

/// Inbound notifications, delivered in transport order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Connection attempt finished
    Connected { result: EResult },
    /// Connection dropped or was closed
    Disconnected { user_initiated: bool },
    /// Account log-on finished
    LoggedOn { result: EResult },
    /// Message from the game coordinator
    GcMessage(GcMessage),
}

impl TransportEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TransportEvent::Connected { .. } => "Connected",
            TransportEvent::Disconnected { .. } => "Disconnected",
            TransportEvent::LoggedOn { .. } => "LoggedOn",
            TransportEvent::GcMessage(_) => "GcMessage",
        }
    }
}

pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;
pub type TransportEventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Create the channel a transport publishes its events on
pub fn create_event_channel() -> (TransportEventSender, TransportEventReceiver) {
    mpsc::unbounded_channel()
}

// ----------------------------------------------------------------------------
// Transport Trait
// ----------------------------------------------------------------------------

/// Authenticated messaging transport used by a coordinator session
///
/// Methods take `&self`: a session shares one transport between the handshake
/// driver, the reconnect supervisor and concurrent queries.
#[async_trait]
pub trait CoordinatorTransport: Send + Sync {
    /// Give the transport the sender for its event stream. Called once, before
    /// any other method.
    fn attach_events(&self, sender: TransportEventSender) -> CrystalysResult<()>;

    /// Open a connection; completion is reported as [`TransportEvent::Connected`]
    async fn connect(&self) -> CrystalysResult<()>;

    /// Close the connection
    async fn disconnect(&self) -> CrystalysResult<()>;

    /// Submit account log-on; completion is reported as [`TransportEvent::LoggedOn`]
    async fn log_on(&self, credentials: &Credentials) -> CrystalysResult<()>;

    /// Announce the applications this account is playing
    async fn send_games_played(&self, app_ids: &[u32]) -> CrystalysResult<()>;

    /// Send a message to the game coordinator of `app_id`
    async fn send_gc(&self, app_id: u32, message: GcMessage) -> CrystalysResult<()>;
}

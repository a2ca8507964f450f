//! Coordinator Session
//!
//! One authenticated connection to the game coordinator. The session owns the
//! transport's event stream through a spawned pump task, drives the handshake,
//! answers correlated queries and hands bulk transfers to the artifact
//! pipeline.
//!
//! Only the handshake driver and the reconnect supervisor call `connect`,
//! `log_on` and `disconnect` on the transport or move the session state.
//! Queries and artifact downloads only send GC messages and read replies.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crystalys_core::{
    msg_type, ArtifactKind, CoordinatorConfig, CoordinatorTransport, Credentials,
    CrystalysError, CrystalysResult, EResult, GcMessage, HandshakeEvent, MatchDetailsRequest,
    MatchDetailsResponse, MatchRecord, MetadataRecord, SessionState, StateTransitionError,
    TransportEvent, TransportEventReceiver, APP_ID,
};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::artifact::ArtifactPipeline;
use crate::correlation::{CorrelationEngine, CorrelationStats};
use crate::handshake;
use crate::supervisor;

// ----------------------------------------------------------------------------
// Lifecycle Events
// ----------------------------------------------------------------------------

/// Transport lifecycle notifications re-published by the event pump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Connected { result: EResult },
    LoggedOn { result: EResult },
    Disconnected { user_initiated: bool },
}

/// Resolve once the shutdown flag is set or its sender is gone
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        let stop = *shutdown.borrow_and_update();
        if stop || shutdown.changed().await.is_err() {
            return;
        }
    }
}

// ----------------------------------------------------------------------------
// Shared Session State
// ----------------------------------------------------------------------------

pub(crate) struct SessionInner {
    pub(crate) session_id: Uuid,
    pub(crate) config: CoordinatorConfig,
    pub(crate) transport: Arc<dyn CoordinatorTransport>,
    pub(crate) correlation: CorrelationEngine,
    pub(crate) pipeline: ArtifactPipeline,
    pub(crate) handshake_lock: tokio::sync::Mutex<()>,
    credentials: Mutex<Option<Credentials>>,
    state: watch::Sender<SessionState>,
    lifecycle: broadcast::Sender<LifecycleEvent>,
    shutdown: watch::Sender<bool>,
    disposed: AtomicBool,
}

impl SessionInner {
    pub(crate) fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Apply a handshake event atomically
    pub(crate) fn apply(&self, event: HandshakeEvent) -> CrystalysResult<SessionState> {
        let mut outcome: Result<SessionState, StateTransitionError> =
            Ok(SessionState::Disconnected);

        self.state.send_if_modified(|state| {
            match state.clone().transition(event.clone()) {
                Ok(next) => {
                    let changed = *state != next;
                    if changed {
                        debug!(
                            session_id = %self.session_id,
                            "State {} -> {} on {}",
                            state,
                            next,
                            event.name()
                        );
                    }
                    *state = next.clone();
                    outcome = Ok(next);
                    changed
                }
                Err(e) => {
                    outcome = Err(e);
                    false
                }
            }
        });

        outcome.map_err(|e| {
            warn!(session_id = %self.session_id, error = %e, "Rejected state transition");
            CrystalysError::from(e)
        })
    }

    /// Leave `Ready` after the connection dropped. Returns whether the session
    /// was ready.
    fn connection_lost(&self, reconnecting: bool) -> bool {
        self.state.send_if_modified(|state| {
            if !state.is_ready() {
                return false;
            }
            let event = HandshakeEvent::Disconnected { reconnecting };
            match state.clone().transition(event) {
                Ok(next) => {
                    *state = next;
                    true
                }
                Err(_) => false,
            }
        })
    }

    pub(crate) fn credentials(&self) -> Option<Credentials> {
        self.lock_credentials().clone()
    }

    fn lock_credentials(&self) -> MutexGuard<'_, Option<Credentials>> {
        self.credentials.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn subscribe_lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.lifecycle.subscribe()
    }

    pub(crate) fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn publish(&self, event: LifecycleEvent) {
        // No subscribers outside a handshake is normal
        let _ = self.lifecycle.send(event);
    }

    fn handle_event(&self, event: TransportEvent, reconnect: Option<&mpsc::UnboundedSender<()>>) {
        match event {
            TransportEvent::GcMessage(message) => {
                trace!(
                    session_id = %self.session_id,
                    msg_type = message.msg_type,
                    "Inbound {}",
                    message.name()
                );
                self.correlation.dispatch(message);
            }
            TransportEvent::Connected { result } => {
                self.publish(LifecycleEvent::Connected { result });
            }
            TransportEvent::LoggedOn { result } => {
                self.publish(LifecycleEvent::LoggedOn { result });
            }
            TransportEvent::Disconnected { user_initiated } => {
                let failed = self.correlation.fail_all(CrystalysError::NotConnected);
                let reconnecting = reconnect.is_some() && !user_initiated;

                if self.connection_lost(reconnecting) {
                    warn!(
                        session_id = %self.session_id,
                        user_initiated,
                        failed,
                        "Disconnected from coordinator"
                    );
                    if reconnecting {
                        if let Some(trigger) = reconnect {
                            let _ = trigger.send(());
                        }
                    }
                } else {
                    debug!(session_id = %self.session_id, user_initiated, "Transport disconnected");
                }

                self.publish(LifecycleEvent::Disconnected { user_initiated });
            }
        }
    }
}

/// Forward transport events until shutdown or until the transport closes its stream
async fn run_event_pump(
    inner: Arc<SessionInner>,
    mut events: TransportEventReceiver,
    reconnect: Option<mpsc::UnboundedSender<()>>,
) {
    let mut shutdown = inner.shutdown_receiver();
    debug!(session_id = %inner.session_id, "Event pump started");

    loop {
        let event = tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => break,
            event = events.recv() => event,
        };

        match event {
            Some(event) => inner.handle_event(event, reconnect.as_ref()),
            None => {
                debug!(session_id = %inner.session_id, "Transport event stream closed");
                break;
            }
        }
    }

    debug!(session_id = %inner.session_id, "Event pump stopped");
}

// ----------------------------------------------------------------------------
// Coordinator Session
// ----------------------------------------------------------------------------

#[derive(Default)]
struct SessionTasks {
    pump: Option<JoinHandle<()>>,
    supervisor: Option<JoinHandle<()>>,
}

impl SessionTasks {
    fn abort_all(&mut self) {
        if let Some(handle) = self.supervisor.take() {
            handle.abort();
        }
        if let Some(handle) = self.pump.take() {
            handle.abort();
        }
    }
}

/// A disposable client session with the game coordinator
///
/// All operations take `&self`; wrap the session in an `Arc` to share it
/// across tasks.
pub struct CoordinatorSession {
    inner: Arc<SessionInner>,
    tasks: Mutex<SessionTasks>,
}

impl CoordinatorSession {
    /// Create a session over `transport` and start its event pump (and the
    /// reconnect supervisor when enabled). Must be called inside a Tokio runtime.
    pub fn new(
        transport: Arc<dyn CoordinatorTransport>,
        config: CoordinatorConfig,
        pipeline: ArtifactPipeline,
    ) -> CrystalysResult<Self> {
        config.validate()?;

        let (event_sender, event_receiver) = crystalys_core::create_event_channel();
        transport.attach_events(event_sender)?;

        let (state, _) = watch::channel(SessionState::Disconnected);
        let (lifecycle, _) = broadcast::channel(config.session.lifecycle_buffer_size);
        let (shutdown, _) = watch::channel(false);
        let reconnect_enabled = config.reconnect.enabled;

        let inner = Arc::new(SessionInner {
            session_id: Uuid::new_v4(),
            config,
            transport,
            correlation: CorrelationEngine::new(),
            pipeline,
            handshake_lock: tokio::sync::Mutex::new(()),
            credentials: Mutex::new(None),
            state,
            lifecycle,
            shutdown,
            disposed: AtomicBool::new(false),
        });

        let mut tasks = SessionTasks::default();
        let reconnect = if reconnect_enabled {
            let (trigger, triggers) = mpsc::unbounded_channel();
            tasks.supervisor = Some(tokio::spawn(supervisor::run_reconnect_supervisor(
                inner.clone(),
                triggers,
            )));
            Some(trigger)
        } else {
            None
        };
        tasks.pump = Some(tokio::spawn(run_event_pump(
            inner.clone(),
            event_receiver,
            reconnect,
        )));

        info!(
            session_id = %inner.session_id,
            auto_reconnect = reconnect_enabled,
            "Created coordinator session"
        );

        Ok(Self {
            inner,
            tasks: Mutex::new(tasks),
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.inner.session_id
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Snapshot of the handshake state
    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    /// Watch handshake state changes
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Negotiated coordinator version while ready
    pub fn version(&self) -> Option<u32> {
        self.inner.state().version()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.state().is_ready()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    /// Number of correlated requests currently waiting for a reply
    pub fn pending_correlations(&self) -> usize {
        self.inner.correlation.pending_count()
    }

    pub fn correlation_stats(&self) -> CorrelationStats {
        self.inner.correlation.stats()
    }

    // ------------------------------------------------------------------------
    // Handshake
    // ------------------------------------------------------------------------

    /// Log on with a username and password and complete the coordinator
    /// handshake. Returns the coordinator version.
    pub async fn connect(&self, username: &str, password: &str) -> CrystalysResult<u32> {
        self.connect_with(Credentials::new(username, password)).await
    }

    /// Like [`connect`](Self::connect), with full credentials including a
    /// sentry token
    pub async fn connect_with(&self, credentials: Credentials) -> CrystalysResult<u32> {
        self.ensure_not_disposed()?;

        let _handshake = self.inner.handshake_lock.lock().await;
        self.ensure_not_disposed()?;

        if let Some(version) = self.inner.state().version() {
            debug!(session_id = %self.inner.session_id, version, "Already connected");
            return Ok(version);
        }

        *self.inner.lock_credentials() = Some(credentials.clone());
        handshake::drive(&self.inner, &credentials).await
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Fetch the match record for `match_id` from the coordinator
    pub async fn match_details(&self, match_id: u64) -> CrystalysResult<MatchRecord> {
        self.ensure_ready()?;
        let inner = &self.inner;

        let job = inner.correlation.next_job_id();
        let request = GcMessage::new(&MatchDetailsRequest { match_id })?.with_source_job(job);
        debug!(session_id = %inner.session_id, match_id, %job, "Requesting match details");

        let reply = inner
            .correlation
            .await_job_reply(
                msg_type::MATCH_DETAILS_RESPONSE,
                job,
                || inner.transport.send_gc(APP_ID, request),
                inner.config.session.query_timeout(),
            )
            .await?;

        let response: MatchDetailsResponse = reply.decode()?;
        match response.match_record {
            Some(record) if record.match_id == match_id => Ok(record),
            _ => {
                debug!(
                    session_id = %inner.session_id,
                    match_id,
                    result = response.result,
                    "Match not found"
                );
                Err(CrystalysError::MatchNotFound {
                    match_id,
                    result: response.result,
                })
            }
        }
    }

    // ------------------------------------------------------------------------
    // Artifacts
    // ------------------------------------------------------------------------

    /// Look up a match and download its decompressed replay
    pub async fn download_replay(&self, match_id: u64) -> CrystalysResult<Vec<u8>> {
        let record = self.match_details(match_id).await?;
        self.download_artifact(&record, ArtifactKind::Replay).await
    }

    /// Look up a match and download its decoded metadata
    pub async fn download_metadata(&self, match_id: u64) -> CrystalysResult<MetadataRecord> {
        let record = self.match_details(match_id).await?;
        self.ensure_not_disposed()?;
        self.inner.pipeline.download_metadata(&record).await
    }

    /// Download one artifact for a record obtained earlier
    pub async fn download_artifact(
        &self,
        record: &MatchRecord,
        kind: ArtifactKind,
    ) -> CrystalysResult<Vec<u8>> {
        self.ensure_not_disposed()?;
        self.inner.pipeline.download(record, kind).await
    }

    /// URL of one artifact for a record
    pub fn artifact_url(&self, record: &MatchRecord, kind: ArtifactKind) -> String {
        self.inner.pipeline.url_for(record, kind)
    }

    // ------------------------------------------------------------------------
    // Disposal
    // ------------------------------------------------------------------------

    /// Stop the session: fail pending calls with `Disposed`, stop background
    /// tasks and disconnect the transport. Idempotent.
    pub async fn dispose(&self) -> CrystalysResult<()> {
        if !self.begin_dispose() {
            return Ok(());
        }
        info!(session_id = %self.inner.session_id, "Disposing coordinator session");

        if let Err(e) = self.inner.transport.disconnect().await {
            warn!(session_id = %self.inner.session_id, error = %e, "Transport disconnect failed");
        }

        let _ = self
            .inner
            .apply(HandshakeEvent::Disconnected { reconnecting: false });
        Ok(())
    }

    /// Synchronous part of disposal. Returns false if already disposed.
    fn begin_dispose(&self) -> bool {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return false;
        }

        self.inner.shutdown.send_replace(true);
        self.inner.correlation.fail_all(CrystalysError::Disposed);
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .abort_all();
        true
    }

    fn ensure_not_disposed(&self) -> CrystalysResult<()> {
        if self.inner.is_disposed() {
            return Err(CrystalysError::Disposed);
        }
        Ok(())
    }

    fn ensure_ready(&self) -> CrystalysResult<()> {
        self.ensure_not_disposed()?;
        if !self.inner.state().is_ready() {
            return Err(CrystalysError::NotConnected);
        }
        Ok(())
    }
}

impl Drop for CoordinatorSession {
    fn drop(&mut self) {
        if self.begin_dispose() {
            debug!(session_id = %self.inner.session_id, "Session dropped without dispose");
        }
    }
}

impl std::fmt::Debug for CoordinatorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorSession")
            .field("session_id", &self.inner.session_id)
            .field("state", &self.inner.state())
            .field("disposed", &self.inner.is_disposed())
            .finish()
    }
}

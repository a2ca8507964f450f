//! Request/Response Correlation Engine
//!
//! Callers arm a listener for an expected discriminator, send their request,
//! and suspend until a matching inbound message arrives or the deadline
//! passes. The event pump feeds every inbound GC message through
//! [`CorrelationEngine::dispatch`].
//!
//! Invariants:
//! - A listener is armed before its request is sent.
//! - A message resolves at most one listener; listeners are tried in
//!   registration order.
//! - A listener is resolved exactly once and removed on every exit path.
//! - Requests expecting the same discriminator run one at a time.
//! - A call that was still queued behind the gate when [`fail_all`] ran
//!   fails with the same error and never sends.
//!
//! [`fail_all`]: CorrelationEngine::fail_all

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crystalys_core::{msg_type, CrystalysError, CrystalysResult, GcMessage, JobId};
use tokio::sync::oneshot;
use tokio::time::{timeout_at, Duration, Instant};
use tracing::{debug, trace};

type Predicate = Box<dyn Fn(&GcMessage) -> bool + Send>;
type Slot = oneshot::Sender<CrystalysResult<GcMessage>>;

// ----------------------------------------------------------------------------
// Listener Registry
// ----------------------------------------------------------------------------

/// One outstanding await
struct Listener {
    msg_type: u32,
    matches: Predicate,
    slot: Slot,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: BTreeMap<u64, Listener>,
    /// Bumped by every `fail_all`
    generation: u64,
    last_failure: Option<CrystalysError>,
}

/// Counters for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrelationStats {
    pub delivered: u64,
    pub unmatched: u64,
    pub timed_out: u64,
    pub cancelled: u64,
}

#[derive(Default)]
struct StatCounters {
    delivered: AtomicU64,
    unmatched: AtomicU64,
    timed_out: AtomicU64,
    cancelled: AtomicU64,
}

// ----------------------------------------------------------------------------
// Correlation Engine
// ----------------------------------------------------------------------------

pub struct CorrelationEngine {
    registry: Mutex<Registry>,
    gates: Mutex<HashMap<u32, Arc<tokio::sync::Mutex<()>>>>,
    next_job: AtomicU64,
    stats: StatCounters,
}

impl Default for CorrelationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationEngine {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            gates: Mutex::new(HashMap::new()),
            next_job: AtomicU64::new(1),
            stats: StatCounters::default(),
        }
    }

    /// Allocate a fresh request job id
    pub fn next_job_id(&self) -> JobId {
        JobId(self.next_job.fetch_add(1, Ordering::Relaxed))
    }

    /// Arm a listener for `msg_type`, run `send`, and wait for the first
    /// message of that type accepted by `matches`
    pub async fn await_reply<M, S, F>(
        &self,
        msg_type: u32,
        matches: M,
        send: S,
        timeout: Duration,
    ) -> CrystalysResult<GcMessage>
    where
        M: Fn(&GcMessage) -> bool + Send + 'static,
        S: FnOnce() -> F,
        F: Future<Output = CrystalysResult<()>>,
    {
        let deadline = Instant::now() + timeout;
        let operation = format!("awaiting {}", msg_type::name(msg_type));
        let generation = self.lock_registry().generation;

        // The gate wait counts against the caller's deadline
        let gate = self.gate(msg_type);
        let _permit = match timeout_at(deadline, gate.lock_owned()).await {
            Ok(permit) => permit,
            Err(_) => {
                self.stats.timed_out.fetch_add(1, Ordering::Relaxed);
                return Err(CrystalysError::timeout(operation, timeout));
            }
        };

        let (slot, reply) = oneshot::channel();
        let mut guard = self.register(msg_type, Box::new(matches), slot, generation)?;

        send().await?;

        match timeout_at(deadline, reply).await {
            Ok(Ok(result)) => {
                guard.disarm();
                result
            }
            // Slot dropped without a value; only happens when the engine is torn down
            Ok(Err(_)) => {
                guard.disarm();
                Err(CrystalysError::Disposed)
            }
            Err(_) => {
                guard.disarm();
                if self.remove(guard.id) {
                    self.stats.timed_out.fetch_add(1, Ordering::Relaxed);
                }
                debug!(msg_type, "{} timed out after {:?}", operation, timeout);
                Err(CrystalysError::timeout(operation, timeout))
            }
        }
    }

    /// Await a reply routed to `job`. Replies without a target job are also
    /// accepted, for coordinators that do not echo job ids.
    pub async fn await_job_reply<S, F>(
        &self,
        msg_type: u32,
        job: JobId,
        send: S,
        timeout: Duration,
    ) -> CrystalysResult<GcMessage>
    where
        S: FnOnce() -> F,
        F: Future<Output = CrystalysResult<()>>,
    {
        let matches = move |message: &GcMessage| match message.target_job_id {
            Some(target) => target == job,
            None => true,
        };
        self.await_reply(msg_type, matches, send, timeout).await
    }

    /// Await the next message of `msg_type`
    pub async fn await_message<S, F>(
        &self,
        msg_type: u32,
        send: S,
        timeout: Duration,
    ) -> CrystalysResult<GcMessage>
    where
        S: FnOnce() -> F,
        F: Future<Output = CrystalysResult<()>>,
    {
        self.await_reply(msg_type, |_| true, send, timeout).await
    }

    /// Deliver an inbound message to the first matching listener.
    /// Returns whether a listener took it.
    pub fn dispatch(&self, message: GcMessage) -> bool {
        let mut registry = self.lock_registry();
        let mut message = message;

        loop {
            let found = registry
                .listeners
                .iter()
                .find(|(_, listener)| {
                    listener.msg_type == message.msg_type && (listener.matches)(&message)
                })
                .map(|(id, _)| *id);

            let listener = match found.and_then(|id| registry.listeners.remove(&id)) {
                Some(listener) => listener,
                None => {
                    self.stats.unmatched.fetch_add(1, Ordering::Relaxed);
                    trace!(
                        msg_type = message.msg_type,
                        target_job = ?message.target_job_id,
                        "Dropping unmatched {}",
                        message.name()
                    );
                    return false;
                }
            };

            match listener.slot.send(Ok(message)) {
                Ok(()) => {
                    self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                    return true;
                }
                // Receiver went away between matching and delivery; try the next one
                Err(Ok(returned)) => message = returned,
                Err(Err(_)) => return false,
            }
        }
    }

    /// Resolve every pending listener with `error`. Returns how many were failed.
    pub fn fail_all(&self, error: CrystalysError) -> usize {
        let drained = {
            let mut registry = self.lock_registry();
            registry.generation += 1;
            registry.last_failure = Some(error.clone());
            std::mem::take(&mut registry.listeners)
        };
        let count = drained.len();

        for (_, listener) in drained {
            let _ = listener.slot.send(Err(error.clone()));
        }

        if count > 0 {
            debug!(count, error = %error, "Failed pending correlations");
        }
        count
    }

    /// Number of armed listeners
    pub fn pending_count(&self) -> usize {
        self.lock_registry().listeners.len()
    }

    pub fn stats(&self) -> CorrelationStats {
        CorrelationStats {
            delivered: self.stats.delivered.load(Ordering::Relaxed),
            unmatched: self.stats.unmatched.load(Ordering::Relaxed),
            timed_out: self.stats.timed_out.load(Ordering::Relaxed),
            cancelled: self.stats.cancelled.load(Ordering::Relaxed),
        }
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn lock_registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn gate(&self, msg_type: u32) -> Arc<tokio::sync::Mutex<()>> {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        gates.entry(msg_type).or_default().clone()
    }

    /// Arm a listener unless `fail_all` ran since `generation` was read
    fn register(
        &self,
        msg_type: u32,
        matches: Predicate,
        slot: Slot,
        generation: u64,
    ) -> CrystalysResult<ListenerGuard<'_>> {
        let mut registry = self.lock_registry();
        if registry.generation != generation {
            self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
            let error = registry
                .last_failure
                .clone()
                .unwrap_or(CrystalysError::Disposed);
            debug!(msg_type, error = %error, "Queued request failed before sending");
            return Err(error);
        }

        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.insert(
            id,
            Listener {
                msg_type,
                matches,
                slot,
            },
        );
        trace!(listener = id, msg_type, "Armed listener");

        Ok(ListenerGuard {
            engine: self,
            id,
            armed: true,
        })
    }

    fn remove(&self, id: u64) -> bool {
        self.lock_registry().listeners.remove(&id).is_some()
    }
}

// ----------------------------------------------------------------------------
// Listener Guard
// ----------------------------------------------------------------------------

/// Removes its listener when the awaiting call exits early
struct ListenerGuard<'a> {
    engine: &'a CorrelationEngine,
    id: u64,
    armed: bool,
}

impl ListenerGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ListenerGuard<'_> {
    fn drop(&mut self) {
        if self.armed && self.engine.remove(self.id) {
            self.engine.stats.cancelled.fetch_add(1, Ordering::Relaxed);
            trace!(listener = self.id, "Released listener");
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crystalys_core::{ClientWelcome, MatchDetailsResponse, TransportError};

    fn welcome(version: u32) -> GcMessage {
        GcMessage::new(&ClientWelcome { version }).unwrap()
    }

    fn response(job: Option<JobId>) -> GcMessage {
        let message = GcMessage::new(&MatchDetailsResponse {
            result: 1,
            match_record: None,
        })
        .unwrap();
        match job {
            Some(job) => message.reply_to(job),
            None => message,
        }
    }

    #[tokio::test]
    async fn test_reply_resolves_armed_listener() {
        let engine = Arc::new(CorrelationEngine::new());

        let dispatcher = engine.clone();
        let reply = engine
            .await_message(
                msg_type::CLIENT_WELCOME,
                || async move {
                    // Listener is armed before send runs
                    assert_eq!(dispatcher.pending_count(), 1);
                    assert!(dispatcher.dispatch(welcome(9)));
                    Ok(())
                },
                Duration::from_millis(200),
            )
            .await
            .unwrap();

        assert_eq!(reply.decode::<ClientWelcome>().unwrap().version, 9);
        assert_eq!(engine.pending_count(), 0);
        assert_eq!(engine.stats().delivered, 1);
    }

    #[tokio::test]
    async fn test_other_discriminator_does_not_resolve() {
        let engine = CorrelationEngine::new();

        let result = engine
            .await_message(
                msg_type::MATCH_DETAILS_RESPONSE,
                || async {
                    assert!(!engine.dispatch(welcome(1)));
                    Ok(())
                },
                Duration::from_millis(50),
            )
            .await;

        assert!(matches!(result, Err(CrystalysError::Timeout { .. })));
        assert_eq!(engine.pending_count(), 0);
        let stats = engine.stats();
        assert_eq!(stats.unmatched, 1);
        assert_eq!(stats.timed_out, 1);
    }

    #[tokio::test]
    async fn test_send_failure_releases_listener() {
        let engine = CorrelationEngine::new();

        let result = engine
            .await_message(
                msg_type::CLIENT_WELCOME,
                || async {
                    Err(CrystalysError::Transport(TransportError::SendFailed {
                        reason: "offline".to_string(),
                    }))
                },
                Duration::from_millis(50),
            )
            .await;

        assert!(matches!(result, Err(CrystalysError::Transport(_))));
        assert_eq!(engine.pending_count(), 0);
        assert_eq!(engine.stats().cancelled, 1);
    }

    #[tokio::test]
    async fn test_job_reply_ignores_other_jobs() {
        let engine = CorrelationEngine::new();
        let job = engine.next_job_id();
        let stale = JobId(job.0 + 100);

        let reply = engine
            .await_job_reply(
                msg_type::MATCH_DETAILS_RESPONSE,
                job,
                || async {
                    assert!(!engine.dispatch(response(Some(stale))));
                    assert!(engine.dispatch(response(Some(job))));
                    Ok(())
                },
                Duration::from_millis(200),
            )
            .await
            .unwrap();

        assert_eq!(reply.target_job_id, Some(job));

        // Untagged replies are accepted
        let job = engine.next_job_id();
        let reply = engine
            .await_job_reply(
                msg_type::MATCH_DETAILS_RESPONSE,
                job,
                || async {
                    assert!(engine.dispatch(response(None)));
                    Ok(())
                },
                Duration::from_millis(200),
            )
            .await
            .unwrap();
        assert_eq!(reply.target_job_id, None);
    }

    #[tokio::test]
    async fn test_fail_all_resolves_pending() {
        let engine = Arc::new(CorrelationEngine::new());

        let waiter = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .await_message(
                        msg_type::CLIENT_WELCOME,
                        || async { Ok(()) },
                        Duration::from_secs(5),
                    )
                    .await
            })
        };

        while engine.pending_count() == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(engine.fail_all(CrystalysError::Disposed), 1);

        let result = waiter.await.unwrap();
        assert_eq!(result, Err(CrystalysError::Disposed));
        assert_eq!(engine.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_fail_all_reaches_queued_caller() {
        let engine = Arc::new(CorrelationEngine::new());
        let sends = Arc::new(AtomicU64::new(0));

        let spawn_waiter = |engine: Arc<CorrelationEngine>, sends: Arc<AtomicU64>| {
            tokio::spawn(async move {
                engine
                    .await_message(
                        msg_type::MATCH_DETAILS_RESPONSE,
                        || async move {
                            sends.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        },
                        Duration::from_secs(5),
                    )
                    .await
            })
        };

        let first = spawn_waiter(engine.clone(), sends.clone());
        while engine.pending_count() == 0 {
            tokio::task::yield_now().await;
        }
        // Second caller queues behind the gate without arming a listener
        let second = spawn_waiter(engine.clone(), sends.clone());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(engine.pending_count(), 1);

        assert_eq!(engine.fail_all(CrystalysError::NotConnected), 1);

        let first = tokio::time::timeout(Duration::from_secs(1), first).await;
        let second = tokio::time::timeout(Duration::from_secs(1), second).await;
        assert_eq!(first.unwrap().unwrap(), Err(CrystalysError::NotConnected));
        assert_eq!(second.unwrap().unwrap(), Err(CrystalysError::NotConnected));
        assert_eq!(sends.load(Ordering::SeqCst), 1);
        assert_eq!(engine.pending_count(), 0);

        // Calls started after the failure are unaffected
        let dispatcher = engine.clone();
        let reply = engine
            .await_message(
                msg_type::CLIENT_WELCOME,
                || async move {
                    dispatcher.dispatch(welcome(3));
                    Ok(())
                },
                Duration::from_millis(200),
            )
            .await;
        assert!(reply.is_ok());
    }

    #[tokio::test]
    async fn test_dropped_caller_releases_listener() {
        let engine = CorrelationEngine::new();

        let pending = engine.await_message(
            msg_type::CLIENT_WELCOME,
            || async { Ok(()) },
            Duration::from_secs(5),
        );
        let outcome = tokio::time::timeout(Duration::from_millis(20), pending).await;

        assert!(outcome.is_err());
        assert_eq!(engine.pending_count(), 0);
        assert_eq!(engine.stats().cancelled, 1);
    }

    #[test]
    fn test_job_ids_increase() {
        let engine = CorrelationEngine::new();
        let first = engine.next_job_id();
        let second = engine.next_job_id();
        assert!(second > first);
    }
}

//! Reconnect Supervisor
//!
//! Spawned per session when auto-reconnect is enabled. The event pump signals
//! it when a ready session loses its connection; it then waits the configured
//! back-off and re-drives the full handshake with the stored credentials,
//! until one attempt succeeds, the attempt budget runs out, or the session is
//! disposed.

use std::sync::Arc;

use crystalys_core::{CrystalysError, ReconnectConfig};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

use crate::handshake;
use crate::session::{wait_for_shutdown, SessionInner};

// ----------------------------------------------------------------------------
// Reconnect Policy
// ----------------------------------------------------------------------------

/// Fixed-delay reconnect schedule with an optional attempt budget
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    delay: Duration,
    max_attempts: Option<u32>,
    attempt_count: u32,
}

impl ReconnectPolicy {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            delay: config.delay(),
            max_attempts: config.max_attempts,
            attempt_count: 0,
        }
    }

    /// Delay before the next attempt, or `None` once the budget is spent
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max_attempts) = self.max_attempts {
            if self.attempt_count >= max_attempts {
                return None;
            }
        }

        self.attempt_count += 1;
        Some(self.delay)
    }

    /// Reset after a successful handshake
    pub fn reset(&mut self) {
        self.attempt_count = 0;
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }
}

// ----------------------------------------------------------------------------
// Supervisor Task
// ----------------------------------------------------------------------------

pub(crate) async fn run_reconnect_supervisor(
    inner: Arc<SessionInner>,
    mut triggers: mpsc::UnboundedReceiver<()>,
) {
    let mut policy = ReconnectPolicy::new(&inner.config.reconnect);
    let mut shutdown = inner.shutdown_receiver();
    debug!(session_id = %inner.session_id, "Reconnect supervisor started");

    loop {
        let trigger = tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => None,
            trigger = triggers.recv() => trigger,
        };
        if trigger.is_none() {
            break;
        }

        policy.reset();
        reconnect(&inner, &mut policy, &mut shutdown).await;
    }

    debug!(session_id = %inner.session_id, "Reconnect supervisor stopped");
}

async fn reconnect(
    inner: &SessionInner,
    policy: &mut ReconnectPolicy,
    shutdown: &mut watch::Receiver<bool>,
) {
    while let Some(delay) = policy.next_delay() {
        let attempt = policy.attempt_count();
        info!(
            session_id = %inner.session_id,
            attempt,
            "Reconnecting in {:?}",
            delay
        );

        let stopped = tokio::select! {
            _ = wait_for_shutdown(shutdown) => true,
            _ = sleep(delay) => false,
        };
        if stopped {
            return;
        }

        let credentials = match inner.credentials() {
            Some(credentials) => credentials,
            None => {
                warn!(session_id = %inner.session_id, "No stored credentials, cannot reconnect");
                return;
            }
        };

        let _handshake = inner.handshake_lock.lock().await;
        if inner.is_disposed() {
            return;
        }
        if inner.state().is_ready() {
            debug!(session_id = %inner.session_id, "Session already reconnected");
            return;
        }

        match handshake::drive(inner, &credentials).await {
            Ok(version) => {
                info!(session_id = %inner.session_id, attempt, version, "Reconnected");
                return;
            }
            Err(CrystalysError::Disposed) => return,
            Err(e) => {
                warn!(session_id = %inner.session_id, attempt, error = %e, "Reconnect attempt failed");
            }
        }
    }

    error!(
        session_id = %inner.session_id,
        attempts = policy.attempt_count(),
        "Giving up on reconnect"
    );
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_policy() {
        let config = ReconnectConfig {
            enabled: true,
            delay_ms: 100,
            max_attempts: Some(3),
        };
        let mut policy = ReconnectPolicy::new(&config);

        for attempt in 1..=3 {
            assert_eq!(policy.next_delay(), Some(Duration::from_millis(100)));
            assert_eq!(policy.attempt_count(), attempt);
        }

        // Should be exhausted now
        assert_eq!(policy.next_delay(), None);
    }

    #[test]
    fn test_reconnect_policy_reset() {
        let mut policy = ReconnectPolicy::new(&ReconnectConfig::default());

        policy.next_delay();
        policy.next_delay();
        assert_eq!(policy.attempt_count(), 2);

        policy.reset();
        assert_eq!(policy.attempt_count(), 0);
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_unlimited_attempts() {
        let mut policy = ReconnectPolicy::new(&ReconnectConfig {
            enabled: true,
            delay_ms: 1,
            max_attempts: None,
        });
        for _ in 0..1000 {
            assert!(policy.next_delay().is_some());
        }
    }
}

//! Handshake Driver
//!
//! Runs one connect → log on → announce activity → hello/welcome attempt
//! against the transport, moving the session through the
//! [`SessionState`](crystalys_core::SessionState) machine as lifecycle events
//! arrive. The whole attempt shares one deadline.

use crystalys_core::{
    msg_type, ClientHello, ClientWelcome, Credentials, CrystalysError, CrystalysResult,
    GcMessage, HandshakeEvent, LoginDenial, SessionState, APP_ID, ENGINE,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::session::{wait_for_shutdown, LifecycleEvent, SessionInner};

const DISCONNECTED_DURING_HANDSHAKE: &str = "disconnected during handshake";

/// Drive one full handshake attempt. On failure the session is left in
/// `Failed` and the transport is not torn down.
pub(crate) async fn drive(inner: &SessionInner, credentials: &Credentials) -> CrystalysResult<u32> {
    let handshake_timeout = inner.config.session.handshake_timeout();
    let deadline = Instant::now() + handshake_timeout;
    let mut shutdown = inner.shutdown_receiver();

    let attempt = async {
        tokio::select! {
            result = run_steps(inner, credentials, deadline) => result,
            _ = wait_for_shutdown(&mut shutdown) => Err(CrystalysError::Disposed),
        }
    };

    let result = match timeout_at(deadline, attempt).await {
        Ok(Ok(version)) => Ok(version),
        Ok(Err(CrystalysError::Timeout { .. })) | Err(_) => {
            Err(CrystalysError::handshake_timeout(handshake_timeout))
        }
        Ok(Err(CrystalysError::NotConnected)) => {
            Err(CrystalysError::connect_failed(DISCONNECTED_DURING_HANDSHAKE))
        }
        Ok(Err(other)) => Err(other),
    };

    match &result {
        Ok(version) => info!(session_id = %inner.session_id, version, "Coordinator session ready"),
        Err(CrystalysError::Disposed) => {
            debug!(session_id = %inner.session_id, "Handshake abandoned on dispose")
        }
        Err(e) => {
            warn!(session_id = %inner.session_id, error = %e, "Handshake failed");
            let _ = inner.apply(HandshakeEvent::Fail {
                reason: e.to_string(),
            });
        }
    }

    result
}

async fn run_steps(
    inner: &SessionInner,
    credentials: &Credentials,
    deadline: Instant,
) -> CrystalysResult<u32> {
    // Subscribe before connecting so the Connected event cannot be missed
    let mut lifecycle = inner.subscribe_lifecycle();

    // The reconnect supervisor may already have moved the session to Connecting
    if inner.state() != SessionState::Connecting {
        inner.apply(HandshakeEvent::Connect)?;
    }
    debug!(session_id = %inner.session_id, username = %credentials.username, "Connecting");
    inner
        .transport
        .connect()
        .await
        .map_err(|e| CrystalysError::connect_failed(e.to_string()))?;

    loop {
        let event = match lifecycle.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Handshake lagged behind lifecycle events");
                continue;
            }
            Err(RecvError::Closed) => return Err(CrystalysError::Disposed),
        };

        match event {
            LifecycleEvent::Connected { result } if result.is_ok() => {
                inner.apply(HandshakeEvent::Connected)?;
                debug!(session_id = %inner.session_id, "Connected, logging on");
                inner.transport.log_on(credentials).await?;
            }
            LifecycleEvent::Connected { result } => {
                return Err(CrystalysError::connect_failed(result.name()));
            }
            LifecycleEvent::LoggedOn { result } => match LoginDenial::from_result(result) {
                None => break,
                Some(denial) => return Err(CrystalysError::LoginDenied(denial)),
            },
            LifecycleEvent::Disconnected { .. } => {
                return Err(CrystalysError::connect_failed(DISCONNECTED_DURING_HANDSHAKE));
            }
        }
    }

    inner.apply(HandshakeEvent::LoggedOn)?;
    debug!(session_id = %inner.session_id, "Logged on, announcing activity");
    inner.transport.send_games_played(&[APP_ID]).await?;
    sleep(inner.config.session.settle_delay()).await;
    inner.apply(HandshakeEvent::ActivityAnnounced)?;

    let hello = GcMessage::new(&ClientHello {
        engine: ENGINE,
        version: 0,
    })?;
    let remaining = deadline.saturating_duration_since(Instant::now());
    let reply = inner
        .correlation
        .await_message(
            msg_type::CLIENT_WELCOME,
            || inner.transport.send_gc(APP_ID, hello),
            remaining,
        )
        .await?;

    let welcome: ClientWelcome = reply.decode()?;
    inner.apply(HandshakeEvent::Welcome {
        version: welcome.version,
    })?;
    Ok(welcome.version)
}

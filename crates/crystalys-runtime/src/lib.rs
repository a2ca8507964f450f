//! Crystalys Runtime
//!
//! The coordinator session engine. A [`CoordinatorSession`] owns one
//! transport's event stream and runs:
//!
//! - **Event pump**: routes GC messages to the correlation engine and
//!   re-publishes lifecycle events
//! - **Handshake driver**: connect, log on, announce activity, hello/welcome
//! - **Correlation engine**: listener registry matching replies to requests
//! - **Reconnect supervisor**: re-drives the handshake after a drop
//! - **Artifact pipeline**: locate, fetch, decompress and decode artifacts
//!
//! Sessions are explicit values; several can coexist and each is torn down by
//! [`CoordinatorSession::dispose`] or on drop.

pub mod artifact;
pub mod builder;
pub mod correlation;
mod handshake;
pub mod session;
pub mod supervisor;

pub use artifact::ArtifactPipeline;
pub use builder::SessionBuilder;
pub use correlation::{CorrelationEngine, CorrelationStats};
pub use session::{CoordinatorSession, LifecycleEvent};
pub use supervisor::ReconnectPolicy;

// Re-export the core types callers need alongside a session
pub use crystalys_core::{
    ArtifactKind, CoordinatorConfig, Credentials, CrystalysError, CrystalysResult,
    HandshakeEvent, LoginDenial, MatchRecord, MetadataRecord, SessionState,
};

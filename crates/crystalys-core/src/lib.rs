//! Crystalys Core
//!
//! Foundational types for talking to the Dota 2 game coordinator: the match and
//! metadata records, the GC message envelope with its discriminators, the error
//! taxonomy, configuration, and the collaborator traits (transport, blob store,
//! codec) that the runtime drives.
//!
//! Nothing in this crate spawns tasks or owns connections. The session engine
//! lives in `crystalys-runtime`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod artifact;
pub mod blob;
pub mod codec;
pub mod config;
pub mod errors;
pub mod message;
pub mod metadata;
pub mod state;
pub mod transport;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use artifact::{artifact_url, ArtifactKind, ArtifactReference};
pub use blob::{BlobError, BlobStore};
#[cfg(feature = "http")]
pub use blob::HttpBlobStore;
pub use codec::{decode, encode, Bzip2Codec, Codec};
pub use config::{ArtifactConfig, CoordinatorConfig, ReconnectConfig, SessionConfig};
pub use errors::{
    CrystalysError, CrystalysResult, LoginDenial, StateTransitionError, TransportError,
};
pub use message::{
    msg_type, ClientHello, ClientWelcome, GcBody, GcMessage, MatchDetailsRequest,
    MatchDetailsResponse,
};
pub use metadata::{MetadataFile, MetadataPlayer, MetadataRecord, MetadataTeam};
pub use state::{HandshakeEvent, SessionState};
pub use transport::{
    create_event_channel, CoordinatorTransport, TransportEvent, TransportEventReceiver,
    TransportEventSender,
};
pub use types::{
    Credentials, EResult, JobId, MatchRecord, ReplayState, SourceEngine, APP_ID, ENGINE,
};

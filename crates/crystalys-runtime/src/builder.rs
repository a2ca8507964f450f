//! Session Builder API
//!
//! Builder-style construction for consumers (CLI, services, tests): pick the
//! transport, configuration and artifact collaborators, then start the
//! session.

use std::sync::Arc;

use crystalys_core::{
    BlobStore, Bzip2Codec, Codec, CoordinatorConfig, CoordinatorTransport, CrystalysResult,
};

#[cfg(not(feature = "http"))]
use crystalys_core::CrystalysError;

use crate::artifact::ArtifactPipeline;
use crate::session::CoordinatorSession;

// ----------------------------------------------------------------------------
// Session Builder
// ----------------------------------------------------------------------------

/// Builder for a [`CoordinatorSession`]
pub struct SessionBuilder {
    transport: Arc<dyn CoordinatorTransport>,
    config: CoordinatorConfig,
    blob_store: Option<Arc<dyn BlobStore>>,
    codec: Arc<dyn Codec>,
}

impl SessionBuilder {
    /// Create a builder over the given transport
    pub fn new(transport: Arc<dyn CoordinatorTransport>) -> Self {
        Self {
            transport,
            config: CoordinatorConfig::default(),
            blob_store: None,
            codec: Arc::new(Bzip2Codec),
        }
    }

    /// Set the coordinator configuration
    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom blob store for artifact transfers
    pub fn with_blob_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.blob_store = Some(store);
        self
    }

    /// Use a custom artifact codec
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    /// Enable/disable automatic reconnect after a drop
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.config.reconnect.enabled = enabled;
        self
    }

    /// Build the session and start its background tasks
    pub fn build(self) -> CrystalysResult<CoordinatorSession> {
        let store = match self.blob_store {
            Some(store) => store,
            None => default_blob_store(&self.config)?,
        };
        let pipeline = ArtifactPipeline::new(store, self.codec, self.config.artifacts.clone());

        CoordinatorSession::new(self.transport, self.config, pipeline)
    }
}

#[cfg(feature = "http")]
fn default_blob_store(config: &CoordinatorConfig) -> CrystalysResult<Arc<dyn BlobStore>> {
    let store = crystalys_core::HttpBlobStore::new(config.artifacts.fetch_timeout())?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "http"))]
fn default_blob_store(_config: &CoordinatorConfig) -> CrystalysResult<Arc<dyn BlobStore>> {
    Err(CrystalysError::config_error(
        "No blob store configured and the `http` feature is disabled",
    ))
}

//! Artifact Retrieval Pipeline
//!
//! Locate → fetch → decompress → (optionally) decode. Failures map onto
//! `ArtifactUnavailable` for the transfer and `CorruptArtifact` for everything
//! after it. The pipeline never touches session state.

use std::sync::Arc;

use crystalys_core::{
    artifact_url, ArtifactConfig, ArtifactKind, BlobStore, Codec, CrystalysError,
    CrystalysResult, MatchRecord, MetadataRecord,
};
use tokio::time::timeout;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct ArtifactPipeline {
    store: Arc<dyn BlobStore>,
    codec: Arc<dyn Codec>,
    config: ArtifactConfig,
}

impl ArtifactPipeline {
    pub fn new(store: Arc<dyn BlobStore>, codec: Arc<dyn Codec>, config: ArtifactConfig) -> Self {
        Self {
            store,
            codec,
            config,
        }
    }

    pub fn config(&self) -> &ArtifactConfig {
        &self.config
    }

    /// URL the pipeline would fetch for this record and kind
    pub fn url_for(&self, record: &MatchRecord, kind: ArtifactKind) -> String {
        artifact_url(record, kind, &self.config)
    }

    /// Fetch and decompress one artifact
    pub async fn download(
        &self,
        record: &MatchRecord,
        kind: ArtifactKind,
    ) -> CrystalysResult<Vec<u8>> {
        let url = self.url_for(record, kind);
        let fetch_timeout = self.config.fetch_timeout();

        let compressed = match timeout(fetch_timeout, self.store.fetch(&url)).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                warn!(url = %url, error = %e, "Artifact fetch failed");
                return Err(CrystalysError::artifact_unavailable(url, e.to_string()));
            }
            Err(_) => {
                warn!(url = %url, "Artifact fetch timed out after {:?}", fetch_timeout);
                return Err(CrystalysError::artifact_unavailable(
                    url,
                    format!("transfer timed out after {}s", fetch_timeout.as_secs()),
                ));
            }
        };

        let codec = self.codec.clone();
        let decompressed = tokio::task::spawn_blocking(move || codec.decompress(&compressed))
            .await
            .map_err(|e| CrystalysError::corrupt_artifact(format!("decompress task: {}", e)))??;

        debug!(
            match_id = record.match_id,
            kind = %kind,
            bytes = decompressed.len(),
            "Downloaded artifact"
        );
        Ok(decompressed)
    }

    /// Fetch, decompress and decode the metadata artifact
    pub async fn download_metadata(&self, record: &MatchRecord) -> CrystalysResult<MetadataRecord> {
        let bytes = self.download(record, ArtifactKind::Metadata).await?;
        self.codec.decode_metadata(&bytes)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crystalys_core::{BlobError, Bzip2Codec};
    use tokio::time::Duration;

    struct StaticStore(Result<Vec<u8>, BlobError>);

    #[async_trait]
    impl BlobStore for StaticStore {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>, BlobError> {
            self.0.clone()
        }
    }

    struct StalledStore;

    #[async_trait]
    impl BlobStore for StalledStore {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>, BlobError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    fn pipeline(store: impl BlobStore + 'static) -> ArtifactPipeline {
        ArtifactPipeline::new(
            Arc::new(store),
            Arc::new(Bzip2Codec),
            ArtifactConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_fetch_error_is_unavailable() {
        let pipeline = pipeline(StaticStore(Err(BlobError::NotFound)));
        let record = MatchRecord::locator(10, 1, 2);

        let err = pipeline
            .download(&record, ArtifactKind::Replay)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CrystalysError::ArtifactUnavailable {
                url: "http://replay1.valve.net/570/10_2.dem.bz2".to_string(),
                reason: "artifact not found".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_garbage_is_corrupt() {
        let pipeline = pipeline(StaticStore(Ok(b"<html>gone</html>".to_vec())));
        let record = MatchRecord::locator(10, 1, 2);

        assert!(matches!(
            pipeline.download(&record, ArtifactKind::Replay).await,
            Err(CrystalysError::CorruptArtifact { .. })
        ));
    }

    #[tokio::test]
    async fn test_stalled_transfer_times_out() {
        let config = ArtifactConfig {
            fetch_timeout_secs: 1,
            ..ArtifactConfig::default()
        };
        let pipeline = ArtifactPipeline::new(Arc::new(StalledStore), Arc::new(Bzip2Codec), config);
        let record = MatchRecord::locator(10, 1, 2);

        assert!(matches!(
            pipeline.download(&record, ArtifactKind::Metadata).await,
            Err(CrystalysError::ArtifactUnavailable { .. })
        ));
    }
}

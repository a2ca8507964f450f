//! Integration tests for artifact retrieval through a session

use std::sync::Arc;

use crystalys_core::{ArtifactKind, BlobError, CoordinatorConfig, CrystalysError, SessionState};
use crystalys_harness::fixtures::{
    compress_bzip2, encoded_metadata_artifact, sample_match_record, sample_metadata_record,
};
use crystalys_harness::{MemoryBlobStore, MockCoordinator};
use crystalys_runtime::{CoordinatorSession, SessionBuilder};

const MATCH_ID: u64 = 7_000_000_000;
const REPLAY_URL: &str = "http://replay5.valve.net/570/7000000000_1234.dem.bz2";
const METADATA_URL: &str = "http://replay5.valve.net/570/7000000000_1234.meta.bz2";

async fn setup() -> (Arc<MockCoordinator>, Arc<MemoryBlobStore>, CoordinatorSession) {
    let coordinator = Arc::new(MockCoordinator::new());
    coordinator.insert_match(sample_match_record(MATCH_ID));
    let store = Arc::new(MemoryBlobStore::new());

    let session = SessionBuilder::new(coordinator.clone())
        .with_config(CoordinatorConfig::testing())
        .with_blob_store(store.clone())
        .build()
        .expect("Failed to build session");
    session
        .connect("player", "hunter2")
        .await
        .expect("Failed to connect");

    (coordinator, store, session)
}

#[tokio::test]
async fn test_download_replay_end_to_end() {
    let (_coordinator, store, session) = setup().await;
    let replay = b"PBDEMS2\0".repeat(512);
    store.insert(REPLAY_URL, compress_bzip2(&replay));

    let bytes = session.download_replay(MATCH_ID).await.unwrap();
    assert_eq!(bytes, replay);
    assert_eq!(store.fetched(), vec![REPLAY_URL.to_string()]);
}

#[tokio::test]
async fn test_download_metadata_decodes_inner_record() {
    let (_coordinator, store, session) = setup().await;
    store.insert(METADATA_URL, encoded_metadata_artifact(MATCH_ID));

    let metadata = session.download_metadata(MATCH_ID).await.unwrap();
    assert_eq!(metadata, sample_metadata_record(MATCH_ID));
}

#[tokio::test]
async fn test_fetch_failure_leaves_session_ready() {
    let (_coordinator, store, session) = setup().await;
    store.fail_with(Some(BlobError::Status { status: 503 }));

    let err = session.download_replay(MATCH_ID).await.unwrap_err();
    assert_eq!(
        err,
        CrystalysError::ArtifactUnavailable {
            url: REPLAY_URL.to_string(),
            reason: "server answered with status 503".to_string(),
        }
    );
    assert!(session.is_ready());

    // Missing blob
    store.fail_with(None);
    assert!(matches!(
        session.download_replay(MATCH_ID).await,
        Err(CrystalysError::ArtifactUnavailable { .. })
    ));
}

#[tokio::test]
async fn test_garbage_artifact_is_corrupt() {
    let (_coordinator, store, session) = setup().await;
    store.insert(REPLAY_URL, b"<html>404</html>".to_vec());
    store.insert(METADATA_URL, compress_bzip2(b"not a metadata file"));

    assert!(matches!(
        session.download_replay(MATCH_ID).await,
        Err(CrystalysError::CorruptArtifact { .. })
    ));
    assert!(matches!(
        session.download_metadata(MATCH_ID).await,
        Err(CrystalysError::CorruptArtifact { .. })
    ));
    assert!(matches!(session.state(), SessionState::Ready { .. }));
}

#[tokio::test]
async fn test_unknown_match_skips_transfer() {
    let (_coordinator, store, session) = setup().await;

    assert!(matches!(
        session.download_replay(1).await,
        Err(CrystalysError::MatchNotFound { match_id: 1, .. })
    ));
    assert!(store.fetched().is_empty());
}

#[tokio::test]
async fn test_download_artifact_retries_single_step() {
    let (_coordinator, store, session) = setup().await;
    let record = session.match_details(MATCH_ID).await.unwrap();
    assert_eq!(session.artifact_url(&record, ArtifactKind::Replay), REPLAY_URL);

    assert!(session
        .download_artifact(&record, ArtifactKind::Replay)
        .await
        .is_err());

    store.insert(REPLAY_URL, compress_bzip2(b"replay"));
    assert_eq!(
        session
            .download_artifact(&record, ArtifactKind::Replay)
            .await
            .unwrap(),
        b"replay".to_vec()
    );

    session.dispose().await.unwrap();
    assert_eq!(
        session
            .download_artifact(&record, ArtifactKind::Replay)
            .await,
        Err(CrystalysError::Disposed)
    );
}

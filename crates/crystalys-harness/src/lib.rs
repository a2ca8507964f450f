//! Crystalys Harness - Testing Framework
//!
//! Test doubles for the collaborators a coordinator session talks to:
//!
//! - **MockCoordinator**: a scriptable [`CoordinatorTransport`](crystalys_core::CoordinatorTransport)
//!   that answers connect, log-on, hello and match-details requests and records
//!   every call
//! - **MemoryBlobStore**: an in-memory [`BlobStore`](crystalys_core::BlobStore)
//! - **fixtures**: bzip2 helpers and sample match/metadata records
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use crystalys_harness::{fixtures, MemoryBlobStore, MockCoordinator};
//! use crystalys_runtime::SessionBuilder;
//! use std::sync::Arc;
//!
//! #[tokio::test]
//! async fn test_match_lookup() {
//!     let coordinator = Arc::new(MockCoordinator::new());
//!     coordinator.insert_match(fixtures::sample_match_record(42));
//!
//!     let session = SessionBuilder::new(coordinator.clone())
//!         .with_blob_store(Arc::new(MemoryBlobStore::new()))
//!         .build()
//!         .unwrap();
//!     session.connect("user", "pass").await.unwrap();
//!     assert_eq!(session.match_details(42).await.unwrap().match_id, 42);
//! }
//! ```

pub mod blob_store;
pub mod fixtures;
pub mod mock_coordinator;

pub use blob_store::MemoryBlobStore;
pub use mock_coordinator::{MockCoordinator, MockCoordinatorConfig, MockCoordinatorLog};

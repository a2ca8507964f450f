//! Artifact location scheme
//!
//! Replays and metadata for a match live under a deterministic URL built from
//! the match's cluster, id and replay salt:
//!
//! `http://replay{cluster}.{host}.net/570/{match_id}_{replay_salt}.{kind}.bz2`
//!
//! The first path segment is always [`APP_ID`].

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ArtifactConfig;
use crate::errors::CrystalysError;
use crate::types::{MatchRecord, APP_ID};

// ----------------------------------------------------------------------------
// Artifact Kind
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
    /// Demo file, token `dem`
    Replay,
    /// Match metadata, token `meta`
    Metadata,
}

impl ArtifactKind {
    /// File token used in the artifact URL
    pub fn token(self) -> &'static str {
        match self {
            ArtifactKind::Replay => "dem",
            ArtifactKind::Metadata => "meta",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for ArtifactKind {
    type Err = CrystalysError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "replay" | "dem" => Ok(ArtifactKind::Replay),
            "metadata" | "meta" => Ok(ArtifactKind::Metadata),
            other => Err(CrystalysError::config_error(format!(
                "Unknown artifact kind: {}",
                other
            ))),
        }
    }
}

// ----------------------------------------------------------------------------
// Artifact Reference
// ----------------------------------------------------------------------------

/// The subset of a match record that locates one artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactReference {
    pub cluster: u32,
    pub match_id: u64,
    pub replay_salt: u32,
    pub kind: ArtifactKind,
}

impl ArtifactReference {
    pub fn from_record(record: &MatchRecord, kind: ArtifactKind) -> Self {
        Self {
            cluster: record.cluster,
            match_id: record.match_id,
            replay_salt: record.replay_salt,
            kind,
        }
    }

    pub fn url(&self, config: &ArtifactConfig) -> String {
        format!(
            "http://replay{}.{}.net/{}/{}_{}.{}.bz2",
            self.cluster,
            config.host,
            APP_ID,
            self.match_id,
            self.replay_salt,
            self.kind.token()
        )
    }
}

/// Derive the download URL for one artifact of a match
pub fn artifact_url(record: &MatchRecord, kind: ArtifactKind, config: &ArtifactConfig) -> String {
    ArtifactReference::from_record(record, kind).url(config)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_replay_url_is_bit_exact() {
        let record = MatchRecord::locator(7_000_000_000, 5, 1234);
        assert_eq!(
            artifact_url(&record, ArtifactKind::Replay, &ArtifactConfig::default()),
            "http://replay5.valve.net/570/7000000000_1234.dem.bz2"
        );
        assert_eq!(
            artifact_url(&record, ArtifactKind::Metadata, &ArtifactConfig::default()),
            "http://replay5.valve.net/570/7000000000_1234.meta.bz2"
        );
    }

    #[test]
    fn test_host_override() {
        let config = ArtifactConfig {
            host: "mirror".to_string(),
            ..ArtifactConfig::default()
        };
        let record = MatchRecord::locator(1, 2, 3);
        assert_eq!(
            artifact_url(&record, ArtifactKind::Replay, &config),
            "http://replay2.mirror.net/570/1_3.dem.bz2"
        );
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("dem".parse::<ArtifactKind>().unwrap(), ArtifactKind::Replay);
        assert_eq!("Replay".parse::<ArtifactKind>().unwrap(), ArtifactKind::Replay);
        assert_eq!("meta".parse::<ArtifactKind>().unwrap(), ArtifactKind::Metadata);
        assert!("video".parse::<ArtifactKind>().is_err());
    }

    proptest! {
        #[test]
        fn test_url_components_are_decimal(
            cluster in any::<u32>(),
            match_id in any::<u64>(),
            salt in any::<u32>(),
        ) {
            let record = MatchRecord::locator(match_id, cluster, salt);
            let url = artifact_url(&record, ArtifactKind::Replay, &ArtifactConfig::default());
            let expected_prefix = format!("http://replay{}.valve.net/570/", cluster);
            let expected_file = format!("{}_{}.dem.bz2", match_id, salt);

            prop_assert!(url.starts_with(&expected_prefix));
            prop_assert!(url.ends_with(&expected_file));
            prop_assert!(url::Url::parse(&url).is_ok());
        }
    }
}

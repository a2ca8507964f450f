//! Artifact codec: bzip2 decompression and bincode decoding

use std::io::Read;

use bzip2::read::BzDecoder;
use serde::{de::DeserializeOwned, Serialize};

use crate::errors::{CrystalysError, CrystalysResult};
use crate::metadata::{MetadataFile, MetadataRecord};

// ----------------------------------------------------------------------------
// Codec Trait
// ----------------------------------------------------------------------------

/// Turns downloaded artifact bytes into usable data
pub trait Codec: Send + Sync {
    /// Decompress a downloaded artifact. Empty output is corrupt.
    fn decompress(&self, bytes: &[u8]) -> CrystalysResult<Vec<u8>>;

    /// Decode decompressed metadata bytes into the inner record
    fn decode_metadata(&self, bytes: &[u8]) -> CrystalysResult<MetadataRecord> {
        let file: MetadataFile = decode(bytes)?;
        file.metadata.ok_or_else(|| {
            CrystalysError::corrupt_artifact(format!(
                "metadata file for match {} has no metadata record",
                file.match_id
            ))
        })
    }
}

// ----------------------------------------------------------------------------
// Bincode Helpers
// ----------------------------------------------------------------------------

/// Decode a bincode value; failures are corrupt artifacts
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> CrystalysResult<T> {
    bincode::deserialize(bytes)
        .map_err(|e| CrystalysError::corrupt_artifact(format!("decode failed: {}", e)))
}

pub fn encode<T: Serialize>(value: &T) -> CrystalysResult<Vec<u8>> {
    bincode::serialize(value)
        .map_err(|e| CrystalysError::corrupt_artifact(format!("encode failed: {}", e)))
}

// ----------------------------------------------------------------------------
// Bzip2 Codec
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct Bzip2Codec;

impl Codec for Bzip2Codec {
    fn decompress(&self, bytes: &[u8]) -> CrystalysResult<Vec<u8>> {
        let mut decoder = BzDecoder::new(bytes);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| CrystalysError::corrupt_artifact(format!("bzip2: {}", e)))?;

        if out.is_empty() {
            return Err(CrystalysError::corrupt_artifact(
                "decompressed artifact is empty",
            ));
        }

        tracing::trace!(
            compressed = bytes.len(),
            decompressed = out.len(),
            "Decompressed artifact"
        );
        Ok(out)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{MetadataPlayer, MetadataTeam};
    use bzip2::write::BzEncoder;
    use bzip2::Compression;
    use std::io::Write;

    fn compress(data: &[u8]) -> Vec<u8> {
        let mut encoder = BzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn sample_file(with_record: bool) -> MetadataFile {
        MetadataFile {
            version: 1,
            match_id: 77,
            metadata: with_record.then(|| MetadataRecord {
                match_id: 77,
                lobby_id: 9001,
                teams: vec![MetadataTeam {
                    dota_team: 2,
                    players: vec![MetadataPlayer {
                        account_id: 1,
                        hero_id: 14,
                        player_slot: 0,
                        items: vec![1, 2, 3],
                        level: 25,
                        kills: 10,
                        deaths: 2,
                        assists: 7,
                    }],
                    cm_captain_player_id: None,
                }],
                report_until_time: 0,
            }),
        }
    }

    #[test]
    fn test_decompress_reproduces_plaintext() {
        let plaintext = b"PBDEMS2\0 replay payload".repeat(64);
        let compressed = compress(&plaintext);

        let first = Bzip2Codec.decompress(&compressed).unwrap();
        let second = Bzip2Codec.decompress(&compressed).unwrap();
        assert_eq!(first, plaintext);
        assert_eq!(first, second);
    }

    #[test]
    fn test_garbage_is_corrupt() {
        assert!(matches!(
            Bzip2Codec.decompress(b"definitely not bzip2"),
            Err(CrystalysError::CorruptArtifact { .. })
        ));
        assert!(matches!(
            Bzip2Codec.decompress(&compress(b"")),
            Err(CrystalysError::CorruptArtifact { .. })
        ));
    }

    #[test]
    fn test_decode_metadata_extracts_inner_record() {
        let bytes = encode(&sample_file(true)).unwrap();
        let record = Bzip2Codec.decode_metadata(&bytes).unwrap();
        assert_eq!(record.lobby_id, 9001);
        assert_eq!(record.players().count(), 1);

        let bytes = encode(&sample_file(false)).unwrap();
        assert!(matches!(
            Bzip2Codec.decode_metadata(&bytes),
            Err(CrystalysError::CorruptArtifact { .. })
        ));

        assert!(matches!(
            Bzip2Codec.decode_metadata(&[0xff; 3]),
            Err(CrystalysError::CorruptArtifact { .. })
        ));
    }
}

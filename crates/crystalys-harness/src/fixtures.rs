//! Sample records and bzip2 helpers for tests

use std::io::Write;

use bzip2::write::BzEncoder;
use bzip2::Compression;
use crystalys_core::{
    encode, MatchRecord, MetadataFile, MetadataPlayer, MetadataRecord, MetadataTeam, ReplayState,
};

/// Coordinator version the mock answers the hello with
pub const DEFAULT_WELCOME_VERSION: u32 = 5_640;

/// Compress `data` the way artifacts are stored
pub fn compress_bzip2(data: &[u8]) -> Vec<u8> {
    let mut encoder = BzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("Failed to compress fixture");
    encoder.finish().expect("Failed to finish bzip2 stream")
}

/// Match record on cluster 5 with salt 1234
pub fn sample_match_record(match_id: u64) -> MatchRecord {
    MatchRecord {
        match_id,
        cluster: 5,
        replay_salt: 1234,
        replay_state: ReplayState::Available,
        start_time: 1_700_000_000,
        duration: 2_400,
        game_mode: 22,
        radiant_win: true,
    }
}

pub fn sample_metadata_record(match_id: u64) -> MetadataRecord {
    let team = |dota_team: u32, first_slot: u32| MetadataTeam {
        dota_team,
        players: (0..5)
            .map(|i| MetadataPlayer {
                account_id: 1_000 + first_slot + i,
                hero_id: 1 + first_slot + i,
                player_slot: first_slot + i,
                items: vec![29, 36, 48],
                level: 18 + i,
                kills: i * 2,
                deaths: 3,
                assists: 5 + i,
            })
            .collect(),
        cm_captain_player_id: None,
    };

    MetadataRecord {
        match_id,
        lobby_id: match_id + 10_000,
        teams: vec![team(2, 0), team(3, 128)],
        report_until_time: 1_700_086_400,
    }
}

pub fn sample_metadata_file(match_id: u64) -> MetadataFile {
    MetadataFile {
        version: 1,
        match_id,
        metadata: Some(sample_metadata_record(match_id)),
    }
}

/// A metadata artifact as served: bincode-encoded file, then bzip2
pub fn encoded_metadata_artifact(match_id: u64) -> Vec<u8> {
    let encoded =
        encode(&sample_metadata_file(match_id)).expect("Failed to encode metadata fixture");
    compress_bzip2(&encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crystalys_core::{Bzip2Codec, Codec};

    #[test]
    fn test_metadata_artifact_decodes() {
        let artifact = encoded_metadata_artifact(77);
        let bytes = Bzip2Codec.decompress(&artifact).unwrap();
        let record = Bzip2Codec.decode_metadata(&bytes).unwrap();

        assert_eq!(record, sample_metadata_record(77));
        assert_eq!(record.players().count(), 10);
    }
}

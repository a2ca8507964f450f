//! Decoded match metadata
//!
//! A metadata artifact decompresses to a [`MetadataFile`] envelope whose inner
//! `metadata` field carries the match summary.

use serde::{Deserialize, Serialize};

/// Outer envelope of a metadata artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFile {
    pub version: i32,
    pub match_id: u64,
    pub metadata: Option<MetadataRecord>,
}

/// End-of-match summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub match_id: u64,
    pub lobby_id: u64,
    pub teams: Vec<MetadataTeam>,
    /// Unix time until which the match can be reported
    pub report_until_time: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataTeam {
    /// 2 = Radiant, 3 = Dire
    pub dota_team: u32,
    pub players: Vec<MetadataPlayer>,
    pub cm_captain_player_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataPlayer {
    pub account_id: u32,
    pub hero_id: u32,
    pub player_slot: u32,
    pub items: Vec<u32>,
    pub level: u32,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
}

impl MetadataRecord {
    /// All players across both teams
    pub fn players(&self) -> impl Iterator<Item = &MetadataPlayer> {
        self.teams.iter().flat_map(|team| team.players.iter())
    }
}

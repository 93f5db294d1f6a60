//! Match metadata: roster, credentials and bookkeeping timestamps.

use chrono::{DateTime, Utc};
use derive_getters::Getters;
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::instrument;

/// One seat in the roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters, Setters)]
#[serde(rename_all = "camelCase")]
#[setters(strip_option, into, prefix = "with_")]
pub struct PlayerMetadata {
    /// Seat number.
    #[setters(skip)]
    id: u32,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    /// Secret the player must present with every action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    credentials: Option<String>,
    /// Arbitrary per-player data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    /// Whether the player currently has a live connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    is_connected: Option<bool>,
}

impl PlayerMetadata {
    /// Empty seat.
    pub fn new(id: u32) -> Self {
        Self {
            id,
            name: None,
            credentials: None,
            data: None,
            is_connected: None,
        }
    }

    /// Updates the connection flag.
    pub fn set_connected(&mut self, connected: bool) {
        self.is_connected = Some(connected);
    }
}

/// Publicly visible part of a seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicPlayer {
    /// Seat number.
    pub id: u32,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Metadata stored next to a match's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters)]
#[serde(rename_all = "camelCase")]
pub struct GameMetadata {
    /// Name of the game being played.
    game_name: String,
    /// Roster keyed by seat number.
    players: BTreeMap<u32, PlayerMetadata>,
    /// Data handed to the game's setup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    setup_data: Option<Value>,
    /// Final result, copied from `ctx.gameover`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    gameover: Option<Value>,
    /// Creation time.
    created_at: DateTime<Utc>,
    /// Last update time.
    updated_at: DateTime<Utc>,
}

impl GameMetadata {
    /// Metadata for a new match with the given roster.
    #[instrument(skip_all, fields(players = players.len()))]
    pub fn new(game_name: impl Into<String>, players: Vec<PlayerMetadata>) -> Self {
        let now = Utc::now();
        Self {
            game_name: game_name.into(),
            players: players.into_iter().map(|player| (player.id, player)).collect(),
            setup_data: None,
            gameover: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Roster of `count` seats without credentials.
    pub fn open_seats(game_name: impl Into<String>, count: u32) -> Self {
        Self::new(game_name, (0..count).map(PlayerMetadata::new).collect())
    }

    /// Attaches setup data.
    pub fn with_setup_data(mut self, setup_data: Value) -> Self {
        self.setup_data = Some(setup_data);
        self
    }

    /// Seat matching a player ID such as `"1"`.
    ///
    /// IDs that are not seat numbers never match.
    pub fn player(&self, player_id: &str) -> Option<&PlayerMetadata> {
        player_id.parse::<u32>().ok().and_then(|id| self.players.get(&id))
    }

    /// Mutable seat lookup, same matching rules as [`GameMetadata::player`].
    pub fn player_mut(&mut self, player_id: &str) -> Option<&mut PlayerMetadata> {
        player_id.parse::<u32>().ok().and_then(|id| self.players.get_mut(&id))
    }

    /// Roster with credentials and private data removed.
    pub fn public_players(&self) -> Vec<PublicPlayer> {
        self.players
            .values()
            .map(|player| PublicPlayer {
                id: player.id,
                name: player.name.clone(),
            })
            .collect()
    }

    /// Records the final result.
    pub fn set_gameover(&mut self, gameover: Value) {
        self.gameover = Some(gameover);
        self.touch();
    }

    /// Bumps `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

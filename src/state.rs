//! Framework-owned game state.
//!
//! A [`State`] is the unit of persistence: the game author's `G`, the
//! framework's [`Ctx`], plugin data, the action log and the undo/redo stacks.
//! Field names follow the wire format so persisted states and replicated
//! snapshots stay readable by existing clients.

use crate::action::LogAction;
use crate::flow::ActivePlayersArg;
use crate::random::RandomState;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Identifier of a seat at the table (`"0"`, `"1"`, ...).
pub type PlayerId = String;

/// Name of a stage inside a turn.
pub type StageName = String;

/// Active players and the stage each one sits in.
///
/// A `None` stage means the player may act without being in any stage.
pub type ActivePlayers = BTreeMap<PlayerId, Option<StageName>>;

/// Bounds every game payload must satisfy.
pub trait GameData: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> GameData for T where
    T: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// Framework control state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ctx {
    /// Number of seats.
    pub num_players: usize,
    /// Seating order used by the turn order strategy.
    pub play_order: Vec<PlayerId>,
    /// Index of the current player in `play_order`.
    pub play_order_pos: usize,
    /// Player whose turn it is.
    pub current_player: PlayerId,
    /// Turn counter, starts at 1 once the game is initialized.
    pub turn: u32,
    /// Active phase, `None` when no phase is running.
    pub phase: Option<String>,
    /// Moves made by the current player during this turn.
    #[serde(default)]
    pub num_moves: u32,
    /// Players allowed to act, `None` means only `current_player`.
    pub active_players: Option<ActivePlayers>,
    /// Per-player move limits for the current active-players configuration.
    #[serde(rename = "_activePlayersMoveLimit", default, skip_serializing_if = "Option::is_none")]
    pub active_players_move_limit: Option<BTreeMap<PlayerId, u32>>,
    /// Per-player move counters for the current active-players configuration.
    #[serde(rename = "_activePlayersNumMoves", default)]
    pub active_players_num_moves: BTreeMap<PlayerId, u32>,
    /// Configurations saved by `revert`, restored once the active set empties.
    #[serde(rename = "_prevActivePlayers", default)]
    pub prev_active_players: Vec<ActivePlayersSnapshot>,
    /// Configuration applied once the current active set empties.
    #[serde(rename = "_nextActivePlayers", default, skip_serializing_if = "Option::is_none")]
    pub next_active_players: Option<ActivePlayersArg>,
    /// Result of the game once a terminal condition fired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gameover: Option<Value>,
    /// Server-only PRNG state.
    #[serde(rename = "_random", default, skip_serializing_if = "Option::is_none")]
    pub random: Option<RandomState>,
}

impl Ctx {
    /// Returns true once `gameover` has been set.
    pub fn is_game_over(&self) -> bool {
        self.gameover.is_some()
    }

    /// Returns the stage the player sits in, if the player is active in one.
    pub fn stage_of(&self, player_id: &str) -> Option<&str> {
        self.active_players
            .as_ref()
            .and_then(|active| active.get(player_id))
            .and_then(|stage| stage.as_deref())
    }

    /// Returns the player found at `play_order_pos`.
    pub fn player_at_pos(&self) -> Option<&PlayerId> {
        self.play_order.get(self.play_order_pos)
    }
}

/// Saved active-players configuration used by `revert`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivePlayersSnapshot {
    /// Active players at the time of the snapshot.
    pub active_players: Option<ActivePlayers>,
    /// Move limits at the time of the snapshot.
    #[serde(rename = "_activePlayersMoveLimit", default)]
    pub active_players_move_limit: Option<BTreeMap<PlayerId, u32>>,
    /// Move counters at the time of the snapshot.
    #[serde(rename = "_activePlayersNumMoves", default)]
    pub active_players_num_moves: BTreeMap<PlayerId, u32>,
}

/// Opaque per-plugin data stored inside the state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PluginState {
    /// Plugin-owned payload.
    pub data: Value,
}

/// One processed action, as recorded in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// The action with credentials stripped.
    pub action: LogAction,
    /// State version the action was applied to.
    #[serde(rename = "_stateID")]
    pub state_id: u64,
    /// Turn during which the action was applied.
    pub turn: u32,
    /// Phase during which the action was applied.
    pub phase: Option<String>,
    /// Hide move arguments from everyone but the acting player.
    #[serde(default, skip_serializing_if = "is_false")]
    pub redact: bool,
    /// Entry was synthesized by the flow engine.
    #[serde(default, skip_serializing_if = "is_false")]
    pub automatic: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl LogEntry {
    /// Creates an entry stamped with the given version, turn and phase.
    pub fn new(action: LogAction, state_id: u64, turn: u32, phase: Option<String>) -> Self {
        Self {
            action,
            state_id,
            turn,
            phase,
            redact: false,
            automatic: false,
        }
    }

    /// Marks the entry for redaction.
    pub fn redacted(mut self, redact: bool) -> Self {
        self.redact = redact;
        self
    }
}

/// Snapshot kept on the undo/redo stacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "G: Serialize", deserialize = "G: DeserializeOwned"))]
pub struct UndoEntry<G> {
    /// Game payload.
    #[serde(rename = "G")]
    pub g: G,
    /// Control state.
    pub ctx: Ctx,
    /// Plugin data.
    pub plugins: BTreeMap<String, PluginState>,
    /// Move that produced this snapshot.
    #[serde(rename = "moveType", default, skip_serializing_if = "Option::is_none")]
    pub move_type: Option<String>,
    /// Player who produced this snapshot.
    #[serde(rename = "playerID", default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<PlayerId>,
}

/// Complete, versioned game state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "G: Serialize", deserialize = "G: DeserializeOwned"))]
pub struct State<G> {
    /// Game payload.
    #[serde(rename = "G")]
    pub g: G,
    /// Control state.
    pub ctx: Ctx,
    /// Plugin data keyed by plugin name.
    #[serde(default)]
    pub plugins: BTreeMap<String, PluginState>,
    /// Every entry processed so far.
    #[serde(default)]
    pub log: Vec<LogEntry>,
    /// Entries produced by the most recent action.
    #[serde(default)]
    pub deltalog: Vec<LogEntry>,
    /// Undo stack.
    #[serde(rename = "_undo", default)]
    pub undo: Vec<UndoEntry<G>>,
    /// Redo stack.
    #[serde(rename = "_redo", default)]
    pub redo: Vec<UndoEntry<G>>,
    /// Optimistic-concurrency version.
    #[serde(rename = "_stateID")]
    pub state_id: u64,
}

impl<G: Clone> State<G> {
    /// Captures `G`, `ctx` and plugin data for the undo/redo stacks.
    pub fn snapshot(&self, move_type: Option<String>, player_id: Option<PlayerId>) -> UndoEntry<G> {
        UndoEntry {
            g: self.g.clone(),
            ctx: self.ctx.clone(),
            plugins: self.plugins.clone(),
            move_type,
            player_id,
        }
    }

    /// Appends an entry to the deltalog, stamped with the current version, turn and phase.
    pub fn push_log(&mut self, action: LogAction) -> &mut LogEntry {
        let entry = LogEntry::new(action, self.state_id, self.ctx.turn, self.ctx.phase.clone());
        self.deltalog.push(entry);
        let last = self.deltalog.len() - 1;
        &mut self.deltalog[last]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{EventPayload, FlowEvent};
    use serde_json::json;

    #[test]
    fn test_log_entry_omits_false_markers() {
        let entry = LogEntry::new(
            LogAction::GameEvent(EventPayload::new(FlowEvent::EndPhase, None)),
            3,
            2,
            None,
        );
        let value = serde_json::to_value(&entry).unwrap();
        assert!(value.get("redact").is_none());
        assert!(value.get("automatic").is_none());
        assert_eq!(value["_stateID"], json!(3));
    }

    #[test]
    fn test_ctx_uses_wire_names() {
        let ctx = Ctx {
            num_players: 2,
            play_order: vec!["0".into(), "1".into()],
            play_order_pos: 1,
            current_player: "1".into(),
            turn: 2,
            phase: Some("draw".into()),
            num_moves: 0,
            active_players: None,
            active_players_move_limit: None,
            active_players_num_moves: BTreeMap::new(),
            prev_active_players: Vec::new(),
            next_active_players: None,
            gameover: None,
            random: Some(RandomState::new(9)),
        };
        let value = serde_json::to_value(&ctx).unwrap();
        assert_eq!(value["numPlayers"], json!(2));
        assert_eq!(value["playOrderPos"], json!(1));
        assert_eq!(value["currentPlayer"], json!("1"));
        assert!(value["activePlayers"].is_null());
        assert!(value.get("_random").is_some());
        assert_eq!(ctx.player_at_pos().map(String::as_str), Some("1"));
    }
}

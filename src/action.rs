//! Actions submitted to the reducer and their logged form.

use crate::flow::{ActivePlayersArg, StageArg};
use crate::game::EndTrigger;
use crate::state::{PlayerId, State};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::instrument;

/// Payload of a `MAKE_MOVE` action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovePayload {
    /// Name of the move.
    #[serde(rename = "type")]
    pub move_type: String,
    /// Positional move arguments.
    #[serde(default)]
    pub args: Option<Vec<Value>>,
    /// Player making the move.
    #[serde(rename = "playerID", default)]
    pub player_id: Option<PlayerId>,
    /// Credentials proving the player's identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
}

impl MovePayload {
    /// Creates a payload without credentials.
    pub fn new(
        move_type: impl Into<String>,
        args: Vec<Value>,
        player_id: Option<PlayerId>,
    ) -> Self {
        Self {
            move_type: move_type.into(),
            args: Some(args),
            player_id,
            credentials: None,
        }
    }

    fn stripped(&self) -> Self {
        Self {
            credentials: None,
            ..self.clone()
        }
    }
}

/// Flow events a player (or a move) may request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, strum::IntoStaticStr)]
#[serde(tag = "type", content = "args", rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum FlowEvent {
    /// End the current turn, optionally naming the next player.
    EndTurn(Option<EndTrigger>),
    /// End the current turn regardless of `min_moves`.
    Pass(Option<EndTrigger>),
    /// End the current phase.
    EndPhase,
    /// End the current phase and move to the named one.
    SetPhase(String),
    /// Remove the acting player from its stage.
    EndStage,
    /// Move the acting player into a stage.
    SetStage(StageArg),
    /// Replace the active-players configuration.
    SetActivePlayers(ActivePlayersArg),
    /// End the game with an optional result.
    EndGame(Option<Value>),
}

impl FlowEvent {
    /// Wire name of the event, as used by [`crate::EventsConfig`].
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

/// Payload of a `GAME_EVENT` action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    /// The requested event.
    #[serde(rename = "e")]
    pub event: FlowEvent,
    /// Player requesting the event.
    #[serde(rename = "playerID", default)]
    pub player_id: Option<PlayerId>,
    /// Credentials proving the player's identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
}

impl EventPayload {
    /// Creates a payload without credentials.
    pub fn new(event: FlowEvent, player_id: Option<PlayerId>) -> Self {
        Self {
            event,
            player_id,
            credentials: None,
        }
    }

    fn stripped(&self) -> Self {
        Self {
            credentials: None,
            ..self.clone()
        }
    }
}

/// Payload of `UNDO` and `REDO`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerPayload {
    /// Player requesting the action.
    #[serde(rename = "playerID", default)]
    pub player_id: Option<PlayerId>,
    /// Credentials proving the player's identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
}

impl PlayerPayload {
    fn stripped(&self) -> Self {
        Self {
            player_id: self.player_id.clone(),
            credentials: None,
        }
    }
}

/// Everything the reducer accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(bound(serialize = "G: Serialize", deserialize = "G: DeserializeOwned"))]
pub enum Action<G> {
    /// Apply a named move.
    MakeMove(MovePayload),
    /// Apply a flow event.
    GameEvent(EventPayload),
    /// Roll back the last move of the turn.
    Undo(PlayerPayload),
    /// Re-apply the last undone move.
    Redo(PlayerPayload),
    /// Replace the state wholesale.
    Restore(Box<State<G>>),
}

impl<G> Action<G> {
    /// Builds a `MAKE_MOVE` action.
    pub fn make_move(
        move_type: impl Into<String>,
        args: Vec<Value>,
        player_id: impl Into<PlayerId>,
    ) -> Self {
        Self::MakeMove(MovePayload::new(move_type, args, Some(player_id.into())))
    }

    /// Builds a `GAME_EVENT` action.
    pub fn game_event(event: FlowEvent, player_id: impl Into<PlayerId>) -> Self {
        Self::GameEvent(EventPayload::new(event, Some(player_id.into())))
    }

    /// Builds an `UNDO` action.
    pub fn undo(player_id: impl Into<PlayerId>) -> Self {
        Self::Undo(PlayerPayload {
            player_id: Some(player_id.into()),
            credentials: None,
        })
    }

    /// Builds a `REDO` action.
    pub fn redo(player_id: impl Into<PlayerId>) -> Self {
        Self::Redo(PlayerPayload {
            player_id: Some(player_id.into()),
            credentials: None,
        })
    }

    /// Attaches credentials to the action.
    pub fn with_credentials(mut self, credentials: impl Into<String>) -> Self {
        let credentials = Some(credentials.into());
        match &mut self {
            Self::MakeMove(payload) => payload.credentials = credentials,
            Self::GameEvent(payload) => payload.credentials = credentials,
            Self::Undo(payload) | Self::Redo(payload) => payload.credentials = credentials,
            Self::Restore(_) => {}
        }
        self
    }

    /// Rebinds the action to `player_id`.
    pub fn with_player(mut self, player_id: impl Into<PlayerId>) -> Self {
        let player_id = Some(player_id.into());
        match &mut self {
            Self::MakeMove(payload) => payload.player_id = player_id,
            Self::GameEvent(payload) => payload.player_id = player_id,
            Self::Undo(payload) | Self::Redo(payload) => payload.player_id = player_id,
            Self::Restore(_) => {}
        }
        self
    }

    /// Credentials carried by the action.
    pub fn credentials(&self) -> Option<&str> {
        match self {
            Self::MakeMove(payload) => payload.credentials.as_deref(),
            Self::GameEvent(payload) => payload.credentials.as_deref(),
            Self::Undo(payload) | Self::Redo(payload) => payload.credentials.as_deref(),
            Self::Restore(_) => None,
        }
    }

    /// Player named in the payload.
    pub fn player_id(&self) -> Option<&str> {
        match self {
            Self::MakeMove(payload) => payload.player_id.as_deref(),
            Self::GameEvent(payload) => payload.player_id.as_deref(),
            Self::Undo(payload) | Self::Redo(payload) => payload.player_id.as_deref(),
            Self::Restore(_) => None,
        }
    }

    /// Short name of the action type, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MakeMove(_) => "MAKE_MOVE",
            Self::GameEvent(_) => "GAME_EVENT",
            Self::Undo(_) => "UNDO",
            Self::Redo(_) => "REDO",
            Self::Restore(_) => "RESTORE",
        }
    }

    /// Loggable form of the action with credentials stripped.
    ///
    /// `RESTORE` is never logged.
    pub fn to_log_action(&self) -> Option<LogAction> {
        match self {
            Self::MakeMove(payload) => Some(LogAction::MakeMove(payload.stripped())),
            Self::GameEvent(payload) => Some(LogAction::GameEvent(payload.stripped())),
            Self::Undo(payload) => Some(LogAction::Undo(payload.stripped())),
            Self::Redo(payload) => Some(LogAction::Redo(payload.stripped())),
            Self::Restore(_) => None,
        }
    }
}

/// Action as it appears in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogAction {
    /// A move.
    MakeMove(MovePayload),
    /// A flow event, requested or synthesized.
    GameEvent(EventPayload),
    /// An undo.
    Undo(PlayerPayload),
    /// A redo.
    Redo(PlayerPayload),
}

impl LogAction {
    /// Logged form of an event the flow engine synthesized.
    pub fn automatic_event(event: FlowEvent) -> Self {
        Self::GameEvent(EventPayload::new(event, None))
    }

    /// Player recorded on the entry.
    pub fn player_id(&self) -> Option<&str> {
        match self {
            Self::MakeMove(payload) => payload.player_id.as_deref(),
            Self::GameEvent(payload) => payload.player_id.as_deref(),
            Self::Undo(payload) | Self::Redo(payload) => payload.player_id.as_deref(),
        }
    }
}

/// Bound action creator for one move name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveDispatcher {
    move_type: String,
    player_id: PlayerId,
    credentials: Option<String>,
}

impl MoveDispatcher {
    /// Builds the `MAKE_MOVE` action for the given arguments.
    pub fn dispatch<G>(&self, args: Vec<Value>) -> Action<G> {
        let action = Action::make_move(self.move_type.clone(), args, self.player_id.clone());
        match &self.credentials {
            Some(credentials) => action.with_credentials(credentials.clone()),
            None => action,
        }
    }

    /// Name of the bound move.
    pub fn move_type(&self) -> &str {
        &self.move_type
    }
}

/// Creates one dispatcher per move name, all bound to the same player.
#[instrument(skip(move_names, credentials))]
pub fn move_dispatchers<'a>(
    move_names: impl IntoIterator<Item = &'a str>,
    player_id: &str,
    credentials: Option<&str>,
) -> BTreeMap<String, MoveDispatcher> {
    move_names
        .into_iter()
        .map(|name| {
            (
                name.to_string(),
                MoveDispatcher {
                    move_type: name.to_string(),
                    player_id: player_id.to_string(),
                    credentials: credentials.map(str::to_string),
                },
            )
        })
        .collect()
}

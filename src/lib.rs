//! Strictly Turns library - authoritative turn-based game engine
//!
//! Game authors describe setup, moves, phases, turns and stages with a
//! [`Game`]; the engine enforces whose turn it is, which moves are legal,
//! and when turns, phases and the game end.
//!
//! # Architecture
//!
//! - **Flow**: compiled turn/phase/stage state machine driven by moves and events
//! - **Reducer**: pure `(state, action) -> state` transition with undo/redo
//! - **Master**: per-match authority that authenticates, versions, redacts,
//!   broadcasts and persists
//! - **Plugins**: extra state slices with setup/action/flush/player-view hooks
//! - **Games**: ready-made definitions (tic-tac-toe, secret draw)
//!
//! # Example
//!
//! ```
//! use strictly_turns::{Action, Reducer};
//! use strictly_turns::games::tictactoe;
//! use serde_json::json;
//!
//! let reducer = Reducer::new(tictactoe::tictactoe());
//! let state = reducer.initialize(2, None);
//! let state = reducer.reduce(state, &Action::make_move("place", vec![json!(4)], "0"));
//! assert_eq!(state.state_id, 1);
//! assert_eq!(state.ctx.current_player, "1");
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod action;
mod config;
mod flow;
mod game;
mod master;
mod plugin;
mod random;
mod reducer;
mod state;

pub mod games;

// Crate-level exports - Actions
pub use action::{
    Action, EventPayload, FlowEvent, LogAction, MoveDispatcher, MovePayload, PlayerPayload,
    move_dispatchers,
};

// Crate-level exports - Configuration
pub use config::{AuthMode, ConfigError, MasterConfig};

// Crate-level exports - Flow engine
pub use flow::{
    ActivePlayersArg, Flow, StageArg, TurnOrder, set_active_players,
    update_active_players_once_empty,
};

// Crate-level exports - Game definitions
pub use game::{
    EndIf, EndTrigger, Events, EventsConfig, Game, Hook, MoveContext, MoveDef, MoveFn, MoveMap,
    MoveResult, PhaseConfig, PlayerViewFn, SetupFn, StageConfig, TurnConfig, Undoable,
};

// Crate-level exports - Master
pub use master::{
    Authenticator, Blocking, ChannelTransport, CredentialAuth, CustomAuth, Envelope, GameMetadata,
    InMemoryStorage, Master, MasterError, MasterErrorKind, MessageFor, NoAuth, PlayerMetadata,
    PublicPlayer, Rejection, Storage, StorageError, SyncInfo, SyncStorage, Transport,
    TransportError, TransportMessage, UpdateInfo, UpdateOutcome, does_game_require_authentication,
    filtered_state, is_action_from_authentic_player, metadata_key, redact_log,
};

// Crate-level exports - Plugins
pub use plugin::{Plugin, Plugins};

// Crate-level exports - Randomness
pub use random::{Random, RandomState};

// Crate-level exports - Reducer
pub use reducer::{DEFAULT_NUM_PLAYERS, Reducer};

// Crate-level exports - State
pub use state::{
    ActivePlayers, ActivePlayersSnapshot, Ctx, GameData, LogEntry, PlayerId, PluginState, StageName,
    State, UndoEntry,
};

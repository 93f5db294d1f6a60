//! Pure state transition function.
//!
//! `reduce(state, action)` never mutates its input in place and never
//! touches I/O. Rejected actions return the state with an empty deltalog and
//! the same `_stateID`; accepted ones bump `_stateID` by exactly one and
//! append their deltalog to the log.

use crate::action::{Action, EventPayload, LogAction, MovePayload, PlayerPayload};
use crate::flow::Flow;
use crate::game::{Events, Game, MoveContext, MoveResult};
use crate::plugin::{apply_action, flush_plugins, setup_plugins};
use crate::random::{Random, RandomState};
use crate::state::{GameData, State};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Number of seats used when a caller asks for zero players.
pub const DEFAULT_NUM_PLAYERS: usize = 2;

/// Game definition bound to its compiled flow.
#[derive(Clone)]
pub struct Reducer<G> {
    game: Arc<Game<G>>,
    flow: Flow<G>,
}

impl<G: GameData> Reducer<G> {
    /// Compiles the flow of `game`.
    pub fn new(game: Game<G>) -> Self {
        let flow = Flow::new(&game);
        Self {
            game: Arc::new(game),
            flow,
        }
    }

    /// The game definition.
    pub fn game(&self) -> &Game<G> {
        &self.game
    }

    /// The compiled flow.
    pub fn flow(&self) -> &Flow<G> {
        &self.flow
    }

    /// Creates the initial state of a new match.
    #[instrument(skip(self, setup_data), fields(game = %self.game.name()))]
    pub fn initialize(&self, num_players: usize, setup_data: Option<&Value>) -> State<G> {
        let num_players = if num_players == 0 {
            DEFAULT_NUM_PLAYERS
        } else {
            num_players
        };
        let seed = self.game.seed().unwrap_or_else(rand::random);
        let mut ctx = self.flow.initial_ctx(num_players);
        let mut random = Random::from_state(RandomState::new(seed));
        let g = self.game.setup(&ctx, &mut random, setup_data);
        ctx.random = Some(random.state());

        let plugins = setup_plugins(self.game.plugins(), &g, &ctx);
        let mut state = State {
            g,
            ctx,
            plugins,
            log: Vec::new(),
            deltalog: Vec::new(),
            undo: Vec::new(),
            redo: Vec::new(),
            state_id: 0,
        };

        state = self.flow.init(state);
        state.plugins = flush_plugins(self.game.plugins(), state.plugins, &state.g, &state.ctx);
        state.deltalog.clear();
        if !self.game.undo_disabled() {
            state.undo = vec![state.snapshot(None, None)];
        }
        info!(num_players, phase = ?state.ctx.phase, "Game initialized");
        state
    }

    /// Applies one action.
    #[instrument(
        skip(self, state, action),
        fields(action = action.kind(), state_id = state.state_id)
    )]
    pub fn reduce(&self, state: State<G>, action: &Action<G>) -> State<G> {
        // Moves without a player are made by the current player.
        let action = match action {
            Action::MakeMove(payload) if payload.player_id.is_none() => {
                action.clone().with_player(state.ctx.current_player.clone())
            }
            _ => action.clone(),
        };

        let Some(logged) = action.to_log_action() else {
            let Action::Restore(restored) = action else {
                return state;
            };
            debug!(restored_state_id = restored.state_id, "Restoring state");
            return *restored;
        };

        match &action {
            Action::MakeMove(payload) => self.make_move(state, payload, logged),
            Action::GameEvent(payload) => self.game_event(state, payload, logged),
            Action::Undo(payload) => self.undo(state, payload, logged),
            Action::Redo(payload) => self.redo(state, payload, logged),
            Action::Restore(_) => state,
        }
    }

    fn make_move(&self, mut state: State<G>, payload: &MovePayload, logged: LogAction) -> State<G> {
        state.deltalog.clear();
        let player = payload
            .player_id
            .clone()
            .unwrap_or_else(|| state.ctx.current_player.clone());

        let Some(def) = self.flow.get_move(&state.ctx, &payload.move_type, &player).cloned() else {
            warn!(move_type = %payload.move_type, player = %player, "Disallowed move");
            return state;
        };
        if state.ctx.is_game_over() {
            warn!("Cannot make move after game end");
            return state;
        }
        if !self.flow.can_player_make_move(&state.g, &state.ctx, payload) {
            warn!(
                move_type = %payload.move_type,
                player = %player,
                "Player cannot make this move now"
            );
            return state;
        }

        let had_random = state.ctx.random.is_some();
        let mut random = Random::from_state(state.ctx.random.unwrap_or_default());
        let mut events = Events::default();
        let mut plugins = state.plugins.clone();
        let args = payload.args.clone().unwrap_or_default();
        let result = def.call(
            MoveContext {
                g: &state.g,
                ctx: &state.ctx,
                player_id: &player,
                random: &mut random,
                events: &mut events,
                plugins: &mut plugins,
            },
            &args,
        );
        let g = match result {
            MoveResult::NewState(g) => g,
            MoveResult::Invalid => {
                warn!(move_type = %payload.move_type, player = %player, "Invalid move");
                return state;
            }
        };

        state.g = g;
        state.plugins = plugins;
        if had_random {
            state.ctx.random = Some(random.state());
        }

        state.push_log(logged.clone()).redact = def.is_redacted();

        let turn_before = state.ctx.turn;
        state = self.flow.process_move(state, payload);

        for event in events.drain() {
            if state.ctx.is_game_over() || state.ctx.turn != turn_before {
                debug!(
                    event = event.name(),
                    "Dropping event queued by a move after the turn ended"
                );
                continue;
            }
            state = self.flow.process_event(state, &event, &player, true);
        }

        state.plugins = apply_action(self.game.plugins(), state.plugins, &logged);
        state.plugins = flush_plugins(self.game.plugins(), state.plugins, &state.g, &state.ctx);

        if !self.game.undo_disabled() {
            if state.ctx.turn == turn_before {
                let snapshot =
                    state.snapshot(Some(payload.move_type.clone()), Some(player.clone()));
                state.undo.push(snapshot);
                state.redo.clear();
            } else {
                state.undo = vec![state.snapshot(None, None)];
                state.redo.clear();
            }
        }

        debug!(move_type = %payload.move_type, player = %player, "Move applied");
        self.finish(state)
    }

    fn game_event(
        &self,
        mut state: State<G>,
        payload: &EventPayload,
        logged: LogAction,
    ) -> State<G> {
        state.deltalog.clear();
        let event = &payload.event;

        if !self.flow.events().allows(event) {
            warn!(event = event.name(), "Disabled event");
            return state;
        }
        if state.ctx.is_game_over() {
            warn!(event = event.name(), "Cannot call event after game end");
            return state;
        }
        if let Some(player) = &payload.player_id
            && !self.flow.is_player_active(&state.g, &state.ctx, player)
        {
            warn!(event = event.name(), player = %player, "Disallowed event, player not active");
            return state;
        }

        let player = payload
            .player_id
            .clone()
            .unwrap_or_else(|| state.ctx.current_player.clone());
        state.push_log(logged.clone());

        let turn_before = state.ctx.turn;
        state = self.flow.process_event(state, event, &player, false);

        state.plugins = apply_action(self.game.plugins(), state.plugins, &logged);
        state.plugins = flush_plugins(self.game.plugins(), state.plugins, &state.g, &state.ctx);

        if !self.game.undo_disabled() && state.ctx.turn != turn_before {
            state.undo = vec![state.snapshot(None, None)];
            state.redo.clear();
        }

        self.finish(state)
    }

    fn undo(&self, mut state: State<G>, payload: &PlayerPayload, logged: LogAction) -> State<G> {
        state.deltalog.clear();
        if self.game.undo_disabled() {
            warn!("Undo is disabled");
            return state;
        }
        if state.undo.len() < 2 {
            debug!("Nothing to undo");
            return state;
        }

        let last = &state.undo[state.undo.len() - 1];
        let restore = &state.undo[state.undo.len() - 2];

        if let Some(player) = &payload.player_id
            && last.player_id.as_ref() != Some(player)
        {
            warn!(player = %player, "Only the player who made the move can undo it");
            return state;
        }

        if let Some(move_type) = &last.move_type {
            let player = last.player_id.as_deref().unwrap_or(&restore.ctx.current_player);
            let undoable = self
                .flow
                .get_move(&restore.ctx, move_type, player)
                .is_none_or(|def| def.can_undo(&state.g, &state.ctx));
            if !undoable {
                warn!(move_type = %move_type, "Move cannot be undone");
                return state;
            }
        }

        state.push_log(logged.clone());

        let Some(last) = state.undo.pop() else {
            return state;
        };
        if let Some(restore) = state.undo.last() {
            state.g = restore.g.clone();
            state.ctx = restore.ctx.clone();
            state.plugins = restore.plugins.clone();
        }
        state.redo.insert(0, last);
        state.plugins = apply_action(self.game.plugins(), state.plugins, &logged);

        info!(undo_depth = state.undo.len(), "Move undone");
        self.finish(state)
    }

    fn redo(&self, mut state: State<G>, payload: &PlayerPayload, logged: LogAction) -> State<G> {
        state.deltalog.clear();
        if self.game.undo_disabled() {
            warn!("Redo is disabled");
            return state;
        }
        let Some(first) = state.redo.first() else {
            debug!("Nothing to redo");
            return state;
        };

        if let Some(player) = &payload.player_id
            && first.player_id.as_ref() != Some(player)
        {
            warn!(player = %player, "Only the player who undid the move can redo it");
            return state;
        }

        state.push_log(logged.clone());

        let entry = state.redo.remove(0);
        state.g = entry.g.clone();
        state.ctx = entry.ctx.clone();
        state.plugins = entry.plugins.clone();
        state.undo.push(entry);
        state.plugins = apply_action(self.game.plugins(), state.plugins, &logged);

        info!(redo_depth = state.redo.len(), "Move redone");
        self.finish(state)
    }

    fn finish(&self, mut state: State<G>) -> State<G> {
        state.log.extend(state.deltalog.iter().cloned());
        state.state_id += 1;
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::MoveDef;
    use serde_json::json;

    fn adder() -> Reducer<i64> {
        Reducer::new(
            Game::new("adder", |_ctx, _random, _data| 0i64)
                .with_seed(11)
                .with_move(
                    "add",
                    MoveDef::<i64>::new(|mc, args| match args.first().and_then(Value::as_i64) {
                        Some(n) => MoveResult::NewState(mc.g + n),
                        None => MoveResult::Invalid,
                    }),
                ),
        )
    }

    #[test]
    fn test_initialize_defaults_to_two_players() {
        let state = adder().initialize(0, None);
        assert_eq!(state.ctx.num_players, 2);
        assert_eq!(state.ctx.turn, 1);
        assert_eq!(state.state_id, 0);
        assert_eq!(state.undo.len(), 1);
        assert!(state.ctx.random.is_some());
    }

    #[test]
    fn test_invalid_move_leaves_state_untouched() {
        let reducer = adder();
        let state = reducer.initialize(2, None);
        let next = reducer.reduce(state.clone(), &Action::make_move("add", vec![json!("x")], "0"));
        assert_eq!(next.state_id, state.state_id);
        assert_eq!(next.g, 0);
        assert!(next.deltalog.is_empty());
    }

    #[test]
    fn test_restore_replaces_state() {
        let reducer = adder();
        let state = reducer.initialize(2, None);
        let mut other = state.clone();
        other.g = 99;
        other.state_id = 40;
        let next = reducer.reduce(state, &Action::Restore(Box::new(other.clone())));
        assert_eq!(next, other);
    }

    #[test]
    fn test_log_grows_by_deltalog() {
        let reducer = adder();
        let state = reducer.initialize(2, None);
        let state = reducer.reduce(state, &Action::make_move("add", vec![json!(2)], "0"));
        let state = reducer.reduce(state, &Action::make_move("add", vec![json!(3)], "0"));
        assert_eq!(state.g, 5);
        assert_eq!(state.state_id, 2);
        assert_eq!(state.log.len(), 2);
        assert_eq!(state.deltalog.len(), 1);
        assert_eq!(state.log[1].state_id, 1);
    }
}

//! Phase, turn and stage state machine.
//!
//! Every transition is a [`Step`] processed from a FIFO queue. A step may
//! schedule follow-up steps; after each one the engine evaluates the game's
//! `end_if`, then the phase's, then (only after moves and active-player
//! changes) the turn's, and synthesizes the matching end step when one
//! fires. Synthesized steps write `automatic` entries into the deltalog.

mod active_players;
mod turn_order;

pub use active_players::{
    ActivePlayersArg, StageArg, set_active_players, update_active_players_once_empty,
};
pub use turn_order::TurnOrder;

use crate::action::{FlowEvent, LogAction, MovePayload};
use crate::game::{
    EndIf, EndTrigger, EventsConfig, Game, Hook, MoveDef, MoveMap, PhaseConfig, TurnConfig,
};
use crate::state::{Ctx, PlayerId, State};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet, VecDeque};
use tracing::{debug, error, info, instrument, warn};

// ──────────────────────────────
// Compiled phases
// ──────────────────────────────

/// A phase with its turn options resolved against the game defaults.
#[derive(Clone)]
struct Phase<G> {
    next: Option<String>,
    on_begin: Option<Hook<G>>,
    on_end: Option<Hook<G>>,
    end_if: Option<EndIf<G, EndTrigger>>,
    moves: Option<MoveMap<G>>,
    turn: TurnConfig<G>,
}

impl<G: Clone> Phase<G> {
    fn compile(config: &PhaseConfig<G>, default_turn: &TurnConfig<G>) -> Self {
        Self {
            next: config.next.clone(),
            on_begin: config.on_begin.clone(),
            on_end: config.on_end.clone(),
            end_if: config.end_if.clone(),
            moves: config.moves.clone(),
            turn: config.turn.clone().unwrap_or_else(|| default_turn.clone()),
        }
    }

    fn default_phase(default_turn: &TurnConfig<G>) -> Self {
        Self {
            next: None,
            on_begin: None,
            on_end: None,
            end_if: None,
            moves: None,
            turn: default_turn.clone(),
        }
    }
}

fn run_hook<G>(hook: Option<&Hook<G>>, g: G, ctx: &Ctx) -> G {
    match hook {
        Some(hook) => hook(&g, ctx),
        None => g,
    }
}

// ──────────────────────────────
// Steps
// ──────────────────────────────

/// One transition in the processing queue.
#[derive(Debug, Clone)]
enum Step {
    StartGame,
    StartPhase,
    StartTurn {
        current_player: Option<PlayerId>,
    },
    UpdatePhase {
        arg: Option<EndTrigger>,
        phase: Option<String>,
    },
    UpdateTurn {
        arg: Option<EndTrigger>,
        current_player: PlayerId,
    },
    UpdateStage {
        arg: Option<StageArg>,
        player_id: PlayerId,
    },
    UpdateActivePlayers {
        arg: ActivePlayersArg,
    },
    EndGame {
        arg: Option<Value>,
        automatic: bool,
    },
    EndPhase {
        arg: Option<EndTrigger>,
        turn: u32,
        automatic: bool,
    },
    EndTurn {
        arg: Option<EndTrigger>,
        turn: u32,
        force: bool,
        automatic: bool,
    },
    EndStage {
        arg: Option<StageArg>,
        player_id: PlayerId,
        automatic: bool,
    },
    OnMove,
}

/// Bookkeeping shared by the steps of one processing run.
#[derive(Debug, Default)]
struct Run {
    phases_ended: HashSet<Option<String>>,
    turns_ended: HashSet<u32>,
}

// ──────────────────────────────
// Flow
// ──────────────────────────────

/// Compiled flow of a game.
#[derive(Clone)]
pub struct Flow<G> {
    phases: BTreeMap<String, Phase<G>>,
    default_phase: Phase<G>,
    starting_phase: Option<String>,
    moves: MoveMap<G>,
    end_if: Option<EndIf<G, Value>>,
    on_end: Option<Hook<G>>,
    events: EventsConfig,
}

impl<G: Clone> Flow<G> {
    /// Compiles the flow of `game`.
    #[instrument(skip(game), fields(game = %game.name))]
    pub fn new(game: &Game<G>) -> Self {
        let mut phases = BTreeMap::new();
        let mut starting_phase = None;
        for (name, config) in &game.phases {
            if name.is_empty() {
                warn!("Ignoring phase with empty name");
                continue;
            }
            if config.start {
                if let Some(previous) = &starting_phase {
                    warn!(
                        phase = %name,
                        previous = %previous,
                        "Multiple starting phases, keeping the last"
                    );
                }
                starting_phase = Some(name.clone());
            }
            phases.insert(name.clone(), Phase::compile(config, &game.turn));
        }
        debug!(phases = phases.len(), starting = ?starting_phase, "Compiled flow");

        Self {
            phases,
            default_phase: Phase::default_phase(&game.turn),
            starting_phase,
            moves: game.moves.clone(),
            end_if: game.end_if.clone(),
            on_end: game.on_end.clone(),
            events: game.events.clone(),
        }
    }

    /// Event switches.
    pub fn events(&self) -> &EventsConfig {
        &self.events
    }

    /// Control state before the game starts.
    #[instrument(skip(self))]
    pub fn initial_ctx(&self, num_players: usize) -> Ctx {
        Ctx {
            num_players,
            play_order: (0..num_players).map(|i| i.to_string()).collect(),
            play_order_pos: 0,
            current_player: "0".to_string(),
            turn: 0,
            phase: self.starting_phase.clone(),
            num_moves: 0,
            active_players: None,
            active_players_move_limit: None,
            active_players_num_moves: BTreeMap::new(),
            prev_active_players: Vec::new(),
            next_active_players: None,
            gameover: None,
            random: None,
        }
    }

    /// Starts the game: enters the starting phase and the first turn.
    #[instrument(skip_all)]
    pub fn init(&self, state: State<G>) -> State<G> {
        self.process(state, vec![Step::StartGame])
    }

    fn phase(&self, ctx: &Ctx) -> &Phase<G> {
        self.phase_named(ctx.phase.as_deref())
    }

    fn phase_named(&self, name: Option<&str>) -> &Phase<G> {
        name.and_then(|name| self.phases.get(name)).unwrap_or(&self.default_phase)
    }

    /// Resolves a move for a player: stage moves, then phase moves, then global moves.
    pub fn get_move(&self, ctx: &Ctx, name: &str, player_id: &str) -> Option<&MoveDef<G>> {
        let phase = self.phase(ctx);
        let stage_moves = ctx
            .stage_of(player_id)
            .and_then(|stage| phase.turn.stages.get(stage))
            .and_then(|stage| stage.moves.as_ref());
        if let Some(moves) = stage_moves {
            return moves.get(name);
        }
        if let Some(moves) = &phase.moves {
            return moves.get(name);
        }
        self.moves.get(name)
    }

    /// Whether `player_id` may act right now.
    pub fn is_player_active(&self, _g: &G, ctx: &Ctx, player_id: &str) -> bool {
        match &ctx.active_players {
            Some(active) => active.contains_key(player_id),
            None => ctx.current_player == player_id,
        }
    }

    /// Checks that a move exists, its player is active and still has moves left.
    pub fn can_player_make_move(&self, g: &G, ctx: &Ctx, payload: &MovePayload) -> bool {
        let player = payload.player_id.as_deref().unwrap_or(&ctx.current_player);
        if self.get_move(ctx, &payload.move_type, player).is_none() {
            return false;
        }
        if !self.is_player_active(g, ctx, player) {
            return false;
        }
        let limit = ctx
            .active_players_move_limit
            .as_ref()
            .and_then(|limits| limits.get(player));
        match limit {
            Some(limit) => ctx.active_players_num_moves.get(player).copied().unwrap_or(0) < *limit,
            None => true,
        }
    }

    // ──────────────────────────────
    // Entry points
    // ──────────────────────────────

    /// Updates counters after a move and runs any transitions it triggers.
    #[instrument(skip(self, state, payload), fields(move_type = %payload.move_type))]
    pub fn process_move(&self, mut state: State<G>, payload: &MovePayload) -> State<G> {
        let player = payload
            .player_id
            .clone()
            .unwrap_or_else(|| state.ctx.current_player.clone());
        let counted = self
            .get_move(&state.ctx, &payload.move_type, &player)
            .is_none_or(|def| !def.is_unlimited());

        if counted {
            if player == state.ctx.current_player {
                state.ctx.num_moves += 1;
            }
            if state.ctx.active_players.is_some() {
                *state.ctx.active_players_num_moves.entry(player.clone()).or_insert(0) += 1;
            }
        }

        let exhausted = state
            .ctx
            .active_players_move_limit
            .as_ref()
            .and_then(|limits| limits.get(&player))
            .is_some_and(|limit| {
                state
                    .ctx
                    .active_players_num_moves
                    .get(&player)
                    .copied()
                    .unwrap_or(0)
                    >= *limit
            });
        if exhausted {
            debug!(player = %player, "Stage move limit reached");
            state = self.end_stage(state, None, player.clone(), true, None);
        }

        let on_move = self.phase(&state.ctx).turn.on_move.clone();
        state.g = run_hook(on_move.as_ref(), state.g, &state.ctx);

        self.process(state, vec![Step::OnMove])
    }

    /// Applies a flow event requested by `player_id`.
    ///
    /// `automatic` marks events the player did not submit directly (for
    /// example events queued by a move); their transitions are logged.
    #[instrument(skip(self, state), fields(event = event.name()))]
    pub fn process_event(
        &self,
        state: State<G>,
        event: &FlowEvent,
        player_id: &str,
        automatic: bool,
    ) -> State<G> {
        let turn = state.ctx.turn;
        let step = match event {
            FlowEvent::EndStage => Step::EndStage {
                arg: None,
                player_id: player_id.to_string(),
                automatic,
            },
            FlowEvent::SetStage(arg) => Step::EndStage {
                arg: Some(arg.clone()),
                player_id: player_id.to_string(),
                automatic,
            },
            FlowEvent::SetActivePlayers(arg) => Step::UpdateActivePlayers { arg: arg.clone() },
            FlowEvent::EndPhase => Step::EndPhase {
                arg: None,
                turn,
                automatic,
            },
            FlowEvent::SetPhase(next) => Step::EndPhase {
                arg: Some(EndTrigger::to(next.clone())),
                turn,
                automatic,
            },
            FlowEvent::EndTurn(arg) => Step::EndTurn {
                arg: arg.clone(),
                turn,
                force: false,
                automatic,
            },
            FlowEvent::Pass(arg) => Step::EndTurn {
                arg: arg.clone(),
                turn,
                force: true,
                automatic,
            },
            FlowEvent::EndGame(arg) => Step::EndGame {
                arg: arg.clone(),
                automatic,
            },
        };
        self.process(state, vec![step])
    }

    // ──────────────────────────────
    // Processing loop
    // ──────────────────────────────

    fn process(&self, mut state: State<G>, steps: Vec<Step>) -> State<G> {
        let mut queue: VecDeque<Step> = steps.into();
        let mut run = Run::default();

        while let Some(step) = queue.pop_front() {
            if matches!(step, Step::EndPhase { .. })
                && !run.phases_ended.insert(state.ctx.phase.clone())
            {
                warn!(phase = ?state.ctx.phase, "Phase ended twice in one action, stopping");
                state.ctx.phase = None;
                return state;
            }

            let is_end_game = matches!(step, Step::EndGame { .. });
            let checks_turn = matches!(
                step,
                Step::OnMove | Step::UpdateStage { .. } | Step::UpdateActivePlayers { .. }
            );

            let mut next = Vec::new();
            state = self.apply(state, step, &mut run, &mut next);

            if is_end_game {
                break;
            }

            if let Some(result) = self.should_end_game(&state) {
                queue.push_back(Step::EndGame {
                    arg: Some(result),
                    automatic: true,
                });
                continue;
            }

            if let Some(trigger) = self.should_end_phase(&state) {
                queue.push_back(Step::EndPhase {
                    arg: Some(trigger),
                    turn: state.ctx.turn,
                    automatic: true,
                });
                continue;
            }

            if checks_turn && let Some(trigger) = self.should_end_turn(&state) {
                queue.push_back(Step::EndTurn {
                    arg: Some(trigger),
                    turn: state.ctx.turn,
                    force: false,
                    automatic: true,
                });
                continue;
            }

            queue.extend(next);
        }

        state
    }

    fn apply(&self, state: State<G>, step: Step, run: &mut Run, next: &mut Vec<Step>) -> State<G> {
        match step {
            Step::StartGame => {
                next.push(Step::StartPhase);
                state
            }
            Step::StartPhase => self.start_phase(state, next),
            Step::StartTurn { current_player } => self.start_turn(state, current_player),
            Step::UpdatePhase { arg, phase } => self.update_phase(state, arg, phase, next),
            Step::UpdateTurn { arg, current_player } => {
                self.update_turn(state, arg, current_player, next)
            }
            Step::UpdateStage { arg, player_id } => self.update_stage(state, arg, &player_id),
            Step::UpdateActivePlayers { arg } => {
                let mut state = state;
                state.ctx = set_active_players(state.ctx, &arg);
                state
            }
            Step::EndGame { arg, automatic } => self.end_game(state, arg, automatic, run),
            Step::EndPhase { arg, turn, automatic } => {
                self.end_phase(state, arg, turn, automatic, run, Some(next))
            }
            Step::EndTurn {
                arg,
                turn,
                force,
                automatic,
            } => self.end_turn(state, arg, turn, force, automatic, run, Some(next)),
            Step::EndStage {
                arg,
                player_id,
                automatic,
            } => self.end_stage(state, arg, player_id, automatic, Some(next)),
            Step::OnMove => state,
        }
    }

    // ──────────────────────────────
    // Automatic end conditions
    // ──────────────────────────────

    fn should_end_game(&self, state: &State<G>) -> Option<Value> {
        self.end_if.as_ref().and_then(|end_if| end_if(&state.g, &state.ctx))
    }

    fn should_end_phase(&self, state: &State<G>) -> Option<EndTrigger> {
        self.phase(&state.ctx)
            .end_if
            .as_ref()
            .and_then(|end_if| end_if(&state.g, &state.ctx))
    }

    fn should_end_turn(&self, state: &State<G>) -> Option<EndTrigger> {
        let turn = &self.phase(&state.ctx).turn;
        if turn.move_limit.is_some_and(|limit| state.ctx.num_moves >= limit) {
            return Some(EndTrigger::now());
        }
        turn.end_if.as_ref().and_then(|end_if| end_if(&state.g, &state.ctx))
    }

    // ──────────────────────────────
    // Start and update steps
    // ──────────────────────────────

    fn start_phase(&self, mut state: State<G>, next: &mut Vec<Step>) -> State<G> {
        let phase = self.phase(&state.ctx);
        info!(phase = ?state.ctx.phase, "Phase begins");
        state.g = run_hook(phase.on_begin.as_ref(), state.g, &state.ctx);
        next.push(Step::StartTurn { current_player: None });
        state
    }

    fn start_turn(&self, mut state: State<G>, current_player: Option<PlayerId>) -> State<G> {
        let turn = self.phase(&state.ctx).turn.clone();

        match current_player {
            Some(player) => {
                state.ctx.current_player = player;
                if let Some(arg) = &turn.active_players {
                    state.ctx = set_active_players(state.ctx, arg);
                }
            }
            None => state.ctx = init_turn_order_state(&state.g, state.ctx, &turn),
        }

        state.ctx.turn += 1;
        state.ctx.num_moves = 0;
        state.ctx.prev_active_players.clear();
        info!(turn = state.ctx.turn, player = %state.ctx.current_player, "Turn begins");

        state.g = run_hook(turn.on_begin.as_ref(), state.g, &state.ctx);
        state.undo.clear();
        state.redo.clear();
        state
    }

    fn update_phase(
        &self,
        mut state: State<G>,
        arg: Option<EndTrigger>,
        phase: Option<String>,
        next: &mut Vec<Step>,
    ) -> State<G> {
        let ended = self.phase_named(phase.as_deref());
        match arg.and_then(|arg| arg.next) {
            Some(target) if self.phases.contains_key(&target) => state.ctx.phase = Some(target),
            Some(target) => {
                error!(phase = %target, "Invalid argument to endPhase, no such phase");
                return state;
            }
            None => state.ctx.phase = ended.next.clone(),
        }
        next.push(Step::StartPhase);
        state
    }

    fn update_turn(
        &self,
        mut state: State<G>,
        arg: Option<EndTrigger>,
        current_player: PlayerId,
        next: &mut Vec<Step>,
    ) -> State<G> {
        let turn = self.phase(&state.ctx).turn.clone();
        let (ctx, ends_phase) =
            update_turn_order_state(&state.g, state.ctx, &turn, current_player, arg.as_ref());
        state.ctx = ctx;

        if ends_phase {
            next.push(Step::EndPhase {
                arg: None,
                turn: state.ctx.turn,
                automatic: true,
            });
        } else {
            next.push(Step::StartTurn {
                current_player: Some(state.ctx.current_player.clone()),
            });
        }
        state
    }

    fn update_stage(
        &self,
        mut state: State<G>,
        arg: Option<StageArg>,
        player_id: &str,
    ) -> State<G> {
        let Some(arg) = arg else {
            return state;
        };
        let ctx = &mut state.ctx;
        ctx.active_players
            .get_or_insert_with(BTreeMap::new)
            .insert(player_id.to_string(), arg.stage.clone());
        ctx.active_players_num_moves.insert(player_id.to_string(), 0);
        if let Some(limit) = arg.move_limit {
            ctx.active_players_move_limit
                .get_or_insert_with(BTreeMap::new)
                .insert(player_id.to_string(), limit);
        }
        debug!(player = %player_id, stage = ?arg.stage, "Player entered stage");
        state
    }

    // ──────────────────────────────
    // End steps
    // ──────────────────────────────

    fn end_game(
        &self,
        mut state: State<G>,
        arg: Option<Value>,
        automatic: bool,
        run: &mut Run,
    ) -> State<G> {
        let turn = state.ctx.turn;
        state = self.end_phase(state, None, turn, true, run, None);

        if automatic {
            let logged = FlowEvent::EndGame(arg.clone());
            state.push_log(LogAction::automatic_event(logged)).automatic = true;
        }

        let result = arg.unwrap_or(Value::Bool(true));
        info!(result = %result, "Game over");
        state.ctx.gameover = Some(result);
        state.g = run_hook(self.on_end.as_ref(), state.g, &state.ctx);
        state
    }

    fn end_phase(
        &self,
        mut state: State<G>,
        arg: Option<EndTrigger>,
        turn: u32,
        automatic: bool,
        run: &mut Run,
        next: Option<&mut Vec<Step>>,
    ) -> State<G> {
        state = self.end_turn(state, None, turn, true, true, run, None);

        let phase = state.ctx.phase.clone();
        if let Some(next) = next {
            next.push(Step::UpdatePhase {
                arg: arg.clone(),
                phase: phase.clone(),
            });
        }

        let Some(name) = phase else {
            return state;
        };

        let on_end = self.phase_named(Some(&name)).on_end.clone();
        state.g = run_hook(on_end.as_ref(), state.g, &state.ctx);
        state.ctx.phase = None;
        info!(phase = %name, "Phase ends");

        if automatic {
            let logged = match arg {
                Some(EndTrigger { next: Some(target) }) => FlowEvent::SetPhase(target),
                _ => FlowEvent::EndPhase,
            };
            let entry = state.push_log(LogAction::automatic_event(logged));
            entry.phase = Some(name);
            entry.automatic = true;
        }
        state
    }

    #[allow(clippy::too_many_arguments)]
    fn end_turn(
        &self,
        mut state: State<G>,
        arg: Option<EndTrigger>,
        turn: u32,
        force: bool,
        automatic: bool,
        run: &mut Run,
        next: Option<&mut Vec<Step>>,
    ) -> State<G> {
        if turn != state.ctx.turn || run.turns_ended.contains(&turn) {
            return state;
        }

        let config = self.phase(&state.ctx).turn.clone();
        if !force && config.min_moves.is_some_and(|min| state.ctx.num_moves < min) {
            info!(
                num_moves = state.ctx.num_moves,
                min_moves = ?config.min_moves,
                "Cannot end turn before minimum moves are made"
            );
            return state;
        }

        state.g = run_hook(config.on_end.as_ref(), state.g, &state.ctx);

        if let Some(next) = next {
            next.push(Step::UpdateTurn {
                arg: arg.clone(),
                current_player: state.ctx.current_player.clone(),
            });
        }

        state.ctx.active_players = None;
        state.ctx.active_players_move_limit = None;
        state.ctx.active_players_num_moves.clear();
        run.turns_ended.insert(turn);
        info!(turn, player = %state.ctx.current_player, "Turn ends");

        if automatic {
            state.push_log(LogAction::automatic_event(FlowEvent::EndTurn(arg))).automatic = true;
        }

        state.undo.clear();
        state.redo.clear();
        state
    }

    fn end_stage(
        &self,
        mut state: State<G>,
        arg: Option<StageArg>,
        player_id: PlayerId,
        automatic: bool,
        next: Option<&mut Vec<Step>>,
    ) -> State<G> {
        let in_stage = state
            .ctx
            .active_players
            .as_ref()
            .is_some_and(|active| active.contains_key(&player_id));

        let arg = arg.or_else(|| {
            let stage = state.ctx.stage_of(&player_id)?;
            let follow_up = self.phase(&state.ctx).turn.stages.get(stage)?.next.clone()?;
            Some(StageArg::named(follow_up))
        });

        if let Some(next) = next {
            next.push(Step::UpdateStage {
                arg: arg.clone(),
                player_id: player_id.clone(),
            });
        }

        if !in_stage {
            return state;
        }

        if let Some(active) = state.ctx.active_players.as_mut() {
            active.remove(&player_id);
        }
        if let Some(limits) = state.ctx.active_players_move_limit.as_mut() {
            limits.remove(&player_id);
        }
        state.ctx = update_active_players_once_empty(state.ctx);
        debug!(player = %player_id, "Player left stage");

        if automatic {
            let logged = match arg {
                Some(arg) => FlowEvent::SetStage(arg),
                None => FlowEvent::EndStage,
            };
            let entry = state.push_log(LogAction::automatic_event(logged));
            entry.automatic = true;
            if let LogAction::GameEvent(payload) = &mut entry.action {
                payload.player_id = Some(player_id);
            }
        }
        state
    }
}

// ──────────────────────────────
// Turn order state
// ──────────────────────────────

/// Seats the first player of a phase and applies the turn's active players.
fn init_turn_order_state<G>(g: &G, mut ctx: Ctx, turn: &TurnConfig<G>) -> Ctx {
    if let Some(order) = turn.order.play_order(g, &ctx) {
        ctx.play_order = order;
    }

    let mut pos = turn.order.first(g, &ctx);
    if pos >= ctx.play_order.len() {
        warn!(pos, players = ctx.play_order.len(), "First player out of range, using seat 0");
        pos = 0;
    }
    ctx.play_order_pos = pos;
    if let Some(player) = ctx.play_order.get(pos) {
        ctx.current_player = player.clone();
    }

    let arg = turn.active_players.clone().unwrap_or_default();
    set_active_players(ctx, &arg)
}

/// Picks the next player. Returns `true` when the order is exhausted.
fn update_turn_order_state<G>(
    g: &G,
    mut ctx: Ctx,
    turn: &TurnConfig<G>,
    current_player: PlayerId,
    arg: Option<&EndTrigger>,
) -> (Ctx, bool) {
    ctx.current_player = current_player;

    if let Some(target) = arg.and_then(|arg| arg.next.as_ref()) {
        match ctx.play_order.iter().position(|player| player == target) {
            Some(pos) => {
                ctx.play_order_pos = pos;
                ctx.current_player = target.clone();
            }
            None => error!(
                player = %target,
                "Invalid argument to endTurn, player not in play order"
            ),
        }
        return (ctx, false);
    }

    match turn.order.next(g, &ctx) {
        Some(pos) => match ctx.play_order.get(pos).cloned() {
            Some(player) => {
                ctx.play_order_pos = pos;
                ctx.current_player = player;
                (ctx, false)
            }
            None => {
                error!(pos, "Turn order returned a seat outside the play order");
                (ctx, false)
            }
        },
        None => (ctx, true),
    }
}

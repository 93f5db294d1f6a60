//! Game definitions: setup, moves, phases, turns, stages and hooks.
//!
//! A [`Game`] is assembled with builder methods and then handed to a
//! [`crate::Reducer`] (or a [`crate::Master`]), which compiles the flow.
//! Hooks are plain closures over `(&G, &Ctx)` that return a new `G`, so the
//! flow engine can thread state through them without sharing mutable access.

use crate::flow::{ActivePlayersArg, StageArg, TurnOrder};
use crate::action::FlowEvent;
use crate::plugin::Plugin;
use crate::random::Random;
use crate::state::{Ctx, PlayerId, PluginState, StageName};
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Hook that derives a new `G` from the current state.
pub type Hook<G> = Arc<dyn Fn(&G, &Ctx) -> G + Send + Sync>;

/// Predicate that may fire with a value of type `T`.
pub type EndIf<G, T> = Arc<dyn Fn(&G, &Ctx) -> Option<T> + Send + Sync>;

/// Builds the initial `G`.
pub type SetupFn<G> = Arc<dyn Fn(&Ctx, &mut Random, Option<&Value>) -> G + Send + Sync>;

/// Projects `G` for one recipient (`None` for spectators).
pub type PlayerViewFn<G> = Arc<dyn Fn(&G, &Ctx, Option<&str>) -> G + Send + Sync>;

/// Move implementation.
pub type MoveFn<G> =
    Arc<dyn for<'a> Fn(MoveContext<'a, G>, &[Value]) -> MoveResult<G> + Send + Sync>;

/// Moves keyed by name.
pub type MoveMap<G> = BTreeMap<String, MoveDef<G>>;

/// Outcome of running a move.
#[derive(Debug, Clone, PartialEq)]
pub enum MoveResult<G> {
    /// The move produced a new `G`.
    NewState(G),
    /// The move refused the arguments; the state is left untouched.
    Invalid,
}

/// Argument of phase and turn transitions.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EndTrigger {
    /// Phase (or player) to transition to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

impl EndTrigger {
    /// Ends without naming a successor.
    pub fn now() -> Self {
        Self::default()
    }

    /// Ends and transitions to `next`.
    pub fn to(next: impl Into<String>) -> Self {
        Self {
            next: Some(next.into()),
        }
    }
}

/// Flow events a move asked for, applied after the move settles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Events {
    queued: Vec<FlowEvent>,
}

impl Events {
    /// Ends the current turn.
    pub fn end_turn(&mut self) {
        self.queued.push(FlowEvent::EndTurn(None));
    }

    /// Ends the current turn and hands it to `player_id`.
    pub fn end_turn_to(&mut self, player_id: impl Into<PlayerId>) {
        self.queued.push(FlowEvent::EndTurn(Some(EndTrigger::to(player_id))));
    }

    /// Ends the current phase.
    pub fn end_phase(&mut self) {
        self.queued.push(FlowEvent::EndPhase);
    }

    /// Moves to the named phase.
    pub fn set_phase(&mut self, phase: impl Into<String>) {
        self.queued.push(FlowEvent::SetPhase(phase.into()));
    }

    /// Removes the acting player from its stage.
    pub fn end_stage(&mut self) {
        self.queued.push(FlowEvent::EndStage);
    }

    /// Moves the acting player into a stage.
    pub fn set_stage(&mut self, stage: impl Into<StageArg>) {
        self.queued.push(FlowEvent::SetStage(stage.into()));
    }

    /// Replaces the active-players configuration.
    pub fn set_active_players(&mut self, arg: ActivePlayersArg) {
        self.queued.push(FlowEvent::SetActivePlayers(arg));
    }

    /// Ends the game with a result.
    pub fn end_game(&mut self, result: Option<Value>) {
        self.queued.push(FlowEvent::EndGame(result));
    }

    /// Takes the queued events in request order.
    pub fn drain(&mut self) -> Vec<FlowEvent> {
        std::mem::take(&mut self.queued)
    }
}

/// Everything a move can see and touch.
pub struct MoveContext<'a, G> {
    /// Current game payload.
    pub g: &'a G,
    /// Current control state.
    pub ctx: &'a Ctx,
    /// Player making the move.
    pub player_id: &'a str,
    /// Deterministic randomness.
    pub random: &'a mut Random,
    /// Flow events to apply after the move.
    pub events: &'a mut Events,
    /// Plugin data, writable by the move.
    pub plugins: &'a mut BTreeMap<String, PluginState>,
}

/// Whether a move may be undone.
#[derive(Clone)]
pub enum Undoable<G> {
    /// Always undoable.
    Always,
    /// Never undoable.
    Never,
    /// Undoable when the predicate holds for the state being undone.
    When(Arc<dyn Fn(&G, &Ctx) -> bool + Send + Sync>),
}

/// A move and its options.
#[derive(Clone)]
pub struct MoveDef<G> {
    func: MoveFn<G>,
    redact: bool,
    no_limit: bool,
    undoable: Undoable<G>,
    ignore_stale_state_id: bool,
}

impl<G> MoveDef<G> {
    /// Wraps a move function with default options.
    pub fn new<F>(func: F) -> Self
    where
        F: for<'a> Fn(MoveContext<'a, G>, &[Value]) -> MoveResult<G> + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
            redact: false,
            no_limit: false,
            undoable: Undoable::Always,
            ignore_stale_state_id: false,
        }
    }

    /// Hides the move's arguments from other players' logs.
    pub fn redact(mut self) -> Self {
        self.redact = true;
        self
    }

    /// Excludes the move from move counters and limits.
    pub fn no_limit(mut self) -> Self {
        self.no_limit = true;
        self
    }

    /// Sets whether the move may be undone.
    pub fn undoable(mut self, undoable: bool) -> Self {
        self.undoable = if undoable { Undoable::Always } else { Undoable::Never };
        self
    }

    /// Allows undo only while the predicate holds.
    pub fn undoable_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&G, &Ctx) -> bool + Send + Sync + 'static,
    {
        self.undoable = Undoable::When(Arc::new(predicate));
        self
    }

    /// Accepts the move even when the client's state version is stale.
    pub fn ignore_stale_state_id(mut self) -> Self {
        self.ignore_stale_state_id = true;
        self
    }

    /// Runs the move.
    pub fn call(&self, context: MoveContext<'_, G>, args: &[Value]) -> MoveResult<G> {
        (self.func)(context, args)
    }

    /// Whether log arguments are redacted.
    pub fn is_redacted(&self) -> bool {
        self.redact
    }

    /// Whether the move skips move counters.
    pub fn is_unlimited(&self) -> bool {
        self.no_limit
    }

    /// Whether stale state versions are tolerated.
    pub fn ignores_stale_state_id(&self) -> bool {
        self.ignore_stale_state_id
    }

    /// Whether the move can be undone from the given state.
    pub fn can_undo(&self, g: &G, ctx: &Ctx) -> bool {
        match &self.undoable {
            Undoable::Always => true,
            Undoable::Never => false,
            Undoable::When(predicate) => predicate(g, ctx),
        }
    }
}

impl<G> fmt::Debug for MoveDef<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MoveDef")
            .field("redact", &self.redact)
            .field("no_limit", &self.no_limit)
            .field("ignore_stale_state_id", &self.ignore_stale_state_id)
            .finish_non_exhaustive()
    }
}

/// Options of a stage.
#[derive(Clone)]
pub struct StageConfig<G> {
    /// Moves available inside the stage, replacing the phase and global moves.
    pub moves: Option<MoveMap<G>>,
    /// Stage the player moves to when this one ends.
    pub next: Option<StageName>,
}

impl<G> Default for StageConfig<G> {
    fn default() -> Self {
        Self {
            moves: None,
            next: None,
        }
    }
}

impl<G> StageConfig<G> {
    /// Empty stage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a stage-local move.
    pub fn with_move(mut self, name: impl Into<String>, def: MoveDef<G>) -> Self {
        self.moves.get_or_insert_with(BTreeMap::new).insert(name.into(), def);
        self
    }

    /// Sets the follow-up stage.
    pub fn with_next(mut self, next: impl Into<StageName>) -> Self {
        self.next = Some(next.into());
        self
    }
}

/// Options of a turn.
#[derive(Clone)]
pub struct TurnConfig<G> {
    /// Active players applied at the start of every turn.
    pub active_players: Option<ActivePlayersArg>,
    /// The turn ends once the current player made this many moves.
    pub move_limit: Option<u32>,
    /// `endTurn` is refused before the current player made this many moves.
    pub min_moves: Option<u32>,
    /// Runs when a turn begins.
    pub on_begin: Option<Hook<G>>,
    /// Runs when a turn ends.
    pub on_end: Option<Hook<G>>,
    /// Ends the turn when it fires.
    pub end_if: Option<EndIf<G, EndTrigger>>,
    /// Runs after every counted move.
    pub on_move: Option<Hook<G>>,
    /// Stages keyed by name.
    pub stages: BTreeMap<StageName, StageConfig<G>>,
    /// Turn order strategy.
    pub order: TurnOrder<G>,
}

impl<G> Default for TurnConfig<G> {
    fn default() -> Self {
        Self {
            active_players: None,
            move_limit: None,
            min_moves: None,
            on_begin: None,
            on_end: None,
            end_if: None,
            on_move: None,
            stages: BTreeMap::new(),
            order: TurnOrder::default(),
        }
    }
}

impl<G> TurnConfig<G> {
    /// Default turn: round robin, no limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the active players applied at turn start.
    pub fn with_active_players(mut self, arg: ActivePlayersArg) -> Self {
        self.active_players = Some(arg);
        self
    }

    /// Ends the turn automatically after `limit` moves.
    pub fn with_move_limit(mut self, limit: u32) -> Self {
        self.move_limit = Some(limit);
        self
    }

    /// Refuses `endTurn` before `min` moves.
    pub fn with_min_moves(mut self, min: u32) -> Self {
        self.min_moves = Some(min);
        self
    }

    /// Sets the turn order.
    pub fn with_order(mut self, order: TurnOrder<G>) -> Self {
        self.order = order;
        self
    }

    /// Adds a stage.
    pub fn with_stage(mut self, name: impl Into<StageName>, stage: StageConfig<G>) -> Self {
        self.stages.insert(name.into(), stage);
        self
    }

    /// Runs `hook` when a turn begins.
    pub fn on_begin<F>(mut self, hook: F) -> Self
    where
        F: Fn(&G, &Ctx) -> G + Send + Sync + 'static,
    {
        self.on_begin = Some(Arc::new(hook));
        self
    }

    /// Runs `hook` when a turn ends.
    pub fn on_end<F>(mut self, hook: F) -> Self
    where
        F: Fn(&G, &Ctx) -> G + Send + Sync + 'static,
    {
        self.on_end = Some(Arc::new(hook));
        self
    }

    /// Runs `hook` after each counted move.
    pub fn on_move<F>(mut self, hook: F) -> Self
    where
        F: Fn(&G, &Ctx) -> G + Send + Sync + 'static,
    {
        self.on_move = Some(Arc::new(hook));
        self
    }

    /// Ends the turn when `predicate` fires.
    pub fn end_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&G, &Ctx) -> Option<EndTrigger> + Send + Sync + 'static,
    {
        self.end_if = Some(Arc::new(predicate));
        self
    }
}

/// Options of a phase.
#[derive(Clone)]
pub struct PhaseConfig<G> {
    /// The game starts in this phase.
    pub start: bool,
    /// Phase entered when this one ends.
    pub next: Option<String>,
    /// Runs when the phase begins.
    pub on_begin: Option<Hook<G>>,
    /// Runs when the phase ends.
    pub on_end: Option<Hook<G>>,
    /// Ends the phase when it fires.
    pub end_if: Option<EndIf<G, EndTrigger>>,
    /// Moves available during the phase, replacing the global moves.
    pub moves: Option<MoveMap<G>>,
    /// Turn options for the phase, replacing the game's.
    pub turn: Option<TurnConfig<G>>,
}

impl<G> Default for PhaseConfig<G> {
    fn default() -> Self {
        Self {
            start: false,
            next: None,
            on_begin: None,
            on_end: None,
            end_if: None,
            moves: None,
            turn: None,
        }
    }
}

impl<G> PhaseConfig<G> {
    /// Empty phase.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks this phase as the starting phase.
    pub fn start(mut self) -> Self {
        self.start = true;
        self
    }

    /// Sets the follow-up phase.
    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }

    /// Adds a phase-local move.
    pub fn with_move(mut self, name: impl Into<String>, def: MoveDef<G>) -> Self {
        self.moves.get_or_insert_with(BTreeMap::new).insert(name.into(), def);
        self
    }

    /// Sets the phase's turn options.
    pub fn with_turn(mut self, turn: TurnConfig<G>) -> Self {
        self.turn = Some(turn);
        self
    }

    /// Runs `hook` when the phase begins.
    pub fn on_begin<F>(mut self, hook: F) -> Self
    where
        F: Fn(&G, &Ctx) -> G + Send + Sync + 'static,
    {
        self.on_begin = Some(Arc::new(hook));
        self
    }

    /// Runs `hook` when the phase ends.
    pub fn on_end<F>(mut self, hook: F) -> Self
    where
        F: Fn(&G, &Ctx) -> G + Send + Sync + 'static,
    {
        self.on_end = Some(Arc::new(hook));
        self
    }

    /// Ends the phase when `predicate` fires.
    pub fn end_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&G, &Ctx) -> Option<EndTrigger> + Send + Sync + 'static,
    {
        self.end_if = Some(Arc::new(predicate));
        self
    }
}

/// Switches for the events players may trigger directly.
#[derive(Debug, Clone, PartialEq, Eq, Setters, Serialize, Deserialize)]
#[setters(prefix = "with_")]
#[serde(rename_all = "camelCase")]
pub struct EventsConfig {
    /// `endGame`.
    pub end_game: bool,
    /// `endPhase`.
    pub end_phase: bool,
    /// `setPhase`.
    pub set_phase: bool,
    /// `endTurn`.
    pub end_turn: bool,
    /// `pass`.
    pub pass: bool,
    /// `endStage`.
    pub end_stage: bool,
    /// `setStage`.
    pub set_stage: bool,
    /// `setActivePlayers`.
    pub set_active_players: bool,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            end_game: true,
            end_phase: true,
            set_phase: true,
            end_turn: true,
            pass: true,
            end_stage: true,
            set_stage: true,
            set_active_players: true,
        }
    }
}

impl EventsConfig {
    /// Whether the event is enabled.
    pub fn allows(&self, event: &FlowEvent) -> bool {
        match event {
            FlowEvent::EndGame(_) => self.end_game,
            FlowEvent::EndPhase => self.end_phase,
            FlowEvent::SetPhase(_) => self.set_phase,
            FlowEvent::EndTurn(_) => self.end_turn,
            FlowEvent::Pass(_) => self.pass,
            FlowEvent::EndStage => self.end_stage,
            FlowEvent::SetStage(_) => self.set_stage,
            FlowEvent::SetActivePlayers(_) => self.set_active_players,
        }
    }
}

/// Complete definition of a game.
#[derive(Clone)]
pub struct Game<G> {
    pub(crate) name: String,
    pub(crate) setup: SetupFn<G>,
    pub(crate) moves: MoveMap<G>,
    pub(crate) phases: BTreeMap<String, PhaseConfig<G>>,
    pub(crate) turn: TurnConfig<G>,
    pub(crate) end_if: Option<EndIf<G, Value>>,
    pub(crate) on_end: Option<Hook<G>>,
    pub(crate) player_view: Option<PlayerViewFn<G>>,
    pub(crate) plugins: Vec<Arc<dyn Plugin<G>>>,
    pub(crate) events: EventsConfig,
    pub(crate) disable_undo: bool,
    pub(crate) seed: Option<u64>,
}

impl<G> Game<G> {
    /// New game with the given name and setup function.
    pub fn new<F>(name: impl Into<String>, setup: F) -> Self
    where
        F: Fn(&Ctx, &mut Random, Option<&Value>) -> G + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            setup: Arc::new(setup),
            moves: BTreeMap::new(),
            phases: BTreeMap::new(),
            turn: TurnConfig::default(),
            end_if: None,
            on_end: None,
            player_view: None,
            plugins: Vec::new(),
            events: EventsConfig::default(),
            disable_undo: false,
            seed: None,
        }
    }

    /// Adds a global move.
    pub fn with_move(mut self, name: impl Into<String>, def: MoveDef<G>) -> Self {
        self.moves.insert(name.into(), def);
        self
    }

    /// Adds a phase.
    pub fn with_phase(mut self, name: impl Into<String>, phase: PhaseConfig<G>) -> Self {
        self.phases.insert(name.into(), phase);
        self
    }

    /// Sets the default turn options.
    pub fn with_turn(mut self, turn: TurnConfig<G>) -> Self {
        self.turn = turn;
        self
    }

    /// Ends the game with the returned result when it fires.
    pub fn end_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&G, &Ctx) -> Option<Value> + Send + Sync + 'static,
    {
        self.end_if = Some(Arc::new(predicate));
        self
    }

    /// Runs `hook` once the game ends.
    pub fn on_end<F>(mut self, hook: F) -> Self
    where
        F: Fn(&G, &Ctx) -> G + Send + Sync + 'static,
    {
        self.on_end = Some(Arc::new(hook));
        self
    }

    /// Hides secret parts of `G` from each recipient.
    pub fn with_player_view<F>(mut self, view: F) -> Self
    where
        F: Fn(&G, &Ctx, Option<&str>) -> G + Send + Sync + 'static,
    {
        self.player_view = Some(Arc::new(view));
        self
    }

    /// Registers a plugin.
    pub fn with_plugin(mut self, plugin: Arc<dyn Plugin<G>>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Sets which events players may trigger.
    pub fn with_events(mut self, events: EventsConfig) -> Self {
        self.events = events;
        self
    }

    /// Turns off undo and redo.
    pub fn disable_undo(mut self) -> Self {
        self.disable_undo = true;
        self
    }

    /// Fixes the PRNG seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Name of the game.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Global moves.
    pub fn moves(&self) -> &MoveMap<G> {
        &self.moves
    }

    /// Phases keyed by name.
    pub fn phases(&self) -> &BTreeMap<String, PhaseConfig<G>> {
        &self.phases
    }

    /// Event switches.
    pub fn events(&self) -> &EventsConfig {
        &self.events
    }

    /// Registered plugins.
    pub fn plugins(&self) -> &[Arc<dyn Plugin<G>>] {
        &self.plugins
    }

    /// Whether undo and redo are off.
    pub fn undo_disabled(&self) -> bool {
        self.disable_undo
    }

    /// Configured seed, if any.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Builds the initial `G`.
    pub fn setup(&self, ctx: &Ctx, random: &mut Random, setup_data: Option<&Value>) -> G {
        (self.setup)(ctx, random, setup_data)
    }

    /// `G` as seen by `player_id`.
    pub fn player_view(&self, g: &G, ctx: &Ctx, player_id: Option<&str>) -> G
    where
        G: Clone,
    {
        match &self.player_view {
            Some(view) => view(g, ctx, player_id),
            None => g.clone(),
        }
    }

    /// Every move name declared anywhere in the game.
    pub fn move_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.moves.keys().cloned().collect();
        let turns = std::iter::once(&self.turn)
            .chain(self.phases.values().filter_map(|phase| phase.turn.as_ref()));
        let phase_moves = self.phases.values().filter_map(|phase| phase.moves.as_ref());
        let stage_moves =
            turns.flat_map(|turn| turn.stages.values().filter_map(|stage| stage.moves.as_ref()));
        for moves in phase_moves.chain(stage_moves) {
            names.extend(moves.keys().cloned());
        }
        names.sort();
        names.dedup();
        names
    }
}

impl<G> fmt::Debug for Game<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Game")
            .field("name", &self.name)
            .field("moves", &self.moves.keys().collect::<Vec<_>>())
            .field("phases", &self.phases.keys().collect::<Vec<_>>())
            .field("events", &self.events)
            .field("disable_undo", &self.disable_undo)
            .finish_non_exhaustive()
    }
}

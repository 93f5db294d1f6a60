//! Tests for phases, turns, stages and active players driven through the reducer.

use serde_json::json;
use strictly_turns::{
    Action, ActivePlayersArg, EndTrigger, EventsConfig, FlowEvent, Game, LogAction, MoveDef,
    MoveResult, PhaseConfig, Reducer, StageArg, StageConfig, State, TurnConfig, TurnOrder,
};

fn bump() -> MoveDef<u32> {
    MoveDef::<u32>::new(|mc, _args| MoveResult::NewState(mc.g + 1))
}

fn event(reducer: &Reducer<u32>, state: State<u32>, event: FlowEvent, player: &str) -> State<u32> {
    reducer.reduce(state, &Action::game_event(event, player))
}

fn mv(reducer: &Reducer<u32>, state: State<u32>, name: &str, player: &str) -> State<u32> {
    reducer.reduce(state, &Action::make_move(name, Vec::new(), player))
}

fn assert_turn_invariant(state: &State<u32>) {
    assert_eq!(
        state.ctx.play_order.get(state.ctx.play_order_pos),
        Some(&state.ctx.current_player)
    );
}

#[test]
fn test_turn_invariant_holds_round_robin() {
    let reducer =
        Reducer::new(Game::new("counter", |_ctx, _random, _data| 0u32).with_move("bump", bump()));
    let mut state = reducer.initialize(3, None);
    assert_turn_invariant(&state);

    for expected in ["1", "2", "0", "1"] {
        let player = state.ctx.current_player.clone();
        state = mv(&reducer, state, "bump", &player);
        state = event(&reducer, state, FlowEvent::EndTurn(None), &player);
        assert_eq!(state.ctx.current_player, expected);
        assert_turn_invariant(&state);
    }
    assert_eq!(state.ctx.turn, 5);
    assert_eq!(state.g, 4);
}

#[test]
fn test_end_turn_to_named_player() {
    let reducer =
        Reducer::new(Game::new("counter", |_ctx, _random, _data| 0u32).with_move("bump", bump()));
    let state = reducer.initialize(4, None);
    let state = event(&reducer, state, FlowEvent::EndTurn(Some(EndTrigger::to("3"))), "0");
    assert_eq!(state.ctx.current_player, "3");
    assert_eq!(state.ctx.play_order_pos, 3);

    let state = event(&reducer, state, FlowEvent::EndTurn(None), "3");
    assert_eq!(state.ctx.current_player, "0");
}

#[test]
fn test_phase_end_if_moves_to_next_phase() {
    let game = Game::new("phased", |_ctx, _random, _data| 0u32)
        .with_phase(
            "setup",
            PhaseConfig::<u32>::new()
                .start()
                .with_next("main")
                .with_move("bump", bump())
                .end_if(|g: &u32, _ctx| (*g >= 2).then(EndTrigger::now)),
        )
        .with_phase(
            "main",
            PhaseConfig::<u32>::new().with_move(
                "double",
                MoveDef::<u32>::new(|mc, _args| MoveResult::NewState(mc.g * 2)),
            ),
        );
    let reducer = Reducer::new(game);
    let state = reducer.initialize(2, None);
    assert_eq!(state.ctx.phase.as_deref(), Some("setup"));

    let state = mv(&reducer, state, "bump", "0");
    let state = mv(&reducer, state, "bump", "0");
    assert_eq!(state.ctx.phase.as_deref(), Some("main"));
    let automatic: Vec<&str> = state
        .deltalog
        .iter()
        .filter(|entry| entry.automatic)
        .filter_map(|entry| match &entry.action {
            LogAction::GameEvent(payload) => Some(payload.event.name()),
            _ => None,
        })
        .collect();
    assert_eq!(automatic, vec!["endTurn", "endPhase"]);

    // Phase moves replace the other phase's moves.
    let refused = mv(&reducer, state.clone(), "bump", &state.ctx.current_player.clone());
    assert_eq!(refused.state_id, state.state_id);
    let player = state.ctx.current_player.clone();
    let doubled = mv(&reducer, state, "double", &player);
    assert_eq!(doubled.g, 4);
}

#[test]
fn test_set_phase_event() {
    let game = Game::new("phased", |_ctx, _random, _data| 0u32)
        .with_move("bump", bump())
        .with_phase("a", PhaseConfig::<u32>::new().start())
        .with_phase("b", PhaseConfig::<u32>::new());
    let reducer = Reducer::new(game);
    let state = reducer.initialize(2, None);
    let state = event(&reducer, state, FlowEvent::SetPhase("b".into()), "0");
    assert_eq!(state.ctx.phase.as_deref(), Some("b"));

    let unknown = event(&reducer, state.clone(), FlowEvent::SetPhase("nowhere".into()), "1");
    assert_eq!(unknown.ctx.phase, None);
}

#[test]
fn test_stage_moves_and_move_limit() {
    let game = Game::new("staged", |_ctx, _random, _data| 0u32)
        .with_move("bump", bump())
        .with_turn(TurnConfig::<u32>::new().with_stage(
            "discard",
            StageConfig::<u32>::new().with_move(
                "discard",
                MoveDef::<u32>::new(|mc, _args| MoveResult::NewState(mc.g + 10)),
            ),
        ));
    let reducer = Reducer::new(game);
    let state = reducer.initialize(3, None);
    let arg = ActivePlayersArg::others().with_others(StageArg::named("discard").with_move_limit(1));
    let state = event(&reducer, state, FlowEvent::SetActivePlayers(arg), "0");

    let active = state.ctx.active_players.clone().expect("Others are active");
    assert_eq!(active.get("1"), Some(&Some("discard".to_string())));
    assert!(!active.contains_key("0"));

    // Stage moves replace the global ones for players in the stage.
    let refused = mv(&reducer, state.clone(), "bump", "1");
    assert_eq!(refused.state_id, state.state_id);

    let state = mv(&reducer, state, "discard", "1");
    assert_eq!(state.g, 10);
    assert!(!state.ctx.active_players.as_ref().is_some_and(|a| a.contains_key("1")));

    let state = mv(&reducer, state, "discard", "2");
    assert_eq!(state.g, 20);
    assert_eq!(state.ctx.active_players, None);
    assert_eq!(state.ctx.current_player, "0");
}

#[test]
fn test_set_stage_and_end_stage_events() {
    let game = Game::new("staged", |_ctx, _random, _data| 0u32)
        .with_move("bump", bump())
        .with_turn(
            TurnConfig::<u32>::new()
                .with_stage("first", StageConfig::<u32>::new().with_next("second"))
                .with_stage("second", StageConfig::<u32>::new()),
        );
    let reducer = Reducer::new(game);
    let state = reducer.initialize(2, None);
    let state = event(&reducer, state, FlowEvent::SetStage(StageArg::from("first")), "0");
    assert_eq!(state.ctx.stage_of("0"), Some("first"));

    let state = event(&reducer, state, FlowEvent::EndStage, "0");
    assert_eq!(state.ctx.stage_of("0"), Some("second"));
}

#[test]
fn test_min_moves_blocks_end_turn_but_not_pass() {
    let game = Game::new("patient", |_ctx, _random, _data| 0u32)
        .with_move("bump", bump())
        .with_turn(TurnConfig::<u32>::new().with_min_moves(2));
    let reducer = Reducer::new(game);
    let state = reducer.initialize(2, None);

    let state = mv(&reducer, state, "bump", "0");
    let state = event(&reducer, state, FlowEvent::EndTurn(None), "0");
    assert_eq!(state.ctx.current_player, "0");

    let state = event(&reducer, state, FlowEvent::Pass(None), "0");
    assert_eq!(state.ctx.current_player, "1");
}

#[test]
fn test_disabled_event_is_ignored() {
    let game = Game::new("locked", |_ctx, _random, _data| 0u32)
        .with_move("bump", bump())
        .with_events(EventsConfig::default().with_end_game(false));
    let reducer = Reducer::new(game);
    let state = reducer.initialize(2, None);
    let next = event(&reducer, state.clone(), FlowEvent::EndGame(Some(json!("quit"))), "0");
    assert_eq!(next.state_id, state.state_id);
    assert_eq!(next.ctx.gameover, None);
}

#[test]
fn test_once_order_ends_phase_after_everyone_played() {
    let game = Game::new("rounds", |_ctx, _random, _data| 0u32)
        .with_phase(
            "round",
            PhaseConfig::<u32>::new()
                .start()
                .with_next("scoring")
                .with_move("bump", bump())
                .with_turn(
                    TurnConfig::<u32>::new().with_move_limit(1).with_order(TurnOrder::once()),
                ),
        )
        .with_phase("scoring", PhaseConfig::<u32>::new());
    let reducer = Reducer::new(game);
    let mut state = reducer.initialize(3, None);
    for player in ["0", "1", "2"] {
        assert_eq!(state.ctx.phase.as_deref(), Some("round"));
        state = mv(&reducer, state, "bump", player);
    }
    assert_eq!(state.ctx.phase.as_deref(), Some("scoring"));
    assert_eq!(state.g, 3);
}

#[test]
fn test_custom_play_order() {
    let game = Game::new("custom", |_ctx, _random, _data| 0u32)
        .with_move("bump", bump())
        .with_turn(
            TurnConfig::<u32>::new().with_order(TurnOrder::custom(vec!["2".into(), "0".into()])),
        );
    let reducer = Reducer::new(game);
    let state = reducer.initialize(3, None);
    assert_eq!(state.ctx.play_order, vec!["2", "0"]);
    assert_eq!(state.ctx.current_player, "2");
    let state = event(&reducer, state, FlowEvent::EndTurn(None), "2");
    assert_eq!(state.ctx.current_player, "0");
}

#[test]
fn test_events_from_moves_are_applied() {
    let game = Game::new("eager", |_ctx, _random, _data| 0u32).with_move(
        "finish",
        MoveDef::<u32>::new(|mc, _args| {
            mc.events.end_turn();
            // Queued after the turn changed, so it is dropped.
            mc.events.end_game(Some(json!("too late")));
            MoveResult::NewState(mc.g + 1)
        }),
    );
    let reducer = Reducer::new(game);
    let state = reducer.initialize(2, None);
    let state = mv(&reducer, state, "finish", "0");
    assert_eq!(state.ctx.current_player, "1");
    assert_eq!(state.ctx.gameover, None);
    assert!(state.deltalog.iter().any(|entry| entry.automatic));
}

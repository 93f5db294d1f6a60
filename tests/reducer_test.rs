//! Tests for the reducer: undo/redo, determinism, plugins and logging.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use strictly_turns::{
    Action, Ctx, FlowEvent, Game, LogAction, MoveDef, MoveResult, Plugin, Reducer, State,
    TurnConfig,
};

fn counter() -> Game<u32> {
    Game::new("counter", |_ctx, _random, _data| 0u32)
        .with_move("bump", MoveDef::<u32>::new(|mc, _args| MoveResult::NewState(mc.g + 1)))
        .with_move(
            "commit",
            MoveDef::<u32>::new(|mc, _args| MoveResult::NewState(mc.g + 100)).undoable(false),
        )
}

fn bump(reducer: &Reducer<u32>, state: State<u32>, player: &str) -> State<u32> {
    reducer.reduce(state, &Action::make_move("bump", Vec::new(), player))
}

#[test]
fn test_undo_and_redo_within_a_turn() {
    let reducer = Reducer::new(counter());
    let state = reducer.initialize(2, None);
    let state = bump(&reducer, state, "0");
    let state = bump(&reducer, state, "0");
    assert_eq!(state.undo.len(), 3);

    let state = reducer.reduce(state, &Action::undo("0"));
    assert_eq!(state.g, 1);
    assert_eq!(state.redo.len(), 1);
    assert!(matches!(state.deltalog[0].action, LogAction::Undo(_)));

    let state = reducer.reduce(state, &Action::redo("0"));
    assert_eq!(state.g, 2);
    assert!(state.redo.is_empty());
    assert_eq!(state.state_id, 4);
}

#[test]
fn test_new_move_clears_redo() {
    let reducer = Reducer::new(counter());
    let state = bump(&reducer, reducer.initialize(2, None), "0");
    let state = reducer.reduce(state, &Action::undo("0"));
    assert_eq!(state.redo.len(), 1);
    let state = bump(&reducer, state, "0");
    assert!(state.redo.is_empty());
}

#[test]
fn test_undo_refused_for_other_player_and_empty_stack() {
    let reducer = Reducer::new(counter());
    let fresh = reducer.initialize(2, None);
    let untouched = reducer.reduce(fresh.clone(), &Action::undo("0"));
    assert_eq!(untouched.state_id, fresh.state_id);

    let state = bump(&reducer, fresh, "0");
    let refused = reducer.reduce(state.clone(), &Action::undo("1"));
    assert_eq!(refused.state_id, state.state_id);
    assert_eq!(refused.g, 1);
}

#[test]
fn test_non_undoable_move() {
    let reducer = Reducer::new(counter());
    let state = reducer.reduce(
        reducer.initialize(2, None),
        &Action::make_move("commit", Vec::new(), "0"),
    );
    let refused = reducer.reduce(state.clone(), &Action::undo("0"));
    assert_eq!(refused.state_id, state.state_id);
    assert_eq!(refused.g, 100);
}

#[test]
fn test_turn_change_resets_undo() {
    let reducer = Reducer::new(counter());
    let state = bump(&reducer, reducer.initialize(2, None), "0");
    let state = reducer.reduce(state, &Action::game_event(FlowEvent::EndTurn(None), "0"));
    assert_eq!(state.undo.len(), 1);
    let refused = reducer.reduce(state.clone(), &Action::undo("0"));
    assert_eq!(refused.state_id, state.state_id);
}

#[test]
fn test_disable_undo() {
    let reducer = Reducer::new(counter().disable_undo());
    let state = bump(&reducer, reducer.initialize(2, None), "0");
    assert!(state.undo.is_empty());
    let refused = reducer.reduce(state.clone(), &Action::undo("0"));
    assert_eq!(refused.state_id, state.state_id);
}

fn dice() -> Game<Vec<u32>> {
    Game::new("dice", |_ctx, random, _data| vec![random.d6()]).with_move(
        "roll",
        MoveDef::<Vec<u32>>::new(|mc, _args| {
            let mut rolls = mc.g.clone();
            rolls.extend(mc.random.roll(6, 3));
            MoveResult::NewState(rolls)
        }),
    )
}

#[test]
fn test_reduce_is_deterministic_with_seed() {
    let play = || {
        let reducer = Reducer::new(dice().with_seed(42));
        let state = reducer.initialize(2, None);
        let state = reducer.reduce(state, &Action::make_move("roll", Vec::new(), "0"));
        reducer.reduce(state, &Action::make_move("roll", Vec::new(), "0"))
    };
    let first = play();
    let second = play();
    assert_eq!(first, second);
    assert_eq!(first.g.len(), 7);
    assert!(first.g.iter().all(|roll| (1..=6).contains(roll)));
}

#[test]
fn test_random_state_advances() {
    let reducer = Reducer::new(dice().with_seed(1));
    let state = reducer.initialize(2, None);
    let before = state.ctx.random.clone().expect("Seeded");
    let state = reducer.reduce(state, &Action::make_move("roll", Vec::new(), "0"));
    let after = state.ctx.random.clone().expect("Seeded");
    assert_eq!(before.seed, after.seed);
    assert!(after.word_pos > before.word_pos);
}

#[test]
fn test_replaying_from_same_state_repeats_rolls() {
    let reducer = Reducer::new(dice().with_seed(8));
    let state = reducer.initialize(2, None);
    let a = reducer.reduce(state.clone(), &Action::make_move("roll", Vec::new(), "0"));
    let b = reducer.reduce(state, &Action::make_move("roll", Vec::new(), "0"));
    assert_eq!(a.g, b.g);
}

/// Counts actions and hides the count from spectators.
struct ActionCounter;

impl Plugin<u32> for ActionCounter {
    fn name(&self) -> &str {
        "counter"
    }

    fn setup(&self, _g: &u32, _ctx: &Ctx) -> Value {
        json!({ "actions": 0, "last_g": 0 })
    }

    fn action(&self, data: Value, _action: &LogAction) -> Value {
        let actions = data["actions"].as_u64().unwrap_or(0) + 1;
        json!({ "actions": actions, "last_g": data["last_g"] })
    }

    fn flush(&self, data: Value, g: &u32, _ctx: &Ctx) -> Value {
        json!({ "actions": data["actions"], "last_g": g })
    }

    fn player_view(&self, data: &Value, _g: &u32, _ctx: &Ctx, player_id: Option<&str>) -> Value {
        match player_id {
            Some(_) => data.clone(),
            None => Value::Null,
        }
    }
}

#[test]
fn test_plugin_hooks_run_in_order() {
    let reducer = Reducer::new(counter().with_plugin(Arc::new(ActionCounter)));
    let state = reducer.initialize(2, None);
    assert_eq!(state.plugins["counter"].data, json!({ "actions": 0, "last_g": 0 }));

    let state = bump(&reducer, state, "0");
    let state = bump(&reducer, state, "0");
    assert_eq!(state.plugins["counter"].data, json!({ "actions": 2, "last_g": 2 }));

    let spectator = strictly_turns::filtered_state(reducer.game(), &state, None);
    assert_eq!(spectator.plugins["counter"].data, Value::Null);
}

#[test]
fn test_move_limit_logs_automatic_end_turn() {
    let reducer = Reducer::new(counter().with_turn(TurnConfig::new().with_move_limit(1)));
    let state = bump(&reducer, reducer.initialize(2, None), "0");
    assert_eq!(state.deltalog.len(), 2);
    assert!(!state.deltalog[0].automatic);
    assert!(state.deltalog[1].automatic);
    assert!(matches!(
        &state.deltalog[1].action,
        LogAction::GameEvent(payload) if payload.event.name() == "endTurn"
    ));
    assert_eq!(state.ctx.current_player, "1");
}

#[test]
fn test_end_game_event_sets_gameover() {
    let reducer = Reducer::new(counter());
    let state = reducer.reduce(
        reducer.initialize(2, None),
        &Action::game_event(FlowEvent::EndGame(Some(json!({ "winner": "0" }))), "0"),
    );
    assert_eq!(state.ctx.gameover, Some(json!({ "winner": "0" })));
    let refused = bump(&reducer, state.clone(), "1");
    assert_eq!(refused.state_id, state.state_id);
}

/// Payload without a `Default` impl.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Dealer {
    seat: u32,
}

#[test]
fn test_restore_roundtrips_payload_without_default() {
    let reducer =
        Reducer::new(Game::new("dealer", |_ctx, _random, _data| Dealer { seat: 3 }).with_seed(5));
    let state = reducer.initialize(2, None);

    let wire = serde_json::to_string(&Action::Restore(Box::new(state.clone()))).unwrap();
    let parsed: Action<Dealer> = serde_json::from_str(&wire).unwrap();
    let Action::Restore(restored) = parsed else {
        panic!("Expected RESTORE");
    };
    assert_eq!(*restored, state);

    let next = reducer.reduce(reducer.initialize(3, None), &Action::Restore(restored));
    assert_eq!(next.g, Dealer { seat: 3 });
    assert_eq!(next.ctx.num_players, 2);
}

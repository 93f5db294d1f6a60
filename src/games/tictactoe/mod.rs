//! Tic-tac-toe on the turn engine.
//!
//! Seat `"0"` plays X and seat `"1"` plays O. The single move `place`
//! takes the square index (0-8); each turn ends after one placement and the
//! game ends with `{"winner": seat}` or `{"draw": true}`.

mod position;
mod rules;
mod types;

pub use position::Position;
pub use rules::{check_winner, is_full};
pub use types::{Board, Mark, Square};

use crate::game::{Game, MoveDef, MoveResult, TurnConfig};
use serde_json::{Value, json};
use tracing::debug;

/// Name of the game.
pub const NAME: &str = "tic-tac-toe";

/// Builds the tic-tac-toe definition.
pub fn tictactoe() -> Game<Board> {
    Game::new(NAME, |_ctx, _random, _data| Board::new())
        .with_move(
            "place",
            MoveDef::<Board>::new(|mc, args| {
                let Some(pos) = args.first().and_then(Value::as_u64).map(|pos| pos as usize) else {
                    return MoveResult::Invalid;
                };
                let Some(mark) = Mark::for_player(mc.player_id) else {
                    return MoveResult::Invalid;
                };
                match mc.g.place(pos, mark) {
                    Some(board) => {
                        debug!(pos, ?mark, "Mark placed");
                        MoveResult::NewState(board)
                    }
                    None => MoveResult::Invalid,
                }
            }),
        )
        .with_turn(TurnConfig::new().with_move_limit(1))
        .end_if(|board, _ctx| {
            if let Some(mark) = check_winner(board) {
                return Some(json!({ "winner": mark.player_id() }));
            }
            is_full(board).then(|| json!({ "draw": true }))
        })
}

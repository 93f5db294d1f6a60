//! Ready-made game definitions.

pub mod secret_draw;
pub mod tictactoe;

pub use secret_draw::{Table, secret_draw};
pub use tictactoe::{Board, Mark, Position, Square, tictactoe};

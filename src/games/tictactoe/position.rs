//! Named board positions.

use super::types::Board;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

/// A position on the board, in row-major order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::EnumIter,
    strum::Display,
)]
pub enum Position {
    /// Index 0.
    TopLeft,
    /// Index 1.
    TopCenter,
    /// Index 2.
    TopRight,
    /// Index 3.
    MiddleLeft,
    /// Index 4.
    Center,
    /// Index 5.
    MiddleRight,
    /// Index 6.
    BottomLeft,
    /// Index 7.
    BottomCenter,
    /// Index 8.
    BottomRight,
}

impl Position {
    /// Board index of the position.
    pub fn to_index(self) -> usize {
        self as usize
    }

    /// Position for a board index.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::iter().nth(index)
    }

    /// Empty positions of `board`.
    pub fn valid_moves(board: &Board) -> Vec<Self> {
        Self::iter().filter(|pos| board.is_empty(pos.to_index())).collect()
    }
}

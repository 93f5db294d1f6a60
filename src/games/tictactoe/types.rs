//! Core domain types for tic-tac-toe.

use serde::{Deserialize, Serialize};

/// Mark placed by a seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mark {
    /// Seat `"0"`, moves first.
    X,
    /// Seat `"1"`.
    O,
}

impl Mark {
    /// Mark of the given seat, `None` for seats beyond the second.
    pub fn for_player(player_id: &str) -> Option<Self> {
        match player_id {
            "0" => Some(Mark::X),
            "1" => Some(Mark::O),
            _ => None,
        }
    }

    /// Seat that places this mark.
    pub fn player_id(self) -> &'static str {
        match self {
            Mark::X => "0",
            Mark::O => "1",
        }
    }
}

/// A square on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Square {
    /// Empty square.
    #[default]
    Empty,
    /// Square holding a mark.
    Occupied(Mark),
}

/// 3x3 board in row-major order, the game's `G`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Board {
    squares: [Square; 9],
}

impl Board {
    /// Empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Square at `pos` (0-8).
    pub fn get(&self, pos: usize) -> Option<Square> {
        self.squares.get(pos).copied()
    }

    /// Returns a copy of the board with `mark` placed at `pos`.
    ///
    /// `None` when `pos` is out of range or already taken.
    pub fn place(&self, pos: usize, mark: Mark) -> Option<Self> {
        if !self.is_empty(pos) {
            return None;
        }
        let mut next = self.clone();
        next.squares[pos] = Square::Occupied(mark);
        Some(next)
    }

    /// Whether the square exists and is empty.
    pub fn is_empty(&self, pos: usize) -> bool {
        matches!(self.get(pos), Some(Square::Empty))
    }

    /// All squares.
    pub fn squares(&self) -> &[Square; 9] {
        &self.squares
    }

    /// Human-readable rendering, empty squares show their 1-based number.
    pub fn display(&self) -> String {
        let mut result = String::new();
        for row in 0..3 {
            for col in 0..3 {
                let pos = row * 3 + col;
                let symbol = match self.squares[pos] {
                    Square::Empty => (pos + 1).to_string(),
                    Square::Occupied(Mark::X) => "X".to_string(),
                    Square::Occupied(Mark::O) => "O".to_string(),
                };
                result.push_str(&symbol);
                if col < 2 {
                    result.push('|');
                }
            }
            if row < 2 {
                result.push_str("\n-+-+-\n");
            }
        }
        result
    }
}

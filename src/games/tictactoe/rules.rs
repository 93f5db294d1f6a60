//! Win and draw detection.

use super::types::{Board, Mark, Square};
use tracing::instrument;

const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// Mark holding three in a row, if any.
#[instrument(skip(board))]
pub fn check_winner(board: &Board) -> Option<Mark> {
    LINES.iter().find_map(|&[a, b, c]| match (board.get(a), board.get(b), board.get(c)) {
        (Some(Square::Occupied(x)), Some(Square::Occupied(y)), Some(Square::Occupied(z)))
            if x == y && y == z =>
        {
            Some(x)
        }
        _ => None,
    })
}

/// Whether every square is taken.
pub fn is_full(board: &Board) -> bool {
    board.squares().iter().all(|square| *square != Square::Empty)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board_with(marks: &[(usize, Mark)]) -> Board {
        marks
            .iter()
            .fold(Board::new(), |board, &(pos, mark)| board.place(pos, mark).unwrap())
    }

    #[test]
    fn test_diagonal_win() {
        let board = board_with(&[(0, Mark::O), (4, Mark::O), (8, Mark::O), (1, Mark::X)]);
        assert_eq!(check_winner(&board), Some(Mark::O));
    }

    #[test]
    fn test_full_board_without_winner() {
        let board = board_with(&[
            (0, Mark::X),
            (1, Mark::O),
            (2, Mark::X),
            (3, Mark::X),
            (4, Mark::O),
            (5, Mark::O),
            (6, Mark::O),
            (7, Mark::X),
            (8, Mark::X),
        ]);
        assert_eq!(check_winner(&board), None);
        assert!(is_full(&board));
    }
}

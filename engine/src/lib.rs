//! A narrow trait for "a board game that assigns stones to cells and can
//! tell you when it's over", plus a Gomoku (five-in-a-row) reference
//! implementation of it.
//!
//! The room state machine only ever talks to a board through
//! [`GameEngine`]; it never re-derives win conditions itself. This keeps
//! rule logic in exactly one place and lets a different ruleset (a larger
//! board, a different win length, a different game entirely) be swapped in
//! without touching the session server.
//!
//! This crate intentionally stops at legality and termination. It does not
//! evaluate board strength, suggest moves, or implement any search —
//! that's a different, much larger problem this server has no need to
//! solve.

use serde::{Deserialize, Serialize};

/// A stone color. Two players only; Gomoku has no notion of a third.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stone {
    Black,
    White,
}

impl Stone {
    pub fn opponent(self) -> Stone {
        match self {
            Stone::Black => Stone::White,
            Stone::White => Stone::Black,
        }
    }
}

/// Outcome of a completed or in-progress game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalStatus {
    InProgress,
    WinBy(Stone),
    Draw,
}

impl TerminalStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TerminalStatus::InProgress)
    }
}

/// Error returned by [`GameEngine::apply`] when a move cannot be played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    #[error("cell ({row}, {col}) is out of bounds for a {size}x{size} board")]
    OutOfBounds { row: u8, col: u8, size: u8 },
    #[error("cell ({row}, {col}) is already occupied")]
    CellOccupied { row: u8, col: u8 },
}

/// A square grid of optional stones. Indexed `[row][col]`, zero-based, with
/// `(0, 0)` as the top-left cell — matching the reference implementation's
/// row-major `board[row][col]` convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    size: u8,
    cells: Vec<Option<Stone>>,
}

impl Board {
    pub fn new(size: u8) -> Self {
        Board {
            size,
            cells: vec![None; size as usize * size as usize],
        }
    }

    pub fn size(&self) -> u8 {
        self.size
    }

    pub fn in_bounds(&self, row: u8, col: u8) -> bool {
        (row as usize) < self.size as usize && (col as usize) < self.size as usize
    }

    pub fn get(&self, row: u8, col: u8) -> Option<Stone> {
        self.cells[self.index(row, col)]
    }

    fn set(&mut self, row: u8, col: u8, stone: Stone) {
        let idx = self.index(row, col);
        self.cells[idx] = Some(stone);
    }

    fn index(&self, row: u8, col: u8) -> usize {
        row as usize * self.size as usize + col as usize
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// Row-major snapshot of the board, `None` for an empty cell — the
    /// shape the session server serializes into `room_info`/reconnect
    /// payloads.
    pub fn rows(&self) -> Vec<Vec<Option<Stone>>> {
        (0..self.size)
            .map(|row| (0..self.size).map(|col| self.get(row, col)).collect())
            .collect()
    }
}

/// A rule engine: knows how to validate and apply moves on a [`Board`] and
/// decide when the game is over. The session server drives a game
/// entirely through this trait.
pub trait GameEngine {
    /// Board size for this ruleset, e.g. 15 for standard Gomoku.
    fn board_size(&self) -> u8;

    /// Whether placing `stone` at `(row, col)` is legal on `board` right now.
    fn is_legal(&self, board: &Board, row: u8, col: u8) -> bool {
        board.in_bounds(row, col) && board.get(row, col).is_none()
    }

    /// Places `stone` at `(row, col)`, mutating `board` in place. Callers
    /// must check [`GameEngine::is_legal`] first if they want a friendly
    /// error instead of `Err`.
    fn apply(&self, board: &mut Board, row: u8, col: u8, stone: Stone) -> Result<(), MoveError>;

    /// Checks whether the position is terminal, given the most recently
    /// placed stone. Gomoku's win condition only ever involves lines through
    /// the last move, so engines that work this way can skip scanning the
    /// whole board on every turn.
    fn terminal_status(&self, board: &Board, last_move: Option<(u8, u8)>) -> TerminalStatus;

    /// A serializable snapshot of the current position.
    fn snapshot(&self, board: &Board) -> Vec<Vec<Option<Stone>>> {
        board.rows()
    }
}

/// Standard five-in-a-row Gomoku on a 15x15 board, free placement (no
/// forbidden-move rules). Grounded in the reference implementation's
/// `check_win`: a win is five or more consecutive stones of one color
/// along a horizontal, vertical, or either diagonal line running through
/// the last placed stone.
#[derive(Debug, Clone, Copy, Default)]
pub struct GomokuEngine;

impl GomokuEngine {
    pub const BOARD_SIZE: u8 = 15;
    pub const WIN_LENGTH: usize = 5;

    /// The four line directions a win can run along. Only one of each
    /// antiparallel pair is listed; `count_line` walks both ways from the
    /// anchor point.
    const DIRECTIONS: [(i8, i8); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

    fn count_line(board: &Board, row: u8, col: u8, stone: Stone, dr: i8, dc: i8) -> usize {
        let mut count = 1;
        count += Self::walk(board, row, col, stone, dr, dc);
        count += Self::walk(board, row, col, stone, -dr, -dc);
        count
    }

    fn walk(board: &Board, row: u8, col: u8, stone: Stone, dr: i8, dc: i8) -> usize {
        let mut count = 0;
        let mut r = row as i16;
        let mut c = col as i16;
        loop {
            r += dr as i16;
            c += dc as i16;
            if r < 0 || c < 0 || r as u8 >= board.size() || c as u8 >= board.size() {
                break;
            }
            if board.get(r as u8, c as u8) == Some(stone) {
                count += 1;
            } else {
                break;
            }
        }
        count
    }
}

impl GameEngine for GomokuEngine {
    fn board_size(&self) -> u8 {
        Self::BOARD_SIZE
    }

    fn apply(&self, board: &mut Board, row: u8, col: u8, stone: Stone) -> Result<(), MoveError> {
        if !board.in_bounds(row, col) {
            return Err(MoveError::OutOfBounds {
                row,
                col,
                size: board.size(),
            });
        }
        if board.get(row, col).is_some() {
            return Err(MoveError::CellOccupied { row, col });
        }
        board.set(row, col, stone);
        Ok(())
    }

    fn terminal_status(&self, board: &Board, last_move: Option<(u8, u8)>) -> TerminalStatus {
        if let Some((row, col)) = last_move {
            if let Some(stone) = board.get(row, col) {
                for (dr, dc) in Self::DIRECTIONS {
                    if Self::count_line(board, row, col, stone, dr, dc) >= Self::WIN_LENGTH {
                        return TerminalStatus::WinBy(stone);
                    }
                }
            }
        }
        if board.is_full() {
            return TerminalStatus::Draw;
        }
        TerminalStatus::InProgress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play(engine: &GomokuEngine, board: &mut Board, moves: &[(u8, u8, Stone)]) {
        for &(row, col, stone) in moves {
            engine.apply(board, row, col, stone).unwrap();
        }
    }

    #[test]
    fn empty_board_is_in_progress() {
        let engine = GomokuEngine;
        let board = Board::new(GomokuEngine::BOARD_SIZE);
        assert_eq!(engine.terminal_status(&board, None), TerminalStatus::InProgress);
    }

    #[test]
    fn five_in_a_row_horizontally_wins() {
        let engine = GomokuEngine;
        let mut board = Board::new(GomokuEngine::BOARD_SIZE);
        play(
            &engine,
            &mut board,
            &[
                (7, 3, Stone::Black),
                (7, 4, Stone::Black),
                (7, 5, Stone::Black),
                (7, 6, Stone::Black),
                (7, 7, Stone::Black),
            ],
        );
        assert_eq!(
            engine.terminal_status(&board, Some((7, 7))),
            TerminalStatus::WinBy(Stone::Black)
        );
    }

    #[test]
    fn five_in_a_row_on_a_diagonal_wins() {
        let engine = GomokuEngine;
        let mut board = Board::new(GomokuEngine::BOARD_SIZE);
        play(
            &engine,
            &mut board,
            &[
                (0, 0, Stone::White),
                (1, 1, Stone::White),
                (2, 2, Stone::White),
                (3, 3, Stone::White),
                (4, 4, Stone::White),
            ],
        );
        assert_eq!(
            engine.terminal_status(&board, Some((4, 4))),
            TerminalStatus::WinBy(Stone::White)
        );
    }

    #[test]
    fn anti_diagonal_also_wins() {
        let engine = GomokuEngine;
        let mut board = Board::new(GomokuEngine::BOARD_SIZE);
        play(
            &engine,
            &mut board,
            &[
                (0, 4, Stone::Black),
                (1, 3, Stone::Black),
                (2, 2, Stone::Black),
                (3, 1, Stone::Black),
                (4, 0, Stone::Black),
            ],
        );
        assert_eq!(
            engine.terminal_status(&board, Some((4, 0))),
            TerminalStatus::WinBy(Stone::Black)
        );
    }

    #[test]
    fn four_in_a_row_is_not_a_win() {
        let engine = GomokuEngine;
        let mut board = Board::new(GomokuEngine::BOARD_SIZE);
        play(
            &engine,
            &mut board,
            &[
                (7, 3, Stone::Black),
                (7, 4, Stone::Black),
                (7, 5, Stone::Black),
                (7, 6, Stone::Black),
            ],
        );
        assert_eq!(engine.terminal_status(&board, Some((7, 6))), TerminalStatus::InProgress);
    }

    #[test]
    fn occupied_cell_is_illegal_and_errors_on_apply() {
        let engine = GomokuEngine;
        let mut board = Board::new(GomokuEngine::BOARD_SIZE);
        engine.apply(&mut board, 0, 0, Stone::Black).unwrap();
        assert!(!engine.is_legal(&board, 0, 0));
        assert_eq!(
            engine.apply(&mut board, 0, 0, Stone::White),
            Err(MoveError::CellOccupied { row: 0, col: 0 })
        );
    }

    #[test]
    fn out_of_bounds_is_illegal_and_errors_on_apply() {
        let engine = GomokuEngine;
        let mut board = Board::new(GomokuEngine::BOARD_SIZE);
        assert!(!engine.is_legal(&board, 15, 0));
        assert_eq!(
            engine.apply(&mut board, 15, 0, Stone::Black),
            Err(MoveError::OutOfBounds { row: 15, col: 0, size: 15 })
        );
    }

    #[test]
    fn a_full_board_with_no_line_is_a_draw() {
        // A 2x2 board with WIN_LENGTH=5 can never produce a line; filling it
        // exercises the draw path without needing to fill all 225 cells.
        struct TinyEngine;
        impl GameEngine for TinyEngine {
            fn board_size(&self) -> u8 {
                2
            }
            fn apply(&self, board: &mut Board, row: u8, col: u8, stone: Stone) -> Result<(), MoveError> {
                GomokuEngine.apply(board, row, col, stone)
            }
            fn terminal_status(&self, board: &Board, last_move: Option<(u8, u8)>) -> TerminalStatus {
                GomokuEngine.terminal_status(board, last_move)
            }
        }
        let engine = TinyEngine;
        let mut board = Board::new(2);
        play(
            &engine,
            &mut board,
            &[
                (0, 0, Stone::Black),
                (0, 1, Stone::White),
                (1, 0, Stone::White),
                (1, 1, Stone::Black),
            ],
        );
        assert_eq!(engine.terminal_status(&board, Some((1, 1))), TerminalStatus::Draw);
    }
}

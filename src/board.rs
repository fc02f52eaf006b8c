use serde::Serialize;

use crate::constants::{BOARD_HEIGHT, BOARD_WIDTH, PENALTY_GAP_COLUMN};
use crate::piece::Piece;
use crate::types::{Cell, Spectrum};

/// The 20×10 playfield for one player. Row 0 is the top. Serialized as a
/// plain array of rows.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Board {
    rows: Vec<[Cell; BOARD_WIDTH]>,
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    pub fn new() -> Self {
        Self {
            rows: vec![[Cell::Empty; BOARD_WIDTH]; BOARD_HEIGHT],
        }
    }

    pub fn cell(&self, row: usize, col: usize) -> Cell {
        self.rows[row][col]
    }

    pub fn set_cell(&mut self, row: usize, col: usize, cell: Cell) {
        self.rows[row][col] = cell;
    }

    /// True iff every filled cell of the piece lands in-bounds on an empty
    /// cell when the piece's top-left corner sits at (x, y).
    pub fn is_valid(&self, piece: &Piece, x: i32, y: i32) -> bool {
        piece.cells().all(|(row, col)| {
            let board_col = x + col as i32;
            let board_row = y + row as i32;
            (0..BOARD_WIDTH as i32).contains(&board_col)
                && (0..BOARD_HEIGHT as i32).contains(&board_row)
                && self.rows[board_row as usize][board_col as usize].is_empty()
        })
    }

    /// Stamps the piece's kind into the grid. Cells above the top edge are
    /// dropped.
    pub fn lock(&mut self, piece: &Piece) {
        for (row, col) in piece.cells() {
            let board_col = piece.x + col as i32;
            let board_row = piece.y + row as i32;
            if board_row < 0 {
                continue;
            }
            if (0..BOARD_WIDTH as i32).contains(&board_col)
                && (board_row as usize) < BOARD_HEIGHT
            {
                self.rows[board_row as usize][board_col as usize] = Cell::Kind(piece.kind);
            }
        }
    }

    /// Removes full rows and prepends empty rows to keep the height at 20.
    /// A row counts as full iff every cell is filled and at least one cell
    /// is not a penalty cell, so penalty rows never clear themselves.
    pub fn clear_lines(&mut self) -> usize {
        let before = self.rows.len();
        self.rows.retain(|row| !row_is_clearable(row));
        let cleared = before - self.rows.len();
        for _ in 0..cleared {
            self.rows.insert(0, [Cell::Empty; BOARD_WIDTH]);
        }
        cleared
    }

    /// Column heights: 20 − index of the topmost filled cell, 0 for an
    /// empty column.
    pub fn spectrum(&self) -> Spectrum {
        let mut heights = [0u8; BOARD_WIDTH];
        for (col, height) in heights.iter_mut().enumerate() {
            *height = self
                .rows
                .iter()
                .position(|row| !row[col].is_empty())
                .map(|row| (BOARD_HEIGHT - row) as u8)
                .unwrap_or(0);
        }
        heights
    }

    /// Pushes `count` penalty rows onto the bottom; anything shifted past
    /// the top edge is discarded.
    pub fn add_penalty_rows(&mut self, count: usize) {
        for _ in 0..count {
            self.rows.remove(0);
            let mut penalty = [Cell::Penalty; BOARD_WIDTH];
            penalty[PENALTY_GAP_COLUMN] = Cell::Empty;
            self.rows.push(penalty);
        }
    }
}

fn row_is_clearable(row: &[Cell; BOARD_WIDTH]) -> bool {
    row.iter().all(|cell| !cell.is_empty()) && row.iter().any(|cell| !cell.is_penalty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PieceKind;

    fn fill_row(board: &mut Board, row: usize, skip_col: Option<usize>) {
        for col in 0..BOARD_WIDTH {
            if Some(col) == skip_col {
                continue;
            }
            board.set_cell(row, col, Cell::Kind(PieceKind::J));
        }
    }

    fn dimensions_hold(board: &Board) -> bool {
        board.rows.len() == BOARD_HEIGHT && board.rows.iter().all(|row| row.len() == BOARD_WIDTH)
    }

    #[test]
    fn new_board_is_empty_and_sized() {
        let board = Board::new();
        assert!(dimensions_hold(&board));
        assert!(board
            .rows
            .iter()
            .all(|row| row.iter().all(|cell| cell.is_empty())));
    }

    #[test]
    fn is_valid_rejects_out_of_bounds_and_occupied() {
        let mut board = Board::new();
        let piece = Piece::spawn(PieceKind::O);
        assert!(board.is_valid(&piece, 0, 0));
        assert!(!board.is_valid(&piece, -1, 0));
        assert!(!board.is_valid(&piece, (BOARD_WIDTH - 1) as i32, 0));
        assert!(!board.is_valid(&piece, 0, (BOARD_HEIGHT - 1) as i32));

        board.set_cell(1, 1, Cell::Kind(PieceKind::T));
        assert!(!board.is_valid(&piece, 0, 0));
        assert!(board.is_valid(&piece, 2, 0));
    }

    #[test]
    fn lock_stamps_the_piece_kind() {
        let mut board = Board::new();
        let mut piece = Piece::spawn(PieceKind::O);
        piece.x = 0;
        piece.y = 18;
        board.lock(&piece);
        assert_eq!(board.cell(18, 0), Cell::Kind(PieceKind::O));
        assert_eq!(board.cell(19, 1), Cell::Kind(PieceKind::O));
        assert!(dimensions_hold(&board));
    }

    #[test]
    fn lock_ignores_cells_above_the_board() {
        let mut board = Board::new();
        let mut piece = Piece::spawn(PieceKind::I);
        piece.x = 0;
        piece.y = -1;
        board.lock(&piece);
        assert_eq!(board.cell(0, 0), Cell::Kind(PieceKind::I));
        assert!(dimensions_hold(&board));
    }

    #[test]
    fn clear_lines_collapses_full_rows() {
        let mut board = Board::new();
        fill_row(&mut board, 19, None);
        fill_row(&mut board, 18, None);
        board.set_cell(17, 4, Cell::Kind(PieceKind::S));

        assert_eq!(board.clear_lines(), 2);
        assert!(dimensions_hold(&board));
        // Survivor shifts down by the number of cleared rows.
        assert_eq!(board.cell(19, 4), Cell::Kind(PieceKind::S));
        assert!(board.rows[18].iter().all(|cell| cell.is_empty()));
    }

    #[test]
    fn full_penalty_row_never_clears() {
        let mut board = Board::new();
        for col in 0..BOARD_WIDTH {
            board.set_cell(19, col, Cell::Penalty);
        }
        assert_eq!(board.clear_lines(), 0);
        assert_eq!(board.cell(19, 3), Cell::Penalty);
    }

    #[test]
    fn mixed_full_row_with_penalty_cell_clears() {
        let mut board = Board::new();
        fill_row(&mut board, 19, Some(0));
        board.set_cell(19, 0, Cell::Penalty);
        assert_eq!(board.clear_lines(), 1);
        assert!(board.rows[19].iter().all(|cell| cell.is_empty()));
    }

    #[test]
    fn penalty_rows_enter_at_the_bottom_with_a_gap() {
        let mut board = Board::new();
        board.set_cell(19, 5, Cell::Kind(PieceKind::Z));
        board.add_penalty_rows(2);

        assert!(dimensions_hold(&board));
        assert_eq!(board.cell(17, 5), Cell::Kind(PieceKind::Z));
        for row in [18, 19] {
            assert_eq!(board.cell(row, PENALTY_GAP_COLUMN), Cell::Empty);
            for col in 0..BOARD_WIDTH {
                if col != PENALTY_GAP_COLUMN {
                    assert_eq!(board.cell(row, col), Cell::Penalty);
                }
            }
        }
    }

    #[test]
    fn penalty_rows_leave_only_by_the_top() {
        let mut board = Board::new();
        board.add_penalty_rows(1);
        // A full stack of penalties pushes the first one out.
        board.add_penalty_rows(BOARD_HEIGHT);
        assert!(dimensions_hold(&board));
        let penalty_cells = board
            .rows
            .iter()
            .flat_map(|row| row.iter())
            .filter(|cell| cell.is_penalty())
            .count();
        assert_eq!(penalty_cells, BOARD_HEIGHT * (BOARD_WIDTH - 1));
    }

    #[test]
    fn spectrum_tracks_topmost_filled_cell() {
        let mut board = Board::new();
        assert_eq!(board.spectrum(), [0; BOARD_WIDTH]);

        board.set_cell(19, 0, Cell::Kind(PieceKind::L));
        board.set_cell(10, 3, Cell::Kind(PieceKind::I));
        board.set_cell(15, 3, Cell::Kind(PieceKind::I));
        board.set_cell(0, 9, Cell::Penalty);

        let spectrum = board.spectrum();
        assert_eq!(spectrum[0], 1);
        assert_eq!(spectrum[3], 10);
        assert_eq!(spectrum[9], 20);
        assert_eq!(spectrum[5], 0);
    }
}

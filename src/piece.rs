use crate::constants::{SPAWN_X, SPAWN_Y};
use crate::types::{PieceKind, PieceView};

/// A falling tetromino. The shape is a square 0/1 matrix (rows top-down);
/// (x, y) is the board position of the matrix's top-left corner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Piece {
    pub kind: PieceKind,
    pub shape: Vec<Vec<u8>>,
    pub x: i32,
    pub y: i32,
}

impl Piece {
    pub fn spawn(kind: PieceKind) -> Self {
        Self {
            kind,
            shape: spawn_shape(kind),
            x: SPAWN_X,
            y: SPAWN_Y,
        }
    }

    /// The shape after a 90° clockwise rotation; position is unchanged.
    /// O rotates onto itself.
    pub fn rotated_cw(&self) -> Self {
        let size = self.shape.len();
        let mut rotated = vec![vec![0u8; size]; size];
        for (row, cells) in rotated.iter_mut().enumerate() {
            for (col, cell) in cells.iter_mut().enumerate() {
                *cell = self.shape[size - 1 - col][row];
            }
        }
        Self {
            kind: self.kind,
            shape: rotated,
            x: self.x,
            y: self.y,
        }
    }

    /// Filled cells as (row, col) offsets within the shape matrix.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.shape.iter().enumerate().flat_map(|(row, cells)| {
            cells
                .iter()
                .enumerate()
                .filter(|(_, cell)| **cell != 0)
                .map(move |(col, _)| (row, col))
        })
    }

    pub fn view(&self) -> PieceView {
        PieceView {
            kind: self.kind,
            x: self.x,
            y: self.y,
            shape: self.shape.clone(),
        }
    }
}

fn spawn_shape(kind: PieceKind) -> Vec<Vec<u8>> {
    let rows: &[&[u8]] = match kind {
        PieceKind::I => &[&[0, 0, 0, 0], &[1, 1, 1, 1], &[0, 0, 0, 0], &[0, 0, 0, 0]],
        PieceKind::O => &[&[1, 1], &[1, 1]],
        PieceKind::T => &[&[0, 1, 0], &[1, 1, 1], &[0, 0, 0]],
        PieceKind::S => &[&[0, 1, 1], &[1, 1, 0], &[0, 0, 0]],
        PieceKind::Z => &[&[1, 1, 0], &[0, 1, 1], &[0, 0, 0]],
        PieceKind::J => &[&[1, 0, 0], &[1, 1, 1], &[0, 0, 0]],
        PieceKind::L => &[&[0, 0, 1], &[1, 1, 1], &[0, 0, 0]],
    };
    rows.iter().map(|row| row.to_vec()).collect()
}

use crate::board::Board;
use crate::piece::Piece;
use crate::types::PlayerInfo;

/// Per-player room state. The serializable view travels in events; the rest
/// is server-side only.
#[derive(Clone, Debug)]
pub struct Player {
    pub view: PlayerInfo,
    pub board: Board,
    pub current: Option<Piece>,
    pub next: Option<Piece>,
    pub cursor: usize,
    pub ready: bool,
}

impl Player {
    pub fn new(id: &str, name: &str, room_name: &str, is_host: bool) -> Self {
        Self {
            view: PlayerInfo {
                id: id.to_string(),
                name: name.to_string(),
                room_name: room_name.to_string(),
                is_host,
                is_alive: false,
                score: 0,
                lines_cleared: 0,
                spectrum: [0; crate::constants::BOARD_WIDTH],
            },
            board: Board::new(),
            current: None,
            next: None,
            cursor: 0,
            ready: false,
        }
    }

    /// Re-arms the player for a fresh match. Pieces are dealt by the room
    /// right after this.
    pub fn reset_for_start(&mut self) {
        self.board = Board::new();
        self.current = None;
        self.next = None;
        self.cursor = 0;
        self.view.is_alive = true;
        self.view.score = 0;
        self.view.lines_cleared = 0;
        self.view.spectrum = [0; crate::constants::BOARD_WIDTH];
    }

    /// Like `reset_for_start`, but leaves the player out of any match.
    pub fn reset_idle(&mut self) {
        self.reset_for_start();
        self.view.is_alive = false;
    }

    pub fn refresh_spectrum(&mut self) {
        self.view.spectrum = self.board.spectrum();
    }
}

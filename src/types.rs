use serde::{Serialize, Serializer};

use crate::board::Board;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PieceKind {
    I,
    O,
    T,
    S,
    Z,
    J,
    L,
}

impl PieceKind {
    pub fn all() -> [PieceKind; 7] {
        [
            PieceKind::I,
            PieceKind::O,
            PieceKind::T,
            PieceKind::S,
            PieceKind::Z,
            PieceKind::J,
            PieceKind::L,
        ]
    }

    pub fn letter(self) -> &'static str {
        match self {
            PieceKind::I => "I",
            PieceKind::O => "O",
            PieceKind::T => "T",
            PieceKind::S => "S",
            PieceKind::Z => "Z",
            PieceKind::J => "J",
            PieceKind::L => "L",
        }
    }
}

/// One board cell. Serialized as `0` when empty, `"X"` for a penalty cell,
/// and the piece letter otherwise.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cell {
    Empty,
    Kind(PieceKind),
    Penalty,
}

impl Cell {
    pub fn is_empty(self) -> bool {
        matches!(self, Cell::Empty)
    }

    pub fn is_penalty(self) -> bool {
        matches!(self, Cell::Penalty)
    }
}

impl Serialize for Cell {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Cell::Empty => serializer.serialize_u8(0),
            Cell::Kind(kind) => serializer.serialize_str(kind.letter()),
            Cell::Penalty => serializer.serialize_str("X"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Left,
    Right,
    Down,
}

impl Direction {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            "down" => Some(Self::Down),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Waiting,
    Playing,
    Finished,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    NameTaken,
    GameInProgress,
    RoomFull,
    NotHost,
    BadPhase,
    UnknownRoom,
    UnknownCommand,
    Internal,
}

pub type Spectrum = [u8; crate::constants::BOARD_WIDTH];

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub id: String,
    pub name: String,
    pub room_name: String,
    pub is_host: bool,
    pub is_alive: bool,
    pub score: i32,
    pub lines_cleared: u32,
    pub spectrum: Spectrum,
}

#[derive(Clone, Debug, Serialize)]
pub struct PieceView {
    #[serde(rename = "type")]
    pub kind: PieceKind,
    pub x: i32,
    pub y: i32,
    pub shape: Vec<Vec<u8>>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PieceAssignment {
    pub player_id: String,
    pub current_piece: PieceView,
    pub next_piece: PieceView,
}

/// Server → client events. Serializes to `{"event": <name>, "data": {...}}`.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum GameEvent {
    #[serde(rename_all = "camelCase")]
    PlayerJoined {
        player: PlayerInfo,
        players: Vec<PlayerInfo>,
    },
    #[serde(rename_all = "camelCase")]
    PlayerLeft {
        player_id: String,
        players: Vec<PlayerInfo>,
    },
    #[serde(rename_all = "camelCase")]
    NewHost { host: PlayerInfo },
    #[serde(rename_all = "camelCase")]
    GameStarted {
        players: Vec<PlayerInfo>,
        current_pieces: Vec<PieceAssignment>,
    },
    #[serde(rename_all = "camelCase")]
    BoardUpdate {
        player_id: String,
        board: Board,
        spectrum: Spectrum,
        #[serde(skip_serializing_if = "Option::is_none")]
        current_piece: Option<PieceView>,
    },
    #[serde(rename_all = "camelCase")]
    PieceMoved {
        player_id: String,
        board: Board,
        spectrum: Spectrum,
        current_piece: PieceView,
    },
    #[serde(rename_all = "camelCase")]
    PieceRotated {
        player_id: String,
        board: Board,
        spectrum: Spectrum,
        current_piece: PieceView,
    },
    #[serde(rename_all = "camelCase")]
    PieceDropped {
        player_id: String,
        board: Board,
        spectrum: Spectrum,
        lines_cleared: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        current_piece: Option<PieceView>,
    },
    #[serde(rename_all = "camelCase")]
    PenaltyLinesAdded {
        target_player_id: String,
        penalty_lines: usize,
        affected_players: Vec<PlayerInfo>,
    },
    #[serde(rename_all = "camelCase")]
    PlayerLost { player_id: String },
    #[serde(rename_all = "camelCase")]
    GameEnded {
        winner: Option<PlayerInfo>,
        players: Vec<PlayerInfo>,
    },
    #[serde(rename_all = "camelCase")]
    Error { code: ErrorKind, message: String },
}

pub const BOARD_WIDTH: usize = 10;
pub const BOARD_HEIGHT: usize = 20;

pub const SPAWN_X: i32 = 3;
pub const SPAWN_Y: i32 = 0;

pub const DROP_INTERVAL_MS: u64 = 1_000;
pub const POINTS_PER_LINE: i32 = 100;

// Penalty rows keep this column open so they can never satisfy a line clear.
pub const PENALTY_GAP_COLUMN: usize = 0;

pub const MAX_ROOM_PLAYERS: usize = 4;
pub const MAX_ROOM_NAME_LEN: usize = 32;

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;

use crate::bag::PieceBag;
use crate::constants::{
    DROP_INTERVAL_MS, MAX_ROOM_PLAYERS, POINTS_PER_LINE, SPAWN_X, SPAWN_Y,
};
use crate::piece::Piece;
use crate::player::Player;
use crate::score_store::ScoreStore;
use crate::transport::Outbound;
use crate::types::{
    Direction, ErrorKind, GameEvent, Phase, PieceAssignment, PlayerInfo,
};

/// One named room: roster, phase machine, shared piece stream, and the
/// per-player gravity/lock/penalty engine. Every mutation runs under the
/// room's mutex, so commands, ticks, and membership events serialize.
pub struct Room {
    name: String,
    phase: Phase,
    players: Vec<Player>,
    bag: Option<PieceBag>,
    winner: Option<PlayerInfo>,
    started_at_ms: u64,
    ticker_epoch: u64,
    outbound: Arc<dyn Outbound>,
    scores: Option<Arc<dyn ScoreStore>>,
}

impl Room {
    pub fn new(
        name: &str,
        outbound: Arc<dyn Outbound>,
        scores: Option<Arc<dyn ScoreStore>>,
    ) -> Self {
        Self {
            name: name.to_string(),
            phase: Phase::Waiting,
            players: Vec::new(),
            bag: None,
            winner: None,
            started_at_ms: 0,
            ticker_epoch: 0,
            outbound,
            scores,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn ticker_epoch(&self) -> u64 {
        self.ticker_epoch
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn winner(&self) -> Option<&PlayerInfo> {
        self.winner.as_ref()
    }

    pub fn players_info(&self) -> Vec<PlayerInfo> {
        self.players.iter().map(|p| p.view.clone()).collect()
    }

    fn member_conn_ids(&self) -> Vec<String> {
        self.players.iter().map(|p| p.view.id.clone()).collect()
    }

    fn emit_room(&self, event: GameEvent) {
        self.outbound.send_many(&self.member_conn_ids(), &event);
    }

    fn emit_error(&self, conn_id: &str, code: ErrorKind, message: &str) {
        self.outbound.send_to(
            conn_id,
            &GameEvent::Error {
                code,
                message: message.to_string(),
            },
        );
    }

    fn player_index(&self, conn_id: &str) -> Option<usize> {
        self.players.iter().position(|p| p.view.id == conn_id)
    }

    /// Adds a player; the first joiner becomes host. Returns whether the
    /// join took effect so the registry knows to map the connection.
    pub fn join(&mut self, conn_id: &str, player_name: &str) -> bool {
        if self.phase == Phase::Playing {
            self.emit_error(
                conn_id,
                ErrorKind::GameInProgress,
                "a match is running in this room",
            );
            return false;
        }
        if self.players.len() >= MAX_ROOM_PLAYERS {
            self.emit_error(conn_id, ErrorKind::RoomFull, "room is full");
            return false;
        }
        if self.players.iter().any(|p| p.view.name == player_name) {
            self.emit_error(conn_id, ErrorKind::NameTaken, "name already in use");
            return false;
        }

        let is_host = self.players.is_empty();
        let player = Player::new(conn_id, player_name, &self.name, is_host);
        let info = player.view.clone();
        self.players.push(player);
        self.emit_room(GameEvent::PlayerJoined {
            player: info,
            players: self.players_info(),
        });
        true
    }

    /// Removes a player, re-elects the host if needed, and runs the
    /// game-end check when a match is in progress.
    pub fn leave(&mut self, conn_id: &str) {
        let Some(idx) = self.player_index(conn_id) else {
            return;
        };
        let removed = self.players.remove(idx);

        if removed.view.is_host && !self.players.is_empty() {
            self.players[0].view.is_host = true;
            let host = self.players[0].view.clone();
            self.emit_room(GameEvent::NewHost { host });
        }
        self.emit_room(GameEvent::PlayerLeft {
            player_id: removed.view.id,
            players: self.players_info(),
        });

        if self.phase == Phase::Playing {
            self.check_game_end();
        }
    }

    /// Host-only. Deals the first two pieces of a fresh deterministic
    /// stream to every player and opens the match. Returns the new ticker
    /// epoch so the caller can spawn the gravity ticker.
    pub fn start(&mut self, conn_id: &str, seed: Option<u64>) -> Option<u64> {
        let Some(idx) = self.player_index(conn_id) else {
            self.emit_error(conn_id, ErrorKind::NotHost, "only the host can start");
            return None;
        };
        if !self.players[idx].view.is_host {
            self.emit_error(conn_id, ErrorKind::NotHost, "only the host can start");
            return None;
        }
        if self.phase != Phase::Waiting {
            self.emit_error(conn_id, ErrorKind::BadPhase, "room is not waiting");
            return None;
        }

        let mut bag = PieceBag::new(seed.unwrap_or_else(now_ms));
        for player in &mut self.players {
            player.reset_for_start();
            player.current = Some(Piece::spawn(bag.kind_at(0)));
            player.next = Some(Piece::spawn(bag.kind_at(1)));
            player.ready = false;
        }
        self.bag = Some(bag);
        self.winner = None;
        self.started_at_ms = now_ms();
        self.phase = Phase::Playing;
        self.ticker_epoch += 1;

        let current_pieces: Vec<PieceAssignment> = self
            .players
            .iter()
            .filter_map(|p| match (&p.current, &p.next) {
                (Some(current), Some(next)) => Some(PieceAssignment {
                    player_id: p.view.id.clone(),
                    current_piece: current.view(),
                    next_piece: next.view(),
                }),
                _ => None,
            })
            .collect();
        self.emit_room(GameEvent::GameStarted {
            players: self.players_info(),
            current_pieces,
        });
        Some(self.ticker_epoch)
    }

    /// Host-only, finished rooms only. Resets the room to `waiting` in
    /// place with the existing roster; a subsequent start deals new pieces.
    pub fn restart(&mut self, conn_id: &str) {
        let Some(idx) = self.player_index(conn_id) else {
            self.emit_error(conn_id, ErrorKind::NotHost, "only the host can restart");
            return;
        };
        if !self.players[idx].view.is_host {
            self.emit_error(conn_id, ErrorKind::NotHost, "only the host can restart");
            return;
        }
        if self.phase != Phase::Finished {
            self.emit_error(conn_id, ErrorKind::BadPhase, "no finished match to restart");
            return;
        }

        self.phase = Phase::Waiting;
        self.winner = None;
        self.bag = None;
        for player in &mut self.players {
            player.reset_idle();
        }
    }

    /// Advisory readiness flag; nothing gates on it.
    pub fn mark_ready(&mut self, conn_id: &str) {
        if let Some(idx) = self.player_index(conn_id) {
            self.players[idx].ready = true;
        }
    }

    fn accepts_input(&self, idx: usize) -> bool {
        self.phase == Phase::Playing && self.players[idx].view.is_alive
    }

    /// Lateral move or soft drop. Invalid moves are silent no-ops; soft
    /// drop never locks.
    pub fn handle_move(&mut self, conn_id: &str, direction: Direction) {
        let Some(idx) = self.player_index(conn_id) else {
            return;
        };
        if !self.accepts_input(idx) {
            return;
        }

        let player = &mut self.players[idx];
        let Some(piece) = player.current.as_mut() else {
            return;
        };
        let (x, y) = match direction {
            Direction::Left => (piece.x - 1, piece.y),
            Direction::Right => (piece.x + 1, piece.y),
            Direction::Down => (piece.x, piece.y + 1),
        };
        if !player.board.is_valid(piece, x, y) {
            return;
        }
        piece.x = x;
        piece.y = y;

        let event = GameEvent::PieceMoved {
            player_id: player.view.id.clone(),
            board: player.board.clone(),
            spectrum: player.view.spectrum,
            current_piece: piece.view(),
        };
        self.emit_room(event);
    }

    /// Validity-gated clockwise rotation; no wall kicks.
    pub fn handle_rotate(&mut self, conn_id: &str) {
        let Some(idx) = self.player_index(conn_id) else {
            return;
        };
        if !self.accepts_input(idx) {
            return;
        }

        let player = &mut self.players[idx];
        let Some(piece) = player.current.as_ref() else {
            return;
        };
        let rotated = piece.rotated_cw();
        if !player.board.is_valid(&rotated, rotated.x, rotated.y) {
            return;
        }
        let current_piece = rotated.view();
        player.current = Some(rotated);

        let event = GameEvent::PieceRotated {
            player_id: player.view.id.clone(),
            board: player.board.clone(),
            spectrum: player.view.spectrum,
            current_piece,
        };
        self.emit_room(event);
    }

    /// Drops the piece to rest and runs the full lock sequence.
    pub fn handle_hard_drop(&mut self, conn_id: &str) {
        let Some(idx) = self.player_index(conn_id) else {
            return;
        };
        if !self.accepts_input(idx) {
            return;
        }

        {
            let player = &mut self.players[idx];
            let Some(piece) = player.current.as_mut() else {
                return;
            };
            while player.board.is_valid(piece, piece.x, piece.y + 1) {
                piece.y += 1;
            }
        }
        let cleared = self.lock_and_respawn(idx);

        let player = &self.players[idx];
        let event = GameEvent::PieceDropped {
            player_id: player.view.id.clone(),
            board: player.board.clone(),
            spectrum: player.view.spectrum,
            lines_cleared: cleared,
            current_piece: player.current.as_ref().map(Piece::view),
        };
        self.emit_room(event);
        self.check_game_end();
    }

    /// One gravity pass over every alive player in insertion order.
    pub fn tick(&mut self) {
        if self.phase != Phase::Playing {
            return;
        }
        for idx in 0..self.players.len() {
            if self.phase != Phase::Playing {
                break;
            }
            if !self.players[idx].view.is_alive {
                continue;
            }
            self.apply_gravity(idx);
        }
    }

    fn apply_gravity(&mut self, idx: usize) {
        let landed = {
            let player = &mut self.players[idx];
            let Some(piece) = player.current.as_mut() else {
                return;
            };
            if player.board.is_valid(piece, piece.x, piece.y + 1) {
                piece.y += 1;
                false
            } else {
                true
            }
        };
        if landed {
            self.lock_and_respawn(idx);
        }

        let player = &self.players[idx];
        let event = GameEvent::BoardUpdate {
            player_id: player.view.id.clone(),
            board: player.board.clone(),
            spectrum: player.view.spectrum,
            current_piece: player.current.as_ref().map(Piece::view),
        };
        self.emit_room(event);
        if landed {
            self.check_game_end();
        }
    }

    /// Lock the current piece, clear lines, score, distribute penalties,
    /// and spawn the next piece from the shared stream. Kills the player on
    /// a blocked spawn. Returns the number of cleared lines.
    fn lock_and_respawn(&mut self, idx: usize) -> usize {
        let cleared = {
            let player = &mut self.players[idx];
            let Some(piece) = player.current.take() else {
                return 0;
            };
            player.board.lock(&piece);
            let cleared = player.board.clear_lines();
            player.view.score += POINTS_PER_LINE * cleared as i32;
            player.view.lines_cleared += cleared as u32;
            player.refresh_spectrum();
            cleared
        };

        if cleared >= 2 {
            self.distribute_penalty(idx, cleared - 1);
        }

        let topped_out = {
            let Some(bag) = self.bag.as_mut() else {
                return cleared;
            };
            let player = &mut self.players[idx];
            player.cursor += 1;
            let current = player.next.take().unwrap_or_else(|| {
                Piece::spawn(bag.kind_at(player.cursor))
            });
            player.next = Some(Piece::spawn(bag.kind_at(player.cursor + 1)));
            let blocked = !player.board.is_valid(&current, SPAWN_X, SPAWN_Y);
            player.current = Some(current);
            blocked
        };
        if topped_out {
            self.kill_player(idx);
        }
        cleared
    }

    /// Pushes `count` penalty rows onto every other living player, then
    /// checks whether the injection crushed anyone's current piece.
    fn distribute_penalty(&mut self, from_idx: usize, count: usize) {
        let victims: Vec<usize> = self
            .players
            .iter()
            .enumerate()
            .filter(|(idx, p)| *idx != from_idx && p.view.is_alive)
            .map(|(idx, _)| idx)
            .collect();
        if victims.is_empty() {
            return;
        }

        for &idx in &victims {
            self.players[idx].board.add_penalty_rows(count);
            self.players[idx].refresh_spectrum();
        }
        let affected: Vec<PlayerInfo> = victims
            .iter()
            .map(|&idx| self.players[idx].view.clone())
            .collect();
        for &idx in &victims {
            let player = &self.players[idx];
            self.emit_room(GameEvent::PenaltyLinesAdded {
                target_player_id: player.view.id.clone(),
                penalty_lines: count,
                affected_players: affected.clone(),
            });
            let update = GameEvent::BoardUpdate {
                player_id: player.view.id.clone(),
                board: player.board.clone(),
                spectrum: player.view.spectrum,
                current_piece: player.current.as_ref().map(Piece::view),
            };
            self.emit_room(update);
        }

        for &idx in &victims {
            let crushed = match self.players[idx].current.as_ref() {
                Some(piece) => !self.players[idx].board.is_valid(piece, piece.x, piece.y),
                None => false,
            };
            if crushed {
                self.kill_player(idx);
            }
        }
    }

    fn kill_player(&mut self, idx: usize) {
        let player = &mut self.players[idx];
        if !player.view.is_alive {
            return;
        }
        player.view.is_alive = false;
        player.current = None;
        player.next = None;
        let player_id = player.view.id.clone();
        self.save_player_score(idx);
        self.emit_room(GameEvent::PlayerLost { player_id });
    }

    /// Finishes the match once at most one player remains alive. The
    /// ticker observes the phase change and exits.
    fn check_game_end(&mut self) {
        if self.phase != Phase::Playing {
            return;
        }
        let alive: Vec<usize> = self
            .players
            .iter()
            .enumerate()
            .filter(|(_, p)| p.view.is_alive)
            .map(|(idx, _)| idx)
            .collect();
        if alive.len() > 1 {
            return;
        }

        self.phase = Phase::Finished;
        self.winner = alive.first().map(|&idx| self.players[idx].view.clone());
        for &idx in &alive {
            self.save_player_score(idx);
        }
        self.emit_room(GameEvent::GameEnded {
            winner: self.winner.clone(),
            players: self.players_info(),
        });
    }

    fn save_player_score(&self, idx: usize) {
        let Some(store) = self.scores.as_ref() else {
            return;
        };
        let player = &self.players[idx];
        let duration_sec = now_ms().saturating_sub(self.started_at_ms) / 1_000;
        store.save_score(
            &player.view.name,
            player.view.score,
            player.view.lines_cleared,
            duration_sec,
        );
    }
}

/// Gravity ticker for one match. Holds only a weak reference so a destroyed
/// room tears its ticker down; the epoch guards against a stale ticker
/// surviving a restart into the next match.
pub fn spawn_ticker(room: Arc<Mutex<Room>>, epoch: u64) {
    tokio::spawn(async move {
        let weak = Arc::downgrade(&room);
        drop(room);
        let mut interval = tokio::time::interval(Duration::from_millis(DROP_INTERVAL_MS));
        interval.tick().await;
        loop {
            interval.tick().await;
            let Some(room) = weak.upgrade() else {
                break;
            };
            let mut guard = room.lock().await;
            if guard.phase() != Phase::Playing || guard.ticker_epoch() != epoch {
                break;
            }
            guard.tick();
        }
    });
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{BOARD_HEIGHT, BOARD_WIDTH, PENALTY_GAP_COLUMN};
    use crate::transport::RecordingOutbound;
    use crate::types::{Cell, PieceKind};
    use std::sync::Mutex as StdMutex;

    fn make_room() -> (Room, Arc<RecordingOutbound>) {
        let outbound = Arc::new(RecordingOutbound::new());
        let room = Room::new("r1", outbound.clone(), None);
        (room, outbound)
    }

    fn start_two_player_room(seed: u64) -> (Room, Arc<RecordingOutbound>) {
        let (mut room, outbound) = make_room();
        assert!(room.join("conn_a", "alice"));
        assert!(room.join("conn_b", "bob"));
        assert!(room.start("conn_a", Some(seed)).is_some());
        (room, outbound)
    }

    fn fill_bottom_rows(room: &mut Room, idx: usize, rows: usize, gap_col: usize) {
        for row in (BOARD_HEIGHT - rows)..BOARD_HEIGHT {
            for col in 0..BOARD_WIDTH {
                if col != gap_col {
                    room.players[idx]
                        .board
                        .set_cell(row, col, Cell::Kind(PieceKind::J));
                }
            }
        }
        room.players[idx].refresh_spectrum();
    }

    /// Vertical I piece whose filled column sits over `board_col`.
    fn vertical_i_over(board_col: i32) -> Piece {
        let mut piece = Piece::spawn(PieceKind::I).rotated_cw();
        piece.x = board_col - 2;
        piece.y = 0;
        piece
    }

    fn host_count(room: &Room) -> usize {
        room.players.iter().filter(|p| p.view.is_host).count()
    }

    #[test]
    fn first_joiner_becomes_host_and_roster_broadcasts() {
        let (mut room, outbound) = make_room();
        assert!(room.join("conn_a", "alice"));
        assert!(room.join("conn_b", "bob"));

        assert!(room.players[0].view.is_host);
        assert!(!room.players[1].view.is_host);
        assert_eq!(host_count(&room), 1);

        let joined: Vec<GameEvent> = outbound
            .events_for("conn_a")
            .into_iter()
            .filter(|event| matches!(event, GameEvent::PlayerJoined { .. }))
            .collect();
        assert_eq!(joined.len(), 2);
        match &joined[1] {
            GameEvent::PlayerJoined { player, players } => {
                assert_eq!(player.name, "bob");
                assert_eq!(players.len(), 2);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn duplicate_name_is_rejected_without_touching_the_roster() {
        let (mut room, outbound) = make_room();
        assert!(room.join("conn_a", "alice"));
        assert!(!room.join("conn_b", "alice"));

        assert_eq!(room.players.len(), 1);
        let errors = outbound.events_for("conn_b");
        assert!(matches!(
            errors.as_slice(),
            [GameEvent::Error {
                code: ErrorKind::NameTaken,
                ..
            }]
        ));
    }

    #[test]
    fn join_is_rejected_while_a_match_runs() {
        let (mut room, outbound) = start_two_player_room(1);
        assert!(!room.join("conn_c", "carol"));
        assert_eq!(room.players.len(), 2);
        assert!(matches!(
            outbound.events_for("conn_c").as_slice(),
            [GameEvent::Error {
                code: ErrorKind::GameInProgress,
                ..
            }]
        ));
    }

    #[test]
    fn join_is_rejected_when_the_room_is_full() {
        let (mut room, outbound) = make_room();
        for idx in 0..MAX_ROOM_PLAYERS {
            assert!(room.join(&format!("conn_{idx}"), &format!("p{idx}")));
        }
        assert!(!room.join("conn_extra", "late"));
        assert!(matches!(
            outbound.events_for("conn_extra").as_slice(),
            [GameEvent::Error {
                code: ErrorKind::RoomFull,
                ..
            }]
        ));
    }

    #[test]
    fn only_the_host_can_start_and_only_once() {
        let (mut room, outbound) = make_room();
        room.join("conn_a", "alice");
        room.join("conn_b", "bob");

        assert!(room.start("conn_b", Some(1)).is_none());
        assert!(matches!(
            outbound.events_for("conn_b").last(),
            Some(GameEvent::Error {
                code: ErrorKind::NotHost,
                ..
            })
        ));

        assert!(room.start("conn_a", Some(1)).is_some());
        assert!(room.start("conn_a", Some(1)).is_none());
        assert!(matches!(
            outbound.events_for("conn_a").last(),
            Some(GameEvent::Error {
                code: ErrorKind::BadPhase,
                ..
            })
        ));
    }

    #[test]
    fn start_deals_the_same_pieces_to_every_player() {
        let (room, outbound) = start_two_player_room(42);

        let a = room.players[0].current.as_ref().expect("alice piece");
        let b = room.players[1].current.as_ref().expect("bob piece");
        assert_eq!(a.kind, b.kind);
        assert_eq!(
            room.players[0].next.as_ref().map(|p| p.kind),
            room.players[1].next.as_ref().map(|p| p.kind)
        );

        let started = outbound
            .events_for("conn_b")
            .into_iter()
            .find_map(|event| match event {
                GameEvent::GameStarted { current_pieces, .. } => Some(current_pieces),
                _ => None,
            })
            .expect("gameStarted emitted");
        assert_eq!(started.len(), 2);
        assert_eq!(started[0].current_piece.kind, started[1].current_piece.kind);
    }

    #[test]
    fn players_consume_the_shared_stream_at_their_own_pace() {
        let (mut room, _outbound) = start_two_player_room(42);

        room.handle_hard_drop("conn_a");
        assert_eq!(room.players[0].cursor, 1);
        assert_eq!(room.players[1].cursor, 0);

        // Alice's new current piece is the stream's index 1, which bob
        // still holds as his preview.
        let a_current = room.players[0].current.as_ref().expect("piece").kind;
        let b_next = room.players[1].next.as_ref().expect("piece").kind;
        assert_eq!(a_current, b_next);
    }

    #[test]
    fn repeated_hard_drops_top_out_and_end_the_game() {
        let (mut room, outbound) = start_two_player_room(42);

        for _ in 0..200 {
            room.handle_hard_drop("conn_a");
            if room.phase() == Phase::Finished {
                break;
            }
        }

        assert_eq!(room.phase(), Phase::Finished);
        assert!(!room.players[0].view.is_alive);
        assert_eq!(room.winner().map(|w| w.name.as_str()), Some("bob"));

        let events = outbound.events_for("conn_b");
        assert!(events.iter().any(|event| matches!(
            event,
            GameEvent::PlayerLost { player_id } if player_id == "conn_a"
        )));
        let winner_name = events.iter().find_map(|event| match event {
            GameEvent::GameEnded { winner, .. } => {
                Some(winner.as_ref().map(|w| w.name.clone()))
            }
            _ => None,
        });
        assert_eq!(winner_name, Some(Some("bob".to_string())));
    }

    #[test]
    fn double_clear_sends_one_penalty_row_to_the_opponent() {
        let (mut room, outbound) = start_two_player_room(7);
        fill_bottom_rows(&mut room, 0, 2, 9);
        room.players[0].current = Some(vertical_i_over(9));

        room.handle_hard_drop("conn_a");

        assert_eq!(room.players[0].view.lines_cleared, 2);
        assert_eq!(room.players[0].view.score, 2 * POINTS_PER_LINE);

        // Bob's board grew by one penalty row with the fixed gap.
        let bob = &room.players[1];
        assert_eq!(bob.board.cell(BOARD_HEIGHT - 1, PENALTY_GAP_COLUMN), Cell::Empty);
        for col in 0..BOARD_WIDTH {
            if col != PENALTY_GAP_COLUMN {
                assert_eq!(bob.board.cell(BOARD_HEIGHT - 1, col), Cell::Penalty);
            }
        }
        assert!(bob.view.spectrum.iter().any(|&h| h == 1));

        let events = outbound.events_for("conn_b");
        assert!(events.iter().any(|event| matches!(
            event,
            GameEvent::PenaltyLinesAdded {
                target_player_id,
                penalty_lines: 1,
                ..
            } if target_player_id == "conn_b"
        )));
        assert!(events.iter().any(|event| matches!(
            event,
            GameEvent::PieceDropped { lines_cleared: 2, .. }
        )));
    }

    #[test]
    fn single_clear_sends_no_penalty() {
        let (mut room, _outbound) = start_two_player_room(7);
        fill_bottom_rows(&mut room, 0, 1, 9);
        room.players[0].current = Some(vertical_i_over(9));

        room.handle_hard_drop("conn_a");

        assert_eq!(room.players[0].view.lines_cleared, 1);
        let bob = &room.players[1];
        assert!(bob
            .board
            .spectrum()
            .iter()
            .all(|&h| h == 0));
    }

    #[test]
    fn penalty_injection_can_crush_the_opponent() {
        let (mut room, outbound) = start_two_player_room(7);
        fill_bottom_rows(&mut room, 0, 2, 9);
        room.players[0].current = Some(vertical_i_over(9));

        // Bob's stack reaches the spawn rows; one more row kills him.
        for row in 2..BOARD_HEIGHT {
            room.players[1].board.set_cell(row, 4, Cell::Kind(PieceKind::L));
        }
        room.players[1].refresh_spectrum();

        room.handle_hard_drop("conn_a");

        assert!(!room.players[1].view.is_alive);
        assert_eq!(room.phase(), Phase::Finished);
        assert_eq!(room.winner().map(|w| w.name.as_str()), Some("alice"));
        assert!(outbound.events_for("conn_a").iter().any(|event| matches!(
            event,
            GameEvent::PlayerLost { player_id } if player_id == "conn_b"
        )));
    }

    #[test]
    fn rotation_against_the_floor_is_rejected() {
        let (mut room, outbound) = start_two_player_room(3);
        let mut piece = Piece::spawn(PieceKind::I);
        piece.x = 0;
        piece.y = (BOARD_HEIGHT - 2) as i32;
        let shape_before = piece.shape.clone();
        room.players[0].current = Some(piece);
        outbound.take();

        room.handle_rotate("conn_a");

        let piece = room.players[0].current.as_ref().expect("piece");
        assert_eq!(piece.shape, shape_before);
        assert!(outbound
            .events_for("conn_a")
            .iter()
            .all(|event| !matches!(event, GameEvent::PieceRotated { .. })));
    }

    #[test]
    fn rotation_into_occupied_cells_is_rejected() {
        let (mut room, _outbound) = start_two_player_room(3);
        let mut piece = Piece::spawn(PieceKind::I);
        piece.x = 0;
        piece.y = 5;
        let shape_before = piece.shape.clone();
        // The rotated I would occupy column 2, rows 5..9.
        room.players[0].board.set_cell(8, 2, Cell::Kind(PieceKind::O));
        room.players[0].current = Some(piece);

        room.handle_rotate("conn_a");
        assert_eq!(
            room.players[0].current.as_ref().expect("piece").shape,
            shape_before
        );
    }

    #[test]
    fn moves_into_walls_are_silent_noops() {
        let (mut room, outbound) = start_two_player_room(3);
        let mut piece = Piece::spawn(PieceKind::I);
        piece.x = 0;
        piece.y = 0;
        room.players[0].current = Some(piece);
        outbound.take();

        room.handle_move("conn_a", Direction::Left);
        let piece = room.players[0].current.as_ref().expect("piece");
        assert_eq!(piece.x, 0);
        assert!(outbound.events_for("conn_a").is_empty());
    }

    #[test]
    fn soft_drop_at_rest_does_not_lock() {
        let (mut room, _outbound) = start_two_player_room(3);
        let mut piece = Piece::spawn(PieceKind::O);
        piece.x = 0;
        piece.y = (BOARD_HEIGHT - 2) as i32;
        room.players[0].current = Some(piece);

        room.handle_move("conn_a", Direction::Down);

        assert_eq!(room.players[0].cursor, 0);
        let piece = room.players[0].current.as_ref().expect("piece");
        assert_eq!(piece.y, (BOARD_HEIGHT - 2) as i32);
        assert!(room.players[0].board.spectrum().iter().all(|&h| h == 0));
    }

    #[test]
    fn gravity_descends_then_locks_and_respawns() {
        let (mut room, outbound) = start_two_player_room(3);
        let y_before = room.players[0].current.as_ref().expect("piece").y;
        room.tick();
        assert_eq!(
            room.players[0].current.as_ref().expect("piece").y,
            y_before + 1
        );
        assert!(outbound
            .events_for("conn_a")
            .iter()
            .any(|event| matches!(event, GameEvent::BoardUpdate { .. })));

        for _ in 0..BOARD_HEIGHT + 2 {
            room.tick();
        }
        assert!(room.players[0].cursor >= 1);
        assert!(room.players[0].board.spectrum().iter().any(|&h| h > 0));
    }

    #[test]
    fn commands_from_unknown_or_dead_connections_are_ignored() {
        let (mut room, outbound) = start_two_player_room(3);
        outbound.take();
        room.handle_move("conn_ghost", Direction::Left);
        room.handle_rotate("conn_ghost");
        room.handle_hard_drop("conn_ghost");
        assert!(outbound.take().is_empty());

        room.players[0].view.is_alive = false;
        room.players[0].current = None;
        room.handle_hard_drop("conn_a");
        assert!(outbound.take().is_empty());
    }

    #[test]
    fn host_reelection_promotes_the_next_joiner() {
        let (mut room, outbound) = make_room();
        room.join("conn_a", "alice");
        room.join("conn_b", "bob");
        room.join("conn_c", "carol");
        outbound.take();

        room.leave("conn_a");

        assert_eq!(host_count(&room), 1);
        assert!(room.players[0].view.is_host);
        assert_eq!(room.players[0].view.name, "bob");

        let events = outbound.events_for("conn_b");
        assert!(matches!(
            &events[0],
            GameEvent::NewHost { host } if host.id == "conn_b"
        ));
        assert!(matches!(
            &events[1],
            GameEvent::PlayerLeft { player_id, players }
                if player_id == "conn_a" && players.len() == 2
        ));
    }

    #[test]
    fn leave_during_play_hands_the_win_to_the_survivor() {
        let (mut room, outbound) = start_two_player_room(3);
        room.leave("conn_a");

        assert_eq!(room.phase(), Phase::Finished);
        assert_eq!(room.winner().map(|w| w.name.as_str()), Some("bob"));
        assert!(outbound.events_for("conn_b").iter().any(|event| matches!(
            event,
            GameEvent::GameEnded { winner: Some(winner), .. } if winner.name == "bob"
        )));
    }

    #[test]
    fn restart_returns_to_waiting_with_the_same_roster() {
        let (mut room, _outbound) = start_two_player_room(42);
        for _ in 0..200 {
            room.handle_hard_drop("conn_a");
            if room.phase() == Phase::Finished {
                break;
            }
        }
        assert_eq!(room.phase(), Phase::Finished);

        // Bob inherited nothing; alice is still host and may restart.
        room.restart("conn_a");
        assert_eq!(room.phase(), Phase::Waiting);
        assert_eq!(room.players.len(), 2);
        for player in &room.players {
            assert_eq!(player.view.score, 0);
            assert_eq!(player.view.lines_cleared, 0);
            assert!(!player.view.is_alive);
            assert!(player.board.spectrum().iter().all(|&h| h == 0));
        }

        assert!(room.start("conn_a", Some(5)).is_some());
        assert_eq!(room.phase(), Phase::Playing);
    }

    #[test]
    fn restart_is_host_only_and_needs_a_finished_match() {
        let (mut room, outbound) = make_room();
        room.join("conn_a", "alice");
        room.join("conn_b", "bob");

        room.restart("conn_a");
        assert!(matches!(
            outbound.events_for("conn_a").last(),
            Some(GameEvent::Error {
                code: ErrorKind::BadPhase,
                ..
            })
        ));

        room.start("conn_a", Some(1));
        room.leave("conn_a");
        assert_eq!(room.phase(), Phase::Finished);

        room.restart("conn_b");
        assert_eq!(room.phase(), Phase::Waiting);
    }

    #[test]
    fn player_ready_is_advisory_only() {
        let (mut room, _outbound) = make_room();
        room.join("conn_a", "alice");
        room.mark_ready("conn_a");
        room.mark_ready("conn_ghost");
        assert!(room.players[0].ready);
        assert_eq!(room.phase(), Phase::Waiting);
    }

    #[test]
    fn phase_only_moves_forward() {
        let (mut room, _outbound) = start_two_player_room(9);
        assert_eq!(room.phase(), Phase::Playing);
        room.leave("conn_b");
        assert_eq!(room.phase(), Phase::Finished);
        // A stale tick cannot resurrect the match.
        room.tick();
        assert_eq!(room.phase(), Phase::Finished);
    }

    struct RecordingScores {
        saved: StdMutex<Vec<(String, i32, u32)>>,
    }

    impl ScoreStore for RecordingScores {
        fn save_score(&self, name: &str, score: i32, lines: u32, _duration_sec: u64) {
            self.saved
                .lock()
                .expect("scores lock")
                .push((name.to_string(), score, lines));
        }

        fn top_scores(&self, _limit: Option<usize>) -> crate::score_store::ScoresResponse {
            crate::score_store::ScoresResponse {
                generated_at_iso: String::new(),
                entries: Vec::new(),
            }
        }
    }

    #[test]
    fn final_scores_are_persisted_once_per_player() {
        let outbound = Arc::new(RecordingOutbound::new());
        let scores = Arc::new(RecordingScores {
            saved: StdMutex::new(Vec::new()),
        });
        let mut room = Room::new("r1", outbound, Some(scores.clone()));
        room.join("conn_a", "alice");
        room.join("conn_b", "bob");
        room.start("conn_a", Some(42));

        for _ in 0..200 {
            room.handle_hard_drop("conn_a");
            if room.phase() == Phase::Finished {
                break;
            }
        }

        let saved = scores.saved.lock().expect("scores lock");
        assert_eq!(saved.len(), 2);
        assert!(saved.iter().any(|(name, _, _)| name == "alice"));
        assert!(saved.iter().any(|(name, _, _)| name == "bob"));
    }
}

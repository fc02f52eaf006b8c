use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::protocol::ParsedClientMessage;
use crate::room::{spawn_ticker, Room};
use crate::score_store::ScoreStore;
use crate::server_utils::valid_room_name;
use crate::transport::Outbound;
use crate::types::{Direction, ErrorKind, GameEvent};

pub type SharedRoom = Arc<Mutex<Room>>;

#[derive(Default)]
struct Indexes {
    rooms: HashMap<String, SharedRoom>,
    conn_rooms: HashMap<String, String>,
}

/// Routes inbound commands to rooms, creates rooms lazily on first join,
/// and tears them down when the last player leaves. Only the two indexes
/// live behind the registry lock; room state is mutated on the room's own
/// mutex.
pub struct Registry {
    indexes: Mutex<Indexes>,
    outbound: Arc<dyn Outbound>,
    scores: Option<Arc<dyn ScoreStore>>,
}

impl Registry {
    pub fn new(outbound: Arc<dyn Outbound>, scores: Option<Arc<dyn ScoreStore>>) -> Self {
        Self {
            indexes: Mutex::new(Indexes::default()),
            outbound,
            scores,
        }
    }

    pub async fn dispatch(&self, conn_id: &str, message: ParsedClientMessage) {
        match message {
            ParsedClientMessage::Join { room, player_name } => {
                self.join(conn_id, &room, &player_name).await;
            }
            ParsedClientMessage::Start { room } => {
                self.start_game(conn_id, &room, None).await;
            }
            ParsedClientMessage::Restart { room } => {
                self.restart_game(conn_id, &room).await;
            }
            ParsedClientMessage::Ready { room } => {
                self.player_ready(conn_id, &room).await;
            }
            ParsedClientMessage::Move { direction } => {
                self.handle_move(conn_id, direction).await;
            }
            ParsedClientMessage::Rotate => {
                self.handle_rotate(conn_id).await;
            }
            ParsedClientMessage::HardDrop => {
                self.handle_hard_drop(conn_id).await;
            }
        }
    }

    /// Lazily creates the room and appends the player; the connection is
    /// indexed only once the room accepted the join. The player name is
    /// passed through as received; the room collision-checks it verbatim.
    pub async fn join(&self, conn_id: &str, room_name: &str, player_name: &str) {
        if !valid_room_name(room_name) {
            self.emit_error(conn_id, ErrorKind::UnknownRoom, "invalid room name");
            return;
        }

        let room = {
            let mut indexes = self.indexes.lock().await;
            if indexes.conn_rooms.contains_key(conn_id) {
                drop(indexes);
                self.emit_error(conn_id, ErrorKind::BadPhase, "already in a room");
                return;
            }
            indexes
                .rooms
                .entry(room_name.to_string())
                .or_insert_with(|| {
                    Arc::new(Mutex::new(Room::new(
                        room_name,
                        self.outbound.clone(),
                        self.scores.clone(),
                    )))
                })
                .clone()
        };

        let joined = room.lock().await.join(conn_id, player_name);
        if joined {
            let mut indexes = self.indexes.lock().await;
            indexes
                .conn_rooms
                .insert(conn_id.to_string(), room_name.to_string());
            // The room may have been dropped between the two critical
            // sections; make sure it is indexed again.
            indexes
                .rooms
                .entry(room_name.to_string())
                .or_insert_with(|| room.clone());
        }
    }

    /// Removes the connection's player from its room; called for explicit
    /// leaves and for connection drops alike.
    pub async fn leave(&self, conn_id: &str) {
        let entry = {
            let mut indexes = self.indexes.lock().await;
            let Some(room_name) = indexes.conn_rooms.remove(conn_id) else {
                return;
            };
            indexes
                .rooms
                .get(&room_name)
                .cloned()
                .map(|room| (room_name, room))
        };
        let Some((room_name, room)) = entry else {
            return;
        };

        let now_empty = {
            let mut guard = room.lock().await;
            guard.leave(conn_id);
            guard.is_empty()
        };
        if now_empty {
            self.destroy_if_empty(&room_name, &room).await;
        }
    }

    pub async fn start_game(&self, conn_id: &str, room_name: &str, seed: Option<u64>) {
        let Some(room) = self.room(room_name).await else {
            self.emit_error(conn_id, ErrorKind::UnknownRoom, "no such room");
            return;
        };
        let epoch = room.lock().await.start(conn_id, seed);
        if let Some(epoch) = epoch {
            println!("[registry] match started in room '{room_name}'");
            spawn_ticker(room, epoch);
        }
    }

    pub async fn restart_game(&self, conn_id: &str, room_name: &str) {
        let Some(room) = self.room(room_name).await else {
            self.emit_error(conn_id, ErrorKind::UnknownRoom, "no such room");
            return;
        };
        room.lock().await.restart(conn_id);
    }

    pub async fn player_ready(&self, conn_id: &str, room_name: &str) {
        let Some(room) = self.room(room_name).await else {
            self.emit_error(conn_id, ErrorKind::UnknownRoom, "no such room");
            return;
        };
        room.lock().await.mark_ready(conn_id);
    }

    pub async fn handle_move(&self, conn_id: &str, direction: Direction) {
        let Some(room) = self.room_of_conn(conn_id).await else {
            self.emit_error(conn_id, ErrorKind::UnknownRoom, "not in a room");
            return;
        };
        room.lock().await.handle_move(conn_id, direction);
    }

    pub async fn handle_rotate(&self, conn_id: &str) {
        let Some(room) = self.room_of_conn(conn_id).await else {
            self.emit_error(conn_id, ErrorKind::UnknownRoom, "not in a room");
            return;
        };
        room.lock().await.handle_rotate(conn_id);
    }

    pub async fn handle_hard_drop(&self, conn_id: &str) {
        let Some(room) = self.room_of_conn(conn_id).await else {
            self.emit_error(conn_id, ErrorKind::UnknownRoom, "not in a room");
            return;
        };
        room.lock().await.handle_hard_drop(conn_id);
    }

    pub async fn room(&self, room_name: &str) -> Option<SharedRoom> {
        self.indexes.lock().await.rooms.get(room_name).cloned()
    }

    pub async fn room_count(&self) -> usize {
        self.indexes.lock().await.rooms.len()
    }

    async fn room_of_conn(&self, conn_id: &str) -> Option<SharedRoom> {
        let indexes = self.indexes.lock().await;
        let room_name = indexes.conn_rooms.get(conn_id)?;
        indexes.rooms.get(room_name).cloned()
    }

    /// Drops the index entry when the room is still the one we emptied and
    /// nobody joined it in the meantime. `try_lock` keeps the registry
    /// section short; a contended room is being joined and must survive.
    async fn destroy_if_empty(&self, room_name: &str, room: &SharedRoom) {
        let mut indexes = self.indexes.lock().await;
        let Some(existing) = indexes.rooms.get(room_name) else {
            return;
        };
        if !Arc::ptr_eq(existing, room) {
            return;
        }
        let still_empty = existing
            .try_lock()
            .map(|guard| guard.is_empty())
            .unwrap_or(false);
        if still_empty {
            indexes.rooms.remove(room_name);
            println!("[registry] destroyed empty room '{room_name}'");
        }
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
}

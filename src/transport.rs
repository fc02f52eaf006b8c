use std::sync::Mutex;

use crate::types::GameEvent;

/// Outbound half of the transport contract. The room fans events out to its
/// member connections; errors go to a single connection. Implementations
/// must be callable from inside a room's critical section, so they queue
/// rather than block.
pub trait Outbound: Send + Sync {
    fn send_to(&self, conn_id: &str, event: &GameEvent);

    fn send_many(&self, conn_ids: &[String], event: &GameEvent) {
        for conn_id in conn_ids {
            self.send_to(conn_id, event);
        }
    }
}

pub fn encode_frame(event: &GameEvent) -> Option<String> {
    serde_json::to_string(event).ok()
}

/// Discards everything; used by the headless simulator.
pub struct NullOutbound;

impl Outbound for NullOutbound {
    fn send_to(&self, _conn_id: &str, _event: &GameEvent) {}
}

/// Captures every delivery for inspection; used by tests and the simulator.
#[derive(Default)]
pub struct RecordingOutbound {
    deliveries: Mutex<Vec<(String, GameEvent)>>,
}

impl RecordingOutbound {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<(String, GameEvent)> {
        let mut deliveries = self.deliveries.lock().expect("outbound lock");
        std::mem::take(&mut *deliveries)
    }

    pub fn events_for(&self, conn_id: &str) -> Vec<GameEvent> {
        self.deliveries
            .lock()
            .expect("outbound lock")
            .iter()
            .filter(|(target, _)| target == conn_id)
            .map(|(_, event)| event.clone())
            .collect()
    }
}

impl Outbound for RecordingOutbound {
    fn send_to(&self, conn_id: &str, event: &GameEvent) {
        self.deliveries
            .lock()
            .expect("outbound lock")
            .push((conn_id.to_string(), event.clone()));
    }
}

//! The outbound message queue. Engine code pushes records here; the hosting layer
//! drains the queue after every inbound message and every tick and fans the records
//! out over the live connections.

use protocol::ServerMessage;

/// One outbound record with its addressing.
#[derive(Clone, Debug)]
pub enum Outbound {
    /// Goes to every connected view (players, bases, dashboards).
    Broadcast(ServerMessage),
    /// Goes to a single player's transport only.
    ToPlayer { player_id: String, message: ServerMessage },
    /// Goes to a single base phone only.
    ToBase { base_id: String, message: ServerMessage },
}

/// Queue of pending outbound records. Draining empties it.
#[derive(Default)]
pub struct OutboundQueue {
    records: Vec<Outbound>,
}

impl OutboundQueue {
    pub fn broadcast(&mut self, message: ServerMessage) {
        self.records.push(Outbound::Broadcast(message));
    }

    pub fn to_player(&mut self, player_id: impl Into<String>, message: ServerMessage) {
        self.records.push(Outbound::ToPlayer { player_id: player_id.into(), message });
    }

    pub fn to_base(&mut self, base_id: impl Into<String>, message: ServerMessage) {
        self.records.push(Outbound::ToBase { base_id: base_id.into(), message });
    }

    pub fn drain(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.records)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[cfg(test)]
    pub fn records(&self) -> &[Outbound] {
        &self.records
    }
}

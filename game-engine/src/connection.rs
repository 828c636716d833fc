//! Session bookkeeping: token to player to number. Tokens are unguessable and
//! allow reconnecting; numbers are display identifiers handed out lowest-free
//! and reused only after permanent removal. Lobby disconnects carry a grace
//! deadline in caller-supplied wall milliseconds so the registry itself stays
//! deterministic.

use rand::RngCore;

/// One known session.
#[derive(Clone, Debug)]
pub struct ConnectionEntry {
    pub player_id: String,
    pub name: String,
    pub session_token: String,
    /// 1-based, lowest free on registration.
    pub number: u32,
    pub connected: bool,
    /// Wall deadline after which a lobby disconnect becomes permanent.
    pub lobby_grace_deadline_ms: Option<u64>,
    /// Ready flag used for the post-game auto relaunch.
    pub lobby_ready: bool,
    pub last_activity_ms: u64,
}

/// Owns every session of the current lobby.
#[derive(Default, Debug)]
pub struct ConnectionRegistry {
    entries: Vec<ConnectionEntry>,
}

impl ConnectionRegistry {
    /// Registers a session, allocating the lowest free player number. An already
    /// known player id gets its existing entry back (a phone retrying its join).
    pub fn register(
        &mut self,
        player_id: &str,
        name: &str,
        wall_ms: u64,
        rng: &mut dyn RngCore,
    ) -> &ConnectionEntry {
        if let Some(at) = self.entries.iter().position(|e| e.player_id == player_id) {
            let entry = &mut self.entries[at];
            entry.name = name.to_string();
            entry.connected = true;
            entry.lobby_grace_deadline_ms = None;
            entry.last_activity_ms = wall_ms;
            return &self.entries[at];
        }
        let number = self.lowest_free_number();
        self.entries.push(ConnectionEntry {
            player_id: player_id.to_string(),
            name: name.to_string(),
            session_token: generate_token(rng),
            number,
            connected: true,
            lobby_grace_deadline_ms: None,
            lobby_ready: false,
            last_activity_ms: wall_ms,
        });
        self.entries.last().expect("just pushed")
    }

    fn lowest_free_number(&self) -> u32 {
        let mut number = 1;
        while self.entries.iter().any(|e| e.number == number) {
            number += 1;
        }
        number
    }

    pub fn by_token(&self, token: &str) -> Option<&ConnectionEntry> {
        self.entries.iter().find(|e| e.session_token == token)
    }

    pub fn get(&self, player_id: &str) -> Option<&ConnectionEntry> {
        self.entries.iter().find(|e| e.player_id == player_id)
    }

    pub fn get_mut(&mut self, player_id: &str) -> Option<&mut ConnectionEntry> {
        self.entries.iter_mut().find(|e| e.player_id == player_id)
    }

    /// Marks a disconnect. A lobby disconnect starts the grace timer; in-game
    /// disconnects are tracked on the player instead.
    pub fn mark_disconnected(&mut self, player_id: &str, grace_deadline_ms: Option<u64>) {
        if let Some(entry) = self.get_mut(player_id) {
            entry.connected = false;
            entry.lobby_grace_deadline_ms = grace_deadline_ms;
        }
    }

    /// Rebinds a session after reconnect, cancelling any pending grace timer.
    pub fn mark_reconnected(&mut self, player_id: &str, wall_ms: u64) {
        if let Some(entry) = self.get_mut(player_id) {
            entry.connected = true;
            entry.lobby_grace_deadline_ms = None;
            entry.last_activity_ms = wall_ms;
        }
    }

    /// Removes every entry whose lobby grace has expired and returns their ids.
    /// Their numbers are free again afterwards.
    pub fn expire_lobby_grace(&mut self, wall_ms: u64) -> Vec<String> {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| matches!(e.lobby_grace_deadline_ms, Some(at) if wall_ms >= at))
            .map(|e| e.player_id.clone())
            .collect();
        self.entries
            .retain(|e| !matches!(e.lobby_grace_deadline_ms, Some(at) if wall_ms >= at));
        expired
    }

    /// Permanent removal (kick, grace expiry, reset). Frees the number.
    pub fn remove(&mut self, player_id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.player_id != player_id);
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[ConnectionEntry] {
        &self.entries
    }

    pub fn connected_count(&self) -> usize {
        self.entries.iter().filter(|e| e.connected).count()
    }

    pub fn reset_lobby_ready(&mut self) {
        for entry in &mut self.entries {
            entry.lobby_ready = false;
        }
    }
}

fn generate_token(rng: &mut dyn RngCore) -> String {
    format!("{:016x}{:016x}", rng.next_u64(), rng.next_u64())
}

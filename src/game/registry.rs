//! Player registry: who is in the room, under which connection, in which slot

use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use super::player::{spawn_for_slot, Player};
use super::ConnId;

/// Longest accepted display name, in characters
pub const MAX_NAME_LEN: usize = 20;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NameError {
    #[error("Name cannot be empty.")]
    Empty,

    #[error("Name must be at most {MAX_NAME_LEN} characters long.")]
    TooLong,

    #[error("Name is already taken.")]
    Taken,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum JoinError {
    #[error("Room is already full.")]
    RoomFull,

    #[error(transparent)]
    InvalidName(#[from] NameError),

    #[error("You have already joined this room.")]
    AlreadyJoined,
}

/// Players in join order. `players[i].slot == i` always holds.
#[derive(Debug, Clone)]
pub struct PlayerRegistry {
    players: Vec<Player>,
    connections: HashMap<ConnId, Uuid>,
    capacity: usize,
}

impl PlayerRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            players: Vec::with_capacity(capacity),
            connections: HashMap::new(),
            capacity,
        }
    }

    /// Trimmed name, or why it is unacceptable
    pub fn validate_name(&self, raw: &str) -> Result<String, NameError> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(NameError::Empty);
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(NameError::TooLong);
        }
        if self.players.iter().any(|p| p.name == name) {
            return Err(NameError::Taken);
        }
        Ok(name.to_string())
    }

    /// Add a player for `conn` in the next free slot
    pub fn join(&mut self, conn: ConnId, raw_name: &str) -> Result<&Player, JoinError> {
        if self.connections.contains_key(&conn) {
            return Err(JoinError::AlreadyJoined);
        }
        if self.is_full() {
            return Err(JoinError::RoomFull);
        }
        let name = self.validate_name(raw_name)?;

        let slot = self.players.len();
        let player = Player::new(Uuid::new_v4(), name, slot, spawn_for_slot(slot));
        self.connections.insert(conn, player.id);
        self.players.push(player);

        Ok(&self.players[slot])
    }

    /// Remove the player bound to `conn` and close the slot gap
    pub fn leave(&mut self, conn: ConnId) -> Option<Player> {
        let player_id = self.connections.remove(&conn)?;
        let idx = self.players.iter().position(|p| p.id == player_id)?;
        let player = self.players.remove(idx);

        for (slot, remaining) in self.players.iter_mut().enumerate().skip(idx) {
            debug!(player = %remaining.name, from = remaining.slot, to = slot, "Reindexing slot");
            remaining.slot = slot;
        }

        Some(player)
    }

    pub fn player(&self, conn: ConnId) -> Option<&Player> {
        let id = self.connections.get(&conn)?;
        self.players.iter().find(|p| p.id == *id)
    }

    pub fn player_mut(&mut self, conn: ConnId) -> Option<&mut Player> {
        let id = *self.connections.get(&conn)?;
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn contains(&self, conn: ConnId) -> bool {
        self.connections.contains_key(&conn)
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn players_mut(&mut self) -> &mut [Player] {
        &mut self.players
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.capacity
    }

    pub fn alive(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| p.alive)
    }

    pub fn clear(&mut self) {
        self.players.clear();
        self.connections.clear();
    }
}

//! Authoritative player record

use serde::Serialize;
use uuid::Uuid;

use super::board::{Cell, SPAWN_POSITIONS};
use super::physics::{tile_centre, Position};

/// Lives every player starts a match with
pub const STARTING_LIVES: u32 = 3;

/// Player state in a match (authoritative)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: Uuid,
    pub name: String,

    // Grid cell plus sub-tile pixel centre for smooth movement
    pub x: i32,
    pub y: i32,
    pub px: f32,
    pub py: f32,

    pub lives: u32,
    pub alive: bool,

    pub bomb_capacity: u32,
    pub flame_range: u32,
    pub speed: f32,

    /// Index into the spawn table
    pub slot: usize,
}

impl Player {
    pub fn new(id: Uuid, name: String, slot: usize, spawn: Cell) -> Self {
        let (px, py) = tile_centre(spawn);
        Self {
            id,
            name,
            x: spawn.x,
            y: spawn.y,
            px,
            py,
            lives: STARTING_LIVES,
            alive: true,
            bomb_capacity: 1,
            flame_range: 1,
            speed: 1.0,
            slot,
        }
    }

    pub fn cell(&self) -> Cell {
        Cell::new(self.x, self.y)
    }

    pub fn position(&self) -> Position {
        Position {
            cell: self.cell(),
            px: self.px,
            py: self.py,
        }
    }

    pub fn set_position(&mut self, pos: Position) {
        self.x = pos.cell.x;
        self.y = pos.cell.y;
        self.px = pos.px;
        self.py = pos.py;
    }

    /// Spawn cell for this player's current slot
    pub fn spawn_cell(&self) -> Cell {
        spawn_for_slot(self.slot)
    }

    pub fn respawn(&mut self) {
        let spawn = self.spawn_cell();
        let (px, py) = tile_centre(spawn);
        self.set_position(Position { cell: spawn, px, py });
    }

    /// Take one life. Returns true when this hit eliminated the player.
    pub fn take_hit(&mut self) -> bool {
        self.lives = self.lives.saturating_sub(1);
        self.alive = self.lives > 0;
        !self.alive
    }
}

pub fn spawn_for_slot(slot: usize) -> Cell {
    SPAWN_POSITIONS[slot % SPAWN_POSITIONS.len()]
}

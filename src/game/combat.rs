//! Combat system - bombs, explosion geometry, damage

use std::collections::{HashSet, VecDeque};

use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

use super::board::{Board, Cell, Tile};
use super::player::Player;
use super::powerup::{PowerUpField, PowerUpKind};

/// Active bomb on the board
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bomb {
    pub id: Uuid,
    #[serde(rename = "playerId")]
    pub owner_id: Uuid,
    pub x: i32,
    pub y: i32,
    /// Captured from the owner when placed
    pub flame_range: u32,
    /// Unix millis
    pub placed_at: u64,
    pub fuse_ms: u64,
}

impl Bomb {
    pub fn new(owner: &Player, placed_at: u64, fuse_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner.id,
            x: owner.x,
            y: owner.y,
            flame_range: owner.flame_range,
            placed_at,
            fuse_ms,
        }
    }

    pub fn cell(&self) -> Cell {
        Cell::new(self.x, self.y)
    }
}

/// Cells reached by a single bomb's flames
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Blast {
    /// Origin first, then each ray outward
    pub cells: Vec<Cell>,
    /// Blocks that stopped a ray (included in `cells`)
    pub blocks: Vec<Cell>,
}

/// Everything one detonation (including chained bombs) changed
#[derive(Debug, Clone, Default)]
pub struct Detonation {
    pub cells: Vec<Cell>,
    pub bombs: Vec<Bomb>,
    pub destroyed_blocks: Vec<Cell>,
    pub drops: Vec<(Cell, PowerUpKind)>,
    pub hits: Vec<Hit>,
    /// Power-ups picked up by players respawning onto them
    pub pickups: Vec<(Uuid, PowerUpKind)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub player_id: Uuid,
    pub lives_left: u32,
    pub eliminated: bool,
}

const RAYS: [(i32, i32); 4] = [(0, -1), (0, 1), (-1, 0), (1, 0)];

/// Combat system for explosion resolution
pub struct CombatSystem;

impl CombatSystem {
    /// Cast the four flame rays from `origin`. Walls stop a ray and are
    /// excluded; a block stops a ray and is included. Pure.
    pub fn blast(board: &Board, origin: Cell, range: u32) -> Blast {
        let mut blast = Blast {
            cells: vec![origin],
            blocks: Vec::new(),
        };

        for (dx, dy) in RAYS {
            for dist in 1..=range as i32 {
                let cell = origin.offset(dx * dist, dy * dist);
                match board.tile(cell) {
                    None | Some(Tile::Wall) => break,
                    Some(Tile::Block) => {
                        blast.cells.push(cell);
                        blast.blocks.push(cell);
                        break;
                    }
                    Some(Tile::Empty) => blast.cells.push(cell),
                }
            }
        }

        blast
    }

    /// Resolve the bomb `bomb_id`. Returns `None` if it is no longer active,
    /// in which case nothing is touched.
    pub fn detonate<R: Rng + ?Sized>(
        bomb_id: Uuid,
        bombs: &mut Vec<Bomb>,
        board: &mut Board,
        power_ups: &mut PowerUpField,
        players: &mut [Player],
        drop_chance: f64,
        rng: &mut R,
    ) -> Option<Detonation> {
        let first = take_bomb(bombs, bomb_id)?;

        let mut detonation = Detonation::default();
        let mut seen: HashSet<Cell> = HashSet::new();
        let mut struck: Vec<Cell> = Vec::new();
        let mut pending = VecDeque::from([first]);

        // Every ray in the chain sees the board as it stood before the blast
        while let Some(bomb) = pending.pop_front() {
            let blast = Self::blast(board, bomb.cell(), bomb.flame_range);

            for cell in blast.blocks {
                if !struck.contains(&cell) {
                    struck.push(cell);
                }
            }

            for cell in blast.cells {
                if seen.insert(cell) {
                    detonation.cells.push(cell);
                }
                // Flames set off any other bomb they reach
                while let Some(idx) = bombs.iter().position(|b| b.cell() == cell) {
                    pending.push_back(bombs.remove(idx));
                }
            }

            detonation.bombs.push(bomb);
        }

        for cell in struck {
            if board.destroy_block(cell) {
                detonation.destroyed_blocks.push(cell);
                if rng.gen_bool(drop_chance) {
                    if let Some(kind) = power_ups.spawn(cell, rng) {
                        detonation.drops.push((cell, kind));
                    }
                }
            }
        }

        for player in players.iter_mut().filter(|p| p.alive) {
            if !seen.contains(&player.cell()) {
                continue;
            }
            let eliminated = player.take_hit();
            if eliminated {
                if let Some(kind) = power_ups.spawn(player.cell(), rng) {
                    detonation.drops.push((player.cell(), kind));
                }
            } else {
                player.respawn();
                if let Some(kind) = power_ups.collect(player) {
                    detonation.pickups.push((player.id, kind));
                }
            }
            detonation.hits.push(Hit {
                player_id: player.id,
                lives_left: player.lives,
                eliminated,
            });
        }

        Some(detonation)
    }
}

fn take_bomb(bombs: &mut Vec<Bomb>, id: Uuid) -> Option<Bomb> {
    let idx = bombs.iter().position(|b| b.id == id)?;
    Some(bombs.remove(idx))
}

//! Player movement: discrete grid steps or sub-tile pixel movement

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::board::{Board, Cell};

/// Tile edge length in pixels for sub-tile movement
pub const TILE_SIZE: f32 = 40.0;
/// Pixels travelled per move message at speed 1.0
pub const PIXEL_STEP: f32 = 10.0;
/// Side of the square player hitbox
pub const HITBOX: f32 = 28.0;
/// How far off-lane a blocked player may be slid around a corner
pub const NUDGE_TOLERANCE: f32 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    pub fn is_horizontal(self) -> bool {
        matches!(self, Direction::Left | Direction::Right)
    }
}

/// Where a player stands: authoritative cell plus pixel centre
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub cell: Cell,
    pub px: f32,
    pub py: f32,
}

impl Position {
    pub fn centred(cell: Cell) -> Self {
        let (px, py) = tile_centre(cell);
        Self { cell, px, py }
    }
}

pub fn tile_centre(cell: Cell) -> (f32, f32) {
    (
        (cell.x as f32 + 0.5) * TILE_SIZE,
        (cell.y as f32 + 0.5) * TILE_SIZE,
    )
}

pub fn cell_at(px: f32, py: f32) -> Cell {
    Cell::new((px / TILE_SIZE).floor() as i32, (py / TILE_SIZE).floor() as i32)
}

/// Everything a mover can bump into
#[derive(Debug, Clone, Copy)]
pub struct Obstacles<'a> {
    pub board: &'a Board,
    /// Cells holding a bomb
    pub bombs: &'a [Cell],
    /// Cells of other living players
    pub players: &'a [Cell],
}

impl Obstacles<'_> {
    fn has_bomb(&self, cell: Cell) -> bool {
        self.bombs.contains(&cell)
    }

    fn has_player(&self, cell: Cell) -> bool {
        self.players.contains(&cell)
    }

    /// A cell a grid mover may enter
    pub fn is_passable(&self, cell: Cell) -> bool {
        self.board.is_open(cell) && !self.has_bomb(cell) && !self.has_player(cell)
    }
}

/// Pluggable movement model for the action processor
pub trait MovementStrategy: Send + Sync + std::fmt::Debug {
    /// Resulting position, or `None` when the move is illegal
    fn try_move(
        &self,
        from: Position,
        direction: Direction,
        speed: f32,
        obstacles: &Obstacles<'_>,
    ) -> Option<Position>;
}

/// One tile per step, `floor(speed)` steps per move
#[derive(Debug, Default, Clone, Copy)]
pub struct GridMovement;

impl MovementStrategy for GridMovement {
    fn try_move(
        &self,
        from: Position,
        direction: Direction,
        speed: f32,
        obstacles: &Obstacles<'_>,
    ) -> Option<Position> {
        let (dx, dy) = direction.delta();
        let steps = (speed.floor() as i32).max(1);

        let mut cell = from.cell;
        for _ in 0..steps {
            let next = cell.offset(dx, dy);
            if !obstacles.is_passable(next) {
                break;
            }
            cell = next;
        }

        (cell != from.cell).then(|| Position::centred(cell))
    }
}

/// Continuous movement with AABB collision and corner nudging
#[derive(Debug, Default, Clone, Copy)]
pub struct PixelMovement;

impl PixelMovement {
    /// Tiles overlapped by a hitbox centred on (px, py)
    fn covered_cells(px: f32, py: f32) -> impl Iterator<Item = Cell> {
        let half = HITBOX / 2.0;
        let min = cell_at(px - half, py - half);
        let max = cell_at(px + half - 0.01, py + half - 0.01);
        (min.y..=max.y).flat_map(move |y| (min.x..=max.x).map(move |x| Cell::new(x, y)))
    }

    fn blocked(from: Position, px: f32, py: f32, obstacles: &Obstacles<'_>) -> bool {
        // Bombs already under the player never trap them
        let standing_on: Vec<Cell> = Self::covered_cells(from.px, from.py).collect();
        let hits_terrain = Self::covered_cells(px, py).any(|cell| {
            !obstacles.board.is_open(cell)
                || (obstacles.has_bomb(cell) && !standing_on.contains(&cell))
        });
        let centre = cell_at(px, py);
        hits_terrain || (centre != from.cell && obstacles.has_player(centre))
    }

    fn settle(px: f32, py: f32) -> Position {
        Position {
            cell: cell_at(px, py),
            px,
            py,
        }
    }
}

impl MovementStrategy for PixelMovement {
    fn try_move(
        &self,
        from: Position,
        direction: Direction,
        speed: f32,
        obstacles: &Obstacles<'_>,
    ) -> Option<Position> {
        let (dx, dy) = direction.delta();
        let step = PIXEL_STEP * speed;
        let px = from.px + dx as f32 * step;
        let py = from.py + dy as f32 * step;

        if !Self::blocked(from, px, py, obstacles) {
            return Some(Self::settle(px, py));
        }

        // Slide toward the lane centre when only a corner is in the way
        let (lane_x, lane_y) = tile_centre(from.cell);
        let offset = if direction.is_horizontal() {
            lane_y - from.py
        } else {
            lane_x - from.px
        };
        if offset.abs() < f32::EPSILON || offset.abs() > NUDGE_TOLERANCE {
            return None;
        }
        if !obstacles.board.is_open(from.cell.offset(dx, dy)) {
            return None;
        }

        let nudge = offset.signum() * offset.abs().min(step);
        let (nx, ny) = if direction.is_horizontal() {
            (from.px, from.py + nudge)
        } else {
            (from.px + nudge, from.py)
        };
        if Self::blocked(from, nx, ny, obstacles) {
            return None;
        }
        Some(Self::settle(nx, ny))
    }
}

/// Which movement model the room runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MovementMode {
    #[default]
    Grid,
    Pixel,
}

impl MovementMode {
    pub fn strategy(self) -> Box<dyn MovementStrategy> {
        match self {
            MovementMode::Grid => Box::new(GridMovement),
            MovementMode::Pixel => Box::new(PixelMovement),
        }
    }
}

impl FromStr for MovementMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grid" => Ok(MovementMode::Grid),
            "pixel" => Ok(MovementMode::Pixel),
            other => Err(format!("unknown movement mode '{other}'")),
        }
    }
}

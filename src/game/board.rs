//! Arena board: fixed wall skeleton plus randomly seeded destructible blocks

use rand::Rng;
use serde::{Serialize, Serializer};

/// Side length of the square arena
pub const GRID_SIZE: usize = 11;

/// Chance that an eligible cell is seeded with a block
pub const BLOCK_DENSITY: f64 = 0.6;

/// Spawn cells indexed by join slot
pub const SPAWN_POSITIONS: [Cell; 4] = [
    Cell::new(1, 1),
    Cell::new(9, 9),
    Cell::new(1, 9),
    Cell::new(9, 1),
];

/// Grid coordinate (column `x`, row `y`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Chebyshev distance
    pub fn distance(self, other: Cell) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }
}

/// Contents of a single board tile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tile {
    Empty,
    Block,
    Wall,
}

impl Tile {
    /// Wire code understood by clients
    pub fn code(self) -> u8 {
        match self {
            Tile::Empty => 0,
            Tile::Block => 1,
            Tile::Wall => 2,
        }
    }

    pub fn is_solid(self) -> bool {
        !matches!(self, Tile::Empty)
    }
}

impl Serialize for Tile {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

/// Row-major square grid of tiles
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Board {
    rows: Vec<Vec<Tile>>,
}

impl Board {
    /// Build a fresh board: wall skeleton, then blocks everywhere except
    /// the 3x3 area around each spawn.
    pub fn generate<R: Rng + ?Sized>(size: usize, spawns: &[Cell], rng: &mut R) -> Self {
        let mut board = Self::skeleton(size);
        for y in 0..size {
            for x in 0..size {
                let cell = Cell::new(x as i32, y as i32);
                if board.tile(cell) != Some(Tile::Empty) {
                    continue;
                }
                let near_spawn = spawns.iter().any(|spawn| spawn.distance(cell) <= 1);
                if !near_spawn && rng.gen_bool(BLOCK_DENSITY) {
                    board.rows[y][x] = Tile::Block;
                }
            }
        }
        board
    }

    /// Outer ring plus pillars at every even interior coordinate pair
    pub fn skeleton(size: usize) -> Self {
        let rows = (0..size)
            .map(|y| {
                (0..size)
                    .map(|x| {
                        if Self::is_fixed_wall(size, x, y) {
                            Tile::Wall
                        } else {
                            Tile::Empty
                        }
                    })
                    .collect()
            })
            .collect();
        Self { rows }
    }

    fn is_fixed_wall(size: usize, x: usize, y: usize) -> bool {
        let edge = size - 1;
        x == 0 || y == 0 || x == edge || y == edge || (x % 2 == 0 && y % 2 == 0)
    }

    pub fn size(&self) -> usize {
        self.rows.len()
    }

    pub fn in_bounds(&self, cell: Cell) -> bool {
        let size = self.size() as i32;
        (0..size).contains(&cell.x) && (0..size).contains(&cell.y)
    }

    /// Tile at `cell`, or `None` outside the board
    pub fn tile(&self, cell: Cell) -> Option<Tile> {
        if !self.in_bounds(cell) {
            return None;
        }
        Some(self.rows[cell.y as usize][cell.x as usize])
    }

    /// Out-of-bounds counts as solid
    pub fn is_open(&self, cell: Cell) -> bool {
        self.tile(cell) == Some(Tile::Empty)
    }

    /// Turn a block into open floor. Walls are never touched.
    pub fn destroy_block(&mut self, cell: Cell) -> bool {
        if self.tile(cell) != Some(Tile::Block) {
            return false;
        }
        self.rows[cell.y as usize][cell.x as usize] = Tile::Empty;
        true
    }

    #[cfg(test)]
    pub fn set(&mut self, cell: Cell, tile: Tile) {
        self.rows[cell.y as usize][cell.x as usize] = tile;
    }

    #[cfg(test)]
    pub fn block_count(&self) -> usize {
        self.rows
            .iter()
            .flatten()
            .filter(|tile| **tile == Tile::Block)
            .count()
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::skeleton(GRID_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn cells(size: usize) -> impl Iterator<Item = Cell> {
        (0..size as i32).flat_map(move |y| (0..size as i32).map(move |x| Cell::new(x, y)))
    }

    #[test]
    fn walls_are_fixed_for_every_seed() {
        for seed in 0..32 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let board = Board::generate(GRID_SIZE, &SPAWN_POSITIONS, &mut rng);
            let skeleton = Board::skeleton(GRID_SIZE);
            for cell in cells(GRID_SIZE) {
                let fixed = skeleton.tile(cell) == Some(Tile::Wall);
                assert_eq!(board.tile(cell) == Some(Tile::Wall), fixed, "seed {seed} cell {cell:?}");
            }
        }
    }

    #[test]
    fn spawn_neighbourhoods_stay_clear() {
        for seed in 0..32 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let board = Board::generate(GRID_SIZE, &SPAWN_POSITIONS, &mut rng);
            for spawn in SPAWN_POSITIONS {
                for cell in cells(GRID_SIZE).filter(|c| c.distance(spawn) <= 1) {
                    assert_ne!(board.tile(cell), Some(Tile::Block), "seed {seed} cell {cell:?}");
                }
                assert!(board.is_open(spawn));
            }
        }
    }

    #[test]
    fn blocks_are_seeded_roughly_at_density() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let board = Board::generate(GRID_SIZE, &SPAWN_POSITIONS, &mut rng);
        // 53 cells are eligible once walls and spawn areas are excluded
        let blocks = board.block_count();
        assert!(blocks > 20 && blocks < 50, "unexpected block count {blocks}");
    }

    #[test]
    fn skeleton_layout_matches_classic_arena() {
        let board = Board::skeleton(GRID_SIZE);
        assert_eq!(board.tile(Cell::new(0, 5)), Some(Tile::Wall));
        assert_eq!(board.tile(Cell::new(2, 2)), Some(Tile::Wall));
        assert_eq!(board.tile(Cell::new(4, 8)), Some(Tile::Wall));
        assert_eq!(board.tile(Cell::new(1, 2)), Some(Tile::Empty));
        assert_eq!(board.tile(Cell::new(3, 3)), Some(Tile::Empty));
        assert_eq!(board.tile(Cell::new(-1, 3)), None);
    }

    #[test]
    fn destroy_block_leaves_walls_alone() {
        let mut board = Board::skeleton(GRID_SIZE);
        board.set(Cell::new(3, 1), Tile::Block);
        assert!(board.destroy_block(Cell::new(3, 1)));
        assert!(!board.destroy_block(Cell::new(3, 1)));
        assert!(!board.destroy_block(Cell::new(2, 2)));
        assert_eq!(board.tile(Cell::new(2, 2)), Some(Tile::Wall));
    }

    #[test]
    fn serializes_as_integer_rows() {
        let json = serde_json::to_value(Board::skeleton(3)).unwrap();
        assert_eq!(json, serde_json::json!([[2, 2, 2], [2, 0, 2], [2, 2, 2]]));
    }
}

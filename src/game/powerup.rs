//! Power-ups: spawned from destroyed blocks, collected by walking over them

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::board::Cell;
use super::player::Player;

/// Chance that a destroyed block leaves a power-up behind
pub const DROP_CHANCE: f64 = 0.3;

/// Upper bound for bomb capacity
pub const MAX_BOMBS: u32 = 3;
/// Upper bound for flame range
pub const MAX_FLAMES: u32 = 3;
/// Upper bound for the speed multiplier
pub const MAX_SPEED: f32 = 2.0;
/// Speed gained per pickup
pub const SPEED_STEP: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PowerUpKind {
    /// One more simultaneous bomb
    Bombs,
    /// One more cell of flame per ray
    Flames,
    /// Faster movement
    Speed,
}

impl PowerUpKind {
    pub const ALL: [PowerUpKind; 3] = [PowerUpKind::Bombs, PowerUpKind::Flames, PowerUpKind::Speed];

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }

    /// Apply to `player`, respecting caps. Returns false when already maxed.
    pub fn apply(self, player: &mut Player) -> bool {
        match self {
            PowerUpKind::Bombs => {
                let before = player.bomb_capacity;
                player.bomb_capacity = (player.bomb_capacity + 1).min(MAX_BOMBS);
                player.bomb_capacity != before
            }
            PowerUpKind::Flames => {
                let before = player.flame_range;
                player.flame_range = (player.flame_range + 1).min(MAX_FLAMES);
                player.flame_range != before
            }
            PowerUpKind::Speed => {
                let before = player.speed;
                player.speed = (player.speed + SPEED_STEP).min(MAX_SPEED);
                player.speed != before
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerUp {
    pub x: i32,
    pub y: i32,
    #[serde(rename = "type")]
    pub kind: PowerUpKind,
}

impl PowerUp {
    pub fn cell(&self) -> Cell {
        Cell::new(self.x, self.y)
    }
}

/// Active power-ups, at most one per cell
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct PowerUpField {
    items: Vec<PowerUp>,
}

impl PowerUpField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(&self, cell: Cell) -> Option<&PowerUp> {
        self.items.iter().find(|p| p.cell() == cell)
    }

    /// Place a power-up of random kind unless the cell is already taken
    pub fn spawn<R: Rng + ?Sized>(&mut self, cell: Cell, rng: &mut R) -> Option<PowerUpKind> {
        let kind = PowerUpKind::random(rng);
        self.place(cell, kind).then_some(kind)
    }

    pub fn place(&mut self, cell: Cell, kind: PowerUpKind) -> bool {
        if self.at(cell).is_some() {
            return false;
        }
        self.items.push(PowerUp {
            x: cell.x,
            y: cell.y,
            kind,
        });
        true
    }

    /// Remove whatever lies under the player and apply it
    pub fn collect(&mut self, player: &mut Player) -> Option<PowerUpKind> {
        let idx = self.items.iter().position(|p| p.cell() == player.cell())?;
        let power_up = self.items.remove(idx);
        power_up.kind.apply(player);
        Some(power_up.kind)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use uuid::Uuid;

    fn player_at(cell: Cell) -> Player {
        Player::new(Uuid::new_v4(), "p".into(), 0, cell)
    }

    #[test]
    fn caps_are_respected() {
        let mut player = player_at(Cell::new(1, 1));
        for _ in 0..5 {
            PowerUpKind::Bombs.apply(&mut player);
            PowerUpKind::Flames.apply(&mut player);
            PowerUpKind::Speed.apply(&mut player);
        }
        assert_eq!(player.bomb_capacity, MAX_BOMBS);
        assert_eq!(player.flame_range, MAX_FLAMES);
        assert_eq!(player.speed, MAX_SPEED);
        assert!(!PowerUpKind::Speed.apply(&mut player));
    }

    #[test]
    fn spawn_refuses_occupied_cell() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut field = PowerUpField::new();
        assert!(field.spawn(Cell::new(3, 3), &mut rng).is_some());
        assert!(field.spawn(Cell::new(3, 3), &mut rng).is_none());
        assert_eq!(field.len(), 1);
    }

    #[test]
    fn collect_removes_and_applies() {
        let mut field = PowerUpField::new();
        field.place(Cell::new(3, 1), PowerUpKind::Flames);
        let mut player = player_at(Cell::new(1, 1));
        assert_eq!(field.collect(&mut player), None);

        player.x = 3;
        assert_eq!(field.collect(&mut player), Some(PowerUpKind::Flames));
        assert_eq!(player.flame_range, 2);
        assert!(field.is_empty());
    }

    #[test]
    fn random_kind_covers_every_variant() {
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let seen: std::collections::HashSet<_> =
            (0..200).map(|_| PowerUpKind::random(&mut rng)).collect();
        assert_eq!(seen.len(), PowerUpKind::ALL.len());
    }

    #[test]
    fn wire_shape() {
        let json = serde_json::to_value(PowerUp { x: 2, y: 5, kind: PowerUpKind::Speed }).unwrap();
        assert_eq!(json, serde_json::json!({"x": 2, "y": 5, "type": "speed"}));
    }
}

//! Snapshot building: full-state payloads for broadcast

use crate::ws::protocol::ServerMsg;

use super::board::{Board, Cell};
use super::combat::Bomb;
use super::player::Player;
use super::powerup::PowerUpField;
use super::r#match::{MatchPhase, MatchState};

/// Copy of everything a client needs to redraw the arena.
/// Clients always get whole arrays, never diffs.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub phase: MatchPhase,
    pub board: Board,
    pub players: Vec<Player>,
    pub bombs: Vec<Bomb>,
    pub power_ups: PowerUpField,
}

impl Snapshot {
    pub fn capture(state: &MatchState) -> Self {
        Self {
            phase: state.phase,
            board: state.board.clone(),
            players: state.registry.players().to_vec(),
            bombs: state.bombs.clone(),
            power_ups: state.power_ups.clone(),
        }
    }

    pub fn into_game_state(self) -> ServerMsg {
        ServerMsg::GameState {
            state: self.phase,
            players: self.players,
            board: self.board,
            bombs: self.bombs,
            power_ups: self.power_ups,
        }
    }

    pub fn into_game_start(self) -> ServerMsg {
        ServerMsg::GameStart {
            board: self.board,
            players: self.players,
            bombs: self.bombs,
            power_ups: self.power_ups,
        }
    }

    pub fn into_bomb_exploded(self, explosions: Vec<Cell>) -> ServerMsg {
        ServerMsg::BombExploded {
            players: self.players,
            board: self.board,
            bombs: self.bombs,
            power_ups: self.power_ups,
            explosions,
        }
    }
}

//! Game simulation modules

pub mod board;
pub mod chat;
pub mod combat;
pub mod r#match;
pub mod physics;
pub mod player;
pub mod powerup;
pub mod registry;
pub mod snapshot;
pub mod timer;

pub use r#match::{GameMatch, MatchPhase, MatchSettings, Outbound, Target};

use crate::ws::protocol::ClientMsg;
use uuid::Uuid;

/// Identity of one transport connection
pub type ConnId = Uuid;

/// Client message received from WebSocket
#[derive(Debug, Clone)]
pub struct PlayerInput {
    pub conn_id: ConnId,
    pub msg: ClientMsg,
    pub received_at: u64,
}

impl PlayerInput {
    pub fn new(conn_id: ConnId, msg: ClientMsg) -> Self {
        Self {
            conn_id,
            msg,
            received_at: crate::util::time::unix_millis(),
        }
    }
}

//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};

use crate::game::board::{Board, Cell};
use crate::game::chat::ChatMessage;
use crate::game::combat::Bomb;
use crate::game::physics::Direction;
use crate::game::player::Player;
use crate::game::powerup::PowerUpField;
use crate::game::r#match::MatchPhase;

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMsg {
    /// Join the room under a display name
    Start { name: String },

    /// One movement step
    Move { direction: Direction },

    /// Drop a bomb on the current cell
    PlaceBomb,

    /// Chat line
    Message {
        #[serde(alias = "message")]
        text: String,
    },

    /// Leave the running game
    LeaveGame,

    /// Leave the room from the lobby
    LeaveRoom,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMsg {
    /// Validation failure, sent only to the offending connection
    Error { message: String },

    /// Lobby roster plus room-wait seconds (null while no countdown runs)
    Waiting {
        #[serde(rename = "secondsroom")]
        seconds_room: Option<u32>,
        players: Vec<Player>,
    },

    /// Pre-game countdown
    Countdown { seconds: u32 },

    /// Full snapshot for a freshly joined connection
    GameState {
        state: MatchPhase,
        players: Vec<Player>,
        board: Board,
        bombs: Vec<Bomb>,
        #[serde(rename = "powerUps")]
        power_ups: PowerUpField,
    },

    PlayerJoined { players: Vec<Player> },

    PlayerLeft { players: Vec<Player> },

    GameStart {
        board: Board,
        players: Vec<Player>,
        bombs: Vec<Bomb>,
        #[serde(rename = "powerUps")]
        power_ups: PowerUpField,
    },

    PlayerMoved { players: Vec<Player> },

    BombPlaced { bombs: Vec<Bomb> },

    BombExploded {
        players: Vec<Player>,
        board: Board,
        bombs: Vec<Bomb>,
        #[serde(rename = "powerUps")]
        power_ups: PowerUpField,
        explosions: Vec<Cell>,
    },

    PowerUpCollected {
        players: Vec<Player>,
        #[serde(rename = "powerUps")]
        power_ups: PowerUpField,
    },

    NewMessage {
        message: ChatMessage,
        messages: Vec<ChatMessage>,
    },

    ChatHistory { messages: Vec<ChatMessage> },

    /// Sole survivor's name, or null for a draw
    GameOver { winner: Option<String> },

    GameReset,
}

impl ServerMsg {
    pub fn error(message: impl ToString) -> Self {
        ServerMsg::Error {
            message: message.to_string(),
        }
    }

    /// Wire tag, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMsg::Error { .. } => "error",
            ServerMsg::Waiting { .. } => "waiting",
            ServerMsg::Countdown { .. } => "countdown",
            ServerMsg::GameState { .. } => "gameState",
            ServerMsg::PlayerJoined { .. } => "playerJoined",
            ServerMsg::PlayerLeft { .. } => "playerLeft",
            ServerMsg::GameStart { .. } => "gameStart",
            ServerMsg::PlayerMoved { .. } => "playerMoved",
            ServerMsg::BombPlaced { .. } => "bombPlaced",
            ServerMsg::BombExploded { .. } => "bombExploded",
            ServerMsg::PowerUpCollected { .. } => "powerUpCollected",
            ServerMsg::NewMessage { .. } => "newMessage",
            ServerMsg::ChatHistory { .. } => "chatHistory",
            ServerMsg::GameOver { .. } => "gameOver",
            ServerMsg::GameReset => "gameReset",
        }
    }
}

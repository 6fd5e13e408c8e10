//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::room::{RoomHandle, RoomService};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub room: RoomHandle,
}

impl AppState {
    /// Build the state plus the room service that still has to be spawned
    pub fn new(config: Config) -> (Self, RoomService) {
        let config = Arc::new(config);

        let seed = config.rng_seed.unwrap_or_else(rand::random);
        let (service, room) = RoomService::new(config.match_settings.clone(), seed);

        (Self { config, room }, service)
    }
}

//! Room actor: one task owns the match and serializes every event

pub mod gateway;
pub mod scheduler;
pub mod service;

pub use service::{RoomHandle, RoomService};

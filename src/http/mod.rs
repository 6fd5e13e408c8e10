//! HTTP surface: health check and WebSocket upgrade

mod routes;

pub use routes::build_router;

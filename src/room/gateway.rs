//! Connection gateway: routes match output to per-connection writer tasks

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::game::{ConnId, Outbound, Target};

/// Outbound half of one WebSocket: already-serialized JSON frames
pub type ConnSender = mpsc::UnboundedSender<String>;

#[derive(Debug, Default)]
pub struct Gateway {
    connections: HashMap<ConnId, ConnSender>,
}

impl Gateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, conn: ConnId, sender: ConnSender) {
        self.connections.insert(conn, sender);
    }

    pub fn unregister(&mut self, conn: ConnId) -> bool {
        self.connections.remove(&conn).is_some()
    }

    pub fn contains(&self, conn: ConnId) -> bool {
        self.connections.contains_key(&conn)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Serialize once, then hand the frame to every addressed connection
    pub fn deliver(&self, outbound: Outbound) {
        let json = match serde_json::to_string(&outbound.msg) {
            Ok(json) => json,
            Err(e) => {
                error!(kind = outbound.msg.kind(), error = %e, "Failed to serialize server message");
                return;
            }
        };

        match outbound.target {
            Target::All => {
                for conn in self.connections.keys() {
                    self.send_raw(*conn, json.clone());
                }
            }
            Target::One(conn) => self.send_raw(conn, json),
        }
    }

    fn send_raw(&self, conn: ConnId, json: String) {
        let Some(sender) = self.connections.get(&conn) else {
            return;
        };
        // Writer already gone; the disconnect event will clean up
        if sender.send(json).is_err() {
            debug!(conn_id = %conn, "Dropping frame for closed connection");
        }
    }
}

//! Room service: the single task that owns the match

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::game::timer::TimerId;
use crate::game::{ConnId, GameMatch, MatchPhase, MatchSettings, PlayerInput};
use crate::util::time::unix_millis;

use super::gateway::{ConnSender, Gateway};
use super::scheduler::Scheduler;

/// Inbound queue depth
const EVENT_QUEUE: usize = 256;

/// Everything the room task reacts to, in arrival order
pub enum RoomEvent {
    Connected { conn_id: ConnId, sender: ConnSender },
    Inbound(PlayerInput),
    Disconnected(ConnId),
    TimerFired(TimerId),
}

#[derive(Debug, thiserror::Error)]
#[error("room service is no longer running")]
pub struct RoomClosed;

/// Counters published after every event, readable without touching the room
#[derive(Debug, Default)]
pub struct RoomStats {
    players: AtomicUsize,
    connections: AtomicUsize,
    phase: AtomicU8,
}

/// Cheap handle for connection tasks and HTTP handlers
#[derive(Clone)]
pub struct RoomHandle {
    tx: mpsc::Sender<RoomEvent>,
    stats: Arc<RoomStats>,
}

impl RoomHandle {
    /// Register a connection; frames for it arrive on the returned receiver
    pub async fn connect(&self, conn_id: ConnId) -> Result<mpsc::UnboundedReceiver<String>, RoomClosed> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.tx
            .send(RoomEvent::Connected { conn_id, sender })
            .await
            .map_err(|_| RoomClosed)?;
        Ok(receiver)
    }

    pub async fn send_input(&self, input: PlayerInput) -> Result<(), RoomClosed> {
        self.tx
            .send(RoomEvent::Inbound(input))
            .await
            .map_err(|_| RoomClosed)
    }

    pub async fn disconnect(&self, conn_id: ConnId) {
        if self.tx.send(RoomEvent::Disconnected(conn_id)).await.is_err() {
            debug!(conn_id = %conn_id, "Room gone before disconnect");
        }
    }

    pub fn player_count(&self) -> usize {
        self.stats.players.load(Ordering::Relaxed)
    }

    pub fn connection_count(&self) -> usize {
        self.stats.connections.load(Ordering::Relaxed)
    }

    pub fn phase(&self) -> MatchPhase {
        MatchPhase::from_index(self.stats.phase.load(Ordering::Relaxed)).unwrap_or(MatchPhase::Lobby)
    }
}

/// Owns the match, the connection table and the timer tasks
pub struct RoomService {
    game: GameMatch,
    gateway: Gateway,
    scheduler: Scheduler,
    events: mpsc::Receiver<RoomEvent>,
    stats: Arc<RoomStats>,
}

impl RoomService {
    pub fn new(settings: MatchSettings, seed: u64) -> (Self, RoomHandle) {
        let (tx, events) = mpsc::channel(EVENT_QUEUE);
        let stats = Arc::new(RoomStats::default());

        let handle = RoomHandle {
            tx: tx.clone(),
            stats: stats.clone(),
        };
        let service = Self {
            game: GameMatch::new(settings, seed),
            gateway: Gateway::new(),
            scheduler: Scheduler::new(tx),
            events,
            stats,
        };

        (service, handle)
    }

    /// Event loop. The scheduler keeps a sender, so this runs for the life of the process.
    pub async fn run(mut self) {
        info!(
            capacity = self.game.settings().capacity,
            movement = ?self.game.settings().movement,
            "Room service started"
        );

        while let Some(event) = self.events.recv().await {
            self.handle_event(event);
            self.flush();
        }

        info!("Room service stopped");
    }

    fn handle_event(&mut self, event: RoomEvent) {
        match event {
            RoomEvent::Connected { conn_id, sender } => {
                self.gateway.register(conn_id, sender);
                debug!(conn_id = %conn_id, connections = self.gateway.len(), "Connection registered");
            }
            RoomEvent::Inbound(input) => {
                let queued_ms = unix_millis().saturating_sub(input.received_at);
                if !self.gateway.contains(input.conn_id) {
                    warn!(conn_id = %input.conn_id, "Input from unregistered connection");
                    return;
                }
                debug!(conn_id = %input.conn_id, queued_ms, "Processing input");
                self.game.handle_input(input);
            }
            RoomEvent::Disconnected(conn_id) => {
                self.game.handle_disconnect(conn_id);
                self.gateway.unregister(conn_id);
                debug!(conn_id = %conn_id, connections = self.gateway.len(), "Connection removed");
            }
            RoomEvent::TimerFired(id) => {
                self.scheduler.fired(id);
                self.game.on_timer(id);
            }
        }
    }

    /// Publish stats, hand timer requests to the scheduler, then send frames
    fn flush(&mut self) {
        let state = self.game.state();
        self.stats.players.store(state.registry.len(), Ordering::Relaxed);
        self.stats.connections.store(self.gateway.len(), Ordering::Relaxed);
        self.stats.phase.store(state.phase.as_index(), Ordering::Relaxed);

        for command in self.game.drain_timer_commands() {
            self.scheduler.apply(command);
        }
        for outbound in self.game.drain_outbox() {
            self.gateway.deliver(outbound);
        }
    }
}

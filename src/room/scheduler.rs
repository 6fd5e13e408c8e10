//! Turns match timer requests into sleeping tokio tasks

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::game::timer::{TimerCommand, TimerId};

use super::service::RoomEvent;

/// One sleeping task per armed timer. Firing posts `RoomEvent::TimerFired`
/// back into the room's own queue so timers and inputs are serialized.
pub struct Scheduler {
    events: mpsc::Sender<RoomEvent>,
    tasks: HashMap<TimerId, JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(events: mpsc::Sender<RoomEvent>) -> Self {
        Self {
            events,
            tasks: HashMap::new(),
        }
    }

    pub fn apply(&mut self, command: TimerCommand) {
        match command {
            TimerCommand::Arm { id, delay, token } => {
                trace!(timer = ?id, kind = ?token.kind, delay_ms = delay.as_millis() as u64, "Arming timer");
                let events = self.events.clone();
                let task = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = events.send(RoomEvent::TimerFired(id)).await;
                });
                self.tasks.insert(id, task);
            }
            TimerCommand::Cancel(id) => {
                if let Some(task) = self.tasks.remove(&id) {
                    task.abort();
                }
            }
        }
    }

    /// Forget a timer whose task has finished
    pub fn fired(&mut self, id: TimerId) {
        self.tasks.remove(&id);
    }

    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}

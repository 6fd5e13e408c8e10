//! Timer bookkeeping for the match. The match never sleeps itself; it asks
//! for timers here and the room service turns the requests into tasks.

use std::collections::HashMap;
use std::time::Duration;

use uuid::Uuid;

/// Identifier of one armed timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// One second of the room-wait countdown
    RoomWaitTick,
    /// One second of the pre-game countdown
    CountdownTick,
    /// Bomb fuse expiry
    Fuse(Uuid),
    /// Post-explosion game-over evaluation
    GameOverCheck,
    /// Ended -> Lobby reset
    Reset,
}

/// What a timer carries back when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerToken {
    pub epoch: u64,
    pub kind: TimerKind,
}

/// Requests for the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerCommand {
    Arm {
        id: TimerId,
        token: TimerToken,
        delay: Duration,
    },
    Cancel(TimerId),
}

/// Every timer the match currently owns, plus pending scheduler commands
#[derive(Debug, Default)]
pub struct TimerBook {
    next_id: u64,
    armed: HashMap<TimerId, TimerToken>,
    commands: Vec<TimerCommand>,
}

impl TimerBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, epoch: u64, kind: TimerKind, delay: Duration) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        let token = TimerToken { epoch, kind };
        self.armed.insert(id, token);
        self.commands.push(TimerCommand::Arm { id, token, delay });
        id
    }

    pub fn cancel(&mut self, id: TimerId) {
        if self.armed.remove(&id).is_some() {
            self.commands.push(TimerCommand::Cancel(id));
        }
    }

    /// Cancel every armed timer matching `pred`
    pub fn cancel_where(&mut self, pred: impl Fn(&TimerKind) -> bool) {
        let mut doomed: Vec<TimerId> = self
            .armed
            .iter()
            .filter(|(_, token)| pred(&token.kind))
            .map(|(id, _)| *id)
            .collect();
        doomed.sort();
        for id in doomed {
            self.cancel(id);
        }
    }

    pub fn cancel_all(&mut self) {
        self.cancel_where(|_| true);
    }

    /// Claim a fired timer. `None` if it was cancelled in the meantime.
    pub fn fire(&mut self, id: TimerId) -> Option<TimerToken> {
        self.armed.remove(&id)
    }

    #[cfg(test)]
    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.armed.values().any(|token| token.kind == kind)
    }

    #[cfg(test)]
    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }

    /// Hand pending commands to the scheduler
    pub fn drain_commands(&mut self) -> Vec<TimerCommand> {
        std::mem::take(&mut self.commands)
    }
}

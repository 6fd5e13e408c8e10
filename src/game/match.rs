//! Match state machine and action processing
//!
//! `GameMatch` is a single-writer state object: every inbound message and
//! every timer is applied to completion through `&mut self`. It never
//! sleeps or performs I/O; outbound messages collect in an outbox and timer
//! requests in a [`TimerBook`], both drained by the room service.

use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::util::time::{unix_millis, COUNTDOWN_TICK};
use crate::ws::protocol::{ClientMsg, ServerMsg};

use super::board::{Board, Cell, GRID_SIZE, SPAWN_POSITIONS};
use super::chat::ChatLog;
use super::combat::{Bomb, CombatSystem};
use super::physics::{Direction, MovementMode, MovementStrategy, Obstacles};
use super::powerup::{PowerUpField, DROP_CHANCE};
use super::registry::{JoinError, PlayerRegistry};
use super::snapshot::Snapshot;
use super::timer::{TimerBook, TimerCommand, TimerId, TimerKind};
use super::{ConnId, PlayerInput};

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchPhase {
    /// Accepting joins, no timers running
    Lobby,
    /// Room-wait countdown: still accepting joins
    Waiting,
    /// Pre-game countdown
    Countdown,
    /// Match in progress
    Playing,
    /// Winner announced, reset pending
    Ended,
}

impl MatchPhase {
    const ALL: [MatchPhase; 5] = [
        MatchPhase::Lobby,
        MatchPhase::Waiting,
        MatchPhase::Countdown,
        MatchPhase::Playing,
        MatchPhase::Ended,
    ];

    pub fn accepts_joins(self) -> bool {
        matches!(self, MatchPhase::Lobby | MatchPhase::Waiting)
    }

    /// Compact form for lock-free stats
    pub fn as_index(self) -> u8 {
        self as u8
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }
}

/// Tunables for one room
#[derive(Debug, Clone)]
pub struct MatchSettings {
    pub capacity: usize,
    /// Occupancy that arms the room-wait countdown
    pub min_players: usize,
    pub room_wait_secs: u32,
    pub countdown_secs: u32,
    pub fuse: Duration,
    pub game_over_check: Duration,
    pub reset_grace: Duration,
    pub chat_history: usize,
    pub chat_max_len: usize,
    pub drop_chance: f64,
    pub movement: MovementMode,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            capacity: SPAWN_POSITIONS.len(),
            min_players: 2,
            room_wait_secs: 20,
            countdown_secs: 10,
            fuse: Duration::from_millis(2000),
            game_over_check: Duration::from_millis(1000),
            reset_grace: Duration::from_secs(5),
            chat_history: 20,
            chat_max_len: 100,
            drop_chance: DROP_CHANCE,
            movement: MovementMode::Grid,
        }
    }
}

/// Who an outbound message goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    All,
    One(ConnId),
}

#[derive(Debug, Clone)]
pub struct Outbound {
    pub target: Target,
    pub msg: ServerMsg,
}

/// Match state (owned by the room task)
pub struct MatchState {
    pub phase: MatchPhase,
    /// Bumped on every phase change; timers from older epochs are stale
    pub epoch: u64,
    pub board: Board,
    pub registry: PlayerRegistry,
    pub bombs: Vec<Bomb>,
    pub power_ups: PowerUpField,
    pub chat: ChatLog,
    /// Seconds left on whichever countdown is running
    pub seconds_remaining: u32,
    pub rng: ChaCha8Rng,
}

impl MatchState {
    pub fn new(settings: &MatchSettings, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let board = Board::generate(GRID_SIZE, &SPAWN_POSITIONS, &mut rng);
        Self {
            phase: MatchPhase::Lobby,
            epoch: 0,
            board,
            registry: PlayerRegistry::new(settings.capacity),
            bombs: Vec::new(),
            power_ups: PowerUpField::new(),
            chat: ChatLog::new(settings.chat_history, settings.chat_max_len),
            seconds_remaining: 0,
            rng,
        }
    }

    pub fn regenerate_board(&mut self) {
        self.board = Board::generate(GRID_SIZE, &SPAWN_POSITIONS, &mut self.rng);
    }

    /// Count alive players
    pub fn alive_count(&self) -> usize {
        self.registry.alive().count()
    }

    pub fn bombs_owned_by(&self, player_id: Uuid) -> usize {
        self.bombs.iter().filter(|b| b.owner_id == player_id).count()
    }
}

/// The authoritative game match
pub struct GameMatch {
    settings: MatchSettings,
    state: MatchState,
    movement: Box<dyn MovementStrategy>,
    timers: TimerBook,
    outbox: Vec<Outbound>,
}

impl GameMatch {
    pub fn new(settings: MatchSettings, seed: u64) -> Self {
        let state = MatchState::new(&settings, seed);
        let movement = settings.movement.strategy();
        Self {
            settings,
            state,
            movement,
            timers: TimerBook::new(),
            outbox: Vec::new(),
        }
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn phase(&self) -> MatchPhase {
        self.state.phase
    }

    pub fn settings(&self) -> &MatchSettings {
        &self.settings
    }

    pub fn drain_outbox(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }

    pub fn drain_timer_commands(&mut self) -> Vec<TimerCommand> {
        self.timers.drain_commands()
    }

    // ------------------------------------------------------------------
    // Inbound dispatch
    // ------------------------------------------------------------------

    /// Apply one client message
    pub fn handle_input(&mut self, input: PlayerInput) {
        let conn = input.conn_id;
        match input.msg {
            ClientMsg::Start { name } => self.handle_join(conn, &name),
            ClientMsg::Move { direction } => self.handle_move(conn, direction),
            ClientMsg::PlaceBomb => self.handle_place_bomb(conn),
            ClientMsg::Message { text } => self.handle_chat(conn, &text),
            ClientMsg::LeaveGame | ClientMsg::LeaveRoom => self.handle_leave(conn),
        }
    }

    /// Transport reported the connection closed
    pub fn handle_disconnect(&mut self, conn: ConnId) {
        self.handle_leave(conn);
    }

    /// A scheduled timer fired
    pub fn on_timer(&mut self, id: TimerId) {
        let Some(token) = self.timers.fire(id) else {
            debug!(timer = ?id, "Ignoring cancelled timer");
            return;
        };
        if token.epoch != self.state.epoch {
            debug!(timer = ?id, kind = ?token.kind, "Ignoring stale timer");
            return;
        }

        match token.kind {
            TimerKind::RoomWaitTick => self.tick_room_wait(),
            TimerKind::CountdownTick => self.tick_countdown(),
            TimerKind::Fuse(bomb_id) => self.explode(bomb_id),
            TimerKind::GameOverCheck => {
                if self.state.phase == MatchPhase::Playing {
                    self.evaluate_game_over();
                }
            }
            TimerKind::Reset => {
                if self.state.phase == MatchPhase::Ended {
                    self.reset();
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    /// Validate and seat a new player. Returns their id.
    pub fn join(&mut self, conn: ConnId, name: &str) -> Result<Uuid, JoinError> {
        if self.state.registry.contains(conn) {
            return Err(JoinError::AlreadyJoined);
        }
        if !self.state.phase.accepts_joins() {
            return Err(JoinError::RoomFull);
        }

        let player = self.state.registry.join(conn, name)?;
        let (player_id, slot) = (player.id, player.slot);
        info!(
            conn_id = %conn,
            player = name.trim(),
            slot,
            player_count = self.state.registry.len(),
            "Player joined room"
        );

        if self.state.registry.len() == 1 {
            self.state.regenerate_board();
        }

        self.send_to(conn, Snapshot::capture(&self.state).into_game_state());
        if !self.state.chat.is_empty() {
            self.send_to(
                conn,
                ServerMsg::ChatHistory {
                    messages: self.state.chat.history(),
                },
            );
        }
        self.broadcast(ServerMsg::PlayerJoined {
            players: self.players(),
        });

        let occupancy = self.state.registry.len();
        if occupancy >= self.settings.capacity {
            self.start_countdown();
        } else if occupancy >= self.settings.min_players {
            if self.state.phase == MatchPhase::Lobby {
                self.start_room_wait();
            }
        } else {
            self.broadcast_waiting();
        }

        Ok(player_id)
    }

    fn handle_join(&mut self, conn: ConnId, name: &str) {
        if let Err(e) = self.join(conn, name) {
            info!(conn_id = %conn, error = %e, "Join rejected");
            self.send_to(conn, ServerMsg::error(e));
        }
    }

    fn handle_leave(&mut self, conn: ConnId) {
        let Some(player) = self.state.registry.leave(conn) else {
            return;
        };
        info!(
            conn_id = %conn,
            player = %player.name,
            phase = ?self.state.phase,
            player_count = self.state.registry.len(),
            "Player left room"
        );

        // Reindexed slots move their owners to the matching spawn before play
        if self.state.phase != MatchPhase::Playing {
            for remaining in self.state.registry.players_mut() {
                remaining.respawn();
            }
        }

        self.broadcast(ServerMsg::PlayerLeft {
            players: self.players(),
        });

        let occupancy = self.state.registry.len();
        match self.state.phase {
            MatchPhase::Waiting if occupancy < self.settings.min_players => {
                self.set_phase(MatchPhase::Lobby);
                self.broadcast_waiting();
            }
            MatchPhase::Countdown if occupancy < self.settings.min_players => {
                self.evaluate_game_over();
            }
            MatchPhase::Playing => self.evaluate_game_over(),
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Phase transitions
    // ------------------------------------------------------------------

    /// Leaving a phase invalidates every timer it armed
    fn set_phase(&mut self, phase: MatchPhase) {
        if self.state.phase == phase {
            return;
        }
        self.timers.cancel_all();
        self.state.epoch += 1;
        info!(from = ?self.state.phase, to = ?phase, epoch = self.state.epoch, "Phase change");
        self.state.phase = phase;
    }

    fn start_room_wait(&mut self) {
        if self.settings.room_wait_secs == 0 {
            self.start_countdown();
            return;
        }
        self.set_phase(MatchPhase::Waiting);
        self.state.seconds_remaining = self.settings.room_wait_secs;
        self.broadcast_waiting();
        self.arm(TimerKind::RoomWaitTick, COUNTDOWN_TICK);
    }

    fn tick_room_wait(&mut self) {
        if self.state.phase != MatchPhase::Waiting {
            return;
        }
        self.state.seconds_remaining = self.state.seconds_remaining.saturating_sub(1);
        if self.state.seconds_remaining == 0 {
            self.start_countdown();
        } else {
            self.broadcast_waiting();
            self.arm(TimerKind::RoomWaitTick, COUNTDOWN_TICK);
        }
    }

    fn start_countdown(&mut self) {
        if self.settings.countdown_secs == 0 {
            self.start_game();
            return;
        }
        self.set_phase(MatchPhase::Countdown);
        self.state.seconds_remaining = self.settings.countdown_secs;
        self.broadcast(ServerMsg::Countdown {
            seconds: self.state.seconds_remaining,
        });
        self.arm(TimerKind::CountdownTick, COUNTDOWN_TICK);
    }

    fn tick_countdown(&mut self) {
        if self.state.phase != MatchPhase::Countdown {
            return;
        }
        self.state.seconds_remaining = self.state.seconds_remaining.saturating_sub(1);
        if self.state.seconds_remaining == 0 {
            self.start_game();
        } else {
            self.broadcast(ServerMsg::Countdown {
                seconds: self.state.seconds_remaining,
            });
            self.arm(TimerKind::CountdownTick, COUNTDOWN_TICK);
        }
    }

    fn start_game(&mut self) {
        self.set_phase(MatchPhase::Playing);
        self.state.seconds_remaining = 0;
        for player in self.state.registry.players_mut() {
            player.respawn();
        }
        info!(player_count = self.state.registry.len(), "Match started");
        self.broadcast(Snapshot::capture(&self.state).into_game_start());
    }

    /// Ends the match when at most one player is still alive
    fn evaluate_game_over(&mut self) {
        if self.state.alive_count() > 1 {
            return;
        }
        let winner = self
            .state
            .registry
            .alive()
            .next()
            .map(|p| p.name.clone());
        self.end_game(winner);
    }

    fn end_game(&mut self, winner: Option<String>) {
        if self.state.phase == MatchPhase::Ended {
            return;
        }
        self.set_phase(MatchPhase::Ended);
        info!(winner = ?winner, "Match ended");
        self.broadcast(ServerMsg::GameOver { winner });
        self.arm(TimerKind::Reset, self.settings.reset_grace);
    }

    /// Back to a fresh lobby. Connections stay open; players must rejoin.
    fn reset(&mut self) {
        self.state.registry.clear();
        self.state.bombs.clear();
        self.state.power_ups.clear();
        self.state.chat.clear();
        self.state.seconds_remaining = 0;
        self.state.regenerate_board();
        self.set_phase(MatchPhase::Lobby);
        info!(epoch = self.state.epoch, "Room reset");
        self.broadcast(ServerMsg::GameReset);
    }

    // ------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------

    fn handle_move(&mut self, conn: ConnId, direction: Direction) {
        if self.state.phase != MatchPhase::Playing {
            return;
        }
        let Some(player) = self.state.registry.player(conn) else {
            return;
        };
        if !player.alive {
            return;
        }

        let mover_id = player.id;
        let from = player.position();
        let speed = player.speed;
        let bombs: Vec<Cell> = self.state.bombs.iter().map(Bomb::cell).collect();
        let others: Vec<Cell> = self
            .state
            .registry
            .alive()
            .filter(|p| p.id != mover_id)
            .map(|p| p.cell())
            .collect();
        let obstacles = Obstacles {
            board: &self.state.board,
            bombs: &bombs,
            players: &others,
        };

        // Illegal moves are dropped without feedback
        let Some(to) = self.movement.try_move(from, direction, speed, &obstacles) else {
            return;
        };

        let Some(player) = self.state.registry.player_mut(conn) else {
            return;
        };
        player.set_position(to);
        debug!(player = %player.name, x = to.cell.x, y = to.cell.y, "Player moved");

        let collected = self.state.power_ups.collect(player);
        if let Some(kind) = collected {
            debug!(player = %player.name, kind = ?kind, "Power-up collected");
        }

        self.broadcast(ServerMsg::PlayerMoved {
            players: self.players(),
        });
        if collected.is_some() {
            self.broadcast(ServerMsg::PowerUpCollected {
                players: self.players(),
                power_ups: self.state.power_ups.clone(),
            });
        }
    }

    fn handle_place_bomb(&mut self, conn: ConnId) {
        if self.state.phase != MatchPhase::Playing {
            return;
        }
        let Some(player) = self.state.registry.player(conn) else {
            return;
        };
        if !player.alive {
            return;
        }
        let cell = player.cell();
        let over_capacity = self.state.bombs_owned_by(player.id) >= player.bomb_capacity as usize;
        let occupied = self.state.bombs.iter().any(|b| b.cell() == cell);
        if over_capacity || occupied {
            return;
        }

        let fuse = self.settings.fuse;
        let bomb = Bomb::new(player, unix_millis(), fuse.as_millis() as u64);
        debug!(player = %player.name, x = bomb.x, y = bomb.y, range = bomb.flame_range, "Bomb placed");
        let bomb_id = bomb.id;
        self.state.bombs.push(bomb);

        self.broadcast(ServerMsg::BombPlaced {
            bombs: self.state.bombs.clone(),
        });
        self.arm(TimerKind::Fuse(bomb_id), fuse);
    }

    fn handle_chat(&mut self, conn: ConnId, text: &str) {
        let Some(player) = self.state.registry.player(conn) else {
            debug!(conn_id = %conn, "Chat from connection without a player");
            return;
        };
        let (player_id, sender) = (player.id, player.name.clone());

        match self.state.chat.post(player_id, &sender, text) {
            Ok(message) => {
                self.broadcast(ServerMsg::NewMessage {
                    message,
                    messages: self.state.chat.history(),
                });
            }
            Err(e) => self.send_to(conn, ServerMsg::error(e)),
        }
    }

    /// Fuse expiry. A bomb that is already gone is a no-op.
    fn explode(&mut self, bomb_id: Uuid) {
        if self.state.phase != MatchPhase::Playing {
            return;
        }
        let state = &mut self.state;
        let Some(detonation) = CombatSystem::detonate(
            bomb_id,
            &mut state.bombs,
            &mut state.board,
            &mut state.power_ups,
            state.registry.players_mut(),
            self.settings.drop_chance,
            &mut state.rng,
        ) else {
            warn!(bomb_id = %bomb_id, "Fuse fired for a bomb that is no longer active");
            return;
        };

        // Chained bombs went off early; their own fuses must stay quiet
        for chained in detonation.bombs.iter().filter(|b| b.id != bomb_id) {
            let id = chained.id;
            self.timers.cancel_where(|kind| *kind == TimerKind::Fuse(id));
        }

        for hit in &detonation.hits {
            info!(
                player_id = %hit.player_id,
                lives = hit.lives_left,
                eliminated = hit.eliminated,
                "Player caught in explosion"
            );
        }
        debug!(
            bombs = detonation.bombs.len(),
            cells = detonation.cells.len(),
            blocks = detonation.destroyed_blocks.len(),
            drops = detonation.drops.len(),
            pickups = detonation.pickups.len(),
            "Explosion resolved"
        );

        self.broadcast(Snapshot::capture(&self.state).into_bomb_exploded(detonation.cells));
        self.arm(TimerKind::GameOverCheck, self.settings.game_over_check);
    }

    // ------------------------------------------------------------------
    // Outbound helpers
    // ------------------------------------------------------------------

    fn arm(&mut self, kind: TimerKind, delay: Duration) -> TimerId {
        self.timers.arm(self.state.epoch, kind, delay)
    }

    fn players(&self) -> Vec<super::player::Player> {
        self.state.registry.players().to_vec()
    }

    fn broadcast_waiting(&mut self) {
        let seconds_room =
            (self.state.phase == MatchPhase::Waiting).then_some(self.state.seconds_remaining);
        self.broadcast(ServerMsg::Waiting {
            seconds_room,
            players: self.players(),
        });
    }

    fn broadcast(&mut self, msg: ServerMsg) {
        self.outbox.push(Outbound {
            target: Target::All,
            msg,
        });
    }

    fn send_to(&mut self, conn: ConnId, msg: ServerMsg) {
        self.outbox.push(Outbound {
            target: Target::One(conn),
            msg,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::board::Tile;
    use crate::game::powerup::PowerUpKind;
    use crate::game::registry::NameError;
    use crate::game::timer::TimerToken;
    use tokio_test::{assert_err, assert_ok};

    /// Drives a match by hand: collects outbound traffic and fires timers on demand
    struct Harness {
        game: GameMatch,
        armed: Vec<(TimerId, TimerToken)>,
        sent: Vec<Outbound>,
    }

    impl Harness {
        fn new(settings: MatchSettings) -> Self {
            Self {
                game: GameMatch::new(settings, 7),
                armed: Vec::new(),
                sent: Vec::new(),
            }
        }

        fn quick() -> Self {
            Self::new(MatchSettings {
                room_wait_secs: 2,
                countdown_secs: 2,
                drop_chance: 0.0,
                ..MatchSettings::default()
            })
        }

        fn pump(&mut self) {
            for command in self.game.drain_timer_commands() {
                match command {
                    TimerCommand::Arm { id, token, .. } => self.armed.push((id, token)),
                    TimerCommand::Cancel(id) => self.armed.retain(|(armed, _)| *armed != id),
                }
            }
            self.sent.extend(self.game.drain_outbox());
        }

        fn send(&mut self, conn: ConnId, msg: ClientMsg) {
            self.game.handle_input(PlayerInput::new(conn, msg));
            self.pump();
        }

        fn join(&mut self, conn: ConnId, name: &str) {
            self.send(conn, ClientMsg::Start { name: name.into() });
        }

        fn timer(&self, pred: impl Fn(&TimerKind) -> bool) -> Option<TimerId> {
            self.armed.iter().find(|(_, t)| pred(&t.kind)).map(|(id, _)| *id)
        }

        fn fire_id(&mut self, id: TimerId) {
            self.armed.retain(|(armed, _)| *armed != id);
            self.game.on_timer(id);
            self.pump();
        }

        fn fire(&mut self, pred: impl Fn(&TimerKind) -> bool) {
            let id = self.timer(pred).expect("no matching timer armed");
            self.fire_id(id);
        }

        fn take_sent(&mut self) -> Vec<Outbound> {
            std::mem::take(&mut self.sent)
        }

        fn kinds(&mut self) -> Vec<&'static str> {
            self.take_sent().iter().map(|o| o.msg.kind()).collect()
        }

        fn player(&self, conn: ConnId) -> &crate::game::player::Player {
            self.game.state.registry.player(conn).unwrap()
        }

        /// Two players through both countdowns
        fn playing_pair() -> (Self, ConnId, ConnId) {
            let mut h = Self::quick();
            let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
            h.join(a, "A");
            h.join(b, "B");
            h.run_countdowns();
            h.take_sent();
            (h, a, b)
        }

        fn run_countdowns(&mut self) {
            while self.game.phase() == MatchPhase::Waiting {
                self.fire(|k| *k == TimerKind::RoomWaitTick);
            }
            while self.game.phase() == MatchPhase::Countdown {
                self.fire(|k| *k == TimerKind::CountdownTick);
            }
        }
    }

    fn is_fuse(kind: &TimerKind) -> bool {
        matches!(kind, TimerKind::Fuse(_))
    }

    #[test]
    fn end_to_end_two_player_round() {
        let mut h = Harness::quick();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        h.join(a, "A");
        let first = h.take_sent();
        assert!(matches!(first[0].target, Target::One(conn) if conn == a));
        assert_eq!(first[0].msg.kind(), "gameState");
        assert_eq!(h.game.phase(), MatchPhase::Lobby);

        h.join(b, "B");
        assert_eq!(h.game.phase(), MatchPhase::Waiting);
        assert!(h.kinds().contains(&"waiting"));

        h.fire(|k| *k == TimerKind::RoomWaitTick);
        h.fire(|k| *k == TimerKind::RoomWaitTick);
        assert_eq!(h.game.phase(), MatchPhase::Countdown);
        h.fire(|k| *k == TimerKind::CountdownTick);
        h.fire(|k| *k == TimerKind::CountdownTick);
        assert_eq!(h.game.phase(), MatchPhase::Playing);

        let sent = h.take_sent();
        let start = sent.iter().find(|o| o.msg.kind() == "gameStart").unwrap();
        assert_eq!(start.target, Target::All);
        let json = serde_json::to_value(&start.msg).unwrap();
        for row in json["board"].as_array().unwrap() {
            for tile in row.as_array().unwrap() {
                assert!(matches!(tile.as_u64(), Some(0..=2)));
            }
        }

        h.send(a, ClientMsg::Move { direction: Direction::Right });
        assert_eq!(h.kinds(), vec!["playerMoved"]);
        assert_eq!(h.player(a).cell(), Cell::new(2, 1));

        h.send(a, ClientMsg::PlaceBomb);
        assert_eq!(h.kinds(), vec!["bombPlaced"]);
        assert_eq!(h.game.state.bombs.len(), 1);

        h.fire(is_fuse);
        let sent = h.take_sent();
        assert_eq!(sent.len(), 1);
        let ServerMsg::BombExploded { explosions, board, .. } = &sent[0].msg else {
            panic!("expected bombExploded, got {}", sent[0].msg.kind());
        };
        assert!(explosions.contains(&Cell::new(2, 1)));
        assert_eq!(board.tile(Cell::new(2, 1)), Some(Tile::Empty));
        // Self-hit: one life lost, back at spawn
        assert_eq!(h.player(a).lives, 2);
        assert_eq!(h.player(a).cell(), Cell::new(1, 1));
        assert!(h.game.state.bombs.is_empty());
        assert!(h.timer(|k| *k == TimerKind::GameOverCheck).is_some());

        // Both still alive: the check is a no-op
        h.fire(|k| *k == TimerKind::GameOverCheck);
        assert!(h.take_sent().is_empty());
        assert_eq!(h.game.phase(), MatchPhase::Playing);
    }

    #[test]
    fn full_room_skips_room_wait() {
        let mut h = Harness::quick();
        for name in ["A", "B", "C", "D"] {
            h.join(Uuid::new_v4(), name);
        }
        assert_eq!(h.game.phase(), MatchPhase::Countdown);
        assert!(h.timer(|k| *k == TimerKind::RoomWaitTick).is_none());
        assert!(h.timer(|k| *k == TimerKind::CountdownTick).is_some());

        let late = Uuid::new_v4();
        h.take_sent();
        h.join(late, "E");
        let sent = h.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].target, Target::One(late));
        let ServerMsg::Error { message } = &sent[0].msg else {
            panic!("expected error");
        };
        assert_eq!(message, "Room is already full.");
    }

    #[test]
    fn join_validation_does_not_mutate() {
        let mut h = Harness::quick();
        let a = Uuid::new_v4();
        assert_ok!(h.game.join(a, "A"));
        assert_eq!(
            h.game.join(Uuid::new_v4(), "A"),
            Err(JoinError::InvalidName(NameError::Taken))
        );
        assert_err!(h.game.join(Uuid::new_v4(), ""));
        assert_err!(h.game.join(a, "Other"));
        assert_eq!(h.game.state.registry.len(), 1);
    }

    #[test]
    fn join_rejected_while_playing() {
        let (mut h, _, _) = Harness::playing_pair();
        assert_eq!(h.game.join(Uuid::new_v4(), "C"), Err(JoinError::RoomFull));
    }

    #[test]
    fn occupancy_never_exceeds_capacity() {
        let mut h = Harness::quick();
        for i in 0..10 {
            let _ = h.game.join(Uuid::new_v4(), &format!("p{i}"));
            assert!(h.game.state.registry.len() <= h.game.settings().capacity);
        }
    }

    #[test]
    fn leaving_during_room_wait_reverts_to_lobby() {
        let mut h = Harness::quick();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        h.join(a, "A");
        h.join(b, "B");
        let tick = h.timer(|k| *k == TimerKind::RoomWaitTick).unwrap();
        h.take_sent();

        h.game.handle_disconnect(b);
        h.pump();
        assert_eq!(h.game.phase(), MatchPhase::Lobby);
        assert!(h.armed.is_empty());
        let sent = h.take_sent();
        assert_eq!(sent[0].msg.kind(), "playerLeft");
        assert!(matches!(
            sent[1].msg,
            ServerMsg::Waiting {
                seconds_room: None,
                ..
            }
        ));

        // The cancelled tick firing anyway must change nothing
        h.fire_id(tick);
        assert!(h.take_sent().is_empty());
        assert_eq!(h.game.phase(), MatchPhase::Lobby);
    }

    #[test]
    fn leaving_during_countdown_ends_the_match() {
        let mut h = Harness::quick();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        h.join(a, "A");
        h.join(b, "B");
        while h.game.phase() == MatchPhase::Waiting {
            h.fire(|k| *k == TimerKind::RoomWaitTick);
        }
        assert_eq!(h.game.phase(), MatchPhase::Countdown);
        h.take_sent();

        h.send(a, ClientMsg::LeaveRoom);
        assert_eq!(h.game.phase(), MatchPhase::Ended);
        let over: Vec<_> = h
            .take_sent()
            .into_iter()
            .filter_map(|o| match o.msg {
                ServerMsg::GameOver { winner } => Some(winner),
                _ => None,
            })
            .collect();
        assert_eq!(over, vec![Some("B".to_string())]);
        assert!(h.timer(|k| *k == TimerKind::CountdownTick).is_none());
        assert!(h.timer(|k| *k == TimerKind::Reset).is_some());
    }

    #[test]
    fn stale_epoch_timer_is_ignored() {
        let mut h = Harness::quick();
        h.join(Uuid::new_v4(), "A");
        h.join(Uuid::new_v4(), "B");
        let stale = h.game.state.epoch - 1;
        let id = h.game.timers.arm(stale, TimerKind::RoomWaitTick, COUNTDOWN_TICK);
        h.pump();
        h.take_sent();
        let before = h.game.state.seconds_remaining;

        h.fire_id(id);
        assert_eq!(h.game.state.seconds_remaining, before);
        assert!(h.take_sent().is_empty());
    }

    #[test]
    fn double_fuse_fire_is_idempotent() {
        let (mut h, a, _) = Harness::playing_pair();
        h.send(a, ClientMsg::PlaceBomb);
        let fuse = h.timer(is_fuse).unwrap();
        h.take_sent();

        h.fire_id(fuse);
        assert_eq!(h.kinds(), vec!["bombExploded"]);
        let board = h.game.state.board.clone();
        let players = h.game.state.registry.players().to_vec();

        h.fire_id(fuse);
        assert!(h.take_sent().is_empty());
        assert_eq!(h.game.state.board, board);
        assert_eq!(h.game.state.registry.players(), players.as_slice());
    }

    #[test]
    fn bomb_capacity_and_cell_limits() {
        let (mut h, a, _) = Harness::playing_pair();
        h.send(a, ClientMsg::PlaceBomb);
        h.send(a, ClientMsg::PlaceBomb);
        assert_eq!(h.game.state.bombs.len(), 1);

        h.send(a, ClientMsg::Move { direction: Direction::Right });
        h.send(a, ClientMsg::PlaceBomb);
        assert_eq!(h.game.state.bombs.len(), 1, "capacity 1 allows one live bomb");

        h.game.state.registry.player_mut(a).unwrap().bomb_capacity = 2;
        h.send(a, ClientMsg::PlaceBomb);
        assert_eq!(h.game.state.bombs.len(), 2);
        let owner = h.player(a).id;
        assert!(h.game.state.bombs_owned_by(owner) <= h.player(a).bomb_capacity as usize);
    }

    #[test]
    fn cannot_walk_back_onto_a_bomb() {
        let (mut h, a, _) = Harness::playing_pair();
        h.send(a, ClientMsg::PlaceBomb);
        h.send(a, ClientMsg::Move { direction: Direction::Right });
        assert_eq!(h.player(a).cell(), Cell::new(2, 1));
        h.take_sent();
        h.send(a, ClientMsg::Move { direction: Direction::Left });
        assert_eq!(h.player(a).cell(), Cell::new(2, 1));
        assert!(h.take_sent().is_empty());
    }

    #[test]
    fn illegal_moves_are_silent() {
        let (mut h, a, _) = Harness::playing_pair();
        h.send(a, ClientMsg::Move { direction: Direction::Up });
        h.send(a, ClientMsg::Move { direction: Direction::Left });
        assert!(h.take_sent().is_empty());
        assert_eq!(h.player(a).cell(), Cell::new(1, 1));
    }

    #[test]
    fn actions_before_start_are_ignored() {
        let mut h = Harness::quick();
        let a = Uuid::new_v4();
        h.join(a, "A");
        h.take_sent();
        h.send(a, ClientMsg::Move { direction: Direction::Right });
        h.send(a, ClientMsg::PlaceBomb);
        assert!(h.take_sent().is_empty());
        assert!(h.game.state.bombs.is_empty());
    }

    #[test]
    fn walking_onto_power_up_collects_it() {
        let (mut h, a, _) = Harness::playing_pair();
        h.game.state.power_ups.place(Cell::new(2, 1), PowerUpKind::Flames);
        h.send(a, ClientMsg::Move { direction: Direction::Right });
        assert_eq!(h.kinds(), vec!["playerMoved", "powerUpCollected"]);
        assert_eq!(h.player(a).flame_range, 2);
        assert!(h.game.state.power_ups.is_empty());
    }

    #[test]
    fn bomb_captures_flame_range_at_placement() {
        let (mut h, a, _) = Harness::playing_pair();
        h.send(a, ClientMsg::PlaceBomb);
        h.game.state.registry.player_mut(a).unwrap().flame_range = 3;
        assert_eq!(h.game.state.bombs[0].flame_range, 1);
    }

    #[test]
    fn game_over_fires_once_with_survivor() {
        let (mut h, a, b) = Harness::playing_pair();
        {
            let victim = h.game.state.registry.player_mut(b).unwrap();
            victim.lives = 1;
            victim.set_position(crate::game::physics::Position::centred(Cell::new(1, 2)));
        }
        h.send(a, ClientMsg::PlaceBomb);
        h.fire(is_fuse);
        assert!(!h.player(b).alive);
        // Eliminated players stay in the roster
        assert_eq!(h.game.state.registry.len(), 2);
        h.take_sent();

        h.fire(|k| *k == TimerKind::GameOverCheck);
        let sent = h.take_sent();
        let winners: Vec<_> = sent
            .iter()
            .filter_map(|o| match &o.msg {
                ServerMsg::GameOver { winner } => Some(winner.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(winners, vec![Some("A".to_string())]);
        assert_eq!(h.game.phase(), MatchPhase::Ended);

        // A disconnect after the end does not announce a second winner
        h.game.handle_disconnect(a);
        h.pump();
        assert!(!h.kinds().contains(&"gameOver"));

        h.fire(|k| *k == TimerKind::Reset);
        assert_eq!(h.kinds(), vec!["gameReset"]);
        assert_eq!(h.game.phase(), MatchPhase::Lobby);
        assert!(h.game.state.registry.is_empty());
        assert!(h.game.state.chat.is_empty());
        assert!(h.armed.is_empty());
    }

    #[test]
    fn mutual_elimination_is_a_draw() {
        let (mut h, a, b) = Harness::playing_pair();
        h.game.state.registry.player_mut(a).unwrap().lives = 1;
        {
            let other = h.game.state.registry.player_mut(b).unwrap();
            other.lives = 1;
            other.set_position(crate::game::physics::Position::centred(Cell::new(2, 1)));
        }
        h.send(a, ClientMsg::PlaceBomb);
        h.fire(is_fuse);
        h.fire(|k| *k == TimerKind::GameOverCheck);

        let winners: Vec<_> = h
            .take_sent()
            .into_iter()
            .filter_map(|o| match o.msg {
                ServerMsg::GameOver { winner } => Some(winner),
                _ => None,
            })
            .collect();
        assert_eq!(winners, vec![None]);
    }

    #[test]
    fn game_over_cancels_pending_fuses() {
        let (mut h, a, b) = Harness::playing_pair();
        h.send(a, ClientMsg::PlaceBomb);
        let fuse = h.timer(is_fuse).unwrap();
        h.send(b, ClientMsg::LeaveGame);
        assert_eq!(h.game.phase(), MatchPhase::Ended);
        assert!(h.timer(is_fuse).is_none());

        h.take_sent();
        h.fire_id(fuse);
        assert!(h.take_sent().is_empty());
    }

    #[test]
    fn chat_length_cap() {
        let mut h = Harness::new(MatchSettings {
            chat_max_len: 20,
            ..MatchSettings::default()
        });
        let a = Uuid::new_v4();
        h.join(a, "A");
        h.take_sent();

        h.send(a, ClientMsg::Message { text: "x".repeat(25) });
        let sent = h.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].target, Target::One(a));
        assert_eq!(sent[0].msg.kind(), "error");

        h.send(a, ClientMsg::Message { text: "0123456789".into() });
        let sent = h.take_sent();
        assert_eq!(sent.len(), 1);
        let ServerMsg::NewMessage { message, messages } = &sent[0].msg else {
            panic!("expected newMessage");
        };
        assert_eq!(message.text, "0123456789");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "0123456789");
    }

    #[test]
    fn late_joiner_receives_chat_history() {
        let mut h = Harness::quick();
        let a = Uuid::new_v4();
        h.join(a, "A");
        h.send(a, ClientMsg::Message { text: "hello".into() });
        h.take_sent();

        let b = Uuid::new_v4();
        h.join(b, "B");
        let to_b: Vec<_> = h
            .take_sent()
            .into_iter()
            .filter(|o| o.target == Target::One(b))
            .map(|o| o.msg.kind())
            .collect();
        assert_eq!(to_b, vec!["gameState", "chatHistory"]);
    }

    #[test]
    fn slots_are_reindexed_for_respawn() {
        let mut h = Harness::quick();
        let conns: Vec<ConnId> = (0..3).map(|_| Uuid::new_v4()).collect();
        for (c, name) in conns.iter().zip(["A", "B", "C"]) {
            h.join(*c, name);
        }
        h.send(conns[0], ClientMsg::LeaveRoom);
        assert_eq!(h.player(conns[1]).slot, 0);
        assert_eq!(h.player(conns[2]).slot, 1);
        assert_eq!(h.player(conns[1]).spawn_cell(), Cell::new(1, 1));
    }

    #[test]
    fn leave_then_join_keeps_spawns_distinct() {
        let mut h = Harness::quick();
        let conns: Vec<ConnId> = (0..4).map(|_| Uuid::new_v4()).collect();
        for (c, name) in conns.iter().take(3).zip(["A", "B", "C"]) {
            h.join(*c, name);
        }
        h.send(conns[0], ClientMsg::LeaveRoom);
        h.join(conns[3], "D");

        let cells: Vec<Cell> = h.game.state.registry.players().iter().map(|p| p.cell()).collect();
        let unique: std::collections::HashSet<_> = cells.iter().collect();
        assert_eq!(unique.len(), cells.len(), "shared spawn cell: {cells:?}");
        for player in h.game.state.registry.players() {
            assert_eq!(player.cell(), player.spawn_cell());
        }

        h.run_countdowns();
        assert_eq!(h.game.phase(), MatchPhase::Playing);
        for player in h.game.state.registry.players() {
            assert_eq!(player.cell(), SPAWN_POSITIONS[player.slot]);
        }
    }

    #[test]
    fn first_join_regenerates_board() {
        let (mut h, a, b) = Harness::playing_pair();
        h.send(a, ClientMsg::LeaveGame);
        h.game.handle_disconnect(b);
        h.pump();
        h.fire(|k| *k == TimerKind::Reset);
        assert_eq!(h.game.phase(), MatchPhase::Lobby);
        let before = h.game.state.board.clone();

        h.join(Uuid::new_v4(), "C");
        assert_ne!(h.game.state.board, before);

        // A second joiner sees the same board
        let after_first = h.game.state.board.clone();
        h.join(Uuid::new_v4(), "D");
        assert_eq!(h.game.state.board, after_first);
    }
}

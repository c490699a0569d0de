//! Match state and authoritative tick loop

use dashmap::DashMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::util::time::{tick_delta, tick_duration, FixedStep, SIMULATION_TPS, SNAPSHOT_TPS};
use crate::ws::protocol::{LobbySettings, MatchPhase, Score, ServerMsg, Team};

use super::ball::{
    apply_aftertouch, apply_boundaries, attach_to_owner, check_goal, kick_ball, kick_loft,
    kick_power, reset_ball, update_free_ball, Ball, AFTERTOUCH_WINDOW, KICK_CHARGE_TIME,
};
use super::field::{keeper_spot, kickoff_spot};
use super::physics::{
    bounce_ball_off_players, find_possessor, find_stealer, resolve_player_collisions, KickRecord,
};
use super::player::{advance_state, begin_dive, begin_tackle, update_player, InputState, Player};
use super::snapshot::SnapshotBuilder;
use super::{PlayerInput, RoomCommand};

/// Seconds players are held in formation before play resumes
pub const KICKOFF_DELAY: f32 = 1.5;
pub const HALFTIME_DURATION: f32 = 5.0;
/// Seconds a room may stay under-staffed before the match is called off
pub const FORFEIT_GRACE: f32 = 30.0;

const COMMAND_QUEUE_CAPACITY: usize = 256;
const BROADCAST_CAPACITY: usize = 64;

/// A player carried over from the lobby
#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub player_id: Uuid,
    pub name: String,
    pub team: Team,
}

impl RosterEntry {
    pub fn new(player_id: Uuid, name: impl Into<String>, team: Team) -> Self {
        Self {
            player_id,
            name: name.into(),
            team,
        }
    }
}

/// Things that happened during a tick that the loop reports outward
#[derive(Debug, Clone, PartialEq)]
pub enum MatchEvent {
    Goal { team: Team, score: Score },
    PhaseChanged { from: MatchPhase, to: MatchPhase },
}

/// Match state (owned by match task)
pub struct MatchState {
    pub id: Uuid,
    pub settings: LobbySettings,
    pub phase: MatchPhase,
    pub tick: u64,
    /// Ticks spent in `playing`; the match clock is derived from it
    playing_ticks: u64,
    /// Roster order is the possession tie-break
    pub players: Vec<Player>,
    pub ball: Ball,
    pub score: Score,
    pub last_kick: Option<KickRecord>,
    /// 1 or 2
    pub half: u8,
    pub first_kickoff: Team,
    /// Team taking the most recent kickoff
    pub kickoff_team: Team,
    /// Countdown in kickoff and halftime, time spent paused in waiting
    pub phase_timer: f32,
}

impl MatchState {
    pub fn new(id: Uuid, seed: u64, settings: LobbySettings, roster: Vec<RosterEntry>) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let first_kickoff = if rng.gen_bool(0.5) {
            Team::Home
        } else {
            Team::Away
        };

        let team_count = |team: Team| roster.iter().filter(|r| r.team == team).count();
        let (home_count, away_count) = (team_count(Team::Home), team_count(Team::Away));

        let mut players: Vec<Player> = Vec::with_capacity(roster.len());
        for entry in roster {
            let size = match entry.team {
                Team::Home => home_count,
                Team::Away => away_count,
            };
            let first_of_team = !players.iter().any(|p| p.team == entry.team);
            let is_goalkeeper = size > 1 && first_of_team;
            players.push(Player::new(
                entry.player_id,
                entry.name,
                entry.team,
                is_goalkeeper,
                0.0,
                0.0,
            ));
        }

        Self {
            id,
            settings,
            phase: MatchPhase::Waiting,
            tick: 0,
            playing_ticks: 0,
            players,
            ball: reset_ball(),
            score: Score::default(),
            last_kick: None,
            half: 1,
            first_kickoff,
            kickoff_team: first_kickoff,
            phase_timer: 0.0,
        }
    }

    /// Seconds of playing time elapsed
    pub fn clock(&self) -> f64 {
        self.playing_ticks as f64 / SIMULATION_TPS as f64
    }

    pub fn duration(&self) -> f64 {
        self.settings.match_duration as f64
    }

    pub fn player(&self, id: Uuid) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    /// Both teams have at least one player
    pub fn is_staffed(&self) -> bool {
        [Team::Home, Team::Away]
            .iter()
            .all(|team| self.players.iter().any(|p| p.team == *team))
    }

    /// Overwrite a player's latest input. Unknown ids are ignored.
    pub fn apply_input(&mut self, player_id: Uuid, input: InputState) -> bool {
        match self.players.iter_mut().find(|p| p.id == player_id) {
            Some(player) => {
                player.input = input.sanitized();
                true
            }
            None => false,
        }
    }

    /// Remove a player, freeing the ball if they had it
    pub fn remove_player(&mut self, player_id: Uuid) -> Option<Player> {
        let index = self.players.iter().position(|p| p.id == player_id)?;
        let player = self.players.remove(index);
        if self.ball.owner_id == Some(player_id) {
            self.ball.owner_id = None;
        }
        Some(player)
    }

    /// Advance the room by one fixed step
    pub fn tick(&mut self) -> Vec<MatchEvent> {
        let dt = tick_delta();
        let mut events = Vec::new();

        self.tick += 1;

        if self.phase == MatchPhase::Ended {
            return events;
        }
        if self.players.is_empty() {
            self.set_phase(MatchPhase::Ended, &mut events);
            return events;
        }

        // A goal pauses for exactly one tick and never stops the clock
        if self.phase == MatchPhase::GoalScored {
            self.set_phase(MatchPhase::Playing, &mut events);
        }

        if self.phase != MatchPhase::Waiting && !self.is_staffed() {
            warn!(match_id = %self.id, "Team without players, pausing match");
            self.phase_timer = 0.0;
            self.set_phase(MatchPhase::Waiting, &mut events);
        }

        if self.phase == MatchPhase::Playing {
            self.playing_ticks += 1;
        }

        match self.phase {
            MatchPhase::Waiting => {
                if self.is_staffed() {
                    self.begin_kickoff(self.kickoff_team, &mut events);
                } else {
                    self.phase_timer += dt;
                    if self.phase_timer >= FORFEIT_GRACE {
                        info!(match_id = %self.id, "Match abandoned while under-staffed");
                        self.set_phase(MatchPhase::Ended, &mut events);
                    }
                }
            }
            MatchPhase::Kickoff => {
                self.phase_timer -= dt;
                if self.phase_timer <= 0.0 {
                    self.set_phase(MatchPhase::Playing, &mut events);
                }
            }
            MatchPhase::Halftime => {
                self.phase_timer -= dt;
                if self.phase_timer <= 0.0 {
                    self.half = 2;
                    self.begin_kickoff(self.first_kickoff.opponent(), &mut events);
                }
            }
            MatchPhase::Playing => {
                self.simulate(dt, &mut events);
                self.check_clock(&mut events);
            }
            MatchPhase::GoalScored | MatchPhase::Ended => {}
        }

        events
    }

    /// Halftime and full time
    fn check_clock(&mut self, events: &mut Vec<MatchEvent>) {
        let clock = self.clock();
        if clock >= self.duration() {
            info!(
                match_id = %self.id,
                home = self.score.home,
                away = self.score.away,
                "Full time"
            );
            self.set_phase(MatchPhase::Ended, events);
        } else if self.half == 1 && clock >= self.duration() / 2.0 {
            self.phase_timer = HALFTIME_DURATION;
            self.set_phase(MatchPhase::Halftime, events);
        }
    }

    /// Line both teams up, recreate the ball and start the kickoff countdown
    pub fn begin_kickoff(&mut self, team: Team, events: &mut Vec<MatchEvent>) {
        self.ball = reset_ball();
        self.last_kick = None;
        self.kickoff_team = team;

        for side in [Team::Home, Team::Away] {
            let outfield = self
                .players
                .iter()
                .filter(|p| p.team == side && !p.is_goalkeeper)
                .count();
            let mut index = 0;
            for player in self.players.iter_mut().filter(|p| p.team == side) {
                let (x, y) = if player.is_goalkeeper {
                    keeper_spot(side)
                } else {
                    let spot = kickoff_spot(side, index, outfield, side == team);
                    index += 1;
                    spot
                };
                player.reset_to(x, y);
            }
        }

        self.phase_timer = KICKOFF_DELAY;
        self.set_phase(MatchPhase::Kickoff, events);
    }

    fn set_phase(&mut self, phase: MatchPhase, events: &mut Vec<MatchEvent>) {
        if self.phase == phase {
            return;
        }
        debug!(match_id = %self.id, from = ?self.phase, to = ?phase, "Phase change");
        events.push(MatchEvent::PhaseChanged {
            from: self.phase,
            to: phase,
        });
        self.phase = phase;
    }

    /// One tick of play: actions, movement, collisions, ball, goals
    fn simulate(&mut self, dt: f32, events: &mut Vec<MatchEvent>) {
        let clock = self.clock();

        self.update_actions(dt, clock);

        for player in self.players.iter_mut() {
            update_player(player, dt);
        }
        resolve_player_collisions(&mut self.players);

        self.update_ball(dt, clock);

        for player in self.players.iter_mut() {
            player.has_ball = self.ball.owner_id == Some(player.id);
            if !player.has_ball {
                player.kick_charge = None;
            }
        }

        if let Some(team) = check_goal(&self.ball) {
            self.score.credit(team);
            info!(
                match_id = %self.id,
                team = ?team,
                home = self.score.home,
                away = self.score.away,
                "Goal"
            );
            events.push(MatchEvent::Goal {
                team,
                score: self.score,
            });

            self.ball = reset_ball();
            self.last_kick = None;
            for player in self.players.iter_mut() {
                player.has_ball = false;
                player.kick_charge = None;
            }
            self.set_phase(MatchPhase::GoalScored, events);
        }
    }

    /// Timers, kick charging and tackle/dive starts
    fn update_actions(&mut self, dt: f32, clock: f64) {
        let Self {
            players,
            ball,
            last_kick,
            ..
        } = self;

        for player in players.iter_mut() {
            advance_state(player, dt);

            let tackle_pressed = player.input.tackle && !player.tackle_held;
            player.tackle_held = player.input.tackle;

            if player.has_ball {
                let release = if player.input.kick {
                    let charge = player.kick_charge.get_or_insert(0.0);
                    *charge += dt;
                    (*charge >= KICK_CHARGE_TIME).then_some(*charge)
                } else {
                    player.kick_charge
                };

                if let Some(charge) = release {
                    *last_kick = Some(fire_kick(player, ball, charge, clock));
                }
            } else if tackle_pressed {
                if player.is_goalkeeper {
                    begin_dive(player);
                } else {
                    begin_tackle(player);
                }
            }
        }
    }

    /// Owned ball follows its carrier unless stolen; a free ball flies,
    /// gets collected or bounces off players
    fn update_ball(&mut self, dt: f32, clock: f64) {
        if let Some(owner_id) = self.ball.owner_id {
            if self.player(owner_id).is_none() {
                self.ball.owner_id = None;
            } else {
                if let Some(index) = find_stealer(&self.players, &self.ball) {
                    let thief = self.players[index].id;
                    debug!(match_id = %self.id, from = %owner_id, to = %thief, "Ball stolen");
                    self.ball.owner_id = Some(thief);
                    self.ball.last_touch_id = Some(thief);
                }
                if let Some(carrier) = self.ball.owner_id.and_then(|id| self.player(id)) {
                    let (x, y, facing) = (carrier.x, carrier.y, carrier.facing);
                    attach_to_owner(&mut self.ball, x, y, facing);
                }
                return;
            }
        }

        if let Some(kick) = self.last_kick {
            if kick.elapsed(clock) < AFTERTOUCH_WINDOW {
                if let Some(kicker) = self.player(kick.kicker_id) {
                    let input = kicker.input;
                    apply_aftertouch(&mut self.ball, kick.heading, input.move_x, input.move_y, dt);
                }
            }
        }

        update_free_ball(&mut self.ball, dt);

        match find_possessor(&self.players, &self.ball, clock, self.last_kick.as_ref()) {
            Some(index) => {
                let carrier = &self.players[index];
                let (id, x, y, facing) = (carrier.id, carrier.x, carrier.y, carrier.facing);
                self.ball.owner_id = Some(id);
                self.ball.last_touch_id = Some(id);
                attach_to_owner(&mut self.ball, x, y, facing);
            }
            None => {
                bounce_ball_off_players(&mut self.ball, &self.players, clock, self.last_kick.as_ref());
                apply_boundaries(&mut self.ball);
            }
        }
    }
}

/// Release a charged kick along the carrier's facing
fn fire_kick(player: &mut Player, ball: &mut Ball, charge: f32, clock: f64) -> KickRecord {
    let ratio = (charge / KICK_CHARGE_TIME).clamp(0.0, 1.0);
    let power = kick_power(ratio, player.speed());
    let loft = kick_loft(ratio);
    kick_ball(ball, power, player.facing, loft, (0.0, 0.0));
    ball.last_touch_id = Some(player.id);

    player.kick_charge = None;
    player.has_ball = false;

    KickRecord {
        kicker_id: player.id,
        at: clock,
        heading: player.facing,
    }
}

/// Handle to a running match
#[derive(Clone)]
pub struct MatchHandle {
    pub id: Uuid,
    pub command_tx: mpsc::Sender<RoomCommand>,
    pub snapshot_tx: broadcast::Sender<ServerMsg>,
    pub player_count: Arc<AtomicUsize>,
}

impl MatchHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    /// Queue a command without waiting. Returns false if the room is gone
    /// or its queue is full.
    pub fn send(&self, command: RoomCommand) -> bool {
        match self.command_tx.try_send(command) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(match_id = %self.id, "Room command queue full, dropping command");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMsg> {
        self.snapshot_tx.subscribe()
    }
}

/// Registry of all active matches and which player is in which
pub struct MatchRegistry {
    matches: DashMap<Uuid, MatchHandle>,
    memberships: DashMap<Uuid, Uuid>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self {
            matches: DashMap::new(),
            memberships: DashMap::new(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.get(id).map(|m| m.value().clone())
    }

    /// Register a room and its members
    pub fn insert(&self, handle: MatchHandle, members: &[Uuid]) {
        for member in members {
            self.memberships.insert(*member, handle.id);
        }
        self.matches.insert(handle.id, handle);
    }

    pub fn remove(&self, id: &Uuid) -> Option<MatchHandle> {
        self.memberships.retain(|_, room| *room != *id);
        self.matches.remove(id).map(|(_, h)| h)
    }

    /// The room a player is currently in
    pub fn room_for(&self, player_id: &Uuid) -> Option<MatchHandle> {
        let room_id = *self.memberships.get(player_id)?.value();
        self.get(&room_id)
    }

    /// Forward a player's input to their room
    pub fn route_input(&self, input: PlayerInput) -> bool {
        match self.room_for(&input.player_id) {
            Some(handle) => handle.send(RoomCommand::Input(input)),
            None => false,
        }
    }

    /// Drop a player's membership and tell their room
    pub fn leave(&self, player_id: &Uuid) -> Option<MatchHandle> {
        let (_, room_id) = self.memberships.remove(player_id)?;
        let handle = self.get(&room_id)?;
        handle.send(RoomCommand::Leave {
            player_id: *player_id,
        });
        Some(handle)
    }

    /// Spawn the room's loop. The room unregisters itself when it stops.
    pub fn launch(self: &Arc<Self>, game_match: GameMatch) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let id = game_match.id();
        tokio::spawn(async move {
            game_match.run().await;
            registry.remove(&id);
            info!(match_id = %id, "Room removed");
        })
    }

    /// Ask every room to stop
    pub fn stop_all(&self) {
        for entry in self.matches.iter() {
            entry.value().send(RoomCommand::Stop);
        }
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }

    pub fn total_players(&self) -> usize {
        self.matches
            .iter()
            .map(|m| m.value().player_count())
            .sum()
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The authoritative game match
pub struct GameMatch {
    state: MatchState,
    command_rx: mpsc::Receiver<RoomCommand>,
    snapshot_tx: broadcast::Sender<ServerMsg>,
    snapshot_builder: SnapshotBuilder,
    player_count: Arc<AtomicUsize>,
    stopped: bool,
}

impl GameMatch {
    /// Create a new match
    pub fn new(
        id: Uuid,
        seed: u64,
        settings: LobbySettings,
        roster: Vec<RosterEntry>,
    ) -> (Self, MatchHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let (snapshot_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let player_count = Arc::new(AtomicUsize::new(roster.len()));

        let handle = MatchHandle {
            id,
            command_tx,
            snapshot_tx: snapshot_tx.clone(),
            player_count: player_count.clone(),
        };

        let snapshot_interval = SIMULATION_TPS / SNAPSHOT_TPS;
        let state = MatchState::new(id, seed, settings, roster);
        debug!(
            match_id = %id,
            seed,
            first_kickoff = ?state.first_kickoff,
            "Match state created"
        );

        let game_match = Self {
            state,
            command_rx,
            snapshot_tx,
            snapshot_builder: SnapshotBuilder::new(snapshot_interval),
            player_count,
            stopped: false,
        };

        (game_match, handle)
    }

    pub fn id(&self) -> Uuid {
        self.state.id
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn is_finished(&self) -> bool {
        self.stopped || self.state.phase == MatchPhase::Ended
    }

    /// Run the authoritative tick loop
    pub async fn run(mut self) {
        info!(
            match_id = %self.state.id,
            players = self.state.players.len(),
            duration = self.state.settings.match_duration,
            "Match started"
        );

        let mut stepper = FixedStep::new(tick_duration(), Instant::now());

        while !self.is_finished() {
            tokio::time::sleep(stepper.until_next()).await;

            let steps = stepper.advance(Instant::now());
            for _ in 0..steps {
                self.step();
                if self.is_finished() {
                    break;
                }
            }
        }

        info!(
            match_id = %self.state.id,
            home = self.state.score.home,
            away = self.state.score.away,
            "Match ended"
        );

        // Send final match end message
        let _ = self.snapshot_tx.send(ServerMsg::MatchEnd {
            score: self.state.score,
            winner: self.state.score.leader(),
        });
    }

    /// Drain commands, tick once and broadcast the result
    pub fn step(&mut self) {
        self.process_commands();
        if self.stopped {
            return;
        }

        let events = self.state.tick();
        for event in events {
            match event {
                MatchEvent::Goal { team, score } => {
                    let _ = self.snapshot_tx.send(ServerMsg::Goal { team, score });
                    self.snapshot_builder.force_next();
                }
                MatchEvent::PhaseChanged { .. } => self.snapshot_builder.force_next(),
            }
        }

        if self.snapshot_builder.should_send() {
            let snapshot = self.snapshot_builder.build(&self.state);
            // No receivers is fine
            let _ = self.snapshot_tx.send(snapshot);
        }
    }

    /// Process all pending commands
    fn process_commands(&mut self) {
        loop {
            match self.command_rx.try_recv() {
                Ok(RoomCommand::Input(PlayerInput {
                    player_id, input, ..
                })) => {
                    self.state.apply_input(player_id, input);
                }
                Ok(RoomCommand::Leave { player_id }) => self.handle_leave(player_id),
                Ok(RoomCommand::Stop) => {
                    info!(match_id = %self.state.id, "Stop requested");
                    self.stopped = true;
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.stopped = true;
                    break;
                }
            }
        }
    }

    /// Handle player leave
    fn handle_leave(&mut self, player_id: Uuid) {
        if self.state.remove_player(player_id).is_some() {
            self.player_count
                .store(self.state.players.len(), Ordering::Relaxed);

            let _ = self.snapshot_tx.send(ServerMsg::PlayerLeft { player_id });

            info!(
                match_id = %self.state.id,
                player_id = %player_id,
                remaining = self.state.players.len(),
                "Player left match"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::ball::MAX_BALL_SPEED;
    use crate::game::field::{GOAL_DEPTH, HALF_LENGTH};
    use crate::game::player::PlayerState;
    use crate::util::time::unix_millis;

    fn settings(match_duration: u32) -> LobbySettings {
        LobbySettings {
            team_size: 2,
            match_duration,
        }
    }

    fn one_v_one() -> MatchState {
        let roster = vec![
            RosterEntry::new(Uuid::new_v4(), "home", Team::Home),
            RosterEntry::new(Uuid::new_v4(), "away", Team::Away),
        ];
        MatchState::new(Uuid::new_v4(), 42, settings(300), roster)
    }

    fn seconds(s: f32) -> usize {
        (s * SIMULATION_TPS as f32).ceil() as usize
    }

    /// Tick until play starts
    fn to_playing(state: &mut MatchState) {
        for _ in 0..seconds(KICKOFF_DELAY) + 5 {
            state.tick();
            if state.phase == MatchPhase::Playing {
                return;
            }
        }
        panic!("never reached playing, stuck in {:?}", state.phase);
    }

    fn owners(state: &MatchState) -> usize {
        state
            .players
            .iter()
            .filter(|p| state.ball.owner_id == Some(p.id))
            .count()
    }

    #[test]
    fn test_goalkeepers_only_for_larger_teams() {
        let roster = vec![
            RosterEntry::new(Uuid::new_v4(), "h1", Team::Home),
            RosterEntry::new(Uuid::new_v4(), "a1", Team::Away),
            RosterEntry::new(Uuid::new_v4(), "h2", Team::Home),
        ];
        let state = MatchState::new(Uuid::new_v4(), 1, settings(300), roster);

        assert!(state.players[0].is_goalkeeper);
        assert!(!state.players[1].is_goalkeeper);
        assert!(!state.players[2].is_goalkeeper);
    }

    #[test]
    fn test_same_seed_same_first_kickoff() {
        let a = MatchState::new(Uuid::new_v4(), 99, settings(300), vec![]);
        let b = MatchState::new(Uuid::new_v4(), 99, settings(300), vec![]);
        assert_eq!(a.first_kickoff, b.first_kickoff);
    }

    #[test]
    fn test_waiting_to_kickoff_to_playing() {
        let mut state = one_v_one();
        assert_eq!(state.phase, MatchPhase::Waiting);

        let events = state.tick();
        assert_eq!(state.phase, MatchPhase::Kickoff);
        assert!(events.contains(&MatchEvent::PhaseChanged {
            from: MatchPhase::Waiting,
            to: MatchPhase::Kickoff,
        }));

        // Players are lined up in their own halves
        for p in &state.players {
            assert!(p.y * p.team.attack_sign() <= 0.0);
        }

        to_playing(&mut state);
        assert_eq!(state.clock(), 0.0);
    }

    #[test]
    fn test_n_ticks_advance_tick_and_clock() {
        let mut state = one_v_one();
        to_playing(&mut state);

        let tick_before = state.tick;
        let clock_before = state.clock();
        for _ in 0..120 {
            state.tick();
        }

        assert_eq!(state.tick, tick_before + 120);
        let expected = clock_before + 120.0 / SIMULATION_TPS as f64;
        assert!((state.clock() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_kickoff_holds_the_clock() {
        let mut state = one_v_one();
        state.tick();
        assert_eq!(state.phase, MatchPhase::Kickoff);

        state.players[0].input.move_y = 1.0;
        let y = state.players[0].y;
        state.tick();

        assert_eq!(state.clock(), 0.0);
        assert_eq!(state.players[0].y, y);
    }

    #[test]
    fn test_at_most_one_owner_every_tick() {
        let mut state = one_v_one();
        to_playing(&mut state);

        // Both players charge the center spot, one tackling
        state.players[0].input.move_y = 1.0;
        state.players[1].input.move_y = -1.0;
        for i in 0..300 {
            state.players[1].input.tackle = i % 20 < 10;
            state.players[0].input.kick = i % 40 < 5;
            state.tick();
            assert!(owners(&state) <= 1, "tick {}", state.tick);
            assert!(state.ball.planar_speed() <= MAX_BALL_SPEED + 1e-3);
            for p in &state.players {
                assert_eq!(p.has_ball, state.ball.owner_id == Some(p.id));
            }
        }
    }

    #[test]
    fn test_player_collects_ball_and_kick_releases_it() {
        let mut state = one_v_one();
        to_playing(&mut state);

        let id = state.players[0].id;
        state.players[0].x = 0.0;
        state.players[0].y = -20.0;
        state.players[1].x = 200.0;
        state.players[1].y = 200.0;
        state.tick();
        assert_eq!(state.ball.owner_id, Some(id));
        assert!(state.players[0].has_ball);

        // Tap kick
        state.players[0].input.kick = true;
        state.tick();
        assert!(state.players[0].kick_charge.is_some());
        state.players[0].input.kick = false;
        state.tick();

        assert!(state.ball.is_free());
        assert!(state.ball.vy > 0.0);
        assert_eq!(state.last_kick.map(|k| k.kicker_id), Some(id));

        // Still overlapping a moment later, but cannot re-collect
        state.tick();
        assert!(state.ball.is_free());
    }

    #[test]
    fn test_full_charge_fires_while_held() {
        let mut state = one_v_one();
        to_playing(&mut state);
        state.players[0].x = 0.0;
        state.players[0].y = -20.0;
        state.players[1].x = 200.0;
        state.tick();

        state.players[0].input.kick = true;
        for _ in 0..seconds(KICK_CHARGE_TIME) + 1 {
            state.tick();
        }

        assert!(state.ball.is_free());
        assert!(state.ball.vz > 0.0, "a full charge is lofted");
    }

    #[test]
    fn test_tackle_steals_ball() {
        let mut state = one_v_one();
        to_playing(&mut state);

        let away_id = state.players[1].id;
        state.players[0].x = 0.0;
        state.players[0].y = -20.0;
        state.players[1].x = 0.0;
        state.players[1].y = 40.0;
        state.tick();
        assert!(state.players[0].has_ball);

        state.players[1].facing = -std::f32::consts::FRAC_PI_2;
        state.players[1].input.tackle = true;
        for _ in 0..5 {
            state.tick();
            if state.ball.owner_id == Some(away_id) {
                break;
            }
        }

        assert_eq!(state.ball.owner_id, Some(away_id));
        assert!(!state.players[0].has_ball);
    }

    #[test]
    fn test_tackle_is_edge_triggered() {
        let mut state = one_v_one();
        to_playing(&mut state);
        state.players[1].x = 200.0;
        state.players[1].input.tackle = true;

        state.tick();
        assert!(matches!(state.players[1].state, PlayerState::Tackling { .. }));

        // Holding the button through recovery does not chain another tackle
        for _ in 0..seconds(1.0) {
            state.tick();
        }
        assert_eq!(state.players[1].state, PlayerState::Idle);
    }

    #[test]
    fn test_goal_scores_and_resets_ball() {
        let mut state = one_v_one();
        to_playing(&mut state);
        state.players[0].x = -200.0;
        state.players[1].x = 200.0;

        state.ball.x = 0.0;
        state.ball.y = HALF_LENGTH - 2.0;
        state.ball.vy = 600.0;

        let mut goal = None;
        for _ in 0..10 {
            for event in state.tick() {
                if let MatchEvent::Goal { team, score } = event {
                    goal = Some((team, score));
                }
            }
            if goal.is_some() {
                break;
            }
        }

        let (team, score) = goal.expect("goal");
        assert_eq!(team, Team::Home);
        assert_eq!(score, Score { home: 1, away: 0 });
        assert_eq!(state.phase, MatchPhase::GoalScored);
        assert_eq!((state.ball.x, state.ball.y), (0.0, 0.0));
        assert!(state.ball.owner_id.is_none());
        assert!(state.ball.y.abs() < HALF_LENGTH + GOAL_DEPTH);

        // Next tick is play again and the clock moved on
        let clock = state.clock();
        state.tick();
        assert_eq!(state.phase, MatchPhase::Playing);
        assert!(state.clock() > clock);
    }

    #[test]
    fn test_halftime_then_second_half_kickoff() {
        let roster = vec![
            RosterEntry::new(Uuid::new_v4(), "home", Team::Home),
            RosterEntry::new(Uuid::new_v4(), "away", Team::Away),
        ];
        let mut state = MatchState::new(Uuid::new_v4(), 5, settings(60), roster);
        to_playing(&mut state);

        for _ in 0..seconds(30.0) + 1 {
            state.tick();
            if state.phase == MatchPhase::Halftime {
                break;
            }
        }
        assert_eq!(state.phase, MatchPhase::Halftime);
        let clock = state.clock();

        for _ in 0..seconds(HALFTIME_DURATION) + 1 {
            state.tick();
        }
        assert_eq!(state.phase, MatchPhase::Kickoff);
        assert_eq!(state.half, 2);
        assert_eq!(state.kickoff_team, state.first_kickoff.opponent());
        assert_eq!(state.clock(), clock);
    }

    #[test]
    fn test_full_time_ends_match() {
        let mut state = one_v_one();
        state.settings.match_duration = 60;
        to_playing(&mut state);
        state.half = 2;

        for _ in 0..seconds(60.0) + 1 {
            state.tick();
        }
        assert_eq!(state.phase, MatchPhase::Ended);

        let tick = state.tick;
        state.tick();
        assert_eq!(state.phase, MatchPhase::Ended);
        assert_eq!(state.tick, tick + 1);
    }

    #[test]
    fn test_owner_leaving_frees_ball() {
        let mut state = one_v_one();
        to_playing(&mut state);
        let id = state.players[0].id;
        state.ball.owner_id = Some(id);

        assert!(state.remove_player(id).is_some());
        assert!(state.ball.is_free());
        assert!(state.remove_player(id).is_none());
    }

    #[test]
    fn test_understaffed_room_pauses_then_forfeits() {
        let mut state = one_v_one();
        to_playing(&mut state);
        let away = state.players[1].id;
        state.remove_player(away);

        state.tick();
        assert_eq!(state.phase, MatchPhase::Waiting);
        let clock = state.clock();

        for _ in 0..seconds(FORFEIT_GRACE) + 1 {
            state.tick();
        }
        assert_eq!(state.phase, MatchPhase::Ended);
        assert_eq!(state.clock(), clock);
    }

    #[test]
    fn test_empty_room_ends() {
        let mut state = one_v_one();
        let ids: Vec<Uuid> = state.players.iter().map(|p| p.id).collect();
        for id in ids {
            state.remove_player(id);
        }
        state.tick();
        assert_eq!(state.phase, MatchPhase::Ended);
    }

    #[test]
    fn test_input_is_last_write_wins() {
        let mut state = one_v_one();
        let id = state.players[0].id;
        state.apply_input(id, InputState { move_x: 1.0, ..Default::default() });
        state.apply_input(id, InputState { move_y: 1.0, ..Default::default() });

        assert_eq!(state.players[0].input.move_x, 0.0);
        assert_eq!(state.players[0].input.move_y, 1.0);
        assert!(!state.apply_input(Uuid::new_v4(), InputState::default()));
    }

    #[tokio::test]
    async fn test_step_drains_commands_and_broadcasts() {
        let home = Uuid::new_v4();
        let away = Uuid::new_v4();
        let roster = vec![
            RosterEntry::new(home, "home", Team::Home),
            RosterEntry::new(away, "away", Team::Away),
        ];
        let (mut game, handle) = GameMatch::new(Uuid::new_v4(), 3, settings(300), roster);
        let mut rx = handle.subscribe();

        assert!(handle.send(RoomCommand::Input(PlayerInput {
            player_id: home,
            input: InputState { move_x: 1.0, ..Default::default() },
            received_at: unix_millis(),
        })));
        game.step();

        assert_eq!(game.state().player(home).map(|p| p.input.move_x), Some(1.0));
        match rx.recv().await {
            Ok(ServerMsg::GameState { tick, phase, players, .. }) => {
                assert_eq!(tick, 1);
                assert_eq!(phase, MatchPhase::Kickoff);
                assert_eq!(players.len(), 2);
            }
            other => panic!("unexpected: {:?}", other),
        }

        handle.send(RoomCommand::Leave { player_id: away });
        game.step();
        assert_eq!(handle.player_count(), 1);
        assert!(matches!(
            rx.recv().await,
            Ok(ServerMsg::PlayerLeft { player_id }) if player_id == away
        ));
    }

    #[tokio::test]
    async fn test_stop_command_ends_loop() {
        let registry = Arc::new(MatchRegistry::new());
        let player = Uuid::new_v4();
        let roster = vec![
            RosterEntry::new(player, "home", Team::Home),
            RosterEntry::new(Uuid::new_v4(), "away", Team::Away),
        ];
        let (game, handle) = GameMatch::new(Uuid::new_v4(), 8, settings(300), roster);
        let mut rx = handle.subscribe();
        registry.insert(handle.clone(), &[player]);
        assert!(registry.room_for(&player).is_some());

        let task = registry.launch(game);
        registry.stop_all();
        tokio_test::assert_ok!(task.await);

        assert_eq!(registry.active_matches(), 0);
        assert!(registry.room_for(&player).is_none());

        let mut saw_end = false;
        while let Ok(msg) = rx.try_recv() {
            if matches!(msg, ServerMsg::MatchEnd { .. }) {
                saw_end = true;
            }
        }
        assert!(saw_end);
    }
}

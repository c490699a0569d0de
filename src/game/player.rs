//! Player movement and action state machine

use uuid::Uuid;

use super::field::{field_rect, penalty_box};
use super::physics::normalize_angle;
use crate::ws::protocol::{PlayerActivity, Team};

pub const PLAYER_RADIUS: f32 = 16.0;

/// Top running speed without sprint
pub const PLAYER_SPEED: f32 = 220.0;
pub const SPRINT_MULTIPLIER: f32 = 1.45;
/// Carrying the ball slows the carrier down a little
pub const DRIBBLE_SPEED_FACTOR: f32 = 0.9;
/// How quickly velocity converges on the target, per second
pub const PLAYER_ACCELERATION: f32 = 10.0;
/// Max facing rotation in radians per second
pub const TURN_RATE: f32 = 10.0;
/// Stick magnitude below which input counts as neutral
pub const MOVE_DEADZONE: f32 = 0.1;

pub const TACKLE_DURATION: f32 = 0.3;
pub const TACKLE_SPEED: f32 = 400.0;
pub const TACKLE_RECOVERY: f32 = 0.5;

pub const DIVE_DURATION: f32 = 0.45;
pub const DIVE_SPEED: f32 = 330.0;
pub const DIVE_RECOVERY: f32 = 0.7;

/// Latest controller state received for a player
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputState {
    pub move_x: f32,
    pub move_y: f32,
    pub sprint: bool,
    pub kick: bool,
    pub tackle: bool,
}

impl InputState {
    /// Clamp the stick to the unit circle and drop it inside the deadzone
    pub fn sanitized(self) -> Self {
        let move_x = if self.move_x.is_finite() { self.move_x } else { 0.0 };
        let move_y = if self.move_y.is_finite() { self.move_y } else { 0.0 };
        let magnitude = (move_x * move_x + move_y * move_y).sqrt();

        let (move_x, move_y) = if magnitude < MOVE_DEADZONE {
            (0.0, 0.0)
        } else if magnitude > 1.0 {
            (move_x / magnitude, move_y / magnitude)
        } else {
            (move_x, move_y)
        };

        Self {
            move_x,
            move_y,
            ..self
        }
    }

    pub fn is_moving(&self) -> bool {
        self.move_x != 0.0 || self.move_y != 0.0
    }

    pub fn heading(&self) -> Option<f32> {
        self.is_moving().then(|| self.move_y.atan2(self.move_x))
    }
}

/// Player action state. Timed states carry their own countdown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerState {
    Idle,
    Running,
    Tackling { remaining: f32, heading: f32 },
    Diving { remaining: f32, heading: f32 },
    Recovering { remaining: f32 },
}

impl PlayerState {
    pub fn activity(&self) -> PlayerActivity {
        match self {
            PlayerState::Idle => PlayerActivity::Idle,
            PlayerState::Running => PlayerActivity::Running,
            PlayerState::Tackling { .. } => PlayerActivity::Tackling,
            PlayerState::Diving { .. } => PlayerActivity::Diving,
            PlayerState::Recovering { .. } => PlayerActivity::Recovering,
        }
    }

    /// Idle or running: free to move and start an action
    pub fn is_free(&self) -> bool {
        matches!(self, PlayerState::Idle | PlayerState::Running)
    }
}

/// Events that drive `next_state`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StateEvent {
    Tackle { heading: f32 },
    Dive { heading: f32 },
    /// Time passed; `moving` is whether the player is steering
    Elapsed { dt: f32, moving: bool },
}

/// The player state transition table.
///
/// idle/running -> tackling -> recovering -> idle
/// idle/running -> diving -> recovering -> idle
pub fn next_state(state: PlayerState, event: StateEvent) -> PlayerState {
    match (state, event) {
        (PlayerState::Idle | PlayerState::Running, StateEvent::Tackle { heading }) => {
            PlayerState::Tackling {
                remaining: TACKLE_DURATION,
                heading,
            }
        }
        (PlayerState::Idle | PlayerState::Running, StateEvent::Dive { heading }) => {
            PlayerState::Diving {
                remaining: DIVE_DURATION,
                heading,
            }
        }
        (PlayerState::Idle | PlayerState::Running, StateEvent::Elapsed { moving, .. }) => {
            if moving {
                PlayerState::Running
            } else {
                PlayerState::Idle
            }
        }
        (PlayerState::Tackling { remaining, heading }, StateEvent::Elapsed { dt, .. }) => {
            let remaining = remaining - dt;
            if remaining <= 0.0 {
                PlayerState::Recovering {
                    remaining: TACKLE_RECOVERY,
                }
            } else {
                PlayerState::Tackling { remaining, heading }
            }
        }
        (PlayerState::Diving { remaining, heading }, StateEvent::Elapsed { dt, .. }) => {
            let remaining = remaining - dt;
            if remaining <= 0.0 {
                PlayerState::Recovering {
                    remaining: DIVE_RECOVERY,
                }
            } else {
                PlayerState::Diving { remaining, heading }
            }
        }
        (PlayerState::Recovering { remaining }, StateEvent::Elapsed { dt, .. }) => {
            let remaining = remaining - dt;
            if remaining <= 0.0 {
                PlayerState::Idle
            } else {
                PlayerState::Recovering { remaining }
            }
        }
        // Busy players ignore new action requests
        (state, _) => state,
    }
}

/// A player in a match (authoritative)
#[derive(Debug, Clone)]
pub struct Player {
    pub id: Uuid,
    pub name: String,
    pub team: Team,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    /// Facing in radians, 0 = +x
    pub facing: f32,
    pub is_goalkeeper: bool,
    /// Mirror of `Ball::owner_id == Some(id)`
    pub has_ball: bool,
    pub state: PlayerState,
    pub input: InputState,
    /// Seconds the kick button has been held while carrying the ball
    pub kick_charge: Option<f32>,
    /// Tackle button state seen on the previous tick, for edge detection
    pub tackle_held: bool,
}

impl Player {
    pub fn new(id: Uuid, name: String, team: Team, is_goalkeeper: bool, x: f32, y: f32) -> Self {
        Self {
            id,
            name,
            team,
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            facing: attack_heading(team),
            is_goalkeeper,
            has_ball: false,
            state: PlayerState::Idle,
            input: InputState::default(),
            kick_charge: None,
            tackle_held: false,
        }
    }

    pub fn speed(&self) -> f32 {
        (self.vx * self.vx + self.vy * self.vy).sqrt()
    }

    /// Place the player on a spot at rest, clearing any action in progress
    pub fn reset_to(&mut self, x: f32, y: f32) {
        self.x = x;
        self.y = y;
        self.vx = 0.0;
        self.vy = 0.0;
        self.facing = attack_heading(self.team);
        self.state = PlayerState::Idle;
        self.kick_charge = None;
        self.has_ball = false;
    }
}

/// Facing toward the opponent's goal
pub fn attack_heading(team: Team) -> f32 {
    team.attack_sign() * std::f32::consts::FRAC_PI_2
}

/// Tick the player's timers through the transition table
pub fn advance_state(player: &mut Player, dt: f32) {
    let moving = player.input.is_moving();
    player.state = next_state(player.state, StateEvent::Elapsed { dt, moving });
}

/// Start a tackle along the current facing. Only without the ball.
pub fn begin_tackle(player: &mut Player) -> bool {
    if player.has_ball || !player.state.is_free() {
        return false;
    }
    player.kick_charge = None;
    player.state = next_state(
        player.state,
        StateEvent::Tackle {
            heading: player.facing,
        },
    );
    true
}

/// Start a goalkeeper dive toward the stick direction, or the facing if the
/// stick is neutral
pub fn begin_dive(player: &mut Player) -> bool {
    if !player.is_goalkeeper || player.has_ball || !player.state.is_free() {
        return false;
    }
    let heading = player.input.heading().unwrap_or(player.facing);
    player.facing = heading;
    player.state = next_state(player.state, StateEvent::Dive { heading });
    true
}

/// Rotate `from` toward `to` by at most `max_step` radians
pub fn turn_toward(from: f32, to: f32, max_step: f32) -> f32 {
    let diff = normalize_angle(to - from);
    if diff.abs() <= max_step {
        normalize_angle(to)
    } else {
        normalize_angle(from + max_step.copysign(diff))
    }
}

/// Integrate a player's motion for one tick
pub fn update_player(player: &mut Player, dt: f32) {
    match player.state {
        PlayerState::Tackling { heading, .. } => {
            player.vx = heading.cos() * TACKLE_SPEED;
            player.vy = heading.sin() * TACKLE_SPEED;
        }
        PlayerState::Diving { heading, .. } => {
            player.vx = heading.cos() * DIVE_SPEED;
            player.vy = heading.sin() * DIVE_SPEED;
        }
        PlayerState::Recovering { .. } => {
            player.vx = 0.0;
            player.vy = 0.0;
        }
        PlayerState::Idle | PlayerState::Running => {
            let input = player.input;
            let mut top_speed = PLAYER_SPEED;
            if input.sprint {
                top_speed *= SPRINT_MULTIPLIER;
            }
            if player.has_ball {
                top_speed *= DRIBBLE_SPEED_FACTOR;
            }

            let target_vx = input.move_x * top_speed;
            let target_vy = input.move_y * top_speed;
            let blend = (PLAYER_ACCELERATION * dt).min(1.0);
            player.vx += (target_vx - player.vx) * blend;
            player.vy += (target_vy - player.vy) * blend;

            // Facing is locked while winding up a kick
            if player.kick_charge.is_none() {
                if let Some(heading) = input.heading() {
                    player.facing = turn_toward(player.facing, heading, TURN_RATE * dt);
                }
            }
        }
    }

    player.x += player.vx * dt;
    player.y += player.vy * dt;

    clamp_player(player);
}

/// Keep the player on the pitch; goalkeepers stay in their own box
pub fn clamp_player(player: &mut Player) {
    let bounds = if player.is_goalkeeper {
        penalty_box(player.team)
    } else {
        field_rect()
    };

    let (x, y, clamped_x, clamped_y) = bounds.clamp(player.x, player.y);
    player.x = x;
    player.y = y;
    if clamped_x {
        player.vx = 0.0;
    }
    if clamped_y {
        player.vy = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::field::{HALF_LENGTH, HALF_WIDTH, PENALTY_BOX_DEPTH, PENALTY_BOX_WIDTH};
    use crate::util::time::tick_delta;

    fn player(team: Team) -> Player {
        Player::new(Uuid::new_v4(), "p".to_string(), team, false, 0.0, 0.0)
    }

    fn run(player: &mut Player, seconds: f32) {
        let ticks = (seconds / tick_delta()).round() as usize;
        for _ in 0..ticks {
            advance_state(player, tick_delta());
            update_player(player, tick_delta());
        }
    }

    #[test]
    fn test_input_sanitized() {
        let input = InputState {
            move_x: 3.0,
            move_y: 4.0,
            ..Default::default()
        }
        .sanitized();
        assert!((input.move_x - 0.6).abs() < 1e-6);
        assert!((input.move_y - 0.8).abs() < 1e-6);

        let tiny = InputState {
            move_x: 0.05,
            ..Default::default()
        }
        .sanitized();
        assert!(!tiny.is_moving());

        let junk = InputState {
            move_x: f32::NAN,
            move_y: f32::INFINITY,
            ..Default::default()
        }
        .sanitized();
        assert!(!junk.is_moving());
    }

    #[test]
    fn test_running_converges_on_target_speed() {
        let mut p = player(Team::Home);
        p.y = -400.0;
        p.input.move_y = 1.0;
        run(&mut p, 1.0);

        assert!((p.vy - PLAYER_SPEED).abs() < 1.0);
        assert_eq!(p.state, PlayerState::Running);

        p.input.sprint = true;
        run(&mut p, 1.0);
        assert!((p.vy - PLAYER_SPEED * SPRINT_MULTIPLIER).abs() < 1.0);
    }

    #[test]
    fn test_facing_turn_is_rate_limited() {
        let mut p = player(Team::Home);
        p.facing = 0.0;
        p.input.move_x = -1.0;

        update_player(&mut p, tick_delta());

        let turned = normalize_angle(p.facing).abs();
        assert!((turned - TURN_RATE * tick_delta()).abs() < 1e-4);
    }

    #[test]
    fn test_facing_locked_while_charging() {
        let mut p = player(Team::Home);
        p.facing = 0.0;
        p.kick_charge = Some(0.2);
        p.input.move_y = 1.0;

        update_player(&mut p, tick_delta());

        assert_eq!(p.facing, 0.0);
        assert!(p.vy > 0.0);
    }

    #[test]
    fn test_tackle_cycle() {
        let mut p = player(Team::Home);
        p.facing = 0.0;
        assert!(begin_tackle(&mut p));
        assert!(!begin_tackle(&mut p));

        update_player(&mut p, tick_delta());
        assert_eq!(p.vx, TACKLE_SPEED);

        run(&mut p, TACKLE_DURATION + tick_delta());
        assert!(matches!(p.state, PlayerState::Recovering { .. }));

        let x = p.x;
        run(&mut p, 0.1);
        assert_eq!(p.x, x, "recovering players are immobile");

        run(&mut p, TACKLE_RECOVERY);
        assert_eq!(p.state, PlayerState::Idle);
    }

    #[test]
    fn test_tackle_requires_no_ball() {
        let mut p = player(Team::Away);
        p.has_ball = true;
        assert!(!begin_tackle(&mut p));
        assert_eq!(p.state, PlayerState::Idle);
    }

    #[test]
    fn test_only_keepers_dive() {
        let mut p = player(Team::Home);
        assert!(!begin_dive(&mut p));

        p.is_goalkeeper = true;
        p.input.move_x = -1.0;
        assert!(begin_dive(&mut p));
        match p.state {
            PlayerState::Diving { heading, .. } => {
                assert!((heading.abs() - std::f32::consts::PI).abs() < 1e-5)
            }
            other => panic!("expected dive, got {:?}", other),
        }
    }

    #[test]
    fn test_transition_table_ignores_actions_while_busy() {
        let recovering = PlayerState::Recovering { remaining: 0.2 };
        assert_eq!(
            next_state(recovering, StateEvent::Tackle { heading: 0.0 }),
            recovering
        );
        let diving = PlayerState::Diving {
            remaining: 0.2,
            heading: 1.0,
        };
        assert_eq!(next_state(diving, StateEvent::Tackle { heading: 0.0 }), diving);
        assert!(matches!(
            next_state(diving, StateEvent::Elapsed { dt: 0.3, moving: true }),
            PlayerState::Recovering { .. }
        ));
    }

    #[test]
    fn test_field_clamp() {
        let mut p = player(Team::Home);
        p.x = HALF_WIDTH + 50.0;
        p.y = -HALF_LENGTH - 50.0;
        clamp_player(&mut p);
        assert_eq!((p.x, p.y), (HALF_WIDTH, -HALF_LENGTH));
    }

    #[test]
    fn test_goalkeeper_clamped_to_own_box_per_axis() {
        let mut keeper = Player::new(Uuid::new_v4(), "gk".to_string(), Team::Home, true, 0.0, -HALF_LENGTH + 20.0);

        // Leaving through the top of the box only clamps y
        keeper.x = 10.0;
        keeper.y = 0.0;
        keeper.vx = 50.0;
        keeper.vy = 200.0;
        clamp_player(&mut keeper);
        assert_eq!(keeper.x, 10.0);
        assert_eq!(keeper.y, -HALF_LENGTH + PENALTY_BOX_DEPTH);
        assert_eq!(keeper.vx, 50.0);
        assert_eq!(keeper.vy, 0.0);

        // Leaving sideways only clamps x
        keeper.x = -400.0;
        keeper.y = -HALF_LENGTH + 40.0;
        clamp_player(&mut keeper);
        assert_eq!(keeper.x, -PENALTY_BOX_WIDTH / 2.0);
        assert_eq!(keeper.y, -HALF_LENGTH + 40.0);

        // Both at once
        let mut away = Player::new(Uuid::new_v4(), "gk".to_string(), Team::Away, true, 0.0, 0.0);
        away.x = 999.0;
        away.y = -999.0;
        clamp_player(&mut away);
        assert_eq!(away.x, PENALTY_BOX_WIDTH / 2.0);
        assert_eq!(away.y, HALF_LENGTH - PENALTY_BOX_DEPTH);
    }

    #[test]
    fn test_keeper_running_out_stops_at_box_edge() {
        let mut keeper = Player::new(Uuid::new_v4(), "gk".to_string(), Team::Home, true, 0.0, -HALF_LENGTH + 20.0);
        keeper.input.move_y = 1.0;
        keeper.input.sprint = true;
        run(&mut keeper, 3.0);
        assert_eq!(keeper.y, -HALF_LENGTH + PENALTY_BOX_DEPTH);
    }

    #[test]
    fn test_turn_toward_wraps() {
        let from = 3.0;
        let to = -3.0;
        // Shortest way is through ±π, not back across zero
        let step = turn_toward(from, to, 0.1);
        assert!(step > 3.0 || step < -3.0);
    }
}

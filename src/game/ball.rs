//! Ball physics: free flight, kicks, aftertouch and goal detection

use uuid::Uuid;

use super::field::{in_goal_mouth, GOAL_DEPTH, GOAL_WIDTH, HALF_LENGTH, HALF_WIDTH};
use super::physics::normalize_angle;
use super::player::PLAYER_RADIUS;
use crate::util::time::SIMULATION_TPS;
use crate::ws::protocol::Team;

pub const BALL_RADIUS: f32 = 7.0;

/// Downward acceleration in units/s²
pub const GRAVITY: f32 = 900.0;
/// Fraction of vertical speed kept on a ground bounce
pub const BOUNCE_FACTOR: f32 = 0.55;
/// Vertical speed below which a bounce dies out
pub const MIN_BOUNCE_SPEED: f32 = 60.0;
/// Fraction of speed kept when bouncing off a line or the net
pub const WALL_BOUNCE: f32 = 0.7;

/// Per-reference-tick horizontal damping on the ground and in the air
pub const GROUND_FRICTION: f32 = 0.985;
pub const AIR_FRICTION: f32 = 0.996;
/// Height above which the ball counts as airborne for friction
pub const AIRBORNE_HEIGHT: f32 = 0.5;
/// Planar speed below which the ball is considered at rest
pub const REST_SPEED: f32 = 2.0;

pub const MAX_BALL_SPEED: f32 = 1000.0;

/// Spin only bends the ball below this height
pub const SPIN_MAX_HEIGHT: f32 = 250.0;
/// Lateral acceleration per unit of spin
pub const CURVE_STRENGTH: f32 = 1.5;
/// Per-reference-tick spin decay
pub const SPIN_DECAY: f32 = 0.97;
pub const SPIN_EPSILON: f32 = 1.0;
pub const MAX_SPIN: f32 = 400.0;

pub const KICK_CHARGE_TIME: f32 = 1.0;
pub const MIN_KICK_POWER: f32 = 250.0;
pub const MAX_KICK_POWER: f32 = 900.0;
/// Share of the kicker's own speed added to the kick
pub const KICK_MOMENTUM_TRANSFER: f32 = 0.5;
/// Charge ratio above which kicks start leaving the ground
pub const LOFT_CHARGE_THRESHOLD: f32 = 0.5;
pub const MAX_LOFT_ANGLE: f32 = 0.45;

pub const AFTERTOUCH_WINDOW: f32 = 0.6;
pub const AFTERTOUCH_MIN_SPEED: f32 = 120.0;
/// Vertical acceleration from pulling back against the kick
pub const AFTERTOUCH_LIFT: f32 = 500.0;
pub const AFTERTOUCH_MAX_VZ: f32 = 350.0;
/// Spin added per second at full sideways input
pub const AFTERTOUCH_CURVE: f32 = 1200.0;

/// Distance from the carrier's center to the ball while dribbling
pub const DRIBBLE_OFFSET: f32 = PLAYER_RADIUS + BALL_RADIUS + 2.0;

/// The ball. `z` is height above the pitch.
#[derive(Debug, Clone, PartialEq)]
pub struct Ball {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,
    pub spin_x: f32,
    pub spin_y: f32,
    pub owner_id: Option<Uuid>,
    pub last_touch_id: Option<Uuid>,
}

impl Ball {
    pub fn planar_speed(&self) -> f32 {
        (self.vx * self.vx + self.vy * self.vy).sqrt()
    }

    pub fn is_free(&self) -> bool {
        self.owner_id.is_none()
    }
}

/// A fresh ball on the center spot: no velocity, no spin, no owner
pub fn reset_ball() -> Ball {
    Ball {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        vx: 0.0,
        vy: 0.0,
        vz: 0.0,
        spin_x: 0.0,
        spin_y: 0.0,
        owner_id: None,
        last_touch_id: None,
    }
}

/// Scale a per-reference-tick factor to an arbitrary dt
fn per_tick(factor: f32, dt: f32) -> f32 {
    factor.powf(dt * SIMULATION_TPS as f32)
}

/// Advance a free ball by `dt` seconds
pub fn update_free_ball(ball: &mut Ball, dt: f32) {
    // Spin bends the flight, then bleeds off
    if ball.z < SPIN_MAX_HEIGHT {
        ball.vx += ball.spin_x * CURVE_STRENGTH * dt;
        ball.vy += ball.spin_y * CURVE_STRENGTH * dt;
    }
    let decay = per_tick(SPIN_DECAY, dt);
    ball.spin_x *= decay;
    ball.spin_y *= decay;
    if ball.spin_x.abs() < SPIN_EPSILON {
        ball.spin_x = 0.0;
    }
    if ball.spin_y.abs() < SPIN_EPSILON {
        ball.spin_y = 0.0;
    }

    if ball.z > 0.0 || ball.vz > 0.0 {
        ball.vz -= GRAVITY * dt;
    }

    ball.x += ball.vx * dt;
    ball.y += ball.vy * dt;
    ball.z += ball.vz * dt;

    if ball.z <= 0.0 {
        ball.z = 0.0;
        if ball.vz < 0.0 {
            ball.vz = -ball.vz * BOUNCE_FACTOR;
            if ball.vz < MIN_BOUNCE_SPEED {
                ball.vz = 0.0;
            }
        }
    }

    let friction = if ball.z > AIRBORNE_HEIGHT {
        AIR_FRICTION
    } else {
        GROUND_FRICTION
    };
    let damping = per_tick(friction, dt);
    ball.vx *= damping;
    ball.vy *= damping;

    clamp_speed(ball);
    if ball.planar_speed() < REST_SPEED && ball.z == 0.0 {
        ball.vx = 0.0;
        ball.vy = 0.0;
    }

    apply_boundaries(ball);
}

/// Clamp planar speed to `MAX_BALL_SPEED`
pub fn clamp_speed(ball: &mut Ball) {
    let speed = ball.planar_speed();
    if speed > MAX_BALL_SPEED {
        let scale = MAX_BALL_SPEED / speed;
        ball.vx *= scale;
        ball.vy *= scale;
    }
}

/// Keep the ball on the pitch or inside a net.
///
/// Sidelines always bounce. Past a goal line the ball is only allowed
/// through the goal mouth; anywhere else it bounces off the line. Inside the
/// net it bounces off the side netting and the back plane.
pub fn apply_boundaries(ball: &mut Ball) {
    let r = BALL_RADIUS;

    if ball.y.abs() > HALF_LENGTH && in_goal_mouth(ball.x) {
        let side = GOAL_WIDTH / 2.0 - r;
        if ball.x.abs() > side {
            ball.x = side.copysign(ball.x);
            ball.vx = -ball.vx * WALL_BOUNCE;
        }
        let back = HALF_LENGTH + GOAL_DEPTH - r;
        if ball.y.abs() > back {
            ball.y = back.copysign(ball.y);
            ball.vy = -ball.vy * WALL_BOUNCE;
        }
        return;
    }

    let side = HALF_WIDTH - r;
    if ball.x.abs() > side {
        ball.x = side.copysign(ball.x);
        ball.vx = -ball.vx * WALL_BOUNCE;
    }

    let line = HALF_LENGTH - r;
    if ball.y.abs() > line && !in_goal_mouth(ball.x) {
        ball.y = line.copysign(ball.y);
        ball.vy = -ball.vy * WALL_BOUNCE;
    }
}

/// Strike the ball. Sets velocity from polar components, releases the
/// owner and seeds spin for the aftertouch window.
pub fn kick_ball(ball: &mut Ball, power: f32, angle: f32, loft: f32, spin: (f32, f32)) {
    let ground = loft.cos() * power;
    ball.vx = angle.cos() * ground;
    ball.vy = angle.sin() * ground;
    ball.vz = loft.sin() * power;
    ball.spin_x = spin.0;
    ball.spin_y = spin.1;
    ball.owner_id = None;
}

/// Kick power for a charge ratio in [0, 1] plus momentum from the kicker
pub fn kick_power(charge_ratio: f32, kicker_speed: f32) -> f32 {
    let ratio = charge_ratio.clamp(0.0, 1.0);
    MIN_KICK_POWER + (MAX_KICK_POWER - MIN_KICK_POWER) * ratio + KICK_MOMENTUM_TRANSFER * kicker_speed
}

/// Loft angle for a charge ratio. Short taps stay on the ground.
pub fn kick_loft(charge_ratio: f32) -> f32 {
    let ratio = charge_ratio.clamp(0.0, 1.0);
    if ratio <= LOFT_CHARGE_THRESHOLD {
        return 0.0;
    }
    (ratio - LOFT_CHARGE_THRESHOLD) / (1.0 - LOFT_CHARGE_THRESHOLD) * MAX_LOFT_ANGLE
}

/// Bend or lift a free ball from the kicker's directional input.
///
/// The input is measured against the kick heading. Pulling back (more than
/// 90° off the heading) lifts the ball; any sideways component adds curve
/// perpendicular to the heading, proportional to the sine of the angle.
pub fn apply_aftertouch(ball: &mut Ball, heading: f32, move_x: f32, move_y: f32, dt: f32) {
    if !ball.is_free() || ball.planar_speed() < AFTERTOUCH_MIN_SPEED {
        return;
    }
    let magnitude = (move_x * move_x + move_y * move_y).sqrt().min(1.0);
    if magnitude < f32::EPSILON {
        return;
    }

    let diff = normalize_angle(move_y.atan2(move_x) - heading);

    if diff.abs() > std::f32::consts::FRAC_PI_2 {
        ball.vz = (ball.vz + AFTERTOUCH_LIFT * magnitude * dt).min(AFTERTOUCH_MAX_VZ);
    }

    let curve = diff.sin() * magnitude * AFTERTOUCH_CURVE * dt;
    ball.spin_x += -heading.sin() * curve;
    ball.spin_y += heading.cos() * curve;

    let spin = (ball.spin_x * ball.spin_x + ball.spin_y * ball.spin_y).sqrt();
    if spin > MAX_SPIN {
        let scale = MAX_SPIN / spin;
        ball.spin_x *= scale;
        ball.spin_y *= scale;
    }
}

/// Pin an owned ball to its carrier's dribble offset, kept on the pitch or
/// inside a net
pub fn attach_to_owner(ball: &mut Ball, owner_x: f32, owner_y: f32, facing: f32) {
    ball.x = owner_x + facing.cos() * DRIBBLE_OFFSET;
    ball.y = owner_y + facing.sin() * DRIBBLE_OFFSET;
    ball.z = 0.0;
    ball.vx = 0.0;
    ball.vy = 0.0;
    ball.vz = 0.0;
    ball.spin_x = 0.0;
    ball.spin_y = 0.0;
    apply_boundaries(ball);
}

/// Which team scored, if the ball is in a goal
pub fn check_goal(ball: &Ball) -> Option<Team> {
    if !in_goal_mouth(ball.x) {
        return None;
    }
    if ball.y > HALF_LENGTH {
        Some(Team::Home)
    } else if ball.y < -HALF_LENGTH {
        Some(Team::Away)
    } else {
        None
    }
}

//! Collisions and possession rules

use uuid::Uuid;

use super::ball::{clamp_speed, Ball, BALL_RADIUS};
use super::player::{clamp_player, Player, PlayerState, PLAYER_RADIUS};

/// Velocity restitution between two players
pub const PLAYER_RESTITUTION: f32 = 0.5;
/// Velocity restitution when a free ball hits a player
pub const BALL_PLAYER_RESTITUTION: f32 = 0.6;
/// A ball above this height flies over players
pub const PLAYER_HEIGHT: f32 = 45.0;

pub const POSSESSION_REACH: f32 = PLAYER_RADIUS + BALL_RADIUS + 6.0;
pub const KEEPER_POSSESSION_REACH: f32 = POSSESSION_REACH + 14.0;
pub const DIVE_POSSESSION_REACH: f32 = KEEPER_POSSESSION_REACH + 12.0;
/// A ball higher than this cannot be collected
pub const POSSESSION_MAX_HEIGHT: f32 = 30.0;
/// Seconds of match clock before a kicker may collect its own kick
pub const POSSESSION_COOLDOWN: f32 = 0.3;

/// Tackler-to-ball distance at which the ball is stolen
pub const TACKLE_REACH: f32 = PLAYER_RADIUS + BALL_RADIUS + 10.0;

/// Wrap an angle into [-π, π)
pub fn normalize_angle(angle: f32) -> f32 {
    use std::f32::consts::{PI, TAU};
    (angle + PI).rem_euclid(TAU) - PI
}

/// Check whether two circles overlap
pub fn circles_overlap(x1: f32, y1: f32, radius1: f32, x2: f32, y2: f32, radius2: f32) -> bool {
    let dx = x2 - x1;
    let dy = y2 - y1;
    let combined_radius = radius1 + radius2;
    dx * dx + dy * dy < combined_radius * combined_radius
}

/// Who kicked the ball last and when, on the match clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KickRecord {
    pub kicker_id: Uuid,
    pub at: f64,
    pub heading: f32,
}

impl KickRecord {
    pub fn elapsed(&self, clock: f64) -> f32 {
        (clock - self.at).max(0.0) as f32
    }

    /// The kicker may not collect its own kick during the cooldown
    pub fn blocks_possession(&self, player_id: Uuid, clock: f64) -> bool {
        self.kicker_id == player_id && self.elapsed(clock) < POSSESSION_COOLDOWN
    }

    /// The ball passes through the kicker for the first half of the cooldown
    pub fn exempts_bounce(&self, player_id: Uuid, clock: f64) -> bool {
        self.kicker_id == player_id && self.elapsed(clock) < POSSESSION_COOLDOWN / 2.0
    }
}

/// Push two overlapping players apart and exchange velocity if they are
/// closing on each other. Returns true if they were touching.
pub fn resolve_player_collision(a: &mut Player, b: &mut Player) -> bool {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let dist = (dx * dx + dy * dy).sqrt();
    let min_dist = PLAYER_RADIUS * 2.0;

    if dist >= min_dist {
        return false;
    }

    // Coincident players get pushed apart along x
    let (nx, ny) = if dist < 1e-4 {
        (1.0, 0.0)
    } else {
        (dx / dist, dy / dist)
    };

    let push = (min_dist - dist) / 2.0;
    a.x -= nx * push;
    a.y -= ny * push;
    b.x += nx * push;
    b.y += ny * push;

    let closing = (a.vx - b.vx) * nx + (a.vy - b.vy) * ny;
    if closing > 0.0 {
        // Equal masses
        let impulse = closing * (1.0 + PLAYER_RESTITUTION) / 2.0;
        a.vx -= impulse * nx;
        a.vy -= impulse * ny;
        b.vx += impulse * nx;
        b.vy += impulse * ny;
    }

    true
}

/// Resolve every player pair once, in roster order
pub fn resolve_player_collisions(players: &mut [Player]) {
    for i in 0..players.len() {
        let (head, tail) = players.split_at_mut(i + 1);
        let a = &mut head[i];
        for b in tail.iter_mut() {
            if resolve_player_collision(a, b) {
                clamp_player(a);
                clamp_player(b);
            }
        }
    }
}

/// How far a player can reach to collect a free ball
pub fn possession_reach(player: &Player) -> f32 {
    match (player.is_goalkeeper, player.state) {
        (true, PlayerState::Diving { .. }) => DIVE_POSSESSION_REACH,
        (true, _) => KEEPER_POSSESSION_REACH,
        (false, _) => POSSESSION_REACH,
    }
}

/// Can this player collect the free ball right now
pub fn can_possess(player: &Player, ball: &Ball, clock: f64, last_kick: Option<&KickRecord>) -> bool {
    if matches!(player.state, PlayerState::Recovering { .. }) {
        return false;
    }
    if ball.z >= POSSESSION_MAX_HEIGHT {
        return false;
    }
    if last_kick.is_some_and(|kick| kick.blocks_possession(player.id, clock)) {
        return false;
    }
    let reach = possession_reach(player);
    circles_overlap(player.x, player.y, reach, ball.x, ball.y, 0.0)
}

/// First player in roster order able to collect a free ball. Not nearest-first.
pub fn find_possessor(
    players: &[Player],
    ball: &Ball,
    clock: f64,
    last_kick: Option<&KickRecord>,
) -> Option<usize> {
    if !ball.is_free() {
        return None;
    }
    players
        .iter()
        .position(|p| can_possess(p, ball, clock, last_kick))
}

/// First tackling player close enough to strip the ball from its owner
pub fn find_stealer(players: &[Player], ball: &Ball) -> Option<usize> {
    let owner = ball.owner_id?;
    players.iter().position(|p| {
        p.id != owner
            && matches!(p.state, PlayerState::Tackling { .. })
            && circles_overlap(p.x, p.y, TACKLE_REACH, ball.x, ball.y, 0.0)
    })
}

/// Bounce a free ball off any player it runs into. The last kicker is
/// skipped for half the possession cooldown.
pub fn bounce_ball_off_players(
    ball: &mut Ball,
    players: &[Player],
    clock: f64,
    last_kick: Option<&KickRecord>,
) {
    if !ball.is_free() || ball.z > PLAYER_HEIGHT {
        return;
    }

    let min_dist = PLAYER_RADIUS + BALL_RADIUS;
    for player in players {
        if last_kick.is_some_and(|kick| kick.exempts_bounce(player.id, clock)) {
            continue;
        }

        let dx = ball.x - player.x;
        let dy = ball.y - player.y;
        let dist = (dx * dx + dy * dy).sqrt();
        if dist >= min_dist {
            continue;
        }

        let (nx, ny) = if dist < 1e-4 {
            (player.facing.cos(), player.facing.sin())
        } else {
            (dx / dist, dy / dist)
        };

        ball.x = player.x + nx * min_dist;
        ball.y = player.y + ny * min_dist;

        let closing = (ball.vx - player.vx) * nx + (ball.vy - player.vy) * ny;
        if closing < 0.0 {
            ball.vx -= (1.0 + BALL_PLAYER_RESTITUTION) * closing * nx;
            ball.vy -= (1.0 + BALL_PLAYER_RESTITUTION) * closing * ny;
        }
        ball.last_touch_id = Some(player.id);
    }

    // A moving player adds its own speed to the rebound
    clamp_speed(ball);
}

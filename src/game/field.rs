//! Pitch geometry
//!
//! The pitch is centered on the origin. `x` runs across the pitch with the
//! sidelines at `±HALF_WIDTH`, `y` runs along it with the goal lines at
//! `±HALF_LENGTH`. Home defends the `-y` goal.

use crate::ws::protocol::Team;

pub const FIELD_WIDTH: f32 = 680.0;
pub const FIELD_LENGTH: f32 = 1050.0;
pub const HALF_WIDTH: f32 = FIELD_WIDTH / 2.0;
pub const HALF_LENGTH: f32 = FIELD_LENGTH / 2.0;

/// Width of the goal mouth along x
pub const GOAL_WIDTH: f32 = 140.0;
/// Distance from the goal line to the back of the net
pub const GOAL_DEPTH: f32 = 40.0;

pub const PENALTY_BOX_WIDTH: f32 = 360.0;
pub const PENALTY_BOX_DEPTH: f32 = 150.0;

/// Distance from the center spot at which outfield players line up at kickoff
pub const KICKOFF_LINE_OFFSET: f32 = 90.0;
/// Keeper starting distance from its own goal line
pub const KEEPER_LINE_OFFSET: f32 = 30.0;

/// Axis-aligned rectangle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
}

impl Rect {
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Clamp a point into the rectangle, one axis at a time.
    /// Returns the clamped point and which axes were clamped.
    pub fn clamp(&self, x: f32, y: f32) -> (f32, f32, bool, bool) {
        let cx = x.clamp(self.min_x, self.max_x);
        let cy = y.clamp(self.min_y, self.max_y);
        (cx, cy, cx != x, cy != y)
    }
}

/// Playable area for players
pub fn field_rect() -> Rect {
    Rect {
        min_x: -HALF_WIDTH,
        max_x: HALF_WIDTH,
        min_y: -HALF_LENGTH,
        max_y: HALF_LENGTH,
    }
}

/// y of the goal line a team defends
pub fn own_goal_line(team: Team) -> f32 {
    -team.attack_sign() * HALF_LENGTH
}

/// Penalty box in front of the goal a team defends
pub fn penalty_box(team: Team) -> Rect {
    let line = own_goal_line(team);
    let inner = line + team.attack_sign() * PENALTY_BOX_DEPTH;
    Rect {
        min_x: -PENALTY_BOX_WIDTH / 2.0,
        max_x: PENALTY_BOX_WIDTH / 2.0,
        min_y: line.min(inner),
        max_y: line.max(inner),
    }
}

/// True when x lies strictly inside the goal aperture
pub fn in_goal_mouth(x: f32) -> bool {
    x.abs() < GOAL_WIDTH / 2.0
}

/// Kickoff spot for the `index`-th outfield player of a team with
/// `outfield_count` outfield players. Players spread evenly across the width.
pub fn kickoff_spot(team: Team, index: usize, outfield_count: usize, kicking_off: bool) -> (f32, f32) {
    let sign = team.attack_sign();

    // The kicking side's first player steps up to the ball
    if kicking_off && index == 0 {
        return (0.0, -sign * 25.0);
    }

    let slots = outfield_count.max(1) as f32;
    let lane = (index as f32 + 0.5) / slots;
    let x = -HALF_WIDTH * 0.6 + lane * FIELD_WIDTH * 0.6;
    let y = -sign * (KICKOFF_LINE_OFFSET + 60.0 * (index % 2) as f32);
    (x, y)
}

/// Keeper starting spot
pub fn keeper_spot(team: Team) -> (f32, f32) {
    (0.0, own_goal_line(team) + team.attack_sign() * KEEPER_LINE_OFFSET)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_penalty_boxes_touch_own_goal_lines() {
        let home = penalty_box(Team::Home);
        assert_eq!(home.min_y, -HALF_LENGTH);
        assert_eq!(home.max_y, -HALF_LENGTH + PENALTY_BOX_DEPTH);

        let away = penalty_box(Team::Away);
        assert_eq!(away.max_y, HALF_LENGTH);
        assert_eq!(away.min_y, HALF_LENGTH - PENALTY_BOX_DEPTH);
        assert_eq!(away.min_x, -PENALTY_BOX_WIDTH / 2.0);
    }

    #[test]
    fn test_goal_mouth_is_strict() {
        assert!(in_goal_mouth(0.0));
        assert!(in_goal_mouth(GOAL_WIDTH / 2.0 - 0.01));
        assert!(!in_goal_mouth(GOAL_WIDTH / 2.0));
        assert!(!in_goal_mouth(-GOAL_WIDTH / 2.0 - 1.0));
    }

    #[test]
    fn test_kickoff_spots_stay_in_own_half() {
        for team in [Team::Home, Team::Away] {
            for index in 0..4 {
                let (x, y) = kickoff_spot(team, index, 4, false);
                assert!(x.abs() <= HALF_WIDTH);
                assert!(y * team.attack_sign() < 0.0);
            }
            let (kx, ky) = keeper_spot(team);
            assert_eq!(kx, 0.0);
            assert!(penalty_box(team).contains(kx, ky));
        }
    }

    #[test]
    fn test_rect_clamp_reports_axes() {
        let rect = penalty_box(Team::Home);
        let (x, y, cx, cy) = rect.clamp(500.0, -HALF_LENGTH + 10.0);
        assert_eq!(x, rect.max_x);
        assert_eq!(y, -HALF_LENGTH + 10.0);
        assert!(cx);
        assert!(!cy);
    }
}

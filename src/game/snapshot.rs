//! Snapshot building and payload trimming

use crate::ws::protocol::{BallSnapshot, PlayerSnapshot, ServerMsg};

use super::ball::KICK_CHARGE_TIME;
use super::r#match::MatchState;

/// Builds snapshots for network transmission
pub struct SnapshotBuilder {
    /// Tick counter since last snapshot
    ticks_since_snapshot: u32,
    /// Snapshot interval in ticks
    snapshot_interval: u32,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        Self {
            ticks_since_snapshot: 0,
            snapshot_interval: snapshot_interval.max(1),
        }
    }

    /// Check if it's time to send a snapshot
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.ticks_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    /// Force snapshot on next check (used for important events)
    pub fn force_next(&mut self) {
        self.ticks_since_snapshot = self.snapshot_interval;
    }

    /// Build a `game_state` message from the room state
    pub fn build(&self, state: &MatchState) -> ServerMsg {
        let ball = &state.ball;
        let ball = BallSnapshot {
            x: round1(ball.x),
            y: round1(ball.y),
            z: round1(ball.z),
            vx: ball.vx.round(),
            vy: ball.vy.round(),
            vz: ball.vz.round(),
            owner_id: ball.owner_id,
        };

        let players = state
            .players
            .iter()
            .map(|p| PlayerSnapshot {
                id: p.id,
                name: p.name.clone(),
                team: p.team,
                x: round1(p.x),
                y: round1(p.y),
                vx: p.vx.round(),
                vy: p.vy.round(),
                facing: round2(p.facing),
                state: p.state.activity(),
                has_ball: p.has_ball,
                is_goalkeeper: p.is_goalkeeper,
                charge: p
                    .kick_charge
                    .map(|c| round2((c / KICK_CHARGE_TIME).min(1.0)))
                    .unwrap_or(0.0),
            })
            .collect();

        ServerMsg::GameState {
            tick: state.tick,
            phase: state.phase,
            ball,
            players,
            score: state.score,
            clock: (state.clock() * 100.0).round() / 100.0,
        }
    }
}

fn round1(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}

fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

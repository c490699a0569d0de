//! Time utilities for game simulation

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Tick rate configuration
pub const SIMULATION_TPS: u32 = 60; // 60 ticks per second
pub const SNAPSHOT_TPS: u32 = 60; // one snapshot per tick
pub const TICK_DURATION_NANOS: u64 = 1_000_000_000 / SIMULATION_TPS as u64;

/// Upper bound on steps run back-to-back after a stall. Anything beyond stays
/// in the accumulator for the next frame.
pub const MAX_CATCH_UP_STEPS: u32 = 8;

/// Calculate delta time for physics (in seconds)
pub fn tick_delta() -> f32 {
    1.0 / SIMULATION_TPS as f32
}

/// Duration of one simulation step
pub fn tick_duration() -> Duration {
    Duration::from_nanos(TICK_DURATION_NANOS)
}

/// Fixed-timestep accumulator driven by a monotonic clock.
///
/// Real elapsed time is added to the accumulator and drained in whole steps,
/// so scheduling jitter never changes how many physics steps a span of wall
/// time produces. The leftover fraction carries into the next call.
#[derive(Debug, Clone)]
pub struct FixedStep {
    step: Duration,
    accumulator: Duration,
    last: Instant,
    max_steps: u32,
}

impl FixedStep {
    pub fn new(step: Duration, now: Instant) -> Self {
        Self {
            step,
            accumulator: Duration::ZERO,
            last: now,
            max_steps: MAX_CATCH_UP_STEPS,
        }
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// Feed the current time and get the number of steps to run now
    pub fn advance(&mut self, now: Instant) -> u32 {
        self.accumulator += now.saturating_duration_since(self.last);
        self.last = now;

        let mut steps = 0;
        while self.accumulator >= self.step && steps < self.max_steps {
            self.accumulator -= self.step;
            steps += 1;
        }
        steps
    }

    /// Time left until the next whole step is due
    pub fn until_next(&self) -> Duration {
        self.step.saturating_sub(self.accumulator)
    }

    pub fn pending(&self) -> Duration {
        self.accumulator
    }
}

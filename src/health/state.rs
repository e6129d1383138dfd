//! Target health state machine.
//!
//! # States
//! - Healthy: target receives traffic, polled on `interval`
//! - Unhealthy: target excluded from balancing, polled on `unhealthy_interval`
//!
//! # State Transitions
//! ```text
//! Healthy → Unhealthy: consecutive failures >= fails_threshold
//! Unhealthy → Healthy: consecutive successes >= passes_threshold
//! ```
//!
//! # Design Decisions
//! - Targets start healthy
//! - A failure resets the success streak and vice versa
//! - Counters reset on state transition

/// Liveness of a health-checked target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

impl HealthState {
    pub fn is_up(self) -> bool {
        self == HealthState::Healthy
    }
}

/// Consecutive-outcome counters for one target.
#[derive(Debug, Clone)]
pub struct Hysteresis {
    state: HealthState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    fails_threshold: u32,
    passes_threshold: u32,
}

impl Hysteresis {
    /// Thresholds below 1 are treated as 1.
    pub fn new(fails_threshold: u32, passes_threshold: u32) -> Self {
        Self {
            state: HealthState::Healthy,
            consecutive_failures: 0,
            consecutive_successes: 0,
            fails_threshold: fails_threshold.max(1),
            passes_threshold: passes_threshold.max(1),
        }
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    /// Feed one probe outcome. Returns the new state when a threshold is crossed.
    pub fn record(&mut self, success: bool) -> Option<HealthState> {
        if success {
            self.consecutive_failures = 0;
            if self.state == HealthState::Healthy {
                return None;
            }
            self.consecutive_successes += 1;
            if self.consecutive_successes >= self.passes_threshold {
                self.consecutive_successes = 0;
                self.state = HealthState::Healthy;
                return Some(HealthState::Healthy);
            }
        } else {
            self.consecutive_successes = 0;
            if self.state == HealthState::Unhealthy {
                return None;
            }
            self.consecutive_failures += 1;
            if self.consecutive_failures >= self.fails_threshold {
                self.consecutive_failures = 0;
                self.state = HealthState::Unhealthy;
                return Some(HealthState::Unhealthy);
            }
        }
        None
    }
}

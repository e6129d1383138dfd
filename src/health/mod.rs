//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Per service (active.rs):
//!     healthy pool   ──tick(interval)────────┐
//!     unhealthy pool ──tick(unhealthy_interval)┤
//!                                             → probe.rs (HTTP or TCP)
//!                                             → state.rs hysteresis
//!                                             → on transition: StatusPropagator
//!                                             → re-file target between pools
//!
//! Per configuration generation (engine.rs):
//!     rearm → cancel + join old loops → launch new loops
//! ```
//!
//! # Design Decisions
//! - Targets start healthy, in the healthy pool
//! - State transitions require consecutive successes/failures
//! - Health state is per-target, owned by its service checker

pub mod active;
pub mod engine;
pub mod probe;
pub mod state;

pub use active::{HealthCheckSettings, ServiceHealthChecker};
pub use engine::HealthCheckEngine;
pub use probe::{HttpProbe, HttpProbeOptions, Probe, ProbeError, TcpProbe};
pub use state::{HealthState, Hysteresis};

/// A server probed by a checker.
///
/// `name` is the server URL for HTTP services and the `host:port` address
/// for TCP services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckTarget {
    pub name: String,
    pub weight: u32,
}

impl HealthCheckTarget {
    pub fn new(name: impl Into<String>, weight: u32) -> Self {
        Self {
            name: name.into(),
            weight,
        }
    }
}

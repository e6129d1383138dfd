//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Health checker boundary crossing (target up/down)
//!     → status.rs StatusPropagator::mark_up / mark_down
//!         → Balancer::add_target / remove_target
//!         → ServerStatus "UP"/"DOWN"
//!         → aggregate flipped? notify observers
//!             → ParentLink → parent StatusPropagator (recursively)
//!
//! Proxy engine (external)
//!     → round_robin.rs RoundRobin::next_target
//! ```
//!
//! # Design Decisions
//! - The health engine depends only on the [`Balancer`] capability set
//! - composite.rs fans one service out to several balancer instances
//! - Aggregate liveness bookkeeping is serialized per balancer

pub mod composite;
pub mod round_robin;
pub mod status;

use std::fmt;

use thiserror::Error;

pub use composite::CompositeBalancer;
pub use round_robin::RoundRobin;
pub use status::{ParentLink, StatusObserver, StatusPropagator};

/// Errors returned by balancer mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BalancerError {
    #[error("balancer {balancer}: target {target} has zero weight")]
    ZeroWeight { balancer: String, target: String },

    #[error("balancer {balancer}: target {target} rejected: {reason}")]
    Rejected {
        balancer: String,
        target: String,
        reason: String,
    },
}

/// Mutation capability the health engine needs from a balancer.
pub trait Balancer: Send + Sync + fmt::Debug {
    /// Targets currently eligible for traffic.
    fn list_targets(&self) -> Vec<String>;

    /// Make `target` eligible with the given weight.
    fn add_target(&self, target: &str, weight: u32) -> Result<(), BalancerError>;

    /// Stop sending traffic to `target`.
    fn remove_target(&self, target: &str) -> Result<(), BalancerError>;
}

//! Runtime configuration supervisor and health-check engine of a reverse
//! proxy control plane.

// Configuration and entity state
pub mod config;
pub mod routing;
pub mod runtime;

// Liveness
pub mod health;
pub mod load_balancer;

// Assembly and cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod supervisor;

pub use config::schema::SupervisorConfig;
pub use health::HealthCheckEngine;
pub use lifecycle::Shutdown;
pub use supervisor::{Snapshot, Supervisor};

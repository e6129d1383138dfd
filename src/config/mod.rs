//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! static config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → SupervisorConfig (entry points, providers, observability)
//!
//! dynamic config file (TOML)
//!     → loader.rs (parse)
//!     → Configuration (one generation of routers/services/middlewares)
//!     → Supervisor::apply
//!
//! On change:
//!     watcher.rs detects modification
//!     → loader.rs parses the new generation
//!     → sent over a channel to the supervisor
//! ```
//!
//! # Design Decisions
//! - Static config is rejected as a whole when invalid
//! - Dynamic config is never rejected for semantic problems; they become
//!   record errors so one broken entity does not block the rest
//! - All fields have defaults to allow minimal configs

pub mod dynamic;
pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use dynamic::Configuration;
pub use schema::{EntryPointConfig, ObservabilityConfig, Protocol, SupervisorConfig};

//! Runtime entity store.
//!
//! # Data Flow
//! ```text
//! Configuration (one generation)
//!     → store.rs (RuntimeConfiguration::load, all records enabled)
//!     → routing::used_by / routing::graph / routing::entry_points
//!           mutate records in place (errors, status, used_by, using)
//!     → published read-only to inspection consumers
//!
//! Health checker
//!     → records.rs ServerStatus (per-service, RwLock guarded)
//! ```
//!
//! # Design Decisions
//! - Records are rebuilt from scratch every generation
//! - Errors accumulate on records; nothing here returns `Err`
//! - Maps are ordered so every pass over them is deterministic

pub mod naming;
pub mod records;
pub mod status;
pub mod store;

pub use records::{
    MiddlewareRecord, RouterDefinition, RouterRecord, ServerState, ServerStatus, ServiceRecord,
};
pub use status::{RecordState, Status, StatusRecord};
pub use store::RuntimeConfiguration;

//! Routing subsystem: dependency resolution and entry-point binding.
//!
//! # Data Flow
//! ```text
//! RuntimeConfiguration (fresh records)
//!     → used_by.rs (service/middleware back-references)
//!     → graph.rs (HTTP parent/child links, orphans, cycles)
//!     → entry_points.rs (routers per entry point, `using` lists)
//!     → records frozen and published
//! ```
//!
//! # Design Decisions
//! - Every pass is total over the router set; one bad router never stops
//!   the others from being processed
//! - Problems become record errors, severity decides disabled vs warning
//! - Deterministic: same input always produces the same records

pub mod entry_points;
pub mod graph;
pub mod used_by;

pub use entry_points::{
    routers_by_entry_points, tcp_routers_by_entry_points, udp_routers_by_entry_points,
    RoutersByEntryPoint,
};
pub use graph::resolve_router_graph;
pub use used_by::populate_used_by;

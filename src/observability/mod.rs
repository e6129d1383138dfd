//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (structured fields: service, target, router)
//!     → metrics.rs (gauges and counters)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout, pretty or JSON)
//!     → Prometheus scrape endpoint
//! ```

pub mod logging;
pub mod metrics;

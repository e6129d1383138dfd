//! Supervisor: one configuration generation end to end.
//!
//! # Data Flow
//! ```text
//! Configuration (provider)
//!     → runtime::RuntimeConfiguration::load
//!     → routing::populate_used_by
//!     → routing::resolve_router_graph
//!     → routing::*_by_entry_points (HTTP, HTTPS, TCP, UDP)
//!     → balancers.rs (balancer hierarchy, parent links)
//!     → checks.rs (one checker per health-checked service)
//!     → health::HealthCheckEngine::rearm
//!     → Snapshot published via ArcSwap
//! ```
//!
//! # Design Decisions
//! - Generations are applied one at a time
//! - Record maps are complete before the snapshot is published; afterwards
//!   only per-server status changes
//! - One misconfigured entity never blocks the rest of the generation

pub mod balancers;
pub mod checks;

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::Mutex;

use crate::config::dynamic::Configuration;
use crate::config::schema::{Protocol, SupervisorConfig};
use crate::health::HealthCheckEngine;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::routing::{
    populate_used_by, resolve_router_graph, routers_by_entry_points, tcp_routers_by_entry_points,
    udp_routers_by_entry_points, RoutersByEntryPoint,
};
use crate::runtime::store::RuntimeConfiguration;

pub use balancers::{ServiceBalancer, ServiceBalancers};

/// Immutable view of one applied generation.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub runtime: RuntimeConfiguration,
    /// Non-TLS HTTP routers by entry point.
    pub http_routers: RoutersByEntryPoint,
    /// TLS HTTP routers by entry point.
    pub https_routers: RoutersByEntryPoint,
    pub tcp_routers: RoutersByEntryPoint,
    pub udp_routers: RoutersByEntryPoint,
    pub balancers: ServiceBalancers,
}

/// Owner of the current generation and its health checks.
#[derive(Debug)]
pub struct Supervisor {
    tcp_entry_points: Vec<String>,
    udp_entry_points: Vec<String>,
    snapshot: ArcSwap<Snapshot>,
    engine: HealthCheckEngine,
    apply_lock: Mutex<()>,
}

impl Supervisor {
    pub fn new(config: &SupervisorConfig, shutdown: &Shutdown) -> Self {
        Self {
            tcp_entry_points: config.entry_point_names(Protocol::Tcp),
            udp_entry_points: config.entry_point_names(Protocol::Udp),
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
            engine: HealthCheckEngine::new(shutdown.subscribe()),
            apply_lock: Mutex::new(()),
        }
    }

    /// Apply one configuration generation and publish its snapshot.
    pub async fn apply(&self, configuration: Configuration) -> Arc<Snapshot> {
        let _guard = self.apply_lock.lock().await;

        let mut runtime = RuntimeConfiguration::load(configuration);
        populate_used_by(&mut runtime);
        resolve_router_graph(&mut runtime.routers);

        let http_routers = routers_by_entry_points(&mut runtime.routers, &self.tcp_entry_points, false);
        let https_routers = routers_by_entry_points(&mut runtime.routers, &self.tcp_entry_points, true);
        let tcp_routers = tcp_routers_by_entry_points(&mut runtime.tcp_routers, &self.tcp_entry_points);
        let udp_routers = udp_routers_by_entry_points(&mut runtime.udp_routers, &self.udp_entry_points);

        let balancers = ServiceBalancers {
            http: balancers::build_service_balancers(&mut runtime.services, &runtime.routers),
            tcp: balancers::build_service_balancers(&mut runtime.tcp_services, &runtime.tcp_routers),
        };

        let mut checkers = checks::http_checkers(&mut runtime.services, &balancers.http);
        checkers.extend(checks::tcp_checkers(&runtime.tcp_services, &balancers.tcp));
        self.engine.rearm(checkers).await;

        tracing::info!(
            routers = runtime.routers.len(),
            services = runtime.services.len(),
            tcp_routers = runtime.tcp_routers.len(),
            tcp_services = runtime.tcp_services.len(),
            udp_routers = runtime.udp_routers.len(),
            health_checks = self.engine.services().len(),
            "Configuration generation applied"
        );

        let snapshot = Arc::new(Snapshot {
            runtime,
            http_routers,
            https_routers,
            tcp_routers,
            udp_routers,
            balancers,
        });
        self.snapshot.store(snapshot.clone());
        metrics::record_generation();
        snapshot
    }

    /// The most recently published generation.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.load_full()
    }

    pub fn engine(&self) -> &HealthCheckEngine {
        &self.engine
    }

    /// Stop all health checks.
    pub async fn stop(&self) {
        self.engine.stop().await;
    }
}

//! Dynamic configuration schema.
//!
//! One value of [`Configuration`] is one generation of routing entities as
//! produced by a provider. Every section is optional; an absent section means
//! "no entities of that protocol", never an error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One generation of dynamic configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Configuration {
    pub http: Option<HttpConfiguration>,
    pub tcp: Option<TcpConfiguration>,
    pub udp: Option<UdpConfiguration>,
}

/// HTTP routers, services and middlewares.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfiguration {
    pub routers: BTreeMap<String, HttpRouter>,
    pub services: BTreeMap<String, HttpService>,
    pub middlewares: BTreeMap<String, Middleware>,
}

/// An HTTP router definition.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpRouter {
    /// Entry points this router listens on.
    pub entry_points: Vec<String>,

    /// Matching rule, opaque to the supervisor.
    pub rule: String,

    /// Target service name, qualified or not.
    pub service: String,

    /// Middleware names, applied in order.
    pub middlewares: Vec<String>,

    /// Parent routers this router is nested under.
    pub parent_refs: Vec<String>,

    pub priority: i64,

    /// Presence of this block puts the router in the TLS partition.
    pub tls: Option<RouterTls>,
}

/// Router TLS block. Certificate handling lives elsewhere; only presence matters here.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RouterTls {
    pub options: Option<String>,
    pub cert_resolver: Option<String>,
    pub passthrough: bool,
}

/// An HTTP service definition.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpService {
    pub load_balancer: Option<ServersLoadBalancer>,
    pub weighted: Option<WeightedService>,
}

/// A balancer over concrete HTTP servers.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ServersLoadBalancer {
    pub servers: Vec<Server>,
    pub health_check: Option<ServerHealthCheck>,
}

/// An HTTP backend server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Server {
    pub url: String,

    #[serde(default = "default_weight")]
    pub weight: u32,
}

/// Active HTTP health check settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerHealthCheck {
    /// Overrides the server URL scheme.
    pub scheme: Option<String>,

    /// Request path, optionally with a query string.
    pub path: String,

    /// Request method (default GET).
    pub method: Option<String>,

    /// Expected response status. When unset any 2xx or 3xx passes.
    pub status: Option<u16>,

    /// Overrides the server URL port.
    pub port: Option<u16>,

    /// Value of the Host header.
    pub hostname: Option<String>,

    pub headers: BTreeMap<String, String>,

    pub follow_redirects: bool,

    #[serde(flatten)]
    pub timing: HealthCheckTiming,
}

impl Default for ServerHealthCheck {
    fn default() -> Self {
        Self {
            scheme: None,
            path: "/".to_string(),
            method: None,
            status: None,
            port: None,
            hostname: None,
            headers: BTreeMap::new(),
            follow_redirects: true,
            timing: HealthCheckTiming::default(),
        }
    }
}

/// Cadence and hysteresis settings shared by HTTP and TCP health checks.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckTiming {
    /// Polling interval for healthy targets in milliseconds.
    pub interval_ms: Option<u64>,

    /// Polling interval for unhealthy targets in milliseconds (defaults to `interval_ms`).
    pub unhealthy_interval_ms: Option<u64>,

    /// Probe timeout in milliseconds.
    pub timeout_ms: Option<u64>,

    /// Consecutive failures before a healthy target goes down.
    pub fails_threshold: Option<u32>,

    /// Consecutive successes before an unhealthy target comes back up.
    pub passes_threshold: Option<u32>,
}

/// A balancer over other services.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct WeightedService {
    pub services: Vec<WeightedChild>,

    /// When present, children report their aggregate liveness to this service.
    pub health_check: Option<PropagateHealth>,
}

/// A child entry of a weighted service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WeightedChild {
    pub name: String,

    #[serde(default = "default_weight")]
    pub weight: u32,
}

/// Marker block enabling upward health propagation.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PropagateHealth {}

/// A middleware definition. Options are opaque to the supervisor.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Middleware {
    #[serde(flatten)]
    pub options: BTreeMap<String, serde_json::Value>,
}

/// TCP routers, services and middlewares.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TcpConfiguration {
    pub routers: BTreeMap<String, TcpRouter>,
    pub services: BTreeMap<String, TcpService>,
    pub middlewares: BTreeMap<String, Middleware>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TcpRouter {
    pub entry_points: Vec<String>,
    pub rule: String,
    pub service: String,
    pub middlewares: Vec<String>,
    pub priority: i64,
    pub tls: Option<RouterTls>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TcpService {
    pub load_balancer: Option<TcpServersLoadBalancer>,
    pub weighted: Option<WeightedService>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TcpServersLoadBalancer {
    pub servers: Vec<TcpServer>,
    pub health_check: Option<TcpServerHealthCheck>,
}

/// A TCP (or UDP) backend server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TcpServer {
    pub address: String,

    #[serde(default = "default_weight")]
    pub weight: u32,
}

/// Active TCP health check settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TcpServerHealthCheck {
    /// Overrides the server address port.
    pub port: Option<u16>,

    /// Payload written after connecting.
    pub send: Option<String>,

    /// Exact bytes expected back.
    pub expect: Option<String>,

    #[serde(flatten)]
    pub timing: HealthCheckTiming,
}

/// UDP routers and services. UDP has no middlewares.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct UdpConfiguration {
    pub routers: BTreeMap<String, UdpRouter>,
    pub services: BTreeMap<String, UdpService>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct UdpRouter {
    /// Empty means "every UDP entry point".
    pub entry_points: Vec<String>,
    pub service: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct UdpService {
    pub load_balancer: Option<UdpServersLoadBalancer>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct UdpServersLoadBalancer {
    pub servers: Vec<TcpServer>,
}

fn default_weight() -> u32 {
    1
}

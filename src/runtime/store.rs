//! The entity store for one configuration generation.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::dynamic::{
    Configuration, HttpRouter, HttpService, Middleware, TcpRouter, TcpService, UdpRouter,
    UdpService,
};
use crate::runtime::records::{MiddlewareRecord, RouterRecord, ServiceRecord};

pub type HttpRouters = BTreeMap<String, RouterRecord<HttpRouter>>;
pub type HttpServices = BTreeMap<String, ServiceRecord<HttpService>>;
pub type HttpMiddlewares = BTreeMap<String, MiddlewareRecord<Middleware>>;
pub type TcpRouters = BTreeMap<String, RouterRecord<TcpRouter>>;
pub type TcpServices = BTreeMap<String, ServiceRecord<TcpService>>;
pub type TcpMiddlewares = BTreeMap<String, MiddlewareRecord<Middleware>>;
pub type UdpRouters = BTreeMap<String, RouterRecord<UdpRouter>>;
pub type UdpServices = BTreeMap<String, ServiceRecord<UdpService>>;

/// Every record of one generation, keyed by qualified name.
///
/// Absent configuration sections yield empty maps.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RuntimeConfiguration {
    pub routers: HttpRouters,
    pub services: HttpServices,
    pub middlewares: HttpMiddlewares,
    pub tcp_routers: TcpRouters,
    pub tcp_services: TcpServices,
    pub tcp_middlewares: TcpMiddlewares,
    pub udp_routers: UdpRouters,
    pub udp_services: UdpServices,
}

impl RuntimeConfiguration {
    /// Build fresh records, all enabled, from one generation of configuration.
    pub fn load(configuration: Configuration) -> Self {
        let mut runtime = Self::default();

        if let Some(http) = configuration.http {
            runtime.routers = wrap(http.routers, RouterRecord::new);
            runtime.services = wrap(http.services, ServiceRecord::new);
            runtime.middlewares = wrap(http.middlewares, MiddlewareRecord::new);
        }

        if let Some(tcp) = configuration.tcp {
            runtime.tcp_routers = wrap(tcp.routers, RouterRecord::new);
            runtime.tcp_services = wrap(tcp.services, ServiceRecord::new);
            runtime.tcp_middlewares = wrap(tcp.middlewares, MiddlewareRecord::new);
        }

        if let Some(udp) = configuration.udp {
            runtime.udp_routers = wrap(udp.routers, RouterRecord::new);
            runtime.udp_services = wrap(udp.services, ServiceRecord::new);
        }

        runtime
    }
}

fn wrap<D, R>(definitions: BTreeMap<String, D>, record: fn(D) -> R) -> BTreeMap<String, R> {
    definitions
        .into_iter()
        .map(|(name, definition)| (name, record(definition)))
        .collect()
}

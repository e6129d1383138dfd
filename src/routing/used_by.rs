//! `used_by` back-references from services and middlewares to routers.
//!
//! A reference to a service or middleware that does not exist is ignored:
//! it may belong to a provider whose generation has not arrived yet.

use std::collections::BTreeMap;

use crate::runtime::naming::resolve_reference;
use crate::runtime::records::{MiddlewareRecord, RouterDefinition, RouterRecord, ServiceRecord};
use crate::runtime::store::RuntimeConfiguration;

/// Recompute every `used_by` list of the generation.
pub fn populate_used_by(runtime: &mut RuntimeConfiguration) {
    link_services(&runtime.routers, &mut runtime.services);
    link_middlewares(&runtime.routers, &mut runtime.middlewares);

    link_services(&runtime.tcp_routers, &mut runtime.tcp_services);
    link_middlewares(&runtime.tcp_routers, &mut runtime.tcp_middlewares);

    link_services(&runtime.udp_routers, &mut runtime.udp_services);
}

fn link_services<R: RouterDefinition, S>(
    routers: &BTreeMap<String, RouterRecord<R>>,
    services: &mut BTreeMap<String, ServiceRecord<S>>,
) {
    for service in services.values_mut() {
        service.used_by.clear();
    }

    for (router_name, router) in routers {
        let service_name = router.definition.service();
        if service_name.is_empty() {
            continue;
        }
        let qualified = resolve_reference(router_name, service_name);
        if let Some(service) = services.get_mut(&qualified) {
            service.used_by.push(router_name.clone());
        }
    }

    for service in services.values_mut() {
        sort_unique(&mut service.used_by);
    }
}

fn link_middlewares<R: RouterDefinition, M>(
    routers: &BTreeMap<String, RouterRecord<R>>,
    middlewares: &mut BTreeMap<String, MiddlewareRecord<M>>,
) {
    for middleware in middlewares.values_mut() {
        middleware.used_by.clear();
    }

    for (router_name, router) in routers {
        for middleware_name in router.definition.middlewares() {
            let qualified = resolve_reference(router_name, middleware_name);
            if let Some(middleware) = middlewares.get_mut(&qualified) {
                middleware.used_by.push(router_name.clone());
            }
        }
    }

    for middleware in middlewares.values_mut() {
        sort_unique(&mut middleware.used_by);
    }
}

pub(crate) fn sort_unique(names: &mut Vec<String>) {
    names.sort();
    names.dedup();
}

//! Balancer hierarchy of one configuration generation.
//!
//! # Data Flow
//! ```text
//! load_balancer service:
//!     routers using it → their entry points
//!     → one RoundRobin per entry point (or one default instance)
//!     → CompositeBalancer → StatusPropagator(serverStatus)
//!
//! weighted service:
//!     children (resolved names) → RoundRobin → StatusPropagator
//!     health_check block present:
//!         child propagator → ParentLink → parent propagator
//! ```
//!
//! # Design Decisions
//! - Every server and child starts in rotation and `UP`
//! - Problems are attached to the service record, never returned

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::config::dynamic::{HttpService, TcpService, WeightedService};
use crate::health::HealthCheckTarget;
use crate::load_balancer::{Balancer, CompositeBalancer, ParentLink, RoundRobin, StatusPropagator};
use crate::routing::used_by::sort_unique;
use crate::runtime::naming::resolve_reference;
use crate::runtime::records::{RouterRecord, ServerState, ServiceRecord};
use crate::runtime::status::StatusRecord;

/// Instance key of a service no router reaches.
pub const DEFAULT_INSTANCE: &str = "default";

/// What the balancer builder needs to know about a service definition.
pub trait ServiceDefinition {
    /// `(target, weight)` pairs of a servers load balancer, `None` otherwise.
    fn servers(&self) -> Option<Vec<(String, u32)>>;

    fn weighted(&self) -> Option<&WeightedService>;

    /// Whether the service reports its own liveness changes.
    fn health_check_enabled(&self) -> bool;
}

impl ServiceDefinition for HttpService {
    fn servers(&self) -> Option<Vec<(String, u32)>> {
        self.load_balancer
            .as_ref()
            .map(|lb| lb.servers.iter().map(|s| (s.url.clone(), s.weight)).collect())
    }

    fn weighted(&self) -> Option<&WeightedService> {
        self.weighted.as_ref()
    }

    fn health_check_enabled(&self) -> bool {
        match (&self.load_balancer, &self.weighted) {
            (Some(lb), _) => lb.health_check.is_some(),
            (None, Some(weighted)) => weighted.health_check.is_some(),
            (None, None) => false,
        }
    }
}

impl ServiceDefinition for TcpService {
    fn servers(&self) -> Option<Vec<(String, u32)>> {
        self.load_balancer.as_ref().map(|lb| {
            lb.servers
                .iter()
                .map(|s| (s.address.clone(), s.weight))
                .collect()
        })
    }

    fn weighted(&self) -> Option<&WeightedService> {
        self.weighted.as_ref()
    }

    fn health_check_enabled(&self) -> bool {
        match (&self.load_balancer, &self.weighted) {
            (Some(lb), _) => lb.health_check.is_some(),
            (None, Some(weighted)) => weighted.health_check.is_some(),
            (None, None) => false,
        }
    }
}

/// Balancer handles of one service.
#[derive(Debug, Clone)]
pub struct ServiceBalancer {
    /// Balancer the propagator mutates.
    pub balancer: Arc<dyn Balancer>,
    pub propagator: Arc<StatusPropagator>,
    /// Selection instances keyed by entry point.
    pub instances: BTreeMap<String, Arc<RoundRobin>>,
    /// Targets accepted into the balancer.
    pub targets: Vec<HealthCheckTarget>,
}

impl ServiceBalancer {
    pub fn instance(&self, entry_point: &str) -> Option<&Arc<RoundRobin>> {
        self.instances.get(entry_point)
    }
}

/// Balancers of every HTTP and TCP service of a generation.
#[derive(Debug, Clone, Default)]
pub struct ServiceBalancers {
    pub http: BTreeMap<String, ServiceBalancer>,
    pub tcp: BTreeMap<String, ServiceBalancer>,
}

/// Build the balancer hierarchy of one protocol.
pub fn build_service_balancers<S, R>(
    services: &mut BTreeMap<String, ServiceRecord<S>>,
    routers: &BTreeMap<String, RouterRecord<R>>,
) -> BTreeMap<String, ServiceBalancer>
where
    S: ServiceDefinition,
{
    let known: BTreeSet<String> = services.keys().cloned().collect();
    let mut built = BTreeMap::new();

    for (name, record) in services.iter_mut() {
        let servers = record.definition.servers();
        let weighted = record.definition.weighted().cloned();
        match (servers, weighted) {
            (Some(servers), None) => {
                let entry_points = reachable_entry_points(&record.used_by, routers);
                built.insert(
                    name.clone(),
                    servers_balancer(name, record, servers, entry_points),
                );
            }
            (None, Some(weighted)) => {
                built.insert(
                    name.clone(),
                    weighted_balancer(name, record, &weighted, &known),
                );
            }
            (Some(_), Some(_)) => {
                record.add_error("a service cannot define both load_balancer and weighted", true);
            }
            (None, None) => {
                record.add_error("a service must define either load_balancer or weighted", true);
            }
        }
    }

    link_parents(services, &built);
    built
}

fn reachable_entry_points<R>(
    used_by: &[String],
    routers: &BTreeMap<String, RouterRecord<R>>,
) -> Vec<String> {
    let mut entry_points: Vec<String> = used_by
        .iter()
        .filter_map(|router| routers.get(router))
        .flat_map(|router| router.using.iter().cloned())
        .collect();
    sort_unique(&mut entry_points);
    entry_points
}

fn servers_balancer<S>(
    name: &str,
    record: &mut ServiceRecord<S>,
    servers: Vec<(String, u32)>,
    entry_points: Vec<String>,
) -> ServiceBalancer {
    let keys = if entry_points.is_empty() {
        vec![DEFAULT_INSTANCE.to_string()]
    } else {
        entry_points
    };
    let instances: BTreeMap<String, Arc<RoundRobin>> = keys
        .into_iter()
        .map(|key| {
            let instance = Arc::new(RoundRobin::new(format!("{key}/{name}")));
            (key, instance)
        })
        .collect();

    let composite = CompositeBalancer::new(
        instances
            .values()
            .map(|instance| instance.clone() as Arc<dyn Balancer>)
            .collect(),
    );

    let mut targets: Vec<HealthCheckTarget> = Vec::new();
    for (target, weight) in servers {
        if targets.iter().any(|t| t.name == target) {
            continue;
        }
        if let Err(e) = composite.add_target(&target, weight) {
            record.add_error(format!("server {target} ignored: {e}"), false);
            continue;
        }
        record.server_status.set(&target, ServerState::Up);
        targets.push(HealthCheckTarget::new(target, weight));
    }

    let balancer: Arc<dyn Balancer> = Arc::new(composite);
    let propagator = Arc::new(StatusPropagator::new(
        name,
        balancer.clone(),
        record.server_status.clone(),
    ));

    ServiceBalancer {
        balancer,
        propagator,
        instances,
        targets,
    }
}

fn weighted_balancer<S>(
    name: &str,
    record: &mut ServiceRecord<S>,
    weighted: &WeightedService,
    known: &BTreeSet<String>,
) -> ServiceBalancer {
    let instance = Arc::new(RoundRobin::new(name));

    let mut targets: Vec<HealthCheckTarget> = Vec::new();
    for child in &weighted.services {
        let child_name = resolve_reference(name, &child.name);
        if !known.contains(&child_name) {
            record.add_error(format!("service \"{child_name}\" does not exist"), true);
            continue;
        }
        if targets.iter().any(|t| t.name == child_name) {
            record.add_error(format!("child service {child_name} listed more than once"), false);
            continue;
        }
        if let Err(e) = instance.add_target(&child_name, child.weight) {
            record.add_error(format!("child service {child_name} ignored: {e}"), false);
            continue;
        }
        record.server_status.set(&child_name, ServerState::Up);
        targets.push(HealthCheckTarget::new(child_name, child.weight));
    }

    let balancer: Arc<dyn Balancer> = instance.clone();
    let propagator = Arc::new(StatusPropagator::new(
        name,
        balancer.clone(),
        record.server_status.clone(),
    ));

    ServiceBalancer {
        balancer,
        propagator,
        instances: BTreeMap::from([(DEFAULT_INSTANCE.to_string(), instance)]),
        targets,
    }
}

/// Register parent links for weighted services that propagate health.
fn link_parents<S: ServiceDefinition>(
    services: &mut BTreeMap<String, ServiceRecord<S>>,
    built: &BTreeMap<String, ServiceBalancer>,
) {
    let graph: BTreeMap<String, Vec<String>> = services
        .iter()
        .filter_map(|(name, record)| {
            let weighted = record.definition.weighted()?;
            let children = weighted
                .services
                .iter()
                .map(|child| resolve_reference(name, &child.name))
                .collect();
            Some((name.clone(), children))
        })
        .collect();

    let parents: Vec<String> = services
        .iter()
        .filter(|(name, record)| {
            built.contains_key(*name)
                && record
                    .definition
                    .weighted()
                    .is_some_and(|weighted| weighted.health_check.is_some())
        })
        .map(|(name, _)| name.clone())
        .collect();

    for parent in parents {
        let Some(parent_balancer) = built.get(&parent) else {
            continue;
        };
        let mut errors = Vec::new();

        for child in &parent_balancer.targets {
            if let Some(path) = find_path(&graph, &child.name, &parent) {
                errors.push(format!(
                    "service reference cycle: {parent} -> {}",
                    path.join(" -> ")
                ));
                continue;
            }
            let supported = services
                .get(&child.name)
                .is_some_and(|record| record.definition.health_check_enabled());
            let Some(child_balancer) = built.get(&child.name).filter(|_| supported) else {
                errors.push(format!(
                    "child service \"{}\" does not have health check enabled",
                    child.name
                ));
                continue;
            };

            child_balancer
                .propagator
                .register_observer(Arc::new(ParentLink::new(
                    parent_balancer.propagator.clone(),
                    child.name.clone(),
                    child.weight,
                )));
            tracing::debug!(parent = %parent, child = %child.name, "Linked child service health");
        }

        if let Some(record) = services.get_mut(&parent) {
            for error in errors {
                record.add_error(error, true);
            }
        }
    }
}

/// Path `from -> ... -> to` along weighted references, if any.
fn find_path(graph: &BTreeMap<String, Vec<String>>, from: &str, to: &str) -> Option<Vec<String>> {
    fn visit(
        graph: &BTreeMap<String, Vec<String>>,
        node: &str,
        to: &str,
        path: &mut Vec<String>,
        seen: &mut BTreeSet<String>,
    ) -> bool {
        path.push(node.to_string());
        if node == to {
            return true;
        }
        if seen.insert(node.to_string()) {
            for next in graph.get(node).into_iter().flatten() {
                if visit(graph, next, to, path, seen) {
                    return true;
                }
            }
        }
        path.pop();
        false
    }

    let mut path = Vec::new();
    let mut seen = BTreeSet::new();
    visit(graph, from, to, &mut path, &mut seen).then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::dynamic::{
        HttpRouter, PropagateHealth, Server, ServerHealthCheck, ServersLoadBalancer, WeightedChild,
    };
    use crate::load_balancer::{BalancerError, StatusObserver};
    use crate::runtime::status::Status;

    fn servers_service(urls: &[&str], health_check: bool) -> ServiceRecord<HttpService> {
        ServiceRecord::new(HttpService {
            load_balancer: Some(ServersLoadBalancer {
                servers: urls
                    .iter()
                    .map(|url| Server {
                        url: url.to_string(),
                        weight: 1,
                    })
                    .collect(),
                health_check: health_check.then(ServerHealthCheck::default),
            }),
            weighted: None,
        })
    }

    fn weighted_service(children: &[&str], propagate: bool) -> ServiceRecord<HttpService> {
        ServiceRecord::new(HttpService {
            load_balancer: None,
            weighted: Some(WeightedService {
                services: children
                    .iter()
                    .map(|name| WeightedChild {
                        name: name.to_string(),
                        weight: 1,
                    })
                    .collect(),
                health_check: propagate.then_some(PropagateHealth {}),
            }),
        })
    }

    fn router_on(entry_points: &[&str]) -> RouterRecord<HttpRouter> {
        let mut router = RouterRecord::new(HttpRouter::default());
        router.using = entry_points.iter().map(|ep| ep.to_string()).collect();
        router
    }

    #[test]
    fn test_one_instance_per_entry_point() {
        let mut services = BTreeMap::from([(
            "api".to_string(),
            servers_service(&["http://a", "http://b"], false),
        )]);
        services.get_mut("api").unwrap().used_by = vec!["r1".into(), "r2".into()];
        let routers = BTreeMap::from([
            ("r1".to_string(), router_on(&["web"])),
            ("r2".to_string(), router_on(&["web", "websecure"])),
        ]);

        let built = build_service_balancers(&mut services, &routers);
        let api = &built["api"];
        assert_eq!(
            api.instances.keys().collect::<Vec<_>>(),
            vec!["web", "websecure"]
        );
        assert_eq!(
            api.instance("websecure").unwrap().list_targets(),
            vec!["http://a", "http://b"]
        );
        assert_eq!(
            services["api"].server_status.get("http://a"),
            Some(ServerState::Up)
        );
    }

    #[test]
    fn test_unreachable_service_gets_default_instance() {
        let mut services =
            BTreeMap::from([("api".to_string(), servers_service(&["http://a"], false))]);
        let built = build_service_balancers::<_, HttpRouter>(&mut services, &BTreeMap::new());
        assert!(built["api"].instance(DEFAULT_INSTANCE).is_some());
    }

    #[test]
    fn test_zero_weight_server_is_skipped() {
        let mut record = servers_service(&["http://a"], false);
        record
            .definition
            .load_balancer
            .as_mut()
            .unwrap()
            .servers
            .push(Server {
                url: "http://b".into(),
                weight: 0,
            });
        let mut services = BTreeMap::from([("api".to_string(), record)]);

        let built = build_service_balancers::<_, HttpRouter>(&mut services, &BTreeMap::new());
        assert_eq!(built["api"].balancer.list_targets(), vec!["http://a"]);
        assert_eq!(services["api"].status(), Status::Warning);
    }

    #[test]
    fn test_child_without_health_check_disables_parent() {
        let mut services = BTreeMap::from([
            ("parent".to_string(), weighted_service(&["child"], true)),
            ("child".to_string(), servers_service(&["http://a"], false)),
        ]);
        build_service_balancers::<_, HttpRouter>(&mut services, &BTreeMap::new());
        assert_eq!(services["parent"].status(), Status::Disabled);
        assert!(services["parent"].errors()[0].contains("does not have health check enabled"));
    }

    #[test]
    fn test_weighted_cycle_disables_parent() {
        let mut services = BTreeMap::from([
            ("a".to_string(), weighted_service(&["b"], true)),
            ("b".to_string(), weighted_service(&["a"], true)),
        ]);
        build_service_balancers::<_, HttpRouter>(&mut services, &BTreeMap::new());
        assert_eq!(services["a"].status(), Status::Disabled);
        assert_eq!(
            services["a"].errors(),
            &["service reference cycle: a -> b -> a".to_string()]
        );
        assert_eq!(services["b"].status(), Status::Disabled);
    }

    #[test]
    fn test_unknown_child_is_critical() {
        let mut services =
            BTreeMap::from([("parent".to_string(), weighted_service(&["ghost"], false))]);
        let built = build_service_balancers::<_, HttpRouter>(&mut services, &BTreeMap::new());
        assert_eq!(services["parent"].status(), Status::Disabled);
        assert!(built["parent"].targets.is_empty());
    }

    #[test]
    fn test_child_liveness_reaches_parent() {
        let mut services = BTreeMap::from([
            ("parent".to_string(), weighted_service(&["child"], true)),
            ("child".to_string(), servers_service(&["http://a"], true)),
        ]);
        let built = build_service_balancers::<_, HttpRouter>(&mut services, &BTreeMap::new());
        assert_eq!(services["parent"].status(), Status::Enabled);

        built["child"].propagator.mark_down("http://a").unwrap();
        assert!(built["parent"].balancer.list_targets().is_empty());
        assert_eq!(
            services["parent"].server_status.get("child"),
            Some(ServerState::Down)
        );

        built["child"].propagator.mark_up("http://a", 1).unwrap();
        assert_eq!(built["parent"].balancer.list_targets(), vec!["child"]);
    }

    #[derive(Default)]
    struct Recorder {
        events: std::sync::Mutex<Vec<bool>>,
    }

    impl StatusObserver for Recorder {
        fn status_changed(&self, up: bool) -> Result<(), BalancerError> {
            self.events.lock().unwrap().push(up);
            Ok(())
        }
    }

    #[test]
    fn test_repeated_child_notifies_parent_once() {
        let mut services = BTreeMap::from([
            ("parent".to_string(), weighted_service(&["child", "child"], true)),
            ("child".to_string(), servers_service(&["http://a"], true)),
        ]);
        let built = build_service_balancers::<_, HttpRouter>(&mut services, &BTreeMap::new());
        assert_eq!(services["parent"].status(), Status::Warning);
        assert_eq!(built["parent"].targets.len(), 1);

        let upstream = Arc::new(Recorder::default());
        built["parent"].propagator.register_observer(upstream.clone());

        built["child"].propagator.mark_down("http://a").unwrap();
        assert_eq!(*upstream.events.lock().unwrap(), vec![false]);

        built["child"].propagator.mark_up("http://a", 1).unwrap();
        assert_eq!(*upstream.events.lock().unwrap(), vec![false, true]);
    }
}

//! Entry-point binding.
//!
//! Partitions routers by the entry points they can actually be reached from.
//!
//! # Design Decisions
//! - An undeclared entry point is a warning on the router, not a failure
//! - A router left with no valid entry point is disabled
//! - The TLS filter is a partition: routers of the other kind are skipped
//!   silently and handled by the complementary call
//! - UDP routers without entry points listen on every UDP entry point

use std::collections::BTreeMap;

use crate::routing::used_by::sort_unique;
use crate::runtime::records::{RouterDefinition, RouterRecord};
use crate::runtime::status::StatusRecord;
use crate::runtime::store::{HttpRouters, TcpRouters, UdpRouters};

/// Router names bound to each entry point, sorted.
pub type RoutersByEntryPoint = BTreeMap<String, Vec<String>>;

/// Bind HTTP routers whose TLS presence matches `tls`.
pub fn routers_by_entry_points(
    routers: &mut HttpRouters,
    entry_points: &[String],
    tls: bool,
) -> RoutersByEntryPoint {
    bind(routers, entry_points, |router| router.has_tls() == tls, false)
}

/// Bind TCP routers.
pub fn tcp_routers_by_entry_points(
    routers: &mut TcpRouters,
    entry_points: &[String],
) -> RoutersByEntryPoint {
    bind(routers, entry_points, |_| true, false)
}

/// Bind UDP routers. Routers declaring no entry point get all of them.
pub fn udp_routers_by_entry_points(
    routers: &mut UdpRouters,
    entry_points: &[String],
) -> RoutersByEntryPoint {
    bind(routers, entry_points, |_| true, true)
}

fn bind<R, F>(
    routers: &mut BTreeMap<String, RouterRecord<R>>,
    declared: &[String],
    include: F,
    default_to_all: bool,
) -> RoutersByEntryPoint
where
    R: RouterDefinition,
    F: Fn(&R) -> bool,
{
    let mut result = RoutersByEntryPoint::new();

    for (name, router) in routers.iter_mut() {
        if !include(&router.definition) {
            continue;
        }

        let requested: Vec<String> =
            if default_to_all && router.definition.entry_points().is_empty() {
                declared.to_vec()
            } else {
                router.definition.entry_points().to_vec()
            };

        let mut bound = 0usize;
        for entry_point in requested {
            if !declared.contains(&entry_point) {
                tracing::debug!(router = %name, entry_point = %entry_point, "Undeclared entry point");
                router.add_error(format!("entryPoint {entry_point:?} doesn't exist"), false);
                continue;
            }

            let bucket = result.entry(entry_point.clone()).or_default();
            if !bucket.contains(name) {
                bucket.push(name.clone());
            }
            router.using.push(entry_point);
            bound += 1;
        }
        sort_unique(&mut router.using);

        if bound == 0 {
            router.add_error("no valid entryPoint for this router", true);
        }
    }

    for names in result.values_mut() {
        names.sort();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::dynamic::{HttpRouter, RouterTls, UdpRouter};
    use crate::runtime::status::Status;

    fn eps(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn http(entry_points: &[&str], tls: bool) -> RouterRecord<HttpRouter> {
        RouterRecord::new(HttpRouter {
            entry_points: eps(entry_points),
            tls: tls.then(RouterTls::default),
            ..Default::default()
        })
    }

    #[test]
    fn test_bind_valid_and_unknown_entry_points() {
        let mut routers = HttpRouters::new();
        routers.insert("api@file".into(), http(&["websecure", "web", "web", "nope"], false));
        routers.insert("ok@file".into(), http(&["web"], false));

        let bound = routers_by_entry_points(&mut routers, &eps(&["web", "websecure"]), false);

        assert_eq!(bound["web"], vec!["api@file", "ok@file"]);
        assert_eq!(bound["websecure"], vec!["api@file"]);

        let api = &routers["api@file"];
        assert_eq!(api.using, vec!["web", "websecure"]);
        assert_eq!(api.status(), Status::Warning);
        assert_eq!(api.errors(), ["entryPoint \"nope\" doesn't exist"]);
        assert_eq!(routers["ok@file"].status(), Status::Enabled);
    }

    #[test]
    fn test_no_valid_entry_point_disables() {
        let mut routers = HttpRouters::new();
        routers.insert("lost@file".into(), http(&["nope"], false));
        routers.insert("empty@file".into(), http(&[], false));

        let bound = routers_by_entry_points(&mut routers, &eps(&["web"]), false);
        assert!(bound.is_empty());

        for name in ["lost@file", "empty@file"] {
            let router = &routers[name];
            assert_eq!(router.status(), Status::Disabled);
            let count = router
                .errors()
                .iter()
                .filter(|e| e.as_str() == "no valid entryPoint for this router")
                .count();
            assert_eq!(count, 1);
            assert!(router.using.is_empty());
        }
    }

    #[test]
    fn test_tls_partition() {
        let mut routers = HttpRouters::new();
        routers.insert("plain@file".into(), http(&["web"], false));
        routers.insert("secure@file".into(), http(&["web"], true));
        let declared = eps(&["web"]);

        let plain = routers_by_entry_points(&mut routers, &declared, false);
        assert_eq!(plain["web"], vec!["plain@file"]);
        assert!(routers["secure@file"].using.is_empty());
        assert!(routers["secure@file"].errors().is_empty());

        let secure = routers_by_entry_points(&mut routers, &declared, true);
        assert_eq!(secure["web"], vec!["secure@file"]);
        assert_eq!(routers["secure@file"].using, vec!["web"]);
        assert!(routers.values().all(|r| r.status() == Status::Enabled));
    }

    #[test]
    fn test_udp_defaults_to_all_entry_points() {
        let mut routers = UdpRouters::new();
        routers.insert(
            "dns@file".into(),
            RouterRecord::new(UdpRouter {
                entry_points: vec![],
                service: "dns".into(),
            }),
        );
        routers.insert(
            "ntp@file".into(),
            RouterRecord::new(UdpRouter {
                entry_points: eps(&["ntp"]),
                service: "ntp".into(),
            }),
        );

        let bound = udp_routers_by_entry_points(&mut routers, &eps(&["dns", "ntp"]));
        assert_eq!(bound["dns"], vec!["dns@file"]);
        assert_eq!(bound["ntp"], vec!["dns@file", "ntp@file"]);
        assert_eq!(routers["dns@file"].using, vec!["dns", "ntp"]);
        assert_eq!(routers["dns@file"].status(), Status::Enabled);
    }

    #[test]
    fn test_udp_without_declared_entry_points_is_disabled() {
        let mut routers = UdpRouters::new();
        routers.insert("dns@file".into(), RouterRecord::new(UdpRouter::default()));

        udp_routers_by_entry_points(&mut routers, &[]);
        assert_eq!(routers["dns@file"].status(), Status::Disabled);
    }
}

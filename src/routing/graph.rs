//! HTTP router dependency graph.
//!
//! # Responsibilities
//! - Link every parent router to the routers nesting under it
//! - Flag parent references that resolve to no router
//! - Flag the first dependency cycle found
//!
//! # Design Decisions
//! - Edges point from child to parent
//! - Parent references are qualified against the child's provider
//! - Traversal follows map order, then declaration order, so the reported
//!   cycle is stable across runs
//! - Only one cycle is reported per pass; a second independent cycle shows
//!   up once the first has been fixed

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::runtime::naming::resolve_reference;
use crate::runtime::status::StatusRecord;
use crate::runtime::store::HttpRouters;

/// Run child linking, orphan detection and cycle detection over the HTTP routers.
pub fn resolve_router_graph(routers: &mut HttpRouters) {
    let parents = parent_edges(routers);

    link_children(routers, &parents);
    detect_orphans(routers);

    if let Some(cycle) = find_cycle(&parents) {
        let message = format!("circular dependency detected: {}", cycle.join(" -> "));
        tracing::warn!(cycle = %cycle.join(" -> "), "Router dependency cycle");
        for name in &cycle {
            if let Some(router) = routers.get_mut(name) {
                router.add_error(message.as_str(), true);
            }
        }
    }
}

/// Resolved parent names per router, restricted to parents that exist.
fn parent_edges(routers: &HttpRouters) -> BTreeMap<String, Vec<String>> {
    routers
        .iter()
        .map(|(name, router)| {
            let parents = router
                .definition
                .parent_refs
                .iter()
                .map(|parent| resolve_reference(name, parent))
                .filter(|parent| routers.contains_key(parent))
                .collect();
            (name.clone(), parents)
        })
        .collect()
}

fn link_children(routers: &mut HttpRouters, parents: &BTreeMap<String, Vec<String>>) {
    for router in routers.values_mut() {
        router.child_refs.clear();
    }

    for (child, child_parents) in parents {
        for parent in child_parents {
            if let Some(router) = routers.get_mut(parent) {
                if !router.child_refs.contains(child) {
                    router.child_refs.push(child.clone());
                }
            }
        }
    }
}

fn detect_orphans(routers: &mut HttpRouters) {
    let mut orphans: Vec<(String, Vec<String>)> = Vec::new();

    for (name, router) in routers.iter() {
        let missing: Vec<String> = router
            .definition
            .parent_refs
            .iter()
            .filter(|parent| !routers.contains_key(&resolve_reference(name, parent)))
            .cloned()
            .collect();
        if !missing.is_empty() {
            orphans.push((name.clone(), missing));
        }
    }

    for (name, missing) in orphans {
        if let Some(router) = routers.get_mut(&name) {
            router.add_error(
                format!(
                    "router {name:?} references non-existent parent routers: {}",
                    missing.join(", ")
                ),
                true,
            );
        }
    }
}

/// Depth-first search for a back edge. Returns the cycle path with the
/// repeated router at both ends.
fn find_cycle(parents: &BTreeMap<String, Vec<String>>) -> Option<Vec<String>> {
    let mut visited: HashSet<&str> = HashSet::new();

    for start in parents.keys() {
        if visited.contains(start.as_str()) {
            continue;
        }
        let mut path = Vec::new();
        let mut on_path = HashMap::new();
        if let Some(cycle) = visit(start, parents, &mut visited, &mut path, &mut on_path) {
            return Some(cycle);
        }
    }
    None
}

fn visit<'a>(
    node: &'a str,
    parents: &'a BTreeMap<String, Vec<String>>,
    visited: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
    on_path: &mut HashMap<&'a str, usize>,
) -> Option<Vec<String>> {
    visited.insert(node);
    on_path.insert(node, path.len());
    path.push(node);

    for parent in parents.get(node).into_iter().flatten() {
        if let Some(&position) = on_path.get(parent.as_str()) {
            let mut cycle: Vec<String> = path[position..].iter().map(|n| n.to_string()).collect();
            cycle.push(parent.clone());
            return Some(cycle);
        }
        if !visited.contains(parent.as_str()) {
            if let Some(cycle) = visit(parent, parents, visited, path, on_path) {
                return Some(cycle);
            }
        }
    }

    path.pop();
    on_path.remove(node);
    None
}

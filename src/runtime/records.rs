//! Runtime records wrapping configuration definitions.
//!
//! Each record owns the caller-supplied definition plus the state computed
//! for one generation: errors, status, back-references and, for services,
//! the live per-server status written by the health checker.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Serialize, Serializer};

use crate::config::dynamic::{HttpRouter, TcpRouter, UdpRouter};
use crate::runtime::status::{RecordState, StatusRecord};

/// Read access to the router fields the supervisor works with.
pub trait RouterDefinition {
    fn entry_points(&self) -> &[String];

    fn service(&self) -> &str;

    fn middlewares(&self) -> &[String] {
        &[]
    }

    fn parent_refs(&self) -> &[String] {
        &[]
    }

    fn has_tls(&self) -> bool {
        false
    }
}

impl RouterDefinition for HttpRouter {
    fn entry_points(&self) -> &[String] {
        &self.entry_points
    }

    fn service(&self) -> &str {
        &self.service
    }

    fn middlewares(&self) -> &[String] {
        &self.middlewares
    }

    fn parent_refs(&self) -> &[String] {
        &self.parent_refs
    }

    fn has_tls(&self) -> bool {
        self.tls.is_some()
    }
}

impl RouterDefinition for TcpRouter {
    fn entry_points(&self) -> &[String] {
        &self.entry_points
    }

    fn service(&self) -> &str {
        &self.service
    }

    fn middlewares(&self) -> &[String] {
        &self.middlewares
    }

    fn has_tls(&self) -> bool {
        self.tls.is_some()
    }
}

impl RouterDefinition for UdpRouter {
    fn entry_points(&self) -> &[String] {
        &self.entry_points
    }

    fn service(&self) -> &str {
        &self.service
    }
}

/// A router and its computed state.
#[derive(Debug, Clone, Serialize)]
pub struct RouterRecord<R> {
    pub definition: R,

    #[serde(flatten)]
    state: RecordState,

    /// Effective entry points, sorted and unique.
    pub using: Vec<String>,

    /// Routers declaring this one as a parent. Only populated for HTTP routers.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub child_refs: Vec<String>,
}

impl<R> RouterRecord<R> {
    pub fn new(definition: R) -> Self {
        Self {
            definition,
            state: RecordState::default(),
            using: Vec::new(),
            child_refs: Vec::new(),
        }
    }
}

impl<R> StatusRecord for RouterRecord<R> {
    fn state(&self) -> &RecordState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RecordState {
        &mut self.state
    }
}

/// A service and its computed state.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceRecord<S> {
    pub definition: S,

    #[serde(flatten)]
    state: RecordState,

    /// Routers using this service, sorted and unique.
    pub used_by: Vec<String>,

    pub server_status: ServerStatus,
}

impl<S> ServiceRecord<S> {
    pub fn new(definition: S) -> Self {
        Self {
            definition,
            state: RecordState::default(),
            used_by: Vec::new(),
            server_status: ServerStatus::default(),
        }
    }
}

impl<S> StatusRecord for ServiceRecord<S> {
    fn state(&self) -> &RecordState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RecordState {
        &mut self.state
    }
}

/// A middleware and its computed state.
#[derive(Debug, Clone, Serialize)]
pub struct MiddlewareRecord<M> {
    pub definition: M,

    #[serde(flatten)]
    state: RecordState,

    /// Routers using this middleware, sorted and unique.
    pub used_by: Vec<String>,
}

impl<M> MiddlewareRecord<M> {
    pub fn new(definition: M) -> Self {
        Self {
            definition,
            state: RecordState::default(),
            used_by: Vec::new(),
        }
    }
}

impl<M> StatusRecord for MiddlewareRecord<M> {
    fn state(&self) -> &RecordState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RecordState {
        &mut self.state
    }
}

/// Liveness of one backend server as last reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServerState {
    Up,
    Down,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerState::Up => f.write_str("UP"),
            ServerState::Down => f.write_str("DOWN"),
        }
    }
}

/// Shared per-server status map of a service.
///
/// Written by the health checker, read by inspection consumers. Clones share
/// the same map. Reads return a copy so callers never see a partial update.
#[derive(Debug, Clone, Default)]
pub struct ServerStatus {
    inner: Arc<RwLock<BTreeMap<String, ServerState>>>,
}

impl ServerStatus {
    pub fn set(&self, target: &str, state: ServerState) {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.insert(target.to_string(), state);
    }

    pub fn get(&self, target: &str) -> Option<ServerState> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.get(target).copied()
    }

    pub fn snapshot(&self) -> BTreeMap<String, ServerState> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Serialize for ServerStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.snapshot().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::dynamic::HttpService;

    #[test]
    fn test_server_status_is_shared_between_clones() {
        let record = ServiceRecord::new(HttpService::default());
        let writer = record.server_status.clone();
        writer.set("http://10.0.0.1", ServerState::Up);
        writer.set("http://10.0.0.1", ServerState::Down);
        assert_eq!(
            record.server_status.get("http://10.0.0.1"),
            Some(ServerState::Down)
        );
        assert_eq!(record.server_status.snapshot().len(), 1);
    }

    #[test]
    fn test_record_serializes_for_inspection() {
        let mut record = ServiceRecord::new(HttpService::default());
        record.add_error("bad", false);
        record.server_status.set("http://a", ServerState::Up);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "warning");
        assert_eq!(json["errors"][0], "bad");
        assert_eq!(json["server_status"]["http://a"], "UP");
    }
}

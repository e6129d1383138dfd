//! Liveness propagation through nested balancers.
//!
//! # State Transitions
//! ```text
//! mark_up:   balancer empty before  → observers(up = true)
//!            balancer live before   → no propagation
//! mark_down: balancer live before, empty after → observers(up = false)
//!            balancer live after    → no propagation
//! ```
//!
//! # Design Decisions
//! - Callers only report debounced transitions (hysteresis lives in `health`)
//! - Check, mutate and notify run under one lock per propagator, so two
//!   near-simultaneous transitions cannot both see "was empty"
//! - Observers run synchronously in registration order; the first error
//!   aborts and is returned

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::load_balancer::{Balancer, BalancerError};
use crate::observability::metrics;
use crate::runtime::records::{ServerState, ServerStatus};

/// Receives aggregate liveness flips of a balancer.
pub trait StatusObserver: Send + Sync {
    fn status_changed(&self, up: bool) -> Result<(), BalancerError>;
}

/// Wraps a balancer with per-target status bookkeeping and upward notification.
pub struct StatusPropagator {
    service: String,
    balancer: Arc<dyn Balancer>,
    server_status: ServerStatus,
    observers: Mutex<Vec<Arc<dyn StatusObserver>>>,
}

impl fmt::Debug for StatusPropagator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusPropagator")
            .field("service", &self.service)
            .field("balancer", &self.balancer)
            .finish_non_exhaustive()
    }
}

impl StatusPropagator {
    pub fn new(
        service: impl Into<String>,
        balancer: Arc<dyn Balancer>,
        server_status: ServerStatus,
    ) -> Self {
        Self {
            service: service.into(),
            balancer,
            server_status,
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn balancer(&self) -> &Arc<dyn Balancer> {
        &self.balancer
    }

    pub fn server_status(&self) -> &ServerStatus {
        &self.server_status
    }

    /// Register an observer notified when the balancer goes from empty to live or back.
    pub fn register_observer(&self, observer: Arc<dyn StatusObserver>) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Whether at least one target is currently live.
    pub fn is_live(&self) -> bool {
        !self.balancer.list_targets().is_empty()
    }

    /// Put `target` back into rotation.
    pub fn mark_up(&self, target: &str, weight: u32) -> Result<(), BalancerError> {
        let observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);

        let was_live = !self.balancer.list_targets().is_empty();
        self.balancer.add_target(target, weight)?;
        self.server_status.set(target, ServerState::Up);

        if was_live {
            return Ok(());
        }

        tracing::info!(service = %self.service, target = %target, "Service is live again");
        metrics::record_service_live(&self.service, true);
        for observer in observers.iter() {
            observer.status_changed(true)?;
        }
        Ok(())
    }

    /// Take `target` out of rotation.
    pub fn mark_down(&self, target: &str) -> Result<(), BalancerError> {
        let observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);

        let was_live = !self.balancer.list_targets().is_empty();
        self.balancer.remove_target(target)?;
        self.server_status.set(target, ServerState::Down);

        if !was_live || !self.balancer.list_targets().is_empty() {
            return Ok(());
        }

        tracing::warn!(service = %self.service, target = %target, "Service has no live target");
        metrics::record_service_live(&self.service, false);
        for observer in observers.iter() {
            observer.status_changed(false)?;
        }
        Ok(())
    }
}

/// Adds or removes a child service in its parent's balancer when the
/// child's aggregate liveness flips.
pub struct ParentLink {
    parent: Arc<StatusPropagator>,
    child: String,
    weight: u32,
}

impl ParentLink {
    pub fn new(parent: Arc<StatusPropagator>, child: impl Into<String>, weight: u32) -> Self {
        Self {
            parent,
            child: child.into(),
            weight,
        }
    }
}

impl StatusObserver for ParentLink {
    fn status_changed(&self, up: bool) -> Result<(), BalancerError> {
        tracing::debug!(
            parent = %self.parent.service(),
            child = %self.child,
            up,
            "Propagating child status"
        );
        if up {
            self.parent.mark_up(&self.child, self.weight)
        } else {
            self.parent.mark_down(&self.child)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::{CompositeBalancer, RoundRobin};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<bool>>,
    }

    impl StatusObserver for Recorder {
        fn status_changed(&self, up: bool) -> Result<(), BalancerError> {
            self.events.lock().unwrap().push(up);
            Ok(())
        }
    }

    struct Failing(AtomicUsize);

    impl StatusObserver for Failing {
        fn status_changed(&self, _up: bool) -> Result<(), BalancerError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(BalancerError::Rejected {
                balancer: "parent".into(),
                target: "child".into(),
                reason: "boom".into(),
            })
        }
    }

    fn propagator(name: &str, targets: &[&str]) -> Arc<StatusPropagator> {
        let lb = Arc::new(RoundRobin::new(name));
        for target in targets {
            lb.add_target(target, 1).unwrap();
        }
        Arc::new(StatusPropagator::new(name, lb, ServerStatus::default()))
    }

    #[test]
    fn test_propagates_only_on_aggregate_flip() {
        let svc = propagator("api", &["a", "b"]);
        let recorder = Arc::new(Recorder::default());
        svc.register_observer(recorder.clone());

        svc.mark_down("a").unwrap();
        assert!(recorder.events.lock().unwrap().is_empty());
        assert_eq!(svc.server_status().get("a"), Some(ServerState::Down));

        svc.mark_down("b").unwrap();
        assert_eq!(*recorder.events.lock().unwrap(), vec![false]);

        svc.mark_up("a", 1).unwrap();
        svc.mark_up("b", 1).unwrap();
        assert_eq!(*recorder.events.lock().unwrap(), vec![false, true]);
        assert_eq!(svc.server_status().get("b"), Some(ServerState::Up));
    }

    #[test]
    fn test_mark_up_twice_is_idempotent() {
        let svc = propagator("api", &[]);
        let recorder = Arc::new(Recorder::default());
        svc.register_observer(recorder.clone());

        svc.mark_up("a", 1).unwrap();
        svc.mark_up("a", 1).unwrap();
        assert_eq!(*recorder.events.lock().unwrap(), vec![true]);
        assert_eq!(svc.balancer().list_targets(), vec!["a"]);
    }

    #[test]
    fn test_mark_down_on_empty_balancer_is_silent() {
        let svc = propagator("api", &["a"]);
        let recorder = Arc::new(Recorder::default());
        svc.register_observer(recorder.clone());

        svc.mark_down("a").unwrap();
        svc.mark_down("a").unwrap();
        svc.mark_down("never-added").unwrap();
        assert_eq!(*recorder.events.lock().unwrap(), vec![false]);
        assert_eq!(svc.server_status().get("a"), Some(ServerState::Down));
    }

    #[test]
    fn test_nested_propagation() {
        let root = propagator("root", &["left", "right"]);
        let left = propagator("left", &["l1"]);
        let right = propagator("right", &["r1"]);
        let top = Arc::new(Recorder::default());
        root.register_observer(top.clone());
        left.register_observer(Arc::new(ParentLink::new(root.clone(), "left", 1)));
        right.register_observer(Arc::new(ParentLink::new(root.clone(), "right", 1)));

        left.mark_down("l1").unwrap();
        assert_eq!(root.balancer().list_targets(), vec!["right"]);
        assert_eq!(root.server_status().get("left"), Some(ServerState::Down));
        assert!(top.events.lock().unwrap().is_empty());

        right.mark_down("r1").unwrap();
        assert!(!root.is_live());
        assert_eq!(*top.events.lock().unwrap(), vec![false]);

        right.mark_up("r1", 1).unwrap();
        assert_eq!(root.balancer().list_targets(), vec!["right"]);
        assert_eq!(*top.events.lock().unwrap(), vec![false, true]);
    }

    #[test]
    fn test_observer_error_fails_fast() {
        let svc = propagator("api", &["a"]);
        let failing = Arc::new(Failing(AtomicUsize::new(0)));
        let recorder = Arc::new(Recorder::default());
        svc.register_observer(failing.clone());
        svc.register_observer(recorder.clone());

        assert!(svc.mark_down("a").is_err());
        assert_eq!(failing.0.load(Ordering::SeqCst), 1);
        assert!(recorder.events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_composite_failure_surfaces() {
        let ok = Arc::new(RoundRobin::new("web"));
        let composite = Arc::new(CompositeBalancer::new(vec![ok.clone()]));
        let svc = StatusPropagator::new("api", composite, ServerStatus::default());

        let err = svc.mark_up("a", 0).unwrap_err();
        assert!(matches!(err, BalancerError::ZeroWeight { .. }));
        assert_eq!(svc.server_status().get("a"), None);
    }
}

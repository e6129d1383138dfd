//! Active health checking for one service.
//!
//! # Responsibilities
//! - Keep every target in exactly one of two pools, healthy or unhealthy
//! - Poll each pool on its own cadence
//! - Debounce probe outcomes and report boundary crossings upward
//!
//! # Design Decisions
//! - Each tick works on a snapshot of its pool, so a target moved by the
//!   other loop mid-tick is not probed twice
//! - Probes within a tick run one after another, in snapshot order
//! - Cancellation is checked before every probe; a result that arrives
//!   after cancellation is dropped
//! - A failed balancer mutation is logged, polling continues

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::health::probe::{Probe, ProbeError};
use crate::health::state::{HealthState, Hysteresis};
use crate::health::HealthCheckTarget;
use crate::load_balancer::StatusPropagator;
use crate::observability::metrics;

/// Cadence and hysteresis of a service health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthCheckSettings {
    pub interval: Duration,
    pub unhealthy_interval: Duration,
    pub timeout: Duration,
    pub fails_threshold: u32,
    pub passes_threshold: u32,
}

impl HealthCheckSettings {
    /// Replace zero durations: interval and timeout by their defaults,
    /// the unhealthy interval by the interval.
    pub fn normalized(self) -> Self {
        let defaults = Self::default();
        let non_zero = |value: Duration, fallback: Duration| {
            if value.is_zero() {
                fallback
            } else {
                value
            }
        };
        let interval = non_zero(self.interval, defaults.interval);
        Self {
            interval,
            unhealthy_interval: non_zero(self.unhealthy_interval, interval),
            timeout: non_zero(self.timeout, defaults.timeout),
            ..self
        }
    }
}

impl Default for HealthCheckSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            unhealthy_interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
            fails_threshold: 1,
            passes_threshold: 1,
        }
    }
}

/// A target together with its outcome counters.
#[derive(Debug)]
struct TrackedTarget {
    target: HealthCheckTarget,
    hysteresis: Mutex<Hysteresis>,
}

type Pool = Mutex<Vec<Arc<TrackedTarget>>>;

/// Health checker of one service.
#[derive(Debug)]
pub struct ServiceHealthChecker {
    service: String,
    settings: HealthCheckSettings,
    probe: Probe,
    propagator: Arc<StatusPropagator>,
    healthy: Pool,
    unhealthy: Pool,
}

impl ServiceHealthChecker {
    pub fn new(
        service: impl Into<String>,
        settings: HealthCheckSettings,
        probe: Probe,
        propagator: Arc<StatusPropagator>,
        targets: Vec<HealthCheckTarget>,
    ) -> Self {
        let settings = settings.normalized();
        let tracked = targets
            .into_iter()
            .map(|target| {
                Arc::new(TrackedTarget {
                    target,
                    hysteresis: Mutex::new(Hysteresis::new(
                        settings.fails_threshold,
                        settings.passes_threshold,
                    )),
                })
            })
            .collect();

        Self {
            service: service.into(),
            settings,
            probe,
            propagator,
            healthy: Mutex::new(tracked),
            unhealthy: Mutex::new(Vec::new()),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn settings(&self) -> &HealthCheckSettings {
        &self.settings
    }

    /// Names of targets currently in the given pool.
    pub fn targets_in(&self, state: HealthState) -> Vec<String> {
        lock(self.pool(state))
            .iter()
            .map(|t| t.target.name.clone())
            .collect()
    }

    /// Spawn the healthy and unhealthy polling loops under `scope`.
    pub fn launch(self: &Arc<Self>, scope: &CancellationToken) -> Vec<JoinHandle<()>> {
        tracing::info!(
            service = %self.service,
            interval = ?self.settings.interval,
            unhealthy_interval = ?self.settings.unhealthy_interval,
            targets = lock(&self.healthy).len(),
            "Health checker starting"
        );

        [HealthState::Healthy, HealthState::Unhealthy]
            .into_iter()
            .map(|state| tokio::spawn(self.clone().poll(state, scope.clone())))
            .collect()
    }

    async fn poll(self: Arc<Self>, state: HealthState, scope: CancellationToken) {
        let period = match state {
            HealthState::Healthy => self.settings.interval,
            HealthState::Unhealthy => self.settings.unhealthy_interval,
        };
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = scope.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.check_pool(state, &scope).await;
        }

        tracing::debug!(service = %self.service, pool = ?state, "Health check loop stopped");
    }

    /// Probe every target of one pool once.
    pub async fn check_pool(&self, state: HealthState, scope: &CancellationToken) {
        let snapshot: Vec<Arc<TrackedTarget>> = lock(self.pool(state)).clone();

        for tracked in snapshot {
            if scope.is_cancelled() {
                return;
            }
            let outcome = self.probe.check(&tracked.target.name).await;
            if scope.is_cancelled() {
                return;
            }
            self.apply(&tracked, state, outcome);
        }
    }

    fn apply(&self, tracked: &Arc<TrackedTarget>, pool: HealthState, outcome: Result<(), ProbeError>) {
        let target = &tracked.target;
        let success = outcome.is_ok();
        match &outcome {
            Ok(()) => {
                tracing::debug!(service = %self.service, target = %target.name, "Health check passed");
            }
            Err(e) => {
                tracing::debug!(service = %self.service, target = %target.name, error = %e, "Health check failed");
            }
        }
        metrics::record_server_up(&self.service, &target.name, success);

        let (transition, current) = {
            let mut hysteresis = lock(&tracked.hysteresis);
            let transition = hysteresis.record(success);
            (transition, hysteresis.state())
        };

        if let Some(state) = transition {
            metrics::record_transition(&self.service, state.is_up());
            let result = match state {
                HealthState::Healthy => {
                    tracing::info!(service = %self.service, target = %target.name, "Target is healthy again");
                    self.propagator.mark_up(&target.name, target.weight)
                }
                HealthState::Unhealthy => {
                    tracing::warn!(
                        service = %self.service,
                        target = %target.name,
                        error = %outcome.as_ref().err().map(ToString::to_string).unwrap_or_default(),
                        "Target is unhealthy"
                    );
                    self.propagator.mark_down(&target.name)
                }
            };
            if let Err(e) = result {
                tracing::error!(
                    service = %self.service,
                    target = %target.name,
                    error = %e,
                    "Failed to update balancer"
                );
            }
        }

        if current != pool {
            self.refile(tracked, pool, current);
        }
    }

    fn refile(&self, tracked: &Arc<TrackedTarget>, from: HealthState, to: HealthState) {
        lock(self.pool(from)).retain(|t| !Arc::ptr_eq(t, tracked));
        lock(self.pool(to)).push(tracked.clone());
    }

    fn pool(&self, state: HealthState) -> &Pool {
        match state {
            HealthState::Healthy => &self.healthy,
            HealthState::Unhealthy => &self.unhealthy,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::probe::TcpProbe;
    use crate::load_balancer::{Balancer, RoundRobin};
    use crate::runtime::records::{ServerState, ServerStatus};

    fn checker(targets: &[&str], fails: u32) -> (Arc<ServiceHealthChecker>, Arc<StatusPropagator>) {
        let lb = Arc::new(RoundRobin::new("api"));
        for target in targets {
            lb.add_target(target, 1).unwrap();
        }
        let propagator = Arc::new(StatusPropagator::new("api", lb, ServerStatus::default()));
        let settings = HealthCheckSettings {
            fails_threshold: fails,
            timeout: Duration::from_millis(200),
            ..Default::default()
        };
        let probe = Probe::Tcp(TcpProbe::new(None, None, None, settings.timeout));
        let targets = targets
            .iter()
            .map(|t| HealthCheckTarget::new(*t, 1))
            .collect();
        let checker = ServiceHealthChecker::new("api", settings, probe, propagator.clone(), targets);
        (Arc::new(checker), propagator)
    }

    fn closed_port() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr.to_string()
    }

    #[test]
    fn test_zero_durations_are_replaced() {
        let settings = HealthCheckSettings {
            interval: Duration::ZERO,
            unhealthy_interval: Duration::ZERO,
            timeout: Duration::ZERO,
            ..Default::default()
        }
        .normalized();
        assert_eq!(settings.interval, Duration::from_secs(30));
        assert_eq!(settings.unhealthy_interval, Duration::from_secs(30));
        assert_eq!(settings.timeout, Duration::from_secs(5));

        let settings = HealthCheckSettings {
            interval: Duration::from_millis(100),
            unhealthy_interval: Duration::ZERO,
            ..Default::default()
        }
        .normalized();
        assert_eq!(settings.unhealthy_interval, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_zero_interval_checker_launches() {
        let lb = Arc::new(RoundRobin::new("api"));
        let propagator = Arc::new(StatusPropagator::new("api", lb, ServerStatus::default()));
        let settings = HealthCheckSettings {
            interval: Duration::ZERO,
            unhealthy_interval: Duration::ZERO,
            ..Default::default()
        };
        let probe = Probe::Tcp(TcpProbe::new(None, None, None, settings.timeout));
        let checker = Arc::new(ServiceHealthChecker::new("api", settings, probe, propagator, Vec::new()));
        assert_eq!(checker.settings().interval, Duration::from_secs(30));

        let scope = CancellationToken::new();
        let handles = checker.launch(&scope);
        scope.cancel();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_failing_target_moves_after_threshold() {
        let dead = closed_port();
        let (checker, propagator) = checker(&[dead.as_str()], 2);
        let scope = CancellationToken::new();

        checker.check_pool(HealthState::Healthy, &scope).await;
        assert_eq!(checker.targets_in(HealthState::Healthy), vec![dead.clone()]);
        assert_eq!(propagator.balancer().list_targets(), vec![dead.clone()]);

        checker.check_pool(HealthState::Healthy, &scope).await;
        assert!(checker.targets_in(HealthState::Healthy).is_empty());
        assert_eq!(checker.targets_in(HealthState::Unhealthy), vec![dead.clone()]);
        assert!(propagator.balancer().list_targets().is_empty());
        assert_eq!(propagator.server_status().get(&dead), Some(ServerState::Down));
    }

    #[tokio::test]
    async fn test_cancelled_scope_skips_probes() {
        let dead = closed_port();
        let (checker, propagator) = checker(&[dead.as_str()], 1);
        let scope = CancellationToken::new();
        scope.cancel();

        checker.check_pool(HealthState::Healthy, &scope).await;
        assert_eq!(checker.targets_in(HealthState::Healthy), vec![dead.clone()]);
        assert_eq!(propagator.balancer().list_targets(), vec![dead]);
    }

    #[tokio::test]
    async fn test_launch_stops_on_cancel() {
        let (checker, _) = checker(&["127.0.0.1:1"], 1);
        let scope = CancellationToken::new();
        let handles = checker.launch(&scope);
        assert_eq!(handles.len(), 2);

        scope.cancel();
        for handle in handles {
            time::timeout(Duration::from_secs(1), handle)
                .await
                .expect("loop did not stop")
                .unwrap();
        }
    }
}

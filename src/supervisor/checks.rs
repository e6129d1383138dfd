//! Health checker construction from service definitions.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::dynamic::{HealthCheckTiming, ServerHealthCheck, TcpServerHealthCheck};
use crate::health::{
    HealthCheckSettings, HealthCheckTarget, HttpProbe, HttpProbeOptions, Probe, ProbeError,
    ServiceHealthChecker, TcpProbe,
};
use crate::runtime::status::StatusRecord;
use crate::runtime::store::{HttpServices, TcpServices};
use crate::supervisor::balancers::ServiceBalancer;

const DEFAULT_INTERVAL_MS: u64 = 30_000;
const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Resolve timing fields against their defaults. Zero durations fall back too.
pub fn settings(timing: &HealthCheckTiming) -> HealthCheckSettings {
    let millis = |value: Option<u64>| value.filter(|ms| *ms > 0).map(Duration::from_millis);

    let interval = millis(timing.interval_ms).unwrap_or(Duration::from_millis(DEFAULT_INTERVAL_MS));
    HealthCheckSettings {
        interval,
        unhealthy_interval: millis(timing.unhealthy_interval_ms).unwrap_or(interval),
        timeout: millis(timing.timeout_ms).unwrap_or(Duration::from_millis(DEFAULT_TIMEOUT_MS)),
        fails_threshold: timing.fails_threshold.unwrap_or(1).max(1),
        passes_threshold: timing.passes_threshold.unwrap_or(1).max(1),
    }
}

pub fn http_probe(check: &ServerHealthCheck, timeout: Duration) -> Result<HttpProbe, ProbeError> {
    let options = HttpProbeOptions {
        scheme: check.scheme.clone(),
        path: check.path.clone(),
        method: check.method.clone().unwrap_or_else(|| "GET".to_string()),
        port: check.port,
        hostname: check.hostname.clone(),
        headers: check
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect(),
        expected_status: check.status,
        follow_redirects: check.follow_redirects,
    };
    HttpProbe::new(options, timeout)
}

pub fn tcp_probe(check: &TcpServerHealthCheck, timeout: Duration) -> TcpProbe {
    TcpProbe::new(check.port, check.send.clone(), check.expect.clone(), timeout)
}

/// Checkers for every HTTP servers service carrying a health check.
pub fn http_checkers(
    services: &mut HttpServices,
    balancers: &BTreeMap<String, ServiceBalancer>,
) -> Vec<Arc<ServiceHealthChecker>> {
    let mut checkers = Vec::new();

    for (name, record) in services.iter_mut() {
        let Some(check) = record
            .definition
            .load_balancer
            .as_ref()
            .and_then(|lb| lb.health_check.clone())
        else {
            continue;
        };
        let Some(balancer) = balancers.get(name) else {
            continue;
        };

        let settings = settings(&check.timing);
        let probe = match http_probe(&check, settings.timeout) {
            Ok(probe) => probe,
            Err(e) => {
                tracing::warn!(service = %name, error = %e, "Health check disabled");
                record.add_error(format!("health check disabled: {e}"), false);
                continue;
            }
        };

        let mut targets: Vec<HealthCheckTarget> = Vec::new();
        for target in &balancer.targets {
            match probe.probe_url(&target.name) {
                Ok(_) => targets.push(target.clone()),
                Err(e) => {
                    record.add_error(format!("health check disabled for server: {e}"), false);
                }
            }
        }

        checkers.push(Arc::new(ServiceHealthChecker::new(
            name.clone(),
            settings,
            Probe::Http(probe),
            balancer.propagator.clone(),
            targets,
        )));
    }

    checkers
}

/// Checkers for every TCP servers service carrying a health check.
pub fn tcp_checkers(
    services: &TcpServices,
    balancers: &BTreeMap<String, ServiceBalancer>,
) -> Vec<Arc<ServiceHealthChecker>> {
    services
        .iter()
        .filter_map(|(name, record)| {
            let check = record.definition.load_balancer.as_ref()?.health_check.as_ref()?;
            let balancer = balancers.get(name)?;
            let settings = settings(&check.timing);
            Some(Arc::new(ServiceHealthChecker::new(
                name.clone(),
                settings,
                Probe::Tcp(tcp_probe(check, settings.timeout)),
                balancer.propagator.clone(),
                balancer.targets.clone(),
            )))
        })
        .collect()
}

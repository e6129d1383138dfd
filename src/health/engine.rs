//! Generation-scoped owner of all running health checkers.
//!
//! # State Transitions
//! ```text
//! Idle → Armed:      rearm(checkers)
//! Armed → Armed:     rearm(checkers), old generation cancelled and awaited first
//! Armed → Idle:      stop()
//! ```
//!
//! # Design Decisions
//! - Every generation runs under a child of the root token, so process
//!   shutdown cancels all loops
//! - No loop of an older generation survives a rearm

use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::join_all;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::health::active::ServiceHealthChecker;

#[derive(Debug)]
struct Generation {
    scope: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// Registry of the health checkers of the current configuration generation.
#[derive(Debug)]
pub struct HealthCheckEngine {
    checkers: DashMap<String, Arc<ServiceHealthChecker>>,
    generation: Mutex<Option<Generation>>,
    root: CancellationToken,
}

impl HealthCheckEngine {
    pub fn new(root: CancellationToken) -> Self {
        Self {
            checkers: DashMap::new(),
            generation: Mutex::new(None),
            root,
        }
    }

    /// Stop the running generation and launch `checkers` as the next one.
    pub async fn rearm(&self, checkers: Vec<Arc<ServiceHealthChecker>>) {
        let mut generation = self.generation.lock().await;
        if let Some(old) = generation.take() {
            shutdown(old).await;
        }
        self.checkers.clear();

        let scope = self.root.child_token();
        let mut tasks = Vec::with_capacity(checkers.len() * 2);
        for checker in checkers {
            tasks.extend(checker.launch(&scope));
            self.checkers
                .insert(checker.service().to_string(), checker);
        }

        tracing::info!(services = self.checkers.len(), "Health checks armed");
        *generation = Some(Generation { scope, tasks });
    }

    /// Cancel and await every running loop.
    pub async fn stop(&self) {
        if let Some(old) = self.generation.lock().await.take() {
            shutdown(old).await;
            tracing::info!("Health checks stopped");
        }
        self.checkers.clear();
    }

    pub fn checker(&self, service: &str) -> Option<Arc<ServiceHealthChecker>> {
        self.checkers.get(service).map(|entry| entry.value().clone())
    }

    /// Names of the services checked by the current generation, sorted.
    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.checkers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

async fn shutdown(generation: Generation) {
    generation.scope.cancel();
    for result in join_all(generation.tasks).await {
        if let Err(e) = result {
            tracing::error!(error = %e, "Health check task failed");
        }
    }
}

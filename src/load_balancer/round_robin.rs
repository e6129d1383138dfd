//! Weighted round-robin balancer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use crate::load_balancer::{Balancer, BalancerError};

#[derive(Debug, Clone)]
struct WeightedTarget {
    name: String,
    weight: u32,
}

/// Round-robin selector over live targets.
/// Stores an internal counter to rotate through targets, a target of
/// weight `w` is picked `w` times per rotation.
#[derive(Debug)]
pub struct RoundRobin {
    name: String,
    targets: RwLock<Vec<WeightedTarget>>,
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            targets: RwLock::new(Vec::new()),
            counter: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pick the next target, `None` when nothing is live.
    pub fn next_target(&self) -> Option<String> {
        let targets = self.targets.read().unwrap_or_else(PoisonError::into_inner);
        let total: usize = targets.iter().map(|t| t.weight as usize).sum();
        if total == 0 {
            return None;
        }

        let mut slot = self.counter.fetch_add(1, Ordering::Relaxed) % total;
        for target in targets.iter() {
            let weight = target.weight as usize;
            if slot < weight {
                return Some(target.name.clone());
            }
            slot -= weight;
        }
        None
    }
}

impl Balancer for RoundRobin {
    fn list_targets(&self) -> Vec<String> {
        self.targets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|t| t.name.clone())
            .collect()
    }

    fn add_target(&self, target: &str, weight: u32) -> Result<(), BalancerError> {
        if weight == 0 {
            return Err(BalancerError::ZeroWeight {
                balancer: self.name.clone(),
                target: target.to_string(),
            });
        }

        let mut targets = self.targets.write().unwrap_or_else(PoisonError::into_inner);
        match targets.iter_mut().find(|t| t.name == target) {
            Some(existing) => existing.weight = weight,
            None => targets.push(WeightedTarget {
                name: target.to_string(),
                weight,
            }),
        }
        Ok(())
    }

    fn remove_target(&self, target: &str) -> Result<(), BalancerError> {
        let mut targets = self.targets.write().unwrap_or_else(PoisonError::into_inner);
        targets.retain(|t| t.name != target);
        Ok(())
    }
}

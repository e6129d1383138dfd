//! A balancer-of-balancers.
//!
//! One service may be instantiated several times (once per entry point it
//! is reachable from). The composite applies every mutation to each
//! instance so the health checker only has to talk to one balancer.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::load_balancer::{Balancer, BalancerError};

#[derive(Debug, Default)]
pub struct CompositeBalancer {
    children: Vec<Arc<dyn Balancer>>,
}

impl CompositeBalancer {
    pub fn new(children: Vec<Arc<dyn Balancer>>) -> Self {
        Self { children }
    }

    pub fn children(&self) -> &[Arc<dyn Balancer>] {
        &self.children
    }
}

impl Balancer for CompositeBalancer {
    /// Union of every child's targets, sorted.
    fn list_targets(&self) -> Vec<String> {
        self.children
            .iter()
            .flat_map(|child| child.list_targets())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Stops at the first failing child.
    fn add_target(&self, target: &str, weight: u32) -> Result<(), BalancerError> {
        for child in &self.children {
            child.add_target(target, weight)?;
        }
        Ok(())
    }

    /// Stops at the first failing child.
    fn remove_target(&self, target: &str) -> Result<(), BalancerError> {
        for child in &self.children {
            child.remove_target(target)?;
        }
        Ok(())
    }
}

//! Static configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Entry point names and addresses are usable
//! - Provider settings point somewhere
//!
//! Dynamic configuration is never rejected here: its problems are attached
//! to the affected records instead, see `runtime::status`.

use thiserror::Error;

use crate::config::schema::SupervisorConfig;

/// A single semantic problem in the static configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("entry point name must not be empty")]
    EmptyEntryPointName,

    #[error("entry point {name:?}: invalid address {address:?}")]
    InvalidAddress { name: String, address: String },

    #[error("entry point {name:?}: unknown protocol in {address:?}")]
    UnknownProtocol { name: String, address: String },

    #[error("file provider path must not be empty")]
    EmptyProviderPath,

    #[error("invalid metrics address {0:?}")]
    InvalidMetricsAddress(String),
}

/// Validate the static configuration, collecting every problem.
pub fn validate_config(config: &SupervisorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (name, ep) in &config.entry_points {
        if name.trim().is_empty() {
            errors.push(ValidationError::EmptyEntryPointName);
        }
        if ep.protocol().is_none() {
            errors.push(ValidationError::UnknownProtocol {
                name: name.clone(),
                address: ep.address.clone(),
            });
            continue;
        }
        if !has_valid_port(ep.host_port()) {
            errors.push(ValidationError::InvalidAddress {
                name: name.clone(),
                address: ep.address.clone(),
            });
        }
    }

    if let Some(file) = &config.providers.file {
        if file.path.trim().is_empty() {
            errors.push(ValidationError::EmptyProviderPath);
        }
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// `host:port` or `:port`, host may be empty.
fn has_valid_port(address: &str) -> bool {
    address
        .rsplit_once(':')
        .and_then(|(_, port)| port.parse::<u16>().ok())
        .is_some()
}

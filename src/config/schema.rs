//! Static configuration schema.
//!
//! Static configuration is read once at startup: the declared entry points,
//! where dynamic configuration comes from, and observability settings.
//! All types derive Serde traits for deserialization from TOML.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root static configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Declared entry points by name.
    pub entry_points: BTreeMap<String, EntryPointConfig>,

    /// Sources of dynamic configuration.
    pub providers: ProvidersConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        let mut entry_points = BTreeMap::new();
        entry_points.insert(
            "web".to_string(),
            EntryPointConfig {
                address: "0.0.0.0:80".to_string(),
            },
        );
        Self {
            entry_points,
            providers: ProvidersConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl SupervisorConfig {
    /// Names of entry points carrying the given protocol, sorted.
    pub fn entry_point_names(&self, protocol: Protocol) -> Vec<String> {
        self.entry_points
            .iter()
            .filter(|(_, ep)| ep.protocol() == Some(protocol))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// A listener declaration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EntryPointConfig {
    /// Listen address, e.g. "0.0.0.0:443" or ":53/udp".
    pub address: String,
}

/// Transport protocol of an entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl EntryPointConfig {
    /// Protocol from the optional `/tcp` or `/udp` suffix. `None` for unknown suffixes.
    pub fn protocol(&self) -> Option<Protocol> {
        match self.address.rsplit_once('/') {
            None => Some(Protocol::Tcp),
            Some((_, "tcp")) => Some(Protocol::Tcp),
            Some((_, "udp")) => Some(Protocol::Udp),
            Some(_) => None,
        }
    }

    /// Address without the protocol suffix.
    pub fn host_port(&self) -> &str {
        self.address
            .rsplit_once('/')
            .map(|(addr, _)| addr)
            .unwrap_or(&self.address)
    }
}

/// Dynamic configuration providers.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub file: Option<FileProviderConfig>,
}

/// File provider settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileProviderConfig {
    /// Path to the dynamic configuration TOML file.
    pub path: String,

    /// Reload the file when it changes.
    #[serde(default = "default_watch")]
    pub watch: bool,
}

fn default_watch() -> bool {
    true
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_point_protocol() {
        let ep = |addr: &str| EntryPointConfig {
            address: addr.to_string(),
        };
        assert_eq!(ep(":80").protocol(), Some(Protocol::Tcp));
        assert_eq!(ep(":443/tcp").protocol(), Some(Protocol::Tcp));
        assert_eq!(ep(":53/udp").protocol(), Some(Protocol::Udp));
        assert_eq!(ep(":53/sctp").protocol(), None);
        assert_eq!(ep(":53/udp").host_port(), ":53");
    }

    #[test]
    fn test_entry_point_names_by_protocol() {
        let raw = r#"
            [entry_points.web]
            address = ":80"
            [entry_points.websecure]
            address = ":443"
            [entry_points.dns]
            address = ":53/udp"
        "#;
        let config: SupervisorConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.entry_point_names(Protocol::Tcp), vec!["web", "websecure"]);
        assert_eq!(config.entry_point_names(Protocol::Udp), vec!["dns"]);
        assert!(config.observability.metrics_enabled);
    }
}

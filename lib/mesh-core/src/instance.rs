//! Service instance model
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;

/// Group used when a service does not name one explicitly
pub const DEFAULT_GROUP: &str = "DEFAULT_GROUP";

/// One running, network-addressable copy of a named service
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub service_name: String,
    #[serde(default = "default_group")]
    pub group_name: String,
    pub ip: String,
    pub port: u16,
    /// Load balancing hint. Carried through registration, not consulted by
    /// instance selection.
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub healthy: bool,
    /// Removed by the registry when the owning client disconnects
    #[serde(default = "default_true")]
    pub ephemeral: bool,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

fn default_group() -> String {
    DEFAULT_GROUP.to_string()
}

fn default_weight() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

impl ServiceInstance {
    pub fn new(service_name: impl Into<String>, ip: impl Into<String>, port: u16) -> Self {
        Self {
            service_name: service_name.into(),
            group_name: default_group(),
            ip: ip.into(),
            port,
            weight: default_weight(),
            enabled: true,
            healthy: true,
            ephemeral: true,
            metadata: HashMap::new(),
        }
    }

    pub fn with_group(mut self, group_name: impl Into<String>) -> Self {
        self.group_name = group_name.into();
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_healthy(mut self, healthy: bool) -> Self {
        self.healthy = healthy;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Identity tuple of this instance
    pub fn key(&self) -> InstanceKey {
        InstanceKey {
            service_name: self.service_name.clone(),
            group_name: self.group_name.clone(),
            ip: self.ip.clone(),
            port: self.port,
        }
    }

    /// `http://<ip>:<port>` for the instance, IPv6 addresses bracketed
    pub fn base_url(&self) -> String {
        match self.ip.parse::<IpAddr>() {
            Ok(IpAddr::V6(v6)) => format!("http://[{}]:{}", v6, self.port),
            _ => format!("http://{}:{}", self.ip, self.port),
        }
    }
}

/// Identity of a registered instance: (service, group, ip, port)
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstanceKey {
    pub service_name: String,
    pub group_name: String,
    pub ip: String,
    pub port: u16,
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@@{} {}:{}",
            self.group_name, self.service_name, self.ip, self.port
        )
    }
}

/// Nacos-style grouped service name, `group@@service`
pub fn grouped_service_name(service_name: &str, group_name: &str) -> String {
    format!("{}@@{}", group_name, service_name)
}

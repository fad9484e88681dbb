//! Wire types of the Nacos naming API

use mesh_core::ServiceInstance;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Response of `GET /v1/ns/instance/list`
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceList {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub group_name: Option<String>,
    #[serde(default)]
    pub hosts: Vec<WireInstance>,
}

/// One entry of `hosts`
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireInstance {
    #[serde(default)]
    pub instance_id: Option<String>,
    pub ip: String,
    pub port: u16,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub healthy: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub ephemeral: bool,
    #[serde(default)]
    pub cluster_name: Option<String>,
    /// Usually `group@@service`
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

fn default_weight() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

impl WireInstance {
    /// Convert to the domain model; `service_name`/`group_name` are the
    /// values the lookup was made with
    pub fn into_instance(self, service_name: &str, group_name: &str) -> ServiceInstance {
        ServiceInstance {
            service_name: service_name.to_string(),
            group_name: group_name.to_string(),
            ip: self.ip,
            port: self.port,
            weight: self.weight,
            enabled: self.enabled,
            healthy: self.healthy,
            ephemeral: self.ephemeral,
            metadata: self.metadata,
        }
    }

    pub fn from_instance(instance: &ServiceInstance) -> Self {
        Self {
            instance_id: None,
            ip: instance.ip.clone(),
            port: instance.port,
            weight: instance.weight,
            healthy: instance.healthy,
            enabled: instance.enabled,
            ephemeral: instance.ephemeral,
            cluster_name: None,
            service_name: Some(mesh_core::instance::grouped_service_name(
                &instance.service_name,
                &instance.group_name,
            )),
            metadata: instance.metadata.clone(),
        }
    }
}

//! YAML settings shared by the mesh daemons

use crate::{ConfigKey, MeshError, Result, ServiceInstance, DEFAULT_GROUP};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Environment variable naming the settings file when no argument is given
pub const SETTINGS_ENV: &str = "MESH_CONFIG";

/// Environment variable naming a shared defaults file merged under the settings file
pub const DEFAULTS_ENV: &str = "MESH_DEFAULTS";

/// Complete settings of one mesh process
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshSettings {
    pub nacos: NacosSettings,
    pub service: ServiceSettings,
    pub config: ConfigSettings,
    pub gateway: GatewaySettings,
}

/// Registry/config backend connection
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NacosSettings {
    /// host:port of the backend
    pub server_addr: String,
    pub context_path: String,
    pub namespace: String,
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for NacosSettings {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8848".to_string(),
            context_path: "/nacos".to_string(),
            namespace: String::new(),
            timeout_ms: 5000,
            poll_interval_ms: 3000,
        }
    }
}

/// The instance this process registers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    pub name: String,
    pub ip: String,
    pub port: u16,
    pub weight: f64,
    pub enabled: bool,
    pub healthy: bool,
    pub ephemeral: bool,
    pub group_name: String,
    pub metadata: HashMap<String, String>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: String::new(),
            ip: "127.0.0.1".to_string(),
            port: 0,
            weight: 1.0,
            enabled: true,
            healthy: true,
            ephemeral: true,
            group_name: DEFAULT_GROUP.to_string(),
            metadata: HashMap::new(),
        }
    }
}

/// The config blob this process publishes and watches
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigSettings {
    pub data_id: String,
    pub group: String,
    pub content: String,
}

impl Default for ConfigSettings {
    fn default() -> Self {
        Self {
            data_id: String::new(),
            group: DEFAULT_GROUP.to_string(),
            content: String::new(),
        }
    }
}

/// Gateway routing
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub upstream_timeout_ms: u64,
    pub routes: Vec<RouteSettings>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            upstream_timeout_ms: 30_000,
            routes: Vec::new(),
        }
    }
}

/// Path prefix forwarded to a peer service
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteSettings {
    pub prefix: String,
    pub service: String,
    #[serde(default = "default_group")]
    pub group: String,
    /// Prefix removed from the path before forwarding
    #[serde(default)]
    pub strip_prefix: Option<String>,
}

fn default_group() -> String {
    DEFAULT_GROUP.to_string()
}

/// Sections present in an overriding file
#[derive(Debug, Default, Deserialize)]
struct PartialSettings {
    nacos: Option<NacosSettings>,
    service: Option<ServiceSettings>,
    config: Option<ConfigSettings>,
    gateway: Option<GatewaySettings>,
}

impl MeshSettings {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let yaml = read_file(path.as_ref())?;
        Self::from_yaml_str(&yaml)
    }

    /// Load `defaults`, then replace every section present in `overrides`
    pub fn load_with_defaults(
        defaults: impl AsRef<Path>,
        overrides: impl AsRef<Path>,
    ) -> Result<Self> {
        let base = Self::load(defaults)?;
        let yaml = read_file(overrides.as_ref())?;
        base.merge_yaml(&yaml)
    }

    /// Replace every section present in `yaml`
    pub fn merge_yaml(mut self, yaml: &str) -> Result<Self> {
        let partial: PartialSettings = serde_yaml::from_str(yaml)?;
        if let Some(nacos) = partial.nacos {
            self.nacos = nacos;
        }
        if let Some(service) = partial.service {
            self.service = service;
        }
        if let Some(config) = partial.config {
            self.config = config;
        }
        if let Some(gateway) = partial.gateway {
            self.gateway = gateway;
        }
        Ok(self)
    }

    /// Reject settings a daemon cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.service.name.is_empty() {
            return Err(MeshError::InvalidConfiguration(
                "service.name is required".to_string(),
            ));
        }
        if self.service.port == 0 {
            return Err(MeshError::InvalidConfiguration(
                "service.port is required".to_string(),
            ));
        }
        if self.nacos.server_addr.is_empty() {
            return Err(MeshError::InvalidConfiguration(
                "nacos.server_addr is required".to_string(),
            ));
        }
        for route in &self.gateway.routes {
            if !route.prefix.starts_with('/') {
                return Err(MeshError::InvalidConfiguration(format!(
                    "route prefix must start with '/': {}",
                    route.prefix
                )));
            }
        }
        Ok(())
    }

    /// The instance described by the service section
    pub fn instance(&self) -> ServiceInstance {
        let s = &self.service;
        ServiceInstance {
            service_name: s.name.clone(),
            group_name: s.group_name.clone(),
            ip: s.ip.clone(),
            port: s.port,
            weight: s.weight,
            enabled: s.enabled,
            healthy: s.healthy,
            ephemeral: s.ephemeral,
            metadata: s.metadata.clone(),
        }
    }

    /// Key of the config blob, `None` when no data id is configured
    pub fn config_key(&self) -> Option<ConfigKey> {
        if self.config.data_id.is_empty() {
            return None;
        }
        Some(
            ConfigKey::new(self.config.data_id.clone(), self.config.group.clone())
                .with_namespace(self.nacos.namespace.clone()),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.nacos.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.nacos.poll_interval_ms)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway.upstream_timeout_ms)
    }
}

fn read_file(path: &Path) -> Result<String> {
    debug!("Reading settings from {}", path.display());
    std::fs::read_to_string(path).map_err(|e| {
        MeshError::InvalidConfiguration(format!("cannot read {}: {}", path.display(), e))
    })
}

/// Settings path from the first CLI argument, then `MESH_CONFIG`, then `default`
pub fn settings_path(args: impl IntoIterator<Item = String>, default: &str) -> String {
    args.into_iter()
        .nth(1)
        .or_else(|| std::env::var(SETTINGS_ENV).ok())
        .unwrap_or_else(|| default.to_string())
}

/// Resolve, load and validate the settings of a daemon
///
/// When `MESH_DEFAULTS` is set its file is loaded first and the settings
/// file is merged over it.
pub fn load_daemon_settings(
    args: impl IntoIterator<Item = String>,
    default: &str,
) -> Result<MeshSettings> {
    let path = settings_path(args, default);
    let settings = match std::env::var(DEFAULTS_ENV) {
        Ok(defaults) => MeshSettings::load_with_defaults(defaults, &path)?,
        Err(_) => MeshSettings::load(&path)?,
    };
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GATEWAY_YAML: &str = r#"
nacos:
  server_addr: "10.0.0.5:8848"
  namespace: "dev"
  timeout_ms: 2000
service:
  name: gateway-service
  ip: 10.0.0.10
  port: 8080
  metadata:
    version: v1
config:
  data_id: gateway.yaml
  group: DEFAULT_GROUP
  content: "rate_limit: 100"
gateway:
  upstream_timeout_ms: 1500
  routes:
    - prefix: /api/orders
      service: order-service
      strip_prefix: /api
"#;

    #[test]
    fn test_parse_full_settings() {
        let settings = MeshSettings::from_yaml_str(GATEWAY_YAML).expect("parse");
        settings.validate().expect("valid");

        assert_eq!(settings.nacos.server_addr, "10.0.0.5:8848");
        assert_eq!(settings.nacos.poll_interval_ms, 3000);
        assert_eq!(settings.request_timeout(), Duration::from_secs(2));
        assert_eq!(settings.upstream_timeout(), Duration::from_millis(1500));

        let instance = settings.instance();
        assert_eq!(instance.service_name, "gateway-service");
        assert_eq!(instance.group_name, DEFAULT_GROUP);
        assert!(instance.ephemeral);
        assert_eq!(instance.metadata.get("version").map(String::as_str), Some("v1"));

        let key = settings.config_key().expect("config key");
        assert_eq!(key.to_string(), "dev/DEFAULT_GROUP/gateway.yaml");

        let route = &settings.gateway.routes[0];
        assert_eq!(route.group, DEFAULT_GROUP);
        assert_eq!(route.strip_prefix.as_deref(), Some("/api"));
    }

    #[test]
    fn test_merge_replaces_present_sections_only() {
        let defaults = MeshSettings::from_yaml_str(GATEWAY_YAML).unwrap();
        let merged = defaults
            .merge_yaml(
                r#"
service:
  name: order-service
  port: 8082
"#,
            )
            .unwrap();

        assert_eq!(merged.service.name, "order-service");
        assert_eq!(merged.service.port, 8082);
        assert_eq!(merged.nacos.server_addr, "10.0.0.5:8848");
        assert_eq!(merged.config.data_id, "gateway.yaml");
    }

    #[test]
    fn test_load_with_defaults_from_files() {
        let dir = std::env::temp_dir().join(format!("mesh-settings-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let defaults = dir.join("defaults.yaml");
        let service = dir.join("user.yaml");
        std::fs::write(&defaults, GATEWAY_YAML).unwrap();
        std::fs::write(
            &service,
            "service:\n  name: user-service\n  port: 8081\nconfig:\n  data_id: user.yaml\n",
        )
        .unwrap();

        let settings = MeshSettings::load_with_defaults(&defaults, &service).unwrap();
        assert_eq!(settings.service.name, "user-service");
        assert_eq!(settings.config.data_id, "user.yaml");
        assert_eq!(settings.config.group, DEFAULT_GROUP);
        assert_eq!(settings.nacos.namespace, "dev");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let settings = MeshSettings::default();
        assert!(matches!(
            settings.validate(),
            Err(MeshError::InvalidConfiguration(_))
        ));

        let mut settings = MeshSettings::from_yaml_str(GATEWAY_YAML).unwrap();
        settings.gateway.routes[0].prefix = "api".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_invalid_configuration() {
        let result = MeshSettings::load("/nonexistent/mesh.yaml");
        assert!(matches!(result, Err(MeshError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_malformed_yaml_is_settings_error() {
        let result = MeshSettings::from_yaml_str("service: [unterminated");
        assert!(matches!(result, Err(MeshError::SettingsError(_))));
    }

    #[test]
    fn test_no_config_key_without_data_id() {
        assert!(MeshSettings::default().config_key().is_none());
    }

    #[test]
    fn test_settings_path_prefers_argument() {
        let args = vec!["mesh-gateway".to_string(), "gateway.yaml".to_string()];
        assert_eq!(settings_path(args, "config.yaml"), "gateway.yaml");
    }

    #[test]
    fn test_load_daemon_settings_validates() {
        let dir = std::env::temp_dir().join(format!("mesh-daemon-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("nameless.yaml");
        std::fs::write(&path, "service:\n  port: 8081\n").unwrap();

        let args = vec!["mesh-discovery".to_string(), path.display().to_string()];
        assert!(matches!(
            load_daemon_settings(args, "unused.yaml"),
            Err(MeshError::InvalidConfiguration(_))
        ));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_sample_deploy_files_are_valid() {
        for yaml in [
            include_str!("../../../deploy/gateway.yaml"),
            include_str!("../../../deploy/discovery.yaml"),
        ] {
            let settings = MeshSettings::default()
                .merge_yaml(include_str!("../../../deploy/defaults.yaml"))
                .and_then(|s| s.merge_yaml(yaml))
                .expect("parse");
            settings.validate().expect("valid");
            assert!(settings.config_key().is_some());
        }
    }
}

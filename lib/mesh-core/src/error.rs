use thiserror::Error;

pub type Result<T> = std::result::Result<T, MeshError>;

#[derive(Error, Debug)]
pub enum MeshError {
    #[error("Registration failed: {0}")]
    RegistrationError(String),

    #[error("Discovery failed: {0}")]
    DiscoveryError(String),

    #[error("Config publish failed: {0}")]
    PublishError(String),

    #[error("Config fetch failed: {0}")]
    FetchError(String),

    #[error("No healthy instance available for service: {0}")]
    NoInstanceAvailable(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Settings error: {0}")]
    SettingsError(#[from] serde_yaml::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MeshError {
    /// Errors that the original caller should see as 503 Service Unavailable
    pub fn is_service_unavailable(&self) -> bool {
        matches!(
            self,
            MeshError::DiscoveryError(_)
                | MeshError::NoInstanceAvailable(_)
                | MeshError::UpstreamUnavailable(_)
        )
    }
}

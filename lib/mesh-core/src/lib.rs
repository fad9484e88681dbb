//! Core registry and configuration propagation functionality
//!
//! This library provides:
//! - Service instance model and the naming capability used for discovery
//! - An in-process instance registry
//! - Config store capability, publisher and change poller
//! - Change dispatcher fanning out config updates to listeners
//! - YAML settings shared by the mesh daemons

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod instance;
pub mod naming;
pub mod poller;
pub mod registry;
pub mod settings;
pub mod store;

pub use config::{ConfigEntry, ConfigKey, ConfigPublisher, ConfigStore, Fingerprint};
pub use dispatcher::{
    ChangeDispatcher, ConfigListener, DispatchHandle, DispatchReport, FnListener, ListenerOutcome,
};
pub use error::{MeshError, Result};
pub use instance::{InstanceKey, ServiceInstance, DEFAULT_GROUP};
pub use naming::NamingService;
pub use poller::{ChangePoller, PollerConfig, PollerHandle};
pub use registry::InMemoryRegistry;
pub use settings::{load_daemon_settings, MeshSettings, RouteSettings};
pub use store::InMemoryConfigStore;

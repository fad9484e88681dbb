//! Nacos v1 Open API integration
pub mod client;
pub mod config;
pub mod model;
pub mod naming;

#[cfg(test)]
mod fake_server;

pub use client::NacosClient;
pub use config::NacosConfigClient;
pub use naming::NacosNamingClient;

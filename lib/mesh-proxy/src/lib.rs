//! Discovery-based HTTP invocation of peer services
pub mod forwarder;
pub mod http;
pub mod invoker;
pub mod metrics;

#[cfg(test)]
mod test_upstream;

pub use forwarder::RequestForwarder;
pub use invoker::DiscoveryInvoker;
pub use metrics::{ConfigChangeCounter, MetricsCollector};

//! Fan-out of config changes to subscribed listeners

use crate::ConfigKey;
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Listener invoked with the new content of a config key
#[async_trait::async_trait]
pub trait ConfigListener: Send + Sync {
    /// Name used in logs and dispatch reports
    fn name(&self) -> &str {
        "UnnamedListener"
    }

    /// Called with the latest content after a change was observed
    async fn on_change(&self, key: &ConfigKey, content: &str) -> anyhow::Result<()>;
}

/// Adapter turning an async closure into a `ConfigListener`
pub struct FnListener<F> {
    name: String,
    f: F,
}

impl<F> FnListener<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait::async_trait]
impl<F, Fut> ConfigListener for FnListener<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_change(&self, _key: &ConfigKey, content: &str) -> anyhow::Result<()> {
        (self.f)(content.to_string()).await
    }
}

/// Outcome of one listener invocation
#[derive(Clone, Debug, PartialEq)]
pub struct ListenerOutcome {
    pub listener: String,
    pub error: Option<String>,
}

impl ListenerOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Collected outcomes of one notification
#[derive(Clone, Debug)]
pub struct DispatchReport {
    pub key: ConfigKey,
    pub outcomes: Vec<ListenerOutcome>,
}

impl DispatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Handle on the listener tasks spawned by one notification
///
/// Dropping the handle detaches the tasks; they still run to completion.
pub struct DispatchHandle {
    key: ConfigKey,
    tasks: Vec<(String, JoinHandle<ListenerOutcome>)>,
}

impl DispatchHandle {
    pub fn listener_count(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every listener and collect their outcomes
    pub async fn join(self) -> DispatchReport {
        let mut outcomes = Vec::with_capacity(self.tasks.len());
        for (listener, task) in self.tasks {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) => ListenerOutcome {
                    listener,
                    error: Some(format!("listener task did not complete: {}", e)),
                },
            };
            outcomes.push(outcome);
        }
        DispatchReport {
            key: self.key,
            outcomes,
        }
    }
}

/// ChangeDispatcher keeps per-key listener lists and the last notified content
///
/// Construct one per process (or per test) and share it by `Arc`.
pub struct ChangeDispatcher {
    listeners: RwLock<HashMap<ConfigKey, Vec<Arc<dyn ConfigListener>>>>,
    current: RwLock<HashMap<ConfigKey, String>>,
}

impl ChangeDispatcher {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            current: RwLock::new(HashMap::new()),
        }
    }

    /// Append a listener for a key. No dedup.
    pub async fn subscribe(&self, key: ConfigKey, listener: Arc<dyn ConfigListener>) {
        let mut listeners = self.listeners.write().await;
        debug!("Listener {} subscribed to {}", listener.name(), key);
        listeners.entry(key).or_default().push(listener);
    }

    /// Subscribe an async closure
    pub async fn subscribe_fn<F, Fut>(&self, key: ConfigKey, name: impl Into<String>, f: F)
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.subscribe(key, Arc::new(FnListener::new(name, f))).await;
    }

    /// Number of listeners subscribed to a key
    pub async fn subscriber_count(&self, key: &ConfigKey) -> usize {
        let listeners = self.listeners.read().await;
        listeners.get(key).map(Vec::len).unwrap_or(0)
    }

    /// Spawn every listener of `key` with the new content, then record the
    /// content as current. Never waits for listeners.
    pub async fn notify(&self, key: &ConfigKey, content: String) -> DispatchHandle {
        let snapshot: Vec<Arc<dyn ConfigListener>> = {
            let listeners = self.listeners.read().await;
            listeners.get(key).cloned().unwrap_or_default()
        };

        debug!("Notifying {} listeners of {}", snapshot.len(), key);

        let tasks = snapshot
            .into_iter()
            .map(|listener| {
                let name = listener.name().to_string();
                let task = tokio::spawn(run_listener(listener, key.clone(), content.clone()));
                (name, task)
            })
            .collect();

        let mut current = self.current.write().await;
        current.insert(key.clone(), content);

        DispatchHandle {
            key: key.clone(),
            tasks,
        }
    }

    /// Last notified content of a key
    pub async fn current(&self, key: &ConfigKey) -> Option<String> {
        let current = self.current.read().await;
        current.get(key).cloned()
    }

    /// Snapshot of every key's last notified content
    pub async fn current_all(&self) -> HashMap<ConfigKey, String> {
        let current = self.current.read().await;
        current.clone()
    }
}

impl Default for ChangeDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_listener(
    listener: Arc<dyn ConfigListener>,
    key: ConfigKey,
    content: String,
) -> ListenerOutcome {
    let name = listener.name().to_string();
    let result = AssertUnwindSafe(listener.on_change(&key, &content))
        .catch_unwind()
        .await;

    let error = match result {
        Ok(Ok(())) => {
            debug!("Listener {} handled change of {}", name, key);
            None
        }
        Ok(Err(e)) => {
            warn!("Listener {} failed on change of {}: {:#}", name, key, e);
            Some(e.to_string())
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!("Listener {} panicked on change of {}: {}", name, key, message);
            Some(format!("panicked: {}", message))
        }
    };

    ListenerOutcome {
        listener: name,
        error,
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

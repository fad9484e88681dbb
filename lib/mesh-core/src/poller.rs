//! Polling-based config change detection

use crate::dispatcher::panic_message;
use crate::{ChangeDispatcher, ConfigEntry, ConfigKey, ConfigStore, DispatchHandle, Fingerprint, Result};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Poller configuration
#[derive(Clone, Debug)]
pub struct PollerConfig {
    /// Delay between two fetches
    pub interval: Duration,
    /// Optional upper bound on ticks after the baseline. `None` polls until cancelled.
    pub max_iterations: Option<u64>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_iterations: None,
        }
    }
}

/// ChangePoller watches one config key and forwards changes to the dispatcher
///
/// The first successful fetch is the baseline and is not notified. Every later
/// fetch whose fingerprint differs from the cached one replaces the cached
/// entry and produces exactly one notification.
pub struct ChangePoller {
    key: ConfigKey,
    store: Arc<dyn ConfigStore>,
    dispatcher: Arc<ChangeDispatcher>,
    config: PollerConfig,
    cached: Arc<RwLock<Option<ConfigEntry>>>,
}

impl ChangePoller {
    pub fn new(
        key: ConfigKey,
        store: Arc<dyn ConfigStore>,
        dispatcher: Arc<ChangeDispatcher>,
        config: PollerConfig,
    ) -> Self {
        Self {
            key,
            store,
            dispatcher,
            config,
            cached: Arc::new(RwLock::new(None)),
        }
    }

    pub fn key(&self) -> &ConfigKey {
        &self.key
    }

    /// Last observed entry, `None` until the baseline fetch succeeded
    pub async fn cached(&self) -> Option<ConfigEntry> {
        self.cached.read().await.clone()
    }

    /// Fetch once and compare against the cached fingerprint
    ///
    /// Returns the dispatch handle when a change was forwarded.
    pub async fn poll_once(&self) -> Result<Option<DispatchHandle>> {
        let content = self.store.fetch(&self.key).await?;
        Ok(self.observe(content).await)
    }

    /// Record fetched content and notify when its fingerprint moved
    ///
    /// The cached entry and the notification are updated together: callers
    /// must not abandon this future half way.
    async fn observe(&self, content: String) -> Option<DispatchHandle> {
        let fingerprint = Fingerprint::of(&content);

        let mut cached = self.cached.write().await;
        let previous = cached.as_ref().map(|entry| entry.fingerprint.clone());

        match previous {
            None => {
                info!("Config {} baseline fingerprint {}", self.key, fingerprint);
                *cached = Some(ConfigEntry::new(self.key.clone(), content));
                None
            }
            Some(previous) if previous == fingerprint => {
                debug!("Config {} unchanged ({})", self.key, fingerprint);
                None
            }
            Some(previous) => {
                info!(
                    "Config {} changed: {} -> {}",
                    self.key, previous, fingerprint
                );
                *cached = Some(ConfigEntry::new(self.key.clone(), content.clone()));
                drop(cached);

                Some(self.dispatcher.notify(&self.key, content).await)
            }
        }
    }

    /// Poll until `cancel` fires or the iteration bound is reached
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            "Config poller started for {} (interval {:?})",
            self.key, self.config.interval
        );

        if !self.tick(0, &cancel).await {
            info!("Config poller for {} cancelled before baseline", self.key);
            return;
        }

        let mut iteration: u64 = 0;
        loop {
            if let Some(max) = self.config.max_iterations {
                if iteration >= max {
                    info!("Config poller for {} reached {} iterations", self.key, max);
                    break;
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Config poller for {} stopped", self.key);
                    break;
                }
                _ = tokio::time::sleep(self.config.interval) => {}
            }

            iteration += 1;

            if !self.tick(iteration, &cancel).await {
                info!("Config poller for {} stopped", self.key);
                break;
            }
        }
    }

    /// Run the poller as a background task tied to a child of `cancel`
    pub fn spawn(self, cancel: &CancellationToken) -> PollerHandle {
        let token = cancel.child_token();
        let key = self.key.clone();
        let cached = self.cached.clone();
        let task = tokio::spawn(self.run(token.clone()));

        PollerHandle {
            key,
            cancel: token,
            cached,
            task,
        }
    }

    /// One guarded poll: fetch errors and panics are logged, never propagated
    ///
    /// Only the fetch races `cancel`. Once content is in hand it is always
    /// observed, so the cache never moves without its notification. Returns
    /// `false` when cancelled.
    async fn tick(&self, iteration: u64, cancel: &CancellationToken) -> bool {
        let fetched = tokio::select! {
            _ = cancel.cancelled() => return false,
            fetched = AssertUnwindSafe(self.store.fetch(&self.key)).catch_unwind() => fetched,
        };

        let content = match fetched {
            Ok(Ok(content)) => content,
            Ok(Err(e)) => {
                warn!("Config poll #{} for {} failed: {}", iteration, self.key, e);
                return true;
            }
            Err(panic) => {
                error!(
                    "Config poll #{} for {} panicked: {}",
                    iteration,
                    self.key,
                    panic_message(panic.as_ref())
                );
                return true;
            }
        };

        match AssertUnwindSafe(self.observe(content)).catch_unwind().await {
            Ok(Some(handle)) => {
                tokio::spawn(log_dispatch(handle));
            }
            Ok(None) => {}
            Err(panic) => {
                error!(
                    "Config poll #{} for {} panicked while dispatching: {}",
                    iteration,
                    self.key,
                    panic_message(panic.as_ref())
                );
            }
        }
        true
    }
}

async fn log_dispatch(handle: DispatchHandle) {
    let report = handle.join().await;
    if report.failed() > 0 {
        warn!(
            "Config change of {} delivered: {} succeeded, {} failed",
            report.key,
            report.succeeded(),
            report.failed()
        );
    } else {
        debug!(
            "Config change of {} delivered to {} listeners",
            report.key,
            report.succeeded()
        );
    }
}

/// Handle on a spawned poller
pub struct PollerHandle {
    key: ConfigKey,
    cancel: CancellationToken,
    cached: Arc<RwLock<Option<ConfigEntry>>>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn key(&self) -> &ConfigKey {
        &self.key
    }

    /// Last observed entry of the watched key
    pub async fn cached(&self) -> Option<ConfigEntry> {
        self.cached.read().await.clone()
    }

    /// Signal the poller to stop without waiting for it
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the poller task to exit
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!("Config poller for {} exited abnormally: {}", self.key, e);
        }
    }

    /// Stop and wait
    pub async fn shutdown(self) {
        self.stop();
        self.join().await;
    }
}

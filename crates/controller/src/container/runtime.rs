use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::types::ContainerEvent;
use super::types::ContainerInfo;

/// Delay before a dropped event stream is reopened.
const WATCH_RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Unsupported runtime host `{0}`")]
    UnsupportedHost(String),

    #[error("Runtime request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Runtime socket I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Runtime socket protocol error: {0}")]
    Protocol(#[from] hyper::Error),

    #[error("Invalid runtime request: {0}")]
    InvalidRequest(#[from] hyper::http::Error),

    #[error("Runtime returned {status} for {path}: {message}")]
    Status {
        status: u16,
        path: String,
        message: String,
    },

    #[error("Invalid runtime response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Runtime request to {path} timed out after {timeout:?}")]
    Timeout { path: String, timeout: Duration },

    #[error("No container runtime could list containers")]
    AllRuntimesFailed,
}

/// Source of container snapshots and lifecycle events.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Short runtime name used in logs.
    fn name(&self) -> &str;

    /// Whether the runtime answers at all.
    async fn is_available(&self) -> bool;

    /// Containers that carry one of the controller's selector labels.
    async fn list_containers(&self) -> Result<Vec<ContainerInfo>, RuntimeError>;

    async fn get_container(&self, id: &str) -> Result<ContainerInfo, RuntimeError>;

    /// Stream lifecycle events into `events` until the stream ends or `token`
    /// is cancelled.
    async fn watch(
        &self,
        events: mpsc::Sender<ContainerEvent>,
        token: CancellationToken,
    ) -> Result<(), RuntimeError>;
}

/// The set of runtimes that were reachable at startup.
#[derive(Clone, Default)]
pub struct RuntimeManager {
    runtimes: Vec<Arc<dyn ContainerRuntime>>,
}

impl RuntimeManager {
    pub fn new(runtimes: Vec<Arc<dyn ContainerRuntime>>) -> Self {
        Self { runtimes }
    }

    /// Keep only the candidates that respond.
    pub async fn detect(candidates: Vec<Arc<dyn ContainerRuntime>>) -> Self {
        let mut runtimes = Vec::with_capacity(candidates.len());
        for runtime in candidates {
            if runtime.is_available().await {
                info!(runtime = runtime.name(), "Container runtime available");
                runtimes.push(runtime);
            } else {
                warn!(runtime = runtime.name(), "Container runtime not available");
            }
        }
        Self { runtimes }
    }

    pub fn is_empty(&self) -> bool {
        self.runtimes.is_empty()
    }

    pub fn available_runtimes(&self) -> Vec<String> {
        self.runtimes.iter().map(|r| r.name().to_string()).collect()
    }

    /// Containers from every runtime, de-duplicated by id.
    ///
    /// A failing runtime is logged and skipped; the call only fails when every
    /// runtime failed.
    pub async fn list_containers(&self) -> Result<Vec<ContainerInfo>, RuntimeError> {
        let mut containers = BTreeMap::new();
        let mut failures = 0;

        for runtime in &self.runtimes {
            match runtime.list_containers().await {
                Ok(listed) => {
                    for container in listed {
                        containers.insert(container.id.clone(), container);
                    }
                }
                Err(e) => {
                    error!(runtime = runtime.name(), "Failed to list containers: {e}");
                    failures += 1;
                }
            }
        }

        if failures > 0 && failures == self.runtimes.len() {
            return Err(RuntimeError::AllRuntimesFailed);
        }
        Ok(containers.into_values().collect())
    }

    /// Start one watcher task per runtime, each reconnecting until cancelled.
    pub fn spawn_watchers(
        &self,
        events: mpsc::Sender<ContainerEvent>,
        token: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        self.runtimes
            .iter()
            .cloned()
            .map(|runtime| {
                let events = events.clone();
                let token = token.clone();
                tokio::spawn(watch_with_reconnect(runtime, events, token))
            })
            .collect()
    }
}

async fn watch_with_reconnect(
    runtime: Arc<dyn ContainerRuntime>,
    events: mpsc::Sender<ContainerEvent>,
    token: CancellationToken,
) {
    info!(runtime = runtime.name(), "Starting container event watcher");
    loop {
        match runtime.watch(events.clone(), token.clone()).await {
            Ok(()) if token.is_cancelled() || events.is_closed() => break,
            Ok(()) => warn!(runtime = runtime.name(), "Event stream ended, reconnecting"),
            Err(e) => error!(runtime = runtime.name(), "Event stream failed: {e}"),
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(WATCH_RECONNECT_DELAY) => {}
        }
    }
    info!(runtime = runtime.name(), "Container event watcher stopped");
}

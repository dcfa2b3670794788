//! The convergence loop: periodic full resyncs plus event-driven updates.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use derive_more::Display;
use error_stack::Report;
use pfsense_api::HaproxyApi;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::container::ContainerEvent;
use crate::container::ContainerEventKind;
use crate::container::ContainerInfo;
use crate::container::RuntimeManager;
use crate::haproxy::HaproxyManager;
use crate::metrics::SyncStats;

const EVENT_CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Display)]
pub enum ControllerError {
    #[display("no container runtime available")]
    NoRuntimes,
}

impl core::error::Error for ControllerError {}

pub struct Controller<C> {
    manager: Arc<HaproxyManager<C>>,
    runtimes: RuntimeManager,
    stats: Arc<SyncStats>,
    poll_interval: Duration,
}

impl<C: HaproxyApi + 'static> Controller<C> {
    pub fn new(
        manager: Arc<HaproxyManager<C>>,
        runtimes: RuntimeManager,
        stats: Arc<SyncStats>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            manager,
            runtimes,
            stats,
            poll_interval,
        }
    }

    pub fn stats(&self) -> &Arc<SyncStats> {
        &self.stats
    }

    /// Run until `token` is cancelled.
    ///
    /// # Errors
    ///
    /// - [`ControllerError::NoRuntimes`] if no container runtime was detected
    pub async fn run(&self, token: CancellationToken) -> Result<(), Report<ControllerError>> {
        if self.runtimes.is_empty() {
            return Err(Report::new(ControllerError::NoRuntimes));
        }
        info!(
            runtimes = ?self.runtimes.available_runtimes(),
            poll_interval = ?self.poll_interval,
            "Starting controller"
        );

        for (endpoint, result) in self.manager.health_check().await {
            if result.is_ok() {
                info!(endpoint = %endpoint, "Endpoint reachable");
            }
        }

        let (sender, mut events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let watchers = self.runtimes.spawn_watchers(sender, token.clone());

        self.full_sync(&token).await;

        let mut watching = true;
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Controller cancelled");
                    break;
                }
                _ = ticker.tick() => self.full_sync(&token).await,
                event = events.recv(), if watching => match event {
                    Some(event) => self.handle_event(event, &token).await,
                    None => {
                        warn!("All event watchers stopped, continuing with periodic sync only");
                        watching = false;
                    }
                },
            }
        }

        for watcher in watchers {
            if let Err(e) = watcher.await {
                error!("Event watcher task failed: {e}");
            }
        }
        Ok(())
    }

    /// Sync every running container once.
    pub async fn full_sync(&self, token: &CancellationToken) {
        debug!("Starting full sync");
        let containers = match self.runtimes.list_containers().await {
            Ok(containers) => containers,
            Err(e) => {
                error!("Failed to list containers: {e}");
                self.stats.record_errors(1);
                return;
            }
        };

        let mut synced = 0u64;
        let mut failed = 0u64;
        for container in &containers {
            if token.is_cancelled() {
                info!("Full sync interrupted by cancellation");
                break;
            }
            if !container.is_running() {
                debug!(container = %container.name, state = %container.state, "Skipping container that is not running");
                continue;
            }
            if self.sync_one(container, token).await {
                synced += 1;
            } else {
                failed += 1;
            }
        }

        self.stats.record_errors(failed);
        self.stats.record_sync(Utc::now());
        info!(
            containers = containers.len(),
            synced, failed, "Full sync completed"
        );
    }

    async fn handle_event(&self, event: ContainerEvent, token: &CancellationToken) {
        debug!(container = %event.container.name, event = %event.kind, "Handling container event");
        match event.kind {
            ContainerEventKind::Start | ContainerEventKind::Update => {
                if !event.container.is_running() {
                    debug!(container = %event.container.name, "Container no longer running, skipping");
                    return;
                }
                if !self.sync_one(&event.container, token).await {
                    self.stats.record_errors(1);
                }
            }
            ContainerEventKind::Stop | ContainerEventKind::Destroy => {
                self.manager.remove_container(&event.container);
            }
        }
    }

    async fn sync_one(&self, container: &ContainerInfo, token: &CancellationToken) -> bool {
        match self.manager.sync_container(container, token).await {
            Ok(_) => true,
            Err(report) => {
                error!(container = %container.name, "Failed to sync container: {report:?}");
                false
            }
        }
    }
}

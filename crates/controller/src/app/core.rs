use std::sync::Arc;

use anyhow::Result;
use pfsense_api::PfSenseClient;

use crate::app::tasks::Tasks;
use crate::config::Settings;
use crate::container::RuntimeManager;
use crate::controller::Controller;
use crate::haproxy::HaproxyManager;
use crate::metrics::SyncStats;

/// Application core structure with explicit dependencies
pub struct Application {
    settings: Settings,
    manager: Arc<HaproxyManager<PfSenseClient>>,
    runtimes: RuntimeManager,
    stats: Arc<SyncStats>,
    controller: Arc<Controller<PfSenseClient>>,
}

impl Application {
    pub fn new(
        settings: Settings,
        manager: Arc<HaproxyManager<PfSenseClient>>,
        runtimes: RuntimeManager,
        stats: Arc<SyncStats>,
        controller: Arc<Controller<PfSenseClient>>,
    ) -> Self {
        Self {
            settings,
            manager,
            runtimes,
            stats,
            controller,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn manager(&self) -> &Arc<HaproxyManager<PfSenseClient>> {
        &self.manager
    }

    pub fn runtimes(&self) -> &RuntimeManager {
        &self.runtimes
    }

    pub fn stats(&self) -> &Arc<SyncStats> {
        &self.stats
    }

    pub fn controller(&self) -> &Arc<Controller<PfSenseClient>> {
        &self.controller
    }

    /// Run application, start all tasks and wait for completion
    pub async fn run(&self) -> Result<()> {
        tracing::info!("Starting all application tasks...");

        let mut tasks = Tasks::new();
        tasks.spawn_all_tasks(self);

        if let Err(e) = tasks.wait_for_completion().await {
            tracing::error!("Error during task execution: {}", e);
            return Err(e);
        }

        let snapshot = self.stats.snapshot();
        tracing::info!(
            syncs = snapshot.syncs_total,
            errors = snapshot.errors_total,
            "Application run completed"
        );
        Ok(())
    }
}

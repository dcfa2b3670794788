use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use pfsense_api::PfSenseClient;

use super::core::Application;
use crate::config::Settings;
use crate::container::ContainerRuntime;
use crate::container::DockerRuntime;
use crate::container::RuntimeManager;
use crate::controller::Controller;
use crate::haproxy::Endpoint;
use crate::haproxy::EndpointRouter;
use crate::haproxy::HaproxyManager;
use crate::labels::ENABLE_LABEL;
use crate::labels::TRAEFIK_ENABLE_LABEL;
use crate::labels::TRUE_VALUE;
use crate::labels::LabelTranslator;
use crate::metrics::SyncStats;

/// Application builder
pub struct ApplicationBuilder {
    settings: Settings,
}

impl ApplicationBuilder {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Build every component; fails when no runtime or endpoint is usable.
    pub async fn build(self) -> Result<Application> {
        tracing::info!("Building application components...");

        let router = self.create_router()?;
        let manager = Arc::new(HaproxyManager::new(
            router,
            LabelTranslator::new(self.settings.traefik_compat_mode),
            self.settings.retry_policy,
        ));

        let runtimes = self.detect_runtimes().await?;
        let stats = Arc::new(SyncStats::new());
        let controller = Arc::new(Controller::new(
            manager.clone(),
            runtimes.clone(),
            stats.clone(),
            self.settings.poll_interval,
        ));

        Ok(Application::new(
            self.settings,
            manager,
            runtimes,
            stats,
            controller,
        ))
    }

    fn create_router(&self) -> Result<EndpointRouter<PfSenseClient>> {
        let mut endpoints = Vec::with_capacity(self.settings.endpoints.len());
        for endpoint in &self.settings.endpoints {
            let client = PfSenseClient::new(&endpoint.client).map_err(|e| {
                anyhow::anyhow!("Failed to create client for endpoint {}: {e:?}", endpoint.name)
            })?;
            tracing::info!(
                endpoint = %endpoint.name,
                url = %endpoint.client.base_url,
                "Configured pfSense endpoint"
            );
            endpoints.push(Endpoint {
                name: endpoint.name.clone(),
                client,
            });
        }
        Ok(EndpointRouter::new(endpoints))
    }

    async fn detect_runtimes(&self) -> Result<RuntimeManager> {
        let mut selectors = vec![format!("{ENABLE_LABEL}={TRUE_VALUE}")];
        if self.settings.traefik_compat_mode {
            selectors.push(format!("{TRAEFIK_ENABLE_LABEL}={TRUE_VALUE}"));
        }

        let docker = DockerRuntime::new(&self.settings.docker_host, selectors)
            .with_context(|| format!("Invalid docker host {}", self.settings.docker_host))?;
        let candidates: Vec<Arc<dyn ContainerRuntime>> = vec![Arc::new(docker)];

        let runtimes = RuntimeManager::detect(candidates).await;
        if runtimes.is_empty() {
            anyhow::bail!(
                "No container runtime available at {}",
                self.settings.docker_host
            );
        }
        Ok(runtimes)
    }
}

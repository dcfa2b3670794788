use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::ApiServer;
use crate::api::OpsState;
use crate::app::core::Application;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Task manager, responsible for starting and supervising background tasks
pub struct Tasks {
    pub tasks: Vec<JoinHandle<Result<()>>>,
    cancellation_token: CancellationToken,
}

impl Default for Tasks {
    fn default() -> Self {
        Self::new()
    }
}

impl Tasks {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn spawn_all_tasks(&mut self, app: &Application) {
        let api_server_task = self.spawn_api_server_task(app);
        self.tasks.push(api_server_task);

        let controller_task = self.spawn_controller_task(app);
        self.tasks.push(controller_task);
    }

    /// Wait for a shutdown signal or for any task to stop on its own.
    ///
    /// A task stopping early cancels the others and is reported as an error.
    pub async fn wait_for_completion(&mut self) -> Result<()> {
        let signal_handler = {
            #[cfg(unix)]
            {
                use tokio::signal::unix::signal;
                use tokio::signal::unix::SignalKind;
                let mut sigterm = signal(SignalKind::terminate())?;
                let mut sigint = signal(SignalKind::interrupt())?;

                tokio::spawn(async move {
                    tokio::select! {
                        _ = sigterm.recv() => {
                            tracing::info!("Received SIGTERM, initiating graceful shutdown");
                        }
                        _ = sigint.recv() => {
                            tracing::info!("Received SIGINT, initiating graceful shutdown");
                        }
                    }
                })
            }
            #[cfg(not(unix))]
            {
                tokio::spawn(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!("Failed to listen for Ctrl+C: {e}");
                    }
                    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
                })
            }
        };

        let finished = tokio::select! {
            _ = signal_handler => None,
            (result, index, _) = futures::future::select_all(self.tasks.iter_mut()) => {
                Some((index, result))
            }
        };

        self.cancellation_token.cancel();
        let Some((index, result)) = finished else {
            tracing::info!("Shutdown signal received, cancelling all tasks");
            self.wait_for_tasks_with_timeout(SHUTDOWN_TIMEOUT).await;
            return Ok(());
        };

        // a finished handle must not be awaited again
        self.tasks.remove(index);
        self.wait_for_tasks_with_timeout(SHUTDOWN_TIMEOUT).await;
        match result {
            Ok(Ok(())) => Err(anyhow::anyhow!("Task completed unexpectedly")),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(anyhow::anyhow!("Task panicked: {e}")),
        }
    }

    async fn wait_for_tasks_with_timeout(&mut self, timeout: Duration) {
        tokio::time::timeout(timeout, async {
            for task in &mut self.tasks {
                match task.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::error!("Task failed during shutdown: {e:#}"),
                    Err(e) => tracing::error!("Task panicked during shutdown: {e}"),
                }
            }
        })
        .await
        .unwrap_or_else(|_| {
            tracing::warn!("Task shutdown timed out after {:?}", timeout);
        });
    }

    fn spawn_api_server_task(&self, app: &Application) -> JoinHandle<Result<()>> {
        let listen_addr = format!("0.0.0.0:{}", app.settings().health_port);
        let state = OpsState {
            manager: app.manager().clone(),
            runtimes: app.runtimes().clone(),
            stats: app.stats().clone(),
        };
        let token = self.cancellation_token.clone();

        tokio::spawn(async move {
            tracing::info!("Starting ops server on {}", listen_addr);
            ApiServer::new(state, listen_addr)
                .run(token)
                .await
                .map_err(|e| anyhow::anyhow!("Ops server failed: {e:?}"))?;
            tracing::info!("Ops server completed");
            Ok(())
        })
    }

    fn spawn_controller_task(&self, app: &Application) -> JoinHandle<Result<()>> {
        let controller = app.controller().clone();
        let token = self.cancellation_token.clone();

        tokio::spawn(async move {
            tracing::info!("Starting controller task");
            controller
                .run(token)
                .await
                .map_err(|e| anyhow::anyhow!("Controller failed: {e:?}"))?;
            tracing::info!("Controller task completed");
            Ok(())
        })
    }
}

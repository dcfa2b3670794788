use std::sync::Arc;
use std::time::Duration;

use error_stack::Report;
use pfsense_api::HaproxyApi;
use poem::get;
use poem::listener::Listener;
use poem::listener::TcpListener;
use poem::middleware::Tracing;
use poem::Endpoint;
use poem::EndpointExt;
use poem::Route;
use poem::Server;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;

use super::errors::OpsError;
use super::handlers;
use crate::container::RuntimeManager;
use crate::haproxy::HaproxyManager;
use crate::metrics::SyncStats;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything the ops handlers read.
pub struct OpsState<C> {
    pub manager: Arc<HaproxyManager<C>>,
    pub runtimes: RuntimeManager,
    pub stats: Arc<SyncStats>,
}

impl<C> Clone for OpsState<C> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
            runtimes: self.runtimes.clone(),
            stats: self.stats.clone(),
        }
    }
}

/// HTTP server for `/health`, `/ready` and `/metrics`
pub struct ApiServer<C> {
    state: OpsState<C>,
    listen_addr: String,
}

impl<C: HaproxyApi + 'static> ApiServer<C> {
    pub fn new(state: OpsState<C>, listen_addr: String) -> Self {
        Self { state, listen_addr }
    }

    pub fn routes(&self) -> impl Endpoint {
        Route::new()
            .at("/health", get(handlers::health::<C>::default()))
            .at("/ready", get(handlers::ready::<C>::default()))
            .at("/metrics", get(handlers::metrics::<C>::default()))
            .data(self.state.clone())
            .with(Tracing)
    }

    /// Serve until `token` is cancelled.
    ///
    /// # Errors
    ///
    /// - [`OpsError::Bind`] if the listen address cannot be bound
    /// - [`OpsError::Server`] if the server stops with an error
    pub async fn run(self, token: CancellationToken) -> Result<(), Report<OpsError>> {
        let acceptor = TcpListener::bind(&self.listen_addr)
            .into_acceptor()
            .await
            .map_err(|e| {
                Report::new(e).change_context(OpsError::Bind {
                    addr: self.listen_addr.clone(),
                })
            })?;
        info!("Ops server listening on {}", self.listen_addr);

        Server::new_with_acceptor(acceptor)
            .run_with_graceful_shutdown(self.routes(), token.cancelled(), Some(SHUTDOWN_TIMEOUT))
            .await
            .map_err(|e| {
                error!("Ops server failed: {e}");
                Report::new(OpsError::Server {
                    message: e.to_string(),
                })
            })?;

        info!("Ops server stopped");
        Ok(())
    }
}

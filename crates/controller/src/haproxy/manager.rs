//! Per-container reconciliation against a pfSense endpoint.

use std::future::Future;

use derive_more::Display;
use error_stack::Report;
use error_stack::ResultExt;
use pfsense_api::ApiResult;
use pfsense_api::Backend;
use pfsense_api::Frontend;
use pfsense_api::HaproxyApi;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::builder::desired_backend;
use super::builder::desired_frontend;
use super::retry::retry;
use super::retry::RetryPolicy;
use super::router::Endpoint;
use super::router::EndpointRouter;
use crate::container::ContainerInfo;
use crate::labels::LabelTranslator;
use crate::labels::ManagedNames;

#[derive(Debug, Display)]
pub enum SyncError {
    #[display("invalid labels on container {container}")]
    InvalidLabels { container: String },
    #[display("no endpoint available for container {container}")]
    Routing { container: String },
    #[display("{operation} failed on endpoint {endpoint}")]
    Remote {
        endpoint: String,
        operation: &'static str,
    },
    #[display("existing {kind} `{name}` on endpoint {endpoint} has no id")]
    MissingRemoteId {
        endpoint: String,
        kind: &'static str,
        name: String,
    },
}

impl core::error::Error for SyncError {}

pub type SyncResult<T> = Result<T, Report<SyncError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BackendChange {
    #[display("created")]
    Created,
    #[display("updated")]
    Updated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum FrontendChange {
    #[display("created")]
    Created,
    #[display("appended {acls} acl(s) and {actions} action(s)")]
    Appended { acls: usize, actions: usize },
    #[display("unchanged")]
    Unchanged,
}

/// What a container sync did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The container carries no controller labels.
    Skipped,
    Synced {
        endpoint: String,
        backend: BackendChange,
        frontend: FrontendChange,
    },
}

/// Object counts reported by one endpoint; `None` when listing failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointStats {
    pub endpoint: String,
    pub backends: Option<usize>,
    pub frontends: Option<usize>,
}

/// Drives remote HAProxy configuration towards what container labels declare.
pub struct HaproxyManager<C> {
    router: EndpointRouter<C>,
    translator: LabelTranslator,
    retry_policy: RetryPolicy,
}

impl<C: HaproxyApi> HaproxyManager<C> {
    pub fn new(
        router: EndpointRouter<C>,
        translator: LabelTranslator,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            router,
            translator,
            retry_policy,
        }
    }

    pub fn router(&self) -> &EndpointRouter<C> {
        &self.router
    }

    /// Converge backend, then frontend, then commit with one apply.
    ///
    /// Existing frontends are only ever appended to, never overwritten.
    #[tracing::instrument(skip_all, fields(container = %container.name))]
    pub async fn sync_container(
        &self,
        container: &ContainerInfo,
        token: &CancellationToken,
    ) -> SyncResult<SyncOutcome> {
        let config = self
            .translator
            .translate(container)
            .change_context_lazy(|| SyncError::InvalidLabels {
                container: container.name.clone(),
            })?;
        let Some(config) = config else {
            debug!("Container has no applicable labels, skipping");
            return Ok(SyncOutcome::Skipped);
        };

        let endpoint = self
            .router
            .resolve(&config.endpoint_name)
            .change_context_lazy(|| SyncError::Routing {
                container: container.name.clone(),
            })?;

        debug!(
            endpoint = %endpoint.name,
            mode = %config.parse_mode,
            backend = %config.backend.name,
            frontend = %config.frontend.name,
            "Syncing container"
        );

        let backend = self
            .sync_backend(endpoint, desired_backend(&config.backend), token)
            .await?;
        let frontend = self
            .sync_frontend(endpoint, desired_frontend(&config), token)
            .await?;

        self.call(endpoint, "apply changes", token, || {
            endpoint.client.apply_changes()
        })
        .await?;

        info!(
            endpoint = %endpoint.name,
            backend = %config.backend.name,
            frontend = %config.frontend.name,
            backend_change = %backend,
            frontend_change = %frontend,
            "Container synced"
        );

        Ok(SyncOutcome::Synced {
            endpoint: endpoint.name.clone(),
            backend,
            frontend,
        })
    }

    /// Handle a stopped or destroyed container.
    ///
    /// Remote objects are left in place; the operator removes them by hand.
    pub fn remove_container(&self, container: &ContainerInfo) -> Option<ManagedNames> {
        let Some(names) = self.translator.managed_names(container) else {
            debug!(container = %container.name, "Removed container was not managed");
            return None;
        };
        warn!(
            container = %container.name,
            endpoint = %names.endpoint_name,
            backend = %names.backend,
            frontend = names.frontend.as_deref().unwrap_or("-"),
            acl = names.acl.as_deref().unwrap_or("-"),
            "Container removed, manual cleanup required"
        );
        Some(names)
    }

    /// List backends on every endpoint, returning the outcome per endpoint.
    pub async fn health_check(&self) -> Vec<(String, ApiResult<()>)> {
        let mut results = Vec::with_capacity(self.router.endpoints().len());
        for endpoint in self.router.endpoints() {
            let result = endpoint.client.list_backends().await.map(|_| ());
            if let Err(report) = &result {
                warn!(endpoint = %endpoint.name, "Endpoint health check failed: {report:?}");
            }
            results.push((endpoint.name.clone(), result));
        }
        results
    }

    /// Backend and frontend counts per endpoint.
    pub async fn endpoint_stats(&self) -> Vec<EndpointStats> {
        let mut stats = Vec::with_capacity(self.router.endpoints().len());
        for endpoint in self.router.endpoints() {
            let backends = endpoint.client.list_backends().await.ok().map(|b| b.len());
            let frontends = endpoint.client.list_frontends().await.ok().map(|f| f.len());
            stats.push(EndpointStats {
                endpoint: endpoint.name.clone(),
                backends,
                frontends,
            });
        }
        stats
    }

    async fn sync_backend(
        &self,
        endpoint: &Endpoint<C>,
        desired: Backend,
        token: &CancellationToken,
    ) -> SyncResult<BackendChange> {
        let client = &endpoint.client;
        let existing = self
            .call(endpoint, "find backend", token, || client.find_backend(&desired.name))
            .await?;

        match existing {
            None => {
                self.call(endpoint, "create backend", token, || {
                    client.create_backend(&desired)
                })
                .await?;
                Ok(BackendChange::Created)
            }
            Some(current) => {
                let id = current.id.ok_or_else(|| {
                    Report::new(SyncError::MissingRemoteId {
                        endpoint: endpoint.name.clone(),
                        kind: "backend",
                        name: current.name.clone(),
                    })
                })?;
                let update = Backend {
                    id: Some(id),
                    ..desired
                };
                self.call(endpoint, "update backend", token, || {
                    client.update_backend(&update)
                })
                .await?;
                Ok(BackendChange::Updated)
            }
        }
    }

    async fn sync_frontend(
        &self,
        endpoint: &Endpoint<C>,
        desired: Frontend,
        token: &CancellationToken,
    ) -> SyncResult<FrontendChange> {
        let client = &endpoint.client;
        let existing = self
            .call(endpoint, "find frontend", token, || {
                client.find_frontend(&desired.name)
            })
            .await?;

        let Some(current) = existing else {
            self.call(endpoint, "create frontend", token, || {
                client.create_frontend(&desired)
            })
            .await?;
            return Ok(FrontendChange::Created);
        };

        let id = current.id.ok_or_else(|| {
            Report::new(SyncError::MissingRemoteId {
                endpoint: endpoint.name.clone(),
                kind: "frontend",
                name: current.name.clone(),
            })
        })?;

        let mut acls = 0;
        for acl in &desired.acls {
            if current.acls.iter().any(|existing| existing.same_rule(acl)) {
                continue;
            }
            self.call(endpoint, "add frontend acl", token, || {
                client.add_frontend_acl(id, acl)
            })
            .await?;
            acls += 1;
        }

        let mut actions = 0;
        for action in &desired.actions {
            if current
                .actions
                .iter()
                .any(|existing| existing.same_binding(action))
            {
                continue;
            }
            self.call(endpoint, "add frontend action", token, || {
                client.add_frontend_action(id, action)
            })
            .await?;
            actions += 1;
        }

        if acls == 0 && actions == 0 {
            Ok(FrontendChange::Unchanged)
        } else {
            Ok(FrontendChange::Appended { acls, actions })
        }
    }

    async fn call<T, F, Fut>(
        &self,
        endpoint: &Endpoint<C>,
        operation: &'static str,
        token: &CancellationToken,
        call: F,
    ) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        retry(&self.retry_policy, token, operation, call)
            .await
            .change_context_lazy(|| SyncError::Remote {
                endpoint: endpoint.name.clone(),
                operation,
            })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use pfsense_api::Acl;
    use pfsense_api::Action;
    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;
    use crate::container::NetworkInfo;
    use crate::haproxy::fake::FakeHaproxy;
    use crate::labels::BACKEND_PORT_LABEL;
    use crate::labels::ENABLE_LABEL;
    use crate::labels::ENDPOINT_LABEL;
    use crate::labels::FRONTEND_NAME_LABEL;
    use crate::labels::FRONTEND_RULE_LABEL;

    fn container(name: &str, ip: &str, labels: &[(&str, &str)]) -> ContainerInfo {
        ContainerInfo {
            id: format!("{name}-id"),
            name: name.to_string(),
            state: "running".to_string(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            networks: BTreeMap::from([(
                "bridge".to_string(),
                NetworkInfo {
                    ip_address: ip.to_string(),
                    gateway: String::new(),
                },
            )]),
            ..ContainerInfo::default()
        }
    }

    fn managed(name: &str, ip: &str, rule: &str, frontend: &str) -> ContainerInfo {
        container(
            name,
            ip,
            &[
                (ENABLE_LABEL, "true"),
                (BACKEND_PORT_LABEL, "8080"),
                (FRONTEND_RULE_LABEL, rule),
                (FRONTEND_NAME_LABEL, frontend),
            ],
        )
    }

    fn manager(endpoints: Vec<(&str, FakeHaproxy)>) -> HaproxyManager<FakeHaproxy> {
        let router = EndpointRouter::new(
            endpoints
                .into_iter()
                .map(|(name, client)| Endpoint {
                    name: name.to_string(),
                    client,
                })
                .collect(),
        );
        HaproxyManager::new(
            router,
            LabelTranslator::new(false),
            RetryPolicy::new(3, Duration::from_millis(1)),
        )
    }

    fn fake(manager: &HaproxyManager<FakeHaproxy>, index: usize) -> &FakeHaproxy {
        &manager.router().endpoints()[index].client
    }

    #[test(tokio::test)]
    async fn new_container_creates_backend_and_frontend() {
        // Arrange
        let manager = manager(vec![("default", FakeHaproxy::default())]);
        let token = CancellationToken::new();
        let web = managed("web", "172.17.0.2", "Host(`web.example.com`)", "public");

        // Act
        let outcome = manager
            .sync_container(&web, &token)
            .await
            .expect("sync succeeds");

        // Assert
        assert_eq!(
            outcome,
            SyncOutcome::Synced {
                endpoint: "default".to_string(),
                backend: BackendChange::Created,
                frontend: FrontendChange::Created,
            }
        );
        let state = fake(&manager, 0).state();
        assert_eq!(state.backends.len(), 1);
        assert_eq!(state.backends[0].name, "web-backend");
        assert_eq!(state.frontends.len(), 1);
        assert_eq!(state.frontends[0].acls.len(), 1);
        assert_eq!(state.applied, 1, "exactly one apply per sync");
        assert_eq!(
            state.calls,
            vec![
                "list_backends",
                "create_backend",
                "list_frontends",
                "create_frontend",
                "apply_changes"
            ],
            "backend must be converged before frontend"
        );
    }

    #[test(tokio::test)]
    async fn shared_frontend_accumulates_rules() {
        // Arrange
        let manager = manager(vec![("default", FakeHaproxy::default())]);
        let token = CancellationToken::new();
        let web = managed("web", "172.17.0.2", "Host(`web.example.com`)", "shared");
        let api = managed("api", "172.17.0.3", "PathPrefix(`/api`)", "shared");

        // Act
        manager.sync_container(&web, &token).await.expect("web");
        let outcome = manager.sync_container(&api, &token).await.expect("api");

        // Assert
        assert_eq!(
            outcome,
            SyncOutcome::Synced {
                endpoint: "default".to_string(),
                backend: BackendChange::Created,
                frontend: FrontendChange::Appended {
                    acls: 1,
                    actions: 1
                },
            }
        );
        let state = fake(&manager, 0).state();
        assert_eq!(state.frontends.len(), 1, "one shared frontend");
        let frontend = &state.frontends[0];
        assert_eq!(
            frontend
                .acls
                .iter()
                .map(|acl| (acl.expression.as_str(), acl.value.as_str()))
                .collect::<Vec<_>>(),
            vec![
                ("host_matches", "web.example.com"),
                ("path_beg", "/api")
            ]
        );
        assert_eq!(
            frontend
                .actions
                .iter()
                .map(|action| (action.acl.as_str(), action.backend.as_str()))
                .collect::<Vec<_>>(),
            vec![
                ("auto-acl-web-example-com", "web-backend"),
                ("auto-acl-api", "api-backend")
            ]
        );
    }

    #[test(tokio::test)]
    async fn existing_backend_is_updated_with_its_id() {
        // Arrange
        let remote = FakeHaproxy::default().with_backend(Backend {
            name: "web-backend".to_string(),
            check_type: "HTTP".to_string(),
            ..Backend::default()
        });
        let manager = manager(vec![("default", remote)]);
        let token = CancellationToken::new();
        let web = managed("web", "172.17.0.9", "Host(`web.example.com`)", "public");

        // Act
        let outcome = manager.sync_container(&web, &token).await.expect("sync");

        // Assert
        assert!(matches!(
            outcome,
            SyncOutcome::Synced {
                backend: BackendChange::Updated,
                ..
            }
        ));
        let remote = fake(&manager, 0);
        assert_eq!(remote.calls_of("create_backend"), 0, "never re-created");
        let state = remote.state();
        assert_eq!(state.backends.len(), 1);
        assert_eq!(state.backends[0].id, Some(0));
        assert_eq!(state.backends[0].check_type, "Basic");
        assert_eq!(state.backends[0].servers[0].address, "172.17.0.9");
    }

    #[test(tokio::test)]
    async fn resync_is_idempotent_for_frontend_rules() {
        let manager = manager(vec![("default", FakeHaproxy::default())]);
        let token = CancellationToken::new();
        let web = managed("web", "172.17.0.2", "Host(`web.example.com`)", "public");

        manager.sync_container(&web, &token).await.expect("first");
        let outcome = manager.sync_container(&web, &token).await.expect("second");

        assert_eq!(
            outcome,
            SyncOutcome::Synced {
                endpoint: "default".to_string(),
                backend: BackendChange::Updated,
                frontend: FrontendChange::Unchanged,
            }
        );
        let state = fake(&manager, 0).state();
        assert_eq!(state.frontends[0].acls.len(), 1);
        assert_eq!(state.frontends[0].actions.len(), 1);
        assert_eq!(state.applied, 2);
    }

    #[test(tokio::test)]
    async fn existing_rules_are_never_removed() {
        let remote = FakeHaproxy::default().with_frontend(Frontend {
            name: "public".to_string(),
            acls: vec![Acl {
                id: Some(0),
                name: "manual-acl".to_string(),
                expression: "host_matches".to_string(),
                value: "manual.example.com".to_string(),
            }],
            actions: vec![Action {
                id: Some(0),
                action: "use_backend".to_string(),
                acl: "manual-acl".to_string(),
                backend: "manual-backend".to_string(),
            }],
            ..Frontend::default()
        });
        let manager = manager(vec![("default", remote)]);
        let token = CancellationToken::new();
        let web = managed("web", "172.17.0.2", "Host(`web.example.com`)", "public");

        manager.sync_container(&web, &token).await.expect("sync");

        let state = fake(&manager, 0).state();
        assert_eq!(state.frontends[0].acls.len(), 2);
        assert_eq!(state.frontends[0].acls[0].name, "manual-acl");
        assert_eq!(state.frontends[0].actions.len(), 2);
    }

    #[test(tokio::test)]
    async fn unknown_endpoint_falls_back_to_default() {
        let manager = manager(vec![("default", FakeHaproxy::default())]);
        let token = CancellationToken::new();
        let mut web = managed("web", "172.17.0.2", "Host(`web.example.com`)", "public");
        web.labels
            .insert(ENDPOINT_LABEL.to_string(), "staging".to_string());

        let outcome = manager.sync_container(&web, &token).await.expect("sync");

        assert!(matches!(
            outcome,
            SyncOutcome::Synced { endpoint, .. } if endpoint == "default"
        ));
    }

    #[test(tokio::test)]
    async fn named_endpoint_receives_the_objects() {
        let manager = manager(vec![
            ("default", FakeHaproxy::default()),
            ("edge", FakeHaproxy::default()),
        ]);
        let token = CancellationToken::new();
        let mut web = managed("web", "172.17.0.2", "Host(`web.example.com`)", "public");
        web.labels
            .insert(ENDPOINT_LABEL.to_string(), "edge".to_string());

        manager.sync_container(&web, &token).await.expect("sync");

        assert!(fake(&manager, 0).state().backends.is_empty());
        assert_eq!(fake(&manager, 1).state().backends.len(), 1);
    }

    #[test(tokio::test)]
    async fn unlabelled_container_is_skipped_without_calls() {
        let manager = manager(vec![("default", FakeHaproxy::default())]);
        let token = CancellationToken::new();
        let plain = container("db", "172.17.0.4", &[]);

        let outcome = manager.sync_container(&plain, &token).await.expect("skip");

        assert_eq!(outcome, SyncOutcome::Skipped);
        assert!(fake(&manager, 0).state().calls.is_empty());
    }

    #[test(tokio::test)]
    async fn invalid_labels_fail_without_remote_calls() {
        let manager = manager(vec![("default", FakeHaproxy::default())]);
        let token = CancellationToken::new();
        let broken = container(
            "web",
            "172.17.0.2",
            &[(ENABLE_LABEL, "true"), (BACKEND_PORT_LABEL, "8080")],
        );

        let err = manager
            .sync_container(&broken, &token)
            .await
            .expect_err("frontend rule missing");

        assert!(matches!(
            err.current_context(),
            SyncError::InvalidLabels { .. }
        ));
        assert!(fake(&manager, 0).state().calls.is_empty());
    }

    #[test(tokio::test)]
    async fn transient_failures_are_retried() {
        let remote = FakeHaproxy::default();
        remote.fail("create_backend", 2);
        let manager = manager(vec![("default", remote)]);
        let token = CancellationToken::new();
        let web = managed("web", "172.17.0.2", "Host(`web.example.com`)", "public");

        manager.sync_container(&web, &token).await.expect("third try works");

        assert_eq!(fake(&manager, 0).calls_of("create_backend"), 3);
    }

    #[test(tokio::test)]
    async fn exhausted_retries_abort_before_frontend() {
        let remote = FakeHaproxy::default();
        remote.fail("create_backend", 3);
        let manager = manager(vec![("default", remote)]);
        let token = CancellationToken::new();
        let web = managed("web", "172.17.0.2", "Host(`web.example.com`)", "public");

        let err = manager
            .sync_container(&web, &token)
            .await
            .expect_err("retries exhausted");

        assert!(matches!(
            err.current_context(),
            SyncError::Remote {
                operation: "create backend",
                ..
            }
        ));
        let remote = fake(&manager, 0);
        assert_eq!(remote.calls_of("list_frontends"), 0);
        assert_eq!(remote.calls_of("apply_changes"), 0);
    }

    #[test(tokio::test)]
    async fn apply_failure_is_retried_independently() {
        let remote = FakeHaproxy::default();
        remote.fail("apply_changes", 1);
        let manager = manager(vec![("default", remote)]);
        let token = CancellationToken::new();
        let web = managed("web", "172.17.0.2", "Host(`web.example.com`)", "public");

        manager.sync_container(&web, &token).await.expect("sync");

        let remote = fake(&manager, 0);
        assert_eq!(remote.calls_of("create_backend"), 1);
        assert_eq!(remote.calls_of("apply_changes"), 2);
    }

    #[test(tokio::test)]
    async fn health_check_reports_each_endpoint() {
        let failing = FakeHaproxy::default();
        failing.fail("list_backends", 1);
        let manager = manager(vec![("default", FakeHaproxy::default()), ("edge", failing)]);

        let results = manager.health_check().await;

        assert_eq!(results.len(), 2);
        assert!(results[0].1.is_ok());
        assert_eq!(results[1].0, "edge");
        assert!(results[1].1.is_err());
    }

    #[test(tokio::test)]
    async fn endpoint_stats_count_objects() {
        let remote = FakeHaproxy::default()
            .with_backend(Backend {
                name: "a-backend".to_string(),
                ..Backend::default()
            })
            .with_backend(Backend {
                name: "b-backend".to_string(),
                ..Backend::default()
            });
        remote.fail("list_frontends", 1);
        let manager = manager(vec![("default", remote)]);

        let stats = manager.endpoint_stats().await;

        assert_eq!(
            stats,
            vec![EndpointStats {
                endpoint: "default".to_string(),
                backends: Some(2),
                frontends: None,
            }]
        );
    }

    #[test]
    fn removal_names_objects_of_a_container_without_address() {
        // Arrange
        let manager = manager(vec![("default", FakeHaproxy::default())]);
        let destroyed = managed("web", "", "Host(`web.example.com`)", "public");

        // Act
        let names = manager
            .remove_container(&destroyed)
            .expect("managed container is recognized");

        // Assert
        assert_eq!(names.backend, "web-backend");
        assert_eq!(names.frontend.as_deref(), Some("public"));
        assert_eq!(names.acl.as_deref(), Some("auto-acl-web-example-com"));
        assert_eq!(fake(&manager, 0).calls_of("list_backends"), 0, "removal stays local");
    }

    #[test]
    fn removal_ignores_unmanaged_containers() {
        let manager = manager(vec![("default", FakeHaproxy::default())]);

        assert!(manager.remove_container(&container("plain", "", &[])).is_none());
    }
}

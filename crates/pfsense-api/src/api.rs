//! Capability boundary for reading and writing HAProxy objects.

use async_trait::async_trait;

use crate::error::ApiResult;
use crate::types::Acl;
use crate::types::Action;
use crate::types::Backend;
use crate::types::Frontend;

/// Operations the reconciler needs from a remote HAProxy configuration store.
///
/// The store is a key-value collection addressed by object name. There are no
/// transactions: every call is applied on its own and only becomes live after
/// [`HaproxyApi::apply_changes`].
#[async_trait]
pub trait HaproxyApi: Send + Sync {
    /// List every backend.
    async fn list_backends(&self) -> ApiResult<Vec<Backend>>;

    /// Create a backend; the body must not carry an id.
    async fn create_backend(&self, backend: &Backend) -> ApiResult<()>;

    /// Replace the fields of the backend identified by `backend.id`.
    async fn update_backend(&self, backend: &Backend) -> ApiResult<()>;

    /// List every frontend.
    async fn list_frontends(&self) -> ApiResult<Vec<Frontend>>;

    /// Create a frontend together with its initial ACLs and actions.
    async fn create_frontend(&self, frontend: &Frontend) -> ApiResult<()>;

    /// Append an ACL to the frontend with the given id.
    async fn add_frontend_acl(&self, frontend_id: u64, acl: &Acl) -> ApiResult<()>;

    /// Append an action to the frontend with the given id.
    async fn add_frontend_action(&self, frontend_id: u64, action: &Action) -> ApiResult<()>;

    /// Commit pending changes so HAProxy reloads them.
    async fn apply_changes(&self) -> ApiResult<()>;

    /// Find a backend by its unique name.
    async fn find_backend(&self, name: &str) -> ApiResult<Option<Backend>> {
        let backends = self.list_backends().await?;
        Ok(backends.into_iter().find(|backend| backend.name == name))
    }

    /// Find a frontend by its unique name.
    async fn find_frontend(&self, name: &str) -> ApiResult<Option<Frontend>> {
        let frontends = self.list_frontends().await?;
        Ok(frontends.into_iter().find(|frontend| frontend.name == name))
    }
}

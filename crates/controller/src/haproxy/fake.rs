//! In-memory HAProxy store for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::MutexGuard;

use async_trait::async_trait;
use error_stack::Report;
use pfsense_api::Acl;
use pfsense_api::Action;
use pfsense_api::ApiError;
use pfsense_api::ApiResult;
use pfsense_api::Backend;
use pfsense_api::Frontend;
use pfsense_api::HaproxyApi;

#[derive(Debug, Default)]
pub struct FakeState {
    pub backends: Vec<Backend>,
    pub frontends: Vec<Frontend>,
    pub applied: u32,
    /// Every call in order, by operation name
    pub calls: Vec<&'static str>,
    next_id: u64,
    failures: HashMap<&'static str, u32>,
}

impl FakeState {
    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn enter(&mut self, operation: &'static str) -> ApiResult<()> {
        self.calls.push(operation);
        match self.failures.get_mut(operation) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(Report::new(ApiError::Http {
                    status: 503,
                    message: format!("{operation} unavailable"),
                }))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeHaproxy {
    state: Mutex<FakeState>,
}

impl FakeHaproxy {
    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake state lock")
    }

    /// Make the next `times` calls of `operation` fail.
    pub fn fail(&self, operation: &'static str, times: u32) {
        self.state().failures.insert(operation, times);
    }

    pub fn with_backend(self, backend: Backend) -> Self {
        {
            let mut state = self.state();
            let id = state.next_id();
            state.backends.push(Backend {
                id: Some(id),
                ..backend
            });
        }
        self
    }

    pub fn with_frontend(self, frontend: Frontend) -> Self {
        {
            let mut state = self.state();
            let id = state.next_id();
            state.frontends.push(Frontend {
                id: Some(id),
                ..frontend
            });
        }
        self
    }

    pub fn calls_of(&self, operation: &str) -> usize {
        self.state().calls.iter().filter(|call| **call == operation).count()
    }
}

fn not_found(what: &str) -> Report<ApiError> {
    Report::new(ApiError::Http {
        status: 404,
        message: format!("{what} not found"),
    })
}

#[async_trait]
impl HaproxyApi for FakeHaproxy {
    async fn list_backends(&self) -> ApiResult<Vec<Backend>> {
        let mut state = self.state();
        state.enter("list_backends")?;
        Ok(state.backends.clone())
    }

    async fn create_backend(&self, backend: &Backend) -> ApiResult<()> {
        let mut state = self.state();
        state.enter("create_backend")?;
        let id = state.next_id();
        state.backends.push(Backend {
            id: Some(id),
            ..backend.clone()
        });
        Ok(())
    }

    async fn update_backend(&self, backend: &Backend) -> ApiResult<()> {
        let mut state = self.state();
        state.enter("update_backend")?;
        let stored = state
            .backends
            .iter_mut()
            .find(|b| b.id.is_some() && b.id == backend.id)
            .ok_or_else(|| not_found("backend"))?;
        *stored = backend.clone();
        Ok(())
    }

    async fn list_frontends(&self) -> ApiResult<Vec<Frontend>> {
        let mut state = self.state();
        state.enter("list_frontends")?;
        Ok(state.frontends.clone())
    }

    async fn create_frontend(&self, frontend: &Frontend) -> ApiResult<()> {
        let mut state = self.state();
        state.enter("create_frontend")?;
        let id = state.next_id();
        state.frontends.push(Frontend {
            id: Some(id),
            ..frontend.clone()
        });
        Ok(())
    }

    async fn add_frontend_acl(&self, frontend_id: u64, acl: &Acl) -> ApiResult<()> {
        let mut state = self.state();
        state.enter("add_frontend_acl")?;
        let frontend = state
            .frontends
            .iter_mut()
            .find(|f| f.id == Some(frontend_id))
            .ok_or_else(|| not_found("frontend"))?;
        frontend.acls.push(acl.clone());
        Ok(())
    }

    async fn add_frontend_action(&self, frontend_id: u64, action: &Action) -> ApiResult<()> {
        let mut state = self.state();
        state.enter("add_frontend_action")?;
        let frontend = state
            .frontends
            .iter_mut()
            .find(|f| f.id == Some(frontend_id))
            .ok_or_else(|| not_found("frontend"))?;
        frontend.actions.push(action.clone());
        Ok(())
    }

    async fn apply_changes(&self) -> ApiResult<()> {
        let mut state = self.state();
        state.enter("apply_changes")?;
        state.applied += 1;
        Ok(())
    }
}

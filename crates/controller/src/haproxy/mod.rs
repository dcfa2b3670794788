//! HAProxy reconciliation
//!
//! Builds the desired backend and frontend for a container and converges the
//! selected pfSense endpoint towards them.

pub mod builder;
pub mod manager;
pub mod retry;
pub mod router;

#[cfg(test)]
pub(crate) mod fake;

pub use manager::BackendChange;
pub use manager::EndpointStats;
pub use manager::FrontendChange;
pub use manager::HaproxyManager;
pub use manager::SyncError;
pub use manager::SyncOutcome;
pub use retry::RetryPolicy;
pub use router::Endpoint;
pub use router::EndpointRouter;

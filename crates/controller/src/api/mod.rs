//! Operational HTTP surface: health, readiness and metrics.

pub mod errors;
pub mod handlers;
pub mod server;

pub use errors::OpsError;
pub use server::ApiServer;
pub use server::OpsState;

//! Client library for the HAProxy package of the pfSense REST API.
//!
//! The crate exposes the remote object shapes, the [`HaproxyApi`] capability
//! trait used by reconcilers, and [`PfSenseClient`], its HTTP implementation.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod types;

pub use api::HaproxyApi;
pub use client::PfSenseClient;
pub use config::ClientConfig;
pub use error::ApiError;
pub use error::ApiResult;
pub use types::Acl;
pub use types::Action;
pub use types::ApiResponse;
pub use types::Backend;
pub use types::BackendServer;
pub use types::Frontend;

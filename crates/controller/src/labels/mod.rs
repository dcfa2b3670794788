//! Container label handling
//!
//! Turns the labels attached to a container into a normalized
//! [`ContainerConfig`] describing one HAProxy backend and one frontend rule.

pub mod common;
pub mod rule;
pub mod translator;

use core::error::Error;

use derive_more::Display;

pub use common::*;
pub use rule::parse_rule;
pub use rule::ParsedRule;
pub use rule::RuleOperator;
pub use translator::BackendSpec;
pub use translator::CheckType;
pub use translator::ContainerConfig;
pub use translator::FrontendSpec;
pub use translator::LabelTranslator;
pub use translator::ManagedNames;
pub use translator::ParseMode;

/// Reasons a container's labels cannot be turned into a configuration.
#[derive(Debug, Display)]
pub enum LabelError {
    #[display("{label} is required")]
    MissingLabel { label: &'static str },
    #[display("invalid backend port: {value}")]
    InvalidPort { value: String },
    #[display("could not determine container IP address")]
    NoAddress,
    #[display("invalid check type '{value}', must be one of: none, basic, http")]
    InvalidCheckType { value: String },
    #[display("health check path is required for HTTP check type (pfsense-controller.backend.health_check_path)")]
    MissingHealthCheckPath,
    #[display("unsupported rule format: {rule}")]
    UnsupportedRule { rule: String },
    #[display("no service port found in traefik labels")]
    MissingServicePort,
    #[display("{mode} labels are invalid")]
    InvalidSchema { mode: ParseMode },
    #[display("no applicable configuration for container {container}")]
    NoApplicableConfig { container: String },
}

impl Error for LabelError {}

//! Controller configuration: CLI flags and environment over the TOML file over
//! built-in defaults.

pub mod cli;
pub mod daemon;
pub mod file;

use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use derive_more::Display;
use error_stack::Report;
use pfsense_api::ClientConfig;
use tracing::level_filters::LevelFilter;

pub use cli::*;
pub use daemon::*;
pub use file::FileConfig;

use crate::haproxy::RetryPolicy;
use crate::labels::DEFAULT_ENDPOINT;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_HEALTH_PORT: u16 = 8080;
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Display)]
pub enum ConfigError {
    #[display("failed to read config file {path}")]
    Read { path: String },
    #[display("failed to parse config file")]
    Parse,
    #[display("invalid log level `{value}`")]
    InvalidLogLevel { value: String },
    #[display("at least one endpoint must be configured")]
    NoEndpoints,
    #[display("endpoint {endpoint}: {field} is required")]
    MissingEndpointField {
        endpoint: String,
        field: &'static str,
    },
    #[display("endpoint name `{name}` is used more than once")]
    DuplicateEndpoint { name: String },
    #[display("poll_interval must be positive")]
    InvalidPollInterval,
}

impl core::error::Error for ConfigError {}

/// A named pfSense endpoint ready for client construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSettings {
    pub name: String,
    pub client: ClientConfig,
}

/// Fully resolved and validated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub log_level: LevelFilter,
    pub poll_interval: Duration,
    pub retry_policy: RetryPolicy,
    pub health_port: u16,
    pub traefik_compat_mode: bool,
    pub docker_host: String,
    pub endpoints: Vec<EndpointSettings>,
}

impl Settings {
    /// Load the file named by `args.config` and merge `args` over it.
    pub fn load(args: &DaemonArgs) -> Result<Self, Report<ConfigError>> {
        let file = FileConfig::load(&args.config)?;
        Self::resolve(args, file)
    }

    /// Merge `args` over `file` over defaults, then validate.
    pub fn resolve(args: &DaemonArgs, file: FileConfig) -> Result<Self, Report<ConfigError>> {
        let global = file.global;

        let level = args
            .log_level
            .clone()
            .or(global.log_level)
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
        let log_level = parse_level(&level)?;

        let endpoints = if file.endpoints.is_empty() {
            env_endpoint(args).into_iter().collect()
        } else {
            let mut endpoints = Vec::with_capacity(file.endpoints.len());
            for (index, endpoint) in file.endpoints.into_iter().enumerate() {
                if endpoint.name.is_empty() {
                    return Err(Report::new(ConfigError::MissingEndpointField {
                        endpoint: format!("#{index}"),
                        field: "name",
                    }));
                }
                let mut client = ClientConfig::new(endpoint.url, endpoint.api_key)
                    .with_insecure_tls(endpoint.insecure_tls);
                if let Some(timeout) = endpoint.request_timeout {
                    client = client.with_request_timeout(timeout);
                }
                endpoints.push(EndpointSettings {
                    name: endpoint.name,
                    client,
                });
            }
            endpoints
        };

        let settings = Self {
            log_level,
            poll_interval: args
                .poll_interval
                .or(global.poll_interval)
                .unwrap_or(DEFAULT_POLL_INTERVAL),
            retry_policy: RetryPolicy::new(
                args.retry_attempts
                    .or(global.retry_attempts)
                    .unwrap_or(DEFAULT_RETRY_ATTEMPTS),
                args.retry_delay
                    .or(global.retry_delay)
                    .unwrap_or(DEFAULT_RETRY_DELAY),
            ),
            health_port: args
                .health_port
                .or(global.health_port)
                .unwrap_or(DEFAULT_HEALTH_PORT),
            traefik_compat_mode: args
                .traefik_compat_mode
                .or(global.traefik_compat_mode)
                .unwrap_or(false),
            docker_host: args.docker_host.clone(),
            endpoints,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// # Errors
    ///
    /// - [`ConfigError::NoEndpoints`] when no endpoint is configured
    /// - [`ConfigError::MissingEndpointField`] for an empty url or api key
    /// - [`ConfigError::DuplicateEndpoint`] when two endpoints share a name
    /// - [`ConfigError::InvalidPollInterval`] for a zero poll interval
    pub fn validate(&self) -> Result<(), Report<ConfigError>> {
        if self.endpoints.is_empty() {
            return Err(Report::new(ConfigError::NoEndpoints));
        }

        let mut seen = HashSet::new();
        for endpoint in &self.endpoints {
            if endpoint.client.base_url.is_empty() {
                return Err(Report::new(ConfigError::MissingEndpointField {
                    endpoint: endpoint.name.clone(),
                    field: "url",
                }));
            }
            if endpoint.client.api_key.is_empty() {
                return Err(Report::new(ConfigError::MissingEndpointField {
                    endpoint: endpoint.name.clone(),
                    field: "api_key",
                }));
            }
            if !seen.insert(endpoint.name.as_str()) {
                return Err(Report::new(ConfigError::DuplicateEndpoint {
                    name: endpoint.name.clone(),
                }));
            }
        }

        if self.poll_interval.is_zero() {
            return Err(Report::new(ConfigError::InvalidPollInterval));
        }
        Ok(())
    }
}

fn parse_level(value: &str) -> Result<LevelFilter, Report<ConfigError>> {
    let normalized = match value.to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        other => other.to_string(),
    };
    LevelFilter::from_str(&normalized).map_err(|_| {
        Report::new(ConfigError::InvalidLogLevel {
            value: value.to_string(),
        })
    })
}

/// The `default` endpoint described by `PFSENSE_URL` and friends.
fn env_endpoint(args: &DaemonArgs) -> Option<EndpointSettings> {
    let url = args.pfsense_url.clone().filter(|url| !url.is_empty())?;
    let client = ClientConfig::new(url, args.pfsense_api_key.clone().unwrap_or_default())
        .with_insecure_tls(args.pfsense_insecure_tls);
    Some(EndpointSettings {
        name: DEFAULT_ENDPOINT.to_string(),
        client,
    })
}

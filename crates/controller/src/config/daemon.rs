use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::container::docker::DEFAULT_DOCKER_HOST;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/pfsense-controller/config.toml";

/// Command line overrides. Unset options fall back to the config file, then
/// to built-in defaults.
#[derive(Parser, Clone, Debug)]
pub struct DaemonArgs {
    #[arg(
        short,
        long,
        env = "PFSENSE_CONFIG",
        default_value = DEFAULT_CONFIG_PATH,
        value_hint = clap::ValueHint::FilePath,
        help = "Path to the TOML configuration file"
    )]
    pub config: PathBuf,

    #[arg(
        short,
        long,
        env = "PFSENSE_LOG_LEVEL",
        help = "Log level (trace, debug, info, warn, error)"
    )]
    pub log_level: Option<String>,

    #[arg(
        long,
        env = "PFSENSE_LOG_FILE",
        value_hint = clap::ValueHint::FilePath,
        help = "Also write logs to this file, rotated daily"
    )]
    pub log_file: Option<PathBuf>,

    #[arg(
        long,
        env = "PFSENSE_POLL_INTERVAL",
        value_parser = humantime::parse_duration,
        help = "Interval between full resyncs, e.g. 30s or 5m"
    )]
    pub poll_interval: Option<Duration>,

    #[arg(
        long,
        env = "PFSENSE_RETRY_ATTEMPTS",
        help = "Attempts per remote call before giving up"
    )]
    pub retry_attempts: Option<u32>,

    #[arg(
        long,
        env = "PFSENSE_RETRY_DELAY",
        value_parser = humantime::parse_duration,
        help = "Base delay between retries, grows linearly per attempt"
    )]
    pub retry_delay: Option<Duration>,

    #[arg(
        long,
        env = "PFSENSE_HEALTH_PORT",
        help = "Port of the /health, /ready and /metrics server"
    )]
    pub health_port: Option<u16>,

    #[arg(
        long,
        env = "PFSENSE_TRAEFIK_COMPAT_MODE",
        action = clap::ArgAction::Set,
        help = "Also accept Traefik labels"
    )]
    pub traefik_compat_mode: Option<bool>,

    #[arg(
        long,
        env = "DOCKER_HOST",
        default_value = DEFAULT_DOCKER_HOST,
        help = "Docker daemon address (unix://, tcp://, http:// or https://)"
    )]
    pub docker_host: String,

    #[arg(
        long,
        env = "PFSENSE_URL",
        help = "pfSense API base URL used when the config file defines no endpoints"
    )]
    pub pfsense_url: Option<String>,

    #[arg(
        long,
        env = "PFSENSE_API_KEY",
        hide_env_values = true,
        help = "pfSense API key used when the config file defines no endpoints"
    )]
    pub pfsense_api_key: Option<String>,

    #[arg(
        long,
        env = "PFSENSE_INSECURE_TLS",
        action = clap::ArgAction::Set,
        default_value_t = false,
        help = "Skip TLS verification for the environment-defined endpoint"
    )]
    pub pfsense_insecure_tls: bool,
}

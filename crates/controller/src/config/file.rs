//! On-disk TOML configuration.

use std::path::Path;
use std::time::Duration;

use error_stack::Report;
use error_stack::ResultExt;
use serde::Deserialize;
use tracing::debug;

use super::ConfigError;

/// Contents of the config file; every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub global: GlobalSection,
    #[serde(default)]
    pub endpoints: Vec<EndpointSection>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalSection {
    pub log_level: Option<String>,
    #[serde(with = "humantime_serde", default)]
    pub poll_interval: Option<Duration>,
    #[serde(with = "humantime_serde", default)]
    pub retry_delay: Option<Duration>,
    pub retry_attempts: Option<u32>,
    pub health_port: Option<u16>,
    pub traefik_compat_mode: Option<bool>,
}

/// One `[[endpoints]]` table. Required fields are checked during validation so
/// that errors can name the offending endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointSection {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(with = "humantime_serde", default)]
    pub request_timeout: Option<Duration>,
    #[serde(default)]
    pub insecure_tls: bool,
}

impl FileConfig {
    /// Read `path`; a missing file yields an empty configuration.
    pub fn load(path: &Path) -> Result<Self, Report<ConfigError>> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(Report::new(e).change_context(ConfigError::Read {
                    path: path.display().to_string(),
                }))
            }
        };
        Self::parse(&contents).attach_printable_lazy(|| format!("file: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self, Report<ConfigError>> {
        toml::from_str(contents).change_context(ConfigError::Parse)
    }
}

mod humantime_serde {
    use std::time::Duration;

    use serde::Deserialize;
    use serde::Deserializer;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: Option<String> = Option::deserialize(deserializer)?;
        match s {
            Some(s) => humantime::parse_duration(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

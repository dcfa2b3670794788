//! client config

use std::time::Duration;

/// Connection settings for one pfSense instance.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// API base url, e.g. `https://fw.example.com/api/v2`
    pub base_url: String,
    /// value sent in the `X-API-Key` header
    pub api_key: String,
    /// HTTP request timeout
    pub request_timeout: Duration,
    /// accept self-signed or otherwise invalid certificates
    pub insecure_tls: bool,
}

impl ClientConfig {
    /// create new client config with default parameters.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            request_timeout: Duration::from_secs(30),
            insecure_tls: false,
        }
    }

    /// set request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// skip TLS certificate verification.
    pub fn with_insecure_tls(mut self, insecure_tls: bool) -> Self {
        self.insecure_tls = insecure_tls;
        self
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .field("insecure_tls", &self.insecure_tls)
            .finish()
    }
}

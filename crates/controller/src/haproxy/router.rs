use derive_more::Display;
use error_stack::Report;
use tracing::warn;

#[derive(Debug, Display)]
pub enum RoutingError {
    #[display("no pfSense endpoints configured")]
    NoEndpoints,
}

impl core::error::Error for RoutingError {}

/// A named pfSense instance and its client.
#[derive(Debug)]
pub struct Endpoint<C> {
    pub name: String,
    pub client: C,
}

/// Resolves endpoint names to clients.
///
/// The first configured endpoint doubles as the fallback for unknown names.
#[derive(Debug)]
pub struct EndpointRouter<C> {
    endpoints: Vec<Endpoint<C>>,
}

impl<C> EndpointRouter<C> {
    pub fn new(endpoints: Vec<Endpoint<C>>) -> Self {
        Self { endpoints }
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn endpoints(&self) -> &[Endpoint<C>] {
        &self.endpoints
    }

    /// Exact match on `name`, otherwise the default endpoint with a warning.
    pub fn resolve(&self, name: &str) -> Result<&Endpoint<C>, Report<RoutingError>> {
        if let Some(endpoint) = self.endpoints.iter().find(|e| e.name == name) {
            return Ok(endpoint);
        }

        let fallback = self
            .endpoints
            .first()
            .ok_or_else(|| Report::new(RoutingError::NoEndpoints))?;
        warn!(
            requested = name,
            using = %fallback.name,
            "Endpoint not found, falling back to default endpoint"
        );
        Ok(fallback)
    }
}

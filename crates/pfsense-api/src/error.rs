//! Error types for the pfSense REST API client.

use core::error::Error;

use derive_more::Display;
use error_stack::Report;

/// Result type for pfSense API operations.
pub type ApiResult<T> = Result<T, Report<ApiError>>;

/// Errors that can occur while talking to the pfSense REST API.
#[derive(Debug, Display)]
pub enum ApiError {
    /// Network connectivity issues, including request timeouts
    #[display("Network error: {message}")]
    Network { message: String },

    /// The remote system rejected the request
    #[display("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },

    /// Serialization/deserialization errors
    #[display("Serialization error: {message}")]
    Serialization { message: String },

    /// Configuration errors
    #[display("Configuration error: {message}")]
    Configuration { message: String },

    /// A remote object is missing a field required by the operation
    #[display("Remote object `{name}` has no {field}")]
    MissingField { name: String, field: &'static str },
}

impl Error for ApiError {}

impl ApiError {
    /// HTTP status code carried by the error, if the remote system answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

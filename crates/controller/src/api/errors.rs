use core::error::Error;

/// Ops server errors
#[derive(Debug, derive_more::Display)]
pub enum OpsError {
    #[display("Failed to bind ops server to {addr}")]
    Bind { addr: String },
    #[display("Ops server error: {message}")]
    Server { message: String },
}

impl Error for OpsError {}

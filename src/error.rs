use thiserror::Error;

/// Error kinds surfaced by the rotation workflow and its gateways.
#[derive(Debug, Error)]
pub enum RotationError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("remote API call failed ({status}): {message}")]
    RemoteApi { status: u16, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("operation `{name}` finished with error: {message}")]
    OperationFailed { name: String, message: String },

    #[error("operation `{name}` did not reach a terminal state after {attempts} polls")]
    OperationTimeout { name: String, attempts: u64 },

    #[error("installed certificate is malformed: {0}")]
    InvalidCertificate(String),

    #[error("key pair generation failed: {0}")]
    KeyGen(String),

    #[error("a rotation for this profile is already in flight")]
    InFlight,

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),
}

impl RotationError {
    /// Stable label for reports and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::RemoteApi { .. } => "remote_api",
            Self::NotFound(_) => "not_found",
            Self::OperationFailed { .. } => "operation_failed",
            Self::OperationTimeout { .. } => "operation_timeout",
            Self::InvalidCertificate(_) => "invalid_certificate",
            Self::KeyGen(_) => "key_gen",
            Self::InFlight => "in_flight",
            Self::Http(_) => "http",
        }
    }
}

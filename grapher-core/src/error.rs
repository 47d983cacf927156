//! Driver error types.

use grapher_protocol::StatusCode;
use thiserror::Error;

/// Errors from resolving or running a driver operation.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("driver has no operation '{0}'")]
    UnknownOperation(String),

    #[error("missing argument: {0}")]
    MissingArgument(String),

    #[error("unexpected argument: {0}")]
    UnexpectedArgument(String),

    #[error("invalid argument '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },

    /// Structured failure reported by the driver itself.
    #[error("driver reported {0}")]
    Status(StatusCode),
}

impl DriverError {
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        DriverError::InvalidArgument {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Returns the status code sent to the client.
    ///
    /// Driver-reported codes pass through unchanged; everything else is
    /// folded into `NotFound` or `IncorrectParameters`.
    pub fn status_code(&self) -> StatusCode {
        match self {
            DriverError::UnknownOperation(_) => StatusCode::NotFound,
            DriverError::MissingArgument(_)
            | DriverError::UnexpectedArgument(_)
            | DriverError::InvalidArgument { .. } => StatusCode::IncorrectParameters,
            DriverError::Status(code) => *code,
        }
    }
}

impl From<StatusCode> for DriverError {
    fn from(code: StatusCode) -> Self {
        DriverError::Status(code)
    }
}

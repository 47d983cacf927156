//! Protocol error types and status codes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while parsing commands or encoding reply frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed argument clause: {0:?} (expected name=value)")]
    MalformedArgument(String),

    #[error("unknown status format: {0}")]
    UnknownFormat(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Returns the status code reported to the client for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProtocolError::MalformedArgument(_) => StatusCode::IncorrectParameters,
            ProtocolError::UnknownFormat(_) => StatusCode::NotFound,
            ProtocolError::Json(_) => StatusCode::IncorrectParameters,
        }
    }
}

/// Stable status codes exchanged with clients.
///
/// These codes are part of the protocol contract and must remain stable
/// across versions. Existing clients match on the literal strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    IncorrectParameters,
    NotFound,
    AlreadyDone,
    DriverNotLoaded,
    Done,
    Unauthorized,
    LinksWithCycle,
}

impl StatusCode {
    /// All codes, in declaration order.
    pub const ALL: [StatusCode; 7] = [
        StatusCode::IncorrectParameters,
        StatusCode::NotFound,
        StatusCode::AlreadyDone,
        StatusCode::DriverNotLoaded,
        StatusCode::Done,
        StatusCode::Unauthorized,
        StatusCode::LinksWithCycle,
    ];

    /// Returns the symbolic name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::IncorrectParameters => "IncorrectParameters",
            StatusCode::NotFound => "NotFound",
            StatusCode::AlreadyDone => "AlreadyDone",
            StatusCode::DriverNotLoaded => "DriverNotLoaded",
            StatusCode::Done => "Done",
            StatusCode::Unauthorized => "Unauthorized",
            StatusCode::LinksWithCycle => "LinksWithCycle",
        }
    }

    /// Returns the numeric prefix of the legacy literal.
    pub fn code(&self) -> u16 {
        match self {
            StatusCode::IncorrectParameters => 400,
            StatusCode::NotFound => 404,
            StatusCode::AlreadyDone => 208,
            StatusCode::DriverNotLoaded => 406,
            StatusCode::Done => 200,
            StatusCode::Unauthorized => 401,
            StatusCode::LinksWithCycle => 409,
        }
    }

    /// Returns the numbered literal understood by older clients.
    pub fn legacy_str(&self) -> &'static str {
        match self {
            StatusCode::IncorrectParameters => "400_INCORRECT_PARAMETERS",
            StatusCode::NotFound => "404_NOT_FOUND",
            StatusCode::AlreadyDone => "208_DRIVER_ALREADY_LOADED",
            StatusCode::DriverNotLoaded => "406_DRIVER_NOT_LOADED",
            StatusCode::Done => "200_DONE",
            StatusCode::Unauthorized => "401_UNAUTHORIZED",
            StatusCode::LinksWithCycle => "409_LINKS_WITH_CYCLE",
        }
    }

    /// Renders the code in the requested wire format.
    pub fn render(&self, format: StatusFormat) -> &'static str {
        match format {
            StatusFormat::Symbolic => self.as_str(),
            StatusFormat::Numbered => self.legacy_str(),
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which literal form status codes take in reply frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFormat {
    /// `"Done"`, `"NotFound"`, ...
    #[default]
    Symbolic,
    /// `"200_DONE"`, `"404_NOT_FOUND"`, ...
    Numbered,
}

impl FromStr for StatusFormat {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "symbolic" => Ok(StatusFormat::Symbolic),
            "numbered" | "legacy" => Ok(StatusFormat::Numbered),
            other => Err(ProtocolError::UnknownFormat(other.to_string())),
        }
    }
}

//! Reply frames.
//!
//! Every reply is one JSON object terminated by `\n`, in one of three shapes:
//!
//! ```text
//! {"info": "<status>"}
//! {"error": "<status>"}
//! <any JSON value produced by the driver>
//! ```

use crate::error::{ProtocolError, StatusCode, StatusFormat};
use serde_json::{json, Value};

/// Key marking an informational frame.
pub const INFO_KEY: &str = "info";

/// Key marking an error frame, and the error marker inside driver output.
pub const ERROR_KEY: &str = "error";

/// Line terminator appended to every frame.
pub const FRAME_TERMINATOR: char = '\n';

/// A single reply frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyFrame {
    /// `{"info": code}`.
    Info(StatusCode),
    /// `{"error": code}`.
    Error(StatusCode),
    /// `{"error": value}` for a driver error marker that is not a status code.
    DriverError(Value),
    /// Driver output, passed through unwrapped.
    Data(Value),
}

impl ReplyFrame {
    /// Success frame closing a command.
    pub fn done() -> Self {
        ReplyFrame::Info(StatusCode::Done)
    }

    /// Builds the error frame for a driver-produced error marker.
    ///
    /// The marker value is emitted verbatim, whatever the configured
    /// [`StatusFormat`]; only codes the server produces itself are rendered.
    pub fn from_error_marker(marker: Value) -> Self {
        ReplyFrame::DriverError(marker)
    }

    /// Returns the error marker carried by a driver item, if any.
    pub fn error_marker(item: &Value) -> Option<&Value> {
        item.as_object().and_then(|obj| obj.get(ERROR_KEY))
    }

    /// Returns whether this frame ends the reply with an error.
    pub fn is_error(&self) -> bool {
        matches!(self, ReplyFrame::Error(_) | ReplyFrame::DriverError(_))
    }

    /// Converts the frame to its JSON value.
    pub fn to_value(&self, format: StatusFormat) -> Value {
        match self {
            ReplyFrame::Info(code) => json!({ INFO_KEY: code.render(format) }),
            ReplyFrame::Error(code) => json!({ ERROR_KEY: code.render(format) }),
            ReplyFrame::DriverError(value) => json!({ ERROR_KEY: value }),
            ReplyFrame::Data(value) => value.clone(),
        }
    }

    /// Encodes the frame as one newline-terminated JSON line.
    pub fn encode(&self, format: StatusFormat) -> Result<String, ProtocolError> {
        let mut line = match self {
            ReplyFrame::Data(value) => serde_json::to_string(value)?,
            other => serde_json::to_string(&other.to_value(format))?,
        };
        line.push(FRAME_TERMINATOR);
        Ok(line)
    }
}

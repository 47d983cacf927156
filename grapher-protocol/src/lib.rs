//! # grapher-protocol
//!
//! Wire protocol for the grapher command protocol.
//!
//! This crate provides:
//! - The stable status code vocabulary and its two literal forms
//! - Command parsing (verb, raw arguments, argument maps)
//! - Reply frame encoding (newline-terminated JSON)

pub mod command;
pub mod error;
pub mod frame;

pub use command::{ArgumentMap, Command, ARGUMENT_SEPARATOR, LOAD_VERB, UNLOAD_VERB};
pub use error::{ProtocolError, StatusCode, StatusFormat};
pub use frame::{ReplyFrame, ERROR_KEY, INFO_KEY};

/// Default port for the grapher server.
pub const DEFAULT_PORT: u16 = 9999;

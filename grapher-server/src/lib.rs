//! # grapher-server
//!
//! Server for the grapher command protocol.
//!
//! This crate provides:
//! - Per-connection sessions with the load/unload state machine
//! - Reply streaming onto pluggable frame sinks
//! - Stream (raw TCP) and message (WebSocket) transport bindings
//! - The accept loop, connection limits and shutdown
//! - YAML and environment configuration

pub mod config;
pub mod error;
pub mod message;
pub mod reply;
pub mod server;
pub mod session;
pub mod stream;

pub use config::{Config, ConfigError, EmptyVerbPolicy, NetworkConfig, ProtocolConfig, Transport};
pub use error::ServerError;
pub use reply::{stream_reply, FrameSink, ReplyEnd, ReplyWriter};
pub use server::{Server, ServerConfig, ServerStats};
pub use session::{Session, SessionState};

//! Session management.
//!
//! A session belongs to one connection and holds at most one loaded driver.
//! Commands are handled strictly one at a time; each one is fully answered
//! (through `Done` or an error frame) before the next is read.

use crate::config::{EmptyVerbPolicy, ProtocolConfig};
use crate::error::ServerError;
use crate::reply::{stream_reply, FrameSink, ReplyWriter};
use grapher_core::{dispatch, DriverHandle, DriverRegistry};
use grapher_protocol::{Command, ReplyFrame, StatusCode, LOAD_VERB, UNLOAD_VERB};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Driver load state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No driver loaded (initial state).
    Unloaded,
    /// A driver is loaded and receives all non-reserved verbs.
    Loaded,
}

/// A client session.
pub struct Session {
    /// Unique session ID.
    pub id: String,

    /// Remote address.
    pub remote_addr: SocketAddr,

    registry: Arc<DriverRegistry>,

    /// The loaded driver, owned by this session alone.
    driver: Option<DriverHandle>,

    protocol: ProtocolConfig,

    command_count: u64,

    created_at: Instant,
}

impl Session {
    /// Creates a new session with no driver loaded.
    pub fn new(
        remote_addr: SocketAddr,
        registry: Arc<DriverRegistry>,
        protocol: ProtocolConfig,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            remote_addr,
            registry,
            driver: None,
            protocol,
            command_count: 0,
            created_at: Instant::now(),
        }
    }

    /// Returns the session state.
    pub fn state(&self) -> SessionState {
        if self.driver.is_some() {
            SessionState::Loaded
        } else {
            SessionState::Unloaded
        }
    }

    /// Returns the name of the loaded driver.
    pub fn driver_name(&self) -> Option<&str> {
        self.driver.as_ref().map(DriverHandle::name)
    }

    /// Returns the number of commands handled.
    pub fn command_count(&self) -> u64 {
        self.command_count
    }

    /// Returns the session age.
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    /// Loads a driver by registry name.
    ///
    /// Fails with `AlreadyDone` if a driver is loaded (the loaded driver is
    /// kept) and with `NotFound` if the registry has no such driver.
    pub fn load(&mut self, name: &str) -> Result<(), StatusCode> {
        if self.driver.is_some() {
            return Err(StatusCode::AlreadyDone);
        }
        let factory = self.registry.resolve(name).ok_or(StatusCode::NotFound)?;
        let driver = factory.construct();
        tracing::info!("[{}] Loaded driver '{}'", self.remote_addr, driver.name());
        self.driver = Some(driver);
        Ok(())
    }

    /// Drops the loaded driver. Fails with `AlreadyDone` if none is loaded.
    pub fn unload(&mut self) -> Result<(), StatusCode> {
        match self.driver.take() {
            Some(driver) => {
                tracing::info!("[{}] Unloaded driver '{}'", self.remote_addr, driver.name());
                Ok(())
            }
            None => Err(StatusCode::AlreadyDone),
        }
    }

    /// Handles one raw command and writes every reply frame to `sink`.
    ///
    /// A failed write abandons the rest of this command's reply. The session
    /// keeps its state and takes the next command as usual.
    pub async fn handle<S: FrameSink + ?Sized>(&mut self, input: &str, sink: &mut S) {
        self.command_count += 1;
        let command = Command::parse(input);
        tracing::info!(
            "[{}] Request: verb={:?} args={:?}",
            self.remote_addr,
            command.verb,
            command.raw_args
        );

        let mut writer = ReplyWriter::new(sink, self.protocol.status_format);
        match self.execute(&command, &mut writer).await {
            Ok(()) => tracing::debug!(
                "[{}] Reply complete: {} frame(s)",
                self.remote_addr,
                writer.frames_sent()
            ),
            Err(e) => tracing::warn!(
                "[{}] Reply aborted after {} frame(s): {}",
                self.remote_addr,
                writer.frames_sent(),
                e
            ),
        }
    }

    async fn execute<S: FrameSink + ?Sized>(
        &mut self,
        command: &Command,
        writer: &mut ReplyWriter<'_, S>,
    ) -> Result<(), ServerError> {
        if command.is_empty() {
            writer.send(&ReplyFrame::Error(StatusCode::NotFound)).await?;
            if self.protocol.empty_verb == EmptyVerbPolicy::SingleFrame {
                return Ok(());
            }
        }

        match command.verb.as_str() {
            LOAD_VERB => {
                let frame = match self.load(&command.raw_args) {
                    Ok(()) => ReplyFrame::done(),
                    Err(code) => ReplyFrame::Error(code),
                };
                writer.send(&frame).await
            }
            UNLOAD_VERB => {
                let frame = match self.unload() {
                    Ok(()) => ReplyFrame::done(),
                    Err(code) => ReplyFrame::Error(code),
                };
                writer.send(&frame).await
            }
            verb => {
                let Some(driver) = self.driver.as_mut() else {
                    return writer
                        .send(&ReplyFrame::Error(StatusCode::DriverNotLoaded))
                        .await;
                };

                let args = match command.arguments() {
                    Ok(args) => args,
                    Err(e) => {
                        tracing::debug!("[{}] Bad arguments: {}", self.remote_addr, e);
                        return writer.send(&ReplyFrame::Error(e.status_code())).await;
                    }
                };

                match dispatch(driver, verb, &args) {
                    Ok(reply) => stream_reply(writer, reply).await.map(|_| ()),
                    Err(e) => {
                        tracing::debug!("[{}] Dispatch failed: {}", self.remote_addr, e);
                        writer.send(&ReplyFrame::Error(e.status_code())).await
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("driver", &self.driver_name())
            .field("command_count", &self.command_count)
            .finish()
    }
}

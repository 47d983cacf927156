//! Stream binding.
//!
//! Raw byte streams carry no message boundaries, so each read of up to
//! `read_chunk_size` bytes is treated as exactly one command. Clients must
//! send one command per write and wait for its reply before the next.

use crate::error::ServerError;
use crate::reply::FrameSink;
use crate::server::{idle, ServerConfig, ServerStats};
use crate::session::Session;
use futures::future::{BoxFuture, FutureExt};
use std::io;
use std::sync::atomic::Ordering;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;

/// Writes frames to a byte stream, flushing after each one.
pub struct StreamSink<'a, W: ?Sized> {
    writer: &'a mut W,
}

impl<'a, W: ?Sized> StreamSink<'a, W> {
    pub fn new(writer: &'a mut W) -> Self {
        Self { writer }
    }
}

impl<W: AsyncWrite + Unpin + Send + ?Sized> FrameSink for StreamSink<'_, W> {
    fn send_line(&mut self, line: String) -> BoxFuture<'_, io::Result<()>> {
        async move {
            self.writer.write_all(line.as_bytes()).await?;
            self.writer.flush().await
        }
        .boxed()
    }
}

/// Runs a session over a byte stream until EOF, idle timeout or shutdown.
pub async fn serve_stream<S>(
    stream: &mut S,
    session: &mut Session,
    config: &ServerConfig,
    stats: &ServerStats,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let addr = session.remote_addr;
    let mut buf = vec![0u8; config.read_chunk_size];

    loop {
        let n = tokio::select! {
            result = stream.read(&mut buf) => match result {
                Ok(n) => n,
                Err(e) => {
                    tracing::debug!("[{}] Read error: {}", addr, e);
                    return Err(ServerError::Io(e));
                }
            },
            _ = idle(config.idle_timeout) => {
                tracing::debug!("[{}] Idle timeout", addr);
                return Ok(());
            }
            _ = shutdown.recv() => {
                tracing::debug!("[{}] Shutdown signal received", addr);
                return Err(ServerError::ShuttingDown);
            }
        };

        if n == 0 {
            tracing::debug!("[{}] Connection closed by client", addr);
            return Ok(());
        }

        tracing::debug!("[{}] Received {} bytes", addr, n);
        let input = String::from_utf8_lossy(&buf[..n]).into_owned();
        stats.commands_total.fetch_add(1, Ordering::Relaxed);

        let mut sink = StreamSink::new(stream);
        session.handle(&input, &mut sink).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProtocolConfig;
    use grapher_core::{DriverRegistry, SampleGraphDriver, SAMPLE_DRIVER_NAME};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, BufReader};

    fn test_session() -> Session {
        let mut registry = DriverRegistry::new();
        registry.register::<SampleGraphDriver>(SAMPLE_DRIVER_NAME);
        Session::new(
            "127.0.0.1:4000".parse().unwrap(),
            Arc::new(registry),
            ProtocolConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_stream_sink_writes_lines() {
        let mut out: Vec<u8> = Vec::new();
        let mut sink = StreamSink::new(&mut out);
        sink.send_line("{\"info\":\"Done\"}\n".to_string())
            .await
            .unwrap();
        assert_eq!(out, b"{\"info\":\"Done\"}\n");
    }

    #[tokio::test]
    async fn test_one_command_per_read() {
        let (client, mut server_side) = tokio::io::duplex(1024);
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let config = ServerConfig::default();
        let stats = ServerStats::default();

        let server = tokio::spawn(async move {
            let mut session = test_session();
            let result =
                serve_stream(&mut server_side, &mut session, &config, &stats, &mut shutdown_rx)
                    .await;
            (result.is_ok(), session.command_count())
        });

        let (read_half, mut write_half) = tokio::io::split(client);
        let mut lines = BufReader::new(read_half).lines();

        write_half.write_all(b"load sample").await.unwrap();
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            "{\"info\":\"Done\"}"
        );

        write_half.write_all(b"bogus\r\n").await.unwrap();
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            "{\"error\":\"NotFound\"}"
        );

        drop(write_half);
        drop(lines);
        let (clean, count) = server.await.unwrap();
        assert!(clean);
        assert_eq!(count, 2);
        drop(shutdown_tx);
    }

    #[tokio::test]
    async fn test_idle_timeout_closes() {
        let (_client, mut server_side) = tokio::io::duplex(64);
        let (_shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let config = ServerConfig {
            idle_timeout: Some(Duration::from_millis(20)),
            ..ServerConfig::default()
        };
        let mut session = test_session();
        let result = serve_stream(
            &mut server_side,
            &mut session,
            &config,
            &ServerStats::default(),
            &mut shutdown_rx,
        )
        .await;
        assert!(result.is_ok());
        assert_eq!(session.command_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_signal() {
        let (_client, mut server_side) = tokio::io::duplex(64);
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        shutdown_tx.send(()).unwrap();

        let mut session = test_session();
        let result = serve_stream(
            &mut server_side,
            &mut session,
            &ServerConfig::default(),
            &ServerStats::default(),
            &mut shutdown_rx,
        )
        .await;
        assert!(matches!(result, Err(ServerError::ShuttingDown)));
    }
}

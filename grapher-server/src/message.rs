//! Message binding.
//!
//! Each inbound WebSocket message is exactly one command. Every reply frame
//! goes out as its own Text message carrying the newline-terminated JSON line.

use crate::error::ServerError;
use crate::reply::FrameSink;
use crate::server::{idle, ServerConfig, ServerStats};
use crate::session::Session;
use futures::future::{BoxFuture, FutureExt};
use futures::{SinkExt, StreamExt};
use std::io;
use std::sync::atomic::Ordering;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// Sends frames as WebSocket text messages.
pub struct MessageSink<'a, S> {
    ws: &'a mut WebSocketStream<S>,
}

impl<'a, S> MessageSink<'a, S> {
    pub fn new(ws: &'a mut WebSocketStream<S>) -> Self {
        Self { ws }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> FrameSink for MessageSink<'_, S> {
    fn send_line(&mut self, line: String) -> BoxFuture<'_, io::Result<()>> {
        async move {
            self.ws
                .send(Message::Text(line))
                .await
                .map_err(|e| io::Error::new(io::ErrorKind::BrokenPipe, e.to_string()))
        }
        .boxed()
    }
}

/// Runs a session over a WebSocket until close, idle timeout or shutdown.
pub async fn serve_messages<S>(
    ws: &mut WebSocketStream<S>,
    session: &mut Session,
    config: &ServerConfig,
    stats: &ServerStats,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let addr = session.remote_addr;

    loop {
        let message = tokio::select! {
            next = ws.next() => match next {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    tracing::debug!("[{}] WebSocket error: {}", addr, e);
                    return Err(ServerError::WebSocket(e));
                }
                None => {
                    tracing::debug!("[{}] Connection closed by client", addr);
                    return Ok(());
                }
            },
            _ = idle(config.idle_timeout) => {
                tracing::debug!("[{}] Idle timeout", addr);
                let _ = ws.close(None).await;
                return Ok(());
            }
            _ = shutdown.recv() => {
                tracing::debug!("[{}] Shutdown signal received", addr);
                let _ = ws.close(None).await;
                return Err(ServerError::ShuttingDown);
            }
        };

        let input = match message {
            Message::Text(text) => text,
            Message::Binary(data) => String::from_utf8_lossy(&data).into_owned(),
            Message::Close(_) => {
                tracing::debug!("[{}] Close frame received", addr);
                return Ok(());
            }
            // Ping/Pong are answered by tungstenite.
            _ => continue,
        };

        stats.commands_total.fetch_add(1, Ordering::Relaxed);
        let mut sink = MessageSink::new(ws);
        session.handle(&input, &mut sink).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProtocolConfig;
    use grapher_core::{DriverRegistry, SampleGraphDriver, SAMPLE_DRIVER_NAME};
    use std::sync::Arc;
    use tokio::io::DuplexStream;
    use tokio::task::JoinHandle;
    use tokio_tungstenite::tungstenite::protocol::Role;

    fn test_session() -> Session {
        let mut registry = DriverRegistry::new();
        registry.register::<SampleGraphDriver>(SAMPLE_DRIVER_NAME);
        Session::new(
            "127.0.0.1:4001".parse().unwrap(),
            Arc::new(registry),
            ProtocolConfig::default(),
        )
    }

    /// Runs `serve_messages` over an in-memory socket and returns the client end.
    async fn start() -> (
        WebSocketStream<DuplexStream>,
        JoinHandle<(Result<(), ServerError>, u64)>,
        broadcast::Sender<()>,
    ) {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(async move {
            let mut ws = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
            let mut session = test_session();
            let result = serve_messages(
                &mut ws,
                &mut session,
                &ServerConfig::default(),
                &ServerStats::default(),
                &mut shutdown_rx,
            )
            .await;
            (result, session.command_count())
        });

        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        (client, handle, shutdown_tx)
    }

    #[tokio::test]
    async fn test_binary_message_is_a_command() {
        let (mut client, handle, _shutdown_tx) = start().await;

        client
            .send(Message::Binary(b"load sample".to_vec()))
            .await
            .unwrap();
        let reply = client.next().await.unwrap().unwrap();
        assert_eq!(reply, Message::Text("{\"info\":\"Done\"}\n".to_string()));

        // Invalid UTF-8 is decoded lossily rather than dropping the command.
        client
            .send(Message::Binary(b"unknown\xff op".to_vec()))
            .await
            .unwrap();
        let reply = client.next().await.unwrap().unwrap();
        assert_eq!(reply, Message::Text("{\"error\":\"NotFound\"}\n".to_string()));

        client.close(None).await.unwrap();
        let (result, count) = handle.await.unwrap();
        assert!(result.is_ok());
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_close_ends_session() {
        let (mut client, handle, _shutdown_tx) = start().await;

        client
            .send(Message::Text("load sample".to_string()))
            .await
            .unwrap();
        client.next().await.unwrap().unwrap();

        client.close(None).await.unwrap();
        let (result, count) = handle.await.unwrap();
        assert!(result.is_ok());
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_ping_is_not_a_command() {
        let (mut client, handle, _shutdown_tx) = start().await;

        client.send(Message::Ping(b"hi".to_vec())).await.unwrap();
        client
            .send(Message::Text("unload".to_string()))
            .await
            .unwrap();

        // The pong arrives first, then the reply to the only command.
        let mut replies = Vec::new();
        while replies.is_empty() {
            match client.next().await.unwrap().unwrap() {
                Message::Text(text) => replies.push(text),
                Message::Pong(_) => {}
                other => panic!("unexpected message: {:?}", other),
            }
        }
        assert_eq!(replies, vec!["{\"error\":\"AlreadyDone\"}\n".to_string()]);

        client.close(None).await.unwrap();
        let (result, count) = handle.await.unwrap();
        assert!(result.is_ok());
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_shutdown_closes_socket() {
        let (mut client, handle, shutdown_tx) = start().await;
        shutdown_tx.send(()).unwrap();

        let (result, _) = handle.await.unwrap();
        assert!(matches!(result, Err(ServerError::ShuttingDown)));
        assert!(matches!(client.next().await, Some(Ok(Message::Close(_))) | None));
    }
}

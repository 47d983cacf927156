//! Reply streaming.
//!
//! Turns a driver [`Reply`] into ordered frames on a [`FrameSink`]. Items are
//! written one at a time in the order the driver yields them; the first item
//! carrying an `error` key ends the reply with an error frame and no `Done`.

use crate::error::ServerError;
use futures::future::{self, BoxFuture, FutureExt};
use futures::StreamExt;
use grapher_core::Reply;
use grapher_protocol::{ReplyFrame, StatusFormat};
use std::io;

/// Destination for encoded reply lines.
pub trait FrameSink: Send {
    /// Writes one newline-terminated frame.
    fn send_line(&mut self, line: String) -> BoxFuture<'_, io::Result<()>>;
}

/// Collects lines in memory.
impl FrameSink for Vec<String> {
    fn send_line(&mut self, line: String) -> BoxFuture<'_, io::Result<()>> {
        self.push(line);
        future::ready(Ok(())).boxed()
    }
}

/// How a streamed reply ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyEnd {
    /// All items sent, followed by `Done`.
    Done,
    /// An error marker cut the stream short.
    Error,
}

/// Encodes frames for one command and writes them to a sink.
pub struct ReplyWriter<'a, S: ?Sized> {
    sink: &'a mut S,
    format: StatusFormat,
    frames_sent: usize,
}

impl<'a, S: FrameSink + ?Sized> ReplyWriter<'a, S> {
    pub fn new(sink: &'a mut S, format: StatusFormat) -> Self {
        Self {
            sink,
            format,
            frames_sent: 0,
        }
    }

    /// Encodes and writes one frame.
    pub async fn send(&mut self, frame: &ReplyFrame) -> Result<(), ServerError> {
        let line = frame.encode(self.format)?;
        tracing::debug!("Writing frame: {}", line.trim_end());
        self.sink.send_line(line).await?;
        self.frames_sent += 1;
        Ok(())
    }

    /// Number of frames written so far.
    pub fn frames_sent(&self) -> usize {
        self.frames_sent
    }
}

/// Streams a reply's items, then `Done`, stopping at the first error marker.
pub async fn stream_reply<S: FrameSink + ?Sized>(
    writer: &mut ReplyWriter<'_, S>,
    reply: Reply,
) -> Result<ReplyEnd, ServerError> {
    let mut items = reply.into_stream();
    while let Some(item) = items.next().await {
        if let Some(marker) = ReplyFrame::error_marker(&item) {
            let frame = ReplyFrame::from_error_marker(marker.clone());
            writer.send(&frame).await?;
            return Ok(ReplyEnd::Error);
        }
        writer.send(&ReplyFrame::Data(item)).await?;
    }
    writer.send(&ReplyFrame::done()).await?;
    Ok(ReplyEnd::Done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Accepts `limit` lines, then fails like a closed socket.
    struct FailingSink {
        accepted: Vec<String>,
        limit: usize,
    }

    impl FrameSink for FailingSink {
        fn send_line(&mut self, line: String) -> BoxFuture<'_, io::Result<()>> {
            let result = if self.accepted.len() < self.limit {
                self.accepted.push(line);
                Ok(())
            } else {
                Err(io::Error::from(io::ErrorKind::BrokenPipe))
            };
            future::ready(result).boxed()
        }
    }

    fn parse(lines: &[String]) -> Vec<Value> {
        lines
            .iter()
            .map(|l| serde_json::from_str(l.trim_end()).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_items_then_done() {
        let mut sink: Vec<String> = Vec::new();
        let mut writer = ReplyWriter::new(&mut sink, StatusFormat::Symbolic);
        let reply = Reply::items(vec![json!({"id": 1}), json!({"id": 2})]);

        let end = stream_reply(&mut writer, reply).await.unwrap();
        assert_eq!(end, ReplyEnd::Done);
        assert_eq!(writer.frames_sent(), 3);
        assert_eq!(
            parse(&sink),
            vec![json!({"id": 1}), json!({"id": 2}), json!({"info": "Done"})]
        );
    }

    #[tokio::test]
    async fn test_empty_reply_is_just_done() {
        let mut sink: Vec<String> = Vec::new();
        let mut writer = ReplyWriter::new(&mut sink, StatusFormat::Numbered);
        stream_reply(&mut writer, Reply::value(json!(null)))
            .await
            .unwrap();
        assert_eq!(sink, vec!["{\"info\":\"200_DONE\"}\n".to_string()]);
    }

    #[tokio::test]
    async fn test_error_marker_truncates() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = pulled.clone();
        let items = stream::iter(vec![
            json!({"id": 1}),
            json!({"error": "LinksWithCycle"}),
            json!({"id": 3}),
        ])
        .inspect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut sink: Vec<String> = Vec::new();
        let mut writer = ReplyWriter::new(&mut sink, StatusFormat::Symbolic);
        let end = stream_reply(&mut writer, Reply::stream(items)).await.unwrap();

        assert_eq!(end, ReplyEnd::Error);
        assert_eq!(
            parse(&sink),
            vec![json!({"id": 1}), json!({"error": "LinksWithCycle"})]
        );
        // The item after the marker is never pulled.
        assert_eq!(pulled.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_custom_error_marker_passes_through() {
        let mut sink: Vec<String> = Vec::new();
        let mut writer = ReplyWriter::new(&mut sink, StatusFormat::Numbered);
        let reply = Reply::items(vec![json!({"error": "backend unavailable", "extra": 1})]);
        stream_reply(&mut writer, reply).await.unwrap();
        assert_eq!(parse(&sink), vec![json!({"error": "backend unavailable"})]);
    }

    #[tokio::test]
    async fn test_status_marker_is_not_rewritten() {
        let mut sink: Vec<String> = Vec::new();
        let mut writer = ReplyWriter::new(&mut sink, StatusFormat::Symbolic);
        let reply = Reply::items(vec![json!({"error": "409_LINKS_WITH_CYCLE"})]);
        stream_reply(&mut writer, reply).await.unwrap();
        assert_eq!(sink, vec!["{\"error\":\"409_LINKS_WITH_CYCLE\"}\n".to_string()]);

        let mut sink: Vec<String> = Vec::new();
        let mut writer = ReplyWriter::new(&mut sink, StatusFormat::Numbered);
        let reply = Reply::items(vec![json!({"error": "LinksWithCycle"})]);
        stream_reply(&mut writer, reply).await.unwrap();
        assert_eq!(sink, vec!["{\"error\":\"LinksWithCycle\"}\n".to_string()]);
    }

    #[tokio::test]
    async fn test_write_failure_stops_reply() {
        let mut sink = FailingSink {
            accepted: Vec::new(),
            limit: 1,
        };
        let mut writer = ReplyWriter::new(&mut sink, StatusFormat::Symbolic);
        let reply = Reply::items(vec![json!(1), json!(2), json!(3)]);

        let err = stream_reply(&mut writer, reply).await.unwrap_err();
        assert!(err.is_disconnect());
        assert_eq!(writer.frames_sent(), 1);
        assert_eq!(sink.accepted.len(), 1);
    }
}

//! Sink abstraction over the bidirectional byte stream a session writes
//! encoded frames to (§6: "A bidirectional byte-oriented stream (treated
//! here as a WebSocket for concreteness)").
//!
//! Grounded on the source crate's `Transcoder`/`Passthrough` trait split
//! (one real implementation, one in-memory test double) and, for the
//! concrete WebSocket client itself, the outbound `connect_async` idiom
//! used elsewhere in the retrieved pack (see DESIGN.md) — the source crate
//! only ever ran a WebSocket *server*.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{PipelineError, PipelineResult};

/// What a session needs from its transport: send binary/text frames, poll
/// for inbound text without blocking the consumer loop, and report how
/// much is still buffered for the backpressure check (§4.F, §4.G).
#[async_trait]
pub trait Sink: Send + Sync {
    async fn send_binary(&self, bytes: Vec<u8>) -> PipelineResult<()>;
    async fn send_text(&self, text: String) -> PipelineResult<()>;
    /// Returns the next buffered inbound text frame, if any, without
    /// waiting.
    fn try_recv_text(&self) -> Option<String>;
    /// Bytes currently queued for send but not yet flushed to the peer.
    fn buffered_bytes(&self) -> usize;
    async fn close(&self);
}

/// Live WebSocket sink. A background writer task owns the actual
/// `WebSocketStream` half that sends; callers hand it frames over an mpsc
/// channel so `send_binary`/`send_text` never block on network I/O. A
/// second background task drains inbound text frames into a channel
/// `try_recv_text` polls.
pub struct WsSink {
    outbound: mpsc::UnboundedSender<Message>,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    buffered: Arc<AtomicUsize>,
    writer_task: tokio::task::JoinHandle<()>,
    reader_task: tokio::task::JoinHandle<()>,
}

impl WsSink {
    /// Connects to `url`, and spawns the writer/reader tasks. The caller is
    /// responsible for performing the handshake text exchange over the
    /// returned sink (§6).
    pub async fn connect(url: &str) -> PipelineResult<Self> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|err| PipelineError::HandshakeFailed(format!("connect to {url} failed: {err}")))?;

        let (mut write, mut read) = stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();
        let buffered = Arc::new(AtomicUsize::new(0));
        let buffered_writer = buffered.clone();

        let writer_task = tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let len = match &msg {
                    Message::Binary(b) => b.len(),
                    Message::Text(t) => t.len(),
                    _ => 0,
                };
                if write.send(msg).await.is_err() {
                    break;
                }
                buffered_writer.fetch_sub(len.min(buffered_writer.load(Ordering::Relaxed)), Ordering::Relaxed);
            }
        });

        let reader_task = tokio::spawn(async move {
            while let Some(Ok(msg)) = read.next().await {
                if let Message::Text(text) = msg {
                    if in_tx.send(text.to_string()).is_err() {
                        break;
                    }
                }
            }
        });

        Ok(Self {
            outbound: out_tx,
            inbound: tokio::sync::Mutex::new(in_rx),
            buffered,
            writer_task,
            reader_task,
        })
    }
}

#[async_trait]
impl Sink for WsSink {
    async fn send_binary(&self, bytes: Vec<u8>) -> PipelineResult<()> {
        self.buffered.fetch_add(bytes.len(), Ordering::Relaxed);
        self.outbound
            .send(Message::Binary(bytes.into()))
            .map_err(|_| PipelineError::SinkClosed("writer task gone".to_string()))
    }

    async fn send_text(&self, text: String) -> PipelineResult<()> {
        self.buffered.fetch_add(text.len(), Ordering::Relaxed);
        self.outbound
            .send(Message::Text(text.into()))
            .map_err(|_| PipelineError::SinkClosed("writer task gone".to_string()))
    }

    fn try_recv_text(&self) -> Option<String> {
        self.inbound.try_lock().ok()?.try_recv().ok()
    }

    fn buffered_bytes(&self) -> usize {
        self.buffered.load(Ordering::Relaxed)
    }

    async fn close(&self) {
        let _ = self.outbound.send(Message::Close(None));
        self.writer_task.abort();
        self.reader_task.abort();
    }
}

/// In-memory test double: an outbound channel the test reads from and an
/// inbound channel the test writes to, standing in for the WebSocket peer.
pub struct ChannelSink {
    outbound_tx: mpsc::UnboundedSender<Message>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    buffered: Arc<AtomicUsize>,
}

impl ChannelSink {
    /// Builds a connected pair: the returned `ChannelSink` plus handles a
    /// test can use to observe outbound frames and inject inbound ones.
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<Message>, mpsc::UnboundedSender<String>) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let sink = Self {
            outbound_tx: out_tx,
            inbound_rx: tokio::sync::Mutex::new(in_rx),
            buffered: Arc::new(AtomicUsize::new(0)),
        };
        (sink, out_rx, in_tx)
    }
}

#[async_trait]
impl Sink for ChannelSink {
    async fn send_binary(&self, bytes: Vec<u8>) -> PipelineResult<()> {
        self.buffered.fetch_add(bytes.len(), Ordering::Relaxed);
        self.outbound_tx
            .send(Message::Binary(bytes.into()))
            .map_err(|_| PipelineError::SinkClosed("test peer dropped".to_string()))
    }

    async fn send_text(&self, text: String) -> PipelineResult<()> {
        self.buffered.fetch_add(text.len(), Ordering::Relaxed);
        self.outbound_tx
            .send(Message::Text(text.into()))
            .map_err(|_| PipelineError::SinkClosed("test peer dropped".to_string()))
    }

    fn try_recv_text(&self) -> Option<String> {
        self.inbound_rx.try_lock().ok()?.try_recv().ok()
    }

    fn buffered_bytes(&self) -> usize {
        self.buffered.load(Ordering::Relaxed)
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_sink_roundtrips_binary_and_text() {
        let (sink, mut out_rx, in_tx) = ChannelSink::pair();
        sink.send_binary(vec![1, 2, 3]).await.unwrap();
        sink.send_text("{\"type\":\"HEARTBEAT\"}".to_string()).await.unwrap();

        match out_rx.recv().await.unwrap() {
            Message::Binary(b) => assert_eq!(b.as_ref(), &[1, 2, 3]),
            other => panic!("expected binary, got {other:?}"),
        }
        match out_rx.recv().await.unwrap() {
            Message::Text(t) => assert_eq!(t, "{\"type\":\"HEARTBEAT\"}"),
            other => panic!("expected text, got {other:?}"),
        }

        in_tx.send("{\"type\":\"HANDSHAKE_ACK\"}".to_string()).unwrap();
        tokio::task::yield_now().await;
        assert_eq!(sink.try_recv_text(), Some("{\"type\":\"HANDSHAKE_ACK\"}".to_string()));
    }

    #[tokio::test]
    async fn channel_sink_reports_buffered_bytes() {
        let (sink, _out_rx, _in_tx) = ChannelSink::pair();
        sink.send_binary(vec![0u8; 100]).await.unwrap();
        sink.send_binary(vec![0u8; 50]).await.unwrap();
        assert_eq!(sink.buffered_bytes(), 150);
    }

    #[tokio::test]
    async fn try_recv_text_returns_none_when_empty() {
        let (sink, _out_rx, _in_tx) = ChannelSink::pair();
        assert_eq!(sink.try_recv_text(), None);
    }

    #[tokio::test]
    async fn send_fails_after_peer_dropped() {
        let (sink, out_rx, _in_tx) = ChannelSink::pair();
        drop(out_rx);
        let result = sink.send_binary(vec![1]).await;
        assert!(result.is_err());
    }
}

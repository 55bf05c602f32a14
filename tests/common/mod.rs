#![allow(dead_code)]

use async_trait::async_trait;
use flagbook::{Connection, Connector, FlagbookError, FlagbookOptions, Frame, Result};
use futures_util::{sink, stream};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

pub const TEST_TOKEN: &str = "test-token";

/// Options pointed at the mock transport, with pings and reporting off.
pub fn test_options() -> FlagbookOptions {
    FlagbookOptions::builder()
        .access_token(TEST_TOKEN)
        .base_url("ws://flagbook.test/ws/")
        .ping_interval(None)
        .usage_reporting_enabled(false)
        .build()
}

/// Server side of one mock connection.
pub struct MockPeer {
    pub endpoint: String,
    outbound: mpsc::UnboundedReceiver<Frame>,
    inbound: mpsc::UnboundedSender<Result<Frame>>,
}

impl MockPeer {
    /// Next frame written by the client, pings included.
    pub async fn recv_frame(&mut self) -> Option<Frame> {
        self.outbound.recv().await
    }

    /// Next text frame written by the client, skipping pings.
    pub async fn recv_text(&mut self) -> Option<String> {
        while let Some(frame) = self.outbound.recv().await {
            match frame {
                Frame::Text(text) => return Some(text),
                Frame::Ping => continue,
                Frame::Close => return None,
            }
        }
        None
    }

    pub async fn recv_json(&mut self) -> Option<Value> {
        let text = self.recv_text().await?;
        Some(serde_json::from_str(&text).expect("client sent invalid JSON"))
    }

    /// Text frame already written by the client, if any.
    pub fn try_recv_text(&mut self) -> Option<String> {
        while let Ok(frame) = self.outbound.try_recv() {
            if let Frame::Text(text) = frame {
                return Some(text);
            }
        }
        None
    }

    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.inbound.send(Ok(Frame::Text(text.into())));
    }

    pub fn send_json(&self, message: Value) {
        self.send_text(message.to_string());
    }

    /// Close the connection from the server side.
    pub fn close(self) {
        let _ = self.inbound.send(Ok(Frame::Close));
    }
}

/// In-memory connector. Every successful attempt hands a [`MockPeer`] to the test.
pub struct MockConnector {
    peers: mpsc::UnboundedSender<MockPeer>,
    attempts: Mutex<Vec<Instant>>,
    refuse: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockPeer>) {
        Self::refusing(0)
    }

    /// Connector whose first `count` attempts fail.
    pub fn refusing(count: usize) -> (Arc<Self>, mpsc::UnboundedReceiver<MockPeer>) {
        let (peers, peers_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            peers,
            attempts: Mutex::new(Vec::new()),
            refuse: AtomicUsize::new(count),
        });
        (connector, peers_rx)
    }

    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().clone()
    }

    /// Gaps between consecutive connection attempts.
    pub fn attempt_gaps(&self) -> Vec<Duration> {
        self.attempts()
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .collect()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, endpoint: &str) -> Result<Connection> {
        self.attempts.lock().push(Instant::now());

        let refused = self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(FlagbookError::transport("connection refused"));
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Frame>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Result<Frame>>();

        self.peers
            .send(MockPeer {
                endpoint: endpoint.to_string(),
                outbound: outbound_rx,
                inbound: inbound_tx,
            })
            .map_err(|_| FlagbookError::transport("test harness gone"))?;

        let sink = sink::unfold(outbound_tx, |tx, frame: Frame| async move {
            tx.send(frame)
                .map_err(|_| FlagbookError::transport("peer gone"))?;
            Ok::<_, FlagbookError>(tx)
        });
        let stream = stream::unfold(inbound_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        Ok(Connection::new(sink, stream))
    }
}

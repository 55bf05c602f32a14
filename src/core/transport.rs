//! Transport seam between the channel manager and the network.
//!
//! A [`Connector`] opens one duplex [`Connection`] per attempt. The default
//! [`WebSocketConnector`] speaks WebSocket through `tokio-tungstenite`; tests
//! and proxies can plug in their own.

use async_trait::async_trait;
use futures_util::{future, Sink, SinkExt, Stream, StreamExt};
use std::pin::Pin;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::error::{sanitize_message, ErrorCode, FlagbookError, Result};

/// Transport-level unit exchanged with the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// One JSON-encoded protocol message.
    Text(String),
    /// Keep-alive ping.
    Ping,
    /// Orderly close, from either side.
    Close,
}

impl Frame {
    fn into_message(self) -> Message {
        match self {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Ping => Message::Ping(Default::default()),
            Frame::Close => Message::Close(None),
        }
    }

    fn from_message(message: Message) -> Option<Frame> {
        match message {
            Message::Text(text) => Some(Frame::Text(text.as_str().to_owned())),
            Message::Binary(data) => String::from_utf8(data.to_vec()).ok().map(Frame::Text),
            Message::Close(_) => Some(Frame::Close),
            // Pongs are answered by tungstenite itself
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
        }
    }
}

pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = FlagbookError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame>> + Send>>;

/// An open duplex connection, split into its write and read halves.
pub struct Connection {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Connection {
    pub fn new<S, R>(sink: S, stream: R) -> Self
    where
        S: Sink<Frame, Error = FlagbookError> + Send + 'static,
        R: Stream<Item = Result<Frame>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }
}

/// Opens connections to the flag service.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, endpoint: &str) -> Result<Connection>;
}

/// WebSocket connector backed by `tokio-tungstenite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

fn transport_error(context: &str, err: tokio_tungstenite::tungstenite::Error) -> FlagbookError {
    let message = sanitize_message(&format!("{}: {}", context, err));
    FlagbookError::with_source(ErrorCode::NetworkError, message, err)
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &str) -> Result<Connection> {
        let (ws_stream, _response) = connect_async(endpoint)
            .await
            .map_err(|e| transport_error("WebSocket handshake failed", e))?;

        let (write, read) = ws_stream.split();

        let sink = write
            .sink_map_err(|e| transport_error("WebSocket write failed", e))
            .with(|frame: Frame| future::ready(Ok::<_, FlagbookError>(frame.into_message())));

        let stream = read.filter_map(|message| {
            future::ready(match message {
                Ok(message) => Frame::from_message(message).map(Ok),
                Err(e) => Some(Err(transport_error("WebSocket read failed", e))),
            })
        });

        Ok(Connection::new(sink, stream))
    }
}

//! Connection supervisor for the flag channel.

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, sleep, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::core::config::{FlagbookOptions, DEFAULT_PING_INTERVAL, MAX_TIMER_HORIZON};
use crate::core::reconnect::ReconnectPolicy;
use crate::core::transport::{Connection, Connector, Frame};
use crate::error::{redact_endpoint, FlagbookError, Result};

/// Connection states for the flag channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
    Disposed,
}

/// Receives every decoded inbound message.
pub type MessageCallback = Arc<dyn Fn(serde_json::Value) + Send + Sync>;

/// Channel configuration.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Keep-alive ping period while open. `None` disables pings.
    pub ping_interval: Option<Duration>,
    pub reconnect: ReconnectPolicy,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            ping_interval: Some(DEFAULT_PING_INTERVAL),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl From<&FlagbookOptions> for ChannelConfig {
    fn from(options: &FlagbookOptions) -> Self {
        Self {
            ping_interval: options.ping_interval,
            reconnect: options.reconnect.clone(),
        }
    }
}

/// Lifecycle state plus the write handle of the open connection.
#[derive(Clone)]
enum Link {
    Connecting,
    Open(mpsc::UnboundedSender<Frame>),
    Closed,
    Disposed,
}

impl Link {
    fn state(&self) -> ChannelState {
        match self {
            Link::Connecting => ChannelState::Connecting,
            Link::Open(_) => ChannelState::Open,
            Link::Closed => ChannelState::Closed,
            Link::Disposed => ChannelState::Disposed,
        }
    }

    fn is_settled(&self) -> bool {
        matches!(self, Link::Open(_) | Link::Disposed)
    }
}

/// Owns the single duplex connection to the flag service.
///
/// Features:
/// - Unconditional reconnect on close, paced by a [`ReconnectPolicy`]
/// - Sends suspend until the channel is open instead of failing
/// - Optional keep-alive pings while open
/// - Every inbound JSON message goes to one registered callback
///
/// Transport errors are logged and never surfaced to callers.
#[derive(Clone)]
pub struct ChannelManager {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    endpoint: String,
    connector: Arc<dyn Connector>,
    config: ChannelConfig,
    on_message: MessageCallback,
    link: watch::Sender<Link>,
    shutdown: CancellationToken,
    started: AtomicBool,
    attempts: AtomicU64,
}

impl ChannelManager {
    /// Creates a channel manager. Nothing connects until [`connect`](Self::connect).
    pub fn new(
        endpoint: impl Into<String>,
        connector: Arc<dyn Connector>,
        config: ChannelConfig,
        on_message: MessageCallback,
    ) -> Self {
        let (link, _) = watch::channel(Link::Closed);
        Self {
            inner: Arc::new(ChannelInner {
                endpoint: endpoint.into(),
                connector,
                config,
                on_message,
                link,
                shutdown: CancellationToken::new(),
                started: AtomicBool::new(false),
                attempts: AtomicU64::new(0),
            }),
        }
    }

    /// Starts the connection supervisor on the current Tokio runtime.
    ///
    /// Calling it again while the supervisor runs is a no-op.
    pub fn connect(&self) -> Result<()> {
        let handle =
            tokio::runtime::Handle::try_current().map_err(|_| FlagbookError::no_runtime())?;

        if self.inner.shutdown.is_cancelled() || self.inner.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let inner = Arc::clone(&self.inner);
        handle.spawn(inner.run());
        Ok(())
    }

    pub fn state(&self) -> ChannelState {
        self.inner.link.borrow().state()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Number of connection attempts made so far, successful or not.
    pub fn connection_attempts(&self) -> u64 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Waits until the channel is open.
    ///
    /// Fails only once the manager has been shut down.
    pub async fn wait_until_open(&self) -> Result<()> {
        let mut link_rx = self.inner.link.subscribe();
        let open = {
            let link = link_rx
                .wait_for(Link::is_settled)
                .await
                .map_err(|_| FlagbookError::channel_closed())?;
            matches!(&*link, Link::Open(_))
        };

        if open {
            Ok(())
        } else {
            Err(FlagbookError::channel_closed())
        }
    }

    /// Serializes `message` to JSON and writes it to the channel.
    ///
    /// While the channel is not open the send suspends until it opens; it does
    /// not fail on its own. Only a shut-down manager rejects the send.
    ///
    /// `Ok` means the frame was queued on the open connection, not that it
    /// reached the peer. Frames still queued when that connection closes are
    /// dropped (and counted in a debug log); callers rely on their own timeout.
    pub async fn send<T: Serialize + ?Sized>(&self, message: &T) -> Result<()> {
        let encoded = serde_json::to_string(message)?;
        let mut link_rx = self.inner.link.subscribe();

        loop {
            let sender = {
                let link = link_rx
                    .wait_for(Link::is_settled)
                    .await
                    .map_err(|_| FlagbookError::channel_closed())?;
                match &*link {
                    Link::Open(sender) => sender.clone(),
                    _ => return Err(FlagbookError::channel_closed()),
                }
            };

            if sender.send(Frame::Text(encoded.clone())).is_ok() {
                return Ok(());
            }

            // The connection dropped between open and write. Its link has
            // already moved on, so the next wait blocks until a reconnect.
            tracing::debug!("Flag channel closed mid-send, waiting for reconnect");
        }
    }

    /// Stops reconnecting, closes the open connection and rejects later sends.
    pub fn shutdown(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        self.inner.shutdown.cancel();
        self.inner.link.send_replace(Link::Disposed);
        tracing::debug!("Flag channel shutdown requested");
    }
}

impl ChannelInner {
    fn set_link(&self, link: Link) {
        if !self.shutdown.is_cancelled() {
            self.link.send_replace(link);
        }
    }

    async fn run(self: Arc<Self>) {
        let endpoint = redact_endpoint(&self.endpoint);
        let mut failures: u32 = 0;

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            self.set_link(Link::Connecting);
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::debug!(endpoint = %endpoint, attempt, "Connecting to flag channel");

            let connected = tokio::select! {
                result = self.connector.connect(&self.endpoint) => result,
                _ = self.shutdown.cancelled() => break,
            };

            let connect_error = match connected {
                Ok(connection) => {
                    failures = 0;
                    self.drive(connection).await;
                    None
                }
                Err(e) => Some(e),
            };

            if self.shutdown.is_cancelled() {
                break;
            }

            self.set_link(Link::Closed);
            failures = failures.saturating_add(1);
            let delay = self.config.reconnect.delay(failures);

            match connect_error {
                Some(e) => tracing::error!(
                    endpoint = %endpoint,
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "Cannot establish the connection, retrying"
                ),
                None => tracing::debug!(
                    retry_in_ms = delay.as_millis() as u64,
                    "Flag channel closed, reconnecting"
                ),
            }

            tokio::select! {
                _ = sleep(delay) => {}
                _ = self.shutdown.cancelled() => break,
            }
        }

        self.link.send_replace(Link::Disposed);
        tracing::debug!("Flag channel stopped");
    }

    /// Pumps one open connection until it closes or the manager shuts down.
    async fn drive(&self, connection: Connection) {
        let Connection {
            mut sink,
            mut stream,
        } = connection;

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Frame>();
        self.set_link(Link::Open(outbound_tx));
        tracing::debug!("Flag channel open");

        // First tick fires immediately: one ping right after open.
        let mut ping = self.config.ping_interval.map(|period| {
            let mut ticker = interval_at(Instant::now(), period.min(MAX_TIMER_HORIZON));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    let _ = sink.send(Frame::Close).await;
                    break;
                }
                inbound = stream.next() => match inbound {
                    Some(Ok(Frame::Text(text))) => self.dispatch(&text),
                    Some(Ok(Frame::Ping)) => {}
                    Some(Ok(Frame::Close)) | None => {
                        tracing::debug!("Flag channel closed by peer");
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "Flag channel transport error");
                        break;
                    }
                },
                Some(frame) = outbound_rx.recv() => {
                    if let Err(e) = sink.send(frame).await {
                        tracing::error!(error = %e, "Failed to write to flag channel");
                        break;
                    }
                }
                _ = next_tick(&mut ping) => {
                    if let Err(e) = sink.send(Frame::Ping).await {
                        tracing::error!(error = %e, "Failed to ping flag channel");
                        break;
                    }
                }
            }
        }

        // Retire the write handle before the receiver goes away so a racing
        // send observes the closed link instead of spinning.
        self.set_link(Link::Closed);
        let undelivered = retire_outbound(&mut outbound_rx);
        if undelivered > 0 {
            tracing::debug!(undelivered, "Dropping frames queued on a closed flag channel");
        }
    }

    fn dispatch(&self, text: &str) {
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(message) => (self.on_message)(message),
            Err(e) => tracing::warn!(error = %e, "Dropping malformed message from flag channel"),
        }
    }
}

/// Closes the outbound queue and discards what is left in it.
fn retire_outbound(outbound_rx: &mut mpsc::UnboundedReceiver<Frame>) -> usize {
    outbound_rx.close();
    let mut undelivered = 0;
    while outbound_rx.try_recv().is_ok() {
        undelivered += 1;
    }
    undelivered
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

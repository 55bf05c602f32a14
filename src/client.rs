use std::fmt;
use std::sync::Arc;

use crate::core::{
    system_clock, ChannelConfig, ChannelManager, ChannelState, Clock, Connector, FlagCache,
    FlagbookOptions, MessageCallback, PendingRequests, ReporterConfig, TraceSender,
    UsageReporter, WebSocketConnector,
};
use crate::error::{redact_endpoint, FlagbookError, Result};
use crate::types::{FlagOutcome, FlagRequest, InboundMessage, Tags};

pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Flag evaluation client.
///
/// Owns the channel to the flag service, the result cache, the pending
/// request registry and the usage reporter. Background work stops on
/// [`close`](Self::close) or when the client is dropped.
pub struct FlagbookClient {
    options: FlagbookOptions,
    cache: FlagCache,
    pending: Arc<PendingRequests>,
    channel: Option<ChannelManager>,
    reporter: Option<UsageReporter>,
}

impl FlagbookClient {
    /// Creates a client that talks WebSocket to `options.base_url`.
    ///
    /// Must be called from within a Tokio runtime. Without an access token the
    /// client is still created, but no connection is opened and every
    /// evaluation fails with a configuration error.
    pub fn new(options: FlagbookOptions) -> Result<Self> {
        Self::with_connector(options, Arc::new(WebSocketConnector))
    }

    /// Creates a client on top of a custom transport.
    pub fn with_connector(options: FlagbookOptions, connector: Arc<dyn Connector>) -> Result<Self> {
        Self::with_clock(options, connector, system_clock())
    }

    /// Like [`with_connector`](Self::with_connector), with usage buckets
    /// measured on `clock` instead of the system time.
    pub fn with_clock(
        options: FlagbookOptions,
        connector: Arc<dyn Connector>,
        clock: Clock,
    ) -> Result<Self> {
        options.validate()?;
        tokio::runtime::Handle::try_current().map_err(|_| FlagbookError::no_runtime())?;

        let cache = FlagCache::new(options.cache_ttl);
        let pending = Arc::new(PendingRequests::new());

        let mut client = Self {
            options,
            cache,
            pending,
            channel: None,
            reporter: None,
        };

        let Some(endpoint) = client.options.endpoint() else {
            tracing::warn!("No access token configured, flag evaluations will fail");
            return Ok(client);
        };

        let channel = ChannelManager::new(
            endpoint.clone(),
            connector,
            ChannelConfig::from(&client.options),
            dispatch_to(Arc::clone(&client.pending)),
        );
        channel.connect()?;

        if client.options.usage_reporting_enabled {
            let reporter = UsageReporter::with_clock(
                ReporterConfig::from(&client.options),
                trace_sender(channel.clone()),
                clock,
            );
            reporter.start()?;
            client.reporter = Some(reporter);
        }

        tracing::debug!(
            version = SDK_VERSION,
            endpoint = %redact_endpoint(&endpoint),
            "Flagbook client created"
        );

        client.channel = Some(channel);
        Ok(client)
    }

    /// Evaluates the boolean flag `name` for the given tags.
    ///
    /// Answers from the cache when possible; otherwise asks the service and
    /// waits at most `options.timeout` for the answer, including any time
    /// spent waiting for the channel to open.
    pub async fn get_flag_value(&self, name: &str, tags: Option<&Tags>) -> Result<bool> {
        let Some(channel) = &self.channel else {
            return Err(FlagbookError::missing_credential());
        };

        if let Some(reporter) = &self.reporter {
            reporter.report(name);
        }

        let request = FlagRequest::new(name, tags.cloned().unwrap_or_default());
        let fingerprint = request.fingerprint();

        if self.options.cache_enabled {
            if let Some(value) = self.cache.get(&fingerprint) {
                tracing::debug!(flag = name, value, "Flag served from cache");
                return Ok(value);
            }
        }

        let waiter = self.pending.register(request.clone());
        let round_trip = async {
            channel.send(&request).await?;
            waiter.await.ok_or_else(FlagbookError::channel_closed)
        };

        let outcome = match tokio::time::timeout(self.options.timeout, round_trip).await {
            Ok(outcome) => outcome?,
            Err(_) => {
                tracing::debug!(
                    flag = name,
                    timeout_ms = self.options.timeout.as_millis() as u64,
                    "Flag request timed out"
                );
                return Err(FlagbookError::timeout());
            }
        };

        match outcome {
            FlagOutcome::Ok(value) => {
                if self.options.cache_enabled {
                    self.cache.set(fingerprint, value);
                }
                Ok(value)
            }
            FlagOutcome::Error(reason) => Err(FlagbookError::remote(reason)),
        }
    }

    /// Stops the reporter and the channel. Later evaluations that miss the
    /// cache fail with a channel-closed error.
    pub fn close(&self) {
        if let Some(reporter) = &self.reporter {
            reporter.dispose();
        }
        if let Some(channel) = &self.channel {
            channel.shutdown();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.channel.as_ref().is_some_and(ChannelManager::is_open)
    }

    /// Channel lifecycle state. `Closed` when no access token was configured.
    pub fn channel_state(&self) -> ChannelState {
        self.channel
            .as_ref()
            .map_or(ChannelState::Closed, ChannelManager::state)
    }

    /// Number of evaluations currently waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    pub fn options(&self) -> &FlagbookOptions {
        &self.options
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

impl fmt::Debug for FlagbookClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlagbookClient")
            .field(
                "endpoint",
                &self.options.endpoint().map(|endpoint| redact_endpoint(&endpoint)),
            )
            .field("cache_enabled", &self.options.cache_enabled)
            .field("timeout", &self.options.timeout)
            .field("channel_state", &self.channel_state())
            .field("pending_requests", &self.pending_requests())
            .finish()
    }
}

impl Drop for FlagbookClient {
    fn drop(&mut self) {
        self.close();
    }
}

/// Routes flag responses from the channel to their waiting callers.
fn dispatch_to(pending: Arc<PendingRequests>) -> MessageCallback {
    Arc::new(move |message| match InboundMessage::decode(message) {
        Ok(InboundMessage::FlagValue { request, outcome }) => {
            if !pending.resolve(&request, outcome) {
                tracing::debug!(flag = %request.name, "Dropping flag response with no waiting caller");
            }
        }
        Ok(InboundMessage::Other(message)) => {
            tracing::trace!(%message, "Ignoring message from flag channel");
        }
        Err(e) => tracing::warn!(error = %e, "Dropping malformed flag response"),
    })
}

fn trace_sender(channel: ChannelManager) -> TraceSender {
    Arc::new(move |trace| {
        let channel = channel.clone();
        Box::pin(async move { channel.send(&trace).await })
    })
}

pub type SharedClient = Arc<FlagbookClient>;

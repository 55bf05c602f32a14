use std::time::Duration;

use crate::core::reconnect::ReconnectPolicy;
use crate::error::{ErrorCode, FlagbookError, Result};

pub const DEFAULT_BASE_URL: &str = "wss://socket.flagbook.sh/ws/";
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(10);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_REPORT_TICK: Duration = Duration::from_secs(1);
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Longest horizon any internal timer or expiry is scheduled at. Longer
/// settings are clamped to it.
pub(crate) const MAX_TIMER_HORIZON: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

#[derive(Debug, Clone)]
pub struct FlagbookOptions {
    /// Access token appended to `base_url`. Calls fail without one.
    pub access_token: Option<String>,
    pub base_url: String,
    pub cache_ttl: Duration,
    pub cache_enabled: bool,
    /// Bound on a single `get_flag_value` round trip.
    pub timeout: Duration,
    pub usage_reporting_enabled: bool,
    /// Size of the wall-clock bucket usage counters are flushed on.
    pub report_interval: Duration,
    /// How often the reporter checks whether a bucket boundary has passed.
    pub report_tick: Duration,
    pub ping_interval: Option<Duration>,
    pub reconnect: ReconnectPolicy,
}

impl Default for FlagbookOptions {
    fn default() -> Self {
        Self {
            access_token: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_enabled: true,
            timeout: DEFAULT_TIMEOUT,
            usage_reporting_enabled: true,
            report_interval: DEFAULT_REPORT_INTERVAL,
            report_tick: DEFAULT_REPORT_TICK,
            ping_interval: Some(DEFAULT_PING_INTERVAL),
            reconnect: ReconnectPolicy::fixed(DEFAULT_RETRY_INTERVAL),
        }
    }
}

impl FlagbookOptions {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            ..Default::default()
        }
    }

    pub fn builder() -> FlagbookOptionsBuilder {
        FlagbookOptionsBuilder::default()
    }

    /// The configured token, treating an empty string as absent.
    pub fn credential(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|token| !token.is_empty())
    }

    /// Full channel URL: `base_url` followed by the token path segment.
    pub fn endpoint(&self) -> Option<String> {
        let token = self.credential()?;
        if self.base_url.ends_with('/') {
            Some(format!("{}{}", self.base_url, token))
        } else {
            Some(format!("{}/{}", self.base_url, token))
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("ws://") || self.base_url.starts_with("wss://")) {
            return Err(FlagbookError::config_error(
                ErrorCode::ConfigInvalidUrl,
                "Base URL must use the ws:// or wss:// scheme",
            ));
        }

        if let Some(token) = self.credential() {
            if token
                .chars()
                .any(|c| c == '/' || c == '?' || c == '#' || c.is_whitespace())
            {
                return Err(FlagbookError::config_error(
                    ErrorCode::ConfigInvalidCredential,
                    "Access token must be a single URL path segment",
                ));
            }
        }

        if self.timeout.is_zero() {
            return Err(FlagbookError::config_error(
                ErrorCode::ConfigInvalidTimeout,
                "Timeout must be positive",
            ));
        }

        if self.cache_enabled && self.cache_ttl.is_zero() {
            return Err(FlagbookError::config_error(
                ErrorCode::ConfigInvalidCacheTtl,
                "Cache TTL must be positive",
            ));
        }

        if self.report_interval.is_zero() || self.report_tick.is_zero() {
            return Err(FlagbookError::config_error(
                ErrorCode::ConfigInvalidInterval,
                "Report interval and tick must be positive",
            ));
        }

        if self.ping_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(FlagbookError::config_error(
                ErrorCode::ConfigInvalidInterval,
                "Ping interval must be positive",
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FlagbookOptionsBuilder {
    options: FlagbookOptions,
}

impl FlagbookOptionsBuilder {
    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.options.access_token = Some(token.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.options.base_url = url.into();
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.options.cache_ttl = ttl;
        self
    }

    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.options.cache_enabled = enabled;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    pub fn usage_reporting_enabled(mut self, enabled: bool) -> Self {
        self.options.usage_reporting_enabled = enabled;
        self
    }

    pub fn report_interval(mut self, interval: Duration) -> Self {
        self.options.report_interval = interval;
        self
    }

    pub fn report_tick(mut self, tick: Duration) -> Self {
        self.options.report_tick = tick;
        self
    }

    /// `None` disables keep-alive pings.
    pub fn ping_interval(mut self, interval: Option<Duration>) -> Self {
        self.options.ping_interval = interval;
        self
    }

    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.options.reconnect = policy;
        self
    }

    pub fn build(self) -> FlagbookOptions {
        self.options
    }
}

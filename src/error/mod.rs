use thiserror::Error;

pub mod sanitizer;

pub use sanitizer::{redact_endpoint, sanitize_message};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Initialization errors
    InitNoRuntime,

    // Configuration errors
    ConfigMissingCredential,
    ConfigInvalidCredential,
    ConfigInvalidUrl,
    ConfigInvalidTimeout,
    ConfigInvalidCacheTtl,
    ConfigInvalidInterval,

    // Network errors
    NetworkError,
    NetworkChannelClosed,

    // Evaluation errors
    EvalRemoteError,
    EvalTimeout,

    // Wire protocol errors
    ProtocolEncodeError,
    ProtocolDecodeError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InitNoRuntime => "INIT_NO_RUNTIME",
            ErrorCode::ConfigMissingCredential => "CONFIG_MISSING_CREDENTIAL",
            ErrorCode::ConfigInvalidCredential => "CONFIG_INVALID_CREDENTIAL",
            ErrorCode::ConfigInvalidUrl => "CONFIG_INVALID_URL",
            ErrorCode::ConfigInvalidTimeout => "CONFIG_INVALID_TIMEOUT",
            ErrorCode::ConfigInvalidCacheTtl => "CONFIG_INVALID_CACHE_TTL",
            ErrorCode::ConfigInvalidInterval => "CONFIG_INVALID_INTERVAL",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::NetworkChannelClosed => "NETWORK_CHANNEL_CLOSED",
            ErrorCode::EvalRemoteError => "EVAL_REMOTE_ERROR",
            ErrorCode::EvalTimeout => "EVAL_TIMEOUT",
            ErrorCode::ProtocolEncodeError => "PROTOCOL_ENCODE_ERROR",
            ErrorCode::ProtocolDecodeError => "PROTOCOL_DECODE_ERROR",
        }
    }

    /// Whether retrying the same call later can succeed without a config change.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ErrorCode::NetworkError | ErrorCode::EvalTimeout | ErrorCode::EvalRemoteError
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Error, Debug)]
#[error("[{code}] {message}")]
pub struct FlagbookError {
    pub code: ErrorCode,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl FlagbookError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn config_error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, message)
    }

    pub fn missing_credential() -> Self {
        Self::new(
            ErrorCode::ConfigMissingCredential,
            "Cannot read flag, reason: access token not provided",
        )
    }

    /// The service answered the request with an explicit error reason.
    pub fn remote(reason: impl AsRef<str>) -> Self {
        Self::new(
            ErrorCode::EvalRemoteError,
            format!("Cannot read flag, reason: {}", reason.as_ref()),
        )
    }

    pub fn timeout() -> Self {
        Self::new(ErrorCode::EvalTimeout, "Cannot read flag, reason: timeout")
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NetworkError, message)
    }

    pub fn channel_closed() -> Self {
        Self::new(
            ErrorCode::NetworkChannelClosed,
            "Cannot read flag, reason: channel closed",
        )
    }

    pub fn no_runtime() -> Self {
        Self::new(
            ErrorCode::InitNoRuntime,
            "Flagbook client must be created from within a Tokio runtime",
        )
    }

    pub fn is_recoverable(&self) -> bool {
        self.code.is_recoverable()
    }

    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::ConfigMissingCredential
                | ErrorCode::ConfigInvalidCredential
                | ErrorCode::ConfigInvalidUrl
                | ErrorCode::ConfigInvalidTimeout
                | ErrorCode::ConfigInvalidCacheTtl
                | ErrorCode::ConfigInvalidInterval
        )
    }

    pub fn is_remote_error(&self) -> bool {
        self.code == ErrorCode::EvalRemoteError
    }

    pub fn is_timeout(&self) -> bool {
        self.code == ErrorCode::EvalTimeout
    }

    pub fn is_transport_error(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::NetworkError | ErrorCode::NetworkChannelClosed
        )
    }
}

impl From<serde_json::Error> for FlagbookError {
    fn from(err: serde_json::Error) -> Self {
        let code = if err.is_data() || err.is_syntax() || err.is_eof() {
            ErrorCode::ProtocolDecodeError
        } else {
            ErrorCode::ProtocolEncodeError
        };
        Self::with_source(code, format!("Malformed message: {}", err), err)
    }
}

pub type Result<T> = std::result::Result<T, FlagbookError>;

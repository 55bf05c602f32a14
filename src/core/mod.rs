mod cache;
mod channel;
mod config;
mod pending;
mod reconnect;
mod reporter;
mod transport;

pub use cache::{Cache, FlagCache};
pub use channel::{ChannelConfig, ChannelManager, ChannelState, MessageCallback};
pub use config::{
    FlagbookOptions, FlagbookOptionsBuilder, DEFAULT_BASE_URL, DEFAULT_CACHE_TTL,
    DEFAULT_PING_INTERVAL, DEFAULT_REPORT_INTERVAL, DEFAULT_REPORT_TICK, DEFAULT_RETRY_INTERVAL,
    DEFAULT_TIMEOUT,
};
pub use pending::{PendingRequests, PendingResponse};
pub use reconnect::ReconnectPolicy;
pub use reporter::{
    next_boundary, system_clock, Clock, ReporterConfig, TraceSender, UsageReporter,
};
pub use transport::{
    Connection, Connector, Frame, FrameSink, FrameStream, WebSocketConnector,
};

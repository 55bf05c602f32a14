//! Flagbook Rust SDK
//!
//! Boolean feature flags evaluated by the Flagbook service over a single,
//! self-healing WebSocket channel.
//!
//! # Quick Start
//!
//! ```no_run
//! use flagbook::{FlagbookClient, FlagbookOptions, Tags};
//!
//! #[tokio::main]
//! async fn main() -> flagbook::Result<()> {
//!     let client = FlagbookClient::new(FlagbookOptions::new("your_access_token"))?;
//!
//!     // Evaluate a flag
//!     let dark_mode = client.get_flag_value("dark_mode", None).await?;
//!
//!     // Evaluate with tags
//!     let tags = Tags::new().with("plan", "pro");
//!     let beta = client.get_flag_value("beta_dashboard", Some(&tags)).await?;
//!
//!     println!("dark_mode={dark_mode} beta_dashboard={beta}");
//!
//!     // Cleanup
//!     client.close();
//!
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod error;
pub mod types;
mod client;

// Re-exports from types module
pub use types::{fingerprint, FlagOutcome, FlagRequest, InboundMessage, Tags, TraceReport};

// Re-exports from error module
pub use error::{ErrorCode, FlagbookError, Result};

// Re-exports from core module
pub use core::{
    Cache, ChannelConfig, ChannelManager, ChannelState, Clock, Connection, Connector, FlagCache,
    FlagbookOptions, FlagbookOptionsBuilder, Frame, MessageCallback, PendingRequests,
    ReconnectPolicy, ReporterConfig, TraceSender, UsageReporter, WebSocketConnector,
};

// Re-exports from client module
pub use client::{FlagbookClient, SharedClient, SDK_VERSION};

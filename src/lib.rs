//! BotCloud client: connect, multiplex sub-sessions, clean up
//!
//! This library wraps the connect → multiplex → cleanup lifecycle of the
//! remote BotCloud browser-automation service: endpoint URLs built from a
//! validated configuration, one WebSocket transport per connection, isolated
//! browser contexts with per-context fingerprint flags, page driving over
//! scoped sub-sessions, and REST administration of persistent user-data
//! profiles.

pub mod config;
pub mod error;
pub mod fingerprint;

pub mod cdp;
pub mod session;
pub mod userdata;

// Re-exports
pub use config::{DeviceType, EndpointConfig, DEFAULT_ENDPOINT};
pub use error::{Error, Result};
pub use fingerprint::FingerprintFlags;
pub use session::{Connection, InteractiveSession, Page, ScreenshotFormat};
pub use userdata::{UserData, UserDataClient, UserDataList};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

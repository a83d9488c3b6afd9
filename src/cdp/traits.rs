//! Transport abstraction for the remote-debugging protocol
//!
//! A [`CdpTransport`] is one connection to the remote endpoint over which
//! any number of sub-sessions are multiplexed. Requests carry an optional
//! session identifier; responses are correlated back by request id.

use super::types::CdpEvent;
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;

/// One transport connection to the remote automation endpoint
#[async_trait]
pub trait CdpTransport: Send + Sync + std::fmt::Debug {
    /// Send a command and wait for the correlated response result
    ///
    /// `session_id` scopes the call to a sub-session; `None` addresses the
    /// browser-level target. A remote rejection surfaces as
    /// [`crate::Error::RemoteProtocol`].
    async fn send_command(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> Result<Value>;

    /// Subscribe to protocol events
    async fn listen_events(&self) -> Result<tokio::sync::mpsc::Receiver<CdpEvent>>;

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is active
    fn is_active(&self) -> bool;
}

//! WebSocket transport implementation
//!
//! One WebSocket connection to the remote endpoint. Commands are correlated
//! to responses through a pending map keyed by request id; events are fanned
//! out to subscribers. A spawned reader task owns the receive half of the
//! stream; the send half sits behind a mutex shared with the pong handler.

use super::traits::CdpTransport;
use super::types::{CdpEvent, CdpNotification, CdpRequest, CdpRpcResponse};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;
type PendingMap = Arc<Mutex<HashMap<u64, PendingCommand>>>;
type Subscribers = Arc<Mutex<Vec<tokio::sync::mpsc::UnboundedSender<CdpEvent>>>>;

/// Command timeout configuration
#[derive(Debug, Clone)]
struct CdpTimeoutConfig {
    /// Default timeout for most commands (seconds)
    default_timeout_secs: u64,
    /// Timeout for screenshot commands (seconds)
    screenshot_timeout_secs: u64,
    /// Timeout for navigation commands (seconds)
    navigation_timeout_secs: u64,
}

impl Default for CdpTimeoutConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 30,
            screenshot_timeout_secs: 90,
            navigation_timeout_secs: 60,
        }
    }
}

impl CdpTimeoutConfig {
    fn get_timeout_for_command(&self, method: &str) -> tokio::time::Duration {
        let method_lower = method.to_lowercase();

        if method_lower.contains("screenshot") || method_lower.contains("capture") {
            return tokio::time::Duration::from_secs(self.screenshot_timeout_secs);
        }

        if method_lower.contains("navigate") || method_lower.contains("reload") {
            return tokio::time::Duration::from_secs(self.navigation_timeout_secs);
        }

        tokio::time::Duration::from_secs(self.default_timeout_secs)
    }
}

/// Pending command response
#[derive(Debug)]
struct PendingCommand {
    /// Response channel sender
    sender: tokio::sync::oneshot::Sender<CdpRpcResponse>,
    /// Command method (for logging)
    method: String,
}

/// WebSocket transport to the remote endpoint
#[derive(Debug)]
pub struct CdpWebSocketConnection {
    /// Connection URL
    url: String,
    /// Send half of the WebSocket stream
    writer: Arc<Mutex<WsSink>>,
    /// Next command ID
    next_id: AtomicU64,
    /// Pending commands (ID -> response sender)
    pending: PendingMap,
    /// Event subscribers
    subscribers: Subscribers,
    /// Is connection active
    is_active: Arc<AtomicBool>,
    /// Timeout configuration
    timeouts: CdpTimeoutConfig,
}

impl CdpWebSocketConnection {
    /// Open a WebSocket connection to `url` and start the reader task
    pub async fn connect<S: Into<String>>(url: S) -> Result<Arc<Self>> {
        let url = url.into();
        info!("Connecting to {}", redact_token(&url));

        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| Error::connection(format!("Failed to connect: {}", e)))?;

        let (writer, reader) = ws_stream.split();

        let connection = Arc::new(Self {
            url,
            writer: Arc::new(Mutex::new(writer)),
            next_id: AtomicU64::new(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            is_active: Arc::new(AtomicBool::new(true)),
            timeouts: CdpTimeoutConfig::default(),
        });

        info!("Connection established");

        tokio::spawn(Self::read_loop(
            reader,
            Arc::clone(&connection.writer),
            Arc::clone(&connection.pending),
            Arc::clone(&connection.subscribers),
            Arc::clone(&connection.is_active),
        ));

        Ok(connection)
    }

    /// Connection URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Message processing loop, driven by the spawned reader task
    async fn read_loop(
        mut reader: WsSource,
        writer: Arc<Mutex<WsSink>>,
        pending: PendingMap,
        subscribers: Subscribers,
        is_active: Arc<AtomicBool>,
    ) {
        while is_active.load(Ordering::SeqCst) {
            let message = match reader.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    warn!("WebSocket error: {}", e);
                    break;
                }
                None => {
                    debug!("WebSocket stream ended");
                    break;
                }
            };

            match message {
                Message::Text(text) => {
                    Self::handle_message(&text, &pending, &subscribers).await;
                }
                Message::Ping(data) => {
                    let mut writer = writer.lock().await;
                    if let Err(e) = writer.send(Message::Pong(data)).await {
                        error!("Failed to send pong: {}", e);
                        break;
                    }
                }
                Message::Close(_) => {
                    debug!("Close frame received");
                    break;
                }
                _ => {}
            }
        }

        is_active.store(false, Ordering::SeqCst);

        // Dropping the senders wakes every outstanding waiter with a
        // channel-closed error.
        let dropped = {
            let mut pending = pending.lock().await;
            std::mem::take(&mut *pending)
        };
        for (id, command) in dropped {
            warn!(
                "Connection closed with command {} ({}) outstanding",
                id, command.method
            );
        }
    }

    /// Handle an incoming text frame
    async fn handle_message(text: &str, pending: &PendingMap, subscribers: &Subscribers) {
        // Responses carry an id; everything else is a notification.
        if let Ok(response) = serde_json::from_str::<CdpRpcResponse>(text) {
            let mut pending = pending.lock().await;
            match pending.remove(&response.id) {
                Some(command) => {
                    debug!("Response for command {} ({})", response.id, command.method);
                    let _ = command.sender.send(response);
                }
                None => {
                    warn!("Response for unknown command ID: {}", response.id);
                }
            }
            return;
        }

        if let Ok(notification) = serde_json::from_str::<CdpNotification>(text) {
            debug!("Event: {}", notification.method);
            let event = CdpEvent {
                method: notification.method,
                params: notification.params,
                session_id: notification.session_id,
            };

            let mut subscribers = subscribers.lock().await;
            subscribers.retain(|sender| sender.send(event.clone()).is_ok());
            return;
        }

        warn!("Unknown message format: {}", text);
    }
}

#[async_trait]
impl CdpTransport for CdpWebSocketConnection {
    async fn send_command(
        &self,
        method: &str,
        params: serde_json::Value,
        session_id: Option<&str>,
    ) -> Result<serde_json::Value> {
        if !self.is_active.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let request = CdpRequest {
            id,
            method: method.to_string(),
            params: if params.is_null() { None } else { Some(params) },
            session_id: session_id.map(|s| s.to_string()),
        };

        let json = serde_json::to_string(&request)?;
        debug!("Sending command {}: {}", id, method);

        let (sender, receiver) = tokio::sync::oneshot::channel();

        {
            let mut pending = self.pending.lock().await;
            pending.insert(
                id,
                PendingCommand {
                    sender,
                    method: method.to_string(),
                },
            );
        }

        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = writer.send(Message::Text(json)).await {
                self.pending.lock().await.remove(&id);
                return Err(Error::connection(format!("Failed to send command: {}", e)));
            }
        }

        let timeout = self.timeouts.get_timeout_for_command(method);

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(response)) => match response.error {
                Some(error) => Err(Error::remote(error.code, error.message)),
                None => Ok(response.result),
            },
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(Error::timeout(format!(
                    "Command {} ({}) timed out after {:?}",
                    id, method, timeout
                )))
            }
        }
    }

    async fn listen_events(&self) -> Result<tokio::sync::mpsc::Receiver<CdpEvent>> {
        if !self.is_active.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }

        let (sender, receiver) = tokio::sync::mpsc::channel(100);
        let (unbounded_sender, mut unbounded_receiver) = tokio::sync::mpsc::unbounded_channel();

        {
            let mut subscribers = self.subscribers.lock().await;
            subscribers.push(unbounded_sender);
        }

        // Forward events to the bounded channel handed to the caller
        tokio::spawn(async move {
            while let Some(event) = unbounded_receiver.recv().await {
                if sender.send(event).await.is_err() {
                    break;
                }
            }
        });

        Ok(receiver)
    }

    async fn close(&self) -> Result<()> {
        if !self.is_active.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        info!("Closing connection");

        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.send(Message::Close(None)).await {
            // The peer may already have gone away; the connection is
            // considered closed either way.
            debug!("Close frame not delivered: {}", e);
        }

        Ok(())
    }

    fn is_active(&self) -> bool {
        self.is_active.load(Ordering::SeqCst)
    }
}

/// Strip the token value from a connection URL before logging it
fn redact_token(url: &str) -> String {
    match url.split_once("token=") {
        Some((prefix, rest)) => {
            let suffix = rest.split_once('&').map(|(_, s)| s).unwrap_or("");
            if suffix.is_empty() {
                format!("{}token=***", prefix)
            } else {
                format!("{}token=***&{}", prefix, suffix)
            }
        }
        None => url.to_string(),
    }
}

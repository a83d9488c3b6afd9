//! Unified error types for the BotCloud client

use thiserror::Error;

/// Unified Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the BotCloud client
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or incomplete endpoint configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Transport or handshake failure while connecting
    #[error("Connection error: {0}")]
    Connection(String),

    /// A call was issued after the owning connection was closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// The remote rejected a protocol request
    #[error("Remote protocol error (code {code}): {message}")]
    RemoteProtocol {
        /// JSON-RPC error code reported by the remote
        code: i32,
        /// Error message reported by the remote
        message: String,
    },

    /// User-data administration call returned a non-success status
    #[error("Persistence error ({status}): {message}")]
    Persistence {
        /// HTTP status code
        status: u16,
        /// Response body or status text
        message: String,
    },

    /// JavaScript evaluation raised an exception in the page
    #[error("Script execution failed: {0}")]
    ScriptFailed(String),

    /// Timeout
    #[error("Operation timeout: {0}")]
    Timeout(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Sub-session identifier not tracked by this connection
    #[error("Browser context not found: {0}")]
    ContextNotFound(String),
}

impl Error {
    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Error::Configuration(msg.into())
    }

    /// Create a new connection error
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Error::Connection(msg.into())
    }

    /// Create a new remote protocol error
    pub fn remote<S: Into<String>>(code: i32, message: S) -> Self {
        Error::RemoteProtocol {
            code,
            message: message.into(),
        }
    }

    /// Create a new persistence error
    pub fn persistence<S: Into<String>>(status: u16, message: S) -> Self {
        Error::Persistence {
            status,
            message: message.into(),
        }
    }

    /// Create a new script execution error
    pub fn script_failed<S: Into<String>>(msg: S) -> Self {
        Error::ScriptFailed(msg.into())
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Error::Timeout(msg.into())
    }

    /// Create a new context-not-found error
    pub fn context_not_found<S: Into<String>>(id: S) -> Self {
        Error::ContextNotFound(id.into())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Error::persistence(status.as_u16(), err.to_string()),
            None => Error::connection(err.to_string()),
        }
    }
}

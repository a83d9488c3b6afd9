//! Remote-debugging-protocol type definitions
//!
//! Core data structures for the JSON request/response surface the service
//! exposes, including the service-specific `Target.createBrowserContext`
//! extension parameters.

use serde::{Deserialize, Serialize};

/// JSON-RPC request
#[derive(Debug, Clone, Serialize)]
pub struct CdpRequest {
    /// Request ID
    pub id: u64,
    /// Method name (e.g., "Target.createTarget")
    pub method: String,
    /// Method parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    /// Session ID for sub-session-scoped calls
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// JSON-RPC response
#[derive(Debug, Clone, Deserialize)]
pub struct CdpRpcResponse {
    /// Response ID (matches request ID)
    pub id: u64,
    /// Response result
    #[serde(default)]
    pub result: serde_json::Value,
    /// Error if any
    #[serde(default)]
    pub error: Option<CdpErrorDetail>,
    /// Session the response belongs to
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<String>,
}

/// JSON-RPC notification (event)
#[derive(Debug, Clone, Deserialize)]
pub struct CdpNotification {
    /// Event method (e.g., "liveComplete")
    pub method: String,
    /// Event parameters
    #[serde(default)]
    pub params: serde_json::Value,
    /// Session the event belongs to
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<String>,
}

/// Error detail reported by the remote
#[derive(Debug, Clone, Deserialize)]
pub struct CdpErrorDetail {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Additional error data
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Event delivered to subscribers
#[derive(Debug, Clone)]
pub struct CdpEvent {
    /// Event method
    pub method: String,
    /// Event parameters
    pub params: serde_json::Value,
    /// Session the event belongs to
    pub session_id: Option<String>,
}

/// `Target.createBrowserContext` parameters
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateBrowserContextParams {
    /// Per-context fingerprint configuration flags
    #[serde(rename = "botCloudFlags", skip_serializing_if = "Vec::is_empty")]
    pub bot_cloud_flags: Vec<String>,
}

/// `Target.createBrowserContext` result
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBrowserContextResult {
    /// Identifier of the new context
    #[serde(rename = "browserContextId")]
    pub browser_context_id: String,
}

/// `BotBrowser.setBrowserContextFlags` parameters
#[derive(Debug, Clone, Serialize)]
pub struct SetBrowserContextFlagsParams {
    /// Context to reconfigure
    #[serde(rename = "browserContextId")]
    pub browser_context_id: String,
    /// Replacement fingerprint configuration flags
    #[serde(rename = "botCloudFlags")]
    pub bot_cloud_flags: Vec<String>,
}

/// `Target.disposeBrowserContext` parameters
#[derive(Debug, Clone, Serialize)]
pub struct DisposeBrowserContextParams {
    /// Context to dispose
    #[serde(rename = "browserContextId")]
    pub browser_context_id: String,
}

/// `Target.createTarget` parameters
#[derive(Debug, Clone, Serialize)]
pub struct CreateTargetParams {
    /// Initial URL
    pub url: String,
    /// Context to create the target in; omitted for the default context
    #[serde(rename = "browserContextId", skip_serializing_if = "Option::is_none")]
    pub browser_context_id: Option<String>,
}

/// `Target.createTarget` result
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTargetResult {
    /// Identifier of the new target
    #[serde(rename = "targetId")]
    pub target_id: String,
}

/// `Target.attachToTarget` parameters
#[derive(Debug, Clone, Serialize)]
pub struct AttachToTargetParams {
    /// Target to attach to
    #[serde(rename = "targetId")]
    pub target_id: String,
    /// Use flat session addressing
    pub flatten: bool,
}

/// `Target.attachToTarget` result
#[derive(Debug, Clone, Deserialize)]
pub struct AttachToTargetResult {
    /// Session identifier scoping subsequent calls
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

/// `Runtime.evaluate` parameters
#[derive(Debug, Clone, Serialize)]
pub struct EvaluateParams {
    /// JavaScript expression to evaluate
    pub expression: String,
    /// Whether to await a returned promise
    #[serde(rename = "awaitPromise", skip_serializing_if = "Option::is_none")]
    pub await_promise: Option<bool>,
    /// Whether to return the result by value
    #[serde(rename = "returnByValue", skip_serializing_if = "Option::is_none")]
    pub return_by_value: Option<bool>,
}

/// Remote object (result of JavaScript evaluation)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RemoteObject {
    /// Object type
    #[serde(default)]
    pub r#type: String,
    /// Object subtype
    #[serde(default)]
    pub subtype: Option<String>,
    /// Object value
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    /// Object description
    #[serde(default)]
    pub description: Option<String>,
}

/// `Runtime.evaluate` response
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluateResponse {
    /// Evaluation result
    #[serde(default)]
    pub result: RemoteObject,
    /// Exception details if evaluation failed
    #[serde(rename = "exceptionDetails", default)]
    pub exception_details: Option<ExceptionDetails>,
}

/// Exception details
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
    /// Exception text
    #[serde(default)]
    pub text: Option<String>,
    /// Exception object
    #[serde(default)]
    pub exception: Option<RemoteObject>,
}

impl ExceptionDetails {
    /// Best human-readable description of the exception
    pub fn describe(&self) -> String {
        self.exception
            .as_ref()
            .and_then(|e| e.description.clone())
            .or_else(|| self.text.clone())
            .unwrap_or_else(|| "Unknown error".to_string())
    }
}

/// `Page.captureScreenshot` result
#[derive(Debug, Clone, Deserialize)]
pub struct ScreenshotResult {
    /// Base64-encoded image data
    pub data: String,
}

/// `liveURL` result
#[derive(Debug, Clone, Deserialize)]
pub struct LiveUrlResult {
    /// Shareable URL for live human interaction
    #[serde(rename = "liveURL")]
    pub live_url: String,
}

/// `devtools` result
#[derive(Debug, Clone, Deserialize)]
pub struct DevtoolsUrlResult {
    /// Shareable URL for a remote DevTools session
    #[serde(rename = "devtoolsURL")]
    pub devtools_url: String,
}

/// JavaScript evaluation result
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationResult {
    /// String value
    String(String),
    /// Number value
    Number(f64),
    /// Boolean value
    Bool(bool),
    /// Null or undefined
    Null,
    /// Object/Array (as JSON)
    Object(serde_json::Value),
}

impl EvaluationResult {
    /// Decode a [`RemoteObject`] into a typed result
    pub fn from_remote_object(obj: &RemoteObject) -> Self {
        match obj.r#type.as_str() {
            "string" => {
                let value = obj
                    .value
                    .as_ref()
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                EvaluationResult::String(value)
            }
            "number" => {
                let value = obj.value.as_ref().and_then(|v| v.as_f64()).unwrap_or(0.0);
                EvaluationResult::Number(value)
            }
            "boolean" => {
                let value = obj
                    .value
                    .as_ref()
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                EvaluationResult::Bool(value)
            }
            "undefined" | "null" => EvaluationResult::Null,
            "object" if obj.subtype.as_deref() == Some("null") => EvaluationResult::Null,
            _ => {
                let value = obj.value.clone().unwrap_or(serde_json::Value::Null);
                EvaluationResult::Object(value)
            }
        }
    }

    /// String value, if the result is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            EvaluationResult::String(s) => Some(s),
            _ => None,
        }
    }
}

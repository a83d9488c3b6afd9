//! Page handle scoped to one sub-session
//!
//! A [`Page`] wraps a target attached over the shared transport. Every call
//! is scoped by the session identifier returned from `Target.attachToTarget`,
//! so multiple pages in different browser contexts multiplex over the same
//! connection without interfering.

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::cdp::types::{
    CdpEvent, EvaluateParams, EvaluateResponse, EvaluationResult, LiveUrlResult, ScreenshotResult,
};
use crate::cdp::CdpTransport;
use crate::{Error, Result};

/// Screenshot format
#[derive(Debug, Clone, Copy)]
pub enum ScreenshotFormat {
    /// PNG format
    Png,
    /// JPEG format with quality 0-100
    Jpeg(u8),
}

/// An interactive hand-off in progress
///
/// Returned by [`Page::live_url`] and [`Page::devtools_url`]. The completion
/// event subscription is established before the URL request is sent, so the
/// completion cannot be missed between the two calls.
#[derive(Debug)]
pub struct InteractiveSession {
    /// URL to open in a regular browser
    pub url: String,
    events: tokio::sync::mpsc::Receiver<CdpEvent>,
    complete_method: &'static str,
    session_id: String,
}

impl InteractiveSession {
    /// Wait until the human side finishes, up to `timeout`
    pub async fn wait_complete(mut self, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(Error::timeout(format!(
                    "No {} event within {:?}",
                    self.complete_method, timeout
                )));
            }

            match tokio::time::timeout(remaining, self.events.recv()).await {
                Ok(Some(event)) => {
                    let session_matches = event
                        .session_id
                        .as_deref()
                        .map(|s| s == self.session_id)
                        .unwrap_or(true);
                    if event.method == self.complete_method && session_matches {
                        return Ok(());
                    }
                }
                Ok(None) => return Err(Error::ConnectionClosed),
                Err(_) => {
                    return Err(Error::timeout(format!(
                        "No {} event within {:?}",
                        self.complete_method, timeout
                    )))
                }
            }
        }
    }
}

/// Page attached over a connection
#[derive(Debug)]
pub struct Page {
    transport: Arc<dyn CdpTransport>,
    target_id: String,
    session_id: String,
}

impl Page {
    pub(crate) fn new(
        transport: Arc<dyn CdpTransport>,
        target_id: String,
        session_id: String,
    ) -> Self {
        Self {
            transport,
            target_id,
            session_id,
        }
    }

    /// Target identifier
    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    /// Session identifier scoping this page's calls
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.transport
            .send_command(method, params, Some(&self.session_id))
            .await
    }

    /// Navigate to a URL and wait for the document to finish loading
    pub async fn navigate(&self, url: &str) -> Result<()> {
        info!("Navigating to {}", url);

        self.call("Page.enable", Value::Null).await?;
        self.call("Page.navigate", json!({ "url": url })).await?;

        // Poll document.readyState; event-based load detection races with
        // navigations that complete before the listener is registered.
        for attempt in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;

            match self.evaluate("document.readyState", false).await {
                Ok(EvaluationResult::String(state)) if state == "complete" => {
                    debug!("Page loaded after {} polls", attempt + 1);
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Ready-state poll failed: {}", e);
                }
            }
        }

        debug!("Ready-state polling exhausted, continuing");
        Ok(())
    }

    /// Evaluate a JavaScript expression in the page
    pub async fn evaluate(&self, expression: &str, await_promise: bool) -> Result<EvaluationResult> {
        let params = EvaluateParams {
            expression: expression.to_string(),
            await_promise: Some(await_promise),
            return_by_value: Some(true),
        };

        let result = self
            .call("Runtime.evaluate", serde_json::to_value(&params)?)
            .await?;

        let response: EvaluateResponse = serde_json::from_value(result)?;
        if let Some(exception) = response.exception_details {
            return Err(Error::script_failed(exception.describe()));
        }

        Ok(EvaluationResult::from_remote_object(&response.result))
    }

    /// Write a value into the page's localStorage
    pub async fn local_storage_set(&self, key: &str, value: &str) -> Result<()> {
        let expression = format!(
            "localStorage.setItem({}, {})",
            serde_json::to_string(key)?,
            serde_json::to_string(value)?
        );
        self.evaluate(&expression, false).await?;
        Ok(())
    }

    /// Read a value from the page's localStorage
    pub async fn local_storage_get(&self, key: &str) -> Result<Option<String>> {
        let expression = format!("localStorage.getItem({})", serde_json::to_string(key)?);

        match self.evaluate(&expression, false).await? {
            EvaluationResult::String(value) => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    /// Capture a screenshot, returning the decoded image bytes
    pub async fn screenshot(&self, format: ScreenshotFormat) -> Result<Vec<u8>> {
        let params = match format {
            ScreenshotFormat::Png => json!({ "format": "png" }),
            ScreenshotFormat::Jpeg(quality) => json!({ "format": "jpeg", "quality": quality }),
        };

        let result = self.call("Page.captureScreenshot", params).await?;

        let result: ScreenshotResult = serde_json::from_value(result)?;
        BASE64
            .decode(result.data)
            .map_err(|e| Error::remote(-32000, format!("Invalid screenshot payload: {}", e)))
    }

    /// Request a LiveURL for human interaction with this page
    ///
    /// `timeout` is forwarded to the remote as the interaction window.
    pub async fn live_url(&self, timeout: Duration) -> Result<InteractiveSession> {
        let events = self.transport.listen_events().await?;

        let result = self
            .call("liveURL", json!({ "timeout": timeout.as_millis() as u64 }))
            .await?;
        let result: LiveUrlResult = serde_json::from_value(result)?;

        Ok(InteractiveSession {
            url: result.live_url,
            events,
            complete_method: "liveComplete",
            session_id: self.session_id.clone(),
        })
    }

    /// Request a DevTools URL for inspecting this page
    pub async fn devtools_url(&self, timeout: Duration) -> Result<InteractiveSession> {
        let events = self.transport.listen_events().await?;

        let result = self
            .call("devtools", json!({ "timeout": timeout.as_millis() as u64 }))
            .await?;
        let result: crate::cdp::types::DevtoolsUrlResult = serde_json::from_value(result)?;

        Ok(InteractiveSession {
            url: result.devtools_url,
            events,
            complete_method: "devtoolsComplete",
            session_id: self.session_id.clone(),
        })
    }

    /// Close the page's target
    pub async fn close(&self) -> Result<()> {
        self.transport
            .send_command(
                "Target.closeTarget",
                json!({ "targetId": self.target_id }),
                None,
            )
            .await?;
        Ok(())
    }
}

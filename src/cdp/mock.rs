//! Mock transport for testing
//!
//! An in-process [`CdpTransport`] that emulates the browser-context surface
//! of the remote service: context creation with fingerprint flags, flag
//! mutation, target attachment, evaluation of the handful of expressions the
//! client issues, and the interactive hand-off methods.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use super::traits::CdpTransport;
use super::types::CdpEvent;
use crate::{Error, Result};

const MOCK_PNG: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==";

#[derive(Debug, Default)]
struct MockState {
    /// Context id -> fingerprint flag strings
    contexts: HashMap<String, Vec<String>>,
    /// Target id -> owning context (None for the default context)
    targets: HashMap<String, Option<String>>,
    /// Session id -> target id
    sessions: HashMap<String, String>,
    /// Context-scoped localStorage emulation
    storage: HashMap<String, HashMap<String, String>>,
    /// Methods invoked, in order
    calls: Vec<String>,
    /// Inject a failure into the next dispose call
    fail_next_dispose: bool,
}

/// Mock transport
#[derive(Debug)]
pub struct MockCdpTransport {
    state: Arc<StdMutex<MockState>>,
    subscribers: Arc<StdMutex<Vec<tokio::sync::mpsc::UnboundedSender<CdpEvent>>>>,
    is_active: Arc<AtomicBool>,
}

impl MockCdpTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        Self {
            state: Arc::new(StdMutex::new(MockState::default())),
            subscribers: Arc::new(StdMutex::new(Vec::new())),
            is_active: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Make the next `Target.disposeBrowserContext` call fail
    pub fn fail_next_dispose(&self) {
        self.state.lock().unwrap().fail_next_dispose = true;
    }

    /// Number of live contexts on the mock side
    pub fn context_count(&self) -> usize {
        self.state.lock().unwrap().contexts.len()
    }

    /// Methods invoked so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn emit_after(&self, method: &'static str, session_id: Option<String>) {
        let subscribers = Arc::clone(&self.subscribers);
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            let event = CdpEvent {
                method: method.to_string(),
                params: Value::Null,
                session_id,
            };
            let mut subscribers = subscribers.lock().unwrap();
            subscribers.retain(|sender| sender.send(event.clone()).is_ok());
        });
    }

    fn flag_value(flags: &[String], name: &str) -> Option<String> {
        let prefix = format!("{}=", name);
        flags
            .iter()
            .find_map(|flag| flag.strip_prefix(&prefix).map(|v| v.to_string()))
    }

    fn evaluate(state: &mut MockState, session_id: Option<&str>, expression: &str) -> Value {
        let context_id = session_id
            .and_then(|s| state.sessions.get(s))
            .and_then(|target| state.targets.get(target))
            .cloned()
            .flatten();

        let context_key = context_id.clone().unwrap_or_else(|| "default".to_string());
        let flags = context_id
            .and_then(|id| state.contexts.get(&id).cloned())
            .unwrap_or_default();

        if let Some(rest) = expression.strip_prefix("localStorage.setItem(") {
            let args = rest.trim_end_matches(')');
            if let Ok(Value::Array(values)) = serde_json::from_str(&format!("[{}]", args)) {
                if let (Some(key), Some(value)) =
                    (values.first().and_then(Value::as_str), values.get(1).and_then(Value::as_str))
                {
                    state
                        .storage
                        .entry(context_key)
                        .or_default()
                        .insert(key.to_string(), value.to_string());
                }
            }
            return json!({ "result": { "type": "undefined" } });
        }

        if let Some(rest) = expression.strip_prefix("localStorage.getItem(") {
            let args = rest.trim_end_matches(')');
            if let Ok(Value::Array(values)) = serde_json::from_str(&format!("[{}]", args)) {
                if let Some(key) = values.first().and_then(Value::as_str) {
                    return match state.storage.get(&context_key).and_then(|s| s.get(key)) {
                        Some(value) => {
                            json!({ "result": { "type": "string", "value": value } })
                        }
                        None => json!({ "result": { "type": "object", "subtype": "null" } }),
                    };
                }
            }
        }

        if expression.contains("document.readyState") {
            return json!({ "result": { "type": "string", "value": "complete" } });
        }

        if expression.contains("timeZone") {
            let timezone = Self::flag_value(&flags, "--bot-config-timezone")
                .unwrap_or_else(|| "UTC".to_string());
            return json!({ "result": { "type": "string", "value": timezone } });
        }

        if expression.contains("navigator.languages") {
            let languages = Self::flag_value(&flags, "--bot-config-languages")
                .unwrap_or_else(|| "en-US".to_string());
            let list: Vec<&str> = languages.split(',').collect();
            return json!({
                "result": {
                    "type": "string",
                    "value": serde_json::to_string(&list).unwrap_or_default()
                }
            });
        }

        if expression.contains("navigator.language") {
            let locale = Self::flag_value(&flags, "--bot-config-locale")
                .unwrap_or_else(|| "en-US".to_string());
            return json!({ "result": { "type": "string", "value": locale } });
        }

        json!({ "result": { "type": "string", "value": "mock result" } })
    }
}

impl Default for MockCdpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CdpTransport for MockCdpTransport {
    async fn send_command(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> Result<Value> {
        if !self.is_active.load(Ordering::Relaxed) {
            return Err(Error::ConnectionClosed);
        }

        let mut state = self.state.lock().unwrap();
        state.calls.push(method.to_string());

        match method {
            "Target.createBrowserContext" => {
                let flags: Vec<String> = params
                    .get("botCloudFlags")
                    .and_then(Value::as_array)
                    .map(|a| {
                        a.iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();

                let id = format!("ctx-{}", uuid::Uuid::new_v4());
                state.contexts.insert(id.clone(), flags);
                Ok(json!({ "browserContextId": id }))
            }
            "BotBrowser.setBrowserContextFlags" => {
                let id = params
                    .get("browserContextId")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let flags: Vec<String> = params
                    .get("botCloudFlags")
                    .and_then(Value::as_array)
                    .map(|a| {
                        a.iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();

                match state.contexts.get_mut(&id) {
                    Some(existing) => {
                        *existing = flags;
                        Ok(json!({}))
                    }
                    None => Err(Error::remote(-32602, format!("Unknown context: {}", id))),
                }
            }
            "Target.disposeBrowserContext" => {
                if state.fail_next_dispose {
                    state.fail_next_dispose = false;
                    return Err(Error::remote(-32000, "Dispose failed"));
                }

                let id = params
                    .get("browserContextId")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();

                match state.contexts.remove(&id) {
                    Some(_) => Ok(json!({})),
                    None => Err(Error::remote(-32602, format!("Unknown context: {}", id))),
                }
            }
            "Target.createTarget" => {
                let context_id = params
                    .get("browserContextId")
                    .and_then(Value::as_str)
                    .map(str::to_string);

                if let Some(id) = &context_id {
                    if !state.contexts.contains_key(id) {
                        return Err(Error::remote(-32602, format!("Unknown context: {}", id)));
                    }
                }

                let target_id = format!("target-{}", uuid::Uuid::new_v4());
                state.targets.insert(target_id.clone(), context_id);
                Ok(json!({ "targetId": target_id }))
            }
            "Target.attachToTarget" => {
                let target_id = params
                    .get("targetId")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();

                if !state.targets.contains_key(&target_id) {
                    return Err(Error::remote(-32602, format!("Unknown target: {}", target_id)));
                }

                let session = format!("session-{}", uuid::Uuid::new_v4());
                state.sessions.insert(session.clone(), target_id);
                Ok(json!({ "sessionId": session }))
            }
            "Target.closeTarget" => {
                let target_id = params
                    .get("targetId")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                state.targets.remove(&target_id);
                state.sessions.retain(|_, target| target != &target_id);
                Ok(json!({ "success": true }))
            }
            "Runtime.enable" | "Page.enable" => Ok(json!({})),
            "Page.navigate" => Ok(json!({
                "frameId": format!("frame-{}", uuid::Uuid::new_v4()),
                "loaderId": format!("loader-{}", uuid::Uuid::new_v4()),
            })),
            "Page.captureScreenshot" => Ok(json!({ "data": MOCK_PNG })),
            "Runtime.evaluate" => {
                let expression = params
                    .get("expression")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(Self::evaluate(&mut state, session_id, &expression))
            }
            "liveURL" => {
                drop(state);
                self.emit_after("liveComplete", session_id.map(str::to_string));
                Ok(json!({ "liveURL": "https://live.bots.win/s/mock" }))
            }
            "devtools" => {
                drop(state);
                self.emit_after("devtoolsComplete", session_id.map(str::to_string));
                Ok(json!({ "devtoolsURL": "https://devtools.bots.win/s/mock" }))
            }
            other => Err(Error::remote(-32601, format!("Method not found: {}", other))),
        }
    }

    async fn listen_events(&self) -> Result<tokio::sync::mpsc::Receiver<CdpEvent>> {
        if !self.is_active.load(Ordering::Relaxed) {
            return Err(Error::ConnectionClosed);
        }

        let (sender, receiver) = tokio::sync::mpsc::channel(100);
        let (unbounded_sender, mut unbounded_receiver) = tokio::sync::mpsc::unbounded_channel();

        self.subscribers.lock().unwrap().push(unbounded_sender);

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
        self.is_active.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.is_active.load(Ordering::Relaxed)
    }
}

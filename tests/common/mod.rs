//! Mock BotCloud service
//!
//! A test double of the remote service: a WebSocket endpoint speaking the
//! remote-debugging protocol (browser contexts, targets, evaluation, the
//! interactive hand-off methods) and an HTTP endpoint implementing the
//! user-data administration interface. Persistent-profile storage and lock
//! state are shared between the two sides so attach/lock/persistence
//! semantics can be exercised end to end.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request as WsRequest, Response as WsResponse,
};
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message};

use botcloud_client::EndpointConfig;

const QUOTA_MAX: u32 = 5;
const MOCK_PNG: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==";

#[derive(Debug, Clone)]
struct UserDataRecord {
    created_at: String,
    last_used_at: Option<String>,
    locked: bool,
}

#[derive(Debug, Default)]
struct CloudState {
    token: String,
    user_data: HashMap<String, UserDataRecord>,
    /// Persistent localStorage keyed by user-data id
    storage: HashMap<String, HashMap<String, String>>,
}

/// Mock BotCloud server
pub struct MockBotCloud {
    ws_addr: String,
    rest_addr: String,
    token: String,
    state: Arc<Mutex<CloudState>>,
    shutdown: Vec<tokio::sync::oneshot::Sender<()>>,
}

impl MockBotCloud {
    /// Start the WebSocket and REST endpoints on ephemeral ports
    pub async fn start(token: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let state = Arc::new(Mutex::new(CloudState {
            token: token.to_string(),
            ..CloudState::default()
        }));

        let ws_listener = TcpListener::bind("127.0.0.1:0").await?;
        let ws_addr = ws_listener.local_addr()?;
        let (ws_shutdown_tx, mut ws_shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let ws_state = Arc::clone(&state);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = ws_listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                tokio::spawn(handle_ws_connection(stream, Arc::clone(&ws_state)));
                            }
                            Err(_) => break,
                        }
                    }
                    _ = &mut ws_shutdown_rx => break,
                }
            }
        });

        let rest_listener = TcpListener::bind("127.0.0.1:0").await?;
        let rest_addr = rest_listener.local_addr()?;
        let (rest_shutdown_tx, mut rest_shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let rest_state = Arc::clone(&state);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = rest_listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                let state = Arc::clone(&rest_state);
                                tokio::spawn(async move {
                                    let service = service_fn(move |req| {
                                        handle_rest_request(req, Arc::clone(&state))
                                    });
                                    let _ = http1::Builder::new()
                                        .serve_connection(TokioIo::new(stream), service)
                                        .await;
                                });
                            }
                            Err(_) => break,
                        }
                    }
                    _ = &mut rest_shutdown_rx => break,
                }
            }
        });

        Ok(Self {
            ws_addr: ws_addr.to_string(),
            rest_addr: rest_addr.to_string(),
            token: token.to_string(),
            state,
            shutdown: vec![ws_shutdown_tx, rest_shutdown_tx],
        })
    }

    /// WebSocket endpoint URL
    pub fn ws_endpoint(&self) -> String {
        format!("ws://{}", self.ws_addr)
    }

    /// REST endpoint base URL
    pub fn api_base(&self) -> String {
        format!("http://{}", self.rest_addr)
    }

    /// Endpoint configuration pointing at this mock
    pub fn config(&self) -> EndpointConfig {
        let mut config = EndpointConfig::new(self.token.clone(), "user:pass@proxy.test:4600".to_string());
        config.base_url = self.ws_endpoint();
        config
    }

    /// Whether a profile is currently reported as locked
    pub fn is_locked(&self, user_data_id: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .user_data
            .get(user_data_id)
            .map(|record| record.locked)
            .unwrap_or(false)
    }
}

impl Drop for MockBotCloud {
    fn drop(&mut self) {
        for tx in self.shutdown.drain(..) {
            let _ = tx.send(());
        }
    }
}

/// Per-connection protocol state
#[derive(Debug, Default)]
struct CdpSessionState {
    user_data_id: Option<String>,
    /// Context id -> flag strings
    contexts: HashMap<String, Vec<String>>,
    /// Target id -> owning context (None for the default context)
    targets: HashMap<String, Option<String>>,
    /// Session id -> target id
    sessions: HashMap<String, String>,
    /// Ephemeral localStorage for contexts without persistent backing
    ephemeral_storage: HashMap<String, HashMap<String, String>>,
    counter: u64,
}

impl CdpSessionState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("{}-{}", prefix, self.counter)
    }
}

async fn handle_ws_connection(stream: TcpStream, cloud: Arc<Mutex<CloudState>>) {
    let expected_token = cloud.lock().unwrap().token.clone();
    let mut query: HashMap<String, String> = HashMap::new();

    // Authentication happens during the handshake; a bad token rejects the
    // upgrade with a 401 instead of completing the connection.
    let callback = |req: &WsRequest, resp: WsResponse| -> Result<WsResponse, ErrorResponse> {
        if let Some(q) = req.uri().query() {
            query = url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect();
        }

        if query.get("token").map(String::as_str) != Some(expected_token.as_str()) {
            let mut response = ErrorResponse::new(Some("invalid token".to_string()));
            *response.status_mut() =
                tokio_tungstenite::tungstenite::http::StatusCode::UNAUTHORIZED;
            return Err(response);
        }

        Ok(resp)
    };

    let ws_stream = match accept_hdr_async(stream, callback).await {
        Ok(ws_stream) => ws_stream,
        Err(_) => return,
    };

    let mut session = CdpSessionState {
        user_data_id: query.get("user_data_id").cloned(),
        ..CdpSessionState::default()
    };

    // Attaching a profile locks it for the duration of the connection
    if let Some(user_data_id) = session.user_data_id.clone() {
        let mut cloud_state = cloud.lock().unwrap();
        match cloud_state.user_data.get_mut(&user_data_id) {
            Some(record) => {
                record.locked = true;
                record.last_used_at = Some(Utc::now().to_rfc3339());
            }
            None => return,
        }
    }

    let (mut sender, mut receiver) = ws_stream.split();

    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if let Ok(request) = serde_json::from_str::<Value>(&text) {
                    let (response, notification) =
                        handle_cdp_request(&request, &mut session, &cloud);

                    if let Ok(text) = serde_json::to_string(&response) {
                        if sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }

                    if let Some(notification) = notification {
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        if let Ok(text) = serde_json::to_string(&notification) {
                            if sender.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    // Closing the connection releases the profile lock
    if let Some(user_data_id) = &session.user_data_id {
        let mut cloud_state = cloud.lock().unwrap();
        if let Some(record) = cloud_state.user_data.get_mut(user_data_id) {
            record.locked = false;
        }
    }
}

fn flag_value(flags: &[String], name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    flags
        .iter()
        .find_map(|flag| flag.strip_prefix(&prefix).map(|v| v.to_string()))
}

fn string_array(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn error_response(id: i64, code: i32, message: String) -> Value {
    json!({ "id": id, "error": { "code": code, "message": message } })
}

/// Produce the response for one protocol request, plus an optional
/// follow-up notification
fn handle_cdp_request(
    request: &Value,
    session: &mut CdpSessionState,
    cloud: &Arc<Mutex<CloudState>>,
) -> (Value, Option<Value>) {
    let method = request
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let id = request.get("id").and_then(Value::as_i64).unwrap_or(0);
    let params = request.get("params").cloned().unwrap_or(Value::Null);
    let session_id = request
        .get("sessionId")
        .and_then(Value::as_str)
        .map(str::to_string);

    let response = match method {
        "Target.createBrowserContext" => {
            let flags = string_array(params.get("botCloudFlags"));
            let context_id = session.next_id("ctx");
            session.contexts.insert(context_id.clone(), flags);
            json!({ "id": id, "result": { "browserContextId": context_id } })
        }
        "BotBrowser.setBrowserContextFlags" => {
            let context_id = params
                .get("browserContextId")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let flags = string_array(params.get("botCloudFlags"));

            match session.contexts.get_mut(&context_id) {
                Some(existing) => {
                    *existing = flags;
                    json!({ "id": id, "result": {} })
                }
                None => error_response(id, -32602, format!("Unknown context: {}", context_id)),
            }
        }
        "Target.disposeBrowserContext" => {
            let context_id = params
                .get("browserContextId")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            match session.contexts.remove(&context_id) {
                Some(_) => json!({ "id": id, "result": {} }),
                None => error_response(id, -32602, format!("Unknown context: {}", context_id)),
            }
        }
        "Target.createTarget" => {
            let context_id = params
                .get("browserContextId")
                .and_then(Value::as_str)
                .map(str::to_string);

            if let Some(context_id) = &context_id {
                if !session.contexts.contains_key(context_id) {
                    return (
                        error_response(id, -32602, format!("Unknown context: {}", context_id)),
                        None,
                    );
                }
            }

            let target_id = session.next_id("target");
            session.targets.insert(target_id.clone(), context_id);
            json!({ "id": id, "result": { "targetId": target_id } })
        }
        "Target.attachToTarget" => {
            let target_id = params
                .get("targetId")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            if !session.targets.contains_key(&target_id) {
                return (
                    error_response(id, -32602, format!("Unknown target: {}", target_id)),
                    None,
                );
            }

            let new_session = session.next_id("session");
            session.sessions.insert(new_session.clone(), target_id);
            json!({ "id": id, "result": { "sessionId": new_session } })
        }
        "Target.closeTarget" => {
            let target_id = params
                .get("targetId")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            session.targets.remove(&target_id);
            session.sessions.retain(|_, target| target != &target_id);
            json!({ "id": id, "result": { "success": true } })
        }
        "Runtime.enable" | "Page.enable" => json!({ "id": id, "result": {} }),
        "Page.navigate" => json!({
            "id": id,
            "result": { "frameId": "frame-1", "loaderId": "loader-1" }
        }),
        "Page.captureScreenshot" => json!({ "id": id, "result": { "data": MOCK_PNG } }),
        "Runtime.evaluate" => {
            let expression = params
                .get("expression")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let result = evaluate(session, cloud, session_id.as_deref(), &expression);
            json!({ "id": id, "result": result })
        }
        "liveURL" => {
            let notification = json!({
                "method": "liveComplete",
                "sessionId": session_id,
            });
            return (
                json!({ "id": id, "result": { "liveURL": "https://live.bots.win/s/test" } }),
                Some(notification),
            );
        }
        "devtools" => {
            let notification = json!({
                "method": "devtoolsComplete",
                "sessionId": session_id,
            });
            return (
                json!({ "id": id, "result": { "devtoolsURL": "https://devtools.bots.win/s/test" } }),
                Some(notification),
            );
        }
        other => error_response(id, -32601, format!("Method not implemented: {}", other)),
    };

    (response, None)
}

/// Evaluate the handful of expressions the client issues
fn evaluate(
    session: &mut CdpSessionState,
    cloud: &Arc<Mutex<CloudState>>,
    session_id: Option<&str>,
    expression: &str,
) -> Value {
    let context_id = session_id
        .and_then(|s| session.sessions.get(s))
        .and_then(|target| session.targets.get(target))
        .cloned()
        .flatten();

    let flags = context_id
        .as_ref()
        .and_then(|id| session.contexts.get(id).cloned())
        .unwrap_or_default();

    // The default context of a profile-backed connection persists its
    // storage in the cloud state; everything else is ephemeral.
    let persistent_key = match (&context_id, &session.user_data_id) {
        (None, Some(user_data_id)) => Some(user_data_id.clone()),
        _ => None,
    };
    let ephemeral_key = context_id.clone().unwrap_or_else(|| "default".to_string());

    if let Some(rest) = expression.strip_prefix("localStorage.setItem(") {
        let args = rest.trim_end_matches(')');
        if let Ok(Value::Array(values)) = serde_json::from_str::<Value>(&format!("[{}]", args)) {
            if let (Some(key), Some(value)) = (
                values.first().and_then(Value::as_str),
                values.get(1).and_then(Value::as_str),
            ) {
                match &persistent_key {
                    Some(user_data_id) => {
                        let mut cloud_state = cloud.lock().unwrap();
                        cloud_state
                            .storage
                            .entry(user_data_id.clone())
                            .or_default()
                            .insert(key.to_string(), value.to_string());
                    }
                    None => {
                        session
                            .ephemeral_storage
                            .entry(ephemeral_key)
                            .or_default()
                            .insert(key.to_string(), value.to_string());
                    }
                }
            }
        }
        return json!({ "result": { "type": "undefined" } });
    }

    if let Some(rest) = expression.strip_prefix("localStorage.getItem(") {
        let args = rest.trim_end_matches(')');
        if let Ok(Value::Array(values)) = serde_json::from_str::<Value>(&format!("[{}]", args)) {
            if let Some(key) = values.first().and_then(Value::as_str) {
                let value = match &persistent_key {
                    Some(user_data_id) => {
                        let cloud_state = cloud.lock().unwrap();
                        cloud_state
                            .storage
                            .get(user_data_id)
                            .and_then(|s| s.get(key))
                            .cloned()
                    }
                    None => session
                        .ephemeral_storage
                        .get(&ephemeral_key)
                        .and_then(|s| s.get(key))
                        .cloned(),
                };

                return match value {
                    Some(value) => json!({ "result": { "type": "string", "value": value } }),
                    None => json!({ "result": { "type": "object", "subtype": "null" } }),
                };
            }
        }
    }

    if expression.contains("document.readyState") {
        return json!({ "result": { "type": "string", "value": "complete" } });
    }

    if expression.contains("timeZone") {
        let timezone =
            flag_value(&flags, "--bot-config-timezone").unwrap_or_else(|| "UTC".to_string());
        return json!({ "result": { "type": "string", "value": timezone } });
    }

    if expression.contains("navigator.languages") {
        let languages =
            flag_value(&flags, "--bot-config-languages").unwrap_or_else(|| "en-US".to_string());
        let list: Vec<&str> = languages.split(',').collect();
        return json!({
            "result": {
                "type": "string",
                "value": serde_json::to_string(&list).unwrap_or_default()
            }
        });
    }

    if expression.contains("navigator.language") {
        let locale =
            flag_value(&flags, "--bot-config-locale").unwrap_or_else(|| "en-US".to_string());
        return json!({ "result": { "type": "string", "value": locale } });
    }

    json!({ "result": { "type": "string", "value": "test-result" } })
}

fn json_response(status: StatusCode, body: Value) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

async fn handle_rest_request(
    request: Request<hyper::body::Incoming>,
    state: Arc<Mutex<CloudState>>,
) -> Result<Response<Full<Bytes>>, std::convert::Infallible> {
    let authorized = {
        let expected = format!("Bearer {}", state.lock().unwrap().token);
        request
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|v| v == expected)
            .unwrap_or(false)
    };

    if !authorized {
        return Ok(json_response(
            StatusCode::UNAUTHORIZED,
            json!({ "error": "invalid token" }),
        ));
    }

    let path = request.uri().path().to_string();
    let method = request.method().clone();
    let mut cloud = state.lock().unwrap();

    let response = match (method, path.as_str()) {
        (Method::POST, "/api/user-data") => {
            if cloud.user_data.len() as u32 >= QUOTA_MAX {
                json_response(StatusCode::FORBIDDEN, json!({ "error": "quota exceeded" }))
            } else {
                let id = format!("udd_{}", uuid::Uuid::new_v4().simple());
                let created_at = Utc::now().to_rfc3339();
                cloud.user_data.insert(
                    id.clone(),
                    UserDataRecord {
                        created_at: created_at.clone(),
                        last_used_at: None,
                        locked: false,
                    },
                );
                json_response(StatusCode::OK, json!({ "id": id, "createdAt": created_at }))
            }
        }
        (Method::GET, "/api/user-data") => {
            let items: Vec<Value> = cloud
                .user_data
                .iter()
                .map(|(id, record)| {
                    json!({
                        "id": id,
                        "createdAt": record.created_at,
                        "lastUsedAt": record.last_used_at,
                        "isLocked": record.locked,
                    })
                })
                .collect();
            let used = items.len() as u32;
            json_response(
                StatusCode::OK,
                json!({
                    "total": used,
                    "items": items,
                    "quota": { "used": used, "max": QUOTA_MAX, "canCreate": used < QUOTA_MAX },
                }),
            )
        }
        (Method::DELETE, path) if path.starts_with("/api/user-data/") => {
            let id = path.trim_start_matches("/api/user-data/").to_string();
            match cloud.user_data.get(&id) {
                Some(record) if record.locked => json_response(
                    StatusCode::CONFLICT,
                    json!({ "error": "user data is in use by an active session" }),
                ),
                Some(_) => {
                    cloud.user_data.remove(&id);
                    cloud.storage.remove(&id);
                    json_response(StatusCode::OK, json!({}))
                }
                None => json_response(
                    StatusCode::NOT_FOUND,
                    json!({ "error": "user data not found" }),
                ),
            }
        }
        _ => json_response(StatusCode::NOT_FOUND, json!({ "error": "not found" })),
    };

    Ok(response)
}

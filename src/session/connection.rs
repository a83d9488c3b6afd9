//! Connection and browser-context registry
//!
//! A [`Connection`] owns one transport and every browser context created
//! over it. The registry maps context id to the flags it was configured
//! with, so cleanup on any exit path is an enumeration rather than an
//! accident of control flow. Closing the connection disposes every tracked
//! context, closes the transport, and makes all later calls fail fast.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cdp::types::{
    AttachToTargetParams, AttachToTargetResult, CreateBrowserContextParams,
    CreateBrowserContextResult, CreateTargetParams, CreateTargetResult,
    DisposeBrowserContextParams, SetBrowserContextFlagsParams,
};
use crate::cdp::{CdpTransport, CdpWebSocketConnection};
use crate::config::EndpointConfig;
use crate::fingerprint::FingerprintFlags;
use crate::session::page::Page;
use crate::{Error, Result};

/// State tracked for one open browser context
#[derive(Debug, Clone)]
pub struct ContextState {
    /// Context identifier assigned by the remote
    pub id: String,
    /// Flag strings the context was created or last updated with
    pub flags: Vec<String>,
}

/// One connection to the remote service
///
/// Owns the transport and the registry of browser contexts created over it.
/// Not reusable across concurrent runs; create one per logical session.
#[derive(Debug)]
pub struct Connection {
    transport: Arc<dyn CdpTransport>,
    contexts: RwLock<HashMap<String, ContextState>>,
    closed: AtomicBool,
}

impl Connection {
    /// Validate `config`, build the endpoint URL and open the transport
    pub async fn connect(config: &EndpointConfig) -> Result<Self> {
        let endpoint = config.build_endpoint()?;
        let transport = CdpWebSocketConnection::connect(endpoint).await?;
        Ok(Self::from_transport(transport))
    }

    /// Wrap an already-open transport
    pub fn from_transport(transport: Arc<dyn CdpTransport>) -> Self {
        Self {
            transport,
            contexts: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) || !self.transport.is_active() {
            return Err(Error::ConnectionClosed);
        }
        Ok(())
    }

    fn registry_insert(&self, state: ContextState) {
        if let Ok(mut contexts) = self.contexts.write() {
            contexts.insert(state.id.clone(), state);
        }
    }

    /// Whether the connection is still usable
    pub fn is_active(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.transport.is_active()
    }

    /// Identifiers of every context currently tracked by this connection
    pub fn context_ids(&self) -> Vec<String> {
        self.contexts
            .read()
            .map(|contexts| contexts.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Flags a tracked context was last configured with
    pub fn context_state(&self, context_id: &str) -> Option<ContextState> {
        self.contexts
            .read()
            .ok()
            .and_then(|contexts| contexts.get(context_id).cloned())
    }

    /// Create an isolated browser context, optionally configured with
    /// fingerprint flags
    pub async fn create_context(&self, flags: &FingerprintFlags) -> Result<String> {
        self.ensure_open()?;

        let params = CreateBrowserContextParams {
            bot_cloud_flags: flags.to_flag_strings(),
        };

        let result = self
            .transport
            .send_command(
                "Target.createBrowserContext",
                serde_json::to_value(&params)?,
                None,
            )
            .await?;

        let result: CreateBrowserContextResult = serde_json::from_value(result)?;
        info!("Created browser context {}", result.browser_context_id);

        self.registry_insert(ContextState {
            id: result.browser_context_id.clone(),
            flags: params.bot_cloud_flags,
        });

        Ok(result.browser_context_id)
    }

    /// Replace the fingerprint flags of an already-open context
    pub async fn set_context_flags(
        &self,
        context_id: &str,
        flags: &FingerprintFlags,
    ) -> Result<()> {
        self.ensure_open()?;

        if self.context_state(context_id).is_none() {
            return Err(Error::context_not_found(context_id));
        }

        let params = SetBrowserContextFlagsParams {
            browser_context_id: context_id.to_string(),
            bot_cloud_flags: flags.to_flag_strings(),
        };

        self.transport
            .send_command(
                "BotBrowser.setBrowserContextFlags",
                serde_json::to_value(&params)?,
                None,
            )
            .await?;

        self.registry_insert(ContextState {
            id: context_id.to_string(),
            flags: flags.to_flag_strings(),
        });

        Ok(())
    }

    /// Dispose a context by identifier
    ///
    /// The context stays tracked if the remote rejects the dispose, so a
    /// later cleanup pass can retry it.
    pub async fn dispose_context(&self, context_id: &str) -> Result<()> {
        self.ensure_open()?;

        if self.context_state(context_id).is_none() {
            return Err(Error::context_not_found(context_id));
        }

        let params = DisposeBrowserContextParams {
            browser_context_id: context_id.to_string(),
        };

        self.transport
            .send_command(
                "Target.disposeBrowserContext",
                serde_json::to_value(&params)?,
                None,
            )
            .await?;

        if let Ok(mut contexts) = self.contexts.write() {
            contexts.remove(context_id);
        }

        debug!("Disposed browser context {}", context_id);
        Ok(())
    }

    /// Create a page target, attach to it and enable the runtime
    ///
    /// `context_id` selects the owning context; `None` uses the default
    /// context of the remote browser.
    pub async fn open_page(&self, context_id: Option<&str>) -> Result<Page> {
        self.ensure_open()?;

        if let Some(id) = context_id {
            if self.context_state(id).is_none() {
                return Err(Error::context_not_found(id));
            }
        }

        let params = CreateTargetParams {
            url: "about:blank".to_string(),
            browser_context_id: context_id.map(str::to_string),
        };

        let result = self
            .transport
            .send_command("Target.createTarget", serde_json::to_value(&params)?, None)
            .await?;
        let target: CreateTargetResult = serde_json::from_value(result)?;

        let params = AttachToTargetParams {
            target_id: target.target_id.clone(),
            flatten: true,
        };

        let result = self
            .transport
            .send_command("Target.attachToTarget", serde_json::to_value(&params)?, None)
            .await?;
        let attached: AttachToTargetResult = serde_json::from_value(result)?;

        self.transport
            .send_command("Runtime.enable", Value::Null, Some(&attached.session_id))
            .await?;

        debug!(
            "Opened page {} (session {})",
            target.target_id, attached.session_id
        );

        Ok(Page::new(
            Arc::clone(&self.transport),
            target.target_id,
            attached.session_id,
        ))
    }

    /// Dispose every tracked context and close the transport
    ///
    /// Safe to call from any cleanup path; a second close is a no-op.
    /// Dispose failures are reported and do not abort the close, so an
    /// original error from the caller is never masked.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let ids = self.context_ids();
        for context_id in &ids {
            let params = DisposeBrowserContextParams {
                browser_context_id: context_id.clone(),
            };
            let params = match serde_json::to_value(&params) {
                Ok(params) => params,
                Err(e) => {
                    warn!("Skipping dispose of {}: {}", context_id, e);
                    continue;
                }
            };

            if let Err(e) = self
                .transport
                .send_command("Target.disposeBrowserContext", params, None)
                .await
            {
                warn!("Failed to dispose context {}: {}", context_id, e);
            }
        }

        // Closing the transport invalidates every remaining sub-session.
        if let Ok(mut contexts) = self.contexts.write() {
            contexts.clear();
        }

        self.transport.close().await?;
        info!("Connection closed ({} contexts released)", ids.len());
        Ok(())
    }
}

//! Endpoint configuration for the BotCloud client
//!
//! An [`EndpointConfig`] is validated once, before any network I/O, and is
//! never mutated afterwards. [`EndpointConfig::build_endpoint`] serializes it
//! into the connection URL the service expects:
//!
//! `wss://<host>?token=<token>&--proxy-server=<proxy>&device_type=<mac|win|android>[&user_data_id=<id>]`
//!
//! with every value percent-encoded in the form-urlencoded set.

use crate::fingerprint::FingerprintFlags;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;
use url::form_urlencoded::Serializer as QuerySerializer;
use url::Url;

/// Default service endpoint
pub const DEFAULT_ENDPOINT: &str = "wss://cloud.bots.win";

/// Device profile requested from the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// macOS desktop profile
    #[default]
    Mac,
    /// Windows desktop profile
    Win,
    /// Android mobile profile
    Android,
}

impl DeviceType {
    /// Wire value used in the `device_type` query parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Mac => "mac",
            DeviceType::Win => "win",
            DeviceType::Android => "android",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mac" => Ok(DeviceType::Mac),
            "win" => Ok(DeviceType::Win),
            "android" => Ok(DeviceType::Android),
            other => Err(Error::configuration(format!(
                "Unknown device type: {} (expected mac, win or android)",
                other
            ))),
        }
    }
}

/// Endpoint descriptor for one connection to the service
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// Service base URL (ws:// or wss://)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Authentication token
    pub token: String,

    /// Upstream proxy specification (`user:pass@host:port`)
    pub proxy: String,

    /// Device profile
    #[serde(default)]
    pub device_type: DeviceType,

    /// Persistent profile to attach at connect time
    #[serde(default)]
    pub user_data_id: Option<String>,

    /// Connect-time fingerprint overrides
    #[serde(default)]
    pub flags: FingerprintFlags,
}

fn default_base_url() -> String {
    DEFAULT_ENDPOINT.to_string()
}

impl EndpointConfig {
    /// Create a configuration with the default endpoint and device profile
    pub fn new<S: Into<String>>(token: S, proxy: S) -> Self {
        Self {
            base_url: default_base_url(),
            token: token.into(),
            proxy: proxy.into(),
            device_type: DeviceType::default(),
            user_data_id: None,
            flags: FingerprintFlags::default(),
        }
    }

    /// Load configuration from `BOTCLOUD_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::new(
            env::var("BOTCLOUD_TOKEN").unwrap_or_default(),
            env::var("BOTCLOUD_PROXY").unwrap_or_default(),
        );

        if let Ok(endpoint) = env::var("BOTCLOUD_ENDPOINT") {
            config.base_url = endpoint;
        }

        if let Ok(device) = env::var("BOTCLOUD_DEVICE") {
            config.device_type = device.parse()?;
        }

        if let Ok(user_data_id) = env::var("BOTCLOUD_USER_DATA_ID") {
            if !user_data_id.is_empty() {
                config.user_data_id = Some(user_data_id);
            }
        }

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::configuration(format!("Failed to read config file: {}", e)))?;

        let config: EndpointConfig = toml::from_str(&content)
            .map_err(|e| Error::configuration(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Validate the configuration without performing any I/O
    pub fn validate(&self) -> Result<()> {
        if self.token.trim().is_empty() {
            return Err(Error::configuration("token must be set"));
        }

        if self.proxy.trim().is_empty() {
            return Err(Error::configuration("proxy must be set"));
        }

        let url = Url::parse(&self.base_url)
            .map_err(|e| Error::configuration(format!("Invalid base URL: {}", e)))?;

        match url.scheme() {
            "ws" | "wss" => Ok(()),
            other => Err(Error::configuration(format!(
                "Base URL must use ws or wss scheme, got {}",
                other
            ))),
        }
    }

    /// Serialize the configuration into the connection URL
    ///
    /// Fails with [`Error::Configuration`] if token or proxy is missing; no
    /// network I/O is performed.
    pub fn build_endpoint(&self) -> Result<String> {
        self.validate()?;

        let mut query = QuerySerializer::new(String::new());
        query.append_pair("token", &self.token);
        query.append_pair("--proxy-server", &self.proxy);
        query.append_pair("device_type", self.device_type.as_str());

        if let Some(user_data_id) = &self.user_data_id {
            query.append_pair("user_data_id", user_data_id);
        }

        for (key, value) in self.flags.query_pairs() {
            query.append_pair(&key, &value);
        }

        let base = self.base_url.trim_end_matches('/');
        Ok(format!("{}?{}", base, query.finish()))
    }

    /// Base URL of the administrative REST interface, derived from `base_url`
    pub fn api_base(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if let Some(host) = base.strip_prefix("wss://") {
            format!("https://{}", host)
        } else if let Some(host) = base.strip_prefix("ws://") {
            format!("http://{}", host)
        } else {
            base.to_string()
        }
    }
}

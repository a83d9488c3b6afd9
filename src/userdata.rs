//! User-data (persistent profile) administration
//!
//! Profiles live on the service, independent of any single connection, and
//! are managed through a small REST interface. A profile is attached to a
//! connection by passing its id as the `user_data_id` query parameter at
//! connect time; the service reports profiles held by an active connection
//! as locked.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::EndpointConfig;
use crate::{Error, Result};

/// A freshly created user-data entry
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    /// Opaque identifier (`udd_...`)
    pub id: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// One entry in a user-data listing
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDataEntry {
    /// Opaque identifier
    pub id: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last time a connection attached this profile
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
    /// Whether an active connection currently holds the profile
    pub is_locked: bool,
}

/// Account quota reported alongside a listing
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDataQuota {
    /// Entries in use
    pub used: u32,
    /// Maximum entries allowed by the subscription
    pub max: u32,
    /// Whether another entry can be created
    pub can_create: bool,
}

/// Result of listing user-data entries
#[derive(Debug, Clone, Deserialize)]
pub struct UserDataList {
    /// Total number of entries
    pub total: u32,
    /// The entries themselves
    pub items: Vec<UserDataEntry>,
    /// Account quota
    pub quota: UserDataQuota,
}

/// Client for the user-data administration interface
#[derive(Debug, Clone)]
pub struct UserDataClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl UserDataClient {
    /// Create a client for an explicit API base URL
    pub fn new<S: Into<String>>(api_base: S, token: S) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Create a client for the same account an [`EndpointConfig`] targets
    pub fn for_config(config: &EndpointConfig) -> Self {
        Self::new(config.api_base(), config.token.clone())
    }

    async fn request(&self, method: reqwest::Method, path: &str) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.api_base, path);
        debug!("{} {}", method, url);

        let response = self
            .http
            .request(method, &url)
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| Error::connection(format!("User-data request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::persistence(status.as_u16(), body));
        }

        Ok(response)
    }

    /// Create a new user-data entry
    pub async fn create(&self) -> Result<UserData> {
        let response = self
            .request(reqwest::Method::POST, "/api/user-data")
            .await?;
        let data: UserData = response.json().await?;
        info!("Created user data {}", data.id);
        Ok(data)
    }

    /// List all user-data entries with quota information
    pub async fn list(&self) -> Result<UserDataList> {
        let response = self.request(reqwest::Method::GET, "/api/user-data").await?;
        Ok(response.json().await?)
    }

    /// Delete a user-data entry by identifier
    ///
    /// Deleting a profile held by an active connection is rejected by the
    /// service and surfaces as [`Error::Persistence`].
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.request(
            reqwest::Method::DELETE,
            &format!("/api/user-data/{}", id),
        )
        .await?;
        info!("Deleted user data {}", id);
        Ok(())
    }
}

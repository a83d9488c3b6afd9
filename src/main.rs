//! Demo driver for the BotCloud client
//!
//! Runs one of the bundled scenarios against a configured endpoint:
//!
//! - `quickstart`     connect, navigate, screenshot to disk
//! - `multi-context`  three fingerprint-isolated contexts in one browser
//! - `user-data`      persistent-profile round trip over two connections
//! - `live`           LiveURL hand-off for human interaction
//!
//! Configuration comes from environment variables: `BOTCLOUD_TOKEN`,
//! `BOTCLOUD_PROXY`, and optionally `BOTCLOUD_ENDPOINT`, `BOTCLOUD_DEVICE`
//! and `BOTCLOUD_USER_DATA_ID`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use botcloud_client::{
    Connection, EndpointConfig, FingerprintFlags, ScreenshotFormat, UserDataClient,
};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing - respect RUST_LOG environment variable
    let log_level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|v| v.parse::<Level>().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    info!("BotCloud client demo v{}", botcloud_client::VERSION);

    let scenario = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "quickstart".to_string());

    let config = EndpointConfig::from_env()?;
    config.validate()?;

    match scenario.as_str() {
        "quickstart" => quickstart(&config).await?,
        "multi-context" => multi_context(&config).await?,
        "user-data" => user_data(&config).await?,
        "live" => live(&config).await?,
        other => anyhow::bail!(
            "Unknown scenario: {} (expected quickstart, multi-context, user-data or live)",
            other
        ),
    }

    info!("Scenario {} completed", scenario);
    Ok(())
}

/// Run `body` against a fresh connection, closing it on every exit path
///
/// A close failure after a scenario error is reported but never replaces
/// the original error.
async fn with_connection<F, Fut>(config: &EndpointConfig, body: F) -> anyhow::Result<()>
where
    F: FnOnce(Arc<Connection>) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let connection = Arc::new(Connection::connect(config).await?);
    let result = body(Arc::clone(&connection)).await;

    match connection.close().await {
        Ok(()) => result,
        Err(close_error) => match result {
            Ok(()) => Err(close_error.into()),
            Err(e) => {
                warn!("Failed to close connection: {}", close_error);
                Err(e)
            }
        },
    }
}

/// Connect, open a page, take a screenshot
async fn quickstart(config: &EndpointConfig) -> anyhow::Result<()> {
    with_connection(config, |connection| async move {
        let page = connection.open_page(None).await?;

        info!("Navigating to example.com");
        page.navigate("https://example.com").await?;

        info!("Capturing screenshot");
        let bytes = page.screenshot(ScreenshotFormat::Png).await?;
        std::fs::write("botcloud-screenshot.png", &bytes)?;
        info!("Saved botcloud-screenshot.png ({} bytes)", bytes.len());

        Ok(())
    })
    .await
}

/// Three contexts with independent fingerprint identities in one browser
async fn multi_context(config: &EndpointConfig) -> anyhow::Result<()> {
    let identities = [
        (
            "Tokyo",
            FingerprintFlags::new()
                .timezone("Asia/Tokyo")
                .languages(["ja-JP", "en-US"])
                .locale("ja-JP"),
        ),
        (
            "New York",
            FingerprintFlags::new()
                .timezone("America/New_York")
                .languages(["en-US", "es-ES"])
                .locale("en-US"),
        ),
        (
            "Berlin",
            FingerprintFlags::new()
                .timezone("Europe/Berlin")
                .languages(["de-DE", "en-US"])
                .locale("de-DE"),
        ),
    ];

    with_connection(config, |connection| async move {
        for (name, flags) in &identities {
            info!("Creating context ({})", name);
            let context_id = connection.create_context(flags).await?;

            let page = connection.open_page(Some(&context_id)).await?;
            let timezone = page
                .evaluate("Intl.DateTimeFormat().resolvedOptions().timeZone", false)
                .await?;
            let language = page.evaluate("navigator.language", false).await?;
            let languages = page
                .evaluate("JSON.stringify(navigator.languages)", false)
                .await?;

            println!("{} context:", name);
            println!("  Timezone:  {:?}", timezone);
            println!("  Language:  {:?}", language);
            println!("  Languages: {:?}", languages);
        }

        for context_id in connection.context_ids() {
            connection.dispose_context(&context_id).await?;
            info!("Disposed {}", context_id);
        }

        Ok(())
    })
    .await
}

/// Create a persistent profile, prove state survives across connections
async fn user_data(config: &EndpointConfig) -> anyhow::Result<()> {
    let admin = UserDataClient::for_config(config);

    let profile = admin.create().await?;
    info!("Created user data {} at {}", profile.id, profile.created_at);

    let listing = admin.list().await?;
    info!(
        "Quota: {}/{} (can create: {})",
        listing.quota.used, listing.quota.max, listing.quota.can_create
    );

    let mut attached = config.clone();
    attached.user_data_id = Some(profile.id.clone());

    let result = user_data_round_trip(&attached).await;

    // Delete the profile even when the round trip failed; a delete failure
    // must not hide the original error.
    if let Err(e) = admin.delete(&profile.id).await {
        warn!("Failed to delete user data {}: {}", profile.id, e);
    }

    result
}

async fn user_data_round_trip(config: &EndpointConfig) -> anyhow::Result<()> {
    info!("First visit - saving marker");
    with_connection(config, |connection| async move {
        let page = connection.open_page(None).await?;
        page.navigate("https://example.com").await?;
        page.local_storage_set("botcloud_test", "persistent_data")
            .await?;
        Ok(())
    })
    .await?;

    info!("Second visit - verifying persistence");
    with_connection(config, |connection| async move {
        let page = connection.open_page(None).await?;
        page.navigate("https://example.com").await?;

        let marker = page.local_storage_get("botcloud_test").await?;
        match marker.as_deref() {
            Some("persistent_data") => info!("Marker persisted across sessions"),
            other => anyhow::bail!("Marker did not persist, got {:?}", other),
        }

        Ok(())
    })
    .await
}

/// Hand the page to a human through a LiveURL
async fn live(config: &EndpointConfig) -> anyhow::Result<()> {
    with_connection(config, |connection| async move {
        let page = connection.open_page(None).await?;
        page.navigate("https://httpbin.org/forms/post").await?;

        let session = page.live_url(Duration::from_secs(120)).await?;
        println!("Open this URL in your browser:");
        println!("  {}", session.url);
        println!("Click \"Done\" in the live view when finished.");

        session.wait_complete(Duration::from_secs(150)).await?;
        info!("Interaction complete");

        let title = page.evaluate("document.title", false).await?;
        info!("Page title after interaction: {:?}", title);

        Ok(())
    })
    .await
}

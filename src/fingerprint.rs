//! Fingerprint configuration flags
//!
//! The service accepts a family of `--bot-config-*` parameters that override
//! what the browser reports about itself. By default identity values are
//! auto-detected from the proxy IP; these flags force specific values. The
//! same flag strings are accepted both as connect-time query parameters and
//! as per-context `botCloudFlags`.

use serde::Deserialize;

/// Identity and noise-injection overrides for a connection or a single
/// browser context
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FingerprintFlags {
    /// IANA timezone, e.g. `Asia/Tokyo`
    #[serde(default)]
    pub timezone: Option<String>,

    /// Browser locale, e.g. `ja-JP`
    #[serde(default)]
    pub locale: Option<String>,

    /// Comma-separated language preferences, e.g. `ja-JP,en-US`
    #[serde(default)]
    pub languages: Option<String>,

    /// Canvas fingerprint noise
    #[serde(default)]
    pub noise_canvas: Option<bool>,

    /// WebGL image noise
    #[serde(default)]
    pub noise_webgl_image: Option<bool>,

    /// Audio context noise
    #[serde(default)]
    pub noise_audio_context: Option<bool>,

    /// Ignore `debugger` statements
    #[serde(default)]
    pub disable_debugger: Option<bool>,
}

impl FingerprintFlags {
    /// Create an empty flag set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timezone override
    pub fn timezone<S: Into<String>>(mut self, timezone: S) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    /// Set the locale override
    pub fn locale<S: Into<String>>(mut self, locale: S) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Set the language preference list
    pub fn languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let joined = languages
            .into_iter()
            .map(Into::into)
            .collect::<Vec<_>>()
            .join(",");
        self.languages = Some(joined);
        self
    }

    /// Enable or disable canvas noise
    pub fn noise_canvas(mut self, enabled: bool) -> Self {
        self.noise_canvas = Some(enabled);
        self
    }

    /// Enable or disable WebGL image noise
    pub fn noise_webgl_image(mut self, enabled: bool) -> Self {
        self.noise_webgl_image = Some(enabled);
        self
    }

    /// Enable or disable audio context noise
    pub fn noise_audio_context(mut self, enabled: bool) -> Self {
        self.noise_audio_context = Some(enabled);
        self
    }

    /// Ignore `debugger` statements in page scripts
    pub fn disable_debugger(mut self, enabled: bool) -> Self {
        self.disable_debugger = Some(enabled);
        self
    }

    /// Whether no override is set
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Flags as `(parameter, value)` pairs for query-string embedding
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();

        if let Some(timezone) = &self.timezone {
            pairs.push(("--bot-config-timezone".to_string(), timezone.clone()));
        }
        if let Some(locale) = &self.locale {
            pairs.push(("--bot-config-locale".to_string(), locale.clone()));
        }
        if let Some(languages) = &self.languages {
            pairs.push(("--bot-config-languages".to_string(), languages.clone()));
        }
        if let Some(enabled) = self.noise_canvas {
            pairs.push(("--bot-config-noise-canvas".to_string(), enabled.to_string()));
        }
        if let Some(enabled) = self.noise_webgl_image {
            pairs.push((
                "--bot-config-noise-webgl-image".to_string(),
                enabled.to_string(),
            ));
        }
        if let Some(enabled) = self.noise_audio_context {
            pairs.push((
                "--bot-config-noise-audio-context".to_string(),
                enabled.to_string(),
            ));
        }
        if let Some(enabled) = self.disable_debugger {
            pairs.push(("--bot-disable-debugger".to_string(), enabled.to_string()));
        }

        pairs
    }

    /// Flags as `--name=value` strings for `botCloudFlags` parameters
    pub fn to_flag_strings(&self) -> Vec<String> {
        self.query_pairs()
            .into_iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect()
    }
}

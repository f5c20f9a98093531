//! Configuration store.
//!
//! A flat `key=value` properties file loaded once at suite start and
//! read-only afterward. Missing keys fall back to documented defaults, so a
//! minimal file (or an empty one) still yields a usable configuration.

use crate::engine::BrowserKind;
use crate::report::ScreenshotPolicy;
use std::collections::HashMap;
use std::path::Path;

use crate::result::{EnsayoError, EnsayoResult};

/// Immutable harness configuration.
///
/// Loaded exactly once before any session starts; shared via `Arc` and never
/// mutated afterward, so no locking is needed.
#[derive(Debug, Clone, Default)]
pub struct HarnessConfig {
    values: HashMap<String, String>,
}

impl HarnessConfig {
    /// Load configuration from a properties file.
    ///
    /// Lines are `key=value`; `#` and `!` start comments; keys and values
    /// are trimmed of surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the file cannot be read.
    pub fn load(path: impl AsRef<Path>) -> EnsayoResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            EnsayoError::config(format!("failed to read {}: {e}", path.display()))
        })?;
        Ok(Self::parse(&text))
    }

    /// Parse configuration from properties text.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut values = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                values.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        Self { values }
    }

    /// Build a configuration from explicit key/value pairs (test helper and
    /// programmatic setup).
    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Raw lookup of a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Raw lookup with a default.
    #[must_use]
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Configured browser kind (`browser`, default chrome).
    ///
    /// Unknown values fall back to chrome with a warning, matching the
    /// behavior tests rely on when a suite runs on a machine with a partial
    /// configuration.
    #[must_use]
    pub fn browser(&self) -> BrowserKind {
        match self.get("browser") {
            None => BrowserKind::Chrome,
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(value = raw, "unknown browser kind, using chrome");
                BrowserKind::Chrome
            }),
        }
    }

    /// Headless flag (`headless`, default false).
    #[must_use]
    pub fn headless(&self) -> bool {
        self.get("headless")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    /// Base application URL (`baseUrl`, default `about:blank`).
    #[must_use]
    pub fn base_url(&self) -> String {
        self.get_or("baseUrl", "about:blank").to_string()
    }

    /// Report author (`author`, default `$USER` or "unknown").
    #[must_use]
    pub fn author(&self) -> String {
        self.get("author")
            .map(ToString::to_string)
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Environment name (`env`, default "local").
    #[must_use]
    pub fn env(&self) -> String {
        self.get_or("env", "local").to_string()
    }

    /// Screenshot capture policy (`reporting.screenshots`, default failed).
    #[must_use]
    pub fn screenshot_policy(&self) -> ScreenshotPolicy {
        match self.get("reporting.screenshots") {
            None => ScreenshotPolicy::Failed,
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(value = raw, "unknown screenshot policy, using failed");
                ScreenshotPolicy::Failed
            }),
        }
    }

    /// Full-page screenshot flag (`screenshot.fullpage`, default false).
    #[must_use]
    pub fn screenshot_fullpage(&self) -> bool {
        self.get("screenshot.fullpage")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    /// Explicit wait timeout in milliseconds (`explicitWait`, default 10000).
    #[must_use]
    pub fn explicit_wait_ms(&self) -> u64 {
        self.get("explicitWait")
            .and_then(|v| v.parse().ok())
            .unwrap_or(10_000)
    }
}

//! Configuration file loading, validation and editing.
//!
//! The file holds the subscription list plus optional notification, login and
//! browser settings:
//!
//! ```json
//! {
//!   "subscriptions": [
//!     { "name": "qwen", "url": "https://huggingface.co/Qwen", "type": "html" }
//!   ],
//!   "notifications": {
//!     "method": "email",
//!     "email": "team@example.com",
//!     "smtp": { "host": "smtp.example.com", "username": "watch", "password": "...", "from": "watch@example.com" }
//!   },
//!   "browser": { "webdriver_url": "http://localhost:4444", "browser": "firefox" }
//! }
//! ```
//!
//! Paths ending in `.yaml` or `.yml` are read and written as YAML, anything
//! else as JSON.

use crate::errors::ConfigError;
use crate::models::{Subscription, SubscriptionKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications: Option<NotificationSettings>,
    /// Carried through untouched; nothing in this crate logs in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<BrowserSettings>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationMethod {
    #[default]
    Log,
    Slack,
    Email,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct NotificationSettings {
    #[serde(default)]
    pub method: NotificationMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack_webhook_url: Option<String>,
    /// Recipient for `method: email`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp: Option<SmtpSettings>,
}

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    #[default]
    Starttls,
    Tls,
    None,
}

/// Outgoing mail server used by the email notifier.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SmtpSettings {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub security: SmtpSecurity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Sender mailbox, e.g. `Model Watch <watch@example.com>`.
    pub from: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Chrome,
    Firefox,
}

/// WebDriver endpoint and session options used by the listing scanner.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BrowserSettings {
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    #[serde(default)]
    pub browser: BrowserKind,
    #[serde(default = "default_headless")]
    pub headless: bool,
    /// Upper bound for each element-appearance wait.
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            browser: BrowserKind::default(),
            headless: default_headless(),
            wait_timeout_secs: default_wait_timeout_secs(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

fn default_headless() -> bool {
    true
}

fn default_wait_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Yaml,
}

impl Format {
    fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Format::Yaml,
            _ => Format::Json,
        }
    }
}

impl Config {
    /// Parse configuration text in the format implied by `path`.
    pub fn parse(path: &Path, text: &str) -> Result<Self, ConfigError> {
        let parsed = match Format::for_path(path) {
            Format::Json => serde_json::from_str::<Config>(text).map_err(|e| e.to_string()),
            Format::Yaml => serde_yaml::from_str::<Config>(text).map_err(|e| e.to_string()),
        };
        let config = parsed.map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate the configuration file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Read`] when the file is missing or unreadable,
    /// [`ConfigError::Parse`] for malformed content, and the validation
    /// variants for duplicate names or unusable URLs.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::parse(path, &text)?;
        info!(subscriptions = config.subscriptions.len(), "Loaded configuration");
        Ok(config)
    }

    /// Load the configuration, or start an empty one when the file does not exist yet.
    ///
    /// Used by `add`, which may be the first command ever run.
    pub async fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match fs::try_exists(path).await {
            Ok(false) => Ok(Config::default()),
            _ => Self::load(path).await,
        }
    }

    /// Write the configuration back, replacing the file atomically.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = match Format::for_path(path) {
            Format::Json => serde_json::to_string_pretty(self).map_err(|e| e.to_string()),
            Format::Yaml => serde_yaml::to_string(self).map_err(|e| e.to_string()),
        }
        .map_err(ConfigError::Serialize)?;

        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let tmp = temp_path_for(path);
        fs::write(&tmp, text).await.map_err(write_err)?;
        fs::rename(&tmp, path).await.map_err(write_err)?;
        info!(subscriptions = self.subscriptions.len(), "Saved configuration");
        Ok(())
    }

    /// Check that names are non-empty and unique and that every URL is absolute http(s).
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for sub in &self.subscriptions {
            validate_subscription(sub)?;
            if !seen.insert(sub.name.as_str()) {
                return Err(ConfigError::DuplicateSubscription(sub.name.clone()));
            }
        }
        Ok(())
    }

    pub fn subscription(&self, name: &str) -> Option<&Subscription> {
        self.subscriptions.iter().find(|s| s.name == name)
    }

    /// Append a subscription, keeping configuration order.
    pub fn add_subscription(
        &mut self,
        name: &str,
        url: &str,
        kind: SubscriptionKind,
    ) -> Result<&Subscription, ConfigError> {
        let sub = Subscription {
            name: name.trim().to_string(),
            source_url: url.trim().to_string(),
            kind,
        };
        validate_subscription(&sub)?;
        if self.subscription(&sub.name).is_some() {
            return Err(ConfigError::DuplicateSubscription(sub.name));
        }
        self.subscriptions.push(sub);
        Ok(&self.subscriptions[self.subscriptions.len() - 1])
    }

    pub fn remove_subscription(&mut self, name: &str) -> Result<Subscription, ConfigError> {
        let pos = self
            .subscriptions
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| ConfigError::UnknownSubscription(name.to_string()))?;
        Ok(self.subscriptions.remove(pos))
    }
}

fn validate_subscription(sub: &Subscription) -> Result<(), ConfigError> {
    if sub.name.trim().is_empty() {
        return Err(ConfigError::EmptyName);
    }
    let invalid = |reason: &str| ConfigError::InvalidUrl {
        name: sub.name.clone(),
        url: sub.source_url.clone(),
        reason: reason.to_string(),
    };
    let parsed = Url::parse(&sub.source_url).map_err(|e| invalid(&e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(&format!("unsupported scheme '{other}'"))),
    }
}

/// Sibling temp file used for write-then-rename.
pub fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", name, std::process::id()))
}

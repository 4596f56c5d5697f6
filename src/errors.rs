//! Error types for each failure domain of a monitoring pass.
//!
//! The variants map onto how far a failure is allowed to travel:
//!
//! | Error | Scope | Handling |
//! |-------|-------|----------|
//! | [`ConfigError`] | whole process | fatal at startup |
//! | [`ScanError`] | one subscription | retried, then the subscription is skipped |
//! | [`DetailFetchError`] | one model page | logged, the record keeps partial data |
//! | [`PersistenceError`] | whole pass | fatal, the previous snapshot file stays intact |
//! | [`NotifyError`] | notification | logged only |

use std::path::PathBuf;

/// Missing or malformed configuration, or an invalid edit to it.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("cannot write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot serialize config: {0}")]
    Serialize(String),
    #[error("subscription name must not be empty")]
    EmptyName,
    #[error("subscription '{0}' is declared more than once")]
    DuplicateSubscription(String),
    #[error("no subscription named '{0}'")]
    UnknownSubscription(String),
    #[error("subscription '{name}' has an invalid url '{url}': {reason}")]
    InvalidUrl {
        name: String,
        url: String,
        reason: String,
    },
}

/// The listing page could not be reached or did not look as expected.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("cannot open webdriver session at {endpoint}: {message}")]
    Session { endpoint: String, message: String },
    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },
    #[error("container '{selector}' did not appear on {url} within {timeout_secs}s")]
    ContainerMissing {
        url: String,
        selector: String,
        timeout_secs: u64,
    },
    #[error("expand control on {url} could not be used: {message}")]
    Expand { url: String, message: String },
    #[error("cannot read page source of {url}: {message}")]
    Source { url: String, message: String },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status} from {url}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("feed at {url} is not RSS or Atom: {message}")]
    Feed { url: String, message: String },
}

/// A single model page could not be fetched.
#[derive(Debug, thiserror::Error)]
pub enum DetailFetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}")]
    HttpStatus { status: reqwest::StatusCode },
}

/// The snapshot file could not be read or written.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("cannot read snapshot {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("cannot write snapshot {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webhook rejected the message with status {0}")]
    Rejected(reqwest::StatusCode),
    #[error("cannot render report: {0}")]
    Render(#[from] minijinja::Error),
    #[error("invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("cannot build email: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("smtp error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

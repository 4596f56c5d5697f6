//! Scoped WebDriver session.
//!
//! [`with_session`] owns a session for the duration of one piece of work and
//! closes it on every exit path: after success, after an error, and (through a
//! drop guard that schedules the close on the current tokio runtime) when the
//! work is cancelled or panics.

use crate::config::{BrowserKind, BrowserSettings};
use crate::errors::ScanError;
use fantoccini::{Client, ClientBuilder};
use serde_json::json;
use std::future::Future;
use tracing::{debug, instrument, warn};

/// A remote resource that must be closed once the work using it is done.
///
/// Handles are cheap clones of one underlying session.
pub trait Session: Clone + Send + 'static {
    fn endpoint(&self) -> &str;

    /// End the session. Failures are logged; there is nothing left to retry.
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Run `work` against `session`, then close the session whatever the outcome.
pub async fn with_session<S, T>(
    session: S,
    work: impl AsyncFnOnce(&S) -> Result<T, ScanError>,
) -> Result<T, ScanError>
where
    S: Session,
{
    let mut guard = SessionGuard {
        session,
        released: false,
    };
    let result = work(&guard.session).await;
    guard.release().await;
    result
}

struct SessionGuard<S: Session> {
    session: S,
    released: bool,
}

impl<S: Session> SessionGuard<S> {
    async fn release(&mut self) {
        self.released = true;
        self.session.clone().close().await;
    }
}

impl<S: Session> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!(endpoint = %self.session.endpoint(), "Session dropped before release; closing in background");
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(self.session.clone().close());
        }
    }
}

/// A live WebDriver session.
#[derive(Clone)]
pub struct BrowserSession {
    client: Client,
    endpoint: String,
}

impl BrowserSession {
    /// Start a new WebDriver session.
    #[instrument(level = "info", skip_all, fields(endpoint = %settings.webdriver_url))]
    pub async fn open(settings: &BrowserSettings) -> Result<Self, ScanError> {
        let mut builder = ClientBuilder::native();
        builder.capabilities(capabilities(settings));
        let client = builder
            .connect(&settings.webdriver_url)
            .await
            .map_err(|e| ScanError::Session {
                endpoint: settings.webdriver_url.clone(),
                message: e.to_string(),
            })?;
        debug!("WebDriver session opened");
        Ok(Self {
            client,
            endpoint: settings.webdriver_url.clone(),
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl Session for BrowserSession {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn close(self) -> impl Future<Output = ()> + Send {
        async move {
            match self.client.close().await {
                Ok(()) => debug!(endpoint = %self.endpoint, "WebDriver session closed"),
                Err(e) => warn!(endpoint = %self.endpoint, error = %e, "Failed to close WebDriver session"),
            }
        }
    }
}

fn capabilities(settings: &BrowserSettings) -> serde_json::Map<String, serde_json::Value> {
    let mut caps = serde_json::Map::new();
    match settings.browser {
        BrowserKind::Chrome => {
            let mut args = vec!["--disable-gpu", "--no-sandbox", "--window-size=1280,2000"];
            if settings.headless {
                args.push("--headless=new");
            }
            caps.insert("browserName".to_string(), json!("chrome"));
            caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
        }
        BrowserKind::Firefox => {
            let args: Vec<&str> = if settings.headless { vec!["-headless"] } else { vec![] };
            caps.insert("browserName".to_string(), json!("firefox"));
            caps.insert("moz:firefoxOptions".to_string(), json!({ "args": args }));
        }
    }
    caps
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts `close` calls across all clones.
    #[derive(Clone, Default)]
    struct CountingSession {
        closes: Arc<AtomicUsize>,
    }

    impl CountingSession {
        fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    impl Session for CountingSession {
        fn endpoint(&self) -> &str {
            "fake://session"
        }

        fn close(self) -> impl Future<Output = ()> + Send {
            self.closes.fetch_add(1, Ordering::SeqCst);
            async {}
        }
    }

    #[tokio::test]
    async fn test_session_closed_after_success() {
        let session = CountingSession::default();
        let items = with_session(session.clone(), async |_s: &CountingSession| Ok(vec!["M1"]))
            .await
            .unwrap();
        assert_eq!(items, vec!["M1"]);
        assert_eq!(session.closes(), 1);
    }

    #[tokio::test]
    async fn test_session_closed_after_error() {
        let session = CountingSession::default();
        let result: Result<(), ScanError> = with_session(session.clone(), async |_s: &CountingSession| {
            Err(ScanError::ContainerMissing {
                url: "https://huggingface.co/Qwen".to_string(),
                selector: "main".to_string(),
                timeout_secs: 10,
            })
        })
        .await;
        assert!(matches!(result, Err(ScanError::ContainerMissing { .. })));
        assert_eq!(session.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_closed_when_work_is_cancelled() {
        let session = CountingSession::default();
        let work = with_session(session.clone(), async |_s: &CountingSession| {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        });

        let timed_out = tokio::time::timeout(Duration::from_secs(1), work).await;
        assert!(timed_out.is_err());
        assert_eq!(session.closes(), 1);
    }

    #[test]
    fn test_chrome_headless_capabilities() {
        let caps = capabilities(&BrowserSettings::default());
        assert_eq!(caps["browserName"], "chrome");
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(args.iter().any(|a| a == "--headless=new"));
    }

    #[test]
    fn test_firefox_headed_capabilities() {
        let settings = BrowserSettings {
            browser: BrowserKind::Firefox,
            headless: false,
            ..BrowserSettings::default()
        };
        let caps = capabilities(&settings);
        assert_eq!(caps["browserName"], "firefox");
        assert!(caps["moz:firefoxOptions"]["args"].as_array().unwrap().is_empty());
        assert!(!caps.contains_key("goog:chromeOptions"));
    }
}

//! Notification gateway for newly discovered models.
//!
//! The reconciler hands the delta to a [`Notifier`] and does not depend on
//! delivery: a failed notification is logged and the pass still succeeds.
//!
//! | Method | Transport |
//! |--------|-----------|
//! | `log` | structured `tracing` events, one per model |
//! | `slack` | incoming webhook, Markdown body |
//! | `email` | SMTP, plain-text summary with an HTML alternative |
//!
//! A `slack` or `email` method with incomplete settings falls back to `log`
//! with a warning at startup.

use crate::config::{NotificationMethod, NotificationSettings, SmtpSecurity, SmtpSettings};
use crate::errors::NotifyError;
use crate::models::ModelRecord;
use crate::report::{render_html, render_markdown, render_summary};
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde_json::json;
use std::fmt;
use tracing::{info, instrument, warn};

pub trait Notifier {
    async fn notify(&self, delta: &[ModelRecord]) -> Result<(), NotifyError>;
}

/// Emits one log event per new model.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn notify(&self, delta: &[ModelRecord]) -> Result<(), NotifyError> {
        if delta.is_empty() {
            info!("No new models found");
            return Ok(());
        }
        for record in delta {
            info!(
                subscription = %record.subscription_name,
                title = %record.title,
                link = %record.link,
                published_at = ?record.published_at,
                likes = ?record.stats.likes,
                followers = ?record.stats.followers,
                "New model"
            );
        }
        info!(count = delta.len(), "New models found");
        Ok(())
    }
}

/// Posts the Markdown report to a Slack incoming webhook.
#[derive(Debug, Clone)]
pub struct SlackNotifier {
    http: reqwest::Client,
    webhook_url: String,
}

impl SlackNotifier {
    pub fn new(http: reqwest::Client, webhook_url: impl Into<String>) -> Self {
        Self {
            http,
            webhook_url: webhook_url.into(),
        }
    }
}

impl Notifier for SlackNotifier {
    #[instrument(level = "info", skip_all, fields(count = delta.len()))]
    async fn notify(&self, delta: &[ModelRecord]) -> Result<(), NotifyError> {
        if delta.is_empty() {
            return Ok(());
        }
        let response = self
            .http
            .post(&self.webhook_url)
            .json(&json!({ "text": render_markdown(delta) }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status));
        }
        info!("Posted Slack notification");
        Ok(())
    }
}

/// Sends the delta as an email through an SMTP relay.
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailNotifier {
    /// Build the notifier. Addresses are parsed here so a bad config fails at startup.
    ///
    /// # Errors
    ///
    /// [`NotifyError::Address`] for an unparsable sender or recipient,
    /// [`NotifyError::Smtp`] when the TLS relay cannot be set up.
    pub fn from_settings(smtp: &SmtpSettings, recipient: &str) -> Result<Self, NotifyError> {
        let builder = match smtp.security {
            SmtpSecurity::Starttls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)?,
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)?,
            SmtpSecurity::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp.host.as_str()),
        };
        let mut builder = builder.port(smtp.port);
        if let Some(username) = &smtp.username {
            builder = builder.credentials(Credentials::new(
                username.clone(),
                smtp.password.clone().unwrap_or_default(),
            ));
        }
        Ok(Self {
            transport: builder.build(),
            from: smtp.from.parse()?,
            to: recipient.parse()?,
        })
    }

    /// The message sent for `delta`: plain summary plus the HTML list.
    pub fn build_message(&self, delta: &[ModelRecord]) -> Result<Message, NotifyError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(format!("New models found ({})", delta.len()))
            .multipart(MultiPart::alternative_plain_html(
                render_summary(delta),
                render_html(delta)?,
            ))?;
        Ok(message)
    }
}

impl fmt::Debug for EmailNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailNotifier")
            .field("from", &self.from.to_string())
            .field("to", &self.to.to_string())
            .finish()
    }
}

impl Notifier for EmailNotifier {
    #[instrument(level = "info", skip_all, fields(count = delta.len(), to = %self.to))]
    async fn notify(&self, delta: &[ModelRecord]) -> Result<(), NotifyError> {
        if delta.is_empty() {
            return Ok(());
        }
        let message = self.build_message(delta)?;
        self.transport.send(message).await?;
        info!("Sent email notification");
        Ok(())
    }
}

/// The notifier chosen by configuration.
#[derive(Debug)]
pub enum Gateway {
    Log(LogNotifier),
    Slack(SlackNotifier),
    Email(EmailNotifier),
}

impl Gateway {
    pub fn from_settings(settings: Option<&NotificationSettings>, http: reqwest::Client) -> Self {
        let Some(settings) = settings else {
            return Gateway::Log(LogNotifier);
        };
        match settings.method {
            NotificationMethod::Log => Gateway::Log(LogNotifier),
            NotificationMethod::Slack => match &settings.slack_webhook_url {
                Some(url) => Gateway::Slack(SlackNotifier::new(http, url.clone())),
                None => {
                    warn!("Slack notifications configured without slack_webhook_url; logging instead");
                    Gateway::Log(LogNotifier)
                }
            },
            NotificationMethod::Email => match (&settings.smtp, &settings.email) {
                (Some(smtp), Some(recipient)) => match EmailNotifier::from_settings(smtp, recipient) {
                    Ok(notifier) => Gateway::Email(notifier),
                    Err(e) => {
                        warn!(error = %e, "Email notifications misconfigured; logging instead");
                        Gateway::Log(LogNotifier)
                    }
                },
                _ => {
                    warn!("Email notifications need both email and smtp settings; logging instead");
                    Gateway::Log(LogNotifier)
                }
            },
        }
    }
}

impl Notifier for Gateway {
    async fn notify(&self, delta: &[ModelRecord]) -> Result<(), NotifyError> {
        match self {
            Gateway::Log(n) => n.notify(delta).await,
            Gateway::Slack(n) => n.notify(delta).await,
            Gateway::Email(n) => n.notify(delta).await,
        }
    }
}

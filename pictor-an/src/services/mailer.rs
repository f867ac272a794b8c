//! Email collaborator
//!
//! Notifications go through a mail gateway as a JSON POST; the pipeline only
//! consumes success/failure. Template rendering and address validation live
//! here so the chain builder and the notify stage share one definition.

use async_trait::async_trait;
use pictor_common::config::Settings;
use pictor_common::{Error, Result};
use serde_json::json;
use std::time::Duration;

const NOTIFICATION_TEMPLATE: &str = include_str!("../../templates/notification.html");

/// Email dispatch boundary
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send one HTML email. Only success/failure is consumed.
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<()>;
}

/// Mailer backed by an HTTP mail-gateway endpoint
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            endpoint: settings.mail_endpoint.clone(),
            from: settings.mail_from.clone(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<()> {
        let endpoint = self.endpoint.as_ref().ok_or_else(|| {
            Error::Config("mail_endpoint not configured; cannot send notification".to_string())
        })?;

        let body = json!({
            "from": self.from,
            "to": to,
            "subject": subject,
            "html": html,
        });

        let response = self.client.post(endpoint).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Internal(format!(
                "Mail gateway returned {}: {}",
                status, detail
            )));
        }

        tracing::info!(to = %to, "Notification email dispatched");
        Ok(())
    }
}

/// Render the notification email for a finished annotation
///
/// Returns `(subject, html_body)`.
pub fn render_notification_email(link: &str) -> (String, String) {
    let subject = "Pictor - Your annotation is ready".to_string();
    let html = NOTIFICATION_TEMPLATE.replace("{{link}}", link);
    (subject, html)
}

/// Syntactic email validity check (local@domain.tld shape)
///
/// This gates whether the notification stage is included in a chain at all.
/// It is deliberately a shape check, not RFC 5322 parsing.
pub fn is_valid_email(email: &str) -> bool {
    let mut parts = email.splitn(2, '@');
    let (Some(local), Some(domain)) = (parts.next(), parts.next()) else {
        return false;
    };

    if local.is_empty() || domain.is_empty() {
        return false;
    }
    if email.chars().any(|c| c.is_whitespace()) {
        return false;
    }
    // Domain needs at least one dot with non-empty labels either side
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return false;
    }
    // Top-level label must be alphabetic and at least two characters
    let tld = labels[labels.len() - 1];
    tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic())
}

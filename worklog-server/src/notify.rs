//! Outgoing email.
//!
//! Jobs talk to a [`Mailer`] handed to them at construction; the backend is
//! chosen from config once in `main`.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::server::{MailBackend, MailConfig};

pub const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("mail transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("mail provider rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("mail config error: {0}")]
    Config(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, msg: EmailMessage) -> Result<(), NotifyError>;
}

/// Writes messages to the log instead of sending them.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, msg: EmailMessage) -> Result<(), NotifyError> {
        info!(to = %msg.to, subject = %msg.subject, "email (log backend)");
        debug!(body = %msg.body, "email body");
        Ok(())
    }
}

pub struct ResendMailer {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    from: String,
}

#[derive(Serialize)]
struct ResendPayload<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

impl ResendMailer {
    pub fn new(api_key: String, from: String) -> Self {
        Self::with_endpoint(RESEND_ENDPOINT.to_string(), api_key, from)
    }

    pub fn with_endpoint(endpoint: String, api_key: String, from: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
            api_key,
            from,
        }
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, msg: EmailMessage) -> Result<(), NotifyError> {
        let payload = ResendPayload {
            from: &self.from,
            to: [&msg.to],
            subject: &msg.subject,
            text: &msg.body,
        };
        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        debug!(to = %msg.to, subject = %msg.subject, "email sent via resend");
        Ok(())
    }
}

/// Keeps every message in memory. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer whose every send fails; messages are still recorded.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, msg: EmailMessage) -> Result<(), NotifyError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(msg);
        }
        if self.fail {
            return Err(NotifyError::Rejected {
                status: 503,
                body: "recording mailer set to fail".into(),
            });
        }
        Ok(())
    }
}

pub fn mailer_from_config(cfg: &MailConfig) -> Result<Arc<dyn Mailer>, NotifyError> {
    match cfg.backend {
        MailBackend::Log => Ok(Arc::new(LogMailer)),
        MailBackend::Resend => {
            let key = cfg
                .resend_api_key
                .clone()
                .filter(|k| !k.is_empty())
                .ok_or_else(|| NotifyError::Config("resend backend needs resend_api_key".into()))?;
            Ok(Arc::new(ResendMailer::new(key, cfg.from.clone())))
        }
    }
}

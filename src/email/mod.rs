//! Email delivery.
//!
//! Jobs hand a recipient, a template id and template substitutions to a
//! [`Mailer`]. The SendGrid mailer delivers them; the log mailer only
//! records what would have been sent.

pub mod sendgrid;

pub use sendgrid::SendGridMailer;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::info;

/// One flat key/value record, e.g. a project row in the progress email.
pub type Record = BTreeMap<String, String>;

/// A template substitution value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateValue {
    Text(String),
    Records(Vec<Record>),
}

impl From<&str> for TemplateValue {
    fn from(value: &str) -> Self {
        TemplateValue::Text(value.to_string())
    }
}

impl From<String> for TemplateValue {
    fn from(value: String) -> Self {
        TemplateValue::Text(value)
    }
}

/// A templated email addressed to one recipient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub to_name: String,
    pub subject: String,
    pub template_id: String,
    pub substitutions: BTreeMap<String, TemplateValue>,
}

impl EmailMessage {
    pub fn new(
        to: impl Into<String>,
        to_name: impl Into<String>,
        subject: impl Into<String>,
        template_id: impl Into<String>,
    ) -> Self {
        Self {
            to: to.into(),
            to_name: to_name.into(),
            subject: subject.into(),
            template_id: template_id.into(),
            substitutions: BTreeMap::new(),
        }
    }

    /// Adds a substitution, replacing any previous value for `key`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<TemplateValue>) -> Self {
        self.substitutions.insert(key.into(), value.into());
        self
    }
}

/// Errors raised while delivering email.
#[derive(Debug, Error)]
pub enum EmailError {
    #[error("no email API key configured")]
    MissingApiKey,

    #[error("failed to reach email service: {0}")]
    Http(#[from] reqwest::Error),

    #[error("email service rejected message to {to} ({status}): {body}")]
    Rejected { to: String, status: u16, body: String },
}

/// Delivers templated email.
#[allow(async_fn_in_trait)]
pub trait Mailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError>;
}

/// Mailer used for dry runs: logs each message instead of sending it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        info!(
            "[dry-run] would send template {} ({}) to {}",
            message.template_id, message.subject, message.to
        );
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Keeps every message in memory; optionally rejects them all.
    #[derive(Debug, Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<EmailMessage>>,
        pub fail: bool,
    }

    impl RecordingMailer {
        pub fn failing() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        pub fn messages(&self) -> Vec<EmailMessage> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Mailer for RecordingMailer {
        async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
            if self.fail {
                return Err(EmailError::Rejected {
                    to: message.to.clone(),
                    status: 400,
                    body: "bad request".to_string(),
                });
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }
}

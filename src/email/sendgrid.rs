//! SendGrid v3 mail delivery.

use crate::config::EmailConfig;
use crate::email::{EmailError, EmailMessage, Mailer, TemplateValue};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error};

#[derive(Debug, Serialize)]
struct Address<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "is_blank")]
    name: &'a str,
}

fn is_blank(value: &&str) -> bool {
    value.is_empty()
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    to: Vec<Address<'a>>,
    dynamic_template_data: &'a BTreeMap<String, TemplateValue>,
}

/// Body of `POST /v3/mail/send`.
#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: Address<'a>,
    reply_to: Address<'a>,
    subject: &'a str,
    template_id: &'a str,
}

/// Sends templated mail through the SendGrid HTTP API.
pub struct SendGridMailer {
    config: EmailConfig,
    http_client: reqwest::Client,
}

impl SendGridMailer {
    pub fn new(config: EmailConfig) -> Result<Self, EmailError> {
        if config.api_key.is_empty() {
            return Err(EmailError::MissingApiKey);
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn request_body<'a>(&'a self, message: &'a EmailMessage) -> SendRequest<'a> {
        SendRequest {
            personalizations: vec![Personalization {
                to: vec![Address {
                    email: &message.to,
                    name: &message.to_name,
                }],
                dynamic_template_data: &message.substitutions,
            }],
            from: Address {
                email: &self.config.from_email,
                name: &self.config.from_name,
            },
            reply_to: Address {
                email: &self.config.reply_to,
                name: "",
            },
            subject: &message.subject,
            template_id: &message.template_id,
        }
    }
}

impl Mailer for SendGridMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        let url = format!("{}/v3/mail/send", self.config.api_url.trim_end_matches('/'));
        debug!("Sending template {} to {}", message.template_id, message.to);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(message))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            error!("SendGrid rejected message to {}: {} {}", message.to, status, body);
            return Err(EmailError::Rejected {
                to: message.to.clone(),
                status,
                body,
            });
        }

        Ok(())
    }
}

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::config::AppConfig;

#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    async fn send_welcome(&self, email: &str, name: &str) -> Result<()>;
}

pub struct HttpMailer {
    client: Client,
    endpoint: String,
    api_key: String,
    from: String,
}

impl HttpMailer {
    pub fn new(endpoint: String, api_key: String, from: String) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            api_key,
            from,
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send_welcome(&self, email: &str, name: &str) -> Result<()> {
        self.client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.from,
                "to": email,
                "subject": "Welcome to ResearchHub",
                "text": format!("Hi {name}, your ResearchHub account is ready."),
            }))
            .send()
            .await
            .context("email delivery request failed")?
            .error_for_status()
            .context("email delivery service rejected the message")?;
        Ok(())
    }
}

/// Used when no email API key is configured.
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send_welcome(&self, _email: &str, _name: &str) -> Result<()> {
        Ok(())
    }
}

pub fn from_config(config: &AppConfig) -> std::sync::Arc<dyn Mailer> {
    match (&config.email_api_key, &config.email_endpoint) {
        (Some(api_key), Some(endpoint)) => std::sync::Arc::new(HttpMailer::new(
            endpoint.clone(),
            api_key.clone(),
            config.email_from.clone(),
        )),
        _ => std::sync::Arc::new(DisabledMailer),
    }
}

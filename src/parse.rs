use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::AppConfig;

/// Extraction boundary for uploaded files. Implementations return `None`
/// when the format carries no text they can recover.
#[async_trait]
pub trait TextExtractor: Send + Sync + 'static {
    async fn extract(&self, bytes: &[u8], mime_type: &str) -> Result<Option<String>>;
}

/// Decodes `text/*` payloads locally and delegates everything else to the
/// configured parsing service when one is present.
pub struct HttpTextExtractor {
    client: Client,
    endpoint: Option<String>,
    api_key: Option<String>,
}

impl HttpTextExtractor {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            endpoint: config.parser_endpoint.clone(),
            api_key: config.parser_api_key.clone(),
        }
    }

    async fn extract_remote(&self, bytes: &[u8], mime_type: &str) -> Result<Option<String>> {
        let (Some(endpoint), Some(api_key)) = (self.endpoint.as_ref(), self.api_key.as_ref())
        else {
            return Ok(None);
        };

        #[derive(Deserialize)]
        struct ParseResponse {
            text: Option<String>,
        }

        let response: ParseResponse = self
            .client
            .post(endpoint)
            .bearer_auth(api_key)
            .header("content-type", mime_type.to_string())
            .body(bytes.to_vec())
            .send()
            .await
            .context("parsing service request failed")?
            .error_for_status()
            .context("parsing service rejected the document")?
            .json()
            .await
            .context("parsing service returned invalid JSON")?;

        Ok(response.text.filter(|text| !text.trim().is_empty()))
    }
}

#[async_trait]
impl TextExtractor for HttpTextExtractor {
    async fn extract(&self, bytes: &[u8], mime_type: &str) -> Result<Option<String>> {
        if mime_type.starts_with("text/") {
            let text = String::from_utf8_lossy(bytes).into_owned();
            if text.trim().is_empty() {
                return Ok(None);
            }
            return Ok(Some(text));
        }

        self.extract_remote(bytes, mime_type).await
    }
}

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::config::AppConfig;

pub const PROVIDER_GOOGLE: &str = "google";
pub const PROVIDER_GITHUB: &str = "github";

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("unknown provider '{0}'")]
    UnknownProvider(String),
    #[error("provider '{0}' is not configured")]
    ProviderNotConfigured(String),
    #[error("code exchange failed: {0}")]
    Exchange(String),
    #[error("provider returned no verified email")]
    MissingEmail,
}

/// Profile returned by a provider after a successful code exchange.
#[derive(Debug, Clone)]
pub struct OAuthProfile {
    pub email: String,
    pub name: String,
}

#[async_trait]
pub trait OAuthProviders: Send + Sync + 'static {
    async fn exchange_code(&self, provider: &str, code: &str) -> Result<OAuthProfile, OAuthError>;
}

struct ProviderCredentials {
    client_id: String,
    client_secret: String,
}

pub struct HttpOAuthProviders {
    client: Client,
    google: Option<ProviderCredentials>,
    github: Option<ProviderCredentials>,
}

impl HttpOAuthProviders {
    pub fn from_config(config: &AppConfig) -> Self {
        let google = match (&config.google_client_id, &config.google_client_secret) {
            (Some(id), Some(secret)) => Some(ProviderCredentials {
                client_id: id.clone(),
                client_secret: secret.clone(),
            }),
            _ => None,
        };
        let github = match (&config.github_client_id, &config.github_client_secret) {
            (Some(id), Some(secret)) => Some(ProviderCredentials {
                client_id: id.clone(),
                client_secret: secret.clone(),
            }),
            _ => None,
        };

        Self {
            client: Client::new(),
            google,
            github,
        }
    }

    async fn exchange_google(
        &self,
        credentials: &ProviderCredentials,
        code: &str,
    ) -> Result<OAuthProfile, OAuthError> {
        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
        }

        #[derive(Deserialize)]
        struct UserInfo {
            email: Option<String>,
            name: Option<String>,
        }

        let token: TokenResponse = self
            .client
            .post("https://oauth2.googleapis.com/token")
            .form(&[
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|err| OAuthError::Exchange(err.to_string()))?
            .error_for_status()
            .map_err(|err| OAuthError::Exchange(err.to_string()))?
            .json()
            .await
            .map_err(|err| OAuthError::Exchange(err.to_string()))?;

        let info: UserInfo = self
            .client
            .get("https://openidconnect.googleapis.com/v1/userinfo")
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|err| OAuthError::Exchange(err.to_string()))?
            .error_for_status()
            .map_err(|err| OAuthError::Exchange(err.to_string()))?
            .json()
            .await
            .map_err(|err| OAuthError::Exchange(err.to_string()))?;

        let email = info.email.ok_or(OAuthError::MissingEmail)?;
        let name = info.name.unwrap_or_else(|| email.clone());
        Ok(OAuthProfile { email, name })
    }

    async fn exchange_github(
        &self,
        credentials: &ProviderCredentials,
        code: &str,
    ) -> Result<OAuthProfile, OAuthError> {
        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
        }

        #[derive(Deserialize)]
        struct GithubUser {
            login: String,
            name: Option<String>,
            email: Option<String>,
        }

        let token: TokenResponse = self
            .client
            .post("https://github.com/login/oauth/access_token")
            .header("accept", "application/json")
            .form(&[
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("code", code),
            ])
            .send()
            .await
            .map_err(|err| OAuthError::Exchange(err.to_string()))?
            .error_for_status()
            .map_err(|err| OAuthError::Exchange(err.to_string()))?
            .json()
            .await
            .map_err(|err| OAuthError::Exchange(err.to_string()))?;

        let user: GithubUser = self
            .client
            .get("https://api.github.com/user")
            .header("user-agent", "researchhub")
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|err| OAuthError::Exchange(err.to_string()))?
            .error_for_status()
            .map_err(|err| OAuthError::Exchange(err.to_string()))?
            .json()
            .await
            .map_err(|err| OAuthError::Exchange(err.to_string()))?;

        let email = user.email.ok_or(OAuthError::MissingEmail)?;
        let name = user.name.unwrap_or(user.login);
        Ok(OAuthProfile { email, name })
    }
}

#[async_trait]
impl OAuthProviders for HttpOAuthProviders {
    async fn exchange_code(&self, provider: &str, code: &str) -> Result<OAuthProfile, OAuthError> {
        match provider {
            PROVIDER_GOOGLE => {
                let credentials = self
                    .google
                    .as_ref()
                    .ok_or_else(|| OAuthError::ProviderNotConfigured(provider.to_string()))?;
                self.exchange_google(credentials, code).await
            }
            PROVIDER_GITHUB => {
                let credentials = self
                    .github
                    .as_ref()
                    .ok_or_else(|| OAuthError::ProviderNotConfigured(provider.to_string()))?;
                self.exchange_github(credentials, code).await
            }
            other => Err(OAuthError::UnknownProvider(other.to_string())),
        }
    }
}

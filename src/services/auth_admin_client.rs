use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::AuthAdminSettings;

/// Ban length used to disable an account; the provider has no permanent ban
const DISABLED_BAN_DURATION: &str = "876000h";

#[derive(Error, Debug)]
pub enum AuthAdminError {
    #[error("Auth admin API is not configured")]
    NotConfigured,
    #[error("Auth admin request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Auth admin API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Auth admin response missing {0}")]
    MissingField(&'static str),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthProviderUser {
    pub id: Uuid,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateLinkResponse {
    #[serde(default)]
    action_link: Option<String>,
    #[serde(default)]
    properties: Option<LinkProperties>,
}

#[derive(Debug, Deserialize)]
struct LinkProperties {
    #[serde(default)]
    action_link: Option<String>,
}

/// Admin API of the managed auth provider (service-role key)
#[derive(Clone)]
pub struct AuthAdminClient {
    client: Client,
    base_url: String,
    service_key: String,
}

impl std::fmt::Debug for AuthAdminClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthAdminClient")
            .field("base_url", &self.base_url)
            .field("service_key", &"[REDACTED]")
            .finish()
    }
}

impl AuthAdminClient {
    pub fn new(settings: &AuthAdminSettings) -> Result<Self, AuthAdminError> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            service_key: settings.service_key.clone(),
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder, AuthAdminError> {
        if self.service_key.is_empty() {
            return Err(AuthAdminError::NotConfigured);
        }
        Ok(builder
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, AuthAdminError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        error!("Auth admin API error {}: {}", status, message);
        Err(AuthAdminError::Api {
            status: status.as_u16(),
            message,
        })
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<AuthProviderUser, AuthAdminError> {
        let request = self.authorized(
            self.client
                .get(format!("{}/admin/users/{}", self.base_url, user_id)),
        )?;
        let response = Self::check(request.send().await?).await?;
        Ok(response.json().await?)
    }

    /// Ban (`disabled = true`) or unban a user
    pub async fn set_disabled(&self, user_id: Uuid, disabled: bool) -> Result<(), AuthAdminError> {
        let ban_duration = if disabled { DISABLED_BAN_DURATION } else { "none" };
        let request = self.authorized(
            self.client
                .put(format!("{}/admin/users/{}", self.base_url, user_id))
                .json(&json!({ "ban_duration": ban_duration })),
        )?;
        Self::check(request.send().await?).await?;

        info!("Set auth user {} disabled={}", user_id, disabled);
        Ok(())
    }

    /// Delete the identity; a user already gone counts as deleted
    pub async fn delete_user(&self, user_id: Uuid) -> Result<(), AuthAdminError> {
        let request = self.authorized(
            self.client
                .delete(format!("{}/admin/users/{}", self.base_url, user_id)),
        )?;
        let response = request.send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            info!("Auth user {} already deleted", user_id);
            return Ok(());
        }
        Self::check(response).await?;

        info!("Deleted auth user {}", user_id);
        Ok(())
    }

    /// Generate a password recovery link for `email`
    pub async fn generate_recovery_link(
        &self,
        email: &str,
        redirect_to: &str,
    ) -> Result<String, AuthAdminError> {
        let request = self.authorized(
            self.client
                .post(format!("{}/admin/generate_link", self.base_url))
                .json(&json!({
                    "type": "recovery",
                    "email": email,
                    "redirect_to": redirect_to,
                })),
        )?;
        let response = Self::check(request.send().await?).await?;
        let body: GenerateLinkResponse = response.json().await?;

        body.action_link
            .or_else(|| body.properties.and_then(|p| p.action_link))
            .ok_or(AuthAdminError::MissingField("action_link"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_response_accepts_nested_properties() {
        let body: GenerateLinkResponse = serde_json::from_str(
            r#"{"properties":{"action_link":"https://auth.example.fr/verify?token=t"}}"#,
        )
        .unwrap();
        let link = body.action_link.or_else(|| body.properties.and_then(|p| p.action_link));
        assert_eq!(link.as_deref(), Some("https://auth.example.fr/verify?token=t"));
    }

    #[tokio::test]
    async fn test_unconfigured_client_refuses_calls() {
        let client = AuthAdminClient::new(&AuthAdminSettings {
            base_url: "http://localhost:9999".to_string(),
            service_key: String::new(),
        })
        .unwrap();

        let result = client.set_disabled(Uuid::new_v4(), true).await;
        assert!(matches!(result, Err(AuthAdminError::NotConfigured)));
    }
}

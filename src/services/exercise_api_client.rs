use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

use crate::config::ExerciseApiSettings;

#[derive(Error, Debug)]
pub enum ExerciseApiError {
    #[error("Exercise API is not configured")]
    NotConfigured,
    #[error("Exercise API request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Exercise API returned {0}")]
    Api(u16),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExerciseRecord {
    pub name: String,
    #[serde(rename = "gifUrl", default)]
    pub gif_url: Option<String>,
}

/// Client for the public exercise database
#[derive(Clone)]
pub struct ExerciseApiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for ExerciseApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExerciseApiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl ExerciseApiClient {
    pub fn new(settings: &ExerciseApiSettings) -> Result<Self, ExerciseApiError> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        })
    }

    /// Image URL of the best match for `name`, `None` when the database has no match
    pub async fn find_image(&self, name: &str) -> Result<Option<String>, ExerciseApiError> {
        if self.api_key.is_empty() {
            return Err(ExerciseApiError::NotConfigured);
        }

        let url = format!(
            "{}/exercises/name/{}?limit=1",
            self.base_url,
            urlencoding::encode(name)
        );
        debug!("Looking up exercise image for '{}'", name);

        let response = self
            .client
            .get(url)
            .header("X-RapidAPI-Key", &self.api_key)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let records: Vec<ExerciseRecord> = response.json().await?;
                Ok(records.into_iter().find_map(|r| r.gif_url.filter(|u| !u.is_empty())))
            }
            status => {
                error!("Exercise API error {} for '{}'", status, name);
                Err(ExerciseApiError::Api(status.as_u16()))
            }
        }
    }
}

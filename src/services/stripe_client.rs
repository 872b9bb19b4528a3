use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::error;

use crate::config::StripeSettings;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a webhook signature timestamp
pub const WEBHOOK_TOLERANCE_SECS: i64 = 300;

#[derive(Error, Debug)]
pub enum StripeError {
    #[error("Stripe is not configured")]
    NotConfigured,
    #[error("Stripe request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Stripe returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(&'static str),
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortalSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub customer: String,
    pub status: String,
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub items: Option<SubscriptionItems>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItems {
    pub data: Vec<SubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItem {
    pub price: Price,
    #[serde(default)]
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Price {
    pub id: String,
}

impl StripeSubscription {
    pub fn price_id(&self) -> Option<String> {
        self.items
            .as_ref()
            .and_then(|items| items.data.first())
            .map(|item| item.price.id.clone())
    }

    /// Newer API versions moved the period end onto subscription items
    pub fn period_end(&self) -> Option<DateTime<Utc>> {
        self.current_period_end
            .or_else(|| {
                self.items
                    .as_ref()
                    .and_then(|items| items.data.first())
                    .and_then(|item| item.current_period_end)
            })
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: Value,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: String,
}

/// Parameters for a subscription checkout
#[derive(Debug, Clone)]
pub struct CheckoutParams<'a> {
    pub user_id: &'a str,
    pub customer_id: Option<&'a str>,
    pub customer_email: Option<&'a str>,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
}

/// Minimal Stripe REST client (form-encoded requests, JSON responses)
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    api_base: String,
    secret_key: String,
    webhook_secret: String,
    price_id: String,
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("api_base", &self.api_base)
            .field("secret_key", &"[REDACTED]")
            .field("price_id", &self.price_id)
            .finish()
    }
}

impl StripeClient {
    pub fn new(settings: &StripeSettings) -> Result<Self, StripeError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            secret_key: settings.secret_key.clone(),
            webhook_secret: settings.webhook_secret.clone(),
            price_id: settings.price_id.clone(),
        })
    }

    fn ensure_configured(&self) -> Result<(), StripeError> {
        if self.secret_key.is_empty() {
            return Err(StripeError::NotConfigured);
        }
        Ok(())
    }

    async fn read<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, StripeError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<StripeErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            error!("Stripe API error {}: {}", status, message);
            return Err(StripeError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json::<T>().await?)
    }

    /// Create a subscription checkout session for the configured price
    pub async fn create_checkout_session(
        &self,
        params: CheckoutParams<'_>,
    ) -> Result<CheckoutSession, StripeError> {
        self.ensure_configured()?;

        let mut form: Vec<(&str, &str)> = vec![
            ("mode", "subscription"),
            ("line_items[0][price]", self.price_id.as_str()),
            ("line_items[0][quantity]", "1"),
            ("success_url", params.success_url),
            ("cancel_url", params.cancel_url),
            ("client_reference_id", params.user_id),
            ("metadata[user_id]", params.user_id),
            ("subscription_data[metadata][user_id]", params.user_id),
            ("allow_promotion_codes", "true"),
        ];
        match (params.customer_id, params.customer_email) {
            (Some(customer), _) => form.push(("customer", customer)),
            (None, Some(email)) => form.push(("customer_email", email)),
            (None, None) => {}
        }

        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await?;

        Self::read(response).await
    }

    /// Create a customer portal session
    pub async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, StripeError> {
        self.ensure_configured()?;

        let response = self
            .client
            .post(format!("{}/v1/billing_portal/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&[("customer", customer_id), ("return_url", return_url)])
            .send()
            .await?;

        Self::read(response).await
    }

    pub async fn get_subscription(&self, subscription_id: &str) -> Result<StripeSubscription, StripeError> {
        self.ensure_configured()?;

        let response = self
            .client
            .get(format!("{}/v1/subscriptions/{}", self.api_base, subscription_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        Self::read(response).await
    }

    /// Cancel a subscription immediately
    pub async fn cancel_subscription(&self, subscription_id: &str) -> Result<StripeSubscription, StripeError> {
        self.ensure_configured()?;

        let response = self
            .client
            .delete(format!("{}/v1/subscriptions/{}", self.api_base, subscription_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        Self::read(response).await
    }

    /// Verify the `Stripe-Signature` header and parse the event
    pub fn construct_event(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: i64,
    ) -> Result<StripeEvent, StripeError> {
        if self.webhook_secret.is_empty() {
            return Err(StripeError::NotConfigured);
        }
        verify_webhook_signature(payload, signature_header, &self.webhook_secret, now)?;
        serde_json::from_slice(payload).map_err(|e| StripeError::InvalidPayload(e.to_string()))
    }
}

/// Check a `t=...,v1=...` signature header against the raw request body
pub fn verify_webhook_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), StripeError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<Vec<u8>> = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            "v1" => {
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(StripeError::InvalidSignature("missing timestamp"))?;
    if signatures.is_empty() {
        return Err(StripeError::InvalidSignature("missing v1 signature"));
    }
    if now.abs_diff(timestamp) > WEBHOOK_TOLERANCE_SECS.unsigned_abs() {
        return Err(StripeError::InvalidSignature("timestamp outside tolerance"));
    }

    let matches = signatures.iter().any(|expected| {
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.verify_slice(expected).is_ok()
    });

    if matches {
        Ok(())
    } else {
        Err(StripeError::InvalidSignature("no matching signature"))
    }
}

/// Build a `Stripe-Signature` header value for a payload, as Stripe does
pub fn sign_webhook_payload(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, StripeError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| StripeError::InvalidSignature("invalid secret"))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const SECRET: &str = "whsec_test";

    #[test]
    fn test_valid_signature_is_accepted() {
        let payload = br#"{"id":"evt_1","type":"invoice.payment_failed","data":{"object":{}}}"#;
        let header = sign_webhook_payload(payload, SECRET, 1_700_000_000).unwrap();
        assert!(verify_webhook_signature(payload, &header, SECRET, 1_700_000_100).is_ok());
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let header = sign_webhook_payload(b"{\"a\":1}", SECRET, 1_700_000_000).unwrap();
        assert_matches!(
            verify_webhook_signature(b"{\"a\":2}", &header, SECRET, 1_700_000_000),
            Err(StripeError::InvalidSignature("no matching signature"))
        );
    }

    #[test]
    fn test_stale_timestamp_is_rejected() {
        let header = sign_webhook_payload(b"{}", SECRET, 1_700_000_000).unwrap();
        assert_matches!(
            verify_webhook_signature(b"{}", &header, SECRET, 1_700_000_000 + WEBHOOK_TOLERANCE_SECS + 1),
            Err(StripeError::InvalidSignature("timestamp outside tolerance"))
        );
    }

    #[test]
    fn test_extreme_timestamps_are_rejected_without_overflow() {
        for header in ["t=-9223372036854775808,v1=00", "t=9223372036854775807,v1=00"] {
            assert_matches!(
                verify_webhook_signature(b"{}", header, SECRET, 1_700_000_000),
                Err(StripeError::InvalidSignature("timestamp outside tolerance"))
            );
        }
    }

    #[test]
    fn test_header_without_v1_is_rejected() {
        assert_matches!(
            verify_webhook_signature(b"{}", "t=1700000000,v0=abc", SECRET, 1_700_000_000),
            Err(StripeError::InvalidSignature("missing v1 signature"))
        );
    }

    #[test]
    fn test_any_of_multiple_signatures_may_match() {
        let valid = sign_webhook_payload(b"{}", SECRET, 1_700_000_000).unwrap();
        let v1 = valid.split("v1=").nth(1).unwrap();
        let header = format!("t=1700000000,v1={},v1={}", "00".repeat(32), v1);
        assert!(verify_webhook_signature(b"{}", &header, SECRET, 1_700_000_000).is_ok());
    }

    #[test]
    fn test_period_end_falls_back_to_first_item() {
        let sub: StripeSubscription = serde_json::from_value(serde_json::json!({
            "id": "sub_1",
            "customer": "cus_1",
            "status": "active",
            "items": { "data": [ { "price": { "id": "price_1" }, "current_period_end": 1_800_000_000 } ] }
        }))
        .unwrap();

        assert_eq!(sub.price_id().as_deref(), Some("price_1"));
        assert_eq!(sub.period_end().unwrap().timestamp(), 1_800_000_000);
    }
}

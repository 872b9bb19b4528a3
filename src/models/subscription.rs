use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub status: String,
    pub price_id: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Active or trialing, and the paid period has not ended
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        let live_status = matches!(self.status.as_str(), "active" | "trialing");
        let in_period = self.current_period_end.map(|end| end > now).unwrap_or(true);
        live_status && in_period
    }
}

/// Outcome of the coach gating check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessDecision {
    Subscribed,
    FreeUse { remaining_after: i32 },
    Denied,
}

impl AccessDecision {
    pub fn decide(
        subscription: Option<&Subscription>,
        free_uses_consumed: i32,
        free_uses_allowed: i32,
        now: DateTime<Utc>,
    ) -> Self {
        if subscription.map(|s| s.is_active_at(now)).unwrap_or(false) {
            return AccessDecision::Subscribed;
        }
        if free_uses_consumed < free_uses_allowed {
            return AccessDecision::FreeUse {
                remaining_after: free_uses_allowed - free_uses_consumed - 1,
            };
        }
        AccessDecision::Denied
    }

    pub fn consumes_free_use(&self) -> bool {
        matches!(self, AccessDecision::FreeUse { .. })
    }
}

/// Fields copied from a Stripe subscription object into our row
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionSync {
    pub user_id: Uuid,
    pub stripe_customer_id: String,
    pub stripe_subscription_id: String,
    pub status: String,
    pub price_id: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
}

#[derive(Debug, Serialize)]
pub struct BillingStatusResponse {
    pub subscribed: bool,
    pub status: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub free_uses_remaining: i32,
}

#[derive(Debug, Serialize)]
pub struct RedirectUrlResponse {
    pub url: String,
}

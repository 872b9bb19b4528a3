use chrono::Utc;
use serde_json::Value;
use sqlx::PgPool;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::auth::AuthUser;
use crate::models::SubscriptionSync;
use crate::services::email_service::{templates, EmailService};
use crate::services::stripe_client::{CheckoutParams, StripeClient, StripeEvent, StripeSubscription};
use crate::services::{ProfileService, SubscriptionService};

/// Stripe events the webhook acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEventKind {
    CheckoutCompleted,
    SubscriptionChanged,
    SubscriptionDeleted,
    PaymentFailed,
}

impl WebhookEventKind {
    pub fn from_type(event_type: &str) -> Option<Self> {
        match event_type {
            "checkout.session.completed" => Some(Self::CheckoutCompleted),
            "customer.subscription.created" | "customer.subscription.updated" => {
                Some(Self::SubscriptionChanged)
            }
            "customer.subscription.deleted" => Some(Self::SubscriptionDeleted),
            "invoice.payment_failed" => Some(Self::PaymentFailed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Processed,
    Ignored,
}

/// Copy the fields we keep from a Stripe subscription
pub fn subscription_sync(user_id: Uuid, subscription: &StripeSubscription) -> SubscriptionSync {
    SubscriptionSync {
        user_id,
        stripe_customer_id: subscription.customer.clone(),
        stripe_subscription_id: subscription.id.clone(),
        status: subscription.status.clone(),
        price_id: subscription.price_id(),
        current_period_end: subscription.period_end(),
        cancel_at_period_end: subscription.cancel_at_period_end,
    }
}

fn str_field<'a>(object: &'a Value, key: &str) -> Option<&'a str> {
    object.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn parse_user_id(raw: Option<&str>) -> Option<Uuid> {
    raw.and_then(|s| Uuid::parse_str(s).ok())
}

pub struct BillingService {
    db: PgPool,
    stripe: StripeClient,
    email: EmailService,
    app_url: String,
    free_uses_allowed: i32,
}

impl BillingService {
    pub fn new(
        db: PgPool,
        stripe: StripeClient,
        email: EmailService,
        app_url: String,
        free_uses_allowed: i32,
    ) -> Self {
        Self {
            db,
            stripe,
            email,
            app_url,
            free_uses_allowed,
        }
    }

    fn subscriptions(&self) -> SubscriptionService {
        SubscriptionService::new(self.db.clone(), self.free_uses_allowed)
    }

    #[instrument(skip(self, user), fields(user_id = %user.user_id))]
    pub async fn create_checkout(&self, user: &AuthUser) -> Result<String, ApiError> {
        let existing = self.subscriptions().get_for_user(user.user_id).await?;
        if existing.as_ref().map(|s| s.is_active_at(Utc::now())).unwrap_or(false) {
            return Err(ApiError::Conflict(
                "Vous avez déjà un abonnement actif".to_string(),
            ));
        }

        let user_id = user.user_id.to_string();
        let success_url = format!("{}/abonnement?checkout=success", self.app_url);
        let cancel_url = format!("{}/abonnement?checkout=cancel", self.app_url);

        let session = self
            .stripe
            .create_checkout_session(CheckoutParams {
                user_id: &user_id,
                customer_id: existing.as_ref().and_then(|s| s.stripe_customer_id.as_deref()),
                customer_email: user.email.as_deref(),
                success_url: &success_url,
                cancel_url: &cancel_url,
            })
            .await?;

        info!("Created checkout session {}", session.id);
        session
            .url
            .ok_or_else(|| ApiError::Upstream("checkout session without url".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn create_portal(&self, user_id: Uuid) -> Result<String, ApiError> {
        let customer_id = self
            .subscriptions()
            .get_for_user(user_id)
            .await?
            .and_then(|s| s.stripe_customer_id)
            .ok_or(ApiError::NotFound("Client de facturation"))?;

        let return_url = format!("{}/abonnement", self.app_url);
        let session = self.stripe.create_portal_session(&customer_id, &return_url).await?;
        Ok(session.url)
    }

    /// Verify and apply a webhook delivery
    pub async fn handle_webhook(&self, payload: &[u8], signature: &str) -> Result<WebhookOutcome, ApiError> {
        let event = self
            .stripe
            .construct_event(payload, signature, Utc::now().timestamp())?;
        self.handle_event(&event).await
    }

    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn handle_event(&self, event: &StripeEvent) -> Result<WebhookOutcome, ApiError> {
        let Some(kind) = WebhookEventKind::from_type(&event.event_type) else {
            info!("Ignoring Stripe event");
            return Ok(WebhookOutcome::Ignored);
        };
        let object = &event.data.object;

        match kind {
            WebhookEventKind::CheckoutCompleted => self.on_checkout_completed(object).await,
            WebhookEventKind::SubscriptionChanged | WebhookEventKind::SubscriptionDeleted => {
                let subscription: StripeSubscription = serde_json::from_value(object.clone())
                    .map_err(|e| {
                        warn!("Unreadable subscription object: {}", e);
                        ApiError::invalid("abonnement illisible")
                    })?;
                self.on_subscription_event(&subscription).await
            }
            WebhookEventKind::PaymentFailed => {
                let Some(subscription_id) = str_field(object, "subscription") else {
                    return Ok(WebhookOutcome::Ignored);
                };
                let updated = self.subscriptions().mark_status(subscription_id, "past_due").await?;
                Ok(if updated { WebhookOutcome::Processed } else { WebhookOutcome::Ignored })
            }
        }
    }

    async fn on_checkout_completed(&self, session: &Value) -> Result<WebhookOutcome, ApiError> {
        let user_id = parse_user_id(str_field(session, "client_reference_id")).or_else(|| {
            parse_user_id(session.get("metadata").and_then(|m| str_field(m, "user_id")))
        });
        let Some(user_id) = user_id else {
            warn!("Checkout session without user reference");
            return Ok(WebhookOutcome::Ignored);
        };

        if let Some(customer_id) = str_field(session, "customer") {
            self.subscriptions().link_customer(user_id, customer_id).await?;
        }
        if let Some(subscription_id) = str_field(session, "subscription") {
            let subscription = self.stripe.get_subscription(subscription_id).await?;
            self.subscriptions()
                .upsert_from_sync(&subscription_sync(user_id, &subscription))
                .await?;
        }

        let profile = ProfileService::new(self.db.clone()).get_profile(user_id).await?;
        let recipient = profile
            .as_ref()
            .and_then(|p| p.email.clone())
            .or_else(|| {
                session
                    .get("customer_details")
                    .and_then(|d| str_field(d, "email"))
                    .map(str::to_string)
            });
        if let Some(recipient) = recipient {
            let first_name = profile.as_ref().and_then(|p| p.first_name.as_deref());
            self.email
                .send_best_effort(
                    &recipient,
                    &templates::subscription_confirmation(first_name, &self.app_url),
                )
                .await;
        }

        Ok(WebhookOutcome::Processed)
    }

    async fn on_subscription_event(&self, subscription: &StripeSubscription) -> Result<WebhookOutcome, ApiError> {
        let user_id = match parse_user_id(subscription.metadata.get("user_id").map(String::as_str)) {
            Some(user_id) => Some(user_id),
            None => self.subscriptions().user_for_customer(&subscription.customer).await?,
        };
        let Some(user_id) = user_id else {
            warn!("Subscription {} has no known user", subscription.id);
            return Ok(WebhookOutcome::Ignored);
        };

        self.subscriptions()
            .upsert_from_sync(&subscription_sync(user_id, subscription))
            .await?;
        Ok(WebhookOutcome::Processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_kinds() {
        assert_eq!(
            WebhookEventKind::from_type("customer.subscription.updated"),
            Some(WebhookEventKind::SubscriptionChanged)
        );
        assert_eq!(
            WebhookEventKind::from_type("invoice.payment_failed"),
            Some(WebhookEventKind::PaymentFailed)
        );
        assert_eq!(WebhookEventKind::from_type("charge.refunded"), None);
    }

    #[test]
    fn test_subscription_sync_copies_fields() {
        let user_id = Uuid::new_v4();
        let subscription: StripeSubscription = serde_json::from_value(json!({
            "id": "sub_9",
            "customer": "cus_9",
            "status": "trialing",
            "cancel_at_period_end": true,
            "current_period_end": 1_900_000_000,
            "items": { "data": [ { "price": { "id": "price_premium" } } ] }
        }))
        .unwrap();

        let sync = subscription_sync(user_id, &subscription);
        assert_eq!(sync.user_id, user_id);
        assert_eq!(sync.stripe_subscription_id, "sub_9");
        assert_eq!(sync.status, "trialing");
        assert_eq!(sync.price_id.as_deref(), Some("price_premium"));
        assert!(sync.cancel_at_period_end);
        assert_eq!(sync.current_period_end.unwrap().timestamp(), 1_900_000_000);
    }

    #[test]
    fn test_empty_string_fields_are_absent() {
        let object = json!({ "customer": "", "subscription": "sub_1" });
        assert_eq!(str_field(&object, "customer"), None);
        assert_eq!(str_field(&object, "subscription"), Some("sub_1"));
        assert_eq!(parse_user_id(Some("not-a-uuid")), None);
    }
}

use anyhow::Result;
use chrono::Utc;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{AccessDecision, BillingStatusResponse, Subscription, SubscriptionSync};
use crate::services::ProfileService;

#[derive(Clone)]
pub struct SubscriptionService {
    db: PgPool,
    free_uses_allowed: i32,
}

impl SubscriptionService {
    pub fn new(db: PgPool, free_uses_allowed: i32) -> Self {
        Self { db, free_uses_allowed }
    }

    pub async fn get_for_user(&self, user_id: Uuid) -> Result<Option<Subscription>> {
        let subscription =
            sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.db)
                .await?;

        Ok(subscription)
    }

    /// Decide whether the user may call a coach right now
    pub async fn check_access(&self, user_id: Uuid) -> Result<AccessDecision> {
        let subscription = self.get_for_user(user_id).await?;
        let consumed = ProfileService::new(self.db.clone())
            .free_uses_consumed(user_id)
            .await?;

        Ok(AccessDecision::decide(
            subscription.as_ref(),
            consumed,
            self.free_uses_allowed,
            Utc::now(),
        ))
    }

    /// Count the use against the free allowance when the decision requires it.
    /// `false` means a concurrent request spent the last free use first.
    pub async fn record_use(&self, user_id: Uuid, decision: AccessDecision) -> Result<bool> {
        if !decision.consumes_free_use() {
            return Ok(true);
        }
        ProfileService::new(self.db.clone())
            .record_free_use(user_id, self.free_uses_allowed)
            .await
    }

    pub async fn billing_status(&self, user_id: Uuid) -> Result<BillingStatusResponse> {
        let subscription = self.get_for_user(user_id).await?;
        let consumed = ProfileService::new(self.db.clone())
            .free_uses_consumed(user_id)
            .await?;

        let subscribed = subscription
            .as_ref()
            .map(|s| s.is_active_at(Utc::now()))
            .unwrap_or(false);

        Ok(BillingStatusResponse {
            subscribed,
            status: subscription.as_ref().map(|s| s.status.clone()),
            current_period_end: subscription.as_ref().and_then(|s| s.current_period_end),
            cancel_at_period_end: subscription.as_ref().map(|s| s.cancel_at_period_end).unwrap_or(false),
            free_uses_remaining: (self.free_uses_allowed - consumed).max(0),
        })
    }

    /// Store the customer id before the subscription exists
    pub async fn link_customer(&self, user_id: Uuid, customer_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (user_id, stripe_customer_id) VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET
                stripe_customer_id = EXCLUDED.stripe_customer_id,
                updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(customer_id)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Upsert the row of `sync.user_id` from a Stripe subscription object
    pub async fn upsert_from_sync(&self, sync: &SubscriptionSync) -> Result<Subscription> {
        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            INSERT INTO subscriptions (
                user_id, stripe_customer_id, stripe_subscription_id, status,
                price_id, current_period_end, cancel_at_period_end
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id) DO UPDATE SET
                stripe_customer_id = EXCLUDED.stripe_customer_id,
                stripe_subscription_id = EXCLUDED.stripe_subscription_id,
                status = EXCLUDED.status,
                price_id = COALESCE(EXCLUDED.price_id, subscriptions.price_id),
                current_period_end = EXCLUDED.current_period_end,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(sync.user_id)
        .bind(&sync.stripe_customer_id)
        .bind(&sync.stripe_subscription_id)
        .bind(&sync.status)
        .bind(sync.price_id.as_deref())
        .bind(sync.current_period_end)
        .bind(sync.cancel_at_period_end)
        .fetch_one(&self.db)
        .await?;

        info!(
            "Subscription {} of user {} is now {}",
            sync.stripe_subscription_id, sync.user_id, sync.status
        );
        Ok(subscription)
    }

    /// Update the status of a known Stripe subscription. Returns false when no row matches.
    pub async fn mark_status(&self, stripe_subscription_id: &str, status: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE subscriptions SET status = $2, updated_at = NOW() WHERE stripe_subscription_id = $1",
        )
        .bind(stripe_subscription_id)
        .bind(status)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            warn!("No subscription row for {}", stripe_subscription_id);
        }
        Ok(result.rows_affected() > 0)
    }

    pub async fn user_for_customer(&self, customer_id: &str) -> Result<Option<Uuid>> {
        let user_id: Option<Uuid> =
            sqlx::query_scalar("SELECT user_id FROM subscriptions WHERE stripe_customer_id = $1")
                .bind(customer_id)
                .fetch_optional(&self.db)
                .await?;

        Ok(user_id)
    }
}

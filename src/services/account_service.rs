use chrono::Utc;
use sqlx::PgPool;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::services::auth_admin_client::AuthAdminClient;
use crate::services::email_service::{templates, EmailService};
use crate::services::stripe_client::StripeClient;
use crate::services::{ProfileService, RoleService, SubscriptionService};

/// Word the user must type to confirm deletion
pub const DELETE_CONFIRMATION: &str = "SUPPRIMER";

/// Tables holding user rows, children first
const USER_TABLES: &[&str] = &[
    "feedback",
    "sessions",
    "weekly_programs",
    "weekly_checkins",
    "chat_messages",
    "conversations",
    "training_preferences",
    "goals",
    "subscriptions",
    "user_roles",
    "profiles",
];

pub fn check_confirmation(confirmation: &str) -> Result<(), ApiError> {
    if confirmation.trim() != DELETE_CONFIRMATION {
        return Err(ApiError::invalid(format!(
            "tapez {} pour confirmer la suppression",
            DELETE_CONFIRMATION
        )));
    }
    Ok(())
}

/// Removes a user everywhere: billing, database rows and identity
pub struct AccountService {
    db: PgPool,
    stripe: StripeClient,
    auth_admin: AuthAdminClient,
    email: EmailService,
}

impl AccountService {
    pub fn new(db: PgPool, stripe: StripeClient, auth_admin: AuthAdminClient, email: EmailService) -> Self {
        Self {
            db,
            stripe,
            auth_admin,
            email,
        }
    }

    /// Delete the caller's own account
    pub async fn delete_own_account(&self, user_id: Uuid, email: Option<&str>, confirmation: &str) -> Result<(), ApiError> {
        check_confirmation(confirmation)?;

        if RoleService::new(self.db.clone()).is_last_admin(user_id).await? {
            return Err(ApiError::Conflict(
                "Le dernier administrateur ne peut pas supprimer son compte".to_string(),
            ));
        }

        self.purge_user(user_id, email).await
    }

    /// Cancel billing, delete every row of the user, delete the identity and notify
    #[instrument(skip(self, fallback_email))]
    pub async fn purge_user(&self, user_id: Uuid, fallback_email: Option<&str>) -> Result<(), ApiError> {
        let profile = ProfileService::new(self.db.clone()).get_profile(user_id).await?;
        let recipient = profile
            .and_then(|p| p.email)
            .or_else(|| fallback_email.map(str::to_string));

        // free_uses_allowed is irrelevant here
        let subscription = SubscriptionService::new(self.db.clone(), 0)
            .get_for_user(user_id)
            .await?;
        if let Some(subscription) = subscription.filter(|s| s.is_active_at(Utc::now()) || s.status == "past_due") {
            if let Some(subscription_id) = subscription.stripe_subscription_id.as_deref() {
                self.stripe.cancel_subscription(subscription_id).await?;
                info!("Cancelled Stripe subscription {}", subscription_id);
            }
        }

        self.delete_rows(user_id).await?;
        self.auth_admin.delete_user(user_id).await?;

        if let Some(recipient) = recipient {
            self.email
                .send_best_effort(&recipient, &templates::account_deleted())
                .await;
        } else {
            warn!("No email address to confirm deletion of {}", user_id);
        }

        info!("Deleted account {}", user_id);
        Ok(())
    }

    async fn delete_rows(&self, user_id: Uuid) -> Result<(), ApiError> {
        let mut tx = self.db.begin().await?;
        for table in USER_TABLES {
            sqlx::query(&format!("DELETE FROM {} WHERE user_id = $1", table))
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_word() {
        assert!(check_confirmation("SUPPRIMER").is_ok());
        assert!(check_confirmation(" SUPPRIMER ").is_ok());
        assert!(check_confirmation("supprimer").is_err());
        assert!(check_confirmation("").is_err());
    }

    #[test]
    fn test_profiles_are_deleted_last() {
        assert_eq!(USER_TABLES.last(), Some(&"profiles"));
        let feedback = USER_TABLES.iter().position(|t| *t == "feedback").unwrap();
        let sessions = USER_TABLES.iter().position(|t| *t == "sessions").unwrap();
        assert!(feedback < sessions);
    }
}

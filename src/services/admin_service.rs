use serde_json::{json, Value};
use sqlx::PgPool;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::auth::AppRole;
use crate::models::{
    AdminAction, AdminActionRequest, AdminActionResponse, AdminStats, AdminUserRow, AdminUsersQuery,
    AuditLogEntry, AuditLogQuery,
};
use crate::services::account_service::AccountService;
use crate::services::auth_admin_client::AuthAdminClient;
use crate::services::email_service::{templates, EmailService};
use crate::services::stripe_client::StripeClient;
use crate::services::{ProfileService, RoleService};

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

pub fn page(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    (
        limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        offset.unwrap_or(0).max(0),
    )
}

/// Whether the action would remove an admin: disabling, deleting or demoting
fn removes_admin(action: AdminAction, role: Option<AppRole>) -> bool {
    match action {
        AdminAction::Disable | AdminAction::Delete => true,
        AdminAction::SetRole => role == Some(AppRole::User),
        AdminAction::Enable | AdminAction::ResetPassword => false,
    }
}

/// Reject actions an admin may not perform on `target`
pub fn check_action_guard(
    action: AdminAction,
    role: Option<AppRole>,
    acting_on_self: bool,
    target_is_last_admin: bool,
) -> Result<(), ApiError> {
    if action == AdminAction::SetRole && role.is_none() {
        return Err(ApiError::invalid("rôle manquant"));
    }
    if acting_on_self && removes_admin(action, role) {
        return Err(ApiError::invalid(
            "action impossible sur votre propre compte",
        ));
    }
    if target_is_last_admin && removes_admin(action, role) {
        return Err(ApiError::Conflict(
            "Impossible de retirer le dernier administrateur".to_string(),
        ));
    }
    Ok(())
}

pub struct AdminService {
    db: PgPool,
    auth_admin: AuthAdminClient,
    email: EmailService,
    stripe: StripeClient,
    app_url: String,
}

impl AdminService {
    pub fn new(
        db: PgPool,
        auth_admin: AuthAdminClient,
        email: EmailService,
        stripe: StripeClient,
        app_url: String,
    ) -> Self {
        Self {
            db,
            auth_admin,
            email,
            stripe,
            app_url,
        }
    }

    pub async fn stats(&self) -> Result<AdminStats, ApiError> {
        let row: (i64, i64, i64, i64, i64, i64, i64, Option<f64>) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM profiles),
                (SELECT COUNT(*) FROM profiles WHERE created_at >= NOW() - INTERVAL '7 days'),
                (SELECT COUNT(*) FROM profiles WHERE created_at >= NOW() - INTERVAL '30 days'),
                (SELECT COUNT(*) FROM subscriptions
                    WHERE status IN ('active', 'trialing')
                      AND (current_period_end IS NULL OR current_period_end > NOW())),
                (SELECT COUNT(*) FROM weekly_programs WHERE created_at >= NOW() - INTERVAL '7 days'),
                (SELECT COUNT(*) FROM chat_messages WHERE created_at >= NOW() - INTERVAL '7 days'),
                (SELECT COUNT(*) FROM sessions WHERE completed_at >= NOW() - INTERVAL '7 days'),
                (SELECT AVG(rating)::float8 FROM feedback)
            "#,
        )
        .fetch_one(&self.db)
        .await?;

        Ok(AdminStats {
            total_users: row.0,
            new_users_7d: row.1,
            new_users_30d: row.2,
            active_subscriptions: row.3,
            programs_generated_7d: row.4,
            chat_messages_7d: row.5,
            sessions_completed_7d: row.6,
            average_feedback_rating: row.7,
        })
    }

    pub async fn list_users(&self, query: &AdminUsersQuery) -> Result<Vec<AdminUserRow>, ApiError> {
        let (limit, offset) = page(query.limit, query.offset);
        let search = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")));

        let users = sqlx::query_as::<_, AdminUserRow>(
            r#"
            SELECT
                p.user_id, p.email, p.first_name, p.disabled, p.onboarding_completed,
                EXISTS (SELECT 1 FROM user_roles r WHERE r.user_id = p.user_id AND r.role = 'admin') AS is_admin,
                s.status AS subscription_status,
                p.created_at
            FROM profiles p
            LEFT JOIN subscriptions s ON s.user_id = p.user_id
            WHERE $1::text IS NULL OR p.email ILIKE $1 OR p.first_name ILIKE $1
            ORDER BY p.created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(search)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        Ok(users)
    }

    pub async fn list_audit(&self, query: &AuditLogQuery) -> Result<Vec<AuditLogEntry>, ApiError> {
        let (limit, offset) = page(query.limit, query.offset);
        let action = query.action.as_deref().map(str::trim).filter(|s| !s.is_empty());

        let entries = sqlx::query_as::<_, AuditLogEntry>(
            r#"
            SELECT * FROM admin_audit_log
            WHERE $1::text IS NULL OR action = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(action)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        Ok(entries)
    }

    async fn record_audit(&self, admin_id: Uuid, action: AdminAction, target: Uuid, details: Value) -> Result<(), ApiError> {
        sqlx::query(
            "INSERT INTO admin_audit_log (admin_id, action, target_user_id, details) VALUES ($1, $2, $3, $4)",
        )
        .bind(admin_id)
        .bind(action.as_str())
        .bind(target)
        .bind(details)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn target_email(&self, target: Uuid) -> Result<Option<String>, ApiError> {
        let profile_email = ProfileService::new(self.db.clone())
            .get_profile(target)
            .await?
            .and_then(|p| p.email);
        if profile_email.is_some() {
            return Ok(profile_email);
        }
        Ok(self.auth_admin.get_user(target).await?.email)
    }

    #[instrument(skip(self, request), fields(action = request.action.as_str()))]
    pub async fn perform_action(
        &self,
        admin_id: Uuid,
        target: Uuid,
        request: &AdminActionRequest,
    ) -> Result<AdminActionResponse, ApiError> {
        let roles = RoleService::new(self.db.clone());
        let target_is_last_admin = roles.is_last_admin(target).await?;
        check_action_guard(request.action, request.role, admin_id == target, target_is_last_admin)?;

        let profiles = ProfileService::new(self.db.clone());
        let (message, details) = match request.action {
            AdminAction::Disable => {
                self.auth_admin.set_disabled(target, true).await?;
                profiles.set_disabled(target, true).await?;
                ("Compte désactivé".to_string(), json!({}))
            }
            AdminAction::Enable => {
                self.auth_admin.set_disabled(target, false).await?;
                profiles.set_disabled(target, false).await?;
                ("Compte réactivé".to_string(), json!({}))
            }
            AdminAction::Delete => {
                let email = self.target_email(target).await.ok().flatten();
                AccountService::new(
                    self.db.clone(),
                    self.stripe.clone(),
                    self.auth_admin.clone(),
                    self.email.clone(),
                )
                .purge_user(target, email.as_deref())
                .await?;
                ("Compte supprimé".to_string(), json!({ "email": email }))
            }
            AdminAction::ResetPassword => {
                let email = self
                    .target_email(target)
                    .await?
                    .ok_or(ApiError::NotFound("Adresse e-mail"))?;
                let redirect_to = format!("{}/reset-password", self.app_url);
                let link = self
                    .auth_admin
                    .generate_recovery_link(&email, &redirect_to)
                    .await?;
                self.email
                    .send(&email, &templates::password_recovery(&link))
                    .await?;
                ("E-mail de réinitialisation envoyé".to_string(), json!({ "email": email }))
            }
            AdminAction::SetRole => {
                let role = request.role.ok_or_else(|| ApiError::invalid("rôle manquant"))?;
                roles.set_role(target, role).await?;
                (
                    format!("Rôle mis à jour : {}", role.as_str()),
                    json!({ "role": role.as_str() }),
                )
            }
        };

        self.record_audit(admin_id, request.action, target, details).await?;
        info!("Admin {} performed {} on {}", admin_id, request.action.as_str(), target);

        Ok(AdminActionResponse {
            success: true,
            action: request.action,
            target_user_id: target,
            message,
        })
    }
}

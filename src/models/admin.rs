use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub admin_id: Uuid,
    pub action: String,
    pub target_user_id: Option<Uuid>,
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminAction {
    Disable,
    Enable,
    Delete,
    ResetPassword,
    SetRole,
}

impl AdminAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminAction::Disable => "disable",
            AdminAction::Enable => "enable",
            AdminAction::Delete => "delete",
            AdminAction::ResetPassword => "reset_password",
            AdminAction::SetRole => "set_role",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AdminActionRequest {
    pub action: AdminAction,
    /// Required for `set_role`
    pub role: Option<crate::auth::AppRole>,
}

#[derive(Debug, Serialize)]
pub struct AdminActionResponse {
    pub success: bool,
    pub action: AdminAction,
    pub target_user_id: Uuid,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AdminStats {
    pub total_users: i64,
    pub new_users_7d: i64,
    pub new_users_30d: i64,
    pub active_subscriptions: i64,
    pub programs_generated_7d: i64,
    pub chat_messages_7d: i64,
    pub sessions_completed_7d: i64,
    pub average_feedback_rating: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AdminUserRow {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub disabled: bool,
    pub onboarding_completed: bool,
    pub is_admin: bool,
    pub subscription_status: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct AdminUsersQuery {
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AuditLogQuery {
    pub action: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

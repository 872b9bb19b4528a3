use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use axum_extra::extract::WithRejection;
use uuid::Uuid;

use super::error::ApiError;
use crate::auth::AdminUser;
use crate::models::{
    AdminActionRequest, AdminActionResponse, AdminStats, AdminUserRow, AdminUsersQuery,
    AuditLogEntry, AuditLogQuery,
};
use crate::state::AppState;

/// Admin endpoints; every handler requires the admin role
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/stats", get(get_stats))
        .route("/users", get(list_users))
        .route("/users/:user_id/actions", post(perform_action))
        .route("/audit", get(list_audit))
}

async fn get_stats(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<AdminStats>, ApiError> {
    Ok(Json(state.admin_service().stats().await?))
}

async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    WithRejection(Query(query), _): WithRejection<Query<AdminUsersQuery>, ApiError>,
) -> Result<Json<Vec<AdminUserRow>>, ApiError> {
    Ok(Json(state.admin_service().list_users(&query).await?))
}

async fn list_audit(
    State(state): State<AppState>,
    _admin: AdminUser,
    WithRejection(Query(query), _): WithRejection<Query<AuditLogQuery>, ApiError>,
) -> Result<Json<Vec<AuditLogEntry>>, ApiError> {
    Ok(Json(state.admin_service().list_audit(&query).await?))
}

#[tracing::instrument(skip(state, admin, request), fields(admin_id = %admin.user_id))]
async fn perform_action(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    WithRejection(Path(target), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Json(request), _): WithRejection<Json<AdminActionRequest>, ApiError>,
) -> Result<Json<AdminActionResponse>, ApiError> {
    let response = state
        .admin_service()
        .perform_action(admin.user_id, target, &request)
        .await?;
    Ok(Json(response))
}

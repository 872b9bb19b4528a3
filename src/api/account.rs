use axum::{extract::State, http::StatusCode, routing::delete, Json, Router};
use axum_extra::extract::WithRejection;
use serde::Deserialize;

use super::error::ApiError;
use crate::auth::AuthUser;
use crate::services::account_service::check_confirmation;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DeleteAccountRequest {
    pub confirmation: String,
}

pub fn account_routes() -> Router<AppState> {
    Router::new().route("/", delete(delete_account))
}

/// Permanently delete the caller's account
#[tracing::instrument(skip(state, user, request), fields(user_id = %user.user_id))]
async fn delete_account(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Json(request), _): WithRejection<Json<DeleteAccountRequest>, ApiError>,
) -> Result<StatusCode, ApiError> {
    check_confirmation(&request.confirmation)?;

    state
        .account_service()
        .delete_own_account(user.user_id, user.email.as_deref(), &request.confirmation)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

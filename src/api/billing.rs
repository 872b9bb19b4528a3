use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};

use super::error::ApiError;
use crate::auth::AuthUser;
use crate::models::{BillingStatusResponse, RedirectUrlResponse};
use crate::services::billing_service::WebhookOutcome;
use crate::services::SubscriptionService;
use crate::state::AppState;

pub fn billing_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(billing_status))
        .route("/checkout", post(create_checkout))
        .route("/portal", post(create_portal))
        .route("/webhook", post(stripe_webhook))
}

async fn billing_status(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<BillingStatusResponse>, ApiError> {
    let status = SubscriptionService::new(state.db.clone(), state.free_uses())
        .billing_status(user.user_id)
        .await?;
    Ok(Json(status))
}

async fn create_checkout(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<RedirectUrlResponse>, ApiError> {
    let url = state.billing_service().create_checkout(&user).await?;
    Ok(Json(RedirectUrlResponse { url }))
}

async fn create_portal(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<RedirectUrlResponse>, ApiError> {
    let url = state.billing_service().create_portal(user.user_id).await?;
    Ok(Json(RedirectUrlResponse { url }))
}

/// Stripe webhook; authenticated by the signature, not by a bearer token
#[tracing::instrument(skip(state, headers, body))]
async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::invalid("en-tête Stripe-Signature manquant"))?;

    let outcome = state.billing_service().handle_webhook(&body, signature).await?;
    Ok(Json(json!({
        "received": true,
        "processed": outcome == WebhookOutcome::Processed,
    })))
}

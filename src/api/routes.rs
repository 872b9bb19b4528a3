use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use super::account::account_routes;
use super::admin::admin_routes;
use super::billing::billing_routes;
use super::chat::chat_routes;
use super::exercises::{exercises_routes, public_routes};
use super::health::health_check;
use super::profile::profile_routes;
use super::programs::programs_routes;
use super::sessions::{checkins_routes, sessions_routes};
use crate::auth::{cors_layer, security_headers_layer};
use crate::state::AppState;

pub fn create_routes(state: AppState) -> Router {
    let api_v1 = Router::new()
        .nest("/profile", profile_routes())
        .nest("/sessions", sessions_routes())
        .nest("/checkins", checkins_routes())
        .nest("/programs", programs_routes())
        .nest("/chat", chat_routes())
        .nest("/billing", billing_routes())
        .nest("/account", account_routes())
        .nest("/admin", admin_routes())
        .nest("/exercises", exercises_routes())
        .nest("/public", public_routes());

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_v1)
        .layer(TraceLayer::new_for_http())
        .layer(security_headers_layer())
        .layer(cors_layer())
        .with_state(state)
}

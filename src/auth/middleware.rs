use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderName},
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};

use crate::auth::{AdminUser, AppRole, AuthError, AuthUser};
use crate::services::RoleService;
use crate::state::AppState;

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AuthError::MissingAuthHeader)?;

        state.jwt.authenticate(bearer.token())
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;

        let is_admin = RoleService::new(state.db.clone())
            .has_role(user.user_id, AppRole::Admin)
            .await?;
        if !is_admin {
            tracing::warn!(user_id = %user.user_id, "Non-admin attempted an admin route");
            return Err(AuthError::InsufficientPermissions);
        }

        Ok(AdminUser(user))
    }
}

/// CORS configuration for the browser front-end
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Security headers middleware
pub fn security_headers_layer() -> tower_http::set_header::SetResponseHeaderLayer<axum::http::HeaderValue> {
    tower_http::set_header::SetResponseHeaderLayer::overriding(
        HeaderName::from_static("x-content-type-options"),
        axum::http::HeaderValue::from_static("nosniff"),
    )
}

/// Sliding-window rate limiter keyed by caller, kept in memory
#[derive(Debug, Clone)]
pub struct RateLimiter {
    requests: Arc<Mutex<HashMap<String, Vec<Instant>>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            requests: Arc::new(Mutex::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    pub fn check_rate_limit(&self, key: &str) -> bool {
        let mut requests = self
            .requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();

        // Expire old requests for every caller so idle keys do not pile up
        requests.retain(|_, times| {
            times.retain(|&time| now.duration_since(time) < self.window);
            !times.is_empty()
        });

        let entry = requests.entry(key.to_string()).or_default();
        if entry.len() >= self.max_requests {
            return false;
        }

        entry.push(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));

        // First 3 requests should succeed
        assert!(limiter.check_rate_limit("chat:client1"));
        assert!(limiter.check_rate_limit("chat:client1"));
        assert!(limiter.check_rate_limit("chat:client1"));

        // 4th request should fail
        assert!(!limiter.check_rate_limit("chat:client1"));

        // Different client should succeed
        assert!(limiter.check_rate_limit("chat:client2"));
    }

    #[test]
    fn test_rate_limiter_window_expires() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));

        assert!(limiter.check_rate_limit("program:u1"));
        assert!(!limiter.check_rate_limit("program:u1"));

        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.check_rate_limit("program:u1"));
    }

    #[test]
    fn test_rate_limiter_forgets_idle_callers() {
        let limiter = RateLimiter::new(5, Duration::from_millis(20));

        assert!(limiter.check_rate_limit("chat:a"));
        assert!(limiter.check_rate_limit("chat:b"));
        assert_eq!(limiter.requests.lock().unwrap().len(), 2);

        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.check_rate_limit("chat:c"));
        assert_eq!(limiter.requests.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_app_role_parsing() {
        assert_eq!(AppRole::from_str("ADMIN"), Some(AppRole::Admin));
        assert_eq!(AppRole::from_str("user"), Some(AppRole::User));
        assert_eq!(AppRole::from_str("coach"), None);
    }
}

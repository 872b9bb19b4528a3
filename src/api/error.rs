use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::llm::LlmError;
use crate::services::auth_admin_client::AuthAdminError;
use crate::services::email_service::EmailError;
use crate::services::exercise_api_client::ExerciseApiError;
use crate::services::stripe_client::StripeError;

/// Errors surfaced by HTTP handlers.
///
/// Each variant maps to a status code and a user-facing French message;
/// internal details are logged and never sent to the client.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Authentication required")]
    Unauthenticated,
    #[error("Forbidden")]
    Forbidden,
    #[error("Subscription required")]
    SubscriptionRequired,
    #[error("Not found: {0}")]
    NotFound(&'static str),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Rate limit exceeded")]
    RateLimited,
    #[error("Upstream service error: {0}")]
    Upstream(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error_code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden | ApiError::SubscriptionRequired => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "INVALID_REQUEST",
            ApiError::Unauthenticated => "UNAUTHENTICATED",
            ApiError::Forbidden => "FORBIDDEN",
            ApiError::SubscriptionRequired => "SUBSCRIPTION_REQUIRED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::RateLimited => "RATE_LIMITED",
            ApiError::Upstream(_) => "UPSTREAM_ERROR",
            ApiError::Database(_) | ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message shown to the end user
    pub fn user_message(&self) -> String {
        match self {
            ApiError::InvalidRequest(detail) => format!("Requête invalide : {}", detail),
            ApiError::Unauthenticated => "Authentification requise".to_string(),
            ApiError::Forbidden => "Accès refusé".to_string(),
            ApiError::SubscriptionRequired => {
                "Un abonnement actif est nécessaire pour continuer".to_string()
            }
            ApiError::NotFound(what) => format!("{} introuvable", what),
            ApiError::Conflict(detail) => detail.clone(),
            ApiError::RateLimited => "Trop de requêtes, réessayez dans un instant".to_string(),
            ApiError::Upstream(_) => "Le service externe est indisponible, réessayez plus tard".to_string(),
            ApiError::Database(_) | ApiError::Internal(_) => {
                "Une erreur interne est survenue".to_string()
            }
        }
    }

    pub fn invalid(detail: impl Into<String>) -> Self {
        ApiError::InvalidRequest(detail.into())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .keys()
            .map(|field| field.to_string())
            .collect();
        fields.sort_unstable();
        ApiError::InvalidRequest(format!("champs invalides ({})", fields.join(", ")))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!("JSON body rejected: {}", rejection.body_text());
        ApiError::invalid("corps JSON invalide")
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        tracing::debug!("Query string rejected: {}", rejection.body_text());
        ApiError::invalid("paramètres invalides")
    }
}

impl From<PathRejection> for ApiError {
    fn from(_: PathRejection) -> Self {
        ApiError::invalid("identifiant invalide")
    }
}

impl From<LlmError> for ApiError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::RateLimited => ApiError::RateLimited,
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

impl From<StripeError> for ApiError {
    fn from(err: StripeError) -> Self {
        match err {
            StripeError::InvalidSignature(reason) => {
                tracing::warn!("Webhook signature rejected: {}", reason);
                ApiError::invalid("signature invalide")
            }
            StripeError::InvalidPayload(_) => ApiError::invalid("contenu de l'événement illisible"),
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

impl From<AuthAdminError> for ApiError {
    fn from(err: AuthAdminError) -> Self {
        ApiError::Upstream(err.to_string())
    }
}

impl From<EmailError> for ApiError {
    fn from(err: EmailError) -> Self {
        ApiError::Upstream(err.to_string())
    }
}

impl From<ExerciseApiError> for ApiError {
    fn from(err: ExerciseApiError) -> Self {
        ApiError::Upstream(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        let body = Json(ErrorBody {
            error_code: self.error_code(),
            message: self.user_message(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::invalid("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::SubscriptionRequired.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound("Séance").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Upstream("boom".to_string()).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_internal_details_are_not_exposed() {
        let err = ApiError::Internal(anyhow::anyhow!("connection refused on 10.0.0.3"));
        assert_eq!(err.user_message(), "Une erreur interne est survenue");
        assert_eq!(err.error_code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_llm_rate_limit_maps_to_429() {
        let err: ApiError = LlmError::RateLimited.into();
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_bad_webhook_signature_is_a_client_error() {
        let err: ApiError = StripeError::InvalidSignature("no matching signature").into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let err: ApiError = StripeError::NotConfigured.into();
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_rejection_details_stay_out_of_the_message() {
        let err: ApiError = StripeError::InvalidSignature("timestamp outside tolerance").into();
        assert_eq!(err.user_message(), "Requête invalide : signature invalide");
    }

    #[test]
    fn test_not_found_message_is_french() {
        assert_eq!(ApiError::NotFound("Conversation").user_message(), "Conversation introuvable");
    }
}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::error::ApiError;
use crate::auth::AuthUser;
use crate::models::{Feedback, Session, SessionQuery, SubmitFeedbackRequest, WeeklyCheckin, WeeklyCheckinRequest};
use crate::services::session_service::is_monday;
use crate::services::SessionService;
use crate::state::AppState;

pub fn sessions_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_sessions))
        .route("/:session_id/complete", post(complete_session))
        .route("/:session_id/feedback", post(submit_feedback))
}

pub fn checkins_routes() -> Router<AppState> {
    Router::new().route("/", get(list_checkins).post(upsert_checkin))
}

async fn list_sessions(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Query(query), _): WithRejection<Query<SessionQuery>, ApiError>,
) -> Result<Json<Vec<Session>>, ApiError> {
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return Err(ApiError::invalid("la date de début est après la date de fin"));
        }
    }

    let sessions = SessionService::new(state.db.clone())
        .list_sessions(user.user_id, query.from, query.to)
        .await?;
    Ok(Json(sessions))
}

#[tracing::instrument(skip(state, user), fields(user_id = %user.user_id))]
async fn complete_session(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Path(session_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<Json<Session>, ApiError> {
    SessionService::new(state.db.clone())
        .complete_session(user.user_id, session_id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("Séance"))
}

#[tracing::instrument(skip(state, user, request), fields(user_id = %user.user_id))]
async fn submit_feedback(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Path(session_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Json(request), _): WithRejection<Json<SubmitFeedbackRequest>, ApiError>,
) -> Result<(StatusCode, Json<Feedback>), ApiError> {
    request.validate()?;

    let feedback = SessionService::new(state.db.clone())
        .submit_feedback(user.user_id, session_id, &request)
        .await?
        .ok_or(ApiError::NotFound("Séance"))?;
    Ok((StatusCode::CREATED, Json(feedback)))
}

#[derive(Debug, Deserialize)]
struct CheckinListQuery {
    limit: Option<i64>,
}

async fn list_checkins(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Query(query), _): WithRejection<Query<CheckinListQuery>, ApiError>,
) -> Result<Json<Vec<WeeklyCheckin>>, ApiError> {
    let limit = query.limit.unwrap_or(12).clamp(1, 52);
    let checkins = SessionService::new(state.db.clone())
        .list_checkins(user.user_id, limit)
        .await?;
    Ok(Json(checkins))
}

#[tracing::instrument(skip(state, user, request), fields(user_id = %user.user_id))]
async fn upsert_checkin(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Json(request), _): WithRejection<Json<WeeklyCheckinRequest>, ApiError>,
) -> Result<Json<WeeklyCheckin>, ApiError> {
    request.validate()?;
    if !is_monday(request.week_start) {
        return Err(ApiError::invalid("la semaine doit commencer un lundi"));
    }

    let checkin = SessionService::new(state.db.clone())
        .upsert_checkin(user.user_id, &request)
        .await?;
    Ok(Json(checkin))
}

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use axum_extra::extract::WithRejection;
use validator::Validate;

use super::error::ApiError;
use crate::auth::AuthUser;
use crate::models::{
    Goal, Profile, ProfileResponse, SetGoalRequest, TrainingPreferences, UpdatePreferencesRequest,
    UpsertProfileRequest,
};
use crate::services::ProfileService;
use crate::state::AppState;

pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_profile).put(upsert_profile))
        .route("/goal", get(get_goal).put(set_goal))
        .route("/preferences", get(get_preferences).put(update_preferences))
        .route("/onboarding/complete", post(complete_onboarding))
}

/// Profile, active goal and preferences in one call
#[tracing::instrument(skip(state, user), fields(user_id = %user.user_id))]
async fn get_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ProfileResponse>, ApiError> {
    let service = ProfileService::new(state.db.clone());
    let (profile, goal, preferences) = tokio::try_join!(
        service.get_profile(user.user_id),
        service.get_active_goal(user.user_id),
        service.get_preferences(user.user_id),
    )?;

    Ok(Json(ProfileResponse {
        profile,
        goal,
        preferences,
    }))
}

#[tracing::instrument(skip(state, user, request), fields(user_id = %user.user_id))]
async fn upsert_profile(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Json(request), _): WithRejection<Json<UpsertProfileRequest>, ApiError>,
) -> Result<Json<Profile>, ApiError> {
    request.validate()?;
    if request.first_name.as_deref().map(|n| n.trim().is_empty()).unwrap_or(false) {
        return Err(ApiError::invalid("le prénom est vide"));
    }

    let profile = ProfileService::new(state.db.clone())
        .upsert_profile(user.user_id, user.email.as_deref(), &request)
        .await?;
    Ok(Json(profile))
}

async fn get_goal(State(state): State<AppState>, user: AuthUser) -> Result<Json<Goal>, ApiError> {
    ProfileService::new(state.db.clone())
        .get_active_goal(user.user_id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("Objectif"))
}

#[tracing::instrument(skip(state, user, request), fields(user_id = %user.user_id))]
async fn set_goal(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Json(request), _): WithRejection<Json<SetGoalRequest>, ApiError>,
) -> Result<Json<Goal>, ApiError> {
    request.validate()?;

    let goal = ProfileService::new(state.db.clone())
        .set_goal(user.user_id, &request)
        .await?;
    Ok(Json(goal))
}

async fn get_preferences(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<TrainingPreferences>, ApiError> {
    ProfileService::new(state.db.clone())
        .get_preferences(user.user_id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("Préférences d'entraînement"))
}

#[tracing::instrument(skip(state, user, request), fields(user_id = %user.user_id))]
async fn update_preferences(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Json(request), _): WithRejection<Json<UpdatePreferencesRequest>, ApiError>,
) -> Result<Json<TrainingPreferences>, ApiError> {
    request.validate()?;

    let preferences = ProfileService::new(state.db.clone())
        .upsert_preferences(user.user_id, &request)
        .await?;
    Ok(Json(preferences))
}

#[tracing::instrument(skip(state, user), fields(user_id = %user.user_id))]
async fn complete_onboarding(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Profile>, ApiError> {
    ProfileService::new(state.db.clone())
        .complete_onboarding(user.user_id, user.email.as_deref())
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::invalid("objectif et préférences requis avant de terminer l'inscription"))
}

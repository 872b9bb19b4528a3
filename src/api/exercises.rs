use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use axum_extra::extract::WithRejection;

use super::error::ApiError;
use crate::auth::AuthUser;
use crate::models::{ExerciseImageQuery, ExerciseImageResponse, PublicStats};
use crate::services::exercise_image_service::normalize_exercise_name;
use crate::services::StatsService;
use crate::state::AppState;

pub fn exercises_routes() -> Router<AppState> {
    Router::new().route("/image", get(exercise_image))
}

pub fn public_routes() -> Router<AppState> {
    Router::new().route("/stats", get(public_stats))
}

async fn exercise_image(
    State(state): State<AppState>,
    _user: AuthUser,
    WithRejection(Query(query), _): WithRejection<Query<ExerciseImageQuery>, ApiError>,
) -> Result<Json<ExerciseImageResponse>, ApiError> {
    if normalize_exercise_name(&query.name).is_none() {
        return Err(ApiError::invalid("nom d'exercice invalide"));
    }

    let image = state.exercise_image_service().image_for(&query.name).await?;
    Ok(Json(image))
}

/// Landing page figures, no authentication
async fn public_stats(State(state): State<AppState>) -> Result<Json<PublicStats>, ApiError> {
    let stats = StatsService::new(state.db.clone()).get_public_stats().await?;
    Ok(Json(stats))
}

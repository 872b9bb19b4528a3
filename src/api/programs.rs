use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use axum_extra::extract::WithRejection;
use uuid::Uuid;

use super::error::ApiError;
use crate::auth::AuthUser;
use crate::models::{GenerateProgramRequest, ProgramResponse, WeeklyProgram};
use crate::state::AppState;

pub fn programs_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_programs))
        .route("/generate", post(generate_program))
        .route("/:program_id", get(get_program))
}

/// The body is optional: an empty body generates next week's program
fn parse_generate_request(body: &[u8]) -> Result<GenerateProgramRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(GenerateProgramRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!("Generate request body rejected: {}", e);
        ApiError::invalid("corps JSON invalide")
    })
}

#[tracing::instrument(skip(state, user, body), fields(user_id = %user.user_id))]
async fn generate_program(
    State(state): State<AppState>,
    user: AuthUser,
    body: Bytes,
) -> Result<(StatusCode, Json<ProgramResponse>), ApiError> {
    let request = parse_generate_request(&body)?;

    if !state
        .rate_limiter
        .check_rate_limit(&format!("program:{}", user.user_id))
    {
        return Err(ApiError::RateLimited);
    }

    let program = state.program_service().generate(user.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(program)))
}

async fn list_programs(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<WeeklyProgram>>, ApiError> {
    let programs = state.program_service().list_programs(user.user_id).await?;
    Ok(Json(programs))
}

async fn get_program(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Path(program_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<Json<ProgramResponse>, ApiError> {
    let program = state
        .program_service()
        .get_program(user.user_id, program_id)
        .await?;
    Ok(Json(program))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_empty_body_means_defaults() {
        assert!(parse_generate_request(b"").unwrap().week_start.is_none());
        assert!(parse_generate_request(b" \n").unwrap().week_start.is_none());
    }

    #[test]
    fn test_week_start_is_parsed() {
        let request = parse_generate_request(br#"{"week_start":"2024-06-10"}"#).unwrap();
        assert_eq!(request.week_start, NaiveDate::from_ymd_opt(2024, 6, 10));
        let err = parse_generate_request(b"{nope").unwrap_err();
        assert_eq!(err.user_message(), "Requête invalide : corps JSON invalide");
    }
}

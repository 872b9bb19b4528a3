use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExerciseImageCacheEntry {
    pub exercise_name: String,
    pub image_url: Option<String>,
    pub source: String,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExerciseImageResponse {
    pub exercise_name: String,
    pub image_url: Option<String>,
    pub cached: bool,
}

#[derive(Debug, Deserialize)]
pub struct ExerciseImageQuery {
    pub name: String,
}

/// Figures shown on the public landing page
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PublicStats {
    pub members: i64,
    pub programs_generated: i64,
    pub sessions_completed: i64,
    pub updated_at: Option<DateTime<Utc>>,
}

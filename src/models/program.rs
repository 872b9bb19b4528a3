use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::Session;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WeeklyProgram {
    pub id: Uuid,
    pub user_id: Uuid,
    pub week_start: NaiveDate,
    pub goal_type: String,
    pub sessions_requested: i32,
    pub sessions_generated: i32,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateProgramRequest {
    pub week_start: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct ProgramResponse {
    pub program: WeeklyProgram,
    pub sessions: Vec<Session>,
}

/// Structured session returned by the LLM for one slot of the week
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedSessionPlan {
    pub title: String,
    #[serde(default)]
    pub focus: Option<String>,
    #[serde(default)]
    pub warmup: Vec<String>,
    pub exercises: Vec<PlannedExercise>,
    #[serde(default)]
    pub cooldown: Vec<String>,
    #[serde(default)]
    pub estimated_minutes: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedExercise {
    pub name: String,
    #[serde(default)]
    pub sets: Option<u32>,
    /// Free text: "10", "8-12", "30 s"
    #[serde(default, deserialize_with = "string_or_number")]
    pub reps: Option<String>,
    #[serde(default)]
    pub rest_seconds: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

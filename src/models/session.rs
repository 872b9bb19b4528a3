use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub program_id: Option<Uuid>,
    pub scheduled_date: NaiveDate,
    pub title: String,
    pub focus: String,
    pub content: Value,
    pub estimated_minutes: Option<i32>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Feedback {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub rating: i32,
    pub rpe: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitFeedbackRequest {
    #[validate(range(min = 1, max = 5))]
    pub rating: i32,
    /// Rate of perceived exertion
    #[validate(range(min = 1, max = 10))]
    pub rpe: i32,
    #[validate(length(max = 1000))]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WeeklyCheckin {
    pub id: Uuid,
    pub user_id: Uuid,
    pub week_start: NaiveDate,
    pub energy: i32,
    pub sleep_quality: i32,
    pub stress: i32,
    pub weight_kg: Option<f64>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WeeklyCheckin {
    /// One-line French summary fed to the program generator
    pub fn summary_fr(&self) -> String {
        let mut summary = format!(
            "énergie {}/10, sommeil {}/10, stress {}/10",
            self.energy, self.sleep_quality, self.stress
        );
        if let Some(weight) = self.weight_kg {
            summary.push_str(&format!(", poids {:.1} kg", weight));
        }
        summary
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct WeeklyCheckinRequest {
    pub week_start: NaiveDate,
    #[validate(range(min = 1, max = 10))]
    pub energy: i32,
    #[validate(range(min = 1, max = 10))]
    pub sleep_quality: i32,
    #[validate(range(min = 1, max = 10))]
    pub stress: i32,
    #[validate(range(min = 30.0, max = 300.0))]
    pub weight_kg: Option<f64>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Profile {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub age: Option<i32>,
    pub sex: Option<String>,
    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
    pub onboarding_completed: bool,
    pub free_uses_consumed: i32,
    pub disabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Female,
    Male,
    Other,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Female => "female",
            Sex::Male => "male",
            Sex::Other => "other",
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpsertProfileRequest {
    #[validate(length(min = 1, max = 80))]
    pub first_name: Option<String>,
    #[validate(range(min = 13, max = 100))]
    pub age: Option<i32>,
    pub sex: Option<Sex>,
    #[validate(range(min = 30.0, max = 300.0))]
    pub weight_kg: Option<f64>,
    #[validate(range(min = 120.0, max = 230.0))]
    pub height_cm: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalType {
    WeightLoss,
    MuscleGain,
    Endurance,
    GeneralFitness,
    Performance,
}

impl GoalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalType::WeightLoss => "weight_loss",
            GoalType::MuscleGain => "muscle_gain",
            GoalType::Endurance => "endurance",
            GoalType::GeneralFitness => "general_fitness",
            GoalType::Performance => "performance",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "weight_loss" => Some(GoalType::WeightLoss),
            "muscle_gain" => Some(GoalType::MuscleGain),
            "endurance" => Some(GoalType::Endurance),
            "general_fitness" => Some(GoalType::GeneralFitness),
            "performance" => Some(GoalType::Performance),
            _ => None,
        }
    }

    /// Label used in prompts and emails
    pub fn label_fr(&self) -> &'static str {
        match self {
            GoalType::WeightLoss => "perte de poids",
            GoalType::MuscleGain => "prise de muscle",
            GoalType::Endurance => "endurance",
            GoalType::GeneralFitness => "remise en forme",
            GoalType::Performance => "performance",
        }
    }

    /// Session focuses cycled through over a training week
    pub fn focus_rotation(&self) -> &'static [&'static str] {
        match self {
            GoalType::WeightLoss => &["full body métabolique", "cardio HIIT", "renforcement bas du corps", "cardio modéré"],
            GoalType::MuscleGain => &["haut du corps - poussée", "bas du corps", "haut du corps - tirage", "full body"],
            GoalType::Endurance => &["endurance fondamentale", "fractionné", "renforcement général", "sortie longue"],
            GoalType::GeneralFitness => &["full body", "cardio modéré", "mobilité et gainage"],
            GoalType::Performance => &["force maximale", "puissance et pliométrie", "capacité anaérobie", "récupération active"],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Goal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub goal_type: String,
    pub target_weight_kg: Option<f64>,
    pub target_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Goal {
    pub fn kind(&self) -> GoalType {
        GoalType::from_str(&self.goal_type).unwrap_or(GoalType::GeneralFitness)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetGoalRequest {
    pub goal_type: GoalType,
    #[validate(range(min = 30.0, max = 300.0))]
    pub target_weight_kg: Option<f64>,
    pub target_date: Option<NaiveDate>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitnessLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl FitnessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            FitnessLevel::Beginner => "beginner",
            FitnessLevel::Intermediate => "intermediate",
            FitnessLevel::Advanced => "advanced",
        }
    }

    pub fn label_fr(s: &str) -> &'static str {
        match s {
            "intermediate" => "intermédiaire",
            "advanced" => "avancé",
            _ => "débutant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingLocation {
    Home,
    Gym,
    Outdoor,
}

impl TrainingLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingLocation::Home => "home",
            TrainingLocation::Gym => "gym",
            TrainingLocation::Outdoor => "outdoor",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TrainingPreferences {
    pub user_id: Uuid,
    pub sessions_per_week: i32,
    pub session_minutes: i32,
    pub preferred_days: Vec<String>,
    pub equipment: Vec<String>,
    pub location: String,
    pub level: String,
    pub dietary_restrictions: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl TrainingPreferences {
    /// Preferred days that parse as weekdays, in week order, without duplicates
    pub fn preferred_weekdays(&self) -> Vec<Weekday> {
        let mut days: Vec<Weekday> = self
            .preferred_days
            .iter()
            .filter_map(|day| parse_weekday(day))
            .collect();
        days.sort_by_key(|day| day.num_days_from_monday());
        days.dedup();
        days
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePreferencesRequest {
    #[validate(range(min = 1, max = 7))]
    pub sessions_per_week: i32,
    #[validate(range(min = 15, max = 180))]
    pub session_minutes: i32,
    #[serde(default)]
    #[validate(custom(function = "validate_weekdays"))]
    pub preferred_days: Vec<String>,
    #[serde(default)]
    #[validate(length(max = 20))]
    pub equipment: Vec<String>,
    pub location: TrainingLocation,
    pub level: FitnessLevel,
    #[serde(default)]
    #[validate(length(max = 20))]
    pub dietary_restrictions: Vec<String>,
}

fn validate_weekdays(days: &[String]) -> Result<(), validator::ValidationError> {
    if days.len() > 7 || days.iter().any(|day| parse_weekday(day).is_none()) {
        return Err(validator::ValidationError::new("weekday"));
    }
    Ok(())
}

pub fn parse_weekday(s: &str) -> Option<Weekday> {
    match s.trim().to_lowercase().as_str() {
        "monday" | "lundi" => Some(Weekday::Mon),
        "tuesday" | "mardi" => Some(Weekday::Tue),
        "wednesday" | "mercredi" => Some(Weekday::Wed),
        "thursday" | "jeudi" => Some(Weekday::Thu),
        "friday" | "vendredi" => Some(Weekday::Fri),
        "saturday" | "samedi" => Some(Weekday::Sat),
        "sunday" | "dimanche" => Some(Weekday::Sun),
        _ => None,
    }
}

pub fn weekday_label_fr(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "lundi",
        Weekday::Tue => "mardi",
        Weekday::Wed => "mercredi",
        Weekday::Thu => "jeudi",
        Weekday::Fri => "vendredi",
        Weekday::Sat => "samedi",
        Weekday::Sun => "dimanche",
    }
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub profile: Option<Profile>,
    pub goal: Option<Goal>,
    pub preferences: Option<TrainingPreferences>,
}

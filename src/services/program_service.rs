use chrono::{Datelike, Duration as ChronoDuration, NaiveDate, Utc, Weekday};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::llm::{ChatMessage, ChatRequest, LlmError, LlmProvider};
use crate::models::{
    weekday_label_fr, AccessDecision, FitnessLevel, GeneratedSessionPlan, GenerateProgramRequest,
    GoalType, ProgramResponse, Session, TrainingPreferences, WeeklyProgram,
};
use crate::services::profile_service::{claim_free_use, CoachingContext};
use crate::services::session_service::is_monday;
use crate::services::{ProfileService, SubscriptionService};

/// Attempts per session when the gateway rate-limits us
pub const MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF: Duration = Duration::from_secs(2);

const PLANNER_SYSTEM_PROMPT: &str = "Tu es un coach sportif qui conçoit des séances d'entraînement \
personnalisées et sûres. Tu réponds uniquement avec un objet JSON valide, sans texte autour.";

/// Monday of next week, or today when today is a Monday
pub fn next_monday(today: NaiveDate) -> NaiveDate {
    let days_ahead = (7 - today.weekday().num_days_from_monday()) % 7;
    today + ChronoDuration::days(i64::from(days_ahead))
}

/// Dates of the `count` sessions of the week starting at `week_start`.
///
/// Preferred weekdays are used when there are enough of them, otherwise the
/// sessions are spread evenly over the seven days.
pub fn session_dates(week_start: NaiveDate, count: usize, preferred: &[Weekday]) -> Vec<NaiveDate> {
    let count = count.clamp(1, 7);
    if preferred.len() >= count {
        return preferred
            .iter()
            .take(count)
            .map(|day| week_start + ChronoDuration::days(i64::from(day.num_days_from_monday())))
            .collect();
    }

    (0..count)
        .map(|i| week_start + ChronoDuration::days((i * 7 / count) as i64))
        .collect()
}

pub fn focus_for(goal: GoalType, index: usize) -> &'static str {
    let rotation = goal.focus_rotation();
    rotation[index % rotation.len()]
}

/// Sessions that must succeed for the program to be kept
pub fn min_successes(requested: usize) -> usize {
    requested.div_ceil(2).max(1)
}

/// Pull the JSON object out of a model reply and parse it
pub fn parse_session_plan(content: &str) -> Result<GeneratedSessionPlan, LlmError> {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);

    let json = match (unfenced.find('{'), unfenced.rfind('}')) {
        (Some(start), Some(end)) if start < end => &unfenced[start..=end],
        _ => return Err(LlmError::InvalidResponse("no JSON object in reply".to_string())),
    };

    let plan: GeneratedSessionPlan = serde_json::from_str(json)
        .map_err(|e| LlmError::InvalidResponse(format!("session plan: {e}")))?;

    if plan.title.trim().is_empty() || plan.exercises.is_empty() {
        return Err(LlmError::InvalidResponse("session plan without title or exercises".to_string()));
    }
    Ok(plan)
}

/// One slot of the week to fill
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSlot {
    pub index: usize,
    pub total: usize,
    pub date: NaiveDate,
    pub focus: &'static str,
    pub minutes: i32,
}

pub fn build_session_prompt(context: &CoachingContext, preferences: &TrainingPreferences, slot: &SessionSlot) -> Vec<ChatMessage> {
    let goal = context.goal.as_ref().map(|g| g.kind()).unwrap_or(GoalType::GeneralFitness);

    let mut lines = vec![
        format!(
            "Conçois la séance {} sur {} de la semaine, prévue le {} {}.",
            slot.index + 1,
            slot.total,
            weekday_label_fr(slot.date.weekday()),
            slot.date.format("%d/%m/%Y")
        ),
        format!("Thème de la séance : {}.", slot.focus),
        format!("Durée visée : {} minutes.", slot.minutes),
        format!("Objectif : {}.", goal.label_fr()),
        format!("Niveau : {}.", FitnessLevel::label_fr(&preferences.level)),
        format!("Lieu : {}.", preferences.location),
    ];
    if preferences.equipment.is_empty() {
        lines.push("Matériel : aucun (poids du corps).".to_string());
    } else {
        lines.push(format!("Matériel disponible : {}.", preferences.equipment.join(", ")));
    }

    if let Some(profile) = &context.profile {
        let mut details = Vec::new();
        if let Some(age) = profile.age {
            details.push(format!("{} ans", age));
        }
        if let Some(weight) = profile.weight_kg {
            details.push(format!("{:.1} kg", weight));
        }
        if let Some(height) = profile.height_cm {
            details.push(format!("{:.0} cm", height));
        }
        if !details.is_empty() {
            lines.push(format!("Profil : {}.", details.join(", ")));
        }
    }
    if let Some(checkin) = &context.last_checkin {
        lines.push(format!("Dernier bilan hebdomadaire : {}.", checkin.summary_fr()));
    }

    lines.push(
        "Réponds avec un objet JSON de la forme {\"title\": string, \"focus\": string, \
         \"warmup\": [string], \"exercises\": [{\"name\": string, \"sets\": number, \"reps\": string, \
         \"rest_seconds\": number, \"notes\": string}], \"cooldown\": [string], \"estimated_minutes\": number}. \
         Les noms d'exercices sont en français."
            .to_string(),
    );

    vec![
        ChatMessage::system(PLANNER_SYSTEM_PROMPT),
        ChatMessage::user(lines.join("\n")),
    ]
}

/// A successfully generated session, ready to insert
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedSession {
    pub slot: SessionSlot,
    pub plan: GeneratedSessionPlan,
}

/// Calls the LLM once per session of the week
pub struct WeekPlanner {
    llm: Arc<dyn LlmProvider>,
    backoff: Duration,
}

impl WeekPlanner {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            backoff: DEFAULT_BACKOFF,
        }
    }

    /// Base delay between rate-limited attempts; attempt `n` waits `n * backoff`
    #[must_use]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn slots(context: &CoachingContext, preferences: &TrainingPreferences, week_start: NaiveDate) -> Vec<SessionSlot> {
        let goal = context.goal.as_ref().map(|g| g.kind()).unwrap_or(GoalType::GeneralFitness);
        let requested = usize::try_from(preferences.sessions_per_week).unwrap_or(1);
        let dates = session_dates(week_start, requested, &preferences.preferred_weekdays());
        let total = dates.len();

        dates
            .into_iter()
            .enumerate()
            .map(|(index, date)| SessionSlot {
                index,
                total,
                date,
                focus: focus_for(goal, index),
                minutes: preferences.session_minutes,
            })
            .collect()
    }

    async fn generate_one(
        &self,
        context: &CoachingContext,
        preferences: &TrainingPreferences,
        slot: &SessionSlot,
    ) -> Result<GeneratedSessionPlan, LlmError> {
        let request = ChatRequest::new(build_session_prompt(context, preferences, slot))
            .with_temperature(0.7)
            .with_max_tokens(1500)
            .with_json_mode();

        let mut attempt = 1;
        loop {
            match self.llm.complete(&request).await {
                Ok(response) => return parse_session_plan(&response.content),
                Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                    warn!("Session {} rate limited, attempt {}/{}", slot.index + 1, attempt, MAX_ATTEMPTS);
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Generate every slot, skipping failures. Fails when fewer than
    /// [`min_successes`] sessions could be generated.
    pub async fn plan_week(
        &self,
        context: &CoachingContext,
        preferences: &TrainingPreferences,
        week_start: NaiveDate,
    ) -> Result<Vec<PlannedSession>, ApiError> {
        let slots = Self::slots(context, preferences, week_start);
        let required = min_successes(slots.len());
        let mut planned = Vec::with_capacity(slots.len());
        let mut last_error: Option<LlmError> = None;

        for slot in slots.iter() {
            match self.generate_one(context, preferences, slot).await {
                Ok(plan) => planned.push(PlannedSession {
                    slot: slot.clone(),
                    plan,
                }),
                Err(e) => {
                    warn!("Skipping session {} of {}: {}", slot.index + 1, slot.total, e);
                    last_error = Some(e);
                }
            }
        }

        if planned.len() < required {
            warn!(
                "Only {} of {} sessions generated, {} required",
                planned.len(),
                slots.len(),
                required
            );
            return Err(ApiError::Upstream(format!(
                "{} of {} sessions generated, last error: {}",
                planned.len(),
                slots.len(),
                last_error.map(|e| e.to_string()).unwrap_or_default()
            )));
        }

        Ok(planned)
    }
}

pub struct ProgramService {
    db: PgPool,
    llm: Arc<dyn LlmProvider>,
    free_uses_allowed: i32,
}

impl ProgramService {
    pub fn new(db: PgPool, llm: Arc<dyn LlmProvider>, free_uses_allowed: i32) -> Self {
        Self {
            db,
            llm,
            free_uses_allowed,
        }
    }

    pub async fn list_programs(&self, user_id: Uuid) -> Result<Vec<WeeklyProgram>, ApiError> {
        let programs = sqlx::query_as::<_, WeeklyProgram>(
            "SELECT * FROM weekly_programs WHERE user_id = $1 ORDER BY week_start DESC",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(programs)
    }

    pub async fn get_program(&self, user_id: Uuid, program_id: Uuid) -> Result<ProgramResponse, ApiError> {
        let program = sqlx::query_as::<_, WeeklyProgram>(
            "SELECT * FROM weekly_programs WHERE id = $1 AND user_id = $2",
        )
        .bind(program_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(ApiError::NotFound("Programme"))?;

        let sessions = sqlx::query_as::<_, Session>(
            "SELECT * FROM sessions WHERE program_id = $1 ORDER BY scheduled_date ASC",
        )
        .bind(program_id)
        .fetch_all(&self.db)
        .await?;

        Ok(ProgramResponse { program, sessions })
    }

    async fn program_exists(&self, user_id: Uuid, week_start: NaiveDate) -> Result<bool, ApiError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM weekly_programs WHERE user_id = $1 AND week_start = $2)",
        )
        .bind(user_id)
        .bind(week_start)
        .fetch_one(&self.db)
        .await?;

        Ok(exists)
    }

    #[instrument(skip(self, request))]
    pub async fn generate(&self, user_id: Uuid, request: GenerateProgramRequest) -> Result<ProgramResponse, ApiError> {
        let week_start = match request.week_start {
            Some(date) if !is_monday(date) => {
                return Err(ApiError::invalid("la semaine doit commencer un lundi"));
            }
            Some(date) => date,
            None => next_monday(Utc::now().date_naive()),
        };

        let subscriptions = SubscriptionService::new(self.db.clone(), self.free_uses_allowed);
        let access = subscriptions.check_access(user_id).await?;
        if access == AccessDecision::Denied {
            return Err(ApiError::SubscriptionRequired);
        }

        let context = ProfileService::new(self.db.clone())
            .load_coaching_context(user_id)
            .await?;
        let preferences = context
            .preferences
            .clone()
            .ok_or_else(|| ApiError::invalid("préférences d'entraînement manquantes"))?;

        if self.program_exists(user_id, week_start).await? {
            return Err(ApiError::Conflict(
                "Un programme existe déjà pour cette semaine".to_string(),
            ));
        }

        let planned = WeekPlanner::new(self.llm.clone())
            .plan_week(&context, &preferences, week_start)
            .await?;

        let goal = context.goal.as_ref().map(|g| g.kind()).unwrap_or(GoalType::GeneralFitness);
        let response = self
            .persist(user_id, week_start, goal, preferences.sessions_per_week, &planned, access)
            .await?;

        info!(
            "Generated program {} with {}/{} sessions",
            response.program.id,
            response.sessions.len(),
            preferences.sessions_per_week
        );
        Ok(response)
    }

    async fn persist(
        &self,
        user_id: Uuid,
        week_start: NaiveDate,
        goal: GoalType,
        requested: i32,
        planned: &[PlannedSession],
        access: AccessDecision,
    ) -> Result<ProgramResponse, ApiError> {
        let mut tx = self.db.begin().await?;

        let program = sqlx::query_as::<_, WeeklyProgram>(
            r#"
            INSERT INTO weekly_programs (user_id, week_start, goal_type, sessions_requested, sessions_generated, model)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(week_start)
        .bind(goal.as_str())
        .bind(requested)
        .bind(planned.len() as i32)
        .bind(self.llm.default_model())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                ApiError::Conflict("Un programme existe déjà pour cette semaine".to_string())
            }
            other => ApiError::Database(other),
        })?;

        let mut sessions = Vec::with_capacity(planned.len());
        for item in planned {
            let content = serde_json::to_value(&item.plan).map_err(anyhow::Error::from)?;
            let focus = item
                .plan
                .focus
                .clone()
                .filter(|f| !f.trim().is_empty())
                .unwrap_or_else(|| item.slot.focus.to_string());

            let session = sqlx::query_as::<_, Session>(
                r#"
                INSERT INTO sessions (user_id, program_id, scheduled_date, title, focus, content, estimated_minutes)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING *
                "#,
            )
            .bind(user_id)
            .bind(program.id)
            .bind(item.slot.date)
            .bind(item.plan.title.trim())
            .bind(focus)
            .bind(content)
            .bind(item.plan.estimated_minutes.unwrap_or(item.slot.minutes))
            .fetch_one(&mut *tx)
            .await?;
            sessions.push(session);
        }

        // The free use is claimed with the program, or nothing is kept
        if access.consumes_free_use()
            && !claim_free_use(&mut *tx, user_id, self.free_uses_allowed).await?
        {
            warn!("Free use spent by a concurrent request, discarding program");
            return Err(ApiError::SubscriptionRequired);
        }

        tx.commit().await?;
        Ok(ProgramResponse { program, sessions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_next_monday() {
        // 2024-06-03 is a Monday
        assert_eq!(next_monday(date(2024, 6, 3)), date(2024, 6, 3));
        assert_eq!(next_monday(date(2024, 6, 4)), date(2024, 6, 10));
        assert_eq!(next_monday(date(2024, 6, 9)), date(2024, 6, 10));
    }

    #[test]
    fn test_session_dates_use_preferred_days() {
        let dates = session_dates(date(2024, 6, 3), 2, &[Weekday::Tue, Weekday::Thu, Weekday::Sat]);
        assert_eq!(dates, vec![date(2024, 6, 4), date(2024, 6, 6)]);
    }

    #[test]
    fn test_session_dates_spread_without_enough_preferences() {
        let dates = session_dates(date(2024, 6, 3), 3, &[Weekday::Mon]);
        assert_eq!(dates, vec![date(2024, 6, 3), date(2024, 6, 5), date(2024, 6, 7)]);

        let every_day = session_dates(date(2024, 6, 3), 7, &[]);
        assert_eq!(every_day.len(), 7);
        assert_eq!(every_day[6], date(2024, 6, 9));
    }

    #[test]
    fn test_min_successes() {
        assert_eq!(min_successes(1), 1);
        assert_eq!(min_successes(3), 2);
        assert_eq!(min_successes(4), 2);
        assert_eq!(min_successes(7), 4);
    }

    #[test]
    fn test_focus_rotates() {
        let rotation = GoalType::GeneralFitness.focus_rotation();
        assert_eq!(focus_for(GoalType::GeneralFitness, 0), rotation[0]);
        assert_eq!(focus_for(GoalType::GeneralFitness, rotation.len()), rotation[0]);
        assert_eq!(focus_for(GoalType::GeneralFitness, 1), rotation[1]);
    }

    #[test]
    fn test_parse_fenced_plan() {
        let reply = "```json\n{\"title\":\"Full body\",\"exercises\":[{\"name\":\"Squat\",\"sets\":3,\"reps\":12}]}\n```";
        let plan = parse_session_plan(reply).unwrap();
        assert_eq!(plan.title, "Full body");
        assert_eq!(plan.exercises[0].reps.as_deref(), Some("12"));
    }

    #[test]
    fn test_parse_plan_surrounded_by_text() {
        let reply = "Voici ta séance : {\"title\":\"Cardio\",\"exercises\":[{\"name\":\"Corde à sauter\"}]} Bon courage !";
        assert_eq!(parse_session_plan(reply).unwrap().title, "Cardio");
    }

    #[test]
    fn test_parse_rejects_empty_plan() {
        assert_matches!(
            parse_session_plan("{\"title\":\"Vide\",\"exercises\":[]}"),
            Err(LlmError::InvalidResponse(_))
        );
        assert_matches!(parse_session_plan("désolé"), Err(LlmError::InvalidResponse(_)));
    }
}

use anyhow::Result;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::models::{
    Goal, Profile, SetGoalRequest, TrainingPreferences, UpdatePreferencesRequest,
    UpsertProfileRequest, WeeklyCheckin,
};

/// Count one free use unless `allowed` is reached. Check and increment are a
/// single statement, so concurrent callers cannot push the counter past it.
pub async fn claim_free_use(
    conn: &mut PgConnection,
    user_id: Uuid,
    allowed: i32,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO profiles (user_id, free_uses_consumed)
        SELECT $1, 1 WHERE $2 > 0
        ON CONFLICT (user_id) DO UPDATE SET
            free_uses_consumed = profiles.free_uses_consumed + 1,
            updated_at = NOW()
        WHERE profiles.free_uses_consumed < $2
        "#,
    )
    .bind(user_id)
    .bind(allowed)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Everything the coaches and the program generator know about a user
#[derive(Debug, Clone, Default)]
pub struct CoachingContext {
    pub profile: Option<Profile>,
    pub goal: Option<Goal>,
    pub preferences: Option<TrainingPreferences>,
    pub last_checkin: Option<WeeklyCheckin>,
}

#[derive(Clone)]
pub struct ProfileService {
    db: PgPool,
}

impl ProfileService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?;

        Ok(profile)
    }

    /// Insert or update the profile; fields left out of the request keep their value
    pub async fn upsert_profile(
        &self,
        user_id: Uuid,
        email: Option<&str>,
        request: &UpsertProfileRequest,
    ) -> Result<Profile> {
        let profile = sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO profiles (user_id, email, first_name, age, sex, weight_kg, height_cm)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id) DO UPDATE SET
                email = COALESCE(EXCLUDED.email, profiles.email),
                first_name = COALESCE(EXCLUDED.first_name, profiles.first_name),
                age = COALESCE(EXCLUDED.age, profiles.age),
                sex = COALESCE(EXCLUDED.sex, profiles.sex),
                weight_kg = COALESCE(EXCLUDED.weight_kg, profiles.weight_kg),
                height_cm = COALESCE(EXCLUDED.height_cm, profiles.height_cm),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(email)
        .bind(request.first_name.as_deref().map(str::trim))
        .bind(request.age)
        .bind(request.sex.map(|s| s.as_str()))
        .bind(request.weight_kg)
        .bind(request.height_cm)
        .fetch_one(&self.db)
        .await?;

        Ok(profile)
    }

    pub async fn get_active_goal(&self, user_id: Uuid) -> Result<Option<Goal>> {
        let goal = sqlx::query_as::<_, Goal>(
            "SELECT * FROM goals WHERE user_id = $1 AND is_active ORDER BY created_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(goal)
    }

    /// Deactivate the current goal and insert the new one
    pub async fn set_goal(&self, user_id: Uuid, request: &SetGoalRequest) -> Result<Goal> {
        let mut tx = self.db.begin().await?;

        sqlx::query("UPDATE goals SET is_active = FALSE WHERE user_id = $1 AND is_active")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let goal = sqlx::query_as::<_, Goal>(
            r#"
            INSERT INTO goals (user_id, goal_type, target_weight_kg, target_date, description)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(request.goal_type.as_str())
        .bind(request.target_weight_kg)
        .bind(request.target_date)
        .bind(request.description.as_deref())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(goal)
    }

    pub async fn get_preferences(&self, user_id: Uuid) -> Result<Option<TrainingPreferences>> {
        let preferences = sqlx::query_as::<_, TrainingPreferences>(
            "SELECT * FROM training_preferences WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(preferences)
    }

    pub async fn upsert_preferences(
        &self,
        user_id: Uuid,
        request: &UpdatePreferencesRequest,
    ) -> Result<TrainingPreferences> {
        let preferred_days: Vec<String> = request
            .preferred_days
            .iter()
            .map(|day| day.trim().to_lowercase())
            .collect();

        let preferences = sqlx::query_as::<_, TrainingPreferences>(
            r#"
            INSERT INTO training_preferences (
                user_id, sessions_per_week, session_minutes, preferred_days,
                equipment, location, level, dietary_restrictions
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id) DO UPDATE SET
                sessions_per_week = EXCLUDED.sessions_per_week,
                session_minutes = EXCLUDED.session_minutes,
                preferred_days = EXCLUDED.preferred_days,
                equipment = EXCLUDED.equipment,
                location = EXCLUDED.location,
                level = EXCLUDED.level,
                dietary_restrictions = EXCLUDED.dietary_restrictions,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(request.sessions_per_week)
        .bind(request.session_minutes)
        .bind(&preferred_days)
        .bind(&request.equipment)
        .bind(request.location.as_str())
        .bind(request.level.as_str())
        .bind(&request.dietary_restrictions)
        .fetch_one(&self.db)
        .await?;

        Ok(preferences)
    }

    /// Mark onboarding as done. Returns `None` when the goal or the
    /// training preferences are still missing.
    pub async fn complete_onboarding(&self, user_id: Uuid, email: Option<&str>) -> Result<Option<Profile>> {
        if self.get_active_goal(user_id).await?.is_none()
            || self.get_preferences(user_id).await?.is_none()
        {
            return Ok(None);
        }

        let profile = sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO profiles (user_id, email, onboarding_completed)
            VALUES ($1, $2, TRUE)
            ON CONFLICT (user_id) DO UPDATE SET onboarding_completed = TRUE, updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(email)
        .fetch_one(&self.db)
        .await?;

        Ok(Some(profile))
    }

    pub async fn free_uses_consumed(&self, user_id: Uuid) -> Result<i32> {
        let consumed: Option<i32> =
            sqlx::query_scalar("SELECT free_uses_consumed FROM profiles WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.db)
                .await?;

        Ok(consumed.unwrap_or(0))
    }

    /// Count one free use; `false` when the allowance was already spent
    pub async fn record_free_use(&self, user_id: Uuid, allowed: i32) -> Result<bool> {
        let mut conn = self.db.acquire().await?;
        Ok(claim_free_use(&mut *conn, user_id, allowed).await?)
    }

    pub async fn set_disabled(&self, user_id: Uuid, disabled: bool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO profiles (user_id, disabled) VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET disabled = EXCLUDED.disabled, updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(disabled)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    pub async fn latest_checkin(&self, user_id: Uuid) -> Result<Option<WeeklyCheckin>> {
        let checkin = sqlx::query_as::<_, WeeklyCheckin>(
            "SELECT * FROM weekly_checkins WHERE user_id = $1 ORDER BY week_start DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(checkin)
    }

    pub async fn load_coaching_context(&self, user_id: Uuid) -> Result<CoachingContext> {
        let (profile, goal, preferences, last_checkin) = tokio::try_join!(
            self.get_profile(user_id),
            self.get_active_goal(user_id),
            self.get_preferences(user_id),
            self.latest_checkin(user_id),
        )?;

        Ok(CoachingContext {
            profile,
            goal,
            preferences,
            last_checkin,
        })
    }
}

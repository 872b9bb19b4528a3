use anyhow::Result;
use chrono::{Datelike, NaiveDate, Weekday};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Feedback, Session, SubmitFeedbackRequest, WeeklyCheckin, WeeklyCheckinRequest};

pub fn is_monday(date: NaiveDate) -> bool {
    date.weekday() == Weekday::Mon
}

#[derive(Clone)]
pub struct SessionService {
    db: PgPool,
}

impl SessionService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_sessions(
        &self,
        user_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<Session>> {
        let sessions = sqlx::query_as::<_, Session>(
            r#"
            SELECT * FROM sessions
            WHERE user_id = $1
              AND ($2::date IS NULL OR scheduled_date >= $2)
              AND ($3::date IS NULL OR scheduled_date <= $3)
            ORDER BY scheduled_date ASC, created_at ASC
            "#,
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.db)
        .await?;

        Ok(sessions)
    }

    pub async fn get_session(&self, user_id: Uuid, session_id: Uuid) -> Result<Option<Session>> {
        let session =
            sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = $1 AND user_id = $2")
                .bind(session_id)
                .bind(user_id)
                .fetch_optional(&self.db)
                .await?;

        Ok(session)
    }

    /// Mark a session completed; completing twice keeps the first timestamp
    pub async fn complete_session(&self, user_id: Uuid, session_id: Uuid) -> Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            UPDATE sessions SET completed_at = COALESCE(completed_at, NOW())
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(session)
    }

    /// Upsert the feedback of a session owned by the user.
    /// Returns `None` when the session does not exist or belongs to someone else.
    pub async fn submit_feedback(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        request: &SubmitFeedbackRequest,
    ) -> Result<Option<Feedback>> {
        if self.get_session(user_id, session_id).await?.is_none() {
            return Ok(None);
        }

        let feedback = sqlx::query_as::<_, Feedback>(
            r#"
            INSERT INTO feedback (session_id, user_id, rating, rpe, comment)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (session_id) DO UPDATE SET
                rating = EXCLUDED.rating,
                rpe = EXCLUDED.rpe,
                comment = EXCLUDED.comment,
                created_at = NOW()
            RETURNING *
            "#,
        )
        .bind(session_id)
        .bind(user_id)
        .bind(request.rating)
        .bind(request.rpe)
        .bind(request.comment.as_deref().map(str::trim))
        .fetch_one(&self.db)
        .await?;

        Ok(Some(feedback))
    }

    pub async fn list_checkins(&self, user_id: Uuid, limit: i64) -> Result<Vec<WeeklyCheckin>> {
        let checkins = sqlx::query_as::<_, WeeklyCheckin>(
            "SELECT * FROM weekly_checkins WHERE user_id = $1 ORDER BY week_start DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(checkins)
    }

    pub async fn upsert_checkin(&self, user_id: Uuid, request: &WeeklyCheckinRequest) -> Result<WeeklyCheckin> {
        let checkin = sqlx::query_as::<_, WeeklyCheckin>(
            r#"
            INSERT INTO weekly_checkins (user_id, week_start, energy, sleep_quality, stress, weight_kg, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id, week_start) DO UPDATE SET
                energy = EXCLUDED.energy,
                sleep_quality = EXCLUDED.sleep_quality,
                stress = EXCLUDED.stress,
                weight_kg = EXCLUDED.weight_kg,
                notes = EXCLUDED.notes
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(request.week_start)
        .bind(request.energy)
        .bind(request.sleep_quality)
        .bind(request.stress)
        .bind(request.weight_kg)
        .bind(request.notes.as_deref().map(str::trim))
        .fetch_one(&self.db)
        .await?;

        Ok(checkin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_monday() {
        assert!(is_monday(NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()));
        assert!(!is_monday(NaiveDate::from_ymd_opt(2024, 6, 4).unwrap()));
    }
}

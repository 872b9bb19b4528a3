use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tracing::{debug, instrument};

use crate::api::error::ApiError;
use crate::models::{ExerciseImageCacheEntry, ExerciseImageResponse};
use crate::services::exercise_api_client::ExerciseApiClient;

const SOURCE_EXERCISE_API: &str = "exercise_api";
const SOURCE_NOT_FOUND: &str = "not_found";

/// Lower-cased, trimmed name with single spaces; `None` outside 2..=80 chars
pub fn normalize_exercise_name(raw: &str) -> Option<String> {
    let name = raw.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    let len = name.chars().count();
    (2..=80).contains(&len).then_some(name)
}

/// Misses are cached too, but retried after a week
pub fn is_usable(entry: &ExerciseImageCacheEntry, now: DateTime<Utc>) -> bool {
    entry.image_url.is_some() || now - entry.fetched_at < Duration::days(7)
}

pub struct ExerciseImageService {
    db: PgPool,
    client: ExerciseApiClient,
}

impl ExerciseImageService {
    pub fn new(db: PgPool, client: ExerciseApiClient) -> Self {
        Self { db, client }
    }

    #[instrument(skip(self))]
    pub async fn image_for(&self, raw_name: &str) -> Result<ExerciseImageResponse, ApiError> {
        let name = normalize_exercise_name(raw_name)
            .ok_or_else(|| ApiError::invalid("nom d'exercice invalide"))?;

        let cached = sqlx::query_as::<_, ExerciseImageCacheEntry>(
            "SELECT * FROM exercise_image_cache WHERE exercise_name = $1",
        )
        .bind(&name)
        .fetch_optional(&self.db)
        .await?;

        if let Some(entry) = cached.filter(|e| is_usable(e, Utc::now())) {
            debug!("Exercise image cache hit");
            return Ok(ExerciseImageResponse {
                exercise_name: entry.exercise_name,
                image_url: entry.image_url,
                cached: true,
            });
        }

        let image_url = self.client.find_image(&name).await?;
        let source = if image_url.is_some() { SOURCE_EXERCISE_API } else { SOURCE_NOT_FOUND };

        sqlx::query(
            r#"
            INSERT INTO exercise_image_cache (exercise_name, image_url, source, fetched_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (exercise_name) DO UPDATE SET
                image_url = EXCLUDED.image_url,
                source = EXCLUDED.source,
                fetched_at = NOW()
            "#,
        )
        .bind(&name)
        .bind(image_url.as_deref())
        .bind(source)
        .execute(&self.db)
        .await?;

        Ok(ExerciseImageResponse {
            exercise_name: name,
            image_url,
            cached: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(image_url: Option<&str>, age_days: i64) -> ExerciseImageCacheEntry {
        ExerciseImageCacheEntry {
            exercise_name: "squat".to_string(),
            image_url: image_url.map(str::to_string),
            source: SOURCE_EXERCISE_API.to_string(),
            fetched_at: Utc::now() - Duration::days(age_days),
        }
    }

    #[test]
    fn test_normalize_exercise_name() {
        assert_eq!(normalize_exercise_name("  Push   UP "), Some("push up".to_string()));
        assert_eq!(normalize_exercise_name("a"), None);
        assert_eq!(normalize_exercise_name(&"x".repeat(81)), None);
        assert_eq!(normalize_exercise_name("Élévations latérales").as_deref(), Some("élévations latérales"));
    }

    #[test]
    fn test_not_found_entries_expire() {
        let now = Utc::now();
        assert!(is_usable(&entry(Some("https://cdn/x.gif"), 90), now));
        assert!(is_usable(&entry(None, 3), now));
        assert!(!is_usable(&entry(None, 8), now));
    }
}

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tracing::{debug, info};

use crate::models::PublicStats;

const CACHE_KEY: &str = "landing";

pub fn cache_ttl() -> Duration {
    Duration::hours(1)
}

pub fn is_fresh(updated_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - updated_at < cache_ttl()
}

/// Landing-page figures, cached in `public_stats_cache`
#[derive(Clone)]
pub struct StatsService {
    db: PgPool,
}

impl StatsService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn compute(&self) -> Result<PublicStats> {
        let (members, programs_generated, sessions_completed): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM profiles),
                (SELECT COUNT(*) FROM weekly_programs),
                (SELECT COUNT(*) FROM sessions WHERE completed_at IS NOT NULL)
            "#,
        )
        .fetch_one(&self.db)
        .await?;

        Ok(PublicStats {
            members,
            programs_generated,
            sessions_completed,
            updated_at: Some(Utc::now()),
        })
    }

    /// Recompute and store the figures
    pub async fn refresh(&self) -> Result<PublicStats> {
        let stats = self.compute().await?;

        sqlx::query(
            r#"
            INSERT INTO public_stats_cache (key, payload, updated_at) VALUES ($1, $2, NOW())
            ON CONFLICT (key) DO UPDATE SET payload = EXCLUDED.payload, updated_at = NOW()
            "#,
        )
        .bind(CACHE_KEY)
        .bind(serde_json::to_value(&stats)?)
        .execute(&self.db)
        .await?;

        info!(
            "Refreshed public stats: {} members, {} programs",
            stats.members, stats.programs_generated
        );
        Ok(stats)
    }

    /// Cached figures when younger than the TTL, fresh ones otherwise
    pub async fn get_public_stats(&self) -> Result<PublicStats> {
        let cached: Option<(serde_json::Value, DateTime<Utc>)> =
            sqlx::query_as("SELECT payload, updated_at FROM public_stats_cache WHERE key = $1")
                .bind(CACHE_KEY)
                .fetch_optional(&self.db)
                .await?;

        if let Some((payload, updated_at)) = cached {
            if is_fresh(updated_at, Utc::now()) {
                if let Ok(mut stats) = serde_json::from_value::<PublicStats>(payload) {
                    debug!("Serving cached public stats");
                    stats.updated_at = Some(updated_at);
                    return Ok(stats);
                }
            }
        }

        self.refresh().await
    }
}

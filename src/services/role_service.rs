use sqlx::{PgPool, Postgres, Result, Transaction};
use uuid::Uuid;

use crate::auth::AppRole;

#[derive(Clone)]
pub struct RoleService {
    db: PgPool,
}

impl RoleService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn has_role(&self, user_id: Uuid, role: AppRole) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM user_roles WHERE user_id = $1 AND role = $2)",
        )
        .bind(user_id)
        .bind(role.as_str())
        .fetch_one(&self.db)
        .await?;

        Ok(exists)
    }

    pub async fn count_admins(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_roles WHERE role = $1")
            .bind(AppRole::Admin.as_str())
            .fetch_one(&self.db)
            .await?;

        Ok(count)
    }

    /// Whether removing admin rights from `user_id` would leave no admin
    pub async fn is_last_admin(&self, user_id: Uuid) -> Result<bool> {
        if !self.has_role(user_id, AppRole::Admin).await? {
            return Ok(false);
        }
        Ok(self.count_admins().await? <= 1)
    }

    /// Replace every role of the user with `role`
    pub async fn set_role(&self, user_id: Uuid, role: AppRole) -> Result<()> {
        let mut tx = self.db.begin().await?;
        Self::replace_roles(&mut tx, user_id, role).await?;
        tx.commit().await?;

        tracing::info!("Set role of user {} to {}", user_id, role.as_str());
        Ok(())
    }

    async fn replace_roles(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        role: AppRole,
    ) -> Result<()> {
        sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut **tx)
            .await?;

        sqlx::query("INSERT INTO user_roles (user_id, role) VALUES ($1, $2)")
            .bind(user_id)
            .bind(role.as_str())
            .execute(&mut **tx)
            .await?;

        Ok(())
    }
}

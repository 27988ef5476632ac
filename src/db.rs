use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::AppError;

pub async fn init() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&database_url)
        .await
        .context("failed to connect to database")?;

    sqlx::migrate!()
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    Ok(pool)
}

/// Creates the first administrator on an empty user table so a fresh
/// deployment is not locked out. No-op once any user exists.
pub async fn bootstrap_admin(pool: &SqlitePool, email: &str) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;

    let user_count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users")
        .fetch_one(&mut *tx)
        .await?;
    if user_count > 0 {
        return Ok(());
    }

    let admin_role_id: Option<String> =
        sqlx::query_scalar("SELECT id FROM roles WHERE is_system_role = 1 ORDER BY created_at LIMIT 1")
            .fetch_optional(&mut *tx)
            .await?;
    let Some(role_id) = admin_role_id else {
        return Err(AppError::configuration(
            "no system role found for bootstrap administrator",
        ));
    };

    sqlx::query(
        "INSERT INTO users (id, email, display_name, role_id, status, created_at, created_by) \
         VALUES (?, ?, ?, ?, 'active', ?, 'SYSTEM')",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(email)
    .bind(email)
    .bind(role_id)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    tracing::info!(%email, "bootstrap administrator created");

    Ok(())
}

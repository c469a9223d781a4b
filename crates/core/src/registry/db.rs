//! Optional Postgres mirror of call statistics (`function_call_stats`).

use chrono::{DateTime, Utc};
use sqlx::PgPool;

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct PersistedStats {
    pub search_key: String,
    pub call_count: i64,
    pub success_count: i64,
    pub fail_count: i64,
    pub last_called: Option<DateTime<Utc>>,
}

/// Count one call for `search_key`.
pub async fn record_call(pool: &PgPool, search_key: &str, success: bool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO function_call_stats (search_key, call_count, success_count, fail_count, last_called)
         VALUES ($1, 1, $2, $3, now())
         ON CONFLICT (search_key) DO UPDATE SET
             call_count = function_call_stats.call_count + 1,
             success_count = function_call_stats.success_count + EXCLUDED.success_count,
             fail_count = function_call_stats.fail_count + EXCLUDED.fail_count,
             last_called = EXCLUDED.last_called",
    )
    .bind(search_key)
    .bind(i64::from(success))
    .bind(i64::from(!success))
    .execute(pool)
    .await?;
    Ok(())
}

/// All rows, most called first.
pub async fn fetch_all(pool: &PgPool) -> Result<Vec<PersistedStats>, sqlx::Error> {
    sqlx::query_as(
        "SELECT search_key, call_count, success_count, fail_count, last_called
         FROM function_call_stats ORDER BY call_count DESC, search_key",
    )
    .fetch_all(pool)
    .await
}

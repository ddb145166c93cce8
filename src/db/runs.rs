use crate::db::{models::*, read_error, DbPool};
use crate::error::Result;
use chrono::Utc;

/// Record the start of a build and return its id
pub async fn start_run(pool: &DbPool, shards_total: usize) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO build_runs (status, shards_total, started_at)
        VALUES (?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(BuildStatus::Running.as_str())
    .bind(shards_total as i64)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(id)
}

pub async fn complete_run(pool: &DbPool, run_id: i64, counts: &BuildCounts) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE build_runs
        SET status = ?, shards_failed = ?, records_fetched = ?,
            records_unique = ?, records_indexed = ?, completed_at = ?
        WHERE id = ?
        "#,
    )
    .bind(BuildStatus::Completed.as_str())
    .bind(counts.shards_failed)
    .bind(counts.records_fetched)
    .bind(counts.records_unique)
    .bind(counts.records_indexed)
    .bind(Utc::now())
    .bind(run_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn fail_run(pool: &DbPool, run_id: i64, error_message: &str) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE build_runs
        SET status = ?, error_message = ?, completed_at = ?
        WHERE id = ?
        "#,
    )
    .bind(BuildStatus::Failed.as_str())
    .bind(error_message)
    .bind(Utc::now())
    .bind(run_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn latest_run(pool: &DbPool) -> Result<Option<BuildRun>> {
    sqlx::query_as::<_, BuildRun>("SELECT * FROM build_runs ORDER BY id DESC LIMIT 1")
        .fetch_optional(pool)
        .await
        .map_err(read_error)
}

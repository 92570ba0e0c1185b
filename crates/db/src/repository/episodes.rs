//! Episodic-memory repository functions. Append and read only.

use sqlx::SqlitePool;

use crate::{DbError, models::EpisodeRow};

/// Append one episode.
pub async fn append_episode(pool: &SqlitePool, row: &EpisodeRow) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO episodes
            (id, context_id, recorded_at, input, output, workflows, success, fallback)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&row.id)
    .bind(&row.context_id)
    .bind(row.recorded_at)
    .bind(&row.input)
    .bind(&row.output)
    .bind(&row.workflows)
    .bind(row.success)
    .bind(row.fallback)
    .execute(pool)
    .await?;

    Ok(())
}

/// The `limit` most recent episodes, oldest first.
pub async fn recent_episodes(pool: &SqlitePool, limit: u32) -> Result<Vec<EpisodeRow>, DbError> {
    let mut rows = sqlx::query_as::<_, EpisodeRow>(
        r#"
        SELECT id, context_id, recorded_at, input, output, workflows, success, fallback
        FROM episodes
        ORDER BY seq DESC
        LIMIT ?
        "#,
    )
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;

    rows.reverse();
    Ok(rows)
}

/// Total number of stored episodes.
pub async fn count_episodes(pool: &SqlitePool) -> Result<u64, DbError> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM episodes")
        .fetch_one(pool)
        .await?;
    Ok(count.max(0) as u64)
}

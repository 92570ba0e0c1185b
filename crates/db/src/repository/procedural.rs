//! Procedural-memory repository functions.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::{DbError, models::ProceduralRow};

/// Atomically fold one workflow run into its statistics row.
///
/// A single `INSERT … ON CONFLICT DO UPDATE` statement, so concurrent
/// writers never lose an increment.
pub async fn record_run(
    pool: &SqlitePool,
    name: &str,
    success: bool,
    cost: f64,
    duration_ms: i64,
    ran_at: DateTime<Utc>,
) -> Result<ProceduralRow, DbError> {
    let row = sqlx::query_as::<_, ProceduralRow>(
        r#"
        INSERT INTO procedural_stats
            (name, invocations, successes, total_cost, total_duration_ms, last_run_at)
        VALUES (?1, 1, ?2, ?3, ?4, ?5)
        ON CONFLICT(name) DO UPDATE SET
            invocations       = invocations + 1,
            successes         = successes + excluded.successes,
            total_cost        = total_cost + excluded.total_cost,
            total_duration_ms = total_duration_ms + excluded.total_duration_ms,
            last_run_at       = excluded.last_run_at
        RETURNING name, invocations, successes, total_cost, total_duration_ms, last_run_at
        "#,
    )
    .bind(name)
    .bind(i64::from(success))
    .bind(cost)
    .bind(duration_ms)
    .bind(ran_at)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetch the statistics row for one workflow.
pub async fn get_stats(pool: &SqlitePool, name: &str) -> Result<ProceduralRow, DbError> {
    let row = sqlx::query_as::<_, ProceduralRow>(
        r#"
        SELECT name, invocations, successes, total_cost, total_duration_ms, last_run_at
        FROM procedural_stats
        WHERE name = ?
        "#,
    )
    .bind(name)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DbError::NotFound { table: "procedural_stats", key: name.to_owned() })?;

    Ok(row)
}

/// Every statistics row ordered by name.
pub async fn list_stats(pool: &SqlitePool) -> Result<Vec<ProceduralRow>, DbError> {
    let rows = sqlx::query_as::<_, ProceduralRow>(
        r#"
        SELECT name, invocations, successes, total_cost, total_duration_ms, last_run_at
        FROM procedural_stats
        ORDER BY name ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::in_memory;

    #[tokio::test]
    async fn record_run_inserts_then_increments() {
        let pool = in_memory().await.expect("pool");

        let first = record_run(&pool, "research", true, 1.5, 10, Utc::now()).await.unwrap();
        assert_eq!(first.invocations, 1);
        assert_eq!(first.successes, 1);

        let second = record_run(&pool, "research", false, 0.5, 5, Utc::now()).await.unwrap();
        assert_eq!(second.invocations, 2);
        assert_eq!(second.successes, 1);
        assert_eq!(second.total_cost, 2.0);
        assert_eq!(second.total_duration_ms, 15);

        assert_eq!(get_stats(&pool, "research").await.unwrap(), second);
        assert!(matches!(get_stats(&pool, "missing").await, Err(DbError::NotFound { table: "procedural_stats", .. })));
    }

    #[tokio::test]
    async fn list_stats_is_sorted_by_name() {
        let pool = in_memory().await.expect("pool");
        record_run(&pool, "b", true, 0.0, 0, Utc::now()).await.unwrap();
        record_run(&pool, "a", true, 0.0, 0, Utc::now()).await.unwrap();

        let names: Vec<String> = list_stats(&pool).await.unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}

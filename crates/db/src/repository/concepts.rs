//! Semantic-memory repository functions.
//!
//! Similarity search happens in the memory crate; this layer only stores
//! and lists rows.

use sqlx::SqlitePool;

use crate::{DbError, models::ConceptRow};

/// Insert one concept.
pub async fn insert_concept(pool: &SqlitePool, row: &ConceptRow) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO concepts (id, embedding, content, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&row.id)
    .bind(&row.embedding)
    .bind(&row.content)
    .bind(row.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Every concept in insertion order.
pub async fn list_concepts(pool: &SqlitePool) -> Result<Vec<ConceptRow>, DbError> {
    let rows = sqlx::query_as::<_, ConceptRow>(
        "SELECT id, embedding, content, created_at FROM concepts ORDER BY seq ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

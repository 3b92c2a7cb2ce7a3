//! Document persistence.
//!
//! Each record is stored whole as JSONB under `(collection, id)`. Queries
//! beyond "load a collection" run against the in-memory stores, so the
//! table needs no per-resource columns.

use sqlx::PgPool;
use uuid::Uuid;

use crate::records::Document;

#[derive(Debug, sqlx::FromRow)]
struct DocumentRow {
    id: Uuid,
    body: serde_json::Value,
}

/// Insert or replace a record's document.
pub async fn upsert<T: Document>(pool: &PgPool, record: &T) -> Result<(), sqlx::Error> {
    let body = serde_json::to_value(record).map_err(|e| {
        tracing::error!(collection = T::COLLECTION, error = %e, "failed to serialize record");
        sqlx::Error::Encode(Box::new(e))
    })?;

    sqlx::query(
        "INSERT INTO documents (collection, id, org_id, body, updated_at)
         VALUES ($1, $2, $3, $4, NOW())
         ON CONFLICT (collection, id)
         DO UPDATE SET org_id = EXCLUDED.org_id, body = EXCLUDED.body, updated_at = NOW()",
    )
    .bind(T::COLLECTION)
    .bind(record.id())
    .bind(record.org_id())
    .bind(&body)
    .execute(pool)
    .await?;

    Ok(())
}

/// Delete a document. Returns whether a row was removed.
pub async fn delete(pool: &PgPool, collection: &str, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
        .bind(collection)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Load every document of `T`'s collection.
///
/// A document that no longer deserializes fails the load rather than being
/// skipped, so a schema mismatch is caught at startup.
pub async fn load_all<T: Document>(pool: &PgPool) -> Result<Vec<T>, sqlx::Error> {
    let rows = sqlx::query_as::<_, DocumentRow>(
        "SELECT id, body FROM documents WHERE collection = $1",
    )
    .bind(T::COLLECTION)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            serde_json::from_value(row.body).map_err(|e| {
                sqlx::Error::Protocol(format!(
                    "invalid {} document {}: {e}",
                    T::COLLECTION,
                    row.id
                ))
            })
        })
        .collect()
}

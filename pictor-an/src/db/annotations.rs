//! Annotation record persistence
//!
//! One table, keyed by the correlation identifier. Lifecycle: create with a
//! null annotation (persistence stage), mutate the annotation once (update
//! stage), read-only thereafter. No deletion.

use pictor_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// The sole persistent entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationRecord {
    /// Correlation identifier, immutable after creation
    pub task_id: Uuid,
    /// Public URL of the stored asset, set exactly once
    pub file_url: String,
    /// Model output; NULL until the update stage succeeds
    pub annotation: Option<String>,
}

/// Create the record for a task, tolerating redelivery
///
/// Message delivery is at-least-once, so this is an insert-or-ignore keyed by
/// `task_id` rather than a bare insert: a redelivered persistence stage finds
/// the row already present and leaves it untouched (preserving `file_url`
/// immutability) instead of failing on the duplicate key.
pub async fn upsert_record(pool: &SqlitePool, task_id: Uuid, file_url: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO annotations (task_id, file_url, annotation, created_at, updated_at)
        VALUES (?, ?, NULL, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        ON CONFLICT(task_id) DO NOTHING
        "#,
    )
    .bind(task_id.to_string())
    .bind(file_url)
    .execute(pool)
    .await?;

    Ok(())
}

/// Write the annotation into an existing record
///
/// Last-writer-wins on re-runs. Errors with NotFound when no record exists
/// for the identifier, which indicates the persistence stage did not run or
/// has not been observed yet.
pub async fn set_annotation(pool: &SqlitePool, task_id: Uuid, annotation: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE annotations
        SET annotation = ?, updated_at = CURRENT_TIMESTAMP
        WHERE task_id = ?
        "#,
    )
    .bind(annotation)
    .bind(task_id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!(
            "No annotation record for task {}",
            task_id
        )));
    }

    Ok(())
}

/// Load a record by correlation identifier
pub async fn load_record(pool: &SqlitePool, task_id: Uuid) -> Result<Option<AnnotationRecord>> {
    let row = sqlx::query(
        r#"
        SELECT task_id, file_url, annotation
        FROM annotations
        WHERE task_id = ?
        "#,
    )
    .bind(task_id.to_string())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let task_id_str: String = row.get("task_id");
            let task_id = Uuid::parse_str(&task_id_str)
                .map_err(|e| Error::Internal(format!("Corrupt task_id in store: {}", e)))?;

            Ok(Some(AnnotationRecord {
                task_id,
                file_url: row.get("file_url"),
                annotation: row.get("annotation"),
            }))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        // One connection, or each pooled connection gets its own :memory: db
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        crate::db::init_tables(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn record_starts_with_null_annotation() {
        let pool = test_pool().await;
        let task_id = Uuid::new_v4();

        upsert_record(&pool, task_id, "http://storage.local/x.jpg")
            .await
            .unwrap();

        let record = load_record(&pool, task_id).await.unwrap().unwrap();
        assert_eq!(record.task_id, task_id);
        assert_eq!(record.file_url, "http://storage.local/x.jpg");
        assert!(record.annotation.is_none());
    }

    #[tokio::test]
    async fn redelivered_upsert_leaves_one_record() {
        let pool = test_pool().await;
        let task_id = Uuid::new_v4();

        upsert_record(&pool, task_id, "http://storage.local/x.jpg")
            .await
            .unwrap();
        upsert_record(&pool, task_id, "http://storage.local/x.jpg")
            .await
            .unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM annotations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn redelivery_does_not_overwrite_file_url() {
        let pool = test_pool().await;
        let task_id = Uuid::new_v4();

        upsert_record(&pool, task_id, "http://storage.local/original.jpg")
            .await
            .unwrap();
        upsert_record(&pool, task_id, "http://storage.local/other.jpg")
            .await
            .unwrap();

        let record = load_record(&pool, task_id).await.unwrap().unwrap();
        assert_eq!(record.file_url, "http://storage.local/original.jpg");
    }

    #[tokio::test]
    async fn set_annotation_updates_existing_record() {
        let pool = test_pool().await;
        let task_id = Uuid::new_v4();

        upsert_record(&pool, task_id, "http://storage.local/x.jpg")
            .await
            .unwrap();
        set_annotation(&pool, task_id, "a cat on a windowsill")
            .await
            .unwrap();

        let record = load_record(&pool, task_id).await.unwrap().unwrap();
        assert_eq!(record.annotation.as_deref(), Some("a cat on a windowsill"));
    }

    #[tokio::test]
    async fn set_annotation_on_missing_record_is_not_found() {
        let pool = test_pool().await;

        let err = set_annotation(&pool, Uuid::new_v4(), "text")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn rerun_update_is_last_writer_wins() {
        let pool = test_pool().await;
        let task_id = Uuid::new_v4();

        upsert_record(&pool, task_id, "http://storage.local/x.jpg")
            .await
            .unwrap();
        set_annotation(&pool, task_id, "first").await.unwrap();
        set_annotation(&pool, task_id, "second").await.unwrap();

        let record = load_record(&pool, task_id).await.unwrap().unwrap();
        assert_eq!(record.annotation.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn load_missing_record_is_none() {
        let pool = test_pool().await;
        assert!(load_record(&pool, Uuid::new_v4()).await.unwrap().is_none());
    }
}

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{types::Json, PgPool, Row};
use uuid::Uuid;

use crate::database::manager::{DatabaseError, DatabaseManager};
use crate::database::store::{Collection, DocumentStore};

/// Document store over one JSONB table per collection.
///
/// Table names come from `Collection::table_name`, never from request input,
/// so formatting them into SQL is safe.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(manager: &DatabaseManager) -> Self {
        Self {
            pool: manager.pool().clone(),
        }
    }
}

fn map_insert_error(err: sqlx::Error, collection: Collection, id: Uuid) -> DatabaseError {
    match err {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            DatabaseError::Conflict(format!("duplicate document {} in {}", id, collection))
        }
        other => DatabaseError::Sqlx(other),
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, collection: Collection, id: Uuid) -> Result<Option<Value>, DatabaseError> {
        let sql = format!("SELECT doc FROM \"{}\" WHERE id = $1", collection.table_name());
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(match row {
            Some(row) => Some(row.try_get::<Json<Value>, _>("doc")?.0),
            None => None,
        })
    }

    async fn find_all(&self, collection: Collection) -> Result<Vec<Value>, DatabaseError> {
        let sql = format!("SELECT doc FROM \"{}\" ORDER BY seq", collection.table_name());
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|row| -> Result<Value, DatabaseError> {
                Ok(row.try_get::<Json<Value>, _>("doc")?.0)
            })
            .collect()
    }

    async fn find_one_by(
        &self,
        collection: Collection,
        field: &str,
        value: &str,
    ) -> Result<Option<Value>, DatabaseError> {
        let sql = format!(
            "SELECT doc FROM \"{}\" WHERE doc ->> $1 = $2 ORDER BY seq LIMIT 1",
            collection.table_name()
        );
        let row = sqlx::query(&sql)
            .bind(field)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(row) => Some(row.try_get::<Json<Value>, _>("doc")?.0),
            None => None,
        })
    }

    async fn insert(&self, collection: Collection, id: Uuid, doc: Value) -> Result<(), DatabaseError> {
        let sql = format!(
            "INSERT INTO \"{}\" (id, doc) VALUES ($1, $2)",
            collection.table_name()
        );
        sqlx::query(&sql)
            .bind(id)
            .bind(Json(doc))
            .execute(&self.pool)
            .await
            .map_err(|e| map_insert_error(e, collection, id))?;
        Ok(())
    }

    async fn upsert(&self, collection: Collection, id: Uuid, doc: Value) -> Result<(), DatabaseError> {
        let sql = format!(
            "INSERT INTO \"{}\" (id, doc) VALUES ($1, $2)
             ON CONFLICT (id) DO UPDATE SET doc = EXCLUDED.doc, updated_at = now()",
            collection.table_name()
        );
        sqlx::query(&sql)
            .bind(id)
            .bind(Json(doc))
            .execute(&self.pool)
            .await
            .map_err(|e| map_insert_error(e, collection, id))?;
        Ok(())
    }

    async fn merge_update(
        &self,
        collection: Collection,
        id: Uuid,
        patch: Map<String, Value>,
    ) -> Result<Option<Value>, DatabaseError> {
        // jsonb || jsonb replaces top-level keys, which is the patch semantics we want
        let sql = format!(
            "UPDATE \"{}\" SET doc = doc || $2, updated_at = now() WHERE id = $1 RETURNING doc",
            collection.table_name()
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(Json(Value::Object(patch)))
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(row) => Some(row.try_get::<Json<Value>, _>("doc")?.0),
            None => None,
        })
    }

    async fn delete(&self, collection: Collection, id: Uuid) -> Result<bool, DatabaseError> {
        let sql = format!("DELETE FROM \"{}\" WHERE id = $1", collection.table_name());
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{types::Json, PgPool, Row};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::{is_valid_identifier, Document, DocumentStore, Filter, StoreError, ID_FIELD};

/// Document store over one tenant database. Each collection is a table of
/// `(id UUID, doc JSONB)`; filters use JSONB containment.
pub struct PgDocumentStore {
    pool: PgPool,
    ready: RwLock<HashSet<String>>,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            ready: RwLock::new(HashSet::new()),
        }
    }

    /// Quote SQL identifier to prevent injection
    fn quote_identifier(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Validate the collection name and create its table on first use
    async fn table(&self, collection: &str) -> Result<String, StoreError> {
        if !is_valid_identifier(collection) {
            return Err(StoreError::InvalidName(collection.to_string()));
        }
        let table = Self::quote_identifier(collection);

        {
            let ready = self.ready.read().await;
            if ready.contains(collection) {
                return Ok(table);
            }
        }

        let mut ready = self.ready.write().await;
        if ready.contains(collection) {
            return Ok(table);
        }

        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (id UUID PRIMARY KEY, doc JSONB NOT NULL)",
            table
        );
        match sqlx::query(&ddl).execute(&self.pool).await {
            Ok(_) => info!("Ensured collection table: {}", collection),
            // Another process created the table between the existence check and the insert
            Err(e) if Self::is_concurrent_create(&e) => {
                debug!("Collection table {} created concurrently", collection)
            }
            Err(e) => return Err(e.into()),
        }

        ready.insert(collection.to_string());
        Ok(table)
    }

    /// `CREATE TABLE IF NOT EXISTS` racing another session fails with a unique
    /// violation on the catalog (23505) or duplicate_table (42P07)
    fn is_concurrent_create(err: &sqlx::Error) -> bool {
        match err {
            sqlx::Error::Database(db) => matches!(db.code().as_deref(), Some("23505") | Some("42P07")),
            _ => false,
        }
    }

    fn row_to_document(row: &sqlx::postgres::PgRow) -> Result<Document, StoreError> {
        let id: Uuid = row.try_get("id")?;
        let Json(mut doc): Json<Document> = row.try_get("doc")?;
        doc.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        Ok(doc)
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>, StoreError> {
        let table = self.table(collection).await?;
        let sql = format!("SELECT id, doc FROM {} WHERE doc @> $1 LIMIT 1", table);

        let row = sqlx::query(&sql)
            .bind(Json(filter))
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_document).transpose()
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError> {
        let table = self.table(collection).await?;
        let sql = format!(
            "SELECT id, doc FROM {} WHERE doc @> $1 ORDER BY doc->>'created_at', id LIMIT $2",
            table
        );

        let rows = sqlx::query(&sql)
            .bind(Json(filter))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        debug!("find_many {} returned {} rows", collection, rows.len());
        rows.iter().map(Self::row_to_document).collect()
    }

    async fn insert_one(&self, collection: &str, mut document: Document) -> Result<String, StoreError> {
        let table = self.table(collection).await?;
        document.remove(ID_FIELD);

        let id = Uuid::new_v4();
        let sql = format!("INSERT INTO {} (id, doc) VALUES ($1, $2)", table);
        sqlx::query(&sql)
            .bind(id)
            .bind(Json(&document))
            .execute(&self.pool)
            .await?;

        Ok(id.to_string())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        mut fields: Document,
    ) -> Result<bool, StoreError> {
        let table = self.table(collection).await?;
        fields.remove(ID_FIELD);

        let sql = format!(
            "UPDATE {t} SET doc = doc || $2 WHERE id = (SELECT id FROM {t} WHERE doc @> $1 LIMIT 1)",
            t = table
        );
        let result = sqlx::query(&sql)
            .bind(Json(filter))
            .bind(Json(&fields))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<bool, StoreError> {
        let table = self.table(collection).await?;
        let sql = format!(
            "DELETE FROM {t} WHERE id = (SELECT id FROM {t} WHERE doc @> $1 LIMIT 1)",
            t = table
        );
        let result = sqlx::query(&sql)
            .bind(Json(filter))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

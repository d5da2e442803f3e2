// SQLite Document Store - JSON documents in one table keyed by collection and id
// Writes read-modify-write the JSON body inside a transaction

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::error::{AppError, AppResult};
use crate::store::{
    apply_increments, check_unique, matches_filter, DataAccess, Document, DocumentIdGenerator,
    Filter, ID_FIELD,
};

/// Shared connection pool for every collection stored in one SQLite database
pub type SqlitePoolHandle = SqlitePool;

/// Open (and create if missing) the document database
pub async fn open_pool(url: &str) -> AppResult<SqlitePoolHandle> {
    let options = SqliteConnectOptions::from_str(url)
        .map_err(|e| AppError::DatabaseError(format!("Invalid database url {}: {}", url, e)))?
        .create_if_missing(true);

    // Every in-memory connection is its own database, so pin the pool to one.
    let max_connections = if url.contains(":memory:") { 1 } else { 5 };
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to connect to SQLite: {}", e)))?;

    initialize(&pool).await?;
    Ok(pool)
}

/// Initialize the documents table
pub async fn initialize(pool: &SqlitePool) -> AppResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            data TEXT NOT NULL,
            UNIQUE (collection, id)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| AppError::DatabaseError(format!("Failed to create documents table: {}", e)))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection, seq)")
        .execute(pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create documents index: {}", e)))?;

    Ok(())
}

/// SQLite-backed collection storing each document as a JSON text column
#[derive(Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
    collection: String,
    unique_fields: Vec<String>,
    ids: Arc<DocumentIdGenerator>,
}

impl SqliteDocumentStore {
    pub fn new(pool: SqlitePool, collection: &str) -> Self {
        Self {
            pool,
            collection: collection.to_string(),
            unique_fields: Vec::new(),
            ids: Arc::new(DocumentIdGenerator::default()),
        }
    }

    pub fn with_unique_fields(mut self, fields: Vec<String>) -> Self {
        self.unique_fields = fields;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<DocumentIdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    async fn load_all<'e, E>(&self, executor: E) -> AppResult<Vec<Document>>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let rows = sqlx::query("SELECT data FROM documents WHERE collection = ? ORDER BY seq")
            .bind(&self.collection)
            .fetch_all(executor)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to read {}: {}", self.collection, e))
            })?;

        rows.iter().map(|row| decode(&row.get::<String, _>("data"))).collect()
    }

    async fn load_one<'e, E>(&self, executor: E, id: &str) -> AppResult<Option<Document>>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let row = sqlx::query("SELECT data FROM documents WHERE collection = ? AND id = ?")
            .bind(&self.collection)
            .bind(id)
            .fetch_optional(executor)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to get {} {}: {}", self.collection, id, e))
            })?;

        row.map(|row| decode(&row.get::<String, _>("data"))).transpose()
    }

    /// Read-modify-write one document inside a transaction
    async fn modify<F>(&self, id: &str, change: F) -> AppResult<bool>
    where
        F: FnOnce(&mut Document) -> AppResult<()> + Send,
    {
        let mut tx = self.pool.begin().await?;

        let Some(mut doc) = self.load_one(&mut *tx, id).await? else {
            return Ok(false);
        };
        change(&mut doc)?;

        if !self.unique_fields.is_empty() {
            let others = self.load_all(&mut *tx).await?;
            check_unique(&self.unique_fields, &doc, others.iter())?;
        }

        sqlx::query("UPDATE documents SET data = ? WHERE collection = ? AND id = ?")
            .bind(encode(&doc)?)
            .bind(&self.collection)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to update {} {}: {}", self.collection, id, e))
            })?;

        tx.commit().await?;
        Ok(true)
    }
}

fn decode(data: &str) -> AppResult<Document> {
    match serde_json::from_str::<Value>(data)? {
        Value::Object(doc) => Ok(doc),
        _ => Err(AppError::DatabaseError("Stored document is not an object".to_string())),
    }
}

fn encode(doc: &Document) -> AppResult<String> {
    Ok(serde_json::to_string(doc)?)
}

#[async_trait]
impl DataAccess for SqliteDocumentStore {
    async fn find_one(&self, filter: &Filter) -> AppResult<Option<Document>> {
        let docs = self.load_all(&self.pool).await?;
        Ok(docs.into_iter().find(|d| matches_filter(d, filter)))
    }

    async fn find(&self, filter: &Filter) -> AppResult<Vec<Document>> {
        let docs = self.load_all(&self.pool).await?;
        Ok(docs.into_iter().filter(|d| matches_filter(d, filter)).collect())
    }

    async fn find_one_by_id(&self, id: &str) -> AppResult<Option<Document>> {
        self.load_one(&self.pool, id).await
    }

    async fn insert_one(&self, mut doc: Document) -> AppResult<Document> {
        let id = match doc.get(ID_FIELD).and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => self.ids.next_string(),
        };
        doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));

        let mut tx = self.pool.begin().await?;
        if !self.unique_fields.is_empty() {
            let others = self.load_all(&mut *tx).await?;
            check_unique(&self.unique_fields, &doc, others.iter())?;
        }

        let result = sqlx::query("INSERT INTO documents (collection, id, data) VALUES (?, ?, ?)")
            .bind(&self.collection)
            .bind(&id)
            .bind(encode(&doc)?)
            .execute(&mut *tx)
            .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(AppError::DuplicateKey(format!("{} already exists", ID_FIELD)));
            }
            Err(e) => {
                return Err(AppError::DatabaseError(format!(
                    "Failed to insert into {}: {}",
                    self.collection, e
                )));
            }
        }

        tx.commit().await?;
        Ok(doc)
    }

    async fn update_one(&self, id: &str, partial: &Document) -> AppResult<bool> {
        let partial = partial.clone();
        self.modify(id, move |doc| {
            for (key, value) in partial {
                if key != ID_FIELD {
                    doc.insert(key, value);
                }
            }
            Ok(())
        })
        .await
    }

    async fn increment_one(&self, id: &str, deltas: &Map<String, Value>) -> AppResult<bool> {
        let deltas = deltas.clone();
        self.modify(id, move |doc| apply_increments(doc, &deltas)).await
    }

    async fn delete_one(&self, id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(&self.collection)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to delete {} {}: {}", self.collection, id, e))
            })?;
        Ok(result.rows_affected() > 0)
    }
}

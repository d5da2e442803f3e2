// In-memory document store - insertion-ordered collection behind an async RwLock

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::error::{AppError, AppResult};
use crate::store::{
    apply_increments, check_unique, matches_filter, DataAccess, Document, DocumentIdGenerator,
    Filter, ID_FIELD,
};

/// Collection kept in process memory; used by tests and as the default store
#[derive(Clone)]
pub struct MemoryStore {
    collection: String,
    documents: Arc<RwLock<Vec<Document>>>,
    unique_fields: Vec<String>,
    ids: Arc<DocumentIdGenerator>,
}

impl MemoryStore {
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            documents: Arc::new(RwLock::new(Vec::new())),
            unique_fields: Vec::new(),
            ids: Arc::new(DocumentIdGenerator::default()),
        }
    }

    /// Enforce distinct values for these fields on insert and update
    pub fn with_unique_fields(mut self, fields: Vec<String>) -> Self {
        self.unique_fields = fields;
        self
    }

    /// Share one id generator across collections
    pub fn with_id_generator(mut self, ids: Arc<DocumentIdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

fn doc_id(doc: &Document) -> Option<&str> {
    doc.get(ID_FIELD).and_then(Value::as_str)
}

#[async_trait]
impl DataAccess for MemoryStore {
    async fn find_one(&self, filter: &Filter) -> AppResult<Option<Document>> {
        let documents = self.documents.read().await;
        Ok(documents.iter().find(|d| matches_filter(d, filter)).cloned())
    }

    async fn find(&self, filter: &Filter) -> AppResult<Vec<Document>> {
        let documents = self.documents.read().await;
        Ok(documents.iter().filter(|d| matches_filter(d, filter)).cloned().collect())
    }

    async fn find_one_by_id(&self, id: &str) -> AppResult<Option<Document>> {
        let documents = self.documents.read().await;
        Ok(documents.iter().find(|d| doc_id(d) == Some(id)).cloned())
    }

    async fn insert_one(&self, mut doc: Document) -> AppResult<Document> {
        let mut documents = self.documents.write().await;

        let id = match doc_id(&doc) {
            Some(id) => id.to_string(),
            None => self.ids.next_string(),
        };
        if documents.iter().any(|d| doc_id(d) == Some(id.as_str())) {
            return Err(AppError::DuplicateKey(format!("{} already exists", ID_FIELD)));
        }
        doc.insert(ID_FIELD.to_string(), Value::String(id));
        check_unique(&self.unique_fields, &doc, documents.iter())?;

        documents.push(doc.clone());
        tracing::debug!("Inserted document into {}", self.collection);
        Ok(doc)
    }

    async fn update_one(&self, id: &str, partial: &Document) -> AppResult<bool> {
        let mut documents = self.documents.write().await;
        let Some(index) = documents.iter().position(|d| doc_id(d) == Some(id)) else {
            return Ok(false);
        };

        let mut updated = documents[index].clone();
        for (key, value) in partial {
            if key != ID_FIELD {
                updated.insert(key.clone(), value.clone());
            }
        }
        check_unique(&self.unique_fields, &updated, documents.iter())?;

        documents[index] = updated;
        Ok(true)
    }

    async fn increment_one(&self, id: &str, deltas: &Map<String, Value>) -> AppResult<bool> {
        let mut documents = self.documents.write().await;
        match documents.iter_mut().find(|d| doc_id(d) == Some(id)) {
            Some(doc) => {
                apply_increments(doc, deltas)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_one(&self, id: &str) -> AppResult<bool> {
        let mut documents = self.documents.write().await;
        let before = documents.len();
        documents.retain(|d| doc_id(d) != Some(id));
        Ok(documents.len() != before)
    }
}

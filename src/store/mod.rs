// Document Store Interface - Narrow data-access contract consumed by the runtime
// Each registered entity owns one handle; ids are opaque strings at this boundary

pub mod id_generator;
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::AppResult;

pub use id_generator::{is_valid_id, DocumentIdGenerator};
pub use memory::MemoryStore;
pub use sqlite::{SqliteDocumentStore, SqlitePoolHandle};

/// A stored document: a JSON object whose `id` field is the primary key
pub type Document = Map<String, Value>;

/// Equality filter: every key must match the document's value
pub type Filter = Map<String, Value>;

/// Primary-key field of every stored document
pub const ID_FIELD: &str = "id";

/// Data-access handle for one collection
#[async_trait]
pub trait DataAccess: Send + Sync {
    async fn find_one(&self, filter: &Filter) -> AppResult<Option<Document>>;
    async fn find(&self, filter: &Filter) -> AppResult<Vec<Document>>;
    async fn find_one_by_id(&self, id: &str) -> AppResult<Option<Document>>;
    /// Insert a document, assigning an id when it has none
    async fn insert_one(&self, doc: Document) -> AppResult<Document>;
    async fn update_one(&self, id: &str, partial: &Document) -> AppResult<bool>;
    /// Add numeric deltas to the named fields; missing fields start at zero
    async fn increment_one(&self, id: &str, deltas: &Map<String, Value>) -> AppResult<bool>;
    async fn delete_one(&self, id: &str) -> AppResult<bool>;
}

/// Whether `doc` satisfies an equality filter
pub fn matches_filter(doc: &Document, filter: &Filter) -> bool {
    filter.iter().all(|(key, expected)| {
        let actual = doc.get(key).unwrap_or(&Value::Null);
        values_equal(actual, expected)
    })
}

// Numbers compare by value so 5 and 5.0 match.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Apply numeric deltas in place
pub(crate) fn apply_increments(doc: &mut Document, deltas: &Map<String, Value>) -> AppResult<()> {
    for (key, delta) in deltas {
        let delta = delta.as_f64().ok_or_else(|| {
            crate::error::AppError::BadRequest(format!("{} increment must be a number", key))
        })?;
        let current = doc.get(key).and_then(Value::as_f64).unwrap_or(0.0);
        doc.insert(key.clone(), number_value(current + delta));
    }
    Ok(())
}

/// JSON number that stays integral when the value has no fraction
pub fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

/// Reject a document whose unique fields collide with another stored document
pub(crate) fn check_unique<'a>(
    unique_fields: &[String],
    doc: &Document,
    others: impl Iterator<Item = &'a Document>,
) -> AppResult<()> {
    let own_id = doc.get(ID_FIELD);
    for other in others {
        if other.get(ID_FIELD) == own_id {
            continue;
        }
        for field in unique_fields {
            match (doc.get(field), other.get(field)) {
                (Some(a), Some(b)) if !a.is_null() && values_equal(a, b) => {
                    return Err(crate::error::AppError::DuplicateKey(format!(
                        "{} already exists",
                        field
                    )));
                }
                _ => {}
            }
        }
    }
    Ok(())
}

pub mod manager;
pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub use manager::{StoreBackend, StoreManager};
pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;

/// A stored document. Field `id` carries the store-assigned identifier on reads.
pub type Document = Map<String, Value>;

/// Field equality filter; an empty map matches every document.
pub type Filter = Map<String, Value>;

/// Tenant-scoped store handle leased to a single request
pub type StoreHandle = Arc<dyn DocumentStore>;

/// Field name holding the store-assigned identifier
pub const ID_FIELD: &str = "id";

/// Errors from document store backends
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Invalid identifier: {0}")]
    InvalidName(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Collection-oriented document operations against one tenant's database
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>, StoreError>;

    async fn find_many(
        &self,
        collection: &str,
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError>;

    /// Insert a document and return its generated id
    async fn insert_one(&self, collection: &str, document: Document) -> Result<String, StoreError>;

    /// Merge `fields` into the first matching document. Returns false when nothing matched.
    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        fields: Document,
    ) -> Result<bool, StoreError>;

    /// Remove the first matching document. Returns false when nothing matched.
    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<bool, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Accepts [A-Za-z0-9_]+ for tenant databases and collection tables
pub fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Build a single-field equality filter
pub fn filter_eq(field: &str, value: impl Into<Value>) -> Filter {
    let mut filter = Filter::new();
    filter.insert(field.to_string(), value.into());
    filter
}

/// True when every filter field is present in the document with an equal value
pub fn matches(document: &Document, filter: &Filter) -> bool {
    filter
        .iter()
        .all(|(field, expected)| document.get(field) == Some(expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validates_identifiers() {
        assert!(is_valid_identifier("tenant_acme"));
        assert!(is_valid_identifier("example"));
        assert!(is_valid_identifier("Db42"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("tenant-acme"));
        assert!(!is_valid_identifier("x\"; DROP TABLE example"));
    }

    #[test]
    fn empty_filter_matches_everything() {
        let doc = json!({"name": "a"}).as_object().cloned().unwrap();
        assert!(matches(&doc, &Filter::new()));
    }

    #[test]
    fn filter_requires_equal_values() {
        let doc = json!({"name": "a", "kind": "x"}).as_object().cloned().unwrap();
        assert!(matches(&doc, &filter_eq("name", "a")));
        assert!(!matches(&doc, &filter_eq("name", "b")));
        assert!(!matches(&doc, &filter_eq("missing", "a")));
    }
}

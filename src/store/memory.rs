use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{is_valid_identifier, matches, Document, DocumentStore, Filter, StoreError, ID_FIELD};

/// In-process document store for a single tenant. Documents keep insertion order.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_collection(collection: &str) -> Result<(), StoreError> {
        if !is_valid_identifier(collection) {
            return Err(StoreError::InvalidName(collection.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>, StoreError> {
        Self::check_collection(collection)?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| matches(doc, filter)))
            .cloned())
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError> {
        Self::check_collection(collection)?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| matches(doc, filter))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert_one(&self, collection: &str, mut document: Document) -> Result<String, StoreError> {
        Self::check_collection(collection)?;
        let id = Uuid::new_v4().to_string();
        document.insert(ID_FIELD.to_string(), Value::String(id.clone()));

        let mut collections = self.collections.write().await;
        collections.entry(collection.to_string()).or_default().push(document);
        Ok(id)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        fields: Document,
    ) -> Result<bool, StoreError> {
        Self::check_collection(collection)?;
        let mut collections = self.collections.write().await;
        let Some(doc) = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|doc| matches(doc, filter)))
        else {
            return Ok(false);
        };

        for (field, value) in fields {
            if field != ID_FIELD {
                doc.insert(field, value);
            }
        }
        Ok(true)
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<bool, StoreError> {
        Self::check_collection(collection)?;
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(false);
        };

        match docs.iter().position(|doc| matches(doc, filter)) {
            Some(index) => {
                docs.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::filter_eq;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn insert_assigns_id_and_find_returns_it() {
        let store = MemoryStore::new();
        let id = store.insert_one("example", doc(json!({"name": "a"}))).await.unwrap();

        let found = store.find_one("example", &filter_eq("name", "a")).await.unwrap().unwrap();
        assert_eq!(found.get("id"), Some(&json!(id)));
        assert!(store.find_one("example", &filter_eq("name", "b")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_many_respects_limit_and_missing_collection() {
        let store = MemoryStore::new();
        assert!(store.find_many("example", &Filter::new(), 10).await.unwrap().is_empty());

        for i in 0..5 {
            store.insert_one("example", doc(json!({"name": format!("n{i}")}))).await.unwrap();
        }
        let docs = store.find_many("example", &Filter::new(), 3).await.unwrap();
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].get("name"), Some(&json!("n0")));
    }

    #[tokio::test]
    async fn update_merges_fields_and_keeps_id() {
        let store = MemoryStore::new();
        let id = store
            .insert_one("example", doc(json!({"name": "a", "color": "red", "size": 1})))
            .await
            .unwrap();

        let updated = store
            .update_one(
                "example",
                &filter_eq("name", "a"),
                doc(json!({"color": "blue", "id": "spoofed"})),
            )
            .await
            .unwrap();
        assert!(updated);

        let found = store.find_one("example", &filter_eq("name", "a")).await.unwrap().unwrap();
        assert_eq!(found.get("color"), Some(&json!("blue")));
        assert_eq!(found.get("size"), Some(&json!(1)));
        assert_eq!(found.get("id"), Some(&json!(id)));

        let missing = store
            .update_one("example", &filter_eq("name", "zzz"), doc(json!({"color": "x"})))
            .await
            .unwrap();
        assert!(!missing);
    }

    #[tokio::test]
    async fn delete_reports_whether_anything_matched() {
        let store = MemoryStore::new();
        store.insert_one("example", doc(json!({"name": "a"}))).await.unwrap();

        assert!(store.delete_one("example", &filter_eq("name", "a")).await.unwrap());
        assert!(!store.delete_one("example", &filter_eq("name", "a")).await.unwrap());
        assert!(!store.delete_one("other", &filter_eq("name", "a")).await.unwrap());
    }

    #[tokio::test]
    async fn rejects_invalid_collection_names() {
        let store = MemoryStore::new();
        let err = store.find_one("bad-name", &Filter::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidName(_)));
    }
}

//! In-memory document store.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use crate::core::{AllDocsRequest, DocMeta, DocumentStore, FindRequest, Prefixer, StoreError};

type Collection = BTreeMap<String, Value>;

/// Document store keeping one ordered collection per `(prefix, doctype)`.
///
/// Collections are created lazily by the first write. Stored documents carry
/// their `_id` and `_rev` fields.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<(String, String), Collection>>,
}

fn key(db: &dyn Prefixer, doctype: &str) -> (String, String) {
    (db.db_prefix().to_owned(), doctype.to_owned())
}

fn next_rev(rev: &str) -> String {
    let generation = rev
        .split_once('-')
        .and_then(|(n, _)| n.parse::<u64>().ok())
        .unwrap_or(0);
    format!("{}-{}", generation + 1, Uuid::new_v4().simple())
}

fn stamp(mut doc: Value, id: &str, rev: &str) -> Result<Value, StoreError> {
    let fields = doc
        .as_object_mut()
        .ok_or_else(|| StoreError::Serialization("document is not an object".into()))?;
    fields.insert("_id".into(), Value::String(id.to_owned()));
    fields.insert("_rev".into(), Value::String(rev.to_owned()));
    Ok(doc)
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop a whole collection, as when a tenant's history is reset.
    pub fn delete_collection(&self, db: &dyn Prefixer, doctype: &str) {
        self.collections.write().remove(&key(db, doctype));
    }

    /// Number of documents in a collection.
    #[must_use]
    pub fn len(&self, db: &dyn Prefixer, doctype: &str) -> usize {
        self.collections
            .read()
            .get(&key(db, doctype))
            .map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get_doc(&self, db: &dyn Prefixer, doctype: &str, id: &str) -> Result<Value, StoreError> {
        self.collections
            .read()
            .get(&key(db, doctype))
            .and_then(|docs| docs.get(id))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{doctype}/{id}")))
    }

    async fn create_doc(&self, db: &dyn Prefixer, doctype: &str, doc: Value) -> Result<DocMeta, StoreError> {
        let id = Uuid::new_v4().simple().to_string();
        let rev = next_rev("");
        let doc = stamp(doc, &id, &rev)?;
        self.collections
            .write()
            .entry(key(db, doctype))
            .or_default()
            .insert(id.clone(), doc);
        Ok(DocMeta { id, rev })
    }

    async fn update_doc(
        &self,
        db: &dyn Prefixer,
        doctype: &str,
        id: &str,
        rev: &str,
        doc: Value,
    ) -> Result<DocMeta, StoreError> {
        let mut collections = self.collections.write();
        let current = collections
            .get_mut(&key(db, doctype))
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::NotFound(format!("{doctype}/{id}")))?;

        let current_rev = current.get("_rev").and_then(Value::as_str).unwrap_or_default();
        if current_rev != rev {
            return Err(StoreError::Conflict(format!(
                "{doctype}/{id}: expected revision {current_rev}, got {rev}"
            )));
        }

        let rev = next_rev(current_rev);
        *current = stamp(doc, id, &rev)?;
        Ok(DocMeta { id: id.to_owned(), rev })
    }

    async fn find_docs(&self, db: &dyn Prefixer, doctype: &str, req: &FindRequest) -> Result<Vec<Value>, StoreError> {
        let collections = self.collections.read();
        let Some(docs) = collections.get(&key(db, doctype)) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .values()
            .filter(|doc| req.selector.matches(doc))
            .take(req.limit)
            .cloned()
            .collect())
    }

    async fn all_docs(&self, db: &dyn Prefixer, doctype: &str, req: &AllDocsRequest) -> Result<Vec<Value>, StoreError> {
        let collections = self.collections.read();
        let Some(docs) = collections.get(&key(db, doctype)) else {
            return Ok(Vec::new());
        };
        let start = if req.start_key.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Included(req.start_key.clone())
        };
        Ok(docs
            .range((start, Bound::Unbounded))
            .take(req.limit)
            .map(|(_, doc)| doc.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::core::{Selector, Tenant};

    #[tokio::test]
    async fn update_requires_the_current_revision() {
        let store = InMemoryStore::new();
        let tenant = Tenant::new("alice.example.net");

        let meta = store.create_doc(&tenant, "io.jobs", json!({"state": "queued"})).await.unwrap();
        assert!(meta.rev.starts_with("1-"));

        let updated = store
            .update_doc(&tenant, "io.jobs", &meta.id, &meta.rev, json!({"state": "running"}))
            .await
            .unwrap();
        assert!(updated.rev.starts_with("2-"));

        let stale = store
            .update_doc(&tenant, "io.jobs", &meta.id, &meta.rev, json!({"state": "done"}))
            .await;
        assert!(matches!(stale, Err(StoreError::Conflict(_))));

        let doc = store.get_doc(&tenant, "io.jobs", &meta.id).await.unwrap();
        assert_eq!(doc["state"], "running");
        assert_eq!(doc["_id"], meta.id.as_str());
        assert_eq!(doc["_rev"], updated.rev.as_str());
    }

    #[tokio::test]
    async fn missing_documents_and_collections_are_not_found() {
        let store = InMemoryStore::new();
        let tenant = Tenant::new("alice.example.net");

        let err = store.update_doc(&tenant, "io.jobs", "nope", "1-x", json!({})).await.unwrap_err();
        assert!(err.is_not_found());

        let meta = store.create_doc(&tenant, "io.jobs", json!({})).await.unwrap();
        store.delete_collection(&tenant, "io.jobs");
        let err = store.get_doc(&tenant, "io.jobs", &meta.id).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn collections_are_isolated_by_prefix() {
        let store = InMemoryStore::new();
        let alice = Tenant::new("alice.example.net");
        let bob = Tenant::new("bob.example.net");

        let meta = store.create_doc(&alice, "io.jobs", json!({"worker": "sendmail"})).await.unwrap();
        assert!(store.get_doc(&bob, "io.jobs", &meta.id).await.is_err());

        let req = FindRequest { use_index: None, selector: Selector::exists("worker"), limit: 10 };
        assert_eq!(store.find_docs(&alice, "io.jobs", &req).await.unwrap().len(), 1);
        assert!(store.find_docs(&bob, "io.jobs", &req).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn all_docs_pages_by_id() {
        let store = InMemoryStore::new();
        let tenant = Tenant::new("alice.example.net");
        for n in 0..5 {
            store.create_doc(&tenant, "io.jobs", json!({ "n": n })).await.unwrap();
        }

        let first = store
            .all_docs(&tenant, "io.jobs", &AllDocsRequest { limit: 3, start_key: String::new() })
            .await
            .unwrap();
        assert_eq!(first.len(), 3);

        let start_key = first[2]["_id"].as_str().unwrap().to_owned();
        let rest = store
            .all_docs(&tenant, "io.jobs", &AllDocsRequest { limit: 10, start_key })
            .await
            .unwrap();
        assert_eq!(rest.len(), 3);
        assert_eq!(rest[0], first[2]);
        assert_eq!(store.len(&tenant, "io.jobs"), 5);
    }
}

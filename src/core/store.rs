//! Document store contract consumed by the job core.
//!
//! Every call is scoped by a [`Prefixer`]: the store keeps one namespace per
//! prefix and never serves a document of one prefix to another.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::StoreError;

/// Tenant identity used to scope storage and notifications.
pub trait Prefixer: Send + Sync {
    /// Storage namespace of the tenant.
    fn db_prefix(&self) -> &str;
    /// Domain name of the tenant.
    fn domain_name(&self) -> &str;
}

/// Plain tenant value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tenant {
    /// Domain name, e.g. `alice.example.net`.
    pub domain: String,
    /// Storage prefix override; the domain is used when absent.
    pub prefix: Option<String>,
}

impl Tenant {
    /// Tenant stored under its own domain name.
    pub fn new(domain: impl Into<String>) -> Self {
        Self { domain: domain.into(), prefix: None }
    }

    /// Tenant stored under an explicit prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }
}

impl Prefixer for Tenant {
    fn db_prefix(&self) -> &str {
        match self.prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => prefix,
            _ => &self.domain,
        }
    }

    fn domain_name(&self) -> &str {
        &self.domain
    }
}

/// Identity assigned by the store to a written document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocMeta {
    /// Document id.
    pub id: String,
    /// New revision.
    pub rev: String,
}

/// Mango-like selector evaluated by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// All sub-selectors match.
    And(Vec<Selector>),
    /// At least one sub-selector matches.
    Or(Vec<Selector>),
    /// Field equals the value.
    Equal(String, Value),
    /// Field is present.
    Exists(String),
}

impl Selector {
    /// `field == value`.
    pub fn equal(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Equal(field.into(), value.into())
    }

    /// `field` is present.
    pub fn exists(field: impl Into<String>) -> Self {
        Self::Exists(field.into())
    }

    /// Evaluate against a JSON document. Only top-level fields are addressed.
    #[must_use]
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Self::And(all) => all.iter().all(|s| s.matches(doc)),
            Self::Or(any) => any.iter().any(|s| s.matches(doc)),
            Self::Equal(field, value) => doc.get(field) == Some(value),
            Self::Exists(field) => doc.get(field).is_some(),
        }
    }
}

/// Indexed query.
#[derive(Debug, Clone)]
pub struct FindRequest {
    /// Index hint; backends without indexes ignore it.
    pub use_index: Option<String>,
    /// Documents must match this selector.
    pub selector: Selector,
    /// Maximum number of documents returned.
    pub limit: usize,
}

/// Identity-ordered listing request.
#[derive(Debug, Clone, Default)]
pub struct AllDocsRequest {
    /// Maximum number of rows.
    pub limit: usize,
    /// First id to return (inclusive); empty starts at the beginning.
    pub start_key: String,
}

/// CRUD and query over tenant-scoped collections.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one document.
    async fn get_doc(&self, db: &dyn Prefixer, doctype: &str, id: &str) -> Result<Value, StoreError>;

    /// Create a document; the store assigns its id and first revision.
    async fn create_doc(&self, db: &dyn Prefixer, doctype: &str, doc: Value) -> Result<DocMeta, StoreError>;

    /// Replace a document at revision `rev`.
    ///
    /// Fails with `StoreError::NotFound` when the document or its collection
    /// is gone and with `StoreError::Conflict` on a stale revision.
    async fn update_doc(
        &self,
        db: &dyn Prefixer,
        doctype: &str,
        id: &str,
        rev: &str,
        doc: Value,
    ) -> Result<DocMeta, StoreError>;

    /// Run an indexed query.
    async fn find_docs(&self, db: &dyn Prefixer, doctype: &str, req: &FindRequest) -> Result<Vec<Value>, StoreError>;

    /// List documents ordered by id.
    async fn all_docs(&self, db: &dyn Prefixer, doctype: &str, req: &AllDocsRequest) -> Result<Vec<Value>, StoreError>;
}

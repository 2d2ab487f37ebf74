//! Resource store abstraction
//!
//! Reconcilers never talk to the Kubernetes API directly. They go through
//! [`Store`], which is implemented by [`KubeStore`] against a live cluster and
//! by [`MemoryStore`] for tests, so domain logic stays store-agnostic.

mod error;
mod kube_store;
mod memory;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use kube::{Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub use error::StoreError;
pub use kube_store::KubeStore;
pub use memory::{ChangeKind, MemoryStore, StoreEvent};

/// A typed object the store can persist
pub trait Object:
    Resource<DynamicType = ()>
    + Clone
    + Serialize
    + DeserializeOwned
    + fmt::Debug
    + Send
    + Sync
    + 'static
{
}

impl<T> Object for T where
    T: Resource<DynamicType = ()>
        + Clone
        + Serialize
        + DeserializeOwned
        + fmt::Debug
        + Send
        + Sync
        + 'static
{
}

/// Identity of a record: optional namespace plus name
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: Option<&str>, name: &str) -> Self {
        Self {
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        }
    }

    pub fn namespaced(namespace: &str, name: &str) -> Self {
        Self::new(Some(namespace), name)
    }

    pub fn cluster(name: &str) -> Self {
        Self::new(None, name)
    }

    pub fn of<K: Resource>(obj: &K) -> Self {
        Self {
            namespace: obj.namespace(),
            name: obj.name_any(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Equality-based label and field selector for list calls
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selector {
    pub labels: BTreeMap<String, String>,
    pub fields: BTreeMap<String, String>,
}

impl Selector {
    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn field(mut self, key: &str, value: &str) -> Self {
        self.fields.insert(key.to_string(), value.to_string());
        self
    }

    /// `k1=v1,k2=v2`, the form accepted by the API server
    pub fn label_selector(&self) -> String {
        join_pairs(&self.labels)
    }

    pub fn field_selector(&self) -> String {
        join_pairs(&self.fields)
    }

    /// Match an object's labels and `metadata.name` / `metadata.namespace` fields
    pub fn matches<K: Resource>(&self, obj: &K) -> bool {
        let labels = obj.labels();
        let labels_match = self
            .labels
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|actual| actual == v));

        let fields_match = self.fields.iter().all(|(k, v)| match k.as_str() {
            "metadata.name" => obj.name_any() == *v,
            "metadata.namespace" => obj.namespace().as_deref() == Some(v.as_str()),
            _ => false,
        });

        labels_match && fields_match
    }
}

fn join_pairs(pairs: &BTreeMap<String, String>) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Versioned object store with optimistic concurrency
///
/// Patches are JSON merge patches (RFC 7386). A patch carrying
/// `metadata.resourceVersion` is rejected with [`StoreError::Conflict`] when
/// the stored version differs.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Fetch a record, `None` if it does not exist
    async fn get<K: Object>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<K>, StoreError>;

    /// List records in one namespace, or across all namespaces when `None`
    async fn list<K: Object>(
        &self,
        namespace: Option<&str>,
        selector: &Selector,
    ) -> Result<Vec<K>, StoreError>;

    async fn create<K: Object>(&self, obj: &K) -> Result<K, StoreError>;

    /// Merge-patch everything except the status subtree
    async fn patch<K: Object>(
        &self,
        namespace: Option<&str>,
        name: &str,
        patch: &Value,
    ) -> Result<K, StoreError>;

    /// Merge-patch the status subtree only
    async fn patch_status<K: Object>(
        &self,
        namespace: Option<&str>,
        name: &str,
        patch: &Value,
    ) -> Result<K, StoreError>;

    /// Request deletion. Records carrying deletion guards are only marked as
    /// terminating; dependents linked by ownership are removed with their owner.
    async fn delete<K: Object>(&self, namespace: Option<&str>, name: &str)
    -> Result<(), StoreError>;
}

/// Ignore not-found errors, for cleanup paths where "already gone" is success
pub fn ignore_not_found<T>(result: Result<T, StoreError>) -> Result<Option<T>, StoreError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

//! In-memory store
//!
//! Behaves like the API server for the parts reconcilers depend on: resource
//! versions with optimistic locking, generation bumps on spec changes,
//! deletion guards (finalizers) holding back removal, and cascading deletion
//! of dependents through owner references. Objects are kept as JSON so any
//! [`Object`] type can be stored.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value, json};
use tokio::sync::broadcast;

use super::{Object, ObjectKey, Selector, Store, StoreError};

/// Kind of change emitted to subscribers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// Change notification, the in-memory counterpart of a watch event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreEvent {
    /// `apiVersion/kind` of the changed object
    pub kind: String,
    pub key: ObjectKey,
    pub change: ChangeKind,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Slot {
    kind: String,
    namespace: String,
    name: String,
}

impl Slot {
    fn new<K: Object>(namespace: Option<&str>, name: &str) -> Self {
        Self {
            kind: type_name::<K>(),
            namespace: namespace.unwrap_or_default().to_string(),
            name: name.to_string(),
        }
    }

    fn key(&self) -> ObjectKey {
        let namespace = (!self.namespace.is_empty()).then_some(self.namespace.as_str());
        ObjectKey::new(namespace, &self.name)
    }

    fn event(&self, change: ChangeKind) -> StoreEvent {
        StoreEvent {
            kind: self.kind.clone(),
            key: self.key(),
            change,
        }
    }
}

fn type_name<K: Object>() -> String {
    format!("{}/{}", K::api_version(&()), K::kind(&()))
}

fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn metadata_mut(value: &mut Value) -> Result<&mut Map<String, Value>, StoreError> {
    value
        .as_object_mut()
        .ok_or_else(|| StoreError::Invalid("object is not a JSON map".to_string()))?
        .entry("metadata")
        .or_insert_with(|| json!({}))
        .as_object_mut()
        .ok_or_else(|| StoreError::Invalid("metadata is not a JSON map".to_string()))
}

fn resource_version(value: &Value) -> Option<&str> {
    value
        .pointer("/metadata/resourceVersion")
        .and_then(Value::as_str)
}

fn uid(value: &Value) -> Option<String> {
    value
        .pointer("/metadata/uid")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn has_finalizers(value: &Value) -> bool {
    value
        .pointer("/metadata/finalizers")
        .and_then(Value::as_array)
        .is_some_and(|f| !f.is_empty())
}

fn is_terminating(value: &Value) -> bool {
    value
        .pointer("/metadata/deletionTimestamp")
        .is_some_and(|ts| !ts.is_null())
}

fn is_owned_by(value: &Value, owner_uid: &str) -> bool {
    value
        .pointer("/metadata/ownerReferences")
        .and_then(Value::as_array)
        .is_some_and(|refs| {
            refs.iter()
                .any(|r| r.get("uid").and_then(Value::as_str) == Some(owner_uid))
        })
}

/// In-memory [`Store`] implementation
pub struct MemoryStore {
    objects: Mutex<BTreeMap<Slot, Value>>,
    version: AtomicU64,
    writes: AtomicU64,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            objects: Mutex::new(BTreeMap::new()),
            version: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            events,
        }
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Number of writes that changed stored state
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of stored objects of kind `K`
    pub fn count<K: Object>(&self) -> usize {
        let kind = type_name::<K>();
        self.lock().keys().filter(|slot| slot.kind == kind).count()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<Slot, Value>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn publish(&self, events: Vec<StoreEvent>) {
        if !events.is_empty() {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        for event in events {
            // No subscribers is fine
            let _ = self.events.send(event);
        }
    }

    fn check_precondition<K: Object>(
        slot: &Slot,
        stored: &Value,
        patch: &Value,
    ) -> Result<(), StoreError> {
        if let Some(expected) = resource_version(patch) {
            let actual = resource_version(stored).unwrap_or_default();
            if expected != actual {
                return Err(StoreError::Conflict {
                    kind: K::kind(&()).to_string(),
                    key: slot.key().to_string(),
                    message: format!(
                        "the object has been modified (expected version {}, found {})",
                        expected, actual
                    ),
                });
            }
        }
        Ok(())
    }

    /// Remove a record and everything transitively owned by it
    ///
    /// Dependents that carry deletion guards are marked terminating instead.
    fn remove_cascading(
        &self,
        objects: &mut BTreeMap<Slot, Value>,
        slot: &Slot,
        events: &mut Vec<StoreEvent>,
    ) -> Result<(), StoreError> {
        let Some(removed) = objects.remove(slot) else {
            return Ok(());
        };
        events.push(slot.event(ChangeKind::Deleted));

        let mut owners: Vec<String> = uid(&removed).into_iter().collect();
        while let Some(owner_uid) = owners.pop() {
            let dependents: Vec<Slot> = objects
                .iter()
                .filter(|(_, v)| is_owned_by(v, &owner_uid))
                .map(|(s, _)| s.clone())
                .collect();

            for dependent in dependents {
                let Some(value) = objects.get_mut(&dependent) else {
                    continue;
                };
                if has_finalizers(value) {
                    if !is_terminating(value) {
                        let version = self.next_version();
                        let meta = metadata_mut(value)?;
                        meta.insert("deletionTimestamp".to_string(), json!(timestamp()));
                        meta.insert("resourceVersion".to_string(), json!(version));
                        events.push(dependent.event(ChangeKind::Updated));
                    }
                } else if let Some(value) = objects.remove(&dependent) {
                    owners.extend(uid(&value));
                    events.push(dependent.event(ChangeKind::Deleted));
                }
            }
        }
        Ok(())
    }

    fn not_found<K: Object>(slot: &Slot) -> StoreError {
        StoreError::NotFound {
            kind: K::kind(&()).to_string(),
            key: slot.key().to_string(),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get<K: Object>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<K>, StoreError> {
        let slot = Slot::new::<K>(namespace, name);
        let value = self.lock().get(&slot).cloned();
        Ok(value.map(serde_json::from_value).transpose()?)
    }

    async fn list<K: Object>(
        &self,
        namespace: Option<&str>,
        selector: &Selector,
    ) -> Result<Vec<K>, StoreError> {
        let kind = type_name::<K>();
        let values: Vec<Value> = self
            .lock()
            .iter()
            .filter(|(slot, _)| slot.kind == kind)
            .filter(|(slot, _)| namespace.is_none_or(|ns| slot.namespace == ns))
            .map(|(_, v)| v.clone())
            .collect();

        let mut objects = Vec::with_capacity(values.len());
        for value in values {
            let obj: K = serde_json::from_value(value)?;
            if selector.matches(&obj) {
                objects.push(obj);
            }
        }
        Ok(objects)
    }

    /// Unlike the API server, status supplied at creation is kept, which lets
    /// tests seed observed state directly.
    async fn create<K: Object>(&self, obj: &K) -> Result<K, StoreError> {
        let name = obj
            .meta()
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| StoreError::Invalid("metadata.name is required".to_string()))?;
        let slot = Slot::new::<K>(obj.meta().namespace.as_deref(), &name);

        let mut value = serde_json::to_value(obj)?;
        let created = {
            let mut objects = self.lock();
            if objects.contains_key(&slot) {
                return Err(StoreError::AlreadyExists {
                    kind: K::kind(&()).to_string(),
                    key: slot.key().to_string(),
                });
            }

            let version = self.next_version();
            let meta = metadata_mut(&mut value)?;
            if !meta.get("uid").is_some_and(Value::is_string) {
                meta.insert("uid".to_string(), json!(uuid::Uuid::new_v4().to_string()));
            }
            meta.insert("resourceVersion".to_string(), json!(version));
            meta.insert("generation".to_string(), json!(1));
            meta.insert("creationTimestamp".to_string(), json!(timestamp()));
            meta.remove("deletionTimestamp");

            objects.insert(slot.clone(), value.clone());
            value
        };

        self.publish(vec![slot.event(ChangeKind::Created)]);
        Ok(serde_json::from_value(created)?)
    }

    async fn patch<K: Object>(
        &self,
        namespace: Option<&str>,
        name: &str,
        patch: &Value,
    ) -> Result<K, StoreError> {
        let slot = Slot::new::<K>(namespace, name);
        let mut events = Vec::new();

        let result = {
            let mut objects = self.lock();
            let stored = objects
                .get(&slot)
                .cloned()
                .ok_or_else(|| Self::not_found::<K>(&slot))?;
            Self::check_precondition::<K>(&slot, &stored, patch)?;

            let mut effective = patch.clone();
            if let Some(map) = effective.as_object_mut() {
                // Status is only writable through the status subresource
                map.remove("status");
            }
            if let Some(meta) = effective
                .get_mut("metadata")
                .and_then(Value::as_object_mut)
            {
                meta.remove("resourceVersion");
                meta.remove("uid");
                meta.remove("generation");
            }

            let mut updated = stored.clone();
            json_patch::merge(&mut updated, &effective);

            if updated != stored {
                let generation = stored
                    .pointer("/metadata/generation")
                    .and_then(Value::as_i64)
                    .unwrap_or(1);
                let spec_changed = updated.get("spec") != stored.get("spec");
                let version = self.next_version();
                let meta = metadata_mut(&mut updated)?;
                meta.insert("resourceVersion".to_string(), json!(version));
                if spec_changed {
                    meta.insert("generation".to_string(), json!(generation + 1));
                }

                if is_terminating(&updated) && !has_finalizers(&updated) {
                    objects.insert(slot.clone(), updated.clone());
                    self.remove_cascading(&mut objects, &slot, &mut events)?;
                } else {
                    objects.insert(slot.clone(), updated.clone());
                    events.push(slot.event(ChangeKind::Updated));
                }
            }
            updated
        };

        self.publish(events);
        Ok(serde_json::from_value(result)?)
    }

    async fn patch_status<K: Object>(
        &self,
        namespace: Option<&str>,
        name: &str,
        patch: &Value,
    ) -> Result<K, StoreError> {
        let slot = Slot::new::<K>(namespace, name);
        let mut events = Vec::new();

        let result = {
            let mut objects = self.lock();
            let stored = objects
                .get(&slot)
                .cloned()
                .ok_or_else(|| Self::not_found::<K>(&slot))?;
            Self::check_precondition::<K>(&slot, &stored, patch)?;

            let mut updated = stored.clone();
            if let Some(status) = patch.get("status") {
                json_patch::merge(&mut updated, &json!({ "status": status }));
            }

            if updated != stored {
                let version = self.next_version();
                metadata_mut(&mut updated)?
                    .insert("resourceVersion".to_string(), json!(version));
                objects.insert(slot.clone(), updated.clone());
                events.push(slot.event(ChangeKind::Updated));
            }
            updated
        };

        self.publish(events);
        Ok(serde_json::from_value(result)?)
    }

    async fn delete<K: Object>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), StoreError> {
        let slot = Slot::new::<K>(namespace, name);
        let mut events = Vec::new();

        {
            let mut objects = self.lock();
            let stored = objects
                .get_mut(&slot)
                .ok_or_else(|| Self::not_found::<K>(&slot))?;

            if has_finalizers(stored) {
                if !is_terminating(stored) {
                    let version = self.next_version();
                    let meta = metadata_mut(stored)?;
                    meta.insert("deletionTimestamp".to_string(), json!(timestamp()));
                    meta.insert("resourceVersion".to_string(), json!(version));
                    events.push(slot.event(ChangeKind::Updated));
                }
            } else {
                self.remove_cascading(&mut objects, &slot, &mut events)?;
            }
        }

        self.publish(events);
        Ok(())
    }
}

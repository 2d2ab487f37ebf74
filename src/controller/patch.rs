//! JSON merge patch (RFC 7386) computation and create-or-patch upserts

use kube::ResourceExt;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::controller::error::{Error, Result};
use crate::store::{Object, Store};

/// Compute the merge patch turning `original` into `modified`
///
/// Keys missing from `modified` become `null`. Arrays and scalars are replaced
/// wholesale. Returns `None` when the documents are equal.
pub fn merge_diff(original: &Value, modified: &Value) -> Option<Value> {
    match (original, modified) {
        (Value::Object(before), Value::Object(after)) => {
            let mut patch = Map::new();
            for (key, new_value) in after {
                match before.get(key) {
                    Some(old_value) => {
                        if let Some(diff) = merge_diff(old_value, new_value) {
                            patch.insert(key.clone(), diff);
                        }
                    }
                    // A null for an absent key is a no-op
                    None if new_value.is_null() => {}
                    None => {
                        patch.insert(key.clone(), new_value.clone());
                    }
                }
            }
            for key in before.keys() {
                if !after.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            (!patch.is_empty()).then_some(Value::Object(patch))
        }
        _ if original == modified => None,
        _ => Some(modified.clone()),
    }
}

fn without_status<K: Serialize>(obj: &K) -> Result<Value> {
    let mut value = serde_json::to_value(obj)?;
    if let Some(map) = value.as_object_mut() {
        map.remove("status");
    }
    Ok(value)
}

/// Patch for everything but status, locked to the original's resource version
pub fn spec_patch<K: Object>(original: &K, modified: &K) -> Result<Option<Value>> {
    let Some(mut patch) = merge_diff(&without_status(original)?, &without_status(modified)?)
    else {
        return Ok(None);
    };

    if let Some(version) = original.resource_version() {
        let map = patch
            .as_object_mut()
            .ok_or_else(|| Error::TransientError("object patch is not a map".to_string()))?;
        let metadata = map.entry("metadata").or_insert_with(|| json!({}));
        if let Some(metadata) = metadata.as_object_mut() {
            metadata.insert("resourceVersion".to_string(), Value::String(version));
        }
    }
    Ok(Some(patch))
}

/// Patch for the status subtree only, as `{"status": ...}`
pub fn status_patch<T: Serialize>(original: Option<&T>, modified: Option<&T>) -> Result<Option<Value>> {
    let before = json!({ "status": serde_json::to_value(original)? });
    let after = json!({ "status": serde_json::to_value(modified)? });
    Ok(merge_diff(&before, &after))
}

/// What an upsert did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Create `desired` or converge the live object towards it
///
/// On an existing object the desired spec replaces the live one, desired labels
/// are merged over live labels and owner references are replaced. Only the
/// resulting diff is written, so an unchanged object costs no write.
pub async fn upsert<S: Store, K: Object>(store: &S, desired: &K) -> Result<(K, UpsertOutcome)> {
    let name = desired
        .meta()
        .name
        .clone()
        .ok_or(Error::MissingObjectKey(".metadata.name"))?;
    let namespace = desired.namespace();

    let Some(live) = store.get::<K>(namespace.as_deref(), &name).await? else {
        let created = store.create(desired).await?;
        debug!(kind = %K::kind(&()), name = %name, "Created object");
        return Ok((created, UpsertOutcome::Created));
    };

    let live_value = serde_json::to_value(&live)?;
    let desired_value = serde_json::to_value(desired)?;
    let mut merged = live_value.clone();

    if let Some(target) = merged.as_object_mut() {
        match desired_value.get("spec") {
            Some(spec) => target.insert("spec".to_string(), spec.clone()),
            None => target.remove("spec"),
        };

        let metadata = target
            .entry("metadata")
            .or_insert_with(|| json!({}))
            .as_object_mut();
        if let Some(metadata) = metadata {
            if let Some(labels) = desired_value
                .pointer("/metadata/labels")
                .and_then(Value::as_object)
            {
                let live_labels = metadata.entry("labels").or_insert_with(|| json!({}));
                if let Some(live_labels) = live_labels.as_object_mut() {
                    for (key, value) in labels {
                        live_labels.insert(key.clone(), value.clone());
                    }
                }
            }
            if let Some(refs) = desired_value.pointer("/metadata/ownerReferences") {
                metadata.insert("ownerReferences".to_string(), refs.clone());
            }
        }
    }

    let Some(mut patch) = merge_diff(&live_value, &merged) else {
        return Ok((live, UpsertOutcome::Unchanged));
    };
    if let (Some(version), Some(map)) = (live.resource_version(), patch.as_object_mut()) {
        let metadata = map.entry("metadata").or_insert_with(|| json!({}));
        if let Some(metadata) = metadata.as_object_mut() {
            metadata.insert("resourceVersion".to_string(), Value::String(version));
        }
    }

    let updated = store.patch::<K>(namespace.as_deref(), &name, &patch).await?;
    debug!(kind = %K::kind(&()), name = %name, "Updated object");
    Ok((updated, UpsertOutcome::Updated))
}

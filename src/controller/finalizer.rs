//! Deletion guard helpers
//!
//! These only mutate the in-memory object; the engine's spec patch persists
//! the change.

use kube::{Resource, ResourceExt};

pub fn is_terminating<K: Resource>(obj: &K) -> bool {
    obj.meta().deletion_timestamp.is_some()
}

pub fn has_finalizer<K: Resource>(obj: &K, finalizer: &str) -> bool {
    obj.finalizers().iter().any(|f| f == finalizer)
}

/// Returns true when the finalizer was added
pub fn add_finalizer<K: Resource>(obj: &mut K, finalizer: &str) -> bool {
    if has_finalizer(obj, finalizer) {
        return false;
    }
    obj.finalizers_mut().push(finalizer.to_string());
    true
}

/// Returns true when the finalizer was removed
pub fn remove_finalizer<K: Resource>(obj: &mut K, finalizer: &str) -> bool {
    if !has_finalizer(obj, finalizer) {
        return false;
    }
    let meta = obj.meta_mut();
    let remaining: Vec<String> = meta
        .finalizers
        .take()
        .unwrap_or_default()
        .into_iter()
        .filter(|f| f != finalizer)
        .collect();
    meta.finalizers = (!remaining.is_empty()).then_some(remaining);
    true
}

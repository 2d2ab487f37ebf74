//! Common utilities for resource generation
//!
//! Label keys shared by every generator, and owner-reference construction.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};

/// Label identifying the app a workload belongs to
pub const APP_GUID_LABEL: &str = "korifi.cloudfoundry.org/app-guid";

/// Label carrying a process type (`web`, `worker`, ...)
pub const PROCESS_TYPE_LABEL: &str = "korifi.cloudfoundry.org/process-type";

pub const TASK_GUID_LABEL: &str = "korifi.cloudfoundry.org/task-guid";

/// Label linking a network policy to the security group that produced it
pub const SECURITY_GROUP_LABEL: &str = "korifi.cloudfoundry.org/security-group";

/// Label distinguishing app, build and task workloads
pub const WORKLOAD_TYPE_LABEL: &str = "korifi.cloudfoundry.org/workload-type";

/// Marker label present on every namespace that backs a space
pub const SPACE_GUID_LABEL: &str = "korifi.cloudfoundry.org/space-guid";

pub const APP_WORKLOAD_TYPE: &str = "app";
pub const BUILD_WORKLOAD_TYPE: &str = "build";
pub const TASK_WORKLOAD_TYPE: &str = "task";

/// Generate an owner reference pointing at `owner`
///
/// A controller reference (`controller: true`) marks the single managing owner;
/// the store garbage collects dependents through either kind.
pub fn owner_reference<K>(owner: &K, controller: bool) -> OwnerReference
where
    K: Resource<DynamicType = ()>,
{
    OwnerReference {
        api_version: K::api_version(&()).to_string(),
        kind: K::kind(&()).to_string(),
        name: owner.name_any(),
        uid: owner.meta().uid.clone().unwrap_or_default(),
        controller: controller.then_some(true),
        block_owner_deletion: controller.then_some(true),
    }
}

/// Add or refresh an owner reference, keyed by owner uid
///
/// Returns true when the object's references changed.
pub fn set_owner_reference<K: Resource>(obj: &mut K, reference: OwnerReference) -> bool {
    let refs = obj.meta_mut().owner_references.get_or_insert_with(Vec::new);
    match refs.iter_mut().find(|r| r.uid == reference.uid) {
        Some(existing) if *existing == reference => false,
        Some(existing) => {
            *existing = reference;
            true
        }
        None => {
            refs.push(reference);
            true
        }
    }
}

/// Labels stamped on a task's derived workload
pub fn task_workload_labels(task_name: &str, app_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (TASK_GUID_LABEL.to_string(), task_name.to_string()),
        (APP_GUID_LABEL.to_string(), app_name.to_string()),
        (WORKLOAD_TYPE_LABEL.to_string(), TASK_WORKLOAD_TYPE.to_string()),
    ])
}

/// Labels stamped on a security group's namespace policies
pub fn security_group_labels(security_group: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(
        SECURITY_GROUP_LABEL.to_string(),
        security_group.to_string(),
    )])
}

//! CFTask CRD definition
//!
//! A CFTask is one run of a command against an app's current droplet. The task
//! controller derives a TaskWorkload from it, mirrors the workload's progress
//! back as conditions and deletes the task once its TTL has elapsed.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{Condition, LocalObjectRef};

/// Condition types set on a CFTask
pub mod task_conditions {
    /// Droplet and quota have been resolved
    pub const INITIALIZED: &str = "Initialized";
    /// The workload has started running
    pub const STARTED: &str = "Started";
    /// The workload finished successfully
    pub const SUCCEEDED: &str = "Succeeded";
    /// The workload failed (or the task was canceled before succeeding)
    pub const FAILED: &str = "Failed";
    /// The task was canceled by a client
    pub const CANCELED: &str = "Canceled";
}

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "korifi.cloudfoundry.org",
    version = "v1alpha1",
    kind = "CFTask",
    plural = "cftasks",
    namespaced,
    status = "CFTaskStatus",
    printcolumn = r#"{"name":"App", "type":"string", "jsonPath":".spec.appRef.name"}"#,
    printcolumn = r#"{"name":"Sequence", "type":"integer", "jsonPath":".status.sequenceId"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CFTaskSpec {
    /// Command to run inside the app's droplet
    pub command: String,

    /// App whose droplet the task runs against
    pub app_ref: LocalObjectRef,

    /// Set by clients to stop the task
    #[serde(default)]
    pub canceled: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CFTaskStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Per-task sequence id, assigned at initialization
    #[serde(default)]
    pub sequence_id: i64,

    #[serde(default, rename = "memoryMB")]
    pub memory_mb: i64,

    #[serde(default, rename = "diskQuotaMB")]
    pub disk_quota_mb: i64,

    /// Build whose droplet the task runs
    #[serde(default)]
    pub droplet_ref: LocalObjectRef,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

//! CFProcess CRD definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{Condition, LocalObjectRef};

/// Process type served by the app's routes
pub const WEB_PROCESS_TYPE: &str = "web";

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "korifi.cloudfoundry.org",
    version = "v1alpha1",
    kind = "CFProcess",
    plural = "cfprocesses",
    namespaced,
    status = "CFProcessStatus",
    printcolumn = r#"{"name":"App", "type":"string", "jsonPath":".spec.appRef.name"}"#,
    printcolumn = r#"{"name":"Type", "type":"string", "jsonPath":".spec.processType"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CFProcessSpec {
    pub app_ref: LocalObjectRef,

    /// Process type, e.g. `web` or `worker`
    pub process_type: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_instances: Option<i32>,

    /// Memory limit in MiB
    #[serde(rename = "memoryMB")]
    pub memory_mb: i64,

    /// Disk quota in MiB
    #[serde(rename = "diskQuotaMB")]
    pub disk_quota_mb: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CFProcessStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

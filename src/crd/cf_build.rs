//! CFBuild CRD definition
//!
//! A staged build carries its droplet (image and process metadata) in status.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{Condition, LocalObjectRef};

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "korifi.cloudfoundry.org",
    version = "v1alpha1",
    kind = "CFBuild",
    plural = "cfbuilds",
    namespaced,
    status = "CFBuildStatus",
    printcolumn = r#"{"name":"App", "type":"string", "jsonPath":".spec.appRef.name"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CFBuildSpec {
    pub package_ref: LocalObjectRef,
    pub app_ref: LocalObjectRef,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staging_memory_mb: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staging_disk_mb: Option<i64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CFBuildStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Populated once staging succeeds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub droplet: Option<BuildDropletStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildDropletStatus {
    pub registry: Registry,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stack: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub process_types: Vec<ProcessType>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<i32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Registry {
    pub image: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_pull_secrets: Vec<LocalObjectRef>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessType {
    #[serde(rename = "type")]
    pub type_: String,
    pub command: String,
}

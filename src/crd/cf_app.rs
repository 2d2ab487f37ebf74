//! CFApp CRD definition
//!
//! Only the fields the task controller reads are modelled: the current droplet,
//! the environment secrets and the Ready condition.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{Condition, LocalObjectRef};

/// CFApp is a Cloud Foundry application
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "korifi.cloudfoundry.org",
    version = "v1alpha1",
    kind = "CFApp",
    plural = "cfapps",
    namespaced,
    status = "CFAppStatus",
    printcolumn = r#"{"name":"Display Name", "type":"string", "jsonPath":".spec.displayName"}"#,
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".spec.desiredState"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CFAppSpec {
    /// User-facing application name
    pub display_name: String,

    /// Whether the app should be running
    #[serde(default)]
    pub desired_state: DesiredState,

    /// The build whose droplet the app currently runs
    #[serde(default)]
    pub current_droplet_ref: LocalObjectRef,

    /// Secret holding user-provided environment variables
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub env_secret_name: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, Default, PartialEq, Eq)]
pub enum DesiredState {
    #[default]
    #[serde(rename = "STOPPED")]
    Stopped,
    #[serde(rename = "STARTED")]
    Started,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CFAppStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Secret containing the rendered VCAP_SERVICES document
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub vcap_services_secret_name: String,

    /// Secret containing the rendered VCAP_APPLICATION document
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub vcap_application_secret_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

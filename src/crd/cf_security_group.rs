//! CFSecurityGroup CRD definition
//!
//! A security group is a list of egress rules bound to app and/or staging
//! workloads, either in selected spaces (namespaces) or globally.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::Condition;

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "korifi.cloudfoundry.org",
    version = "v1alpha1",
    kind = "CFSecurityGroup",
    plural = "cfsecuritygroups",
    shortname = "cfsg",
    namespaced,
    status = "CFSecurityGroupStatus",
    printcolumn = r#"{"name":"Display Name", "type":"string", "jsonPath":".spec.displayName"}"#,
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CFSecurityGroupSpec {
    pub display_name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<SecurityGroupRule>,

    /// Space (namespace) name to the workloads bound in that space
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub spaces: BTreeMap<String, SecurityGroupWorkloads>,

    /// Workloads bound in every space
    #[serde(default)]
    pub globally_enabled: SecurityGroupWorkloads,
}

/// A single egress rule as entered by users
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupRule {
    /// `tcp`, `udp`, `icmp` or `all`
    pub protocol: String,

    /// `80`, `80,443` or `8000-9000`
    #[serde(default)]
    pub ports: String,

    /// `10.0.0.1`, `10.0.0.0/24` or `10.0.0.1-10.0.0.20`
    pub destination: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupWorkloads {
    /// Applies to running app workloads
    #[serde(default)]
    pub running: bool,

    /// Applies to staging (build) workloads
    #[serde(default)]
    pub staging: bool,
}

impl SecurityGroupWorkloads {
    pub fn any(&self) -> bool {
        self.running || self.staging
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CFSecurityGroupStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

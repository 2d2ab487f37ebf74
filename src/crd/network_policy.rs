//! Calico network policy resources
//!
//! The external policy engine consumes these objects verbatim, so field names
//! and value formats are a wire contract.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Namespace-scoped Calico policy
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Default)]
#[kube(
    group = "projectcalico.org",
    version = "v3",
    kind = "NetworkPolicy",
    plural = "networkpolicies",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicySpec {
    /// Calico selector expression matching the workloads the policy applies to
    pub selector: String,

    /// `["Egress"]`
    pub types: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub egress: Vec<EgressRule>,
}

/// Cluster-scoped Calico policy
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Default)]
#[kube(
    group = "projectcalico.org",
    version = "v3",
    kind = "GlobalNetworkPolicy",
    plural = "globalnetworkpolicies"
)]
#[serde(rename_all = "camelCase")]
pub struct GlobalNetworkPolicySpec {
    pub selector: String,

    /// Restricts the policy to namespaces matching this selector
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace_selector: String,

    pub types: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub egress: Vec<EgressRule>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EgressRule {
    pub action: RuleAction,
    pub protocol: Protocol,
    pub destination: EntityRule,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
pub enum RuleAction {
    Allow,
    Deny,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
pub enum Protocol {
    #[serde(rename = "TCP")]
    Tcp,
    #[serde(rename = "UDP")]
    Udp,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EntityRule {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nets: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortRange>,
}

/// Inclusive port range; a single port has `min_port == max_port`
#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PortRange {
    pub min_port: u16,
    pub max_port: u16,
}

impl PortRange {
    pub const fn single(port: u16) -> Self {
        Self {
            min_port: port,
            max_port: port,
        }
    }
}

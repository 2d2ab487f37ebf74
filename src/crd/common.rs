//! Types shared by every custom resource in the `korifi.cloudfoundry.org` group

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group for all Cloud Foundry resources
pub const GROUP: &str = "korifi.cloudfoundry.org";

/// API version for all Cloud Foundry resources
pub const VERSION: &str = "v1alpha1";

/// Status of a condition
#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, Default, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionStatus::True => write!(f, "True"),
            ConditionStatus::False => write!(f, "False"),
            ConditionStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        }
    }
}

/// Status condition following Kubernetes conventions
///
/// Conditions are keyed by `type_`; a status holds at most one condition per type.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition: True, False, or Unknown
    pub status: ConditionStatus,

    /// Reason for the condition's last transition
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Last time the condition status changed (RFC 3339)
    pub last_transition_time: String,

    /// Generation observed when condition was set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Reference to another object in the same namespace
///
/// An empty name means "not set", mirroring core `LocalObjectReference`.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LocalObjectRef {
    #[serde(default)]
    pub name: String,
}

impl LocalObjectRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn is_set(&self) -> bool {
        !self.name.is_empty()
    }
}

//! Supporting types for the Authentication operator CRD

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Whether the operator acts on its operand
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[non_exhaustive]
pub enum ManagementState {
    /// The operator reconciles the OAuth server
    #[default]
    Managed,
    /// The operator leaves the OAuth server alone
    Unmanaged,
    /// The operand should be removed
    Removed,
}

impl std::fmt::Display for ManagementState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Managed => write!(f, "Managed"),
            Self::Unmanaged => write!(f, "Unmanaged"),
            Self::Removed => write!(f, "Removed"),
        }
    }
}

/// Operand log verbosity
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum LogLevel {
    /// klog verbosity 2
    #[default]
    Normal,
    /// klog verbosity 4
    Debug,
    /// klog verbosity 6
    Trace,
    /// klog verbosity 8
    TraceAll,
}

impl LogLevel {
    /// Numeric verbosity passed to the OAuth server
    pub fn verbosity(&self) -> u8 {
        match self {
            Self::Normal => 2,
            Self::Debug => 4,
            Self::Trace => 6,
            Self::TraceAll => 8,
        }
    }
}

/// Condition status following Kubernetes conventions
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value {
            Self::True
        } else {
            Self::False
        }
    }
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Operator condition as reported on `status.conditions`
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct OperatorCondition {
    /// Condition type (e.g. Available, RouteStatusDegraded)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    #[serde(default)]
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Last time the status flipped
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl OperatorCondition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }

    /// True if the condition status is True
    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Last generation the operator applied for a managed workload
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationStatus {
    /// API group of the workload
    pub group: String,
    /// Resource plural of the workload
    pub resource: String,
    /// Workload namespace
    pub namespace: String,
    /// Workload name
    pub name: String,
    /// Generation observed right after the operator's last write
    pub last_generation: i64,
    /// Optional hash of the applied spec
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hash: String,
}

/// A named version reported on `status.versions`
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct OperandVersion {
    /// Component name ("operator", "oauth-openshift")
    pub name: String,
    /// Version string
    pub version: String,
}

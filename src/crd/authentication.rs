//! Authentication operator Custom Resource Definition
//!
//! The cluster-scoped `authentications.operator.openshift.io/cluster` object
//! holds the operator's management state and every condition it reports.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    GenerationStatus, LogLevel, ManagementState, OperandVersion, OperatorCondition,
};

/// Specification for the authentication operator
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "operator.openshift.io",
    version = "v1",
    kind = "Authentication",
    root = "AuthenticationOperator",
    plural = "authentications",
    status = "AuthenticationOperatorStatus",
    namespaced = false,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".spec.managementState"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationOperatorSpec {
    /// Whether the operator manages the OAuth server
    #[serde(default)]
    pub management_state: ManagementState,

    /// Verbosity of the OAuth server
    #[serde(default)]
    pub log_level: LogLevel,

    /// Verbosity of the operator itself
    #[serde(default)]
    pub operator_log_level: LogLevel,

    /// Raw overrides merged over the generated OAuth server config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub unsupported_config_overrides: Option<serde_json::Value>,
}

fn preserve_unknown_fields(_: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
    let mut schema = schemars::schema::SchemaObject {
        instance_type: Some(schemars::schema::InstanceType::Object.into()),
        ..Default::default()
    };
    schema.extensions.insert("nullable".to_string(), true.into());
    schema
        .extensions
        .insert("x-kubernetes-preserve-unknown-fields".to_string(), true.into());
    schema.into()
}

/// Status for the authentication operator
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationOperatorStatus {
    /// Generation of the spec last handled
    #[serde(default)]
    pub observed_generation: i64,

    /// Degraded, Progressing and Available conditions (plus per-source Degraded)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<OperatorCondition>,

    /// Versions stamped once the operand is fully rolled out
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub versions: Vec<OperandVersion>,

    /// Updated replicas of the OAuth server deployment
    #[serde(default)]
    pub ready_replicas: i32,

    /// Last generations the operator applied for its workloads
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub generations: Vec<GenerationStatus>,
}

impl AuthenticationOperatorStatus {
    /// Find the recorded generation of a workload
    pub fn generation(
        &self,
        group: &str,
        resource: &str,
        namespace: &str,
        name: &str,
    ) -> Option<&GenerationStatus> {
        self.generations.iter().find(|g| {
            g.group == group && g.resource == resource && g.namespace == namespace && g.name == name
        })
    }

    /// Record the generation of a workload, replacing any previous entry
    pub fn set_generation(&mut self, generation: GenerationStatus) {
        self.generations.retain(|g| {
            !(g.group == generation.group
                && g.resource == generation.resource
                && g.namespace == generation.namespace
                && g.name == generation.name)
        });
        self.generations.push(generation);
    }
}

//! auth-operator - reconciles the integrated OAuth server against cluster configuration
//!
//! The operator derives the OAuth server's desired resources from the cluster's
//! ingress, proxy, infrastructure, API server, console and identity
//! configuration, rolls the server out when any of those inputs change, and
//! reports its health through three condition axes (Degraded, Progressing,
//! Available) on the `authentications.operator.openshift.io/cluster` object.
//!
//! # Architecture
//!
//! Every reconcile runs one strictly ordered pipeline:
//! - Metadata: ingress, route and the `.well-known` metadata document
//! - Service: the OAuth service and its serving certificate
//! - Configuration: session secret, synced user config, CLI config document
//! - Deployment: OAuth clients, version fingerprint and the deployment itself
//! - Health: the readiness chain (route, discovery document, clients, rollout)
//!
//! # Modules
//!
//! - [`crd`] - Operator CRD and the foreign resource types it reads
//! - [`controller`] - Reconciliation orchestrator and controller context
//! - [`readiness`] - Ordered, short-circuiting readiness checks
//! - [`status`] - Condition helpers with transition-time discipline
//! - [`fingerprint`] - Version fingerprint and forced-rollout decisions
//! - [`resources`] - Desired resource builders
//! - [`client`] - Collaborator traits and their kube-rs implementations
//! - [`config`] - Immutable operator configuration loaded at startup
//! - [`error`] - Error types for the operator

pub mod client;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod fingerprint;
pub mod readiness;
pub mod resources;
pub mod retry;
pub mod status;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Well-known names
// =============================================================================

/// Namespace the OAuth server runs in
pub const TARGET_NAMESPACE: &str = "openshift-authentication";

/// Namespace the operator itself runs in
pub const OPERATOR_NAMESPACE: &str = "openshift-authentication-operator";

/// Name of the operator's own deployment
pub const OPERATOR_DEPLOYMENT: &str = "authentication-operator";

/// Namespace holding user-supplied configuration (IdP secrets, templates)
pub const USER_CONFIG_NAMESPACE: &str = "openshift-config";

/// Namespace holding platform-managed configuration (default ingress CA)
pub const MANAGED_CONFIG_NAMESPACE: &str = "openshift-config-managed";

/// Name shared by the OAuth server's deployment, service and route
pub const OPERAND_NAME: &str = "oauth-openshift";

/// Name of every cluster-scoped configuration singleton
pub const CLUSTER_CONFIG_NAME: &str = "cluster";

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "authentication-operator";

//! Collaborator traits and their kube-rs implementations
//!
//! The orchestrator never talks to the API server directly. Everything goes
//! through these traits so tests can substitute mocks.

mod kubernetes;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Endpoints, Secret, Service};
use kube::api::DynamicObject;
#[cfg(test)]
use mockall::automock;

use crate::crd::{
    ApiServerConfig, AuthenticationConfig, AuthenticationOperatorStatus, ConsoleConfig,
    InfrastructureConfig, IngressConfig, OAuthClient, OAuthConfig, ProxyConfig, Route,
};
use crate::Result;

pub use kubernetes::{KubeApplier, KubeReader, KubeStatusWriter, KubeSyncer};

/// Result of an apply: the object as stored and whether the write changed it
#[derive(Clone, Debug, PartialEq)]
pub struct Applied<T> {
    /// Object returned by the API server
    pub object: T,
    /// True if the stored object differs from what was there before
    pub changed: bool,
}

/// Idempotent create-or-update of the operand's resources
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceApplier: Send + Sync {
    /// Apply a config map
    async fn apply_config_map(&self, desired: ConfigMap) -> Result<Applied<ConfigMap>>;

    /// Apply a secret
    async fn apply_secret(&self, desired: Secret) -> Result<Applied<Secret>>;

    /// Apply a service
    async fn apply_service(&self, desired: Service) -> Result<Applied<Service>>;

    /// Apply a route
    async fn apply_route(&self, desired: Route) -> Result<Applied<Route>>;

    /// Apply a deployment
    ///
    /// `expected_generation` is the generation recorded after the previous
    /// apply; a live object at another generation was modified by someone
    /// else. `force` restarts the pods even when the spec is unchanged.
    async fn apply_deployment(
        &self,
        desired: Deployment,
        expected_generation: i64,
        force: bool,
    ) -> Result<Applied<Deployment>>;

    /// Create an OAuth client
    async fn create_oauth_client(&self, client: OAuthClient) -> Result<()>;
}

/// Typed reads of cluster state
///
/// Lookups of missing objects return an error for which
/// [`crate::Error::is_not_found`] is true.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterReader: Send + Sync {
    /// `ingresses.config.openshift.io/cluster`
    async fn get_ingress_config(&self) -> Result<IngressConfig>;

    /// `proxies.config.openshift.io/cluster`
    async fn get_proxy_config(&self) -> Result<ProxyConfig>;

    /// `infrastructures.config.openshift.io/cluster`
    async fn get_infrastructure_config(&self) -> Result<InfrastructureConfig>;

    /// `apiservers.config.openshift.io/cluster`
    async fn get_api_server_config(&self) -> Result<ApiServerConfig>;

    /// `consoles.config.openshift.io/cluster`
    async fn get_console_config(&self) -> Result<ConsoleConfig>;

    /// `authentications.config.openshift.io/cluster`
    async fn get_authentication_config(&self) -> Result<AuthenticationConfig>;

    /// `oauths.config.openshift.io/cluster`
    async fn get_oauth_config(&self) -> Result<OAuthConfig>;

    /// Get a route
    async fn get_route(&self, namespace: &str, name: &str) -> Result<Route>;

    /// Get a secret
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret>;

    /// Get a config map
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap>;

    /// Get a service
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service>;

    /// Get an endpoints object
    async fn get_endpoints(&self, namespace: &str, name: &str) -> Result<Endpoints>;

    /// Get a deployment
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment>;

    /// Get an OAuth client
    async fn get_oauth_client(&self, name: &str) -> Result<DynamicObject>;

    /// List config maps in a namespace
    async fn list_config_maps(&self, namespace: &str) -> Result<Vec<ConfigMap>>;

    /// List secrets in a namespace
    async fn list_secrets(&self, namespace: &str) -> Result<Vec<Secret>>;
}

/// Mirrors user objects from `openshift-config` into the target namespace
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceSyncer: Send + Sync {
    /// Copy secret `source` to `dest`; `None` deletes `dest`
    async fn sync_secret(&self, dest: &str, source: Option<String>) -> Result<()>;

    /// Copy config map `source` to `dest`; `None` deletes `dest`
    async fn sync_config_map(&self, dest: &str, source: Option<String>) -> Result<()>;
}

/// Persists the operator status
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StatusWriter: Send + Sync {
    /// Merge `desired` over the stored status and write it back
    ///
    /// Stored condition transition times are kept unless a status flipped.
    async fn update_status(
        &self,
        name: &str,
        desired: AuthenticationOperatorStatus,
    ) -> Result<AuthenticationOperatorStatus>;
}

/// True if the bootstrap `kubeadmin` account still exists
pub async fn bootstrap_user_exists(reader: &dyn ClusterReader) -> Result<bool> {
    match reader.get_secret("kube-system", "kubeadmin").await {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

//! kube-rs implementations of the collaborator traits

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Endpoints, Secret, Service};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{
    Api, DeleteParams, DynamicObject, ListParams, ObjectMeta, Patch, PatchParams, PostParams,
};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use super::{Applied, ClusterReader, ResourceApplier, ResourceSyncer, StatusWriter};
use crate::crd::{
    ApiServerConfig, AuthenticationConfig, AuthenticationOperator, AuthenticationOperatorStatus,
    ConsoleConfig, InfrastructureConfig, IngressConfig, OAuthClient, OAuthConfig, ProxyConfig,
    Route,
};
use crate::retry::{retry_with_backoff_if, RetryConfig};
use crate::status::merge_status;
use crate::{
    Error, Result, CLUSTER_CONFIG_NAME, FIELD_MANAGER, TARGET_NAMESPACE, USER_CONFIG_NAMESPACE,
};

/// Pod template annotation bumped to force a rollout
const FORCE_ROLLOUT_ANNOTATION: &str = "operator.openshift.io/force";

fn ssa() -> PatchParams {
    PatchParams::apply(FIELD_MANAGER).force()
}

/// Map a kube 404 to [`Error::NotFound`]
fn not_found_as<T>(result: kube::Result<T>, kind: &str, name: &str) -> Result<T> {
    match result {
        Ok(v) => Ok(v),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Err(Error::not_found(kind, name)),
        Err(e) => Err(e.into()),
    }
}

// =============================================================================
// Applier
// =============================================================================

/// Server-side apply of the operand's resources
pub struct KubeApplier {
    client: Client,
}

impl KubeApplier {
    /// Create a new applier wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn apply_namespaced<K>(&self, desired: K) -> Result<Applied<K>>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + Serialize
            + DeserializeOwned
            + std::fmt::Debug,
    {
        let name = desired
            .meta()
            .name
            .clone()
            .ok_or_else(|| Error::validation(format!("{} without a name", K::kind(&()))))?;
        let namespace = desired
            .meta()
            .namespace
            .clone()
            .unwrap_or_else(|| TARGET_NAMESPACE.to_string());
        let api: Api<K> = Api::namespaced(self.client.clone(), &namespace);

        let before = api.get_opt(&name).await?.and_then(|o| o.meta().resource_version.clone());
        let object = api.patch(&name, &ssa(), &Patch::Apply(&desired)).await?;
        let changed = before != object.meta().resource_version;

        if changed {
            info!(kind = %K::kind(&()), %namespace, %name, "applied resource");
        }
        Ok(Applied { object, changed })
    }
}

#[async_trait]
impl ResourceApplier for KubeApplier {
    async fn apply_config_map(&self, desired: ConfigMap) -> Result<Applied<ConfigMap>> {
        self.apply_namespaced(desired).await
    }

    async fn apply_secret(&self, desired: Secret) -> Result<Applied<Secret>> {
        self.apply_namespaced(desired).await
    }

    async fn apply_service(&self, desired: Service) -> Result<Applied<Service>> {
        self.apply_namespaced(desired).await
    }

    async fn apply_route(&self, desired: Route) -> Result<Applied<Route>> {
        self.apply_namespaced(desired).await
    }

    async fn apply_deployment(
        &self,
        mut desired: Deployment,
        expected_generation: i64,
        force: bool,
    ) -> Result<Applied<Deployment>> {
        let name = desired.name_any();
        let namespace = desired.namespace().unwrap_or_else(|| TARGET_NAMESPACE.to_string());
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &namespace);

        if let Some(live) = api.get_opt(&name).await? {
            let live_generation = live.metadata.generation.unwrap_or_default();
            if expected_generation >= 0 && live_generation != expected_generation {
                info!(
                    %name,
                    expected_generation,
                    live_generation,
                    "deployment was modified outside the operator, reapplying"
                );
            }
        }

        if force {
            if let Some(template) = desired.spec.as_mut().map(|s| &mut s.template) {
                template
                    .metadata
                    .get_or_insert_with(ObjectMeta::default)
                    .annotations
                    .get_or_insert_with(BTreeMap::new)
                    .insert(
                        FORCE_ROLLOUT_ANNOTATION.to_string(),
                        uuid::Uuid::new_v4().to_string(),
                    );
            }
            info!(%name, "forcing deployment rollout");
        }

        self.apply_namespaced(desired).await
    }

    async fn create_oauth_client(&self, client: OAuthClient) -> Result<()> {
        let api: Api<DynamicObject> =
            Api::all_with(self.client.clone(), &OAuthClient::api_resource());
        match api.create(&PostParams::default(), &client.to_dynamic()).await {
            Ok(_) => {
                info!(name = %client.name, "created OAuth client");
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// =============================================================================
// Reader
// =============================================================================

/// Direct API reads
pub struct KubeReader {
    client: Client,
}

impl KubeReader {
    /// Create a new reader wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn cluster_config<K>(&self) -> Result<K>
    where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + std::fmt::Debug,
    {
        let api: Api<K> = Api::all(self.client.clone());
        not_found_as(api.get(CLUSTER_CONFIG_NAME).await, &K::kind(&()), CLUSTER_CONFIG_NAME)
    }

    async fn namespaced<K>(&self, namespace: &str, name: &str) -> Result<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + std::fmt::Debug,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        not_found_as(api.get(name).await, &K::kind(&()), &format!("{namespace}/{name}"))
    }

    async fn list<K>(&self, namespace: &str) -> Result<Vec<K>>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + std::fmt::Debug,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }
}

#[async_trait]
impl ClusterReader for KubeReader {
    async fn get_ingress_config(&self) -> Result<IngressConfig> {
        self.cluster_config().await
    }

    async fn get_proxy_config(&self) -> Result<ProxyConfig> {
        self.cluster_config().await
    }

    async fn get_infrastructure_config(&self) -> Result<InfrastructureConfig> {
        self.cluster_config().await
    }

    async fn get_api_server_config(&self) -> Result<ApiServerConfig> {
        self.cluster_config().await
    }

    async fn get_console_config(&self) -> Result<ConsoleConfig> {
        self.cluster_config().await
    }

    async fn get_authentication_config(&self) -> Result<AuthenticationConfig> {
        self.cluster_config().await
    }

    async fn get_oauth_config(&self) -> Result<OAuthConfig> {
        self.cluster_config().await
    }

    async fn get_route(&self, namespace: &str, name: &str) -> Result<Route> {
        self.namespaced(namespace, name).await
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret> {
        self.namespaced(namespace, name).await
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap> {
        self.namespaced(namespace, name).await
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service> {
        self.namespaced(namespace, name).await
    }

    async fn get_endpoints(&self, namespace: &str, name: &str) -> Result<Endpoints> {
        self.namespaced(namespace, name).await
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment> {
        self.namespaced(namespace, name).await
    }

    async fn get_oauth_client(&self, name: &str) -> Result<DynamicObject> {
        let api: Api<DynamicObject> =
            Api::all_with(self.client.clone(), &OAuthClient::api_resource());
        not_found_as(api.get(name).await, "OAuthClient", name)
    }

    async fn list_config_maps(&self, namespace: &str) -> Result<Vec<ConfigMap>> {
        self.list(namespace).await
    }

    async fn list_secrets(&self, namespace: &str) -> Result<Vec<Secret>> {
        self.list(namespace).await
    }
}

// =============================================================================
// Syncer
// =============================================================================

/// Copies user objects from `openshift-config` into the target namespace
pub struct KubeSyncer {
    client: Client,
}

impl KubeSyncer {
    /// Create a new syncer wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn delete<K>(&self, dest: &str) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + std::fmt::Debug,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), TARGET_NAMESPACE);
        match api.delete(dest, &DeleteParams::default()).await {
            Ok(_) => {
                info!(kind = %K::kind(&()), name = %dest, "deleted stale synced resource");
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn source<K>(&self, name: &str) -> Result<Option<K>>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + std::fmt::Debug,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), USER_CONFIG_NAMESPACE);
        Ok(api.get_opt(name).await?)
    }

    fn dest_meta(dest: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(dest.to_string()),
            namespace: Some(TARGET_NAMESPACE.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ResourceSyncer for KubeSyncer {
    async fn sync_secret(&self, dest: &str, source: Option<String>) -> Result<()> {
        let Some(source) = source else {
            return self.delete::<Secret>(dest).await;
        };
        let Some(src) = self.source::<Secret>(&source).await? else {
            debug!(%source, %dest, "source secret missing, removing destination");
            return self.delete::<Secret>(dest).await;
        };

        let copy = Secret {
            metadata: Self::dest_meta(dest),
            data: src.data,
            type_: src.type_,
            ..Default::default()
        };
        let api: Api<Secret> = Api::namespaced(self.client.clone(), TARGET_NAMESPACE);
        api.patch(dest, &ssa(), &Patch::Apply(&copy)).await?;
        Ok(())
    }

    async fn sync_config_map(&self, dest: &str, source: Option<String>) -> Result<()> {
        let Some(source) = source else {
            return self.delete::<ConfigMap>(dest).await;
        };
        let Some(src) = self.source::<ConfigMap>(&source).await? else {
            debug!(%source, %dest, "source config map missing, removing destination");
            return self.delete::<ConfigMap>(dest).await;
        };

        let copy = ConfigMap {
            metadata: Self::dest_meta(dest),
            data: src.data,
            binary_data: src.binary_data,
            ..Default::default()
        };
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), TARGET_NAMESPACE);
        api.patch(dest, &ssa(), &Patch::Apply(&copy)).await?;
        Ok(())
    }
}

// =============================================================================
// Status writer
// =============================================================================

/// Optimistic read-merge-write of the operator status
pub struct KubeStatusWriter {
    client: Client,
    retry: RetryConfig,
}

impl KubeStatusWriter {
    /// Create a new status writer wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self {
            client,
            retry: RetryConfig::with_max_attempts(5),
        }
    }
}

#[async_trait]
impl StatusWriter for KubeStatusWriter {
    async fn update_status(
        &self,
        name: &str,
        desired: AuthenticationOperatorStatus,
    ) -> Result<AuthenticationOperatorStatus> {
        let api: Api<AuthenticationOperator> = Api::all(self.client.clone());

        retry_with_backoff_if(&self.retry, "update_operator_status", Error::is_conflict, || {
            let api = api.clone();
            let desired = &desired;
            async move {
                let current = not_found_as(api.get(name).await, "Authentication", name)?;
                let stored = current.status.clone().unwrap_or_default();
                let merged = merge_status(&stored, desired);
                if merged == stored {
                    return Ok(merged);
                }

                // resourceVersion turns the merge patch into a compare-and-swap
                let patch = serde_json::json!({
                    "metadata": { "resourceVersion": current.resource_version() },
                    "status": merged,
                });
                api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
                    .await?;
                Ok(merged)
            }
        })
        .await
    }
}

//! The OAuth server deployment

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy, RollingUpdateDeployment};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, EnvVar, HTTPGetAction, PodSpec,
    PodTemplateSpec, Probe, SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;

use super::oauth::ConfigSyncData;
use super::service::OAUTH_PORT;
use super::{
    default_labels, default_meta, system_config_map_dir, system_secret_dir, CLI_CONFIG_NAME,
    SYSTEM_CONFIG_MAPS, SYSTEM_SECRETS,
};
use crate::crd::{LogLevel, ProxyConfig};
use crate::fingerprint::RVS_HASH_ANNOTATION;
use crate::OPERAND_NAME;

/// Inputs of the deployment builder
pub struct DeploymentInputs<'a> {
    /// OAuth server image
    pub image: &'a str,
    /// Operand verbosity
    pub log_level: &'a LogLevel,
    /// Mirrored user data to mount
    pub sync: &'a ConfigSyncData,
    /// Cluster proxy, exported as environment variables
    pub proxy: Option<&'a ProxyConfig>,
    /// Run one replica instead of two
    pub single_replica: bool,
    /// Fingerprint hash stamped on the deployment and pod template
    pub rvs_hash: &'a str,
}

/// Build the desired OAuth server deployment
pub fn default_deployment(inputs: &DeploymentInputs<'_>) -> Deployment {
    let replicas = if inputs.single_replica { 1 } else { 2 };
    let annotations = BTreeMap::from([(
        RVS_HASH_ANNOTATION.to_string(),
        inputs.rvs_hash.to_string(),
    )]);

    let mut metadata = default_meta(OPERAND_NAME);
    metadata.annotations = Some(annotations.clone());

    let (volumes, mounts) = volumes(inputs.sync);

    let env: Vec<EnvVar> = inputs
        .proxy
        .map(ProxyConfig::env_vars)
        .unwrap_or_default()
        .into_iter()
        .map(|(name, value)| EnvVar {
            name: name.to_string(),
            value: Some(value),
            ..Default::default()
        })
        .collect();

    let health = |path: &str| Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::Int(OAUTH_PORT),
            scheme: Some("HTTPS".to_string()),
            ..Default::default()
        }),
        initial_delay_seconds: Some(30),
        timeout_seconds: Some(1),
        period_seconds: Some(10),
        ..Default::default()
    };

    let container = Container {
        name: OPERAND_NAME.to_string(),
        image: Some(inputs.image.to_string()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        command: Some(vec![
            "oauth-server".to_string(),
            "osinserver".to_string(),
            format!(
                "--config={}/{CLI_CONFIG_NAME}",
                system_config_map_dir(CLI_CONFIG_NAME)
            ),
            format!("--v={}", inputs.log_level.verbosity()),
        ]),
        ports: Some(vec![ContainerPort {
            name: Some("https".to_string()),
            container_port: OAUTH_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        env: (!env.is_empty()).then_some(env),
        readiness_probe: Some(health("/healthz")),
        liveness_probe: Some(health("/healthz")),
        volume_mounts: Some(mounts),
        termination_message_policy: Some("FallbackToLogsOnError".to_string()),
        ..Default::default()
    };

    Deployment {
        metadata,
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(default_labels()),
                ..Default::default()
            },
            strategy: Some(DeploymentStrategy {
                type_: Some("RollingUpdate".to_string()),
                rolling_update: Some(RollingUpdateDeployment {
                    max_surge: Some(IntOrString::Int(0)),
                    max_unavailable: Some(IntOrString::Int(1)),
                }),
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    name: Some(OPERAND_NAME.to_string()),
                    labels: Some(default_labels()),
                    annotations: Some(annotations),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(OPERAND_NAME.to_string()),
                    priority_class_name: Some("system-cluster-critical".to_string()),
                    node_selector: Some(BTreeMap::from([(
                        "node-role.kubernetes.io/master".to_string(),
                        String::new(),
                    )])),
                    containers: vec![container],
                    volumes: Some(volumes),
                    termination_grace_period_seconds: Some(40),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn volumes(sync: &ConfigSyncData) -> (Vec<Volume>, Vec<VolumeMount>) {
    let mut volumes = Vec::new();
    let mut mounts = Vec::new();

    let secret_volume = |name: &str| Volume {
        name: name.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(name.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };
    let config_map_volume = |name: &str| Volume {
        name: name.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: name.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    };
    let mount = |name: &str, path: String| VolumeMount {
        name: name.to_string(),
        mount_path: path,
        read_only: Some(true),
        ..Default::default()
    };

    for name in SYSTEM_SECRETS {
        volumes.push(secret_volume(name));
        mounts.push(mount(name, system_secret_dir(name)));
    }
    for name in SYSTEM_CONFIG_MAPS {
        volumes.push(config_map_volume(name));
        mounts.push(mount(name, system_config_map_dir(name)));
    }
    for (name, source) in &sync.secrets {
        volumes.push(secret_volume(name));
        mounts.push(mount(name, source.mount_dir.clone()));
    }
    for (name, source) in &sync.config_maps {
        volumes.push(config_map_volume(name));
        mounts.push(mount(name, source.mount_dir.clone()));
    }

    (volumes, mounts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::config::{ProxyConfigSpec, ProxyConfigStatus};
    use crate::resources::SyncSource;

    fn inputs<'a>(sync: &'a ConfigSyncData, proxy: Option<&'a ProxyConfig>) -> DeploymentInputs<'a> {
        DeploymentInputs {
            image: "quay.io/openshift/oauth-server:test",
            log_level: &LogLevel::Debug,
            sync,
            proxy,
            single_replica: false,
            rvs_hash: "abc",
        }
    }

    #[test]
    fn fingerprint_hash_lands_on_deployment_and_pods() {
        let sync = ConfigSyncData::default();
        let d = default_deployment(&inputs(&sync, None));
        assert_eq!(d.metadata.annotations.unwrap()[RVS_HASH_ANNOTATION], "abc");
        let template = d.spec.unwrap().template.metadata.unwrap();
        assert_eq!(template.annotations.unwrap()[RVS_HASH_ANNOTATION], "abc");
    }

    #[test]
    fn replica_count_follows_topology() {
        let sync = ConfigSyncData::default();
        let mut i = inputs(&sync, None);
        assert_eq!(default_deployment(&i).spec.unwrap().replicas, Some(2));
        i.single_replica = true;
        assert_eq!(default_deployment(&i).spec.unwrap().replicas, Some(1));
    }

    #[test]
    fn proxy_settings_become_env() {
        let mut proxy = ProxyConfig::new("cluster", ProxyConfigSpec::default());
        proxy.status = Some(ProxyConfigStatus {
            https_proxy: "http://proxy:3128".to_string(),
            ..Default::default()
        });
        let sync = ConfigSyncData::default();
        let d = default_deployment(&inputs(&sync, Some(&proxy)));
        let container = &d.spec.unwrap().template.spec.unwrap().containers[0];
        let env = container.env.as_ref().unwrap();
        assert_eq!(env.len(), 1);
        assert_eq!(env[0].name, "HTTPS_PROXY");
        assert!(container.command.as_ref().unwrap().contains(&"--v=4".to_string()));
    }

    /// Story: every mirrored user object is mounted where the config expects it
    #[test]
    fn story_sync_payload_is_mounted() {
        let mut sync = ConfigSyncData::default();
        sync.secrets.insert(
            "v4-0-config-user-idp-0-file-data".to_string(),
            SyncSource {
                source: "htpass".to_string(),
                mount_dir: "/var/config/user/idp/0/secret/v4-0-config-user-idp-0-file-data"
                    .to_string(),
            },
        );
        let d = default_deployment(&inputs(&sync, None));
        let pod = d.spec.unwrap().template.spec.unwrap();
        let volumes = pod.volumes.unwrap();
        assert_eq!(volumes.len(), SYSTEM_SECRETS.len() + SYSTEM_CONFIG_MAPS.len() + 1);
        let mounts = pod.containers[0].volume_mounts.as_ref().unwrap();
        assert!(mounts
            .iter()
            .any(|m| m.mount_path == "/var/config/user/idp/0/secret/v4-0-config-user-idp-0-file-data"));
    }
}

//! Desired resource builders
//!
//! Pure functions that turn configuration snapshots into the objects the
//! operator applies. Nothing here talks to the API server.

mod deployment;
mod metadata;
mod oauth;
mod service;
mod session;

use std::collections::BTreeMap;

use kube::api::ObjectMeta;

use crate::{OPERAND_NAME, TARGET_NAMESPACE};

pub use deployment::{default_deployment, DeploymentInputs};
pub use metadata::{metadata_config_map, oauth_metadata, ISSUER_SCOPES};
pub use oauth::{cli_config_map, CliConfigInputs, ConfigSyncData, SyncSource};
pub use service::{default_service, service_ca_config_map};
pub use session::{expected_session_secret, is_valid_session_secret, session_secret};

/// Prefix of every object the operator owns in the target namespace
pub const CONFIG_PREFIX: &str = "v4-0-config-";

/// Prefix of objects the operator manages itself
pub const SYSTEM_PREFIX: &str = "v4-0-config-system-";

/// Prefix of objects mirrored from `openshift-config`
pub const USER_PREFIX: &str = "v4-0-config-user-";

/// Config map with the `.well-known` metadata document
pub const METADATA_NAME: &str = "v4-0-config-system-metadata";

/// Config map with the OAuth server's config document
pub const CLI_CONFIG_NAME: &str = "v4-0-config-system-cliconfig";

/// Secret with the session signing and encryption keys
pub const SESSION_NAME: &str = "v4-0-config-system-session";

/// Config map receiving the injected service CA
pub const SERVICE_CA_NAME: &str = "v4-0-config-system-service-ca";

/// Secret holding the serving certificate for the OAuth service
pub const SERVING_CERT_NAME: &str = "v4-0-config-system-serving-cert";

/// Secret holding the router certificates, one entry per ingress domain
pub const ROUTER_CERTS_NAME: &str = "v4-0-config-system-router-certs";

/// Mount directory of an operator-managed secret inside the OAuth server pod
pub fn system_secret_dir(name: &str) -> String {
    format!("/var/config/system/secrets/{name}")
}

/// Mount directory of an operator-managed config map inside the OAuth server pod
pub fn system_config_map_dir(name: &str) -> String {
    format!("/var/config/system/configmaps/{name}")
}

/// Secrets the operator mounts into every OAuth server pod
pub const SYSTEM_SECRETS: [&str; 3] = [SESSION_NAME, SERVING_CERT_NAME, ROUTER_CERTS_NAME];

/// Config maps the operator mounts into every OAuth server pod
pub const SYSTEM_CONFIG_MAPS: [&str; 2] = [CLI_CONFIG_NAME, SERVICE_CA_NAME];

/// Labels on every object the operator creates in the target namespace
pub fn default_labels() -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), OPERAND_NAME.to_string())])
}

/// Metadata for an object in the target namespace
pub fn default_meta(name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(TARGET_NAMESPACE.to_string()),
        labels: Some(default_labels()),
        annotations: Some(BTreeMap::new()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_meta_targets_operand_namespace() {
        let meta = default_meta(SESSION_NAME);
        assert_eq!(meta.namespace.as_deref(), Some(TARGET_NAMESPACE));
        assert_eq!(
            meta.labels.unwrap().get("app").map(String::as_str),
            Some(OPERAND_NAME)
        );
    }

    #[test]
    fn system_names_share_the_config_prefix() {
        for name in [
            METADATA_NAME,
            CLI_CONFIG_NAME,
            SESSION_NAME,
            SERVICE_CA_NAME,
            SERVING_CERT_NAME,
            ROUTER_CERTS_NAME,
        ] {
            assert!(name.starts_with(SYSTEM_PREFIX));
            assert!(name.starts_with(CONFIG_PREFIX));
        }
        assert!(USER_PREFIX.starts_with(CONFIG_PREFIX));
    }
}

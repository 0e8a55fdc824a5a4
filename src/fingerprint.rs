//! Version fingerprint and forced-rollout decisions
//!
//! The fingerprint is an ordered list of `source:name:resourceVersion`
//! entries, one per configuration input that feeds the OAuth server. Its hash
//! is written into the deployment's pod template, so any input change becomes
//! a spec change and rolls the pods. The only rollouts forced independently of
//! spec content come from [`force_rollout`].

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use tracing::{debug, info, warn};

/// Annotation carrying the fingerprint hash on the deployment and its pods
pub const RVS_HASH_ANNOTATION: &str = "operator.openshift.io/rvs-hash";

/// One contributing input
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionEntry {
    /// Where the input comes from ("proxy", "deployments", "configmaps", ...)
    pub source: String,
    /// Object name
    pub name: String,
    /// Opaque resourceVersion token
    pub version: String,
}

impl fmt::Display for VersionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.name, self.version)
    }
}

/// Ordered sequence of input versions
///
/// Insertion order is significant: two fingerprints are equal exactly when
/// they were built from the same entries in the same order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VersionFingerprint {
    entries: Vec<VersionEntry>,
}

impl VersionFingerprint {
    /// Empty fingerprint
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry
    pub fn push(
        &mut self,
        source: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) {
        self.entries.push(VersionEntry {
            source: source.into(),
            name: name.into(),
            version: version.into(),
        });
    }

    /// Append an object's name and resourceVersion under `source`
    pub fn push_object<K: kube::Resource>(&mut self, source: &str, obj: &K) {
        let meta = obj.meta();
        self.push(
            source,
            meta.name.clone().unwrap_or_default(),
            meta.resource_version.clone().unwrap_or_default(),
        );
    }

    /// Append every config map then every secret whose name starts with `prefix`
    ///
    /// Each group is sorted by name so list order from the API server never
    /// changes the fingerprint.
    pub fn extend_prefixed<C, S>(&mut self, config_maps: &[C], secrets: &[S], prefix: &str)
    where
        C: kube::Resource,
        S: kube::Resource,
    {
        self.extend_group("configmaps", config_maps, prefix);
        self.extend_group("secrets", secrets, prefix);
    }

    fn extend_group<K: kube::Resource>(&mut self, source: &str, objects: &[K], prefix: &str) {
        let mut matching: Vec<&K> = objects
            .iter()
            .filter(|o| o.meta().name.as_deref().is_some_and(|n| n.starts_with(prefix)))
            .collect();
        matching.sort_by(|a, b| a.meta().name.cmp(&b.meta().name));
        for obj in matching {
            self.push_object(source, obj);
        }
    }

    /// Rendered `source:name:version` strings
    pub fn rendered(&self) -> Vec<String> {
        self.entries.iter().map(ToString::to_string).collect()
    }

    /// SHA-512 of the comma-joined entries, base64url without padding
    pub fn hash(&self) -> String {
        use aws_lc_rs::digest;
        let joined = self.rendered().join(",");
        let hash = digest::digest(&digest::SHA512, joined.as_bytes());
        URL_SAFE_NO_PAD.encode(hash.as_ref())
    }
}

/// Whether the deployment must be rolled regardless of spec content
///
/// True when the operator config changed since it was last handled, or when
/// the bootstrap account was just removed.
pub fn force_rollout(generation: i64, observed_generation: i64, bootstrap_edge: bool) -> bool {
    generation != observed_generation || bootstrap_edge
}

/// One-shot trigger armed while the bootstrap account exists
///
/// Removing the `kubeadmin` account changes who may log in, so the OAuth
/// server pods restart exactly once after the removal is first seen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BootstrapRollout {
    armed: bool,
}

impl BootstrapRollout {
    /// Create the trigger; arm it when the account exists at startup
    pub fn new(armed: bool) -> Self {
        Self { armed }
    }

    /// True while the removal has not yet been observed
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Feed the result of an account existence lookup
    ///
    /// Returns true once, on the first lookup that finds the account gone
    /// while armed. Lookup errors leave the trigger armed.
    pub fn observe(&mut self, account_exists: crate::Result<bool>) -> bool {
        if !self.armed {
            return false;
        }
        match account_exists {
            Ok(true) => false,
            Ok(false) => {
                info!("bootstrap user removed, forcing OAuth server rollout");
                self.armed = false;
                true
            }
            Err(e) => {
                warn!(error = %e, "unable to determine the state of bootstrap user");
                false
            }
        }
    }
}

/// Log a fingerprint at debug level
pub fn log_fingerprint(fingerprint: &VersionFingerprint) {
    debug!(
        entries = ?fingerprint.rendered(),
        hash = %fingerprint.hash(),
        "computed resource version fingerprint"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{ConfigMap, Secret};
    use kube::api::ObjectMeta;

    fn cm(name: &str, rv: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                resource_version: Some(rv.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn secret(name: &str, rv: &str) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                resource_version: Some(rv.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn sample(proxy_rv: &str) -> VersionFingerprint {
        let mut fp = VersionFingerprint::new();
        fp.push("proxy", "cluster", proxy_rv);
        fp.push("deployments", "authentication-operator", "42");
        fp
    }

    // =========================================================================
    // Fingerprint equality
    // =========================================================================

    /// Story: identical inputs give identical fingerprints
    #[test]
    fn story_identical_inputs_are_equal() {
        assert_eq!(sample("7"), sample("7"));
        assert_eq!(sample("7").hash(), sample("7").hash());
    }

    /// Story: changing any single version token changes the fingerprint
    #[test]
    fn story_single_version_change_is_detected() {
        assert_ne!(sample("7"), sample("8"));
        assert_ne!(sample("7").hash(), sample("8").hash());
    }

    #[test]
    fn order_is_significant() {
        let mut a = VersionFingerprint::new();
        a.push("proxy", "cluster", "1");
        a.push("configmaps", "x", "2");
        let mut b = VersionFingerprint::new();
        b.push("configmaps", "x", "2");
        b.push("proxy", "cluster", "1");
        assert_ne!(a, b);
    }

    #[test]
    fn rendered_entries_use_colon_format() {
        assert_eq!(
            sample("7").rendered(),
            vec!["proxy:cluster:7", "deployments:authentication-operator:42"]
        );
    }

    #[test]
    fn hash_is_unpadded_base64url_sha512() {
        let h = sample("7").hash();
        // 64 bytes -> 86 unpadded base64 characters
        assert_eq!(h.len(), 86);
        assert!(!h.contains('='));
        assert!(!h.contains('+') && !h.contains('/'));
    }

    /// Story: config objects are filtered by prefix and sorted by name
    #[test]
    fn story_prefixed_objects_sorted_config_maps_first() {
        let cms = vec![
            cm("v4-0-config-system-metadata", "3"),
            cm("kube-root-ca.crt", "1"),
            cm("v4-0-config-system-cliconfig", "5"),
        ];
        let secrets = vec![secret("v4-0-config-system-session", "9")];

        let mut fp = VersionFingerprint::new();
        fp.extend_prefixed(&cms, &secrets, "v4-0-config-");

        assert_eq!(
            fp.rendered(),
            vec![
                "configmaps:v4-0-config-system-cliconfig:5",
                "configmaps:v4-0-config-system-metadata:3",
                "secrets:v4-0-config-system-session:9",
            ]
        );
    }

    // =========================================================================
    // Rollout decisions
    // =========================================================================

    #[test]
    fn generation_mismatch_forces_rollout() {
        assert!(force_rollout(3, 2, false));
        assert!(!force_rollout(2, 2, false));
        assert!(force_rollout(2, 2, true));
    }

    /// Story: the bootstrap edge fires exactly once
    #[test]
    fn story_bootstrap_edge_fires_once() {
        let mut flag = BootstrapRollout::new(true);
        assert!(!flag.observe(Ok(true)));
        assert!(flag.is_armed());

        assert!(flag.observe(Ok(false)));
        assert!(!flag.is_armed());

        // Already fired
        assert!(!flag.observe(Ok(false)));
    }

    #[test]
    fn lookup_error_keeps_bootstrap_armed() {
        let mut flag = BootstrapRollout::new(true);
        assert!(!flag.observe(Err(crate::Error::internal("api down"))));
        assert!(flag.is_armed());
    }

    #[test]
    fn unarmed_bootstrap_never_fires() {
        let mut flag = BootstrapRollout::new(false);
        assert!(!flag.observe(Ok(false)));
    }
}

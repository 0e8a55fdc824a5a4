//! Operator configuration
//!
//! Everything the operator takes from its environment is read exactly once at
//! process start and frozen into [`OperatorConfig`], which is then handed to
//! the controller context. Nothing downstream reads the environment.

use std::path::PathBuf;

use clap::Args;
use tracing::{info, warn};

/// Default system CA bundle location
pub const SYSTEM_CA_BUNDLE_PATH: &str = "/etc/pki/ca-trust/extracted/pem/tls-ca-bundle.pem";

/// Default in-cluster service account CA location
pub const SERVICE_ACCOUNT_CA_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

/// Port of the `kubernetes` service when the environment does not say otherwise
pub const DEFAULT_KAS_SERVICE_PORT: i32 = 443;

/// Operator settings, parsed from flags with environment fallbacks
#[derive(Args, Debug, Clone)]
pub struct OperatorArgs {
    /// OAuth server container image
    #[arg(long, env = "IMAGE", default_value = "")]
    pub image: String,

    /// Version reported for the OAuth server once it is fully rolled out
    #[arg(long, env = "OPERAND_IMAGE_VERSION", default_value = "")]
    pub operand_version: String,

    /// Version reported for the operator itself
    #[arg(long, env = "OPERATOR_IMAGE_VERSION", default_value = "")]
    pub operator_version: String,

    /// HTTPS port of the `kubernetes` service; unparsable values fall back to 443
    #[arg(long, env = "KUBERNETES_SERVICE_PORT_HTTPS")]
    pub kas_service_port: Option<String>,

    /// Path of the system CA bundle trusted by the route probe
    #[arg(long, env = "SYSTEM_CA_BUNDLE", default_value = SYSTEM_CA_BUNDLE_PATH)]
    pub system_ca_bundle: PathBuf,

    /// Path of the service account CA trusted by the discovery document probe
    #[arg(long, env = "SERVICE_ACCOUNT_CA", default_value = SERVICE_ACCOUNT_CA_PATH)]
    pub service_account_ca: PathBuf,
}

/// Immutable operator configuration
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// OAuth server container image
    pub image: String,
    /// Version stamped for the OAuth server
    pub operand_version: String,
    /// Version stamped for the operator
    pub operator_version: String,
    /// HTTPS port of the `kubernetes` service
    pub kas_service_port: i32,
    /// System CA bundle contents (empty when unreadable)
    pub system_ca_bundle: Vec<u8>,
    /// Service account CA path, read on every discovery probe
    pub service_account_ca_path: PathBuf,
}

impl OperatorConfig {
    /// Build the configuration from parsed arguments
    ///
    /// Reads the system CA bundle once; a missing or unreadable bundle is
    /// logged and replaced by an empty one.
    pub fn from_args(args: OperatorArgs) -> Self {
        let kas_service_port = parse_kas_service_port(args.kas_service_port.as_deref());

        let system_ca_bundle = match std::fs::read(&args.system_ca_bundle) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(
                    path = %args.system_ca_bundle.display(),
                    error = %e,
                    "unable to read system CA bundle"
                );
                Vec::new()
            }
        };

        Self {
            image: args.image,
            operand_version: args.operand_version,
            operator_version: args.operator_version,
            kas_service_port,
            system_ca_bundle,
            service_account_ca_path: args.service_account_ca,
        }
    }
}

/// Parse the KAS service port, defaulting to 443 on any parse failure
pub fn parse_kas_service_port(raw: Option<&str>) -> i32 {
    match raw.map(str::trim).map(str::parse::<i32>) {
        Some(Ok(port)) => port,
        Some(Err(e)) => {
            info!(error = %e, "defaulting KAS service port to 443 due to parsing error");
            DEFAULT_KAS_SERVICE_PORT
        }
        None => {
            info!("KUBERNETES_SERVICE_PORT_HTTPS not set, defaulting KAS service port to 443");
            DEFAULT_KAS_SERVICE_PORT
        }
    }
}

#[cfg(test)]
impl OperatorConfig {
    /// Configuration with fixed versions and no trust material
    pub fn for_testing() -> Self {
        Self {
            image: "quay.io/openshift/oauth-server:test".to_string(),
            operand_version: "4.16.0".to_string(),
            operator_version: "4.16.0".to_string(),
            kas_service_port: DEFAULT_KAS_SERVICE_PORT,
            system_ca_bundle: Vec::new(),
            service_account_ca_path: PathBuf::from(SERVICE_ACCOUNT_CA_PATH),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args(system_ca_bundle: PathBuf, port: Option<&str>) -> OperatorArgs {
        OperatorArgs {
            image: "img".to_string(),
            operand_version: "1.0".to_string(),
            operator_version: "2.0".to_string(),
            kas_service_port: port.map(str::to_string),
            system_ca_bundle,
            service_account_ca: PathBuf::from("/nonexistent/ca.crt"),
        }
    }

    #[test]
    fn kas_port_parses_valid_values() {
        assert_eq!(parse_kas_service_port(Some("6443")), 6443);
        assert_eq!(parse_kas_service_port(Some(" 8443 ")), 8443);
    }

    #[test]
    fn kas_port_falls_back_to_443() {
        assert_eq!(parse_kas_service_port(None), 443);
        assert_eq!(parse_kas_service_port(Some("")), 443);
        assert_eq!(parse_kas_service_port(Some("https")), 443);
    }

    /// Story: a node image without the system CA bundle still runs the operator
    #[test]
    fn story_missing_system_bundle_degrades_to_empty() {
        let cfg = OperatorConfig::from_args(args(PathBuf::from("/nonexistent/bundle.pem"), None));
        assert!(cfg.system_ca_bundle.is_empty());
        assert_eq!(cfg.kas_service_port, 443);
        assert_eq!(cfg.operand_version, "1.0");
        assert_eq!(cfg.operator_version, "2.0");
    }

    #[test]
    fn system_bundle_is_read_once_at_construction() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "-----BEGIN CERTIFICATE-----\nabc\n-----END CERTIFICATE-----\n").unwrap();

        let cfg = OperatorConfig::from_args(args(file.path().to_path_buf(), Some("6443")));
        assert!(cfg.system_ca_bundle.starts_with(b"-----BEGIN CERTIFICATE-----"));
        assert_eq!(cfg.kas_service_port, 6443);
    }
}

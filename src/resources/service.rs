//! OAuth service and its service-CA config map

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ConfigMap, Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::{default_labels, default_meta, SERVICE_CA_NAME, SERVING_CERT_NAME};
use crate::OPERAND_NAME;

/// Port the OAuth server listens on
pub const OAUTH_PORT: i32 = 6443;

const SERVING_CERT_ANNOTATION: &str = "service.beta.openshift.io/serving-cert-secret-name";
const INJECT_CABUNDLE_ANNOTATION: &str = "service.beta.openshift.io/inject-cabundle";

/// The `oauth-openshift` service
///
/// Annotated so the service CA operator issues the serving certificate into
/// the serving-cert secret once the service exists.
pub fn default_service() -> Service {
    let mut metadata = default_meta(OPERAND_NAME);
    metadata.annotations = Some(BTreeMap::from([(
        SERVING_CERT_ANNOTATION.to_string(),
        SERVING_CERT_NAME.to_string(),
    )]));

    Service {
        metadata,
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(default_labels()),
            ports: Some(vec![ServicePort {
                name: Some("https".to_string()),
                protocol: Some("TCP".to_string()),
                port: 443,
                target_port: Some(IntOrString::Int(OAUTH_PORT)),
                ..Default::default()
            }]),
            session_affinity: Some("None".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Empty config map the service CA operator fills with `service-ca.crt`
pub fn service_ca_config_map() -> ConfigMap {
    let mut metadata = default_meta(SERVICE_CA_NAME);
    metadata.annotations = Some(BTreeMap::from([(
        INJECT_CABUNDLE_ANNOTATION.to_string(),
        "true".to_string(),
    )]));
    ConfigMap {
        metadata,
        ..Default::default()
    }
}

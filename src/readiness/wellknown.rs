//! Discovery document: every API server serves the expected OAuth metadata

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Endpoints, Service};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde_json::Value;
use tracing::debug;

use super::transport::{HttpProbe, ProbeMethod, ProbeRequest};
use super::{CheckStage, ProbeTarget, ReadinessCheck, Verdict};
use crate::client::ClusterReader;
use crate::error::ReasonedError;
use crate::resources::oauth_metadata;
use crate::{Error, Result};

/// Path of the OAuth discovery document
pub const WELL_KNOWN_PATH: &str = "/.well-known/oauth-authorization-server";

/// Name the API server certificates are issued for
const KAS_SERVICE_HOST: &str = "kubernetes.default.svc";

/// Target port of the `kubernetes` service port exposed on `service_port`
///
/// Named target ports count only when the name is a number.
pub fn kas_target_port(service: &Service, service_port: i32) -> Option<i32> {
    service
        .spec
        .as_ref()?
        .ports
        .as_ref()?
        .iter()
        .filter(|p| p.port == service_port && p.protocol.as_deref().unwrap_or("TCP") == "TCP")
        .find_map(|p| {
            let port = match p.target_port.as_ref()? {
                IntOrString::Int(port) => *port,
                IntOrString::String(name) => name.parse::<i32>().ok()?,
            };
            (port != 0).then_some(port)
        })
}

/// Ready addresses of the subset serving `port`
///
/// Returns `None` unless that subset exists, has no not-ready addresses and
/// has at least one ready address.
pub fn ready_addresses(endpoints: &Endpoints, port: i32) -> Option<Vec<String>> {
    let subset = endpoints.subsets.as_ref()?.iter().find(|s| {
        s.ports.as_ref().is_some_and(|ports| {
            ports
                .iter()
                .any(|p| p.port == port && p.protocol.as_deref().unwrap_or("TCP") == "TCP")
        })
    })?;

    if subset.not_ready_addresses.as_ref().is_some_and(|a| !a.is_empty()) {
        return None;
    }
    let addresses: Vec<String> = subset
        .addresses
        .as_ref()?
        .iter()
        .map(|a| a.ip.clone())
        .collect();
    (!addresses.is_empty()).then_some(addresses)
}

/// GET the discovery document from each API server endpoint
pub struct WellKnownCheck {
    reader: Arc<dyn ClusterReader>,
    probe: Arc<dyn HttpProbe>,
    kas_service_port: i32,
    service_account_ca_path: PathBuf,
}

impl WellKnownCheck {
    /// Create the check
    pub fn new(
        reader: Arc<dyn ClusterReader>,
        probe: Arc<dyn HttpProbe>,
        kas_service_port: i32,
        service_account_ca_path: PathBuf,
    ) -> Self {
        Self {
            reader,
            probe,
            kas_service_port,
            service_account_ca_path,
        }
    }

    async fn endpoints(&self) -> Result<(i32, Vec<String>)> {
        let service = self.reader.get_service("default", "kubernetes").await?;
        let endpoints = self.reader.get_endpoints("default", "kubernetes").await?;

        let port = kas_target_port(&service, self.kas_service_port).ok_or_else(|| {
            Error::probe(format!(
                "unable to find kube api server service port {}",
                self.kas_service_port
            ))
        })?;
        let addresses = ready_addresses(&endpoints, port)
            .ok_or_else(|| Error::probe("kube api server endpoints is not ready"))?;
        Ok((port, addresses))
    }

    async fn evaluate(&self, target: &ProbeTarget) -> std::result::Result<Verdict, ReasonedError> {
        let ca_bundle = tokio::fs::read(&self.service_account_ca_path)
            .await
            .map_err(|e| {
                Error::io(
                    format!("failed to read {}", self.service_account_ca_path.display()),
                    e,
                )
            })?;
        let (port, addresses) = self.endpoints().await?;
        let expected = oauth_metadata(&target.route_host);
        let url = format!("https://{KAS_SERVICE_HOST}:{port}{WELL_KNOWN_PATH}");

        for address in addresses {
            let ip: IpAddr = address.parse().map_err(|_| {
                Error::validation(format!("invalid kube api server endpoint address {address:?}"))
            })?;
            debug!(%ip, port, "fetching discovery document");

            let response = self
                .probe
                .send(ProbeRequest {
                    method: ProbeMethod::Get,
                    url: url.clone(),
                    ca_bundle: ca_bundle.clone(),
                    resolve: Some((KAS_SERVICE_HOST.to_string(), SocketAddr::new(ip, port as u16))),
                })
                .await?;

            let endpoint = format!("https://{}{WELL_KNOWN_PATH}", SocketAddr::new(ip, port as u16));
            if !response.is_ok() {
                return Ok(Verdict::not_ready(
                    "WellKnownNotReady",
                    format!(
                        "got '{}' status while trying to GET the OAuth well-known {endpoint} endpoint data",
                        response.status_text
                    ),
                ));
            }

            let served: Value = serde_json::from_slice(&response.body).map_err(Error::from)?;
            if served != expected {
                return Ok(Verdict::not_ready(
                    "WellKnownNotReady",
                    format!(
                        "the value returned by the well-known {endpoint} endpoint does not match expectations"
                    ),
                ));
            }
        }

        Ok(Verdict::Ready)
    }
}

#[async_trait]
impl ReadinessCheck for WellKnownCheck {
    fn stage(&self) -> CheckStage {
        CheckStage::WellKnown
    }

    async fn check(&self, target: &ProbeTarget) -> Verdict {
        let config = &target.auth_config;
        if config.has_external_metadata() || !config.is_integrated_oauth() {
            debug!("discovery document served externally, skipping");
            return Verdict::Ready;
        }
        self.evaluate(target).await.unwrap_or_else(Verdict::Failed)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use k8s_openapi::api::core::v1::{
        EndpointAddress, EndpointPort, EndpointSubset, ServicePort, ServiceSpec,
    };

    use super::*;
    use crate::client::MockClusterReader;
    use crate::crd::config::{AuthenticationConfigSpec, ConfigMapNameReference};
    use crate::crd::AuthenticationConfig;
    use crate::readiness::tests::target;
    use crate::readiness::transport::{MockHttpProbe, ProbeResponse};

    fn service() -> Service {
        Service {
            spec: Some(ServiceSpec {
                ports: Some(vec![ServicePort {
                    name: Some("https".to_string()),
                    port: 443,
                    protocol: Some("TCP".to_string()),
                    target_port: Some(IntOrString::Int(6443)),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn endpoints(ready: &[&str], not_ready: &[&str]) -> Endpoints {
        let addrs = |ips: &[&str]| {
            Some(
                ips.iter()
                    .map(|ip| EndpointAddress {
                        ip: ip.to_string(),
                        ..Default::default()
                    })
                    .collect::<Vec<_>>(),
            )
        };
        Endpoints {
            subsets: Some(vec![EndpointSubset {
                addresses: addrs(ready),
                not_ready_addresses: addrs(not_ready),
                ports: Some(vec![EndpointPort {
                    port: 6443,
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                }]),
            }]),
            ..Default::default()
        }
    }

    fn reader(eps: Endpoints) -> Arc<dyn ClusterReader> {
        let mut reader = MockClusterReader::new();
        reader.expect_get_service().returning(|_, _| Ok(service()));
        reader.expect_get_endpoints().returning(move |_, _| Ok(eps.clone()));
        Arc::new(reader)
    }

    fn sa_ca() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"sa-ca").unwrap();
        file
    }

    fn ok_body(body: Vec<u8>) -> ProbeResponse {
        ProbeResponse {
            status: 200,
            status_text: "200 OK".to_string(),
            body,
        }
    }

    #[test]
    fn target_port_matches_service_port_and_tcp() {
        assert_eq!(kas_target_port(&service(), 443), Some(6443));
        assert_eq!(kas_target_port(&service(), 6443), None);
    }

    #[test]
    fn numeric_string_target_port_is_accepted() {
        let with_target = |target: &str| {
            let mut svc = service();
            if let Some(ports) = svc.spec.as_mut().and_then(|s| s.ports.as_mut()) {
                ports[0].target_port = Some(IntOrString::String(target.to_string()));
            }
            svc
        };
        assert_eq!(kas_target_port(&with_target("6443"), 443), Some(6443));
        assert_eq!(kas_target_port(&with_target("https"), 443), None);
        assert_eq!(kas_target_port(&with_target("0"), 443), None);
    }

    #[test]
    fn endpoints_need_every_address_ready() {
        assert_eq!(
            ready_addresses(&endpoints(&["10.0.0.1", "10.0.0.2"], &[]), 6443),
            Some(vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()])
        );
        assert_eq!(ready_addresses(&endpoints(&["10.0.0.1"], &["10.0.0.2"]), 6443), None);
        assert_eq!(ready_addresses(&endpoints(&[], &[]), 6443), None);
        assert_eq!(ready_addresses(&endpoints(&["10.0.0.1"], &[]), 443), None);
    }

    /// Story: every API server must serve the document for the current route host
    #[tokio::test]
    async fn story_matching_documents_are_ready() {
        let expected = serde_json::to_vec(&oauth_metadata("oauth-openshift.apps.example.com")).unwrap();
        let mut probe = MockHttpProbe::new();
        probe
            .expect_send()
            .times(2)
            .withf(|r| {
                r.url == "https://kubernetes.default.svc:6443/.well-known/oauth-authorization-server"
                    && r.ca_bundle == b"sa-ca"
                    && r.resolve.as_ref().is_some_and(|(host, addr)| {
                        host == "kubernetes.default.svc" && addr.port() == 6443
                    })
            })
            .returning(move |_| Ok(ok_body(expected.clone())));

        let ca = sa_ca();
        let check = WellKnownCheck::new(
            reader(endpoints(&["10.0.0.1", "10.0.0.2"], &[])),
            Arc::new(probe),
            443,
            ca.path().to_path_buf(),
        );
        assert!(check.check(&target()).await.is_ready());
    }

    /// Story: an API server still serving stale metadata is soft, not degraded
    #[tokio::test]
    async fn story_document_missing_a_key_is_soft() {
        let mut doc = oauth_metadata("oauth-openshift.apps.example.com");
        doc.as_object_mut().unwrap().remove("issuer");
        let body = serde_json::to_vec(&doc).unwrap();
        let mut probe = MockHttpProbe::new();
        probe.expect_send().returning(move |_| Ok(ok_body(body.clone())));

        let ca = sa_ca();
        let check = WellKnownCheck::new(
            reader(endpoints(&["10.0.0.1"], &[])),
            Arc::new(probe),
            443,
            ca.path().to_path_buf(),
        );
        match check.check(&target()).await {
            Verdict::NotReady(nr) => {
                assert_eq!(nr.reason, "WellKnownNotReady");
                assert!(nr.message.contains("does not match expectations"));
            }
            other => panic!("expected not ready, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_body_is_a_failure() {
        let mut probe = MockHttpProbe::new();
        probe.expect_send().returning(|_| Ok(ok_body(b"<html>".to_vec())));
        let ca = sa_ca();
        let check = WellKnownCheck::new(
            reader(endpoints(&["10.0.0.1"], &[])),
            Arc::new(probe),
            443,
            ca.path().to_path_buf(),
        );
        assert!(matches!(check.check(&target()).await, Verdict::Failed(_)));
    }

    #[tokio::test]
    async fn non_200_is_soft() {
        let mut probe = MockHttpProbe::new();
        probe.expect_send().returning(|_| {
            Ok(ProbeResponse {
                status: 404,
                status_text: "404 Not Found".to_string(),
                body: Vec::new(),
            })
        });
        let ca = sa_ca();
        let check = WellKnownCheck::new(
            reader(endpoints(&["10.0.0.1"], &[])),
            Arc::new(probe),
            443,
            ca.path().to_path_buf(),
        );
        match check.check(&target()).await {
            Verdict::NotReady(nr) => assert!(nr.message.starts_with("got '404 Not Found' status")),
            other => panic!("expected not ready, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unready_endpoints_fail_without_probing() {
        let mut probe = MockHttpProbe::new();
        probe.expect_send().times(0);
        let ca = sa_ca();
        let check = WellKnownCheck::new(
            reader(endpoints(&["10.0.0.1"], &["10.0.0.2"])),
            Arc::new(probe),
            443,
            ca.path().to_path_buf(),
        );
        match check.check(&target()).await {
            Verdict::Failed(f) => {
                assert_eq!(f.error.to_string(), "kube api server endpoints is not ready")
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_service_account_ca_is_a_failure() {
        let check = WellKnownCheck::new(
            Arc::new(MockClusterReader::new()),
            Arc::new(MockHttpProbe::new()),
            443,
            PathBuf::from("/nonexistent/ca.crt"),
        );
        assert!(matches!(check.check(&target()).await, Verdict::Failed(_)));
    }

    /// Story: external metadata means the API server document is not ours to check
    #[tokio::test]
    async fn story_external_metadata_skips_the_check() {
        let mut t = target();
        t.auth_config = AuthenticationConfig::new(
            "cluster",
            AuthenticationConfigSpec {
                oauth_metadata: ConfigMapNameReference {
                    name: "custom-metadata".to_string(),
                },
                ..Default::default()
            },
        );
        let check = WellKnownCheck::new(
            Arc::new(MockClusterReader::new()),
            Arc::new(MockHttpProbe::new()),
            443,
            PathBuf::from("/nonexistent/ca.crt"),
        );
        assert!(check.check(&t).await.is_ready());
    }
}

//! Route health: the OAuth server answers `/healthz` through the router

use std::sync::Arc;

use async_trait::async_trait;

use super::transport::{HttpProbe, ProbeMethod, ProbeRequest};
use super::{CheckStage, ProbeTarget, ReadinessCheck, Verdict};

/// Combine the route CA with the system trust bundle
///
/// The route CA comes first, trimmed, followed by a newline and the system
/// bundle. An empty system bundle leaves the route CA untouched.
pub fn trust_bundle(route_ca: &[u8], system: &[u8]) -> Vec<u8> {
    if system.is_empty() {
        return route_ca.to_vec();
    }
    let trimmed = String::from_utf8_lossy(route_ca);
    let mut bundle = trimmed.trim().as_bytes().to_vec();
    bundle.push(b'\n');
    bundle.extend_from_slice(system);
    bundle
}

/// HEAD `https://<route host>/healthz`
pub struct RouteHealthCheck {
    probe: Arc<dyn HttpProbe>,
    system_ca_bundle: Vec<u8>,
}

impl RouteHealthCheck {
    /// Create the check with the transport and the system trust bundle
    pub fn new(probe: Arc<dyn HttpProbe>, system_ca_bundle: Vec<u8>) -> Self {
        Self {
            probe,
            system_ca_bundle,
        }
    }
}

#[async_trait]
impl ReadinessCheck for RouteHealthCheck {
    fn stage(&self) -> CheckStage {
        CheckStage::Route
    }

    async fn check(&self, target: &ProbeTarget) -> Verdict {
        let request = ProbeRequest {
            method: ProbeMethod::Head,
            url: format!("https://{}/healthz", target.route_host),
            ca_bundle: trust_bundle(&target.route_ca, &self.system_ca_bundle),
            resolve: None,
        };

        match self.probe.send(request).await {
            Ok(response) if response.is_ok() => Verdict::Ready,
            Ok(response) => Verdict::not_ready(
                "RouteNotReady",
                format!(
                    "route not yet available, /healthz returns '{}'",
                    response.status_text
                ),
            ),
            Err(failure) => Verdict::Failed(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReasonedError;
    use crate::readiness::tests::target;
    use crate::readiness::transport::{MockHttpProbe, ProbeResponse};
    use crate::Error;

    #[test]
    fn bundle_appends_system_roots() {
        assert_eq!(trust_bundle(b"route\n\n", b"system"), b"route\nsystem".to_vec());
        assert_eq!(trust_bundle(b"route\n", b""), b"route\n".to_vec());
    }

    /// Story: a router still answering 503 keeps the operator progressing
    #[tokio::test]
    async fn story_unhealthy_route_is_not_ready() {
        let mut probe = MockHttpProbe::new();
        probe
            .expect_send()
            .withf(|r| {
                r.method == ProbeMethod::Head
                    && r.url == "https://oauth-openshift.apps.example.com/healthz"
                    && r.ca_bundle.starts_with(b"route-ca\n")
            })
            .returning(|_| {
                Ok(ProbeResponse {
                    status: 503,
                    status_text: "503 Service Unavailable".to_string(),
                    body: Vec::new(),
                })
            });

        let check = RouteHealthCheck::new(Arc::new(probe), b"system-roots".to_vec());
        match check.check(&target()).await {
            Verdict::NotReady(nr) => {
                assert_eq!(nr.reason, "RouteNotReady");
                assert_eq!(
                    nr.message,
                    "route not yet available, /healthz returns '503 Service Unavailable'"
                );
            }
            other => panic!("expected not ready, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn healthy_route_is_ready() {
        let mut probe = MockHttpProbe::new();
        probe.expect_send().returning(|_| {
            Ok(ProbeResponse {
                status: 200,
                status_text: "200 OK".to_string(),
                body: Vec::new(),
            })
        });
        let check = RouteHealthCheck::new(Arc::new(probe), Vec::new());
        assert!(check.check(&target()).await.is_ready());
    }

    #[tokio::test]
    async fn transport_failure_keeps_its_reason() {
        let mut probe = MockHttpProbe::new();
        probe
            .expect_send()
            .returning(|_| Err(ReasonedError::new("FailedGet", Error::probe("connection refused"))));
        let check = RouteHealthCheck::new(Arc::new(probe), Vec::new());
        match check.check(&target()).await {
            Verdict::Failed(f) => assert_eq!(f.reason, Some("FailedGet")),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}

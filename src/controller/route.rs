//! The OAuth server route and the certificates the router serves it with

use k8s_openapi::api::core::v1::Secret;
use tracing::{debug, info, warn};

use super::Context;
use crate::crd::{Route, RoutePort, RouteSpec, RouteTargetReference, TlsConfig};
use crate::error::ReasonedError;
use crate::resources::{default_meta, ROUTER_CERTS_NAME};
use crate::{Error, MANAGED_CONFIG_NAMESPACE, OPERAND_NAME, TARGET_NAMESPACE};

/// Config map with the default ingress CA
const DEFAULT_INGRESS_CERT: &str = "default-ingress-cert";

/// Key of the CA bundle in [`DEFAULT_INGRESS_CERT`]
const DEFAULT_INGRESS_CA_KEY: &str = "ca-bundle.crt";

/// What the rest of the pipeline needs from the route
#[derive(Clone, Debug)]
pub struct RouteState {
    /// The route as stored
    pub route: Route,
    /// Canonical admitted host
    pub host: String,
    /// Router certificates, one data entry per ingress domain
    pub router_secret: Secret,
    /// CA that signed the certificate served for the host
    pub ca: Vec<u8>,
}

/// Desired route for an ingress domain
pub fn default_route(domain: &str) -> Route {
    let mut route = Route::new(
        OPERAND_NAME,
        RouteSpec {
            host: format!("{OPERAND_NAME}.{domain}"),
            to: RouteTargetReference {
                kind: "Service".to_string(),
                name: OPERAND_NAME.to_string(),
                weight: Some(100),
            },
            port: Some(RoutePort {
                target_port: "6443".to_string(),
            }),
            tls: Some(TlsConfig {
                termination: "passthrough".to_string(),
                insecure_edge_termination_policy: "Redirect".to_string(),
            }),
            wildcard_policy: "None".to_string(),
        },
    );
    route.metadata = default_meta(OPERAND_NAME);
    route
}

/// Host the route is admitted on under `domain`, if any
pub fn canonical_host(route: &Route, domain: &str) -> Option<String> {
    let suffix = format!(".{domain}");
    route
        .status
        .as_ref()?
        .ingress
        .iter()
        .find(|i| i.is_admitted() && i.host.ends_with(&suffix))
        .map(|i| i.host.clone())
}

/// Ensure the route exists with the expected spec and resolve its host and CA
///
/// Failures carry the reason reported on `RouteStatusDegraded`.
pub async fn handle_route(ctx: &Context, domain: &str) -> Result<RouteState, ReasonedError> {
    let expected = default_route(domain);

    let route = match ctx.reader.get_route(TARGET_NAMESPACE, OPERAND_NAME).await {
        Ok(existing) if existing.spec == expected.spec => existing,
        Ok(_) => {
            info!(%domain, "route spec drifted, updating");
            ctx.applier
                .apply_route(expected.clone())
                .await
                .map_err(|e| ReasonedError::new("FailedUpdate", e))?
                .object
        }
        Err(e) if e.is_not_found() => {
            info!(%domain, "creating route");
            ctx.applier
                .apply_route(expected.clone())
                .await
                .map_err(|e| ReasonedError::new("FailedCreate", e))?
                .object
        }
        Err(e) => return Err(ReasonedError::new("FailedCreate", e)),
    };

    let host = canonical_host(&route, domain).ok_or_else(|| {
        ReasonedError::new(
            "FailedHost",
            Error::probe(format!(
                "route is not available at canonical host {}: {:?}",
                expected.spec.host,
                route.status.as_ref().map(|s| &s.ingress)
            )),
        )
    })?;

    let router_secret = ctx
        .reader
        .get_secret(TARGET_NAMESPACE, ROUTER_CERTS_NAME)
        .await
        .map_err(|e| ReasonedError::new("FailedRouterSecret", e))?;
    if router_secret.data.as_ref().map_or(true, |d| d.is_empty()) {
        return Err(ReasonedError::new(
            "FailedRouterSecret",
            Error::probe("router secret is empty"),
        ));
    }

    let ca = route_ca(ctx, &router_secret, domain).await;
    debug!(%host, ca_len = ca.len(), "route resolved");

    Ok(RouteState {
        route,
        host,
        router_secret,
        ca,
    })
}

/// The router's certificate for `domain`, falling back to the default ingress CA
async fn route_ca(ctx: &Context, router_secret: &Secret, domain: &str) -> Vec<u8> {
    if let Some(pem) = router_secret.data.as_ref().and_then(|d| d.get(domain)) {
        return pem.0.clone();
    }

    match ctx
        .reader
        .get_config_map(MANAGED_CONFIG_NAMESPACE, DEFAULT_INGRESS_CERT)
        .await
    {
        Ok(cm) => cm
            .data
            .and_then(|mut d| d.remove(DEFAULT_INGRESS_CA_KEY))
            .map(String::into_bytes)
            .unwrap_or_default(),
        Err(e) => {
            warn!(error = %e, %domain, "no router certificate for domain and no default ingress CA");
            Vec::new()
        }
    }
}

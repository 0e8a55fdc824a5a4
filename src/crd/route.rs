//! Route and OAuthClient resources
//!
//! `Route` is typed since the operator reads its admission status. OAuth
//! clients are only created and fetched by name, so they travel as
//! `DynamicObject`s built from [`OAuthClient`].

use kube::api::{ApiResource, DynamicObject, GroupVersionKind, ObjectMeta};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Route specification
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "route.openshift.io",
    version = "v1",
    kind = "Route",
    namespaced,
    status = "RouteStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    /// Requested host
    #[serde(default)]
    pub host: String,
    /// Backend service
    pub to: RouteTargetReference,
    /// Target port on the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<RoutePort>,
    /// TLS termination
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
    /// Wildcard policy
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub wildcard_policy: String,
}

/// Route backend
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct RouteTargetReference {
    /// Backend kind, always `Service`
    pub kind: String,
    /// Backend name
    pub name: String,
    /// Relative weight
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
}

/// Route backend port
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoutePort {
    /// Port name or number as a string
    pub target_port: String,
}

/// Route TLS settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TlsConfig {
    /// `edge`, `passthrough` or `reencrypt`
    pub termination: String,
    /// `None`, `Allow` or `Redirect`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub insecure_edge_termination_policy: String,
}

/// Route admission status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct RouteStatus {
    /// One entry per router that evaluated the route
    #[serde(default)]
    pub ingress: Vec<RouteIngress>,
}

/// A router's view of the route
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteIngress {
    /// Host the router serves the route on
    #[serde(default)]
    pub host: String,
    /// Router name
    #[serde(default)]
    pub router_name: String,
    /// Admission conditions
    #[serde(default)]
    pub conditions: Vec<RouteIngressCondition>,
}

/// Route ingress condition
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct RouteIngressCondition {
    /// Condition type, `Admitted` is the one that matters
    #[serde(rename = "type")]
    pub type_: String,
    /// `True`, `False` or `Unknown`
    pub status: String,
}

impl RouteIngress {
    /// True if the router admitted the route
    pub fn is_admitted(&self) -> bool {
        self.conditions
            .iter()
            .any(|c| c.type_ == "Admitted" && c.status == "True")
    }
}

// =============================================================================
// OAuthClient
// =============================================================================

/// Bootstrapped OAuth client
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OAuthClient {
    /// Client name
    pub name: String,
    /// Client secret (empty for public clients)
    pub secret: String,
    /// Allowed redirect URIs
    pub redirect_uris: Vec<String>,
    /// `auto` or `prompt`
    pub grant_method: String,
    /// Whether the client gets WWW-Authenticate challenges
    pub respond_with_challenges: bool,
}

impl OAuthClient {
    /// API resource of `oauthclients.oauth.openshift.io/v1`
    pub fn api_resource() -> ApiResource {
        ApiResource::from_gvk_with_plural(
            &GroupVersionKind::gvk("oauth.openshift.io", "v1", "OAuthClient"),
            "oauthclients",
        )
    }

    /// Convert to a dynamic object ready to be created
    pub fn to_dynamic(&self) -> DynamicObject {
        let mut data = serde_json::json!({
            "redirectURIs": self.redirect_uris,
            "grantMethod": self.grant_method,
            "respondWithChallenges": self.respond_with_challenges,
        });
        if !self.secret.is_empty() {
            data["secret"] = serde_json::Value::String(self.secret.clone());
        }

        DynamicObject {
            types: Some(kube::api::TypeMeta {
                api_version: "oauth.openshift.io/v1".to_string(),
                kind: "OAuthClient".to_string(),
            }),
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                ..Default::default()
            },
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingress(host: &str, admitted: &str) -> RouteIngress {
        RouteIngress {
            host: host.to_string(),
            router_name: "default".to_string(),
            conditions: vec![RouteIngressCondition {
                type_: "Admitted".to_string(),
                status: admitted.to_string(),
            }],
        }
    }

    #[test]
    fn admission_requires_true_admitted_condition() {
        assert!(ingress("a", "True").is_admitted());
        assert!(!ingress("a", "False").is_admitted());
        assert!(!RouteIngress::default().is_admitted());
    }

    #[test]
    fn oauth_client_dynamic_object_shape() {
        let client = OAuthClient {
            name: "openshift-challenging-client".to_string(),
            secret: String::new(),
            redirect_uris: vec!["https://oauth/oauth/token/implicit".to_string()],
            grant_method: "auto".to_string(),
            respond_with_challenges: true,
        };
        let obj = client.to_dynamic();
        assert_eq!(obj.metadata.name.as_deref(), Some("openshift-challenging-client"));
        assert_eq!(obj.data["respondWithChallenges"], true);
        assert!(obj.data.get("secret").is_none());
        assert_eq!(OAuthClient::api_resource().plural, "oauthclients");
    }

    #[test]
    fn route_spec_uses_api_field_names() {
        let spec = RouteSpec {
            host: "oauth-openshift.apps.example.com".to_string(),
            to: RouteTargetReference {
                kind: "Service".to_string(),
                name: "oauth-openshift".to_string(),
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
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["port"]["targetPort"], "6443");
        assert_eq!(json["tls"]["insecureEdgeTerminationPolicy"], "Redirect");
        assert_eq!(json["wildcardPolicy"], "None");
    }
}

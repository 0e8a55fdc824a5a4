//! Cluster configuration resources read by the operator
//!
//! These are the `config.openshift.io/v1` singletons owned by other
//! subsystems. Only the fields the operator consumes are modelled; everything
//! else is ignored on deserialization.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to a secret in `openshift-config`
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct SecretNameReference {
    /// Secret name
    pub name: String,
}

/// Reference to a config map in `openshift-config`
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ConfigMapNameReference {
    /// Config map name
    pub name: String,
}

// =============================================================================
// Ingress
// =============================================================================

/// Cluster ingress configuration
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(group = "config.openshift.io", version = "v1", kind = "Ingress", root = "IngressConfig")]
#[serde(rename_all = "camelCase")]
pub struct IngressConfigSpec {
    /// Base domain for routes (e.g. `apps.example.com`)
    #[serde(default)]
    pub domain: String,
}

// =============================================================================
// Proxy
// =============================================================================

/// Cluster-wide egress proxy configuration
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "config.openshift.io",
    version = "v1",
    kind = "Proxy",
    root = "ProxyConfig",
    status = "ProxyConfigStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfigSpec {
    /// Requested HTTP proxy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_proxy: Option<String>,
    /// Requested HTTPS proxy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https_proxy: Option<String>,
    /// Requested no-proxy list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_proxy: Option<String>,
}

/// Effective proxy settings computed by the network operator
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfigStatus {
    /// Effective HTTP proxy
    #[serde(default)]
    pub http_proxy: String,
    /// Effective HTTPS proxy
    #[serde(default)]
    pub https_proxy: String,
    /// Effective no-proxy list
    #[serde(default)]
    pub no_proxy: String,
}

impl ProxyConfig {
    /// Proxy environment variables for the operand, empty values omitted
    pub fn env_vars(&self) -> Vec<(&'static str, String)> {
        let Some(status) = &self.status else {
            return Vec::new();
        };
        [
            ("HTTP_PROXY", &status.http_proxy),
            ("HTTPS_PROXY", &status.https_proxy),
            ("NO_PROXY", &status.no_proxy),
        ]
        .into_iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| (k, v.clone()))
        .collect()
    }
}

// =============================================================================
// Infrastructure
// =============================================================================

/// Cluster infrastructure description
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "config.openshift.io",
    version = "v1",
    kind = "Infrastructure",
    root = "InfrastructureConfig",
    status = "InfrastructureConfigStatus"
)]
pub struct InfrastructureConfigSpec {}

/// Observed infrastructure facts
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureConfigStatus {
    /// External API server URL
    #[serde(default, rename = "apiServerURL")]
    pub api_server_url: String,
    /// `HighlyAvailable`, `SingleReplica` or `External`
    #[serde(default)]
    pub control_plane_topology: String,
}

impl InfrastructureConfig {
    /// True when the control plane runs a single replica of everything
    pub fn is_single_replica(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|s| s.control_plane_topology == "SingleReplica")
    }
}

// =============================================================================
// API server
// =============================================================================

/// API server configuration
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(group = "config.openshift.io", version = "v1", kind = "APIServer", root = "ApiServerConfig")]
#[serde(rename_all = "camelCase")]
pub struct ApiServerConfigSpec {
    /// TLS profile shared by all control plane servers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_security_profile: Option<TlsSecurityProfile>,
}

/// TLS security profile selection
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TlsSecurityProfile {
    /// `Old`, `Intermediate`, `Modern` or `Custom`
    #[serde(default, rename = "type")]
    pub type_: String,
    /// Settings for the `Custom` profile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<TlsProfileSpec>,
}

/// Explicit cipher and version settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TlsProfileSpec {
    /// Cipher suite names
    #[serde(default)]
    pub ciphers: Vec<String>,
    /// Minimum TLS version (e.g. `VersionTLS12`)
    #[serde(default)]
    pub min_tls_version: String,
}

impl ApiServerConfig {
    /// Minimum TLS version and cipher list for the serving config
    ///
    /// Only `Custom` profiles carry explicit settings; every other profile
    /// maps to the intermediate defaults.
    pub fn serving_tls(&self) -> (String, Vec<String>) {
        match self
            .spec
            .tls_security_profile
            .as_ref()
            .and_then(|p| (p.type_ == "Custom").then_some(p.custom.as_ref()).flatten())
        {
            Some(custom) if !custom.min_tls_version.is_empty() => {
                (custom.min_tls_version.clone(), custom.ciphers.clone())
            }
            _ => ("VersionTLS12".to_string(), Vec::new()),
        }
    }
}

// =============================================================================
// Console
// =============================================================================

/// Console configuration
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "config.openshift.io",
    version = "v1",
    kind = "Console",
    root = "ConsoleConfig",
    status = "ConsoleConfigStatus"
)]
pub struct ConsoleConfigSpec {}

/// Observed console facts
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleConfigStatus {
    /// Public console URL
    #[serde(default, rename = "consoleURL")]
    pub console_url: String,
}

// =============================================================================
// Authentication (config)
// =============================================================================

/// Type of the cluster's authentication
pub const AUTHENTICATION_TYPE_INTEGRATED_OAUTH: &str = "IntegratedOAuth";

/// Cluster authentication configuration
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "config.openshift.io",
    version = "v1",
    kind = "Authentication",
    root = "AuthenticationConfig"
)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationConfigSpec {
    /// `IntegratedOAuth` (empty means the same) or `None`
    #[serde(default, rename = "type")]
    pub type_: String,
    /// User-supplied discovery document
    #[serde(default)]
    pub oauth_metadata: ConfigMapNameReference,
}

impl AuthenticationConfig {
    /// True when the integrated OAuth server is the authentication type
    pub fn is_integrated_oauth(&self) -> bool {
        self.spec.type_.is_empty() || self.spec.type_ == AUTHENTICATION_TYPE_INTEGRATED_OAUTH
    }

    /// True when the cluster publishes its own discovery document
    pub fn has_external_metadata(&self) -> bool {
        !self.spec.oauth_metadata.name.is_empty()
    }
}

// =============================================================================
// OAuth
// =============================================================================

/// OAuth server configuration (identity providers, tokens, templates)
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(group = "config.openshift.io", version = "v1", kind = "OAuth", root = "OAuthConfig")]
#[serde(rename_all = "camelCase")]
pub struct OAuthConfigSpec {
    /// Ordered identity providers
    #[serde(default)]
    pub identity_providers: Vec<IdentityProvider>,
    /// Token lifetimes
    #[serde(default)]
    pub token_config: TokenConfig,
    /// Custom login pages
    #[serde(default)]
    pub templates: OAuthTemplates,
}

/// Token lifetime settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenConfig {
    /// Access token lifetime in seconds (0 = default of 86400)
    #[serde(default)]
    pub access_token_max_age_seconds: i32,
    /// Inactivity timeout (Go duration string)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_inactivity_timeout: Option<String>,
}

/// Secrets holding the custom HTML templates
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OAuthTemplates {
    /// Login page (key `login.html`)
    #[serde(default)]
    pub login: SecretNameReference,
    /// Provider selection page (key `providers.html`)
    #[serde(default)]
    pub provider_selection: SecretNameReference,
    /// Error page (key `errors.html`)
    #[serde(default)]
    pub error: SecretNameReference,
}

/// One configured identity provider
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IdentityProvider {
    /// Provider name, prefixes user identities
    pub name: String,
    /// `claim`, `lookup`, `generate` or `add`
    #[serde(default)]
    pub mapping_method: String,
    /// Provider type, selects which block below is used
    #[serde(rename = "type")]
    pub type_: String,
    /// HTPasswd file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub htpasswd: Option<HtpasswdProvider>,
    /// Remote basic auth endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth: Option<BasicAuthProvider>,
    /// GitHub OAuth app
    #[serde(default, rename = "github", skip_serializing_if = "Option::is_none")]
    pub github: Option<OAuthAppProvider>,
    /// GitLab OAuth app
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gitlab: Option<OAuthAppProvider>,
    /// Google OAuth app
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google: Option<OAuthAppProvider>,
    /// LDAP directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ldap: Option<LdapProvider>,
    /// OpenID Connect issuer
    #[serde(default, rename = "openID", skip_serializing_if = "Option::is_none")]
    pub open_id: Option<OpenIdProvider>,
}

/// HTPasswd provider settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HtpasswdProvider {
    /// Secret holding the `htpasswd` key
    pub file_data: SecretNameReference,
}

/// Basic auth provider settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BasicAuthProvider {
    /// Remote URL
    pub url: String,
    /// CA bundle (key `ca.crt`)
    #[serde(default)]
    pub ca: ConfigMapNameReference,
    /// Client certificate (key `tls.crt`)
    #[serde(default)]
    pub tls_client_cert: SecretNameReference,
    /// Client key (key `tls.key`)
    #[serde(default)]
    pub tls_client_key: SecretNameReference,
}

/// OAuth application settings shared by GitHub, GitLab and Google
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OAuthAppProvider {
    /// OAuth client ID
    #[serde(rename = "clientID")]
    pub client_id: String,
    /// Secret holding the `clientSecret` key
    pub client_secret: SecretNameReference,
    /// CA bundle (key `ca.crt`)
    #[serde(default)]
    pub ca: ConfigMapNameReference,
    /// GitHub Enterprise hostname
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hostname: String,
    /// GitLab URL
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    /// Google hosted domain
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hosted_domain: String,
    /// Allowed GitHub organizations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub organizations: Vec<String>,
    /// Allowed GitHub teams
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub teams: Vec<String>,
}

/// LDAP provider settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LdapProvider {
    /// RFC 2255 LDAP URL
    pub url: String,
    /// Bind DN
    #[serde(default, rename = "bindDN")]
    pub bind_dn: String,
    /// Secret holding the `bindPassword` key
    #[serde(default)]
    pub bind_password: SecretNameReference,
    /// Skip TLS
    #[serde(default)]
    pub insecure: bool,
    /// CA bundle (key `ca.crt`)
    #[serde(default)]
    pub ca: ConfigMapNameReference,
    /// Attribute mapping, passed through verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(skip)]
    pub attributes: Option<serde_json::Value>,
}

/// OpenID Connect provider settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpenIdProvider {
    /// OAuth client ID
    #[serde(rename = "clientID")]
    pub client_id: String,
    /// Secret holding the `clientSecret` key
    pub client_secret: SecretNameReference,
    /// CA bundle (key `ca.crt`)
    #[serde(default)]
    pub ca: ConfigMapNameReference,
    /// Issuer URL
    pub issuer: String,
    /// Extra scopes to request
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_scopes: Vec<String>,
    /// Claim mapping, passed through verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(skip)]
    pub claims: Option<serde_json::Value>,
}

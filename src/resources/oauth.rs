//! OAuth server configuration document and the user data it references
//!
//! Identity provider secrets and config maps live in `openshift-config`. The
//! OAuth server can only mount objects from its own namespace, so every
//! referenced object gets a mirrored copy under the `v4-0-config-user-` prefix
//! and the config document points at the mounted files.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use serde_json::{json, Map, Value};
use tracing::warn;

use super::service::OAUTH_PORT;
use super::{
    default_meta, system_config_map_dir, system_secret_dir, CLI_CONFIG_NAME, ROUTER_CERTS_NAME,
    SERVICE_CA_NAME, SERVING_CERT_NAME, SESSION_NAME, USER_PREFIX,
};
use crate::crd::config::{
    ConfigMapNameReference, IdentityProvider, OAuthConfig, SecretNameReference,
};
use crate::crd::{
    ApiServerConfig, AuthenticationOperatorSpec, ConsoleConfig, InfrastructureConfig,
};

const DEFAULT_ACCESS_TOKEN_MAX_AGE_SECONDS: i32 = 86400;

/// Where a mirrored object comes from and where it is mounted
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncSource {
    /// Object name in `openshift-config`
    pub source: String,
    /// Mount directory inside the OAuth server pod
    pub mount_dir: String,
}

/// Objects to mirror into the target namespace, keyed by destination name
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigSyncData {
    /// Secrets to mirror
    pub secrets: BTreeMap<String, SyncSource>,
    /// Config maps to mirror
    pub config_maps: BTreeMap<String, SyncSource>,
}

impl ConfigSyncData {
    /// Register an identity provider secret, returning the file path of `key`
    pub fn add_idp_secret(
        &mut self,
        index: usize,
        field: &str,
        reference: &SecretNameReference,
        key: &str,
    ) -> Option<String> {
        if reference.name.is_empty() {
            return None;
        }
        let dest = format!("{USER_PREFIX}idp-{index}-{field}");
        let mount_dir = format!("/var/config/user/idp/{index}/secret/{dest}");
        Some(insert(&mut self.secrets, dest, &reference.name, mount_dir, key))
    }

    /// Register an identity provider config map, returning the file path of `key`
    pub fn add_idp_config_map(
        &mut self,
        index: usize,
        field: &str,
        reference: &ConfigMapNameReference,
        key: &str,
    ) -> Option<String> {
        if reference.name.is_empty() {
            return None;
        }
        let dest = format!("{USER_PREFIX}idp-{index}-{field}");
        let mount_dir = format!("/var/config/user/idp/{index}/configMap/{dest}");
        Some(insert(&mut self.config_maps, dest, &reference.name, mount_dir, key))
    }

    /// Register a login template secret, returning the file path of `key`
    pub fn add_template_secret(
        &mut self,
        field: &str,
        reference: &SecretNameReference,
        key: &str,
    ) -> Option<String> {
        if reference.name.is_empty() {
            return None;
        }
        let dest = format!("{USER_PREFIX}template-{field}");
        let mount_dir = format!("/var/config/user/template/secret/{dest}");
        Some(insert(&mut self.secrets, dest, &reference.name, mount_dir, key))
    }
}

fn insert(
    map: &mut BTreeMap<String, SyncSource>,
    dest: String,
    source: &str,
    mount_dir: String,
    key: &str,
) -> String {
    let path = format!("{mount_dir}/{key}");
    map.insert(
        dest,
        SyncSource {
            source: source.to_string(),
            mount_dir,
        },
    );
    path
}

/// Inputs of the CLI config document
pub struct CliConfigInputs<'a> {
    /// Operator spec (log level, overrides)
    pub operator: &'a AuthenticationOperatorSpec,
    /// Canonical route host
    pub route_host: &'a str,
    /// Router certificates, one data entry per ingress domain
    pub router_secret: &'a Secret,
    /// Console snapshot
    pub console: Option<&'a ConsoleConfig>,
    /// Infrastructure snapshot
    pub infrastructure: Option<&'a InfrastructureConfig>,
    /// API server snapshot
    pub api_server: Option<&'a ApiServerConfig>,
    /// Identity providers, token settings and templates
    pub oauth: &'a OAuthConfig,
}

/// Build the CLI config map and the sync payload it depends on
pub fn cli_config_map(inputs: &CliConfigInputs<'_>) -> crate::Result<(ConfigMap, ConfigSyncData)> {
    let mut sync = ConfigSyncData::default();

    let identity_providers: Vec<Value> = inputs
        .oauth
        .spec
        .identity_providers
        .iter()
        .enumerate()
        .filter_map(|(i, idp)| convert_identity_provider(i, idp, &mut sync))
        .collect();

    let templates = &inputs.oauth.spec.templates;
    let mut template_paths = Map::new();
    for (json_key, field, reference, file) in [
        ("login", "login", &templates.login, "login.html"),
        (
            "providerSelection",
            "provider-selection",
            &templates.provider_selection,
            "providers.html",
        ),
        ("error", "error", &templates.error, "errors.html"),
    ] {
        if let Some(path) = sync.add_template_secret(field, reference, file) {
            template_paths.insert(json_key.to_string(), Value::String(path));
        }
    }

    let token_config = &inputs.oauth.spec.token_config;
    let access_token_max_age = match token_config.access_token_max_age_seconds {
        0 => DEFAULT_ACCESS_TOKEN_MAX_AGE_SECONDS,
        n => n,
    };
    let mut token = json!({
        "authorizeTokenMaxAgeSeconds": 300,
        "accessTokenMaxAgeSeconds": access_token_max_age,
    });
    if let Some(timeout) = &token_config.access_token_inactivity_timeout {
        token["accessTokenInactivityTimeout"] = Value::String(timeout.clone());
    }

    let (min_tls_version, cipher_suites) = inputs
        .api_server
        .map(ApiServerConfig::serving_tls)
        .unwrap_or_else(|| ("VersionTLS12".to_string(), Vec::new()));

    let issuer = format!("https://{}", inputs.route_host);
    let login_url = inputs
        .infrastructure
        .and_then(|i| i.status.as_ref())
        .map(|s| s.api_server_url.clone())
        .unwrap_or_default();
    let asset_public_url = inputs
        .console
        .and_then(|c| c.status.as_ref())
        .map(|s| s.console_url.clone())
        .unwrap_or_default();

    let mut document = json!({
        "apiVersion": "osin.config.openshift.io/v1",
        "kind": "OsinServerConfig",
        "servingInfo": {
            "bindAddress": format!("0.0.0.0:{OAUTH_PORT}"),
            "bindNetwork": "tcp4",
            "certFile": format!("{}/tls.crt", system_secret_dir(SERVING_CERT_NAME)),
            "keyFile": format!("{}/tls.key", system_secret_dir(SERVING_CERT_NAME)),
            "namedCertificates": named_certificates(inputs.router_secret),
            "minTLSVersion": min_tls_version,
            "cipherSuites": cipher_suites,
            "maxRequestsInFlight": 1000,
            "requestTimeoutSeconds": 300,
        },
        "oauthConfig": {
            "masterCA": format!("{}/service-ca.crt", system_config_map_dir(SERVICE_CA_NAME)),
            "masterURL": issuer,
            "masterPublicURL": issuer,
            "loginURL": login_url,
            "assetPublicURL": asset_public_url,
            "alwaysShowProviderSelection": false,
            "identityProviders": identity_providers,
            "grantConfig": {
                "method": "prompt",
                "serviceAccountMethod": "prompt",
            },
            "sessionConfig": {
                "sessionSecretsFile": format!("{}/{SESSION_NAME}", system_secret_dir(SESSION_NAME)),
                "sessionMaxAgeSeconds": 300,
                "sessionName": "ssn",
            },
            "tokenConfig": token,
            "templates": Value::Object(template_paths),
        },
    });

    if let Some(overrides) = &inputs.operator.unsupported_config_overrides {
        merge_json(&mut document, overrides);
    }

    let rendered = serde_json::to_string(&document)?;
    let config_map = ConfigMap {
        metadata: default_meta(CLI_CONFIG_NAME),
        data: Some(BTreeMap::from([(CLI_CONFIG_NAME.to_string(), rendered)])),
        ..Default::default()
    };
    Ok((config_map, sync))
}

fn named_certificates(router_secret: &Secret) -> Vec<Value> {
    let dir = system_secret_dir(ROUTER_CERTS_NAME);
    router_secret
        .data
        .iter()
        .flat_map(|d| d.keys())
        .map(|domain| {
            let file = format!("{dir}/{domain}");
            json!({
                "names": [format!("*.{domain}")],
                "certFile": file,
                "keyFile": file,
            })
        })
        .collect()
}

fn convert_identity_provider(
    index: usize,
    idp: &IdentityProvider,
    sync: &mut ConfigSyncData,
) -> Option<Value> {
    let (challenge, provider) = match idp.type_.as_str() {
        "HTPasswd" => {
            let p = idp.htpasswd.as_ref()?;
            let file = sync.add_idp_secret(index, "file-data", &p.file_data, "htpasswd");
            (
                true,
                json!({"kind": "HTPasswdPasswordIdentityProvider", "file": file}),
            )
        }
        "BasicAuth" => {
            let p = idp.basic_auth.as_ref()?;
            (
                true,
                json!({
                    "kind": "BasicAuthPasswordIdentityProvider",
                    "url": p.url,
                    "ca": sync.add_idp_config_map(index, "ca", &p.ca, "ca.crt"),
                    "certFile": sync.add_idp_secret(index, "tls-client-cert", &p.tls_client_cert, "tls.crt"),
                    "keyFile": sync.add_idp_secret(index, "tls-client-key", &p.tls_client_key, "tls.key"),
                }),
            )
        }
        "GitHub" | "GitLab" | "Google" => {
            let (kind, p) = match idp.type_.as_str() {
                "GitHub" => ("GitHubIdentityProvider", idp.github.as_ref()?),
                "GitLab" => ("GitLabIdentityProvider", idp.gitlab.as_ref()?),
                _ => ("GoogleIdentityProvider", idp.google.as_ref()?),
            };
            let mut provider = json!({
                "kind": kind,
                "clientID": p.client_id,
                "clientSecret": {
                    "file": sync.add_idp_secret(index, "client-secret", &p.client_secret, "clientSecret"),
                },
                "ca": sync.add_idp_config_map(index, "ca", &p.ca, "ca.crt"),
            });
            if !p.hostname.is_empty() {
                provider["hostname"] = json!(p.hostname);
            }
            if !p.url.is_empty() {
                provider["url"] = json!(p.url);
            }
            if !p.hosted_domain.is_empty() {
                provider["hostedDomain"] = json!(p.hosted_domain);
            }
            if !p.organizations.is_empty() {
                provider["organizations"] = json!(p.organizations);
            }
            if !p.teams.is_empty() {
                provider["teams"] = json!(p.teams);
            }
            (false, provider)
        }
        "LDAP" => {
            let p = idp.ldap.as_ref()?;
            let mut provider = json!({
                "kind": "LDAPPasswordIdentityProvider",
                "url": p.url,
                "bindDN": p.bind_dn,
                "insecure": p.insecure,
                "ca": sync.add_idp_config_map(index, "ca", &p.ca, "ca.crt"),
            });
            if let Some(path) =
                sync.add_idp_secret(index, "bind-password", &p.bind_password, "bindPassword")
            {
                provider["bindPassword"] = json!({"file": path});
            }
            if let Some(attributes) = &p.attributes {
                provider["attributes"] = attributes.clone();
            }
            (true, provider)
        }
        "OpenID" => {
            let p = idp.open_id.as_ref()?;
            let mut provider = json!({
                "kind": "OpenIDIdentityProvider",
                "clientID": p.client_id,
                "clientSecret": {
                    "file": sync.add_idp_secret(index, "client-secret", &p.client_secret, "clientSecret"),
                },
                "ca": sync.add_idp_config_map(index, "ca", &p.ca, "ca.crt"),
                "issuer": p.issuer,
                "extraScopes": p.extra_scopes,
            });
            if let Some(claims) = &p.claims {
                provider["claims"] = claims.clone();
            }
            (false, provider)
        }
        other => {
            warn!(name = %idp.name, kind = %other, "skipping unsupported identity provider");
            return None;
        }
    };

    let mut provider = provider;
    provider["apiVersion"] = json!("osin.config.openshift.io/v1");
    strip_nulls(&mut provider);

    let mapping_method = match idp.mapping_method.as_str() {
        "" => "claim",
        m => m,
    };
    Some(json!({
        "name": idp.name,
        "challenge": challenge,
        "login": true,
        "mappingMethod": mapping_method,
        "provider": provider,
    }))
}

fn strip_nulls(value: &mut Value) {
    if let Value::Object(map) = value {
        map.retain(|_, v| !v.is_null());
        map.values_mut().for_each(strip_nulls);
    }
}

/// Recursively merge `patch` into `base`; non-object values replace
fn merge_json(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (k, v) in patch {
                merge_json(base.entry(k.clone()).or_insert(Value::Null), v);
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::config::{
        HtpasswdProvider, OAuthConfigSpec, OAuthTemplates, OpenIdProvider,
    };
    use k8s_openapi::ByteString;

    fn router_secret() -> Secret {
        Secret {
            data: Some(BTreeMap::from([(
                "apps.example.com".to_string(),
                ByteString(b"pem".to_vec()),
            )])),
            ..Default::default()
        }
    }

    fn oauth(spec: OAuthConfigSpec) -> OAuthConfig {
        OAuthConfig::new("cluster", spec)
    }

    fn build(operator: &AuthenticationOperatorSpec, oauth: &OAuthConfig) -> (Value, ConfigSyncData) {
        let secret = router_secret();
        let inputs = CliConfigInputs {
            operator,
            route_host: "oauth-openshift.apps.example.com",
            router_secret: &secret,
            console: None,
            infrastructure: None,
            api_server: None,
            oauth,
        };
        let (cm, sync) = cli_config_map(&inputs).unwrap();
        let raw = cm.data.unwrap().remove(CLI_CONFIG_NAME).unwrap();
        (serde_json::from_str(&raw).unwrap(), sync)
    }

    /// Story: an htpasswd provider gets its secret mirrored and mounted
    #[test]
    fn story_htpasswd_secret_is_mirrored() {
        let spec = OAuthConfigSpec {
            identity_providers: vec![IdentityProvider {
                name: "local".to_string(),
                type_: "HTPasswd".to_string(),
                htpasswd: Some(HtpasswdProvider {
                    file_data: SecretNameReference {
                        name: "htpass-secret".to_string(),
                    },
                }),
                ..Default::default()
            }],
            ..Default::default()
        };
        let (doc, sync) = build(&AuthenticationOperatorSpec::default(), &oauth(spec));

        let dest = "v4-0-config-user-idp-0-file-data";
        assert_eq!(sync.secrets[dest].source, "htpass-secret");

        let idp = &doc["oauthConfig"]["identityProviders"][0];
        assert_eq!(idp["name"], "local");
        assert_eq!(idp["challenge"], true);
        assert_eq!(idp["mappingMethod"], "claim");
        assert_eq!(
            idp["provider"]["file"],
            format!("/var/config/user/idp/0/secret/{dest}/htpasswd")
        );
    }

    #[test]
    fn openid_provider_omits_missing_ca() {
        let spec = OAuthConfigSpec {
            identity_providers: vec![IdentityProvider {
                name: "sso".to_string(),
                type_: "OpenID".to_string(),
                open_id: Some(OpenIdProvider {
                    client_id: "console".to_string(),
                    client_secret: SecretNameReference {
                        name: "oidc".to_string(),
                    },
                    issuer: "https://sso.example.com".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            ..Default::default()
        };
        let (doc, sync) = build(&AuthenticationOperatorSpec::default(), &oauth(spec));
        let provider = &doc["oauthConfig"]["identityProviders"][0]["provider"];
        assert!(provider.get("ca").is_none());
        assert_eq!(provider["issuer"], "https://sso.example.com");
        assert!(sync.config_maps.is_empty());
        assert_eq!(sync.secrets.len(), 1);
    }

    #[test]
    fn unsupported_provider_is_skipped() {
        let spec = OAuthConfigSpec {
            identity_providers: vec![IdentityProvider {
                name: "ks".to_string(),
                type_: "Keystone".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let (doc, sync) = build(&AuthenticationOperatorSpec::default(), &oauth(spec));
        assert!(doc["oauthConfig"]["identityProviders"]
            .as_array()
            .unwrap()
            .is_empty());
        assert_eq!(sync, ConfigSyncData::default());
    }

    #[test]
    fn templates_are_mirrored_when_set() {
        let spec = OAuthConfigSpec {
            templates: OAuthTemplates {
                login: SecretNameReference {
                    name: "login-page".to_string(),
                },
                ..Default::default()
            },
            ..Default::default()
        };
        let (doc, sync) = build(&AuthenticationOperatorSpec::default(), &oauth(spec));
        assert_eq!(
            sync.secrets["v4-0-config-user-template-login"].source,
            "login-page"
        );
        assert!(doc["oauthConfig"]["templates"]["login"]
            .as_str()
            .unwrap()
            .ends_with("/login.html"));
        assert!(doc["oauthConfig"]["templates"].get("error").is_none());
    }

    #[test]
    fn router_domains_become_named_certificates() {
        let (doc, _) = build(
            &AuthenticationOperatorSpec::default(),
            &oauth(OAuthConfigSpec::default()),
        );
        let named = &doc["servingInfo"]["namedCertificates"][0];
        assert_eq!(named["names"][0], "*.apps.example.com");
        assert_eq!(doc["oauthConfig"]["masterPublicURL"], "https://oauth-openshift.apps.example.com");
        assert_eq!(doc["oauthConfig"]["tokenConfig"]["accessTokenMaxAgeSeconds"], 86400);
    }

    /// Story: unsupported overrides are merged over the generated document
    #[test]
    fn story_overrides_merge_recursively() {
        let operator = AuthenticationOperatorSpec {
            unsupported_config_overrides: Some(json!({
                "oauthConfig": {"tokenConfig": {"accessTokenMaxAgeSeconds": 600}}
            })),
            ..Default::default()
        };
        let (doc, _) = build(&operator, &oauth(OAuthConfigSpec::default()));
        assert_eq!(doc["oauthConfig"]["tokenConfig"]["accessTokenMaxAgeSeconds"], 600);
        assert_eq!(doc["oauthConfig"]["tokenConfig"]["authorizeTokenMaxAgeSeconds"], 300);
    }
}

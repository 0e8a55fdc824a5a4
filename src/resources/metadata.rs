//! The `.well-known/oauth-authorization-server` document

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use serde_json::{json, Value};

use super::{default_meta, METADATA_NAME};

/// Scopes advertised by the OAuth server
pub const ISSUER_SCOPES: [&str; 5] = [
    "user:check-access",
    "user:full",
    "user:info",
    "user:list-projects",
    "user:list-scoped-projects",
];

/// Discovery document for an OAuth server reachable at `https://<host>`
///
/// The same value is published through the metadata config map and compared
/// against what the API server serves, so both sides stay in lockstep.
pub fn oauth_metadata(host: &str) -> Value {
    let issuer = format!("https://{host}");
    json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{issuer}/oauth/authorize"),
        "token_endpoint": format!("{issuer}/oauth/token"),
        "scopes_supported": ISSUER_SCOPES,
        "response_types_supported": ["code", "token"],
        "grant_types_supported": ["authorization_code", "implicit"],
        "code_challenge_methods_supported": ["plain", "S256"],
    })
}

/// Config map carrying the discovery document under `oauthMetadata`
pub fn metadata_config_map(host: &str) -> crate::Result<ConfigMap> {
    let document = serde_json::to_string_pretty(&oauth_metadata(host))?;
    Ok(ConfigMap {
        metadata: default_meta(METADATA_NAME),
        data: Some(BTreeMap::from([("oauthMetadata".to_string(), document)])),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_document_points_at_route_host() {
        let doc = oauth_metadata("oauth-openshift.apps.example.com");
        assert_eq!(doc["issuer"], "https://oauth-openshift.apps.example.com");
        assert_eq!(
            doc["token_endpoint"],
            "https://oauth-openshift.apps.example.com/oauth/token"
        );
        assert_eq!(doc["scopes_supported"].as_array().unwrap().len(), 5);
        assert_eq!(doc.as_object().unwrap().len(), 7);
    }

    #[test]
    fn config_map_round_trips_document() {
        let cm = metadata_config_map("oauth.example.com").unwrap();
        assert_eq!(cm.metadata.name.as_deref(), Some(METADATA_NAME));
        let raw = &cm.data.unwrap()["oauthMetadata"];
        let parsed: Value = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed, oauth_metadata("oauth.example.com"));
    }
}

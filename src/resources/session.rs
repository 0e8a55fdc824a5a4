//! Session secret
//!
//! Created once with random keys and kept as long as it stays valid. The keys
//! are never rotated implicitly: rotating them would log every user out.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{default_meta, SESSION_NAME};

const AUTHENTICATION_KEY_LEN: usize = 64;
const ENCRYPTION_KEY_LEN: usize = 32;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionSecrets {
    api_version: String,
    kind: String,
    secrets: Vec<SessionKeys>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionKeys {
    authentication: String,
    encryption: String,
}

fn random_key(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// A new session secret with freshly generated keys
pub fn session_secret() -> crate::Result<Secret> {
    let document = SessionSecrets {
        api_version: "v1".to_string(),
        kind: "SessionSecrets".to_string(),
        secrets: vec![SessionKeys {
            authentication: random_key(AUTHENTICATION_KEY_LEN),
            encryption: random_key(ENCRYPTION_KEY_LEN),
        }],
    };
    let bytes = serde_json::to_vec(&document)?;

    Ok(Secret {
        metadata: default_meta(SESSION_NAME),
        data: Some(BTreeMap::from([(
            SESSION_NAME.to_string(),
            ByteString(bytes),
        )])),
        ..Default::default()
    })
}

/// True if the secret holds a decodable session document with usable keys
pub fn is_valid_session_secret(secret: &Secret) -> bool {
    let Some(raw) = secret.data.as_ref().and_then(|d| d.get(SESSION_NAME)) else {
        return false;
    };
    let Ok(document) = serde_json::from_slice::<SessionSecrets>(&raw.0) else {
        return false;
    };
    !document.secrets.is_empty()
        && document.secrets.iter().all(|k| {
            matches!(k.authentication.len(), 32 | 64) && matches!(k.encryption.len(), 16 | 24 | 32)
        })
}

/// The session secret to apply this cycle
///
/// Reuses `existing` (with our metadata) when it is valid, otherwise mints a
/// new one.
pub fn expected_session_secret(existing: Option<Secret>) -> crate::Result<Secret> {
    match existing {
        Some(secret) if is_valid_session_secret(&secret) => Ok(Secret {
            metadata: default_meta(SESSION_NAME),
            data: secret.data,
            ..Default::default()
        }),
        Some(_) => {
            info!("session secret is invalid, generating a new one");
            session_secret()
        }
        None => session_secret(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_secret_is_valid() {
        let secret = session_secret().unwrap();
        assert!(is_valid_session_secret(&secret));
    }

    #[test]
    fn generated_secrets_differ() {
        let a = session_secret().unwrap();
        let b = session_secret().unwrap();
        assert_ne!(a.data, b.data);
    }

    /// Story: an existing valid session secret is never rotated
    #[test]
    fn story_existing_valid_secret_is_reused() {
        let existing = session_secret().unwrap();
        let expected = expected_session_secret(Some(existing.clone())).unwrap();
        assert_eq!(expected.data, existing.data);
    }

    #[test]
    fn garbage_secret_is_replaced() {
        let garbage = Secret {
            data: Some(BTreeMap::from([(
                SESSION_NAME.to_string(),
                ByteString(b"not json".to_vec()),
            )])),
            ..Default::default()
        };
        assert!(!is_valid_session_secret(&garbage));
        let expected = expected_session_secret(Some(garbage.clone())).unwrap();
        assert_ne!(expected.data, garbage.data);
        assert!(is_valid_session_secret(&expected));
    }

    #[test]
    fn missing_secret_is_minted() {
        assert!(is_valid_session_secret(&expected_session_secret(None).unwrap()));
    }
}

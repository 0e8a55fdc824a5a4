//! The bootstrapped OAuth clients exist

use std::sync::Arc;

use async_trait::async_trait;

use super::{CheckStage, ProbeTarget, ReadinessCheck, Verdict};
use crate::client::ClusterReader;

/// Client used by the web console's token display page
pub const BROWSER_CLIENT: &str = "openshift-browser-client";

/// Client used by CLI logins that answer WWW-Authenticate challenges
pub const CHALLENGING_CLIENT: &str = "openshift-challenging-client";

/// Looks up the browser client, then the challenging client
pub struct OAuthClientsCheck {
    reader: Arc<dyn ClusterReader>,
}

impl OAuthClientsCheck {
    /// Create the check
    pub fn new(reader: Arc<dyn ClusterReader>) -> Self {
        Self { reader }
    }
}

#[async_trait]
impl ReadinessCheck for OAuthClientsCheck {
    fn stage(&self) -> CheckStage {
        CheckStage::OAuthClients
    }

    async fn check(&self, _target: &ProbeTarget) -> Verdict {
        for (name, label) in [(BROWSER_CLIENT, "browser"), (CHALLENGING_CLIENT, "challenging")] {
            match self.reader.get_oauth_client(name).await {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    return Verdict::not_ready(
                        "OAuthClientNotReady",
                        format!("{label} oauthclient does not exist"),
                    );
                }
                Err(e) => return Verdict::Failed(e.into()),
            }
        }
        Verdict::Ready
    }
}

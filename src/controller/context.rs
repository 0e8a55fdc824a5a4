//! Shared controller context

use std::sync::Arc;

use kube::Client;
use tokio::sync::Mutex;

use crate::client::{
    ClusterReader, KubeApplier, KubeReader, KubeStatusWriter, KubeSyncer, ResourceApplier,
    ResourceSyncer, StatusWriter,
};
use crate::config::OperatorConfig;
use crate::fingerprint::BootstrapRollout;
use crate::readiness::{
    DeploymentRolloutCheck, HttpProbe, OAuthClientsCheck, ReadinessCheck, ReqwestProbe,
    RouteHealthCheck, WellKnownCheck,
};

/// State carried from one sync to the next
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncState {
    /// Forces one rollout after the bootstrap account is removed
    pub bootstrap: BootstrapRollout,
}

impl SyncState {
    /// State for a process that saw the bootstrap account at startup (or not)
    pub fn new(bootstrap_user_present: bool) -> Self {
        Self {
            bootstrap: BootstrapRollout::new(bootstrap_user_present),
        }
    }
}

/// Controller context shared by every reconcile
///
/// Use [`ContextBuilder`] to construct instances:
///
/// ```ignore
/// let ctx = Context::builder(client, config)
///     .bootstrap_user_present(true)
///     .build();
/// ```
pub struct Context {
    /// Typed reads of cluster state
    pub reader: Arc<dyn ClusterReader>,
    /// Server-side apply of the operand's resources
    pub applier: Arc<dyn ResourceApplier>,
    /// Mirrors user config into the target namespace
    pub syncer: Arc<dyn ResourceSyncer>,
    /// Persists the operator status
    pub status: Arc<dyn StatusWriter>,
    /// Readiness checks in evaluation order
    pub checks: Vec<Arc<dyn ReadinessCheck>>,
    /// Immutable startup configuration
    pub config: Arc<OperatorConfig>,
    /// Held for a whole sync
    pub state: Mutex<SyncState>,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client, config: OperatorConfig) -> ContextBuilder {
        ContextBuilder::new(client, config)
    }

    /// Context with the given reader and applier and inert defaults elsewhere
    ///
    /// Syncer and status writer are mocks without expectations, there are no
    /// readiness checks and the bootstrap trigger is disarmed. Override with
    /// the `with_*` methods.
    #[cfg(test)]
    pub fn for_testing(reader: Arc<dyn ClusterReader>, applier: Arc<dyn ResourceApplier>) -> Self {
        use crate::client::{MockResourceSyncer, MockStatusWriter};

        Self {
            reader,
            applier,
            syncer: Arc::new(MockResourceSyncer::new()),
            status: Arc::new(MockStatusWriter::new()),
            checks: Vec::new(),
            config: Arc::new(OperatorConfig::for_testing()),
            state: Mutex::new(SyncState::default()),
        }
    }

    /// Replace the syncer
    #[cfg(test)]
    pub fn with_syncer(mut self, syncer: Arc<dyn ResourceSyncer>) -> Self {
        self.syncer = syncer;
        self
    }

    /// Replace the status writer
    #[cfg(test)]
    pub fn with_status_writer(mut self, status: Arc<dyn StatusWriter>) -> Self {
        self.status = status;
        self
    }

    /// Replace the readiness checks
    #[cfg(test)]
    pub fn with_checks(mut self, checks: Vec<Arc<dyn ReadinessCheck>>) -> Self {
        self.checks = checks;
        self
    }
}

/// Builder for constructing [`Context`] instances
///
/// Every collaborator defaults to its kube-rs or reqwest implementation.
pub struct ContextBuilder {
    client: Client,
    config: OperatorConfig,
    reader: Option<Arc<dyn ClusterReader>>,
    applier: Option<Arc<dyn ResourceApplier>>,
    syncer: Option<Arc<dyn ResourceSyncer>>,
    status: Option<Arc<dyn StatusWriter>>,
    probe: Option<Arc<dyn HttpProbe>>,
    bootstrap_user_present: bool,
}

impl ContextBuilder {
    fn new(client: Client, config: OperatorConfig) -> Self {
        Self {
            client,
            config,
            reader: None,
            applier: None,
            syncer: None,
            status: None,
            probe: None,
            bootstrap_user_present: false,
        }
    }

    /// Arm the bootstrap rollout trigger
    pub fn bootstrap_user_present(mut self, present: bool) -> Self {
        self.bootstrap_user_present = present;
        self
    }

    /// Override the cluster reader
    pub fn reader(mut self, reader: Arc<dyn ClusterReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    /// Override the applier
    pub fn applier(mut self, applier: Arc<dyn ResourceApplier>) -> Self {
        self.applier = Some(applier);
        self
    }

    /// Override the syncer
    pub fn syncer(mut self, syncer: Arc<dyn ResourceSyncer>) -> Self {
        self.syncer = Some(syncer);
        self
    }

    /// Override the status writer
    pub fn status_writer(mut self, status: Arc<dyn StatusWriter>) -> Self {
        self.status = Some(status);
        self
    }

    /// Override the probe transport
    pub fn probe(mut self, probe: Arc<dyn HttpProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        let reader = self
            .reader
            .unwrap_or_else(|| Arc::new(KubeReader::new(self.client.clone())));
        let probe = self.probe.unwrap_or_else(|| Arc::new(ReqwestProbe));

        let checks: Vec<Arc<dyn ReadinessCheck>> = vec![
            Arc::new(RouteHealthCheck::new(
                probe.clone(),
                self.config.system_ca_bundle.clone(),
            )),
            Arc::new(WellKnownCheck::new(
                reader.clone(),
                probe,
                self.config.kas_service_port,
                self.config.service_account_ca_path.clone(),
            )),
            Arc::new(OAuthClientsCheck::new(reader.clone())),
            Arc::new(DeploymentRolloutCheck),
        ];

        Context {
            applier: self
                .applier
                .unwrap_or_else(|| Arc::new(KubeApplier::new(self.client.clone()))),
            syncer: self
                .syncer
                .unwrap_or_else(|| Arc::new(KubeSyncer::new(self.client.clone()))),
            status: self
                .status
                .unwrap_or_else(|| Arc::new(KubeStatusWriter::new(self.client.clone()))),
            reader,
            checks,
            config: Arc::new(self.config),
            state: Mutex::new(SyncState::new(self.bootstrap_user_present)),
        }
    }
}

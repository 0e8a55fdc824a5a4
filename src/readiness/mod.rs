//! Readiness checks for the OAuth server
//!
//! Four checks run in a fixed order: route health, the `.well-known`
//! discovery document, the bootstrapped OAuth clients and finally the
//! deployment rollout. The chain stops at the first check that is not
//! ready, so an unhealthy route never produces deployment-specific noise.
//!
//! Each check returns a [`Verdict`]:
//! - `Ready`: move on to the next check
//! - `NotReady`: an expected transient state, reported on Progressing/Available
//! - `Failed`: a hard error that aborts the cycle and degrades the check's source

mod clients;
mod rollout;
mod route;
mod transport;
mod wellknown;

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
#[cfg(test)]
use mockall::automock;
use tracing::debug;

use crate::crd::{AuthenticationConfig, OperatorCondition};
use crate::error::ReasonedError;
use crate::status;
use crate::Result;

pub use clients::{OAuthClientsCheck, BROWSER_CLIENT, CHALLENGING_CLIENT};
pub use rollout::{rollout_verdict, DeploymentRolloutCheck};
pub use route::{trust_bundle, RouteHealthCheck};
pub use transport::{HttpProbe, ProbeMethod, ProbeRequest, ProbeResponse, ReqwestProbe};
pub use wellknown::{kas_target_port, ready_addresses, WellKnownCheck, WELL_KNOWN_PATH};

#[cfg(test)]
pub use transport::MockHttpProbe;

/// What a not-ready check does to the Available axis
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Availability {
    /// Available=False with the check's reason and message
    Unavailable,
    /// Available=True with this reason (an older version is still serving)
    Available(String),
    /// Available is left as it is
    Unchanged,
}

/// An expected, transient not-ready state
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotReady {
    /// Condition reason reported on Progressing (and Available)
    pub reason: String,
    /// Human-readable explanation
    pub message: String,
    /// Effect on the Available axis
    pub availability: Availability,
}

/// Outcome of a single check
#[derive(Debug)]
pub enum Verdict {
    /// The check passed
    Ready,
    /// The check did not pass yet
    NotReady(NotReady),
    /// The check could not be evaluated
    Failed(ReasonedError),
}

impl Verdict {
    /// Not ready with Available=False
    pub fn not_ready(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotReady(NotReady {
            reason: reason.into(),
            message: message.into(),
            availability: Availability::Unavailable,
        })
    }

    /// True if the check passed
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// The checks, in evaluation order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckStage {
    /// HEAD `/healthz` through the route
    Route,
    /// GET the discovery document from every API server
    WellKnown,
    /// Bootstrapped OAuth clients exist
    OAuthClients,
    /// Deployment rollout is complete
    Deployment,
}

impl CheckStage {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Route => "route",
            Self::WellKnown => "well-known",
            Self::OAuthClients => "oauth-clients",
            Self::Deployment => "deployment",
        }
    }

    /// Prefix of the degraded condition this check owns, if any
    pub fn degraded_prefix(&self) -> Option<&'static str> {
        match self {
            Self::Route => Some("RouteHealth"),
            Self::WellKnown => Some("WellKnownEndpoint"),
            Self::OAuthClients => Some("OAuthClients"),
            Self::Deployment => None,
        }
    }

    /// Context wrapped around a failure of this check
    pub fn failure_context(&self) -> &'static str {
        match self {
            Self::Route => "unable to check route health",
            Self::WellKnown => "unable to check the .well-known endpoint",
            Self::OAuthClients => "unable to check OAuth clients' readiness",
            Self::Deployment => "unable to check deployment readiness",
        }
    }
}

/// Everything the checks look at, captured after the deployment was applied
#[derive(Clone, Debug)]
pub struct ProbeTarget {
    /// Canonical route host
    pub route_host: String,
    /// CA for the route's serving certificate
    pub route_ca: Vec<u8>,
    /// Authentication config (decides whether the discovery check runs)
    pub auth_config: AuthenticationConfig,
    /// Deployment as returned by the apply
    pub deployment: Deployment,
}

/// A single readiness check
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    /// Which check this is
    fn stage(&self) -> CheckStage;

    /// Evaluate the check
    async fn check(&self, target: &ProbeTarget) -> Verdict;
}

/// Verdicts of the checks that ran, in order
#[derive(Debug, Default)]
pub struct ReadinessReport {
    /// One entry per evaluated check; only the last may be non-ready
    pub verdicts: Vec<(CheckStage, Verdict)>,
}

/// Run `checks` in order, stopping at the first verdict that is not ready
pub async fn run_checks(checks: &[Arc<dyn ReadinessCheck>], target: &ProbeTarget) -> ReadinessReport {
    let mut report = ReadinessReport::default();
    for check in checks {
        let stage = check.stage();
        let verdict = check.check(target).await;
        debug!(check = stage.name(), ready = verdict.is_ready(), "readiness check evaluated");
        let stop = !verdict.is_ready();
        report.verdicts.push((stage, verdict));
        if stop {
            break;
        }
    }
    report
}

impl ReadinessReport {
    /// Fold the verdicts into conditions
    ///
    /// Degraded conditions of evaluated checks are set on failure and cleared
    /// otherwise. A failure is returned wrapped in the check's context. A
    /// not-ready verdict sets Progressing (and Available as the check asks).
    /// When everything passed, Progressing=False and Available=True.
    ///
    /// Returns true when every check passed.
    pub fn apply(self, conditions: &mut Vec<OperatorCondition>) -> Result<bool> {
        for (stage, verdict) in self.verdicts {
            match verdict {
                Verdict::Ready => {
                    if let Some(prefix) = stage.degraded_prefix() {
                        status::handle_degraded(conditions, prefix, None);
                    }
                }
                Verdict::NotReady(not_ready) => {
                    if let Some(prefix) = stage.degraded_prefix() {
                        status::handle_degraded(conditions, prefix, None);
                    }
                    match &not_ready.availability {
                        Availability::Unavailable => status::set_progressing_true_and_available_false(
                            conditions,
                            &not_ready.reason,
                            &not_ready.message,
                        ),
                        Availability::Available(reason) => {
                            status::set_progressing_true(
                                conditions,
                                &not_ready.reason,
                                &not_ready.message,
                            );
                            status::set_available_true(conditions, reason);
                        }
                        Availability::Unchanged => status::set_progressing_true(
                            conditions,
                            &not_ready.reason,
                            &not_ready.message,
                        ),
                    }
                    return Ok(false);
                }
                Verdict::Failed(failure) => {
                    if let Some(prefix) = stage.degraded_prefix() {
                        status::handle_degraded_with_reason(
                            conditions,
                            prefix,
                            failure.reason,
                            Some(&failure.error),
                        );
                    }
                    return Err(failure.error.stage(stage.failure_context()));
                }
            }
        }

        status::set_progressing_false(conditions);
        status::set_available_true(conditions, status::REASON_AS_EXPECTED);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::config::AuthenticationConfigSpec;
    use crate::crd::ConditionStatus;
    use crate::status::{find_condition, AVAILABLE, PROGRESSING};
    use crate::Error;

    pub(crate) fn target() -> ProbeTarget {
        ProbeTarget {
            route_host: "oauth-openshift.apps.example.com".to_string(),
            route_ca: b"route-ca".to_vec(),
            auth_config: AuthenticationConfig::new("cluster", AuthenticationConfigSpec::default()),
            deployment: Deployment::default(),
        }
    }

    fn check(stage: CheckStage, times: usize, verdict: fn() -> Verdict) -> Arc<dyn ReadinessCheck> {
        let mut mock = MockReadinessCheck::new();
        mock.expect_stage().return_const(stage);
        mock.expect_check().times(times).returning(move |_| verdict());
        Arc::new(mock)
    }

    /// Story: an unhealthy route suppresses every later check
    #[tokio::test]
    async fn story_route_failure_short_circuits() {
        let checks = vec![
            check(CheckStage::Route, 1, || {
                Verdict::not_ready("RouteNotReady", "route not yet available, /healthz returns '503'")
            }),
            check(CheckStage::WellKnown, 0, || Verdict::Ready),
            check(CheckStage::OAuthClients, 0, || Verdict::Ready),
            check(CheckStage::Deployment, 0, || Verdict::Ready),
        ];

        let report = run_checks(&checks, &target()).await;
        assert_eq!(report.verdicts.len(), 1);

        let mut conds = Vec::new();
        assert!(!report.apply(&mut conds).unwrap());
        let progressing = find_condition(&conds, PROGRESSING).unwrap();
        assert_eq!(progressing.status, ConditionStatus::True);
        assert_eq!(progressing.reason, "RouteNotReady");
        assert!(progressing.message.contains("503"));
        assert_eq!(find_condition(&conds, AVAILABLE).unwrap().status, ConditionStatus::False);
    }

    /// Story: all four checks passing means fully available and settled
    #[tokio::test]
    async fn story_all_checks_pass() {
        let checks = vec![
            check(CheckStage::Route, 1, || Verdict::Ready),
            check(CheckStage::WellKnown, 1, || Verdict::Ready),
            check(CheckStage::OAuthClients, 1, || Verdict::Ready),
            check(CheckStage::Deployment, 1, || Verdict::Ready),
        ];

        let report = run_checks(&checks, &target()).await;
        assert!(report.verdicts.iter().all(|(_, v)| v.is_ready()));

        let mut conds = Vec::new();
        assert!(report.apply(&mut conds).unwrap());
        let progressing = find_condition(&conds, PROGRESSING).unwrap();
        assert_eq!(progressing.status, ConditionStatus::False);
        let available = find_condition(&conds, AVAILABLE).unwrap();
        assert_eq!(available.status, ConditionStatus::True);
        assert_eq!(available.reason, "AsExpected");
        for prefix in ["RouteHealth", "WellKnownEndpoint", "OAuthClients"] {
            let degraded = find_condition(&conds, &format!("{prefix}Degraded")).unwrap();
            assert_eq!(degraded.status, ConditionStatus::False);
        }
    }

    /// Story: a hard failure degrades its source and aborts with context
    #[tokio::test]
    async fn story_failure_degrades_and_aborts() {
        let checks = vec![
            check(CheckStage::Route, 1, || {
                Verdict::Failed(ReasonedError::new("FailedGet", Error::probe("connection refused")))
            }),
            check(CheckStage::WellKnown, 0, || Verdict::Ready),
        ];

        let report = run_checks(&checks, &target()).await;
        let mut conds = Vec::new();
        let err = report.apply(&mut conds).unwrap_err();
        assert!(err.to_string().starts_with("unable to check route health"));

        let degraded = find_condition(&conds, "RouteHealthDegraded").unwrap();
        assert!(degraded.is_true());
        assert_eq!(degraded.reason, "FailedGet");
        assert!(find_condition(&conds, AVAILABLE).is_none());
    }

    #[test]
    fn available_replica_keeps_available_true() {
        let report = ReadinessReport {
            verdicts: vec![(
                CheckStage::Deployment,
                Verdict::NotReady(NotReady {
                    reason: "OAuthServerDeploymentNotReady".to_string(),
                    message: "not all deployment replicas are ready".to_string(),
                    availability: Availability::Available(
                        "OAuthServerDeploymentHasAvailableReplica".to_string(),
                    ),
                }),
            )],
        };
        let mut conds = Vec::new();
        assert!(!report.apply(&mut conds).unwrap());
        let available = find_condition(&conds, AVAILABLE).unwrap();
        assert!(available.is_true());
        assert_eq!(available.reason, "OAuthServerDeploymentHasAvailableReplica");
        assert!(find_condition(&conds, PROGRESSING).unwrap().is_true());
    }
}

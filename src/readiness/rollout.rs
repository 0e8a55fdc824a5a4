//! Deployment rollout: every replica runs the current template

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;

use super::{Availability, CheckStage, NotReady, ProbeTarget, ReadinessCheck, Verdict};

const NOT_READY: &str = "OAuthServerDeploymentNotReady";
const HAS_AVAILABLE_REPLICA: &str = "OAuthServerDeploymentHasAvailableReplica";

/// Judge a deployment's rollout
///
/// Cases are evaluated in order: deletion, partial rollout with an older
/// replica still serving, stale observed generation, remaining updates or
/// unavailable replicas.
pub fn rollout_verdict(deployment: &Deployment) -> Verdict {
    let not_ready = |message: &str, availability: Availability| {
        Verdict::NotReady(NotReady {
            reason: NOT_READY.to_string(),
            message: message.to_string(),
            availability,
        })
    };

    if deployment.metadata.deletion_timestamp.is_some() {
        return not_ready("deployment is being deleted", Availability::Unavailable);
    }

    let status = deployment.status.clone().unwrap_or_default();
    let replicas = status.replicas.unwrap_or(0);
    let available = status.available_replicas.unwrap_or(0);
    let updated = status.updated_replicas.unwrap_or(0);
    let unavailable = status.unavailable_replicas.unwrap_or(0);

    if available > 0 && updated != replicas {
        return not_ready(
            "not all deployment replicas are ready",
            Availability::Available(HAS_AVAILABLE_REPLICA.to_string()),
        );
    }

    let generation = deployment.metadata.generation.unwrap_or(0);
    if status.observed_generation.unwrap_or(0) != generation {
        return not_ready(
            "deployment's observed generation did not reach the expected generation",
            Availability::Unchanged,
        );
    }

    if updated != replicas || unavailable > 0 {
        return not_ready("not all deployment replicas are ready", Availability::Unchanged);
    }

    Verdict::Ready
}

/// Applies [`rollout_verdict`] to the deployment returned by the apply
#[derive(Clone, Debug, Default)]
pub struct DeploymentRolloutCheck;

#[async_trait]
impl ReadinessCheck for DeploymentRolloutCheck {
    fn stage(&self) -> CheckStage {
        CheckStage::Deployment
    }

    async fn check(&self, target: &ProbeTarget) -> Verdict {
        rollout_verdict(&target.deployment)
    }
}

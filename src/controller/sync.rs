//! Reconciliation pipeline for `authentications.operator.openshift.io/cluster`
//!
//! One sync runs five stages strictly in order and stops at the first hard
//! failure:
//!
//! 1. Metadata: ingress, route, `.well-known` metadata, authentication config
//! 2. Service: OAuth service, service CA, serving certificate
//! 3. Configuration: session secret, mirrored user config, CLI config
//! 4. Deployment: OAuth clients, version fingerprint, the deployment itself
//! 5. Health: the readiness chain and version stamping
//!
//! Condition edits are made on a local copy of the status, which is
//! persisted once at the end whatever the outcome.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, error, info, instrument, warn};

use super::context::{Context, SyncState};
use super::route::handle_route;
use crate::client::bootstrap_user_exists;
use crate::crd::{
    AuthenticationOperator, AuthenticationOperatorStatus, GenerationStatus, IngressConfig,
    InfrastructureConfig, ManagementState, OAuthClient,
};
use crate::error::StageExt;
use crate::fingerprint::{force_rollout, log_fingerprint, VersionFingerprint};
use crate::readiness::{run_checks, ProbeTarget, BROWSER_CLIENT, CHALLENGING_CLIENT};
use crate::resources::{
    cli_config_map, default_deployment, default_service, expected_session_secret,
    metadata_config_map, service_ca_config_map, CliConfigInputs, ConfigSyncData,
    DeploymentInputs, CONFIG_PREFIX, SERVING_CERT_NAME, SESSION_NAME, USER_PREFIX,
};
use crate::status::{self, handle_degraded, handle_degraded_with_reason, is_degraded_ignoring};
use crate::{
    Error, Result, CLUSTER_CONFIG_NAME, OPERAND_NAME, OPERATOR_DEPLOYMENT, OPERATOR_NAMESPACE,
    TARGET_NAMESPACE,
};

/// Prefix of the catch-all degraded condition
pub const OPERATOR_SYNC: &str = "OperatorSync";

/// Prefix of the route degraded condition
pub const ROUTE_STATUS: &str = "RouteStatus";

/// Resync period after a successful sync
const RESYNC_INTERVAL: Duration = Duration::from_secs(60);

/// Requeue delay after a failed sync
const ERROR_REQUEUE: Duration = Duration::from_secs(10);

/// Reconcile the operator configuration
///
/// Only the `cluster` singleton is handled. The sync state lock is held for
/// the whole cycle.
#[instrument(skip(operator, ctx), fields(name = %operator.name_any()))]
pub async fn reconcile(operator: Arc<AuthenticationOperator>, ctx: Arc<Context>) -> Result<Action> {
    if operator.name_any() != CLUSTER_CONFIG_NAME {
        debug!("ignoring non-singleton operator config");
        return Ok(Action::await_change());
    }

    let mut state = ctx.state.lock().await;
    sync(&operator, &ctx, &mut state).await?;
    Ok(Action::requeue(RESYNC_INTERVAL))
}

/// Log the failure and requeue
pub fn error_policy(operator: Arc<AuthenticationOperator>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        error = %error,
        name = %operator.name_any(),
        "sync failed"
    );
    Action::requeue(ERROR_REQUEUE)
}

/// Run one sync and persist the resulting status
///
/// A no-op unless the operator is `Managed`. The pipeline error, if any, wins
/// over a status persistence error.
pub async fn sync(
    operator: &AuthenticationOperator,
    ctx: &Context,
    state: &mut SyncState,
) -> Result<()> {
    if operator.spec.management_state != ManagementState::Managed {
        debug!(state = %operator.spec.management_state, "operator not managed, skipping");
        return Ok(());
    }

    let mut status = operator.status.clone().unwrap_or_default();
    let result = handle_sync(operator, ctx, state, &mut status).await;

    let catch_all = if is_degraded_ignoring(&status.conditions, OPERATOR_SYNC) {
        None
    } else {
        result.as_ref().err()
    };
    handle_degraded(&mut status.conditions, OPERATOR_SYNC, catch_all);

    match ctx.status.update_status(&operator.name_any(), status).await {
        Ok(_) => result,
        Err(e) => {
            error!(error = %e, "failed to update status");
            result.and(Err(e))
        }
    }
}

async fn handle_sync(
    operator: &AuthenticationOperator,
    ctx: &Context,
    state: &mut SyncState,
    status: &mut AuthenticationOperatorStatus,
) -> Result<()> {
    // Metadata
    let ingress = ingress_config(ctx).await.stage("failed getting the ingress config")?;
    let domain = ingress.spec.domain.as_str();

    let route = match handle_route(ctx, domain).await {
        Ok(route) => {
            handle_degraded(&mut status.conditions, ROUTE_STATUS, None);
            route
        }
        Err(failure) => {
            handle_degraded_with_reason(
                &mut status.conditions,
                ROUTE_STATUS,
                failure.reason,
                Some(&failure.error),
            );
            return Err(failure.error.stage("failed handling the route"));
        }
    };

    let metadata = metadata_config_map(&route.host)
        .stage("failure applying configMap for the .well-known endpoint")?;
    ctx.applier
        .apply_config_map(metadata)
        .await
        .stage("failure applying configMap for the .well-known endpoint")?;

    let auth_config = ctx
        .reader
        .get_authentication_config()
        .await
        .stage("failed handling authentication config")?;

    // Service
    ctx.applier
        .apply_service(default_service())
        .await
        .stage("failed applying service object")?;
    handle_service_ca(ctx).await.stage("failed handling service CA")?;

    // Configuration
    let existing_session = optional(ctx.reader.get_secret(TARGET_NAMESPACE, SESSION_NAME).await)
        .stage("failed obtaining session secret")?;
    let session =
        expected_session_secret(existing_session).stage("failed obtaining session secret")?;
    ctx.applier
        .apply_secret(session)
        .await
        .stage("failed applying session secret")?;

    let console = best_effort("console", ctx.reader.get_console_config().await);
    let infrastructure = best_effort("infrastructure", ctx.reader.get_infrastructure_config().await);
    let api_server = best_effort("apiserver", ctx.reader.get_api_server_config().await);

    let oauth = ctx
        .reader
        .get_oauth_config()
        .await
        .stage("failed handling OAuth configuration")?;
    let (cli_config, sync_data) = cli_config_map(&CliConfigInputs {
        operator: &operator.spec,
        route_host: &route.host,
        router_secret: &route.router_secret,
        console: console.as_ref(),
        infrastructure: infrastructure.as_ref(),
        api_server: api_server.as_ref(),
        oauth: &oauth,
    })
    .stage("failed handling OAuth configuration")?;

    sync_config(ctx, &sync_data)
        .await
        .stage("failed syncing configuration objects")?;
    ctx.applier
        .apply_config_map(cli_config)
        .await
        .stage("failed applying configMap for the CLI configuration")?;

    // Deployment
    ensure_oauth_clients(ctx, &format!("https://{}", route.host))
        .await
        .stage("failed ensuring bootstrapped OAuth clients")?;

    let proxy = best_effort("proxy", ctx.reader.get_proxy_config().await);
    let mut fingerprint = VersionFingerprint::new();
    match &proxy {
        Some(proxy) => fingerprint.push_object("proxy", proxy),
        None => fingerprint.push("proxy", "", ""),
    }
    let operator_deployment = ctx
        .reader
        .get_deployment(OPERATOR_NAMESPACE, OPERATOR_DEPLOYMENT)
        .await?;
    fingerprint.push_object("deployments", &operator_deployment);
    let config_maps = ctx.reader.list_config_maps(TARGET_NAMESPACE).await?;
    let secrets = ctx.reader.list_secrets(TARGET_NAMESPACE).await?;
    fingerprint.extend_prefixed(&config_maps, &secrets, CONFIG_PREFIX);
    log_fingerprint(&fingerprint);

    let rvs_hash = fingerprint.hash();
    let desired = default_deployment(&DeploymentInputs {
        image: &ctx.config.image,
        log_level: &operator.spec.log_level,
        sync: &sync_data,
        proxy: proxy.as_ref(),
        single_replica: infrastructure
            .as_ref()
            .is_some_and(InfrastructureConfig::is_single_replica),
        rvs_hash: &rvs_hash,
    });

    let bootstrap_edge = if state.bootstrap.is_armed() {
        state
            .bootstrap
            .observe(bootstrap_user_exists(ctx.reader.as_ref()).await)
    } else {
        false
    };
    let generation = operator.metadata.generation.unwrap_or_default();
    let force = force_rollout(generation, status.observed_generation, bootstrap_edge);
    let expected_generation = status
        .generation("apps", "deployments", TARGET_NAMESPACE, OPERAND_NAME)
        .map_or(-1, |g| g.last_generation);

    let deployment = ctx
        .applier
        .apply_deployment(desired, expected_generation, force)
        .await
        .stage("failed applying deployment for the integrated OAuth server")?
        .object;

    status.set_generation(GenerationStatus {
        group: "apps".to_string(),
        resource: "deployments".to_string(),
        namespace: TARGET_NAMESPACE.to_string(),
        name: OPERAND_NAME.to_string(),
        last_generation: deployment.metadata.generation.unwrap_or_default(),
        hash: String::new(),
    });
    status.observed_generation = generation;
    status.ready_replicas = deployment
        .status
        .as_ref()
        .and_then(|s| s.updated_replicas)
        .unwrap_or_default();

    // Health
    let target = ProbeTarget {
        route_host: route.host,
        route_ca: route.ca,
        auth_config,
        deployment,
    };
    let report = run_checks(&ctx.checks, &target).await;
    let ready = report
        .apply(&mut status.conditions)
        .stage("error checking current version")?;

    if ready {
        let operator_changed =
            status::set_version(&mut status.versions, "operator", &ctx.config.operator_version);
        let operand_changed =
            status::set_version(&mut status.versions, OPERAND_NAME, &ctx.config.operand_version);
        if operator_changed || operand_changed {
            info!(
                operator = %ctx.config.operator_version,
                operand = %ctx.config.operand_version,
                "reached desired versions"
            );
        }
    }

    Ok(())
}

async fn ingress_config(ctx: &Context) -> Result<IngressConfig> {
    let ingress = ctx.reader.get_ingress_config().await?;
    if ingress.spec.domain.is_empty() {
        return Err(Error::validation("ingress config domain cannot be empty"));
    }
    Ok(ingress)
}

async fn handle_service_ca(ctx: &Context) -> Result<()> {
    ctx.applier.apply_config_map(service_ca_config_map()).await?;
    ctx.reader
        .get_secret(TARGET_NAMESPACE, SERVING_CERT_NAME)
        .await?;
    Ok(())
}

/// Mirror the sync payload and delete mirrored objects nothing refers to anymore
async fn sync_config(ctx: &Context, data: &ConfigSyncData) -> Result<()> {
    for (dest, source) in &data.secrets {
        ctx.syncer
            .sync_secret(dest, Some(source.source.clone()))
            .await?;
    }
    for (dest, source) in &data.config_maps {
        ctx.syncer
            .sync_config_map(dest, Some(source.source.clone()))
            .await?;
    }

    let stale_secrets = stale(
        ctx.reader
            .list_secrets(TARGET_NAMESPACE)
            .await?
            .iter()
            .map(|s| s.name_any()),
        &data.secrets.keys().cloned().collect(),
    );
    for dest in stale_secrets {
        info!(%dest, "removing stale mirrored secret");
        ctx.syncer.sync_secret(&dest, None).await?;
    }

    let stale_config_maps = stale(
        ctx.reader
            .list_config_maps(TARGET_NAMESPACE)
            .await?
            .iter()
            .map(|c| c.name_any()),
        &data.config_maps.keys().cloned().collect(),
    );
    for dest in stale_config_maps {
        info!(%dest, "removing stale mirrored config map");
        ctx.syncer.sync_config_map(&dest, None).await?;
    }

    Ok(())
}

fn stale(existing: impl Iterator<Item = String>, wanted: &BTreeSet<String>) -> Vec<String> {
    existing
        .filter(|name| name.starts_with(USER_PREFIX) && !wanted.contains(name))
        .collect()
}

/// Create the browser and challenging clients when they do not exist
async fn ensure_oauth_clients(ctx: &Context, issuer: &str) -> Result<()> {
    let browser = OAuthClient {
        name: BROWSER_CLIENT.to_string(),
        secret: random_secret(),
        redirect_uris: vec![format!("{issuer}/oauth/token/display")],
        grant_method: "auto".to_string(),
        respond_with_challenges: false,
    };
    let challenging = OAuthClient {
        name: CHALLENGING_CLIENT.to_string(),
        secret: String::new(),
        redirect_uris: vec![format!("{issuer}/oauth/token/implicit")],
        grant_method: "auto".to_string(),
        respond_with_challenges: true,
    };

    for client in [browser, challenging] {
        let existing = ctx.reader.get_oauth_client(&client.name).await;
        match existing {
            Ok(_) => {}
            Err(e) if e.is_not_found() => ctx.applier.create_oauth_client(client).await?,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn random_secret() -> String {
    use rand::distributions::Alphanumeric;
    use rand::Rng;

    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Turn "not found" into `None`
fn optional<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Keep a snapshot, or warn and carry on without it
fn best_effort<T>(what: &str, result: Result<T>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(error = %e, config = what, "unable to read cluster config, using defaults");
            None
        }
    }
}

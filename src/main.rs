//! auth-operator - reconciles the integrated OAuth server

use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};

use auth_operator::client::{bootstrap_user_exists, KubeReader};
use auth_operator::config::{OperatorArgs, OperatorConfig};
use auth_operator::controller::{error_policy, reconcile, Context};
use auth_operator::crd::AuthenticationOperator;
use auth_operator::telemetry::{init_logging, TelemetryConfig};
use auth_operator::{CLUSTER_CONFIG_NAME, TARGET_NAMESPACE};

/// Operator for the cluster's integrated OAuth server
#[derive(Parser, Debug)]
#[command(name = "auth-operator", version, about, long_about = None)]
struct Cli {
    /// Print the Authentication CRD and exit
    #[arg(long)]
    crd: bool,

    /// Human-readable logs instead of JSON
    #[arg(long, env = "TEXT_LOGS")]
    text_logs: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the controller (default mode)
    Controller(ControllerArgs),
}

#[derive(Parser, Debug)]
struct ControllerArgs {
    #[command(flatten)]
    operator: OperatorArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("failed to install aws-lc-rs crypto provider: {e:?}");
        std::process::exit(1);
    }

    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&AuthenticationOperator::crd())
            .map_err(|e| anyhow::anyhow!("failed to serialize CRD: {e}"))?;
        println!("{crd}");
        return Ok(());
    }

    init_logging(TelemetryConfig {
        json: !cli.text_logs,
    })?;

    let args = match cli.command {
        Some(Commands::Controller(args)) => args,
        // Without a subcommand every setting comes from the environment
        None => ControllerArgs::parse_from(std::env::args_os().take(1)),
    };
    run_controller(OperatorConfig::from_args(args.operator)).await
}

async fn run_controller(config: OperatorConfig) -> anyhow::Result<()> {
    let client = Client::try_default().await?;

    let bootstrap_user_present = bootstrap_user_exists(&KubeReader::new(client.clone()))
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "unable to determine the state of bootstrap user");
            true
        });

    tracing::info!(
        image = %config.image,
        operand_version = %config.operand_version,
        operator_version = %config.operator_version,
        kas_service_port = config.kas_service_port,
        bootstrap_user_present,
        "starting authentication operator"
    );

    let ctx = Arc::new(
        Context::builder(client.clone(), config)
            .bootstrap_user_present(bootstrap_user_present)
            .build(),
    );

    let operators: Api<AuthenticationOperator> = Api::all(client.clone());
    let deployments: Api<Deployment> = Api::namespaced(client.clone(), TARGET_NAMESPACE);
    let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), TARGET_NAMESPACE);
    let secrets: Api<Secret> = Api::namespaced(client, TARGET_NAMESPACE);

    Controller::new(operators, WatcherConfig::default())
        .watches(deployments, WatcherConfig::default(), singleton)
        .watches(config_maps, WatcherConfig::default(), singleton)
        .watches(secrets, WatcherConfig::default(), singleton)
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((object, action)) => {
                    tracing::debug!(name = %object.name, ?action, "reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "reconciliation error");
                }
            }
        })
        .await;

    tracing::info!("controller stopped");
    Ok(())
}

/// Every watched object maps to the `cluster` operator config
fn singleton<K>(_: K) -> Option<ObjectRef<AuthenticationOperator>> {
    Some(ObjectRef::new(CLUSTER_CONFIG_NAME))
}

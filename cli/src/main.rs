//! kubetunnel CLI - Bridge a local machine into a Kubernetes cluster
//!
//! Provisions the cluster-side proxy, runs the tunnel inside the local proxy
//! container, and probes it for readiness.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::provision::SessionArgs;
use commands::ClusterTarget;

#[derive(Parser)]
#[command(name = "kubetunnel")]
#[command(author, version, about = "Bridge a local machine into a Kubernetes cluster")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Kubernetes context to use
    #[arg(long, global = true, env = "KUBETUNNEL_CONTEXT")]
    context: Option<String>,

    /// Namespace to operate in
    #[arg(short, long, global = true, env = "KUBETUNNEL_NAMESPACE")]
    namespace: Option<String>,

    /// Path to kubectl or oc
    #[arg(long, global = true, env = "KUBETUNNEL_KUBECTL")]
    kubectl: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tunnel inside the local proxy container
    Proxy {
        /// JSON object with port, ip, cidrs, include_cidrs, exclude_cidrs,
        /// expose_ports, to_pod and from_pod
        config: String,
    },

    /// Wait for the tunnel to come up; exits with code 100 once it has
    Wait,

    /// Create a new proxy Deployment for the session
    #[command(alias = "new")]
    NewDeployment {
        /// Name of the Deployment to create
        name: String,

        #[command(flatten)]
        session: SessionArgs,

        /// Pod annotation (KEY=VALUE), repeatable
        #[arg(long = "annotation", value_parser = parse_key_value)]
        annotations: Vec<(String, String)>,

        /// Extra pod label (KEY=VALUE), repeatable
        #[arg(long = "label", value_parser = parse_key_value)]
        labels: Vec<(String, String)>,
    },

    /// Temporarily replace a workload with a proxy
    #[command(alias = "swap")]
    SwapDeployment {
        /// Workload to replace, as NAME[:CONTAINER]
        workload: String,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Use a proxy Deployment that is already running
    Deployment {
        /// Existing proxy, as NAME[:CONTAINER]
        workload: String,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Show or change the stored configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration (default)
    Show,

    /// Change one setting, e.g. `config set rolloutTimeoutSecs 600`
    Set {
        /// Setting name as it appears in the config file
        key: String,
        /// New value; an empty kubectlPath clears it
        value: String,
    },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {:?}", s)),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let target = ClusterTarget {
        context: cli.context,
        namespace: cli.namespace,
        kubectl: cli.kubectl,
    };

    match cli.command {
        Commands::Proxy { config } => commands::proxy::run(&config).await?,
        Commands::Wait => {
            commands::wait::run().await?;
            std::process::exit(kubetunnel_core::application::READY_EXIT_CODE);
        }
        Commands::NewDeployment {
            name,
            session,
            annotations,
            labels,
        } => {
            commands::provision::new_deployment(
                &target,
                &name,
                session,
                annotations.into_iter().collect(),
                labels.into_iter().collect(),
                cli.json,
            )
            .await?
        }
        Commands::SwapDeployment { workload, session } => {
            commands::provision::swap_deployment(&target, &workload, session, cli.json)
                .await?
        }
        Commands::Deployment { workload, session } => {
            commands::provision::existing_deployment(
                &target,
                &workload,
                session,
                cli.json,
            )
            .await?
        }
        Commands::Config { action } => match action {
            None | Some(ConfigAction::Show) => commands::config::show(cli.json).await?,
            Some(ConfigAction::Set { key, value }) => {
                commands::config::set(&key, &value, cli.json).await?
            }
        },
    }

    Ok(())
}

//! corral host agent.
//!
//! This is the entry point for the `corral-agent` binary.
//!
//! # Commands
//!
//! - `register` - Enlist this machine with a control plane and write the config
//! - `check` - Run a single reconcile cycle and wait for init scripts
//! - `run` - Reconcile forever

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use corral_agent::config::DEFAULT_CONFIG_PATH;
use corral_agent::state::AgentState;
use corral_agent::types::Registration;
use corral_agent::updater::RESTART_EXIT_CODE;
use corral_agent::{facts, Agent, AgentConfig, ControlApi, CycleOutcome, HttpControlClient, LxcRuntime};
use corral_core::Name;
use reqwest::StatusCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// corral host agent.
#[derive(Parser, Debug)]
#[command(name = "corral-agent")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the agent configuration file.
    #[arg(long, env = "CORRAL_AGENT_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register this host with the control plane.
    Register {
        /// Control plane base URL, e.g. `https://corral.example.com`.
        #[arg(long)]
        server: String,

        /// Agent version to record; defaults to this build.
        #[arg(long, default_value = env!("CARGO_PKG_VERSION"))]
        agent_version: String,

        /// Host name; defaults to the machine's hostname.
        #[arg(long)]
        name: Option<String>,

        /// Directory for agent state.
        #[arg(long)]
        state_dir: Option<PathBuf>,
    },
    /// Run one reconcile cycle.
    Check,
    /// Reconcile until stopped.
    Run,
}

fn init_tracing(default_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{default_level},corral_agent={default_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn register(
    config_path: PathBuf,
    server: String,
    agent_version: String,
    name: Option<String>,
    state_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    init_tracing("info");

    let name = match name {
        Some(name) => name,
        None => sysinfo::System::host_name().context("unable to determine hostname, pass --name")?,
    };
    let name = Name::parse(&name).with_context(|| format!("invalid host name '{name}'"))?;

    let mut config = AgentConfig::new(
        server,
        name.clone(),
        corral_core::secret::generate_secret(),
        agent_version,
    );
    if let Some(dir) = state_dir {
        config.state_dir = dir;
    }

    let facts = facts::collect();
    let client = HttpControlClient::new(&config)?;
    let registration = Registration {
        name: name.clone(),
        api_key: config.api_key.clone(),
        facts: facts.clone(),
    };
    match client.register_host(&registration).await {
        Ok(()) => {}
        Err(e) if e.is_status(StatusCode::CONFLICT) => {
            anyhow::bail!("host '{name}' is already registered");
        }
        Err(e) => return Err(anyhow::Error::new(e).context("registration failed")),
    }

    config
        .save(&config_path)
        .with_context(|| format!("writing {}", config_path.display()))?;
    let mut state = AgentState::load(&config.state_dir);
    state.facts = Some(facts);
    state.save(&config.state_dir)?;

    tracing::info!(host = %name, config = %config_path.display(), "Host registered");
    Ok(())
}

fn build_agent(config_path: PathBuf) -> anyhow::Result<Agent> {
    let config = AgentConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    init_tracing(&config.log_level);

    let api: Arc<dyn ControlApi> = Arc::new(HttpControlClient::new(&config)?);
    let runtime = Arc::new(LxcRuntime::new(config.state_dir.join("shared_storage")));
    tracing::info!(
        host = %config.host_name,
        server = %config.server_url,
        version = %config.version,
        "Starting corral agent"
    );
    Ok(Agent::new(api, runtime, config, config_path))
}

fn restart() -> ! {
    tracing::warn!("Exiting for restart into the updated agent");
    std::process::exit(RESTART_EXIT_CODE);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Register {
            server,
            agent_version,
            name,
            state_dir,
        } => register(args.config, server, agent_version, name, state_dir).await,
        Command::Check => {
            let mut agent = build_agent(args.config)?;
            let outcome = agent.run_cycle().await?;
            agent.drain().await?;
            match outcome {
                CycleOutcome::Converged(report) => {
                    tracing::info!(?report, "Check complete");
                    Ok(())
                }
                CycleOutcome::Restart => restart(),
            }
        }
        Command::Run => {
            let mut agent = build_agent(args.config)?;
            agent.run().await?;
            restart()
        }
    }
}

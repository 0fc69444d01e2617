//! Wayfarer command line entry point

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use wayfarer::{
    AgentRegistry, AgentRole, AzureOpenAiEngine, Config, Console, ExitReason, Orchestrator,
    PolicyBridge, ToolBindings,
};

const DEFAULT_LOG_FILTER: &str = "wayfarer=info";

#[derive(Debug, Parser)]
#[command(name = "wayfarer", version, about = "Multi-agent travel planner")]
struct Cli {
    /// Travel tool bridge script used by the flight and hotel agents
    #[arg(long, env = "TRAVEL_MCP_SERVER_PATH")]
    tool_bridge: Option<PathBuf>,

    /// Tracing filter directive, overrides RUST_LOG
    #[arg(long)]
    log_filter: Option<String>,

    /// Give up on a policy check after this many seconds
    #[arg(long)]
    policy_timeout_secs: Option<u64>,

    /// Specialist-to-specialist handoffs allowed per user message
    #[arg(long, default_value_t = wayfarer::session::DEFAULT_MAX_AUTO_HANDOFFS)]
    max_handoffs: usize,
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_filter.as_deref());

    if let Err(e) = run(cli).await {
        eprintln!("[FATAL] {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing(directive: Option<&str>) {
    let filter = match directive {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::from_env().context("invalid configuration")?;
    if let Some(path) = cli.tool_bridge {
        config.tool_bridge.script = path;
    }

    let bindings = ToolBindings::new(config.tool_bridge.clone());
    let script = bindings.ensure_available()?;
    info!(script = %script.display(), "Travel tool bridge located");

    let engine = Arc::new(AzureOpenAiEngine::new(config.completion.clone()));
    let today = chrono::Local::now().date_naive();
    let registry = AgentRegistry::initialize(&AgentRole::ALL, engine, &bindings, today).await?;

    let policy = PolicyBridge::from_config(config.policy.as_ref())
        .with_timeout(cli.policy_timeout_secs.map(Duration::from_secs));

    let input = wayfarer::console::stdin_lines().context("could not start the input reader")?;
    let console = Console::new(input, tokio::io::stdout());
    let orchestrator = Orchestrator::new(registry, policy, console)
        .with_max_auto_handoffs(cli.max_handoffs);

    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => cancel.cancel(),
            Err(e) => warn!(error = %e, "Could not listen for interrupt"),
        }
    });

    let report = orchestrator.run().await?;
    if report.reason == ExitReason::Interrupted {
        info!("Session interrupted by signal");
    }
    Ok(())
}

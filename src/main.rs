//! Tool-Call Gateway CLI
//!
//! Command-line interface for invoking tools through the admission
//! pipeline and inspecting the gateway's configuration.

use agent_tool_gateway::{Config, InvokeOutcome, Result, ToolGateway};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "agent-gateway")]
#[command(about = "Admission-control gateway for LLM tool calls")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Invoke a tool through the admission pipeline
    Call {
        /// Tool name (see `tools` for the registry)
        tool: String,

        /// Tool parameters as JSON
        #[arg(short, long)]
        params: Option<String>,

        /// Confirmation token from a previous prompt
        #[arg(long)]
        confirm_token: Option<String>,

        /// Caller credential presented to the gateway
        #[arg(long)]
        auth: Option<String>,
    },

    /// List registered tools with their tier and category
    Tools,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // Load config
    let config = if let Some(config_path) = cli.config {
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| agent_tool_gateway::Error::Config(e.to_string()))?;
        serde_json::from_str(&content)
            .map_err(|e| agent_tool_gateway::Error::Config(e.to_string()))?
    } else {
        Config::default()
    };

    match cli.command {
        Commands::Call {
            tool,
            params,
            confirm_token,
            auth,
        } => {
            run_call(config, tool, params, confirm_token, auth).await?;
        }
        Commands::Tools => {
            let mut specs: Vec<_> = agent_tool_gateway::tools::registry().specs().collect();
            specs.sort_by_key(|spec| spec.name);
            for spec in specs {
                println!(
                    "{:<20} {:<14} {:<14} {}",
                    spec.name,
                    spec.tier.label(),
                    spec.category,
                    spec.service.name()
                );
            }
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config).unwrap());
        }
    }

    Ok(())
}

async fn run_call(
    config: Config,
    tool: String,
    params: Option<String>,
    confirm_token: Option<String>,
    auth: Option<String>,
) -> Result<()> {
    use agent_tool_gateway::BackendConfig;

    let backends = BackendConfig::from_env();
    let gateway = ToolGateway::new(config, backends);

    let mut params: serde_json::Value = match params {
        Some(raw) => serde_json::from_str(&raw)?,
        None => serde_json::json!({}),
    };
    if let Some(token) = confirm_token {
        if let Some(map) = params.as_object_mut() {
            map.insert("confirm_token".to_string(), serde_json::json!(token));
        }
    }

    tracing::info!(tool = %tool, "Invoking tool through the gateway");

    match gateway.invoke(auth.as_deref(), &tool, params).await? {
        InvokeOutcome::Completed(envelope) => {
            println!("{}", serde_json::to_string_pretty(&envelope).unwrap());
        }
        InvokeOutcome::ConfirmationPending { message, .. } => {
            println!("{}", message);
        }
    }

    Ok(())
}

use std::sync::Arc;

use clap::{Parser, Subcommand};

use screenline_core::config::Config;
use screenline_gateway::GatewayState;

#[derive(Parser)]
#[command(
    name = "screenline",
    about = "Phone-call screening gateway — answers calls and runs a short voice interview",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the call gateway
    Serve {
        /// Port to listen on (default: 8080)
        #[arg(long)]
        port: Option<u16>,

        /// Public HTTPS base URL the telephony provider can reach
        #[arg(long)]
        public_url: Option<String>,
    },

    /// Show effective settings and whether the gateway could run
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
}

fn init_logging(config: &Config, verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let mut directives = vec![config
        .logging
        .as_ref()
        .and_then(|l| l.level.clone())
        .unwrap_or_else(|| default_level.to_string())];
    if let Some(logging) = &config.logging {
        directives.extend(logging.filters.iter().cloned());
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(directives.join(",")));

    let json = config
        .logging
        .as_ref()
        .map(|l| l.format == "json")
        .unwrap_or(false);
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .as_ref()
        .map(std::path::PathBuf::from)
        .unwrap_or_else(Config::config_path);
    let mut config = Config::load(&config_path)?;

    init_logging(&config, cli.verbose);

    match cli.command {
        Commands::Serve { port, public_url } => {
            if let Some(url) = public_url {
                config.gateway.get_or_insert_with(Default::default).public_url = Some(url);
            }
            let port = port.unwrap_or_else(|| config.gateway_port());

            let (warnings, errors) = config.validate();
            for warning in &warnings {
                tracing::warn!("{warning}");
            }
            if !errors.is_empty() {
                for error in &errors {
                    tracing::error!("{error}");
                }
                anyhow::bail!("Configuration is invalid; see errors above");
            }

            tracing::info!("Starting call gateway on port {port}");
            let state = Arc::new(GatewayState::new(config));
            screenline_gateway::start_gateway(state, port).await?;
        }
        Commands::Status => {
            let (warnings, errors) = config.validate();
            println!("Screenline v{}", env!("CARGO_PKG_VERSION"));
            println!("Config: {}", config_path.display());
            println!("Gateway port: {}", config.gateway_port());
            println!(
                "Public URL: {}",
                config.public_url().unwrap_or("(not configured)")
            );
            println!("Hangup fallback: {} ms", config.hangup_fallback_ms());
            for warning in &warnings {
                println!("Warning: {warning}");
            }
            for error in &errors {
                println!("Error: {error}");
            }
            if errors.is_empty() {
                println!("Status: ready to serve");
            } else {
                println!("Status: not runnable");
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
        },
    }

    Ok(())
}

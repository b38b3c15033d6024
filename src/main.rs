use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use stockwatch::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for stockwatch::AppCommand {
    fn from(cmd: Commands) -> stockwatch::AppCommand {
        match cmd {
            Commands::Monitor => stockwatch::AppCommand::Monitor,
            Commands::Update => stockwatch::AppCommand::Update,
            Commands::Status => stockwatch::AppCommand::Status,
            Commands::Report => stockwatch::AppCommand::Report,
            Commands::TestAlert => stockwatch::AppCommand::TestAlert,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Run the monitoring loop until interrupted
    Monitor,
    /// Refresh holding prices once and display the portfolio
    Update,
    /// Display monitoring status
    Status,
    /// Send a portfolio summary through the alert sink
    Report,
    /// Send a test alert to verify the notification path
    TestAlert,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => setup(),
        Some(cmd) => stockwatch::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

fn setup() -> anyhow::Result<()> {
    use anyhow::Context;

    let path = stockwatch::core::config::AppConfig::default_config_path()?;

    if path.exists() {
        anyhow::bail!("Configuration file already exists at {}", path.display());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    // Include the example config as a string literal in the binary
    let default_config = include_str!("../docs/example_config.yaml");

    std::fs::write(&path, default_config)
        .with_context(|| format!("Failed to write config file to {}", path.display()))?;

    tracing::info!("Created default configuration at {}", path.display());
    Ok(())
}

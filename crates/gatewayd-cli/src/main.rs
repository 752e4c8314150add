mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "gatewayd")]
#[command(about = "MCP protocol gateway: aggregates stdio JSON-RPC backends behind one authenticated HTTPS+SSE endpoint", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway
    Serve {
        /// Path to the gateway config document
        #[arg(short, long, default_value = "gatewayd.json")]
        config: String,
    },

    /// Parse and validate a config document without starting the gateway
    ValidateConfig {
        /// Path to the gateway config document
        #[arg(short, long, default_value = "gatewayd.json")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => {
            commands::serve::execute(&config).await?;
        }
        Commands::ValidateConfig { config } => {
            commands::validate::execute(&config)?;
        }
    }

    Ok(())
}

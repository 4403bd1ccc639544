use clap::{Parser, Subcommand};

mod replay;

#[derive(Parser)]
#[command(name = "perp-pilot")]
#[command(about = "Risk-validation engine for LLM-driven perpetual futures trading", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded decision session against the risk engine
    Replay {
        /// JSONL script: one step per line with prices, volatility, and
        /// the raw decision-maker response
        #[arg(short, long)]
        script: String,
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Print the effective configuration after file and env merging
    ShowConfig {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::Replay { script, config } => {
            replay::run(&script, &config).await?;
        }
        Commands::ShowConfig { config } => {
            let config = perp_pilot_core::ConfigLoader::load_from(&config)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

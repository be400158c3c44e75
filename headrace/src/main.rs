use anyhow::Result;
use clap::{Parser, Subcommand};

use headrace::{commands, config};

#[derive(Parser)]
#[command(name = "headrace")]
#[command(about = "Off-chain head protocol node for a UTxO base chain", long_about = None)]
struct Cli {
    /// Path to config file (default: ~/.headrace/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a config file and identity keyfile
    Init,

    /// Run a local devnet head through its full lifecycle
    Run {
        /// Number of parties in the devnet head
        #[arg(long, default_value_t = 2)]
        parties: u32,

        /// Milliseconds between devnet blocks
        #[arg(long, default_value_t = 100)]
        block_ms: u64,
    },

    /// Show the node's recovered head state
    Status,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    let config_path = cli
        .config
        .map(std::path::PathBuf::from)
        .unwrap_or_else(config::default_config_path);

    match cli.command {
        Commands::Init => commands::init::run(&config_path),
        Commands::Run { parties, block_ms } => {
            commands::run::run(&config_path, parties, block_ms)
        }
        Commands::Status => commands::status::run(&config_path),
    }
}

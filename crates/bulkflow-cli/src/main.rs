mod commands;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "bulkflow",
    version,
    about = "Bulk loader/unloader for CQL clusters"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Alternate configuration file
    #[arg(short = 'f', long = "config", global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Operation directory name template ({workflow}, {date})
    #[arg(long = "executionId", global = true, value_name = "TEMPLATE")]
    execution_id: Option<String>,

    /// Skip execution; validate mapping only
    #[arg(long = "dryRun", global = true)]
    dry_run: bool,

    /// Connector to read from / write to
    #[arg(short = 'c', long = "connector", global = true, value_name = "NAME")]
    connector: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Load records from a connector into the cluster
    Load {
        /// Configuration overrides (dotted.key=value)
        #[arg(value_name = "dotted.key=value")]
        overrides: Vec<String>,
    },
    /// Unload rows from the cluster into a connector
    Unload {
        /// Configuration overrides (dotted.key=value)
        #[arg(value_name = "dotted.key=value")]
        overrides: Vec<String>,
    },
    /// Count rows without writing them anywhere
    Count {
        /// Configuration overrides (dotted.key=value)
        #[arg(value_name = "dotted.key=value")]
        overrides: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let flags = commands::CommonFlags {
        config: cli.config,
        execution_id: cli.execution_id,
        dry_run: cli.dry_run,
        connector: cli.connector,
    };

    let code = match cli.command {
        Commands::Load { overrides } => commands::load::execute(&flags, &overrides).await,
        Commands::Unload { overrides } => commands::unload::execute(&flags, &overrides).await,
        Commands::Count { overrides } => commands::count::execute(&flags, &overrides).await,
    };
    ExitCode::from(code)
}

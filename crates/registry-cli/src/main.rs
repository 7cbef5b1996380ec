//! `registry`: inspect roles, provision accounts, keep members and issue receipts

use anyhow::Result;
use clap::{Parser, Subcommand};
use registry_authorization::RoleTable;
use registry_cli::commands::{
    account::{self, AccountCommand},
    check,
    member::{self, MemberCommand},
    receipt::{self, ReceiptCommand},
    roles, seed, stats,
};
use registry_cli::Registry;
use registry_core::{Capability, RegistryConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "registry")]
#[command(about = "Donation receipt registry", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true, default_value = "registry.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective role table
    Roles,

    /// Show how a capability resolves for a user
    Check {
        /// Username to evaluate
        #[arg(short, long)]
        user: String,

        /// Capability token, e.g. read_receipts
        #[arg(long)]
        capability: Capability,
    },

    /// Create the demo accounts that do not exist yet
    Seed,

    /// Account administration
    #[command(subcommand)]
    Account(AccountCommand),

    /// Member records
    #[command(subcommand)]
    Member(MemberCommand),

    /// Receipt operations
    #[command(subcommand)]
    Receipt(ReceiptCommand),

    /// Registry-wide record counts
    Stats {
        /// Acting user
        #[arg(long = "as")]
        actor: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = RegistryConfig::load_or_default(&cli.config)?;
    config.merge_with_env()?;
    config.validate()?;

    let output = match cli.command {
        Commands::Roles => roles::describe(&RoleTable::from_config(&config)?),
        Commands::Check { user, capability } => {
            let registry = Registry::open(config)?;
            check::run(&registry, &user, capability).await?
        }
        Commands::Seed => seed::run(&Registry::open(config)?).await?,
        Commands::Account(cmd) => account::run(&Registry::open(config)?, cmd).await?,
        Commands::Member(cmd) => member::run(&Registry::open(config)?, cmd).await?,
        Commands::Receipt(cmd) => receipt::run(&Registry::open(config)?, cmd).await?,
        Commands::Stats { actor } => stats::run(&Registry::open(config)?, &actor).await?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

//! stratusctl: Command-line interface for Stratus instances.
//!
//! Checks shared SQLite instances out and in, runs SQL against them under the
//! lock, and inspects or breaks lock markers from the terminal.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use stratus::config::Config;
use stratus::observability::tracing::init_tracing;

/// Command-line interface for Stratus instances.
#[derive(Parser)]
#[command(name = "stratusctl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    config: Config,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show who holds the instance lock
    Status,
    /// Create the instance database and publish it
    Init,
    /// Lock the instance and fetch its database
    Load {
        /// Fetch a read-only snapshot without locking
        #[arg(long)]
        no_lock: bool,
    },
    /// Publish local changes and release the lock
    Close,
    /// Publish local changes and keep the lock
    Push,
    /// Run a SQL batch under the lock
    Exec {
        /// SQL statements
        sql: String,
    },
    /// Remove the lock marker regardless of its holder
    Unlock {
        /// Confirm breaking a lock held by someone else
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.config.log_level);

    let mut session = cli.config.open_session();

    match cli.command {
        Commands::Status => commands::status::run(&session, cli.output).await?,
        Commands::Init => commands::session::init(&mut session, cli.output).await?,
        Commands::Load { no_lock } => {
            commands::session::load(&mut session, no_lock, cli.output).await?;
        }
        Commands::Close => commands::session::close(&mut session, cli.output).await?,
        Commands::Push => commands::session::push(&mut session, cli.output).await?,
        Commands::Exec { sql } => commands::exec::run(&mut session, &sql, cli.output).await?,
        Commands::Unlock { force } => {
            commands::unlock::run(&mut session, force, cli.output).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_load_with_flags() {
        let cli = Cli::parse_from([
            "stratusctl",
            "--storage-root",
            "/mnt/bucket",
            "--identity",
            "u-1",
            "-o",
            "json",
            "load",
            "--no-lock",
        ]);
        assert_eq!(cli.output, OutputFormat::Json);
        assert_eq!(cli.config.identity, "u-1");
        assert!(matches!(cli.command, Commands::Load { no_lock: true }));
    }

    #[test]
    fn test_output_format_rejects_unknown() {
        assert!("yaml".parse::<OutputFormat>().is_err());
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
    }
}

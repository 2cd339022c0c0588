use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dns_indexer::commands::{self, ExportKind};
use dns_indexer::config::AppConfig;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[derive(Parser)]
#[command(name = "dns-indexer")]
#[command(about = "Aggregate Zeek DNS logs into deduplicated query/answer statistics", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: $CONFIG_FILE or ./config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate log files and print JSON lines to stdout
    Aggregate {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Print individual values instead of tuples
        #[arg(long)]
        individual: bool,
        /// Reverse query names (overrides export.reverse_query)
        #[arg(long)]
        reverse: bool,
    },
    /// Merge log files into the database, skipping files already indexed
    Index {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Create the database schema
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Aggregate {
            files,
            individual,
            reverse,
        } => {
            let kind = if individual {
                ExportKind::Individual
            } else {
                ExportKind::Tuples
            };
            let reverse = reverse || config.export.reverse_query;
            let mut stdout = tokio::io::stdout();
            let lines = commands::aggregate(&config, files, kind, reverse, &mut stdout).await?;
            tracing::debug!(lines, "export complete");
        }
        Commands::Index { files } => {
            let summary = commands::index(&config, files).await?;
            tracing::info!(
                indexed = summary.indexed,
                already_processed = summary.already_processed,
                "index complete"
            );
        }
        Commands::Init => commands::init(&config).await?,
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // Logs go to stderr; stdout carries exported JSON lines.
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

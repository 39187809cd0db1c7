use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use index::MetadataFilter;
use ingest::{normalize_ticket_key, JsonDirTicketSource};
use serde::Serialize;
use ticketdup::{build_detector, init_tracing, AppConfig};

/// Find likely duplicates of issue-tracker tickets.
#[derive(Debug, Parser)]
#[command(name = "ticketdup", version)]
struct Cli {
    /// YAML configuration file. Offline defaults are used when omitted.
    #[arg(long, short = 'c', value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Extra dotenv file loaded before the configuration.
    #[arg(long, value_name = "FILE", global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Index a ticket and rank its duplicate candidates
    Process {
        /// Ticket key, e.g. GM-1042 or a bare number
        id: String,

        /// Nearest neighbors to adjudicate
        #[arg(long)]
        top_k: Option<usize>,

        /// Judge calls in flight for this ticket
        #[arg(long)]
        concurrency: Option<usize>,

        /// Ignore the cached embedding
        #[arg(long, default_value = "false")]
        force_reembed: bool,

        /// Give up after this many milliseconds
        #[arg(long)]
        deadline_ms: Option<u64>,

        /// Only consider candidates with one of these statuses
        #[arg(long = "status")]
        statuses: Vec<String>,
    },
    /// Add tickets to the index without querying
    Index {
        #[arg(required_unless_present = "all")]
        ids: Vec<String>,

        /// Index every ticket found under the source root
        #[arg(long, conflicts_with = "ids")]
        all: bool,

        /// Tickets indexed at once
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Print index and embedding cache counters
    Stats,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("failed to load env file {}", path.display()))?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => AppConfig::default(),
    };
    init_tracing(&config.logging);

    let detector = build_detector(&config).context("failed to initialize detector")?;
    let prefix = config.source.key_prefix.as_str();

    match cli.command {
        Command::Process {
            id,
            top_k,
            concurrency,
            force_reembed,
            deadline_ms,
            statuses,
        } => {
            let id = normalize_ticket_key(prefix, &id)?;
            let mut options = config.process_options().with_force_reembed(force_reembed);
            if let Some(top_k) = top_k {
                options = options.with_top_k(top_k);
            }
            if let Some(concurrency) = concurrency {
                options = options.with_concurrency(concurrency);
            }
            if let Some(ms) = deadline_ms {
                options = options.with_deadline(Duration::from_millis(ms));
            }
            if !statuses.is_empty() {
                options = options.with_filter(MetadataFilter {
                    statuses,
                    ..MetadataFilter::default()
                });
            }

            let result = detector.process_ticket(&id, &options).await?;
            print_json(&result)?;
        }
        Command::Index {
            ids,
            all,
            concurrency,
        } => {
            let ids = if all {
                JsonDirTicketSource::new(config.source.root.clone())
                    .list_ids()
                    .await?
            } else {
                ids.iter()
                    .map(|raw| normalize_ticket_key(prefix, raw))
                    .collect::<Result<Vec<_>, _>>()?
            };
            let concurrency = concurrency.unwrap_or(config.pipeline.index_concurrency);

            let report = detector.index_tickets(&ids, concurrency).await;
            print_json(&report)?;
            if !report.failed.is_empty() {
                bail!("{} of {} ticket(s) failed to index", report.failed.len(), report.total());
            }
        }
        Command::Stats => print_json(&detector.stats())?,
    }

    Ok(())
}

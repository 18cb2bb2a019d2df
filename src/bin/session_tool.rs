use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use evalcam::{
    config::{EvalcamConfig, StorageConfig},
    storage::{resolve_timestamp_timezone, SampleStore, StoredSession, SummaryFile},
};
use tracing::warn;

/// Inspect and prune stored evaluation sessions.
#[derive(Parser, Debug)]
#[command(name = "evalcam-sessions")]
#[command(about = "List, inspect and prune stored evalcam sessions")]
struct Args {
    /// Path to evalcam configuration file (for storage settings)
    #[arg(short = 'c', long, default_value = "evalcam.toml")]
    config: PathBuf,

    /// Session root directory (defaults to storage.path in config)
    #[arg(short, long)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List stored sessions, oldest first
    List,
    /// Show one session's summary, or its file counts when no summary was saved
    Show { id: String },
    /// Delete sessions older than the given number of days
    Prune {
        #[arg(long)]
        days: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let storage = load_storage_config(&args.config)?;
    let store = match &args.root {
        Some(root) => {
            SampleStore::with_root(root, resolve_timestamp_timezone(&storage.timestamp_timezone))
        }
        None => SampleStore::new(&storage),
    };

    match args.command {
        Command::List => list(&store).await,
        Command::Show { id } => show(&store, &id).await,
        Command::Prune { days } => {
            let days = days.unwrap_or(storage.retention_days);
            let result = store
                .prune_sessions(days)
                .await
                .context("Failed to prune sessions")?;
            println!(
                "Deleted {} sessions older than {} days ({} bytes freed)",
                result.sessions_deleted, days, result.bytes_freed
            );
            for error in &result.errors {
                eprintln!("  {}", error);
            }
            Ok(())
        }
    }
}

fn load_storage_config(config_path: &Path) -> Result<StorageConfig> {
    if config_path.exists() {
        let cfg = EvalcamConfig::load_from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
        Ok(cfg.storage)
    } else {
        warn!(
            "Config file {} not found, using built-in defaults",
            config_path.display()
        );
        Ok(EvalcamConfig::default().storage)
    }
}

fn started(session: &StoredSession) -> String {
    DateTime::<Utc>::from(session.started_at)
        .format("%Y-%m-%d %H:%M:%S UTC")
        .to_string()
}

async fn list(store: &SampleStore) -> Result<()> {
    let sessions = store
        .list_sessions()
        .await
        .with_context(|| format!("Failed to list {}", store.root().display()))?;

    if sessions.is_empty() {
        println!("No sessions under {}", store.root().display());
        return Ok(());
    }

    for session in sessions {
        println!(
            "{:<24} {}  {:>3} samples  {:>3} errors  {:>9} bytes{}",
            session.id,
            started(&session),
            session.sample_count,
            session.error_count,
            session.total_size_bytes,
            if session.has_summary { "  [summary]" } else { "" }
        );
    }
    Ok(())
}

async fn show(store: &SampleStore, id: &str) -> Result<()> {
    let session = store
        .find_session(id)
        .await?
        .ok_or_else(|| anyhow!("No session {} under {}", id, store.root().display()))?;

    println!("Session:  {}", session.id);
    println!("Started:  {}", started(&session));
    println!("Path:     {}", session.path.display());

    if session.has_summary {
        let summary = SummaryFile::load(&session.path.join("summary.json")).await?;
        let score = summary
            .score
            .map(|score| format!("{:.2}", score))
            .unwrap_or_else(|| "n/a".to_string());
        println!(
            "Score:    {} ({}/{} accepted, {} errored)",
            score, summary.accepted_count, summary.total_attempts, summary.errored_count
        );
        println!(
            "Best:     {}",
            summary.representative.as_deref().unwrap_or("no accepted sample")
        );
        for record in &summary.records {
            match &record.error {
                Some(error) => println!("  #{:03} {:<9} {}", record.sequence, record.verdict, error),
                None => println!(
                    "  #{:03} {:<9} {}",
                    record.sequence,
                    record.verdict,
                    record.file.as_deref().unwrap_or("-")
                ),
            }
        }
    } else {
        println!("Samples:  {}", session.sample_count);
        println!("Errors:   {}", session.error_count);
    }
    Ok(())
}

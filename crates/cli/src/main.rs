//! Shelfwise CLI - command-line interface for the Shelfwise job engine

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::json;
use shelfwise_core::application::warming::authors::extract_authors;
use shelfwise_core::domain::{JobId, JobStatus, JobType, MetadataRecord, SearchQuery};
use shelfwise_core::port::{SystemTimeProvider, UuidProvider};
use shelfwise_sdk::{
    AdminClient, CoordinatorConfig, JobClient, JobCoordinator, PipelineInput, RemoteAnalysisStage,
    SelectorConfig, StatusChange, TransportSelector, WebSocketChannel,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabled::{Table, Tabled};
use tokio::sync::broadcast;

const DEFAULT_HTTP_URL: &str = "http://127.0.0.1:8787";
const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9527";

#[derive(Parser)]
#[command(name = "shelfwise")]
#[command(about = "Shelfwise job engine CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Job API base URL
    #[arg(long, global = true, env = "SHELFWISE_HTTP_URL", default_value = DEFAULT_HTTP_URL)]
    http_url: String,

    /// Admin RPC URL
    #[arg(long, global = true, env = "SHELFWISE_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a bookshelf photo and add the books found to the library
    Scan {
        /// Image file (jpeg, png, webp, heic)
        image: PathBuf,

        /// Also wait until the new records are enriched
        #[arg(long)]
        wait: bool,
    },

    /// Import a library export (CSV with Title and Author columns)
    Import {
        csv: PathBuf,

        /// Also wait until the new records are enriched
        #[arg(long)]
        wait: bool,
    },

    /// Show a job's status
    Status {
        /// Job ID
        job_id: String,
    },

    /// Search book metadata
    Search {
        query: String,

        /// Treat the query as an author name
        #[arg(long)]
        author: bool,
    },

    /// Inspect or change the enrichment queue
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },

    /// Show daemon statistics
    Stats,

    /// Purge expired job states and cache entries
    Maintenance {
        /// Force VACUUM even if not needed
        #[arg(long)]
        force_vacuum: bool,
    },

    /// Bulk metadata warming
    Warm {
        #[command(subcommand)]
        action: WarmAction,
    },
}

#[derive(Subcommand)]
enum QueueAction {
    /// List queued records, front first
    List {
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },

    /// Move a record to the front of the queue
    Prioritize { record_ref: String },

    /// Queue records for enrichment
    Enqueue {
        #[arg(required = true)]
        record_refs: Vec<String>,
    },

    /// Drop every queued record
    Clear,
}

#[derive(Subcommand)]
enum WarmAction {
    /// Run one warming batch now
    Run,

    /// Show the batch cursor
    Cursor,

    /// Load authors from a library export as the warming list
    LoadAuthors {
        csv: PathBuf,

        /// Keep only the N most frequent authors
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
}

#[derive(Tabled)]
struct StatusRow {
    job_id: String,
    job_type: String,
    status: String,
    progress: String,
    updated: String,
}

#[derive(Tabled)]
struct RecordRow {
    title: String,
    authors: String,
    year: String,
    isbn: String,
}

impl From<&MetadataRecord> for RecordRow {
    fn from(record: &MetadataRecord) -> Self {
        Self {
            title: record.title.clone(),
            authors: record.authors.join(", "),
            year: record
                .published_year
                .map(|y| y.to_string())
                .unwrap_or_default(),
            isbn: record.isbn.clone().unwrap_or_default(),
        }
    }
}

#[derive(Tabled)]
struct QueueRow {
    position: usize,
    record_ref: String,
    enqueued: String,
}

#[derive(Tabled)]
struct AuthorRow {
    author: String,
    books: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Scan { image, wait } => {
            let bytes = std::fs::read(image)
                .with_context(|| format!("Failed to read {}", image.display()))?;
            let payload = json!({
                "image": STANDARD.encode(bytes),
                "mimeType": mime_type(image),
            });
            run_pipeline(&cli, JobType::BookshelfScan, payload, *wait).await?;
        }

        Commands::Import { csv, wait } => {
            let text = read_text(csv)?;
            run_pipeline(&cli, JobType::CsvImport, json!({ "csv": text }), *wait).await?;
        }

        Commands::Status { job_id } => {
            let client = JobClient::new(&cli.http_url)?;
            let response = client.status(&JobId::new(job_id.as_str())).await?;

            let progress = response
                .progress
                .as_ref()
                .map(|p| format!("{}/{} {}", p.processed_items, p.total_items, p.current_status))
                .unwrap_or_default();
            let row = StatusRow {
                job_id: response.job_id.to_string(),
                job_type: response.job_type.to_string(),
                status: response.status.to_string(),
                progress,
                updated: format_millis(response.updated_at),
            };
            println!("{}", Table::new(vec![row]));

            if let Some(error) = &response.error {
                println!("{} {}", "Error:".red().bold(), error);
            }
            if let Some(result) = &response.result {
                println!("{}", serde_json::to_string_pretty(result)?);
            }
        }

        Commands::Search { query, author } => {
            let client = JobClient::new(&cli.http_url)?;
            let (records, cached) = if *author {
                let outcome = client.author(query).await?;
                (outcome.records, Some(outcome.cached))
            } else {
                (client.search(&SearchQuery::new(query.as_str())).await?, None)
            };

            if records.is_empty() {
                println!("{}", "No matches".yellow());
            } else {
                let rows: Vec<RecordRow> = records.iter().map(RecordRow::from).collect();
                println!("{}", Table::new(rows));
            }
            if cached == Some(true) {
                println!("{}", "(from cache)".dimmed());
            }
        }

        Commands::Queue { action } => {
            let admin = AdminClient::connect(&cli.rpc_url)?;
            queue(&admin, action).await?;
        }

        Commands::Stats => {
            println!("{}", "System Status".cyan().bold());
            println!();

            let admin = AdminClient::connect(&cli.rpc_url)?;
            match admin.stats().await {
                Ok(stats) => {
                    println!("  {} {}", "RPC URL:".bold(), cli.rpc_url);
                    println!("  {} {}", "Status:".bold(), "ONLINE".green());
                    println!();
                    println!("  {} {}", "Queued:".bold(), stats.jobs.queued);
                    println!("  {} {}", "Active:".bold(), stats.jobs.active);
                    println!("  {} {}", "Completed:".bold(), stats.jobs.completed);
                    println!("  {} {}", "Failed:".bold(), stats.jobs.failed);
                    println!("  {} {}", "Cancelled:".bold(), stats.jobs.cancelled);
                    println!("  {} {}", "Watched:".bold(), stats.watched_jobs);
                    println!();
                    println!("  {} {}", "Records:".bold(), stats.records);
                    println!("  {} {}", "Cache entries:".bold(), stats.cache_entries);
                    let e = &stats.enrichment;
                    println!(
                        "  {} {} waiting, {} ok, {} failed{}",
                        "Enrichment:".bold(),
                        e.remaining,
                        e.succeeded,
                        e.failed,
                        if e.running { " (running)" } else { "" }
                    );
                    if let Some(last_error) = &e.last_error {
                        println!("  {} {}", "Last error:".bold(), last_error.yellow());
                    }
                    println!();
                    println!("  {} {:.2} MB", "DB Size:".bold(), megabytes(stats.db_size_bytes));
                    println!("  {} {} seconds", "Uptime:".bold(), stats.uptime_seconds);
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }

        Commands::Maintenance { force_vacuum } => {
            println!("{}", "Running maintenance...".cyan().bold());
            println!();

            if *force_vacuum {
                println!("  {} Force VACUUM enabled", "•".bold());
            }

            let admin = AdminClient::connect(&cli.rpc_url)?;
            match admin.maintenance(*force_vacuum).await {
                Ok(result) => {
                    println!("  ✓ Maintenance completed");
                    println!();
                    if result.vacuum_run {
                        println!("  {} VACUUM executed", "✓".green());
                    } else {
                        println!("  ○ VACUUM skipped (not needed)");
                    }
                    println!("  {} {} job states purged", "✓".green(), result.purged_states);
                    println!(
                        "  {} {} cache entries purged",
                        "✓".green(),
                        result.purged_cache_entries
                    );
                    println!();
                    println!(
                        "  {} {:.2} MB → {:.2} MB",
                        "DB Size:".bold(),
                        megabytes(result.db_size_before),
                        megabytes(result.db_size_after)
                    );
                    if result.reclaimed_mb > 0.0 {
                        println!("  {} {:.2} MB saved", "💾".bold(), result.reclaimed_mb);
                    }
                }
                Err(e) => {
                    println!("  {} Maintenance failed: {}", "✗".red(), e);
                }
            }
        }

        Commands::Warm { action } => {
            let admin = AdminClient::connect(&cli.rpc_url)?;
            warm(&admin, action).await?;
        }
    }

    Ok(())
}

/// Scan or import through the client coordinator, printing progress until
/// the pipeline (and optionally its enrichment job) is terminal
async fn run_pipeline(
    cli: &Cli,
    job_type: JobType,
    payload: serde_json::Value,
    wait: bool,
) -> Result<()> {
    let client = JobClient::new(&cli.http_url)?;
    let selector = Arc::new(TransportSelector::new(
        Arc::new(WebSocketChannel::from_http_base(client.base_url())),
        Arc::new(client.clone()),
        SelectorConfig::default(),
    ));
    let stage_name = match job_type {
        JobType::BookshelfScan => "scan",
        _ => "import",
    };
    let stage = RemoteAnalysisStage::new(client, selector).with_name(stage_name);
    let admin = AdminClient::connect(&cli.rpc_url)?;

    let coordinator = Arc::new(JobCoordinator::new(
        Arc::new(stage),
        Arc::new(admin),
        Arc::new(UuidProvider),
        Arc::new(SystemTimeProvider),
        CoordinatorConfig::default(),
    ));

    let mut changes = coordinator.subscribe();
    let identifier = coordinator.start_pipeline(PipelineInput { job_type, payload });
    println!(
        "{} {} ({})",
        "Started".cyan().bold(),
        identifier.job_id,
        identifier.job_type
    );

    let status = follow(&coordinator, &identifier.job_id, &mut changes).await?;
    let enrichment_job = match status {
        JobStatus::Completed(result) => {
            let records = result["records"].as_array().map(Vec::len).unwrap_or(0);
            println!("{}", format!("✓ {} records added", records).green().bold());
            result["enrichmentJobId"].as_str().map(JobId::new)
        }
        JobStatus::Failed(failure) => bail!("{}", failure),
        JobStatus::Cancelled => {
            println!("{}", "Cancelled".yellow());
            return Ok(());
        }
        JobStatus::Queued | JobStatus::Active(_) => None,
    };

    let Some(enrichment_job) = enrichment_job else {
        return Ok(());
    };
    if !wait {
        println!("  Enrichment continues in the background ({})", enrichment_job);
        return Ok(());
    }

    println!("{}", "Enriching...".cyan());
    match follow(&coordinator, &enrichment_job, &mut changes).await? {
        JobStatus::Completed(stats) => {
            println!(
                "{}",
                format!(
                    "✓ Enrichment done: {} ok, {} failed",
                    stats["succeeded"], stats["failed"]
                )
                .green()
                .bold()
            );
        }
        JobStatus::Failed(failure) => bail!("{}", failure),
        _ => println!("{}", "Cancelled".yellow()),
    }
    Ok(())
}

/// Print one job's changes until it is terminal; Ctrl-C cancels it
async fn follow(
    coordinator: &JobCoordinator,
    job_id: &JobId,
    changes: &mut broadcast::Receiver<StatusChange>,
) -> Result<JobStatus> {
    if let Some(job) = coordinator.get_status(job_id) {
        if job.status.is_terminal() {
            return Ok(job.status);
        }
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                coordinator.cancel(job_id);
            }
            change = changes.recv() => match change {
                Ok(change) if &change.job_id == job_id => {
                    if let JobStatus::Active(progress) = &change.status {
                        if progress.total_items > 0 {
                            println!(
                                "  [{:>3}/{:<3}] {}",
                                progress.processed_items,
                                progress.total_items,
                                progress.current_status
                            );
                        }
                    }
                    if change.status.is_terminal() {
                        return Ok(change.status);
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    if let Some(job) = coordinator.get_status(job_id) {
                        if job.status.is_terminal() {
                            return Ok(job.status);
                        }
                    }
                }
                Err(broadcast::error::RecvError::Closed) => bail!("coordinator stopped"),
            },
        }
    }
}

async fn queue(admin: &AdminClient, action: &QueueAction) -> Result<()> {
    match action {
        QueueAction::List { limit } => {
            let list = admin.list(*limit).await?;
            if list.items.is_empty() {
                println!("{}", "Queue is empty".yellow());
                return Ok(());
            }
            let rows: Vec<QueueRow> = list
                .items
                .iter()
                .enumerate()
                .map(|(position, item)| QueueRow {
                    position,
                    record_ref: item.record_ref.to_string(),
                    enqueued: format_millis(item.enqueued_at),
                })
                .collect();
            println!("{}", Table::new(rows));
            if list.total > list.items.len() {
                println!("  … {} more", list.total - list.items.len());
            }
        }
        QueueAction::Prioritize { record_ref } => {
            let moved = admin.prioritize(record_ref.as_str()).await?;
            println!(
                "{}",
                format!("✓ {} moved to the front ({} queued)", moved.record_ref, moved.queued)
                    .green()
                    .bold()
            );
        }
        QueueAction::Enqueue { record_refs } => {
            let added = admin.enqueue(record_refs.clone()).await?;
            println!(
                "{}",
                format!("✓ {} added ({} queued)", added.added, added.queued)
                    .green()
                    .bold()
            );
            if added.worker_started {
                println!("  Worker started");
            }
        }
        QueueAction::Clear => {
            let cleared = admin.clear().await?;
            println!("{}", format!("✓ {} records removed", cleared.removed).green().bold());
        }
    }
    Ok(())
}

async fn warm(admin: &AdminClient, action: &WarmAction) -> Result<()> {
    match action {
        WarmAction::Run => {
            let run = admin.warming_run().await?;
            match run.report {
                Some(report) if run.ran => {
                    if report.cycle_reset {
                        println!("  {} New cycle started", "↻".cyan());
                    }
                    println!(
                        "{}",
                        format!(
                            "✓ Warmed [{}, {}) of {}: {} ok, {} failed",
                            report.start_index,
                            report.end_index,
                            report.total_count,
                            report.processed,
                            report.failed
                        )
                        .green()
                        .bold()
                    );
                }
                _ => println!("{}", "A warming run is already in progress".yellow()),
            }
        }
        WarmAction::Cursor => {
            let state = admin.warming_cursor().await?;
            println!("{}", format!("Cursor {}", state.name).cyan().bold());
            match state.cursor {
                Some(cursor) => {
                    println!(
                        "  {} {}/{}",
                        "Position:".bold(),
                        cursor.current_index,
                        cursor.total_count
                    );
                    println!("  {} {}", "Cycle started:".bold(), format_millis(cursor.started_at));
                }
                None => println!("  No cursor saved yet"),
            }
            println!("  {} {}", "Entities:".bold(), state.entities);
        }
        WarmAction::LoadAuthors { csv, limit } => {
            let text = read_text(csv)?;
            let mut authors = extract_authors(&text)?;
            if let Some(limit) = limit {
                authors.truncate(*limit);
            }

            let names: Vec<String> = authors.iter().map(|a| a.name.clone()).collect();
            let loaded = admin.warming_load(names).await?;
            println!(
                "{}",
                format!("✓ {} authors loaded for warming", loaded.loaded)
                    .green()
                    .bold()
            );

            let top: Vec<AuthorRow> = authors
                .iter()
                .take(10)
                .map(|a| AuthorRow {
                    author: a.name.clone(),
                    books: a.books,
                })
                .collect();
            if !top.is_empty() {
                println!("{}", Table::new(top));
            }
        }
    }
    Ok(())
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn mime_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        _ => "image/jpeg",
    }
}

fn megabytes(bytes: i64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

fn format_millis(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}

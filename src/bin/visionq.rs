//! visionq CLI: operator interface to the image analysis queue.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use visionq::analysis::vision::{VisionClient, VisionConfig};
use visionq::config::{Config, Settings};
use visionq::decision::{ConsolePrompt, Decision, DecisionProvider, FixedDecision};
use visionq::engine::Driver;
use visionq::enroll::enroll;
use visionq::event::TracingObserver;
use visionq::model::{ItemId, Status};
use visionq::output::{OutputWriter, output_file_name};
use visionq::storage::Storage;
use visionq::telemetry::{TelemetryConfig, TelemetryGuard, init_telemetry};

#[derive(Parser)]
#[command(name = "visionq", about = "Resumable batch image analysis")]
struct Cli {
    /// TOML settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// SQLite queue file (overrides settings)
    #[arg(long, global = true)]
    database: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct DirArgs {
    /// Directory of input images (overrides settings)
    #[arg(long)]
    source: Option<PathBuf>,
    /// Directory for JSON results (overrides settings)
    #[arg(long)]
    output: Option<PathBuf>,
    /// Eligible extension, repeatable (overrides settings)
    #[arg(long = "ext")]
    extensions: Vec<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Enroll new images if the queue is drained, then process Pending items
    Run {
        #[command(flatten)]
        dirs: DirArgs,
        /// What to do when the service reports a quota or auth failure
        #[arg(long, value_enum, default_value_t = TransientPolicy::Ask)]
        on_transient: TransientPolicy,
        /// Process the existing queue without enrolling
        #[arg(long)]
        no_enroll: bool,
    },
    /// Enroll images only
    Enroll {
        #[command(flatten)]
        dirs: DirArgs,
    },
    /// Show item counts by status
    Status,
    /// List work items
    List {
        /// Filter by status (pending, succeeded, failed)
        #[arg(long)]
        status: Option<String>,
        /// Maximum items to show
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Show a work item
    Show {
        /// Work item ID
        id: i64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum TransientPolicy {
    /// Prompt on the console
    Ask,
    /// Mark the item Failed and continue
    Skip,
    /// Stop the run, leaving items Pending
    Halt,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut settings = match cli.config {
        Some(ref path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(database) = cli.database {
        settings.database = database;
    }

    match cli.command {
        Command::Run {
            dirs,
            on_transient,
            no_enroll,
        } => {
            apply_dirs(&mut settings, dirs);
            cmd_run(settings, on_transient, no_enroll).await
        }
        Command::Enroll { dirs } => {
            apply_dirs(&mut settings, dirs);
            cmd_enroll(settings).await
        }
        Command::Status => cmd_status(settings).await,
        Command::List { status, limit } => cmd_list(settings, status, limit).await,
        Command::Show { id } => cmd_show(settings, id).await,
    }
}

fn apply_dirs(settings: &mut Settings, dirs: DirArgs) {
    if let Some(source) = dirs.source {
        settings.source_dir = source;
    }
    if let Some(output) = dirs.output {
        settings.output_dir = output;
    }
    if !dirs.extensions.is_empty() {
        settings.extensions = dirs.extensions;
    }
}

/// Logging for commands that do not talk to the vision service.
fn init_local_logging() -> anyhow::Result<TelemetryGuard> {
    Ok(init_telemetry(TelemetryConfig {
        endpoint: std::env::var("OTEL_ENDPOINT").ok(),
        service_name: "visionq".to_string(),
        log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
    })?)
}

fn check_source_dir(settings: &Settings) -> anyhow::Result<()> {
    if !settings.source_dir.is_dir() {
        anyhow::bail!(
            "source directory {} does not exist",
            settings.source_dir.display()
        );
    }
    Ok(())
}

async fn cmd_run(
    settings: Settings,
    policy: TransientPolicy,
    no_enroll: bool,
) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "visionq".to_string(),
        log_level: config.log_level.clone(),
    })?;

    settings.validate()?;
    let output = OutputWriter::new(&settings.output_dir);
    output.ensure_dir()?;
    let storage = Storage::open(&settings.database).await?;

    if !no_enroll {
        check_source_dir(&settings)?;
        enroll(
            &settings.source_dir,
            &settings.extensions,
            &storage,
            &TracingObserver,
        )
        .await?;
    }

    let client = VisionClient::new(VisionConfig {
        endpoint: config.vision_endpoint,
        api_key: config.vision_api_key,
        features: settings.features.clone(),
        timeout: settings.request_timeout(),
    })?;

    let decisions: Box<dyn DecisionProvider> = match policy {
        TransientPolicy::Ask => Box::new(ConsolePrompt::stdio()),
        TransientPolicy::Skip => Box::new(FixedDecision(Decision::Skip)),
        TransientPolicy::Halt => Box::new(FixedDecision(Decision::Halt)),
    };

    let report = Driver::new(&storage, client, decisions, TracingObserver, output)
        .run()
        .await?;

    println!(
        "processed={} succeeded={} failed={}",
        report.processed, report.succeeded, report.failed
    );
    if report.halted {
        let pending = storage.count_pending().await?;
        println!("halted by operator, {pending} item(s) left pending");
    }

    storage.close().await;
    Ok(())
}

async fn cmd_enroll(settings: Settings) -> anyhow::Result<()> {
    let _guard = init_local_logging()?;
    settings.validate()?;
    check_source_dir(&settings)?;

    let storage = Storage::open(&settings.database).await?;
    let report = enroll(
        &settings.source_dir,
        &settings.extensions,
        &storage,
        &TracingObserver,
    )
    .await?;

    if report.skipped_gate {
        println!("Queue still has pending items, nothing enrolled.");
    } else {
        println!(
            "Discovered {} file(s), enrolled {}.",
            report.discovered, report.enrolled
        );
    }

    storage.close().await;
    Ok(())
}

async fn cmd_status(settings: Settings) -> anyhow::Result<()> {
    let storage = Storage::open_existing(&settings.database).await?;
    let counts = storage.status_counts().await?;

    println!("Pending:    {}", counts.pending);
    println!("Succeeded:  {}", counts.succeeded);
    println!("Failed:     {}", counts.failed);
    println!("Total:      {}", counts.total());

    storage.close().await;
    Ok(())
}

async fn cmd_list(settings: Settings, status: Option<String>, limit: i64) -> anyhow::Result<()> {
    let status_filter: Option<Status> = match status {
        Some(s) => Some(s.parse()?),
        None => None,
    };

    let storage = Storage::open_existing(&settings.database).await?;
    let items = storage.list_by_status(status_filter, limit).await?;

    if items.is_empty() {
        println!("No work items found.");
        return Ok(());
    }

    println!("{:<8}  {:<10}  {:<40}  COMMENT", "ID", "STATUS", "SOURCE");
    println!("{}", "-".repeat(100));

    for item in &items {
        println!(
            "{:<8}  {:<10}  {:<40}  {}",
            item.id.0,
            item.status,
            item.source_path.display(),
            item.comment.as_deref().unwrap_or("-")
        );
    }

    println!("\n{} item(s)", items.len());
    storage.close().await;
    Ok(())
}

async fn cmd_show(settings: Settings, id: i64) -> anyhow::Result<()> {
    let storage = Storage::open_existing(&settings.database).await?;
    let item = storage.get(ItemId(id)).await?;

    println!("ID:       {}", item.id.0);
    println!("Source:   {}", item.source_path.display());
    println!("Status:   {}", item.status);
    println!("Comment:  {}", item.comment.as_deref().unwrap_or("-"));

    if item.status == Status::Succeeded
        && let Some(name) = output_file_name(&item.source_path)
    {
        println!("Output:   {}", settings.output_dir.join(name).display());
    }

    storage.close().await;
    Ok(())
}

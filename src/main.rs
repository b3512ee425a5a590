use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use ldbc_loader::config::{self, ImportConfig};
use ldbc_loader::pipeline::{self, RunReport};
use ldbc_loader::schema::{self, ImportStep};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "ldbc-loader")]
#[command(about = "Bulk-load LDBC social-network CSV files into Neo4j")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clear the graph and import every LDBC file
    Import(ImportArgs),
    /// Print the import steps in execution order and check their ordering
    Plan,
}

#[derive(Args)]
struct ImportArgs {
    /// Directory the LDBC paths (test/static/..., test/dynamic/...) are relative to
    #[arg(short, long, default_value = ".")]
    data_dir: PathBuf,

    /// Neo4j Bolt URI
    #[arg(long, default_value = config::DEFAULT_BOLT_URI)]
    bolt_uri: String,

    #[arg(long, default_value = config::DEFAULT_USER)]
    user: String,

    #[arg(long, default_value = config::DEFAULT_PASSWORD)]
    password: String,

    /// Records per bulk write
    #[arg(long, default_value_t = config::BATCH_SIZE)]
    batch_size: usize,

    /// Retries for a failed batch write before its step fails
    #[arg(long, default_value_t = config::BATCH_MAX_RETRIES)]
    batch_retries: u32,

    /// Initial delay between batch retries, doubled after each failure
    #[arg(long, default_value_t = config::BATCH_RETRY_DELAY_MS)]
    retry_delay_ms: u64,

    /// Relationship steps to run concurrently once all nodes are loaded
    #[arg(long, default_value_t = config::RELATIONSHIP_PARALLELISM)]
    parallel_relationships: usize,

    /// Load into an in-process graph instead of Neo4j
    #[arg(long)]
    dry_run: bool,

    /// Write a JSON run report to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Disable progress bars
    #[arg(long)]
    no_progress: bool,
}

fn run_import(args: ImportArgs) -> Result<()> {
    let Some(batch_size) = NonZeroUsize::new(args.batch_size) else {
        bail!("--batch-size must be at least 1");
    };

    let config = ImportConfig {
        data_dir: args.data_dir,
        bolt_uri: args.bolt_uri,
        user: args.user,
        password: args.password,
        batch_size,
        batch_retries: args.batch_retries,
        retry_delay_ms: args.retry_delay_ms,
        relationship_parallelism: args.parallel_relationships,
        dry_run: args.dry_run,
        report_path: args.report,
        show_progress: !args.no_progress,
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("ldbc-import-worker")
        .enable_io()
        .enable_time()
        .build()
        .context("Failed to build tokio runtime")?;
    let report = rt.block_on(pipeline::run_import(&config))?;

    print_summary(&report);

    if report.succeeded() {
        return Ok(());
    }
    match &report.failure {
        Some(failure) => bail!("import aborted at '{}': {}", failure.step, failure.error),
        None => bail!("import ended in state {:?}", report.state),
    }
}

fn print_summary(report: &RunReport) {
    println!();
    println!("=== Summary ===");
    println!("Final state:        {:?}", report.state);
    println!("Total time:         {:.2}s", report.elapsed_secs);
    println!("Files loaded:       {}", report.stats.files_loaded);
    println!("Records loaded:     {}", report.stats.records_loaded);
    println!("Batches written:    {}", report.stats.batches_written);
    println!("Batch retries:      {}", report.stats.batch_retries);
    println!("Nodes created:      {}", report.stats.nodes_created);
    println!(
        "Edges created:      {} of {} requested",
        report.stats.edges_created, report.stats.edge_requests
    );
    println!(
        "Count mismatches:   {}",
        report.stats.verification_mismatches
    );
    println!();
    for step in &report.steps {
        let found = step
            .verification
            .and_then(|v| v.actual)
            .map(|a| a.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<44} {:>9} records {:>9} written {:>9} in store",
            step.step, step.records, step.written, found
        );
    }
}

fn run_plan() -> Result<()> {
    let plan = schema::ldbc_plan();
    for (i, step) in plan.iter().enumerate() {
        let kind = match step {
            ImportStep::Nodes(_) => "nodes",
            ImportStep::Relationships(_) => "relationships",
        };
        println!(
            "{:>2}. {:<13} {:<44} {}",
            i + 1,
            kind,
            step.to_string(),
            step.source().path
        );
    }
    schema::validate(&plan)?;
    println!();
    println!("Ordering OK: every relationship step follows both of its endpoint node steps.");
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
    }

    let result = match cli.command {
        Commands::Import(args) => run_import(args),
        Commands::Plan => run_plan(),
    };

    match result {
        Ok(()) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

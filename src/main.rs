use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use graphload::config::{LoadConfig, RowErrorPolicy};
use graphload::import::{ImportReport, RunOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "graphload")]
#[command(about = "Bulk-load CSV files into a property graph")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every node job, then every edge job
    Run(RunArgs),
    /// Parse and validate a configuration without connecting
    Validate(ValidateArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Path to the YAML job configuration
    #[arg(short, long)]
    config: PathBuf,

    /// Bolt URI, overrides conn.uri
    #[arg(long)]
    uri: Option<String>,

    #[arg(long)]
    username: Option<String>,

    #[arg(long, env = "GRAPHLOAD_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[arg(long)]
    database: Option<String>,

    /// Mutations in flight per job
    #[arg(long)]
    max_concurrency: Option<usize>,

    /// What to do with a row that fails to cast or resolve
    #[arg(long, value_enum)]
    on_row_error: Option<RowErrorPolicy>,

    /// Print mutations as JSON lines instead of executing them
    #[arg(long)]
    dry_run: bool,

    /// Hide progress spinners
    #[arg(long)]
    no_progress: bool,
}

#[derive(Args)]
struct ValidateArgs {
    /// Path to the YAML job configuration
    #[arg(short, long)]
    config: PathBuf,
}

impl RunArgs {
    fn apply(&self, config: &mut LoadConfig) {
        if let Some(uri) = &self.uri {
            config.conn.uri = uri.clone();
        }
        if let Some(username) = &self.username {
            config.conn.username = username.clone();
        }
        if let Some(password) = &self.password {
            config.conn.password = password.clone();
        }
        if let Some(database) = &self.database {
            config.conn.database = Some(database.clone());
        }
        if let Some(n) = self.max_concurrency {
            config.settings.max_concurrency = n;
        }
        if let Some(policy) = self.on_row_error {
            config.settings.on_row_error = policy;
        }
    }
}

fn run_validate(args: ValidateArgs) -> Result<()> {
    let config = LoadConfig::load(&args.config)
        .with_context(|| format!("Invalid configuration: {}", args.config.display()))?;
    println!(
        "{}: {} node job(s), {} edge job(s)",
        args.config.display(),
        config.nodes.len(),
        config.edges.len()
    );
    Ok(())
}

fn run_load(args: RunArgs) -> Result<()> {
    let mut config = LoadConfig::from_path(&args.config)
        .with_context(|| format!("Failed to read configuration: {}", args.config.display()))?;
    args.apply(&mut config);
    config
        .validate()
        .with_context(|| format!("Invalid configuration: {}", args.config.display()))?;

    let options = RunOptions {
        dry_run: args.dry_run,
        show_progress: !args.no_progress,
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .thread_name("graphload-worker")
        .enable_io()
        .enable_time()
        .build()?;

    let report = rt.block_on(async {
        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, finishing in-flight mutations");
                on_signal.cancel();
            }
        });
        graphload::import::run_import(&config, &options, cancel).await
    })?;

    print_summary(&report);
    Ok(())
}

fn print_summary(report: &ImportReport) {
    println!();
    println!("=== Summary ===");
    println!("Rows read:          {}", report.rows_read);
    println!("Nodes created:      {}", report.nodes_created);
    println!("Edges created:      {}", report.edges_created);
    println!("Rows skipped:       {}", report.rows_skipped);
    println!("Total time:         {:.2}s", report.elapsed.as_secs_f64());

    if !report.failures.is_empty() {
        println!();
        println!("=== Skipped rows ===");
        for f in &report.failures {
            println!("{} ({}) row {}: {}", f.job, f.file.display(), f.row, f.error);
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let builder = FmtSubscriber::builder().with_target(false);
    let installed = match EnvFilter::try_from_default_env() {
        Ok(filter) => {
            tracing::subscriber::set_global_default(builder.with_env_filter(filter).finish())
        }
        Err(_) => tracing::subscriber::set_global_default(builder.with_max_level(level).finish()),
    };
    if let Err(e) = installed {
        eprintln!("Failed to set tracing subscriber: {e}");
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Commands::Run(args) => run_load(args),
        Commands::Validate(args) => run_validate(args),
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

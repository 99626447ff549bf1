use crate::config::{
    ImportSettings, LoadConfig, RowErrorPolicy, PROGRESS_INTERVAL, RESERVED_ID_KEY,
};
use crate::error::LoadError;
use crate::executor::{DryRunExecutor, MutationExecutor, Neo4jOpener, StoreOpener};
use crate::mapper::map_row;
use crate::models::{EdgeImportJob, NodeImportJob};
use crate::mutation::{Mutation, NodeMutationBuilder};
use crate::source::{RecordSource, Row, RowShape};
use crate::stats::ImportStats;
use anyhow::{Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Options that do not come from the configuration file.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    pub show_progress: bool,
}

/// A row that failed and was skipped under [`RowErrorPolicy::Skip`].
#[derive(Debug, Clone)]
pub struct RowFailure {
    pub job: String,
    pub file: PathBuf,
    pub row: u64,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct ImportReport {
    pub rows_read: u64,
    pub nodes_created: u64,
    pub edges_created: u64,
    pub rows_skipped: u64,
    pub failures: Vec<RowFailure>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Nodes,
    Edges,
}

impl Phase {
    fn noun(self) -> &'static str {
        match self {
            Phase::Nodes => "node",
            Phase::Edges => "edge",
        }
    }
}

/// Open the Neo4j store, run both phases, and close the store whether or not they succeeded.
pub async fn run_import(
    config: &LoadConfig,
    options: &RunOptions,
    cancel: CancellationToken,
) -> Result<ImportReport> {
    run_import_with(&Neo4jOpener, config, options, cancel).await
}

/// [`run_import`] against the store `opener` provides. A dry run never opens a store.
pub async fn run_import_with<O: StoreOpener>(
    opener: &O,
    config: &LoadConfig,
    options: &RunOptions,
    cancel: CancellationToken,
) -> Result<ImportReport> {
    config.validate()?;

    if options.dry_run {
        info!("Dry run: mutations are printed, not executed");
        let executor = DryRunExecutor::new();
        return Importer::new(&executor, &config.settings, cancel)
            .with_progress(options.show_progress)
            .run(&config.nodes, &config.edges)
            .await;
    }

    info!(uri = %config.conn.uri, "Connecting to graph store");
    let store = opener.open(&config.conn).await?;
    let result = Importer::new(&store, &config.settings, cancel)
        .with_progress(options.show_progress)
        .run(&config.nodes, &config.edges)
        .await;
    opener.close(store);
    result
}

/// Runs node jobs, then edge jobs, against one executor.
pub struct Importer<'a, E: MutationExecutor> {
    executor: &'a E,
    settings: &'a ImportSettings,
    cancel: CancellationToken,
    show_progress: bool,
}

impl<'a, E: MutationExecutor> Importer<'a, E> {
    pub fn new(executor: &'a E, settings: &'a ImportSettings, cancel: CancellationToken) -> Self {
        Self {
            executor,
            settings,
            cancel,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Every node job runs to completion, in order, before the first edge job starts.
    pub async fn run(
        &self,
        nodes: &[NodeImportJob],
        edges: &[EdgeImportJob],
    ) -> Result<ImportReport> {
        let start = Instant::now();
        let stats = ImportStats::new();
        let mut failures = Vec::new();

        info!(jobs = nodes.len(), "Loading nodes");
        for job in nodes {
            self.run_node_job(job, &stats, &mut failures)
                .await
                .with_context(|| {
                    format!("node job '{}' ({})", job.label, job.file.display())
                })?;
        }

        if self.cancel.is_cancelled() {
            return Err(LoadError::Cancelled).context("edge phase not started");
        }

        info!(jobs = edges.len(), "Loading edges");
        for job in edges {
            self.run_edge_job(job, &stats, &mut failures)
                .await
                .with_context(|| {
                    format!(
                        "edge job '{}' ({})",
                        job.endpoints.strategy_name(),
                        job.file.display()
                    )
                })?;
        }

        Ok(ImportReport {
            rows_read: stats.rows(),
            nodes_created: stats.nodes(),
            edges_created: stats.edges(),
            rows_skipped: stats.skipped(),
            failures,
            elapsed: start.elapsed(),
        })
    }

    async fn run_node_job(
        &self,
        job: &NodeImportJob,
        stats: &ImportStats,
        failures: &mut Vec<RowFailure>,
    ) -> Result<()> {
        if let Some(entry) = job.properties.iter().find(|e| e.property == RESERVED_ID_KEY) {
            return Err(LoadError::PropertyCollision(entry.property.clone()).into());
        }
        let builder = NodeMutationBuilder::new(&job.label)?;
        let source = RecordSource::new(
            &job.file,
            job.dialect.clone(),
            RowShape::for_columns(job.columns()),
        );
        let concurrency = if self.settings.serialize_node_writes {
            1
        } else {
            self.settings.max_concurrency
        };

        self.drive(Phase::Nodes, &job.label, &source, concurrency, stats, failures, |row| {
            builder.build(map_row(row, &job.properties)?)
        })
        .await
    }

    async fn run_edge_job(
        &self,
        job: &EdgeImportJob,
        stats: &ImportStats,
        failures: &mut Vec<RowFailure>,
    ) -> Result<()> {
        job.endpoints.validate()?;
        let source = RecordSource::new(
            &job.file,
            job.dialect.clone(),
            RowShape::for_columns(job.endpoints.columns()),
        );
        self.drive(
            Phase::Edges,
            job.endpoints.strategy_name(),
            &source,
            self.settings.max_concurrency,
            stats,
            failures,
            |row| job.endpoints.resolve(row),
        )
        .await
    }

    /// Read rows in source order and keep at most `concurrency` mutations in flight.
    ///
    /// The cancel token is checked between rows. On a fatal error or cancellation no
    /// further rows are dispatched, but mutations already in flight are awaited.
    #[allow(clippy::too_many_arguments)]
    async fn drive<F>(
        &self,
        phase: Phase,
        name: &str,
        source: &RecordSource,
        concurrency: usize,
        stats: &ImportStats,
        failures: &mut Vec<RowFailure>,
        mut build: F,
    ) -> Result<()>
    where
        F: FnMut(&Row) -> crate::error::Result<Mutation>,
    {
        let concurrency = concurrency.max(1);
        let pb = self.progress(phase, name);
        let policy = self.settings.on_row_error;
        let mut job = JobState::new(phase, name, source.path(), policy, stats);
        let mut in_flight = FuturesUnordered::new();

        info!(
            job = name,
            file = %source.path().display(),
            concurrency,
            "Starting {} job",
            phase.noun()
        );

        let rows = source
            .rows()
            .with_context(|| format!("Failed to open {}", source.path().display()))?;

        for (idx, row) in rows.enumerate() {
            let row_no = idx as u64 + 1;
            if self.cancel.is_cancelled() {
                job.fail(row_no, LoadError::Cancelled);
                break;
            }
            stats.inc_rows();

            let mutation = match row.and_then(|r| build(&r)) {
                Ok(m) => m,
                Err(e) => {
                    job.settle(row_no, Err(e), failures);
                    if job.fatal.is_some() {
                        break;
                    }
                    continue;
                }
            };

            while in_flight.len() >= concurrency {
                if let Some((n, result)) = in_flight.next().await {
                    job.settle(n, result, failures);
                }
            }
            if job.fatal.is_some() {
                break;
            }

            let executor = self.executor;
            in_flight.push(async move { (row_no, executor.execute(&mutation).await) });

            if row_no % PROGRESS_INTERVAL == 0 {
                pb.set_position(row_no);
                info!(job = name, rows = row_no, "Progress");
            }
        }

        while let Some((n, result)) = in_flight.next().await {
            job.settle(n, result, failures);
        }

        pb.finish_with_message(format!(
            "{name}: {} created, {} skipped",
            job.created, job.skipped
        ));

        match job.fatal {
            Some((row_no, e)) => {
                error!(job = name, row = row_no, error = %e, "Job failed");
                Err(e).with_context(|| format!("row {row_no}"))
            }
            None => {
                info!(job = name, created = job.created, skipped = job.skipped, "Job complete");
                Ok(())
            }
        }
    }

    fn progress(&self, phase: Phase, name: &str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg} {pos} rows")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message(format!("{} {name}", phase.noun()));
        pb
    }
}

/// Per-job bookkeeping for settled rows.
struct JobState<'s> {
    phase: Phase,
    name: String,
    file: PathBuf,
    policy: RowErrorPolicy,
    stats: &'s ImportStats,
    created: u64,
    skipped: u64,
    fatal: Option<(u64, LoadError)>,
}

impl<'s> JobState<'s> {
    fn new(
        phase: Phase,
        name: &str,
        file: &Path,
        policy: RowErrorPolicy,
        stats: &'s ImportStats,
    ) -> Self {
        Self {
            phase,
            name: name.to_string(),
            file: file.to_path_buf(),
            policy,
            stats,
            created: 0,
            skipped: 0,
            fatal: None,
        }
    }

    fn settle(
        &mut self,
        row: u64,
        result: crate::error::Result<()>,
        failures: &mut Vec<RowFailure>,
    ) {
        match result {
            Ok(()) => {
                self.created += 1;
                match self.phase {
                    Phase::Nodes => self.stats.inc_nodes(),
                    Phase::Edges => self.stats.inc_edges(),
                }
            }
            Err(e) if e.is_row_level() && self.policy == RowErrorPolicy::Skip => {
                warn!(job = %self.name, row, error = %e, "Skipping row");
                self.skipped += 1;
                self.stats.inc_skipped();
                failures.push(RowFailure {
                    job: self.name.clone(),
                    file: self.file.clone(),
                    row,
                    error: e.to_string(),
                });
            }
            Err(e) => self.fail(row, e),
        }
    }

    /// Keep the first fatal error; later ones from draining are only logged.
    fn fail(&mut self, row: u64, e: LoadError) {
        if self.fatal.is_none() {
            self.fatal = Some((row, e));
        } else {
            warn!(job = %self.name, row, error = %e, "Additional failure while draining");
        }
    }
}

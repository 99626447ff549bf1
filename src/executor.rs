use crate::config::{ConnectionConfig, IMPORT_MAX_RETRIES, IMPORT_RETRY_DELAY_SECS};
use crate::edge::{check_endpoint_matches, END_MATCHES, START_MATCHES};
use crate::error::{LoadError, Result};
use crate::mutation::Mutation;
use anyhow::{bail, Context};
use async_trait::async_trait;
use neo4rs::{query, ConfigBuilder, Graph};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Issues one mutation against the graph store.
///
/// Edge mutations succeed only if both endpoints resolved to exactly one node; otherwise
/// the implementation returns `EndpointNotFound` or `EndpointAmbiguous`.
#[async_trait]
pub trait MutationExecutor: Send + Sync {
    async fn execute(&self, mutation: &Mutation) -> Result<()>;
}

/// Opens the store an import run writes to, and releases it when the run ends.
#[async_trait]
pub trait StoreOpener: Send + Sync {
    type Store: MutationExecutor;

    async fn open(&self, conn: &ConnectionConfig) -> anyhow::Result<Self::Store>;

    fn close(&self, store: Self::Store);
}

/// Opens a [`Neo4jStore`] with the retrying connect.
#[derive(Debug, Default, Clone, Copy)]
pub struct Neo4jOpener;

#[async_trait]
impl StoreOpener for Neo4jOpener {
    type Store = Neo4jStore;

    async fn open(&self, conn: &ConnectionConfig) -> anyhow::Result<Neo4jStore> {
        Neo4jStore::connect(conn).await
    }

    fn close(&self, store: Neo4jStore) {
        store.close();
    }
}

/// A Neo4j connection pool held for the duration of one import run.
pub struct Neo4jStore {
    graph: Graph,
    uri: String,
}

impl Neo4jStore {
    /// Connect and verify with `RETURN 1`, retrying a bounded number of times.
    pub async fn connect(conn: &ConnectionConfig) -> anyhow::Result<Self> {
        let max_retries = IMPORT_MAX_RETRIES;
        let delay = tokio::time::Duration::from_secs(IMPORT_RETRY_DELAY_SECS);

        for attempt in 1..=max_retries {
            match Self::try_connect(conn).await {
                Ok(store) => return Ok(store),
                Err(e) if attempt < max_retries => {
                    info!(attempt, error = %e, "Cannot connect to {}, retrying...", conn.uri);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(e).context(format!(
                        "Cannot connect to graph store at {} after {max_retries} attempts",
                        conn.uri
                    ));
                }
            }
        }

        bail!(
            "Cannot connect to graph store at {} after {max_retries} attempts",
            conn.uri
        );
    }

    async fn try_connect(conn: &ConnectionConfig) -> Result<Self> {
        let mut builder = ConfigBuilder::default()
            .uri(conn.uri.as_str())
            .user(conn.username.as_str())
            .password(conn.password.as_str())
            .max_connections(conn.max_connections);
        if let Some(db) = &conn.database {
            builder = builder.db(db.as_str());
        }
        let graph = Graph::connect(builder.build()?)?;
        graph.run(query("RETURN 1")).await?;
        Ok(Self {
            graph,
            uri: conn.uri.clone(),
        })
    }

    /// Release the connection pool.
    pub fn close(self) {
        info!(uri = %self.uri, "Closing graph store connection");
        drop(self.graph);
    }
}

#[async_trait]
impl MutationExecutor for Neo4jStore {
    async fn execute(&self, mutation: &Mutation) -> Result<()> {
        if !mutation.is_edge() {
            self.graph.run(mutation.to_query()).await?;
            return Ok(());
        }

        let mut rows = self.graph.execute(mutation.to_query()).await?;
        let row = rows.next().await?.ok_or_else(|| {
            LoadError::UnexpectedResponse("edge mutation returned no rows".into())
        })?;
        let start_matches: i64 = row
            .get(START_MATCHES)
            .map_err(|e| LoadError::UnexpectedResponse(format!("{START_MATCHES}: {e}")))?;
        let end_matches: i64 = row
            .get(END_MATCHES)
            .map_err(|e| LoadError::UnexpectedResponse(format!("{END_MATCHES}: {e}")))?;
        // Drain so the auto-commit transaction completes.
        while rows.next().await?.is_some() {}

        check_endpoint_matches(&mutation.kind, start_matches, end_matches)
    }
}

/// Prints each mutation as a JSON line instead of writing it. Edges always "resolve".
#[derive(Default)]
pub struct DryRunExecutor {
    emitted: AtomicU64,
}

impl DryRunExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MutationExecutor for DryRunExecutor {
    async fn execute(&self, mutation: &Mutation) -> Result<()> {
        match serde_json::to_string(mutation) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "Failed to serialize mutation"),
        }
        let n = self.emitted.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(emitted = n, "Dry-run mutation");
        Ok(())
    }
}

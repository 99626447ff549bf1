//! Graphload: bulk-load CSV files into a property graph over Bolt
//!
//! A run is described by a YAML file listing node jobs and edge jobs. Each job reads one
//! CSV file and turns every row into one parameterized Cypher mutation:
//!
//! 1. **Node Phase** -- Every node job runs in configured order; each row is cast through
//!    the job's property mapping and becomes a `CREATE` carrying a generated `uuid`
//! 2. **Edge Phase** -- Starts only after all node jobs finished; each row locates two
//!    existing nodes with one of three endpoint strategies and links them
//!
//! # Architecture
//!
//! - **Streaming CSV** -- Rows are read lazily; nothing holds a whole file in memory
//! - **Bounded concurrency** -- At most `max_concurrency` mutations in flight per job;
//!   the default of 1 keeps strict source order
//! - **Parameter binding** -- Field values never enter query text; labels, relationship
//!   types and property names go through an allow-list and are backtick-quoted
//! - **Exact endpoint matching** -- An edge is created only when each side matches one node
//! - **Row error policy** -- Abort on the first bad row, or record it and continue
//! - **Cancellation** -- Checked between rows; in-flight mutations are drained
//!
//! # Key Modules
//!
//! - [`config`] -- YAML configuration, defaults and validation
//! - [`source`] -- CSV dialect and row reader
//! - [`cast`] -- Field casting to int, float, bool or string
//! - [`mapper`] -- Row to typed property map
//! - [`mutation`] -- Node `CREATE` templates
//! - [`edge`] -- Endpoint strategies and edge templates
//! - [`executor`] -- Neo4j and dry-run executors
//! - [`import`] -- Two-phase orchestration
//! - [`stats`] -- Atomic counters for the run summary
//!
//! # Example Usage
//!
//! ```bash
//! # Check a configuration without touching the store
//! graphload validate --config load.yaml
//!
//! # Load with four mutations in flight, skipping bad rows
//! graphload -v run --config load.yaml --max-concurrency 4 --on-row-error skip
//! ```

pub mod cast;
pub mod config;
pub mod edge;
pub mod error;
pub mod executor;
pub mod identifier;
pub mod import;
pub mod mapper;
pub mod models;
pub mod mutation;
pub mod source;
pub mod stats;

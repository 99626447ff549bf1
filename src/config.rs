//! Constants and the YAML job configuration.
//!
//! ```yaml
//! conn:
//!   uri: bolt://localhost:7687
//!   database: neo4j
//!   username: neo4j
//!   password: secret
//! settings:
//!   max_concurrency: 4
//!   on_row_error: skip
//! nodes:
//!   - file: people.csv
//!     label: Person
//!     properties:
//!       - {0: [name, string]}
//!       - {column: 1, property: age, type: int}
//! edges:
//!   - file: knows.csv
//!     properties:
//!       strategy: by_arbitrary_property
//!       start_property: start_label
//!       end_property: end_label
//!       start_column: 0
//!       end_column: 1
//!       relationship_column: 2
//! ```

use crate::error::{LoadError, Result};
use crate::identifier;
use crate::models::{
    Column, DataType, EdgeImportJob, EndpointSpec, NodeImportJob, PropertyEntry,
    RelationshipType,
};
use crate::source::CsvDialect;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Default Bolt endpoint when neither the file nor the CLI names one
pub const DEFAULT_BOLT_URI: &str = "bolt://localhost:7687";

/// Property every created node carries, holding a generated UUID
pub const RESERVED_ID_KEY: &str = "uuid";

/// Longest label, relationship type or property name accepted in a query template
pub const MAX_IDENTIFIER_LEN: usize = 64;

/// Connection attempts before giving up on the store
pub const IMPORT_MAX_RETRIES: u32 = 5;

pub const IMPORT_RETRY_DELAY_SECS: u64 = 2;

/// Mutations in flight per job unless configured otherwise
pub const DEFAULT_MAX_CONCURRENCY: usize = 1;

/// Upper bound on concurrent store sessions
pub const DEFAULT_MAX_CONNECTIONS: usize = 16;

/// Progress update interval (tick every N rows)
pub const PROGRESS_INTERVAL: u64 = 1000;

/// What to do when a single row fails to cast or resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RowErrorPolicy {
    /// Stop the run at the first failing row.
    #[default]
    Abort,
    /// Record the failure and continue with the next row.
    Skip,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    pub uri: String,
    pub database: Option<String>,
    pub username: String,
    pub password: String,
    pub max_connections: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_BOLT_URI.to_string(),
            database: None,
            username: String::new(),
            password: String::new(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportSettings {
    pub max_concurrency: usize,
    pub on_row_error: RowErrorPolicy,
    /// Write nodes one at a time, for stores that need serialized writes per label.
    pub serialize_node_writes: bool,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            on_row_error: RowErrorPolicy::Abort,
            serialize_node_writes: false,
        }
    }
}

/// A fully parsed configuration.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub conn: ConnectionConfig,
    pub settings: ImportSettings,
    pub nodes: Vec<NodeImportJob>,
    pub edges: Vec<EdgeImportJob>,
}

impl LoadConfig {
    /// Read, parse and validate a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::from_path(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse without validating, so callers can apply overrides first.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            LoadError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut config = Self::from_yaml_str(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let raw: RawConfig = serde_yaml::from_str(text)
            .map_err(|e| LoadError::Configuration(format!("invalid YAML: {e}")))?;
        raw.into_config()
    }

    /// Relative job files are taken relative to the configuration file.
    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |file: &mut PathBuf| {
            if file.is_relative() {
                *file = base.join(&*file);
            }
        };
        self.nodes.iter_mut().for_each(|j| resolve(&mut j.file));
        self.edges.iter_mut().for_each(|j| resolve(&mut j.file));
    }

    /// Check everything that can be checked before a mutation is issued.
    pub fn validate(&self) -> Result<()> {
        if self.settings.max_concurrency == 0 {
            return Err(LoadError::Configuration(
                "settings.max_concurrency must be at least 1".into(),
            ));
        }
        if self.settings.max_concurrency > self.conn.max_connections {
            return Err(LoadError::Configuration(format!(
                "settings.max_concurrency ({}) exceeds conn.max_connections ({})",
                self.settings.max_concurrency, self.conn.max_connections
            )));
        }
        for (i, job) in self.nodes.iter().enumerate() {
            validate_node_job(job).map_err(|e| in_job("nodes", i, e))?;
        }
        for (i, job) in self.edges.iter().enumerate() {
            validate_edge_job(job).map_err(|e| in_job("edges", i, e))?;
        }
        Ok(())
    }
}

fn in_job(section: &str, index: usize, err: LoadError) -> LoadError {
    match err {
        LoadError::Configuration(msg) => {
            LoadError::Configuration(format!("{section}[{index}]: {msg}"))
        }
        other => other,
    }
}

fn validate_node_job(job: &NodeImportJob) -> Result<()> {
    check_file(&job.file)?;
    identifier::validate("label", &job.label)?;
    let mut seen = HashSet::new();
    for entry in &job.properties {
        if entry.property == RESERVED_ID_KEY {
            return Err(LoadError::PropertyCollision(entry.property.clone()));
        }
        identifier::validate("property", &entry.property)?;
        if !seen.insert(entry.property.as_str()) {
            return Err(LoadError::Configuration(format!(
                "property '{}' is mapped more than once",
                entry.property
            )));
        }
    }
    check_uniform_columns(job.columns())
}

fn validate_edge_job(job: &EdgeImportJob) -> Result<()> {
    check_file(&job.file)?;
    job.endpoints.validate()?;
    check_uniform_columns(job.endpoints.columns())
}

fn check_file(file: &Path) -> Result<()> {
    if file.as_os_str().is_empty() {
        return Err(LoadError::Configuration("file must not be empty".into()));
    }
    Ok(())
}

fn check_uniform_columns<'a>(columns: impl IntoIterator<Item = &'a Column>) -> Result<()> {
    let columns: Vec<&Column> = columns.into_iter().collect();
    let named = columns.iter().filter(|c| matches!(c, Column::Name(_))).count();
    if named != 0 && named != columns.len() {
        return Err(LoadError::Configuration(
            "columns must be all indices or all header names".into(),
        ));
    }
    Ok(())
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    conn: Option<RawConn>,
    #[serde(default)]
    settings: RawSettings,
    #[serde(default)]
    nodes: Vec<RawNode>,
    #[serde(default)]
    edges: Vec<RawEdge>,
}

/// `conn` is either a mapping or a list of single-entry mappings.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawConn {
    Map(RawConnFields),
    List(Vec<serde_yaml::Mapping>),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConnFields {
    uri: Option<String>,
    database: Option<String>,
    #[serde(alias = "user")]
    username: Option<String>,
    password: Option<String>,
    max_connections: Option<usize>,
}

#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawSettings {
    max_concurrency: usize,
    on_row_error: RowErrorPolicy,
    serialize_node_writes: bool,
    csv: RawDialect,
}

impl Default for RawSettings {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            on_row_error: RowErrorPolicy::Abort,
            serialize_node_writes: false,
            csv: RawDialect::default(),
        }
    }
}

#[derive(Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
struct RawDialect {
    delimiter: Option<char>,
    quote: Option<char>,
    /// `~` (null) disables escaping.
    #[serde(default, deserialize_with = "explicit_option")]
    escape: Option<Option<char>>,
    skip_leading_space: Option<bool>,
    has_header: Option<bool>,
}

fn explicit_option<'de, D>(deserializer: D) -> std::result::Result<Option<Option<char>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<char>::deserialize(deserializer).map(Some)
}

impl RawDialect {
    /// Fields set here override `base`.
    fn apply(&self, base: &CsvDialect) -> Result<CsvDialect> {
        Ok(CsvDialect {
            delimiter: match self.delimiter {
                Some(c) => ascii_byte("delimiter", c)?,
                None => base.delimiter,
            },
            quote: match self.quote {
                Some(c) => ascii_byte("quote", c)?,
                None => base.quote,
            },
            escape: match self.escape {
                Some(Some(c)) => Some(ascii_byte("escape", c)?),
                Some(None) => None,
                None => base.escape,
            },
            skip_leading_space: self.skip_leading_space.unwrap_or(base.skip_leading_space),
            has_header: self.has_header.unwrap_or(base.has_header),
        })
    }
}

fn ascii_byte(name: &str, c: char) -> Result<u8> {
    if c.is_ascii() {
        Ok(c as u8)
    } else {
        Err(LoadError::Configuration(format!(
            "csv {name} must be a single ASCII character, got '{c}'"
        )))
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawNode {
    file: PathBuf,
    label: String,
    #[serde(default)]
    properties: Vec<RawPropertyEntry>,
    #[serde(default)]
    csv: Option<RawDialect>,
}

/// `{column: 0, property: name, type: string}` or `{0: [name, string]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawPropertyEntry {
    Explicit {
        column: Column,
        property: String,
        #[serde(default, rename = "type")]
        data_type: DataType,
    },
    Compact(BTreeMap<Column, (String, DataType)>),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEdge {
    file: PathBuf,
    properties: RawEndpoints,
    #[serde(default)]
    csv: Option<RawDialect>,
}

fn default_id_property() -> String {
    "id".to_string()
}

#[derive(Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case", deny_unknown_fields)]
enum RawEndpoints {
    ByLabelAndProperty {
        start_label: String,
        end_label: String,
        start_column: Column,
        end_column: Column,
        #[serde(default)]
        relationship: Option<String>,
        #[serde(default)]
        relationship_column: Option<Column>,
        #[serde(default = "default_id_property")]
        id_property: String,
        #[serde(default)]
        id_type: DataType,
    },
    ByInternalIdentity {
        start_column: Column,
        end_column: Column,
        relationship: String,
    },
    ByArbitraryProperty {
        start_property: String,
        end_property: String,
        start_column: Column,
        end_column: Column,
        relationship_column: Column,
        #[serde(default)]
        id_type: DataType,
    },
}

impl RawConfig {
    fn into_config(self) -> Result<LoadConfig> {
        let conn = match self.conn {
            None => ConnectionConfig::default(),
            Some(raw) => raw.into_connection()?,
        };
        let base_dialect = self.settings.csv.apply(&CsvDialect::default())?;
        let dialect_for = |csv: &Option<RawDialect>| match csv {
            Some(overrides) => overrides.apply(&base_dialect),
            None => Ok(base_dialect.clone()),
        };

        let nodes = self
            .nodes
            .into_iter()
            .map(|n| {
                Ok(NodeImportJob {
                    dialect: dialect_for(&n.csv)?,
                    label: n.label,
                    file: n.file,
                    properties: flatten_entries(n.properties),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let edges = self
            .edges
            .into_iter()
            .enumerate()
            .map(|(i, e)| {
                Ok(EdgeImportJob {
                    dialect: dialect_for(&e.csv)?,
                    endpoints: e.properties.into_spec().map_err(|err| in_job("edges", i, err))?,
                    file: e.file,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(LoadConfig {
            conn,
            settings: ImportSettings {
                max_concurrency: self.settings.max_concurrency,
                on_row_error: self.settings.on_row_error,
                serialize_node_writes: self.settings.serialize_node_writes,
            },
            nodes,
            edges,
        })
    }
}

impl RawConn {
    fn into_connection(self) -> Result<ConnectionConfig> {
        let fields = match self {
            RawConn::Map(fields) => fields,
            RawConn::List(items) => {
                let merged: serde_yaml::Mapping = items.into_iter().flatten().collect();
                serde_yaml::from_value(serde_yaml::Value::Mapping(merged))
                    .map_err(|e| LoadError::Configuration(format!("invalid conn: {e}")))?
            }
        };
        let defaults = ConnectionConfig::default();
        Ok(ConnectionConfig {
            uri: fields.uri.unwrap_or(defaults.uri),
            database: fields.database,
            username: fields.username.unwrap_or(defaults.username),
            password: fields.password.unwrap_or(defaults.password),
            max_connections: fields.max_connections.unwrap_or(defaults.max_connections),
        })
    }
}

fn flatten_entries(entries: Vec<RawPropertyEntry>) -> Vec<PropertyEntry> {
    entries
        .into_iter()
        .flat_map(|entry| match entry {
            RawPropertyEntry::Explicit {
                column,
                property,
                data_type,
            } => vec![PropertyEntry::new(column, property, data_type)],
            RawPropertyEntry::Compact(map) => map
                .into_iter()
                .map(|(column, (property, data_type))| {
                    PropertyEntry::new(column, property, data_type)
                })
                .collect(),
        })
        .collect()
}

impl RawEndpoints {
    fn into_spec(self) -> Result<EndpointSpec> {
        Ok(match self {
            RawEndpoints::ByLabelAndProperty {
                start_label,
                end_label,
                start_column,
                end_column,
                relationship,
                relationship_column,
                id_property,
                id_type,
            } => {
                let relationship = match (relationship, relationship_column) {
                    (Some(name), None) => RelationshipType::Literal(name),
                    (None, Some(column)) => RelationshipType::Column(column),
                    _ => {
                        return Err(LoadError::Configuration(format!(
                            "{} needs exactly one of relationship or relationship_column",
                            "by_label_and_property"
                        )))
                    }
                };
                EndpointSpec::ByLabelAndProperty {
                    start_label,
                    end_label,
                    start_column,
                    end_column,
                    relationship,
                    id_property,
                    id_type,
                }
            }
            RawEndpoints::ByInternalIdentity {
                start_column,
                end_column,
                relationship,
            } => EndpointSpec::ByInternalIdentity {
                start_column,
                end_column,
                relationship,
            },
            RawEndpoints::ByArbitraryProperty {
                start_property,
                end_property,
                start_column,
                end_column,
                relationship_column,
                id_type,
            } => EndpointSpec::ByArbitraryProperty {
                start_property,
                end_property,
                start_column,
                end_column,
                relationship_column,
                id_type,
            },
        })
    }
}

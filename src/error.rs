//! Error taxonomy for the loader.
//!
//! Row-level errors (a bad cast, an unresolved edge endpoint) may be skipped when the
//! import runs with [`RowErrorPolicy::Skip`](crate::config::RowErrorPolicy). Everything
//! else aborts the current job and, through the orchestrator, the whole run.

use thiserror::Error;

/// Errors raised while mapping rows and issuing mutations.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Malformed or missing job configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A declared column is absent from a row.
    #[error("Column {column} is missing from row with {row_len} fields (needed for {role})")]
    ColumnIndex {
        column: String,
        role: String,
        row_len: usize,
    },

    /// A field cannot be cast to its declared type.
    #[error("Invalid {kind} value '{raw}' in column {column} (property '{property}')")]
    InvalidValue {
        raw: String,
        kind: String,
        column: String,
        property: String,
    },

    /// A user property uses the reserved node identifier key.
    #[error("Property '{0}' collides with the reserved node identifier key")]
    PropertyCollision(String),

    /// A label, relationship type or property name failed the allow-list.
    #[error("Invalid {kind} identifier '{value}': {reason}")]
    InvalidIdentifier {
        kind: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("No {side} node matches {descriptor}")]
    EndpointNotFound {
        side: &'static str,
        descriptor: String,
    },

    #[error("{matches} {side} nodes match {descriptor}, expected exactly one")]
    EndpointAmbiguous {
        side: &'static str,
        descriptor: String,
        matches: i64,
    },

    #[error("Graph store error: {0}")]
    Store(#[from] neo4rs::Error),

    /// The store answered, but not with the shape the mutation expects.
    #[error("Unexpected store response: {0}")]
    UnexpectedResponse(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Import cancelled")]
    Cancelled,
}

impl LoadError {
    /// True for errors confined to a single row, which the skip policy may record and
    /// continue past.
    pub fn is_row_level(&self) -> bool {
        matches!(
            self,
            LoadError::InvalidValue { .. }
                | LoadError::InvalidIdentifier { .. }
                | LoadError::EndpointNotFound { .. }
                | LoadError::EndpointAmbiguous { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, LoadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_level_classification() {
        let invalid = LoadError::InvalidValue {
            raw: "abc".into(),
            kind: "int".into(),
            column: "1".into(),
            property: "age".into(),
        };
        assert!(invalid.is_row_level());
        assert!(LoadError::EndpointNotFound {
            side: "start",
            descriptor: "(:Person {id: 1})".into()
        }
        .is_row_level());

        assert!(!LoadError::ColumnIndex {
            column: "4".into(),
            role: "property 'x'".into(),
            row_len: 2
        }
        .is_row_level());
        assert!(!LoadError::PropertyCollision("uuid".into()).is_row_level());
        assert!(!LoadError::Cancelled.is_row_level());
    }

    #[test]
    fn messages_name_the_failing_entry() {
        let err = LoadError::InvalidValue {
            raw: "abc".into(),
            kind: "int".into(),
            column: "1".into(),
            property: "age".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc"));
        assert!(msg.contains("column 1"));
        assert!(msg.contains("'age'"));
    }
}

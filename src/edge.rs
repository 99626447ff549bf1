//! Edge endpoint resolution.
//!
//! Each strategy turns a row into one mutation that looks up both endpoints with
//! `OPTIONAL MATCH`, creates the relationship only when each side matched exactly one node,
//! and returns the two match counts. The executor turns the counts into
//! `EndpointNotFound`/`EndpointAmbiguous` via [`check_endpoint_matches`].

use crate::cast::cast;
use crate::error::{LoadError, Result};
use crate::identifier;
use crate::mapper::field;
use crate::models::{Column, DataType, EndpointSpec, RelationshipType, TypedValue};
use crate::mutation::{Mutation, MutationKind};
use crate::source::Row;
use std::collections::BTreeMap;

pub const START_MATCHES: &str = "start_matches";
pub const END_MATCHES: &str = "end_matches";

const START_PARAM: &str = "start_id";
const END_PARAM: &str = "end_id";
const RELATIONSHIP_ROLE: &str = "relationship";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Start,
    End,
}

impl Side {
    fn var(self) -> &'static str {
        match self {
            Side::Start => "a",
            Side::End => "b",
        }
    }

    fn param(self) -> &'static str {
        match self {
            Side::Start => START_PARAM,
            Side::End => END_PARAM,
        }
    }

    fn role(self) -> &'static str {
        match self {
            Side::Start => "start id",
            Side::End => "end id",
        }
    }
}

/// One side's `OPTIONAL MATCH` pattern and the value bound for it.
struct Lookup {
    pattern: String,
    value: TypedValue,
    descriptor: String,
}

impl EndpointSpec {
    /// Check every identifier fixed at configuration time. Run once per job, before any row.
    pub fn validate(&self) -> Result<()> {
        match self {
            EndpointSpec::ByLabelAndProperty {
                start_label,
                end_label,
                relationship,
                id_property,
                ..
            } => {
                identifier::validate("label", start_label)?;
                identifier::validate("label", end_label)?;
                identifier::validate("property", id_property)?;
                if let RelationshipType::Literal(name) = relationship {
                    identifier::validate("relationship", name)?;
                }
            }
            EndpointSpec::ByInternalIdentity { relationship, .. } => {
                identifier::validate("relationship", relationship)?;
            }
            EndpointSpec::ByArbitraryProperty {
                start_property,
                end_property,
                ..
            } => {
                identifier::validate("property", start_property)?;
                identifier::validate("property", end_property)?;
            }
        }
        Ok(())
    }

    /// Build the edge mutation for `row`.
    ///
    /// A row missing any required column is a job-fatal `ColumnIndex`; a bad id cast or an
    /// illegal per-row relationship type is a row-level error.
    pub fn resolve(&self, row: &Row) -> Result<Mutation> {
        self.check_columns(row)?;

        let (start, end, relationship) = match self {
            EndpointSpec::ByLabelAndProperty {
                start_label,
                end_label,
                start_column,
                end_column,
                relationship,
                id_property,
                id_type,
            } => {
                let start = labelled_lookup(
                    row,
                    Side::Start,
                    start_label,
                    id_property,
                    start_column,
                    *id_type,
                )?;
                let end =
                    labelled_lookup(row, Side::End, end_label, id_property, end_column, *id_type)?;
                let relationship = match relationship {
                    RelationshipType::Literal(name) => name.clone(),
                    RelationshipType::Column(column) => relationship_from_row(row, column)?,
                };
                (start, end, relationship)
            }
            EndpointSpec::ByInternalIdentity {
                start_column,
                end_column,
                relationship,
            } => (
                identity_lookup(row, Side::Start, start_column)?,
                identity_lookup(row, Side::End, end_column)?,
                relationship.clone(),
            ),
            EndpointSpec::ByArbitraryProperty {
                start_property,
                end_property,
                start_column,
                end_column,
                relationship_column,
                id_type,
            } => (
                property_lookup(row, Side::Start, start_property, start_column, *id_type)?,
                property_lookup(row, Side::End, end_property, end_column, *id_type)?,
                relationship_from_row(row, relationship_column)?,
            ),
        };

        Ok(edge_mutation(start, end, relationship))
    }

    fn check_columns(&self, row: &Row) -> Result<()> {
        for (column, role) in self.required_columns() {
            field(row, column, role)?;
        }
        Ok(())
    }

    fn required_columns(&self) -> Vec<(&Column, &'static str)> {
        let (start_column, end_column, relationship_column) = match self {
            EndpointSpec::ByLabelAndProperty {
                start_column,
                end_column,
                relationship,
                ..
            } => match relationship {
                RelationshipType::Column(c) => (start_column, end_column, Some(c)),
                RelationshipType::Literal(_) => (start_column, end_column, None),
            },
            EndpointSpec::ByInternalIdentity {
                start_column,
                end_column,
                ..
            } => (start_column, end_column, None),
            EndpointSpec::ByArbitraryProperty {
                start_column,
                end_column,
                relationship_column,
                ..
            } => (start_column, end_column, Some(relationship_column)),
        };
        let mut columns = vec![
            (start_column, Side::Start.role()),
            (end_column, Side::End.role()),
        ];
        if let Some(c) = relationship_column {
            columns.push((c, RELATIONSHIP_ROLE));
        }
        columns
    }
}

fn labelled_lookup(
    row: &Row,
    side: Side,
    label: &str,
    id_property: &str,
    column: &Column,
    id_type: DataType,
) -> Result<Lookup> {
    let value = endpoint_value(row, side, column, id_type)?;
    Ok(Lookup {
        pattern: format!(
            "({}:`{label}` {{`{id_property}`: ${}}})",
            side.var(),
            side.param()
        ),
        descriptor: format!("(:{label} {{{id_property}: {}}})", describe(&value)),
        value,
    })
}

fn property_lookup(
    row: &Row,
    side: Side,
    property: &str,
    column: &Column,
    id_type: DataType,
) -> Result<Lookup> {
    let value = endpoint_value(row, side, column, id_type)?;
    Ok(Lookup {
        pattern: format!("({} {{`{property}`: ${}}})", side.var(), side.param()),
        descriptor: format!("({{{property}: {}}})", describe(&value)),
        value,
    })
}

/// Integer identities match `id(n)`; anything else is treated as an element id.
fn identity_lookup(row: &Row, side: Side, column: &Column) -> Result<Lookup> {
    let raw = field(row, column, side.role())?.trim();
    let var = side.var();
    let param = side.param();
    let (pattern, value) = match raw.parse::<i64>() {
        Ok(id) => (
            format!("({var}) WHERE id({var}) = ${param}"),
            TypedValue::Int(id),
        ),
        Err(_) => (
            format!("({var}) WHERE elementId({var}) = ${param}"),
            TypedValue::String(raw.to_string()),
        ),
    };
    Ok(Lookup {
        pattern,
        descriptor: format!("(internal id {})", describe(&value)),
        value,
    })
}

fn endpoint_value(row: &Row, side: Side, column: &Column, id_type: DataType) -> Result<TypedValue> {
    let raw = field(row, column, side.role())?;
    cast(raw, id_type).map_err(|e| match e {
        LoadError::InvalidValue { raw, kind, .. } => LoadError::InvalidValue {
            raw,
            kind,
            column: column.to_string(),
            property: side.role().to_string(),
        },
        other => other,
    })
}

/// Relationship types read per row are checked against the allow-list per row.
fn relationship_from_row(row: &Row, column: &Column) -> Result<String> {
    let name = field(row, column, RELATIONSHIP_ROLE)?.trim();
    identifier::validate("relationship", name)?;
    Ok(name.to_string())
}

fn describe(value: &TypedValue) -> String {
    match value {
        TypedValue::String(s) => format!("{s:?}"),
        TypedValue::Int(i) => i.to_string(),
        TypedValue::Float(f) => f.to_string(),
        TypedValue::Bool(b) => b.to_string(),
    }
}

fn edge_mutation(start: Lookup, end: Lookup, relationship: String) -> Mutation {
    let query = format!(
        "OPTIONAL MATCH {start_pattern}\n\
         WITH collect(a) AS starts\n\
         OPTIONAL MATCH {end_pattern}\n\
         WITH starts, collect(b) AS ends\n\
         FOREACH (s IN CASE WHEN size(starts) = 1 AND size(ends) = 1 THEN starts ELSE [] END |\n  \
         FOREACH (e IN ends | CREATE (s)-[:`{relationship}`]->(e)))\n\
         RETURN size(starts) AS {START_MATCHES}, size(ends) AS {END_MATCHES}",
        start_pattern = start.pattern,
        end_pattern = end.pattern,
    );

    let params = BTreeMap::from([
        (START_PARAM.to_string(), start.value),
        (END_PARAM.to_string(), end.value),
    ]);

    Mutation {
        kind: MutationKind::CreateEdge {
            relationship,
            start: start.descriptor,
            end: end.descriptor,
        },
        query,
        params,
    }
}

/// Classify the match counts an edge mutation returned. The start side is checked first.
pub fn check_endpoint_matches(
    kind: &MutationKind,
    start_matches: i64,
    end_matches: i64,
) -> Result<()> {
    let (start, end) = match kind {
        MutationKind::CreateEdge { start, end, .. } => (start, end),
        MutationKind::CreateNode { .. } => return Ok(()),
    };
    let sides = [("start", start, start_matches), ("end", end, end_matches)];
    for (side, descriptor, matches) in sides {
        match matches {
            1 => {}
            0 => {
                return Err(LoadError::EndpointNotFound {
                    side,
                    descriptor: descriptor.clone(),
                })
            }
            n => {
                return Err(LoadError::EndpointAmbiguous {
                    side,
                    descriptor: descriptor.clone(),
                    matches: n,
                })
            }
        }
    }
    Ok(())
}

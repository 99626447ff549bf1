use crate::source::CsvDialect;
use neo4rs::BoltType;
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Primitive types a CSV field can be cast to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataType {
    Int,
    Float,
    Bool,
    #[default]
    String,
}

impl DataType {
    /// Unrecognized names fall back to `String`, which passes the raw field through.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "int" | "integer" => DataType::Int,
            "float" | "double" => DataType::Float,
            "bool" | "boolean" => DataType::Bool,
            _ => DataType::String,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DataType::Int => "int",
            DataType::Float => "float",
            DataType::Bool => "bool",
            DataType::String => "string",
        }
    }
}

impl<'de> Deserialize<'de> for DataType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(DataType::from_name(&name))
    }
}

/// A field after casting.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TypedValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
}

impl From<TypedValue> for BoltType {
    fn from(value: TypedValue) -> Self {
        match value {
            TypedValue::Int(i) => i.into(),
            TypedValue::Float(f) => f.into(),
            TypedValue::Bool(b) => b.into(),
            TypedValue::String(s) => s.into(),
        }
    }
}

/// A reference to a row field: a position for raw rows, a header name for keyed rows.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Column {
    Index(usize),
    Name(String),
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Column::Index(i) => write!(f, "{i}"),
            Column::Name(name) => write!(f, "\"{name}\""),
        }
    }
}

impl<'de> Deserialize<'de> for Column {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ColumnVisitor;

        impl de::Visitor<'_> for ColumnVisitor {
            type Value = Column;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a column index or a header name")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Column, E> {
                usize::try_from(v)
                    .map(Column::Index)
                    .map_err(|_| E::custom(format!("column index {v} is out of range")))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Column, E> {
                usize::try_from(v)
                    .map(Column::Index)
                    .map_err(|_| E::custom(format!("column index {v} must not be negative")))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Column, E> {
                if v.is_empty() {
                    return Err(E::custom("column name must not be empty"));
                }
                Ok(Column::Name(v.to_string()))
            }
        }

        deserializer.deserialize_any(ColumnVisitor)
    }
}

/// One `source column -> target property` entry of a node job.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyEntry {
    pub column: Column,
    pub property: String,
    pub data_type: DataType,
}

impl PropertyEntry {
    pub fn new(column: Column, property: impl Into<String>, data_type: DataType) -> Self {
        Self {
            column,
            property: property.into(),
            data_type,
        }
    }
}

pub type PropertyMapping = Vec<PropertyEntry>;

#[derive(Debug, Clone)]
pub struct NodeImportJob {
    pub label: String,
    pub file: PathBuf,
    pub properties: PropertyMapping,
    pub dialect: CsvDialect,
}

impl NodeImportJob {
    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.properties.iter().map(|e| &e.column)
    }
}

/// Where an edge's relationship type comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationshipType {
    /// Fixed when the job is configured.
    Literal(String),
    /// Read from this column of every row.
    Column(Column),
}

/// How an edge job locates its two endpoints.
#[derive(Debug, Clone, PartialEq)]
pub enum EndpointSpec {
    /// `(:Label {id_property: value})` on each side.
    ByLabelAndProperty {
        start_label: String,
        end_label: String,
        start_column: Column,
        end_column: Column,
        relationship: RelationshipType,
        id_property: String,
        id_type: DataType,
    },
    /// The store's own node identity, label ignored.
    ByInternalIdentity {
        start_column: Column,
        end_column: Column,
        relationship: String,
    },
    /// A named property on each side, no label constraint, relationship type per row.
    ByArbitraryProperty {
        start_property: String,
        end_property: String,
        start_column: Column,
        end_column: Column,
        relationship_column: Column,
        id_type: DataType,
    },
}

impl EndpointSpec {
    pub fn strategy_name(&self) -> &'static str {
        match self {
            EndpointSpec::ByLabelAndProperty { .. } => "by_label_and_property",
            EndpointSpec::ByInternalIdentity { .. } => "by_internal_identity",
            EndpointSpec::ByArbitraryProperty { .. } => "by_arbitrary_property",
        }
    }

    /// Every column a row must carry for this strategy.
    pub fn columns(&self) -> Vec<&Column> {
        match self {
            EndpointSpec::ByLabelAndProperty {
                start_column,
                end_column,
                relationship,
                ..
            } => {
                let mut cols = vec![start_column, end_column];
                if let RelationshipType::Column(c) = relationship {
                    cols.push(c);
                }
                cols
            }
            EndpointSpec::ByInternalIdentity {
                start_column,
                end_column,
                ..
            } => vec![start_column, end_column],
            EndpointSpec::ByArbitraryProperty {
                start_column,
                end_column,
                relationship_column,
                ..
            } => vec![start_column, end_column, relationship_column],
        }
    }
}

#[derive(Debug, Clone)]
pub struct EdgeImportJob {
    pub file: PathBuf,
    pub endpoints: EndpointSpec,
    pub dialect: CsvDialect,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_type_names() {
        assert_eq!(DataType::from_name("int"), DataType::Int);
        assert_eq!(DataType::from_name("Integer"), DataType::Int);
        assert_eq!(DataType::from_name("float"), DataType::Float);
        assert_eq!(DataType::from_name("BOOL"), DataType::Bool);
        assert_eq!(DataType::from_name("string"), DataType::String);
        assert_eq!(DataType::from_name("date"), DataType::String);
    }

    #[test]
    fn column_deserializes_from_index_or_name() {
        let idx: Column = serde_yaml::from_str("3").unwrap();
        assert_eq!(idx, Column::Index(3));
        let name: Column = serde_yaml::from_str("person_id").unwrap();
        assert_eq!(name, Column::Name("person_id".into()));
        assert!(serde_yaml::from_str::<Column>("-1").is_err());
    }

    #[test]
    fn column_display() {
        assert_eq!(Column::Index(2).to_string(), "2");
        assert_eq!(Column::Name("age".into()).to_string(), "\"age\"");
    }

    #[test]
    fn typed_value_serializes_untagged() {
        let json = serde_json::to_string(&vec![
            TypedValue::Int(30),
            TypedValue::Bool(true),
            TypedValue::String("Alice".into()),
        ])
        .unwrap();
        assert_eq!(json, r#"[30,true,"Alice"]"#);
    }

    #[test]
    fn endpoint_columns_include_relationship_column() {
        let spec = EndpointSpec::ByArbitraryProperty {
            start_property: "start_label".into(),
            end_property: "end_label".into(),
            start_column: Column::Index(0),
            end_column: Column::Index(1),
            relationship_column: Column::Index(2),
            id_type: DataType::String,
        };
        assert_eq!(spec.columns().len(), 3);

        let spec = EndpointSpec::ByInternalIdentity {
            start_column: Column::Index(0),
            end_column: Column::Index(1),
            relationship: "KNOWS".into(),
        };
        assert_eq!(spec.columns().len(), 2);
    }
}

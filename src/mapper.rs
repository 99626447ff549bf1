use crate::cast::cast;
use crate::error::{LoadError, Result};
use crate::models::{Column, PropertyEntry, TypedValue};
use crate::source::Row;
use std::collections::BTreeMap;

/// Property name to typed value, ordered by name so generated queries are stable.
pub type Properties = BTreeMap<String, TypedValue>;

/// Map one row through a property mapping.
///
/// Errors name the entry that failed: a missing column is `ColumnIndex`, a failed cast is
/// `InvalidValue` with the column and target property filled in.
pub fn map_row(row: &Row, mapping: &[PropertyEntry]) -> Result<Properties> {
    let mut properties = Properties::new();
    for entry in mapping {
        let raw = row.get(&entry.column).ok_or_else(|| {
            missing_column(row, &entry.column, format!("property '{}'", entry.property))
        })?;
        let value = cast(raw, entry.data_type).map_err(|e| match e {
            LoadError::InvalidValue { raw, kind, .. } => LoadError::InvalidValue {
                raw,
                kind,
                column: entry.column.to_string(),
                property: entry.property.clone(),
            },
            other => other,
        })?;
        properties.insert(entry.property.clone(), value);
    }
    Ok(properties)
}

/// Fetch a field, failing with `ColumnIndex` when the row does not carry it. `role` says
/// what the field was needed for.
pub fn field<'r>(row: &'r Row, column: &Column, role: &str) -> Result<&'r str> {
    row.get(column)
        .ok_or_else(|| missing_column(row, column, role.to_string()))
}

fn missing_column(row: &Row, column: &Column, role: String) -> LoadError {
    LoadError::ColumnIndex {
        column: column.to_string(),
        role,
        row_len: row.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DataType;
    use std::collections::{BTreeSet, HashMap};

    fn row(fields: &[&str]) -> Row {
        Row::Positional(fields.iter().map(|s| s.to_string()).collect())
    }

    fn person_mapping() -> Vec<PropertyEntry> {
        vec![
            PropertyEntry::new(Column::Index(1), "name", DataType::String),
            PropertyEntry::new(Column::Index(2), "age", DataType::Int),
        ]
    }

    #[test]
    fn maps_and_casts_fields() {
        let props = map_row(&row(&["1", "Alice", "30"]), &person_mapping()).unwrap();
        assert_eq!(props["name"], TypedValue::String("Alice".into()));
        assert_eq!(props["age"], TypedValue::Int(30));
    }

    #[test]
    fn key_set_equals_declared_targets() {
        let mapping = vec![
            PropertyEntry::new(Column::Index(0), "id", DataType::Int),
            PropertyEntry::new(Column::Index(1), "name", DataType::String),
            PropertyEntry::new(Column::Index(2), "score", DataType::Float),
            PropertyEntry::new(Column::Index(3), "active", DataType::Bool),
        ];
        let props = map_row(&row(&["1", "Alice", "9.5", "yes", "ignored"]), &mapping).unwrap();
        let keys: BTreeSet<&str> = props.keys().map(String::as_str).collect();
        let declared: BTreeSet<&str> = mapping.iter().map(|e| e.property.as_str()).collect();
        assert_eq!(keys, declared);
    }

    #[test]
    fn missing_column_reports_entry() {
        let err = map_row(&row(&["1", "Alice"]), &person_mapping()).unwrap_err();
        match err {
            LoadError::ColumnIndex {
                column,
                role,
                row_len,
            } => {
                assert_eq!(column, "2");
                assert_eq!(role, "property 'age'");
                assert_eq!(row_len, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bad_cast_reports_entry() {
        let err = map_row(&row(&["1", "Alice", "thirty"]), &person_mapping()).unwrap_err();
        match err {
            LoadError::InvalidValue {
                raw,
                kind,
                column,
                property,
            } => {
                assert_eq!(raw, "thirty");
                assert_eq!(kind, "int");
                assert_eq!(column, "2");
                assert_eq!(property, "age");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn maps_keyed_rows() {
        let row = Row::Keyed(HashMap::from([
            ("name".to_string(), "Dana".to_string()),
            ("age".to_string(), "41".to_string()),
        ]));
        let mapping = vec![
            PropertyEntry::new(Column::Name("name".into()), "name", DataType::String),
            PropertyEntry::new(Column::Name("age".into()), "age", DataType::Int),
        ];
        let props = map_row(&row, &mapping).unwrap();
        assert_eq!(props["age"], TypedValue::Int(41));
    }

    #[test]
    fn entry_order_does_not_matter() {
        let mut reversed = person_mapping();
        reversed.reverse();
        let r = row(&["1", "Alice", "30"]);
        assert_eq!(
            map_row(&r, &person_mapping()).unwrap(),
            map_row(&r, &reversed).unwrap()
        );
    }
}

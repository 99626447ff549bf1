use crate::config::RESERVED_ID_KEY;
use crate::error::{LoadError, Result};
use crate::identifier;
use crate::mapper::Properties;
use crate::models::TypedValue;
use neo4rs::{query, Query};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MutationKind {
    CreateNode {
        label: String,
    },
    /// `start`/`end` describe the lookups, for error messages only.
    CreateEdge {
        relationship: String,
        start: String,
        end: String,
    },
}

/// A single write: Cypher text plus bound parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mutation {
    #[serde(flatten)]
    pub kind: MutationKind,
    pub query: String,
    pub params: BTreeMap<String, TypedValue>,
}

impl Mutation {
    pub fn to_query(&self) -> Query {
        self.params
            .iter()
            .fold(query(&self.query), |q, (key, value)| {
                q.param(key, value.clone())
            })
    }

    pub fn is_edge(&self) -> bool {
        matches!(self.kind, MutationKind::CreateEdge { .. })
    }
}

/// Builds `CREATE` mutations for one label. Every node gets a fresh v4 UUID under
/// [`RESERVED_ID_KEY`]; nothing is merged, so duplicate rows yield duplicate nodes.
///
/// The identifier is generated by the loader with `Uuid::new_v4` and bound as `$uuid`; the
/// store does not generate it, so no server-side plugin such as APOC is needed.
#[derive(Debug, Clone)]
pub struct NodeMutationBuilder {
    label: String,
}

impl NodeMutationBuilder {
    pub fn new(label: &str) -> Result<Self> {
        identifier::validate("label", label)?;
        Ok(Self {
            label: label.to_string(),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn build(&self, properties: Properties) -> Result<Mutation> {
        self.build_with_id(properties, Uuid::new_v4().to_string())
    }

    fn build_with_id(&self, mut properties: Properties, id: String) -> Result<Mutation> {
        if properties.contains_key(RESERVED_ID_KEY) {
            return Err(LoadError::PropertyCollision(RESERVED_ID_KEY.to_string()));
        }
        for name in properties.keys() {
            identifier::validate("property", name)?;
        }
        properties.insert(RESERVED_ID_KEY.to_string(), TypedValue::String(id));

        let assignments = properties
            .keys()
            .map(|k| format!("{k}: ${k}"))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(Mutation {
            kind: MutationKind::CreateNode {
                label: self.label.clone(),
            },
            query: format!("CREATE (n:`{}` {{{assignments}}})", self.label),
            params: properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Properties {
        Properties::from([
            ("name".to_string(), TypedValue::String("Alice".into())),
            ("age".to_string(), TypedValue::Int(30)),
        ])
    }

    #[test]
    fn builds_create_query_with_uuid() {
        let builder = NodeMutationBuilder::new("Person").unwrap();
        let m = builder.build(alice()).unwrap();

        assert_eq!(
            m.query,
            "CREATE (n:`Person` {age: $age, name: $name, uuid: $uuid})"
        );
        assert_eq!(m.params["name"], TypedValue::String("Alice".into()));
        assert_eq!(m.params["age"], TypedValue::Int(30));
        match &m.params[RESERVED_ID_KEY] {
            TypedValue::String(id) => assert!(Uuid::parse_str(id).is_ok()),
            other => panic!("uuid should be a string, got {other:?}"),
        }
        assert!(!m.is_edge());
    }

    #[test]
    fn uuid_generated_per_node_by_loader() {
        let builder = NodeMutationBuilder::new("Person").unwrap();
        let a = builder.build(alice()).unwrap();
        let b = builder.build(alice()).unwrap();
        assert_ne!(a.params[RESERVED_ID_KEY], b.params[RESERVED_ID_KEY]);
        assert!(!a.query.contains("apoc"));
    }

    #[test]
    fn empty_properties_still_get_uuid() {
        let builder = NodeMutationBuilder::new("Tag").unwrap();
        let m = builder.build(Properties::new()).unwrap();
        assert_eq!(m.query, "CREATE (n:`Tag` {uuid: $uuid})");
        assert_eq!(m.params.len(), 1);
    }

    #[test]
    fn identifiers_are_unique_per_node() {
        let builder = NodeMutationBuilder::new("Person").unwrap();
        let a = builder.build(alice()).unwrap();
        let b = builder.build(alice()).unwrap();
        assert_ne!(a.params[RESERVED_ID_KEY], b.params[RESERVED_ID_KEY]);
    }

    #[test]
    fn reserved_key_collides() {
        let builder = NodeMutationBuilder::new("Person").unwrap();
        let mut props = alice();
        props.insert("uuid".into(), TypedValue::String("mine".into()));
        let err = builder.build(props).unwrap_err();
        assert!(matches!(err, LoadError::PropertyCollision(ref k) if k == "uuid"));
    }

    #[test]
    fn rejects_unsafe_label_and_property() {
        assert!(NodeMutationBuilder::new("Person`) DELETE (x").is_err());

        let builder = NodeMutationBuilder::new("Person").unwrap();
        let props = Properties::from([("na me".to_string(), TypedValue::Int(1))]);
        assert!(matches!(
            builder.build(props),
            Err(LoadError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn explicit_id_is_bound_as_parameter() {
        let builder = NodeMutationBuilder::new("Person").unwrap();
        let m = builder.build_with_id(alice(), "fixed".into()).unwrap();
        assert_eq!(m.params[RESERVED_ID_KEY], TypedValue::String("fixed".into()));
        assert!(!m.query.contains("fixed"));
    }
}

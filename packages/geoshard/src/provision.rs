//! Secondary index provisioning.
//!
//! Each partitioned collection carries the indexes the query layer
//! needs before bulk data arrives: a geospatial index on the location
//! field, an explicit ascending index on the partition key (redundant
//! with the automatic shard-key index, kept for query-planner
//! clarity), and ascending indexes on any foreign-key fields.
//!
//! Creation is idempotent through `ControlPlane::create_index`: an
//! identical spec already present is left untouched; the same name
//! with a different key specification is a `Conflict`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Index key direction / type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Ascending,
    Geo2dSphere,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKind::Ascending => write!(f, "1"),
            IndexKind::Geo2dSphere => write!(f, "2dsphere"),
        }
    }
}

/// One field in an index key specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexKey {
    pub field: String,
    pub kind: IndexKind,
}

/// A named secondary index specification.
///
/// Identity is the name; two specs with the same name and the same
/// keys are the same index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub keys: Vec<IndexKey>,
}

impl IndexSpec {
    /// Single-field ascending index, named `<field>_1`.
    pub fn ascending(field: &str) -> Self {
        Self {
            name: format!("{}_1", field),
            keys: vec![IndexKey {
                field: field.to_string(),
                kind: IndexKind::Ascending,
            }],
        }
    }

    /// Single-field geospatial index, named `<field>_2dsphere`.
    pub fn geo_2dsphere(field: &str) -> Self {
        Self {
            name: format!("{}_2dsphere", field),
            keys: vec![IndexKey {
                field: field.to_string(),
                kind: IndexKind::Geo2dSphere,
            }],
        }
    }

    /// Render the key spec for conflict messages, e.g. `{location: 2dsphere}`.
    pub fn render_keys(&self) -> String {
        let keys: Vec<String> = self
            .keys
            .iter()
            .map(|k| format!("{}: {}", k.field, k.kind))
            .collect();
        format!("{{{}}}", keys.join(", "))
    }
}

/// The standard index set for one partitioned collection: optional
/// location geo index, the explicit partition-key index, and one
/// ascending index per foreign-key field.
pub fn standard_indexes(
    shard_key: &str,
    location_field: Option<&str>,
    foreign_keys: &[String],
) -> Vec<IndexSpec> {
    let mut specs = Vec::new();
    if let Some(loc) = location_field {
        specs.push(IndexSpec::geo_2dsphere(loc));
    }
    specs.push(IndexSpec::ascending(shard_key));
    for fk in foreign_keys {
        specs.push(IndexSpec::ascending(fk));
    }
    specs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_set_for_review_like_collection() {
        let specs = standard_indexes(
            "state",
            Some("location"),
            &["business_id".to_string(), "user_id".to_string()],
        );
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["location_2dsphere", "state_1", "business_id_1", "user_id_1"]
        );
        assert_eq!(specs[0].keys[0].kind, IndexKind::Geo2dSphere);
    }

    #[test]
    fn standard_set_without_location_or_foreign_keys() {
        let specs = standard_indexes("state", None, &[]);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0], IndexSpec::ascending("state"));
    }

    #[test]
    fn render_keys_is_readable() {
        assert_eq!(
            IndexSpec::geo_2dsphere("location").render_keys(),
            "{location: 2dsphere}"
        );
        assert_eq!(IndexSpec::ascending("user_id").render_keys(), "{user_id: 1}");
    }
}

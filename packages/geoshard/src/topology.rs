//! Desired-state topology model.
//!
//! In-memory graph of shards, zones, partitioned collections, tag
//! ranges, and secondary index specs. This is the source of truth the
//! validator and reconciler operate on; constructing it never touches
//! the cluster.
//!
//! Each add operation performs local structural checks (duplicate
//! shard id, unknown zone reference, malformed range) and fails fast,
//! so error attribution points at the call that introduced the
//! problem rather than a later validation pass.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TopologyError};
use crate::provision::IndexSpec;
use crate::range::{self, key_below, KeyBound};

// ── Entities ───────────────────────────────────────────────────────

/// One shard: an independently replicated partition of the dataset.
/// Immutable once added; the seed is the backing replica-set
/// connection string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    pub id: String,
    pub seed: String,
}

/// Named grouping of one or more shards, used as the target of
/// key-range assignment. The model allows a zone to span multiple
/// shards even though the reference topology is 1:1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    pub shards: Vec<String>,
}

/// A collection partitioned on a single shard-key field. The key is
/// fixed once the collection is first partitioned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionedCollection {
    pub namespace: String,
    pub shard_key: String,
}

/// The atomic unit of placement: a half-open key interval
/// `[min, max)` on a collection's shard key, bound to exactly one
/// zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRange {
    pub namespace: String,
    pub shard_key: String,
    pub min: String,
    pub max: KeyBound,
    pub zone: String,
}

impl TagRange {
    /// Whether a shard-key value falls inside this range.
    pub fn contains(&self, key: &str) -> bool {
        key >= self.min.as_str() && key_below(key, &self.max)
    }

    /// Whether two ranges on the same collection overlap.
    pub fn overlaps(&self, other: &TagRange) -> bool {
        self.namespace == other.namespace
            && key_below(&self.min, &other.max)
            && key_below(&other.min, &self.max)
    }
}

impl fmt::Display for TagRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [\"{}\", {}) -> {}",
            self.namespace, self.min, self.max, self.zone
        )
    }
}

// ── Topology ───────────────────────────────────────────────────────

/// Full desired-state graph for one sharded database.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    database: String,
    shards: Vec<Shard>,
    zones: Vec<Zone>,
    collections: Vec<PartitionedCollection>,
    ranges: Vec<TagRange>,
    indexes: Vec<(String, IndexSpec)>,
}

impl Topology {
    pub fn new(database: &str) -> Self {
        Self {
            database: database.to_string(),
            ..Default::default()
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn shards(&self) -> &[Shard] {
        &self.shards
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn zone(&self, name: &str) -> Option<&Zone> {
        self.zones.iter().find(|z| z.name == name)
    }

    pub fn shard(&self, id: &str) -> Option<&Shard> {
        self.shards.iter().find(|s| s.id == id)
    }

    pub fn collections(&self) -> &[PartitionedCollection] {
        &self.collections
    }

    pub fn collection(&self, namespace: &str) -> Option<&PartitionedCollection> {
        self.collections.iter().find(|c| c.namespace == namespace)
    }

    pub fn ranges(&self) -> &[TagRange] {
        &self.ranges
    }

    /// Index specs as `(namespace, spec)` pairs, in registration order.
    pub fn indexes(&self) -> &[(String, IndexSpec)] {
        &self.indexes
    }

    /// Register a shard. Fails on a duplicate id.
    pub fn add_shard(&mut self, id: &str, seed: &str) -> Result<()> {
        if self.shard(id).is_some() {
            return Err(TopologyError::DuplicateShard(id.to_string()));
        }
        self.shards.push(Shard {
            id: id.to_string(),
            seed: seed.to_string(),
        });
        Ok(())
    }

    /// Register a zone over already-declared shards. Fails on a
    /// duplicate name or an unknown shard id.
    pub fn add_zone(&mut self, name: &str, shard_ids: &[&str]) -> Result<()> {
        if self.zone(name).is_some() {
            return Err(TopologyError::DuplicateZone(name.to_string()));
        }
        let mut shards = Vec::new();
        for id in shard_ids {
            if self.shard(id).is_none() {
                return Err(TopologyError::UnknownShard {
                    zone: name.to_string(),
                    shard: id.to_string(),
                });
            }
            if !shards.contains(&id.to_string()) {
                shards.push(id.to_string());
            }
        }
        self.zones.push(Zone {
            name: name.to_string(),
            shards,
        });
        Ok(())
    }

    /// Declare a collection partitioned on `shard_key`. The namespace
    /// must be `<database>.<collection>` for this topology's database.
    pub fn define_partitioned_collection(
        &mut self,
        namespace: &str,
        shard_key: &str,
    ) -> Result<()> {
        let prefix = format!("{}.", self.database);
        if !namespace.starts_with(&prefix) || namespace.len() == prefix.len() {
            return Err(TopologyError::InvalidNamespace(namespace.to_string()));
        }
        if self.collection(namespace).is_some() {
            return Err(TopologyError::DuplicateCollection(namespace.to_string()));
        }
        self.collections.push(PartitionedCollection {
            namespace: namespace.to_string(),
            shard_key: shard_key.to_string(),
        });
        Ok(())
    }

    /// Bind the half-open range `[min, max)` on `namespace` to `zone`.
    ///
    /// Checks that the zone and collection exist and that
    /// `min < max`; overlap against other ranges is left to the
    /// validator so that all violations can be reported together.
    pub fn add_tag_range(
        &mut self,
        namespace: &str,
        zone: &str,
        min: &str,
        max: KeyBound,
    ) -> Result<()> {
        if self.zone(zone).is_none() {
            return Err(TopologyError::UnknownZone(zone.to_string()));
        }
        let collection = self
            .collection(namespace)
            .ok_or_else(|| TopologyError::UnknownCollection(namespace.to_string()))?;
        if !key_below(min, &max) {
            return Err(TopologyError::InvalidRange {
                min: min.to_string(),
                max: max.to_string(),
            });
        }
        self.ranges.push(TagRange {
            namespace: namespace.to_string(),
            shard_key: collection.shard_key.clone(),
            min: min.to_string(),
            max,
            zone: zone.to_string(),
        });
        Ok(())
    }

    /// Bind the computed region bucket `[code, successor(code))` on
    /// `namespace` to `zone`.
    pub fn add_region_range(&mut self, namespace: &str, zone: &str, code: &str) -> Result<()> {
        let (min, max) = range::region_range(code)?;
        self.add_tag_range(namespace, zone, &min, max)
    }

    /// Register a secondary index on a declared collection.
    ///
    /// An identical spec already registered is a no-op; the same name
    /// with different keys is a `Conflict`.
    pub fn add_index(&mut self, namespace: &str, spec: IndexSpec) -> Result<()> {
        if self.collection(namespace).is_none() {
            return Err(TopologyError::UnknownCollection(namespace.to_string()));
        }
        if let Some((_, existing)) = self
            .indexes
            .iter()
            .find(|(ns, s)| ns == namespace && s.name == spec.name)
        {
            if existing.keys == spec.keys {
                return Ok(());
            }
            return Err(TopologyError::Conflict {
                what: format!("index '{}' on {}", spec.name, namespace),
                desired: spec.render_keys(),
                existing: existing.render_keys(),
            });
        }
        self.indexes.push((namespace.to_string(), spec));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provision::IndexSpec;

    fn base() -> Topology {
        let mut t = Topology::new("appdb");
        t.add_shard("rs-a", "rs-a/a1:27017").unwrap();
        t.add_shard("rs-b", "rs-b/b1:27017").unwrap();
        t.add_zone("WEST", &["rs-a"]).unwrap();
        t.define_partitioned_collection("appdb.docs", "state").unwrap();
        t
    }

    #[test]
    fn duplicate_shard_rejected() {
        let mut t = base();
        assert!(matches!(
            t.add_shard("rs-a", "rs-a/other:27017"),
            Err(TopologyError::DuplicateShard(_))
        ));
    }

    #[test]
    fn zone_over_unknown_shard_rejected() {
        let mut t = base();
        let err = t.add_zone("EAST", &["rs-x"]).unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_SHARD");
    }

    #[test]
    fn zone_may_span_multiple_shards() {
        let mut t = base();
        t.add_zone("WIDE", &["rs-a", "rs-b"]).unwrap();
        assert_eq!(t.zone("WIDE").unwrap().shards.len(), 2);
    }

    #[test]
    fn namespace_must_match_database() {
        let mut t = base();
        assert!(matches!(
            t.define_partitioned_collection("otherdb.docs", "state"),
            Err(TopologyError::InvalidNamespace(_))
        ));
        assert!(matches!(
            t.define_partitioned_collection("appdb.", "state"),
            Err(TopologyError::InvalidNamespace(_))
        ));
    }

    #[test]
    fn range_requires_known_zone_and_collection() {
        let mut t = base();
        assert!(matches!(
            t.add_region_range("appdb.docs", "NOPE", "CA"),
            Err(TopologyError::UnknownZone(_))
        ));
        assert!(matches!(
            t.add_region_range("appdb.missing", "WEST", "CA"),
            Err(TopologyError::UnknownCollection(_))
        ));
    }

    #[test]
    fn inverted_range_rejected() {
        let mut t = base();
        let err = t
            .add_tag_range("appdb.docs", "WEST", "CB", KeyBound::Value("CA".into()))
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_RANGE");
    }

    #[test]
    fn region_bucket_contains_exactly_its_prefix() {
        let mut t = base();
        t.add_region_range("appdb.docs", "WEST", "CA").unwrap();
        let r = &t.ranges()[0];
        assert_eq!(r.min, "CA");
        assert_eq!(r.max, KeyBound::Value("CB".into()));
        assert!(r.contains("CA"));
        assert!(r.contains("CA-anything"));
        assert!(!r.contains("CB"));
        assert!(!r.contains("BZ"));
    }

    #[test]
    fn overlap_detection_is_symmetric() {
        let mut t = base();
        t.add_zone("EAST", &["rs-b"]).unwrap();
        t.add_tag_range("appdb.docs", "WEST", "AZ", KeyBound::Value("BA".into()))
            .unwrap();
        t.add_tag_range("appdb.docs", "EAST", "AZ", KeyBound::Value("AZZ".into()))
            .unwrap();
        let (a, b) = (&t.ranges()[0], &t.ranges()[1]);
        assert!(a.overlaps(b));
        assert!(b.overlaps(a));
    }

    #[test]
    fn identical_index_is_noop_different_spec_conflicts() {
        let mut t = base();
        t.add_index("appdb.docs", IndexSpec::ascending("state")).unwrap();
        t.add_index("appdb.docs", IndexSpec::ascending("state")).unwrap();
        assert_eq!(t.indexes().len(), 1);

        let clash = IndexSpec {
            name: "state_1".to_string(),
            keys: IndexSpec::geo_2dsphere("state").keys,
        };
        assert_eq!(t.add_index("appdb.docs", clash).unwrap_err().code(), "CONFLICT");
    }
}

//! Declarative topology configuration.
//!
//! A [`TopologySpec`] is the JSON file an operator edits: database,
//! shards, zones with their region codes, collections with their index
//! fields, and the coverage policy. `build()` expands it into a
//! [`Topology`] with computed region ranges; nothing here touches the
//! cluster.
//!
//! [`TopologySpec::reference`] is the five-region US topology this
//! system was built for: PACIFIC / MOUNTAIN / CENTRAL / EASTERN over
//! four regional shards plus an OTHER zone catching Canadian provinces
//! and Hawaii. Region ranges are computed, never hand-typed, so the
//! carry case is the Range Builder's policy rather than a literal.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::provision;
use crate::topology::Topology;
use crate::validate::CoveragePolicy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardSpec {
    pub id: String,
    pub seed: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneSpec {
    pub name: String,
    pub shards: Vec<String>,
    /// Two-letter region codes whose key buckets this zone owns.
    pub regions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSpec {
    pub namespace: String,
    pub shard_key: String,
    #[serde(default)]
    pub location_field: Option<String>,
    #[serde(default)]
    pub foreign_keys: Vec<String>,
}

/// Operator-facing declarative topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologySpec {
    pub database: String,
    pub shards: Vec<ShardSpec>,
    pub zones: Vec<ZoneSpec>,
    pub collections: Vec<CollectionSpec>,
    #[serde(default)]
    pub coverage: CoveragePolicy,
}

impl TopologySpec {
    /// Read a spec from a JSON file.
    pub fn read_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let spec: Self = serde_json::from_str(&contents)?;
        Ok(spec)
    }

    /// Write this topology as pretty JSON.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Expand into a full desired-state [`Topology`]: every zone's
    /// region codes become computed tag ranges on every collection,
    /// and each collection gets its standard index set.
    pub fn build(&self) -> Result<Topology> {
        let mut topology = Topology::new(&self.database);
        for shard in &self.shards {
            topology.add_shard(&shard.id, &shard.seed)?;
        }
        for zone in &self.zones {
            let ids: Vec<&str> = zone.shards.iter().map(String::as_str).collect();
            topology.add_zone(&zone.name, &ids)?;
        }
        for collection in &self.collections {
            topology.define_partitioned_collection(&collection.namespace, &collection.shard_key)?;
        }
        for collection in &self.collections {
            for zone in &self.zones {
                for code in &zone.regions {
                    topology.add_region_range(&collection.namespace, &zone.name, code)?;
                }
            }
        }
        for collection in &self.collections {
            for spec in provision::standard_indexes(
                &collection.shard_key,
                collection.location_field.as_deref(),
                &collection.foreign_keys,
            ) {
                topology.add_index(&collection.namespace, spec)?;
            }
        }
        Ok(topology)
    }

    /// The built-in five-region reference topology.
    pub fn reference() -> Self {
        let shard = |letter: &str| ShardSpec {
            id: format!("rs-shard-{}", letter),
            seed: format!(
                "rs-shard-{l}/mongo-shard-{l}-1:27017,mongo-shard-{l}-2:27017,mongo-shard-{l}-3:27017",
                l = letter
            ),
        };
        let zone = |name: &str, shard_letter: &str, regions: &[&str]| ZoneSpec {
            name: name.to_string(),
            shards: vec![format!("rs-shard-{}", shard_letter)],
            regions: regions.iter().map(|r| r.to_string()).collect(),
        };
        Self {
            database: "yelp_data".to_string(),
            shards: vec![shard("a"), shard("b"), shard("c"), shard("d"), shard("e")],
            zones: vec![
                zone("PACIFIC", "a", &["CA", "NV", "OR", "WA"]),
                zone("MOUNTAIN", "b", &["AZ", "CO", "ID", "MT", "NM", "UT", "WY"]),
                zone("CENTRAL", "c", &["IL", "IN", "LA", "MO", "TN", "TX"]),
                zone(
                    "EASTERN",
                    "d",
                    &["DE", "FL", "GA", "MA", "NC", "NJ", "NY", "OH", "PA", "SC", "VA"],
                ),
                // Deliberate partial catch-all: Canadian provinces,
                // Wisconsin, and Hawaii route to the OTHER shard.
                zone("OTHER", "e", &["AB", "ON", "QC", "WI", "HI"]),
            ],
            collections: vec![
                CollectionSpec {
                    namespace: "yelp_data.businesses".to_string(),
                    shard_key: "state".to_string(),
                    location_field: Some("location".to_string()),
                    foreign_keys: vec![],
                },
                CollectionSpec {
                    namespace: "yelp_data.reviews".to_string(),
                    shard_key: "state".to_string(),
                    location_field: Some("location".to_string()),
                    foreign_keys: vec!["business_id".to_string(), "user_id".to_string()],
                },
            ],
            coverage: CoveragePolicy::Warn,
        }
    }
}

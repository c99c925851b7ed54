//! Control-plane implementations.
//!
//! [`InMemoryCluster`] backs tests and dry runs; [`FileCluster`]
//! persists its [`ClusterState`] as pretty JSON at a path so repeated
//! CLI runs observe durable metadata, the same way the engine persists
//! its database config file.
//!
//! Both enforce the per-operation idempotency contract server-side:
//! an exact duplicate succeeds without changing anything, a structural
//! mismatch is a `Conflict`. The reconciler diffs before executing,
//! but a concurrent external mutation can land in between, so the
//! contract cannot live only in the diff.
//!
//! Both also count mutating calls, which is what the idempotence
//! property tests assert on: re-converging an already-converged
//! cluster must leave the counter untouched.

use std::path::{Path, PathBuf};

use crate::error::{Result, TopologyError};
use crate::provision::IndexSpec;
use crate::range::KeyBound;
use crate::reconcile::{ClusterState, ControlPlane, RangeEntry, ShardState};

// Server-side admission contract, shared by both implementations.
impl ClusterState {
    fn admit_shard(&mut self, id: &str, seed: &str) -> Result<()> {
        match self.shards.get(id) {
            None => {
                self.shards.insert(
                    id.to_string(),
                    ShardState {
                        seed: seed.to_string(),
                        zones: Default::default(),
                    },
                );
                Ok(())
            }
            Some(state) if state.seed == seed => Ok(()),
            Some(state) => Err(TopologyError::Conflict {
                what: format!("shard '{}'", id),
                desired: seed.to_string(),
                existing: state.seed.clone(),
            }),
        }
    }

    fn admit_enable_sharding(&mut self, database: &str) -> Result<()> {
        self.sharded_databases.insert(database.to_string());
        Ok(())
    }

    fn admit_shard_tag(&mut self, shard_id: &str, zone: &str) -> Result<()> {
        let shard = self
            .shards
            .get_mut(shard_id)
            .ok_or_else(|| TopologyError::UnknownShard {
                zone: zone.to_string(),
                shard: shard_id.to_string(),
            })?;
        shard.zones.insert(zone.to_string());
        Ok(())
    }

    fn admit_shard_collection(&mut self, namespace: &str, shard_key: &str) -> Result<()> {
        let database = namespace.split('.').next().unwrap_or(namespace);
        if !self.sharded_databases.contains(database) {
            return Err(TopologyError::ShardingNotEnabled(database.to_string()));
        }
        match self.collections.get(namespace) {
            None => {
                self.collections
                    .insert(namespace.to_string(), shard_key.to_string());
                Ok(())
            }
            Some(key) if key == shard_key => Ok(()),
            Some(key) => Err(TopologyError::Conflict {
                what: format!("collection '{}' shard key", namespace),
                desired: shard_key.to_string(),
                existing: key.clone(),
            }),
        }
    }

    fn admit_tag_range(
        &mut self,
        namespace: &str,
        min: &str,
        max: &KeyBound,
        zone: &str,
    ) -> Result<()> {
        let entry = RangeEntry {
            namespace: namespace.to_string(),
            min: min.to_string(),
            max: max.clone(),
            zone: zone.to_string(),
        };
        if self.ranges.contains(&entry) {
            return Ok(());
        }
        let collides = self.ranges.iter().find(|e| {
            e.namespace == entry.namespace
                && crate::range::key_below(&e.min, &entry.max)
                && crate::range::key_below(&entry.min, &e.max)
        });
        if let Some(existing) = collides {
            return Err(TopologyError::Conflict {
                what: "tag range".to_string(),
                desired: entry.to_string(),
                existing: existing.to_string(),
            });
        }
        self.ranges.push(entry);
        Ok(())
    }

    fn admit_index(&mut self, namespace: &str, spec: &IndexSpec) -> Result<()> {
        let specs = self.indexes.entry(namespace.to_string()).or_default();
        match specs.iter().find(|s| s.name == spec.name) {
            None => {
                specs.push(spec.clone());
                Ok(())
            }
            Some(s) if s.keys == spec.keys => Ok(()),
            Some(s) => Err(TopologyError::Conflict {
                what: format!("index '{}' on {}", spec.name, namespace),
                desired: spec.render_keys(),
                existing: s.render_keys(),
            }),
        }
    }
}

// ── In-memory cluster ──────────────────────────────────────────────

/// Ephemeral cluster for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryCluster {
    state: ClusterState,
    mutating_calls: u64,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ClusterState {
        &self.state
    }

    /// Number of mutating control-plane calls issued so far.
    pub fn mutating_calls(&self) -> u64 {
        self.mutating_calls
    }
}

impl ControlPlane for InMemoryCluster {
    fn snapshot(&self) -> Result<ClusterState> {
        Ok(self.state.clone())
    }

    fn add_shard(&mut self, id: &str, seed: &str) -> Result<()> {
        self.mutating_calls += 1;
        self.state.admit_shard(id, seed)
    }

    fn enable_sharding(&mut self, database: &str) -> Result<()> {
        self.mutating_calls += 1;
        self.state.admit_enable_sharding(database)
    }

    fn add_shard_tag(&mut self, shard_id: &str, zone: &str) -> Result<()> {
        self.mutating_calls += 1;
        self.state.admit_shard_tag(shard_id, zone)
    }

    fn shard_collection(&mut self, namespace: &str, shard_key: &str) -> Result<()> {
        self.mutating_calls += 1;
        self.state.admit_shard_collection(namespace, shard_key)
    }

    fn add_tag_range(
        &mut self,
        namespace: &str,
        min: &str,
        max: &KeyBound,
        zone: &str,
    ) -> Result<()> {
        self.mutating_calls += 1;
        self.state.admit_tag_range(namespace, min, max, zone)
    }

    fn create_index(&mut self, namespace: &str, spec: &IndexSpec) -> Result<()> {
        self.mutating_calls += 1;
        self.state.admit_index(namespace, spec)
    }
}

// ── File-backed cluster ────────────────────────────────────────────

/// Cluster metadata persisted as pretty JSON at a path.
///
/// Loaded on open (an absent file is an empty cluster) and rewritten
/// after every successful mutation, so each recorded intent is durable
/// before the next operation runs.
#[derive(Debug)]
pub struct FileCluster {
    path: PathBuf,
    state: ClusterState,
    mutating_calls: u64,
}

impl FileCluster {
    pub fn open(path: &Path) -> Result<Self> {
        let state = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            serde_json::from_str(&contents)?
        } else {
            ClusterState::default()
        };
        Ok(Self {
            path: path.to_path_buf(),
            state,
            mutating_calls: 0,
        })
    }

    pub fn state(&self) -> &ClusterState {
        &self.state
    }

    pub fn mutating_calls(&self) -> u64 {
        self.mutating_calls
    }

    fn persist(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.state)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    fn mutate(&mut self, op: impl FnOnce(&mut ClusterState) -> Result<()>) -> Result<()> {
        self.mutating_calls += 1;
        op(&mut self.state)?;
        self.persist()
    }
}

impl ControlPlane for FileCluster {
    fn snapshot(&self) -> Result<ClusterState> {
        Ok(self.state.clone())
    }

    fn add_shard(&mut self, id: &str, seed: &str) -> Result<()> {
        self.mutate(|s| s.admit_shard(id, seed))
    }

    fn enable_sharding(&mut self, database: &str) -> Result<()> {
        self.mutate(|s| s.admit_enable_sharding(database))
    }

    fn add_shard_tag(&mut self, shard_id: &str, zone: &str) -> Result<()> {
        self.mutate(|s| s.admit_shard_tag(shard_id, zone))
    }

    fn shard_collection(&mut self, namespace: &str, shard_key: &str) -> Result<()> {
        self.mutate(|s| s.admit_shard_collection(namespace, shard_key))
    }

    fn add_tag_range(
        &mut self,
        namespace: &str,
        min: &str,
        max: &KeyBound,
        zone: &str,
    ) -> Result<()> {
        self.mutate(|s| s.admit_tag_range(namespace, min, max, zone))
    }

    fn create_index(&mut self, namespace: &str, spec: &IndexSpec) -> Result<()> {
        self.mutate(|s| s.admit_index(namespace, spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_shard_same_seed_is_noop() {
        let mut cluster = InMemoryCluster::new();
        cluster.add_shard("rs-a", "rs-a/a1:27017").unwrap();
        cluster.add_shard("rs-a", "rs-a/a1:27017").unwrap();
        assert_eq!(cluster.state().shards.len(), 1);
    }

    #[test]
    fn duplicate_shard_different_seed_conflicts() {
        let mut cluster = InMemoryCluster::new();
        cluster.add_shard("rs-a", "rs-a/a1:27017").unwrap();
        let err = cluster.add_shard("rs-a", "rs-a/other:27017").unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
    }

    #[test]
    fn shard_collection_requires_enabled_database() {
        let mut cluster = InMemoryCluster::new();
        let err = cluster.shard_collection("appdb.docs", "state").unwrap_err();
        assert_eq!(err.code(), "SHARDING_NOT_ENABLED");

        cluster.enable_sharding("appdb").unwrap();
        cluster.shard_collection("appdb.docs", "state").unwrap();
        // Same key again: no-op. Different key: conflict.
        cluster.shard_collection("appdb.docs", "state").unwrap();
        let err = cluster.shard_collection("appdb.docs", "city").unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
    }

    #[test]
    fn tagging_unknown_shard_fails() {
        let mut cluster = InMemoryCluster::new();
        let err = cluster.add_shard_tag("rs-x", "WEST").unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_SHARD");
    }

    #[test]
    fn identical_range_is_noop_overlapping_range_conflicts() {
        let mut cluster = InMemoryCluster::new();
        cluster.enable_sharding("appdb").unwrap();
        cluster.shard_collection("appdb.docs", "state").unwrap();

        let cb = KeyBound::Value("CB".to_string());
        cluster.add_tag_range("appdb.docs", "CA", &cb, "WEST").unwrap();
        cluster.add_tag_range("appdb.docs", "CA", &cb, "WEST").unwrap();
        assert_eq!(cluster.state().ranges.len(), 1);

        let caz = KeyBound::Value("CAZ".to_string());
        let err = cluster
            .add_tag_range("appdb.docs", "CA", &caz, "EAST")
            .unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
    }

    #[test]
    fn file_cluster_persists_across_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cluster.json");

        {
            let mut cluster = FileCluster::open(&path).unwrap();
            cluster.add_shard("rs-a", "rs-a/a1:27017").unwrap();
            cluster.enable_sharding("appdb").unwrap();
        }

        let cluster = FileCluster::open(&path).unwrap();
        assert!(cluster.state().shards.contains_key("rs-a"));
        assert!(cluster.state().sharded_databases.contains("appdb"));
        assert_eq!(cluster.mutating_calls(), 0);
    }
}

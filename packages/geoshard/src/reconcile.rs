//! Cluster reconciliation.
//!
//! Converges live cluster state to a validated desired topology using
//! only idempotent, order-sensitive control-plane operations:
//!
//! 1. add shards
//! 2. enable sharding on the target database
//! 3. tag shards with zones
//! 4. partition each collection on its shard key
//! 5. add tag ranges
//! 6. provision secondary indexes
//!
//! The reconciler snapshots actual state, diffs it against the desired
//! topology into an ordered [`Plan`], then executes the plan. A
//! cluster already converged diffs to an empty plan, so a re-run
//! issues zero mutating calls.
//!
//! Registering a tag range only records intent durably; the cluster's
//! background balancer migrates data chunks asynchronously on its own
//! schedule, and nothing here waits for that.
//!
//! Transient I/O failures are retried with bounded exponential
//! backoff. A `Conflict` is never retried and halts the run, leaving
//! whatever converged so far in place (every executed operation is
//! individually idempotent, so the run can be repeated after the
//! conflict is resolved).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TopologyError};
use crate::provision::IndexSpec;
use crate::range::KeyBound;
use crate::topology::{TagRange, Topology};

// ── Actual cluster state ───────────────────────────────────────────

/// A shard as the cluster sees it: its seed plus the zone tags
/// attached to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShardState {
    pub seed: String,
    #[serde(default)]
    pub zones: BTreeSet<String>,
}

/// A tag range as recorded in cluster metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeEntry {
    pub namespace: String,
    pub min: String,
    pub max: KeyBound,
    pub zone: String,
}

impl RangeEntry {
    fn matches(&self, range: &TagRange) -> bool {
        self.namespace == range.namespace
            && self.min == range.min
            && self.max == range.max
            && self.zone == range.zone
    }

    pub fn overlaps(&self, range: &TagRange) -> bool {
        self.namespace == range.namespace
            && crate::range::key_below(&self.min, &range.max)
            && crate::range::key_below(&range.min, &self.max)
    }
}

impl fmt::Display for RangeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [\"{}\", {}) -> {}",
            self.namespace, self.min, self.max, self.zone
        )
    }
}

/// Snapshot of the cluster's topology metadata.
///
/// This is the *actual* side of the diff; the [`Topology`] is the
/// desired side. Data placement (which chunks live where) is invisible
/// here on purpose: the balancer owns it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterState {
    #[serde(default)]
    pub shards: BTreeMap<String, ShardState>,
    #[serde(default)]
    pub sharded_databases: BTreeSet<String>,
    /// namespace -> shard key field
    #[serde(default)]
    pub collections: BTreeMap<String, String>,
    #[serde(default)]
    pub ranges: Vec<RangeEntry>,
    /// namespace -> index specs
    #[serde(default)]
    pub indexes: BTreeMap<String, Vec<IndexSpec>>,
}

// ── Control plane ──────────────────────────────────────────────────

/// Store-agnostic cluster control plane.
///
/// Implementations must enforce the idempotency contract server-side
/// (exact duplicate = success, structural mismatch = `Conflict`) even
/// though the reconciler diffs first: a concurrent external mutation
/// can land between snapshot and execute.
pub trait ControlPlane {
    /// Query the current topology metadata.
    fn snapshot(&self) -> Result<ClusterState>;

    fn add_shard(&mut self, id: &str, seed: &str) -> Result<()>;
    fn enable_sharding(&mut self, database: &str) -> Result<()>;
    fn add_shard_tag(&mut self, shard_id: &str, zone: &str) -> Result<()>;
    fn shard_collection(&mut self, namespace: &str, shard_key: &str) -> Result<()>;
    fn add_tag_range(
        &mut self,
        namespace: &str,
        min: &str,
        max: &KeyBound,
        zone: &str,
    ) -> Result<()>;
    fn create_index(&mut self, namespace: &str, spec: &IndexSpec) -> Result<()>;
}

// ── Plan ───────────────────────────────────────────────────────────

/// One mutating control-plane operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    AddShard { id: String, seed: String },
    EnableSharding { database: String },
    AddShardTag { shard_id: String, zone: String },
    ShardCollection { namespace: String, shard_key: String },
    AddTagRange { namespace: String, min: String, max: KeyBound, zone: String },
    CreateIndex { namespace: String, spec: IndexSpec },
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::AddShard { id, seed } => write!(f, "add shard {} ({})", id, seed),
            Op::EnableSharding { database } => write!(f, "enable sharding on {}", database),
            Op::AddShardTag { shard_id, zone } => write!(f, "tag shard {} -> {}", shard_id, zone),
            Op::ShardCollection { namespace, shard_key } => {
                write!(f, "shard {} on '{}'", namespace, shard_key)
            }
            Op::AddTagRange { namespace, min, max, zone } => {
                write!(f, "add range {} [\"{}\", {}) -> {}", namespace, min, max, zone)
            }
            Op::CreateIndex { namespace, spec } => {
                write!(f, "create index {} {} on {}", spec.name, spec.render_keys(), namespace)
            }
        }
    }
}

/// Ordered list of operations that converges actual to desired.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Plan {
    pub ops: Vec<Op>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ops.is_empty() {
            return writeln!(f, "nothing to do: cluster is converged");
        }
        for (i, op) in self.ops.iter().enumerate() {
            writeln!(f, "{:3}. {}", i + 1, op)?;
        }
        Ok(())
    }
}

// ── Reconciler ─────────────────────────────────────────────────────

/// Bounded exponential backoff for transient control-plane failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Default)]
pub struct Reconciler {
    retry: RetryPolicy,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    /// Diff desired topology against an actual-state snapshot.
    ///
    /// Structural incompatibilities (same shard id with a different
    /// seed, same collection with a different shard key, an
    /// overlapping foreign range) surface as `Conflict` here, before
    /// anything mutates.
    pub fn plan(&self, desired: &Topology, actual: &ClusterState) -> Result<Plan> {
        let mut ops = Vec::new();

        // 1. shards
        for shard in desired.shards() {
            match actual.shards.get(&shard.id) {
                None => ops.push(Op::AddShard {
                    id: shard.id.clone(),
                    seed: shard.seed.clone(),
                }),
                Some(state) if state.seed == shard.seed => {}
                Some(state) => {
                    return Err(TopologyError::Conflict {
                        what: format!("shard '{}'", shard.id),
                        desired: shard.seed.clone(),
                        existing: state.seed.clone(),
                    })
                }
            }
        }

        // 2. database
        if !actual.sharded_databases.contains(desired.database()) {
            ops.push(Op::EnableSharding {
                database: desired.database().to_string(),
            });
        }

        // 3. zone tags
        for zone in desired.zones() {
            for shard_id in &zone.shards {
                let tagged = actual
                    .shards
                    .get(shard_id)
                    .is_some_and(|s| s.zones.contains(&zone.name));
                if !tagged {
                    ops.push(Op::AddShardTag {
                        shard_id: shard_id.clone(),
                        zone: zone.name.clone(),
                    });
                }
            }
        }

        // 4. collections
        for collection in desired.collections() {
            match actual.collections.get(&collection.namespace) {
                None => ops.push(Op::ShardCollection {
                    namespace: collection.namespace.clone(),
                    shard_key: collection.shard_key.clone(),
                }),
                Some(key) if *key == collection.shard_key => {}
                Some(key) => {
                    return Err(TopologyError::Conflict {
                        what: format!("collection '{}' shard key", collection.namespace),
                        desired: collection.shard_key.clone(),
                        existing: key.clone(),
                    })
                }
            }
        }

        // 5. tag ranges
        for range in desired.ranges() {
            if actual.ranges.iter().any(|e| e.matches(range)) {
                continue;
            }
            if let Some(foreign) = actual.ranges.iter().find(|e| e.overlaps(range)) {
                return Err(TopologyError::Conflict {
                    what: "tag range".to_string(),
                    desired: range.to_string(),
                    existing: foreign.to_string(),
                });
            }
            ops.push(Op::AddTagRange {
                namespace: range.namespace.clone(),
                min: range.min.clone(),
                max: range.max.clone(),
                zone: range.zone.clone(),
            });
        }

        // 6. indexes
        for (namespace, spec) in desired.indexes() {
            let existing = actual
                .indexes
                .get(namespace)
                .and_then(|specs| specs.iter().find(|s| s.name == spec.name));
            match existing {
                None => ops.push(Op::CreateIndex {
                    namespace: namespace.clone(),
                    spec: spec.clone(),
                }),
                Some(s) if s.keys == spec.keys => {}
                Some(s) => {
                    return Err(TopologyError::Conflict {
                        what: format!("index '{}' on {}", spec.name, namespace),
                        desired: spec.render_keys(),
                        existing: s.render_keys(),
                    })
                }
            }
        }

        Ok(Plan { ops })
    }

    /// Snapshot, plan, and execute. Returns the executed plan.
    pub fn apply(&self, desired: &Topology, cluster: &mut dyn ControlPlane) -> Result<Plan> {
        let actual = self.with_backoff("snapshot", || cluster.snapshot())?;
        let plan = self.plan(desired, &actual)?;
        if plan.is_empty() {
            tracing::info!("cluster already converged, no operations issued");
            return Ok(plan);
        }
        tracing::info!(ops = plan.len(), "applying plan");
        for op in &plan.ops {
            self.execute(op, cluster)?;
            tracing::info!(%op, "applied");
        }
        Ok(plan)
    }

    fn execute(&self, op: &Op, cluster: &mut dyn ControlPlane) -> Result<()> {
        let label = op.to_string();
        self.with_backoff(&label, || match op {
            Op::AddShard { id, seed } => cluster.add_shard(id, seed),
            Op::EnableSharding { database } => cluster.enable_sharding(database),
            Op::AddShardTag { shard_id, zone } => cluster.add_shard_tag(shard_id, zone),
            Op::ShardCollection { namespace, shard_key } => {
                cluster.shard_collection(namespace, shard_key)
            }
            Op::AddTagRange { namespace, min, max, zone } => {
                cluster.add_tag_range(namespace, min, max, zone)
            }
            Op::CreateIndex { namespace, spec } => cluster.create_index(namespace, spec),
        })
    }

    fn with_backoff<T>(&self, label: &str, mut call: impl FnMut() -> Result<T>) -> Result<T> {
        let mut delay = self.retry.base_delay;
        let mut attempt = 1;
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => {
                    if attempt >= self.retry.max_attempts {
                        return Err(TopologyError::RetriesExhausted {
                            attempts: attempt,
                            last: err.to_string(),
                        });
                    }
                    tracing::warn!(%label, attempt, error = %err, "transient failure, backing off");
                    std::thread::sleep(delay);
                    delay = (delay * 2).min(self.retry.max_delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

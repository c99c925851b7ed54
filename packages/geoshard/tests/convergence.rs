//! Integration test: reconciliation convergence and idempotence.
//!
//! Validates that:
//! - Applying the reference topology to an empty cluster converges it
//! - Re-running against a converged cluster issues zero mutating calls
//! - Applying twice from empty yields the same state as applying once
//! - Validation failures abort before any control-plane call
//! - Conflicts (shard key, shard seed) abort the run
//! - File-backed cluster state survives reopen, and a re-run against
//!   the reopened state is a no-op

use geoshard::cluster::{FileCluster, InMemoryCluster};
use geoshard::config::TopologySpec;
use geoshard::range::KeyBound;
use geoshard::reconcile::{ControlPlane, Reconciler};
use geoshard::topology::Topology;
use geoshard::validate::{validate, CoveragePolicy};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn reference_topology() -> Topology {
    TopologySpec::reference().build().unwrap()
}

fn apply(topology: &Topology, cluster: &mut InMemoryCluster) -> geoshard::reconcile::Plan {
    Reconciler::new().apply(topology, cluster).unwrap()
}

// ---------------------------------------------------------------------------
// Tests: Convergence & Idempotence
// ---------------------------------------------------------------------------

#[test]
fn apply_converges_empty_cluster() {
    let topology = reference_topology();
    let mut cluster = InMemoryCluster::new();

    let plan = apply(&topology, &mut cluster);
    assert!(!plan.is_empty());

    let state = cluster.state();
    assert_eq!(state.shards.len(), 5);
    assert!(state.sharded_databases.contains("yelp_data"));
    assert_eq!(state.collections.len(), 2);
    assert_eq!(state.ranges.len(), 66);
    assert_eq!(state.indexes["yelp_data.reviews"].len(), 4);

    // Zone tags landed on the right shards.
    assert!(state.shards["rs-shard-a"].zones.contains("PACIFIC"));
    assert!(state.shards["rs-shard-e"].zones.contains("OTHER"));
}

#[test]
fn rerun_against_converged_cluster_issues_zero_mutating_calls() {
    let topology = reference_topology();
    let mut cluster = InMemoryCluster::new();

    apply(&topology, &mut cluster);
    let calls_after_first = cluster.mutating_calls();

    let plan = apply(&topology, &mut cluster);
    assert!(plan.is_empty());
    assert_eq!(cluster.mutating_calls(), calls_after_first);
}

#[test]
fn apply_twice_equals_apply_once() {
    let topology = reference_topology();

    let mut once = InMemoryCluster::new();
    apply(&topology, &mut once);

    let mut twice = InMemoryCluster::new();
    apply(&topology, &mut twice);
    apply(&topology, &mut twice);

    assert_eq!(once.state(), twice.state());
}

#[test]
fn region_documents_route_to_their_zone_range() {
    let topology = reference_topology();
    let ca = topology
        .ranges()
        .iter()
        .find(|r| r.namespace == "yelp_data.businesses" && r.min == "CA")
        .unwrap();
    assert_eq!(ca.zone, "PACIFIC");
    assert!(ca.contains("CA"));
    assert!(!ca.contains("CB"));
}

// ---------------------------------------------------------------------------
// Tests: Aborts before mutation
// ---------------------------------------------------------------------------

#[test]
fn overlap_aborts_before_any_control_plane_call() {
    let mut topology = Topology::new("appdb");
    topology.add_shard("rs-a", "rs-a/a1:27017").unwrap();
    topology.add_shard("rs-b", "rs-b/b1:27017").unwrap();
    topology.add_zone("MOUNTAIN", &["rs-a"]).unwrap();
    topology.add_zone("EAST", &["rs-b"]).unwrap();
    topology
        .define_partitioned_collection("appdb.docs", "state")
        .unwrap();
    topology
        .add_tag_range("appdb.docs", "MOUNTAIN", "AZ", KeyBound::Value("BA".into()))
        .unwrap();
    topology
        .add_tag_range("appdb.docs", "EAST", "AZ", KeyBound::Value("AZZ".into()))
        .unwrap();

    let err = validate(&topology, CoveragePolicy::Warn).unwrap_err();
    assert_eq!(err.code(), "VALIDATION_FAILED");

    // The validator gates the reconciler; nothing was issued.
    let cluster = InMemoryCluster::new();
    assert_eq!(cluster.mutating_calls(), 0);
    assert_eq!(cluster.state().ranges.len(), 0);
}

#[test]
fn redeclaring_collection_with_different_key_conflicts() {
    let topology = reference_topology();
    let mut cluster = InMemoryCluster::new();
    apply(&topology, &mut cluster);

    // Same namespaces, different shard key.
    let mut spec = TopologySpec::reference();
    for collection in &mut spec.collections {
        collection.shard_key = "city".to_string();
    }
    let changed = spec.build().unwrap();

    let calls_before = cluster.mutating_calls();
    let err = Reconciler::new().apply(&changed, &mut cluster).unwrap_err();
    assert_eq!(err.code(), "CONFLICT");
    // Conflict was detected at plan time; nothing mutated.
    assert_eq!(cluster.mutating_calls(), calls_before);
}

#[test]
fn readding_shard_with_different_seed_conflicts() {
    let topology = reference_topology();
    let mut cluster = InMemoryCluster::new();
    apply(&topology, &mut cluster);

    let mut spec = TopologySpec::reference();
    spec.shards[0].seed = "rs-shard-a/relocated:27017".to_string();
    let changed = spec.build().unwrap();

    let err = Reconciler::new().apply(&changed, &mut cluster).unwrap_err();
    assert_eq!(err.code(), "CONFLICT");
}

// ---------------------------------------------------------------------------
// Tests: File-backed state
// ---------------------------------------------------------------------------

#[test]
fn file_cluster_converges_and_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cluster.json");
    let topology = reference_topology();

    {
        let mut cluster = FileCluster::open(&path).unwrap();
        let plan = Reconciler::new().apply(&topology, &mut cluster).unwrap();
        assert!(!plan.is_empty());
    }

    // Reopen: the recorded intent is durable, so the second run is a
    // pure no-op.
    let mut cluster = FileCluster::open(&path).unwrap();
    assert_eq!(cluster.state().ranges.len(), 66);

    let plan = Reconciler::new().apply(&topology, &mut cluster).unwrap();
    assert!(plan.is_empty());
    assert_eq!(cluster.mutating_calls(), 0);
}

#[test]
fn interrupted_run_resumes_cleanly() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cluster.json");
    let topology = reference_topology();

    // Simulate a run that stopped partway: only shards and the
    // database made it in.
    {
        let mut cluster = FileCluster::open(&path).unwrap();
        for shard in topology.shards() {
            cluster.add_shard(&shard.id, &shard.seed).unwrap();
        }
        cluster.enable_sharding(topology.database()).unwrap();
    }

    let mut cluster = FileCluster::open(&path).unwrap();
    let plan = Reconciler::new().apply(&topology, &mut cluster).unwrap();
    // Resumed run skips the completed phases.
    assert!(plan
        .ops
        .iter()
        .all(|op| !matches!(op, geoshard::reconcile::Op::AddShard { .. })));
    assert_eq!(cluster.state().ranges.len(), 66);
}

//! geoshard — geo-zoned shard topology control plane.
//!
//! Lays out a horizontally-partitioned document store across
//! region-based shards: declares which shards exist, groups them into
//! named zones, derives contiguous key ranges from two-letter region
//! codes, and converges a live cluster to that topology with
//! idempotent control-plane operations.
//!
//! # Modules
//!
//! - **`topology`**: the desired-state model (shards, zones,
//!   partitioned collections, tag ranges) with fail-fast structural
//!   checks.
//! - **`range`**: region-code successor arithmetic producing the
//!   half-open bucket `[code, successor(code))`.
//! - **`validate`**: reference-integrity and overlap checks plus the
//!   advisory coverage audit, aggregated into one report.
//! - **`reconcile`**: the diff/plan/apply loop over a store-agnostic
//!   `ControlPlane` trait, with bounded backoff for transient
//!   failures.
//! - **`provision`**: secondary index specs ensured after
//!   partitioning.
//! - **`config`**: the declarative JSON topology file and the built-in
//!   five-region reference topology.
//! - **`cluster`**: in-memory and file-backed `ControlPlane`
//!   implementations.
//!
//! Data migration itself is out of scope: once a tag range is
//! recorded, the cluster's background balancer moves chunks on its own
//! schedule. The query layer served by this placement (location and
//! semantic search over HTTP) is a separate system.

pub mod cluster;
pub mod config;
pub mod error;
pub mod provision;
pub mod range;
pub mod reconcile;
pub mod topology;
pub mod validate;

pub use cluster::{FileCluster, InMemoryCluster};
pub use config::TopologySpec;
pub use error::{Result, TopologyError};
pub use provision::{IndexKind, IndexSpec};
pub use range::{region_range, successor, KeyBound};
pub use reconcile::{ClusterState, ControlPlane, Op, Plan, Reconciler, RetryPolicy};
pub use topology::{TagRange, Topology};
pub use validate::{validate, CoveragePolicy, ValidationReport};

//! Topology validation.
//!
//! Runs after the desired topology is fully assembled and before any
//! cluster mutation. Checks, in order:
//!
//! 1. **Reference integrity** — every tag range's zone exists and maps
//!    to at least one shard; every range's collection is declared
//!    partitioned with a matching shard-key field. Fatal.
//! 2. **Overlap freedom** — for each collection, no two ranges overlap
//!    on `[min, max)`. Every violating pair is reported, not just the
//!    first. Fatal.
//! 3. **Coverage audit** — the complement of the union of ranges over
//!    the two-letter region key domain is reported as unmapped gaps.
//!    Keys falling in a gap follow the store's default placement, so
//!    the operator must see the gaps; advisory by default, fatal under
//!    [`CoveragePolicy::Strict`].
//!
//! All findings are aggregated into one [`ValidationReport`] so the
//! declarative topology can be fixed in a single pass.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TopologyError;
use crate::range::{KeyBound, REGION_DOMAIN_START};
use crate::topology::{TagRange, Topology};

/// How to treat unmapped key-space gaps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoveragePolicy {
    /// Report gaps as warnings; documents in a gap follow default
    /// placement. This matches the reference topology, which is
    /// deliberately gappy.
    #[default]
    Warn,
    /// Any gap fails validation.
    Strict,
}

/// A fatal validation finding.
#[derive(Debug, Clone, PartialEq)]
pub enum Finding {
    /// A range targets a zone that is not declared.
    RangeZoneMissing { range: TagRange },
    /// A range targets a zone with no backing shard.
    ZoneWithoutShard { range: TagRange },
    /// A range references a collection never declared partitioned.
    RangeCollectionMissing { range: TagRange },
    /// A range's shard key differs from the collection's declared key.
    ShardKeyMismatch { range: TagRange, declared: String },
    /// Two ranges on the same collection overlap.
    Overlap { a: TagRange, b: TagRange },
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::RangeZoneMissing { range } => {
                write!(f, "range {} targets undeclared zone '{}'", range, range.zone)
            }
            Finding::ZoneWithoutShard { range } => {
                write!(f, "range {} targets zone '{}' with no shards", range, range.zone)
            }
            Finding::RangeCollectionMissing { range } => {
                write!(f, "range {} references unpartitioned collection", range)
            }
            Finding::ShardKeyMismatch { range, declared } => write!(
                f,
                "range {} keyed on '{}' but collection is partitioned on '{}'",
                range, range.shard_key, declared
            ),
            Finding::Overlap { a, b } => write!(f, "overlapping ranges: {} and {}", a, b),
        }
    }
}

/// An unmapped stretch of the region key domain on one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Gap {
    pub namespace: String,
    pub from: String,
    pub to: KeyBound,
}

impl fmt::Display for Gap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [\"{}\", {}) unmapped", self.namespace, self.from, self.to)
    }
}

/// Aggregate validation outcome: fatal findings plus advisory gaps.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub findings: Vec<Finding>,
    pub gaps: Vec<Gap>,
}

impl ValidationReport {
    pub fn is_fatal(&self, policy: CoveragePolicy) -> bool {
        !self.findings.is_empty()
            || (policy == CoveragePolicy::Strict && !self.gaps.is_empty())
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for finding in &self.findings {
            writeln!(f, "  error: {}", finding)?;
        }
        for gap in &self.gaps {
            writeln!(f, "  gap: {}", gap)?;
        }
        Ok(())
    }
}

/// Validate the assembled topology.
///
/// Returns the report (gaps included, for operator visibility) when
/// nothing fatal was found under `policy`; otherwise the report is
/// wrapped in [`TopologyError::Validation`] and no cluster mutation
/// may proceed.
pub fn validate(
    topology: &Topology,
    policy: CoveragePolicy,
) -> Result<ValidationReport, TopologyError> {
    let mut report = ValidationReport::default();

    check_references(topology, &mut report);
    check_overlaps(topology, &mut report);
    audit_coverage(topology, &mut report);

    for gap in &report.gaps {
        tracing::warn!(%gap, "unmapped key space falls through to default placement");
    }

    if report.is_fatal(policy) {
        return Err(TopologyError::Validation(report));
    }
    Ok(report)
}

fn check_references(topology: &Topology, report: &mut ValidationReport) {
    for range in topology.ranges() {
        match topology.zone(&range.zone) {
            None => report.findings.push(Finding::RangeZoneMissing {
                range: range.clone(),
            }),
            Some(zone) if zone.shards.is_empty() => {
                report.findings.push(Finding::ZoneWithoutShard {
                    range: range.clone(),
                })
            }
            Some(_) => {}
        }
        match topology.collection(&range.namespace) {
            None => report.findings.push(Finding::RangeCollectionMissing {
                range: range.clone(),
            }),
            Some(c) if c.shard_key != range.shard_key => {
                report.findings.push(Finding::ShardKeyMismatch {
                    range: range.clone(),
                    declared: c.shard_key.clone(),
                })
            }
            Some(_) => {}
        }
    }
}

fn check_overlaps(topology: &Topology, report: &mut ValidationReport) {
    // Per collection, sorted by min so each violating pair surfaces in
    // a stable order. Pairwise rather than adjacent-only: one wide
    // range can overlap several later ones.
    for collection in topology.collections() {
        let mut ranges: Vec<&TagRange> = topology
            .ranges()
            .iter()
            .filter(|r| r.namespace == collection.namespace)
            .collect();
        ranges.sort_by(|a, b| a.min.cmp(&b.min).then_with(|| a.max.cmp(&b.max)));
        for i in 0..ranges.len() {
            for j in (i + 1)..ranges.len() {
                if ranges[i].overlaps(ranges[j]) {
                    report.findings.push(Finding::Overlap {
                        a: ranges[i].clone(),
                        b: ranges[j].clone(),
                    });
                }
            }
        }
    }
}

fn audit_coverage(topology: &Topology, report: &mut ValidationReport) {
    // Sweep the region key domain from "AA"; everything a sorted range
    // does not cover is a gap. Keys sorting below "AA" or above the
    // last covered bound follow default placement.
    for collection in topology.collections() {
        let mut ranges: Vec<&TagRange> = topology
            .ranges()
            .iter()
            .filter(|r| r.namespace == collection.namespace)
            .collect();
        if ranges.is_empty() {
            continue;
        }
        ranges.sort_by(|a, b| a.min.cmp(&b.min).then_with(|| a.max.cmp(&b.max)));

        let mut cursor = KeyBound::Value(REGION_DOMAIN_START.to_string());
        for range in &ranges {
            let min = KeyBound::Value(range.min.clone());
            if min > cursor {
                if let KeyBound::Value(from) = &cursor {
                    report.gaps.push(Gap {
                        namespace: collection.namespace.clone(),
                        from: from.clone(),
                        to: min.clone(),
                    });
                }
            }
            if range.max > cursor {
                cursor = range.max.clone();
            }
            if cursor == KeyBound::Max {
                break;
            }
        }
        if let KeyBound::Value(from) = cursor {
            report.gaps.push(Gap {
                namespace: collection.namespace.clone(),
                from,
                to: KeyBound::Max,
            });
        }
    }
}

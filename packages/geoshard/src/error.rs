//! Error types for the topology control plane.

use thiserror::Error;

use crate::validate::ValidationReport;

pub type Result<T> = std::result::Result<T, TopologyError>;

#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("duplicate shard id '{0}'")]
    DuplicateShard(String),

    #[error("duplicate zone '{0}'")]
    DuplicateZone(String),

    #[error("collection '{0}' is already declared partitioned")]
    DuplicateCollection(String),

    #[error("zone '{zone}' references unknown shard '{shard}'")]
    UnknownShard { zone: String, shard: String },

    #[error("unknown zone '{0}'")]
    UnknownZone(String),

    #[error("collection '{0}' has not been declared partitioned")]
    UnknownCollection(String),

    #[error("namespace '{0}' is not '<database>.<collection>' for this topology's database")]
    InvalidNamespace(String),

    #[error("invalid region code '{0}': expected two ASCII uppercase letters")]
    InvalidRegionCode(String),

    #[error("invalid key range [{min}, {max}): min must sort strictly before max")]
    InvalidRange { min: String, max: String },

    #[error("database '{0}' has not been enabled for sharding")]
    ShardingNotEnabled(String),

    /// Desired state is structurally incompatible with live or
    /// previously-declared state. Never retried; aborts the run.
    #[error("{what}: desired '{desired}' conflicts with existing '{existing}'")]
    Conflict {
        what: String,
        desired: String,
        existing: String,
    },

    /// Aggregate of all validation findings, reported before any
    /// cluster mutation.
    #[error("topology validation failed:\n{0}")]
    Validation(ValidationReport),

    #[error("control-plane I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("state serialization: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transient failure persisted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl TopologyError {
    /// Stable error code for operator-facing output.
    pub fn code(&self) -> &'static str {
        match self {
            TopologyError::DuplicateShard(_) => "DUPLICATE_SHARD",
            TopologyError::DuplicateZone(_) => "DUPLICATE_ZONE",
            TopologyError::DuplicateCollection(_) => "DUPLICATE_COLLECTION",
            TopologyError::UnknownShard { .. } => "UNKNOWN_SHARD",
            TopologyError::UnknownZone(_) => "UNKNOWN_ZONE",
            TopologyError::UnknownCollection(_) => "UNKNOWN_COLLECTION",
            TopologyError::InvalidNamespace(_) => "INVALID_NAMESPACE",
            TopologyError::InvalidRegionCode(_) => "INVALID_REGION_CODE",
            TopologyError::InvalidRange { .. } => "INVALID_RANGE",
            TopologyError::ShardingNotEnabled(_) => "SHARDING_NOT_ENABLED",
            TopologyError::Conflict { .. } => "CONFLICT",
            TopologyError::Validation(_) => "VALIDATION_FAILED",
            TopologyError::Io(_) => "IO_ERROR",
            TopologyError::Json(_) => "SERIALIZATION_ERROR",
            TopologyError::RetriesExhausted { .. } => "RETRIES_EXHAUSTED",
        }
    }

    /// Whether this failure may be retried with backoff.
    ///
    /// Only I/O failures are transient; `Conflict` and validation
    /// failures are never retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, TopologyError::Io(_))
    }
}

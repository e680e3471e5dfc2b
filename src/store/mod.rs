//! Durable, deduplicated persistence for harvested data
//!
//! Every file is JSON, human-diffable, and rewritten atomically (temp file + fsync + rename)
//! so it is safe to inspect mid-run and a crash never leaves a half-written file behind.
//!
//! - [`ShardStore`] - size-bounded record shards with a dedup key set rebuilt from disk
//! - [`IdentityMap`] - seed → resource identifier map, insertion ordered
//! - [`IdSet`] - ordered, duplicate-free id list (match ids, indexed identifiers)
//! - [`SeedFile`] - static category → seed list input

pub mod atomic;
pub mod id_set;
pub mod identity_map;
pub mod seeds;
pub mod shard;

pub use id_set::IdSet;
pub use identity_map::IdentityMap;
pub use seeds::SeedFile;
pub use shard::{ShardRecord, ShardScan, ShardStore};

/// Errors related to persisted harvest data
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("deserialization error in {path}: {reason}")]
    DeserializationError {
        /// File that failed to parse
        path: String,
        /// Parser message
        reason: String,
    },

    /// A sealed shard could not be read back
    #[error("corrupt shard {path}: {reason}")]
    CorruptShard {
        /// Shard file path
        path: String,
        /// Parser message
        reason: String,
    },

    /// Lock error
    #[error("lock error: {0}")]
    LockError(String),
}

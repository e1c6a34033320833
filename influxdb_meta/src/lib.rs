//! Cluster metadata as seen by the write path: databases, their retention policies, and the
//! time-bounded shard groups and shards that data is partitioned into.
//!
//! The [`MetaClient`] trait is the narrow capability set the write coordinator consumes. The
//! authoritative metadata store lives elsewhere; [`MemMetaClient`] is a single-process
//! implementation suitable for embedded use and tests.

mod id;
mod info;
mod mem;

pub use id::{NodeId, ShardGroupId, ShardId};
pub use info::{
    DEFAULT_RETENTION_POLICY_NAME, DatabaseInfo, RetentionPolicyInfo, ShardGroupInfo, ShardInfo,
    ShardLocation, ShardOwner, normalised_shard_group_duration,
};
pub use mem::MemMetaClient;

use std::fmt::Debug;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("database name required")]
    DatabaseNameRequired,

    #[error("database not found: {name}")]
    DatabaseNotFound { name: String },

    #[error("retention policy name required")]
    RetentionPolicyNameRequired,

    #[error("retention policy not found: {name}")]
    RetentionPolicyNotFound { name: String },

    #[error("retention policy {name} already exists with different settings")]
    RetentionPolicyConflict { name: String },

    #[error("retention policy duration must be greater than the shard group duration")]
    IncompatibleDurations,

    #[error("replication factor must be greater than 0")]
    ReplicationFactorTooLow,

    #[error("shard group duration must be greater than 0")]
    ShardGroupDurationTooLow,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The metadata capabilities the write path depends on.
#[async_trait]
pub trait MetaClient: Debug + Send + Sync + 'static {
    /// Look up a database by name.
    async fn database(&self, name: &str) -> Option<DatabaseInfo>;

    /// Look up a retention policy.
    ///
    /// Returns an error if `database` does not exist, and `Ok(None)` if the database exists but
    /// has no policy named `policy`.
    async fn retention_policy(
        &self,
        database: &str,
        policy: &str,
    ) -> Result<Option<RetentionPolicyInfo>>;

    /// Create, or fetch the existing, shard group covering `timestamp`.
    ///
    /// Implementations must be idempotent for timestamps within the same shard group interval:
    /// repeated calls return the same group.
    async fn create_shard_group(
        &self,
        database: &str,
        policy: &str,
        timestamp: i64,
    ) -> Result<Option<ShardGroupInfo>>;

    /// Find the database, retention policy and shard group owning `shard_id`.
    async fn shard_owner(&self, shard_id: ShardId) -> Option<ShardLocation>;
}

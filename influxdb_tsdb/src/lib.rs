//! The shard-local storage interface the write coordinator hands points to.
//!
//! A [`TsdbStore`] persists points into shards it has been told to create. Writes report one of
//! three outcomes the coordinator acts on differently: success, [`Error::ShardNotFound`] (the
//! shard exists in the cluster metadata but not yet on this node), and [`Error::PartialWrite`]
//! (some points were rejected, for example because of a field type conflict). A write whose
//! every point is rejected reports [`Error::Rejected`] instead.

mod mem;

pub use mem::MemStore;

use std::fmt::Debug;

use async_trait::async_trait;
use influxdb_meta::ShardId;
use influxdb_models::Point;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("shard not found")]
    ShardNotFound,

    /// Some, but not all, points of a write were accepted.
    #[error("partial write: {reason} dropped={dropped}")]
    PartialWrite { reason: String, dropped: usize },

    /// Every point of a write was rejected.
    #[error("write rejected: {reason} dropped={dropped}")]
    Rejected { reason: String, dropped: usize },

    #[error("shard {0} is disabled")]
    ShardDisabled(ShardId),

    #[error("storage engine error: {0}")]
    Engine(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Shard-local storage.
#[async_trait]
pub trait TsdbStore: Debug + Send + Sync + 'static {
    /// Instantiate `shard_id` on this node. Creating a shard that already exists is a no-op.
    async fn create_shard(
        &self,
        database: &str,
        retention_policy: &str,
        shard_id: ShardId,
        enabled: bool,
    ) -> Result<()>;

    /// Write all of `points` to `shard_id` in a single operation.
    async fn write_to_shard(&self, shard_id: ShardId, points: &[Point]) -> Result<()>;
}

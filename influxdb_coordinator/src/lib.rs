//! The write-path coordinator.
//!
//! A [`PointsWriter`] accepts a batch of points for a database and retention policy, maps each
//! point to the time-bounded shard group and shard that should store it (creating shard groups
//! through the [`MetaClient`] as time advances), writes every affected shard concurrently and
//! waits for all of them, a timeout, or shutdown.
//!
//! ```text
//!                                     ┌──────────────┐
//!                                ┌───▶│   shard  1   │──▶ TsdbStore / ShardWriter
//!   ┌──────────────┐   ┌───────┐ │    └──────────────┘
//!   │ WritePoints  │──▶│  map  │─┤    ┌──────────────┐
//!   │   Request    │   │shards │ └───▶│   shard  N   │──▶ TsdbStore / ShardWriter
//!   └──────────────┘   └───────┘      └──────────────┘
//!          │
//!          └──────▶ subscriber (try_send, never blocks)
//! ```
//!
//! [`MetaClient`]: influxdb_meta::MetaClient

mod points_writer;
mod request;
mod shard_group_list;
mod shard_mapping;
mod shard_writer;
mod stats;
mod subscriber;

pub mod mock;

pub use points_writer::{
    DEFAULT_MAX_CONCURRENT_SHARD_WRITES, DEFAULT_WRITE_TIMEOUT, PointsWriter, PointsWriterConfig,
};
pub use request::{IntoWriteRequest, WritePointsRequest};
pub use shard_group_list::ShardGroupList;
pub use shard_mapping::ShardMapping;
pub use shard_writer::{ShardWriteError, ShardWriter};
pub use stats::{WriteStatistics, WriteStatisticsSnapshot};
pub use subscriber::{Subscriber, SubscriberSender};

use influxdb_meta::{ShardGroupId, ShardId};
use thiserror::Error;

/// Errors returned by the [`PointsWriter`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("database not found: {0}")]
    DatabaseNotFound(String),

    #[error("retention policy not found: {0}")]
    RetentionPolicyNotFound(String),

    /// The metadata service answered a shard group request with nothing.
    #[error("nil shard group")]
    NilShardGroup,

    #[error("shard group {0} has no shards")]
    EmptyShardGroup(ShardGroupId),

    #[error(transparent)]
    Meta(#[from] influxdb_meta::Error),

    /// A local shard write failed. Partial writes are carried here unchanged.
    #[error(transparent)]
    Store(#[from] influxdb_tsdb::Error),

    #[error("remote write to shard {shard_id} failed: {source}")]
    Remote {
        shard_id: ShardId,
        source: ShardWriteError,
    },

    #[error("shard {0} has no owners")]
    NoShardOwners(ShardId),

    /// Not every shard acknowledged the write before the configured timeout.
    #[error("timeout")]
    Timeout,

    /// The writer was closed while the write was in flight.
    #[error("write failed")]
    WriteFailed,
}

impl Error {
    /// True if some, but not all, of the points were accepted by a shard.
    pub fn is_partial_write(&self) -> bool {
        matches!(self, Self::Store(influxdb_tsdb::Error::PartialWrite { .. }))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

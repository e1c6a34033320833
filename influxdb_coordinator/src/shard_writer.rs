use std::fmt::Debug;

use async_trait::async_trait;
use influxdb_meta::{NodeId, ShardId};
use influxdb_models::Point;
use thiserror::Error;

/// Errors experienced when writing a shard owned by another node.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShardWriteError {
    /// The remote node returned an error response.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// The connection to the remote node is not established.
    #[error("node {0} is not connected")]
    NotConnected(NodeId),

    /// The remote node did not respond in time.
    #[error("timeout writing to node {0}")]
    Timeout(NodeId),
}

/// Writes points to a shard owned by another node in the cluster.
#[async_trait]
pub trait ShardWriter: Debug + Send + Sync + 'static {
    async fn write_shard(
        &self,
        shard_id: ShardId,
        owner: NodeId,
        points: &[Point],
    ) -> Result<(), ShardWriteError>;
}

//! CLI config for the write coordinator

use std::time::Duration;

use influxdb_coordinator::PointsWriterConfig;
use influxdb_meta::NodeId;

/// CLI config for the write coordinator
#[derive(Debug, Clone, clap::Parser)]
#[allow(missing_copy_implementations)]
pub struct CoordinatorConfig {
    /// The time a write waits for every shard to acknowledge before failing with a timeout.
    #[clap(
        long = "write-timeout",
        env = "INFLUXDB_COORDINATOR_WRITE_TIMEOUT",
        default_value = "10s",
        value_parser = humantime::parse_duration,
        action
    )]
    pub write_timeout: Duration,

    /// The maximum number of shard writes in flight at once, across all write requests.
    #[clap(
        long = "max-concurrent-shard-writes",
        env = "INFLUXDB_COORDINATOR_MAX_CONCURRENT_SHARD_WRITES",
        default_value = "1024",
        action
    )]
    pub max_concurrent_shard_writes: usize,

    /// The ID of this node in the cluster.
    ///
    /// When set, shards owned only by other nodes are written to those nodes. When unset, every
    /// shard is written locally.
    #[clap(long = "node-id", env = "INFLUXDB_COORDINATOR_NODE_ID", action)]
    pub node_id: Option<u64>,
}

impl CoordinatorConfig {
    pub fn points_writer_config(&self) -> PointsWriterConfig {
        PointsWriterConfig {
            write_timeout: self.write_timeout,
            max_concurrent_shard_writes: self.max_concurrent_shard_writes,
            node_id: self.node_id.map(NodeId::new),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoordinatorConfig::parse_from([""]);
        assert_eq!(config.points_writer_config(), PointsWriterConfig::default());
    }

    #[test]
    fn test_parse() {
        let config = CoordinatorConfig::parse_from([
            "",
            "--write-timeout",
            "1m 30s",
            "--max-concurrent-shard-writes",
            "8",
            "--node-id",
            "3",
        ]);

        let got = config.points_writer_config();
        assert_eq!(got.write_timeout, Duration::from_secs(90));
        assert_eq!(got.max_concurrent_shard_writes, 8);
        assert_eq!(got.node_id, Some(NodeId::new(3)));
    }

    #[test]
    fn test_invalid_timeout() {
        let err = CoordinatorConfig::try_parse_from(["", "--write-timeout", "soon"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}

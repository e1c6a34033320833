use std::collections::BTreeMap;

use influxdb_models::Statistic;
use metric::{Metric, Registry, U64Counter};

// The keys for statistics generated by the write service.
const STAT_WRITE_REQ: &str = "req";
const STAT_POINT_WRITE_REQ: &str = "pointReq";
const STAT_POINT_WRITE_REQ_LOCAL: &str = "pointReqLocal";
const STAT_POINT_WRITE_REQ_REMOTE: &str = "pointReqRemote";
const STAT_WRITE_OK: &str = "writeOk";
const STAT_WRITE_DROP: &str = "writeDrop";
const STAT_WRITE_TIMEOUT: &str = "writeTimeout";
const STAT_WRITE_ERR: &str = "writeError";
const STAT_SUB_WRITE_OK: &str = "subWriteOk";
const STAT_SUB_WRITE_DROP: &str = "subWriteDrop";

fn counter(registry: &Registry, name: &'static str, description: &'static str) -> U64Counter {
    registry
        .register_metric::<U64Counter>(name, description)
        .recorder([])
}

/// Monotonic counters describing the write service, registered in a [`metric::Registry`].
#[derive(Debug)]
pub struct WriteStatistics {
    pub(crate) write_req: U64Counter,
    pub(crate) point_write_req: U64Counter,
    pub(crate) point_write_req_local: U64Counter,
    pub(crate) point_write_req_remote: U64Counter,
    pub(crate) write_ok: U64Counter,
    pub(crate) write_dropped: U64Counter,
    pub(crate) write_timeout: U64Counter,
    pub(crate) write_err: U64Counter,
    pub(crate) sub_write_ok: U64Counter,
    pub(crate) sub_write_drop: U64Counter,
}

/// The values of [`WriteStatistics`] at one instant.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteStatisticsSnapshot {
    /// Calls to write points.
    pub write_req: u64,
    /// Points submitted across all write calls.
    pub point_write_req: u64,
    /// Points handed to local shards.
    pub point_write_req_local: u64,
    /// Points handed to remote shard owners.
    pub point_write_req_remote: u64,
    /// Successful shard writes.
    pub write_ok: u64,
    /// Points dropped for falling outside the retention window.
    pub write_dropped: u64,
    /// Write calls that timed out waiting for shards.
    pub write_timeout: u64,
    /// Failed shard writes, including partial writes.
    pub write_err: u64,
    /// Batches mirrored to the subscriber pipeline.
    pub sub_write_ok: u64,
    /// Batches the subscriber pipeline could not take.
    pub sub_write_drop: u64,
}

impl WriteStatistics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            write_req: counter(
                registry,
                "points_writer_requests",
                "number of write requests received by the points writer",
            ),
            point_write_req: counter(
                registry,
                "points_writer_points",
                "number of points received by the points writer",
            ),
            point_write_req_local: counter(
                registry,
                "points_writer_points_local",
                "number of points written to local shards",
            ),
            point_write_req_remote: counter(
                registry,
                "points_writer_points_remote",
                "number of points written to shards owned by other nodes",
            ),
            write_ok: counter(
                registry,
                "points_writer_shard_writes_ok",
                "number of successful shard writes",
            ),
            write_dropped: counter(
                registry,
                "points_writer_points_dropped",
                "number of points dropped for falling outside the retention window",
            ),
            write_timeout: counter(
                registry,
                "points_writer_timeouts",
                "number of write requests that timed out waiting for shards",
            ),
            write_err: counter(
                registry,
                "points_writer_shard_write_errors",
                "number of failed shard writes, including partial writes",
            ),
            sub_write_ok: counter(
                registry,
                "points_writer_subscriber_writes_ok",
                "number of write requests mirrored to the subscriber pipeline",
            ),
            sub_write_drop: counter(
                registry,
                "points_writer_subscriber_writes_dropped",
                "number of write requests the subscriber pipeline could not accept",
            ),
        }
    }

    pub fn snapshot(&self) -> WriteStatisticsSnapshot {
        WriteStatisticsSnapshot {
            write_req: self.write_req.fetch(),
            point_write_req: self.point_write_req.fetch(),
            point_write_req_local: self.point_write_req_local.fetch(),
            point_write_req_remote: self.point_write_req_remote.fetch(),
            write_ok: self.write_ok.fetch(),
            write_dropped: self.write_dropped.fetch(),
            write_timeout: self.write_timeout.fetch(),
            write_err: self.write_err.fetch(),
            sub_write_ok: self.sub_write_ok.fetch(),
            sub_write_drop: self.sub_write_drop.fetch(),
        }
    }

    /// A `write` [`Statistic`] carrying the current counter values and `tags`.
    pub fn statistic(&self, tags: BTreeMap<String, String>) -> Statistic {
        let s = self.snapshot();
        [
            (STAT_WRITE_REQ, s.write_req),
            (STAT_POINT_WRITE_REQ, s.point_write_req),
            (STAT_POINT_WRITE_REQ_LOCAL, s.point_write_req_local),
            (STAT_POINT_WRITE_REQ_REMOTE, s.point_write_req_remote),
            (STAT_WRITE_OK, s.write_ok),
            (STAT_WRITE_DROP, s.write_dropped),
            (STAT_WRITE_TIMEOUT, s.write_timeout),
            (STAT_WRITE_ERR, s.write_err),
            (STAT_SUB_WRITE_OK, s.sub_write_ok),
            (STAT_SUB_WRITE_DROP, s.sub_write_drop),
        ]
        .into_iter()
        .fold(Statistic::new("write", tags), |stat, (k, v)| {
            stat.with_value(k, i64::try_from(v).unwrap_or(i64::MAX))
        })
    }
}

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use influxdb_meta::{MetaClient, NodeId, ShardInfo};
use influxdb_models::{ConsistencyLevel, MIN_NANO_TIME, Point, Statistic};
use influxdb_tsdb::TsdbStore;
use iox_time::{SystemProvider, TimeProvider};
use observability_deps::tracing::*;
use tokio::sync::{Semaphore, mpsc};

use crate::{
    Error, IntoWriteRequest, Result, ShardGroupList, ShardMapping, ShardWriter, Subscriber,
    WritePointsRequest, WriteStatistics, WriteStatisticsSnapshot, subscriber::Lifecycle,
};

/// The time a write waits for every shard to acknowledge before giving up.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// The default bound on per-shard writes in flight across all calls to a [`PointsWriter`].
pub const DEFAULT_MAX_CONCURRENT_SHARD_WRITES: usize = 1024;

/// Tunables for a [`PointsWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointsWriterConfig {
    pub write_timeout: Duration,
    pub max_concurrent_shard_writes: usize,

    /// The ID of this node. When set, shards this node does not own are written through the
    /// configured [`ShardWriter`].
    pub node_id: Option<NodeId>,
}

impl Default for PointsWriterConfig {
    fn default() -> Self {
        Self {
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            max_concurrent_shard_writes: DEFAULT_MAX_CONCURRENT_SHARD_WRITES,
            node_id: None,
        }
    }
}

/// Maps points to the shards that store them and writes every shard concurrently.
///
/// # Mapping
///
/// Each point is assigned to the shard group whose interval contains its timestamp, creating
/// groups through the [`MetaClient`] as needed, and then to a shard within that group by the
/// hash of its series key. Points older than the retention policy allows are dropped and counted
/// but do not fail the write.
///
/// # Dispatch
///
/// One task per shard writes that shard's points. The call returns once every shard has
/// acknowledged, on the first shard error, when [`PointsWriterConfig::write_timeout`] elapses, or
/// when the writer is closed.
///
/// A shard that is known to the metadata service but not yet present on this node is created and
/// the write retried once. Partial writes are returned unchanged and never retried.
#[derive(Debug)]
pub struct PointsWriter {
    meta: Arc<dyn MetaClient>,
    dispatcher: Dispatcher,
    subscriber: Option<Arc<dyn Subscriber>>,
    time_provider: Arc<dyn TimeProvider>,
    lifecycle: Lifecycle,
    write_timeout: Duration,
}

impl PointsWriter {
    pub fn new(
        meta: Arc<dyn MetaClient>,
        store: Arc<dyn TsdbStore>,
        config: PointsWriterConfig,
        metrics: &metric::Registry,
    ) -> Self {
        Self {
            meta,
            dispatcher: Dispatcher {
                store,
                shard_writer: None,
                node_id: config.node_id,
                permits: Arc::new(Semaphore::new(config.max_concurrent_shard_writes.max(1))),
                stats: Arc::new(WriteStatistics::new(metrics)),
            },
            subscriber: None,
            time_provider: Arc::new(SystemProvider::new()),
            lifecycle: Lifecycle::default(),
            write_timeout: config.write_timeout,
        }
    }

    /// Write shards owned by other nodes through `shard_writer`.
    pub fn with_shard_writer(mut self, shard_writer: Arc<dyn ShardWriter>) -> Self {
        self.dispatcher.shard_writer = Some(shard_writer);
        self
    }

    /// Mirror every write to `subscriber` once [`PointsWriter::open()`] is called.
    pub fn with_subscriber(mut self, subscriber: Arc<dyn Subscriber>) -> Self {
        self.subscriber = Some(subscriber);
        self
    }

    pub fn with_time_provider(mut self, time_provider: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = time_provider;
        self
    }

    /// Reset the close signal and attach the subscriber, if any.
    pub fn open(&self) {
        self.lifecycle.open(self.subscriber.as_deref());
        info!(subscriber = self.subscriber.is_some(), "opened points writer");
    }

    /// Fail every in-flight write with [`Error::WriteFailed`] and detach the subscriber.
    ///
    /// Shard writes already dispatched are left to complete; their results are discarded.
    pub fn close(&self) {
        self.lifecycle.close();
        info!("closed points writer");
    }

    pub fn stats(&self) -> WriteStatisticsSnapshot {
        self.dispatcher.stats.snapshot()
    }

    /// The statistics of this writer, labelled with `tags`.
    pub fn statistics(&self, tags: BTreeMap<String, String>) -> Vec<Statistic> {
        vec![self.dispatcher.stats.statistic(tags)]
    }

    /// Assign every point of `req` to a shard, creating shard groups as needed.
    ///
    /// `req.retention_policy` must name an existing policy.
    pub async fn map_shards(&self, req: &WritePointsRequest) -> Result<ShardMapping> {
        let rp = self
            .meta
            .retention_policy(&req.database, &req.retention_policy)
            .await
            .map_err(|e| match e {
                influxdb_meta::Error::DatabaseNotFound { name } => Error::DatabaseNotFound(name),
                e => Error::Meta(e),
            })?
            .ok_or_else(|| Error::RetentionPolicyNotFound(req.retention_policy.clone()))?;

        // Points older than this are outside the retention window. A zero duration retains
        // data forever.
        let min_time = if rp.duration.is_zero() {
            MIN_NANO_TIME
        } else {
            let duration = i64::try_from(rp.duration.as_nanos()).unwrap_or(i64::MAX);
            self.time_provider
                .now()
                .timestamp_nanos()
                .saturating_sub(duration)
                .max(MIN_NANO_TIME)
        };

        // Make sure a shard group exists for every point, asking the metadata service once per
        // group rather than once per point.
        let mut list = ShardGroupList::default();
        for p in &req.points {
            if p.time() < min_time || list.covers(p.time()) {
                continue;
            }

            let sg = self
                .meta
                .create_shard_group(&req.database, &rp.name, p.time())
                .await?
                .ok_or(Error::NilShardGroup)?;
            debug!(
                database = %req.database,
                retention_policy = %rp.name,
                shard_group_id = %sg.id,
                start_time = sg.start_time,
                end_time = sg.end_time,
                "resolved shard group"
            );
            list.append(sg);
        }

        let mut mapping = ShardMapping::new();
        for p in &req.points {
            let sg = match list.shard_group_at(p.time()) {
                Some(sg) if p.time() >= min_time => sg,
                _ => {
                    self.dispatcher.stats.write_dropped.inc(1);
                    debug!(
                        database = %req.database,
                        retention_policy = %rp.name,
                        time = p.time(),
                        min_time,
                        "dropping point outside retention window"
                    );
                    continue;
                }
            };

            let shard = sg
                .shard_for(p.hash_id())
                .ok_or(Error::EmptyShardGroup(sg.id))?;
            mapping.map_point(shard, p.clone());
        }

        Ok(mapping)
    }

    /// Write `points` to `database` and `retention_policy`, the database's default policy if
    /// empty.
    ///
    /// The consistency level is recorded but not enforced: each shard is written to a single
    /// target.
    pub async fn write_points(
        &self,
        database: &str,
        retention_policy: &str,
        consistency: ConsistencyLevel,
        points: Vec<Point>,
    ) -> Result<()> {
        let stats = &self.dispatcher.stats;
        stats.write_req.inc(1);
        stats.point_write_req.inc(points.len() as u64);

        let retention_policy = if retention_policy.is_empty() {
            self.meta
                .database(database)
                .await
                .ok_or_else(|| Error::DatabaseNotFound(database.to_string()))?
                .default_retention_policy
        } else {
            retention_policy.to_string()
        };

        let req = Arc::new(WritePointsRequest {
            database: database.to_string(),
            retention_policy,
            points,
        });

        let mapping = self.map_shards(&req).await?;
        let closing = self.lifecycle.closing();
        let shard_count = mapping.len();

        debug!(
            database = %req.database,
            retention_policy = %req.retention_policy,
            %consistency,
            shard_count,
            point_count = mapping.point_count(),
            "dispatching write"
        );

        // Every task sends exactly one result, so a channel sized to the shard count never
        // blocks a sender.
        let (tx, mut rx) = mpsc::channel(shard_count.max(1));
        for (shard, points) in mapping.into_shards() {
            let tx = tx.clone();
            let dispatcher = self.dispatcher.clone();
            let req = Arc::clone(&req);
            let span = info_span!("shard_write", shard_id = %shard.id);
            tokio::spawn(
                async move {
                    let res = dispatcher
                        .write_to_shard(&shard, &req.database, &req.retention_policy, &points)
                        .await;
                    // The receiver is gone if the call already returned.
                    let _ = tx.send(res).await;
                }
                .instrument(span),
            );
        }
        drop(tx);

        if self.lifecycle.try_publish(Arc::clone(&req)) {
            stats.sub_write_ok.inc(1);
        } else {
            stats.sub_write_drop.inc(1);
        }

        let timeout = tokio::time::sleep(self.write_timeout);
        tokio::pin!(timeout);

        for _ in 0..shard_count {
            tokio::select! {
                biased;
                _ = closing.cancelled() => return Err(Error::WriteFailed),
                _ = &mut timeout => {
                    stats.write_timeout.inc(1);
                    return Err(Error::Timeout);
                }
                res = rx.recv() => match res {
                    Some(Ok(())) => {}
                    Some(Err(e)) => return Err(e),
                    // A shard task exited without reporting.
                    None => return Err(Error::WriteFailed),
                },
            }
        }

        Ok(())
    }

    /// Write the points of an `INTO` query with consistency level [`ConsistencyLevel::One`].
    pub async fn write_points_into(&self, req: IntoWriteRequest) -> Result<()> {
        let req = WritePointsRequest::from(req);
        self.write_points(
            &req.database,
            &req.retention_policy,
            ConsistencyLevel::One,
            req.points,
        )
        .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    First,
    Retry,
}

/// The state a spawned shard write needs.
#[derive(Debug, Clone)]
struct Dispatcher {
    store: Arc<dyn TsdbStore>,
    shard_writer: Option<Arc<dyn ShardWriter>>,
    node_id: Option<NodeId>,
    permits: Arc<Semaphore>,
    stats: Arc<WriteStatistics>,
}

impl Dispatcher {
    async fn write_to_shard(
        &self,
        shard: &ShardInfo,
        database: &str,
        retention_policy: &str,
        points: &[Point],
    ) -> Result<()> {
        // The semaphore is never closed.
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::WriteFailed)?;

        match (self.node_id, &self.shard_writer) {
            (Some(node_id), Some(writer)) if !shard.owned_by(node_id) => {
                self.write_remote(shard, writer.as_ref(), points).await
            }
            _ => {
                self.write_local(shard, database, retention_policy, points)
                    .await
            }
        }
    }

    async fn write_local(
        &self,
        shard: &ShardInfo,
        database: &str,
        retention_policy: &str,
        points: &[Point],
    ) -> Result<()> {
        let shard_id = shard.id;
        self.stats.point_write_req_local.inc(points.len() as u64);

        let mut attempt = Attempt::First;
        loop {
            let err = match self.store.write_to_shard(shard_id, points).await {
                Ok(()) => {
                    self.stats.write_ok.inc(1);
                    return Ok(());
                }
                Err(e @ influxdb_tsdb::Error::PartialWrite { .. }) => {
                    self.stats.write_err.inc(1);
                    return Err(e.into());
                }
                Err(influxdb_tsdb::Error::ShardNotFound) if attempt == Attempt::First => {
                    debug!(%shard_id, %database, %retention_policy, "shard not found, creating");
                    match self
                        .store
                        .create_shard(database, retention_policy, shard_id, true)
                        .await
                    {
                        Ok(()) => {
                            attempt = Attempt::Retry;
                            continue;
                        }
                        Err(e) => {
                            warn!(%shard_id, error = %e, "failed to create shard");
                            e
                        }
                    }
                }
                Err(e) => {
                    warn!(%shard_id, ?attempt, error = %e, "write failed for shard");
                    e
                }
            };

            self.stats.write_err.inc(1);
            return Err(err.into());
        }
    }

    /// Write to each owner of `shard` in turn until one succeeds.
    async fn write_remote(
        &self,
        shard: &ShardInfo,
        writer: &dyn ShardWriter,
        points: &[Point],
    ) -> Result<()> {
        let shard_id = shard.id;
        self.stats.point_write_req_remote.inc(points.len() as u64);

        let mut last_err = None;
        for owner in &shard.owners {
            match writer.write_shard(shard_id, owner.node_id, points).await {
                Ok(()) => {
                    self.stats.write_ok.inc(1);
                    return Ok(());
                }
                Err(e) => {
                    debug!(
                        %shard_id,
                        owner = %owner.node_id,
                        error = %e,
                        "remote shard write failed"
                    );
                    last_err = Some(e);
                }
            }
        }

        self.stats.write_err.inc(1);
        let err = match last_err {
            Some(source) => Error::Remote { shard_id, source },
            None => Error::NoShardOwners(shard_id),
        };
        warn!(%shard_id, error = %err, "write failed for shard");
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use influxdb_meta::{DatabaseInfo, RetentionPolicyInfo, ShardGroupId, ShardGroupInfo, ShardId};
    use influxdb_models::{FieldValue, Tags};
    use iox_time::{MockProvider, Time};

    use super::*;
    use crate::mock::{MockMetaClient, MockTsdbStore};

    const HOUR: i64 = 60 * 60 * 1_000_000_000;

    fn point(host: &str, time: i64) -> Point {
        Point::new(
            "cpu",
            Tags::new([("host", host)]).unwrap(),
            [("value".to_string(), FieldValue::from(1.0))]
                .into_iter()
                .collect(),
            time,
        )
        .unwrap()
    }

    fn database(rp: RetentionPolicyInfo) -> DatabaseInfo {
        DatabaseInfo {
            name: "db".to_string(),
            default_retention_policy: rp.name.clone(),
            retention_policies: vec![rp],
        }
    }

    fn hourly_groups(meta: MockMetaClient, hours: std::ops::Range<i64>) -> MockMetaClient {
        hours.fold(meta, |meta, h| {
            meta.with_shard_group(
                "db",
                "rp",
                ShardGroupInfo::new(
                    ShardGroupId::new(h as u64),
                    h * HOUR,
                    (h + 1) * HOUR,
                    vec![ShardInfo::new(ShardId::new(h as u64))],
                ),
            )
        })
    }

    fn writer(meta: MockMetaClient, now: i64) -> (PointsWriter, Arc<MockMetaClient>) {
        let meta = Arc::new(meta);
        let w = PointsWriter::new(
            Arc::clone(&meta) as _,
            Arc::new(MockTsdbStore::default()),
            PointsWriterConfig::default(),
            &metric::Registry::new(),
        )
        .with_time_provider(Arc::new(MockProvider::new(Time::from_timestamp_nanos(now))));
        (w, meta)
    }

    #[tokio::test]
    async fn test_map_shards_creates_each_group_once() {
        let meta = hourly_groups(
            MockMetaClient::default().with_database(database(RetentionPolicyInfo::new(
                "rp",
                Duration::ZERO,
            ))),
            0..3,
        );
        let (w, meta) = writer(meta, 0);

        let req = WritePointsRequest {
            database: "db".to_string(),
            retention_policy: "rp".to_string(),
            points: vec![
                point("a", 10),
                point("b", 20),
                point("a", HOUR + 1),
                point("a", 30),
                point("c", 2 * HOUR),
            ],
        };
        let mapping = w.map_shards(&req).await.unwrap();

        // One metadata round trip per distinct group.
        let calls = meta
            .create_shard_group_calls()
            .into_iter()
            .map(|(_, _, t)| t)
            .collect::<Vec<_>>();
        assert_eq!(calls, [10, HOUR + 1, 2 * HOUR]);

        assert_eq!(mapping.len(), 3);
        assert_eq!(mapping.point_count(), 5);
        assert_eq!(mapping.points(ShardId::new(0)).unwrap().len(), 3);
        assert_eq!(w.stats().write_dropped, 0);
    }

    #[tokio::test]
    async fn test_map_shards_drops_points_outside_retention() {
        let meta = hourly_groups(
            MockMetaClient::default().with_database(database(RetentionPolicyInfo::new(
                "rp",
                Duration::from_secs(60 * 60),
            ))),
            0..10,
        );
        let now = 5 * HOUR;
        let (w, meta) = writer(meta, now);

        let req = WritePointsRequest {
            database: "db".to_string(),
            retention_policy: "rp".to_string(),
            points: vec![point("a", now - 2 * HOUR), point("a", now - HOUR / 6)],
        };
        let mapping = w.map_shards(&req).await.unwrap();

        // The expired point never reaches the metadata service.
        assert_eq!(meta.create_shard_group_calls().len(), 1);
        assert_eq!(mapping.point_count(), 1);
        let kept = mapping.points(ShardId::new(4)).unwrap();
        assert_eq!(kept[0].time(), now - HOUR / 6);
        assert_eq!(w.stats().write_dropped, 1);
    }

    #[tokio::test]
    async fn test_map_shards_errors() {
        let (w, _) = writer(MockMetaClient::default(), 0);
        let req = WritePointsRequest {
            database: "db".to_string(),
            retention_policy: "rp".to_string(),
            points: vec![point("a", 1)],
        };
        assert_matches!(
            w.map_shards(&req).await,
            Err(Error::DatabaseNotFound(name)) => assert_eq!(name, "db")
        );

        let meta = MockMetaClient::default()
            .with_database(database(RetentionPolicyInfo::new("rp", Duration::ZERO)));
        let (w, _) = writer(meta, 0);
        let missing = WritePointsRequest {
            retention_policy: "nope".to_string(),
            ..req.clone()
        };
        assert_matches!(
            w.map_shards(&missing).await,
            Err(Error::RetentionPolicyNotFound(name)) => assert_eq!(name, "nope")
        );

        let meta = MockMetaClient::default()
            .with_database(database(RetentionPolicyInfo::new("rp", Duration::ZERO)))
            .with_nil_shard_groups();
        let (w, _) = writer(meta, 0);
        assert_matches!(w.map_shards(&req).await, Err(Error::NilShardGroup));

        let meta = MockMetaClient::default()
            .with_database(database(RetentionPolicyInfo::new("rp", Duration::ZERO)))
            .with_shard_group(
                "db",
                "rp",
                ShardGroupInfo::new(ShardGroupId::new(9), 0, HOUR, vec![]),
            );
        let (w, _) = writer(meta, 0);
        assert_matches!(
            w.map_shards(&req).await,
            Err(Error::EmptyShardGroup(id)) => assert_eq!(id, ShardGroupId::new(9))
        );
    }

    #[test]
    fn test_default_config() {
        let config = PointsWriterConfig::default();
        assert_eq!(config.write_timeout, Duration::from_secs(10));
        assert_eq!(config.max_concurrent_shard_writes, 1024);
        assert_eq!(config.node_id, None);
    }
}

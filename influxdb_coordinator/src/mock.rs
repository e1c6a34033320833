//! Scripted collaborator doubles for exercising a [`PointsWriter`](crate::PointsWriter).

use std::{collections::VecDeque, time::Duration};

use async_trait::async_trait;
use hashbrown::HashMap;
use influxdb_meta::{
    DatabaseInfo, MetaClient, NodeId, RetentionPolicyInfo, ShardGroupInfo, ShardId, ShardLocation,
};
use influxdb_models::Point;
use influxdb_tsdb::TsdbStore;
use parking_lot::Mutex;

use crate::{ShardWriteError, ShardWriter};

#[derive(Debug, Default)]
struct MetaState {
    databases: HashMap<String, DatabaseInfo>,
    /// Shard groups served by `create_shard_group`, keyed by database and retention policy.
    shard_groups: Vec<(String, String, ShardGroupInfo)>,
    nil_shard_groups: bool,
    calls: Vec<(String, String, i64)>,
}

/// A [`MetaClient`] serving a fixed set of databases and shard groups.
///
/// `create_shard_group` returns the configured group containing the requested timestamp, or
/// nothing if no such group was configured.
#[derive(Debug, Default)]
pub struct MockMetaClient {
    state: Mutex<MetaState>,
}

impl MockMetaClient {
    pub fn with_database(self, db: DatabaseInfo) -> Self {
        self.state.lock().databases.insert(db.name.clone(), db);
        self
    }

    pub fn with_shard_group(
        self,
        database: impl Into<String>,
        retention_policy: impl Into<String>,
        sg: ShardGroupInfo,
    ) -> Self {
        self.state
            .lock()
            .shard_groups
            .push((database.into(), retention_policy.into(), sg));
        self
    }

    /// Answer every shard group request with nothing.
    pub fn with_nil_shard_groups(self) -> Self {
        self.state.lock().nil_shard_groups = true;
        self
    }

    /// The `(database, retention_policy, timestamp)` of every `create_shard_group` call.
    pub fn create_shard_group_calls(&self) -> Vec<(String, String, i64)> {
        self.state.lock().calls.clone()
    }
}

#[async_trait]
impl MetaClient for MockMetaClient {
    async fn database(&self, name: &str) -> Option<DatabaseInfo> {
        self.state.lock().databases.get(name).cloned()
    }

    async fn retention_policy(
        &self,
        database: &str,
        policy: &str,
    ) -> influxdb_meta::Result<Option<RetentionPolicyInfo>> {
        let state = self.state.lock();
        let db = state
            .databases
            .get(database)
            .ok_or_else(|| influxdb_meta::Error::DatabaseNotFound {
                name: database.to_string(),
            })?;
        Ok(db.retention_policy(policy).cloned())
    }

    async fn create_shard_group(
        &self,
        database: &str,
        policy: &str,
        timestamp: i64,
    ) -> influxdb_meta::Result<Option<ShardGroupInfo>> {
        let mut state = self.state.lock();
        state
            .calls
            .push((database.to_string(), policy.to_string(), timestamp));
        if state.nil_shard_groups {
            return Ok(None);
        }
        Ok(state
            .shard_groups
            .iter()
            .find(|(db, rp, sg)| db == database && rp == policy && sg.contains(timestamp))
            .map(|(_, _, sg)| sg.clone()))
    }

    async fn shard_owner(&self, shard_id: ShardId) -> Option<ShardLocation> {
        self.state
            .lock()
            .shard_groups
            .iter()
            .find(|(_, _, sg)| sg.shards.iter().any(|s| s.id == shard_id))
            .map(|(db, rp, sg)| ShardLocation {
                database: db.clone(),
                retention_policy: rp.clone(),
                shard_group: sg.clone(),
            })
    }
}

/// A call made to a [`MockTsdbStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum MockStoreCall {
    CreateShard {
        database: String,
        retention_policy: String,
        shard_id: ShardId,
        enabled: bool,
    },
    WriteToShard {
        shard_id: ShardId,
        points: Vec<Point>,
    },
}

#[derive(Debug, Default)]
struct StoreState {
    calls: Vec<MockStoreCall>,
    write_ret: HashMap<ShardId, VecDeque<influxdb_tsdb::Result<()>>>,
    create_ret: VecDeque<influxdb_tsdb::Result<()>>,
    delay: Option<Duration>,
}

/// A [`TsdbStore`] returning scripted results and recording every call.
///
/// Unscripted calls succeed.
#[derive(Debug, Default)]
pub struct MockTsdbStore {
    state: Mutex<StoreState>,
}

impl MockTsdbStore {
    pub fn calls(&self) -> Vec<MockStoreCall> {
        self.state.lock().calls.clone()
    }

    /// Results for successive writes to `shard_id`.
    pub fn with_write_ret(
        self,
        shard_id: ShardId,
        ret: impl Into<VecDeque<influxdb_tsdb::Result<()>>>,
    ) -> Self {
        self.state.lock().write_ret.insert(shard_id, ret.into());
        self
    }

    /// Results for successive shard creations.
    pub fn with_create_ret(self, ret: impl Into<VecDeque<influxdb_tsdb::Result<()>>>) -> Self {
        self.state.lock().create_ret = ret.into();
        self
    }

    /// Delay every write by `delay` before answering.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.state.lock().delay = Some(delay);
        self
    }

    pub fn write_calls(&self) -> Vec<(ShardId, Vec<Point>)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MockStoreCall::WriteToShard { shard_id, points } => Some((shard_id, points)),
                MockStoreCall::CreateShard { .. } => None,
            })
            .collect()
    }

    pub fn create_calls(&self) -> Vec<ShardId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MockStoreCall::CreateShard { shard_id, .. } => Some(shard_id),
                MockStoreCall::WriteToShard { .. } => None,
            })
            .collect()
    }
}

#[async_trait]
impl TsdbStore for MockTsdbStore {
    async fn create_shard(
        &self,
        database: &str,
        retention_policy: &str,
        shard_id: ShardId,
        enabled: bool,
    ) -> influxdb_tsdb::Result<()> {
        let mut state = self.state.lock();
        state.calls.push(MockStoreCall::CreateShard {
            database: database.to_string(),
            retention_policy: retention_policy.to_string(),
            shard_id,
            enabled,
        });
        state.create_ret.pop_front().unwrap_or(Ok(()))
    }

    async fn write_to_shard(
        &self,
        shard_id: ShardId,
        points: &[Point],
    ) -> influxdb_tsdb::Result<()> {
        let (ret, delay) = {
            let mut state = self.state.lock();
            state.calls.push(MockStoreCall::WriteToShard {
                shard_id,
                points: points.to_vec(),
            });
            let ret = state
                .write_ret
                .get_mut(&shard_id)
                .and_then(VecDeque::pop_front)
                .unwrap_or(Ok(()));
            (ret, state.delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        ret
    }
}

#[derive(Debug, Default)]
struct ShardWriterState {
    calls: Vec<(ShardId, NodeId, usize)>,
    ret: HashMap<NodeId, VecDeque<Result<(), ShardWriteError>>>,
}

/// A [`ShardWriter`] returning scripted results per owner node.
#[derive(Debug, Default)]
pub struct MockShardWriter {
    state: Mutex<ShardWriterState>,
}

impl MockShardWriter {
    /// The shard, owner and point count of every remote write, in call order.
    pub fn calls(&self) -> Vec<(ShardId, NodeId, usize)> {
        self.state.lock().calls.clone()
    }

    pub fn with_ret(
        self,
        owner: NodeId,
        ret: impl Into<VecDeque<Result<(), ShardWriteError>>>,
    ) -> Self {
        self.state.lock().ret.insert(owner, ret.into());
        self
    }
}

#[async_trait]
impl ShardWriter for MockShardWriter {
    async fn write_shard(
        &self,
        shard_id: ShardId,
        owner: NodeId,
        points: &[Point],
    ) -> Result<(), ShardWriteError> {
        let mut state = self.state.lock();
        state.calls.push((shard_id, owner, points.len()));
        state
            .ret
            .get_mut(&owner)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(()))
    }
}

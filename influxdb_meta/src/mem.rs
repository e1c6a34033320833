use std::collections::BTreeMap;

use async_trait::async_trait;
use influxdb_models::MIN_NANO_TIME;
use observability_deps::tracing::{debug, info};
use parking_lot::RwLock;

use crate::{
    DatabaseInfo, Error, MetaClient, NodeId, Result, RetentionPolicyInfo, ShardGroupId,
    ShardGroupInfo, ShardId, ShardInfo, ShardLocation,
};

#[derive(Debug, Default)]
struct State {
    databases: BTreeMap<String, DatabaseInfo>,
    last_shard_group_id: u64,
    last_shard_id: u64,
}

/// An in-memory [`MetaClient`] for a single process.
///
/// Shard groups are created on demand, aligned to the retention policy's shard group duration,
/// with a fixed number of shards each. When data nodes are configured, each shard is assigned
/// `replica_n` owners, rotating through the nodes so ownership spreads evenly.
#[derive(Debug)]
pub struct MemMetaClient {
    state: RwLock<State>,
    nodes: Vec<NodeId>,
    shards_per_group: usize,
}

impl Default for MemMetaClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MemMetaClient {
    pub fn new() -> Self {
        Self {
            state: Default::default(),
            nodes: vec![],
            shards_per_group: 1,
        }
    }

    /// Assign shard ownership across `nodes`.
    pub fn with_nodes(self, nodes: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            nodes: nodes.into_iter().collect(),
            ..self
        }
    }

    /// Create `n` shards in every new shard group. At least one shard is always created.
    pub fn with_shards_per_group(self, n: usize) -> Self {
        Self {
            shards_per_group: n.max(1),
            ..self
        }
    }

    /// Create a database with an infinite `autogen` default retention policy, or return the
    /// existing database of the same name.
    pub fn create_database(&self, name: &str) -> Result<DatabaseInfo> {
        if name.is_empty() {
            return Err(Error::DatabaseNameRequired);
        }

        let mut state = self.state.write();
        let db = state
            .databases
            .entry(name.to_string())
            .or_insert_with(|| {
                info!(database = name, "created database");
                let rp = RetentionPolicyInfo::autogen();
                DatabaseInfo {
                    name: name.to_string(),
                    default_retention_policy: rp.name.clone(),
                    retention_policies: vec![rp],
                }
            });
        Ok(db.clone())
    }

    /// Add `rp` to `database`, optionally making it the default.
    ///
    /// Creating a policy identical to an existing one is a no-op returning the existing policy.
    pub fn create_retention_policy(
        &self,
        database: &str,
        rp: RetentionPolicyInfo,
        make_default: bool,
    ) -> Result<RetentionPolicyInfo> {
        if rp.name.is_empty() {
            return Err(Error::RetentionPolicyNameRequired);
        }
        if rp.replica_n == 0 {
            return Err(Error::ReplicationFactorTooLow);
        }
        if rp.shard_group_duration.is_zero() {
            return Err(Error::ShardGroupDurationTooLow);
        }
        if !rp.duration.is_zero() && rp.duration < rp.shard_group_duration {
            return Err(Error::IncompatibleDurations);
        }

        let mut state = self.state.write();
        let db = state
            .databases
            .get_mut(database)
            .ok_or_else(|| Error::DatabaseNotFound {
                name: database.to_string(),
            })?;

        if let Some(existing) = db.retention_policy(&rp.name) {
            if existing.duration != rp.duration
                || existing.replica_n != rp.replica_n
                || existing.shard_group_duration != rp.shard_group_duration
            {
                return Err(Error::RetentionPolicyConflict { name: rp.name });
            }
            let existing = existing.clone();
            if make_default {
                db.default_retention_policy = existing.name.clone();
            }
            return Ok(existing);
        }

        if make_default {
            db.default_retention_policy = rp.name.clone();
        }
        db.retention_policies.push(rp.clone());
        Ok(rp)
    }

    fn owners_for(&self, shard_idx: usize, replica_n: usize) -> Vec<NodeId> {
        if self.nodes.is_empty() {
            return vec![];
        }
        (0..replica_n.min(self.nodes.len()))
            .map(|r| self.nodes[(shard_idx + r) % self.nodes.len()])
            .collect()
    }
}

/// Align `timestamp` down to a multiple of `duration` nanoseconds, returning the half-open
/// interval starting there.
///
/// The start is clamped to [`MIN_NANO_TIME`]; the end saturates at `i64::MAX` so the last
/// interval still contains [`influxdb_models::MAX_NANO_TIME`].
fn shard_group_bounds(timestamp: i64, duration: i64) -> (i64, i64) {
    let start = timestamp
        .checked_sub(timestamp.rem_euclid(duration))
        .unwrap_or(MIN_NANO_TIME)
        .max(MIN_NANO_TIME);
    let end = start.saturating_add(duration);
    (start, end)
}

#[async_trait]
impl MetaClient for MemMetaClient {
    async fn database(&self, name: &str) -> Option<DatabaseInfo> {
        self.state.read().databases.get(name).cloned()
    }

    async fn retention_policy(
        &self,
        database: &str,
        policy: &str,
    ) -> Result<Option<RetentionPolicyInfo>> {
        let state = self.state.read();
        let db = state
            .databases
            .get(database)
            .ok_or_else(|| Error::DatabaseNotFound {
                name: database.to_string(),
            })?;
        Ok(db.retention_policy(policy).cloned())
    }

    async fn create_shard_group(
        &self,
        database: &str,
        policy: &str,
        timestamp: i64,
    ) -> Result<Option<ShardGroupInfo>> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let db = state
            .databases
            .get_mut(database)
            .ok_or_else(|| Error::DatabaseNotFound {
                name: database.to_string(),
            })?;
        let rp = db
            .retention_policy_mut(policy)
            .ok_or_else(|| Error::RetentionPolicyNotFound {
                name: policy.to_string(),
            })?;

        if let Some(sg) = rp.shard_group_by_timestamp(timestamp) {
            return Ok(Some(sg.clone()));
        }

        let duration = i64::try_from(rp.shard_group_duration.as_nanos())
            .unwrap_or(i64::MAX)
            .max(1);
        let (start_time, end_time) = shard_group_bounds(timestamp, duration);

        state.last_shard_group_id += 1;
        let id = ShardGroupId::new(state.last_shard_group_id);

        let shards = (0..self.shards_per_group)
            .map(|_| {
                state.last_shard_id += 1;
                let owners = self.owners_for(state.last_shard_id as usize, rp.replica_n);
                ShardInfo::new(ShardId::new(state.last_shard_id)).with_owners(owners)
            })
            .collect();

        let sg = ShardGroupInfo::new(id, start_time, end_time, shards);
        debug!(
            %database,
            %policy,
            shard_group_id = %id,
            start_time,
            end_time,
            shard_count = sg.shards.len(),
            "created shard group"
        );

        rp.shard_groups.push(sg.clone());
        Ok(Some(sg))
    }

    async fn shard_owner(&self, shard_id: ShardId) -> Option<ShardLocation> {
        let state = self.state.read();
        state.databases.values().find_map(|db| {
            db.retention_policies.iter().find_map(|rp| {
                rp.shard_groups
                    .iter()
                    .find(|sg| sg.shards.iter().any(|s| s.id == shard_id))
                    .map(|sg| ShardLocation {
                        database: db.name.clone(),
                        retention_policy: rp.name.clone(),
                        shard_group: sg.clone(),
                    })
            })
        })
    }
}

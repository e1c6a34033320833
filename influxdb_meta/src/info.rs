use std::time::Duration;

use influxdb_models::MIN_NANO_TIME;
use serde::{Deserialize, Serialize};

use crate::{NodeId, ShardGroupId, ShardId};

/// The name of the retention policy created alongside a new database.
pub const DEFAULT_RETENTION_POLICY_NAME: &str = "autogen";

/// Retention policies longer than this, or infinite, get [`LONG_SHARD_GROUP_DURATION`] shard
/// groups.
const SIX_MONTHS: Duration = Duration::from_secs(180 * 24 * 60 * 60);
const TWO_DAYS: Duration = Duration::from_secs(2 * 24 * 60 * 60);

const LONG_SHARD_GROUP_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const MEDIUM_SHARD_GROUP_DURATION: Duration = Duration::from_secs(24 * 60 * 60);
const SHORT_SHARD_GROUP_DURATION: Duration = Duration::from_secs(60 * 60);

/// Pick the shard group duration for a retention policy of `duration` when none was requested.
///
/// A zero `duration` means the data is retained forever.
pub fn normalised_shard_group_duration(duration: Duration) -> Duration {
    if duration.is_zero() || duration > SIX_MONTHS {
        LONG_SHARD_GROUP_DURATION
    } else if duration >= TWO_DAYS {
        MEDIUM_SHARD_GROUP_DURATION
    } else {
        SHORT_SHARD_GROUP_DURATION
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub name: String,
    pub default_retention_policy: String,
    pub retention_policies: Vec<RetentionPolicyInfo>,
}

impl DatabaseInfo {
    pub fn retention_policy(&self, name: &str) -> Option<&RetentionPolicyInfo> {
        self.retention_policies.iter().find(|rp| rp.name == name)
    }

    pub(crate) fn retention_policy_mut(&mut self, name: &str) -> Option<&mut RetentionPolicyInfo> {
        self.retention_policies.iter_mut().find(|rp| rp.name == name)
    }
}

/// A named data-lifetime and replication configuration attached to a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicyInfo {
    pub name: String,
    pub replica_n: usize,
    /// How long data is kept; zero means forever.
    pub duration: Duration,
    pub shard_group_duration: Duration,
    pub shard_groups: Vec<ShardGroupInfo>,
}

impl RetentionPolicyInfo {
    /// A retention policy named `name` keeping data for `duration`, with a single replica and the
    /// normalised shard group duration.
    pub fn new(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            replica_n: 1,
            duration,
            shard_group_duration: normalised_shard_group_duration(duration),
            shard_groups: vec![],
        }
    }

    /// The infinite retention policy every new database starts with.
    pub fn autogen() -> Self {
        Self::new(DEFAULT_RETENTION_POLICY_NAME, Duration::ZERO)
    }

    pub fn with_replica_n(self, replica_n: usize) -> Self {
        Self { replica_n, ..self }
    }

    pub fn with_shard_group_duration(self, shard_group_duration: Duration) -> Self {
        Self {
            shard_group_duration,
            ..self
        }
    }

    /// The shard group that contains `timestamp`, ignoring deleted groups.
    pub fn shard_group_by_timestamp(&self, timestamp: i64) -> Option<&ShardGroupInfo> {
        self.shard_groups
            .iter()
            .find(|sg| !sg.deleted() && sg.contains(timestamp))
    }
}

/// A time interval `[start_time, end_time)` and the shards that store every point whose
/// timestamp falls in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardGroupInfo {
    pub id: ShardGroupId,
    pub start_time: i64,
    pub end_time: i64,
    pub deleted_at: Option<i64>,
    pub truncated_at: Option<i64>,
    pub shards: Vec<ShardInfo>,
}

impl ShardGroupInfo {
    pub fn new(id: ShardGroupId, start_time: i64, end_time: i64, shards: Vec<ShardInfo>) -> Self {
        Self {
            id,
            start_time,
            end_time,
            deleted_at: None,
            truncated_at: None,
            shards,
        }
    }

    /// A group spanning every representable timestamp.
    pub fn unbounded(id: ShardGroupId, shards: Vec<ShardInfo>) -> Self {
        Self::new(id, MIN_NANO_TIME, i64::MAX, shards)
    }

    /// True if `t` is in `[start_time, end_time)`.
    pub fn contains(&self, t: i64) -> bool {
        self.start_time <= t && t < self.end_time
    }

    /// True if the group has any overlap with `[min, max]`.
    pub fn overlaps(&self, min: i64, max: i64) -> bool {
        self.start_time <= max && self.end_time > min
    }

    pub fn deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Select the shard within this group storing series with hash `hash`.
    ///
    /// The same hash always selects the same shard for a given group. Returns [`None`] only if
    /// the group has no shards.
    pub fn shard_for(&self, hash: u64) -> Option<&ShardInfo> {
        if self.shards.is_empty() {
            return None;
        }
        let idx = hash % self.shards.len() as u64;
        self.shards.get(idx as usize)
    }

    /// The key shard groups are ordered by: end time first, then start time.
    pub fn sort_key(&self) -> (i64, i64) {
        (self.end_time, self.start_time)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardInfo {
    pub id: ShardId,
    pub owners: Vec<ShardOwner>,
}

impl ShardInfo {
    pub fn new(id: ShardId) -> Self {
        Self { id, owners: vec![] }
    }

    pub fn with_owners(self, owners: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            owners: owners
                .into_iter()
                .map(|node_id| ShardOwner { node_id })
                .collect(),
            ..self
        }
    }

    pub fn owned_by(&self, node_id: NodeId) -> bool {
        self.owners.iter().any(|o| o.node_id == node_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardOwner {
    pub node_id: NodeId,
}

/// The database, retention policy and shard group a shard belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardLocation {
    pub database: String,
    pub retention_policy: String,
    pub shard_group: ShardGroupInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalised_shard_group_duration() {
        let hour = Duration::from_secs(60 * 60);
        let day = 24 * hour;

        assert_eq!(normalised_shard_group_duration(Duration::ZERO), 7 * day);
        assert_eq!(normalised_shard_group_duration(365 * day), 7 * day);
        assert_eq!(normalised_shard_group_duration(180 * day), day);
        assert_eq!(normalised_shard_group_duration(2 * day), day);
        assert_eq!(normalised_shard_group_duration(47 * hour), hour);
        assert_eq!(normalised_shard_group_duration(hour), hour);
    }

    #[test]
    fn test_shard_group_contains_is_half_open() {
        let sg = ShardGroupInfo::new(ShardGroupId::new(1), 10, 20, vec![]);
        assert!(!sg.contains(9));
        assert!(sg.contains(10));
        assert!(sg.contains(19));
        assert!(!sg.contains(20));

        assert!(sg.overlaps(0, 10));
        assert!(sg.overlaps(19, 30));
        assert!(!sg.overlaps(20, 30));
        assert!(!sg.overlaps(0, 9));
    }

    #[test]
    fn test_shard_for_is_stable() {
        let shards = (1..=3).map(|id| ShardInfo::new(ShardId::new(id))).collect();
        let sg = ShardGroupInfo::new(ShardGroupId::new(1), 0, 100, shards);

        assert_eq!(sg.shard_for(0).unwrap().id, ShardId::new(1));
        assert_eq!(sg.shard_for(4).unwrap().id, ShardId::new(2));
        assert_eq!(sg.shard_for(u64::MAX).unwrap().id, ShardId::new(1));
        for hash in [7, 1_000_003, u64::MAX - 5] {
            assert_eq!(sg.shard_for(hash), sg.shard_for(hash));
        }

        let empty = ShardGroupInfo::new(ShardGroupId::new(2), 0, 100, vec![]);
        assert!(empty.shard_for(1).is_none());
    }

    #[test]
    fn test_shard_ownership() {
        let shard = ShardInfo::new(ShardId::new(1)).with_owners([NodeId::new(2), NodeId::new(3)]);
        assert!(shard.owned_by(NodeId::new(3)));
        assert!(!shard.owned_by(NodeId::new(1)));
    }
}

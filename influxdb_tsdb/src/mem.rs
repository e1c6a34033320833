use async_trait::async_trait;
use hashbrown::{HashMap, hash_map::Entry};
use influxdb_meta::ShardId;
use influxdb_models::{FieldType, Point};
use observability_deps::tracing::{debug, warn};
use parking_lot::RwLock;

use crate::{Error, Result, TsdbStore};

#[derive(Debug)]
struct Shard {
    database: String,
    retention_policy: String,
    enabled: bool,
    /// The type of every `(measurement, field)` seen so far.
    field_types: HashMap<(String, String), FieldType>,
    points: Vec<Point>,
}

impl Shard {
    /// Returns the first conflict between `point` and the field types already in this shard.
    fn conflict(&self, point: &Point) -> Option<String> {
        point.fields().iter().find_map(|(name, value)| {
            let got = value.field_type();
            match self
                .field_types
                .get(&(point.name().to_string(), name.clone()))
            {
                Some(&want) if want != got => Some(format!(
                    "field type conflict: input field \"{name}\" on measurement \"{}\" is type \
                     {got}, already exists as type {want}",
                    point.name()
                )),
                _ => None,
            }
        })
    }

    fn accept(&mut self, point: &Point) {
        for (name, value) in point.fields() {
            self.field_types
                .entry((point.name().to_string(), name.clone()))
                .or_insert_with(|| value.field_type());
        }
        self.points.push(point.clone());
    }
}

/// An in-memory [`TsdbStore`].
///
/// Each shard records the type of every field it has accepted. Points that would change the type
/// of an existing field are rejected while the rest of the write is kept, surfacing as
/// [`Error::PartialWrite`], or [`Error::Rejected`] when nothing was kept.
#[derive(Debug, Default)]
pub struct MemStore {
    shards: RwLock<HashMap<ShardId, Shard>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The IDs of every shard on this store, in ascending order.
    pub fn shard_ids(&self) -> Vec<ShardId> {
        let mut ids = self.shards.read().keys().copied().collect::<Vec<_>>();
        ids.sort_unstable();
        ids
    }

    /// A copy of every point accepted by `shard_id`, in write order.
    pub fn points(&self, shard_id: ShardId) -> Option<Vec<Point>> {
        self.shards.read().get(&shard_id).map(|s| s.points.clone())
    }

    /// The database and retention policy `shard_id` was created for.
    pub fn shard_owner(&self, shard_id: ShardId) -> Option<(String, String)> {
        self.shards
            .read()
            .get(&shard_id)
            .map(|s| (s.database.clone(), s.retention_policy.clone()))
    }

    /// Enable or disable writes to `shard_id`.
    pub fn set_shard_enabled(&self, shard_id: ShardId, enabled: bool) -> Result<()> {
        self.shards
            .write()
            .get_mut(&shard_id)
            .map(|s| s.enabled = enabled)
            .ok_or(Error::ShardNotFound)
    }
}

#[async_trait]
impl TsdbStore for MemStore {
    async fn create_shard(
        &self,
        database: &str,
        retention_policy: &str,
        shard_id: ShardId,
        enabled: bool,
    ) -> Result<()> {
        if let Entry::Vacant(v) = self.shards.write().entry(shard_id) {
            debug!(%shard_id, %database, %retention_policy, enabled, "created shard");
            v.insert(Shard {
                database: database.to_string(),
                retention_policy: retention_policy.to_string(),
                enabled,
                field_types: HashMap::new(),
                points: vec![],
            });
        }
        Ok(())
    }

    async fn write_to_shard(&self, shard_id: ShardId, points: &[Point]) -> Result<()> {
        let mut shards = self.shards.write();
        let shard = shards.get_mut(&shard_id).ok_or(Error::ShardNotFound)?;
        if !shard.enabled {
            return Err(Error::ShardDisabled(shard_id));
        }

        let mut dropped = 0;
        let mut reason = None;
        for point in points {
            match shard.conflict(point) {
                Some(r) => {
                    dropped += 1;
                    reason.get_or_insert(r);
                }
                None => shard.accept(point),
            }
        }

        match reason {
            None => Ok(()),
            Some(reason) if dropped == points.len() => {
                warn!(%shard_id, dropped, %reason, "rejected every point in shard write");
                Err(Error::Rejected { reason, dropped })
            }
            Some(reason) => {
                warn!(%shard_id, dropped, %reason, "rejected points in shard write");
                Err(Error::PartialWrite { reason, dropped })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use influxdb_models::{FieldValue, Fields, Tags};

    use super::*;

    fn point(name: &str, field: &str, value: impl Into<FieldValue>, time: i64) -> Point {
        let fields: Fields = [(field.to_string(), value.into())].into_iter().collect();
        Point::new(name, Tags::default(), fields, time).unwrap()
    }

    #[tokio::test]
    async fn test_write_requires_shard() {
        let store = MemStore::new();
        let shard_id = ShardId::new(1);

        assert_matches!(
            store
                .write_to_shard(shard_id, &[point("cpu", "value", 1.0, 1)])
                .await,
            Err(Error::ShardNotFound)
        );

        store.create_shard("db", "rp", shard_id, true).await.unwrap();
        store
            .write_to_shard(shard_id, &[point("cpu", "value", 1.0, 1)])
            .await
            .unwrap();

        assert_eq!(store.shard_ids(), [shard_id]);
        assert_eq!(store.points(shard_id).unwrap().len(), 1);
        assert_eq!(
            store.shard_owner(shard_id),
            Some(("db".to_string(), "rp".to_string()))
        );
    }

    #[tokio::test]
    async fn test_create_shard_is_idempotent() {
        let store = MemStore::new();
        let shard_id = ShardId::new(7);
        store.create_shard("db", "rp", shard_id, true).await.unwrap();
        store
            .write_to_shard(shard_id, &[point("cpu", "value", 1.0, 1)])
            .await
            .unwrap();

        // A second create must not discard the data already written.
        store.create_shard("db", "rp", shard_id, true).await.unwrap();
        assert_eq!(store.points(shard_id).unwrap().len(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_field_type_conflict_is_partial() {
        let store = MemStore::new();
        let shard_id = ShardId::new(1);
        store.create_shard("db", "rp", shard_id, true).await.unwrap();

        store
            .write_to_shard(shard_id, &[point("cpu", "value", 1.0, 1)])
            .await
            .unwrap();

        let err = store
            .write_to_shard(
                shard_id,
                &[
                    point("cpu", "value", 2_i64, 2),
                    point("cpu", "value", 3.0, 3),
                    point("mem", "value", 4_i64, 4),
                ],
            )
            .await
            .unwrap_err();
        assert_matches!(err, Error::PartialWrite { reason, dropped } => {
            assert_eq!(dropped, 1);
            assert!(reason.contains("field type conflict"), "{reason}");
            assert!(reason.contains("integer"), "{reason}");
        });

        // The non-conflicting points were kept.
        let got = store
            .points(shard_id)
            .unwrap()
            .iter()
            .map(|p| p.time())
            .collect::<Vec<_>>();
        assert_eq!(got, [1, 3, 4]);
    }

    #[tokio::test]
    async fn test_all_points_conflicting_is_rejected() {
        let store = MemStore::new();
        let shard_id = ShardId::new(1);
        store.create_shard("db", "rp", shard_id, true).await.unwrap();
        store
            .write_to_shard(shard_id, &[point("cpu", "value", 1.0, 1)])
            .await
            .unwrap();

        let err = store
            .write_to_shard(
                shard_id,
                &[point("cpu", "value", 2_i64, 2), point("cpu", "value", "x", 3)],
            )
            .await
            .unwrap_err();
        assert_matches!(err, Error::Rejected { reason, dropped } => {
            assert_eq!(dropped, 2);
            assert!(reason.contains("field type conflict"), "{reason}");
        });
        assert_eq!(store.points(shard_id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_shard_rejects_writes() {
        let store = MemStore::new();
        let shard_id = ShardId::new(1);
        store.create_shard("db", "rp", shard_id, false).await.unwrap();

        assert_matches!(
            store
                .write_to_shard(shard_id, &[point("cpu", "value", 1.0, 1)])
                .await,
            Err(Error::ShardDisabled(id)) => assert_eq!(id, shard_id)
        );

        store.set_shard_enabled(shard_id, true).unwrap();
        store
            .write_to_shard(shard_id, &[point("cpu", "value", 1.0, 1)])
            .await
            .unwrap();

        assert_matches!(
            store.set_shard_enabled(ShardId::new(2), true),
            Err(Error::ShardNotFound)
        );
    }
}

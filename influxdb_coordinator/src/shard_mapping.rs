use hashbrown::HashMap;
use influxdb_meta::{ShardId, ShardInfo};
use influxdb_models::Point;

/// The points of a single write, collated by destination shard.
///
/// Every shard ID with points has a matching [`ShardInfo`].
#[derive(Debug, Default)]
pub struct ShardMapping {
    points: HashMap<ShardId, Vec<Point>>,
    shards: HashMap<ShardId, ShardInfo>,
}

impl ShardMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `point` to the batch destined for `shard`.
    pub fn map_point(&mut self, shard: &ShardInfo, point: Point) {
        self.points.entry(shard.id).or_default().push(point);
        self.shards
            .entry(shard.id)
            .or_insert_with(|| shard.clone());
    }

    /// The points mapped to `shard_id`, in the order they were added.
    pub fn points(&self, shard_id: ShardId) -> Option<&[Point]> {
        self.points.get(&shard_id).map(Vec::as_slice)
    }

    pub fn shard(&self, shard_id: ShardId) -> Option<&ShardInfo> {
        self.shards.get(&shard_id)
    }

    pub fn shard_ids(&self) -> impl Iterator<Item = ShardId> + '_ {
        self.points.keys().copied()
    }

    /// The number of distinct shards.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The total number of mapped points across all shards.
    pub fn point_count(&self) -> usize {
        self.points.values().map(Vec::len).sum()
    }

    /// Consume the mapping, yielding each shard with its batch of points.
    pub fn into_shards(self) -> impl Iterator<Item = (ShardInfo, Vec<Point>)> {
        let Self { points, mut shards } = self;
        points.into_iter().map(move |(id, points)| {
            let shard = shards
                .remove(&id)
                .expect("every mapped shard ID has shard info");
            (shard, points)
        })
    }
}

use influxdb_meta::ShardGroupInfo;

/// The shard groups a single write has resolved so far, kept sorted by end time and then start
/// time so the group covering an instant can be found with a binary search.
///
/// If multiple groups could contain a point's time they are preferred in this order:
///
///  - the group with the earliest end time;
///  - (for identical end times) the group with the earliest start time.
///
/// The list is built per write call and never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShardGroupList(Vec<ShardGroupInfo>);

impl ShardGroupList {
    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    /// True if some group in the list contains `t`.
    pub fn covers(&self, t: i64) -> bool {
        self.shard_group_at(t).is_some()
    }

    /// Find the group that contains `t`, if any.
    ///
    /// Returns [`None`] both when `t` is later than every group and when it falls into a gap
    /// between (or before) groups.
    pub fn shard_group_at(&self, t: i64) -> Option<&ShardGroupInfo> {
        let idx = self.0.partition_point(|sg| sg.end_time <= t);
        self.0.get(idx).filter(|sg| t >= sg.start_time)
    }

    /// Add `sg`, restoring the sort order.
    pub fn append(&mut self, sg: ShardGroupInfo) {
        self.0.push(sg);
        self.0.sort_by_key(ShardGroupInfo::sort_key);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ShardGroupInfo> {
        self.0.iter()
    }
}

impl FromIterator<ShardGroupInfo> for ShardGroupList {
    fn from_iter<T: IntoIterator<Item = ShardGroupInfo>>(iter: T) -> Self {
        let mut groups = iter.into_iter().collect::<Vec<_>>();
        groups.sort_by_key(ShardGroupInfo::sort_key);
        Self(groups)
    }
}

#[cfg(test)]
mod tests {
    use influxdb_meta::ShardGroupId;
    use proptest::prelude::*;

    use super::*;

    fn sg(id: u64, start_time: i64, end_time: i64) -> ShardGroupInfo {
        ShardGroupInfo::new(ShardGroupId::new(id), start_time, end_time, vec![])
    }

    #[test]
    fn test_empty_list_covers_nothing() {
        let list = ShardGroupList::default();
        assert!(!list.covers(0));
        assert!(list.shard_group_at(i64::MIN).is_none());
    }

    #[test]
    fn test_append_keeps_order() {
        let mut list = ShardGroupList::with_capacity(3);
        list.append(sg(1, 20, 30));
        list.append(sg(2, 0, 10));
        list.append(sg(3, 10, 20));

        let ids = list.iter().map(|sg| sg.id.as_u64()).collect::<Vec<_>>();
        assert_eq!(ids, [2, 3, 1]);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_shard_group_at_boundaries() {
        let list = [sg(1, 10, 20), sg(2, 30, 40)]
            .into_iter()
            .collect::<ShardGroupList>();

        // Before every group.
        assert!(list.shard_group_at(9).is_none());
        // Start is inclusive, end is exclusive.
        assert_eq!(list.shard_group_at(10).unwrap().id.as_u64(), 1);
        assert_eq!(list.shard_group_at(19).unwrap().id.as_u64(), 1);
        // The gap between groups.
        assert!(list.shard_group_at(20).is_none());
        assert!(list.shard_group_at(29).is_none());
        assert_eq!(list.shard_group_at(30).unwrap().id.as_u64(), 2);
        // After every group.
        assert!(list.shard_group_at(40).is_none());
        assert!(!list.covers(i64::MAX));
    }

    #[test]
    fn test_overlapping_groups_prefer_earliest_end() {
        let list = [sg(1, 0, 100), sg(2, 0, 50), sg(3, 10, 50)]
            .into_iter()
            .collect::<ShardGroupList>();

        // Both 2 and 3 end at 50; 2 starts first.
        assert_eq!(list.shard_group_at(20).unwrap().id.as_u64(), 2);
        assert_eq!(list.shard_group_at(60).unwrap().id.as_u64(), 1);
    }

    /// Build non-overlapping groups from consecutive pairs of sorted, distinct boundaries, leaving
    /// gaps between them.
    fn groups_from_boundaries(boundaries: &[i64]) -> Vec<ShardGroupInfo> {
        boundaries
            .chunks_exact(2)
            .enumerate()
            .map(|(i, b)| sg(i as u64, b[0], b[1]))
            .collect()
    }

    proptest! {
        #[test]
        fn prop_shard_group_at_matches_linear_scan(
            boundaries in prop::collection::btree_set(-1_000i64..1_000, 2..40),
            queries in prop::collection::vec(-1_100i64..1_100, 1..64),
        ) {
            let boundaries = boundaries.into_iter().collect::<Vec<_>>();
            let groups = groups_from_boundaries(&boundaries);

            // Append in reverse to exercise the re-sort.
            let mut list = ShardGroupList::default();
            for g in groups.iter().rev() {
                list.append(g.clone());
            }

            for t in queries.into_iter().chain(boundaries.iter().copied()) {
                let want = groups.iter().find(|g| g.start_time <= t && t < g.end_time);
                prop_assert_eq!(list.shard_group_at(t), want);
                prop_assert_eq!(list.covers(t), want.is_some());
            }
        }
    }
}

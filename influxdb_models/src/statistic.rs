use std::collections::BTreeMap;

use serde::Serialize;

/// A point-in-time snapshot of a service's counters, tagged with caller supplied labels.
///
/// Services expose these for periodic, pull-based collection; they never push them anywhere.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Statistic {
    pub name: String,
    pub tags: BTreeMap<String, String>,
    pub values: BTreeMap<String, i64>,
}

impl Statistic {
    pub fn new(name: impl Into<String>, tags: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            tags,
            values: BTreeMap::new(),
        }
    }

    /// Add (or replace) the counter `key`.
    pub fn with_value(mut self, key: impl Into<String>, value: i64) -> Self {
        self.values.insert(key.into(), value);
        self
    }
}

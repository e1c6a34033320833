//! The data model shared by the write path: points, their tag and field sets, the consistency
//! level a write is submitted with, and the statistic snapshots services expose for periodic
//! collection.
//!
//! Timestamps are nanoseconds since the Unix epoch. The representable range is slightly narrower
//! than `i64` so that the extremes remain available as sentinels for "no lower bound" and "no
//! upper bound" in time-range arithmetic.

mod consistency;
mod point;
mod statistic;

pub use consistency::ConsistencyLevel;
pub use point::{FieldType, FieldValue, Fields, Point, Tag, Tags};
pub use statistic::Statistic;

use thiserror::Error;

/// The minimum nanosecond timestamp a point may carry.
pub const MIN_NANO_TIME: i64 = i64::MIN + 2;

/// The maximum nanosecond timestamp a point may carry.
pub const MAX_NANO_TIME: i64 = i64::MAX - 1;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("missing measurement")]
    MissingMeasurement,

    #[error("point {measurement} has no fields")]
    MissingFields { measurement: String },

    #[error("duplicate tag key {key}")]
    DuplicateTag { key: String },

    #[error("timestamp {time} is outside the representable time range")]
    TimeOutOfRange { time: i64 },

    #[error("invalid consistency level: {0}")]
    InvalidConsistencyLevel(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

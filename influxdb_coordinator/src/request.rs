use std::collections::BTreeMap;

use influxdb_models::{FieldValue, Point, Tags};

/// The points to write to a database and retention policy.
///
/// An empty `retention_policy` selects the database's default policy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WritePointsRequest {
    pub database: String,
    pub retention_policy: String,
    pub points: Vec<Point>,
}

impl WritePointsRequest {
    pub fn new(database: impl Into<String>, retention_policy: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            retention_policy: retention_policy.into(),
            points: vec![],
        }
    }

    /// Append a point with a single `value` field.
    ///
    /// Points that fail validation are skipped.
    pub fn add_point(
        &mut self,
        name: &str,
        value: impl Into<FieldValue>,
        time: i64,
        tags: BTreeMap<String, String>,
    ) {
        let fields = [("value".to_string(), value.into())].into_iter().collect();
        if let Ok(p) = Point::new(name, Tags::from(tags), fields, time) {
            self.points.push(p);
        }
    }
}

/// Points destined for the target of an `INTO` clause, written with consistency level `one`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntoWriteRequest {
    pub database: String,
    pub retention_policy: String,
    pub points: Vec<Point>,
}

impl From<IntoWriteRequest> for WritePointsRequest {
    fn from(r: IntoWriteRequest) -> Self {
        Self {
            database: r.database,
            retention_policy: r.retention_policy,
            points: r.points,
        }
    }
}

#[cfg(test)]
mod tests {
    use influxdb_models::MAX_NANO_TIME;

    use super::*;

    #[test]
    fn test_add_point() {
        let mut req = WritePointsRequest::new("db", "rp");
        let tags = [("host".to_string(), "a".to_string())]
            .into_iter()
            .collect::<BTreeMap<_, _>>();

        req.add_point("cpu", 1.0, 10, tags.clone());
        req.add_point("mem", 42_i64, 20, BTreeMap::new());
        // Invalid points are skipped.
        req.add_point("", 1.0, 30, tags.clone());
        req.add_point("cpu", 1.0, MAX_NANO_TIME.saturating_add(1), tags);

        assert_eq!(req.points.len(), 2);
        assert_eq!(req.points[0].key(), "cpu,host=a");
        assert_eq!(
            req.points[0].fields().get("value"),
            Some(&FieldValue::Float(1.0))
        );
        assert_eq!(req.points[1].time(), 20);
    }

    #[test]
    fn test_from_into_request() {
        let mut req = WritePointsRequest::new("db", "");
        req.add_point("cpu", true, 1, BTreeMap::new());

        let into = IntoWriteRequest {
            database: "db".to_string(),
            retention_policy: String::new(),
            points: req.points.clone(),
        };
        assert_eq!(WritePointsRequest::from(into), req);
    }
}

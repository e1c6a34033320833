use std::{
    collections::BTreeMap,
    fmt::Display,
    hash::Hasher,
};

use siphasher::sip::SipHasher13;

use crate::{Error, MAX_NANO_TIME, MIN_NANO_TIME, Result};

/// A static siphash key so that every process hashes the same series key to the same `u64`,
/// keeping shard selection stable across restarts and nodes.
///
/// Generated with: xxd -i -l 16 /dev/urandom
const SERIES_HASH_KEY: [u8; 16] = [
    0x3a, 0x91, 0x0e, 0xc4, 0x5b, 0x27, 0xd8, 0x66, 0x14, 0xf2, 0x89, 0x4d, 0xa0, 0x73, 0x1c,
    0xbe,
];

/// A single key/value pair in a [`Tags`] set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

/// An ordered set of tags with unique keys.
///
/// Tags are kept sorted by key so that two points with the same tag set produce the same series
/// key regardless of the order in which the tags were supplied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Tags(Vec<Tag>);

impl Tags {
    /// Build a tag set from `pairs`, rejecting duplicate keys.
    pub fn new<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Result<Self>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut tags = pairs
            .into_iter()
            .map(|(k, v)| Tag {
                key: k.into(),
                value: v.into(),
            })
            .collect::<Vec<_>>();
        tags.sort_by(|a, b| a.key.cmp(&b.key));

        if let Some(w) = tags.windows(2).find(|w| w[0].key == w[1].key) {
            return Err(Error::DuplicateTag {
                key: w[0].key.clone(),
            });
        }

        Ok(Self(tags))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .binary_search_by(|t| t.key.as_str().cmp(key))
            .ok()
            .map(|i| self.0[i].value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, String>> for Tags {
    fn from(map: BTreeMap<String, String>) -> Self {
        // BTreeMap keys are unique and already ordered.
        Self(
            map.into_iter()
                .map(|(key, value)| Tag { key, value })
                .collect(),
        )
    }
}

/// The type of a field value, used to detect conflicting writes to the same field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Float,
    Integer,
    Unsigned,
    String,
    Boolean,
}

impl Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Float => "float",
            Self::Integer => "integer",
            Self::Unsigned => "unsigned",
            Self::String => "string",
            Self::Boolean => "boolean",
        };
        f.write_str(s)
    }
}

/// The value of a single field in a [`Point`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    Unsigned(u64),
    String(String),
    Boolean(bool),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            Self::Float(_) => FieldType::Float,
            Self::Integer(_) => FieldType::Integer,
            Self::Unsigned(_) => FieldType::Unsigned,
            Self::String(_) => FieldType::String,
            Self::Boolean(_) => FieldType::Boolean,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        Self::Unsigned(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

pub type Fields = BTreeMap<String, FieldValue>;

/// An immutable measurement event: a measurement name, tag set, field set and a nanosecond
/// timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    name: String,
    tags: Tags,
    fields: Fields,
    time: i64,
}

impl Point {
    pub fn new(name: impl Into<String>, tags: Tags, fields: Fields, time: i64) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::MissingMeasurement);
        }
        if fields.is_empty() {
            return Err(Error::MissingFields { measurement: name });
        }
        if !(MIN_NANO_TIME..=MAX_NANO_TIME).contains(&time) {
            return Err(Error::TimeOutOfRange { time });
        }

        Ok(Self {
            name,
            tags,
            fields,
            time,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Nanoseconds since the Unix epoch.
    pub fn time(&self) -> i64 {
        self.time
    }

    /// The series key, `measurement,k1=v1,k2=v2` with tags in key order.
    ///
    /// Commas and spaces in the measurement, and commas, equals signs and spaces in tag keys and
    /// values, are backslash-escaped as in line protocol so that distinct series never collide.
    pub fn key(&self) -> String {
        let mut key = String::with_capacity(self.name.len());
        escape_into(&mut key, &self.name, &[',', ' ']);
        for tag in self.tags.iter() {
            key.push(',');
            escape_into(&mut key, &tag.key, &[',', '=', ' ']);
            key.push('=');
            escape_into(&mut key, &tag.value, &[',', '=', ' ']);
        }
        key
    }

    /// A deterministic hash of the series key, used to select a shard within a shard group.
    ///
    /// Points with the same measurement and tag set always hash to the same value.
    pub fn hash_id(&self) -> u64 {
        let mut hasher = SipHasher13::new_with_key(&SERIES_HASH_KEY);
        hasher.write(self.key().as_bytes());
        hasher.finish()
    }
}

fn escape_into(dst: &mut String, s: &str, special: &[char]) {
    for c in s.chars() {
        if special.contains(&c) {
            dst.push('\\');
        }
        dst.push(c);
    }
}

//! Core data types for featurepg
//!
//! These are the shapes exchanged between the feature-serving layer and an
//! online store: entity keys, typed feature values, timestamps and the
//! per-record write/read envelopes.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A typed feature value
///
/// Values are stored as opaque bytes (see [`crate::serialize_value`]); this
/// enum is what callers build and what reads hand back.
///
/// Unlike a plain JSON number, the variant tag survives the round trip, so an
/// `Int32(1)` never comes back as an `Int64(1)` or a `Double(1.0)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    /// Null/missing value
    Null,
    Bytes(Vec<u8>),
    String(String),
    Int32(i32),
    Int64(i64),
    Double(f64),
    Float(f32),
    Bool(bool),
    /// Seconds since the Unix epoch
    UnixTimestamp(i64),
    BytesList(Vec<Vec<u8>>),
    StringList(Vec<String>),
    Int32List(Vec<i32>),
    Int64List(Vec<i64>),
    DoubleList(Vec<f64>),
    FloatList(Vec<f32>),
    BoolList(Vec<bool>),
    UnixTimestampList(Vec<i64>),
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

/// Identifies one entity instance, e.g. `driver_id = 1001`
///
/// An entity key is an ordered list of (join key, value) pairs. Composite
/// keys (`user_id` + `merchant_id`) simply carry more than one pair. The two
/// lists are kept parallel, the way they travel on the wire.
///
/// # Examples
///
/// ```
/// use featurepg_core::{EntityKey, Value};
///
/// let key = EntityKey::new("driver_id", 1001_i64).with("city", "Reykjavik");
/// assert_eq!(key.len(), 2);
/// assert_eq!(key.get("city"), Some(&Value::String("Reykjavik".into())));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EntityKey {
    /// Join key names (e.g. `["driver_id"]`)
    pub join_keys: Vec<String>,

    /// Values, positionally matching `join_keys`
    pub entity_values: Vec<Value>,
}

impl EntityKey {
    /// Creates a single-column entity key
    pub fn new(join_key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            join_keys: vec![join_key.into()],
            entity_values: vec![value.into()],
        }
    }

    /// Adds another (join key, value) pair (builder pattern)
    pub fn with(mut self, join_key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.join_keys.push(join_key.into());
        self.entity_values.push(value.into());
        self
    }

    /// Number of (join key, value) pairs
    pub fn len(&self) -> usize {
        self.join_keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.join_keys.is_empty()
    }

    /// Looks up the value of one join key
    pub fn get(&self, join_key: &str) -> Option<&Value> {
        self.join_keys
            .iter()
            .position(|k| k == join_key)
            .and_then(|i| self.entity_values.get(i))
    }

    /// Iterates over (join key, value) pairs in declaration order
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.join_keys
            .iter()
            .map(String::as_str)
            .zip(self.entity_values.iter())
    }
}

/// A timestamp as handed in by a caller
///
/// Callers may pass either naive timestamps (assumed to already be UTC) or
/// timezone-aware ones. Storage always uses naive UTC, see
/// [`Timestamp::to_naive_utc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    /// No zone information; taken to be UTC
    Naive(NaiveDateTime),
    /// Carries an explicit UTC offset
    Aware(DateTime<FixedOffset>),
}

impl Timestamp {
    /// Normalizes to naive UTC
    ///
    /// Aware timestamps are converted to UTC and their offset dropped; naive
    /// timestamps pass through unchanged.
    ///
    /// ```
    /// use chrono::DateTime;
    /// use featurepg_core::Timestamp;
    ///
    /// let ts = Timestamp::from(DateTime::parse_from_rfc3339("2024-01-01T10:00:00+02:00").unwrap());
    /// assert_eq!(ts.to_naive_utc().to_string(), "2024-01-01 08:00:00");
    /// ```
    pub fn to_naive_utc(&self) -> NaiveDateTime {
        match self {
            Timestamp::Naive(ts) => *ts,
            Timestamp::Aware(ts) => ts.naive_utc(),
        }
    }
}

impl From<NaiveDateTime> for Timestamp {
    fn from(ts: NaiveDateTime) -> Self {
        Self::Naive(ts)
    }
}

impl From<DateTime<FixedOffset>> for Timestamp {
    fn from(ts: DateTime<FixedOffset>) -> Self {
        Self::Aware(ts)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::Aware(ts.into())
    }
}

/// Reference to a logical feature table (a feature view)
///
/// Only the name matters to an online store: each (project, name) pair maps
/// to one physical table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct FeatureView {
    /// Unique name of the feature view (e.g. "driver_hourly_stats")
    pub name: String,

    /// Names of entities this view is keyed by
    #[serde(default)]
    pub entities: Vec<String>,

    /// Names of the features the view exposes
    #[serde(default)]
    pub features: Vec<String>,
}

impl FeatureView {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entities: Vec::new(),
            features: Vec::new(),
        }
    }

    pub fn with_entities(mut self, entities: Vec<String>) -> Self {
        self.entities = entities;
        self
    }

    pub fn with_features(mut self, features: Vec<String>) -> Self {
        self.features = features;
        self
    }
}

/// An entity definition (e.g. "driver" joined on "driver_id")
///
/// Online stores accept entities during schema updates for interface
/// compatibility; the PostgreSQL store creates no storage for them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Entity {
    pub name: String,
    pub join_key: String,
}

impl Entity {
    pub fn new(name: impl Into<String>, join_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            join_key: join_key.into(),
        }
    }
}

/// One entity's worth of feature values to write
///
/// Flattened by the store into one stored row per feature name.
#[derive(Debug, Clone, PartialEq)]
pub struct OnlineWriteRecord {
    pub entity_key: EntityKey,

    /// Feature name -> value
    pub values: HashMap<String, Value>,

    /// When the values were observed/computed
    pub event_ts: Timestamp,

    /// When the values were produced for storage, if known
    pub created_ts: Option<Timestamp>,
}

impl OnlineWriteRecord {
    pub fn new(entity_key: EntityKey, event_ts: impl Into<Timestamp>) -> Self {
        Self {
            entity_key,
            values: HashMap::new(),
            event_ts: event_ts.into(),
            created_ts: None,
        }
    }

    /// Adds a feature value (builder pattern)
    pub fn with_value(mut self, feature_name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(feature_name.into(), value.into());
        self
    }

    pub fn with_created_ts(mut self, created_ts: impl Into<Timestamp>) -> Self {
        self.created_ts = Some(created_ts.into());
        self
    }
}

/// Result of reading one entity key
///
/// Both fields are `None` when nothing is stored for the key. A key is never
/// dropped from a read; it yields this absent marker instead.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OnlineReadResult {
    /// Event timestamp of the stored values (naive UTC)
    pub event_ts: Option<NaiveDateTime>,

    /// Feature name -> value
    pub features: Option<HashMap<String, Value>>,
}

impl OnlineReadResult {
    /// The marker returned for keys with no stored rows
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn is_absent(&self) -> bool {
        self.features.is_none()
    }

    /// Gets a feature value by name
    pub fn get(&self, feature_name: &str) -> Option<&Value> {
        self.features.as_ref().and_then(|f| f.get(feature_name))
    }
}

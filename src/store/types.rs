//! Document, write and query types shared by every `DocumentStore` implementation.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use super::StoreError;

/// Store-assigned document identifier
pub type DocumentId = String;

/// Per-document version, bumped on every committed write to that document
pub type Version = u64;

/// Stored document body
pub type Fields = Map<String, Value>;

/// Location of a document: collection name plus document id
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentPath {
    pub collection: String,
    pub id: DocumentId,
}

impl DocumentPath {
    pub fn new(collection: impl Into<String>, id: impl Into<DocumentId>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A snapshot of a stored document
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: DocumentPath,
    pub fields: Fields,
    pub version: Version,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl Document {
    pub fn id(&self) -> &str {
        &self.path.id
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// String value of `field`, `None` when absent or not a string
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }
}

/// Value written to a single field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Literal JSON value
    Value(Value),
    /// Replaced by the store's commit timestamp
    ServerTimestamp,
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Value(value)
    }
}

/// Top-level field writes, keyed by field name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldUpdates(BTreeMap<String, FieldValue>);

impl FieldUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter for a literal value
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), FieldValue::Value(value.into()));
        self
    }

    /// Builder-style setter for a server-assigned timestamp
    pub fn with_server_timestamp(mut self, field: impl Into<String>) -> Self {
        self.0.insert(field.into(), FieldValue::ServerTimestamp);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: FieldValue) {
        self.0.insert(field.into(), value);
    }

    /// Build updates from any serializable struct that renders as a JSON object.
    /// `None` options serialize as `null` unless the struct skips them.
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self, StoreError> {
        match serde_json::to_value(value) {
            Ok(Value::Object(map)) => Ok(Self(
                map.into_iter()
                    .map(|(k, v)| (k, FieldValue::Value(v)))
                    .collect(),
            )),
            Ok(other) => Err(StoreError::InvalidArgument(format!(
                "expected a JSON object, got {other}"
            ))),
            Err(e) => Err(StoreError::Serialization(e.to_string())),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }

    /// Resolve sentinels against `now` and return plain fields
    pub fn resolve(&self, now: DateTime<Utc>) -> Fields {
        self.0
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    FieldValue::Value(value) => value.clone(),
                    FieldValue::ServerTimestamp => encode_timestamp(now),
                };
                (k.clone(), value)
            })
            .collect()
    }
}

/// Encode a timestamp the way stored documents carry it: fixed-width RFC 3339
/// with nanoseconds, so lexical order equals chronological order.
pub fn encode_timestamp(ts: DateTime<Utc>) -> Value {
    Value::String(ts.to_rfc3339_opts(SecondsFormat::Nanos, true))
}

/// A buffered write, applied atomically as part of a commit
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Create a new document; fails if it exists
    Create { path: DocumentPath, fields: FieldUpdates },
    /// Replace the document, or merge into it when `merge` is set
    Set {
        path: DocumentPath,
        fields: FieldUpdates,
        merge: bool,
    },
    /// Merge top-level fields into an existing document; fails if it is missing
    Update { path: DocumentPath, fields: FieldUpdates },
}

impl Write {
    pub fn path(&self) -> &DocumentPath {
        match self {
            Write::Create { path, .. } | Write::Set { path, .. } | Write::Update { path, .. } => {
                path
            }
        }
    }
}

/// Commit-time check recorded by a transactional read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precondition {
    pub path: DocumentPath,
    /// `Some(v)`: the document must still be at version `v`.
    /// `None`: the document must still not exist.
    pub expected: Option<Version>,
}

/// Sort direction for query ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Equality filter on a top-level field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub value: Value,
}

/// Collection query: equality filters, optional ordering and limit
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<FieldFilter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(FieldFilter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        doc.path.collection == self.collection
            && self
                .filters
                .iter()
                .all(|f| doc.fields.get(&f.field) == Some(&f.value))
    }

    /// Filter, order and truncate `docs` in place
    pub fn apply(&self, mut docs: Vec<Document>) -> Vec<Document> {
        docs.retain(|d| self.matches(d));
        if let Some((field, direction)) = &self.order_by {
            docs.sort_by(|a, b| {
                let ord = compare_values(a.fields.get(field), b.fields.get(field));
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }
        if let Some(limit) = self.limit {
            docs.truncate(limit);
        }
        docs
    }
}

/// Total order over optional JSON values used for query ordering.
/// Missing < null < bool < number < string < everything else.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::Bool(_)) => 2,
            Some(Value::Number(_)) => 3,
            Some(Value::String(_)) => 4,
            Some(_) => 5,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

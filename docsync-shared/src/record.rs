//! Source records.
//!
//! A [`Record`] is the row handed over by the record source: its model, its
//! primary key, plain attributes and nested related records. Related records
//! keep their own model and key so that a specific related record can be left
//! out when a root record is serialized.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

/// Name of a record type (a model).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelName(String);

impl ModelName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison, used when users name models on the
    /// command line.
    pub fn matches(&self, name: &str) -> bool {
        self.0.eq_ignore_ascii_case(name)
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for ModelName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl Borrow<str> for ModelName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Primary key of a record.
///
/// Keys are totally ordered: integers sort numerically and before strings,
/// strings sort lexicographically. Pagination relies on this order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    Int(i64),
    Str(String),
}

impl PrimaryKey {
    /// Parse a key from its string form. Strings holding an integer become
    /// integer keys, so document ids read from the index compare equal to the
    /// keys of the records they were built from.
    pub fn parse(raw: &str) -> Self {
        raw.parse::<i64>()
            .map(Self::Int)
            .unwrap_or_else(|_| Self::Str(raw.to_string()))
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Int(i) => Value::from(*i),
            Self::Str(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{}", i),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for PrimaryKey {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for PrimaryKey {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for PrimaryKey {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// Related records attached to a record under a relation name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Related {
    /// Foreign key / one-to-one relation.
    One(Box<Record>),
    /// Reverse foreign key / many-to-many relation.
    Many(Vec<Record>),
}

/// One row of a record source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub model: ModelName,
    pub pk: PrimaryKey,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub related: BTreeMap<String, Related>,
}

impl Record {
    pub fn new(model: impl Into<ModelName>, pk: impl Into<PrimaryKey>) -> Self {
        Self {
            model: model.into(),
            pk: pk.into(),
            attributes: Map::new(),
            related: BTreeMap::new(),
        }
    }

    /// Set an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Attach a single related record.
    pub fn with_one(mut self, relation: impl Into<String>, record: Record) -> Self {
        self.related
            .insert(relation.into(), Related::One(Box::new(record)));
        self
    }

    /// Attach a list of related records.
    pub fn with_many(mut self, relation: impl Into<String>, records: Vec<Record>) -> Self {
        self.related.insert(relation.into(), Related::Many(records));
        self
    }

    /// Two records are the same row when model and key match.
    pub fn is_same(&self, other: &Record) -> bool {
        self.model == other.model && self.pk == other.pk
    }

    /// Resolve a dotted attribute path.
    ///
    /// Segments are looked up in the attributes first, then in the related
    /// records. Inside plain JSON values, segments index objects by key and
    /// arrays by position. A path crossing a many-relation yields an array
    /// with the rest of the path resolved on each related record.
    ///
    /// Returns `None` when a segment cannot be found, `Some(Value::Null)`
    /// when the path reaches a null value. Related records equal to `ignore`
    /// resolve to null (one-relations) or are skipped (many-relations).
    pub fn resolve(&self, path: &[String], ignore: Option<&Record>) -> Option<Value> {
        let Some((head, rest)) = path.split_first() else {
            return Some(self.to_value(ignore));
        };

        if head == "pk" {
            return if rest.is_empty() {
                Some(self.pk.to_json())
            } else {
                None
            };
        }

        if let Some(value) = self.attributes.get(head) {
            return resolve_value(value, rest);
        }

        match self.related.get(head)? {
            Related::One(record) => {
                if ignore.is_some_and(|ignored| ignored.is_same(record)) {
                    return Some(Value::Null);
                }
                record.resolve(rest, ignore)
            }
            Related::Many(records) => {
                let values = records
                    .iter()
                    .filter(|record| !ignore.is_some_and(|ignored| ignored.is_same(record)))
                    .map(|record| record.resolve(rest, ignore).unwrap_or(Value::Null))
                    .collect();
                Some(Value::Array(values))
            }
        }
    }

    /// JSON form of the record: attributes plus related records nested under
    /// their relation names.
    pub fn to_value(&self, ignore: Option<&Record>) -> Value {
        let mut object = self.attributes.clone();
        for (name, related) in &self.related {
            let value = match related {
                Related::One(record) if ignore.is_some_and(|i| i.is_same(record)) => Value::Null,
                Related::One(record) => record.to_value(ignore),
                Related::Many(records) => Value::Array(
                    records
                        .iter()
                        .filter(|record| !ignore.is_some_and(|i| i.is_same(record)))
                        .map(|record| record.to_value(ignore))
                        .collect(),
                ),
            };
            object.insert(name.clone(), value);
        }
        Value::Object(object)
    }
}

fn resolve_value(value: &Value, path: &[String]) -> Option<Value> {
    let Some((head, rest)) = path.split_first() else {
        return Some(value.clone());
    };
    match value {
        Value::Null => Some(Value::Null),
        Value::Object(map) => resolve_value(map.get(head)?, rest),
        Value::Array(items) => {
            let index: usize = head.parse().ok()?;
            resolve_value(items.get(index)?, rest)
        }
        _ => None,
    }
}

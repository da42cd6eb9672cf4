//! Lookup expressions used to filter and exclude records.
//!
//! A lookup is written `path__operator=value`, e.g. `date__gte=2020-05-21`
//! or `country__name__in=France,Spain`. The value is coerced with
//! [`parse_value`]; the operator defaults to `exact`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const PATH_SEPARATOR: &str = "__";

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Errors raised while parsing a lookup expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LookupError {
    /// The expression is not of the form `key=value`.
    #[error("invalid filter: '{0}' (filter must be formatted as '[Field Lookups]=[value]')")]
    Malformed(String),

    /// The key has no field path.
    #[error("invalid filter: '{0}' (missing field name)")]
    EmptyField(String),
}

/// A value coerced from the command line.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Null,
    Int(i64),
    Float(f64),
    DateTime(DateTime<Utc>),
    List(Vec<FilterValue>),
    Str(String),
}

impl FilterValue {
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => Value::from(*f),
            Self::DateTime(dt) => Value::from(dt.to_rfc3339()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Str(s) => Value::from(s.as_str()),
        }
    }

    fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::DateTime(_) => true,
            Self::List(items) => !items.is_empty(),
            Self::Str(s) => !matches!(s.to_ascii_lowercase().as_str(), "" | "false" | "no"),
        }
    }

    /// Compare a record value with this filter value.
    ///
    /// Returns `None` when the two are not comparable (e.g. a string against
    /// a number).
    fn compare(&self, value: &Value) -> Option<Ordering> {
        match (self, value) {
            (Self::Null, Value::Null) => Some(Ordering::Equal),
            (Self::Int(i), Value::Number(n)) => n.as_f64()?.partial_cmp(&(*i as f64)),
            (Self::Float(f), Value::Number(n)) => n.as_f64()?.partial_cmp(f),
            (Self::Str(s), Value::String(v)) => Some(v.as_str().cmp(s.as_str())),
            (Self::Int(i), Value::String(v)) => Some(v.as_str().cmp(i.to_string().as_str())),
            (Self::DateTime(dt), Value::String(v)) => Some(parse_datetime(v)?.cmp(dt)),
            (Self::Str(s), Value::Bool(b)) => s.parse::<bool>().ok().map(|s| b.cmp(&s)),
            (Self::Int(i), Value::Bool(b)) => Some((*b as i64).cmp(i)),
            _ => None,
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(v) => write!(f, "{}", v),
            Self::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Self::List(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Self::Str(s) => f.write_str(s),
        }
    }
}

/// Coerce a raw command line value.
///
/// Parsers are tried in order and the first match wins: empty → null,
/// integer, float, ISO-8601 date or datetime, comma-separated list of the
/// previous kinds. Anything else is kept as a string. Integers are tried
/// before floats, otherwise every integer would parse as a float.
pub fn parse_value(raw: &str) -> FilterValue {
    if raw.is_empty() {
        return FilterValue::Null;
    }
    if let Ok(i) = raw.parse::<i64>() {
        return FilterValue::Int(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return FilterValue::Float(f);
    }
    if let Some(dt) = parse_datetime(raw) {
        return FilterValue::DateTime(dt);
    }
    if raw.contains(',') {
        return FilterValue::List(raw.split(',').map(|v| parse_value(v.trim())).collect());
    }
    FilterValue::Str(raw.to_string())
}

/// Parse an ISO-8601 date or datetime. Naive values are taken as UTC.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Comparison applied by a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOp {
    Exact,
    IExact,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    IsNull,
    Contains,
    IContains,
    StartsWith,
}

impl LookupOp {
    fn from_suffix(suffix: &str) -> Option<Self> {
        Some(match suffix {
            "exact" => Self::Exact,
            "iexact" => Self::IExact,
            "gt" => Self::Gt,
            "gte" => Self::Gte,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            "in" => Self::In,
            "isnull" => Self::IsNull,
            "contains" => Self::Contains,
            "icontains" => Self::IContains,
            "startswith" => Self::StartsWith,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::IExact => "iexact",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::In => "in",
            Self::IsNull => "isnull",
            Self::Contains => "contains",
            Self::IContains => "icontains",
            Self::StartsWith => "startswith",
        }
    }
}

/// A parsed `path__operator=value` expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    /// Attribute path, one segment per relation hop.
    pub path: Vec<String>,
    pub op: LookupOp,
    pub value: FilterValue,
}

impl Lookup {
    pub fn new(path: &str, op: LookupOp, value: FilterValue) -> Self {
        Self {
            path: path.split(PATH_SEPARATOR).map(str::to_string).collect(),
            op,
            value,
        }
    }

    /// Lookup field name as written by the user, without the operator.
    pub fn field(&self) -> String {
        self.path.join(PATH_SEPARATOR)
    }

    /// Evaluate the lookup against a resolved record value.
    pub fn matches(&self, value: &Value) -> bool {
        match self.op {
            LookupOp::Exact => self.value.compare(value) == Some(Ordering::Equal),
            LookupOp::IExact => match (&self.value, value) {
                (FilterValue::Str(s), Value::String(v)) => s.eq_ignore_ascii_case(v),
                _ => self.value.compare(value) == Some(Ordering::Equal),
            },
            LookupOp::Gt => self.value.compare(value) == Some(Ordering::Greater),
            LookupOp::Gte => matches!(
                self.value.compare(value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            LookupOp::Lt => self.value.compare(value) == Some(Ordering::Less),
            LookupOp::Lte => matches!(
                self.value.compare(value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            LookupOp::In => match &self.value {
                FilterValue::List(items) => items
                    .iter()
                    .any(|item| item.compare(value) == Some(Ordering::Equal)),
                single => single.compare(value) == Some(Ordering::Equal),
            },
            LookupOp::IsNull => value.is_null() == self.value.is_truthy(),
            LookupOp::Contains => contains(value, &self.value, false),
            LookupOp::IContains => contains(value, &self.value, true),
            LookupOp::StartsWith => match value {
                Value::String(v) => v.starts_with(&self.value.to_string()),
                _ => false,
            },
        }
    }
}

fn contains(value: &Value, needle: &FilterValue, case_insensitive: bool) -> bool {
    match value {
        Value::String(v) => {
            let needle = needle.to_string();
            if case_insensitive {
                v.to_lowercase().contains(&needle.to_lowercase())
            } else {
                v.contains(&needle)
            }
        }
        Value::Array(items) => items
            .iter()
            .any(|item| needle.compare(item) == Some(Ordering::Equal)),
        _ => false,
    }
}

impl FromStr for Lookup {
    type Err = LookupError;

    fn from_str(expression: &str) -> Result<Self, Self::Err> {
        let (key, raw_value) = expression
            .split_once('=')
            .ok_or_else(|| LookupError::Malformed(expression.to_string()))?;

        let mut path: Vec<String> = key.split(PATH_SEPARATOR).map(str::to_string).collect();
        let op = match path.last().and_then(|last| LookupOp::from_suffix(last)) {
            Some(op) if path.len() > 1 => {
                path.pop();
                op
            }
            _ => LookupOp::Exact,
        };

        if path.iter().any(String::is_empty) {
            return Err(LookupError::EmptyField(expression.to_string()));
        }

        Ok(Self {
            path,
            op,
            value: parse_value(raw_value),
        })
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}__{}={}", self.field(), self.op.as_str(), self.value)
    }
}

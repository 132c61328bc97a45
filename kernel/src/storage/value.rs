// Values and Rows
//
// Scalar values stored in tables, and the row images handed to hooks.
// A row image can always be rendered as a self-describing JSON document.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::catalog::ColumnType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
}

/// Raised when a JSON literal cannot be read as a column type.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("cannot read {found} as {expected:?}")]
pub struct ConversionError {
    pub expected: ColumnType,
    pub found: String,
}

/// Orderable projection of a value, used as an index key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum IndexKey {
    Bool(bool),
    Int(i64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this value may be stored in a column of type `ty`.
    /// NULL fits every type; nullability is checked separately.
    pub fn fits(&self, ty: ColumnType) -> bool {
        matches!(
            (self, ty),
            (Value::Null, _)
                | (Value::Bool(_), ColumnType::Bool)
                | (Value::Int(_), ColumnType::Int)
                | (Value::Float(_), ColumnType::Float)
                | (Value::Text(_), ColumnType::Text)
                | (Value::Timestamp(_), ColumnType::Timestamp)
                | (Value::Json(_), ColumnType::Json)
        )
    }

    /// Document form of the value. Non-finite floats have no JSON form and
    /// become `null`; stored rows never hold them.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Text(s) => Json::String(s.clone()),
            Value::Timestamp(ts) => Json::String(ts.to_rfc3339_opts(SecondsFormat::Micros, true)),
            Value::Json(doc) => doc.clone(),
        }
    }

    /// Read a JSON literal as a value of the given column type.
    pub fn from_json(ty: ColumnType, json: &serde_json::Value) -> Result<Self, ConversionError> {
        use serde_json::Value as Json;

        let converted = match (ty, json) {
            (_, Json::Null) => Some(Value::Null),
            (ColumnType::Bool, Json::Bool(b)) => Some(Value::Bool(*b)),
            (ColumnType::Int, Json::Number(n)) => n.as_i64().map(Value::Int),
            (ColumnType::Float, Json::Number(n)) => n.as_f64().map(Value::Float),
            (ColumnType::Text, Json::String(s)) => Some(Value::Text(s.clone())),
            (ColumnType::Timestamp, Json::String(s)) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|ts| Value::Timestamp(ts.with_timezone(&Utc))),
            (ColumnType::Json, doc) => Some(Value::Json(doc.clone())),
            _ => None,
        };

        converted.ok_or_else(|| ConversionError {
            expected: ty,
            found: json.to_string(),
        })
    }

    pub(crate) fn index_key(&self) -> Option<IndexKey> {
        match self {
            Value::Bool(b) => Some(IndexKey::Bool(*b)),
            Value::Int(i) => Some(IndexKey::Int(*i)),
            Value::Text(s) => Some(IndexKey::Text(s.clone())),
            Value::Timestamp(ts) => Some(IndexKey::Timestamp(*ts)),
            Value::Null | Value::Float(_) | Value::Json(_) => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Value::Timestamp(ts)
    }
}

impl From<serde_json::Value> for Value {
    fn from(doc: serde_json::Value) -> Self {
        Value::Json(doc)
    }
}

/// A row image: column name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    fields: BTreeMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Overlay `changes` on top of this image.
    pub fn merged(&self, changes: &Row) -> Row {
        let mut next = self.clone();
        for (column, value) in changes.iter() {
            next.set(column, value.clone());
        }
        next
    }

    /// Serialize the full image into a JSON object.
    pub fn to_document(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

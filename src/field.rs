//! Column adapters that store structured values in a TEXT column.
//!
//! Values are serialized to JSON on write and deserialized on read, so a
//! record can carry arbitrary serde-compatible data without its own table.
//! Map keys are kept ordered, which makes equal values produce equal column
//! text and lets `exact` / `in` lookups compare serialized forms.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use thiserror::Error;

/// String-keyed dictionary payload of a [`DictionaryField`].
pub type Dictionary = BTreeMap<String, Value>;

#[derive(Debug, Error)]
pub enum FieldError {
    #[error("could not serialize field value: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("could not deserialize field value: {0}")]
    Deserialize(#[source] serde_json::Error),

    #[error("value is not a dictionary")]
    NotADictionary,

    #[error("lookup type '{0}' is not supported")]
    UnsupportedLookup(String),
}

/// A value that knows how to render itself as column text.
pub trait ColumnValue {
    fn to_column(&self) -> Result<String, FieldError>;
}

// ─── SerializedField ────────────────────────────────────────────

/// Any serializable value, stored as JSON text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerializedField<T>(T);

impl<T> SerializedField<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: DeserializeOwned> SerializedField<T> {
    /// Decode a value previously produced by [`ColumnValue::to_column`].
    pub fn from_column(text: &str) -> Result<Self, FieldError> {
        serde_json::from_str(text)
            .map(Self)
            .map_err(FieldError::Deserialize)
    }
}

impl<T: Serialize> ColumnValue for SerializedField<T> {
    fn to_column(&self) -> Result<String, FieldError> {
        serde_json::to_string(&self.0).map_err(FieldError::Serialize)
    }
}

impl<T> From<T> for SerializedField<T> {
    fn from(value: T) -> Self {
        Self(value)
    }
}

impl<T> Deref for SerializedField<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for SerializedField<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T: Serialize> ToSql for SerializedField<T> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let text = self
            .to_column()
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        Ok(ToSqlOutput::from(text))
    }
}

impl<T: DeserializeOwned> FromSql for SerializedField<T> {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        Self::from_column(text).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

// ─── DictionaryField ────────────────────────────────────────────

/// A serialized field that only ever holds a string-keyed dictionary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DictionaryField(SerializedField<Dictionary>);

impl DictionaryField {
    pub fn new(dict: Dictionary) -> Self {
        Self(SerializedField(dict))
    }

    /// Accepts JSON objects only; lists, strings and numbers are rejected.
    pub fn try_from_value(value: Value) -> Result<Self, FieldError> {
        match value {
            Value::Object(map) => Ok(Self::new(map.into_iter().collect())),
            _ => Err(FieldError::NotADictionary),
        }
    }

    pub fn from_column(text: &str) -> Result<Self, FieldError> {
        let value: Value = serde_json::from_str(text).map_err(FieldError::Deserialize)?;
        Self::try_from_value(value)
    }

    /// Text value stored under `key`, if it is a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn into_inner(self) -> Dictionary {
        self.0.into_inner()
    }
}

impl ColumnValue for DictionaryField {
    fn to_column(&self) -> Result<String, FieldError> {
        self.0.to_column()
    }
}

impl Deref for DictionaryField {
    type Target = Dictionary;

    fn deref(&self) -> &Dictionary {
        &self.0
    }
}

impl DerefMut for DictionaryField {
    fn deref_mut(&mut self) -> &mut Dictionary {
        &mut self.0
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for DictionaryField {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl ToSql for DictionaryField {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        self.0.to_sql()
    }
}

impl FromSql for DictionaryField {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        Self::from_column(text).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

// ─── Lookups ────────────────────────────────────────────────────

/// A query against a serialized column.
///
/// Only equality-style lookups make sense on serialized text; anything else
/// is rejected when the lookup is prepared.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Exact(T),
    In(Vec<T>),
    Other(String),
}

impl<T: ColumnValue> Lookup<T> {
    /// Serialize the lookup operands into column text.
    pub fn prep(&self) -> Result<Vec<String>, FieldError> {
        match self {
            Self::Exact(value) => Ok(vec![value.to_column()?]),
            Self::In(values) => values.iter().map(ColumnValue::to_column).collect(),
            Self::Other(kind) => Err(FieldError::UnsupportedLookup(kind.clone())),
        }
    }

    /// SQL condition on `column` plus its bound parameters.
    pub fn sql_condition(&self, column: &str) -> Result<(String, Vec<String>), FieldError> {
        let params = self.prep()?;
        let condition = match self {
            Self::Exact(_) => format!("{} = ?", column),
            _ if params.is_empty() => "0".to_string(),
            _ => {
                let placeholders = vec!["?"; params.len()].join(", ");
                format!("{} IN ({})", column, placeholders)
            }
        };
        Ok((condition, params))
    }
}

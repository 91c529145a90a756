//! Named-field records flowing through a flow.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{FlowError, FlowResult};

/// A mapping from field names to values.
///
/// Field order is preserved for display and serialization, but is not
/// significant for lookups or equality of individual fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Converts a JSON value into a record.
    ///
    /// Fails if the value is not a JSON object.
    pub fn from_value(value: Value) -> FlowResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(FlowError::invalid_record(format!(
                "expected a JSON object, got {other}"
            ))),
        }
    }

    /// Returns the value of a field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Returns whether the record has a field with the given name.
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Sets a field, returning the previous value if there was one.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    /// Sets a field and returns the record.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    /// Copies all fields of `other` into this record, overriding existing fields.
    pub fn merge(&mut self, other: &Record) {
        for (field, value) in &other.0 {
            self.0.insert(field.clone(), value.clone());
        }
    }

    /// Returns an iterator over the field names.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Returns an iterator over the fields and their values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consumes the record and returns the underlying map.
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Record {
    type Error = FlowError;

    fn try_from(value: Value) -> FlowResult<Self> {
        Self::from_value(value)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(record.0)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl IntoIterator for Record {
    type IntoIter = serde_json::map::IntoIter;
    type Item = (String, Value);

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (field, value) in &self.0 {
            map.entry(&format_args!("{field:?}"), &format_args!("{value}"));
        }
        map.finish()
    }
}

/// Builds a [`Record`] from `field => value` pairs.
///
/// Values are converted with [`Into<serde_json::Value>`].
///
/// ```rust
/// use artflow_flow::record;
///
/// let record = record! { "prompt" => "hello", "temperature" => 0.5 };
/// assert_eq!(record.len(), 2);
/// ```
#[macro_export]
macro_rules! record {
    () => {
        $crate::Record::new()
    };
    ($($field:expr => $value:expr),+ $(,)?) => {{
        let mut record = $crate::Record::new();
        $( record.insert($field, $value); )+
        record
    }};
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn from_value_requires_object() {
        let record = Record::from_value(json!({"x": 1, "y": "two"})).unwrap();
        assert_eq!(record.len(), 2);
        assert_eq!(record.get("y"), Some(&json!("two")));

        let error = Record::from_value(json!([1, 2])).unwrap_err();
        assert!(matches!(error, FlowError::InvalidRecord(_)));
    }

    #[test]
    fn merge_overrides_existing_fields() {
        let mut base = record! { "x" => 1, "y" => 2 };
        base.merge(&record! { "x" => 10, "z" => 3 });

        assert_eq!(base.get("x"), Some(&json!(10)));
        assert_eq!(base.get("y"), Some(&json!(2)));
        assert_eq!(base.get("z"), Some(&json!(3)));
    }

    #[test]
    fn field_order_is_preserved() {
        let record = record! { "b" => 1, "a" => 2, "c" => 3 };
        let fields: Vec<_> = record.fields().collect();
        assert_eq!(fields, ["b", "a", "c"]);
        assert_eq!(serde_json::to_string(&record).unwrap(), r#"{"b":1,"a":2,"c":3}"#);
    }

    #[test]
    fn display_is_compact() {
        let record = record! { "x" => 3 };
        assert_eq!(record.to_string(), r#"{"x": 3}"#);
    }
}

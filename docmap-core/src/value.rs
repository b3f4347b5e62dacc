use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::reflect::{Zeroer, impl_reflect_scalar};

/// The coarse type tag of a document value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Undefined,
    Boolean,
    Int32,
    Int64,
    Double,
    String,
    Binary,
    DateTime,
    Array,
    Document,
}

impl ValueKind {
    /// Returns true for kinds that open a nested scope.
    pub fn is_container(&self) -> bool {
        matches!(self, ValueKind::Array | ValueKind::Document)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "null",
            ValueKind::Undefined => "undefined",
            ValueKind::Boolean => "boolean",
            ValueKind::Int32 => "int32",
            ValueKind::Int64 => "int64",
            ValueKind::Double => "double",
            ValueKind::String => "string",
            ValueKind::Binary => "binary",
            ValueKind::DateTime => "datetime",
            ValueKind::Array => "array",
            ValueKind::Document => "document",
        };
        f.write_str(name)
    }
}

/// A typed value inside a document.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Undefined,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
    String(String),
    Binary(Binary),
    /// Milliseconds since the Unix epoch.
    DateTime(Timestamp),
    Array(Vec<Value>),
    Document(Document),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Undefined => ValueKind::Undefined,
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Int32(_) => ValueKind::Int32,
            Value::Int64(_) => ValueKind::Int64,
            Value::Double(_) => ValueKind::Double,
            Value::String(_) => ValueKind::String,
            Value::Binary(_) => ValueKind::Binary,
            Value::DateTime(_) => ValueKind::DateTime,
            Value::Array(_) => ValueKind::Array,
            Value::Document(_) => ValueKind::Document,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null | Value::Undefined => serializer.serialize_unit(),
            Value::Boolean(v) => serializer.serialize_bool(*v),
            Value::Int32(v) => serializer.serialize_i32(*v),
            Value::Int64(v) => serializer.serialize_i64(*v),
            Value::Double(v) => serializer.serialize_f64(*v),
            Value::String(v) => serializer.serialize_str(v),
            Value::Binary(v) => serializer.serialize_bytes(v.as_bytes()),
            Value::DateTime(v) => serializer.serialize_i64(v.millis()),
            Value::Array(items) => serializer.collect_seq(items),
            Value::Document(doc) => doc.serialize(serializer),
        }
    }
}

macro_rules! impl_value_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

impl_value_from!(
    bool => Boolean,
    i32 => Int32,
    i64 => Int64,
    f64 => Double,
    String => String,
    &str => String,
    Binary => Binary,
    Timestamp => DateTime,
    Vec<Value> => Array,
    Document => Document,
);

/// An ordered mapping from field name to value.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Document(IndexMap<String, Value>);

impl Document {
    pub fn new() -> Self {
        Document(IndexMap::new())
    }

    /// Inserts a value, returning the previous one under the same name.
    ///
    /// A replaced entry keeps its original position.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.0.get_mut(name)
    }

    pub fn get_document(&self, name: &str) -> Option<&Document> {
        self.get(name).and_then(Value::as_document)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.shift_remove(name)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Document(iter.into_iter().collect())
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Builds a [`Document`] from `name => value` pairs.
///
/// ```
/// use docmap_core::{doc, Value};
///
/// let d = doc! { "name" => "ada", "age" => 36, "tags" => doc! {} };
/// assert_eq!(d.get("age"), Some(&Value::Int32(36)));
/// ```
#[macro_export]
macro_rules! doc {
    () => { $crate::Document::new() };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut document = $crate::Document::new();
        $( document.insert($name, $value); )+
        document
    }};
}

/// A byte string, written as a binary value rather than an array.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Binary(pub Vec<u8>);

impl Binary {
    pub fn new(data: Vec<u8>) -> Self {
        Binary(data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Binary {
    fn from(v: Vec<u8>) -> Self {
        Binary(v)
    }
}

impl From<&[u8]> for Binary {
    fn from(v: &[u8]) -> Self {
        Binary(v.to_vec())
    }
}

/// A point in time with millisecond precision.
///
/// The zero timestamp is the Unix epoch; it reports its own zero state so
/// `omitempty` skips it even inside aggressive struct-zero checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn from_millis(millis: i64) -> Self {
        Timestamp(millis)
    }

    pub fn millis(&self) -> i64 {
        self.0
    }
}

impl Zeroer for Timestamp {
    fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl_reflect_scalar!(Binary, Timestamp, Value, Document);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_preserves_insertion_order() {
        let d = doc! { "z" => 1, "a" => 2, "m" => 3 };
        let keys: Vec<_> = d.keys().collect();
        assert_eq!(keys, ["z", "a", "m"]);
    }

    #[test]
    fn replacing_keeps_position() {
        let mut d = doc! { "a" => 1, "b" => 2 };
        let previous = d.insert("a", "one");
        assert_eq!(previous, Some(Value::Int32(1)));
        let keys: Vec<_> = d.keys().collect();
        assert_eq!(keys, ["a", "b"]);
        assert_eq!(d.get("a").and_then(Value::as_str), Some("one"));
    }

    #[test]
    fn value_kinds() {
        assert_eq!(Value::from(1i64).kind(), ValueKind::Int64);
        assert_eq!(Value::from(doc! {}).kind(), ValueKind::Document);
        assert!(ValueKind::Array.is_container());
        assert!(!ValueKind::String.is_container());
        assert_eq!(ValueKind::DateTime.to_string(), "datetime");
    }

    #[test]
    fn document_serializes_as_map() {
        let d = doc! { "name" => "ada", "n" => 2, "nested" => doc! { "ok" => true } };
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, r#"{"name":"ada","n":2,"nested":{"ok":true}}"#);
    }

    #[test]
    fn timestamp_zero_state() {
        assert!(Timestamp::default().is_zero());
        assert!(!Timestamp::from_millis(1).is_zero());
    }
}

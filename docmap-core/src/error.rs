use std::fmt;

use crate::value::ValueKind;

/// Malformed field annotation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TagError {
    #[error("unknown option {option:?} on field {field}")]
    UnknownOption { field: String, option: String },
}

/// Failure to build a struct descriptor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    #[error("{type_name}: inline map field {field} must have string keys")]
    InvalidInlineMap { type_name: &'static str, field: String },
    #[error("{type_name}: multiple inline maps")]
    MultipleInlineMaps { type_name: &'static str },
    #[error("{type_name}: field {field} cannot be inlined (found {found})")]
    InvalidInlineTarget {
        type_name: &'static str,
        field: String,
        found: &'static str,
    },
    #[error("{type_name}: duplicated key {name}")]
    DuplicateKey { type_name: &'static str, name: String },
    #[error("{type_name}: inline field {field} recursively inlines its own type")]
    RecursiveInline { type_name: &'static str, field: String },
    #[error("{type_name} is not a struct")]
    NotAStruct { type_name: &'static str },
    #[error(transparent)]
    Tag(#[from] TagError),
}

/// Sink/source protocol violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("expected {expected}, found {found}")]
    UnexpectedKind { expected: &'static str, found: String },
    #[error("element name written outside a document")]
    NameOutsideDocument,
    #[error("value written without an element name")]
    MissingElementName,
    #[error("container value passed as a scalar: {0}")]
    ContainerAsScalar(ValueKind),
    #[error("unbalanced {0}")]
    Unbalanced(&'static str),
    #[error("previous value was not consumed")]
    ValueNotConsumed,
    #[error("no value available")]
    Exhausted,
}

/// Failure while encoding a value into a document.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("cannot encode {type_name} as a document: not a struct")]
    NotAStruct { type_name: &'static str },
    #[error("no encoder found for {type_name}")]
    NoEncoder { type_name: &'static str },
    #[error("value is not a {expected}")]
    TypeMismatch { expected: &'static str },
    #[error("inline map key {key} collides with a struct field")]
    InlineMapCollision { key: String },
    #[error("{value} overflows {target}")]
    Overflow { value: String, target: &'static str },
    #[error("map key type {type_name} needs key stringification enabled")]
    UnsupportedMapKey { type_name: &'static str },
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("{0}")]
    Custom(String),
}

/// Failure while decoding a document into a value.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// A nested failure under one or more document keys.
    ///
    /// `keys` is innermost-first; use [`DecodeError::keys`] for the path.
    #[error("error decoding key {}: {source}", DottedPath(.keys))]
    Key {
        keys: Vec<String>,
        source: Box<DecodeError>,
    },
    #[error("cannot decode into {type_name}: not a struct")]
    NotAStruct { type_name: &'static str },
    #[error("cannot decode {found} into {target}")]
    IncompatibleType { found: ValueKind, target: &'static str },
    #[error("no decoder found for {type_name}")]
    NoDecoder { type_name: &'static str },
    #[error("{value} overflows {target}")]
    Overflow { value: String, target: &'static str },
    #[error("{value} cannot be decoded into {target} without truncation")]
    Truncation { value: String, target: &'static str },
    #[error("invalid map key {key:?} for {target}")]
    InvalidMapKey { key: String, target: &'static str },
    #[error("value is not a {expected}")]
    TypeMismatch { expected: &'static str },
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("{0}")]
    Custom(String),
}

impl DecodeError {
    /// Records that this failure happened under `key`.
    ///
    /// Called while unwinding, so keys arrive innermost-first; an existing
    /// `Key` error is extended rather than nested.
    pub fn with_key(self, key: &str) -> Self {
        match self {
            DecodeError::Key { mut keys, source } => {
                keys.push(key.to_string());
                DecodeError::Key { keys, source }
            }
            other => DecodeError::Key {
                keys: vec![key.to_string()],
                source: Box::new(other),
            },
        }
    }

    /// The document keys leading to the failure, outermost first.
    pub fn keys(&self) -> Vec<&str> {
        match self {
            DecodeError::Key { keys, .. } => keys.iter().rev().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// The innermost error, without key context.
    pub fn root_cause(&self) -> &DecodeError {
        match self {
            DecodeError::Key { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

struct DottedPath<'a>(&'a [String]);

impl fmt::Display for DottedPath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.0.iter().rev().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(key)?;
        }
        Ok(())
    }
}

/// Failure walking a field path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("empty field path")]
    Empty,
    #[error("no field at index {index} (depth {depth})")]
    InvalidIndex { index: usize, depth: usize },
    #[error("nil pointer at depth {depth}")]
    NilPointer { depth: usize },
    #[error("value at depth {depth} is not a struct")]
    NotAStruct { depth: usize },
}

/// Failure converting a document to or from CBOR bytes.
#[derive(Debug, thiserror::Error)]
pub enum CborError {
    #[error("CBOR serialization failed: {0}")]
    Serialize(#[from] ciborium::ser::Error<std::io::Error>),
    #[error("CBOR deserialization failed: {0}")]
    Deserialize(#[from] ciborium::de::Error<std::io::Error>),
    #[error("top-level CBOR value is not a map")]
    NotAMap,
    #[error("map key is not a text string")]
    NonTextKey,
    #[error("unsupported CBOR value: {0}")]
    Unsupported(&'static str),
    #[error("integer {0} does not fit in 64 bits")]
    IntegerRange(i128),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_accumulate_innermost_first() {
        let err = DecodeError::TypeMismatch { expected: "i32" }
            .with_key("c")
            .with_key("b")
            .with_key("a");
        assert_eq!(err.keys(), ["a", "b", "c"]);
        assert!(matches!(err.root_cause(), DecodeError::TypeMismatch { .. }));
        assert_eq!(err.to_string(), "error decoding key a.b.c: value is not a i32");
    }

    #[test]
    fn plain_error_has_no_keys() {
        let err = DecodeError::Custom("boom".into());
        assert!(err.keys().is_empty());
        assert_eq!(err.to_string(), "boom");
    }
}

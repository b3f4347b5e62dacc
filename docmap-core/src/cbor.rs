//! CBOR encoding of documents.
//!
//! Datetimes use tag 1 (epoch seconds as a float). Undefined is written as
//! null. Integers read back as int32 when they fit.

use ciborium::Value as Cbor;

use crate::error::CborError;
use crate::value::{Binary, Document, Timestamp, Value};

const EPOCH_TAG: u64 = 1;

/// Serializes a document as a CBOR map.
pub fn to_vec(doc: &Document) -> Result<Vec<u8>, CborError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(&document_to_cbor(doc), &mut bytes)?;
    Ok(bytes)
}

/// Parses a CBOR map into a document.
pub fn from_slice(bytes: &[u8]) -> Result<Document, CborError> {
    let value: Cbor = ciborium::from_reader(bytes)?;
    match value {
        Cbor::Map(entries) => map_to_document(entries),
        _ => Err(CborError::NotAMap),
    }
}

fn document_to_cbor(doc: &Document) -> Cbor {
    Cbor::Map(
        doc.iter()
            .map(|(name, value)| (Cbor::Text(name.to_string()), value_to_cbor(value)))
            .collect(),
    )
}

fn value_to_cbor(value: &Value) -> Cbor {
    match value {
        Value::Null | Value::Undefined => Cbor::Null,
        Value::Boolean(b) => Cbor::Bool(*b),
        Value::Int32(v) => Cbor::Integer((*v).into()),
        Value::Int64(v) => Cbor::Integer((*v).into()),
        Value::Double(f) => Cbor::Float(*f),
        Value::String(s) => Cbor::Text(s.clone()),
        Value::Binary(b) => Cbor::Bytes(b.as_bytes().to_vec()),
        Value::DateTime(t) => {
            let seconds = t.millis() as f64 / 1000.0;
            Cbor::Tag(EPOCH_TAG, Box::new(Cbor::Float(seconds)))
        }
        Value::Array(items) => Cbor::Array(items.iter().map(value_to_cbor).collect()),
        Value::Document(doc) => document_to_cbor(doc),
    }
}

fn map_to_document(entries: Vec<(Cbor, Cbor)>) -> Result<Document, CborError> {
    entries
        .into_iter()
        .map(|(key, value)| match key {
            Cbor::Text(name) => Ok((name, cbor_to_value(value)?)),
            _ => Err(CborError::NonTextKey),
        })
        .collect()
}

fn cbor_to_value(value: Cbor) -> Result<Value, CborError> {
    Ok(match value {
        Cbor::Null => Value::Null,
        Cbor::Bool(b) => Value::Boolean(b),
        Cbor::Integer(i) => integer_to_value(i128::from(i))?,
        Cbor::Float(f) => Value::Double(f),
        Cbor::Text(s) => Value::String(s),
        Cbor::Bytes(b) => Value::Binary(Binary::new(b)),
        Cbor::Array(items) => Value::Array(
            items
                .into_iter()
                .map(cbor_to_value)
                .collect::<Result<_, _>>()?,
        ),
        Cbor::Map(entries) => Value::Document(map_to_document(entries)?),
        Cbor::Tag(EPOCH_TAG, inner) => {
            let seconds = match *inner {
                Cbor::Float(f) => f,
                Cbor::Integer(i) => i128::from(i) as f64,
                _ => return Err(CborError::Unsupported("non-numeric epoch time")),
            };
            Value::DateTime(Timestamp::from_millis((seconds * 1000.0).round() as i64))
        }
        Cbor::Tag(..) => return Err(CborError::Unsupported("tag")),
        _ => return Err(CborError::Unsupported("simple value")),
    })
}

fn integer_to_value(i: i128) -> Result<Value, CborError> {
    if let Ok(small) = i32::try_from(i) {
        Ok(Value::Int32(small))
    } else if let Ok(wide) = i64::try_from(i) {
        Ok(Value::Int64(wide))
    } else {
        Err(CborError::IntegerRange(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn document_round_trip() {
        let original = doc! {
            "name" => "ada",
            "small" => 7,
            "big" => 1i64 << 40,
            "ratio" => 0.25,
            "raw" => Binary::new(vec![0, 1, 2]),
            "when" => Timestamp::from_millis(1_700_000_000_123),
            "list" => vec![Value::from(true), Value::Null],
            "nested" => doc! { "k" => "v" },
        };
        let bytes = to_vec(&original).unwrap();
        assert_eq!(from_slice(&bytes).unwrap(), original);
    }

    #[test]
    fn int64_that_fits_reads_back_as_int32() {
        let bytes = to_vec(&doc! { "n" => 5i64 }).unwrap();
        assert_eq!(from_slice(&bytes).unwrap(), doc! { "n" => 5 });
    }

    #[test]
    fn undefined_becomes_null() {
        let mut d = Document::new();
        d.insert("u", Value::Undefined);
        let bytes = to_vec(&d).unwrap();
        assert_eq!(from_slice(&bytes).unwrap().get("u"), Some(&Value::Null));
    }

    #[test]
    fn top_level_must_be_map() {
        let mut bytes = Vec::new();
        ciborium::into_writer(&Cbor::Array(vec![]), &mut bytes).unwrap();
        assert!(matches!(from_slice(&bytes), Err(CborError::NotAMap)));

        let mut bytes = Vec::new();
        let integer_key = Cbor::Map(vec![(Cbor::Integer(1.into()), Cbor::Null)]);
        ciborium::into_writer(&integer_key, &mut bytes).unwrap();
        assert!(matches!(from_slice(&bytes), Err(CborError::NonTextKey)));
    }
}

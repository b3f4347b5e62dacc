//! Docmap maps Rust structs to ordered documents and back.
//!
//! Core concepts:
//! - **Record**: A struct whose fields are visible through reflection (`#[derive(Record)]`)
//! - **Document**: An ordered list of named [`Value`]s, the encoded form of a record
//! - **Descriptor**: The cached per-type field table (names, flags, flattening paths, codecs)
//! - **Registry**: Looks up encoders and decoders by type, then by kind
//! - **StructCodec**: Turns records into documents and documents into records using descriptors
//!
//! # Example
//!
//! ```
//! use docmap_core::{Record, doc, from_document, to_document};
//!
//! #[derive(Debug, Default, PartialEq, Record)]
//! struct User {
//!     #[docmap(tag = "_id")]
//!     pub id: String,
//!     #[docmap(tag = "age,omitempty")]
//!     pub age: u32,
//! }
//!
//! let user = User { id: "ada".into(), age: 0 };
//! let document = to_document(&user).unwrap();
//! assert_eq!(document, doc! { "_id" => "ada" });
//!
//! let back: User = from_document(document).unwrap();
//! assert_eq!(back, user);
//! ```
//!
//! # Field Annotations
//!
//! Each field carries an optional `tag = "name,opt,..."` annotation. The name
//! defaults to the lowercased field name; `"-"` excludes the field. Options
//! are `omitempty`, `minsize`, `truncate` and `inline`. See [`parse_field_tags`].

extern crate self as docmap_core;

pub mod cbor;
mod codecs;
mod describe;
mod error;
mod options;
mod path;
mod reflect;
mod registry;
mod shape;
mod struct_codec;
mod tags;
mod value;
mod wire;

pub use describe::{DescriptorCache, FieldDescriptor, InlineMap, StructDescriptor};
pub use error::{
    CborError, DecodeError, DescriptorError, EncodeError, PathError, TagError, WireError,
};
pub use options::{DecodeContext, DecodeOptions, EncodeContext, EncodeOptions, StructCodecOptions};
pub use path::{deep_zero, ensure_path, field_by_path};
pub use reflect::{
    Map, MapKey, Pointer, Reflect, ReflectMut, ReflectRef, Sequence, Struct, Typed, Variant, Zeroer,
};
pub use registry::{
    Registry, ValueDecoder, ValueEncoder, default_registry, from_document, to_document,
};
pub use shape::{FieldShape, Kind, Shape, ShapeKind};
pub use struct_codec::StructCodec;
pub use tags::{FieldTags, TagConvention, parse_field_tags};
pub use value::{Binary, Document, Timestamp, Value, ValueKind};
pub use wire::{
    DocumentSink, DocumentSource, TreeReader, TreeWriter, read_value, write_document, write_value,
};

#[cfg(feature = "derive")]
pub use docmap_derive::Record;

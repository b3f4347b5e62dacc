use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use crate::codecs;
use crate::describe::StructDescriptor;
use crate::error::{DecodeError, DescriptorError, EncodeError};
use crate::options::{
    DecodeContext, DecodeOptions, EncodeContext, EncodeOptions, StructCodecOptions,
};
use crate::reflect::{Reflect, Typed, Zeroer};
use crate::shape::{Kind, Shape};
use crate::struct_codec::StructCodec;
use crate::tags::TagConvention;
use crate::value::Document;
use crate::wire::{DocumentSink, DocumentSource, TreeReader, TreeWriter};

/// Writes one reflected value into a sink.
pub trait ValueEncoder: Send + Sync {
    fn encode(
        &self,
        ctx: &EncodeContext<'_>,
        sink: &mut dyn DocumentSink,
        value: &dyn Reflect,
    ) -> Result<(), EncodeError>;
}

/// Reads one value from a source into a reflected destination.
pub trait ValueDecoder: Send + Sync {
    fn decode(
        &self,
        ctx: &DecodeContext<'_>,
        source: &mut dyn DocumentSource,
        value: &mut dyn Reflect,
    ) -> Result<(), DecodeError>;
}

pub(crate) type ZeroCheck = fn(&dyn Reflect) -> bool;

fn zero_check<T: Zeroer + Reflect>(value: &dyn Reflect) -> bool {
    value.downcast_ref::<T>().is_some_and(Zeroer::is_zero)
}

/// Encoder, decoder and zero-check lookup, plus the struct codec and its
/// descriptor cache.
///
/// Lookup tries the exact type first, then the type's kind.
pub struct Registry {
    type_encoders: HashMap<TypeId, Arc<dyn ValueEncoder>>,
    type_decoders: HashMap<TypeId, Arc<dyn ValueDecoder>>,
    kind_encoders: HashMap<Kind, Arc<dyn ValueEncoder>>,
    kind_decoders: HashMap<Kind, Arc<dyn ValueDecoder>>,
    zeroers: HashMap<TypeId, ZeroCheck>,
    struct_codec: StructCodec,
}

impl Registry {
    /// Creates a registry with the default codecs.
    pub fn new() -> Self {
        Self::with_struct_options(StructCodecOptions::default())
    }

    /// Creates a registry with the default codecs and a configured struct codec.
    pub fn with_struct_options(options: StructCodecOptions) -> Self {
        let mut registry = Registry {
            type_encoders: HashMap::new(),
            type_decoders: HashMap::new(),
            kind_encoders: HashMap::new(),
            kind_decoders: HashMap::new(),
            zeroers: HashMap::new(),
            struct_codec: StructCodec::new(options),
        };
        codecs::register_defaults(&mut registry);
        registry
    }

    pub fn register_type_encoder<T: Typed>(
        &mut self,
        encoder: impl ValueEncoder + 'static,
    ) -> &mut Self {
        self.type_encoders.insert(TypeId::of::<T>(), Arc::new(encoder));
        self.invalidate();
        self
    }

    pub fn register_type_decoder<T: Typed>(
        &mut self,
        decoder: impl ValueDecoder + 'static,
    ) -> &mut Self {
        self.type_decoders.insert(TypeId::of::<T>(), Arc::new(decoder));
        self.invalidate();
        self
    }

    /// Registers one value as both encoder and decoder for `T`.
    pub fn register_type_codec<T, C>(&mut self, codec: C) -> &mut Self
    where
        T: Typed,
        C: ValueEncoder + ValueDecoder + 'static,
    {
        let codec = Arc::new(codec);
        self.type_encoders.insert(TypeId::of::<T>(), codec.clone());
        self.type_decoders.insert(TypeId::of::<T>(), codec);
        self.invalidate();
        self
    }

    pub fn register_kind_encoder(
        &mut self,
        kind: Kind,
        encoder: impl ValueEncoder + 'static,
    ) -> &mut Self {
        self.kind_encoders.insert(kind, Arc::new(encoder));
        self.invalidate();
        self
    }

    pub fn register_kind_decoder(
        &mut self,
        kind: Kind,
        decoder: impl ValueDecoder + 'static,
    ) -> &mut Self {
        self.kind_decoders.insert(kind, Arc::new(decoder));
        self.invalidate();
        self
    }

    /// Makes `T`'s own zero state decide whether it is empty.
    pub fn register_zeroer<T: Zeroer + Typed>(&mut self) -> &mut Self {
        self.zeroers.insert(TypeId::of::<T>(), zero_check::<T>);
        self.invalidate();
        self
    }

    fn invalidate(&self) {
        self.struct_codec.clear_cache();
    }

    pub fn lookup_encoder(&self, shape: &Shape) -> Option<Arc<dyn ValueEncoder>> {
        self.type_encoders
            .get(&shape.id())
            .or_else(|| self.kind_encoders.get(&shape.kind().kind()))
            .cloned()
    }

    pub fn lookup_decoder(&self, shape: &Shape) -> Option<Arc<dyn ValueDecoder>> {
        self.type_decoders
            .get(&shape.id())
            .or_else(|| self.kind_decoders.get(&shape.kind().kind()))
            .cloned()
    }

    pub(crate) fn zero_check(&self, shape: &Shape) -> Option<ZeroCheck> {
        self.zeroers.get(&shape.id()).copied()
    }

    pub fn struct_codec(&self) -> &StructCodec {
        &self.struct_codec
    }

    /// Returns the cached descriptor for `T`, building it on first use.
    pub fn describe<T: Typed>(
        &self,
        convention: TagConvention,
    ) -> Result<Arc<StructDescriptor>, DescriptorError> {
        self.struct_codec
            .describe(self, &T::type_shape(), convention, false)
    }

    /// Encodes a struct (or a [`Document`]) into a new document.
    pub fn encode_document(
        &self,
        value: &dyn Reflect,
        options: &EncodeOptions,
    ) -> Result<Document, EncodeError> {
        let mut writer = TreeWriter::new();
        self.encode_to(&mut writer, value, options)?;
        Ok(writer.into_document()?)
    }

    /// Encodes a struct (or a [`Document`]) into `sink` as one document.
    pub fn encode_to(
        &self,
        sink: &mut dyn DocumentSink,
        value: &dyn Reflect,
        options: &EncodeOptions,
    ) -> Result<(), EncodeError> {
        let shape = value.shape();
        if !shape.is_struct() && !shape.is::<Document>() {
            return Err(EncodeError::NotAStruct {
                type_name: shape.name(),
            });
        }
        let encoder = self.lookup_encoder(&shape).ok_or(EncodeError::NoEncoder {
            type_name: shape.name(),
        })?;
        let ctx = EncodeContext::new(self, options);
        encoder.encode(&ctx, sink, value)
    }

    /// Decodes a document into a new `T`.
    pub fn decode_document<T: Typed + Default>(
        &self,
        doc: Document,
        options: &DecodeOptions,
    ) -> Result<T, DecodeError> {
        let mut value = T::default();
        self.decode_into(doc, &mut value, options)?;
        Ok(value)
    }

    /// Decodes a document into an existing value.
    pub fn decode_into(
        &self,
        doc: Document,
        value: &mut dyn Reflect,
        options: &DecodeOptions,
    ) -> Result<(), DecodeError> {
        let mut reader = TreeReader::from_document(doc);
        self.decode_from(&mut reader, value, options)
    }

    /// Decodes the next value from `source` into an existing value.
    pub fn decode_from(
        &self,
        source: &mut dyn DocumentSource,
        value: &mut dyn Reflect,
        options: &DecodeOptions,
    ) -> Result<(), DecodeError> {
        let shape = value.shape();
        let decoder = self.lookup_decoder(&shape).ok_or(DecodeError::NoDecoder {
            type_name: shape.name(),
        })?;
        let ctx = DecodeContext::new(self, options);
        decoder.decode(&ctx, source, value)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

static DEFAULT_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// The process-wide registry with the default codecs.
pub fn default_registry() -> &'static Registry {
    &DEFAULT_REGISTRY
}

/// Encodes a struct with the default registry and options.
pub fn to_document<T: Reflect>(value: &T) -> Result<Document, EncodeError> {
    DEFAULT_REGISTRY.encode_document(value, &EncodeOptions::default())
}

/// Decodes a document with the default registry and options.
pub fn from_document<T: Typed + Default>(doc: Document) -> Result<T, DecodeError> {
    DEFAULT_REGISTRY.decode_document(doc, &DecodeOptions::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Timestamp, Value};

    struct Upper;

    impl ValueEncoder for Upper {
        fn encode(
            &self,
            _ctx: &EncodeContext<'_>,
            sink: &mut dyn DocumentSink,
            value: &dyn Reflect,
        ) -> Result<(), EncodeError> {
            let text = value
                .downcast_ref::<String>()
                .ok_or(EncodeError::TypeMismatch { expected: "String" })?;
            sink.write_scalar(Value::from(text.to_uppercase()))?;
            Ok(())
        }
    }

    #[test]
    fn type_lookup_wins_over_kind() {
        let registry = Registry::new();
        let shape = <i32 as Typed>::type_shape();
        assert!(registry.lookup_encoder(&shape).is_some());
        assert!(registry.lookup_decoder(&shape).is_some());

        let vec_shape = <Vec<String> as Typed>::type_shape();
        assert!(registry.lookup_encoder(&vec_shape).is_some());
    }

    #[test]
    fn custom_encoder_overrides_default() {
        let mut registry = Registry::new();
        registry.register_type_encoder::<String>(Upper);
        let encoder = registry
            .lookup_encoder(&<String as Typed>::type_shape())
            .unwrap();
        let mut writer = TreeWriter::new();
        let options = EncodeOptions::default();
        let ctx = EncodeContext::new(&registry, &options);
        encoder.encode(&ctx, &mut writer, &"abc".to_string()).unwrap();
        assert_eq!(writer.into_value().unwrap(), Value::from("ABC"));
    }

    #[test]
    fn timestamp_zero_check_is_registered() {
        let registry = Registry::new();
        let check = registry
            .zero_check(&<Timestamp as Typed>::type_shape())
            .unwrap();
        assert!(check(&Timestamp::default()));
        assert!(!check(&Timestamp::from_millis(5)));
    }

    #[test]
    fn scalars_are_not_documents() {
        let registry = Registry::new();
        let err = registry
            .encode_document(&5i32, &EncodeOptions::default())
            .unwrap_err();
        assert!(matches!(err, EncodeError::NotAStruct { .. }));
    }
}

//! Default encoders and decoders.

use std::marker::PhantomData;

use crate::error::{DecodeError, EncodeError};
use crate::options::{DecodeContext, DecodeOptions, EncodeContext, EncodeOptions};
use crate::reflect::{Map, Reflect, ReflectMut, ReflectRef, Typed};
use crate::registry::{Registry, ValueDecoder, ValueEncoder};
use crate::shape::{Kind, Shape, ShapeKind};
use crate::value::{Binary, Document, Timestamp, Value, ValueKind};
use crate::wire::{DocumentSink, DocumentSource, read_value, write_document, write_value};

pub(crate) fn register_defaults(registry: &mut Registry) {
    macro_rules! primitives {
        ($($t:ty),* $(,)?) => {
            $( registry.register_type_codec::<$t, _>(PrimitiveCodec::<$t>::new()); )*
        };
    }
    primitives!(
        bool, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, String, Binary, Timestamp, Vec<u8>,
    );

    registry
        .register_type_codec::<Value, _>(ValueCodec)
        .register_type_codec::<Document, _>(DocumentCodec)
        .register_zeroer::<Timestamp>();

    for (kind, encoder, decoder) in [
        (Kind::Sequence, Codec::Sequence, Codec::Sequence),
        (Kind::Map, Codec::Map, Codec::Map),
        (Kind::Pointer, Codec::Pointer, Codec::Pointer),
        (Kind::Variant, Codec::Variant, Codec::Variant),
        (Kind::Struct, Codec::Struct, Codec::Struct),
    ] {
        registry
            .register_kind_encoder(kind, encoder)
            .register_kind_decoder(kind, decoder);
    }
}

/// Closes the innermost open scope after a failure, keeping the original error.
pub(crate) fn abandon(source: &mut dyn DocumentSource, err: DecodeError) -> DecodeError {
    if let Err(wire) = source.skip_to_end() {
        tracing::trace!(%wire, "could not skip rest of scope after decode failure");
    }
    err
}

/// Writes one element per map entry; `skip_key` may drop or reject entries.
pub(crate) fn encode_map_elements(
    ctx: &EncodeContext<'_>,
    sink: &mut dyn DocumentSink,
    map: &dyn Map,
    encoder: &dyn ValueEncoder,
    mut skip_key: impl FnMut(&str) -> Result<bool, EncodeError>,
) -> Result<(), EncodeError> {
    for (key, value) in map.entries() {
        if skip_key(&key)? {
            continue;
        }
        sink.begin_element(&key)?;
        encoder.encode(ctx, sink, value)?;
    }
    Ok(())
}

/// Conversion between a leaf type and a single document value.
trait Primitive: Typed + Sized {
    fn to_value(&self, options: &EncodeOptions) -> Result<Value, EncodeError>;

    fn from_value(value: Value, options: &DecodeOptions) -> Result<Self, DecodeError>;
}

struct PrimitiveCodec<T>(PhantomData<fn() -> T>);

impl<T> PrimitiveCodec<T> {
    fn new() -> Self {
        PrimitiveCodec(PhantomData)
    }
}

impl<T: Primitive> ValueEncoder for PrimitiveCodec<T> {
    fn encode(
        &self,
        ctx: &EncodeContext<'_>,
        sink: &mut dyn DocumentSink,
        value: &dyn Reflect,
    ) -> Result<(), EncodeError> {
        let value = value.downcast_ref::<T>().ok_or(EncodeError::TypeMismatch {
            expected: std::any::type_name::<T>(),
        })?;
        sink.write_scalar(value.to_value(ctx.options)?)?;
        Ok(())
    }
}

impl<T: Primitive> ValueDecoder for PrimitiveCodec<T> {
    fn decode(
        &self,
        ctx: &DecodeContext<'_>,
        source: &mut dyn DocumentSource,
        value: &mut dyn Reflect,
    ) -> Result<(), DecodeError> {
        let target = value.downcast_mut::<T>().ok_or(DecodeError::TypeMismatch {
            expected: std::any::type_name::<T>(),
        })?;
        let kind = source.peek_kind()?;
        if kind.is_container() {
            source.skip()?;
            return Err(incompatible::<T>(kind));
        }
        *target = T::from_value(source.read_scalar()?, ctx.options)?;
        Ok(())
    }
}

fn incompatible<T>(found: ValueKind) -> DecodeError {
    DecodeError::IncompatibleType {
        found,
        target: std::any::type_name::<T>(),
    }
}

fn integer_from_value<T>(value: Value, options: &DecodeOptions) -> Result<T, DecodeError>
where
    T: TryFrom<i64>,
{
    let target = std::any::type_name::<T>();
    let n = match value {
        Value::Int32(v) => i64::from(v),
        Value::Int64(v) => v,
        Value::Double(f) => {
            if !options.truncate && f.fract() != 0.0 {
                return Err(DecodeError::Truncation {
                    value: f.to_string(),
                    target,
                });
            }
            if !(f >= i64::MIN as f64 && f < i64::MAX as f64) {
                return Err(DecodeError::Overflow {
                    value: f.to_string(),
                    target,
                });
            }
            f as i64
        }
        Value::Boolean(b) => i64::from(b),
        Value::Null | Value::Undefined => 0,
        other => return Err(incompatible::<T>(other.kind())),
    };
    T::try_from(n).map_err(|_| DecodeError::Overflow {
        value: n.to_string(),
        target,
    })
}

fn float_from_value(value: Value, target: &'static str) -> Result<f64, DecodeError> {
    match value {
        Value::Double(f) => Ok(f),
        Value::Int32(v) => Ok(f64::from(v)),
        Value::Int64(v) => Ok(v as f64),
        Value::Boolean(b) => Ok(if b { 1.0 } else { 0.0 }),
        Value::Null | Value::Undefined => Ok(0.0),
        other => Err(DecodeError::IncompatibleType {
            found: other.kind(),
            target,
        }),
    }
}

/// 64-bit integers shrink to int32 under `min_size` when they fit.
fn sized_integer(v: i64, options: &EncodeOptions) -> Value {
    match i32::try_from(v) {
        Ok(small) if options.min_size => Value::Int32(small),
        _ => Value::Int64(v),
    }
}

macro_rules! int32_primitive {
    ($($t:ty),*) => {
        $(
            impl Primitive for $t {
                fn to_value(&self, _options: &EncodeOptions) -> Result<Value, EncodeError> {
                    Ok(Value::Int32(i32::from(*self)))
                }

                fn from_value(value: Value, options: &DecodeOptions) -> Result<Self, DecodeError> {
                    integer_from_value(value, options)
                }
            }
        )*
    };
}

int32_primitive!(i8, i16, i32, u8, u16);

impl Primitive for i64 {
    fn to_value(&self, options: &EncodeOptions) -> Result<Value, EncodeError> {
        Ok(sized_integer(*self, options))
    }

    fn from_value(value: Value, options: &DecodeOptions) -> Result<Self, DecodeError> {
        integer_from_value(value, options)
    }
}

impl Primitive for u32 {
    fn to_value(&self, options: &EncodeOptions) -> Result<Value, EncodeError> {
        Ok(sized_integer(i64::from(*self), options))
    }

    fn from_value(value: Value, options: &DecodeOptions) -> Result<Self, DecodeError> {
        integer_from_value(value, options)
    }
}

impl Primitive for u64 {
    fn to_value(&self, options: &EncodeOptions) -> Result<Value, EncodeError> {
        let v = i64::try_from(*self).map_err(|_| EncodeError::Overflow {
            value: self.to_string(),
            target: "int64",
        })?;
        Ok(sized_integer(v, options))
    }

    fn from_value(value: Value, options: &DecodeOptions) -> Result<Self, DecodeError> {
        integer_from_value(value, options)
    }
}

impl Primitive for f64 {
    fn to_value(&self, _options: &EncodeOptions) -> Result<Value, EncodeError> {
        Ok(Value::Double(*self))
    }

    fn from_value(value: Value, _options: &DecodeOptions) -> Result<Self, DecodeError> {
        float_from_value(value, "f64")
    }
}

impl Primitive for f32 {
    fn to_value(&self, _options: &EncodeOptions) -> Result<Value, EncodeError> {
        Ok(Value::Double(f64::from(*self)))
    }

    fn from_value(value: Value, options: &DecodeOptions) -> Result<Self, DecodeError> {
        let f = float_from_value(value, "f32")?;
        let narrowed = f as f32;
        if !options.truncate && f64::from(narrowed) != f && !f.is_nan() {
            return Err(DecodeError::Truncation {
                value: f.to_string(),
                target: "f32",
            });
        }
        Ok(narrowed)
    }
}

impl Primitive for bool {
    fn to_value(&self, _options: &EncodeOptions) -> Result<Value, EncodeError> {
        Ok(Value::Boolean(*self))
    }

    fn from_value(value: Value, _options: &DecodeOptions) -> Result<Self, DecodeError> {
        match value {
            Value::Boolean(b) => Ok(b),
            Value::Int32(v) => Ok(v != 0),
            Value::Int64(v) => Ok(v != 0),
            Value::Double(f) => Ok(f != 0.0),
            Value::Null | Value::Undefined => Ok(false),
            other => Err(incompatible::<bool>(other.kind())),
        }
    }
}

impl Primitive for String {
    fn to_value(&self, _options: &EncodeOptions) -> Result<Value, EncodeError> {
        Ok(Value::String(self.clone()))
    }

    fn from_value(value: Value, _options: &DecodeOptions) -> Result<Self, DecodeError> {
        match value {
            Value::String(s) => Ok(s),
            Value::Null | Value::Undefined => Ok(String::new()),
            other => Err(incompatible::<String>(other.kind())),
        }
    }
}

impl Primitive for Binary {
    fn to_value(&self, _options: &EncodeOptions) -> Result<Value, EncodeError> {
        Ok(Value::Binary(self.clone()))
    }

    fn from_value(value: Value, _options: &DecodeOptions) -> Result<Self, DecodeError> {
        match value {
            Value::Binary(b) => Ok(b),
            Value::Null | Value::Undefined => Ok(Binary::default()),
            other => Err(incompatible::<Binary>(other.kind())),
        }
    }
}

// Byte vectors travel as binary, not as arrays of integers.
impl Primitive for Vec<u8> {
    fn to_value(&self, _options: &EncodeOptions) -> Result<Value, EncodeError> {
        Ok(Value::Binary(Binary::new(self.clone())))
    }

    fn from_value(value: Value, options: &DecodeOptions) -> Result<Self, DecodeError> {
        Binary::from_value(value, options).map(Binary::into_vec)
    }
}

impl Primitive for Timestamp {
    fn to_value(&self, _options: &EncodeOptions) -> Result<Value, EncodeError> {
        Ok(Value::DateTime(*self))
    }

    fn from_value(value: Value, _options: &DecodeOptions) -> Result<Self, DecodeError> {
        match value {
            Value::DateTime(t) => Ok(t),
            Value::Int64(ms) => Ok(Timestamp::from_millis(ms)),
            Value::Null | Value::Undefined => Ok(Timestamp::default()),
            other => Err(incompatible::<Timestamp>(other.kind())),
        }
    }
}

/// Passes raw values through.
struct ValueCodec;

impl ValueEncoder for ValueCodec {
    fn encode(
        &self,
        _ctx: &EncodeContext<'_>,
        sink: &mut dyn DocumentSink,
        value: &dyn Reflect,
    ) -> Result<(), EncodeError> {
        let value = value
            .downcast_ref::<Value>()
            .ok_or(EncodeError::TypeMismatch { expected: "Value" })?;
        write_value(sink, value)?;
        Ok(())
    }
}

impl ValueDecoder for ValueCodec {
    fn decode(
        &self,
        _ctx: &DecodeContext<'_>,
        source: &mut dyn DocumentSource,
        value: &mut dyn Reflect,
    ) -> Result<(), DecodeError> {
        let target = value
            .downcast_mut::<Value>()
            .ok_or(DecodeError::TypeMismatch { expected: "Value" })?;
        *target = read_value(source)?;
        Ok(())
    }
}

struct DocumentCodec;

impl ValueEncoder for DocumentCodec {
    fn encode(
        &self,
        _ctx: &EncodeContext<'_>,
        sink: &mut dyn DocumentSink,
        value: &dyn Reflect,
    ) -> Result<(), EncodeError> {
        let doc = value
            .downcast_ref::<Document>()
            .ok_or(EncodeError::TypeMismatch { expected: "Document" })?;
        write_document(sink, doc)?;
        Ok(())
    }
}

impl ValueDecoder for DocumentCodec {
    fn decode(
        &self,
        _ctx: &DecodeContext<'_>,
        source: &mut dyn DocumentSource,
        value: &mut dyn Reflect,
    ) -> Result<(), DecodeError> {
        let target = value
            .downcast_mut::<Document>()
            .ok_or(DecodeError::TypeMismatch { expected: "Document" })?;
        match source.peek_kind()? {
            ValueKind::Null | ValueKind::Undefined => {
                source.skip()?;
                target.clear();
                Ok(())
            }
            ValueKind::Document => match read_value(source)? {
                Value::Document(doc) => {
                    *target = doc;
                    Ok(())
                }
                other => Err(incompatible::<Document>(other.kind())),
            },
            found => {
                source.skip()?;
                Err(incompatible::<Document>(found))
            }
        }
    }
}

/// Kind-level codecs, dispatching on the value's reflected view.
#[derive(Clone, Copy)]
enum Codec {
    Sequence,
    Map,
    Pointer,
    Variant,
    Struct,
}

fn element_shape(shape: &Shape) -> Option<Shape> {
    match shape.kind() {
        ShapeKind::Sequence { item } => Some(item()),
        ShapeKind::Map { value, .. } => Some(value()),
        ShapeKind::Pointer { pointee } => Some(pointee()),
        _ => None,
    }
}

fn element_encoder(
    ctx: &EncodeContext<'_>,
    shape: &Shape,
) -> Result<std::sync::Arc<dyn ValueEncoder>, EncodeError> {
    let element = element_shape(shape).ok_or(EncodeError::TypeMismatch {
        expected: "container",
    })?;
    ctx.registry
        .lookup_encoder(&element)
        .ok_or(EncodeError::NoEncoder {
            type_name: element.name(),
        })
}

fn element_decoder(
    ctx: &DecodeContext<'_>,
    shape: &Shape,
) -> Result<std::sync::Arc<dyn ValueDecoder>, DecodeError> {
    let element = element_shape(shape).ok_or(DecodeError::TypeMismatch {
        expected: "container",
    })?;
    ctx.registry
        .lookup_decoder(&element)
        .ok_or(DecodeError::NoDecoder {
            type_name: element.name(),
        })
}

impl ValueEncoder for Codec {
    fn encode(
        &self,
        ctx: &EncodeContext<'_>,
        sink: &mut dyn DocumentSink,
        value: &dyn Reflect,
    ) -> Result<(), EncodeError> {
        let shape = value.shape();
        match (self, value.reflect_ref()) {
            (Codec::Struct, _) => ctx.registry.struct_codec().encode(ctx, sink, value),
            (Codec::Sequence, ReflectRef::Sequence(seq)) => {
                let encoder = element_encoder(ctx, &shape)?;
                sink.begin_array()?;
                for index in 0..seq.len() {
                    if let Some(item) = seq.item(index) {
                        encoder.encode(ctx, sink, item)?;
                    }
                }
                sink.end_array()?;
                Ok(())
            }
            (Codec::Map, ReflectRef::Map(map)) => {
                if map.keys_need_stringify() && !ctx.options.stringify_map_keys {
                    let key_name = match shape.kind() {
                        ShapeKind::Map { key, .. } => key().name(),
                        _ => shape.name(),
                    };
                    return Err(EncodeError::UnsupportedMapKey { type_name: key_name });
                }
                let encoder = element_encoder(ctx, &shape)?;
                sink.begin_document()?;
                encode_map_elements(ctx, sink, map, encoder.as_ref(), |_| Ok(false))?;
                sink.end_document()?;
                Ok(())
            }
            (Codec::Pointer, ReflectRef::Pointer(p)) => match p.pointee() {
                Some(inner) => element_encoder(ctx, &shape)?.encode(ctx, sink, inner),
                None => encode_nil(ctx, sink, &shape),
            },
            (Codec::Variant, ReflectRef::Variant(slot)) => match slot.get() {
                Some(held) => {
                    let held_shape = held.shape();
                    let encoder = ctx
                        .registry
                        .lookup_encoder(&held_shape)
                        .ok_or(EncodeError::NoEncoder {
                            type_name: held_shape.name(),
                        })?;
                    encoder.encode(ctx, sink, held)
                }
                None => Ok(sink.write_scalar(Value::Null)?),
            },
            _ => Err(EncodeError::NoEncoder {
                type_name: shape.name(),
            }),
        }
    }
}

/// Writes a `None` pointer: null, or an empty container when normalized.
fn encode_nil(
    ctx: &EncodeContext<'_>,
    sink: &mut dyn DocumentSink,
    shape: &Shape,
) -> Result<(), EncodeError> {
    let options = ctx.options;
    if let Some(pointee) = element_shape(shape) {
        if options.nil_bytes_as_empty && (pointee.is::<Binary>() || pointee.is::<Vec<u8>>()) {
            sink.write_scalar(Value::Binary(Binary::default()))?;
            return Ok(());
        }
        match pointee.kind() {
            ShapeKind::Sequence { .. }
                if options.nil_slice_as_empty && !pointee.is::<Vec<u8>>() =>
            {
                sink.begin_array()?;
                sink.end_array()?;
                return Ok(());
            }
            ShapeKind::Map { .. } if options.nil_map_as_empty => {
                sink.begin_document()?;
                sink.end_document()?;
                return Ok(());
            }
            _ => {}
        }
    }
    sink.write_scalar(Value::Null)?;
    Ok(())
}

impl ValueDecoder for Codec {
    fn decode(
        &self,
        ctx: &DecodeContext<'_>,
        source: &mut dyn DocumentSource,
        value: &mut dyn Reflect,
    ) -> Result<(), DecodeError> {
        if let Codec::Struct = self {
            return ctx.registry.struct_codec().decode(ctx, source, value);
        }
        let shape = value.shape();
        let kind = source.peek_kind()?;
        let is_null = matches!(kind, ValueKind::Null | ValueKind::Undefined);

        match (self, value.reflect_mut()) {
            (Codec::Sequence, ReflectMut::Sequence(seq)) => {
                if is_null {
                    source.skip()?;
                    seq.clear();
                    return Ok(());
                }
                if kind != ValueKind::Array {
                    source.skip()?;
                    return Err(DecodeError::IncompatibleType {
                        found: kind,
                        target: shape.name(),
                    });
                }
                let decoder = element_decoder(ctx, &shape)?;
                source.begin_array()?;
                seq.clear();
                let mut index = 0usize;
                loop {
                    match source.next_item() {
                        Ok(true) => {}
                        Ok(false) => return Ok(()),
                        Err(err) => return Err(abandon(source, err.into())),
                    }
                    let item = seq.push_default();
                    if let Err(err) = decoder.decode(ctx, source, item) {
                        return Err(abandon(source, err.with_key(&index.to_string())));
                    }
                    index += 1;
                }
            }
            (Codec::Map, ReflectMut::Map(map)) => {
                if is_null {
                    source.skip()?;
                    map.clear();
                    return Ok(());
                }
                if kind != ValueKind::Document {
                    source.skip()?;
                    return Err(DecodeError::IncompatibleType {
                        found: kind,
                        target: shape.name(),
                    });
                }
                let decoder = element_decoder(ctx, &shape)?;
                source.begin_document()?;
                if ctx.options.zero_maps {
                    map.clear();
                }
                loop {
                    let name = match source.next_element() {
                        Ok(Some(name)) => name,
                        Ok(None) => return Ok(()),
                        Err(err) => return Err(abandon(source, err.into())),
                    };
                    let mut element = map.new_value();
                    let inserted = decoder
                        .decode(ctx, source, element.as_mut())
                        .and_then(|()| map.insert_boxed(&name, element));
                    if let Err(err) = inserted {
                        return Err(abandon(source, err.with_key(&name)));
                    }
                }
            }
            (Codec::Pointer, ReflectMut::Pointer(p)) => {
                if is_null {
                    source.skip()?;
                    p.clear();
                    return Ok(());
                }
                let decoder = element_decoder(ctx, &shape)?;
                decoder.decode(ctx, source, p.allocate())
            }
            (Codec::Variant, ReflectMut::Variant(slot)) => {
                if is_null {
                    source.skip()?;
                    slot.reset();
                    return Ok(());
                }
                match slot.get_mut() {
                    Some(held) => {
                        let held_shape = held.shape();
                        let decoder = ctx
                            .registry
                            .lookup_decoder(&held_shape)
                            .ok_or(DecodeError::NoDecoder {
                                type_name: held_shape.name(),
                            })?;
                        decoder.decode(ctx, source, held)
                    }
                    None => {
                        slot.set(read_value(source)?);
                        Ok(())
                    }
                }
            }
            _ => Err(DecodeError::NoDecoder {
                type_name: shape.name(),
            }),
        }
    }
}

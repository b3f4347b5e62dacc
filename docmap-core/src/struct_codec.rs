use std::sync::Arc;

use crate::codecs::{abandon, encode_map_elements};
use crate::describe::{DescriptorCache, FieldDescriptor, StructDescriptor};
use crate::error::{DecodeError, DescriptorError, EncodeError, PathError};
use crate::options::{DecodeContext, EncodeContext, StructCodecOptions};
use crate::path::{deep_zero, ensure_path, field_by_path};
use crate::reflect::{Reflect, ReflectMut, ReflectRef, Struct};
use crate::registry::{Registry, ValueDecoder, ValueEncoder};
use crate::shape::Shape;
use crate::tags::TagConvention;
use crate::value::{Value, ValueKind};
use crate::wire::{DocumentSink, DocumentSource};

/// Encodes structs as documents and decodes documents into structs.
///
/// Field layout comes from [`StructDescriptor`]s, which this codec builds
/// lazily and caches.
pub struct StructCodec {
    options: StructCodecOptions,
    cache: DescriptorCache,
}

impl StructCodec {
    pub fn new(options: StructCodecOptions) -> Self {
        StructCodec {
            options,
            cache: DescriptorCache::new(),
        }
    }

    pub fn options(&self) -> &StructCodecOptions {
        &self.options
    }

    pub fn describe(
        &self,
        registry: &Registry,
        shape: &Shape,
        convention: TagConvention,
        strict: bool,
    ) -> Result<Arc<StructDescriptor>, DescriptorError> {
        self.cache
            .describe(registry, &self.options, shape, convention, strict)
    }

    pub fn cached_descriptors(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Whether `value` counts as empty for `omitempty`.
    ///
    /// Structs are only ever empty when `omit_zero_struct` is set, and then
    /// only if every visible field is empty.
    pub fn is_empty(
        &self,
        registry: &Registry,
        value: &dyn Reflect,
        omit_zero_struct: bool,
    ) -> bool {
        let shape = value.shape();
        if let Some(check) = registry.zero_check(&shape) {
            return check(value);
        }
        match value.reflect_ref() {
            ReflectRef::Pointer(p) => match p.pointee() {
                None => true,
                Some(inner) => registry
                    .zero_check(&inner.shape())
                    .is_some_and(|check| check(inner)),
            },
            ReflectRef::Variant(slot) => slot.is_empty(),
            ReflectRef::Sequence(seq) => seq.is_empty(),
            ReflectRef::Map(map) => map.is_empty(),
            ReflectRef::Struct(fields) => {
                if !omit_zero_struct {
                    return false;
                }
                shape
                    .fields()
                    .iter()
                    .filter(|f| f.public || f.embedded)
                    .all(|f| {
                        fields
                            .field(f.index)
                            .is_none_or(|field| self.is_empty(registry, field, omit_zero_struct))
                    })
            }
            ReflectRef::Scalar(scalar) => scalar.is_zero_value(),
        }
    }

    fn encode_field(
        &self,
        ctx: &EncodeContext<'_>,
        sink: &mut dyn DocumentSink,
        fields: &dyn Struct,
        fd: &FieldDescriptor,
        omit_zero_struct: bool,
    ) -> Result<(), EncodeError> {
        let field = match field_by_path(fields, &fd.path) {
            Ok(field) => field,
            // an unset inline ancestor contributes nothing
            Err(PathError::NilPointer { .. }) => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        let omit_empty = fd.omit_empty || ctx.options.omit_empty;

        let (field, encoder) = match field.reflect_ref() {
            ReflectRef::Variant(slot) => match slot.get() {
                None => {
                    if omit_empty {
                        return Ok(());
                    }
                    sink.begin_element(&fd.name)?;
                    sink.write_scalar(Value::Null)?;
                    return Ok(());
                }
                Some(held) => (held, ctx.registry.lookup_encoder(&held.shape())),
            },
            _ => (field, fd.encoder.clone()),
        };
        let encoder = encoder.ok_or(EncodeError::NoEncoder {
            type_name: field.shape().name(),
        })?;

        if omit_empty && self.is_empty(ctx.registry, field, omit_zero_struct) {
            return Ok(());
        }

        sink.begin_element(&fd.name)?;
        let options = ctx.options.forwarded(fd.min_size);
        encoder.encode(&EncodeContext::new(ctx.registry, &options), sink, field)
    }

    fn decode_elements(
        &self,
        ctx: &DecodeContext<'_>,
        source: &mut dyn DocumentSource,
        value: &mut dyn Reflect,
        sd: &StructDescriptor,
        inline_decoder: Option<&dyn ValueDecoder>,
    ) -> Result<(), DecodeError> {
        let type_name = sd.type_name();
        let ReflectMut::Struct(fields) = value.reflect_mut() else {
            return Err(DecodeError::NotAStruct { type_name });
        };

        while let Some(name) = source.next_element()? {
            let Some(fd) = sd.lookup(&name) else {
                match (sd.inline_map(), inline_decoder) {
                    (Some(inline), Some(decoder)) => {
                        let target = fields.field_mut(inline.index).ok_or(PathError::InvalidIndex {
                            index: inline.index,
                            depth: 0,
                        })?;
                        let ReflectMut::Map(map) = target.reflect_mut() else {
                            return Err(DecodeError::TypeMismatch { expected: "map" });
                        };
                        let mut element = map.new_value();
                        decoder.decode(ctx, source, element.as_mut())?;
                        map.insert_boxed(&name, element)?;
                    }
                    _ => source.skip()?,
                }
                continue;
            };
            self.decode_field(ctx, source, &mut *fields, fd)
                .map_err(|err| err.with_key(&fd.name))?;
        }
        Ok(())
    }

    fn decode_field(
        &self,
        ctx: &DecodeContext<'_>,
        source: &mut dyn DocumentSource,
        fields: &mut dyn Struct,
        fd: &FieldDescriptor,
    ) -> Result<(), DecodeError> {
        let field = ensure_path(fields, &fd.path)?;
        let options = ctx.options.forwarded(fd.truncate);
        let child = DecodeContext::new(ctx.registry, &options);

        match field.reflect_mut() {
            ReflectMut::Variant(slot) => {
                if let Some(held) = slot.get_mut() {
                    let shape = held.shape();
                    let decoder = ctx
                        .registry
                        .lookup_decoder(&shape)
                        .ok_or(DecodeError::NoDecoder {
                            type_name: shape.name(),
                        })?;
                    return decoder.decode(&child, source, held);
                }
            }
            ReflectMut::Pointer(p) => {
                if p.is_none() {
                    p.allocate();
                }
            }
            _ => {}
        }

        let decoder = fd.decoder.as_ref().ok_or(DecodeError::NoDecoder {
            type_name: fd.shape.name(),
        })?;
        decoder.decode(&child, source, field)
    }
}

impl Default for StructCodec {
    fn default() -> Self {
        Self::new(StructCodecOptions::default())
    }
}

impl ValueEncoder for StructCodec {
    fn encode(
        &self,
        ctx: &EncodeContext<'_>,
        sink: &mut dyn DocumentSink,
        value: &dyn Reflect,
    ) -> Result<(), EncodeError> {
        let shape = value.shape();
        let ReflectRef::Struct(fields) = value.reflect_ref() else {
            return Err(EncodeError::NotAStruct {
                type_name: shape.name(),
            });
        };
        let sd = self.describe(
            ctx.registry,
            &shape,
            ctx.options.convention(),
            ctx.options.error_on_inline_duplicates,
        )?;
        let omit_zero_struct =
            ctx.options.omit_zero_struct || self.options.encode_omit_default_struct;

        sink.begin_document()?;
        for fd in sd.fields() {
            self.encode_field(ctx, sink, fields, fd, omit_zero_struct)?;
        }

        if let Some(inline) = sd.inline_map() {
            let map = match fields.field(inline.index).map(|field| field.reflect_ref()) {
                Some(ReflectRef::Map(map)) => map,
                _ => return Err(EncodeError::TypeMismatch { expected: "map" }),
            };
            let encoder = ctx
                .registry
                .lookup_encoder(&inline.value_shape)
                .ok_or(EncodeError::NoEncoder {
                    type_name: inline.value_shape.name(),
                })?;
            let strict = ctx.options.error_on_inline_duplicates;
            encode_map_elements(ctx, sink, map, encoder.as_ref(), |key| {
                if sd.field(key).is_none() {
                    Ok(false)
                } else if strict {
                    Err(EncodeError::InlineMapCollision { key: key.to_string() })
                } else {
                    Ok(true)
                }
            })?;
        }

        sink.end_document()?;
        Ok(())
    }
}

impl ValueDecoder for StructCodec {
    fn decode(
        &self,
        ctx: &DecodeContext<'_>,
        source: &mut dyn DocumentSource,
        value: &mut dyn Reflect,
    ) -> Result<(), DecodeError> {
        let shape = value.shape();
        if !shape.is_struct() {
            source.skip()?;
            return Err(DecodeError::NotAStruct {
                type_name: shape.name(),
            });
        }

        match source.peek_kind()? {
            ValueKind::Null | ValueKind::Undefined => {
                source.skip()?;
                value.reset();
                return Ok(());
            }
            ValueKind::Document => {}
            found => {
                source.skip()?;
                return Err(DecodeError::IncompatibleType {
                    found,
                    target: shape.name(),
                });
            }
        }

        let prepared = self
            .describe(ctx.registry, &shape, ctx.options.convention(), false)
            .map_err(DecodeError::from)
            .and_then(|sd| match sd.inline_map() {
                Some(inline) => {
                    let decoder = ctx
                        .registry
                        .lookup_decoder(&inline.value_shape)
                        .ok_or(DecodeError::NoDecoder {
                            type_name: inline.value_shape.name(),
                        })?;
                    Ok((sd, Some(decoder)))
                }
                None => Ok((sd, None)),
            });
        let (sd, inline_decoder) = match prepared {
            Ok(prepared) => prepared,
            Err(err) => {
                source.skip()?;
                return Err(err);
            }
        };

        if self.options.decode_zero_struct || ctx.options.zero_structs {
            value.reset();
        }
        if self.options.decode_deep_zero_inline && sd.has_inline() {
            deep_zero(value);
        }

        source.begin_document()?;
        self.decode_elements(ctx, source, value, &sd, inline_decoder.as_deref())
            .map_err(|err| abandon(source, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::options::{DecodeOptions, EncodeOptions};
    use crate::value::Timestamp;
    use crate::wire::TreeReader;
    use crate::{Record, Variant, doc};

    #[derive(Debug, Default, Record)]
    struct Point {
        pub x: i32,
        pub y: i32,
    }

    #[derive(Debug, Default, Record)]
    struct Shapes {
        #[docmap(tag = "p,omitempty")]
        pub point: Point,
        #[docmap(tag = ",omitempty")]
        pub when: Timestamp,
        #[docmap(tag = ",omitempty")]
        pub any: Variant,
        pub tags: Vec<String>,
    }

    #[derive(Debug, Default, Record)]
    struct WithExtras {
        pub name: String,
        #[docmap(tag = ",inline")]
        pub extras: HashMap<String, i32>,
    }

    #[test]
    fn struct_emptiness_depends_on_mode() {
        let registry = Registry::new();
        let codec = registry.struct_codec();
        let point = Point::default();
        assert!(!codec.is_empty(&registry, &point, false));
        assert!(codec.is_empty(&registry, &point, true));
        assert!(!codec.is_empty(&registry, &Point { x: 1, y: 0 }, true));
    }

    #[test]
    fn zeroer_types_decide_themselves() {
        let registry = Registry::new();
        let codec = registry.struct_codec();
        assert!(codec.is_empty(&registry, &Timestamp::default(), false));
        assert!(codec.is_empty(&registry, &None::<Timestamp>, false));
        assert!(codec.is_empty(&registry, &Some(Timestamp::default()), false));
        assert!(!codec.is_empty(&registry, &Some(0i32), false));
    }

    #[test]
    fn omit_default_struct_option() {
        let registry = Registry::with_struct_options(StructCodecOptions {
            encode_omit_default_struct: true,
            ..StructCodecOptions::default()
        });
        let doc = registry
            .encode_document(&Shapes::default(), &EncodeOptions::default())
            .unwrap();
        assert_eq!(doc, doc! { "tags" => Vec::<Value>::new() });

        let plain = Registry::new()
            .encode_document(&Shapes::default(), &EncodeOptions::default())
            .unwrap();
        assert!(plain.contains_key("p"));
    }

    #[test]
    fn variant_fields_use_runtime_type() {
        let registry = Registry::new();
        let value = Shapes {
            any: Variant::new(Point { x: 3, y: 4 }),
            ..Shapes::default()
        };
        let doc = registry
            .encode_document(&value, &EncodeOptions::default())
            .unwrap();
        assert_eq!(doc.get("any"), Some(&Value::Document(doc! { "x" => 3, "y" => 4 })));
    }

    #[test]
    fn variant_holding_value_decodes_in_place() {
        let registry = Registry::new();
        let mut value = Shapes {
            any: Variant::new(Point::default()),
            ..Shapes::default()
        };
        registry
            .decode_into(
                doc! { "any" => doc! { "x" => 7 } },
                &mut value,
                &DecodeOptions::default(),
            )
            .unwrap();
        assert_eq!(value.any.downcast_ref::<Point>().map(|p| p.x), Some(7));
    }

    #[test]
    fn inline_map_collisions() {
        let registry = Registry::new();
        let mut extras = HashMap::new();
        extras.insert("name".to_string(), 1);
        extras.insert("other".to_string(), 2);
        let value = WithExtras {
            name: "n".into(),
            extras,
        };

        let doc = registry
            .encode_document(&value, &EncodeOptions::default())
            .unwrap();
        assert_eq!(doc.get("name"), Some(&Value::from("n")));
        assert_eq!(doc.get("other"), Some(&Value::Int32(2)));
        assert_eq!(doc.len(), 2);

        let strict = EncodeOptions {
            error_on_inline_duplicates: true,
            ..EncodeOptions::default()
        };
        let err = registry.encode_document(&value, &strict).unwrap_err();
        assert!(matches!(err, EncodeError::InlineMapCollision { ref key } if key == "name"));
    }

    #[test]
    fn failed_decode_consumes_document() {
        let registry = Registry::new();
        let mut reader = TreeReader::from_document(doc! { "x" => "bad", "y" => 2 });
        let mut point = Point::default();
        let err = registry
            .decode_from(&mut reader, &mut point, &DecodeOptions::default())
            .unwrap_err();
        assert_eq!(err.keys(), ["x"]);
        assert!(reader.is_exhausted());
    }

    #[test]
    fn wrong_top_level_kind() {
        let registry = Registry::new();
        let mut reader = TreeReader::new(Value::from(5));
        let mut point = Point::default();
        let err = registry
            .decode_from(&mut reader, &mut point, &DecodeOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            DecodeError::IncompatibleType {
                found: ValueKind::Int32,
                ..
            }
        ));
        assert!(reader.is_exhausted());
    }

    #[test]
    fn non_struct_destination_consumes_value() {
        let registry = Registry::new();
        let options = DecodeOptions::default();
        let ctx = DecodeContext::new(&registry, &options);
        let mut reader = TreeReader::from_document(doc! { "x" => 1 });
        let mut n = 0i32;
        let err = registry
            .struct_codec()
            .decode(&ctx, &mut reader, &mut n)
            .unwrap_err();
        assert!(matches!(err, DecodeError::NotAStruct { .. }));
        assert!(reader.is_exhausted());
    }

    #[derive(Debug, Default, PartialEq, Record)]
    struct Addr {
        pub city: String,
    }

    #[derive(Debug, Default, PartialEq, Record)]
    struct Revision {
        pub id: String,
        pub version: i32,
    }

    #[derive(Debug, Default, PartialEq, Record)]
    struct Env {
        pub label: String,
        pub home: Option<Addr>,
        #[docmap(tag = ",inline")]
        pub meta: Option<Revision>,
    }

    #[derive(Debug, Default, PartialEq, Record)]
    struct Flat {
        pub label: String,
        pub home: Option<Addr>,
    }

    fn registry_with(options: StructCodecOptions) -> Registry {
        Registry::with_struct_options(options)
    }

    #[test]
    fn deep_zero_inline_allocates_struct_pointers() {
        let registry = registry_with(StructCodecOptions {
            decode_deep_zero_inline: true,
            ..StructCodecOptions::default()
        });
        let mut env = Env {
            label: "old".into(),
            ..Env::default()
        };
        registry
            .decode_into(doc! { "version" => 3 }, &mut env, &DecodeOptions::default())
            .unwrap();
        assert_eq!(
            env,
            Env {
                label: String::new(),
                home: Some(Addr::default()),
                meta: Some(Revision {
                    id: String::new(),
                    version: 3,
                }),
            }
        );
    }

    #[test]
    fn deep_zero_skipped_without_inline_fields() {
        let registry = registry_with(StructCodecOptions {
            decode_deep_zero_inline: true,
            ..StructCodecOptions::default()
        });
        let mut flat = Flat {
            label: "old".into(),
            home: None,
        };
        registry
            .decode_into(doc! {}, &mut flat, &DecodeOptions::default())
            .unwrap();
        assert_eq!(
            flat,
            Flat {
                label: "old".into(),
                home: None,
            }
        );
    }

    #[test]
    fn zero_struct_clears_previous_contents() {
        let registry = registry_with(StructCodecOptions {
            decode_zero_struct: true,
            ..StructCodecOptions::default()
        });
        let mut env = Env {
            label: "old".into(),
            home: Some(Addr {
                city: "gone".into(),
            }),
            meta: None,
        };
        registry
            .decode_into(doc! { "version" => 3 }, &mut env, &DecodeOptions::default())
            .unwrap();
        assert_eq!(env.label, "");
        assert_eq!(env.home, None);
        assert_eq!(env.meta.map(|m| m.version), Some(3));

        let mut kept = Env {
            label: "old".into(),
            ..Env::default()
        };
        Registry::new()
            .decode_into(doc! { "version" => 3 }, &mut kept, &DecodeOptions::default())
            .unwrap();
        assert_eq!(kept.label, "old");
    }

    #[derive(Debug, Default, Record)]
    struct Post {
        pub title: String,
        #[docmap(tag = ",inline")]
        pub extras: HashMap<String, i32>,
    }

    #[test]
    fn uppercase_names_fall_back_to_lowercase() {
        let post: Post = Registry::new()
            .decode_document(
                doc! { "TITLE" => "hello", "Views" => 4 },
                &DecodeOptions::default(),
            )
            .unwrap();
        assert_eq!(post.title, "hello");
        assert_eq!(post.extras.len(), 1);
        assert_eq!(post.extras.get("Views"), Some(&4));
    }
}

//! Struct descriptors: the resolved field layout the struct codec walks.
//!
//! A descriptor maps document names to physical field paths after applying
//! field annotations, flattening inline structs, and resolving duplicated
//! names. Descriptors are built once per (type, tag convention, duplicate
//! policy) and shared.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::error::DescriptorError;
use crate::options::StructCodecOptions;
use crate::registry::{Registry, ValueDecoder, ValueEncoder};
use crate::shape::{Shape, ShapeKind};
use crate::tags::{TagConvention, parse_field_tags};

/// One document field of a struct, possibly reached through inlined structs.
#[derive(Clone)]
pub struct FieldDescriptor {
    /// Document name.
    pub name: String,
    /// Declared identifier of the physical field.
    pub field_name: &'static str,
    /// Field indices from the described struct down to the physical field.
    pub path: Vec<usize>,
    pub omit_empty: bool,
    pub min_size: bool,
    pub truncate: bool,
    pub shape: Shape,
    pub encoder: Option<Arc<dyn ValueEncoder>>,
    pub decoder: Option<Arc<dyn ValueDecoder>>,
}

impl FieldDescriptor {
    /// True if the field lives in an inlined struct.
    pub fn is_inlined(&self) -> bool {
        self.path.len() > 1
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("field_name", &self.field_name)
            .field("path", &self.path)
            .field("omit_empty", &self.omit_empty)
            .field("min_size", &self.min_size)
            .field("truncate", &self.truncate)
            .field("shape", &self.shape)
            .field("encoder", &self.encoder.is_some())
            .field("decoder", &self.decoder.is_some())
            .finish()
    }
}

/// The field of a struct that absorbs unmatched document elements.
#[derive(Debug, Clone, Copy)]
pub struct InlineMap {
    /// Index of the map field in the described struct.
    pub index: usize,
    pub value_shape: Shape,
}

/// Resolved field layout of one struct type.
#[derive(Debug)]
pub struct StructDescriptor {
    type_name: &'static str,
    fields: Vec<FieldDescriptor>,
    by_name: HashMap<String, usize>,
    inline_map: Option<InlineMap>,
    has_inline: bool,
}

impl StructDescriptor {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Fields in declaration order, inlined fields at their ancestor's position.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Looks up a field by exact document name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.by_name.get(name).map(|&i| &self.fields[i])
    }

    /// Looks up a field by document name, falling back to the lowercased name.
    pub fn lookup(&self, name: &str) -> Option<&FieldDescriptor> {
        self.field(name)
            .or_else(|| self.field(&name.to_lowercase()))
    }

    pub fn inline_map(&self) -> Option<&InlineMap> {
        self.inline_map.as_ref()
    }

    /// True if any field was flattened from an inline struct.
    pub fn has_inline(&self) -> bool {
        self.has_inline
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

type CacheKey = (TypeId, TagConvention, bool);

/// Memoized descriptors, shared by concurrent callers.
///
/// Builds run without holding any shard lock. Racing builders may each
/// produce a descriptor; the first one published is kept and returned to all.
#[derive(Default)]
pub struct DescriptorCache {
    entries: DashMap<CacheKey, Arc<StructDescriptor>>,
}

impl DescriptorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        if !self.entries.is_empty() {
            debug!(entries = self.entries.len(), "clearing struct descriptor cache");
        }
        self.entries.clear();
    }

    /// Returns the descriptor for `shape`, building and publishing it on first use.
    ///
    /// `strict` turns every duplicated document name into an error, even when
    /// one field dominates.
    pub fn describe(
        &self,
        registry: &Registry,
        options: &StructCodecOptions,
        shape: &Shape,
        convention: TagConvention,
        strict: bool,
    ) -> Result<Arc<StructDescriptor>, DescriptorError> {
        let mut building = Vec::new();
        self.describe_nested(registry, options, shape, convention, strict, &mut building)
    }

    fn describe_nested(
        &self,
        registry: &Registry,
        options: &StructCodecOptions,
        shape: &Shape,
        convention: TagConvention,
        strict: bool,
        building: &mut Vec<TypeId>,
    ) -> Result<Arc<StructDescriptor>, DescriptorError> {
        let key = (shape.id(), convention, strict);
        if let Some(hit) = self.entries.get(&key) {
            return Ok(Arc::clone(hit.value()));
        }

        building.push(shape.id());
        let built = self.build(registry, options, shape, convention, strict, building);
        building.pop();
        let built = Arc::new(built?);

        let published = Arc::clone(
            self.entries
                .entry(key)
                .or_insert_with(|| Arc::clone(&built))
                .value(),
        );
        if Arc::ptr_eq(&published, &built) {
            debug!(
                type_name = shape.name(),
                fields = built.len(),
                inline = built.has_inline,
                "built struct descriptor"
            );
        } else {
            debug!(type_name = shape.name(), "struct descriptor already published, discarding");
        }
        Ok(published)
    }

    fn build(
        &self,
        registry: &Registry,
        options: &StructCodecOptions,
        shape: &Shape,
        convention: TagConvention,
        strict: bool,
        building: &mut Vec<TypeId>,
    ) -> Result<StructDescriptor, DescriptorError> {
        let type_name = shape.name();
        let ShapeKind::Struct { fields: declared } = shape.kind() else {
            return Err(DescriptorError::NotAStruct { type_name });
        };

        let mut pending = Vec::new();
        let mut inline_map = None;
        let mut has_inline = false;

        for field in declared() {
            if !field.public && !(field.embedded && options.allow_unexported_fields) {
                continue;
            }
            let tags = parse_field_tags(&field, convention)?;
            if tags.skip {
                continue;
            }
            let field_shape = field.shape();

            if !tags.inline {
                pending.push(FieldDescriptor {
                    name: tags.name,
                    field_name: field.name,
                    path: vec![field.index],
                    omit_empty: tags.omit_empty,
                    min_size: tags.min_size,
                    truncate: tags.truncate,
                    shape: field_shape,
                    encoder: registry.lookup_encoder(&field_shape),
                    decoder: registry.lookup_decoder(&field_shape),
                });
                continue;
            }

            let target = match field_shape.kind() {
                ShapeKind::Map { key, value } => {
                    if inline_map.is_some() {
                        return Err(DescriptorError::MultipleInlineMaps { type_name });
                    }
                    if !key().is::<String>() {
                        return Err(DescriptorError::InvalidInlineMap {
                            type_name,
                            field: field.name.to_string(),
                        });
                    }
                    inline_map = Some(InlineMap {
                        index: field.index,
                        value_shape: value(),
                    });
                    continue;
                }
                ShapeKind::Pointer { pointee } => {
                    let inner = pointee();
                    if !inner.is_struct() {
                        return Err(DescriptorError::InvalidInlineTarget {
                            type_name,
                            field: field.name.to_string(),
                            found: inner.name(),
                        });
                    }
                    inner
                }
                ShapeKind::Struct { .. } => field_shape,
                _ => {
                    return Err(DescriptorError::InvalidInlineTarget {
                        type_name,
                        field: field.name.to_string(),
                        found: field_shape.name(),
                    });
                }
            };

            if building.contains(&target.id()) {
                return Err(DescriptorError::RecursiveInline {
                    type_name,
                    field: field.name.to_string(),
                });
            }
            let nested =
                self.describe_nested(registry, options, &target, convention, strict, building)?;
            has_inline = true;
            for inner in &nested.fields {
                let mut flattened = inner.clone();
                flattened.path.insert(0, field.index);
                pending.push(flattened);
            }
        }

        let fields = resolve_dominance(type_name, pending, options, strict)?;
        let by_name = fields
            .iter()
            .enumerate()
            .map(|(i, fd)| (fd.name.clone(), i))
            .collect();

        Ok(StructDescriptor {
            type_name,
            fields,
            by_name,
            inline_map,
            has_inline,
        })
    }
}

/// Keeps one field per document name.
///
/// Among fields sharing a name the one with the shortest path wins; a tie at
/// the shortest depth is an error, as is any duplicate when overwriting is
/// disabled or `strict` is set. The result is sorted by path.
fn resolve_dominance(
    type_name: &'static str,
    mut pending: Vec<FieldDescriptor>,
    options: &StructCodecOptions,
    strict: bool,
) -> Result<Vec<FieldDescriptor>, DescriptorError> {
    pending.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then(a.path.len().cmp(&b.path.len()))
            .then_with(|| a.path.cmp(&b.path))
    });

    let mut kept = Vec::with_capacity(pending.len());
    let mut rest = pending.into_iter().peekable();
    while let Some(first) = rest.next() {
        let mut group_len = 1;
        let mut runner_up_depth = None;
        while let Some(next) = rest.next_if(|fd| fd.name == first.name) {
            if group_len == 1 {
                runner_up_depth = Some(next.path.len());
            }
            group_len += 1;
        }
        if group_len > 1 {
            let ambiguous = runner_up_depth == Some(first.path.len());
            if ambiguous || !options.overwrite_duplicated_inlined_fields || strict {
                return Err(DescriptorError::DuplicateKey {
                    type_name,
                    name: first.name,
                });
            }
        }
        kept.push(first);
    }

    kept.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(kept)
}

//! Field paths through inlined structs.

use std::any::TypeId;

use crate::error::PathError;
use crate::reflect::{Reflect, ReflectMut, ReflectRef, Struct};
use crate::shape::ShapeKind;

fn descend(field: &dyn Reflect, depth: usize) -> Result<&dyn Struct, PathError> {
    match field.reflect_ref() {
        ReflectRef::Struct(s) => Ok(s),
        ReflectRef::Pointer(p) => match p.pointee() {
            None => Err(PathError::NilPointer { depth }),
            Some(inner) => match inner.reflect_ref() {
                ReflectRef::Struct(s) => Ok(s),
                _ => Err(PathError::NotAStruct { depth }),
            },
        },
        _ => Err(PathError::NotAStruct { depth }),
    }
}

fn descend_mut(field: &mut dyn Reflect, depth: usize) -> Result<&mut dyn Struct, PathError> {
    match field.reflect_mut() {
        ReflectMut::Struct(s) => Ok(s),
        ReflectMut::Pointer(p) => match p.allocate().reflect_mut() {
            ReflectMut::Struct(s) => Ok(s),
            _ => Err(PathError::NotAStruct { depth }),
        },
        _ => Err(PathError::NotAStruct { depth }),
    }
}

/// Follows `path` from `value` to a field without modifying anything.
///
/// Fails with [`PathError::NilPointer`] when an intermediate `Option` is `None`.
pub fn field_by_path<'a>(
    value: &'a dyn Struct,
    path: &[usize],
) -> Result<&'a dyn Reflect, PathError> {
    let (&last, parents) = path.split_last().ok_or(PathError::Empty)?;
    let mut current = value;
    for (depth, &index) in parents.iter().enumerate() {
        let field = current
            .field(index)
            .ok_or(PathError::InvalidIndex { index, depth })?;
        current = descend(field, depth)?;
    }
    current.field(last).ok_or(PathError::InvalidIndex {
        index: last,
        depth: parents.len(),
    })
}

/// Follows `path` from `value` to a field, allocating `None` ancestors.
pub fn ensure_path<'a>(
    value: &'a mut dyn Struct,
    path: &[usize],
) -> Result<&'a mut dyn Reflect, PathError> {
    let (&last, parents) = path.split_last().ok_or(PathError::Empty)?;
    let mut current = value;
    for (depth, &index) in parents.iter().enumerate() {
        let field = current
            .field_mut(index)
            .ok_or(PathError::InvalidIndex { index, depth })?;
        current = descend_mut(field, depth)?;
    }
    current.field_mut(last).ok_or(PathError::InvalidIndex {
        index: last,
        depth: parents.len(),
    })
}

/// Resets `value` to zero, then allocates every public `Option` of a struct
/// below it and zeroes that recursively.
///
/// A pointer back to a type already being zeroed is left `None`.
pub fn deep_zero(value: &mut dyn Reflect) {
    let mut visiting = Vec::new();
    deep_zero_inner(value, &mut visiting);
}

fn deep_zero_inner(value: &mut dyn Reflect, visiting: &mut Vec<TypeId>) {
    value.reset();
    let shape = value.shape();
    if !shape.is_struct() || visiting.contains(&shape.id()) {
        return;
    }
    visiting.push(shape.id());

    if let ReflectMut::Struct(fields) = value.reflect_mut() {
        for declared in shape.fields().into_iter().filter(|f| f.public) {
            let field_shape = declared.shape();
            let Some(field) = fields.field_mut(declared.index) else {
                continue;
            };
            match field_shape.kind() {
                ShapeKind::Pointer { pointee } => {
                    let target = pointee();
                    if !target.is_struct() || visiting.contains(&target.id()) {
                        continue;
                    }
                    if let ReflectMut::Pointer(p) = field.reflect_mut() {
                        deep_zero_inner(p.allocate(), visiting);
                    }
                }
                ShapeKind::Struct { .. } => deep_zero_inner(field, visiting),
                _ => {}
            }
        }
    }

    visiting.pop();
}

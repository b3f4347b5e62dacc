use std::any::{Any, TypeId};
use std::fmt;

/// Static description of a reflected type.
///
/// A shape carries the type's identity and its kind. Nested shapes (field
/// types, pointees, sequence items, map keys and values) are reached through
/// function pointers so that recursive types can be described without
/// building an infinite structure.
#[derive(Clone, Copy)]
pub struct Shape {
    id: TypeId,
    name: &'static str,
    kind: ShapeKind,
}

/// The structural kind of a shape.
#[derive(Debug, Clone, Copy)]
pub enum ShapeKind {
    /// A leaf value written as a single document value.
    Scalar,
    /// A homogeneous list (`Vec<T>`).
    Sequence { item: fn() -> Shape },
    /// A keyed collection (`HashMap`, `BTreeMap`, `IndexMap`).
    Map {
        key: fn() -> Shape,
        value: fn() -> Shape,
    },
    /// A nullable indirection (`Option<T>`).
    Pointer { pointee: fn() -> Shape },
    /// A polymorphic slot holding any reflected value (`Variant`).
    Variant,
    /// A struct with named fields.
    Struct { fields: fn() -> Vec<FieldShape> },
}

/// Coarse kind used for kind-level codec lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Scalar,
    Sequence,
    Map,
    Pointer,
    Variant,
    Struct,
}

impl ShapeKind {
    pub fn kind(&self) -> Kind {
        match self {
            ShapeKind::Scalar => Kind::Scalar,
            ShapeKind::Sequence { .. } => Kind::Sequence,
            ShapeKind::Map { .. } => Kind::Map,
            ShapeKind::Pointer { .. } => Kind::Pointer,
            ShapeKind::Variant => Kind::Variant,
            ShapeKind::Struct { .. } => Kind::Struct,
        }
    }
}

impl Shape {
    /// Creates the shape of `T` with the given kind.
    pub fn of<T: Any>(kind: ShapeKind) -> Self {
        Shape {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            kind,
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> &ShapeKind {
        &self.kind
    }

    /// Returns true if this shape describes `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.kind, ShapeKind::Struct { .. })
    }

    /// Returns the declared fields of a struct shape, or nothing for other kinds.
    pub fn fields(&self) -> Vec<FieldShape> {
        match self.kind {
            ShapeKind::Struct { fields } => fields(),
            _ => Vec::new(),
        }
    }
}

impl PartialEq for Shape {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Shape {}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape({}: {:?})", self.name, self.kind.kind())
    }
}

/// Static description of one declared struct field.
///
/// Generated by `#[derive(Record)]`. `tags` holds the raw annotations keyed by
/// convention (`"docmap"`, `"json"`); interpreting them is the job of
/// [`crate::tags`].
#[derive(Debug, Clone, Copy)]
pub struct FieldShape {
    /// Declared identifier.
    pub name: &'static str,
    /// Declaration position within the struct.
    pub index: usize,
    /// Whether the field is `pub`.
    pub public: bool,
    /// Whether the field is marked `#[docmap(embedded)]`.
    pub embedded: bool,
    pub tags: &'static [(&'static str, &'static str)],
    pub shape: fn() -> Shape,
}

impl FieldShape {
    /// Looks up the raw annotation for a convention key.
    pub fn tag(&self, key: &str) -> Option<&'static str> {
        self.tags
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, value)| *value)
    }

    /// Resolves the declared type's shape.
    pub fn shape(&self) -> Shape {
        (self.shape)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Typed;

    #[test]
    fn shape_identity() {
        let a = <String as Typed>::type_shape();
        let b = <String as Typed>::type_shape();
        assert_eq!(a, b);
        assert!(a.is::<String>());
        assert_eq!(a.kind().kind(), Kind::Scalar);
    }

    #[test]
    fn option_is_pointer_to_inner() {
        let shape = <Option<i32> as Typed>::type_shape();
        match shape.kind() {
            ShapeKind::Pointer { pointee } => assert!(pointee().is::<i32>()),
            other => panic!("expected pointer, got {:?}", other),
        }
    }

    #[test]
    fn box_is_transparent() {
        let shape = <Box<i64> as Typed>::type_shape();
        assert!(shape.is::<i64>());
    }

    #[test]
    fn tag_lookup() {
        let field = FieldShape {
            name: "count",
            index: 0,
            public: true,
            embedded: false,
            tags: &[("docmap", "n,omitempty"), ("json", "count")],
            shape: <i32 as Typed>::type_shape,
        };
        assert_eq!(field.tag("docmap"), Some("n,omitempty"));
        assert_eq!(field.tag("json"), Some("count"));
        assert_eq!(field.tag("xml"), None);
    }
}

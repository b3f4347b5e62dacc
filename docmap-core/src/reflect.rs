use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::hash::Hash;

use indexmap::IndexMap;

use crate::error::DecodeError;
use crate::shape::{FieldShape, Shape, ShapeKind};

/// Dynamic access to a value whose shape is known at runtime.
///
/// Implemented for primitives, `String`, the document model types, the
/// standard containers, and every struct deriving [`Record`](crate::Record).
/// The traversals in this crate only ever see values as `&dyn Reflect` /
/// `&mut dyn Reflect`.
pub trait Reflect: Any + Debug + Send + Sync {
    /// Returns the runtime shape of this value.
    fn shape(&self) -> Shape;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    /// Borrows this value as its kind-specific view.
    fn reflect_ref(&self) -> ReflectRef<'_>;

    /// Mutably borrows this value as its kind-specific view.
    fn reflect_mut(&mut self) -> ReflectMut<'_>;

    /// Resets this value to the zero value of its type.
    fn reset(&mut self);

    /// Returns true if this value equals the zero value of its type.
    fn is_zero_value(&self) -> bool;
}

impl dyn Reflect {
    pub fn is<T: Reflect>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Reflect>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Reflect>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

/// Types with a shape known without a value.
pub trait Typed: Reflect + Sized {
    fn type_shape() -> Shape;
}

/// Types that report their own zero state, overriding kind-based emptiness.
pub trait Zeroer {
    fn is_zero(&self) -> bool;
}

/// Shared kind-specific view of a reflected value.
pub enum ReflectRef<'a> {
    Scalar(&'a dyn Reflect),
    Struct(&'a dyn Struct),
    Sequence(&'a dyn Sequence),
    Map(&'a dyn Map),
    Pointer(&'a dyn Pointer),
    Variant(&'a Variant),
}

/// Mutable kind-specific view of a reflected value.
pub enum ReflectMut<'a> {
    Scalar(&'a mut dyn Reflect),
    Struct(&'a mut dyn Struct),
    Sequence(&'a mut dyn Sequence),
    Map(&'a mut dyn Map),
    Pointer(&'a mut dyn Pointer),
    Variant(&'a mut Variant),
}

/// Positional access to the declared fields of a struct.
pub trait Struct: Send + Sync {
    fn field(&self, index: usize) -> Option<&dyn Reflect>;

    fn field_mut(&mut self, index: usize) -> Option<&mut dyn Reflect>;

    fn field_len(&self) -> usize;

    /// Static description of the declared fields, in declaration order.
    fn field_shapes() -> Vec<FieldShape>
    where
        Self: Sized;
}

/// A nullable indirection (`Option<T>`).
pub trait Pointer: Send + Sync {
    fn pointee(&self) -> Option<&dyn Reflect>;

    fn pointee_mut(&mut self) -> Option<&mut dyn Reflect>;

    /// Returns the pointee, allocating a zero value first if there is none.
    fn allocate(&mut self) -> &mut dyn Reflect;

    fn clear(&mut self);

    fn is_none(&self) -> bool {
        self.pointee().is_none()
    }
}

/// A growable homogeneous list.
pub trait Sequence: Send + Sync {
    fn len(&self) -> usize;

    fn item(&self, index: usize) -> Option<&dyn Reflect>;

    /// Appends a zero value and returns it for population.
    fn push_default(&mut self) -> &mut dyn Reflect;

    fn clear(&mut self);

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A keyed collection whose keys render as document field names.
pub trait Map: Send + Sync {
    fn len(&self) -> usize;

    /// Entries with their keys rendered as strings.
    fn entries(&self) -> Vec<(String, &dyn Reflect)>;

    /// Whether rendering the key type as a string needs the map-key
    /// stringification mode.
    fn keys_need_stringify(&self) -> bool;

    /// Creates a zero value of the element type.
    fn new_value(&self) -> Box<dyn Reflect>;

    /// Inserts a value created by [`Map::new_value`] under a string key.
    fn insert_boxed(&mut self, key: &str, value: Box<dyn Reflect>) -> Result<(), DecodeError>;

    fn clear(&mut self);

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keys usable in reflected maps.
pub trait MapKey: Typed + Clone {
    fn to_key(&self) -> String;

    fn from_key(key: &str) -> Option<Self>;

    fn needs_stringify() -> bool {
        false
    }
}

impl MapKey for String {
    fn to_key(&self) -> String {
        self.clone()
    }

    fn from_key(key: &str) -> Option<Self> {
        Some(key.to_string())
    }
}

macro_rules! impl_map_key_parse {
    ($($t:ty => $stringify:expr),* $(,)?) => {
        $(
            impl MapKey for $t {
                fn to_key(&self) -> String {
                    self.to_string()
                }

                fn from_key(key: &str) -> Option<Self> {
                    key.parse().ok()
                }

                fn needs_stringify() -> bool {
                    $stringify
                }
            }
        )*
    };
}

impl_map_key_parse!(
    i32 => false,
    i64 => false,
    u32 => false,
    u64 => false,
    bool => true,
    char => true,
);

/// A polymorphic slot: holds any reflected value, or nothing.
#[derive(Debug, Default)]
pub struct Variant(Option<Box<dyn Reflect>>);

impl Variant {
    pub fn new(value: impl Reflect) -> Self {
        Variant(Some(Box::new(value)))
    }

    pub fn empty() -> Self {
        Variant(None)
    }

    pub fn get(&self) -> Option<&dyn Reflect> {
        self.0.as_deref()
    }

    pub fn get_mut(&mut self) -> Option<&mut dyn Reflect> {
        self.0.as_deref_mut()
    }

    pub fn set(&mut self, value: impl Reflect) {
        self.0 = Some(Box::new(value));
    }

    pub fn set_boxed(&mut self, value: Box<dyn Reflect>) {
        self.0 = Some(value);
    }

    pub fn take(&mut self) -> Option<Box<dyn Reflect>> {
        self.0.take()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Returns the held value if it is a `T`.
    pub fn downcast_ref<T: Reflect>(&self) -> Option<&T> {
        self.get().and_then(|value| value.downcast_ref::<T>())
    }
}

impl Reflect for Variant {
    fn shape(&self) -> Shape {
        Self::type_shape()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Variant(self)
    }

    fn reflect_mut(&mut self) -> ReflectMut<'_> {
        ReflectMut::Variant(self)
    }

    fn reset(&mut self) {
        self.0 = None;
    }

    fn is_zero_value(&self) -> bool {
        self.is_empty()
    }
}

impl Typed for Variant {
    fn type_shape() -> Shape {
        Shape::of::<Self>(ShapeKind::Variant)
    }
}

/// Implements `Reflect` and `Typed` for leaf types with `Default + PartialEq`.
macro_rules! impl_reflect_scalar {
    ($($t:ty),* $(,)?) => {
        $(
            impl $crate::reflect::Reflect for $t {
                fn shape(&self) -> $crate::shape::Shape {
                    <Self as $crate::reflect::Typed>::type_shape()
                }

                fn as_any(&self) -> &dyn ::std::any::Any {
                    self
                }

                fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                    self
                }

                fn into_any(self: Box<Self>) -> Box<dyn ::std::any::Any> {
                    self
                }

                fn reflect_ref(&self) -> $crate::reflect::ReflectRef<'_> {
                    $crate::reflect::ReflectRef::Scalar(self)
                }

                fn reflect_mut(&mut self) -> $crate::reflect::ReflectMut<'_> {
                    $crate::reflect::ReflectMut::Scalar(self)
                }

                fn reset(&mut self) {
                    *self = <$t as ::std::default::Default>::default();
                }

                fn is_zero_value(&self) -> bool {
                    *self == <$t as ::std::default::Default>::default()
                }
            }

            impl $crate::reflect::Typed for $t {
                fn type_shape() -> $crate::shape::Shape {
                    $crate::shape::Shape::of::<$t>($crate::shape::ShapeKind::Scalar)
                }
            }
        )*
    };
}

pub(crate) use impl_reflect_scalar;

impl_reflect_scalar!(bool, char, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, String);

impl<T: Typed + Default> Reflect for Option<T> {
    fn shape(&self) -> Shape {
        Self::type_shape()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Pointer(self)
    }

    fn reflect_mut(&mut self) -> ReflectMut<'_> {
        ReflectMut::Pointer(self)
    }

    fn reset(&mut self) {
        *self = None;
    }

    fn is_zero_value(&self) -> bool {
        self.is_none()
    }
}

impl<T: Typed + Default> Typed for Option<T> {
    fn type_shape() -> Shape {
        Shape::of::<Self>(ShapeKind::Pointer {
            pointee: T::type_shape,
        })
    }
}

impl<T: Typed + Default> Pointer for Option<T> {
    fn pointee(&self) -> Option<&dyn Reflect> {
        self.as_ref().map(|value| value as &dyn Reflect)
    }

    fn pointee_mut(&mut self) -> Option<&mut dyn Reflect> {
        self.as_mut().map(|value| value as &mut dyn Reflect)
    }

    fn allocate(&mut self) -> &mut dyn Reflect {
        self.get_or_insert_with(T::default)
    }

    fn clear(&mut self) {
        *self = None;
    }
}

// Box<T> is transparent: it reports T's shape and downcasts to T.
impl<T: Typed> Reflect for Box<T> {
    fn shape(&self) -> Shape {
        (**self).shape()
    }

    fn as_any(&self) -> &dyn Any {
        (**self).as_any()
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        (**self).as_any_mut()
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        T::into_any(*self)
    }

    fn reflect_ref(&self) -> ReflectRef<'_> {
        (**self).reflect_ref()
    }

    fn reflect_mut(&mut self) -> ReflectMut<'_> {
        (**self).reflect_mut()
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn is_zero_value(&self) -> bool {
        (**self).is_zero_value()
    }
}

impl<T: Typed> Typed for Box<T> {
    fn type_shape() -> Shape {
        T::type_shape()
    }
}

impl<T: Typed + Default> Reflect for Vec<T> {
    fn shape(&self) -> Shape {
        Self::type_shape()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Sequence(self)
    }

    fn reflect_mut(&mut self) -> ReflectMut<'_> {
        ReflectMut::Sequence(self)
    }

    fn reset(&mut self) {
        self.clear();
    }

    fn is_zero_value(&self) -> bool {
        self.is_empty()
    }
}

impl<T: Typed + Default> Typed for Vec<T> {
    fn type_shape() -> Shape {
        Shape::of::<Self>(ShapeKind::Sequence { item: T::type_shape })
    }
}

impl<T: Typed + Default> Sequence for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn item(&self, index: usize) -> Option<&dyn Reflect> {
        self.get(index).map(|value| value as &dyn Reflect)
    }

    fn push_default(&mut self) -> &mut dyn Reflect {
        let index = Vec::len(self);
        self.push(T::default());
        &mut self[index]
    }

    fn clear(&mut self) {
        Vec::clear(self);
    }
}

macro_rules! impl_reflect_map {
    ($map:ident, $($key_bound:path),+) => {
        impl<K, V> Reflect for $map<K, V>
        where
            K: MapKey $(+ $key_bound)+,
            V: Typed + Default,
        {
            fn shape(&self) -> Shape {
                Self::type_shape()
            }

            fn as_any(&self) -> &dyn Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn Any {
                self
            }

            fn into_any(self: Box<Self>) -> Box<dyn Any> {
                self
            }

            fn reflect_ref(&self) -> ReflectRef<'_> {
                ReflectRef::Map(self)
            }

            fn reflect_mut(&mut self) -> ReflectMut<'_> {
                ReflectMut::Map(self)
            }

            fn reset(&mut self) {
                $map::clear(self);
            }

            fn is_zero_value(&self) -> bool {
                $map::is_empty(self)
            }
        }

        impl<K, V> Typed for $map<K, V>
        where
            K: MapKey $(+ $key_bound)+,
            V: Typed + Default,
        {
            fn type_shape() -> Shape {
                Shape::of::<Self>(ShapeKind::Map {
                    key: K::type_shape,
                    value: V::type_shape,
                })
            }
        }

        impl<K, V> Map for $map<K, V>
        where
            K: MapKey $(+ $key_bound)+,
            V: Typed + Default,
        {
            fn len(&self) -> usize {
                $map::len(self)
            }

            fn entries(&self) -> Vec<(String, &dyn Reflect)> {
                self.iter()
                    .map(|(key, value)| (key.to_key(), value as &dyn Reflect))
                    .collect()
            }

            fn keys_need_stringify(&self) -> bool {
                K::needs_stringify()
            }

            fn new_value(&self) -> Box<dyn Reflect> {
                Box::new(V::default())
            }

            fn insert_boxed(
                &mut self,
                key: &str,
                value: Box<dyn Reflect>,
            ) -> Result<(), DecodeError> {
                let parsed = K::from_key(key).ok_or_else(|| DecodeError::InvalidMapKey {
                    key: key.to_string(),
                    target: std::any::type_name::<K>(),
                })?;
                let value = value
                    .into_any()
                    .downcast::<V>()
                    .map_err(|_| DecodeError::TypeMismatch {
                        expected: std::any::type_name::<V>(),
                    })?;
                self.insert(parsed, *value);
                Ok(())
            }

            fn clear(&mut self) {
                $map::clear(self);
            }
        }
    };
}

impl_reflect_map!(HashMap, Eq, Hash);
impl_reflect_map!(BTreeMap, Ord);
impl_reflect_map!(IndexMap, Eq, Hash);

//! Sable IR types and the per-module type interner.

pub use id_arena::{Arena, Id};
use rustc_hash::FxHashMap;

/// An identifier for an interned [`Type`].
///
/// Because types are hash-consed per module, two `TyId`s from the same module
/// are equal if and only if the types they name are structurally equal.
pub type TyId = Id<Type>;

/// The width of an integer type, in bits.
///
/// Only 8, 16, 32, and 64 bit integers exist; any other width is a
/// programming error, not a recoverable condition.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IntWidth {
    /// 8 bits.
    W8,
    /// 16 bits.
    W16,
    /// 32 bits.
    W32,
    /// 64 bits.
    W64,
}

impl IntWidth {
    /// The number of bits this width names.
    #[inline]
    pub fn bits(self) -> u32 {
        match self {
            IntWidth::W8 => 8,
            IntWidth::W16 => 16,
            IntWidth::W32 => 32,
            IntWidth::W64 => 64,
        }
    }

    /// Maps a bit count back to a width.
    ///
    /// # Panics
    ///
    /// Panics if `bits` is not one of 8, 16, 32, or 64.
    pub fn from_bits(bits: u32) -> Self {
        match bits {
            8 => IntWidth::W8,
            16 => IntWidth::W16,
            32 => IntWidth::W32,
            64 => IntWidth::W64,
            _ => panic!("integer width must be one of 8, 16, 32, or 64, got {bits}"),
        }
    }
}

/// The width of a floating-point type, in bits.
///
/// Only IEEE-754 `binary32` and `binary64` are supported.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FloatWidth {
    /// 32 bits, `binary32`.
    W32,
    /// 64 bits, `binary64`.
    W64,
}

impl FloatWidth {
    /// The number of bits this width names.
    #[inline]
    pub fn bits(self) -> u32 {
        match self {
            FloatWidth::W32 => 32,
            FloatWidth::W64 => 64,
        }
    }

    /// Maps a bit count back to a width.
    ///
    /// # Panics
    ///
    /// Panics if `bits` is not 32 or 64.
    pub fn from_bits(bits: u32) -> Self {
        match bits {
            32 => FloatWidth::W32,
            64 => FloatWidth::W64,
            _ => panic!("float width must be 32 or 64, got {bits}"),
        }
    }
}

/// An arbitrary-width (well, up to 64 bits) integer value.
///
/// The stored value is always masked to `[0, 2^width)`; bits above the width
/// are discarded on construction. Equality and hashing cover both the value
/// and the width, so `ApInt::new(1, IntWidth::W8) != ApInt::new(1, IntWidth::W32)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ApInt {
    value: u64,
    width: IntWidth,
}

impl ApInt {
    /// Creates an integer of the given width, masking off any bits of
    /// `value` above that width.
    pub fn new(value: u64, width: IntWidth) -> Self {
        let mask = u64::MAX >> (64 - width.bits());
        ApInt {
            value: value & mask,
            width,
        }
    }

    /// The (masked) raw value.
    #[inline]
    pub fn value(self) -> u64 {
        self.value
    }

    /// The width of this integer.
    #[inline]
    pub fn width(self) -> IntWidth {
        self.width
    }

    /// Whether this is the zero value of its width.
    #[inline]
    pub fn is_zero(self) -> bool {
        self.value == 0
    }
}

/// A Sable IR type.
///
/// Types are plain structural data; identity comes from the per-module
/// interner, which guarantees that structurally equal types share one
/// [`TyId`]. `Array` and `Struct` reference other types through interned ids,
/// so derived equality and hashing are deep.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    /// An integer type: `i8`, `i16`, `i32`, or `i64`.
    Int(IntWidth),
    /// A floating-point type: `f32` or `f64`.
    Float(FloatWidth),
    /// The boolean type.
    Bool,
    /// An untyped pointer.
    Ptr,
    /// The unit type of terminators, stores, and void-returning calls.
    Void,
    /// A fixed-length array of one element type.
    Array {
        /// The element type.
        element: TyId,
        /// The number of elements.
        len: u64,
    },
    /// An aggregate of ordered, unnamed fields.
    Struct {
        /// The field types, in declaration order.
        fields: Vec<TyId>,
    },
}

impl Type {
    /// Whether this is an integer type.
    #[inline]
    pub fn is_int(&self) -> bool {
        matches!(self, Type::Int(_))
    }

    /// Whether this is a floating-point type.
    #[inline]
    pub fn is_float(&self) -> bool {
        matches!(self, Type::Float(_))
    }

    /// Whether this is `bool`.
    #[inline]
    pub fn is_bool(&self) -> bool {
        matches!(self, Type::Bool)
    }

    /// Whether this is `ptr`.
    #[inline]
    pub fn is_ptr(&self) -> bool {
        matches!(self, Type::Ptr)
    }

    /// Whether this is `void`.
    #[inline]
    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    /// Whether this is an array type.
    #[inline]
    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array { .. })
    }

    /// Whether this is a struct type.
    #[inline]
    pub fn is_struct(&self) -> bool {
        matches!(self, Type::Struct { .. })
    }

    /// Whether this is an integer or `bool` type, the operand class of the
    /// bitwise instructions.
    #[inline]
    pub fn is_int_or_bool(&self) -> bool {
        self.is_int() || self.is_bool()
    }

    /// The width of this type, if it is an integer.
    #[inline]
    pub fn int_width(&self) -> Option<IntWidth> {
        match self {
            Type::Int(w) => Some(*w),
            _ => None,
        }
    }

    /// The width of this type, if it is a float.
    #[inline]
    pub fn float_width(&self) -> Option<FloatWidth> {
        match self {
            Type::Float(w) => Some(*w),
            _ => None,
        }
    }
}

/// The set of predefined singleton types every module starts with.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Predefined {
    pub(crate) i8: TyId,
    pub(crate) i16: TyId,
    pub(crate) i32: TyId,
    pub(crate) i64: TyId,
    pub(crate) boolean: TyId,
    pub(crate) ptr: TyId,
    pub(crate) f32: TyId,
    pub(crate) f64: TyId,
    pub(crate) void: TyId,
    pub(crate) empty_struct: TyId,
}

/// Hash-consing storage for types.
///
/// Structural uniqueness is the whole point: interning the same shape twice
/// hands back the same id, so type identity can be compared with `==` on ids.
#[derive(Debug)]
pub(crate) struct TypeInterner {
    types: Arena<Type>,
    dedup: FxHashMap<Type, TyId>,
    predefined: Predefined,
}

impl TypeInterner {
    pub(crate) fn new() -> Self {
        let mut types = Arena::new();
        let mut dedup = FxHashMap::default();

        let mut intern = |ty: Type| -> TyId {
            let id = types.alloc(ty.clone());
            dedup.insert(ty, id);
            id
        };

        let predefined = Predefined {
            i8: intern(Type::Int(IntWidth::W8)),
            i16: intern(Type::Int(IntWidth::W16)),
            i32: intern(Type::Int(IntWidth::W32)),
            i64: intern(Type::Int(IntWidth::W64)),
            boolean: intern(Type::Bool),
            ptr: intern(Type::Ptr),
            f32: intern(Type::Float(FloatWidth::W32)),
            f64: intern(Type::Float(FloatWidth::W64)),
            void: intern(Type::Void),
            empty_struct: intern(Type::Struct { fields: vec![] }),
        };

        TypeInterner {
            types,
            dedup,
            predefined,
        }
    }

    pub(crate) fn predefined(&self) -> &Predefined {
        &self.predefined
    }

    pub(crate) fn get(&self, id: TyId) -> &Type {
        &self.types[id]
    }

    pub(crate) fn intern(&mut self, ty: Type) -> TyId {
        if let Some(&id) = self.dedup.get(&ty) {
            return id;
        }

        let id = self.types.alloc(ty.clone());
        self.dedup.insert(ty, id);
        id
    }

    pub(crate) fn int_of_width(&self, width: IntWidth) -> TyId {
        match width {
            IntWidth::W8 => self.predefined.i8,
            IntWidth::W16 => self.predefined.i16,
            IntWidth::W32 => self.predefined.i32,
            IntWidth::W64 => self.predefined.i64,
        }
    }

    pub(crate) fn float_of_width(&self, width: FloatWidth) -> TyId {
        match width {
            FloatWidth::W32 => self.predefined.f32,
            FloatWidth::W64 => self.predefined.f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apint_masks_on_construction() {
        let x = ApInt::new(0x1_00, IntWidth::W8);
        assert_eq!(x.value(), 0);
        assert!(x.is_zero());

        let y = ApInt::new(0xFFFF_FFFF_FFFF_FFFF, IntWidth::W16);
        assert_eq!(y.value(), 0xFFFF);

        let z = ApInt::new(u64::MAX, IntWidth::W64);
        assert_eq!(z.value(), u64::MAX);
    }

    #[test]
    fn apint_equality_includes_width() {
        assert_ne!(ApInt::new(1, IntWidth::W8), ApInt::new(1, IntWidth::W32));
        assert_eq!(ApInt::new(257, IntWidth::W8), ApInt::new(1, IntWidth::W8));
    }

    #[test]
    #[should_panic(expected = "integer width must be one of")]
    fn bad_int_width_panics() {
        let _ = IntWidth::from_bits(24);
    }

    #[test]
    #[should_panic(expected = "float width must be")]
    fn bad_float_width_panics() {
        let _ = FloatWidth::from_bits(16);
    }

    #[test]
    fn interner_deduplicates_structurally() {
        let mut tys = TypeInterner::new();

        let i32_ty = tys.predefined().i32;
        assert_eq!(tys.intern(Type::Int(IntWidth::W32)), i32_ty);

        let a1 = tys.intern(Type::Array {
            element: i32_ty,
            len: 4,
        });
        let a2 = tys.intern(Type::Array {
            element: i32_ty,
            len: 4,
        });
        let a3 = tys.intern(Type::Array {
            element: i32_ty,
            len: 5,
        });

        assert_eq!(a1, a2);
        assert_ne!(a1, a3);

        let s1 = tys.intern(Type::Struct {
            fields: vec![i32_ty, a1],
        });
        let s2 = tys.intern(Type::Struct {
            fields: vec![i32_ty, a2],
        });
        assert_eq!(s1, s2);

        let empty = tys.intern(Type::Struct { fields: vec![] });
        assert_eq!(empty, tys.predefined().empty_struct);
    }
}

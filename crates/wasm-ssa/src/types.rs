//! Core scalar identifiers: [`Type`], [`Variable`], [`Value`], [`Signature`].
//!
//! These are the leaves of the data model (§3): small, `Copy` identifiers
//! with no behavior beyond classification and packing/unpacking.

use std::fmt;

/// A WebAssembly value type, reduced to what the backend needs to know about
/// layout: bit width and byte size. `Invalid` is the type of [`Value::INVALID`]
/// and of results that have no type (e.g. instructions with no return value).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Type {
    I32 = 0,
    I64 = 1,
    F32 = 2,
    F64 = 3,
    V128 = 4,
    Invalid = 5,
}

impl Type {
    /// Bit width of a value of this type. Panics on `Invalid`, since an
    /// invalid type has no layout — callers must not ask.
    pub fn bits(self) -> u32 {
        match self {
            Type::I32 | Type::F32 => 32,
            Type::I64 | Type::F64 => 64,
            Type::V128 => 128,
            Type::Invalid => panic!("Type::Invalid has no bit width"),
        }
    }

    /// Byte size of a value of this type. See [`Type::bits`].
    pub fn bytes(self) -> u32 {
        self.bits() / 8
    }

    /// Whether this is one of the two integer types.
    pub fn is_int(self) -> bool {
        matches!(self, Type::I32 | Type::I64)
    }

    /// Whether this is one of the two float types.
    pub fn is_float(self) -> bool {
        matches!(self, Type::F32 | Type::F64)
    }

    fn from_tag(tag: u8) -> Type {
        match tag {
            0 => Type::I32,
            1 => Type::I64,
            2 => Type::F32,
            3 => Type::F64,
            4 => Type::V128,
            5 => Type::Invalid,
            _ => unreachable!("Value packs only the six known Type tags"),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Type::I32 => "i32",
            Type::I64 => "i64",
            Type::F32 => "f32",
            Type::F64 => "f64",
            Type::V128 => "v128",
            Type::Invalid => "invalid",
        };
        write!(f, "{s}")
    }
}

/// Dense identifier for a source-program variable (e.g. a Wasm local).
/// A `Variable` has a declared [`Type`] recorded once, at
/// [`Builder::declare_variable`](crate::builder::core::Builder::declare_variable)
/// time; it is mapped to many [`Value`]s over the lifetime of a function as
/// on-the-fly SSA construction renames it block by block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable(pub u32);

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "var{}", self.0)
    }
}

/// Dense per-function identifier for an SSA value, unique across the whole
/// function (not just within a block). Used as the index into side tables
/// such as the value→defining-instruction map and the value reference counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 64-bit packed SSA value: a dense [`ValueId`] in the low 32 bits, and a
/// [`Type`] tag in the high bits (§3). A `Value` has no location of its own —
/// its defining instruction is found through a `ValueId → InstrHandle` side
/// table maintained by passes that need it, not carried on the `Value` itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Value(u64);

impl Value {
    /// The sentinel "no value" — e.g. the unused slots `v2`/`v3` on an
    /// instruction that only has one real operand.
    pub const INVALID: Value = Value(((Type::Invalid as u64) << 32) | (u32::MAX as u64));

    pub fn new(id: ValueId, ty: Type) -> Value {
        Value(((ty as u64) << 32) | id.0 as u64)
    }

    pub fn id(self) -> ValueId {
        ValueId(self.0 as u32)
    }

    pub fn ty(self) -> Type {
        Type::from_tag((self.0 >> 32) as u8)
    }

    pub fn is_valid(self) -> bool {
        self != Value::INVALID
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            write!(f, "<invalid>")
        } else {
            write!(f, "v{}", self.id().0)
        }
    }
}

/// Dense identifier for a [`Signature`], used by `call`/`call_indirect`
/// instructions to look the callee's type back up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignatureId(pub u32);

/// A function-type descriptor: parameter types, result types, and whether
/// anything has referenced it yet (tracked so the backend can skip emitting
/// signatures nothing calls through).
#[derive(Debug, Clone)]
pub struct Signature {
    pub id: SignatureId,
    pub params: Vec<Type>,
    pub results: Vec<Type>,
    pub used: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_bits_and_bytes() {
        assert_eq!(Type::I32.bits(), 32);
        assert_eq!(Type::I32.bytes(), 4);
        assert_eq!(Type::I64.bytes(), 8);
        assert_eq!(Type::F32.bytes(), 4);
        assert_eq!(Type::F64.bytes(), 8);
        assert_eq!(Type::V128.bytes(), 16);
    }

    #[test]
    #[should_panic(expected = "no bit width")]
    fn invalid_type_has_no_bits() {
        Type::Invalid.bits();
    }

    #[test]
    fn value_round_trips_id_and_type() {
        let v = Value::new(ValueId(42), Type::F64);
        assert_eq!(v.id(), ValueId(42));
        assert_eq!(v.ty(), Type::F64);
        assert!(v.is_valid());
    }

    #[test]
    fn invalid_value_is_distinguishable() {
        let v = Value::new(ValueId(7), Type::I32);
        assert_ne!(v, Value::INVALID);
        assert!(!Value::INVALID.is_valid());
    }

    #[test]
    fn value_display() {
        assert_eq!(Value::new(ValueId(3), Type::I32).to_string(), "v3");
        assert_eq!(Value::INVALID.to_string(), "<invalid>");
    }
}

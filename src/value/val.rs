//! The tagged value union and its basic accessors.

use serde::{Deserialize, Serialize};

/// An opaque memory block identifier.
///
/// Blocks are allocated by the memory collaborator; the interpreter never
/// looks inside one, it only carries the identifier around in pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Block(pub u32);

impl std::fmt::Display for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// A machine value.
///
/// `Undef` absorbs: once a register holds `Undef`, anything computed from
/// it is `Undef` as well. Pointer offsets are unsigned 32-bit and wrap,
/// matching the modeled architecture's pointer arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Undef,
    Int(i32),
    Float(f64),
    Single(f32),
    Ptr(Block, u32),
}

impl Value {
    /// The additive-identity value used when an addressing-mode component
    /// is absent and as the null-pointer sentinel.
    pub const ZERO: Value = Value::Int(0);

    pub fn is_undef(&self) -> bool {
        matches!(self, Value::Undef)
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_single(&self) -> Option<f32> {
        match self {
            Value::Single(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_ptr(&self) -> Option<(Block, u32)> {
        match self {
            Value::Ptr(b, ofs) => Some((*b, *ofs)),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Undef
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Undef => write!(f, "undef"),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Single(x) => write!(f, "{:?}f", x),
            Value::Ptr(b, ofs) => write!(f, "&{}+{}", b, ofs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        assert_eq!(Value::Int(42).as_int(), Some(42));
        assert_eq!(Value::Float(1.5).as_int(), None);
        assert_eq!(Value::Ptr(Block(3), 8).as_ptr(), Some((Block(3), 8)));
        assert!(Value::Undef.is_undef());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Int(-7).to_string(), "-7");
        assert_eq!(Value::Undef.to_string(), "undef");
        assert_eq!(Value::Ptr(Block(2), 16).to_string(), "&b2+16");
    }
}

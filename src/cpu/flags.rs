//! Condition-bit evaluation and the flag-setting comparisons.
//!
//! These two halves are a matched pair: every condition reads exactly
//! the bit combination that the comparison families below produce, and
//! the pairing laws (signed less-than is overflow XOR sign, and so on)
//! are pinned by the property tests at the bottom.

use serde::{Deserialize, Serialize};

use crate::cpu::registers::{Flag, RegFile};
use crate::mem::Memory;
use crate::value::{arith, Value};

/// The twelve branch conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cond {
    /// Equal.
    E,
    /// Not equal.
    NE,
    /// Below (unsigned).
    B,
    /// Below or equal (unsigned).
    BE,
    /// Above or equal (unsigned).
    AE,
    /// Above (unsigned).
    A,
    /// Less (signed).
    L,
    /// Less or equal (signed).
    LE,
    /// Greater or equal (signed).
    GE,
    /// Greater (signed).
    G,
    /// Parity set (unordered float compare).
    P,
    /// Parity clear.
    NP,
}

impl std::fmt::Display for Cond {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Cond::E => "e",
            Cond::NE => "ne",
            Cond::B => "b",
            Cond::BE => "be",
            Cond::AE => "ae",
            Cond::A => "a",
            Cond::L => "l",
            Cond::LE => "le",
            Cond::GE => "ge",
            Cond::G => "g",
            Cond::P => "p",
            Cond::NP => "np",
        };
        f.write_str(s)
    }
}

/// A condition bit as a boolean, `None` when the register does not hold
/// a concrete integer.
fn flag(rs: &RegFile, f: Flag) -> Option<bool> {
    rs.get(f).as_int().map(|n| n == 1)
}

/// Evaluate a condition against the register file. Any needed bit being
/// unknown makes the whole condition unknown; uncertainty propagates,
/// it is never guessed away.
pub fn eval_cond(c: Cond, rs: &RegFile) -> Option<bool> {
    match c {
        Cond::E => flag(rs, Flag::ZF),
        Cond::NE => flag(rs, Flag::ZF).map(|z| !z),
        Cond::B => flag(rs, Flag::CF),
        Cond::BE => Some(flag(rs, Flag::CF)? || flag(rs, Flag::ZF)?),
        Cond::AE => flag(rs, Flag::CF).map(|c| !c),
        Cond::A => Some(!flag(rs, Flag::CF)? && !flag(rs, Flag::ZF)?),
        Cond::L => Some(flag(rs, Flag::OF)? != flag(rs, Flag::SF)?),
        Cond::LE => Some((flag(rs, Flag::OF)? != flag(rs, Flag::SF)?) || flag(rs, Flag::ZF)?),
        Cond::GE => Some(flag(rs, Flag::OF)? == flag(rs, Flag::SF)?),
        Cond::G => Some((flag(rs, Flag::OF)? == flag(rs, Flag::SF)?) && !flag(rs, Flag::ZF)?),
        Cond::P => flag(rs, Flag::PF),
        Cond::NP => flag(rs, Flag::PF).map(|p| !p),
    }
}

/// Unsigned equality, pointer-aware.
///
/// Pointer comparisons go through the memory liveness predicate:
/// comparing into a freed block is unknown, not a guess. Within one
/// block, one-past-the-end pointers still compare (weak validity);
/// across blocks only live pointers are known unequal.
pub fn cmpu_eq<M: Memory>(m: &M, x: Value, y: Value) -> Option<bool> {
    match (x, y) {
        (Value::Int(a), Value::Int(b)) => Some(a == b),
        (Value::Ptr(b1, o1), Value::Ptr(b2, o2)) => {
            if b1 == b2 {
                if m.weak_valid_ptr(b1, o1) && m.weak_valid_ptr(b2, o2) {
                    Some(o1 == o2)
                } else {
                    None
                }
            } else if m.valid_ptr(b1, o1) && m.valid_ptr(b2, o2) {
                Some(false)
            } else {
                None
            }
        }
        (Value::Ptr(b, o), Value::Int(n)) | (Value::Int(n), Value::Ptr(b, o)) => {
            // A live pointer is never equal to the null sentinel; any
            // other pointer/integer comparison is unknown.
            if n == 0 && m.weak_valid_ptr(b, o) {
                Some(false)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Unsigned strictly-less, pointer-aware with the same liveness rules.
/// Cross-block ordering is never known.
pub fn cmpu_lt<M: Memory>(m: &M, x: Value, y: Value) -> Option<bool> {
    match (x, y) {
        (Value::Int(a), Value::Int(b)) => Some((a as u32) < (b as u32)),
        (Value::Ptr(b1, o1), Value::Ptr(b2, o2)) if b1 == b2 => {
            if m.weak_valid_ptr(b1, o1) && m.weak_valid_ptr(b2, o2) {
                Some(o1 < o2)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Integer comparison: the full five-bit assignment.
///
/// ZF and CF come from the unsigned comparison (and are therefore the
/// only bits that can see pointers); SF is the sign of the difference,
/// OF the signed-subtraction overflow, and PF is left unknown; integer
/// compares on the modeled hardware leave parity unspecified.
pub fn compare_ints<M: Memory>(x: Value, y: Value, rs: RegFile, m: &M) -> RegFile {
    rs.with(Flag::ZF, arith::of_optbool(cmpu_eq(m, x, y)))
        .with(Flag::CF, arith::of_optbool(cmpu_lt(m, x, y)))
        .with(Flag::SF, arith::negative(arith::sub(x, y)))
        .with(Flag::OF, arith::sub_overflow(x, y))
        .with(Flag::PF, Value::Undef)
}

fn float_flags(ord: Option<std::cmp::Ordering>, rs: RegFile) -> RegFile {
    use std::cmp::Ordering::*;
    let ne = matches!(ord, Some(Less) | Some(Greater));
    let ge = matches!(ord, Some(Greater) | Some(Equal));
    rs.with(Flag::ZF, arith::of_bool(!ne))
        .with(Flag::CF, arith::of_bool(!ge))
        .with(Flag::PF, arith::of_bool(ord.is_none()))
        .with(Flag::SF, Value::Undef)
        .with(Flag::OF, Value::Undef)
}

/// Double-precision comparison.
///
/// ZF = not (x ≠ y), CF = not (x ≥ y), PF = unordered, so a NaN operand
/// reads as "unordered": ZF, CF and PF all set. A mismatched-type
/// compare is fully underspecified, every bit goes unknown.
pub fn compare_floats(x: Value, y: Value, rs: RegFile) -> RegFile {
    match (x, y) {
        (Value::Float(a), Value::Float(b)) => float_flags(a.partial_cmp(&b), rs),
        _ => rs.undef_flags(),
    }
}

/// Single-precision comparison, same bit contract as [`compare_floats`].
pub fn compare_singles(x: Value, y: Value, rs: RegFile) -> RegFile {
    match (x, y) {
        (Value::Single(a), Value::Single(b)) => float_flags(a.partial_cmp(&b), rs),
        _ => rs.undef_flags(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::{BlockMemory, Memory};
    use crate::value::{Block, Value};
    use proptest::prelude::*;

    fn after_int_cmp(a: i32, b: i32) -> RegFile {
        let m = BlockMemory::new();
        compare_ints(Value::Int(a), Value::Int(b), RegFile::new(), &m)
    }

    #[test]
    fn test_eval_cond_needs_concrete_bits() {
        let rs = RegFile::new();
        assert_eq!(eval_cond(Cond::E, &rs), None);
        assert_eq!(eval_cond(Cond::L, &rs), None);

        let rs = rs.with(Flag::ZF, Value::Int(1));
        assert_eq!(eval_cond(Cond::E, &rs), Some(true));
        // BE also needs CF, which is still unknown.
        assert_eq!(eval_cond(Cond::BE, &rs), None);
    }

    #[test]
    fn test_integer_compare_equal() {
        let rs = after_int_cmp(5, 5);
        assert_eq!(eval_cond(Cond::E, &rs), Some(true));
        assert_eq!(eval_cond(Cond::NE, &rs), Some(false));
        assert_eq!(eval_cond(Cond::LE, &rs), Some(true));
        assert_eq!(eval_cond(Cond::GE, &rs), Some(true));
        // Parity is unspecified after an integer compare.
        assert_eq!(eval_cond(Cond::P, &rs), None);
    }

    #[test]
    fn test_signed_less_is_of_xor_sf() {
        // A pair whose subtraction overflows: MIN - 1.
        let rs = after_int_cmp(i32::MIN, 1);
        assert_eq!(rs.get(Flag::OF), Value::Int(1));
        assert_eq!(eval_cond(Cond::L, &rs), Some(true));
    }

    #[test]
    fn test_pointer_compare_uses_liveness() {
        let mut m = BlockMemory::new();
        let b = m.alloc(0, 8);
        let p0 = Value::Ptr(b, 0);
        let p8 = Value::Ptr(b, 8); // one past the end

        assert_eq!(cmpu_lt(&m, p0, p8), Some(true));
        assert_eq!(cmpu_eq(&m, p0, p0), Some(true));
        assert_eq!(cmpu_eq(&m, p0, Value::Int(0)), Some(false));

        // After the block dies the same comparisons are unknown.
        assert!(m.free(b, 0, 8));
        assert_eq!(cmpu_lt(&m, p0, p8), None);
        assert_eq!(cmpu_eq(&m, p0, Value::Int(0)), None);
    }

    #[test]
    fn test_cross_block_pointer_compare() {
        let mut m = BlockMemory::new();
        let b1 = m.alloc(0, 4);
        let b2 = m.alloc(0, 4);
        assert_eq!(cmpu_eq(&m, Value::Ptr(b1, 0), Value::Ptr(b2, 0)), Some(false));
        assert_eq!(cmpu_lt(&m, Value::Ptr(b1, 0), Value::Ptr(b2, 0)), None);
        assert_eq!(cmpu_eq(&m, Value::Ptr(Block(99), 0), Value::Ptr(b2, 0)), None);
    }

    #[test]
    fn test_float_compare_ordered() {
        let rs = compare_floats(Value::Float(1.0), Value::Float(2.0), RegFile::new());
        assert_eq!(eval_cond(Cond::B, &rs), Some(true)); // 1 < 2 via CF
        assert_eq!(eval_cond(Cond::E, &rs), Some(false));
        assert_eq!(eval_cond(Cond::P, &rs), Some(false));

        let rs = compare_floats(Value::Float(2.0), Value::Float(2.0), RegFile::new());
        assert_eq!(eval_cond(Cond::E, &rs), Some(true));
        assert_eq!(eval_cond(Cond::B, &rs), Some(false));
    }

    #[test]
    fn test_float_compare_nan_is_unordered() {
        let rs = compare_floats(Value::Float(f64::NAN), Value::Float(2.0), RegFile::new());
        assert_eq!(rs.get(Flag::ZF), Value::Int(1));
        assert_eq!(rs.get(Flag::CF), Value::Int(1));
        assert_eq!(eval_cond(Cond::P, &rs), Some(true));
        assert_eq!(rs.get(Flag::SF), Value::Undef);
    }

    #[test]
    fn test_float_compare_type_mismatch_underspecified() {
        let rs = RegFile::new().with(Flag::ZF, Value::Int(1));
        let rs = compare_floats(Value::Int(1), Value::Float(2.0), rs);
        for f in crate::cpu::registers::ALL_FLAGS {
            assert_eq!(rs.get(f), Value::Undef);
        }
        // And the single-width family only accepts singles.
        let rs = compare_singles(Value::Float(1.0), Value::Float(2.0), RegFile::new());
        assert_eq!(rs.get(Flag::ZF), Value::Undef);
    }

    #[test]
    fn test_single_compare() {
        let rs = compare_singles(Value::Single(3.0), Value::Single(1.0), RegFile::new());
        assert_eq!(eval_cond(Cond::A, &rs), Some(true));
        assert_eq!(eval_cond(Cond::E, &rs), Some(false));
    }

    proptest! {
        // The pairing laws: each condition after an integer compare
        // agrees with the mathematical comparison on concrete operands.
        #[test]
        fn prop_flag_pairing(a: i32, b: i32) {
            let rs = after_int_cmp(a, b);
            let (ua, ub) = (a as u32, b as u32);
            prop_assert_eq!(eval_cond(Cond::E, &rs), Some(a == b));
            prop_assert_eq!(eval_cond(Cond::NE, &rs), Some(a != b));
            prop_assert_eq!(eval_cond(Cond::B, &rs), Some(ua < ub));
            prop_assert_eq!(eval_cond(Cond::BE, &rs), Some(ua <= ub));
            prop_assert_eq!(eval_cond(Cond::AE, &rs), Some(ua >= ub));
            prop_assert_eq!(eval_cond(Cond::A, &rs), Some(ua > ub));
            prop_assert_eq!(eval_cond(Cond::L, &rs), Some(a < b));
            prop_assert_eq!(eval_cond(Cond::LE, &rs), Some(a <= b));
            prop_assert_eq!(eval_cond(Cond::GE, &rs), Some(a >= b));
            prop_assert_eq!(eval_cond(Cond::G, &rs), Some(a > b));
        }

        #[test]
        fn prop_float_pairing(a: f64, b: f64) {
            let rs = compare_floats(Value::Float(a), Value::Float(b), RegFile::new());
            prop_assert_eq!(eval_cond(Cond::E, &rs), Some(!(a < b || a > b)));
            prop_assert_eq!(eval_cond(Cond::B, &rs), Some(!(a >= b)));
            prop_assert_eq!(eval_cond(Cond::P, &rs), Some(a.partial_cmp(&b).is_none()));
        }
    }
}

//! The register file.
//!
//! Registers form a small closed set: the program counter, eight
//! general-purpose integer registers, eight vector float registers, the
//! x87 top-of-stack, the five condition bits, and a pseudo register
//! holding the return address across calls (not a real hardware
//! register; it models call/return linkage without an explicit stack).
//!
//! The file is a total map with `Undef` as the default: an uninitialized
//! register is explicitly unknown, not garbage.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// General-purpose integer registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IReg {
    EAX,
    EBX,
    ECX,
    EDX,
    ESI,
    EDI,
    EBP,
    ESP,
}

/// Vector float registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FReg {
    XMM0,
    XMM1,
    XMM2,
    XMM3,
    XMM4,
    XMM5,
    XMM6,
    XMM7,
}

/// Condition bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Flag {
    ZF,
    CF,
    PF,
    SF,
    OF,
}

/// Every register the interpreter knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reg {
    PC,
    I(IReg),
    F(FReg),
    /// x87 top-of-stack, used for float returns.
    ST0,
    Flag(Flag),
    /// Pseudo return-address register.
    RA,
}

impl From<IReg> for Reg {
    fn from(r: IReg) -> Reg {
        Reg::I(r)
    }
}

impl From<FReg> for Reg {
    fn from(r: FReg) -> Reg {
        Reg::F(r)
    }
}

impl From<Flag> for Reg {
    fn from(f: Flag) -> Reg {
        Reg::Flag(f)
    }
}

pub const ALL_FLAGS: [Flag; 5] = [Flag::ZF, Flag::CF, Flag::PF, Flag::SF, Flag::OF];

const NREGS: usize = 24;

impl Reg {
    fn index(self) -> usize {
        match self {
            Reg::PC => 0,
            Reg::I(r) => 1 + r as usize,
            Reg::F(r) => 9 + r as usize,
            Reg::ST0 => 17,
            Reg::Flag(f) => 18 + f as usize,
            Reg::RA => 23,
        }
    }
}

impl std::fmt::Display for IReg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IReg::EAX => "eax",
            IReg::EBX => "ebx",
            IReg::ECX => "ecx",
            IReg::EDX => "edx",
            IReg::ESI => "esi",
            IReg::EDI => "edi",
            IReg::EBP => "ebp",
            IReg::ESP => "esp",
        };
        f.write_str(s)
    }
}

impl std::fmt::Display for FReg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "xmm{}", *self as usize)
    }
}

impl std::fmt::Display for Flag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Flag::ZF => "zf",
            Flag::CF => "cf",
            Flag::PF => "pf",
            Flag::SF => "sf",
            Flag::OF => "of",
        };
        f.write_str(s)
    }
}

impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reg::PC => f.write_str("pc"),
            Reg::I(r) => r.fmt(f),
            Reg::F(r) => r.fmt(f),
            Reg::ST0 => f.write_str("st0"),
            Reg::Flag(fl) => fl.fmt(f),
            Reg::RA => f.write_str("ra"),
        }
    }
}

/// Total mapping from registers to values, array-backed since the
/// register set is fixed and finite.
///
/// Value semantics throughout: the executor clones the file and updates
/// the clone, so no state ever aliases another across steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegFile {
    vals: [Value; NREGS],
}

impl RegFile {
    /// A file with every register unknown.
    pub fn new() -> Self {
        Self { vals: [Value::Undef; NREGS] }
    }

    pub fn get(&self, r: impl Into<Reg>) -> Value {
        self.vals[r.into().index()]
    }

    pub fn set(&mut self, r: impl Into<Reg>, v: Value) {
        self.vals[r.into().index()] = v;
    }

    /// Builder-style update, convenient for chained register writes.
    pub fn with(mut self, r: impl Into<Reg>, v: Value) -> Self {
        self.set(r, v);
        self
    }

    /// Clobber all five condition bits.
    pub fn undef_flags(mut self) -> Self {
        for f in ALL_FLAGS {
            self.set(f, Value::Undef);
        }
        self
    }

    /// Clobber an arbitrary register list.
    pub fn undef_regs(mut self, regs: &[Reg]) -> Self {
        for &r in regs {
            self.set(r, Value::Undef);
        }
        self
    }
}

impl Default for RegFile {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Block;

    #[test]
    fn test_default_is_undef() {
        let rs = RegFile::new();
        assert_eq!(rs.get(Reg::PC), Value::Undef);
        assert_eq!(rs.get(IReg::EAX), Value::Undef);
        assert_eq!(rs.get(Flag::ZF), Value::Undef);
    }

    #[test]
    fn test_registers_are_distinct() {
        let mut rs = RegFile::new();
        rs.set(IReg::EAX, Value::Int(1));
        rs.set(IReg::ESP, Value::Int(2));
        rs.set(FReg::XMM0, Value::Float(3.0));
        rs.set(Reg::ST0, Value::Float(4.0));
        rs.set(Reg::RA, Value::Int(5));
        rs.set(Reg::PC, Value::Ptr(Block(0), 0));

        assert_eq!(rs.get(IReg::EAX), Value::Int(1));
        assert_eq!(rs.get(IReg::ESP), Value::Int(2));
        assert_eq!(rs.get(FReg::XMM0), Value::Float(3.0));
        assert_eq!(rs.get(Reg::ST0), Value::Float(4.0));
        assert_eq!(rs.get(Reg::RA), Value::Int(5));
        assert_eq!(rs.get(IReg::EBX), Value::Undef);
    }

    #[test]
    fn test_undef_flags_leaves_rest() {
        let rs = RegFile::new()
            .with(Flag::ZF, Value::Int(1))
            .with(IReg::EAX, Value::Int(7))
            .undef_flags();
        assert_eq!(rs.get(Flag::ZF), Value::Undef);
        assert_eq!(rs.get(IReg::EAX), Value::Int(7));
    }

    #[test]
    fn test_updates_do_not_alias() {
        let rs1 = RegFile::new().with(IReg::EAX, Value::Int(1));
        let rs2 = rs1.clone().with(IReg::EAX, Value::Int(2));
        assert_eq!(rs1.get(IReg::EAX), Value::Int(1));
        assert_eq!(rs2.get(IReg::EAX), Value::Int(2));
    }
}

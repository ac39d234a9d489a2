//! The instruction executor.
//!
//! One decoded instruction in, either a successor (registers, memory)
//! out or a stuck outcome. Execution is pure: memory is cloned before
//! any mutation, so an instruction that gets stuck halfway through a
//! store sequence leaves no partial effects behind.
//!
//! Flag policy: plain register moves and conversions preserve the
//! condition bits, every memory access and every arithmetic/logic
//! operation clobbers all five, and comparisons set exactly the bits
//! their family defines.

use crate::cpu::flags::{compare_floats, compare_ints, compare_singles, eval_cond};
use crate::cpu::instr::{Addrmode, Disp, Instr, Scale};
use crate::cpu::registers::{IReg, Reg, RegFile};
use crate::mem::{Chunk, Memory};
use crate::program::{Function, GlobalEnv};
use crate::value::{arith, Value};

/// Result of executing one instruction: a successor state, or no
/// transition at all.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<M> {
    Next(RegFile, M),
    Stuck,
}

/// Effective-address computation. Absent components default to zero;
/// the computation itself never fails, it can only produce `Undef`.
pub fn eval_addrmode(ge: &GlobalEnv, a: &Addrmode, rs: &RegFile) -> Value {
    let base = match a.base {
        Some(r) => rs.get(r),
        None => Value::ZERO,
    };
    let index = match a.index {
        Some((r, Scale::S1)) => rs.get(r),
        Some((r, sc)) => arith::mul(rs.get(r), Value::Int(sc.factor())),
        None => Value::ZERO,
    };
    let disp = match &a.disp {
        Disp::Int(n) => Value::Int(*n),
        Disp::Symbol(id, ofs) => ge.symbol_address(id, *ofs),
    };
    arith::add(base, arith::add(index, disp))
}

/// Advance the program counter by one instruction slot.
fn nextinstr(rs: RegFile) -> RegFile {
    let pc = arith::add(rs.get(Reg::PC), Value::Int(1));
    rs.with(Reg::PC, pc)
}

/// Advance and clobber the condition bits.
fn nextinstr_nf(rs: RegFile) -> RegFile {
    nextinstr(rs.undef_flags())
}

fn exec_load<M: Memory>(
    ge: &GlobalEnv,
    chunk: Chunk,
    a: &Addrmode,
    rs: &RegFile,
    m: &M,
    rd: Reg,
) -> Outcome<M> {
    // Operate on the clone so a stuck access leaves the input memory
    // (and any event log wrapped around it) untouched.
    let m2 = m.clone();
    match m2.load(chunk, &eval_addrmode(ge, a, rs)) {
        Some(v) => Outcome::Next(nextinstr_nf(rs.clone().with(rd, v)), m2),
        None => Outcome::Stuck,
    }
}

fn exec_store<M: Memory>(
    ge: &GlobalEnv,
    chunk: Chunk,
    a: &Addrmode,
    rs: &RegFile,
    m: &M,
    v: Value,
    destroyed: &[Reg],
) -> Outcome<M> {
    let mut m2 = m.clone();
    if m2.store(chunk, &eval_addrmode(ge, a, rs), &v) {
        Outcome::Next(nextinstr_nf(rs.clone().undef_regs(destroyed)), m2)
    } else {
        Outcome::Stuck
    }
}

/// Redirect the program counter to a label of the current function.
fn goto_label<M: Memory>(f: &Function, lbl: u32, rs: RegFile, m: &M) -> Outcome<M> {
    let Some(pos) = f.label_pos(lbl) else {
        return Outcome::Stuck;
    };
    match rs.get(Reg::PC) {
        Value::Ptr(b, _) => Outcome::Next(rs.with(Reg::PC, Value::Ptr(b, pos)), m.clone()),
        _ => Outcome::Stuck,
    }
}

/// Execute one instruction of `f`.
///
/// The builtin marker is deliberately stuck here: it needs the
/// external-call collaborator and is dispatched one level up by the
/// step relation.
pub fn exec_instr<M: Memory>(
    ge: &GlobalEnv,
    f: &Function,
    instr: &Instr,
    rs: &RegFile,
    m: &M,
) -> Outcome<M> {
    use Instr::*;

    // Most arms produce a register update plus a PC advance over
    // unchanged memory.
    let next = |rs2: RegFile| Outcome::Next(nextinstr(rs2), m.clone());
    let next_nf = |rs2: RegFile| Outcome::Next(nextinstr_nf(rs2), m.clone());

    match instr {
        // Moves.
        MovRr(rd, r1) => next(rs.clone().with(*rd, rs.get(*r1))),
        MovRi(rd, n) => next(rs.clone().with(*rd, Value::Int(*n))),
        MovRa(rd, id) => next(rs.clone().with(*rd, ge.symbol_address(id, 0))),
        MovRm(rd, a) => exec_load(ge, Chunk::I32, a, rs, m, Reg::I(*rd)),
        MovMr(a, r1) => exec_store(ge, Chunk::I32, a, rs, m, rs.get(*r1), &[]),
        MovsdFf(rd, r1) => next(rs.clone().with(*rd, rs.get(*r1))),
        MovsdFi(rd, x) => next(rs.clone().with(*rd, Value::Float(*x))),
        MovsdFm(rd, a) => exec_load(ge, Chunk::F64, a, rs, m, Reg::F(*rd)),
        MovsdMf(a, r1) => exec_store(ge, Chunk::F64, a, rs, m, rs.get(*r1), &[]),
        MovssFi(rd, x) => next(rs.clone().with(*rd, Value::Single(*x))),
        MovssFm(rd, a) => exec_load(ge, Chunk::F32, a, rs, m, Reg::F(*rd)),
        MovssMf(a, r1) => exec_store(ge, Chunk::F32, a, rs, m, rs.get(*r1), &[]),
        FldlM(a) => exec_load(ge, Chunk::F64, a, rs, m, Reg::ST0),
        FstplM(a) => exec_store(ge, Chunk::F64, a, rs, m, rs.get(Reg::ST0), &[Reg::ST0]),
        FldsM(a) => exec_load(ge, Chunk::F32, a, rs, m, Reg::ST0),
        FstpsM(a) => exec_store(ge, Chunk::F32, a, rs, m, rs.get(Reg::ST0), &[Reg::ST0]),
        XchgRr(rd, r1) => next(
            rs.clone()
                .with(*rd, rs.get(*r1))
                .with(*r1, rs.get(*rd)),
        ),
        MovbMr(a, r1) => exec_store(ge, Chunk::I8U, a, rs, m, rs.get(*r1), &[]),
        MovwMr(a, r1) => exec_store(ge, Chunk::I16U, a, rs, m, rs.get(*r1), &[]),

        // Widening and narrowing moves: pure bit operations on the
        // typed value, never byte reinterpretation.
        MovzbRr(rd, r1) => next(rs.clone().with(*rd, arith::zero_ext8(rs.get(*r1)))),
        MovzbRm(rd, a) => exec_load(ge, Chunk::I8U, a, rs, m, Reg::I(*rd)),
        MovsbRr(rd, r1) => next(rs.clone().with(*rd, arith::sign_ext8(rs.get(*r1)))),
        MovsbRm(rd, a) => exec_load(ge, Chunk::I8S, a, rs, m, Reg::I(*rd)),
        MovzwRr(rd, r1) => next(rs.clone().with(*rd, arith::zero_ext16(rs.get(*r1)))),
        MovzwRm(rd, a) => exec_load(ge, Chunk::I16U, a, rs, m, Reg::I(*rd)),
        MovswRr(rd, r1) => next(rs.clone().with(*rd, arith::sign_ext16(rs.get(*r1)))),
        MovswRm(rd, a) => exec_load(ge, Chunk::I16S, a, rs, m, Reg::I(*rd)),

        // Conversions.
        Cvtsd2ss(rd, r1) => next(rs.clone().with(*rd, arith::single_of_float(rs.get(*r1)))),
        Cvtss2sd(rd, r1) => next(rs.clone().with(*rd, arith::float_of_single(rs.get(*r1)))),
        Cvttsd2si(rd, r1) => next(rs.clone().with(*rd, arith::int_of_float(rs.get(*r1)))),
        Cvtsi2sd(rd, r1) => next(rs.clone().with(*rd, arith::float_of_int(rs.get(*r1)))),
        Cvttss2si(rd, r1) => next(rs.clone().with(*rd, arith::int_of_single(rs.get(*r1)))),
        Cvtsi2ss(rd, r1) => next(rs.clone().with(*rd, arith::single_of_int(rs.get(*r1)))),

        // Integer arithmetic. Destination and first operand coincide.
        Lea(rd, a) => next(rs.clone().with(*rd, eval_addrmode(ge, a, rs))),
        Neg(rd) => next_nf(rs.clone().with(*rd, arith::neg(rs.get(*rd)))),
        SubRr(rd, r1) => next_nf(rs.clone().with(*rd, arith::sub(rs.get(*rd), rs.get(*r1)))),
        ImulRr(rd, r1) => next_nf(rs.clone().with(*rd, arith::mul(rs.get(*rd), rs.get(*r1)))),
        ImulRi(rd, n) => next_nf(rs.clone().with(*rd, arith::mul(rs.get(*rd), Value::Int(*n)))),

        // Division: EAX holds the dividend, EDX is clobbered before the
        // divisor is read (so a divisor living in EDX reads as unknown),
        // quotient to EAX and remainder to EDX. A zero divisor or the
        // overflowing signed pair has no successor.
        Div(r1) => {
            let clobbered = rs.clone().with(IReg::EDX, Value::Undef);
            let (n, d) = (clobbered.get(IReg::EAX), clobbered.get(*r1));
            match (arith::divu(n, d), arith::modu(n, d)) {
                (Some(q), Some(r)) => {
                    next_nf(clobbered.with(IReg::EAX, q).with(IReg::EDX, r))
                }
                _ => Outcome::Stuck,
            }
        }
        Idiv(r1) => {
            let clobbered = rs.clone().with(IReg::EDX, Value::Undef);
            let (n, d) = (clobbered.get(IReg::EAX), clobbered.get(*r1));
            match (arith::divs(n, d), arith::mods(n, d)) {
                (Some(q), Some(r)) => {
                    next_nf(clobbered.with(IReg::EAX, q).with(IReg::EDX, r))
                }
                _ => Outcome::Stuck,
            }
        }

        AndRr(rd, r1) => next_nf(rs.clone().with(*rd, arith::and(rs.get(*rd), rs.get(*r1)))),
        AndRi(rd, n) => next_nf(rs.clone().with(*rd, arith::and(rs.get(*rd), Value::Int(*n)))),
        OrRr(rd, r1) => next_nf(rs.clone().with(*rd, arith::or(rs.get(*rd), rs.get(*r1)))),
        OrRi(rd, n) => next_nf(rs.clone().with(*rd, arith::or(rs.get(*rd), Value::Int(*n)))),
        XorR(rd) => next_nf(rs.clone().with(*rd, Value::ZERO)),
        XorRr(rd, r1) => next_nf(rs.clone().with(*rd, arith::xor(rs.get(*rd), rs.get(*r1)))),
        XorRi(rd, n) => next_nf(rs.clone().with(*rd, arith::xor(rs.get(*rd), Value::Int(*n)))),
        Not(rd) => next_nf(rs.clone().with(*rd, arith::not(rs.get(*rd)))),

        SalRcl(rd) => next_nf(rs.clone().with(*rd, arith::shl(rs.get(*rd), rs.get(IReg::ECX)))),
        SalRi(rd, n) => next_nf(rs.clone().with(*rd, arith::shl(rs.get(*rd), Value::Int(*n)))),
        ShrRcl(rd) => next_nf(rs.clone().with(*rd, arith::shru(rs.get(*rd), rs.get(IReg::ECX)))),
        ShrRi(rd, n) => next_nf(rs.clone().with(*rd, arith::shru(rs.get(*rd), Value::Int(*n)))),
        SarRcl(rd) => next_nf(rs.clone().with(*rd, arith::shr(rs.get(*rd), rs.get(IReg::ECX)))),
        SarRi(rd, n) => next_nf(rs.clone().with(*rd, arith::shr(rs.get(*rd), Value::Int(*n)))),
        ShldRi(rd, r1, n) => {
            let hi = arith::shl(rs.get(*rd), Value::Int(*n));
            let lo = arith::shru(rs.get(*r1), Value::Int(32 - *n));
            next_nf(rs.clone().with(*rd, arith::or(hi, lo)))
        }
        RorRi(rd, n) => next_nf(rs.clone().with(*rd, arith::ror(rs.get(*rd), Value::Int(*n)))),

        // Comparisons set exactly their family's bits.
        CmpRr(r1, r2) => next(compare_ints(rs.get(*r1), rs.get(*r2), rs.clone(), m)),
        CmpRi(r1, n) => next(compare_ints(rs.get(*r1), Value::Int(*n), rs.clone(), m)),
        TestRr(r1, r2) => next(compare_ints(
            arith::and(rs.get(*r1), rs.get(*r2)),
            Value::ZERO,
            rs.clone(),
            m,
        )),
        TestRi(r1, n) => next(compare_ints(
            arith::and(rs.get(*r1), Value::Int(*n)),
            Value::ZERO,
            rs.clone(),
            m,
        )),

        // Conditional move: the hardware always writes the destination,
        // so an unknown condition forces it unknown rather than leaving
        // it unchanged.
        Cmov(c, rd, r1) => match eval_cond(*c, rs) {
            Some(true) => next(rs.clone().with(*rd, rs.get(*r1))),
            Some(false) => next(rs.clone()),
            None => next(rs.clone().with(*rd, Value::Undef)),
        },
        Setcc(c, rd) => next(rs.clone().with(*rd, arith::of_optbool(eval_cond(*c, rs)))),

        // Double-precision arithmetic.
        AdddFf(rd, r1) => next_nf(rs.clone().with(*rd, arith::addf(rs.get(*rd), rs.get(*r1)))),
        SubdFf(rd, r1) => next_nf(rs.clone().with(*rd, arith::subf(rs.get(*rd), rs.get(*r1)))),
        MuldFf(rd, r1) => next_nf(rs.clone().with(*rd, arith::mulf(rs.get(*rd), rs.get(*r1)))),
        DivdFf(rd, r1) => next_nf(rs.clone().with(*rd, arith::divf(rs.get(*rd), rs.get(*r1)))),
        Negd(rd) => next_nf(rs.clone().with(*rd, arith::negf(rs.get(*rd)))),
        Absd(rd) => next_nf(rs.clone().with(*rd, arith::absf(rs.get(*rd)))),
        Comisd(r1, r2) => next(compare_floats(rs.get(*r1), rs.get(*r2), rs.clone())),
        XorpdF(rd) => next_nf(rs.clone().with(*rd, Value::Float(0.0))),

        // Single-precision arithmetic.
        AddsFf(rd, r1) => next_nf(rs.clone().with(*rd, arith::adds(rs.get(*rd), rs.get(*r1)))),
        SubsFf(rd, r1) => next_nf(rs.clone().with(*rd, arith::subs(rs.get(*rd), rs.get(*r1)))),
        MulsFf(rd, r1) => next_nf(rs.clone().with(*rd, arith::muls(rs.get(*rd), rs.get(*r1)))),
        DivsFf(rd, r1) => next_nf(rs.clone().with(*rd, arith::divss(rs.get(*rd), rs.get(*r1)))),
        Negs(rd) => next_nf(rs.clone().with(*rd, arith::negs(rs.get(*rd)))),
        Abss(rd) => next_nf(rs.clone().with(*rd, arith::abss(rs.get(*rd)))),
        Comiss(r1, r2) => next(compare_singles(rs.get(*r1), rs.get(*r2), rs.clone())),
        XorpsF(rd) => next_nf(rs.clone().with(*rd, Value::Single(0.0))),

        // Branches recompute the program counter directly.
        JmpL(lbl) => goto_label(f, *lbl, rs.clone(), m),
        JmpS(id) => Outcome::Next(rs.clone().with(Reg::PC, ge.symbol_address(id, 0)), m.clone()),
        JmpR(r) => Outcome::Next(rs.clone().with(Reg::PC, rs.get(*r)), m.clone()),
        Jcc(c, lbl) => match eval_cond(*c, rs) {
            Some(true) => goto_label(f, *lbl, rs.clone(), m),
            Some(false) => next(rs.clone()),
            None => Outcome::Stuck,
        },
        Jcc2(c1, c2, lbl) => match (eval_cond(*c1, rs), eval_cond(*c2, rs)) {
            (Some(b1), Some(b2)) => {
                if b1 && b2 {
                    goto_label(f, *lbl, rs.clone(), m)
                } else {
                    next(rs.clone())
                }
            }
            _ => Outcome::Stuck,
        },
        Jmptbl(r, tbl) => match rs.get(*r) {
            Value::Int(n) => match tbl.get(n as u32 as usize) {
                Some(lbl) => goto_label(
                    f,
                    *lbl,
                    rs.clone()
                        .with(IReg::ECX, Value::Undef)
                        .with(IReg::EDX, Value::Undef),
                    m,
                ),
                None => Outcome::Stuck,
            },
            _ => Outcome::Stuck,
        },

        // Call and return: linkage through the pseudo register, no
        // modeled call stack.
        CallS(id) => {
            let ra = arith::add(rs.get(Reg::PC), Value::Int(1));
            Outcome::Next(
                rs.clone()
                    .with(Reg::RA, ra)
                    .with(Reg::PC, ge.symbol_address(id, 0)),
                m.clone(),
            )
        }
        CallR(r) => {
            let ra = arith::add(rs.get(Reg::PC), Value::Int(1));
            Outcome::Next(
                rs.clone().with(Reg::RA, ra).with(Reg::PC, rs.get(*r)),
                m.clone(),
            )
        }
        Ret => Outcome::Next(rs.clone().with(Reg::PC, rs.get(Reg::RA)), m.clone()),

        // Frame handling.
        Allocframe { sz, ofs_ra, ofs_link } => {
            let mut m2 = m.clone();
            let stk = m2.alloc(0, *sz);
            let sp = Value::Ptr(stk, 0);
            let link_addr = arith::add(sp, Value::Int(*ofs_link));
            if !m2.store(Chunk::I32, &link_addr, &rs.get(IReg::ESP)) {
                return Outcome::Stuck;
            }
            let ra_addr = arith::add(sp, Value::Int(*ofs_ra));
            if !m2.store(Chunk::I32, &ra_addr, &rs.get(Reg::RA)) {
                return Outcome::Stuck;
            }
            Outcome::Next(nextinstr(rs.clone().with(IReg::ESP, sp)), m2)
        }
        Freeframe { sz, ofs_ra, ofs_link } => {
            let sp = rs.get(IReg::ESP);
            let mut m2 = m.clone();
            let Some(ra) = m2.load(Chunk::I32, &arith::add(sp, Value::Int(*ofs_ra))) else {
                return Outcome::Stuck;
            };
            let Some(link) = m2.load(Chunk::I32, &arith::add(sp, Value::Int(*ofs_link))) else {
                return Outcome::Stuck;
            };
            let Value::Ptr(stk, _) = sp else {
                return Outcome::Stuck;
            };
            if !m2.free(stk, 0, *sz) {
                return Outcome::Stuck;
            }
            Outcome::Next(
                nextinstr(rs.clone().with(IReg::ESP, link).with(Reg::RA, ra)),
                m2,
            )
        }

        // Pseudo markers.
        Label(_) => next(rs.clone()),
        Nop => next(rs.clone()),
        Builtin { .. } => Outcome::Stuck,

        // The unmodeled tail: recognized, never executed.
        AdcRr(..) | SbbRr(..) | Bsf(..) | Bsr(..) | Bswap(..) | Sqrtsd(..) | Maxsd(..)
        | Minsd(..) | RepMovsl | CfiAdjust(..) => Outcome::Stuck,
    }
}

//! The interpreter core.
//!
//! This module implements the executable semantics of the modeled
//! 32-bit instruction set:
//! - a register file over a small closed register set
//! - condition-bit evaluation paired with the flag-setting comparisons
//! - the instruction executor (one instruction, one outcome)
//! - the step relation, calling convention, and program driver

pub mod registers;
pub mod flags;
pub mod instr;
pub mod execute;
pub mod step;

pub use registers::{FReg, Flag, IReg, Reg, RegFile};
pub use flags::{compare_floats, compare_ints, compare_singles, eval_cond, Cond};
pub use instr::{Addrmode, BuiltinArg, BuiltinRes, Disp, Instr, Label, Scale};
pub use execute::{eval_addrmode, exec_instr, Outcome};
pub use step::{
    final_exit_code, initial_state, step, ExternalCall, Machine, MachineError, NoExternals,
    ObsEvent, State,
};

//! # ia32 Interpreter
//!
//! A deterministic interpreter for a 32-bit x86-style instruction set:
//! a step relation over (register file, memory) states, paired with a
//! memory-event trace subsystem that records every memory side effect
//! of a step as replayable data with inferable access permissions.
//!
//! Memory itself is a collaborator behind the [`mem::Memory`] trait;
//! external functions and builtins go through [`cpu::ExternalCall`].

pub mod value;
pub mod mem;
pub mod cpu;
pub mod program;
pub mod image;

#[cfg(feature = "tui")]
pub mod tui;

// Re-export commonly used types
pub use value::{Block, Value};
pub use cpu::{
    final_exit_code, initial_state, step, ExternalCall, Instr, Machine, MachineError, NoExternals,
    Outcome, RegFile, State,
};
pub use mem::{eliminate, required_perm, BlockMemory, Chunk, FlatMemory, MemEvent, Memory, Perm, Recorder};
pub use program::{FunDef, Function, GlobalEnv, Program, ProgramError, Signature};
pub use image::{disassemble, disassemble_program, load_image, save_image, ImageError};

#[cfg(feature = "tui")]
pub use tui::run_debugger;

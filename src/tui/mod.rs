//! TUI stepper for the interpreter.
//!
//! Provides an interactive terminal-based stepper with:
//! - Disassembly view centered on the program counter
//! - Register file and condition-bit visualization
//! - The recorded memory-event trace, live
//! - Step/run/breakpoint controls

mod app;
mod ui;

pub use app::{run_debugger, DebuggerApp};

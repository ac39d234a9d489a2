//! Machine values for the 32-bit interpreter.
//!
//! A value is either a 32-bit integer, a double- or single-precision
//! float, a pointer (block identifier plus byte offset), or `Undef`.
//! `Undef` is the explicit model of unspecified hardware behavior and
//! propagates through every operation.

pub mod arith;
pub mod val;

pub use val::{Block, Value};

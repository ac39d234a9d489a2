//! Memory access chunks and the cell-level encoding of values.
//!
//! A chunk is a fixed-width access shape: how many bytes move and how
//! they are (re)interpreted. Memory cells are not plain bytes: a stored
//! pointer has no byte representation, so it is kept as a sequence of
//! fragments that only a load of the matching width can reassemble.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A fixed-width memory access shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Chunk {
    /// 1 byte, sign-extended on load.
    I8S,
    /// 1 byte, zero-extended on load.
    I8U,
    /// 2 bytes, sign-extended on load.
    I16S,
    /// 2 bytes, zero-extended on load.
    I16U,
    /// 4-byte integer or pointer.
    I32,
    /// 4-byte single-precision float.
    F32,
    /// 8-byte double-precision float.
    F64,
    /// Any 32-bit value, bit pattern preserved (register spill/reload).
    Any32,
    /// Any 64-bit value, bit pattern preserved.
    Any64,
}

impl Chunk {
    /// Access width in bytes.
    pub fn size(self) -> usize {
        match self {
            Chunk::I8S | Chunk::I8U => 1,
            Chunk::I16S | Chunk::I16U => 2,
            Chunk::I32 | Chunk::F32 | Chunk::Any32 => 4,
            Chunk::F64 | Chunk::Any64 => 8,
        }
    }
}

impl std::fmt::Display for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Chunk::I8S => "int8s",
            Chunk::I8U => "int8u",
            Chunk::I16S => "int16s",
            Chunk::I16U => "int16u",
            Chunk::I32 => "int32",
            Chunk::F32 => "float32",
            Chunk::F64 => "float64",
            Chunk::Any32 => "any32",
            Chunk::Any64 => "any64",
        };
        f.write_str(s)
    }
}

/// One memory cell.
///
/// `Frag(v, i)` is byte `i` of a value that has no byte representation
/// (a pointer) or whose exact bits must survive a spill round-trip.
/// Decoding succeeds only when all fragments of the same value line up
/// in order; any mismatch decodes to `Undef`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MemVal {
    /// Never-written cell contents.
    Undef,
    /// A concrete byte.
    Byte(u8),
    /// Byte `i` of an opaque value spanning `n` cells.
    Frag(Value, u8, u8),
}

/// Encode a value for storage under a chunk.
///
/// Encoding is total: an ill-typed store (say, a float through an
/// integer chunk) writes `Undef` cells, and the eventual load reads
/// `Undef` back. Only the memory operation itself can fail, not the
/// encoding.
pub fn encode_val(chunk: Chunk, v: &Value) -> Vec<MemVal> {
    let n = chunk.size();
    match (chunk, v) {
        (Chunk::I8S | Chunk::I8U, Value::Int(x)) => int_bytes(*x, 1),
        (Chunk::I16S | Chunk::I16U, Value::Int(x)) => int_bytes(*x, 2),
        (Chunk::I32, Value::Int(x)) => int_bytes(*x, 4),
        (Chunk::I32, Value::Ptr(..)) => fragments(v, 4),
        (Chunk::F32, Value::Single(x)) => byte_cells(&x.to_le_bytes()),
        (Chunk::F64, Value::Float(x)) => byte_cells(&x.to_le_bytes()),
        (Chunk::Any32, Value::Int(..) | Value::Single(..) | Value::Ptr(..)) => fragments(v, 4),
        (Chunk::Any64, v) if !v.is_undef() => fragments(v, 8),
        _ => vec![MemVal::Undef; n],
    }
}

/// Decode cells read under a chunk back into a value.
pub fn decode_val(chunk: Chunk, cells: &[MemVal]) -> Value {
    debug_assert_eq!(cells.len(), chunk.size());
    match chunk {
        Chunk::I8S => int_of_bytes(cells).map_or(Value::Undef, |n| Value::Int(n as i8 as i32)),
        Chunk::I8U => int_of_bytes(cells).map_or(Value::Undef, |n| Value::Int(n as i32)),
        Chunk::I16S => int_of_bytes(cells).map_or(Value::Undef, |n| Value::Int(n as i16 as i32)),
        Chunk::I16U => int_of_bytes(cells).map_or(Value::Undef, |n| Value::Int(n as i32)),
        Chunk::I32 => match int_of_bytes(cells) {
            Some(n) => Value::Int(n as i32),
            // A pointer stored with the 4-byte integer chunk reads back
            // as that pointer.
            None => match defragment(cells) {
                Some(v @ Value::Ptr(..)) => v,
                _ => Value::Undef,
            },
        },
        Chunk::F32 => match concrete_bytes(cells) {
            Some(b) => Value::Single(f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            None => Value::Undef,
        },
        Chunk::F64 => match concrete_bytes(cells) {
            Some(b) => Value::Float(f64::from_le_bytes([
                b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
            ])),
            None => Value::Undef,
        },
        Chunk::Any32 | Chunk::Any64 => defragment(cells).unwrap_or(Value::Undef),
    }
}

fn byte_cells(bytes: &[u8]) -> Vec<MemVal> {
    bytes.iter().map(|&b| MemVal::Byte(b)).collect()
}

fn int_bytes(x: i32, n: usize) -> Vec<MemVal> {
    byte_cells(&x.to_le_bytes()[..n])
}

fn fragments(v: &Value, n: usize) -> Vec<MemVal> {
    (0..n as u8).map(|i| MemVal::Frag(*v, i, n as u8)).collect()
}

fn concrete_bytes(cells: &[MemVal]) -> Option<Vec<u8>> {
    cells
        .iter()
        .map(|c| match c {
            MemVal::Byte(b) => Some(*b),
            _ => None,
        })
        .collect()
}

fn int_of_bytes(cells: &[MemVal]) -> Option<u32> {
    let bytes = concrete_bytes(cells)?;
    let mut n: u32 = 0;
    for (i, b) in bytes.iter().enumerate() {
        n |= (*b as u32) << (8 * i);
    }
    Some(n)
}

/// Reassemble a fragment run: all cells must carry the same value, the
/// same span, and consecutive indices starting at zero.
fn defragment(cells: &[MemVal]) -> Option<Value> {
    let (first, n) = match cells.first()? {
        MemVal::Frag(v, 0, n) if *n as usize == cells.len() => (v, *n),
        _ => return None,
    };
    for (i, c) in cells.iter().enumerate() {
        match c {
            MemVal::Frag(v, idx, span) if v == first && *idx as usize == i && *span == n => {}
            _ => return None,
        }
    }
    Some(*first)
}

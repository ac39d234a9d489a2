//! Programs, functions, and the global environment.
//!
//! A program is a set of named functions (internal ones with a body,
//! external ones with only a signature) plus global data and an entry
//! symbol. Loading a program allocates one memory block per function and
//! per global and produces the read-only [`GlobalEnv`] the interpreter
//! resolves symbols and code addresses through.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cpu::instr::{Instr, Label};
use crate::mem::{Memory, MemVal};
use crate::value::{Block, Value};

/// Value types in calling-convention signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Typ {
    Int,
    Float,
    Single,
}

/// A calling-convention signature: argument types and optional result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub args: Vec<Typ>,
    pub ret: Option<Typ>,
}

impl Signature {
    pub fn new(args: Vec<Typ>, ret: Option<Typ>) -> Self {
        Signature { args, ret }
    }

    /// The `() -> int` signature of an entry point.
    pub fn main() -> Self {
        Signature { args: vec![], ret: Some(Typ::Int) }
    }
}

/// An internal function: signature plus ordered instruction sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub sig: Signature,
    pub code: Vec<Instr>,
}

impl Function {
    pub fn new(sig: Signature, code: Vec<Instr>) -> Self {
        Function { sig, code }
    }

    /// The instruction at a code offset, if any.
    pub fn instr_at(&self, ofs: u32) -> Option<&Instr> {
        self.code.get(ofs as usize)
    }

    /// Resolve a label to the offset just past its marker, by forward
    /// scan. Duplicates are rejected when the program is validated, so
    /// the first hit is the only one.
    pub fn label_pos(&self, lbl: Label) -> Option<u32> {
        self.code
            .iter()
            .position(|i| i.is_label(lbl))
            .map(|pos| pos as u32 + 1)
    }

    /// Reject duplicate label markers.
    fn check_labels(&self, fname: &str) -> Result<(), ProgramError> {
        let mut seen = HashMap::new();
        for instr in &self.code {
            if let Instr::Label(l) = instr {
                if seen.insert(*l, ()).is_some() {
                    return Err(ProgramError::DuplicateLabel {
                        function: fname.to_string(),
                        label: *l,
                    });
                }
            }
        }
        Ok(())
    }
}

/// A named function, with or without a body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FunDef {
    Internal(Function),
    External { sig: Signature },
}

impl FunDef {
    pub fn sig(&self) -> &Signature {
        match self {
            FunDef::Internal(f) => &f.sig,
            FunDef::External { sig } => sig,
        }
    }
}

/// A global data block: `size` bytes, the first `data.len()` of them
/// initialized, the rest zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalDef {
    pub name: String,
    pub size: i64,
    #[serde(default)]
    pub data: Vec<u8>,
}

/// A whole program image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub functions: Vec<(String, FunDef)>,
    #[serde(default)]
    pub globals: Vec<GlobalDef>,
    pub entry: String,
}

impl Program {
    /// Build-time well-formedness: unique symbols, unique labels per
    /// function, globals no smaller than their initializers, and an
    /// entry symbol that exists.
    pub fn validate(&self) -> Result<(), ProgramError> {
        let mut symbols = HashMap::new();
        for (name, def) in &self.functions {
            if symbols.insert(name.clone(), ()).is_some() {
                return Err(ProgramError::DuplicateSymbol(name.clone()));
            }
            if let FunDef::Internal(f) = def {
                f.check_labels(name)?;
            }
        }
        for g in &self.globals {
            if symbols.insert(g.name.clone(), ()).is_some() {
                return Err(ProgramError::DuplicateSymbol(g.name.clone()));
            }
            if g.data.len() as i64 > g.size {
                return Err(ProgramError::OversizedInit {
                    global: g.name.clone(),
                    size: g.size,
                    init: g.data.len(),
                });
            }
        }
        if !symbols.contains_key(&self.entry) {
            return Err(ProgramError::UndefinedEntry(self.entry.clone()));
        }
        Ok(())
    }
}

/// Build-time program errors. Runtime faults never surface here; they
/// are stuck outcomes of the step relation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProgramError {
    #[error("duplicate label L{label} in function {function}")]
    DuplicateLabel { function: String, label: Label },

    #[error("duplicate symbol {0}")]
    DuplicateSymbol(String),

    #[error("global {global} declares {size} bytes but initializes {init}")]
    OversizedInit { global: String, size: i64, init: usize },

    #[error("entry symbol {0} is not defined")]
    UndefinedEntry(String),
}

/// The read-only view the interpreter resolves symbols through: symbol
/// to block, block to function definition.
#[derive(Debug, Clone)]
pub struct GlobalEnv {
    symbols: HashMap<String, Block>,
    funcs: HashMap<Block, (String, FunDef)>,
    entry: String,
}

impl GlobalEnv {
    /// The block bound to a symbol, if any.
    pub fn find_symbol(&self, id: &str) -> Option<Block> {
        self.symbols.get(id).copied()
    }

    /// The address of a symbol plus offset, `Undef` for an unbound
    /// symbol.
    pub fn symbol_address(&self, id: &str, ofs: i32) -> Value {
        match self.find_symbol(id) {
            Some(b) => Value::Ptr(b, ofs as u32),
            None => Value::Undef,
        }
    }

    /// The function whose code lives in a block.
    pub fn find_funct(&self, b: Block) -> Option<(&str, &FunDef)> {
        self.funcs.get(&b).map(|(name, def)| (name.as_str(), def))
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// All function symbols with their blocks, for display surfaces.
    pub fn functions(&self) -> impl Iterator<Item = (&str, Block, &FunDef)> {
        self.funcs
            .iter()
            .map(|(b, (name, def))| (name.as_str(), *b, def))
    }
}

/// Load a program image into memory: validate, then allocate one block
/// per function (code is not byte-addressable, the block only gives the
/// function an address) and one per global, storing initializers.
pub fn load_program<M: Memory>(prog: &Program, mut mem: M) -> Result<(GlobalEnv, M), ProgramError> {
    prog.validate()?;

    let mut symbols = HashMap::new();
    let mut funcs = HashMap::new();

    for (name, def) in &prog.functions {
        let b = mem.alloc(0, 1);
        symbols.insert(name.clone(), b);
        funcs.insert(b, (name.clone(), def.clone()));
    }

    for g in &prog.globals {
        let b = mem.alloc(0, g.size);
        let mut cells: Vec<MemVal> = g.data.iter().map(|&x| MemVal::Byte(x)).collect();
        cells.resize(g.size.max(0) as usize, MemVal::Byte(0));
        // A freshly allocated block is always writable over its bounds.
        let ok = mem.storebytes(b, 0, &cells);
        debug_assert!(ok);
        symbols.insert(g.name.clone(), b);
    }

    let ge = GlobalEnv { symbols, funcs, entry: prog.entry.clone() };
    Ok((ge, mem))
}

//! Program image files and disassembly.
//!
//! An image is a [`Program`] serialized as JSON:
//! - `functions`: named internal (with code) or external definitions
//! - `globals`: named data blocks with optional initializers
//! - `entry`: the start symbol
//!
//! The format is the serde encoding of the program type, so it evolves
//! with the instruction set and needs no separate parser.

use std::path::Path;

use thiserror::Error;

use crate::program::{FunDef, Function, Program, ProgramError};

/// Errors that can occur while reading or writing image files.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("malformed image: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    Invalid(#[from] ProgramError),
}

/// Load and validate a program image.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<Program, ImageError> {
    let text = std::fs::read_to_string(path.as_ref()).map_err(|e| ImageError::Io(e.to_string()))?;
    let prog: Program = serde_json::from_str(&text)?;
    prog.validate()?;
    Ok(prog)
}

/// Save a program image.
pub fn save_image<P: AsRef<Path>>(path: P, prog: &Program) -> Result<(), ImageError> {
    let text = serde_json::to_string_pretty(prog)?;
    std::fs::write(path.as_ref(), text).map_err(|e| ImageError::Io(e.to_string()))
}

/// Disassemble one function body, one line per instruction slot.
pub fn disassemble(f: &Function) -> String {
    let mut out = String::new();
    for (ofs, instr) in f.code.iter().enumerate() {
        out.push_str(&format!("{:4}  {}\n", ofs, instr));
    }
    out
}

/// Disassemble a whole program, functions in definition order.
pub fn disassemble_program(prog: &Program) -> String {
    let mut out = String::new();
    for (name, def) in &prog.functions {
        match def {
            FunDef::Internal(f) => {
                out.push_str(&format!("{}:\n", name));
                out.push_str(&disassemble(f));
                out.push('\n');
            }
            FunDef::External { .. } => {
                out.push_str(&format!("{}: <external>\n\n", name));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::instr::Instr;
    use crate::cpu::registers::IReg;
    use crate::program::{GlobalDef, Signature, Typ};

    fn sample_program() -> Program {
        Program {
            functions: vec![
                (
                    "main".to_string(),
                    FunDef::Internal(Function::new(
                        Signature::main(),
                        vec![Instr::MovRi(IReg::EAX, 0), Instr::Ret],
                    )),
                ),
                (
                    "putchar".to_string(),
                    FunDef::External { sig: Signature::new(vec![Typ::Int], Some(Typ::Int)) },
                ),
            ],
            globals: vec![GlobalDef { name: "buf".to_string(), size: 16, data: vec![1, 2] }],
            entry: "main".to_string(),
        }
    }

    #[test]
    fn test_image_roundtrip() {
        let dir = std::env::temp_dir().join("ia32-image-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("sample.json");

        let prog = sample_program();
        save_image(&path, &prog).unwrap();
        let back = load_image(&path).unwrap();
        assert_eq!(back, prog);
    }

    #[test]
    fn test_load_rejects_invalid_program() {
        let dir = std::env::temp_dir().join("ia32-image-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad-entry.json");

        let mut prog = sample_program();
        prog.entry = "nowhere".to_string();
        let text = serde_json::to_string(&prog).unwrap();
        std::fs::write(&path, text).unwrap();

        assert!(matches!(load_image(&path), Err(ImageError::Invalid(_))));
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = std::env::temp_dir().join("ia32-image-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("garbage.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_image(&path), Err(ImageError::Malformed(_))));
    }

    #[test]
    fn test_disassembly_lists_every_slot() {
        let prog = sample_program();
        let text = disassemble_program(&prog);
        assert!(text.contains("main:"));
        assert!(text.contains("0  mov eax, 0"));
        assert!(text.contains("1  ret"));
        assert!(text.contains("putchar: <external>"));
    }
}

//! # Meridian Script Compiler
//!
//! Compiles the line-oriented contract language into a structured
//! [`Program`]. The grammar is small enough to parse by hand:
//!
//! ```text
//! contract Counter
//!
//! fn constructor {
//!     set count 0
//! }
//!
//! fn inc {
//!     add count 1
//!     ret count
//! }
//! ```
//!
//! One `contract <Name>` header, then `fn <name> { … }` blocks whose
//! bodies are one instruction per line. Comments start with `#`.
//!
//! ## Instructions
//!
//! | Form                  | Effect                                          |
//! |-----------------------|-------------------------------------------------|
//! | `set <key> <value>`   | `storage[key] = value`                          |
//! | `copy <key> <idx>`    | `storage[key] = args[idx]`                      |
//! | `add <key> <delta>`   | integer add (negative delta subtracts; underflow reverts) |
//! | `del <key>`           | remove the slot                                 |
//! | `require <key> <value>`| revert unless `storage[key] == value`          |
//! | `ret <key>`           | return the slot's value                         |
//! | `fail <message…>`     | unconditional revert                            |
//!
//! The "bytecode" the ledger stores is the canonical JSON serialization
//! of the [`Program`] — opaque to the engine, self-describing for us.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use meridian_ledger::contracts::{CompiledContract, ContractCompiler};

/// Parse/compile failures, reported through `CompilationFailed`.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("missing `contract <Name>` header")]
    MissingHeader,

    #[error("line {line}: unknown instruction `{word}`")]
    UnknownInstruction { line: usize, word: String },

    #[error("line {line}: malformed `{instr}` (expected {expected})")]
    Malformed {
        line: usize,
        instr: String,
        expected: &'static str,
    },

    #[error("line {line}: statement outside a fn block")]
    OutsideFunction { line: usize },

    #[error("line {line}: unterminated fn block")]
    Unterminated { line: usize },

    #[error("duplicate function `{0}`")]
    DuplicateFunction(String),
}

/// One interpreted instruction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instr {
    Set { key: String, value: String },
    Copy { key: String, arg: usize },
    Add { key: String, delta: i64 },
    Del { key: String },
    Require { key: String, value: String },
    Ret { key: String },
    Fail { message: String },
}

/// A compiled contract: name plus function bodies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub name: String,
    pub functions: BTreeMap<String, Vec<Instr>>,
}

impl Program {
    /// Decode a program back out of stored bytecode.
    pub fn from_bytecode(bytecode: &[u8]) -> Option<Program> {
        serde_json::from_slice(bytecode).ok()
    }

    /// Serialize to the byte form the ledger persists.
    pub fn to_bytecode(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Compile source text into a [`Program`].
pub fn compile_source(source: &str) -> Result<Program, CompileError> {
    let mut name: Option<String> = None;
    let mut functions: BTreeMap<String, Vec<Instr>> = BTreeMap::new();
    let mut current: Option<(String, Vec<Instr>)> = None;
    let mut open_line = 0usize;

    for (idx, raw) in source.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut words = line.split_whitespace();
        let head = words.next().unwrap_or_default();

        match head {
            "contract" => {
                let contract_name = words.next().ok_or(CompileError::Malformed {
                    line: line_no,
                    instr: "contract".into(),
                    expected: "contract <Name>",
                })?;
                name = Some(contract_name.to_string());
            }
            "fn" => {
                if current.is_some() {
                    return Err(CompileError::Unterminated { line: open_line });
                }
                let fn_name = words.next().ok_or(CompileError::Malformed {
                    line: line_no,
                    instr: "fn".into(),
                    expected: "fn <name> {",
                })?;
                if functions.contains_key(fn_name) {
                    return Err(CompileError::DuplicateFunction(fn_name.to_string()));
                }
                current = Some((fn_name.to_string(), Vec::new()));
                open_line = line_no;
            }
            "}" => {
                let (fn_name, body) = current.take().ok_or(CompileError::OutsideFunction {
                    line: line_no,
                })?;
                functions.insert(fn_name, body);
            }
            _ => {
                let Some((_, body)) = current.as_mut() else {
                    return Err(CompileError::OutsideFunction { line: line_no });
                };
                body.push(parse_instruction(line_no, head, &mut words)?);
            }
        }
    }

    if let Some((_, _)) = current {
        return Err(CompileError::Unterminated { line: open_line });
    }
    let name = name.ok_or(CompileError::MissingHeader)?;
    Ok(Program { name, functions })
}

fn parse_instruction<'w>(
    line: usize,
    head: &str,
    words: &mut impl Iterator<Item = &'w str>,
) -> Result<Instr, CompileError> {
    let malformed = |instr: &str, expected: &'static str| CompileError::Malformed {
        line,
        instr: instr.to_string(),
        expected,
    };
    match head {
        "set" => {
            let key = words.next().ok_or_else(|| malformed("set", "set <key> <value>"))?;
            let value = words.next().ok_or_else(|| malformed("set", "set <key> <value>"))?;
            Ok(Instr::Set {
                key: key.to_string(),
                value: value.to_string(),
            })
        }
        "copy" => {
            let key = words.next().ok_or_else(|| malformed("copy", "copy <key> <argidx>"))?;
            let arg = words
                .next()
                .and_then(|w| w.parse().ok())
                .ok_or_else(|| malformed("copy", "copy <key> <argidx>"))?;
            Ok(Instr::Copy {
                key: key.to_string(),
                arg,
            })
        }
        "add" => {
            let key = words.next().ok_or_else(|| malformed("add", "add <key> <delta>"))?;
            let delta = words
                .next()
                .and_then(|w| w.parse().ok())
                .ok_or_else(|| malformed("add", "add <key> <delta>"))?;
            Ok(Instr::Add {
                key: key.to_string(),
                delta,
            })
        }
        "del" => {
            let key = words.next().ok_or_else(|| malformed("del", "del <key>"))?;
            Ok(Instr::Del {
                key: key.to_string(),
            })
        }
        "require" => {
            let key = words
                .next()
                .ok_or_else(|| malformed("require", "require <key> <value>"))?;
            let value = words
                .next()
                .ok_or_else(|| malformed("require", "require <key> <value>"))?;
            Ok(Instr::Require {
                key: key.to_string(),
                value: value.to_string(),
            })
        }
        "ret" => {
            let key = words.next().ok_or_else(|| malformed("ret", "ret <key>"))?;
            Ok(Instr::Ret {
                key: key.to_string(),
            })
        }
        "fail" => Ok(Instr::Fail {
            message: words.collect::<Vec<_>>().join(" "),
        }),
        other => Err(CompileError::UnknownInstruction {
            line,
            word: other.to_string(),
        }),
    }
}

// ---------------------------------------------------------------------------
// ContractCompiler impl
// ---------------------------------------------------------------------------

/// The compiler seam the ledger engine plugs in.
pub struct ScriptCompiler;

impl ContractCompiler for ScriptCompiler {
    fn compile(&self, source: &str) -> Result<CompiledContract, String> {
        let program = compile_source(source).map_err(|e| e.to_string())?;
        let abi = serde_json::json!({
            "name": program.name,
            "functions": program
                .functions
                .iter()
                .map(|(name, body)| serde_json::json!({
                    "name": name,
                    "instructions": body.len(),
                }))
                .collect::<Vec<_>>(),
        });
        Ok(CompiledContract {
            bytecode: program.to_bytecode(),
            abi,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const COUNTER: &str = r#"
contract Counter

# seeded by the constructor
fn constructor {
    set count 0
}

fn inc {
    add count 1
    ret count
}
"#;

    #[test]
    fn compiles_counter() {
        let program = compile_source(COUNTER).unwrap();
        assert_eq!(program.name, "Counter");
        assert_eq!(program.functions.len(), 2);
        assert_eq!(
            program.functions["inc"],
            vec![
                Instr::Add {
                    key: "count".into(),
                    delta: 1
                },
                Instr::Ret {
                    key: "count".into()
                },
            ]
        );
    }

    #[test]
    fn bytecode_roundtrip() {
        let program = compile_source(COUNTER).unwrap();
        let back = Program::from_bytecode(&program.to_bytecode()).unwrap();
        assert_eq!(program, back);
    }

    #[test]
    fn missing_header_is_rejected() {
        let err = compile_source("fn f {\n set a 1\n}").unwrap_err();
        assert!(matches!(err, CompileError::MissingHeader));
    }

    #[test]
    fn statement_outside_function_is_rejected() {
        let err = compile_source("contract C\nset a 1").unwrap_err();
        assert!(matches!(err, CompileError::OutsideFunction { line: 2 }));
    }

    #[test]
    fn unknown_instruction_is_rejected() {
        let err = compile_source("contract C\nfn f {\n frobnicate a\n}").unwrap_err();
        assert!(matches!(err, CompileError::UnknownInstruction { .. }));
    }

    #[test]
    fn unterminated_block_is_rejected() {
        let err = compile_source("contract C\nfn f {\n set a 1").unwrap_err();
        assert!(matches!(err, CompileError::Unterminated { line: 2 }));
    }

    #[test]
    fn duplicate_function_is_rejected() {
        let src = "contract C\nfn f {\n}\nfn f {\n}";
        assert!(matches!(
            compile_source(src).unwrap_err(),
            CompileError::DuplicateFunction(_)
        ));
    }

    #[test]
    fn compiler_trait_produces_abi() {
        let compiled = ScriptCompiler.compile(COUNTER).unwrap();
        assert!(!compiled.bytecode.is_empty());
        assert_eq!(compiled.abi["name"], "Counter");
        assert!(ScriptCompiler.compile("contract").is_err());
    }
}

//! # Metered Interpreter
//!
//! Executes compiled [`Program`]s against a contract storage map, under
//! the ledger's gas rules: a fixed base cost per invocation plus a fixed
//! cost per instruction. The interpreter never partially applies — it
//! works on a scratch copy of storage and only the ledger decides whether
//! the returned map is persisted.
//!
//! Failure cases all surface as `VmFailure`, which the commit pipeline
//! turns into a confirmed-but-`Failed` transaction with the full gas
//! limit charged: unknown function, malformed bytecode, `require`
//! violations, explicit `fail`, arithmetic underflow, missing arguments,
//! and running out of gas mid-body.

use serde_json::Value;
use tracing::trace;

use meridian_ledger::contracts::{ContractVm, VmContext, VmFailure, VmOutcome};
use meridian_ledger::state::ContractStorage;

use crate::compiler::{Instr, Program};

/// Flat cost charged for any invocation before the first instruction.
pub const BASE_CALL_GAS: u64 = 10;

fn instr_gas(instr: &Instr) -> u64 {
    match instr {
        Instr::Set { .. } | Instr::Copy { .. } => 5,
        Instr::Add { .. } => 3,
        Instr::Del { .. } | Instr::Require { .. } => 2,
        Instr::Ret { .. } => 1,
        Instr::Fail { .. } => 0,
    }
}

/// The VM seam the ledger engine plugs in.
pub struct ScriptVm;

impl ScriptVm {
    fn run(
        program: &Program,
        function: &str,
        args: &[Value],
        storage: &ContractStorage,
        ctx: &VmContext,
    ) -> Result<VmOutcome, VmFailure> {
        let body = program.functions.get(function).ok_or_else(|| VmFailure {
            message: format!("unknown function `{function}`"),
            gas_used: BASE_CALL_GAS.min(ctx.gas_limit),
        })?;

        let mut storage = storage.clone();
        let mut gas_used = BASE_CALL_GAS;
        let mut return_value = None;

        for instr in body {
            gas_used += instr_gas(instr);
            if gas_used > ctx.gas_limit {
                return Err(VmFailure {
                    message: format!("out of gas in `{function}`"),
                    gas_used: ctx.gas_limit,
                });
            }
            match instr {
                Instr::Set { key, value } => {
                    storage.insert(key.clone(), value.clone());
                }
                Instr::Copy { key, arg } => {
                    let value = args.get(*arg).ok_or_else(|| VmFailure {
                        message: format!("missing argument {arg} for `{function}`"),
                        gas_used,
                    })?;
                    storage.insert(key.clone(), stringify(value));
                }
                Instr::Add { key, delta } => {
                    let current: i128 = storage
                        .get(key)
                        .map(|v| v.parse().unwrap_or(0))
                        .unwrap_or(0);
                    let next = current + i128::from(*delta);
                    if next < 0 {
                        return Err(VmFailure {
                            message: format!("underflow on `{key}`"),
                            gas_used,
                        });
                    }
                    storage.insert(key.clone(), next.to_string());
                }
                Instr::Del { key } => {
                    storage.remove(key);
                }
                Instr::Require { key, value } => {
                    if storage.get(key) != Some(value) {
                        return Err(VmFailure {
                            message: format!("require failed on `{key}`"),
                            gas_used,
                        });
                    }
                }
                Instr::Ret { key } => {
                    return_value = storage.get(key).cloned().map(Value::String);
                }
                Instr::Fail { message } => {
                    return Err(VmFailure {
                        message: if message.is_empty() {
                            "explicit fail".to_string()
                        } else {
                            message.clone()
                        },
                        gas_used,
                    });
                }
            }
        }

        trace!(
            contract = %ctx.contract_address,
            function,
            gas_used,
            "script executed"
        );
        Ok(VmOutcome {
            storage,
            gas_used,
            return_value,
        })
    }
}

impl ContractVm for ScriptVm {
    fn execute(
        &self,
        bytecode: &[u8],
        function: &str,
        args: &[Value],
        storage: &ContractStorage,
        ctx: &VmContext,
    ) -> Result<VmOutcome, VmFailure> {
        let program = Program::from_bytecode(bytecode).ok_or_else(|| VmFailure {
            message: "malformed bytecode".to_string(),
            gas_used: ctx.gas_limit,
        })?;
        Self::run(&program, function, args, storage, ctx)
    }

    fn has_constructor(&self, bytecode: &[u8]) -> bool {
        Program::from_bytecode(bytecode)
            .map(|p| p.functions.contains_key("constructor"))
            .unwrap_or(false)
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

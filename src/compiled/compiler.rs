//! Compiler: Node DAG → register VM bytecode
//!
//! Schedules the DAG, checks the register budget and encodes the chosen
//! order. The compiler is all-or-nothing: either the whole program is
//! produced or an error is returned, never a partial schedule.
//!
//! Author: Moroya Sakamoto

use super::instruction::Instruction;
use super::node::{BuildError, NodeCache, NodeId};
use super::opcode::OpCode;
use super::program::{Program, MAX_REGISTERS};
use super::scheduler::{Schedule, Scheduler};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Error type for compilation failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    /// The DAG or shape could not be built.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// Even the best scheduling trial needs more registers than the VM has.
    #[error("program needs {needed} registers but the VM provides {budget}")]
    RegisterBudgetExceeded {
        /// Registers required by the best trial
        needed: usize,
        /// Configured register budget
        budget: usize,
    },

    /// The configured budget cannot be addressed by one-byte register fields.
    #[error("register budget {0} is outside 1..=256")]
    InvalidRegisterBudget(usize),
}

/// Compiler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileConfig {
    /// Number of shuffled trials on top of the identity and reversed ones
    pub random_passes: usize,
    /// Seed of the shuffled trials
    pub seed: u64,
    /// Register file size of the target VM
    pub max_registers: usize,
}

impl Default for CompileConfig {
    fn default() -> Self {
        CompileConfig {
            random_passes: 100,
            seed: 0x00C0_DECA_D5EE_D000,
            max_registers: 32,
        }
    }
}

impl CompileConfig {
    /// Config with the given register budget
    pub fn with_max_registers(mut self, max_registers: usize) -> Self {
        self.max_registers = max_registers;
        self
    }

    /// Config with the given number of shuffled trials
    pub fn with_random_passes(mut self, random_passes: usize) -> Self {
        self.random_passes = random_passes;
        self
    }
}

/// Compile the DAG rooted at `root`.
///
/// Registers chosen by the winning trial are written back into the cache
/// (visible through [`Node::register`](super::node::Node::register)).
#[instrument(skip_all, fields(nodes = cache.len()))]
pub fn compile(
    cache: &mut NodeCache,
    root: NodeId,
    config: &CompileConfig,
) -> Result<Program, CompileError> {
    if config.max_registers == 0 || config.max_registers > MAX_REGISTERS {
        return Err(CompileError::InvalidRegisterBudget(config.max_registers));
    }

    let schedule = Scheduler::new(cache, root)?.best(config.random_passes, config.seed);
    if schedule.registers_needed > config.max_registers {
        return Err(CompileError::RegisterBudgetExceeded {
            needed: schedule.registers_needed,
            budget: config.max_registers,
        });
    }

    let program = encode(cache, &schedule);
    for entry in &schedule.order {
        cache.set_register(entry.node, entry.register as u8);
    }
    debug!(
        registers = program.register_count(),
        bytes = program.bytecode().len(),
        "compiled program"
    );
    Ok(program)
}

/// Encode a schedule.
///
/// The leading evaluation point entry is implied by register 0 and not
/// emitted. The schedule must fit in [`MAX_REGISTERS`] registers.
pub fn encode(cache: &NodeCache, schedule: &Schedule) -> Program {
    let mut bytecode = Vec::new();
    for entry in schedule.order.iter().filter(|e| e.opcode != OpCode::Point) {
        let input = |i: usize| entry.inputs.get(i).map_or(0, |&r| r as u8);
        Instruction::new(
            entry.opcode,
            entry.register as u8,
            [input(0), input(1)],
            cache[entry.node].params().to_vec(),
        )
        .encode_into(&mut bytecode);
    }
    Instruction::ret(schedule.result_register() as u8).encode_into(&mut bytecode);
    Program::new_unchecked(schedule.registers_needed, bytecode)
}

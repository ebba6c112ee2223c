//! Compiled program: register count plus flat bytecode
//!
//! Author: Moroya Sakamoto

use super::instruction::{Instruction, InstructionWord, WORD_SIZE};
use super::opcode::{Arity, OpCode, ParamLayout};

/// Largest register count addressable by a one-byte register field
pub const MAX_REGISTERS: usize = 256;

/// Errors found while decoding bytecode
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProgramError {
    /// Length is not a whole number of 4-byte words
    #[error("bytecode length {0} is not a multiple of 4")]
    Misaligned(usize),

    /// Parameters run past the end of the buffer
    #[error("truncated instruction at byte {offset}")]
    Truncated {
        /// Byte offset of the instruction header
        offset: usize,
    },

    /// Code byte not present in the opcode registry
    #[error("unknown opcode {code} at byte {offset}")]
    UnknownOpcode {
        /// Offending code byte
        code: u8,
        /// Byte offset of the instruction header
        offset: usize,
    },

    /// The point pseudo-op is never encoded
    #[error("reserved opcode {opcode} at byte {offset}")]
    ReservedOpcode {
        /// Offending opcode
        opcode: OpCode,
        /// Byte offset of the instruction header
        offset: usize,
    },

    /// A register field outside `0..register_count`
    #[error("register {register} out of range for {register_count} registers at byte {offset}")]
    RegisterOutOfRange {
        /// Offending register
        register: u8,
        /// Register count of the program
        register_count: usize,
        /// Byte offset of the instruction header
        offset: usize,
    },

    /// Buffer ends without a RETURN
    #[error("program does not end with RETURN")]
    MissingReturn,

    /// Bytes follow the RETURN instruction
    #[error("unexpected bytes after RETURN at byte {offset}")]
    TrailingBytes {
        /// Byte offset just past the RETURN
        offset: usize,
    },

    /// Register count of 0 or above [`MAX_REGISTERS`]
    #[error("register count {0} is outside 1..=256")]
    InvalidRegisterCount(usize),
}

/// A compiled program for the register VM.
///
/// The only artifact that survives compilation: the node DAG is dropped
/// once the bytecode has been produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Program {
    register_count: usize,
    bytecode: Vec<u8>,
}

impl Program {
    pub(crate) fn new_unchecked(register_count: usize, bytecode: Vec<u8>) -> Self {
        Program {
            register_count,
            bytecode,
        }
    }

    /// Wrap externally produced bytecode, validating it fully
    pub fn from_bytes(register_count: usize, bytecode: Vec<u8>) -> Result<Self, ProgramError> {
        let program = Program {
            register_count,
            bytecode,
        };
        program.decode()?;
        Ok(program)
    }

    /// Number of registers the VM must provide
    #[inline]
    pub fn register_count(&self) -> usize {
        self.register_count
    }

    /// Raw bytecode
    #[inline]
    pub fn bytecode(&self) -> &[u8] {
        &self.bytecode
    }

    /// Bytecode as little-endian 32-bit words, the device buffer layout
    pub fn words(&self) -> Vec<u32> {
        self.bytecode
            .chunks_exact(WORD_SIZE)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    /// Decode the bytecode with the shared opcode registry.
    ///
    /// The returned list ends with the RETURN instruction.
    pub fn decode(&self) -> Result<Vec<Instruction>, ProgramError> {
        if self.register_count == 0 || self.register_count > MAX_REGISTERS {
            return Err(ProgramError::InvalidRegisterCount(self.register_count));
        }
        let bytes = &self.bytecode;
        if bytes.len() % WORD_SIZE != 0 {
            return Err(ProgramError::Misaligned(bytes.len()));
        }

        let mut out = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            let header = offset;
            let word: InstructionWord =
                bytemuck::pod_read_unaligned(&bytes[offset..offset + WORD_SIZE]);
            offset += WORD_SIZE;

            let opcode = OpCode::from_code(word.opcode).ok_or(ProgramError::UnknownOpcode {
                code: word.opcode,
                offset: header,
            })?;
            if opcode == OpCode::Point {
                return Err(ProgramError::ReservedOpcode {
                    opcode,
                    offset: header,
                });
            }

            let check = |register: u8| {
                if (register as usize) < self.register_count {
                    Ok(())
                } else {
                    Err(ProgramError::RegisterOutOfRange {
                        register,
                        register_count: self.register_count,
                        offset: header,
                    })
                }
            };
            check(word.input1)?;
            if opcode != OpCode::Return {
                check(word.output)?;
            }
            if matches!(opcode.arity(), Arity::Binary | Arity::Associative) {
                check(word.input2)?;
            }

            let count = match opcode.params() {
                ParamLayout::Fixed(n) => n,
                ParamLayout::Variadic => {
                    let prefix = read_word(bytes, offset).ok_or(ProgramError::Truncated {
                        offset: header,
                    })?;
                    offset += WORD_SIZE;
                    prefix as usize
                }
            };
            let end = count
                .checked_mul(WORD_SIZE)
                .and_then(|n| n.checked_add(offset))
                .filter(|&end| end <= bytes.len())
                .ok_or(ProgramError::Truncated { offset: header })?;
            let params = bytes[offset..end]
                .chunks_exact(WORD_SIZE)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect();
            offset = end;

            out.push(Instruction::new(
                opcode,
                word.output,
                [word.input1, word.input2],
                params,
            ));
            if opcode == OpCode::Return {
                if offset != bytes.len() {
                    return Err(ProgramError::TrailingBytes { offset });
                }
                return Ok(out);
            }
        }
        Err(ProgramError::MissingReturn)
    }

    /// Human readable listing, one instruction per line
    pub fn disassemble(&self) -> Result<String, ProgramError> {
        let mut text = String::new();
        for inst in self.decode()? {
            let line = match inst.opcode {
                OpCode::Return => format!("return r{}", inst.inputs[0]),
                op => match op.arity() {
                    Arity::Unary => format!(
                        "r{} = {}(r{}) {:?}",
                        inst.output, op, inst.inputs[0], inst.params
                    ),
                    _ => format!(
                        "r{} = {}(r{}, r{}) {:?}",
                        inst.output, op, inst.inputs[0], inst.inputs[1], inst.params
                    ),
                },
            };
            text.push_str(&line);
            text.push('\n');
        }
        Ok(text)
    }
}

fn read_word(bytes: &[u8], offset: usize) -> Option<u32> {
    let c = bytes.get(offset..offset + WORD_SIZE)?;
    Some(u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
}

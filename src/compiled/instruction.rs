//! Instruction wire format
//!
//! ```text
//! ┌────────┬────────┬────────┬────────┐
//! │ opcode │ output │ input1 │ input2 │   4 bytes
//! ├────────┴────────┴────────┴────────┤
//! │ param[0]: f32 (little endian)     │   4 bytes each
//! │ ...                               │
//! └───────────────────────────────────┘
//! ```
//!
//! Variadic opcodes put a little-endian u32 word count in front of their
//! parameters. Unused input fields are 0. RETURN is `{0, 0, result, 0}`
//! and carries no parameters.
//!
//! Author: Moroya Sakamoto

use super::opcode::{OpCode, ParamLayout};
use bytemuck::{Pod, Zeroable};

/// Size in bytes of one instruction word and of one parameter word
pub const WORD_SIZE: usize = 4;

/// The 4-byte instruction header
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(C)]
pub struct InstructionWord {
    /// Opcode code byte
    pub opcode: u8,
    /// Output register
    pub output: u8,
    /// First input register
    pub input1: u8,
    /// Second input register (0 if unused)
    pub input2: u8,
}

/// A decoded instruction: header plus parameters
#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    /// Operation code
    pub opcode: OpCode,
    /// Output register
    pub output: u8,
    /// Input registers (0 if unused)
    pub inputs: [u8; 2],
    /// Parameter words
    pub params: Vec<f32>,
}

impl Instruction {
    /// Create an instruction
    #[inline]
    pub fn new(opcode: OpCode, output: u8, inputs: [u8; 2], params: Vec<f32>) -> Self {
        Instruction {
            opcode,
            output,
            inputs,
            params,
        }
    }

    /// RETURN of `register`
    #[inline]
    pub fn ret(register: u8) -> Self {
        Self::new(OpCode::Return, 0, [register, 0], Vec::new())
    }

    /// Header word
    #[inline]
    pub fn word(&self) -> InstructionWord {
        InstructionWord {
            opcode: self.opcode.code(),
            output: self.output,
            input1: self.inputs[0],
            input2: self.inputs[1],
        }
    }

    /// Append the encoded form to `out`
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(bytemuck::bytes_of(&self.word()));
        if self.opcode.params() == ParamLayout::Variadic {
            out.extend_from_slice(&(self.params.len() as u32).to_le_bytes());
        }
        for p in &self.params {
            out.extend_from_slice(&p.to_le_bytes());
        }
    }

    /// Encoded size in bytes
    pub fn encoded_len(&self) -> usize {
        let prefix = usize::from(self.opcode.params() == ParamLayout::Variadic);
        (1 + prefix + self.params.len()) * WORD_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_is_four_bytes() {
        assert_eq!(std::mem::size_of::<InstructionWord>(), WORD_SIZE);
    }

    #[test]
    fn test_header_byte_order() {
        let inst = Instruction::new(OpCode::Union, 3, [1, 2], vec![-1.0]);
        let mut bytes = Vec::new();
        inst.encode_into(&mut bytes);
        assert_eq!(&bytes[..4], &[OpCode::Union.code(), 3, 1, 2]);
        assert_eq!(&bytes[4..], &(-1.0f32).to_le_bytes());
        assert_eq!(bytes.len(), inst.encoded_len());
    }

    #[test]
    fn test_variadic_length_prefix() {
        let inst = Instruction::new(OpCode::Polygon2d, 1, [0, 0], vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0]);
        let mut bytes = Vec::new();
        inst.encode_into(&mut bytes);
        assert_eq!(bytes.len(), 4 + 4 + 6 * 4);
        assert_eq!(&bytes[4..8], &6u32.to_le_bytes());
    }

    #[test]
    fn test_return_layout() {
        let mut bytes = Vec::new();
        Instruction::ret(5).encode_into(&mut bytes);
        assert_eq!(bytes, vec![0, 0, 5, 0]);
    }
}

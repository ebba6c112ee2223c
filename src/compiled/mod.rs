//! Compiled shapes: Node DAG → register VM bytecode
//!
//! Shapes are lowered into a deduplicated node DAG, scheduled into a
//! linear order with few live values, assigned registers and encoded as
//! flat bytecode for a small register VM that runs once per sample point.
//!
//! # Pipeline
//!
//! ```text
//! Shape ──lower──▶ NodeCache (CSE) ──Scheduler──▶ Schedule ──encode──▶ Program
//!                                   (trials +     (order +             (bytes +
//!                                    RegisterAllocator) registers)      register count)
//! ```
//!
//! # Usage
//!
//! ```rust
//! use alice_csg::prelude::*;
//!
//! let shape = Shape::box3d(2.0, 2.0, 2.0).union(Shape::sphere(0.5)).unwrap();
//! let program = shape.compile(&CompileConfig::default()).unwrap();
//!
//! let vm = Vm::load(&program).unwrap();
//! let d = vm.distance(glam::Vec3::new(0.8, 0.0, 0.0));
//! assert!((d + 0.2).abs() < 1e-5);
//! ```
//!
//! ## Instruction Format
//!
//! ```text
//! ┌────────┬────────┬────────┬────────┐
//! │ opcode │ output │ input1 │ input2 │  then param words (f32, LE)
//! └────────┴────────┴────────┴────────┘
//! ```
//!
//! Register 0 holds the evaluation point when the program starts. The
//! program ends at RETURN, whose `input1` names the result register.
//!
//! Author: Moroya Sakamoto

mod compiler;
mod eval;
mod instruction;
mod node;
mod opcode;
mod program;
mod regalloc;
mod scheduler;
pub mod wgsl;

pub use compiler::{compile, encode, CompileConfig, CompileError};
pub use eval::Vm;
pub use instruction::{Instruction, InstructionWord, WORD_SIZE};
pub use node::{BuildError, Node, NodeCache, NodeExtra, NodeId};
pub use opcode::{Arity, OpCode, ParamLayout};
pub use program::{Program, ProgramError, MAX_REGISTERS};
pub use regalloc::RegisterAllocator;
pub use scheduler::{Schedule, ScheduledNode, Scheduler, TrialOrder};
pub use wgsl::WgslDispatch;

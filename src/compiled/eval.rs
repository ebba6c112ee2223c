//! Register VM: CPU reference implementation of the execution contract
//!
//! Bytecode is decoded and validated once when the VM is loaded. The hot
//! loop then runs without any checks: it reads input registers, calls the
//! opcode's kernel and writes the output register until RETURN.
//!
//! # Deep Fried Optimizations
//! - **Pre-resolved Kernels**: Opcode dispatch is resolved to function
//!   pointers at load time.
//! - **Flat Parameter Pool**: All parameters live in one contiguous slice.
//! - **Register File Reuse**: Batch evaluation keeps one register file per
//!   rayon worker via `map_init`.
//!
//! Author: Moroya Sakamoto

use super::opcode::OpCode;
use super::program::{Program, ProgramError};
use crate::kernels::{point_value, Kernel};
use glam::{Vec3, Vec4};
use rayon::prelude::*;
use std::ops::Range;

#[derive(Clone)]
struct Step {
    kernel: Kernel,
    output: usize,
    input1: usize,
    input2: usize,
    params: Range<usize>,
}

/// A program loaded for evaluation
#[derive(Clone)]
pub struct Vm {
    steps: Vec<Step>,
    params: Vec<f32>,
    register_count: usize,
    result: usize,
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("steps", &self.steps.len())
            .field("params", &self.params.len())
            .field("register_count", &self.register_count)
            .field("result", &self.result)
            .finish()
    }
}

impl Vm {
    /// Decode `program` and resolve its kernels
    pub fn load(program: &Program) -> Result<Self, ProgramError> {
        let mut steps = Vec::new();
        let mut params = Vec::new();
        let mut result = 0;
        for inst in program.decode()? {
            if inst.opcode == OpCode::Return {
                result = inst.inputs[0] as usize;
                break;
            }
            // decode() already rejected Point; every other code has a kernel
            let Some(kernel) = inst.opcode.kernel() else {
                continue;
            };
            let start = params.len();
            params.extend_from_slice(&inst.params);
            steps.push(Step {
                kernel,
                output: inst.output as usize,
                input1: inst.inputs[0] as usize,
                input2: inst.inputs[1] as usize,
                params: start..params.len(),
            });
        }
        Ok(Vm {
            steps,
            params,
            register_count: program.register_count(),
            result,
        })
    }

    /// Size of the register file
    #[inline]
    pub fn register_count(&self) -> usize {
        self.register_count
    }

    /// A zeroed register file of the right size
    pub fn register_file(&self) -> Vec<Vec4> {
        vec![Vec4::ZERO; self.register_count]
    }

    /// Evaluate at one point using caller-provided registers.
    ///
    /// `registers` must hold at least [`register_count`](Self::register_count)
    /// values; their previous contents are ignored.
    #[inline]
    pub fn eval_with(&self, point: Vec3, registers: &mut [Vec4]) -> Vec4 {
        registers[0] = point_value(point);
        for step in &self.steps {
            let a = registers[step.input1];
            let b = registers[step.input2];
            registers[step.output] = (step.kernel)(&self.params[step.params.clone()], a, b, point);
        }
        registers[self.result]
    }

    /// Gradient and distance at one point (`xyz` gradient, `w` distance)
    pub fn eval(&self, point: Vec3) -> Vec4 {
        let mut registers = self.register_file();
        self.eval_with(point, &mut registers)
    }

    /// Signed distance at one point
    #[inline]
    pub fn distance(&self, point: Vec3) -> f32 {
        self.eval(point).w
    }

    /// Evaluate many points (single-threaded)
    pub fn eval_batch(&self, points: &[Vec3]) -> Vec<Vec4> {
        let mut registers = self.register_file();
        points
            .iter()
            .map(|&p| self.eval_with(p, &mut registers))
            .collect()
    }

    /// Evaluate many points in parallel
    pub fn eval_batch_parallel(&self, points: &[Vec3]) -> Vec<Vec4> {
        points
            .par_iter()
            .map_init(|| self.register_file(), |registers, &p| self.eval_with(p, registers))
            .collect()
    }

    /// Distances on a regular lattice, X-major (`x + y*nx + z*nx*ny`).
    ///
    /// Sample `(x, y, z)` sits at `origin + (x, y, z) * spacing`. Z slices
    /// are evaluated in parallel.
    pub fn eval_lattice(&self, origin: Vec3, spacing: f32, dims: [usize; 3]) -> Vec<f32> {
        let [nx, ny, nz] = dims;
        let mut buffer = vec![0.0f32; nx * ny * nz];
        if buffer.is_empty() {
            return buffer;
        }
        buffer
            .par_chunks_mut(nx * ny)
            .enumerate()
            .for_each_init(
                || self.register_file(),
                |registers, (z, slice)| {
                    let z_pos = origin.z + z as f32 * spacing;
                    for y in 0..ny {
                        let y_pos = origin.y + y as f32 * spacing;
                        let row = y * nx;
                        for x in 0..nx {
                            let p = Vec3::new(origin.x + x as f32 * spacing, y_pos, z_pos);
                            slice[row + x] = self.eval_with(p, registers).w;
                        }
                    }
                },
            );
        buffer
    }
}

//! CPU reference device
//!
//! Runs the lattice kernels of the subdivision engine on the rayon pool and
//! hands back completion handles, the same shape of API a compute device
//! has: submit, do host work, then wait for the read-back.
//!
//! A kernel that panics is reported as [`DeviceError::KernelAssertion`] when
//! its handle is waited on; it never unwinds into the host.
//!
//! Author: Moroya Sakamoto

use crate::compiled::{Program, ProgramError, Vm};
use crate::exec::Completion;
use crate::subdivision::LeafBlock;
use futures_channel::oneshot;
use glam::{DVec3, UVec3, Vec3};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

/// Largest lattice edge a single submission may use
pub const MAX_LATTICE_SIZE: u32 = 256;

/// Largest lattice a single submission may cover
pub const MAX_LATTICE_CELLS: u64 = (MAX_LATTICE_SIZE as u64).pow(3);

/// Device / runtime errors, surfaced when a completion handle is waited on
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    /// A kernel hit an assertion (panicked) while running
    #[error("Kernel assertion failed: {0}")]
    KernelAssertion(String),

    /// The device dropped the work before reporting a result
    #[error("Device work was dropped before completion")]
    Disconnected,

    /// The submission was refused before it reached the device
    #[error("Submission rejected: {0}")]
    Rejected(String),
}

/// Completion handle for work submitted to a [`CpuDevice`]
#[derive(Debug)]
pub struct Pending<T> {
    receiver: oneshot::Receiver<Result<T, DeviceError>>,
}

impl<T> Completion for Pending<T> {
    type Output = T;

    fn wait(self) -> Result<T, DeviceError> {
        pollster::block_on(self.receiver).map_err(|_| DeviceError::Disconnected)?
    }
}

/// One classification pass over a block's cells
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellQuery {
    /// Centre of cell (0, 0, 0)
    pub first_centre: Vec3,
    /// Cell edge length
    pub step: f32,
    /// Cells per axis
    pub dims: UVec3,
    /// Cells with `|d| < threshold` are reported as intersecting
    pub threshold: f32,
    /// Report the packed index and sign of every uniform cell
    pub record_uniform: bool,
}

/// Read-back of [`CpuDevice::classify_cells`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellReport {
    /// Packed indices (`i + nx * (j + ny * k)`) of intersecting cells
    pub intersecting: Vec<u32>,
    /// Uniform cells whose centre is inside the shape
    pub inside_count: u64,
    /// Sum of those cells' centres
    pub inside_centre_sum: DVec3,
    /// Sum of squared centre coordinates `(x², y², z²)`
    pub inside_square_sum: DVec3,
    /// Sum of centre coordinate products `(xy, xz, yz)`
    pub inside_product_sum: DVec3,
    /// `(packed index, inside)` for every uniform cell, if requested
    pub uniform: Vec<(u32, bool)>,
}

impl CellReport {
    /// Integrals over the inside cells, each cell being a cube of edge
    /// `step` centred on its sample (a square in the XY plane when
    /// `planar`).
    ///
    /// Per cell: `∫x = s^n * c`, `∫x² = s^n * (c² + s²/12)` and
    /// `∫xy = s^n * cx * cy`.
    pub fn inside_integrals(&self, step: f64, planar: bool) -> InsideIntegrals {
        let (measure, spread) = if planar {
            (step * step, DVec3::new(1.0, 1.0, 0.0))
        } else {
            (step * step * step, DVec3::ONE)
        };
        let n = self.inside_count as f64;
        InsideIntegrals {
            volume: n * measure,
            moment: self.inside_centre_sum * measure,
            second_moment: (self.inside_square_sum + spread * (n * step * step / 12.0)) * measure,
            product_moment: self.inside_product_sum * measure,
        }
    }
}

/// Integrals of `1`, `x`, `x²` and `xy` over a region of uniform density
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InsideIntegrals {
    /// `∫ 1` (area for planar regions)
    pub volume: f64,
    /// `(∫x, ∫y, ∫z)`
    pub moment: DVec3,
    /// `(∫x², ∫y², ∫z²)`
    pub second_moment: DVec3,
    /// `(∫xy, ∫xz, ∫yz)`
    pub product_moment: DVec3,
}

impl std::ops::AddAssign for InsideIntegrals {
    fn add_assign(&mut self, other: InsideIntegrals) {
        self.volume += other.volume;
        self.moment += other.moment;
        self.second_moment += other.second_moment;
        self.product_moment += other.product_moment;
    }
}

/// Split a packed cell index into lattice coordinates
#[inline]
pub fn unpack_index(index: u32, dims: UVec3) -> UVec3 {
    let plane = dims.x * dims.y;
    UVec3::new(index % dims.x, (index % plane) / dims.x, index / plane)
}

/// Lattice kernels over one loaded program
#[derive(Debug, Clone)]
pub struct CpuDevice {
    vm: Arc<Vm>,
}

impl CpuDevice {
    /// Load `program` onto the device
    pub fn new(program: &Program) -> Result<Self, ProgramError> {
        Ok(CpuDevice {
            vm: Arc::new(Vm::load(program)?),
        })
    }

    /// The loaded VM
    #[inline]
    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    /// Run `kernel` on the pool and return its completion handle
    pub fn submit<T, F>(&self, kernel: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&Vm) -> T + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let vm = Arc::clone(&self.vm);
        rayon::spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| kernel(&vm)))
                .map_err(|payload| DeviceError::KernelAssertion(panic_message(payload.as_ref())));
            // The host may have stopped waiting; nothing to report to then
            let _ = sender.send(result);
        });
        Pending { receiver }
    }

    /// Sample every cell centre of a block and split the cells into
    /// intersecting and uniform
    pub fn classify_cells(&self, query: CellQuery) -> Result<Pending<CellReport>, DeviceError> {
        let cells = u64::from(query.dims.x) * u64::from(query.dims.y) * u64::from(query.dims.z);
        if cells == 0 || cells > MAX_LATTICE_CELLS {
            return Err(DeviceError::Rejected(format!(
                "lattice {:?} has {} cells",
                query.dims, cells
            )));
        }
        if !(query.step > 0.0 && query.step.is_finite()) {
            return Err(DeviceError::Rejected(format!("cell step {}", query.step)));
        }
        trace!(dims = ?query.dims, step = query.step, "classify_cells");

        Ok(self.submit(move |vm| {
            let dims = [
                query.dims.x as usize,
                query.dims.y as usize,
                query.dims.z as usize,
            ];
            let distances = vm.eval_lattice(query.first_centre, query.step, dims);
            let mut report = CellReport::default();
            let origin = query.first_centre.as_dvec3();
            let step = f64::from(query.step);
            for (index, &d) in distances.iter().enumerate() {
                let index = index as u32;
                if d.abs() < query.threshold {
                    report.intersecting.push(index);
                    continue;
                }
                let inside = d < 0.0;
                if inside {
                    let c = origin + unpack_index(index, query.dims).as_dvec3() * step;
                    report.inside_count += 1;
                    report.inside_centre_sum += c;
                    report.inside_square_sum += c * c;
                    report.inside_product_sum += DVec3::new(c.x * c.y, c.x * c.z, c.y * c.z);
                }
                if query.record_uniform {
                    report.uniform.push((index, inside));
                }
            }
            report
        }))
    }

    /// Evaluate a leaf block's full sample lattice (X-major)
    pub fn sample_block(&self, block: &LeafBlock) -> Pending<Vec<f32>> {
        let LeafBlock {
            corner,
            spacing,
            lattice,
            ..
        } = *block;
        self.submit(move |vm| {
            vm.eval_lattice(
                corner,
                spacing,
                [lattice.x as usize, lattice.y as usize, lattice.z as usize],
            )
        })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "kernel panicked".to_string()
    }
}

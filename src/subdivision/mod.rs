//! Adaptive subdivision (Deep Fried Edition)
//!
//! Finds the finest-resolution blocks of a shape's bounding box that need
//! full evaluation. Every other region is proven uniform (entirely inside or
//! entirely outside) at a coarser level and skipped.
//!
//! # Level hierarchy
//!
//! All sizes are integers in units of the target resolution. The finest
//! (leaf) level has cell size 1; each coarser level's cell is one block of
//! the level below:
//!
//! ```text
//! cell[0] = 1
//! cell[1] = lattice - 1     (lattice when edge overlap is off)
//! cell[k] = cell[k-1] * lattice
//! ```
//!
//! With edge overlap a leaf block samples `lattice` points per axis but owns
//! only `lattice - 1` cells, so neighbouring leaf blocks share their edge
//! sample row and the finest sample lattices line up without gaps. The top
//! level uses just enough cells to cover the box.
//!
//! Planar (2D) shapes are subdivided in the z = 0 plane: the grid is
//! flattened and every lattice is one layer deep.
//!
//! # Cell test
//!
//! A cell of edge `s` is sampled at its centre. If `|d| >= s * sqrt(n) / 2`
//! (`n` the shape's dimension) the surface cannot pass through the cell and
//! it is uniform; otherwise the cell is intersecting and is subdivided at the
//! next level (or emitted as a leaf block when the next level is the
//! finest).
//!
//! # Deep Fried Optimizations
//! - **Two Lanes**: Blocks of one level are classified through the
//!   interleaved executor, so one lane's read-back is processed while the
//!   other lane's block is still on the device.
//! - **Integer Positions**: Block positions are `U64Vec3` grid units, so
//!   sibling blocks never drift apart through float accumulation.
//!
//! Author: Moroya Sakamoto

mod lane;

use crate::compiled::{CompileConfig, CompileError, Program, ProgramError};
use crate::device::{CpuDevice, DeviceError, InsideIntegrals, MAX_LATTICE_SIZE};
use crate::exec::interleave;
use crate::shape::Shape;
use crate::types::Aabb;
use glam::{U64Vec3, UVec3, Vec3};
use lane::{BlockJob, LevelPlan, SubdivisionLane};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};

/// Error type for subdivision
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubdivisionError {
    /// Inputs that would overflow or divide by zero; raised before any
    /// device work
    #[error("Subdivision precondition violated: {0}")]
    Precondition(String),

    /// Shape could not be compiled
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Program could not be loaded onto the device
    #[error(transparent)]
    Program(#[from] ProgramError),

    /// Device work failed
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Subdivision configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubdivisionConfig {
    /// Edge length of a finest-level cell
    pub resolution: f32,
    /// Samples per axis of one block
    pub lattice_size: u32,
    /// Share the edge sample row between neighbouring leaf blocks
    pub overlap_edge_samples: bool,
    /// The top level's lattice is rounded up to a multiple of this
    pub level_size_multiplier: u32,
    /// Keep every uniform cell in the output
    pub record_uniform_cells: bool,
    /// Compiler settings used by [`subdivide_shape`]
    pub compile: CompileConfig,
}

impl Default for SubdivisionConfig {
    fn default() -> Self {
        SubdivisionConfig {
            resolution: 0.05,
            lattice_size: 128,
            overlap_edge_samples: true,
            level_size_multiplier: 1,
            record_uniform_cells: false,
            compile: CompileConfig::default(),
        }
    }
}

impl SubdivisionConfig {
    /// Default config at `resolution`
    pub fn with_resolution(resolution: f32) -> Self {
        SubdivisionConfig {
            resolution,
            ..Default::default()
        }
    }

    /// Config with the given block lattice size
    pub fn with_lattice_size(mut self, lattice_size: u32) -> Self {
        self.lattice_size = lattice_size;
        self
    }

    /// Check the index-overflow and divisibility preconditions
    pub fn validate(&self) -> Result<(), SubdivisionError> {
        if !(self.resolution > 0.0 && self.resolution.is_finite()) {
            return Err(precondition(format!(
                "resolution must be positive and finite, got {}",
                self.resolution
            )));
        }
        if self.lattice_size <= 1 {
            return Err(precondition(format!(
                "lattice_size must be greater than 1, got {}",
                self.lattice_size
            )));
        }
        if self.lattice_size > MAX_LATTICE_SIZE {
            return Err(precondition(format!(
                "lattice_size must not exceed {}, got {}",
                MAX_LATTICE_SIZE, self.lattice_size
            )));
        }
        if self.level_size_multiplier == 0 || self.lattice_size % self.level_size_multiplier != 0 {
            return Err(precondition(format!(
                "lattice_size {} is not a multiple of level_size_multiplier {}",
                self.lattice_size, self.level_size_multiplier
            )));
        }
        Ok(())
    }
}

#[inline]
fn precondition(message: String) -> SubdivisionError {
    SubdivisionError::Precondition(message)
}

fn check_dimension(dimension: u8) -> Result<(), SubdivisionError> {
    match dimension {
        2 | 3 => Ok(()),
        other => Err(precondition(format!("dimension must be 2 or 3, got {}", other))),
    }
}

/// Lattice of every block below the top level
#[inline]
fn block_lattice(lattice_size: u32, dimension: u8) -> UVec3 {
    if dimension == 2 {
        UVec3::new(lattice_size, lattice_size, 1)
    } else {
        UVec3::splat(lattice_size)
    }
}

/// Bounds grown by half a cell; planar bounds are flattened onto z = 0
fn grid_bounds(bounds: &Aabb, resolution: f32, dimension: u8) -> Aabb {
    let mut grid = bounds.expanded(resolution * 0.5);
    if dimension == 2 {
        grid.min.z = 0.0;
        grid.max.z = 0.0;
    }
    grid
}

/// One level of the hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSize {
    /// Cell edge in resolution units
    pub cell_size: u64,
    /// Cells (leaf level: samples) per axis of one block
    pub lattice: UVec3,
}

/// Finest-level block that needs full evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LeafBlock {
    /// Position of sample (0, 0, 0)
    pub corner: Vec3,
    /// Sample spacing (the resolution)
    pub spacing: f32,
    /// Samples per axis
    pub lattice: UVec3,
    /// The last sample row is shared with the neighbouring block
    pub overlap: bool,
    /// One sample layer in the z = 0 plane
    pub planar: bool,
}

impl LeafBlock {
    /// Cells this block owns per axis
    #[inline]
    pub fn owned_cells(&self) -> UVec3 {
        if self.overlap {
            self.lattice.saturating_sub(UVec3::ONE).max(UVec3::ONE)
        } else {
            self.lattice
        }
    }

    /// Region this block owns, excluding a shared edge row (flat in Z
    /// for planar blocks)
    pub fn extent(&self) -> Aabb {
        let mut size = self.owned_cells().as_vec3() * self.spacing;
        if self.planar {
            size.z = 0.0;
        }
        Aabb::new(self.corner, self.corner + size)
    }

    /// Position of sample `(i, j, k)`
    #[inline]
    pub fn sample_position(&self, index: UVec3) -> Vec3 {
        self.corner + index.as_vec3() * self.spacing
    }
}

/// Cell proven uniform at some level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UniformBlock {
    /// Minimum corner
    pub corner: Vec3,
    /// Edge length
    pub size: f32,
    /// Inside the shape (otherwise outside)
    pub inside: bool,
    /// Square in the z = 0 plane rather than a cube
    pub planar: bool,
}

impl UniformBlock {
    /// Region covered by the cell
    pub fn extent(&self) -> Aabb {
        let depth = if self.planar { 0.0 } else { self.size };
        Aabb::new(
            self.corner,
            self.corner + Vec3::new(self.size, self.size, depth),
        )
    }
}

/// Counters of one subdivision run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubdivisionStats {
    /// Blocks classified on the device
    pub dispatches: usize,
    /// Cells classified over all dispatches
    pub cells_classified: u64,
    /// Largest number of dispatches in flight at once
    pub max_in_flight: usize,
}

/// Result of [`subdivide`]
#[derive(Debug, Clone, Default)]
pub struct Subdivision {
    /// Dimension of the subdivided shape (2 or 3)
    pub dimension: u8,
    /// Level hierarchy, coarsest first
    pub levels: Vec<LevelSize>,
    /// Finest-level blocks, sorted by corner (z, then y, then x)
    pub leaf_blocks: Vec<LeafBlock>,
    /// Uniform cells (only with `record_uniform_cells`)
    pub uniform_blocks: Vec<UniformBlock>,
    /// Integrals over the uniform cells classified inside (areas for
    /// planar shapes)
    pub inside: InsideIntegrals,
    /// Run counters
    pub stats: SubdivisionStats,
}

impl Subdivision {
    /// Region covered by the top level, starting at the grid origin
    pub fn coverage(&self, bounds: &Aabb, resolution: f32) -> Aabb {
        let origin = grid_bounds(bounds, resolution, self.dimension).min;
        let mut span = match self.levels.first() {
            Some(top) if self.levels.len() > 1 => {
                top.lattice.as_vec3() * (top.cell_size as f32 * resolution)
            }
            Some(_) => self
                .leaf_blocks
                .first()
                .map_or(Vec3::ZERO, |leaf| leaf.extent().size()),
            None => Vec3::ZERO,
        };
        if self.dimension == 2 {
            span.z = 0.0;
        }
        Aabb::new(origin, origin + span)
    }
}

/// Grid extent of the (half-cell expanded) bounds in resolution units
fn grid_extent(
    bounds: &Aabb,
    resolution: f32,
    dimension: u8,
) -> Result<U64Vec3, SubdivisionError> {
    if !bounds.is_valid() {
        return Err(precondition(format!("invalid bounds {:?}", bounds)));
    }
    let size = grid_bounds(bounds, resolution, dimension).size().as_dvec3()
        / f64::from(resolution);
    let cells = size.ceil();
    // Exact integers in f64 stop at 2^53
    if cells.max_element() >= (1u64 << 53) as f64 {
        return Err(precondition(format!(
            "resolution {} is too fine for bounds of size {:?}",
            resolution,
            bounds.size()
        )));
    }
    Ok(cells.as_u64vec3().max(U64Vec3::ONE))
}

#[inline]
fn round_up(value: u64, multiple: u64) -> u64 {
    value.div_ceil(multiple) * multiple
}

/// Level hierarchy for `bounds` of a `dimension`-D shape, coarsest level
/// first
pub fn level_sizes(
    bounds: &Aabb,
    dimension: u8,
    config: &SubdivisionConfig,
) -> Result<Vec<LevelSize>, SubdivisionError> {
    config.validate()?;
    check_dimension(dimension)?;
    let extent = grid_extent(bounds, config.resolution, dimension)?;
    let max_extent = extent.max_element();
    let lattice = u64::from(config.lattice_size);
    let block = block_lattice(config.lattice_size, dimension);

    let mut levels = Vec::new();
    let mut cell: u64 = 1;
    let mut delta;
    loop {
        levels.push(LevelSize {
            cell_size: cell,
            lattice: block,
        });
        delta = u64::from(config.overlap_edge_samples && levels.len() == 1);
        let next = cell.checked_mul(lattice - delta).ok_or_else(|| {
            precondition(format!(
                "level cell size overflows at resolution {}",
                config.resolution
            ))
        })?;
        if next >= max_extent {
            break;
        }
        cell = next;
    }

    let multiple = u64::from(config.level_size_multiplier);
    let top_axis = |axis: u64, limit: u32| -> u32 {
        let cells = round_up(axis.div_ceil(cell) + delta, multiple);
        cells.clamp(1, u64::from(limit)) as u32
    };
    if let Some(top) = levels.last_mut() {
        top.lattice = UVec3::new(
            top_axis(extent.x, block.x),
            top_axis(extent.y, block.y),
            top_axis(extent.z, block.z),
        );
    }
    levels.reverse();
    Ok(levels)
}

/// Subdivide `bounds` for a compiled program of a `dimension`-D shape
pub fn subdivide(
    program: &Program,
    bounds: &Aabb,
    dimension: u8,
    config: &SubdivisionConfig,
) -> Result<Subdivision, SubdivisionError> {
    config.validate()?;
    check_dimension(dimension)?;
    grid_extent(bounds, config.resolution, dimension)?;
    let device = CpuDevice::new(program)?;
    subdivide_on(&device, bounds, dimension, config)
}

/// Compile `shape` and subdivide its bounding box
pub fn subdivide_shape(
    shape: &Shape,
    config: &SubdivisionConfig,
) -> Result<Subdivision, SubdivisionError> {
    config.validate()?;
    let program = shape.compile(&config.compile)?;
    subdivide(&program, &shape.bounding_box(), shape.dimension(), config)
}

/// Subdivide `bounds` with a program already loaded on `device`
#[instrument(skip_all, fields(resolution = config.resolution, lattice = config.lattice_size))]
pub fn subdivide_on(
    device: &CpuDevice,
    bounds: &Aabb,
    dimension: u8,
    config: &SubdivisionConfig,
) -> Result<Subdivision, SubdivisionError> {
    let levels = level_sizes(bounds, dimension, config)?;
    let origin = grid_bounds(bounds, config.resolution, dimension).min;
    let planar = dimension == 2;

    let mut result = Subdivision {
        dimension,
        levels: levels.clone(),
        ..Default::default()
    };

    if levels.len() == 1 {
        result.leaf_blocks.push(LeafBlock {
            corner: origin,
            spacing: config.resolution,
            lattice: levels[0].lattice,
            overlap: config.overlap_edge_samples,
            planar,
        });
        debug!(levels = 1, "single leaf block");
        return Ok(result);
    }

    let plan = Arc::new(LevelPlan {
        levels,
        origin: origin.as_dvec3(),
        resolution: f64::from(config.resolution),
        overlap: config.overlap_edge_samples,
        record_uniform: config.record_uniform_cells,
        planar,
    });
    let mut lane1 = SubdivisionLane::new(device.clone(), Arc::clone(&plan));
    let mut lane2 = SubdivisionLane::new(device.clone(), plan);
    let top = BlockJob {
        level: 0,
        position: U64Vec3::ZERO,
    };
    let run = interleave([top], &mut lane1, &mut lane2)?;

    for lane in [lane1, lane2] {
        let output = lane.into_output();
        result.leaf_blocks.extend(output.leaf_blocks);
        result.uniform_blocks.extend(output.uniform_blocks);
        result.inside += output.inside;
        result.stats.dispatches += output.dispatches;
        result.stats.cells_classified += output.cells_classified;
    }
    result.stats.max_in_flight = run.max_in_flight;
    result.leaf_blocks.sort_by(|a, b| {
        a.corner
            .z
            .total_cmp(&b.corner.z)
            .then(a.corner.y.total_cmp(&b.corner.y))
            .then(a.corner.x.total_cmp(&b.corner.x))
    });

    debug!(
        levels = result.levels.len(),
        leaf_blocks = result.leaf_blocks.len(),
        dispatches = result.stats.dispatches,
        "subdivision finished"
    );
    Ok(result)
}

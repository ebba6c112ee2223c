//! One lane of the subdivision engine
//!
//! Author: Moroya Sakamoto

use super::{LeafBlock, LevelSize, UniformBlock};
use crate::device::{
    unpack_index, CellQuery, CellReport, CpuDevice, DeviceError, InsideIntegrals, Pending,
};
use crate::exec::Lane;
use glam::{DVec3, U64Vec3, Vec3};
use std::sync::Arc;
use tracing::trace;

/// Geometry shared by both lanes of one run
#[derive(Debug)]
pub(crate) struct LevelPlan {
    pub levels: Vec<LevelSize>,
    pub origin: DVec3,
    pub resolution: f64,
    pub overlap: bool,
    pub record_uniform: bool,
    /// Planar plans work in the z = 0 plane with one-layer lattices
    pub planar: bool,
}

impl LevelPlan {
    #[inline]
    fn corner(&self, position: U64Vec3) -> Vec3 {
        (self.origin + position.as_dvec3() * self.resolution).as_vec3()
    }

    /// Offset from a cell's corner to its centre, in resolution units
    #[inline]
    fn centre_offset(&self, cell: f64) -> DVec3 {
        if self.planar {
            DVec3::new(cell * 0.5, cell * 0.5, 0.0)
        } else {
            DVec3::splat(cell * 0.5)
        }
    }

    /// Half the diagonal of a cell of edge `step`
    #[inline]
    fn threshold(&self, step: f64) -> f64 {
        let dimension: f64 = if self.planar { 2.0 } else { 3.0 };
        step * dimension.sqrt() * 0.5
    }
}

/// A block to classify: `level` indexes `LevelPlan::levels`, `position` is
/// the block's minimum corner in resolution units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockJob {
    pub level: usize,
    pub position: U64Vec3,
}

/// Results accumulated by one lane
#[derive(Debug, Default)]
pub(crate) struct LaneOutput {
    pub leaf_blocks: Vec<LeafBlock>,
    pub uniform_blocks: Vec<UniformBlock>,
    pub inside: InsideIntegrals,
    pub dispatches: usize,
    pub cells_classified: u64,
}

pub(crate) struct SubdivisionLane {
    device: CpuDevice,
    plan: Arc<LevelPlan>,
    current: Option<BlockJob>,
    output: LaneOutput,
}

impl SubdivisionLane {
    pub fn new(device: CpuDevice, plan: Arc<LevelPlan>) -> Self {
        SubdivisionLane {
            device,
            plan,
            current: None,
            output: LaneOutput::default(),
        }
    }

    pub fn into_output(self) -> LaneOutput {
        self.output
    }
}

impl Lane for SubdivisionLane {
    type Job = BlockJob;
    type Pending = Pending<CellReport>;

    fn enqueue(&mut self, job: BlockJob) -> Result<Pending<CellReport>, DeviceError> {
        let level = self.plan.levels[job.level];
        let cell = level.cell_size as f64;
        let step = cell * self.plan.resolution;
        let first_centre = self.plan.origin
            + (job.position.as_dvec3() + self.plan.centre_offset(cell)) * self.plan.resolution;
        let pending = self.device.classify_cells(CellQuery {
            first_centre: first_centre.as_vec3(),
            step: step as f32,
            dims: level.lattice,
            threshold: self.plan.threshold(step) as f32,
            record_uniform: self.plan.record_uniform,
        })?;
        trace!(level = job.level, position = ?job.position, "block submitted");
        self.current = Some(job);
        self.output.dispatches += 1;
        Ok(pending)
    }

    fn process_result(&mut self, report: CellReport) -> Result<Vec<BlockJob>, DeviceError> {
        let job = self
            .current
            .take()
            .ok_or_else(|| DeviceError::Rejected("read-back without a submission".to_string()))?;
        let plan = Arc::clone(&self.plan);
        let level = plan.levels[job.level];
        let child_level = job.level + 1;
        let leaf_level = child_level + 1 == plan.levels.len();
        let step = level.cell_size as f64 * plan.resolution;
        let child_position = |index: u32| {
            job.position + unpack_index(index, level.lattice).as_u64vec3() * level.cell_size
        };

        self.output.inside += report.inside_integrals(step, plan.planar);
        self.output.cells_classified += u64::from(level.lattice.x)
            * u64::from(level.lattice.y)
            * u64::from(level.lattice.z);

        for (index, inside) in report.uniform {
            self.output.uniform_blocks.push(UniformBlock {
                corner: plan.corner(child_position(index)),
                size: step as f32,
                inside,
                planar: plan.planar,
            });
        }

        let mut follow_ups = Vec::new();
        for index in report.intersecting {
            let position = child_position(index);
            if leaf_level {
                self.output.leaf_blocks.push(LeafBlock {
                    corner: plan.corner(position),
                    spacing: plan.resolution as f32,
                    lattice: plan.levels[child_level].lattice,
                    overlap: plan.overlap,
                    planar: plan.planar,
                });
            } else {
                follow_ups.push(BlockJob {
                    level: child_level,
                    position,
                });
            }
        }
        Ok(follow_ups)
    }
}

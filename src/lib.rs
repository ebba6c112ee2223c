//! # ALICE-CSG
//!
//! **Distance-field CAD kernel: compiled CSG programs, adaptive
//! subdivision and interleaved device execution**
//!
//! Shapes are described as expression trees, lowered into a deduplicated
//! node DAG, scheduled for low register pressure and encoded as bytecode
//! for a small register VM. The same VM contract is implemented on the CPU
//! (reference device) and emitted as WGSL for compute devices.
//!
//! ## Features
//!
//! - **Primitives**: Rectangle, Circle, Polygon, Sphere, Box, Cylinder
//! - **Operations**: Union, Intersection, Subtraction (filleted variants)
//! - **Modifiers**: Offset, Shell, Extrusion, Revolution
//! - **Transforms**: Translate, Rotate, Uniform Scale (merged at compile time)
//! - **Compiler**: CSE node cache, randomized trial scheduler, register allocator
//! - **Subdivision**: Leaf-block enumeration with uniform-region culling
//! - **Executor**: Two-lane interleaving of device round trips
//!
//! ## Example
//!
//! ```rust
//! use alice_csg::prelude::*;
//!
//! let part = Shape::box3d(2.0, 2.0, 2.0)
//!     .subtract(Shape::cylinder(0.5, 3.0))
//!     .unwrap();
//!
//! // Compile to bytecode and evaluate
//! let program = part.compile(&CompileConfig::default()).unwrap();
//! let vm = Vm::load(&program).unwrap();
//! assert!(vm.distance(Vec3::ZERO) > 0.0);
//!
//! // Blocks that need full evaluation at resolution 0.1
//! let blocks = subdivide_shape(&part, &SubdivisionConfig::with_resolution(0.1)).unwrap();
//! assert!(!blocks.leaf_blocks.is_empty());
//! ```
//!
//! ## Author
//!
//! Moroya Sakamoto

#![warn(missing_docs)]

pub mod compiled;
pub mod device;
pub mod exec;
pub mod kernels;
pub mod measure;
pub mod shape;
pub mod subdivision;
pub mod types;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude - commonly used types and functions
pub mod prelude {
    pub use crate::compiled::{
        compile, CompileConfig, CompileError, NodeCache, NodeId, OpCode, Program, Vm,
    };
    pub use crate::device::{CpuDevice, DeviceError};
    pub use crate::exec::{interleave, Completion, Lane};
    pub use crate::measure::{volume_and_centroid, MassEstimate};
    pub use crate::shape::Shape;
    pub use crate::subdivision::{
        subdivide, subdivide_shape, LeafBlock, Subdivision, SubdivisionConfig, SubdivisionError,
    };
    pub use crate::types::{Aabb, Transform};
    pub use glam::{Quat, Vec3};
}

// Re-exports for convenience
pub use compiled::{compile, Program};
pub use shape::Shape;

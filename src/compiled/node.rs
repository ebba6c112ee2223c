//! Node DAG and common-subexpression cache
//!
//! Nodes live in one arena per build session and refer to their
//! dependencies by [`NodeId`]. Because dependencies are canonicalized
//! bottom-up, two nodes are equal exactly when opcode, parameter bits and
//! dependency ids match, so the cache key is shallow.
//!
//! Author: Moroya Sakamoto

use super::opcode::{Arity, OpCode, ParamLayout};
use crate::types::Transform;
use glam::Quat;
use std::collections::HashMap;

/// Errors raised while building shapes or nodes
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BuildError {
    /// Dependency count does not match the opcode's arity
    #[error("{opcode} expects {expected}, got {got}")]
    ArityMismatch {
        /// Opcode being built
        opcode: OpCode,
        /// Arity declared by the registry
        expected: Arity,
        /// Number of dependencies supplied
        got: usize,
    },

    /// Parameter count does not match the opcode's layout
    #[error("{opcode} expects {expected}, got {got}")]
    ParamCountMismatch {
        /// Opcode being built
        opcode: OpCode,
        /// Layout declared by the registry
        expected: ParamLayout,
        /// Number of parameters supplied
        got: usize,
    },

    /// Reserved opcodes (return, point) cannot be built with `make_node`
    #[error("{0} is reserved and cannot be built as a node")]
    ReservedOpcode(OpCode),

    /// A dependency id that was not produced by this cache
    #[error("node {0} does not belong to this cache")]
    UnknownNode(NodeId),

    /// Combining shapes of different dimensionality
    #[error("dimension mismatch: expected a {expected}D shape, got {got}D")]
    DimensionMismatch {
        /// Dimension required by the operation
        expected: u8,
        /// Dimension of the offending operand
        got: u8,
    },

    /// Shape parameters that no kernel can evaluate
    #[error("invalid shape: {0}")]
    InvalidShape(String),
}

/// Index of a node inside its [`NodeCache`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// Arena index
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Builder-only payload attached to a node.
///
/// Never part of the cache key and dropped before encoding. Lowering uses
/// it to fold nested transformations into one node.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeExtra {
    /// Transform applied to the point by a `transformation_to` node
    PointTransform(Transform),
    /// Rotation and scale applied by a `transformation_from` node
    ValueTransform {
        /// Gradient rotation
        rotation: Quat,
        /// Distance scale
        scale: f32,
    },
}

/// One operation of the DAG
#[derive(Clone, Debug)]
pub struct Node {
    opcode: OpCode,
    params: Vec<f32>,
    dependencies: Vec<NodeId>,
    extra: Option<NodeExtra>,
    refcount: u32,
    register: Option<u8>,
}

impl Node {
    /// Operation code
    #[inline]
    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    /// Parameter words
    #[inline]
    pub fn params(&self) -> &[f32] {
        &self.params
    }

    /// Ordered dependencies
    #[inline]
    pub fn dependencies(&self) -> &[NodeId] {
        &self.dependencies
    }

    /// Builder-only payload
    #[inline]
    pub fn extra(&self) -> Option<&NodeExtra> {
        self.extra.as_ref()
    }

    /// Number of parent nodes that consume this node
    #[inline]
    pub fn refcount(&self) -> u32 {
        self.refcount
    }

    /// Register assigned by the last compile, if any
    #[inline]
    pub fn register(&self) -> Option<u8> {
        self.register
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct NodeKey {
    opcode: OpCode,
    params: Vec<u32>,
    dependencies: Vec<NodeId>,
}

/// Arena of nodes with structural deduplication.
///
/// At most one node exists per distinct subexpression. The cache is meant
/// to live for a single compile and be dropped afterwards.
#[derive(Clone, Debug)]
pub struct NodeCache {
    nodes: Vec<Node>,
    index: HashMap<NodeKey, NodeId>,
    hits: usize,
}

impl Default for NodeCache {
    fn default() -> Self {
        Self::new()
    }
}

// Never empty: the point leaf exists from construction
#[allow(clippy::len_without_is_empty)]
impl NodeCache {
    /// Create a cache holding only the evaluation point leaf
    pub fn new() -> Self {
        let key = NodeKey {
            opcode: OpCode::Point,
            params: Vec::new(),
            dependencies: Vec::new(),
        };
        let point = Node {
            opcode: OpCode::Point,
            params: Vec::new(),
            dependencies: Vec::new(),
            extra: None,
            refcount: 0,
            register: None,
        };
        let mut index = HashMap::new();
        index.insert(key, NodeId(0));
        NodeCache {
            nodes: vec![point],
            index,
            hits: 0,
        }
    }

    /// The evaluation point leaf
    #[inline]
    pub fn point(&self) -> NodeId {
        NodeId(0)
    }

    /// Build (or reuse) a node.
    ///
    /// On a cache hit the existing node is returned and no refcount
    /// changes; the duplicate's `extra` payload is discarded. On a miss the
    /// node is inserted and each dependency's refcount grows by one (a
    /// dependency listed twice is counted twice).
    pub fn make_node(
        &mut self,
        opcode: OpCode,
        params: &[f32],
        dependencies: &[NodeId],
        extra: Option<NodeExtra>,
    ) -> Result<NodeId, BuildError> {
        if opcode.is_reserved() {
            return Err(BuildError::ReservedOpcode(opcode));
        }
        if !opcode.arity().accepts(dependencies.len()) {
            return Err(BuildError::ArityMismatch {
                opcode,
                expected: opcode.arity(),
                got: dependencies.len(),
            });
        }
        if !opcode.params().accepts(params.len()) {
            return Err(BuildError::ParamCountMismatch {
                opcode,
                expected: opcode.params(),
                got: params.len(),
            });
        }
        if let Some(&missing) = dependencies.iter().find(|d| d.index() >= self.nodes.len()) {
            return Err(BuildError::UnknownNode(missing));
        }

        let key = NodeKey {
            opcode,
            params: params.iter().map(|p| p.to_bits()).collect(),
            dependencies: dependencies.to_vec(),
        };
        if let Some(&id) = self.index.get(&key) {
            self.hits += 1;
            return Ok(id);
        }

        for dep in dependencies {
            self.nodes[dep.index()].refcount += 1;
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            opcode,
            params: params.to_vec(),
            dependencies: dependencies.to_vec(),
            extra,
            refcount: 0,
            register: None,
        });
        self.index.insert(key, id);
        Ok(id)
    }

    /// Look up a node
    #[inline]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Number of distinct nodes (including the point leaf)
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Number of `make_node` calls answered from the cache
    #[inline]
    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Iterate over `(id, node)` pairs in creation order
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId(i as u32), n))
    }

    pub(crate) fn set_register(&mut self, id: NodeId, register: u8) {
        if let Some(node) = self.nodes.get_mut(id.index()) {
            node.register = Some(register);
        }
    }
}

impl std::ops::Index<NodeId> for NodeCache {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }
}

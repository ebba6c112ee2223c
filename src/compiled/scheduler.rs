//! Scheduler: linear evaluation order with low register pressure
//!
//! Finding the order with the fewest registers is intractable in general,
//! so the scheduler simulates register allocation for a fixed set of
//! trials (dependencies in declared order, in reverse order, and a number
//! of random shuffles) and keeps the cheapest.
//!
//! Each trial works on its own clone of the index table: associative
//! N-ary nodes are folded into binary chains per trial, so trials never
//! observe each other's rewriting and can run in parallel.
//!
//! Author: Moroya Sakamoto

use super::node::{BuildError, NodeCache, NodeId};
use super::opcode::OpCode;
use super::regalloc::RegisterAllocator;
use rayon::prelude::*;
use tracing::{debug, trace};

/// How a trial orders the dependencies of each node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrialOrder {
    /// Declared dependency order
    Identity,
    /// Declared order reversed
    Reversed,
    /// Fisher-Yates shuffle driven by the given seed
    Shuffled(u64),
}

impl TrialOrder {
    /// Order used by trial `index` of a search seeded with `seed`.
    ///
    /// Trial 0 is the identity order and trial 1 the reversed order; every
    /// later trial gets its own random stream, independent of how many
    /// trials run in total.
    pub fn for_trial(index: usize, seed: u64) -> Self {
        match index {
            0 => TrialOrder::Identity,
            1 => TrialOrder::Reversed,
            i => TrialOrder::Shuffled(seed ^ (i as u64).wrapping_mul(0xD1B5_4A32_D192_ED03)),
        }
    }
}

/// One scheduled instruction
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduledNode {
    /// Node providing opcode and parameters. Binary nodes produced by
    /// folding an N-ary node point at that N-ary node.
    pub node: NodeId,
    /// Operation code
    pub opcode: OpCode,
    /// Output register
    pub register: usize,
    /// Input registers, in the node's dependency order
    pub inputs: Vec<usize>,
}

/// Result of a scheduling trial
#[derive(Clone, Debug, PartialEq)]
pub struct Schedule {
    /// Peak register count
    pub registers_needed: usize,
    /// Evaluation order; the first entry is the evaluation point in
    /// register 0 and the last is the root
    pub order: Vec<ScheduledNode>,
    /// Index of the trial that produced this schedule
    pub trial: usize,
}

impl Schedule {
    /// Register holding the final value
    pub fn result_register(&self) -> usize {
        self.order.last().map_or(0, |n| n.register)
    }
}

#[derive(Clone, Debug)]
struct TrialNode {
    origin: NodeId,
    dependencies: Vec<usize>,
    uses: u32,
}

/// Scheduler over one node DAG
pub struct Scheduler<'a> {
    cache: &'a NodeCache,
    root: usize,
    table: Vec<TrialNode>,
}

impl<'a> Scheduler<'a> {
    /// Prepare the index table for the subgraph reachable from `root`.
    ///
    /// Use counts only include consumers reachable from the root, plus one
    /// for the RETURN that reads the root. Nodes orphaned during building
    /// therefore never pin a register.
    pub fn new(cache: &'a NodeCache, root: NodeId) -> Result<Self, BuildError> {
        if cache.get(root).is_none() {
            return Err(BuildError::UnknownNode(root));
        }
        let mut table: Vec<TrialNode> = cache
            .iter()
            .map(|(id, node)| TrialNode {
                origin: id,
                dependencies: node.dependencies().iter().map(|d| d.index()).collect(),
                uses: 0,
            })
            .collect();

        let mut seen = vec![false; table.len()];
        let mut stack = vec![root.index()];
        seen[root.index()] = true;
        while let Some(i) = stack.pop() {
            for k in 0..table[i].dependencies.len() {
                let d = table[i].dependencies[k];
                table[d].uses += 1;
                if !seen[d] {
                    seen[d] = true;
                    stack.push(d);
                }
            }
        }
        table[root.index()].uses += 1;

        Ok(Scheduler {
            cache,
            root: root.index(),
            table,
        })
    }

    /// Simulate register allocation for one dependency ordering
    pub fn run_trial(&self, order: TrialOrder, trial: usize) -> Schedule {
        let mut state = TrialState {
            cache: self.cache,
            registers: vec![None; self.table.len()],
            nodes: self.table.clone(),
            allocator: RegisterAllocator::new(),
            order: Vec::new(),
            rng: match order {
                TrialOrder::Shuffled(seed) => Some(Rng64::new(seed)),
                _ => None,
            },
            reversed: order == TrialOrder::Reversed,
        };
        state.visit(self.root);
        trace!(trial, registers = state.allocator.registers_needed(), "scheduling trial");
        Schedule {
            registers_needed: state.allocator.registers_needed(),
            order: state.order,
            trial,
        }
    }

    /// Run the identity, reversed and `random_passes` shuffled trials and
    /// keep the one needing the fewest registers (earliest trial on ties)
    pub fn best(&self, random_passes: usize, seed: u64) -> Schedule {
        let identity = self.run_trial(TrialOrder::Identity, 0);
        let best = (1..random_passes + 2)
            .into_par_iter()
            .map(|i| self.run_trial(TrialOrder::for_trial(i, seed), i))
            .min_by_key(|s| (s.registers_needed, s.trial))
            .filter(|s| s.registers_needed < identity.registers_needed)
            .unwrap_or(identity);
        debug!(
            trials = random_passes + 2,
            best_trial = best.trial,
            registers = best.registers_needed,
            instructions = best.order.len(),
            "schedule selected"
        );
        best
    }
}

struct TrialState<'a> {
    cache: &'a NodeCache,
    nodes: Vec<TrialNode>,
    registers: Vec<Option<usize>>,
    allocator: RegisterAllocator,
    order: Vec<ScheduledNode>,
    rng: Option<Rng64>,
    reversed: bool,
}

impl TrialState<'_> {
    fn arrange(&mut self, items: &mut [usize]) {
        if self.reversed {
            items.reverse();
        } else if let Some(rng) = self.rng.as_mut() {
            for i in (1..items.len()).rev() {
                let j = rng.next_below(i as u64 + 1) as usize;
                items.swap(i, j);
            }
        }
    }

    /// Fold an N-ary node into `op(op(op(d0, d1), d2), ...)`, leaving the
    /// original node as the outermost binary application.
    fn binarize(&mut self, id: usize) {
        let mut deps = std::mem::take(&mut self.nodes[id].dependencies);
        self.arrange(&mut deps);
        let origin = self.nodes[id].origin;
        let last = deps.len() - 1;
        let mut chain = self.push_temporary(origin, vec![deps[0], deps[1]]);
        for &d in &deps[2..last] {
            chain = self.push_temporary(origin, vec![chain, d]);
        }
        self.nodes[id].dependencies = vec![deps[last], chain];
    }

    fn push_temporary(&mut self, origin: NodeId, dependencies: Vec<usize>) -> usize {
        self.nodes.push(TrialNode {
            origin,
            dependencies,
            uses: 1,
        });
        self.registers.push(None);
        self.nodes.len() - 1
    }

    fn visit(&mut self, id: usize) {
        if self.nodes[id].dependencies.len() > 2 {
            self.binarize(id);
        }
        let mut deps = self.nodes[id].dependencies.clone();
        self.arrange(&mut deps);
        for &d in &deps {
            if self.registers[d].is_none() {
                self.visit(d);
            }
        }
        for &d in &deps {
            if let Some(register) = self.registers[d] {
                self.allocator.decref(register);
            }
        }

        let register = self.allocator.allocate(self.nodes[id].uses);
        self.registers[id] = Some(register);
        let origin = self.nodes[id].origin;
        let inputs = self.nodes[id]
            .dependencies
            .iter()
            .filter_map(|&d| self.registers[d])
            .collect();
        self.order.push(ScheduledNode {
            node: origin,
            opcode: self.cache[origin].opcode(),
            register,
            inputs,
        });
    }
}

/// SplitMix64 stream for trial shuffles
struct Rng64 {
    state: u64,
}

impl Rng64 {
    fn new(seed: u64) -> Self {
        Self {
            state: seed.wrapping_add(0x9E3779B97F4A7C15),
        }
    }

    #[inline(always)]
    fn next(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E3779B97F4A7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }

    /// Uniform value in `[0, bound)` (bound > 0)
    #[inline(always)]
    fn next_below(&mut self, bound: u64) -> u64 {
        ((self.next() as u128 * bound as u128) >> 64) as u64
    }
}

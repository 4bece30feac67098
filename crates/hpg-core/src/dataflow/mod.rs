//! Generic worklist fixed-point solver
//!
//! The solver knows nothing about JavaScript: it iterates a transfer
//! function over per-node fact sets until no output changes. Reaching
//! definitions ([`crate::defuse`]) and available expressions ([`available`])
//! are its two clients.

pub mod available;
mod queue;

pub use queue::WorkQueue;

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::flow::{FlowNodeFactory, FlowNodeId};

/// A directed graph the solver can walk in either direction.
pub trait FlowGraph {
    type Node: Copy + Eq + Hash;

    fn successors(&self, node: Self::Node) -> Vec<Self::Node>;
    fn predecessors(&self, node: Self::Node) -> Vec<Self::Node>;
}

impl FlowGraph for FlowNodeFactory {
    type Node = FlowNodeId;

    fn successors(&self, node: FlowNodeId) -> Vec<FlowNodeId> {
        let mut out: Vec<FlowNodeId> = Vec::new();
        for edge in FlowNodeFactory::successors(self, node) {
            if !out.contains(&edge.node) {
                out.push(edge.node);
            }
        }
        out
    }

    fn predecessors(&self, node: FlowNodeId) -> Vec<FlowNodeId> {
        let mut out: Vec<FlowNodeId> = Vec::new();
        for edge in FlowNodeFactory::predecessors(self, node) {
            if !out.contains(&edge.node) {
                out.push(edge.node);
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    /// "May" analyses: a fact holds if it holds on any incoming path.
    Union,
    /// "Must" analyses: a fact holds only if it holds on every incoming path.
    Intersection,
}

#[derive(Debug, Clone)]
pub struct Options<T> {
    pub direction: Direction,
    pub merge: Merge,
    /// Input of a node none of whose predecessors has an output yet.
    pub start: HashSet<T>,
}

impl<T> Default for Options<T> {
    fn default() -> Self {
        Self {
            direction: Direction::Forward,
            merge: Merge::Union,
            start: HashSet::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Solution<N, T> {
    pub inputs: HashMap<N, HashSet<T>>,
    pub outputs: HashMap<N, HashSet<T>>,
    pub iterations: usize,
}

impl<N: Eq + Hash, T> Solution<N, T> {
    pub fn input(&self, node: N) -> Option<&HashSet<T>> {
        self.inputs.get(&node)
    }

    pub fn output(&self, node: N) -> Option<&HashSet<T>> {
        self.outputs.get(&node)
    }
}

fn merge_into<T: Clone + Eq + Hash>(acc: &mut HashSet<T>, other: &HashSet<T>, merge: Merge) {
    match merge {
        Merge::Union => acc.extend(other.iter().cloned()),
        Merge::Intersection => acc.retain(|fact| other.contains(fact)),
    }
}

/// Runs `transfer` to a fixed point, starting from `seeds`.
///
/// Nodes not reachable from a seed in the chosen direction are never
/// visited and have no entry in the solution.
pub fn solve<G, T, F>(graph: &G, seeds: &[G::Node], options: &Options<T>, mut transfer: F) -> Solution<G::Node, T>
where
    G: FlowGraph,
    T: Clone + Eq + Hash,
    F: FnMut(G::Node, &HashSet<T>) -> HashSet<T>,
{
    let incoming: fn(&G, G::Node) -> Vec<G::Node>;
    let outgoing: fn(&G, G::Node) -> Vec<G::Node>;
    match options.direction {
        Direction::Forward => {
            incoming = G::predecessors;
            outgoing = G::successors;
        }
        Direction::Backward => {
            incoming = G::successors;
            outgoing = G::predecessors;
        }
    }

    let mut queue = WorkQueue::new();
    for &seed in seeds {
        queue.push(seed);
    }

    let mut inputs: HashMap<G::Node, HashSet<T>> = HashMap::new();
    let mut outputs: HashMap<G::Node, HashSet<T>> = HashMap::new();
    let mut iterations = 0;

    while let Some(node) = queue.pop() {
        iterations += 1;

        let mut input: Option<HashSet<T>> = None;
        for pred in incoming(graph, node) {
            let Some(out) = outputs.get(&pred) else {
                continue;
            };
            match input.as_mut() {
                Some(acc) => merge_into(acc, out, options.merge),
                None => input = Some(out.clone()),
            }
        }
        let input = input.unwrap_or_else(|| options.start.clone());

        let output = transfer(node, &input);
        inputs.insert(node, input);

        if outputs.get(&node) != Some(&output) {
            outputs.insert(node, output);
            for next in outgoing(graph, node) {
                queue.push(next);
            }
        }
    }

    tracing::trace!(iterations, nodes = outputs.len(), "dataflow solved");
    Solution {
        inputs,
        outputs,
        iterations,
    }
}

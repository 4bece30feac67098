//! Per-scope control-flow graph construction
//!
//! One CFG is built per scope. Nodes wrap statements; loops get a `Loop`
//! head with true/false branches and a `LoopReturn` join, and every node in
//! a `try` block carries an exception edge to its handler. Calls do not
//! split the graph here; call/return edges are added by
//! [`crate::interproc`] once every CFG exists.

mod builder;

use std::collections::HashSet;

use crate::ast::{AstIndex, Node, NodeKind};
use crate::flow::{EdgeKind, FlowKind, FlowNodeFactory, FlowNodeId};
use crate::scope::{ScopeId, ScopeTree};

use builder::CfgBuilder;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphInvariantError {
    #[error("CFG of {scope} has {count} entry nodes")]
    EntryCount { scope: String, count: usize },
    #[error("CFG of {scope} has {count} exit nodes")]
    ExitCount { scope: String, count: usize },
    #[error("flow node uid {uid} appears more than once in {scope}")]
    DuplicateUid { scope: String, uid: u32 },
    #[error("flow node uid {uid} in {scope} is not reachable from the entry")]
    Unreachable { scope: String, uid: u32 },
}

#[derive(Debug, Clone)]
pub struct Cfg {
    pub scope: ScopeId,
    pub name: String,
    pub entry: FlowNodeId,
    pub exit: FlowNodeId,
    /// Nodes reachable from `entry`, in depth-first pre-order. Nodes added
    /// by inter-procedural linking are appended.
    pub nodes: Vec<FlowNodeId>,
}

impl Cfg {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: FlowNodeId) -> bool {
        self.nodes.contains(&id)
    }

    pub fn check_invariants(&self, factory: &FlowNodeFactory) -> Result<(), GraphInvariantError> {
        let scope = || self.name.clone();
        let count = |kind: FlowKind| {
            self.nodes
                .iter()
                .filter(|&&id| factory.get(id).kind == kind)
                .count()
        };

        let entries = count(FlowKind::Entry);
        if entries != 1 || self.nodes.first() != Some(&self.entry) {
            return Err(GraphInvariantError::EntryCount {
                scope: scope(),
                count: entries,
            });
        }
        let exits = count(FlowKind::Exit);
        if exits != 1 {
            return Err(GraphInvariantError::ExitCount {
                scope: scope(),
                count: exits,
            });
        }

        let mut seen = HashSet::new();
        for &id in &self.nodes {
            let uid = factory.get(id).uid;
            if !seen.insert(uid) {
                return Err(GraphInvariantError::DuplicateUid {
                    scope: scope(),
                    uid,
                });
            }
        }

        let reachable: HashSet<FlowNodeId> = reachable_from(factory, self.entry).into_iter().collect();
        if let Some(&orphan) = self.nodes.iter().find(|id| !reachable.contains(id)) {
            return Err(GraphInvariantError::Unreachable {
                scope: scope(),
                uid: factory.get(orphan).uid,
            });
        }
        Ok(())
    }
}

/// Depth-first pre-order over every edge kind.
pub fn reachable_from(factory: &FlowNodeFactory, start: FlowNodeId) -> Vec<FlowNodeId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    let mut stack = vec![start];
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        order.push(id);
        let successors: Vec<FlowNodeId> = factory.successors(id).map(|edge| edge.node).collect();
        stack.extend(successors.into_iter().rev());
    }
    order
}

/// Builds the CFG of one scope whose AST root is `root` (a Program or a
/// function node).
pub fn build_cfg_for_root(
    factory: &mut FlowNodeFactory,
    scope: ScopeId,
    name: &str,
    root: &Node,
) -> Cfg {
    let entry = factory.create(FlowKind::Entry, Some(root), Some(scope));
    let exit = factory.create(FlowKind::Exit, None, Some(scope));
    factory.set_position(exit, root.loc.end.line, root.loc.end.column);

    let mut builder = CfgBuilder::new(factory, scope, exit);
    let start = vec![(entry, EdgeKind::Normal)];
    let out = match (&root.kind, root.as_function()) {
        (_, Some(function)) => match &function.body.kind {
            NodeKind::BlockStatement { body } => builder.stmts(body, start),
            _ => {
                let body = builder.chain(start, FlowKind::Normal, &function.body);
                vec![(body, EdgeKind::Normal)]
            }
        },
        (NodeKind::Program { body, .. }, None) => builder.stmts(body, start),
        _ => start,
    };
    builder.link(out, exit);

    let nodes = reachable_from(factory, entry);
    tracing::debug!(scope = name, nodes = nodes.len(), "built CFG");
    Cfg {
        scope,
        name: name.to_string(),
        entry,
        exit,
        nodes,
    }
}

/// Builds the CFG of `scope`. The domain has no code and yields `None`.
pub fn build_cfg(
    factory: &mut FlowNodeFactory,
    scopes: &ScopeTree,
    index: &AstIndex<'_>,
    scope: ScopeId,
) -> Option<Cfg> {
    let info = scopes.get(scope);
    let root = index.get(info.ast?)?;
    Some(build_cfg_for_root(factory, scope, &info.name, root))
}

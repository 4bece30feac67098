//! Control-flow nodes and their allocator
//!
//! Every CFG of a run lives in one [`FlowNodeFactory`] arena, so merging
//! graphs is just adding edges. Each node also draws a `uid` from the shared
//! [`IdGenerator`], which keeps it distinct from every AST id.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use id_arena::{Arena, Id};

use crate::ast::{AstId, IdGenerator, Node};
use crate::defuse::{GenKill, VarDef};
use crate::scope::{ScopeId, Var};

pub type FlowNodeId = Id<FlowNode>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowKind {
    Entry,
    Exit,
    Normal,
    Call,
    CallReturn,
    Loop,
    LoopReturn,
    LocalStorage,
}

impl FlowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowKind::Entry => "Entry",
            FlowKind::Exit => "Exit",
            FlowKind::Normal => "Normal",
            FlowKind::Call => "Call",
            FlowKind::CallReturn => "CallReturn",
            FlowKind::Loop => "Loop",
            FlowKind::LoopReturn => "LoopReturn",
            FlowKind::LocalStorage => "LocalStorage",
        }
    }
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EdgeKind {
    Normal,
    TrueBranch,
    FalseBranch,
    Exception,
    Call,
    Return,
    OnEvent,
    LoadStorage,
    SaveStorage,
}

impl EdgeKind {
    /// Relation type used when the edge is exported.
    pub fn relation_type(&self) -> &'static str {
        match self {
            EdgeKind::Normal => "Epsilon",
            EdgeKind::TrueBranch => "Cond_True",
            EdgeKind::FalseBranch => "Cond_False",
            EdgeKind::Exception => "Exception",
            EdgeKind::Call => "Call",
            EdgeKind::Return => "Return",
            EdgeKind::OnEvent => "OnEvent",
            EdgeKind::LoadStorage => "LoadStorage",
            EdgeKind::SaveStorage => "SaveStorage",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowEdge {
    pub kind: EdgeKind,
    pub node: FlowNodeId,
}

#[derive(Debug)]
pub struct FlowNode {
    pub id: FlowNodeId,
    pub uid: u32,
    pub kind: FlowKind,
    pub ast: Option<AstId>,
    pub scope: Option<ScopeId>,
    pub line: u32,
    pub column: u32,
    pub successors: Vec<FlowEdge>,
    pub predecessors: Vec<FlowEdge>,
    /// GEN/KILL, computed once by the def-use analysis.
    pub gen_kill: Option<GenKill>,
    pub reach_ins: HashSet<VarDef>,
    pub reach_outs: HashSet<VarDef>,
    /// Definitions injected from outside the node's own CFG, such as
    /// parameter bindings at a callee entry.
    pub extra_reach_ins: HashSet<VarDef>,
    pub c_uses: Vec<Var>,
    pub p_uses: Vec<Var>,
}

impl FlowNode {
    /// Id under which the node appears in the exported graph.
    pub fn export_id(&self) -> u32 {
        self.ast.map(|id| id.0).unwrap_or(self.uid)
    }

    pub fn is_branch(&self) -> bool {
        self.successors
            .iter()
            .any(|edge| edge.kind == EdgeKind::TrueBranch)
            && self
                .successors
                .iter()
                .any(|edge| edge.kind == EdgeKind::FalseBranch)
    }

    pub fn uses(&self) -> impl Iterator<Item = &Var> {
        self.c_uses.iter().chain(self.p_uses.iter())
    }
}

/// The sole allocator of flow nodes.
pub struct FlowNodeFactory {
    nodes: Arena<FlowNode>,
    ids: Arc<IdGenerator>,
    local_storage: Option<FlowNodeId>,
}

impl FlowNodeFactory {
    pub fn new(ids: Arc<IdGenerator>) -> Self {
        Self {
            nodes: Arena::new(),
            ids,
            local_storage: None,
        }
    }

    pub fn ids(&self) -> &IdGenerator {
        &self.ids
    }

    pub fn create(&mut self, kind: FlowKind, ast: Option<&Node>, scope: Option<ScopeId>) -> FlowNodeId {
        let uid = self.ids.next_id();
        let (line, column) = ast
            .map(|node| (node.loc.start.line, node.loc.start.column))
            .unwrap_or_default();
        self.nodes.alloc_with_id(|id| FlowNode {
            id,
            uid,
            kind,
            ast: ast.map(|node| node.id),
            scope,
            line,
            column,
            successors: Vec::new(),
            predecessors: Vec::new(),
            gen_kill: None,
            reach_ins: HashSet::new(),
            reach_outs: HashSet::new(),
            extra_reach_ins: HashSet::new(),
            c_uses: Vec::new(),
            p_uses: Vec::new(),
        })
    }

    /// The process-wide local-storage sentinel. Every call returns the same node.
    pub fn local_storage(&mut self) -> FlowNodeId {
        if let Some(id) = self.local_storage {
            return id;
        }
        let id = self.create(FlowKind::LocalStorage, None, None);
        self.local_storage = Some(id);
        id
    }

    pub fn existing_local_storage(&self) -> Option<FlowNodeId> {
        self.local_storage
    }

    pub fn connect(&mut self, from: FlowNodeId, to: FlowNodeId, kind: EdgeKind) {
        let forward = FlowEdge { kind, node: to };
        if !self.nodes[from].successors.contains(&forward) {
            self.nodes[from].successors.push(forward);
        }
        let backward = FlowEdge { kind, node: from };
        if !self.nodes[to].predecessors.contains(&backward) {
            self.nodes[to].predecessors.push(backward);
        }
    }

    pub fn disconnect(&mut self, from: FlowNodeId, to: FlowNodeId, kind: EdgeKind) {
        self.nodes[from]
            .successors
            .retain(|edge| !(edge.node == to && edge.kind == kind));
        self.nodes[to]
            .predecessors
            .retain(|edge| !(edge.node == from && edge.kind == kind));
    }

    /// Moves the outgoing edges of `from` accepted by `filter` over to `to`.
    pub fn move_successors(
        &mut self,
        from: FlowNodeId,
        to: FlowNodeId,
        filter: impl Fn(EdgeKind) -> bool,
    ) {
        let moved: Vec<FlowEdge> = self.nodes[from]
            .successors
            .iter()
            .filter(|edge| filter(edge.kind))
            .copied()
            .collect();
        for edge in moved {
            self.disconnect(from, edge.node, edge.kind);
            self.connect(to, edge.node, edge.kind);
        }
    }

    /// Moves the incoming edges of `from` over to `to`.
    pub fn move_predecessors(&mut self, from: FlowNodeId, to: FlowNodeId) {
        let moved = self.nodes[from].predecessors.clone();
        for edge in moved {
            self.disconnect(edge.node, from, edge.kind);
            self.connect(edge.node, to, edge.kind);
        }
    }

    pub fn set_position(&mut self, id: FlowNodeId, line: u32, column: u32) {
        let node = &mut self.nodes[id];
        node.line = line;
        node.column = column;
    }

    pub fn get(&self, id: FlowNodeId) -> &FlowNode {
        &self.nodes[id]
    }

    pub fn get_mut(&mut self, id: FlowNodeId) -> &mut FlowNode {
        &mut self.nodes[id]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &FlowNode> {
        self.nodes.iter().map(|(_, node)| node)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 0
    }

    pub fn successors(&self, id: FlowNodeId) -> impl Iterator<Item = &FlowEdge> {
        self.nodes[id].successors.iter()
    }

    pub fn predecessors(&self, id: FlowNodeId) -> impl Iterator<Item = &FlowEdge> {
        self.nodes[id].predecessors.iter()
    }

    pub fn has_edge(&self, from: FlowNodeId, to: FlowNodeId, kind: EdgeKind) -> bool {
        self.nodes[from]
            .successors
            .contains(&FlowEdge { kind, node: to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> FlowNodeFactory {
        FlowNodeFactory::new(Arc::new(IdGenerator::new()))
    }

    #[test]
    fn uids_come_from_the_shared_generator() {
        let ids = Arc::new(IdGenerator::new());
        ids.observe(41);
        let mut first = FlowNodeFactory::new(ids.clone());
        let mut second = FlowNodeFactory::new(ids.clone());

        let a = first.create(FlowKind::Entry, None, None);
        let b = second.create(FlowKind::Entry, None, None);

        assert_eq!(first.get(a).uid, 42);
        assert_eq!(second.get(b).uid, 43);
    }

    #[test]
    fn local_storage_is_a_singleton() {
        let mut factory = factory();
        let first = factory.local_storage();
        let second = factory.local_storage();

        assert_eq!(first, second);
        assert_eq!(factory.len(), 1);
        assert_eq!(factory.get(first).kind, FlowKind::LocalStorage);
    }

    #[test]
    fn connect_keeps_both_directions_and_ignores_duplicates() {
        let mut factory = factory();
        let a = factory.create(FlowKind::Normal, None, None);
        let b = factory.create(FlowKind::Normal, None, None);

        factory.connect(a, b, EdgeKind::TrueBranch);
        factory.connect(a, b, EdgeKind::TrueBranch);
        factory.connect(a, b, EdgeKind::FalseBranch);

        assert_eq!(factory.get(a).successors.len(), 2);
        assert_eq!(factory.get(b).predecessors.len(), 2);
        assert!(factory.get(a).is_branch());
    }

    #[test]
    fn moving_successors_rewires_predecessor_lists() {
        let mut factory = factory();
        let call = factory.create(FlowKind::Call, None, None);
        let next = factory.create(FlowKind::Normal, None, None);
        let handler = factory.create(FlowKind::Normal, None, None);
        let ret = factory.create(FlowKind::CallReturn, None, None);
        factory.connect(call, next, EdgeKind::Normal);
        factory.connect(call, handler, EdgeKind::Exception);

        factory.move_successors(call, ret, |kind| kind != EdgeKind::Exception);

        assert!(factory.has_edge(ret, next, EdgeKind::Normal));
        assert!(!factory.has_edge(call, next, EdgeKind::Normal));
        assert!(factory.has_edge(call, handler, EdgeKind::Exception));
        assert_eq!(factory.get(next).predecessors[0].node, ret);
    }

    #[test]
    fn export_id_prefers_the_ast_id() {
        let mut factory = factory();
        let ids = IdGenerator::new();
        let program = crate::parser::ParsedFile::from_source("a.js", "x;", &ids)
            .into_program()
            .unwrap();

        let wrapped = factory.create(FlowKind::Entry, Some(&program), None);
        let synthetic = factory.create(FlowKind::Exit, None, None);

        assert_eq!(factory.get(wrapped).export_id(), program.id.0);
        assert_eq!(
            factory.get(synthetic).export_id(),
            factory.get(synthetic).uid
        );
    }
}

//! Program graph materialization
//!
//! Flattens the AST, the linked CFGs, the def-use pairs and the call links
//! into one property graph: a node list keyed by AST `_id` (or flow-node uid
//! for synthetic nodes) and a sorted, de-duplicated edge list.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ast::{AstIndex, MethodKind, Node, NodeKind, PropertyKind, Range, SourceLocation};
use crate::cfg::Cfg;
use crate::defuse::du_pairs;
use crate::flow::{FlowNodeFactory, FlowNodeId};
use crate::interproc::CallLink;
use crate::scope::ScopeTree;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: u32,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub literal_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    #[serde(default)]
    pub is_async: bool,
    /// Tags attached by downstream taint matchers; always empty here.
    #[serde(default)]
    pub semantic_type: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RelationLabel {
    #[serde(rename = "AST_parentOf")]
    Ast,
    #[serde(rename = "CFG_parentOf")]
    Cfg,
    #[serde(rename = "PDG_parentOf")]
    Pdg,
    #[serde(rename = "CG_parentOf")]
    CallGraph,
}

impl RelationLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationLabel::Ast => "AST_parentOf",
            RelationLabel::Cfg => "CFG_parentOf",
            RelationLabel::Pdg => "PDG_parentOf",
            RelationLabel::CallGraph => "CG_parentOf",
        }
    }
}

impl fmt::Display for RelationLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arg: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub var: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub from_id: u32,
    pub to_id: u32,
    pub relation_label: RelationLabel,
    pub relation_type: String,
    #[serde(default)]
    pub args: EdgeArgs,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub nodes: usize,
    pub edges: BTreeMap<String, usize>,
}

impl Graph {
    pub fn summary(&self) -> GraphSummary {
        let mut edges = BTreeMap::new();
        for edge in &self.edges {
            *edges.entry(edge.relation_label.as_str().to_string()).or_insert(0) += 1;
        }
        GraphSummary {
            nodes: self.nodes.len(),
            edges,
        }
    }

    pub fn node(&self, id: u32) -> Option<&GraphNode> {
        self.nodes
            .binary_search_by_key(&id, |node| node.id)
            .ok()
            .map(|position| &self.nodes[position])
    }

    pub fn edges_labeled(&self, label: RelationLabel) -> impl Iterator<Item = &GraphEdge> {
        self.edges.iter().filter(move |edge| edge.relation_label == label)
    }

    pub fn to_json(&self, pretty: bool) -> Result<String, serde_json::Error> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphOptions {
    pub ast_edges: bool,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self { ast_edges: true }
    }
}

/// Everything the graph is assembled from.
pub struct GraphInput<'g, 'a> {
    pub index: &'g AstIndex<'a>,
    pub factory: &'g FlowNodeFactory,
    pub scopes: &'g ScopeTree,
    pub cfgs: &'g [Cfg],
    pub links: &'g [CallLink],
    /// Flow nodes outside every CFG, such as the LocalStorage node.
    pub extra_nodes: &'g [FlowNodeId],
}

fn node_name(node: &Node) -> Option<String> {
    match &node.kind {
        NodeKind::Identifier { name } => Some(name.clone()),
        NodeKind::UnaryExpression { operator, .. }
        | NodeKind::UpdateExpression { operator, .. }
        | NodeKind::BinaryExpression { operator, .. }
        | NodeKind::LogicalExpression { operator, .. }
        | NodeKind::AssignmentExpression { operator, .. } => Some(operator.clone()),
        NodeKind::VariableDeclarator { init: Some(_), .. } => Some("=".to_string()),
        _ => None,
    }
}

fn node_kind(node: &Node) -> Option<&'static str> {
    match &node.kind {
        NodeKind::VariableDeclaration { kind, .. } => Some(kind.as_str()),
        NodeKind::Property { kind, .. } => Some(match kind {
            PropertyKind::Init => "init",
            PropertyKind::Get => "get",
            PropertyKind::Set => "set",
        }),
        NodeKind::MethodDefinition { kind, .. } => Some(match kind {
            MethodKind::Constructor => "constructor",
            MethodKind::Method => "method",
            MethodKind::Get => "get",
            MethodKind::Set => "set",
        }),
        _ => None,
    }
}

pub fn graph_node(node: &Node) -> GraphNode {
    let (literal_value, raw_text) = match &node.kind {
        NodeKind::Literal { value, raw, .. } => (Some(value.clone()), raw.clone()),
        _ => (None, None),
    };
    GraphNode {
        id: node.id.0,
        node_type: node.type_name().to_string(),
        kind: node_kind(node).map(str::to_string),
        name: node_name(node),
        range: Some(node.range),
        location: Some(node.loc),
        literal_value,
        raw_text,
        is_async: node.as_function().is_some_and(|f| f.is_async),
        semantic_type: Vec::new(),
    }
}

fn edge(from_id: u32, to_id: u32, relation_label: RelationLabel, relation_type: &str) -> GraphEdge {
    GraphEdge {
        from_id,
        to_id,
        relation_label,
        relation_type: relation_type.to_string(),
        args: EdgeArgs::default(),
    }
}

/// Assembles the program graph.
pub fn build_graph(input: &GraphInput<'_, '_>, options: GraphOptions) -> Graph {
    let factory = input.factory;
    let mut nodes: BTreeMap<u32, GraphNode> = BTreeMap::new();
    let mut edges: BTreeSet<GraphEdge> = BTreeSet::new();

    for node in input.index.nodes_by_id() {
        nodes.insert(node.id.0, graph_node(node));
        if options.ast_edges {
            for child in node.children() {
                let mut ast_edge = edge(node.id.0, child.node.id.0, RelationLabel::Ast, child.property);
                ast_edge.args.arg = child.index;
                edges.insert(ast_edge);
            }
        }
    }

    let flow_nodes: Vec<FlowNodeId> = input
        .cfgs
        .iter()
        .flat_map(|cfg| cfg.nodes.iter().copied())
        .chain(input.extra_nodes.iter().copied())
        .collect();

    for &id in &flow_nodes {
        let flow = factory.get(id);
        let from = flow.export_id();
        if flow.ast.is_none() {
            nodes.entry(from).or_insert_with(|| GraphNode {
                id: from,
                node_type: flow.kind.as_str().to_string(),
                kind: None,
                name: None,
                range: None,
                location: Some(SourceLocation {
                    start: crate::ast::Position {
                        line: flow.line,
                        column: flow.column,
                    },
                    end: crate::ast::Position {
                        line: flow.line,
                        column: flow.column,
                    },
                }),
                literal_value: None,
                raw_text: None,
                is_async: false,
                semantic_type: Vec::new(),
            });
        }
        for successor in factory.successors(id) {
            let to = factory.get(successor.node).export_id();
            edges.insert(edge(from, to, RelationLabel::Cfg, successor.kind.relation_type()));
        }
    }

    for pair in du_pairs(factory, flow_nodes.iter().copied()) {
        let mut data_edge = edge(
            factory.get(pair.def_node).export_id(),
            factory.get(pair.use_node).export_id(),
            RelationLabel::Pdg,
            "DataFlow",
        );
        data_edge.args.var = Some(pair.var.name().to_string());
        edges.insert(data_edge);
    }

    for link in input.links {
        let from = factory.get(link.call).export_id();
        for &callee in &link.callees {
            if let Some(function) = input.scopes.get(callee).ast {
                edges.insert(edge(from, function.0, RelationLabel::CallGraph, "CallFlow"));
            }
        }
    }

    let graph = Graph {
        nodes: nodes.into_values().collect(),
        edges: edges.into_iter().collect(),
    };
    tracing::debug!(nodes = graph.nodes.len(), edges = graph.edges.len(), "graph materialized");
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::IdGenerator;
    use crate::parser::ParsedFile;

    fn parse(code: &str) -> Node {
        ParsedFile::from_source("test.js", code, &IdGenerator::new())
            .into_program()
            .expect("parse failed")
    }

    fn find<'a>(program: &'a Node, type_name: &str) -> &'a Node {
        let mut found = None;
        program.walk(&mut |node| {
            if found.is_none() && node.type_name() == type_name {
                found = Some(node);
            }
        });
        found.expect("node not found")
    }

    #[test]
    fn declarator_with_initializer_is_named_by_operator() {
        let program = parse("let x = 'a' + 1;");

        let declaration = graph_node(find(&program, "VariableDeclaration"));
        let declarator = graph_node(find(&program, "VariableDeclarator"));
        let binary = graph_node(find(&program, "BinaryExpression"));

        assert_eq!(declaration.kind.as_deref(), Some("let"));
        assert_eq!(declarator.name.as_deref(), Some("="));
        assert_eq!(binary.name.as_deref(), Some("+"));
    }

    #[test]
    fn literals_carry_value_and_raw_text() {
        let program = parse("f('a');");
        let literal = graph_node(find(&program, "Literal"));
        let identifier = graph_node(find(&program, "Identifier"));

        assert_eq!(literal.literal_value, Some(serde_json::json!("a")));
        assert_eq!(literal.raw_text.as_deref(), Some("'a'"));
        assert_eq!(identifier.name.as_deref(), Some("f"));
        assert!(identifier.raw_text.is_none());
    }

    #[test]
    fn async_functions_are_flagged() {
        let program = parse("async function load() {}");

        assert!(graph_node(find(&program, "FunctionDeclaration")).is_async);
    }

    #[test]
    fn semantic_type_is_always_serialized() {
        let program = parse("x;");
        let json = serde_json::to_value(graph_node(find(&program, "Identifier"))).unwrap();

        assert_eq!(json["semanticType"], serde_json::json!([]));
        assert_eq!(json["type"], "Identifier");
        assert!(json.get("rawText").is_none());
    }

    #[test]
    fn edge_serialization_uses_relation_labels() {
        let mut data = edge(1, 2, RelationLabel::Pdg, "DataFlow");
        data.args.var = Some("x".to_string());
        let json = serde_json::to_value(&data).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "fromId": 1,
                "toId": 2,
                "relationLabel": "PDG_parentOf",
                "relationType": "DataFlow",
                "args": { "var": "x" }
            })
        );
    }

    #[test]
    fn summary_counts_edges_per_label() {
        let graph = Graph {
            nodes: Vec::new(),
            edges: vec![
                edge(1, 2, RelationLabel::Ast, "body"),
                edge(2, 3, RelationLabel::Cfg, "Epsilon"),
                edge(3, 4, RelationLabel::Cfg, "Epsilon"),
            ],
        };
        let summary = graph.summary();

        assert_eq!(summary.edges["AST_parentOf"], 1);
        assert_eq!(summary.edges["CFG_parentOf"], 2);
        assert!(!summary.edges.contains_key("PDG_parentOf"));
    }
}

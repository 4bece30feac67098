//! Available expressions: the "must" client of the solver
//!
//! A binary expression is available at a node when every path from the
//! entry evaluates it and no operand is reassigned afterwards.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::ast::{AstIndex, Node, NodeKind};
use crate::cfg::Cfg;
use crate::defuse::evaluated_expressions;
use crate::flow::{FlowNodeFactory, FlowNodeId};

use super::{Direction, Merge, Options};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Expression {
    /// Canonical source form, fully parenthesized.
    pub text: String,
    pub operands: BTreeSet<String>,
}

fn canonical(node: &Node, operands: &mut BTreeSet<String>) -> Option<String> {
    match &node.kind {
        NodeKind::Identifier { name } => {
            operands.insert(name.clone());
            Some(name.clone())
        }
        NodeKind::Literal { value, raw, .. } => {
            Some(raw.clone().unwrap_or_else(|| value.to_string()))
        }
        NodeKind::MemberExpression {
            object,
            property,
            computed: false,
            ..
        } => {
            let object = canonical(object, operands)?;
            Some(format!("{object}.{}", property.property_name()?))
        }
        NodeKind::MemberExpression {
            object, property, ..
        } => {
            let object = canonical(object, operands)?;
            let property = canonical(property, operands)?;
            Some(format!("{object}[{property}]"))
        }
        NodeKind::BinaryExpression {
            operator,
            left,
            right,
        } => {
            let left = canonical(left, operands)?;
            let right = canonical(right, operands)?;
            Some(format!("({left} {operator} {right})"))
        }
        _ => None,
    }
}

fn collect(node: &Node, out: &mut Vec<Expression>) {
    if node.is_function() {
        return;
    }
    if let NodeKind::BinaryExpression { .. } = node.kind {
        let mut operands = BTreeSet::new();
        if let Some(text) = canonical(node, &mut operands) {
            out.push(Expression { text, operands });
        }
    }
    for child in node.children() {
        collect(child.node, out);
    }
}

/// Binary expressions evaluated by a flow node.
fn generated(factory: &FlowNodeFactory, index: &AstIndex<'_>, id: FlowNodeId) -> Vec<Expression> {
    let node = factory.get(id);
    let Some(ast) = node.ast.and_then(|ast| index.get(ast)) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for expression in evaluated_expressions(node.kind, ast) {
        collect(expression, &mut out);
    }
    out
}

/// Expressions available on entry to each node of `cfg`, by canonical text.
///
/// Operand kills come from the nodes' KILL sets, so def-use annotation
/// must have run on the CFG.
pub fn available_expressions(
    factory: &FlowNodeFactory,
    index: &AstIndex<'_>,
    cfg: &Cfg,
) -> HashMap<FlowNodeId, BTreeSet<String>> {
    let options = Options {
        direction: Direction::Forward,
        merge: Merge::Intersection,
        start: HashSet::new(),
    };
    let solution = super::solve(factory, &[cfg.entry], &options, |id, input| {
        let killed: HashSet<&str> = factory
            .get(id)
            .gen_kill
            .as_ref()
            .map(|gen_kill| gen_kill.kill.iter().map(|var| var.name()).collect())
            .unwrap_or_default();
        let mut out: HashSet<Expression> = input.clone();
        out.extend(generated(factory, index, id));
        out.retain(|expression| !expression.operands.iter().any(|name| killed.contains(name.as_str())));
        out
    });

    cfg.nodes
        .iter()
        .filter_map(|&id| {
            let input = solution.input(id)?;
            Some((id, input.iter().map(|e| e.text.clone()).collect()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::ast::IdGenerator;
    use crate::cfg::build_cfg_for_root;
    use crate::defuse::annotate_cfg;
    use crate::parser::ParsedFile;
    use crate::scope::build_scope_tree;

    fn available_by_line(code: &str) -> Vec<(u32, BTreeSet<String>)> {
        let ids = Arc::new(IdGenerator::new());
        let program = ParsedFile::from_source("test.js", code, &ids)
            .into_program()
            .expect("parse failed");
        let scopes = build_scope_tree(&program);
        let page = scopes.pages()[0];
        let mut index = AstIndex::new();
        index.insert_root(&program).unwrap();
        let mut factory = FlowNodeFactory::new(ids);
        let cfg = build_cfg_for_root(&mut factory, page, "page", &program);
        annotate_cfg(&mut factory, &scopes, &index, &cfg);

        let available = available_expressions(&factory, &index, &cfg);
        let mut out: Vec<(u32, BTreeSet<String>)> = cfg
            .nodes
            .iter()
            .filter(|&&id| factory.get(id).ast.is_some())
            .map(|&id| (factory.get(id).line, available[&id].clone()))
            .collect();
        out.sort_by_key(|(line, _)| *line);
        out
    }

    fn at(lines: &[(u32, BTreeSet<String>)], line: u32) -> Vec<&str> {
        lines
            .iter()
            .find(|(l, _)| *l == line)
            .map(|(_, set)| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    #[test]
    fn expression_stays_available_until_operand_changes() {
        let lines = available_by_line("var s = a + b;\nvar t = a + b;\na = 0;\nvar u = 1;");

        assert_eq!(at(&lines, 2), vec!["(a + b)"]);
        assert_eq!(at(&lines, 3), vec!["(a + b)"]);
        assert!(at(&lines, 4).is_empty());
    }

    #[test]
    fn expression_on_one_branch_is_not_available_at_join() {
        let lines = available_by_line("if (c) {\n  x = a * b;\n} else {\n  y = a * b;\n  z = a - b;\n}\nf();");

        assert_eq!(at(&lines, 7), vec!["(a * b)"]);
    }

    #[test]
    fn self_referencing_assignment_is_not_available() {
        let lines = available_by_line("var i = 0;\ni = i + 1;\nf();");

        assert!(at(&lines, 3).is_empty());
    }
}

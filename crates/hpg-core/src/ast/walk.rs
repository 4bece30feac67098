//! Uniform child enumeration over the closed node set

use super::{Class, Function, Node, NodeKind};

/// One outgoing AST edge: the parent's property name, the position inside
/// list-valued properties, and the child itself.
#[derive(Debug, Clone, Copy)]
pub struct Child<'a> {
    pub property: &'static str,
    pub index: Option<usize>,
    pub node: &'a Node,
}

#[derive(Default)]
struct Children<'a>(Vec<Child<'a>>);

impl<'a> Children<'a> {
    fn one(&mut self, property: &'static str, node: &'a Node) {
        self.0.push(Child {
            property,
            index: None,
            node,
        });
    }

    fn opt(&mut self, property: &'static str, node: &'a Option<Box<Node>>) {
        if let Some(node) = node.as_deref() {
            self.one(property, node);
        }
    }

    fn list(&mut self, property: &'static str, nodes: &'a [Node]) {
        for (index, node) in nodes.iter().enumerate() {
            self.0.push(Child {
                property,
                index: Some(index),
                node,
            });
        }
    }

    fn sparse(&mut self, property: &'static str, nodes: &'a [Option<Node>]) {
        for (index, node) in nodes.iter().enumerate() {
            if let Some(node) = node {
                self.0.push(Child {
                    property,
                    index: Some(index),
                    node,
                });
            }
        }
    }

    fn function(&mut self, function: &'a Function) {
        self.opt("id", &function.id);
        self.list("params", &function.params);
        self.one("body", &function.body);
    }

    fn class(&mut self, class: &'a Class) {
        self.opt("id", &class.id);
        self.opt("superClass", &class.super_class);
        self.one("body", &class.body);
    }
}

impl Node {
    pub fn children(&self) -> Vec<Child<'_>> {
        let mut out = Children::default();
        match &self.kind {
            NodeKind::Program { body, .. } => out.list("body", body),
            NodeKind::ExpressionStatement { expression } => out.one("expression", expression),
            NodeKind::BlockStatement { body } => out.list("body", body),
            NodeKind::EmptyStatement | NodeKind::DebuggerStatement => {}
            NodeKind::WithStatement { object, body } => {
                out.one("object", object);
                out.one("body", body);
            }
            NodeKind::ReturnStatement { argument } => out.opt("argument", argument),
            NodeKind::LabeledStatement { label, body } => {
                out.one("label", label);
                out.one("body", body);
            }
            NodeKind::BreakStatement { label } | NodeKind::ContinueStatement { label } => {
                out.opt("label", label)
            }
            NodeKind::IfStatement {
                test,
                consequent,
                alternate,
            } => {
                out.one("test", test);
                out.one("consequent", consequent);
                out.opt("alternate", alternate);
            }
            NodeKind::SwitchStatement {
                discriminant,
                cases,
            } => {
                out.one("discriminant", discriminant);
                out.list("cases", cases);
            }
            NodeKind::SwitchCase { test, consequent } => {
                out.opt("test", test);
                out.list("consequent", consequent);
            }
            NodeKind::ThrowStatement { argument } => out.one("argument", argument),
            NodeKind::TryStatement {
                block,
                handler,
                finalizer,
            } => {
                out.one("block", block);
                out.opt("handler", handler);
                out.opt("finalizer", finalizer);
            }
            NodeKind::CatchClause { param, body } => {
                out.opt("param", param);
                out.one("body", body);
            }
            NodeKind::WhileStatement { test, body } => {
                out.one("test", test);
                out.one("body", body);
            }
            NodeKind::DoWhileStatement { body, test } => {
                out.one("body", body);
                out.one("test", test);
            }
            NodeKind::ForStatement {
                init,
                test,
                update,
                body,
            } => {
                out.opt("init", init);
                out.opt("test", test);
                out.opt("update", update);
                out.one("body", body);
            }
            NodeKind::ForInStatement { left, right, body }
            | NodeKind::ForOfStatement {
                left, right, body, ..
            } => {
                out.one("left", left);
                out.one("right", right);
                out.one("body", body);
            }
            NodeKind::FunctionDeclaration(function)
            | NodeKind::FunctionExpression(function)
            | NodeKind::ArrowFunctionExpression(function) => out.function(function),
            NodeKind::VariableDeclaration { declarations, .. } => {
                out.list("declarations", declarations)
            }
            NodeKind::VariableDeclarator { id, init } => {
                out.one("id", id);
                out.opt("init", init);
            }
            NodeKind::ClassDeclaration(class) | NodeKind::ClassExpression(class) => {
                out.class(class)
            }
            NodeKind::ImportDeclaration { specifiers, source } => {
                out.list("specifiers", specifiers);
                out.one("source", source);
            }
            NodeKind::ImportSpecifier { local, imported } => {
                out.one("imported", imported);
                out.one("local", local);
            }
            NodeKind::ImportDefaultSpecifier { local }
            | NodeKind::ImportNamespaceSpecifier { local } => out.one("local", local),
            NodeKind::ExportNamedDeclaration {
                declaration,
                specifiers,
                source,
            } => {
                out.opt("declaration", declaration);
                out.list("specifiers", specifiers);
                out.opt("source", source);
            }
            NodeKind::ExportSpecifier { local, exported } => {
                out.one("local", local);
                out.one("exported", exported);
            }
            NodeKind::ExportDefaultDeclaration { declaration } => {
                out.one("declaration", declaration)
            }
            NodeKind::ExportAllDeclaration { source, exported } => {
                out.one("source", source);
                out.opt("exported", exported);
            }
            NodeKind::Identifier { .. }
            | NodeKind::Literal { .. }
            | NodeKind::ThisExpression
            | NodeKind::Super
            | NodeKind::TemplateElement { .. }
            | NodeKind::Unsupported => {}
            NodeKind::ArrayExpression { elements } | NodeKind::ArrayPattern { elements } => {
                out.sparse("elements", elements)
            }
            NodeKind::ObjectExpression { properties } | NodeKind::ObjectPattern { properties } => {
                out.list("properties", properties)
            }
            NodeKind::Property { key, value, .. } => {
                out.one("key", key);
                out.one("value", value);
            }
            NodeKind::ClassBody { body } => out.list("body", body),
            NodeKind::MethodDefinition { key, value, .. } => {
                out.one("key", key);
                out.one("value", value);
            }
            NodeKind::PropertyDefinition { key, value, .. } => {
                out.one("key", key);
                out.opt("value", value);
            }
            NodeKind::UnaryExpression { argument, .. }
            | NodeKind::UpdateExpression { argument, .. }
            | NodeKind::SpreadElement { argument }
            | NodeKind::AwaitExpression { argument }
            | NodeKind::RestElement { argument } => out.one("argument", argument),
            NodeKind::BinaryExpression { left, right, .. }
            | NodeKind::LogicalExpression { left, right, .. }
            | NodeKind::AssignmentExpression { left, right, .. }
            | NodeKind::AssignmentPattern { left, right } => {
                out.one("left", left);
                out.one("right", right);
            }
            NodeKind::MemberExpression {
                object, property, ..
            } => {
                out.one("object", object);
                out.one("property", property);
            }
            NodeKind::ConditionalExpression {
                test,
                consequent,
                alternate,
            } => {
                out.one("test", test);
                out.one("consequent", consequent);
                out.one("alternate", alternate);
            }
            NodeKind::CallExpression {
                callee, arguments, ..
            }
            | NodeKind::NewExpression { callee, arguments } => {
                out.one("callee", callee);
                out.list("arguments", arguments);
            }
            NodeKind::SequenceExpression { expressions } => out.list("expressions", expressions),
            NodeKind::TemplateLiteral {
                quasis,
                expressions,
            } => {
                out.list("quasis", quasis);
                out.list("expressions", expressions);
            }
            NodeKind::TaggedTemplateExpression { tag, quasi } => {
                out.one("tag", tag);
                out.one("quasi", quasi);
            }
            NodeKind::YieldExpression { argument, .. } => out.opt("argument", argument),
            NodeKind::ChainExpression { expression } => out.one("expression", expression),
            NodeKind::MetaProperty { meta, property } => {
                out.one("meta", meta);
                out.one("property", property);
            }
        }
        out.0
    }

    /// Pre-order traversal of this node and all of its descendants.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Node)) {
        visit(self);
        for child in self.children() {
            child.node.walk(visit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AstId;

    fn program() -> Node {
        Node::from_json(
            r#"{"type": "Program", "_id": 1, "body": [
                {"type": "ExpressionStatement", "_id": 2, "expression":
                    {"type": "CallExpression", "_id": 3,
                     "callee": {"type": "Identifier", "_id": 4, "name": "f"},
                     "arguments": [
                        {"type": "Identifier", "_id": 5, "name": "a"},
                        {"type": "Literal", "_id": 6, "value": "b", "raw": "'b'"}
                     ]}}
            ]}"#,
        )
        .unwrap()
    }

    #[test]
    fn children_report_property_and_position() {
        let program = program();
        let NodeKind::Program { body, .. } = &program.kind else {
            unreachable!()
        };
        let NodeKind::ExpressionStatement { expression } = &body[0].kind else {
            unreachable!()
        };

        let children = expression.children();
        let summary: Vec<_> = children
            .iter()
            .map(|c| (c.property, c.index, c.node.id))
            .collect();

        assert_eq!(
            summary,
            vec![
                ("callee", None, AstId(4)),
                ("arguments", Some(0), AstId(5)),
                ("arguments", Some(1), AstId(6)),
            ]
        );
    }

    #[test]
    fn walk_is_pre_order() {
        let program = program();
        let mut seen = Vec::new();
        program.walk(&mut |node| seen.push(node.id.0));

        assert_eq!(seen, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn sparse_arrays_keep_hole_positions() {
        let node = Node::from_json(
            r#"{"type": "ArrayExpression", "_id": 1, "elements": [
                null, {"type": "Identifier", "_id": 2, "name": "x"}
            ]}"#,
        )
        .unwrap();

        let children = node.children();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].index, Some(1));
    }
}

//! What a single flow node reads and writes, read off its AST

use crate::ast::{Node, NodeKind};
use crate::flow::FlowKind;

use super::DefKind;

/// Methods treated as in-place mutation of their receiver.
const MUTATING_METHODS: &[&str] = &[
    "push", "pop", "shift", "unshift", "splice", "sort", "reverse", "fill", "set", "add", "delete",
    "clear", "setItem",
];

fn is_mutating_method(name: &str) -> bool {
    MUTATING_METHODS.contains(&name) || name.starts_with("append") || name.starts_with("remove")
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum WriteKind<'n> {
    /// The def kind is inferred from this expression, which is also the
    /// def's value.
    Value(&'n Node),
    Fixed {
        kind: DefKind,
        value: Option<&'n Node>,
    },
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Write<'n> {
    pub name: &'n str,
    pub kind: WriteKind<'n>,
    /// Strong writes kill earlier definitions; weak ones (member stores,
    /// mutating calls) only add one.
    pub strong: bool,
}

#[derive(Debug, Default)]
pub(crate) struct Effects<'n> {
    pub writes: Vec<Write<'n>>,
    pub reads: Vec<&'n str>,
}

/// The expressions a flow node evaluates, given the AST node it wraps.
pub(crate) fn evaluated_expressions(kind: FlowKind, ast: &Node) -> Vec<&Node> {
    if kind == FlowKind::Entry {
        return Vec::new();
    }
    match &ast.kind {
        NodeKind::ExpressionStatement { expression } => vec![expression],
        NodeKind::VariableDeclaration { declarations, .. } => declarations
            .iter()
            .filter_map(|declarator| match &declarator.kind {
                NodeKind::VariableDeclarator { init, .. } => init.as_deref(),
                _ => None,
            })
            .collect(),
        NodeKind::IfStatement { test, .. }
        | NodeKind::WhileStatement { test, .. }
        | NodeKind::DoWhileStatement { test, .. } => vec![test],
        NodeKind::ForStatement { test, .. } => test.as_deref().into_iter().collect(),
        NodeKind::ForInStatement { right, .. } | NodeKind::ForOfStatement { right, .. } => {
            vec![right]
        }
        NodeKind::SwitchStatement { discriminant, .. } => vec![discriminant],
        NodeKind::SwitchCase { test, .. } => test.as_deref().into_iter().collect(),
        NodeKind::ReturnStatement { argument } => argument.as_deref().into_iter().collect(),
        NodeKind::ThrowStatement { argument } => vec![argument],
        NodeKind::WithStatement { object, .. } => vec![object],
        NodeKind::ClassDeclaration(class) => class.super_class.as_deref().into_iter().collect(),
        NodeKind::ExportNamedDeclaration {
            declaration: Some(declaration),
            ..
        } => evaluated_expressions(kind, declaration),
        NodeKind::ExportDefaultDeclaration { declaration } => {
            if declaration.is_function() {
                Vec::new()
            } else {
                evaluated_expressions(kind, declaration)
            }
        }
        NodeKind::Program { .. }
        | NodeKind::BlockStatement { .. }
        | NodeKind::EmptyStatement
        | NodeKind::DebuggerStatement
        | NodeKind::LabeledStatement { .. }
        | NodeKind::BreakStatement { .. }
        | NodeKind::ContinueStatement { .. }
        | NodeKind::TryStatement { .. }
        | NodeKind::CatchClause { .. }
        | NodeKind::FunctionDeclaration(_)
        | NodeKind::ImportDeclaration { .. }
        | NodeKind::ExportNamedDeclaration { .. }
        | NodeKind::ExportAllDeclaration { .. } => Vec::new(),
        // for-loop init/update expressions and concise arrow bodies
        _ => vec![ast],
    }
}

/// Identifier at the base of a member chain (`a` in `a.b[c].d`).
fn member_root(mut node: &Node) -> Option<&str> {
    loop {
        match &node.kind {
            NodeKind::MemberExpression { object, .. } => node = object,
            NodeKind::ChainExpression { expression } => node = expression,
            NodeKind::Identifier { name } => return Some(name),
            _ => return None,
        }
    }
}

impl<'n> Effects<'n> {
    pub(crate) fn of_flow_node(kind: FlowKind, ast: &'n Node) -> Self {
        let mut effects = Effects::default();
        if kind != FlowKind::Entry {
            effects.bindings(kind, ast);
            for expression in evaluated_expressions(kind, ast) {
                effects.expr(expression);
            }
        }
        effects
    }

    fn write(&mut self, name: &'n str, kind: WriteKind<'n>, strong: bool) {
        self.writes.push(Write { name, kind, strong });
    }

    fn fixed(&mut self, name: &'n str, kind: DefKind) {
        self.write(name, WriteKind::Fixed { kind, value: None }, true);
    }

    /// Names a statement binds besides the assignments inside its expressions.
    fn bindings(&mut self, kind: FlowKind, ast: &'n Node) {
        match &ast.kind {
            NodeKind::VariableDeclaration { declarations, .. } => {
                for declarator in declarations {
                    if let NodeKind::VariableDeclarator { id, init } = &declarator.kind {
                        self.declare(id, init.as_deref());
                    }
                }
            }
            NodeKind::ForInStatement { left, .. } | NodeKind::ForOfStatement { left, .. }
                if kind == FlowKind::Loop =>
            {
                match &left.kind {
                    NodeKind::VariableDeclaration { declarations, .. } => {
                        for declarator in declarations {
                            if let NodeKind::VariableDeclarator { id, .. } = &declarator.kind {
                                self.pattern(id, DefKind::Literal);
                            }
                        }
                    }
                    _ => self.pattern(left, DefKind::Literal),
                }
            }
            NodeKind::CatchClause {
                param: Some(param), ..
            } => self.pattern(param, DefKind::Object),
            NodeKind::ClassDeclaration(class) => {
                if let Some(name) = class.name() {
                    let kind = WriteKind::Fixed {
                        kind: DefKind::Function,
                        value: Some(ast),
                    };
                    self.write(name, kind, true);
                }
            }
            NodeKind::ImportDeclaration { specifiers, .. } => {
                for specifier in specifiers {
                    if let NodeKind::ImportSpecifier { local, .. }
                    | NodeKind::ImportDefaultSpecifier { local }
                    | NodeKind::ImportNamespaceSpecifier { local } = &specifier.kind
                    {
                        if let Some(name) = local.as_identifier() {
                            self.fixed(name, DefKind::Object);
                        }
                    }
                }
            }
            NodeKind::ExportNamedDeclaration {
                declaration: Some(declaration),
                ..
            }
            | NodeKind::ExportDefaultDeclaration { declaration } => {
                self.bindings(kind, declaration)
            }
            _ => {}
        }
    }

    fn declare(&mut self, id: &'n Node, init: Option<&'n Node>) {
        match (id.as_identifier(), init) {
            (Some(name), Some(init)) => self.write(name, WriteKind::Value(init), true),
            (Some(name), None) => self.fixed(name, DefKind::Undefined),
            (None, Some(_)) => self.pattern(id, DefKind::Literal),
            (None, None) => self.pattern(id, DefKind::Undefined),
        }
    }

    /// Binds every identifier of a destructuring pattern with a fixed kind.
    fn pattern(&mut self, pattern: &'n Node, kind: DefKind) {
        match &pattern.kind {
            NodeKind::Identifier { name } => self.fixed(name, kind),
            NodeKind::ObjectPattern { properties } => {
                for property in properties {
                    match &property.kind {
                        NodeKind::Property {
                            key,
                            value,
                            computed,
                            ..
                        } => {
                            if *computed {
                                self.expr(key);
                            }
                            self.pattern(value, kind);
                        }
                        NodeKind::RestElement { argument } => self.pattern(argument, kind),
                        _ => {}
                    }
                }
            }
            NodeKind::ArrayPattern { elements } => {
                for element in elements.iter().flatten() {
                    self.pattern(element, kind);
                }
            }
            NodeKind::RestElement { argument } => self.pattern(argument, kind),
            NodeKind::AssignmentPattern { left, right } => {
                self.expr(right);
                self.pattern(left, kind);
            }
            NodeKind::MemberExpression { .. } => self.member_store(pattern, None, false),
            _ => {}
        }
    }

    /// `o.p = …` and friends: a weak `Object` def of the chain's root.
    ///
    /// A plain store does not read the root; compound stores and updates do.
    fn member_store(&mut self, member: &'n Node, value: Option<&'n Node>, reads_target: bool) {
        if let Some(root) = member_root(member) {
            let kind = WriteKind::Fixed {
                kind: DefKind::Object,
                value,
            };
            self.write(root, kind, false);
        }
        if reads_target {
            self.expr(member);
        } else {
            self.store_target(member);
        }
    }

    /// Reads needed to locate a stored-to member: computed keys and a base
    /// that is not a bare identifier (`a.b().c = v` reads `a`).
    fn store_target(&mut self, mut node: &'n Node) {
        loop {
            match &node.kind {
                NodeKind::MemberExpression {
                    object,
                    property,
                    computed,
                    ..
                } => {
                    if *computed {
                        self.expr(property);
                    }
                    node = object;
                }
                NodeKind::ChainExpression { expression } => node = expression,
                NodeKind::Identifier { .. } => return,
                _ => return self.expr(node),
            }
        }
    }

    fn assign(&mut self, node: &'n Node, operator: &str, left: &'n Node, right: &'n Node) {
        match &left.kind {
            NodeKind::Identifier { name } if operator == "=" => {
                self.write(name, WriteKind::Value(right), true)
            }
            NodeKind::Identifier { name } => {
                self.reads.push(name);
                self.fixed(name, DefKind::Literal);
            }
            NodeKind::MemberExpression { .. } => self.member_store(left, Some(node), operator != "="),
            NodeKind::ObjectPattern { .. } | NodeKind::ArrayPattern { .. } => {
                self.pattern(left, DefKind::Literal)
            }
            _ => self.expr(left),
        }
        self.expr(right);
    }

    fn expr(&mut self, node: &'n Node) {
        match &node.kind {
            NodeKind::Identifier { name } => self.reads.push(name),
            // Function bodies belong to their own scope.
            NodeKind::FunctionExpression(_) | NodeKind::ArrowFunctionExpression(_) => {}
            NodeKind::ClassExpression(class) => {
                if let Some(super_class) = &class.super_class {
                    self.expr(super_class);
                }
            }
            NodeKind::AssignmentExpression {
                operator,
                left,
                right,
            } => self.assign(node, operator, left, right),
            NodeKind::UpdateExpression { argument, .. } => match &argument.kind {
                NodeKind::Identifier { name } => {
                    self.reads.push(name);
                    self.fixed(name, DefKind::Literal);
                }
                NodeKind::MemberExpression { .. } => self.member_store(argument, None, true),
                _ => self.expr(argument),
            },
            NodeKind::MemberExpression {
                object,
                property,
                computed,
                ..
            } => {
                self.expr(object);
                if *computed {
                    self.expr(property);
                }
            }
            NodeKind::CallExpression {
                callee, arguments, ..
            } => {
                if let NodeKind::MemberExpression {
                    property,
                    computed: false,
                    ..
                } = &callee.kind
                {
                    if property.as_identifier().is_some_and(is_mutating_method) {
                        if let Some(root) = member_root(callee) {
                            let kind = WriteKind::Fixed {
                                kind: DefKind::Object,
                                value: None,
                            };
                            self.write(root, kind, false);
                        }
                    }
                }
                self.expr(callee);
                for argument in arguments {
                    self.expr(argument);
                }
            }
            NodeKind::Property {
                key,
                value,
                computed,
                ..
            } => {
                if *computed {
                    self.expr(key);
                }
                self.expr(value);
            }
            NodeKind::MetaProperty { .. }
            | NodeKind::Literal { .. }
            | NodeKind::TemplateElement { .. }
            | NodeKind::ThisExpression
            | NodeKind::Super => {}
            _ => {
                for child in node.children() {
                    self.expr(child.node);
                }
            }
        }
    }
}

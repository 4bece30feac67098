//! Scope tree construction and per-scope variable analysis

use std::collections::BTreeMap;

use crate::ast::{AstId, Node, NodeKind};
use crate::defuse::DefKind;

use super::{ScopeId, ScopeKind, ScopeTree};

const PAGE_OBJECTS: &[&str] = &[
    "String", "Number", "Boolean", "Array", "Object", "Map", "WeakMap", "Set", "Date", "JSON",
    "Math", "Promise", "console",
];

pub(super) fn domain_builtins() -> BTreeMap<String, DefKind> {
    ["localStorage", "sessionStorage"]
        .into_iter()
        .map(|name| (name.to_string(), DefKind::LocalStorage))
        .collect()
}

fn page_builtins() -> BTreeMap<String, DefKind> {
    let mut builtins: BTreeMap<String, DefKind> = ["window", "document"]
        .into_iter()
        .map(|name| (name.to_string(), DefKind::HtmlDom))
        .collect();
    for name in PAGE_OBJECTS {
        builtins.insert(name.to_string(), DefKind::Object);
    }
    builtins
}

/// Collects the identifiers bound by a declaration or assignment pattern.
///
/// Member expressions are valid assignment targets but bind nothing. Any
/// other unexpected shape is skipped with a warning.
pub fn bound_names<'n>(pattern: &'n Node, out: &mut Vec<&'n str>) {
    match &pattern.kind {
        NodeKind::Identifier { name } => out.push(name),
        NodeKind::ObjectPattern { properties } => {
            for property in properties {
                match &property.kind {
                    NodeKind::Property { value, .. } => bound_names(value, out),
                    NodeKind::RestElement { argument } => bound_names(argument, out),
                    _ => malformed(property),
                }
            }
        }
        NodeKind::ArrayPattern { elements } => {
            for element in elements.iter().flatten() {
                bound_names(element, out);
            }
        }
        NodeKind::RestElement { argument } => bound_names(argument, out),
        NodeKind::AssignmentPattern { left, .. } => bound_names(left, out),
        NodeKind::MemberExpression { .. } => {}
        _ => malformed(pattern),
    }
}

fn malformed(node: &Node) {
    tracing::warn!(
        node_type = node.type_name(),
        id = %node.id,
        "skipping malformed binding pattern"
    );
}

/// Declarations found in one scope body, nested functions excluded.
#[derive(Default)]
struct Declarations<'n> {
    params: Vec<&'n str>,
    locals: Vec<&'n str>,
    inner_functions: Vec<(&'n str, AstId)>,
    classes: Vec<(&'n str, AstId)>,
    /// `name = function…` or `var name = function…`: the function node.
    function_values: Vec<(&'n str, AstId, bool)>,
    assigned: Vec<&'n str>,
}

impl<'n> Declarations<'n> {
    fn scan(&mut self, node: &'n Node) {
        match &node.kind {
            NodeKind::FunctionDeclaration(function) => {
                if let Some(name) = function.name() {
                    self.inner_functions.push((name, node.id));
                }
            }
            NodeKind::FunctionExpression(_) | NodeKind::ArrowFunctionExpression(_) => {}
            NodeKind::VariableDeclarator { id, init } => {
                bound_names(id, &mut self.locals);
                if let Some(init) = init {
                    if let (Some(name), true) = (id.as_identifier(), init.is_function()) {
                        self.function_values.push((name, init.id, true));
                    }
                    self.scan(init);
                }
            }
            NodeKind::ClassDeclaration(class) => {
                if let Some(name) = class.name() {
                    self.locals.push(name);
                    self.classes.push((name, node.id));
                }
                if let Some(super_class) = &class.super_class {
                    self.scan(super_class);
                }
            }
            NodeKind::CatchClause { param, body } => {
                if let Some(param) = param {
                    bound_names(param, &mut self.locals);
                }
                self.scan(body);
            }
            NodeKind::ImportSpecifier { local, .. }
            | NodeKind::ImportDefaultSpecifier { local }
            | NodeKind::ImportNamespaceSpecifier { local } => {
                if let Some(name) = local.as_identifier() {
                    self.locals.push(name);
                }
            }
            NodeKind::ForInStatement { left, right, body }
            | NodeKind::ForOfStatement {
                left, right, body, ..
            } => {
                if matches!(left.kind, NodeKind::VariableDeclaration { .. }) {
                    self.scan(left);
                } else {
                    bound_names(left, &mut self.assigned);
                }
                self.scan(right);
                self.scan(body);
            }
            NodeKind::AssignmentExpression {
                operator,
                left,
                right,
            } if operator == "=" => {
                bound_names(left, &mut self.assigned);
                if let (Some(name), true) = (left.as_identifier(), right.is_function()) {
                    self.function_values.push((name, right.id, false));
                }
                if !is_binding_target(left) {
                    self.scan(left);
                }
                self.scan(right);
            }
            _ => {
                for child in node.children() {
                    self.scan(child.node);
                }
            }
        }
    }
}

fn is_binding_target(node: &Node) -> bool {
    matches!(
        node.kind,
        NodeKind::Identifier { .. } | NodeKind::ObjectPattern { .. } | NodeKind::ArrayPattern { .. }
    )
}

impl ScopeTree {
    /// Adds `program` as a new page under the domain and analyzes every
    /// scope it contains.
    pub fn add_page(&mut self, program: &Node) -> ScopeId {
        let name = format!("{}.$PAGE_{}", super::DOMAIN_SCOPE_NAME, self.pages.len() + 1);
        let page = self.create_scope(ScopeKind::Page, name, self.domain, program);
        self.arena[page].builtins = page_builtins();
        self.pages.push(page);

        let mut roots = vec![(page, program)];
        self.collect_function_scopes(program, page, &mut roots);

        // Parents come first, so outer declarations are known when an inner
        // assignment is classified as a discovered global.
        for (scope, root) in roots {
            self.analyze_variables(scope, root);
        }

        page
    }

    fn collect_function_scopes<'n>(
        &mut self,
        node: &'n Node,
        current: ScopeId,
        roots: &mut Vec<(ScopeId, &'n Node)>,
    ) {
        for child in node.children() {
            let child = child.node;
            if let Some(function) = child.as_function() {
                let parent_name = self.arena[current].name.clone();
                let (kind, name) = match function.name() {
                    Some(name) => (ScopeKind::Function, format!("{parent_name}.{name}")),
                    None => {
                        let parent = &mut self.arena[current];
                        parent.anonymous_children += 1;
                        (
                            ScopeKind::AnonymousFunction,
                            format!("{parent_name}.$ANONYMOUS_FUN_{}", parent.anonymous_children),
                        )
                    }
                };
                let scope = self.create_scope(kind, name, current, child);
                roots.push((scope, child));
                self.collect_function_scopes(child, scope, roots);
            } else {
                self.collect_function_scopes(child, current, roots);
            }
        }
    }

    fn analyze_variables(&mut self, scope: ScopeId, root: &Node) {
        let mut decls = Declarations::default();
        match (&root.kind, root.as_function()) {
            (_, Some(function)) => {
                for param in &function.params {
                    bound_names(param, &mut decls.params);
                    decls.scan(param);
                }
                decls.scan(&function.body);
            }
            (NodeKind::Program { body, .. }, None) => {
                for stmt in body {
                    decls.scan(stmt);
                }
            }
            _ => return,
        }

        let page = self.page_of(scope);
        let target = &mut self.arena[scope];
        for name in decls.params {
            if !target.params.iter().any(|p| p == name) {
                target.params.push(name.to_string());
            }
        }
        for name in decls.locals {
            target.locals.insert(name.to_string());
        }
        for (name, id) in &decls.classes {
            target.classes.entry(name.to_string()).or_default().push(*id);
        }
        let mut bindings = Vec::new();
        for (name, id) in &decls.inner_functions {
            target
                .inner_functions
                .entry(name.to_string())
                .or_default()
                .push(*id);
            bindings.push((scope, *name, *id));
        }

        for name in decls.assigned {
            if self.lookup(scope, name).is_none() {
                if let Some(page) = page {
                    tracing::debug!(name, "discovered global");
                    self.arena[page].globals.insert(name.to_string());
                }
            }
        }

        for (name, id, declared) in decls.function_values {
            let owner = if declared {
                Some(scope)
            } else {
                self.lookup(scope, name).map(|(owner, _)| owner)
            };
            if let Some(owner) = owner {
                bindings.push((owner, name, id));
            }
        }

        for (owner, name, id) in bindings {
            if let Some(function_scope) = self.scope_of_ast(id) {
                self.arena[owner]
                    .function_bindings
                    .entry(name.to_string())
                    .or_default()
                    .push(function_scope);
            }
        }
    }
}

//! Call-target resolution
//!
//! Targets are found through the reaching definitions of the call site:
//! a callee name maps to the function its reaching `Function` defs point at,
//! and a method call `o.m()` looks `m` up in whatever the reaching defs of
//! `o` were built from. Only direct `a = b` alias chains are followed;
//! copies through array slots or `Object.assign` are not tracked.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::ast::{AstId, AstIndex, MethodKind, Node, NodeKind};
use crate::defuse::{Def, DefKind};
use crate::flow::{FlowNodeFactory, FlowNodeId};
use crate::scope::{ScopeId, ScopeTree};

static TIMER_CALLBACK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_$][\w$]*)\s*\(").expect("Invalid regex pattern")
});

/// How the arguments of a call map onto the callee's parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Binding {
    /// Parameter `i` receives argument `i + shift`.
    Shift(usize),
    /// `f.apply(this, args)`: every parameter receives an `Object`.
    AllObject,
    /// Timer callbacks are invoked without the caller's arguments.
    Unbound,
}

#[derive(Debug)]
pub(crate) struct Resolution {
    pub callees: Vec<ScopeId>,
    pub binding: Binding,
}

/// `(node, name)` pairs already followed, so alias cycles terminate.
pub(crate) type Visited = HashSet<(FlowNodeId, String)>;

pub(crate) struct Resolver<'r, 'a> {
    pub factory: &'r FlowNodeFactory,
    pub scopes: &'r ScopeTree,
    pub index: &'r AstIndex<'a>,
}

fn strip(mut node: &Node) -> &Node {
    while let NodeKind::ChainExpression { expression } = &node.kind {
        node = expression;
    }
    node
}

fn dedup(mut scopes: Vec<ScopeId>) -> Vec<ScopeId> {
    let mut seen = HashSet::new();
    scopes.retain(|scope| seen.insert(*scope));
    scopes
}

fn is_timer(callee: &Node) -> bool {
    match &callee.kind {
        NodeKind::Identifier { name } => name == "setTimeout",
        NodeKind::MemberExpression {
            object,
            property,
            computed: false,
            ..
        } => object.as_identifier() == Some("window") && property.as_identifier() == Some("setTimeout"),
        _ => false,
    }
}

/// The callee and argument list of a call or `new` expression.
pub(crate) fn call_parts(call: &Node) -> Option<(&Node, &[Node])> {
    match &call.kind {
        NodeKind::CallExpression {
            callee, arguments, ..
        }
        | NodeKind::NewExpression { callee, arguments } => Some((strip(callee), arguments)),
        _ => None,
    }
}

impl<'r, 'a> Resolver<'r, 'a> {
    fn node_scope(&self, id: FlowNodeId) -> ScopeId {
        self.factory.get(id).scope.unwrap_or_else(|| self.scopes.domain())
    }

    /// Definitions of `name` (as seen from `scope`) reaching flow node `at`.
    fn reaching(&self, at: FlowNodeId, scope: ScopeId, name: &str) -> Vec<Def> {
        let Some(var) = self.scopes.resolve(scope, name) else {
            return Vec::new();
        };
        self.factory
            .get(at)
            .reach_ins
            .iter()
            .filter(|vd| vd.var == var)
            .map(|vd| vd.def)
            .collect()
    }

    fn ast(&self, id: Option<AstId>) -> Option<&'a Node> {
        self.index.get(id?)
    }

    /// The scope a function or class value invokes.
    fn function_scope(&self, value: &Node) -> Option<ScopeId> {
        match &value.kind {
            _ if value.is_function() => self.scopes.scope_of_ast(value.id),
            NodeKind::ClassDeclaration(class) | NodeKind::ClassExpression(class) => {
                let NodeKind::ClassBody { body } = &class.body.kind else {
                    return None;
                };
                body.iter().find_map(|member| match &member.kind {
                    NodeKind::MethodDefinition {
                        kind: MethodKind::Constructor,
                        value,
                        ..
                    } => self.scopes.scope_of_ast(value.id),
                    _ => None,
                })
            }
            _ => None,
        }
    }

    pub fn resolve_call(&self, site: FlowNodeId, call: &Node) -> Resolution {
        let scope = self.node_scope(site);
        let mut visited = Visited::new();
        let Some((callee, arguments)) = call_parts(call) else {
            return Resolution {
                callees: Vec::new(),
                binding: Binding::Unbound,
            };
        };

        if is_timer(callee) {
            let callees = match arguments.first().map(|arg| &arg.kind) {
                Some(NodeKind::Literal { .. }) => arguments[0]
                    .as_string_literal()
                    .and_then(|code| TIMER_CALLBACK.captures(code))
                    .and_then(|captures| captures.get(1))
                    .map(|name| self.name_targets(site, scope, name.as_str(), &mut visited))
                    .unwrap_or_default(),
                Some(_) => self.expr_targets(site, scope, &arguments[0], &mut visited),
                None => Vec::new(),
            };
            return Resolution {
                callees,
                binding: Binding::Unbound,
            };
        }

        if let NodeKind::MemberExpression {
            object,
            property,
            computed: false,
            ..
        } = &callee.kind
        {
            let binding = match property.as_identifier() {
                Some("call") => Some(Binding::Shift(1)),
                Some("apply") => Some(Binding::AllObject),
                _ => None,
            };
            if let Some(binding) = binding {
                let callees = self.expr_targets(site, scope, object, &mut visited);
                if !callees.is_empty() {
                    return Resolution { callees, binding };
                }
            }
        }

        Resolution {
            callees: self.expr_targets(site, scope, callee, &mut visited),
            binding: Binding::Shift(0),
        }
    }

    /// Function scopes an expression in callee position may evaluate to.
    pub fn expr_targets(
        &self,
        at: FlowNodeId,
        scope: ScopeId,
        expr: &Node,
        visited: &mut Visited,
    ) -> Vec<ScopeId> {
        let expr = strip(expr);
        match &expr.kind {
            NodeKind::Identifier { name } => self.name_targets(at, scope, name, visited),
            NodeKind::MemberExpression {
                object,
                property,
                computed: false,
                ..
            } => match (strip(object).as_identifier(), property.property_name()) {
                (Some(object), Some(property)) => {
                    self.member_targets(at, scope, object, property, visited)
                }
                _ => Vec::new(),
            },
            _ => self.function_scope(expr).into_iter().collect(),
        }
    }

    pub fn name_targets(
        &self,
        at: FlowNodeId,
        scope: ScopeId,
        name: &str,
        visited: &mut Visited,
    ) -> Vec<ScopeId> {
        if !visited.insert((at, name.to_string())) {
            return Vec::new();
        }
        let defs = self.reaching(at, scope, name);

        // Redeclarations: the lexically last function wins.
        let latest = defs
            .iter()
            .filter(|def| def.kind == DefKind::Function)
            .filter_map(|def| self.ast(def.value))
            .max_by_key(|value| value.range.start());
        if let Some(target) = latest.and_then(|value| self.function_scope(value)) {
            return vec![target];
        }

        let mut aliased = Vec::new();
        for def in &defs {
            if let Some(NodeKind::Identifier { name: alias }) = self.ast(def.value).map(|v| &v.kind) {
                let origin_scope = self.node_scope(def.origin);
                aliased.extend(self.name_targets(def.origin, origin_scope, alias, visited));
            }
        }
        if !aliased.is_empty() {
            return dedup(aliased);
        }

        self.scopes
            .function_bindings(scope, name)
            .last()
            .copied()
            .into_iter()
            .collect()
    }

    fn member_targets(
        &self,
        at: FlowNodeId,
        scope: ScopeId,
        object: &str,
        property: &str,
        visited: &mut Visited,
    ) -> Vec<ScopeId> {
        if !visited.insert((at, format!("{object}.{property}"))) {
            return Vec::new();
        }
        let mut out = Vec::new();
        for def in self.reaching(at, scope, object) {
            out.extend(self.def_members(&def, property, visited));
        }
        dedup(out)
    }

    /// Functions stored under `property` in the value a def was built from.
    fn def_members(&self, def: &Def, property: &str, visited: &mut Visited) -> Vec<ScopeId> {
        let Some(value) = self.ast(def.value) else {
            return Vec::new();
        };
        let origin = def.origin;
        let scope = self.node_scope(origin);
        match &value.kind {
            NodeKind::ObjectExpression { properties } => properties
                .iter()
                .filter_map(|prop| match &prop.kind {
                    NodeKind::Property {
                        key,
                        value,
                        computed: false,
                        ..
                    } if key.property_name() == Some(property) => Some(&**value),
                    _ => None,
                })
                .flat_map(|value| self.expr_targets(origin, scope, value, visited))
                .collect(),
            NodeKind::AssignmentExpression { left, right, .. } => match &left.kind {
                NodeKind::MemberExpression {
                    property: assigned,
                    computed: false,
                    ..
                } if assigned.property_name() == Some(property) => {
                    self.expr_targets(origin, scope, right, visited)
                }
                _ => Vec::new(),
            },
            NodeKind::NewExpression { callee, .. } => match strip(callee).as_identifier() {
                Some(constructor) => self.constructed_members(origin, scope, constructor, property),
                None => Vec::new(),
            },
            NodeKind::ClassExpression(_) => self.class_members(value, property),
            NodeKind::Identifier { name } => {
                let mut out = Vec::new();
                if visited.insert((origin, name.clone())) {
                    for def in self.reaching(origin, scope, name) {
                        out.extend(self.def_members(&def, property, visited));
                    }
                }
                out
            }
            _ => Vec::new(),
        }
    }

    /// Methods of instances built by `new constructor()`: class methods, and
    /// `this.property = function` in the constructor body.
    fn constructed_members(
        &self,
        at: FlowNodeId,
        scope: ScopeId,
        constructor: &str,
        property: &str,
    ) -> Vec<ScopeId> {
        let mut candidates: Vec<&Node> = self
            .reaching(at, scope, constructor)
            .iter()
            .filter(|def| def.kind == DefKind::Function)
            .filter_map(|def| self.ast(def.value))
            .collect();
        if candidates.is_empty() {
            if let Some((owner, _)) = self.scopes.lookup(scope, constructor) {
                let owner = self.scopes.get(owner);
                let classes = owner.classes.get(constructor).into_iter().flatten();
                candidates.extend(classes.filter_map(|&id| self.index.get(id)));
            }
            for &function in self.scopes.function_bindings(scope, constructor) {
                candidates.extend(self.ast(self.scopes.get(function).ast));
            }
        }

        let mut out = Vec::new();
        for candidate in candidates {
            if candidate.is_function() {
                out.extend(self.this_assignments(candidate, property));
            } else {
                out.extend(self.class_members(candidate, property));
            }
        }
        dedup(out)
    }

    fn class_members(&self, class: &Node, property: &str) -> Vec<ScopeId> {
        let (NodeKind::ClassDeclaration(class) | NodeKind::ClassExpression(class)) = &class.kind else {
            return Vec::new();
        };
        let NodeKind::ClassBody { body } = &class.body.kind else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for member in body {
            match &member.kind {
                NodeKind::MethodDefinition {
                    kind: MethodKind::Constructor,
                    value,
                    ..
                } => out.extend(self.this_assignments(value, property)),
                NodeKind::MethodDefinition {
                    key,
                    value,
                    computed: false,
                    ..
                } if key.property_name() == Some(property) => {
                    out.extend(self.scopes.scope_of_ast(value.id))
                }
                NodeKind::PropertyDefinition {
                    key,
                    value: Some(value),
                    computed: false,
                    ..
                } if key.property_name() == Some(property) => {
                    out.extend(self.function_scope(value))
                }
                _ => {}
            }
        }
        out
    }

    /// `this.property = <function>` inside a constructor body.
    fn this_assignments(&self, function: &Node, property: &str) -> Vec<ScopeId> {
        let Some(body) = function.as_function().map(|f| f.body.as_ref()) else {
            return Vec::new();
        };
        let owner = self.scopes.scope_of_ast(function.id);
        let mut out = Vec::new();
        let mut stack = vec![body];
        while let Some(node) = stack.pop() {
            if let NodeKind::AssignmentExpression {
                operator,
                left,
                right,
            } = &node.kind
            {
                let assigns_property = matches!(
                    &left.kind,
                    NodeKind::MemberExpression { object, property: p, computed: false, .. }
                        if matches!(object.kind, NodeKind::ThisExpression)
                            && p.property_name() == Some(property)
                );
                if operator == "=" && assigns_property {
                    match (self.function_scope(right), right.as_identifier(), owner) {
                        (Some(target), _, _) => out.push(target),
                        (None, Some(name), Some(owner)) => out.extend(
                            self.scopes.function_bindings(owner, name).last().copied(),
                        ),
                        _ => {}
                    }
                }
            }
            for child in node.children() {
                if !child.node.is_function() {
                    stack.push(child.node);
                }
            }
        }
        out
    }
}

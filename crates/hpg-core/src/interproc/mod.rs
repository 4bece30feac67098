//! Inter-procedural linking
//!
//! Turns the independent per-scope CFGs into one graph: call sites get a
//! call edge to each resolved callee's Entry and a return edge from its Exit
//! into a fresh CallReturn node, arguments are bound to the callee's
//! parameters, and the page-level event and storage models are added on
//! top. Reaching definitions are re-solved over the result by the caller.

mod page;
mod resolve;

pub use page::{EventModel, add_event_model, add_storage_model};

use std::collections::HashMap;

use crate::ast::{AstIndex, Node, NodeKind};
use crate::cfg::Cfg;
use crate::defuse::{self, Def, GenKill, VarDef};
use crate::flow::{EdgeKind, FlowKind, FlowNodeFactory, FlowNodeId};
use crate::scope::{ScopeId, ScopeTree, Var, bound_names};

use resolve::{Binding, Resolver, call_parts};

/// A linked call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallLink {
    pub call: FlowNodeId,
    pub call_return: FlowNodeId,
    pub callees: Vec<ScopeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkOptions {
    pub event_handlers: bool,
    pub local_storage: bool,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            event_handlers: true,
            local_storage: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Linked {
    pub links: Vec<CallLink>,
    pub events: Vec<EventModel>,
    pub local_storage: Option<FlowNodeId>,
}

impl Linked {
    /// Nodes the merged solve starts from, besides the CFG entries.
    pub fn extra_seeds(&self) -> Vec<FlowNodeId> {
        self.local_storage.into_iter().collect()
    }
}

fn outermost_call(node: &Node) -> Option<&Node> {
    match &node.kind {
        NodeKind::CallExpression { .. } | NodeKind::NewExpression { .. } => Some(node),
        NodeKind::AwaitExpression { argument } => outermost_call(argument),
        NodeKind::ChainExpression { expression } => outermost_call(expression),
        _ => None,
    }
}

fn value_call(node: &Node) -> Option<&Node> {
    match &node.kind {
        NodeKind::AssignmentExpression { right, .. } => outermost_call(right),
        _ => outermost_call(node),
    }
}

/// The call or `new` expression a statement-level node performs, if any.
pub fn call_site(ast: &Node) -> Option<&Node> {
    match &ast.kind {
        NodeKind::ExpressionStatement { expression } => value_call(expression),
        NodeKind::VariableDeclaration { declarations, .. } => {
            declarations.iter().find_map(|declarator| match &declarator.kind {
                NodeKind::VariableDeclarator {
                    init: Some(init), ..
                } => outermost_call(init),
                _ => None,
            })
        }
        NodeKind::ReturnStatement {
            argument: Some(argument),
        } => outermost_call(argument),
        _ => value_call(ast),
    }
}

struct Plan {
    cfg: usize,
    site: FlowNodeId,
    callees: Vec<ScopeId>,
    bindings: HashMap<ScopeId, Vec<VarDef>>,
}

/// `VarDef(param_i, arg_i)` for each parameter of `callee`.
fn bind_parameters(
    scopes: &ScopeTree,
    index: &AstIndex<'_>,
    site: FlowNodeId,
    caller: ScopeId,
    callee: ScopeId,
    arguments: &[Node],
    binding: Binding,
) -> Vec<VarDef> {
    let Some(function) = scopes
        .get(callee)
        .ast
        .and_then(|id| index.get(id))
        .and_then(Node::as_function)
    else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for (position, param) in function.params.iter().enumerate() {
        let argument = match binding {
            Binding::Shift(shift) => arguments.get(position + shift),
            Binding::AllObject | Binding::Unbound => None,
        };
        let kind = match (binding, argument) {
            (Binding::Unbound, _) => continue,
            (Binding::AllObject, _) => defuse::DefKind::Object,
            (_, Some(argument)) if param.as_identifier().is_some() => {
                defuse::value_kind(scopes, caller, argument)
            }
            (_, Some(_)) => defuse::DefKind::Literal,
            (_, None) => defuse::DefKind::Undefined,
        };

        let mut names = Vec::new();
        bound_names(param, &mut names);
        for name in names {
            let Some(var) = Var::new(name, callee) else {
                continue;
            };
            let range = defuse::def_range(scopes, &var, kind, argument);
            out.push(VarDef {
                var,
                def: Def {
                    origin: site,
                    kind,
                    range,
                    value: argument.map(|node| node.id),
                },
            });
        }
    }
    out
}

fn plan_calls(
    factory: &FlowNodeFactory,
    scopes: &ScopeTree,
    index: &AstIndex<'_>,
    cfgs: &[Cfg],
    entries: &HashMap<ScopeId, (FlowNodeId, FlowNodeId)>,
) -> Vec<Plan> {
    let resolver = Resolver {
        factory,
        scopes,
        index,
    };
    let mut plans = Vec::new();
    for (position, cfg) in cfgs.iter().enumerate() {
        for &site in &cfg.nodes {
            let node = factory.get(site);
            if node.kind != FlowKind::Normal {
                continue;
            }
            let Some(call) = node.ast.and_then(|id| index.get(id)).and_then(call_site) else {
                continue;
            };
            let resolution = resolver.resolve_call(site, call);
            let callees: Vec<ScopeId> = resolution
                .callees
                .into_iter()
                .filter(|callee| entries.contains_key(callee))
                .collect();
            if callees.is_empty() {
                tracing::debug!(line = node.line, column = node.column, "unresolved call site");
                continue;
            }

            let caller = node.scope.unwrap_or(cfg.scope);
            let arguments = call_parts(call).map_or(&[][..], |(_, arguments)| arguments);
            let bindings = callees
                .iter()
                .map(|&callee| {
                    let defs = bind_parameters(
                        scopes,
                        index,
                        site,
                        caller,
                        callee,
                        arguments,
                        resolution.binding,
                    );
                    (callee, defs)
                })
                .collect();
            plans.push(Plan {
                cfg: position,
                site,
                callees,
                bindings,
            });
        }
    }
    plans
}

fn apply(
    factory: &mut FlowNodeFactory,
    cfgs: &mut [Cfg],
    entries: &HashMap<ScopeId, (FlowNodeId, FlowNodeId)>,
    plan: Plan,
) -> CallLink {
    let site = plan.site;
    let (line, column, scope) = {
        let node = factory.get(site);
        (node.line, node.column, node.scope)
    };
    let call_return = factory.create(FlowKind::CallReturn, None, scope);
    factory.set_position(call_return, line, column);
    factory.move_successors(site, call_return, |kind| kind != EdgeKind::Exception);

    let moved = factory.get_mut(site).gen_kill.replace(GenKill::default());
    factory.get_mut(call_return).gen_kill = Some(moved.unwrap_or_default());
    factory.get_mut(site).kind = FlowKind::Call;

    let mut bindings = plan.bindings;
    for &callee in &plan.callees {
        let Some(&(entry, exit)) = entries.get(&callee) else {
            continue;
        };
        factory.connect(site, entry, EdgeKind::Call);
        factory.connect(exit, call_return, EdgeKind::Return);
        if let Some(defs) = bindings.remove(&callee) {
            factory.get_mut(entry).extra_reach_ins.extend(defs);
        }
    }
    cfgs[plan.cfg].nodes.push(call_return);

    CallLink {
        call: site,
        call_return,
        callees: plan.callees,
    }
}

/// Links every resolvable call site across `cfgs`.
///
/// Call sites are resolved against the intra-procedural reaching
/// definitions, so those must be solved first.
pub fn link_calls(
    factory: &mut FlowNodeFactory,
    scopes: &ScopeTree,
    index: &AstIndex<'_>,
    cfgs: &mut [Cfg],
) -> Vec<CallLink> {
    let entries: HashMap<ScopeId, (FlowNodeId, FlowNodeId)> = cfgs
        .iter()
        .map(|cfg| (cfg.scope, (cfg.entry, cfg.exit)))
        .collect();
    let plans = plan_calls(factory, scopes, index, cfgs, &entries);
    let links: Vec<CallLink> = plans
        .into_iter()
        .map(|plan| apply(factory, cfgs, &entries, plan))
        .collect();
    tracing::debug!(links = links.len(), "linked call sites");
    links
}

/// Links calls and adds the enabled page models.
pub fn link_program(
    factory: &mut FlowNodeFactory,
    scopes: &ScopeTree,
    index: &AstIndex<'_>,
    cfgs: &mut [Cfg],
    options: LinkOptions,
) -> Linked {
    let links = link_calls(factory, scopes, index, cfgs);
    let events = if options.event_handlers {
        add_event_model(factory, scopes, index, cfgs, &links)
    } else {
        Vec::new()
    };
    let local_storage = options
        .local_storage
        .then(|| add_storage_model(factory, scopes, cfgs));
    Linked {
        links,
        events,
        local_storage,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::ast::IdGenerator;
    use crate::cfg::build_cfg;
    use crate::defuse::{DefKind, analyze_cfg, du_pairs, solve_reaching_definitions};
    use crate::parser::ParsedFile;
    use crate::scope::build_scope_tree;

    pub(crate) struct Program {
        pub factory: FlowNodeFactory,
        pub scopes: ScopeTree,
        pub cfgs: Vec<Cfg>,
        pub linked: Linked,
    }

    impl Program {
        pub fn scope(&self, name: &str) -> ScopeId {
            self.scopes
                .scope_by_name(&format!("$DOMAIN.$PAGE_1.{name}"))
                .expect("scope not found")
        }

        pub fn cfg(&self, scope: ScopeId) -> &Cfg {
            self.cfgs.iter().find(|cfg| cfg.scope == scope).unwrap()
        }

        pub fn page(&self) -> &Cfg {
            &self.cfgs[0]
        }

        pub fn callees_at_line(&self, line: u32) -> Vec<ScopeId> {
            self.linked
                .links
                .iter()
                .filter(|link| self.factory.get(link.call).line == line)
                .flat_map(|link| link.callees.iter().copied())
                .collect()
        }

        pub fn pairs_for(&self, name: &str) -> Vec<(u32, u32)> {
            let nodes = self.cfgs.iter().flat_map(|cfg| cfg.nodes.iter().copied());
            du_pairs(&self.factory, nodes)
                .into_iter()
                .filter(|pair| pair.var.name() == name)
                .map(|pair| {
                    (
                        self.factory.get(pair.def_node).line,
                        self.factory.get(pair.use_node).line,
                    )
                })
                .collect()
        }
    }

    pub(crate) fn link(code: &str, options: LinkOptions) -> Program {
        let ids = Arc::new(IdGenerator::new());
        let program = ParsedFile::from_source("test.js", code, &ids)
            .into_program()
            .expect("parse failed");
        let scopes = build_scope_tree(&program);
        let mut index = AstIndex::new();
        index.insert_root(&program).unwrap();
        let mut factory = FlowNodeFactory::new(ids);
        let scope_ids: Vec<ScopeId> = scopes.scopes().map(|s| s.id).collect();
        let mut cfgs = Vec::new();
        for scope in scope_ids {
            if let Some(cfg) = build_cfg(&mut factory, &scopes, &index, scope) {
                analyze_cfg(&mut factory, &scopes, &index, &cfg);
                cfgs.push(cfg);
            }
        }
        let linked = link_program(&mut factory, &scopes, &index, &mut cfgs, options);
        let mut seeds: Vec<FlowNodeId> = cfgs.iter().map(|cfg| cfg.entry).collect();
        seeds.extend(linked.extra_seeds());
        solve_reaching_definitions(&mut factory, &seeds);
        Program {
            factory,
            scopes,
            cfgs,
            linked,
        }
    }

    fn calls_only() -> LinkOptions {
        LinkOptions {
            event_handlers: false,
            local_storage: false,
        }
    }

    #[test]
    fn direct_call_gets_call_and_return_edges() {
        let program = link(
            "function f(a) {\n  sink(a);\n}\nf(window.location.hash);",
            calls_only(),
        );
        let f = program.cfg(program.scope("f"));
        let link = &program.linked.links[0];

        assert_eq!(program.linked.links.len(), 1);
        assert_eq!(program.factory.get(link.call).kind, FlowKind::Call);
        assert!(program.factory.has_edge(link.call, f.entry, EdgeKind::Call));
        assert!(program.factory.has_edge(f.exit, link.call_return, EdgeKind::Return));
        assert_eq!(program.factory.get(link.call_return).line, 4);
        assert!(program.page().nodes.contains(&link.call_return));
    }

    #[test]
    fn argument_definition_reaches_parameter_use() {
        let program = link(
            "function f(a) {\n  sink(a);\n}\nf(window.location.hash);",
            calls_only(),
        );

        assert!(program.pairs_for("a").contains(&(4, 2)));
        let entry = program.cfg(program.scope("f")).entry;
        let bound: Vec<DefKind> = program
            .factory
            .get(entry)
            .extra_reach_ins
            .iter()
            .map(|vd| vd.def.kind)
            .collect();
        assert_eq!(bound, vec![DefKind::Literal]);
    }

    #[test]
    fn call_return_takes_over_the_assignment() {
        let program = link(
            "function make() {\n  return {};\n}\nvar x = make();\nuse(x);",
            calls_only(),
        );
        let link = &program.linked.links[0];
        let moved = program.factory.get(link.call_return).gen_kill.as_ref().unwrap();

        assert!(moved.generate.iter().any(|vd| vd.var.name() == "x"));
        assert!(
            program.factory.get(link.call).gen_kill.as_ref().unwrap().generate.is_empty()
        );
        assert_eq!(program.pairs_for("x"), vec![(4, 5)]);
    }

    #[test]
    fn caller_definitions_flow_through_the_callee() {
        let program = link(
            "var y = 1;\nfunction g() {\n  return y;\n}\ng();",
            calls_only(),
        );

        assert_eq!(program.pairs_for("y"), vec![(1, 3)]);
    }

    #[test]
    fn hoisted_declaration_resolves_before_its_text() {
        let program = link("early();\nfunction early() {}", calls_only());

        assert_eq!(program.callees_at_line(1), vec![program.scope("early")]);
    }

    #[test]
    fn lexically_last_redeclaration_wins() {
        let program = link(
            "function f() { first(); }\nfunction f() { second(); }\nf();",
            calls_only(),
        );
        let callees = program.callees_at_line(3);
        let root = program.scopes.get(callees[0]).range.unwrap();

        assert_eq!(callees.len(), 1);
        assert!(root.start() > 20);
    }

    #[test]
    fn function_expression_assigned_to_variable() {
        let program = link("var run = function () {};\nrun();", calls_only());

        assert_eq!(
            program.callees_at_line(2),
            vec![program.scope("$ANONYMOUS_FUN_1")]
        );
    }

    #[test]
    fn alias_chain_is_followed() {
        let program = link(
            "function target() {}\nvar a = target;\nvar b = a;\nb();",
            calls_only(),
        );

        assert_eq!(program.callees_at_line(4), vec![program.scope("target")]);
    }

    #[test]
    fn alias_cycle_terminates() {
        let program = link("var a = b;\nvar b = a;\na();", calls_only());

        assert!(program.callees_at_line(3).is_empty());
    }

    #[test]
    fn object_literal_method() {
        let program = link(
            "var api = {\n  send: function () {}\n};\napi.send();",
            calls_only(),
        );

        assert_eq!(
            program.callees_at_line(4),
            vec![program.scope("$ANONYMOUS_FUN_1")]
        );
    }

    #[test]
    fn method_assigned_after_creation() {
        let program = link(
            "var api = {};\napi.send = function () {};\napi.send();",
            calls_only(),
        );

        assert_eq!(program.callees_at_line(3).len(), 1);
    }

    #[test]
    fn constructor_this_methods() {
        let program = link(
            "function Widget() {\n  this.render = function () {};\n}\nvar w = new Widget();\nw.render();",
            calls_only(),
        );

        assert_eq!(program.callees_at_line(4), vec![program.scope("Widget")]);
        assert_eq!(
            program.callees_at_line(5),
            vec![program.scope("Widget.$ANONYMOUS_FUN_1")]
        );
    }

    #[test]
    fn class_methods_and_constructor() {
        let program = link(
            "class Store {\n  constructor() {}\n  save() {}\n}\nvar s = new Store();\ns.save();",
            calls_only(),
        );

        assert_eq!(program.callees_at_line(5).len(), 1);
        assert_eq!(program.callees_at_line(6).len(), 1);
        assert_ne!(program.callees_at_line(5), program.callees_at_line(6));
    }

    #[test]
    fn timer_string_callback() {
        let program = link(
            "function tick() {}\nsetTimeout(\"tick()\", 10);\nwindow.setTimeout(tick, 10);",
            calls_only(),
        );

        assert_eq!(program.callees_at_line(2), vec![program.scope("tick")]);
        assert_eq!(program.callees_at_line(3), vec![program.scope("tick")]);
        let entry = program.cfg(program.scope("tick")).entry;
        assert!(program.factory.get(entry).extra_reach_ins.is_empty());
    }

    #[test]
    fn call_and_apply_shift_arguments() {
        let program = link(
            "function f(a, b) {\n  sink(a, b);\n}\nf.call(null, x, y);\nf.apply(null, args);",
            calls_only(),
        );
        let entry = program.cfg(program.scope("f")).entry;
        let bound = &program.factory.get(entry).extra_reach_ins;

        assert_eq!(program.callees_at_line(4), vec![program.scope("f")]);
        assert_eq!(program.callees_at_line(5), vec![program.scope("f")]);
        let apply_defs = bound
            .iter()
            .filter(|vd| program.factory.get(vd.def.origin).line == 5)
            .count();
        assert_eq!(apply_defs, 2);
        assert!(
            bound
                .iter()
                .filter(|vd| program.factory.get(vd.def.origin).line == 5)
                .all(|vd| vd.def.kind == DefKind::Object)
        );
    }

    #[test]
    fn unknown_callees_stay_normal() {
        let program = link("fetch('/api');\nlib.thing();", calls_only());

        assert!(program.linked.links.is_empty());
        assert!(
            program
                .page()
                .nodes
                .iter()
                .all(|&id| program.factory.get(id).kind != FlowKind::Call)
        );
    }

    #[test]
    fn awaited_and_returned_calls_are_sites() {
        let program = link(
            "async function load() {}\nasync function main() {\n  await load();\n  return load();\n}",
            calls_only(),
        );

        assert_eq!(program.callees_at_line(3).len(), 1);
        assert_eq!(program.callees_at_line(4).len(), 1);
    }

    #[test]
    fn merged_graph_keeps_cfg_invariants() {
        let program = link(
            "function f(a) { return a; }\nvar r = f(1);\nf(r);",
            LinkOptions::default(),
        );

        for cfg in &program.cfgs {
            assert!(cfg.check_invariants(&program.factory).is_ok(), "{}", cfg.name);
        }
    }
}

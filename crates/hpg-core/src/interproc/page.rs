//! Page models: the DOM event loop and the shared local storage
//!
//! A page keeps running after its top-level code finishes, dispatching
//! events to registered handlers in any order. That is modelled by a
//! synthetic Loop in front of the page Exit with an on-event edge to every
//! handler. Pages communicate through local storage, which is the single
//! LocalStorage node: it loads into every page Entry and every write to a
//! domain variable saves into it.

use std::collections::{HashMap, HashSet};

use crate::ast::{AstIndex, Node, NodeKind};
use crate::cfg::Cfg;
use crate::defuse::annotate_local_storage;
use crate::flow::{EdgeKind, FlowKind, FlowNodeFactory, FlowNodeId};
use crate::scope::{ScopeId, ScopeTree};

use super::resolve::{Resolver, Visited, call_parts};
use super::{CallLink, call_site};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventModel {
    pub page: ScopeId,
    pub event_loop: FlowNodeId,
    pub loop_return: FlowNodeId,
    pub handlers: Vec<ScopeId>,
}

fn is_add_event_listener(callee: &Node) -> bool {
    match &callee.kind {
        NodeKind::Identifier { name } => name == "addEventListener",
        NodeKind::MemberExpression {
            property,
            computed: false,
            ..
        } => property.property_name() == Some("addEventListener"),
        _ => false,
    }
}

/// Handlers registered from `page`, following registrations made inside
/// handlers and inside called functions.
fn discover_handlers(
    resolver: &Resolver<'_, '_>,
    cfgs: &[Cfg],
    by_scope: &HashMap<ScopeId, usize>,
    callees: &HashMap<FlowNodeId, &[ScopeId]>,
    page: ScopeId,
) -> Vec<ScopeId> {
    let mut handlers = Vec::new();
    let mut seen = HashSet::from([page]);
    let mut worklist = vec![page];

    while let Some(scope) = worklist.pop() {
        let Some(&position) = by_scope.get(&scope) else {
            continue;
        };
        for &id in &cfgs[position].nodes {
            if let Some(linked) = callees.get(&id) {
                for &callee in linked.iter() {
                    if seen.insert(callee) {
                        worklist.push(callee);
                    }
                }
            }

            let node = resolver.factory.get(id);
            let Some(call) = node.ast.and_then(|ast| resolver.index.get(ast)).and_then(call_site) else {
                continue;
            };
            let Some((callee, arguments)) = call_parts(call) else {
                continue;
            };
            let Some(listener) = arguments.get(1).filter(|_| is_add_event_listener(callee)) else {
                continue;
            };
            let mut visited = Visited::new();
            let site_scope = node.scope.unwrap_or(scope);
            for handler in resolver.expr_targets(id, site_scope, listener, &mut visited) {
                if !by_scope.contains_key(&handler) {
                    continue;
                }
                if !handlers.contains(&handler) {
                    handlers.push(handler);
                }
                if seen.insert(handler) {
                    worklist.push(handler);
                }
            }
        }
    }
    handlers
}

/// Adds the event loop to every page CFG and returns what was wired.
pub fn add_event_model(
    factory: &mut FlowNodeFactory,
    scopes: &ScopeTree,
    index: &AstIndex<'_>,
    cfgs: &mut [Cfg],
    links: &[CallLink],
) -> Vec<EventModel> {
    let by_scope: HashMap<ScopeId, usize> = cfgs
        .iter()
        .enumerate()
        .map(|(position, cfg)| (cfg.scope, position))
        .collect();
    let callees: HashMap<FlowNodeId, &[ScopeId]> = links
        .iter()
        .map(|link| (link.call, link.callees.as_slice()))
        .collect();

    let discovered: Vec<(ScopeId, Vec<ScopeId>)> = {
        let resolver = Resolver {
            factory,
            scopes,
            index,
        };
        scopes
            .pages()
            .iter()
            .filter(|page| by_scope.contains_key(page))
            .map(|&page| {
                let handlers = discover_handlers(&resolver, cfgs, &by_scope, &callees, page);
                (page, handlers)
            })
            .collect()
    };

    let mut models = Vec::new();
    for (page, handlers) in discovered {
        let page_cfg = by_scope[&page];
        let exit = cfgs[page_cfg].exit;
        let (line, column) = {
            let node = factory.get(exit);
            (node.line, node.column)
        };

        let event_loop = factory.create(FlowKind::Loop, None, Some(page));
        let loop_return = factory.create(FlowKind::LoopReturn, None, Some(page));
        factory.set_position(event_loop, line, column);
        factory.set_position(loop_return, line, column);
        // Exception edges move too: listeners registered before an uncaught
        // throw stay live.
        factory.move_predecessors(exit, event_loop);
        factory.connect(event_loop, exit, EdgeKind::Normal);
        factory.connect(loop_return, event_loop, EdgeKind::Return);

        if handlers.is_empty() {
            factory.connect(event_loop, loop_return, EdgeKind::OnEvent);
        }
        for &handler in &handlers {
            let handler_cfg = &cfgs[by_scope[&handler]];
            factory.connect(event_loop, handler_cfg.entry, EdgeKind::OnEvent);
            factory.connect(handler_cfg.exit, loop_return, EdgeKind::Normal);
        }

        let nodes = &mut cfgs[page_cfg].nodes;
        nodes.push(event_loop);
        nodes.push(loop_return);
        tracing::debug!(handlers = handlers.len(), "wired page event loop");
        models.push(EventModel {
            page,
            event_loop,
            loop_return,
            handlers,
        });
    }
    models
}

/// Connects the LocalStorage node to every page and every storage write.
pub fn add_storage_model(
    factory: &mut FlowNodeFactory,
    scopes: &ScopeTree,
    cfgs: &[Cfg],
) -> FlowNodeId {
    let storage = annotate_local_storage(factory, scopes);
    let domain = scopes.domain();

    for cfg in cfgs {
        if scopes.get(cfg.scope).kind == crate::scope::ScopeKind::Page {
            factory.connect(storage, cfg.entry, EdgeKind::LoadStorage);
        }
        let writers: Vec<FlowNodeId> = cfg
            .nodes
            .iter()
            .copied()
            .filter(|&id| {
                factory.get(id).gen_kill.as_ref().is_some_and(|gen_kill| {
                    gen_kill
                        .generate
                        .iter()
                        .any(|vd| vd.var.scope() == domain)
                })
            })
            .collect();
        for writer in writers {
            factory.connect(writer, storage, EdgeKind::SaveStorage);
        }
    }
    storage
}

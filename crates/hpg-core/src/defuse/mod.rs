//! Reaching definitions and def-use pairs
//!
//! Every flow node gets its GEN/KILL sets and its variable uses once, from
//! the AST it wraps. The reaching-definitions solve (`out = gen ∪ (in − kill)
//! ∪ extra`, forward, union) then fills `reach_ins`/`reach_outs`, and every
//! use is paired with the definitions of the same variable that reach it.

mod effects;

pub(crate) use effects::evaluated_expressions;

use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::ast::{AstId, AstIndex, Node, NodeKind, Range};
use crate::cfg::Cfg;
use crate::dataflow::{self, Options};
use crate::flow::{FlowKind, FlowNode, FlowNodeFactory, FlowNodeId};
use crate::scope::{ScopeId, ScopeTree, Var};

use effects::{Effects, WriteKind};

/// What kind of value a definition stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum DefKind {
    Literal,
    Object,
    Function,
    HtmlDom,
    Undefined,
    LocalStorage,
}

impl DefKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefKind::Literal => "Literal",
            DefKind::Object => "Object",
            DefKind::Function => "Function",
            DefKind::HtmlDom => "HtmlDom",
            DefKind::Undefined => "Undefined",
            DefKind::LocalStorage => "LocalStorage",
        }
    }
}

impl fmt::Display for DefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefRange {
    /// Byte range of the defined function, or of the owning scope.
    Local(Range),
    /// Definitions of domain-level variables such as `localStorage`.
    Global,
}

/// Where a value for a variable was assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Def {
    pub origin: FlowNodeId,
    pub kind: DefKind,
    pub range: DefRange,
    /// The assigned expression, or the declaring function/class node. Call
    /// resolution follows it to find callees.
    pub value: Option<AstId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VarDef {
    pub var: Var,
    pub def: Def,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenKill {
    pub generate: HashSet<VarDef>,
    pub kill: HashSet<Var>,
}

/// A definition at `def_node` of `var` that reaches a use at `use_node`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DuPair {
    pub var: Var,
    pub def_node: FlowNodeId,
    pub use_node: FlowNodeId,
}

/// Wall-clock allowance for PDG construction.
///
/// Checked cooperatively between scope solves; once exhausted it stays
/// exhausted.
#[derive(Debug, Clone)]
pub struct Budget {
    started: Instant,
    limit: Duration,
    exhausted: bool,
}

impl Budget {
    pub fn new(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
            exhausted: false,
        }
    }

    pub fn from_millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }

    /// Returns `false` once the allowance is used up.
    pub fn check(&mut self) -> bool {
        if !self.exhausted && self.started.elapsed() >= self.limit {
            tracing::warn!(
                limit_ms = self.limit.as_millis() as u64,
                "PDG budget exhausted, remaining scopes are left unsolved"
            );
            self.exhausted = true;
        }
        !self.exhausted
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

const DOM_ACCESSORS: &[&str] = &[
    "getElementById",
    "getElementsByClassName",
    "getElementsByTagName",
    "getElementsByName",
    "querySelector",
    "querySelectorAll",
    "createElement",
    "createTextNode",
    "body",
    "head",
    "documentElement",
    "forms",
    "images",
    "links",
    "anchors",
    "scripts",
    "activeElement",
    "children",
    "firstChild",
    "lastChild",
    "parentNode",
    "parentElement",
    "closest",
];

/// Base identifier and non-computed property names of a call/member chain,
/// root first: `document.getElementById("x").value` gives
/// `("document", ["getElementById", "value"])`.
fn access_path(mut node: &Node) -> Option<(&str, Vec<&str>)> {
    let mut properties = Vec::new();
    loop {
        match &node.kind {
            NodeKind::MemberExpression {
                object, property, ..
            } => {
                if let Some(name) = property.property_name() {
                    properties.push(name);
                }
                node = object;
            }
            NodeKind::CallExpression { callee, .. } => node = callee,
            NodeKind::ChainExpression { expression } => node = expression,
            NodeKind::Identifier { name } => {
                properties.reverse();
                return Some((name, properties));
            }
            _ => return None,
        }
    }
}

fn host_kind(scopes: &ScopeTree, scope: ScopeId, value: &Node) -> Option<DefKind> {
    let (base, path) = access_path(value)?;
    let var = scopes.resolve(scope, base)?;
    let builtin = scopes.builtin_kind(&var)?;
    let document_path = match (builtin, base, path.first().copied()) {
        (DefKind::LocalStorage, _, _) => return Some(DefKind::LocalStorage),
        (DefKind::HtmlDom, "window", Some("localStorage" | "sessionStorage")) => {
            return Some(DefKind::LocalStorage);
        }
        (DefKind::HtmlDom, "window", Some("document")) => &path[1..],
        (DefKind::HtmlDom, "document", _) => &path[..],
        _ => return None,
    };
    (document_path.is_empty() || document_path.iter().any(|p| DOM_ACCESSORS.contains(p)))
        .then_some(DefKind::HtmlDom)
}

/// Infers the kind of the value `value` evaluates to, as seen from `scope`.
pub fn value_kind(scopes: &ScopeTree, scope: ScopeId, value: &Node) -> DefKind {
    match &value.kind {
        _ if value.is_function() => DefKind::Function,
        NodeKind::ObjectExpression { .. }
        | NodeKind::ArrayExpression { .. }
        | NodeKind::NewExpression { .. }
        | NodeKind::ClassExpression(_) => DefKind::Object,
        NodeKind::AwaitExpression { argument } => value_kind(scopes, scope, argument),
        NodeKind::AssignmentExpression {
            operator, right, ..
        } if operator == "=" => value_kind(scopes, scope, right),
        NodeKind::SequenceExpression { expressions } => expressions
            .last()
            .map_or(DefKind::Literal, |last| value_kind(scopes, scope, last)),
        _ => host_kind(scopes, scope, value).unwrap_or(DefKind::Literal),
    }
}

/// Range recorded for a definition of `var` with the given kind and value.
pub fn def_range(scopes: &ScopeTree, var: &Var, kind: DefKind, value: Option<&Node>) -> DefRange {
    match value {
        Some(value) if kind == DefKind::Function => DefRange::Local(value.range),
        _ if var.scope() == scopes.domain() => DefRange::Global,
        _ => DefRange::Local(scopes.get(var.scope()).range.unwrap_or_default()),
    }
}

fn make_def(
    scopes: &ScopeTree,
    origin: FlowNodeId,
    var: Var,
    kind: DefKind,
    value: Option<&Node>,
) -> VarDef {
    let range = def_range(scopes, &var, kind, value);
    VarDef {
        var,
        def: Def {
            origin,
            kind,
            range,
            value: value.map(|node| node.id),
        },
    }
}

/// Entry GEN declares every name of the scope; all of them are killed.
fn entry_gen_kill(
    scopes: &ScopeTree,
    index: &AstIndex<'_>,
    scope: ScopeId,
    entry: FlowNodeId,
) -> GenKill {
    let info = scopes.get(scope);
    let mut gen_kill = GenKill::default();
    let mut declare = |name: &str, kind: DefKind, value: Option<&Node>| {
        if let Some(var) = Var::new(name, scope) {
            gen_kill.kill.insert(var.clone());
            gen_kill
                .generate
                .insert(make_def(scopes, entry, var, kind, value));
        }
    };

    for param in &info.params {
        declare(param.as_str(), DefKind::Literal, None);
    }
    for local in &info.locals {
        if !info.classes.contains_key(local) {
            declare(local.as_str(), DefKind::Undefined, None);
        }
    }
    for (name, declarations) in info.inner_functions.iter().chain(info.classes.iter()) {
        for &id in declarations {
            declare(name.as_str(), DefKind::Function, index.get(id));
        }
    }
    gen_kill
}

fn node_gen_kill(
    scopes: &ScopeTree,
    scope: ScopeId,
    origin: FlowNodeId,
    kind: FlowKind,
    ast: &Node,
) -> (GenKill, Vec<Var>) {
    let effects = Effects::of_flow_node(kind, ast);
    let mut gen_kill = GenKill::default();
    for write in &effects.writes {
        let Some(var) = scopes.resolve(scope, write.name) else {
            tracing::debug!(name = write.name, "write to an unresolved name");
            continue;
        };
        let (def_kind, value) = match write.kind {
            WriteKind::Value(value) => (value_kind(scopes, scope, value), Some(value)),
            WriteKind::Fixed { kind, value } => (kind, value),
        };
        if write.strong {
            gen_kill.kill.insert(var.clone());
        }
        gen_kill
            .generate
            .insert(make_def(scopes, origin, var, def_kind, value));
    }

    let mut uses: Vec<Var> = Vec::new();
    for name in effects.reads {
        if let Some(var) = scopes.resolve(scope, name) {
            if !uses.contains(&var) {
                uses.push(var);
            }
        }
    }
    (gen_kill, uses)
}

/// Computes GEN/KILL and the uses of every node of `cfg` that has none yet.
pub fn annotate_cfg(
    factory: &mut FlowNodeFactory,
    scopes: &ScopeTree,
    index: &AstIndex<'_>,
    cfg: &Cfg,
) {
    for &id in &cfg.nodes {
        let node = factory.get(id);
        if node.gen_kill.is_some() {
            continue;
        }
        let scope = node.scope.unwrap_or(cfg.scope);
        let is_branch = node.is_branch();
        let (gen_kill, uses) = match (node.kind, node.ast.and_then(|ast| index.get(ast))) {
            (FlowKind::Entry, _) => (entry_gen_kill(scopes, index, scope, id), Vec::new()),
            (kind, Some(ast)) => node_gen_kill(scopes, scope, id, kind, ast),
            _ => (GenKill::default(), Vec::new()),
        };

        let node = factory.get_mut(id);
        node.gen_kill = Some(gen_kill);
        if is_branch {
            node.p_uses = uses;
        } else {
            node.c_uses = uses;
        }
    }
}

/// The local-storage sentinel defines both storage objects of the domain.
pub fn annotate_local_storage(factory: &mut FlowNodeFactory, scopes: &ScopeTree) -> FlowNodeId {
    let id = factory.local_storage();
    if factory.get(id).gen_kill.is_some() {
        return id;
    }
    let domain = scopes.domain();
    let generate = ["localStorage", "sessionStorage"]
        .into_iter()
        .filter_map(|name| Var::new(name, domain))
        .map(|var| make_def(scopes, id, var, DefKind::LocalStorage, None))
        .collect();
    factory.get_mut(id).gen_kill = Some(GenKill {
        generate,
        kill: HashSet::new(),
    });
    id
}

fn transfer(node: &FlowNode, input: &HashSet<VarDef>) -> HashSet<VarDef> {
    let mut out: HashSet<VarDef> = match &node.gen_kill {
        Some(gen_kill) => input
            .iter()
            .filter(|vd| !gen_kill.kill.contains(&vd.var))
            .cloned()
            .collect(),
        None => input.clone(),
    };
    if let Some(gen_kill) = &node.gen_kill {
        out.extend(gen_kill.generate.iter().cloned());
    }
    out.extend(node.extra_reach_ins.iter().cloned());
    out
}

/// Solves reaching definitions from `seeds` and stores the result on the
/// nodes. Returns the number of worklist iterations.
pub fn solve_reaching_definitions(factory: &mut FlowNodeFactory, seeds: &[FlowNodeId]) -> usize {
    let solution = {
        let graph: &FlowNodeFactory = factory;
        dataflow::solve(graph, seeds, &Options::default(), |id, input| {
            transfer(graph.get(id), input)
        })
    };
    for (id, input) in solution.inputs {
        factory.get_mut(id).reach_ins = input;
    }
    for (id, output) in solution.outputs {
        factory.get_mut(id).reach_outs = output;
    }
    tracing::debug!(iterations = solution.iterations, "reaching definitions solved");
    solution.iterations
}

/// Annotates and solves one CFG in isolation.
pub fn analyze_cfg(
    factory: &mut FlowNodeFactory,
    scopes: &ScopeTree,
    index: &AstIndex<'_>,
    cfg: &Cfg,
) -> usize {
    annotate_cfg(factory, scopes, index, cfg);
    solve_reaching_definitions(factory, &[cfg.entry])
}

/// Pairs every use in `nodes` with the reaching definitions of its variable,
/// sorted by (definition uid, use uid, variable).
pub fn du_pairs(factory: &FlowNodeFactory, nodes: impl IntoIterator<Item = FlowNodeId>) -> Vec<DuPair> {
    let mut pairs = Vec::new();
    for id in nodes {
        let node = factory.get(id);
        for var in node.uses() {
            for reaching in node.reach_ins.iter().filter(|vd| &vd.var == var) {
                pairs.push(DuPair {
                    var: var.clone(),
                    def_node: reaching.def.origin,
                    use_node: id,
                });
            }
        }
    }
    let uid = |id: FlowNodeId| factory.get(id).uid;
    pairs.sort_by(|a, b| {
        (uid(a.def_node), uid(a.use_node), &a.var).cmp(&(uid(b.def_node), uid(b.use_node), &b.var))
    });
    pairs.dedup();
    pairs
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::ast::IdGenerator;
    use crate::cfg::build_cfg;
    use crate::parser::ParsedFile;
    use crate::scope::build_scope_tree;

    struct Analyzed {
        factory: FlowNodeFactory,
        scopes: ScopeTree,
        cfgs: Vec<Cfg>,
    }

    impl Analyzed {
        fn nodes(&self) -> impl Iterator<Item = FlowNodeId> + '_ {
            self.cfgs.iter().flat_map(|cfg| cfg.nodes.iter().copied())
        }

        /// First statement-level flow node on `line`.
        fn at_line(&self, line: u32) -> &FlowNode {
            self.nodes()
                .map(|id| self.factory.get(id))
                .find(|node| node.line == line && node.kind != FlowKind::Entry)
                .expect("no flow node on line")
        }

        /// `(def line, use line, variable)` for every pair.
        fn pairs(&self) -> Vec<(u32, u32, String)> {
            du_pairs(&self.factory, self.nodes())
                .into_iter()
                .map(|pair| {
                    (
                        self.factory.get(pair.def_node).line,
                        self.factory.get(pair.use_node).line,
                        pair.var.name().to_string(),
                    )
                })
                .collect()
        }

        fn pairs_for(&self, name: &str) -> Vec<(u32, u32)> {
            self.pairs()
                .into_iter()
                .filter(|(_, _, var)| var == name)
                .map(|(def, use_, _)| (def, use_))
                .collect()
        }

        fn generated(&self, line: u32, name: &str) -> Vec<Def> {
            self.at_line(line)
                .gen_kill
                .as_ref()
                .map(|gk| {
                    gk.generate
                        .iter()
                        .filter(|vd| vd.var.name() == name)
                        .map(|vd| vd.def)
                        .collect()
                })
                .unwrap_or_default()
        }
    }

    fn analyze(code: &str) -> Analyzed {
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
        drop(index);
        Analyzed {
            factory,
            scopes,
            cfgs,
        }
    }

    #[test]
    fn single_definition_single_use() {
        let analyzed = analyze("var x = 1;\nf(x);");

        assert_eq!(analyzed.pairs_for("x"), vec![(1, 2)]);
    }

    #[test]
    fn redefinition_kills_earlier_definition() {
        let analyzed = analyze("var x = 1;\nx = 2;\nf(x);");

        assert_eq!(analyzed.pairs_for("x"), vec![(2, 3)]);
    }

    #[test]
    fn both_branches_reach_the_join() {
        let analyzed = analyze("var x = 1;\nif (c) {\n  x = 2;\n}\nf(x);");

        assert_eq!(analyzed.pairs_for("x"), vec![(1, 5), (3, 5)]);
    }

    #[test]
    fn loop_carried_definitions_reach_the_test() {
        let analyzed = analyze("var i = 0;\nwhile (i < 10) {\n  i = i + 1;\n}");
        let pairs = analyzed.pairs_for("i");

        assert!(pairs.contains(&(1, 2)));
        assert!(pairs.contains(&(3, 2)));
        assert!(pairs.contains(&(1, 3)));
        assert!(pairs.contains(&(3, 3)));
    }

    #[test]
    fn uninitialized_declaration_is_undefined() {
        let analyzed = analyze("var x;\nf(x);");
        let defs = analyzed.generated(1, "x");

        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].kind, DefKind::Undefined);
        assert_eq!(analyzed.pairs_for("x"), vec![(1, 2)]);
    }

    #[test]
    fn value_kinds_follow_the_initializer() {
        let analyzed = analyze(
            "var a = function () {};\n\
             var b = { k: 1 };\n\
             var c = document.getElementById('q');\n\
             var d = document.cookie;\n\
             var e = localStorage.getItem('k');\n\
             var f = window.location.hash;\n\
             var g = new Date();",
        );
        let kind = |line, name| analyzed.generated(line, name)[0].kind;

        assert_eq!(kind(1, "a"), DefKind::Function);
        assert_eq!(kind(2, "b"), DefKind::Object);
        assert_eq!(kind(3, "c"), DefKind::HtmlDom);
        assert_eq!(kind(4, "d"), DefKind::Literal);
        assert_eq!(kind(5, "e"), DefKind::LocalStorage);
        assert_eq!(kind(6, "f"), DefKind::Literal);
        assert_eq!(kind(7, "g"), DefKind::Object);
    }

    #[test]
    fn function_defs_carry_the_function_range() {
        let analyzed = analyze("var handler = function () { go(); };");
        let def = analyzed.generated(1, "handler")[0];

        let DefRange::Local(range) = def.range else {
            panic!("expected a local range");
        };
        assert_eq!(range.start(), "var handler = ".len() as u32);
    }

    #[test]
    fn member_assignment_is_a_weak_update() {
        let analyzed = analyze("var o = {};\no.p = 1;\nf(o);");

        assert_eq!(analyzed.pairs_for("o"), vec![(1, 3), (2, 3)]);
    }

    #[test]
    fn member_store_target_is_not_a_use() {
        let analyzed = analyze("var o = {};\no.p = 1;");

        assert!(analyzed.pairs_for("o").is_empty());
    }

    #[test]
    fn compound_member_store_uses_the_object() {
        let analyzed = analyze("var o = {};\no.p += 1;");

        assert_eq!(analyzed.pairs_for("o"), vec![(1, 2)]);
    }

    #[test]
    fn mutating_call_is_a_weak_update() {
        let analyzed = analyze("var list = [];\nlist.push(1);\nf(list);");

        assert_eq!(analyzed.pairs_for("list"), vec![(1, 2), (1, 3), (2, 3)]);
    }

    #[test]
    fn compound_assignment_uses_previous_value() {
        let analyzed = analyze("var n = 1;\nn += 2;\nf(n);");

        assert_eq!(analyzed.pairs_for("n"), vec![(1, 2), (2, 3)]);
    }

    #[test]
    fn branch_conditions_are_predicate_uses() {
        let analyzed = analyze("var c = 1;\nif (c) {\n  f();\n}");
        let branch = analyzed.at_line(2);

        assert_eq!(branch.p_uses.len(), 1);
        assert!(branch.c_uses.is_empty());
    }

    #[test]
    fn parameters_are_defined_at_entry() {
        let analyzed = analyze("function f(a) {\n  sink(a);\n}");
        let pairs = analyzed.pairs_for("a");

        assert_eq!(pairs, vec![(1, 2)]);
        let f = analyzed.scopes.scope_by_name("$DOMAIN.$PAGE_1.f").unwrap();
        let cfg = analyzed.cfgs.iter().find(|cfg| cfg.scope == f).unwrap();
        assert_eq!(analyzed.factory.get(cfg.entry).line, 1);
    }

    #[test]
    fn hoisted_functions_are_defined_at_entry() {
        let analyzed = analyze("run(helper);\nfunction helper() {}");
        let page = analyzed.cfgs[0].entry;
        let defs: Vec<DefKind> = analyzed
            .factory
            .get(page)
            .gen_kill
            .as_ref()
            .unwrap()
            .generate
            .iter()
            .filter(|vd| vd.var.name() == "helper")
            .map(|vd| vd.def.kind)
            .collect();

        assert_eq!(defs, vec![DefKind::Function]);
        assert_eq!(analyzed.pairs_for("helper"), vec![(1, 1)]);
    }

    #[test]
    fn inner_scope_reads_outer_definitions_only_through_linking() {
        let analyzed = analyze("var y = 1;\nfunction g() {\n  return y;\n}");

        // Intra-procedurally the function has no definition of `y` reaching it.
        assert!(analyzed.pairs_for("y").is_empty());
    }

    #[test]
    fn uses_without_definitions_produce_no_pairs() {
        let analyzed = analyze("console.log(window.name);");

        assert!(analyzed.pairs().iter().all(|(_, _, var)| var != "console"));
        assert!(analyzed.pairs().is_empty());
    }

    #[test]
    fn pairs_are_sorted_by_definition_then_use() {
        let analyzed = analyze("var a = 1;\nvar b = 2;\nf(b, a);\ng(a);");
        let pairs = analyzed.pairs();

        let mut sorted = pairs.clone();
        sorted.sort();
        assert_eq!(pairs, sorted);
        assert_eq!(pairs.len(), 3);
    }

    #[test]
    fn local_storage_sentinel_defines_both_storages() {
        let mut analyzed = analyze("");
        let ls = annotate_local_storage(&mut analyzed.factory, &analyzed.scopes);
        let generate = &analyzed.factory.get(ls).gen_kill.as_ref().unwrap().generate;

        assert_eq!(generate.len(), 2);
        assert!(generate.iter().all(|vd| vd.def.range == DefRange::Global));
        assert_eq!(annotate_local_storage(&mut analyzed.factory, &analyzed.scopes), ls);
    }

    #[test]
    fn budget_of_zero_is_exhausted_on_first_check() {
        let mut budget = Budget::from_millis(0);

        assert!(!budget.is_exhausted());
        assert!(!budget.check());
        assert!(budget.is_exhausted());

        let mut generous = Budget::new(Duration::from_secs(3600));
        assert!(generous.check());
    }
}

//! Lexical scope model
//!
//! Scopes live in an arena and refer to each other by [`ScopeId`]: the
//! domain root owns one page per program, and every function nested in a
//! page gets its own function or anonymous-function scope. Variable tables
//! are filled once by the analysis in [`builder`] and are read-only
//! afterwards.

mod builder;
mod var;

pub use builder::bound_names;
pub use var::{Var, is_valid_identifier};

use std::collections::{BTreeMap, BTreeSet, HashMap};

use id_arena::{Arena, Id};

use crate::ast::{AstId, Node, Range};
use crate::defuse::DefKind;

pub type ScopeId = Id<Scope>;

pub const DOMAIN_SCOPE_NAME: &str = "$DOMAIN";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Domain,
    Page,
    Function,
    AnonymousFunction,
}

impl ScopeKind {
    pub fn is_function(&self) -> bool {
        matches!(self, ScopeKind::Function | ScopeKind::AnonymousFunction)
    }
}

/// Which table of a scope a name was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarClass {
    Local,
    InnerFunction,
    Param,
    Global,
    Builtin,
}

#[derive(Debug)]
pub struct Scope {
    pub id: ScopeId,
    pub kind: ScopeKind,
    pub name: String,
    /// The Program or function node; `None` for the domain.
    pub ast: Option<AstId>,
    pub range: Option<Range>,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    /// Formal parameter names in declaration order, destructured ones flattened.
    pub params: Vec<String>,
    pub locals: BTreeSet<String>,
    /// Directly nested function declarations, in lexical order per name.
    pub inner_functions: BTreeMap<String, Vec<AstId>>,
    pub classes: BTreeMap<String, Vec<AstId>>,
    /// Names assigned without any declaration. Only pages carry these.
    pub globals: BTreeSet<String>,
    pub builtins: BTreeMap<String, DefKind>,
    /// Function scopes a name may denote, in lexical order.
    pub function_bindings: BTreeMap<String, Vec<ScopeId>>,
    anonymous_children: u32,
}

impl Scope {
    pub fn class_of(&self, name: &str) -> Option<VarClass> {
        if self.locals.contains(name) {
            Some(VarClass::Local)
        } else if self.inner_functions.contains_key(name) {
            Some(VarClass::InnerFunction)
        } else if self.params.iter().any(|param| param == name) {
            Some(VarClass::Param)
        } else if self.globals.contains(name) {
            Some(VarClass::Global)
        } else if self.builtins.contains_key(name) {
            Some(VarClass::Builtin)
        } else {
            None
        }
    }

    pub fn declares(&self, name: &str) -> bool {
        self.class_of(name).is_some()
    }

    /// Every name this scope declares itself, builtins and globals excluded.
    pub fn declared_names(&self) -> BTreeSet<&str> {
        self.params
            .iter()
            .map(String::as_str)
            .chain(self.locals.iter().map(String::as_str))
            .chain(self.inner_functions.keys().map(String::as_str))
            .collect()
    }
}

pub struct ScopeTree {
    arena: Arena<Scope>,
    domain: ScopeId,
    pages: Vec<ScopeId>,
    by_ast: HashMap<AstId, ScopeId>,
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeTree {
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let domain = arena.alloc_with_id(|id| Scope {
            id,
            kind: ScopeKind::Domain,
            name: DOMAIN_SCOPE_NAME.to_string(),
            ast: None,
            range: None,
            parent: None,
            children: Vec::new(),
            params: Vec::new(),
            locals: BTreeSet::new(),
            inner_functions: BTreeMap::new(),
            classes: BTreeMap::new(),
            globals: BTreeSet::new(),
            builtins: builder::domain_builtins(),
            function_bindings: BTreeMap::new(),
            anonymous_children: 0,
        });

        Self {
            arena,
            domain,
            pages: Vec::new(),
            by_ast: HashMap::new(),
        }
    }

    fn create_scope(
        &mut self,
        kind: ScopeKind,
        name: String,
        parent: ScopeId,
        root: &Node,
    ) -> ScopeId {
        let id = self.arena.alloc_with_id(|id| Scope {
            id,
            kind,
            name,
            ast: Some(root.id),
            range: Some(root.range),
            parent: Some(parent),
            children: Vec::new(),
            params: Vec::new(),
            locals: BTreeSet::new(),
            inner_functions: BTreeMap::new(),
            classes: BTreeMap::new(),
            globals: BTreeSet::new(),
            builtins: BTreeMap::new(),
            function_bindings: BTreeMap::new(),
            anonymous_children: 0,
        });
        self.arena[parent].children.push(id);
        self.by_ast.insert(root.id, id);
        tracing::debug!(scope = %self.arena[id].name, ?kind, "created scope");
        id
    }

    pub fn domain(&self) -> ScopeId {
        self.domain
    }

    pub fn pages(&self) -> &[ScopeId] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.arena[id]
    }

    /// All scopes in creation order, which is a pre-order of the tree.
    pub fn scopes(&self) -> impl Iterator<Item = &Scope> {
        self.arena.iter().map(|(_, scope)| scope)
    }

    pub fn ancestors(&self, id: ScopeId) -> AncestorIter<'_> {
        AncestorIter {
            tree: self,
            current: Some(id),
        }
    }

    pub fn is_descendant_of(&self, scope: ScopeId, ancestor: ScopeId) -> bool {
        self.ancestors(scope).any(|s| s.id == ancestor)
    }

    pub fn page_of(&self, scope: ScopeId) -> Option<ScopeId> {
        self.ancestors(scope)
            .find(|s| s.kind == ScopeKind::Page)
            .map(|s| s.id)
    }

    /// `scope` and everything nested in it, in pre-order.
    pub fn descendants(&self, scope: ScopeId) -> Vec<ScopeId> {
        let mut out = Vec::new();
        let mut stack = vec![scope];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.arena[id].children.iter().rev().copied());
        }
        out
    }

    pub fn scope_of_ast(&self, id: AstId) -> Option<ScopeId> {
        self.by_ast.get(&id).copied()
    }

    pub fn scope_by_name(&self, name: &str) -> Option<ScopeId> {
        self.scopes().find(|s| s.name == name).map(|s| s.id)
    }

    /// Finds the function scope spanning exactly `range` inside `page`.
    ///
    /// Ranges are file-relative, so the page disambiguates between files.
    pub fn scope_by_range(&self, page: ScopeId, range: Range) -> Option<ScopeId> {
        self.descendants(page)
            .into_iter()
            .find(|&id| self.arena[id].kind.is_function() && self.arena[id].range == Some(range))
    }

    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<(ScopeId, VarClass)> {
        self.ancestors(scope)
            .find_map(|s| s.class_of(name).map(|class| (s.id, class)))
    }

    pub fn has_variable(&self, scope: ScopeId, name: &str) -> bool {
        self.lookup(scope, name).is_some()
    }

    /// Resolves `name` as seen from `scope`: local, inner function, parameter,
    /// global, builtin, then the parent scope.
    pub fn resolve(&self, scope: ScopeId, name: &str) -> Option<Var> {
        let (owner, _) = self.lookup(scope, name)?;
        Var::new(name, owner)
    }

    pub fn builtin_kind(&self, var: &Var) -> Option<DefKind> {
        self.arena[var.scope()].builtins.get(var.name()).copied()
    }

    /// The hoisting fallback: function scopes bound to `name` in the nearest
    /// scope that has any binding for it.
    pub fn function_bindings(&self, scope: ScopeId, name: &str) -> &[ScopeId] {
        self.ancestors(scope)
            .find_map(|s| s.function_bindings.get(name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

pub struct AncestorIter<'a> {
    tree: &'a ScopeTree,
    current: Option<ScopeId>,
}

impl<'a> Iterator for AncestorIter<'a> {
    type Item = &'a Scope;

    fn next(&mut self) -> Option<Self::Item> {
        let current_id = self.current?;
        let scope = &self.tree.arena[current_id];
        self.current = scope.parent;
        Some(scope)
    }
}

/// Builds the scope tree of a single program under a fresh domain.
pub fn build_scope_tree(program: &Node) -> ScopeTree {
    let mut tree = ScopeTree::new();
    tree.add_page(program);
    tree
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::IdGenerator;
    use crate::parser::ParsedFile;

    fn parse(code: &str) -> Node {
        let ids = IdGenerator::new();
        ParsedFile::from_source("test.js", code, &ids)
            .into_program()
            .expect("parse failed")
    }

    fn tree_for(code: &str) -> ScopeTree {
        build_scope_tree(&parse(code))
    }

    fn names(tree: &ScopeTree) -> Vec<&str> {
        tree.scopes().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn domain_and_page_exist_for_empty_program() {
        let tree = tree_for("");

        assert_eq!(names(&tree), vec!["$DOMAIN", "$DOMAIN.$PAGE_1"]);
        let page = tree.get(tree.pages()[0]);
        assert_eq!(page.kind, ScopeKind::Page);
        assert_eq!(page.parent, Some(tree.domain()));
    }

    #[test]
    fn functions_create_named_and_anonymous_scopes() {
        let tree = tree_for(
            r#"
            function outer() {
                var cb = function () {};
                setTimeout(() => 1);
            }
        "#,
        );

        assert_eq!(
            names(&tree),
            vec![
                "$DOMAIN",
                "$DOMAIN.$PAGE_1",
                "$DOMAIN.$PAGE_1.outer",
                "$DOMAIN.$PAGE_1.outer.$ANONYMOUS_FUN_1",
                "$DOMAIN.$PAGE_1.outer.$ANONYMOUS_FUN_2",
            ]
        );
        let outer = tree.scope_by_name("$DOMAIN.$PAGE_1.outer").unwrap();
        assert_eq!(tree.get(outer).children.len(), 2);
        assert_eq!(tree.get(outer).kind, ScopeKind::Function);
    }

    #[test]
    fn variable_classes_are_filled() {
        let tree = tree_for(
            r#"
            function f(a, { b, c: [d] }, ...rest) {
                var x = 1;
                let y;
                function g() {}
                class K {}
                undeclared = 2;
            }
        "#,
        );
        let f = tree.get(tree.scope_by_name("$DOMAIN.$PAGE_1.f").unwrap());

        assert_eq!(f.params, vec!["a", "b", "d", "rest"]);
        assert!(f.locals.contains("x"));
        assert!(f.locals.contains("y"));
        assert!(f.locals.contains("K"));
        assert!(f.inner_functions.contains_key("g"));
        assert!(!f.globals.contains("undeclared"));

        let page = tree.get(tree.pages()[0]);
        assert!(page.globals.contains("undeclared"));
        assert!(page.inner_functions.contains_key("f"));
    }

    #[test]
    fn resolution_walks_parents() {
        let code = "function outer(){ var y = 1; function inner(){ return y; } }";
        let tree = tree_for(code);
        let outer = tree.scope_by_name("$DOMAIN.$PAGE_1.outer").unwrap();
        let inner = tree.scope_by_name("$DOMAIN.$PAGE_1.outer.inner").unwrap();

        let var = tree.resolve(inner, "y").unwrap();
        assert_eq!(var.scope(), outer);
        assert_eq!(var.name(), "y");
    }

    #[test]
    fn local_declaration_shadows_parent() {
        let code = "function outer(){ var y = 1; function inner(){ var y = 2; return y; } }";
        let tree = tree_for(code);
        let inner = tree.scope_by_name("$DOMAIN.$PAGE_1.outer.inner").unwrap();

        assert_eq!(tree.resolve(inner, "y").unwrap().scope(), inner);
    }

    #[test]
    fn lookup_order_prefers_locals_over_params() {
        let tree = tree_for("function f(a) { var a; }");
        let f = tree.scope_by_name("$DOMAIN.$PAGE_1.f").unwrap();

        assert_eq!(tree.lookup(f, "a"), Some((f, VarClass::Local)));
    }

    #[test]
    fn builtins_resolve_to_page_and_domain() {
        let tree = tree_for("document.write(localStorage.x);");
        let page = tree.pages()[0];

        let document = tree.resolve(page, "document").unwrap();
        assert_eq!(document.scope(), page);
        assert_eq!(tree.builtin_kind(&document), Some(DefKind::HtmlDom));

        let storage = tree.resolve(page, "localStorage").unwrap();
        assert_eq!(storage.scope(), tree.domain());
        assert_eq!(tree.builtin_kind(&storage), Some(DefKind::LocalStorage));

        assert!(tree.resolve(page, "neverDeclared").is_none());
        assert!(!tree.has_variable(page, "neverDeclared"));
    }

    #[test]
    fn function_bindings_record_declarations_and_function_values() {
        let tree = tree_for(
            r#"
            function f() {}
            function f() {}
            var g = function () {};
            h = () => 0;
        "#,
        );
        let page = tree.pages()[0];

        assert_eq!(tree.function_bindings(page, "f").len(), 2);
        assert_eq!(tree.function_bindings(page, "g").len(), 1);
        assert_eq!(tree.function_bindings(page, "h").len(), 1);
        assert!(tree.function_bindings(page, "missing").is_empty());
    }

    #[test]
    fn catch_params_and_loop_heads_are_locals() {
        let tree = tree_for(
            r#"
            function f(list) {
                try { g(); } catch (err) {}
                for (var item of list) {}
                for (const key in list) {}
            }
        "#,
        );
        let f = tree.get(tree.scope_by_name("$DOMAIN.$PAGE_1.f").unwrap());

        for name in ["err", "item", "key"] {
            assert!(f.locals.contains(name), "{name} should be local");
        }
    }

    #[test]
    fn scopes_are_found_by_ast_and_range() {
        let program = parse("var a = function () { return 1; };");
        let tree = build_scope_tree(&program);
        let anon = tree.scope_by_name("$DOMAIN.$PAGE_1.$ANONYMOUS_FUN_1").unwrap();
        let scope = tree.get(anon);

        assert_eq!(tree.scope_of_ast(scope.ast.unwrap()), Some(anon));
        assert_eq!(
            tree.scope_by_range(tree.pages()[0], scope.range.unwrap()),
            Some(anon)
        );
        assert_eq!(tree.page_of(anon), Some(tree.pages()[0]));
    }

    #[test]
    fn several_programs_become_sibling_pages() {
        let mut tree = ScopeTree::new();
        let ids = IdGenerator::new();
        let first = ParsedFile::from_source("a.js", "var shared = 1;", &ids)
            .into_program()
            .unwrap();
        let second = ParsedFile::from_source("b.js", "function f() {}", &ids)
            .into_program()
            .unwrap();

        let a = tree.add_page(&first);
        let b = tree.add_page(&second);

        assert_eq!(tree.pages(), &[a, b]);
        assert_eq!(tree.get(b).name, "$DOMAIN.$PAGE_2");
        assert!(tree.resolve(b, "shared").is_none());
        assert!(tree.scope_by_name("$DOMAIN.$PAGE_2.f").is_some());
    }
}

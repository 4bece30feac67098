//! Lowering from the SWC tree into the ESTree model
//!
//! Ids are allocated before a node's children are lowered, so a program's
//! ids follow the pre-order of [`Node::walk`]. Parentheses and TypeScript
//! wrapper expressions are dropped without consuming an id.

use serde_json::Value;
use swc_common::{SourceMap, Span, Spanned};
use swc_ecma_ast as swc;

use crate::ast::{
    AstId, Class, DeclarationKind, Function, IdGenerator, MethodKind, Node, NodeKind, Position,
    PropertyKind, Range, RegexLiteral, SourceLocation, SourceType, TemplateValue,
};

pub(super) struct Lowerer<'a> {
    ids: &'a IdGenerator,
    source_map: &'a SourceMap,
    base: u32,
}

fn literal(value: Value, raw: Option<String>) -> NodeKind {
    NodeKind::Literal {
        value,
        raw,
        regex: None,
        bigint: None,
    }
}

impl<'a> Lowerer<'a> {
    pub(super) fn new(ids: &'a IdGenerator, source_map: &'a SourceMap, base: u32) -> Self {
        Self {
            ids,
            source_map,
            base,
        }
    }

    fn alloc(&self) -> AstId {
        self.ids.next_ast_id()
    }

    fn finish(&self, id: AstId, span: Span, kind: NodeKind) -> Node {
        Node {
            id,
            range: self.range(span),
            loc: self.location(span),
            kind,
        }
    }

    fn leaf(&self, span: Span, kind: NodeKind) -> Node {
        let id = self.alloc();
        self.finish(id, span, kind)
    }

    fn range(&self, span: Span) -> Range {
        Range(
            span.lo.0.saturating_sub(self.base),
            span.hi.0.saturating_sub(self.base),
        )
    }

    fn location(&self, span: Span) -> SourceLocation {
        if span.is_dummy() {
            return SourceLocation::default();
        }
        let start = self.source_map.lookup_char_pos(span.lo);
        let end = self.source_map.lookup_char_pos(span.hi);
        SourceLocation {
            start: Position {
                line: start.line as u32,
                column: start.col.0 as u32,
            },
            end: Position {
                line: end.line as u32,
                column: end.col.0 as u32,
            },
        }
    }

    pub(super) fn program(&self, program: &swc::Program) -> Node {
        let id = self.alloc();
        match program {
            swc::Program::Module(module) => {
                let body = module
                    .body
                    .iter()
                    .map(|item| self.module_item(item))
                    .collect();
                self.finish(
                    id,
                    module.span,
                    NodeKind::Program {
                        body,
                        source_type: SourceType::Module,
                    },
                )
            }
            swc::Program::Script(script) => {
                let body = self.stmts(&script.body);
                self.finish(
                    id,
                    script.span,
                    NodeKind::Program {
                        body,
                        source_type: SourceType::Script,
                    },
                )
            }
        }
    }

    fn module_item(&self, item: &swc::ModuleItem) -> Node {
        match item {
            swc::ModuleItem::Stmt(stmt) => self.stmt(stmt),
            swc::ModuleItem::ModuleDecl(decl) => self.module_decl(decl),
        }
    }

    fn module_decl(&self, decl: &swc::ModuleDecl) -> Node {
        let id = self.alloc();
        let kind = match decl {
            swc::ModuleDecl::Import(import) => NodeKind::ImportDeclaration {
                specifiers: import
                    .specifiers
                    .iter()
                    .map(|spec| self.import_specifier(spec))
                    .collect(),
                source: Box::new(self.str_lit(&import.src)),
            },
            swc::ModuleDecl::ExportDecl(export) => NodeKind::ExportNamedDeclaration {
                declaration: Some(Box::new(self.decl(&export.decl))),
                specifiers: Vec::new(),
                source: None,
            },
            swc::ModuleDecl::ExportNamed(named) => NodeKind::ExportNamedDeclaration {
                declaration: None,
                specifiers: named
                    .specifiers
                    .iter()
                    .map(|spec| self.export_specifier(spec))
                    .collect(),
                source: named.src.as_ref().map(|src| Box::new(self.str_lit(src))),
            },
            swc::ModuleDecl::ExportDefaultDecl(export) => NodeKind::ExportDefaultDeclaration {
                declaration: Box::new(self.default_decl(&export.decl)),
            },
            swc::ModuleDecl::ExportDefaultExpr(export) => NodeKind::ExportDefaultDeclaration {
                declaration: self.bexpr(&export.expr),
            },
            swc::ModuleDecl::ExportAll(export) => NodeKind::ExportAllDeclaration {
                source: Box::new(self.str_lit(&export.src)),
                exported: None,
            },
            _ => NodeKind::EmptyStatement,
        };
        self.finish(id, decl.span(), kind)
    }

    fn import_specifier(&self, spec: &swc::ImportSpecifier) -> Node {
        let id = self.alloc();
        match spec {
            swc::ImportSpecifier::Named(named) => {
                let imported = match &named.imported {
                    Some(name) => self.export_name(name),
                    None => self.ident(&named.local),
                };
                let local = self.ident(&named.local);
                self.finish(
                    id,
                    named.span,
                    NodeKind::ImportSpecifier {
                        local: Box::new(local),
                        imported: Box::new(imported),
                    },
                )
            }
            swc::ImportSpecifier::Default(default) => {
                let local = Box::new(self.ident(&default.local));
                self.finish(id, default.span, NodeKind::ImportDefaultSpecifier { local })
            }
            swc::ImportSpecifier::Namespace(namespace) => {
                let local = Box::new(self.ident(&namespace.local));
                self.finish(
                    id,
                    namespace.span,
                    NodeKind::ImportNamespaceSpecifier { local },
                )
            }
        }
    }

    fn export_specifier(&self, spec: &swc::ExportSpecifier) -> Node {
        let id = self.alloc();
        let (local, exported, span) = match spec {
            swc::ExportSpecifier::Named(named) => {
                let local = self.export_name(&named.orig);
                let exported = match &named.exported {
                    Some(name) => self.export_name(name),
                    None => self.export_name(&named.orig),
                };
                (local, exported, named.span)
            }
            swc::ExportSpecifier::Namespace(namespace) => (
                self.export_name(&namespace.name),
                self.export_name(&namespace.name),
                namespace.span,
            ),
            swc::ExportSpecifier::Default(default) => (
                self.ident(&default.exported),
                self.ident(&default.exported),
                default.exported.span,
            ),
        };
        self.finish(
            id,
            span,
            NodeKind::ExportSpecifier {
                local: Box::new(local),
                exported: Box::new(exported),
            },
        )
    }

    fn export_name(&self, name: &swc::ModuleExportName) -> Node {
        match name {
            swc::ModuleExportName::Ident(ident) => self.ident(ident),
            swc::ModuleExportName::Str(s) => self.str_lit(s),
        }
    }

    fn default_decl(&self, decl: &swc::DefaultDecl) -> Node {
        let id = self.alloc();
        match decl {
            swc::DefaultDecl::Class(class) => {
                let lowered = self.class(class.ident.as_ref(), &class.class);
                let kind = if class.ident.is_some() {
                    NodeKind::ClassDeclaration(lowered)
                } else {
                    NodeKind::ClassExpression(lowered)
                };
                self.finish(id, class.class.span, kind)
            }
            swc::DefaultDecl::Fn(function) => {
                let lowered = self.function(function.ident.as_ref(), &function.function);
                let kind = if function.ident.is_some() {
                    NodeKind::FunctionDeclaration(lowered)
                } else {
                    NodeKind::FunctionExpression(lowered)
                };
                self.finish(id, function.function.span, kind)
            }
            swc::DefaultDecl::TsInterfaceDecl(interface) => {
                self.finish(id, interface.span, NodeKind::EmptyStatement)
            }
        }
    }

    fn stmts(&self, stmts: &[swc::Stmt]) -> Vec<Node> {
        stmts.iter().map(|stmt| self.stmt(stmt)).collect()
    }

    fn stmt(&self, stmt: &swc::Stmt) -> Node {
        let id = self.alloc();
        let kind = self.stmt_kind(stmt);
        self.finish(id, stmt.span(), kind)
    }

    fn boxed_stmt(&self, stmt: &swc::Stmt) -> Box<Node> {
        Box::new(self.stmt(stmt))
    }

    fn stmt_kind(&self, stmt: &swc::Stmt) -> NodeKind {
        match stmt {
            swc::Stmt::Block(block) => NodeKind::BlockStatement {
                body: self.stmts(&block.stmts),
            },
            swc::Stmt::Empty(_) => NodeKind::EmptyStatement,
            swc::Stmt::Debugger(_) => NodeKind::DebuggerStatement,
            swc::Stmt::With(with) => NodeKind::WithStatement {
                object: self.bexpr(&with.obj),
                body: self.boxed_stmt(&with.body),
            },
            swc::Stmt::Return(ret) => NodeKind::ReturnStatement {
                argument: ret.arg.as_ref().map(|arg| self.bexpr(arg)),
            },
            swc::Stmt::Labeled(labeled) => NodeKind::LabeledStatement {
                label: Box::new(self.ident(&labeled.label)),
                body: self.boxed_stmt(&labeled.body),
            },
            swc::Stmt::Break(brk) => NodeKind::BreakStatement {
                label: brk.label.as_ref().map(|label| Box::new(self.ident(label))),
            },
            swc::Stmt::Continue(cont) => NodeKind::ContinueStatement {
                label: cont.label.as_ref().map(|label| Box::new(self.ident(label))),
            },
            swc::Stmt::If(if_stmt) => NodeKind::IfStatement {
                test: self.bexpr(&if_stmt.test),
                consequent: self.boxed_stmt(&if_stmt.cons),
                alternate: if_stmt.alt.as_ref().map(|alt| self.boxed_stmt(alt)),
            },
            swc::Stmt::Switch(switch) => NodeKind::SwitchStatement {
                discriminant: self.bexpr(&switch.discriminant),
                cases: switch
                    .cases
                    .iter()
                    .map(|case| {
                        let id = self.alloc();
                        let kind = NodeKind::SwitchCase {
                            test: case.test.as_ref().map(|test| self.bexpr(test)),
                            consequent: self.stmts(&case.cons),
                        };
                        self.finish(id, case.span, kind)
                    })
                    .collect(),
            },
            swc::Stmt::Throw(throw) => NodeKind::ThrowStatement {
                argument: self.bexpr(&throw.arg),
            },
            swc::Stmt::Try(try_stmt) => NodeKind::TryStatement {
                block: Box::new(self.block(&try_stmt.block)),
                handler: try_stmt.handler.as_ref().map(|handler| {
                    let id = self.alloc();
                    let kind = NodeKind::CatchClause {
                        param: handler.param.as_ref().map(|param| Box::new(self.pat(param))),
                        body: Box::new(self.block(&handler.body)),
                    };
                    Box::new(self.finish(id, handler.span, kind))
                }),
                finalizer: try_stmt
                    .finalizer
                    .as_ref()
                    .map(|finalizer| Box::new(self.block(finalizer))),
            },
            swc::Stmt::While(while_stmt) => NodeKind::WhileStatement {
                test: self.bexpr(&while_stmt.test),
                body: self.boxed_stmt(&while_stmt.body),
            },
            swc::Stmt::DoWhile(do_while) => NodeKind::DoWhileStatement {
                body: self.boxed_stmt(&do_while.body),
                test: self.bexpr(&do_while.test),
            },
            swc::Stmt::For(for_stmt) => NodeKind::ForStatement {
                init: for_stmt.init.as_ref().map(|init| {
                    Box::new(match init {
                        swc::VarDeclOrExpr::VarDecl(var) => self.var_decl(var),
                        swc::VarDeclOrExpr::Expr(expr) => self.expr(expr),
                    })
                }),
                test: for_stmt.test.as_ref().map(|test| self.bexpr(test)),
                update: for_stmt.update.as_ref().map(|update| self.bexpr(update)),
                body: self.boxed_stmt(&for_stmt.body),
            },
            swc::Stmt::ForIn(for_in) => NodeKind::ForInStatement {
                left: Box::new(self.for_head(&for_in.left)),
                right: self.bexpr(&for_in.right),
                body: self.boxed_stmt(&for_in.body),
            },
            swc::Stmt::ForOf(for_of) => NodeKind::ForOfStatement {
                left: Box::new(self.for_head(&for_of.left)),
                right: self.bexpr(&for_of.right),
                body: self.boxed_stmt(&for_of.body),
                is_await: for_of.is_await,
            },
            swc::Stmt::Decl(decl) => self.decl_kind(decl),
            swc::Stmt::Expr(expr) => NodeKind::ExpressionStatement {
                expression: self.bexpr(&expr.expr),
            },
        }
    }

    fn block(&self, block: &swc::BlockStmt) -> Node {
        let id = self.alloc();
        let body = self.stmts(&block.stmts);
        self.finish(id, block.span, NodeKind::BlockStatement { body })
    }

    fn empty_block(&self, span: Span) -> Node {
        self.leaf(span, NodeKind::BlockStatement { body: Vec::new() })
    }

    fn for_head(&self, head: &swc::ForHead) -> Node {
        match head {
            swc::ForHead::VarDecl(var) => self.var_decl(var),
            swc::ForHead::UsingDecl(using) => self.using_decl(using),
            swc::ForHead::Pat(pat) => self.pat(pat),
        }
    }

    fn decl(&self, decl: &swc::Decl) -> Node {
        let id = self.alloc();
        let kind = self.decl_kind(decl);
        self.finish(id, decl.span(), kind)
    }

    fn decl_kind(&self, decl: &swc::Decl) -> NodeKind {
        match decl {
            swc::Decl::Class(class) => {
                NodeKind::ClassDeclaration(self.class(Some(&class.ident), &class.class))
            }
            swc::Decl::Fn(function) => {
                NodeKind::FunctionDeclaration(self.function(Some(&function.ident), &function.function))
            }
            swc::Decl::Var(var) => self.var_decl_kind(var),
            swc::Decl::Using(using) => NodeKind::VariableDeclaration {
                declarations: using.decls.iter().map(|d| self.declarator(d)).collect(),
                kind: DeclarationKind::Const,
            },
            // Type-only declarations have no runtime behaviour.
            _ => NodeKind::EmptyStatement,
        }
    }

    fn var_decl(&self, var: &swc::VarDecl) -> Node {
        let id = self.alloc();
        let kind = self.var_decl_kind(var);
        self.finish(id, var.span, kind)
    }

    fn using_decl(&self, using: &swc::UsingDecl) -> Node {
        let id = self.alloc();
        let kind = NodeKind::VariableDeclaration {
            declarations: using.decls.iter().map(|d| self.declarator(d)).collect(),
            kind: DeclarationKind::Const,
        };
        self.finish(id, using.span, kind)
    }

    fn var_decl_kind(&self, var: &swc::VarDecl) -> NodeKind {
        let kind = match var.kind {
            swc::VarDeclKind::Var => DeclarationKind::Var,
            swc::VarDeclKind::Let => DeclarationKind::Let,
            swc::VarDeclKind::Const => DeclarationKind::Const,
        };
        NodeKind::VariableDeclaration {
            declarations: var.decls.iter().map(|d| self.declarator(d)).collect(),
            kind,
        }
    }

    fn declarator(&self, declarator: &swc::VarDeclarator) -> Node {
        let id = self.alloc();
        let kind = NodeKind::VariableDeclarator {
            id: Box::new(self.pat(&declarator.name)),
            init: declarator.init.as_ref().map(|init| self.bexpr(init)),
        };
        self.finish(id, declarator.span, kind)
    }

    fn function(&self, name: Option<&swc::Ident>, function: &swc::Function) -> Function {
        Function {
            id: name.map(|ident| Box::new(self.ident(ident))),
            params: function
                .params
                .iter()
                .map(|param| self.pat(&param.pat))
                .collect(),
            body: Box::new(match &function.body {
                Some(body) => self.block(body),
                None => self.empty_block(function.span),
            }),
            generator: function.is_generator,
            is_async: function.is_async,
            expression: false,
        }
    }

    fn function_expr(&self, function: &swc::Function) -> Node {
        let id = self.alloc();
        let lowered = self.function(None, function);
        self.finish(id, function.span, NodeKind::FunctionExpression(lowered))
    }

    fn class(&self, name: Option<&swc::Ident>, class: &swc::Class) -> Class {
        Class {
            id: name.map(|ident| Box::new(self.ident(ident))),
            super_class: class.super_class.as_ref().map(|sup| self.bexpr(sup)),
            body: Box::new(self.class_body(class)),
        }
    }

    fn class_body(&self, class: &swc::Class) -> Node {
        let id = self.alloc();
        let body = class
            .body
            .iter()
            .filter_map(|member| self.class_member(member))
            .collect();
        self.finish(id, class.span, NodeKind::ClassBody { body })
    }

    fn class_member(&self, member: &swc::ClassMember) -> Option<Node> {
        match member {
            swc::ClassMember::Constructor(ctor) => {
                let id = self.alloc();
                let key = Box::new(self.prop_name(&ctor.key));
                let value_id = self.alloc();
                let params = ctor
                    .params
                    .iter()
                    .map(|param| match param {
                        swc::ParamOrTsParamProp::Param(param) => self.pat(&param.pat),
                        swc::ParamOrTsParamProp::TsParamProp(prop) => match &prop.param {
                            swc::TsParamPropParam::Ident(binding) => self.ident(&binding.id),
                            swc::TsParamPropParam::Assign(assign) => self.assign_pat(assign),
                        },
                    })
                    .collect();
                let body = Box::new(match &ctor.body {
                    Some(body) => self.block(body),
                    None => self.empty_block(ctor.span),
                });
                let value = self.finish(
                    value_id,
                    ctor.span,
                    NodeKind::FunctionExpression(Function {
                        id: None,
                        params,
                        body,
                        generator: false,
                        is_async: false,
                        expression: false,
                    }),
                );
                Some(self.finish(
                    id,
                    ctor.span,
                    NodeKind::MethodDefinition {
                        key,
                        value: Box::new(value),
                        kind: MethodKind::Constructor,
                        computed: false,
                        is_static: false,
                    },
                ))
            }
            swc::ClassMember::Method(method) => {
                let id = self.alloc();
                let key = Box::new(self.prop_name(&method.key));
                let value = Box::new(self.function_expr(&method.function));
                let kind = match method.kind {
                    swc::MethodKind::Method => MethodKind::Method,
                    swc::MethodKind::Getter => MethodKind::Get,
                    swc::MethodKind::Setter => MethodKind::Set,
                };
                Some(self.finish(
                    id,
                    method.span,
                    NodeKind::MethodDefinition {
                        key,
                        value,
                        kind,
                        computed: matches!(method.key, swc::PropName::Computed(_)),
                        is_static: method.is_static,
                    },
                ))
            }
            swc::ClassMember::PrivateMethod(method) => {
                let id = self.alloc();
                let key = Box::new(self.private_name(&method.key));
                let value = Box::new(self.function_expr(&method.function));
                Some(self.finish(
                    id,
                    method.span,
                    NodeKind::MethodDefinition {
                        key,
                        value,
                        kind: MethodKind::Method,
                        computed: false,
                        is_static: method.is_static,
                    },
                ))
            }
            swc::ClassMember::ClassProp(prop) => {
                let id = self.alloc();
                let key = Box::new(self.prop_name(&prop.key));
                let value = prop.value.as_ref().map(|value| self.bexpr(value));
                Some(self.finish(
                    id,
                    prop.span,
                    NodeKind::PropertyDefinition {
                        key,
                        value,
                        computed: matches!(prop.key, swc::PropName::Computed(_)),
                        is_static: prop.is_static,
                    },
                ))
            }
            swc::ClassMember::PrivateProp(prop) => {
                let id = self.alloc();
                let key = Box::new(self.private_name(&prop.key));
                let value = prop.value.as_ref().map(|value| self.bexpr(value));
                Some(self.finish(
                    id,
                    prop.span,
                    NodeKind::PropertyDefinition {
                        key,
                        value,
                        computed: false,
                        is_static: prop.is_static,
                    },
                ))
            }
            _ => None,
        }
    }

    fn private_name(&self, name: &swc::PrivateName) -> Node {
        self.leaf(
            name.span,
            NodeKind::Identifier {
                name: format!("#{}", name.name),
            },
        )
    }

    fn prop_name(&self, key: &swc::PropName) -> Node {
        match key {
            swc::PropName::Ident(ident) => self.leaf(
                ident.span,
                NodeKind::Identifier {
                    name: ident.sym.to_string(),
                },
            ),
            swc::PropName::Str(s) => self.str_lit(s),
            swc::PropName::Num(n) => self.num_lit(n),
            swc::PropName::Computed(computed) => self.expr(&computed.expr),
            swc::PropName::BigInt(b) => self.bigint_lit(b),
        }
    }

    fn ident(&self, ident: &swc::Ident) -> Node {
        self.leaf(
            ident.span,
            NodeKind::Identifier {
                name: ident.sym.to_string(),
            },
        )
    }

    fn ident_name(&self, ident: &swc::IdentName) -> Node {
        self.leaf(
            ident.span,
            NodeKind::Identifier {
                name: ident.sym.to_string(),
            },
        )
    }

    fn str_lit(&self, s: &swc::Str) -> Node {
        self.leaf(
            s.span,
            literal(
                Value::String(s.value.to_string()),
                s.raw.as_ref().map(|raw| raw.to_string()),
            ),
        )
    }

    fn num_lit(&self, n: &swc::Number) -> Node {
        let value = serde_json::Number::from_f64(n.value)
            .map(Value::Number)
            .unwrap_or(Value::Null);
        let raw = n
            .raw
            .as_ref()
            .map(|raw| raw.to_string())
            .unwrap_or_else(|| n.value.to_string());
        self.leaf(n.span, literal(value, Some(raw)))
    }

    fn bigint_lit(&self, b: &swc::BigInt) -> Node {
        let digits = b.value.to_string();
        let raw = b
            .raw
            .as_ref()
            .map(|raw| raw.to_string())
            .unwrap_or_else(|| format!("{digits}n"));
        self.leaf(
            b.span,
            NodeKind::Literal {
                value: Value::Null,
                raw: Some(raw),
                regex: None,
                bigint: Some(digits),
            },
        )
    }

    fn lit(&self, lit: &swc::Lit) -> Node {
        match lit {
            swc::Lit::Str(s) => self.str_lit(s),
            swc::Lit::Num(n) => self.num_lit(n),
            swc::Lit::BigInt(b) => self.bigint_lit(b),
            swc::Lit::Bool(b) => self.leaf(
                b.span,
                literal(Value::Bool(b.value), Some(b.value.to_string())),
            ),
            swc::Lit::Null(null) => self.leaf(null.span, literal(Value::Null, Some("null".into()))),
            swc::Lit::Regex(regex) => self.leaf(
                regex.span,
                NodeKind::Literal {
                    value: Value::Null,
                    raw: Some(format!("/{}/{}", regex.exp, regex.flags)),
                    regex: Some(RegexLiteral {
                        pattern: regex.exp.to_string(),
                        flags: regex.flags.to_string(),
                    }),
                    bigint: None,
                },
            ),
            swc::Lit::JSXText(text) => self.leaf(
                text.span,
                literal(
                    Value::String(text.value.to_string()),
                    Some(text.raw.to_string()),
                ),
            ),
        }
    }

    fn bexpr(&self, expr: &swc::Expr) -> Box<Node> {
        Box::new(self.expr(expr))
    }

    fn expr(&self, expr: &swc::Expr) -> Node {
        match expr {
            swc::Expr::Paren(paren) => return self.expr(&paren.expr),
            swc::Expr::TsAs(ts) => return self.expr(&ts.expr),
            swc::Expr::TsSatisfies(ts) => return self.expr(&ts.expr),
            swc::Expr::TsNonNull(ts) => return self.expr(&ts.expr),
            swc::Expr::TsTypeAssertion(ts) => return self.expr(&ts.expr),
            swc::Expr::TsConstAssertion(ts) => return self.expr(&ts.expr),
            swc::Expr::TsInstantiation(ts) => return self.expr(&ts.expr),
            swc::Expr::Lit(lit) => return self.lit(lit),
            swc::Expr::Ident(ident) => return self.ident(ident),
            swc::Expr::Tpl(tpl) => return self.template(tpl),
            _ => {}
        }

        let id = self.alloc();
        let kind = match expr {
            swc::Expr::This(_) => NodeKind::ThisExpression,
            swc::Expr::Array(array) => NodeKind::ArrayExpression {
                elements: array
                    .elems
                    .iter()
                    .map(|elem| elem.as_ref().map(|elem| self.expr_or_spread(elem)))
                    .collect(),
            },
            swc::Expr::Object(object) => NodeKind::ObjectExpression {
                properties: object
                    .props
                    .iter()
                    .map(|prop| self.prop_or_spread(prop))
                    .collect(),
            },
            swc::Expr::Fn(function) => {
                NodeKind::FunctionExpression(self.function(function.ident.as_ref(), &function.function))
            }
            swc::Expr::Arrow(arrow) => {
                let params = arrow.params.iter().map(|param| self.pat(param)).collect();
                let (body, expression) = match &*arrow.body {
                    swc::BlockStmtOrExpr::BlockStmt(block) => (self.block(block), false),
                    swc::BlockStmtOrExpr::Expr(body) => (self.expr(body), true),
                };
                NodeKind::ArrowFunctionExpression(Function {
                    id: None,
                    params,
                    body: Box::new(body),
                    generator: arrow.is_generator,
                    is_async: arrow.is_async,
                    expression,
                })
            }
            swc::Expr::Class(class) => {
                NodeKind::ClassExpression(self.class(class.ident.as_ref(), &class.class))
            }
            swc::Expr::Unary(unary) => NodeKind::UnaryExpression {
                operator: unary.op.to_string(),
                argument: self.bexpr(&unary.arg),
                prefix: true,
            },
            swc::Expr::Update(update) => NodeKind::UpdateExpression {
                operator: update.op.to_string(),
                argument: self.bexpr(&update.arg),
                prefix: update.prefix,
            },
            swc::Expr::Bin(bin) => {
                let operator = bin.op.to_string();
                let left = self.bexpr(&bin.left);
                let right = self.bexpr(&bin.right);
                if matches!(
                    bin.op,
                    swc::BinaryOp::LogicalOr
                        | swc::BinaryOp::LogicalAnd
                        | swc::BinaryOp::NullishCoalescing
                ) {
                    NodeKind::LogicalExpression {
                        operator,
                        left,
                        right,
                    }
                } else {
                    NodeKind::BinaryExpression {
                        operator,
                        left,
                        right,
                    }
                }
            }
            swc::Expr::Assign(assign) => NodeKind::AssignmentExpression {
                operator: assign.op.to_string(),
                left: Box::new(self.assign_target(&assign.left)),
                right: self.bexpr(&assign.right),
            },
            swc::Expr::Member(member) => self.member_kind(member, false),
            swc::Expr::SuperProp(sup) => NodeKind::MemberExpression {
                object: Box::new(self.leaf(sup.obj.span, NodeKind::Super)),
                property: Box::new(match &sup.prop {
                    swc::SuperProp::Ident(ident) => self.ident_name(ident),
                    swc::SuperProp::Computed(computed) => self.expr(&computed.expr),
                }),
                computed: matches!(sup.prop, swc::SuperProp::Computed(_)),
                optional: false,
            },
            swc::Expr::Cond(cond) => NodeKind::ConditionalExpression {
                test: self.bexpr(&cond.test),
                consequent: self.bexpr(&cond.cons),
                alternate: self.bexpr(&cond.alt),
            },
            swc::Expr::Call(call) => NodeKind::CallExpression {
                callee: Box::new(match &call.callee {
                    swc::Callee::Super(sup) => self.leaf(sup.span, NodeKind::Super),
                    swc::Callee::Import(import) => self.leaf(
                        import.span,
                        NodeKind::Identifier {
                            name: "import".to_string(),
                        },
                    ),
                    swc::Callee::Expr(callee) => self.expr(callee),
                }),
                arguments: self.args(&call.args),
                optional: false,
            },
            swc::Expr::New(new) => NodeKind::NewExpression {
                callee: self.bexpr(&new.callee),
                arguments: new
                    .args
                    .iter()
                    .flatten()
                    .map(|arg| self.expr_or_spread(arg))
                    .collect(),
            },
            swc::Expr::Seq(seq) => NodeKind::SequenceExpression {
                expressions: seq.exprs.iter().map(|e| self.expr(e)).collect(),
            },
            swc::Expr::TaggedTpl(tagged) => NodeKind::TaggedTemplateExpression {
                tag: self.bexpr(&tagged.tag),
                quasi: Box::new(self.template(&tagged.tpl)),
            },
            swc::Expr::Yield(yield_expr) => NodeKind::YieldExpression {
                argument: yield_expr.arg.as_ref().map(|arg| self.bexpr(arg)),
                delegate: yield_expr.delegate,
            },
            swc::Expr::Await(await_expr) => NodeKind::AwaitExpression {
                argument: self.bexpr(&await_expr.arg),
            },
            swc::Expr::MetaProp(meta) => {
                let (object, property) = match meta.kind {
                    swc::MetaPropKind::NewTarget => ("new", "target"),
                    swc::MetaPropKind::ImportMeta => ("import", "meta"),
                };
                NodeKind::MetaProperty {
                    meta: Box::new(self.leaf(
                        meta.span,
                        NodeKind::Identifier {
                            name: object.to_string(),
                        },
                    )),
                    property: Box::new(self.leaf(
                        meta.span,
                        NodeKind::Identifier {
                            name: property.to_string(),
                        },
                    )),
                }
            }
            swc::Expr::PrivateName(name) => NodeKind::Identifier {
                name: format!("#{}", name.name),
            },
            swc::Expr::OptChain(chain) => NodeKind::ChainExpression {
                expression: Box::new(self.opt_chain(chain)),
            },
            // JSX and recovery placeholders are opaque to the analyses.
            _ => NodeKind::Unsupported,
        };
        self.finish(id, expr.span(), kind)
    }

    fn opt_chain(&self, chain: &swc::OptChainExpr) -> Node {
        let id = self.alloc();
        let kind = match &*chain.base {
            swc::OptChainBase::Member(member) => self.member_kind(member, chain.optional),
            swc::OptChainBase::Call(call) => NodeKind::CallExpression {
                callee: self.bexpr(&call.callee),
                arguments: self.args(&call.args),
                optional: chain.optional,
            },
        };
        self.finish(id, chain.span, kind)
    }

    fn member_kind(&self, member: &swc::MemberExpr, optional: bool) -> NodeKind {
        NodeKind::MemberExpression {
            object: self.bexpr(&member.obj),
            property: Box::new(match &member.prop {
                swc::MemberProp::Ident(ident) => self.ident_name(ident),
                swc::MemberProp::PrivateName(name) => self.private_name(name),
                swc::MemberProp::Computed(computed) => self.expr(&computed.expr),
            }),
            computed: matches!(member.prop, swc::MemberProp::Computed(_)),
            optional,
        }
    }

    fn member(&self, member: &swc::MemberExpr) -> Node {
        let id = self.alloc();
        let kind = self.member_kind(member, false);
        self.finish(id, member.span, kind)
    }

    fn args(&self, args: &[swc::ExprOrSpread]) -> Vec<Node> {
        args.iter().map(|arg| self.expr_or_spread(arg)).collect()
    }

    fn expr_or_spread(&self, arg: &swc::ExprOrSpread) -> Node {
        if arg.spread.is_some() {
            let id = self.alloc();
            let argument = self.bexpr(&arg.expr);
            self.finish(id, arg.span(), NodeKind::SpreadElement { argument })
        } else {
            self.expr(&arg.expr)
        }
    }

    fn prop_or_spread(&self, prop: &swc::PropOrSpread) -> Node {
        match prop {
            swc::PropOrSpread::Spread(spread) => {
                let id = self.alloc();
                let argument = self.bexpr(&spread.expr);
                self.finish(id, spread.span(), NodeKind::SpreadElement { argument })
            }
            swc::PropOrSpread::Prop(prop) => self.prop(prop),
        }
    }

    fn prop(&self, prop: &swc::Prop) -> Node {
        let id = self.alloc();
        let property = |key: Node, value: Node, kind: PropertyKind, computed, method, shorthand| {
            NodeKind::Property {
                key: Box::new(key),
                value: Box::new(value),
                kind,
                computed,
                method,
                shorthand,
            }
        };
        let kind = match prop {
            swc::Prop::Shorthand(ident) => {
                let key = self.ident(ident);
                let value = self.ident(ident);
                property(key, value, PropertyKind::Init, false, false, true)
            }
            swc::Prop::KeyValue(kv) => {
                let key = self.prop_name(&kv.key);
                let value = self.expr(&kv.value);
                let computed = matches!(kv.key, swc::PropName::Computed(_));
                property(key, value, PropertyKind::Init, computed, false, false)
            }
            swc::Prop::Assign(assign) => {
                let key = self.ident(&assign.key);
                let pattern_id = self.alloc();
                let left = Box::new(self.ident(&assign.key));
                let right = self.bexpr(&assign.value);
                let value = self.finish(
                    pattern_id,
                    prop.span(),
                    NodeKind::AssignmentPattern { left, right },
                );
                property(key, value, PropertyKind::Init, false, false, true)
            }
            swc::Prop::Getter(getter) => {
                let key = self.prop_name(&getter.key);
                let value_id = self.alloc();
                let body = Box::new(match &getter.body {
                    Some(body) => self.block(body),
                    None => self.empty_block(getter.span),
                });
                let value = self.finish(
                    value_id,
                    getter.span,
                    NodeKind::FunctionExpression(Function {
                        id: None,
                        params: Vec::new(),
                        body,
                        generator: false,
                        is_async: false,
                        expression: false,
                    }),
                );
                let computed = matches!(getter.key, swc::PropName::Computed(_));
                property(key, value, PropertyKind::Get, computed, false, false)
            }
            swc::Prop::Setter(setter) => {
                let key = self.prop_name(&setter.key);
                let value_id = self.alloc();
                let params = vec![self.pat(&setter.param)];
                let body = Box::new(match &setter.body {
                    Some(body) => self.block(body),
                    None => self.empty_block(setter.span),
                });
                let value = self.finish(
                    value_id,
                    setter.span,
                    NodeKind::FunctionExpression(Function {
                        id: None,
                        params,
                        body,
                        generator: false,
                        is_async: false,
                        expression: false,
                    }),
                );
                let computed = matches!(setter.key, swc::PropName::Computed(_));
                property(key, value, PropertyKind::Set, computed, false, false)
            }
            swc::Prop::Method(method) => {
                let key = self.prop_name(&method.key);
                let value = self.function_expr(&method.function);
                let computed = matches!(method.key, swc::PropName::Computed(_));
                property(key, value, PropertyKind::Init, computed, true, false)
            }
        };
        self.finish(id, prop.span(), kind)
    }

    fn template(&self, tpl: &swc::Tpl) -> Node {
        let id = self.alloc();
        let quasis = tpl
            .quasis
            .iter()
            .map(|quasi| {
                self.leaf(
                    quasi.span,
                    NodeKind::TemplateElement {
                        value: TemplateValue {
                            raw: quasi.raw.to_string(),
                            cooked: quasi.cooked.as_ref().map(|cooked| cooked.to_string()),
                        },
                        tail: quasi.tail,
                    },
                )
            })
            .collect();
        let expressions = tpl.exprs.iter().map(|e| self.expr(e)).collect();
        self.finish(
            id,
            tpl.span,
            NodeKind::TemplateLiteral {
                quasis,
                expressions,
            },
        )
    }

    fn assign_target(&self, target: &swc::AssignTarget) -> Node {
        match target {
            swc::AssignTarget::Simple(simple) => match simple {
                swc::SimpleAssignTarget::Ident(binding) => self.ident(&binding.id),
                swc::SimpleAssignTarget::Member(member) => self.member(member),
                swc::SimpleAssignTarget::Paren(paren) => self.expr(&paren.expr),
                swc::SimpleAssignTarget::SuperProp(sup) => {
                    self.expr(&swc::Expr::SuperProp(sup.clone()))
                }
                swc::SimpleAssignTarget::OptChain(chain) => self.opt_chain(chain),
                swc::SimpleAssignTarget::TsAs(ts) => self.expr(&ts.expr),
                swc::SimpleAssignTarget::TsSatisfies(ts) => self.expr(&ts.expr),
                swc::SimpleAssignTarget::TsNonNull(ts) => self.expr(&ts.expr),
                swc::SimpleAssignTarget::TsTypeAssertion(ts) => self.expr(&ts.expr),
                swc::SimpleAssignTarget::TsInstantiation(ts) => self.expr(&ts.expr),
                swc::SimpleAssignTarget::Invalid(invalid) => {
                    self.leaf(invalid.span, NodeKind::Unsupported)
                }
            },
            swc::AssignTarget::Pat(pat) => match pat {
                swc::AssignTargetPat::Array(array) => self.array_pat(array),
                swc::AssignTargetPat::Object(object) => self.object_pat(object),
                swc::AssignTargetPat::Invalid(invalid) => {
                    self.leaf(invalid.span, NodeKind::Unsupported)
                }
            },
        }
    }

    fn pat(&self, pat: &swc::Pat) -> Node {
        match pat {
            swc::Pat::Ident(binding) => self.ident(&binding.id),
            swc::Pat::Array(array) => self.array_pat(array),
            swc::Pat::Object(object) => self.object_pat(object),
            swc::Pat::Rest(rest) => {
                let id = self.alloc();
                let argument = Box::new(self.pat(&rest.arg));
                self.finish(id, rest.span, NodeKind::RestElement { argument })
            }
            swc::Pat::Assign(assign) => self.assign_pat(assign),
            swc::Pat::Expr(expr) => self.expr(expr),
            swc::Pat::Invalid(invalid) => self.leaf(invalid.span, NodeKind::Unsupported),
        }
    }

    fn assign_pat(&self, assign: &swc::AssignPat) -> Node {
        let id = self.alloc();
        let left = Box::new(self.pat(&assign.left));
        let right = self.bexpr(&assign.right);
        self.finish(id, assign.span, NodeKind::AssignmentPattern { left, right })
    }

    fn array_pat(&self, array: &swc::ArrayPat) -> Node {
        let id = self.alloc();
        let elements = array
            .elems
            .iter()
            .map(|elem| elem.as_ref().map(|elem| self.pat(elem)))
            .collect();
        self.finish(id, array.span, NodeKind::ArrayPattern { elements })
    }

    fn object_pat(&self, object: &swc::ObjectPat) -> Node {
        let id = self.alloc();
        let properties = object
            .props
            .iter()
            .map(|prop| match prop {
                swc::ObjectPatProp::KeyValue(kv) => {
                    let prop_id = self.alloc();
                    let key = Box::new(self.prop_name(&kv.key));
                    let value = Box::new(self.pat(&kv.value));
                    let span = kv.key.span().with_hi(kv.value.span().hi);
                    self.finish(
                        prop_id,
                        span,
                        NodeKind::Property {
                            key,
                            value,
                            kind: PropertyKind::Init,
                            computed: matches!(kv.key, swc::PropName::Computed(_)),
                            method: false,
                            shorthand: false,
                        },
                    )
                }
                swc::ObjectPatProp::Assign(assign) => {
                    let prop_id = self.alloc();
                    let key = Box::new(self.ident(&assign.key));
                    let value = match &assign.value {
                        Some(default) => {
                            let pattern_id = self.alloc();
                            let left = Box::new(self.ident(&assign.key));
                            let right = self.bexpr(default);
                            self.finish(
                                pattern_id,
                                assign.span,
                                NodeKind::AssignmentPattern { left, right },
                            )
                        }
                        None => self.ident(&assign.key),
                    };
                    self.finish(
                        prop_id,
                        assign.span,
                        NodeKind::Property {
                            key,
                            value: Box::new(value),
                            kind: PropertyKind::Init,
                            computed: false,
                            method: false,
                            shorthand: true,
                        },
                    )
                }
                swc::ObjectPatProp::Rest(rest) => {
                    let rest_id = self.alloc();
                    let argument = Box::new(self.pat(&rest.arg));
                    self.finish(rest_id, rest.span, NodeKind::RestElement { argument })
                }
            })
            .collect();
        self.finish(id, object.span, NodeKind::ObjectPattern { properties })
    }
}

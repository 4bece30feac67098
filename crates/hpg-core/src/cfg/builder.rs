use crate::ast::{Node, NodeKind};
use crate::flow::{EdgeKind, FlowKind, FlowNodeFactory, FlowNodeId};
use crate::scope::ScopeId;

/// Edges whose source exists but whose target is the next node built.
pub(super) type Dangling = Vec<(FlowNodeId, EdgeKind)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Loop,
    Switch,
    Label,
}

#[derive(Debug)]
struct JumpFrame {
    kind: FrameKind,
    /// Every label naming this construct (`a: b: while …` gives both).
    labels: Vec<String>,
    continue_to: Option<FlowNodeId>,
    /// `None` when the target is whatever follows the construct; such
    /// breaks are collected in `breaks` instead.
    break_to: Option<FlowNodeId>,
    breaks: Dangling,
}

pub(super) struct CfgBuilder<'f> {
    factory: &'f mut FlowNodeFactory,
    scope: ScopeId,
    exit: FlowNodeId,
    frames: Vec<JumpFrame>,
    handlers: Vec<FlowNodeId>,
    pending_labels: Vec<String>,
}

/// The statement a chain of labels finally names.
fn unlabeled(mut node: &Node) -> &Node {
    while let NodeKind::LabeledStatement { body, .. } = &node.kind {
        node = body;
    }
    node
}

fn is_loop(node: &Node) -> bool {
    matches!(
        unlabeled(node).kind,
        NodeKind::WhileStatement { .. }
            | NodeKind::DoWhileStatement { .. }
            | NodeKind::ForStatement { .. }
            | NodeKind::ForInStatement { .. }
            | NodeKind::ForOfStatement { .. }
    )
}

impl<'f> CfgBuilder<'f> {
    pub(super) fn new(factory: &'f mut FlowNodeFactory, scope: ScopeId, exit: FlowNodeId) -> Self {
        Self {
            factory,
            scope,
            exit,
            frames: Vec::new(),
            handlers: Vec::new(),
            pending_labels: Vec::new(),
        }
    }

    /// Allocates a node. Inside a `try` region it may throw to the handler.
    fn node(&mut self, kind: FlowKind, ast: Option<&Node>) -> FlowNodeId {
        let id = self.factory.create(kind, ast, Some(self.scope));
        if let Some(&handler) = self.handlers.last() {
            self.factory.connect(id, handler, EdgeKind::Exception);
        }
        id
    }

    pub(super) fn link(&mut self, from: Dangling, to: FlowNodeId) {
        for (node, kind) in from {
            self.factory.connect(node, to, kind);
        }
    }

    pub(super) fn chain(&mut self, incoming: Dangling, kind: FlowKind, ast: &Node) -> FlowNodeId {
        let id = self.node(kind, Some(ast));
        self.link(incoming, id);
        id
    }

    fn exception_target(&self) -> FlowNodeId {
        self.handlers.last().copied().unwrap_or(self.exit)
    }

    pub(super) fn stmts(&mut self, stmts: &[Node], incoming: Dangling) -> Dangling {
        stmts
            .iter()
            .fold(incoming, |incoming, stmt| self.stmt(stmt, incoming))
    }

    pub(super) fn stmt(&mut self, stmt: &Node, incoming: Dangling) -> Dangling {
        match &stmt.kind {
            // Hoisted: the function gets its own CFG.
            NodeKind::FunctionDeclaration(_) => incoming,
            NodeKind::ExportNamedDeclaration {
                declaration: Some(declaration),
                ..
            } if declaration.is_function() => incoming,
            NodeKind::ExportDefaultDeclaration { declaration }
                if matches!(declaration.kind, NodeKind::FunctionDeclaration(_)) =>
            {
                incoming
            }
            NodeKind::BlockStatement { body } => self.stmts(body, incoming),
            NodeKind::IfStatement {
                consequent,
                alternate,
                ..
            } => {
                let branch = self.chain(incoming, FlowKind::Normal, stmt);
                let mut out = self.stmt(consequent, vec![(branch, EdgeKind::TrueBranch)]);
                match alternate {
                    Some(alternate) => {
                        out.extend(self.stmt(alternate, vec![(branch, EdgeKind::FalseBranch)]))
                    }
                    None => out.push((branch, EdgeKind::FalseBranch)),
                }
                out
            }
            NodeKind::WhileStatement { body, .. }
            | NodeKind::ForInStatement { body, .. }
            | NodeKind::ForOfStatement { body, .. } => self.loop_stmt(stmt, body, incoming),
            NodeKind::DoWhileStatement { body, .. } => self.do_while_stmt(stmt, body, incoming),
            NodeKind::ForStatement {
                init, update, body, ..
            } => self.for_stmt(stmt, init.as_deref(), update.as_deref(), body, incoming),
            NodeKind::LabeledStatement { label, body } => {
                let name = label.as_identifier().map(str::to_string);
                if is_loop(body) {
                    self.pending_labels.extend(name);
                    return self.stmt(body, incoming);
                }
                self.frames.push(JumpFrame {
                    kind: FrameKind::Label,
                    labels: name.into_iter().collect(),
                    continue_to: None,
                    break_to: None,
                    breaks: Vec::new(),
                });
                let mut out = self.stmt(body, incoming);
                if let Some(frame) = self.frames.pop() {
                    out.extend(frame.breaks);
                }
                out
            }
            NodeKind::BreakStatement { label } => {
                let node = self.chain(incoming, FlowKind::Normal, stmt);
                self.jump(node, label.as_deref().and_then(Node::as_identifier), false)
            }
            NodeKind::ContinueStatement { label } => {
                let node = self.chain(incoming, FlowKind::Normal, stmt);
                self.jump(node, label.as_deref().and_then(Node::as_identifier), true)
            }
            NodeKind::ReturnStatement { .. } => {
                let node = self.chain(incoming, FlowKind::Normal, stmt);
                self.factory.connect(node, self.exit, EdgeKind::Normal);
                Vec::new()
            }
            NodeKind::ThrowStatement { .. } => {
                let node = self.chain(incoming, FlowKind::Normal, stmt);
                let target = self.exception_target();
                self.factory.connect(node, target, EdgeKind::Exception);
                Vec::new()
            }
            NodeKind::SwitchStatement { cases, .. } => self.switch_stmt(stmt, cases, incoming),
            NodeKind::TryStatement {
                block,
                handler,
                finalizer,
            } => self.try_stmt(block, handler.as_deref(), finalizer.as_deref(), incoming),
            NodeKind::WithStatement { body, .. } => {
                let node = self.chain(incoming, FlowKind::Normal, stmt);
                self.stmt(body, vec![(node, EdgeKind::Normal)])
            }
            _ => {
                let node = self.chain(incoming, FlowKind::Normal, stmt);
                vec![(node, EdgeKind::Normal)]
            }
        }
    }

    fn jump(&mut self, node: FlowNodeId, label: Option<&str>, is_continue: bool) -> Dangling {
        let frame = self.frames.iter().rposition(|frame| {
            let kind_matches = if is_continue {
                frame.kind == FrameKind::Loop
            } else {
                label.is_some() || frame.kind != FrameKind::Label
            };
            kind_matches && label.is_none_or(|label| frame.labels.iter().any(|l| l == label))
        });

        let Some(index) = frame else {
            tracing::debug!(?label, is_continue, "jump without an enclosing target");
            return vec![(node, EdgeKind::Normal)];
        };

        let frame = &mut self.frames[index];
        let target = if is_continue {
            frame.continue_to
        } else {
            frame.break_to
        };
        match target {
            Some(target) => self.factory.connect(node, target, EdgeKind::Normal),
            None => frame.breaks.push((node, EdgeKind::Normal)),
        }
        Vec::new()
    }

    fn push_loop(&mut self, continue_to: FlowNodeId, break_to: FlowNodeId) {
        let labels = std::mem::take(&mut self.pending_labels);
        self.frames.push(JumpFrame {
            kind: FrameKind::Loop,
            labels,
            continue_to: Some(continue_to),
            break_to: Some(break_to),
            breaks: Vec::new(),
        });
    }

    fn loop_return(&mut self, stmt: &Node) -> FlowNodeId {
        let id = self.node(FlowKind::LoopReturn, None);
        self.factory
            .set_position(id, stmt.loc.end.line, stmt.loc.end.column);
        id
    }

    fn finish_loop(&mut self, head: FlowNodeId, exit: FlowNodeId) -> Dangling {
        self.frames.pop();
        self.factory.connect(head, exit, EdgeKind::FalseBranch);
        vec![(exit, EdgeKind::Normal)]
    }

    fn loop_stmt(&mut self, stmt: &Node, body: &Node, incoming: Dangling) -> Dangling {
        let head = self.chain(incoming, FlowKind::Loop, stmt);
        let exit = self.loop_return(stmt);
        self.push_loop(head, exit);
        let body_out = self.stmt(body, vec![(head, EdgeKind::TrueBranch)]);
        self.link(body_out, head);
        self.finish_loop(head, exit)
    }

    fn do_while_stmt(&mut self, stmt: &Node, body: &Node, incoming: Dangling) -> Dangling {
        let head = self.node(FlowKind::Loop, Some(stmt));
        let exit = self.loop_return(stmt);
        self.push_loop(head, exit);
        // The back edge and the initial entry both lead to the first body node.
        let mut entry = incoming;
        entry.push((head, EdgeKind::TrueBranch));
        let body_out = self.stmt(body, entry);
        self.link(body_out, head);
        self.finish_loop(head, exit)
    }

    fn for_stmt(
        &mut self,
        stmt: &Node,
        init: Option<&Node>,
        update: Option<&Node>,
        body: &Node,
        incoming: Dangling,
    ) -> Dangling {
        let incoming = match init {
            Some(init) => vec![(self.chain(incoming, FlowKind::Normal, init), EdgeKind::Normal)],
            None => incoming,
        };
        let head = self.chain(incoming, FlowKind::Loop, stmt);
        let exit = self.loop_return(stmt);
        let update = update.map(|update| self.node(FlowKind::Normal, Some(update)));
        self.push_loop(update.unwrap_or(head), exit);

        let body_out = self.stmt(body, vec![(head, EdgeKind::TrueBranch)]);
        match update {
            Some(update) => {
                self.link(body_out, update);
                self.factory.connect(update, head, EdgeKind::Normal);
            }
            None => self.link(body_out, head),
        }
        self.finish_loop(head, exit)
    }

    fn switch_stmt(&mut self, stmt: &Node, cases: &[Node], incoming: Dangling) -> Dangling {
        let discriminant = self.chain(incoming, FlowKind::Normal, stmt);
        self.frames.push(JumpFrame {
            kind: FrameKind::Switch,
            labels: std::mem::take(&mut self.pending_labels),
            continue_to: None,
            break_to: None,
            breaks: Vec::new(),
        });

        let mut no_match: Dangling = vec![(discriminant, EdgeKind::Normal)];
        let mut fallthrough: Dangling = Vec::new();
        let mut default_case = None;

        for case in cases {
            let NodeKind::SwitchCase { test, consequent } = &case.kind else {
                continue;
            };
            let body_in = if test.is_some() {
                let test_node = self.chain(std::mem::take(&mut no_match), FlowKind::Normal, case);
                no_match = vec![(test_node, EdgeKind::FalseBranch)];
                let mut body_in = std::mem::take(&mut fallthrough);
                body_in.push((test_node, EdgeKind::TrueBranch));
                body_in
            } else {
                let default_node =
                    self.chain(std::mem::take(&mut fallthrough), FlowKind::Normal, case);
                default_case = Some(default_node);
                vec![(default_node, EdgeKind::Normal)]
            };
            fallthrough = self.stmts(consequent, body_in);
        }

        let mut out = fallthrough;
        match default_case {
            Some(default_node) => self.link(no_match, default_node),
            None => out.extend(no_match),
        }
        if let Some(frame) = self.frames.pop() {
            out.extend(frame.breaks);
        }
        out
    }

    fn try_stmt(
        &mut self,
        block: &Node,
        handler: Option<&Node>,
        finalizer: Option<&Node>,
        incoming: Dangling,
    ) -> Dangling {
        let catch_node = handler.map(|handler| self.node(FlowKind::Normal, Some(handler)));
        let finally_node = finalizer.map(|finalizer| self.node(FlowKind::Normal, Some(finalizer)));

        let target = catch_node.or(finally_node);
        if let Some(target) = target {
            self.handlers.push(target);
        }
        let mut out = self.stmt(block, incoming);
        if target.is_some() {
            self.handlers.pop();
        }

        if let (Some(handler), Some(catch_node)) = (handler, catch_node) {
            if let Some(finally_node) = finally_node {
                self.handlers.push(finally_node);
            }
            let catch_out = match &handler.kind {
                NodeKind::CatchClause { body, .. } => {
                    self.stmt(body, vec![(catch_node, EdgeKind::Normal)])
                }
                _ => vec![(catch_node, EdgeKind::Normal)],
            };
            if finally_node.is_some() {
                self.handlers.pop();
            }
            out.extend(catch_out);
        }

        let (Some(finalizer), Some(finally_node)) = (finalizer, finally_node) else {
            return out;
        };
        self.link(out, finally_node);
        let finally_out = self.stmt(finalizer, vec![(finally_node, EdgeKind::Normal)]);
        if handler.is_none() {
            // The pending exception is rethrown once the finally block completes.
            let outer = self.exception_target();
            for &(node, _) in &finally_out {
                self.factory.connect(node, outer, EdgeKind::Exception);
            }
        }
        finally_out
    }
}

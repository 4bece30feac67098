//! ESTree-shaped syntax tree
//!
//! Every node carries the `_id` extension used as the join key between the
//! AST, the control-flow graphs and the exported program graph. Trees are
//! produced either by the swc frontend in [`crate::parser`] or deserialized
//! from ESTree JSON emitted by an external parser.

mod ids;
mod index;
mod walk;

pub use ids::{AstId, IdGenerator};
pub use index::{AstIndex, DuplicateAstId};
pub use walk::Child;

use serde::{Deserialize, Serialize};

/// Half-open byte interval `[start, end)` into the source text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range(pub u32, pub u32);

impl Range {
    pub fn start(&self) -> u32 {
        self.0
    }

    pub fn end(&self) -> u32 {
        self.1
    }

    pub fn contains(&self, other: &Range) -> bool {
        self.0 <= other.0 && other.1 <= self.1
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub start: Position,
    pub end: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(rename = "_id")]
    pub id: AstId,
    #[serde(default)]
    pub range: Range,
    #[serde(default)]
    pub loc: SourceLocation,
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl Node {
    pub fn from_json(json: &str) -> Result<Node, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    pub fn as_identifier(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Identifier { name } => Some(name),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match &self.kind {
            NodeKind::FunctionDeclaration(f)
            | NodeKind::FunctionExpression(f)
            | NodeKind::ArrowFunctionExpression(f) => Some(f),
            _ => None,
        }
    }

    pub fn is_function(&self) -> bool {
        self.as_function().is_some()
    }

    /// String value of a string literal.
    pub fn as_string_literal(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Literal {
                value: serde_json::Value::String(s),
                ..
            } => Some(s),
            _ => None,
        }
    }

    /// Name of a non-computed property key (`a` in `o.a` or `{ a: 1 }`).
    pub fn property_name(&self) -> Option<&str> {
        self.as_identifier().or_else(|| self.as_string_literal())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    #[default]
    Script,
    Module,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclarationKind {
    Var,
    Let,
    Const,
}

impl DeclarationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclarationKind::Var => "var",
            DeclarationKind::Let => "let",
            DeclarationKind::Const => "const",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    #[default]
    Init,
    Get,
    Set,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodKind {
    Constructor,
    Method,
    Get,
    Set,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegexLiteral {
    pub pattern: String,
    pub flags: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateValue {
    pub raw: String,
    #[serde(default)]
    pub cooked: Option<String>,
}

/// Shared shape of function declarations, function expressions and arrows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Function {
    #[serde(default)]
    pub id: Option<Box<Node>>,
    #[serde(default)]
    pub params: Vec<Node>,
    /// A `BlockStatement`, or an expression for concise arrow bodies.
    pub body: Box<Node>,
    #[serde(default)]
    pub generator: bool,
    #[serde(default, rename = "async")]
    pub is_async: bool,
    #[serde(default)]
    pub expression: bool,
}

impl Function {
    pub fn name(&self) -> Option<&str> {
        self.id.as_deref().and_then(Node::as_identifier)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    #[serde(default)]
    pub id: Option<Box<Node>>,
    #[serde(default)]
    pub super_class: Option<Box<Node>>,
    pub body: Box<Node>,
}

impl Class {
    pub fn name(&self) -> Option<&str> {
        self.id.as_deref().and_then(Node::as_identifier)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum NodeKind {
    Program {
        body: Vec<Node>,
        #[serde(default)]
        source_type: SourceType,
    },

    // Statements
    ExpressionStatement {
        expression: Box<Node>,
    },
    BlockStatement {
        body: Vec<Node>,
    },
    EmptyStatement,
    DebuggerStatement,
    WithStatement {
        object: Box<Node>,
        body: Box<Node>,
    },
    ReturnStatement {
        #[serde(default)]
        argument: Option<Box<Node>>,
    },
    LabeledStatement {
        label: Box<Node>,
        body: Box<Node>,
    },
    BreakStatement {
        #[serde(default)]
        label: Option<Box<Node>>,
    },
    ContinueStatement {
        #[serde(default)]
        label: Option<Box<Node>>,
    },
    IfStatement {
        test: Box<Node>,
        consequent: Box<Node>,
        #[serde(default)]
        alternate: Option<Box<Node>>,
    },
    SwitchStatement {
        discriminant: Box<Node>,
        cases: Vec<Node>,
    },
    SwitchCase {
        #[serde(default)]
        test: Option<Box<Node>>,
        consequent: Vec<Node>,
    },
    ThrowStatement {
        argument: Box<Node>,
    },
    TryStatement {
        block: Box<Node>,
        #[serde(default)]
        handler: Option<Box<Node>>,
        #[serde(default)]
        finalizer: Option<Box<Node>>,
    },
    CatchClause {
        #[serde(default)]
        param: Option<Box<Node>>,
        body: Box<Node>,
    },
    WhileStatement {
        test: Box<Node>,
        body: Box<Node>,
    },
    DoWhileStatement {
        body: Box<Node>,
        test: Box<Node>,
    },
    ForStatement {
        #[serde(default)]
        init: Option<Box<Node>>,
        #[serde(default)]
        test: Option<Box<Node>>,
        #[serde(default)]
        update: Option<Box<Node>>,
        body: Box<Node>,
    },
    ForInStatement {
        left: Box<Node>,
        right: Box<Node>,
        body: Box<Node>,
    },
    ForOfStatement {
        left: Box<Node>,
        right: Box<Node>,
        body: Box<Node>,
        #[serde(default, rename = "await")]
        is_await: bool,
    },

    // Declarations
    FunctionDeclaration(Function),
    VariableDeclaration {
        declarations: Vec<Node>,
        kind: DeclarationKind,
    },
    VariableDeclarator {
        id: Box<Node>,
        #[serde(default)]
        init: Option<Box<Node>>,
    },
    ClassDeclaration(Class),
    ImportDeclaration {
        #[serde(default)]
        specifiers: Vec<Node>,
        source: Box<Node>,
    },
    ImportSpecifier {
        local: Box<Node>,
        imported: Box<Node>,
    },
    ImportDefaultSpecifier {
        local: Box<Node>,
    },
    ImportNamespaceSpecifier {
        local: Box<Node>,
    },
    ExportNamedDeclaration {
        #[serde(default)]
        declaration: Option<Box<Node>>,
        #[serde(default)]
        specifiers: Vec<Node>,
        #[serde(default)]
        source: Option<Box<Node>>,
    },
    ExportSpecifier {
        local: Box<Node>,
        exported: Box<Node>,
    },
    ExportDefaultDeclaration {
        declaration: Box<Node>,
    },
    ExportAllDeclaration {
        source: Box<Node>,
        #[serde(default)]
        exported: Option<Box<Node>>,
    },

    // Expressions
    Identifier {
        name: String,
    },
    Literal {
        #[serde(default)]
        value: serde_json::Value,
        #[serde(default)]
        raw: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        regex: Option<RegexLiteral>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bigint: Option<String>,
    },
    ThisExpression,
    Super,
    ArrayExpression {
        elements: Vec<Option<Node>>,
    },
    ObjectExpression {
        properties: Vec<Node>,
    },
    Property {
        key: Box<Node>,
        value: Box<Node>,
        #[serde(default)]
        kind: PropertyKind,
        #[serde(default)]
        computed: bool,
        #[serde(default)]
        method: bool,
        #[serde(default)]
        shorthand: bool,
    },
    FunctionExpression(Function),
    ArrowFunctionExpression(Function),
    ClassExpression(Class),
    ClassBody {
        body: Vec<Node>,
    },
    MethodDefinition {
        key: Box<Node>,
        value: Box<Node>,
        kind: MethodKind,
        #[serde(default)]
        computed: bool,
        #[serde(default, rename = "static")]
        is_static: bool,
    },
    PropertyDefinition {
        key: Box<Node>,
        #[serde(default)]
        value: Option<Box<Node>>,
        #[serde(default)]
        computed: bool,
        #[serde(default, rename = "static")]
        is_static: bool,
    },
    UnaryExpression {
        operator: String,
        argument: Box<Node>,
        #[serde(default)]
        prefix: bool,
    },
    UpdateExpression {
        operator: String,
        argument: Box<Node>,
        #[serde(default)]
        prefix: bool,
    },
    BinaryExpression {
        operator: String,
        left: Box<Node>,
        right: Box<Node>,
    },
    LogicalExpression {
        operator: String,
        left: Box<Node>,
        right: Box<Node>,
    },
    AssignmentExpression {
        operator: String,
        left: Box<Node>,
        right: Box<Node>,
    },
    MemberExpression {
        object: Box<Node>,
        property: Box<Node>,
        #[serde(default)]
        computed: bool,
        #[serde(default)]
        optional: bool,
    },
    ConditionalExpression {
        test: Box<Node>,
        consequent: Box<Node>,
        alternate: Box<Node>,
    },
    CallExpression {
        callee: Box<Node>,
        #[serde(default)]
        arguments: Vec<Node>,
        #[serde(default)]
        optional: bool,
    },
    NewExpression {
        callee: Box<Node>,
        #[serde(default)]
        arguments: Vec<Node>,
    },
    SequenceExpression {
        expressions: Vec<Node>,
    },
    TemplateLiteral {
        quasis: Vec<Node>,
        expressions: Vec<Node>,
    },
    TemplateElement {
        value: TemplateValue,
        #[serde(default)]
        tail: bool,
    },
    TaggedTemplateExpression {
        tag: Box<Node>,
        quasi: Box<Node>,
    },
    SpreadElement {
        argument: Box<Node>,
    },
    YieldExpression {
        #[serde(default)]
        argument: Option<Box<Node>>,
        #[serde(default)]
        delegate: bool,
    },
    AwaitExpression {
        argument: Box<Node>,
    },
    ChainExpression {
        expression: Box<Node>,
    },
    MetaProperty {
        meta: Box<Node>,
        property: Box<Node>,
    },

    // Patterns
    ObjectPattern {
        properties: Vec<Node>,
    },
    ArrayPattern {
        elements: Vec<Option<Node>>,
    },
    RestElement {
        argument: Box<Node>,
    },
    AssignmentPattern {
        left: Box<Node>,
        right: Box<Node>,
    },

    /// Any node type this model does not know. Treated as an opaque leaf.
    #[serde(other)]
    Unsupported,
}

impl NodeKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Program { .. } => "Program",
            NodeKind::ExpressionStatement { .. } => "ExpressionStatement",
            NodeKind::BlockStatement { .. } => "BlockStatement",
            NodeKind::EmptyStatement => "EmptyStatement",
            NodeKind::DebuggerStatement => "DebuggerStatement",
            NodeKind::WithStatement { .. } => "WithStatement",
            NodeKind::ReturnStatement { .. } => "ReturnStatement",
            NodeKind::LabeledStatement { .. } => "LabeledStatement",
            NodeKind::BreakStatement { .. } => "BreakStatement",
            NodeKind::ContinueStatement { .. } => "ContinueStatement",
            NodeKind::IfStatement { .. } => "IfStatement",
            NodeKind::SwitchStatement { .. } => "SwitchStatement",
            NodeKind::SwitchCase { .. } => "SwitchCase",
            NodeKind::ThrowStatement { .. } => "ThrowStatement",
            NodeKind::TryStatement { .. } => "TryStatement",
            NodeKind::CatchClause { .. } => "CatchClause",
            NodeKind::WhileStatement { .. } => "WhileStatement",
            NodeKind::DoWhileStatement { .. } => "DoWhileStatement",
            NodeKind::ForStatement { .. } => "ForStatement",
            NodeKind::ForInStatement { .. } => "ForInStatement",
            NodeKind::ForOfStatement { .. } => "ForOfStatement",
            NodeKind::FunctionDeclaration(_) => "FunctionDeclaration",
            NodeKind::VariableDeclaration { .. } => "VariableDeclaration",
            NodeKind::VariableDeclarator { .. } => "VariableDeclarator",
            NodeKind::ClassDeclaration(_) => "ClassDeclaration",
            NodeKind::ImportDeclaration { .. } => "ImportDeclaration",
            NodeKind::ImportSpecifier { .. } => "ImportSpecifier",
            NodeKind::ImportDefaultSpecifier { .. } => "ImportDefaultSpecifier",
            NodeKind::ImportNamespaceSpecifier { .. } => "ImportNamespaceSpecifier",
            NodeKind::ExportNamedDeclaration { .. } => "ExportNamedDeclaration",
            NodeKind::ExportSpecifier { .. } => "ExportSpecifier",
            NodeKind::ExportDefaultDeclaration { .. } => "ExportDefaultDeclaration",
            NodeKind::ExportAllDeclaration { .. } => "ExportAllDeclaration",
            NodeKind::Identifier { .. } => "Identifier",
            NodeKind::Literal { .. } => "Literal",
            NodeKind::ThisExpression => "ThisExpression",
            NodeKind::Super => "Super",
            NodeKind::ArrayExpression { .. } => "ArrayExpression",
            NodeKind::ObjectExpression { .. } => "ObjectExpression",
            NodeKind::Property { .. } => "Property",
            NodeKind::FunctionExpression(_) => "FunctionExpression",
            NodeKind::ArrowFunctionExpression(_) => "ArrowFunctionExpression",
            NodeKind::ClassExpression(_) => "ClassExpression",
            NodeKind::ClassBody { .. } => "ClassBody",
            NodeKind::MethodDefinition { .. } => "MethodDefinition",
            NodeKind::PropertyDefinition { .. } => "PropertyDefinition",
            NodeKind::UnaryExpression { .. } => "UnaryExpression",
            NodeKind::UpdateExpression { .. } => "UpdateExpression",
            NodeKind::BinaryExpression { .. } => "BinaryExpression",
            NodeKind::LogicalExpression { .. } => "LogicalExpression",
            NodeKind::AssignmentExpression { .. } => "AssignmentExpression",
            NodeKind::MemberExpression { .. } => "MemberExpression",
            NodeKind::ConditionalExpression { .. } => "ConditionalExpression",
            NodeKind::CallExpression { .. } => "CallExpression",
            NodeKind::NewExpression { .. } => "NewExpression",
            NodeKind::SequenceExpression { .. } => "SequenceExpression",
            NodeKind::TemplateLiteral { .. } => "TemplateLiteral",
            NodeKind::TemplateElement { .. } => "TemplateElement",
            NodeKind::TaggedTemplateExpression { .. } => "TaggedTemplateExpression",
            NodeKind::SpreadElement { .. } => "SpreadElement",
            NodeKind::YieldExpression { .. } => "YieldExpression",
            NodeKind::AwaitExpression { .. } => "AwaitExpression",
            NodeKind::ChainExpression { .. } => "ChainExpression",
            NodeKind::MetaProperty { .. } => "MetaProperty",
            NodeKind::ObjectPattern { .. } => "ObjectPattern",
            NodeKind::ArrayPattern { .. } => "ArrayPattern",
            NodeKind::RestElement { .. } => "RestElement",
            NodeKind::AssignmentPattern { .. } => "AssignmentPattern",
            NodeKind::Unsupported => "Unsupported",
        }
    }
}

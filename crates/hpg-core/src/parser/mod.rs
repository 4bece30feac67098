//! Parser frontend for JavaScript/TypeScript source code
//!
//! Parses with SWC and lowers the result into the ESTree model of
//! [`crate::ast`], assigning every node an id from the shared generator.

mod lower;

use swc_common::sync::Lrc;
use swc_common::{FileName, SourceMap, Spanned};
use swc_ecma_ast::{EsVersion, Program};
use swc_ecma_parser::{EsSyntax, Syntax, TsSyntax, parse_file_as_program};

use crate::ast::{IdGenerator, Node};

use lower::Lowerer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    JavaScript,
    TypeScript,
    Jsx,
    Tsx,
}

pub fn detect_language(filename: &str) -> Language {
    let ext = filename.rsplit('.').next().unwrap_or("").to_lowercase();

    match ext.as_str() {
        "ts" | "mts" | "cts" => Language::TypeScript,
        "tsx" => Language::Tsx,
        "jsx" => Language::Jsx,
        _ => Language::JavaScript,
    }
}

/// File extensions the frontend understands.
pub const SOURCE_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "jsx", "ts", "mts", "cts", "tsx"];

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message} at {line}:{column}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub span_lo: u32,
    pub span_hi: u32,
    pub message: String,
}

#[derive(Debug)]
pub struct ParseResult {
    pub program: Option<Program>,
    pub errors: Vec<ParseError>,
}

impl ParseResult {
    pub fn is_ok(&self) -> bool {
        self.program.is_some()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub filename: String,
    pub language: Language,
    pub line_count: usize,
    pub has_errors: bool,
}

/// A source file lowered into the analysis AST.
///
/// `program` is `None` when the parser could not recover; callers treat
/// that as "no model" for this file and move on.
#[derive(Debug)]
pub struct ParsedFile {
    metadata: FileMetadata,
    program: Option<Node>,
    errors: Vec<ParseError>,
}

impl ParsedFile {
    pub fn from_source(filename: &str, source: &str, ids: &IdGenerator) -> Self {
        let language = detect_language(filename);
        let parser = Parser::for_file(filename);
        let source_map: Lrc<SourceMap> = Default::default();
        let fm = source_map.new_source_file(
            FileName::Custom(filename.to_string()).into(),
            source.to_string(),
        );

        let result = parser.parse_source_file(&source_map, &fm);
        let program = result.program.as_ref().map(|program| {
            Lowerer::new(ids, &source_map, fm.start_pos.0).program(program)
        });

        let line_count = if source.is_empty() {
            0
        } else {
            source.lines().count()
        };

        let metadata = FileMetadata {
            filename: filename.to_string(),
            language,
            line_count,
            has_errors: result.has_errors(),
        };

        Self {
            metadata,
            program,
            errors: result.errors,
        }
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    pub fn program(&self) -> Option<&Node> {
        self.program.as_ref()
    }

    pub fn into_program(self) -> Option<Node> {
        self.program
    }

    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParserBuilder {
    jsx: bool,
    typescript: bool,
    decorators: bool,
}

impl ParserBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jsx(mut self, enabled: bool) -> Self {
        self.jsx = enabled;
        self
    }

    pub fn typescript(mut self, enabled: bool) -> Self {
        self.typescript = enabled;
        self
    }

    pub fn decorators(mut self, enabled: bool) -> Self {
        self.decorators = enabled;
        self
    }

    pub fn build(self) -> Parser {
        let syntax = if self.typescript {
            Syntax::Typescript(TsSyntax {
                tsx: self.jsx,
                decorators: self.decorators,
                ..Default::default()
            })
        } else {
            Syntax::Es(EsSyntax {
                jsx: self.jsx,
                decorators: self.decorators,
                ..Default::default()
            })
        };

        Parser { syntax }
    }
}

#[derive(Debug, Clone)]
pub struct Parser {
    syntax: Syntax,
}

impl Parser {
    pub fn new() -> Self {
        Self {
            syntax: Syntax::Es(Default::default()),
        }
    }

    pub fn for_file(filename: &str) -> Self {
        match detect_language(filename) {
            Language::JavaScript => Self::new(),
            Language::TypeScript => Self::builder().typescript(true).build(),
            Language::Jsx => Self::builder().jsx(true).build(),
            Language::Tsx => Self::builder().typescript(true).jsx(true).build(),
        }
    }

    pub fn builder() -> ParserBuilder {
        ParserBuilder::new()
    }

    /// Parses a script or module, keeping recovered errors alongside the tree.
    pub fn parse_program_recovering(&self, code: &str) -> ParseResult {
        let source_map: Lrc<SourceMap> = Default::default();
        let fm = source_map
            .new_source_file(FileName::Custom("input.js".into()).into(), code.to_string());
        self.parse_source_file(&source_map, &fm)
    }

    fn parse_source_file(
        &self,
        source_map: &SourceMap,
        fm: &swc_common::SourceFile,
    ) -> ParseResult {
        let mut recovered_errors = Vec::new();

        let result = parse_file_as_program(
            fm,
            self.syntax,
            EsVersion::latest(),
            None,
            &mut recovered_errors,
        );

        let mut errors: Vec<ParseError> = recovered_errors
            .into_iter()
            .map(|e| {
                let span = e.span();
                let loc = source_map.lookup_char_pos(span.lo);
                ParseError {
                    line: loc.line,
                    column: loc.col_display,
                    span_lo: span.lo.0,
                    span_hi: span.hi.0,
                    message: e.kind().msg().to_string(),
                }
            })
            .collect();

        match result {
            Ok(program) => ParseResult {
                program: Some(program),
                errors,
            },
            Err(e) => {
                let span = e.span();
                let loc = source_map.lookup_char_pos(span.lo);
                errors.push(ParseError {
                    line: loc.line,
                    column: loc.col_display,
                    span_lo: span.lo.0,
                    span_hi: span.hi.0,
                    message: e.kind().msg().to_string(),
                });
                ParseResult {
                    program: None,
                    errors,
                }
            }
        }
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AstIndex, NodeKind, SourceType};

    fn lower(code: &str) -> Node {
        let ids = IdGenerator::new();
        ParsedFile::from_source("input.js", code, &ids)
            .into_program()
            .expect("program should parse")
    }

    fn body(program: &Node) -> &[Node] {
        match &program.kind {
            NodeKind::Program { body, .. } => body,
            other => panic!("expected Program, got {}", other.type_name()),
        }
    }

    #[test]
    fn detects_language_from_extension() {
        assert_eq!(detect_language("a.js"), Language::JavaScript);
        assert_eq!(detect_language("a.ts"), Language::TypeScript);
        assert_eq!(detect_language("a.tsx"), Language::Tsx);
        assert_eq!(detect_language("a.jsx"), Language::Jsx);
        assert_eq!(detect_language("noext"), Language::JavaScript);
    }

    #[test]
    fn lowers_variable_declaration() {
        let program = lower("var x = 1;");
        let stmts = body(&program);

        assert_eq!(stmts.len(), 1);
        let NodeKind::VariableDeclaration { declarations, .. } = &stmts[0].kind else {
            panic!("expected VariableDeclaration");
        };
        let NodeKind::VariableDeclarator { id, init } = &declarations[0].kind else {
            panic!("expected VariableDeclarator");
        };
        assert_eq!(id.as_identifier(), Some("x"));
        assert_eq!(init.as_ref().map(|n| n.type_name()), Some("Literal"));
    }

    #[test]
    fn ranges_are_file_relative_and_locations_one_based() {
        let program = lower("let a;\nfoo(a);");
        let stmts = body(&program);

        assert_eq!(stmts[0].range.start(), 0);
        assert_eq!(stmts[1].range.start(), 7);
        assert_eq!(stmts[1].loc.start.line, 2);
        assert_eq!(stmts[1].loc.start.column, 0);
    }

    #[test]
    fn ids_are_unique_and_pre_ordered() {
        let program = lower("function f(a) { return a + 1; } f(2);");
        let mut index = AstIndex::new();
        index.insert_root(&program).unwrap();

        let mut seen = Vec::new();
        program.walk(&mut |node| seen.push(node.id.0));
        let mut sorted = seen.clone();
        sorted.sort_unstable();
        assert_eq!(seen, sorted);
        assert_eq!(program.id.0, 1);
    }

    #[test]
    fn parentheses_and_type_assertions_disappear() {
        let ids = IdGenerator::new();
        let program = ParsedFile::from_source("a.ts", "const n = (x as number);", &ids)
            .into_program()
            .unwrap();
        let NodeKind::VariableDeclaration { declarations, .. } = &body(&program)[0].kind else {
            panic!("expected VariableDeclaration");
        };
        let NodeKind::VariableDeclarator { init, .. } = &declarations[0].kind else {
            panic!("expected VariableDeclarator");
        };

        assert_eq!(init.as_deref().and_then(Node::as_identifier), Some("x"));
    }

    #[test]
    fn modules_keep_import_bindings() {
        let program = lower("import { a as b } from 'mod'; b();");
        let NodeKind::Program { source_type, body } = &program.kind else {
            unreachable!()
        };

        assert_eq!(*source_type, SourceType::Module);
        let NodeKind::ImportDeclaration { specifiers, source } = &body[0].kind else {
            panic!("expected ImportDeclaration");
        };
        assert_eq!(source.as_string_literal(), Some("mod"));
        let NodeKind::ImportSpecifier { local, imported } = &specifiers[0].kind else {
            panic!("expected ImportSpecifier");
        };
        assert_eq!(local.as_identifier(), Some("b"));
        assert_eq!(imported.as_identifier(), Some("a"));
    }

    #[test]
    fn logical_operators_become_logical_expressions() {
        let program = lower("a && b; a + b;");
        let stmts = body(&program);
        let types: Vec<_> = stmts
            .iter()
            .map(|stmt| match &stmt.kind {
                NodeKind::ExpressionStatement { expression } => expression.type_name(),
                _ => "?",
            })
            .collect();

        assert_eq!(types, vec!["LogicalExpression", "BinaryExpression"]);
    }

    #[test]
    fn invalid_syntax_yields_no_program() {
        let ids = IdGenerator::new();
        let file = ParsedFile::from_source("bad.js", "function (", &ids);

        assert!(file.program().is_none());
        assert!(!file.errors().is_empty());
        assert_eq!(file.errors()[0].line, 1);
        assert!(file.metadata().has_errors);
    }

    #[test]
    fn generator_is_shared_across_files() {
        let ids = IdGenerator::new();
        let first = ParsedFile::from_source("a.js", "x;", &ids).into_program().unwrap();
        let second = ParsedFile::from_source("b.js", "y;", &ids).into_program().unwrap();

        let mut index = AstIndex::new();
        index.insert_root(&first).unwrap();
        assert!(index.insert_root(&second).is_ok());
    }
}

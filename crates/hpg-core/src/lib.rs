//! Hybrid program graphs for JavaScript
//!
//! Builds the scope tree, per-scope control-flow graphs, reaching
//! definitions and def-use pairs of a program, links them across calls,
//! event handlers and local storage, and exports the result as one
//! property graph. [`model::analyze_source`] is the one-call entry point;
//! [`model::HpgBuilder`] exposes the individual phases.

pub mod ast;
pub mod cfg;
pub mod config;
pub mod dataflow;
pub mod defuse;
pub mod flow;
pub mod graph;
pub mod interproc;
pub mod model;
pub mod parser;
pub mod scope;

pub use config::{Config, ConfigError};
pub use graph::{Graph, GraphEdge, GraphNode, RelationLabel};
pub use model::{Hpg, HpgBuilder, ModelError, analyze_json, analyze_source, analyze_sources};
pub use parser::ParsedFile;

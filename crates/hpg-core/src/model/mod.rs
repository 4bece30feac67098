//! Graph construction pipeline
//!
//! [`HpgBuilder`] runs the four phases over one domain: scope analysis per
//! page, per-scope CFGs with intra-procedural def-use, inter-procedural
//! linking, and graph materialization. Each phase runs once and in order.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::ast::{AstIndex, DuplicateAstId, IdGenerator, Node, NodeKind};
use crate::cfg::{Cfg, GraphInvariantError, build_cfg};
use crate::config::Config;
use crate::defuse::{Budget, analyze_cfg, annotate_cfg, solve_reaching_definitions};
use crate::flow::{FlowNodeFactory, FlowNodeId};
use crate::graph::{Graph, GraphInput, GraphSummary, build_graph};
use crate::interproc::{Linked, link_calls, link_program};
use crate::parser::ParsedFile;
use crate::scope::{ScopeId, ScopeTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Empty,
    Initialized,
    IntraProcedural,
    InterProcedural,
    Finished,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Empty => "empty",
            Phase::Initialized => "initialized",
            Phase::IntraProcedural => "intra-procedural",
            Phase::InterProcedural => "inter-procedural",
            Phase::Finished => "finished",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("{operation} called out of order: model is {phase}")]
    OutOfOrder {
        operation: &'static str,
        phase: Phase,
    },
    #[error(transparent)]
    DuplicateAstId(#[from] DuplicateAstId),
    #[error("Invalid ESTree JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("graph invariant violated: {0}")]
    Invariant(#[from] GraphInvariantError),
    #[error("expected a Program node, found {0}")]
    NotAProgram(&'static str),
}

/// The finished graph of one domain.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Hpg {
    pub graph: Graph,
    /// Set when def-use construction ran out of time; PDG edges are then
    /// incomplete.
    pub pdg_timeout: bool,
}

impl Hpg {
    pub fn summary(&self) -> GraphSummary {
        self.graph.summary()
    }
}

pub struct HpgBuilder<'a> {
    config: Config,
    ids: Arc<IdGenerator>,
    factory: FlowNodeFactory,
    scopes: ScopeTree,
    index: AstIndex<'a>,
    cfgs: Vec<Cfg>,
    linked: Linked,
    budget: Option<Budget>,
    phase: Phase,
}

impl<'a> HpgBuilder<'a> {
    pub fn new(config: Config, ids: Arc<IdGenerator>) -> Self {
        Self {
            config,
            factory: FlowNodeFactory::new(Arc::clone(&ids)),
            ids,
            scopes: ScopeTree::new(),
            index: AstIndex::new(),
            cfgs: Vec::new(),
            linked: Linked::default(),
            budget: None,
            phase: Phase::Empty,
        }
    }

    fn expect_phase(&self, operation: &'static str, allowed: &[Phase]) -> Result<(), ModelError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(ModelError::OutOfOrder {
                operation,
                phase: self.phase,
            })
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn scopes(&self) -> &ScopeTree {
        &self.scopes
    }

    pub fn factory(&self) -> &FlowNodeFactory {
        &self.factory
    }

    pub fn cfgs(&self) -> &[Cfg] {
        &self.cfgs
    }

    pub fn linked(&self) -> &Linked {
        &self.linked
    }

    pub fn pdg_timeout(&self) -> bool {
        self.budget.as_ref().is_some_and(Budget::is_exhausted)
    }

    /// Adds `program` as a page of the domain. May be called once per page.
    pub fn initialize_model(&mut self, program: &'a Node) -> Result<ScopeId, ModelError> {
        self.expect_phase("initialize_model", &[Phase::Empty, Phase::Initialized])?;
        if !matches!(program.kind, NodeKind::Program { .. }) {
            return Err(ModelError::NotAProgram(program.type_name()));
        }
        self.index.insert_root(program)?;
        self.ids.observe(self.index.max_id());

        let page = self.scopes.add_page(program);
        tracing::debug!(page = %self.scopes.get(page).name, scopes = self.scopes.len(), "initialized page");
        self.phase = Phase::Initialized;
        Ok(page)
    }

    /// Builds one CFG per scope and solves reaching definitions inside each.
    ///
    /// The PDG budget is checked after every scope; once it runs out the
    /// remaining scopes keep their CFG but get no def-use information.
    pub fn build_intra_procedural_models(&mut self) -> Result<&[Cfg], ModelError> {
        self.expect_phase("build_intra_procedural_models", &[Phase::Initialized])?;
        let _span = tracing::debug_span!("intra_procedural").entered();

        let mut budget = Budget::from_millis(self.config.analysis.pdg_timeout_ms);
        let scope_ids: Vec<ScopeId> = self.scopes.scopes().map(|scope| scope.id).collect();
        for scope in scope_ids {
            let Some(cfg) = build_cfg(&mut self.factory, &self.scopes, &self.index, scope) else {
                continue;
            };
            cfg.check_invariants(&self.factory)?;
            if !budget.is_exhausted() {
                let iterations = analyze_cfg(&mut self.factory, &self.scopes, &self.index, &cfg);
                tracing::trace!(scope = %cfg.name, iterations, "solved scope");
                budget.check();
            }
            self.cfgs.push(cfg);
        }

        self.budget = Some(budget);
        self.phase = Phase::IntraProcedural;
        Ok(&self.cfgs)
    }

    /// Links call sites and page models, then re-solves reaching
    /// definitions over the merged graph.
    ///
    /// Call sites whose targets only become visible through the merged
    /// solution (methods of outer-scope objects, callbacks passed as
    /// arguments) are linked in further rounds until no new site resolves.
    pub fn build_inter_procedural_models(&mut self) -> Result<&Linked, ModelError> {
        self.expect_phase("build_inter_procedural_models", &[Phase::IntraProcedural])?;
        let _span = tracing::debug_span!("inter_procedural").entered();

        if self.config.analysis.interprocedural {
            // Scopes skipped by the budget still need GEN/KILL for the
            // CallReturn hand-over and for finding storage writes.
            for cfg in &self.cfgs {
                annotate_cfg(&mut self.factory, &self.scopes, &self.index, cfg);
            }
            self.linked = link_program(
                &mut self.factory,
                &self.scopes,
                &self.index,
                &mut self.cfgs,
                self.config.analysis.link_options(),
            );
            for cfg in &self.cfgs {
                cfg.check_invariants(&self.factory)?;
            }

            self.solve_merged();
        }

        self.phase = Phase::InterProcedural;
        Ok(&self.linked)
    }

    fn solve_merged(&mut self) {
        let mut rounds = 0;
        loop {
            if self.budget.as_ref().is_some_and(Budget::is_exhausted) {
                tracing::warn!(rounds, "PDG budget exhausted, skipping the merged dataflow run");
                return;
            }
            let mut seeds: Vec<FlowNodeId> = self.cfgs.iter().map(|cfg| cfg.entry).collect();
            seeds.extend(self.linked.extra_seeds());
            solve_reaching_definitions(&mut self.factory, &seeds);
            rounds += 1;
            if let Some(budget) = self.budget.as_mut() {
                budget.check();
            }

            let more = link_calls(&mut self.factory, &self.scopes, &self.index, &mut self.cfgs);
            if more.is_empty() {
                tracing::debug!(rounds, links = self.linked.links.len(), "merged dataflow solved");
                return;
            }
            self.linked.links.extend(more);
        }
    }

    pub fn get_graph(&mut self) -> Result<Hpg, ModelError> {
        self.expect_phase("get_graph", &[Phase::InterProcedural])?;
        let extra_nodes = self.linked.extra_seeds();
        let input = GraphInput {
            index: &self.index,
            factory: &self.factory,
            scopes: &self.scopes,
            cfgs: &self.cfgs,
            links: &self.linked.links,
            extra_nodes: &extra_nodes,
        };
        let graph = build_graph(&input, self.config.output.graph_options());
        self.phase = Phase::Finished;
        Ok(Hpg {
            graph,
            pdg_timeout: self.pdg_timeout(),
        })
    }

    /// Runs the three remaining phases.
    pub fn finish(mut self) -> Result<Hpg, ModelError> {
        self.build_intra_procedural_models()?;
        self.build_inter_procedural_models()?;
        self.get_graph()
    }
}

/// Parses and analyzes one source file as a single-page domain.
///
/// Returns `Ok(None)` when the file cannot be parsed.
pub fn analyze_source(name: &str, code: &str, config: &Config) -> Result<Option<Hpg>, ModelError> {
    analyze_sources(&[(name, code)], config)
}

/// Analyzes several files as pages of one domain. Files that fail to parse
/// are skipped; `Ok(None)` means none parsed.
pub fn analyze_sources(sources: &[(&str, &str)], config: &Config) -> Result<Option<Hpg>, ModelError> {
    let ids = Arc::new(IdGenerator::new());
    let parsed: Vec<ParsedFile> = sources
        .iter()
        .map(|(name, code)| ParsedFile::from_source(name, code, &ids))
        .collect();

    let mut builder = HpgBuilder::new(config.clone(), Arc::clone(&ids));
    let mut pages = 0;
    for file in &parsed {
        match file.program() {
            Some(program) => {
                builder.initialize_model(program)?;
                pages += 1;
            }
            None => {
                let reason = file.errors().first().map(|e| e.message.as_str()).unwrap_or("unknown error");
                tracing::warn!(file = %file.metadata().filename, reason, "skipping file that failed to parse");
            }
        }
    }
    if pages == 0 {
        return Ok(None);
    }
    builder.finish().map(Some)
}

/// Analyzes an ESTree program already carrying `_id`s.
pub fn analyze_json(json: &str, config: &Config) -> Result<Hpg, ModelError> {
    let program = Node::from_json(json)?;
    let mut builder = HpgBuilder::new(config.clone(), Arc::new(IdGenerator::new()));
    builder.initialize_model(&program)?;
    builder.finish()
}

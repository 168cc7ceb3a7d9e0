//! Case files: a program model together with the facts the host compiler
//! would provide for it, stored as JSON.
//!
//! ```json
//! {
//!   "program": { ... },
//!   "config": { "assume_no_aliasing": true },
//!   "liveness": [ { "loop_id": 0, "live_in": [3], "live_out": [] } ],
//!   "reaching_definitions": [ { "var_ref": 17, "definitions": [ { "Expr": 12 } ] } ],
//!   "dependence_graphs": [ { "loop_id": 0, "graph": { "nodes": [ ... ] } } ],
//!   "annotations": { "accessors": ["get"] }
//! }
//! ```

use crate::analysis::{
    AnalysisSession, DefSite, DependenceGraph, LiveSetTable, LoopParallelizer, LoopReport, PrecomputedGraphs,
    ReachingDefTable, ShapeAnnotations,
};
use crate::ir::{ExprId, LoopId, Program, VarId};
use crate::AnalysisConfig;
use anyhow::{Context, Result};
use log::debug;
use serde::{Serialize, Deserialize};
use std::fs;
use std::path::Path;

/// Live sets of one loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveSetEntry {
    pub loop_id: LoopId,
    #[serde(default)]
    pub live_in: Vec<VarId>,
    #[serde(default)]
    pub live_out: Vec<VarId>,
}

/// Definitions reaching one variable reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReachingDefEntry {
    pub var_ref: ExprId,
    pub definitions: Vec<DefSite>,
}

/// Raw dependence graph of one loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEntry {
    pub loop_id: LoopId,
    pub graph: DependenceGraph,
}

/// A complete analysis problem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisCase {
    pub program: Program,
    #[serde(default)]
    pub config: AnalysisConfig,
    #[serde(default)]
    pub liveness: Vec<LiveSetEntry>,
    #[serde(default)]
    pub reaching_definitions: Vec<ReachingDefEntry>,
    #[serde(default)]
    pub dependence_graphs: Vec<GraphEntry>,
    #[serde(default)]
    pub annotations: ShapeAnnotations,
}

impl AnalysisCase {
    /// A case with no facts yet.
    pub fn new(program: Program) -> Self {
        Self {
            program,
            config: AnalysisConfig::default(),
            liveness: Vec::new(),
            reaching_definitions: Vec::new(),
            dependence_graphs: Vec::new(),
            annotations: ShapeAnnotations::default(),
        }
    }

    /// Parse and validate a case.
    pub fn from_json(text: &str) -> Result<Self> {
        let case: AnalysisCase = serde_json::from_str(text).context("Malformed case file")?;
        case.validate()?;
        Ok(case)
    }

    /// Read a case file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read case file: {:?}", path))?;
        let case = Self::from_json(&text).with_context(|| format!("Invalid case file: {:?}", path))?;
        debug!(
            "loaded {} with {} loops and {} dependence graphs",
            case.program.name,
            case.program.loops.len(),
            case.dependence_graphs.len()
        );
        Ok(case)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize case")
    }

    /// Check every id of the case against the program.
    pub fn validate(&self) -> Result<()> {
        self.program.validate().context("Program model is inconsistent")?;
        let loops = self.program.loops.len();
        let vars = self.program.variables.len();
        let exprs = self.program.exprs.len();
        let stmts = self.program.stmts.len();

        for entry in &self.liveness {
            anyhow::ensure!(entry.loop_id.index() < loops, "live sets for unknown loop {}", entry.loop_id);
            for v in entry.live_in.iter().chain(&entry.live_out) {
                anyhow::ensure!(v.index() < vars, "live set of {} names unknown variable {}", entry.loop_id, v);
            }
        }
        for entry in &self.reaching_definitions {
            anyhow::ensure!(entry.var_ref.index() < exprs, "reaching definitions for unknown reference {}", entry.var_ref);
            for def in &entry.definitions {
                let known = match def {
                    DefSite::Expr(e) => e.index() < exprs,
                    DefSite::Decl(s) => s.index() < stmts,
                };
                anyhow::ensure!(known, "reaching definition {:?} of {} is not in the program", def, entry.var_ref);
            }
        }
        for entry in &self.dependence_graphs {
            anyhow::ensure!(entry.loop_id.index() < loops, "dependence graph for unknown loop {}", entry.loop_id);
            entry
                .graph
                .validate(&self.program)
                .with_context(|| format!("Dependence graph of {} is inconsistent", entry.loop_id))?;
        }
        Ok(())
    }

    /// An initialized session over the case's facts.
    pub fn session(&self) -> Result<AnalysisSession> {
        let mut live = LiveSetTable::new();
        for entry in &self.liveness {
            live.insert(entry.loop_id, entry.live_in.iter().copied(), entry.live_out.iter().copied());
        }
        let mut defs = ReachingDefTable::new();
        for entry in &self.reaching_definitions {
            defs.insert(entry.var_ref, entry.definitions.clone());
        }
        let mut session = AnalysisSession::new();
        session.initialize(Box::new(defs), Box::new(live))?;
        Ok(session)
    }

    pub fn graphs(&self) -> PrecomputedGraphs {
        let mut graphs = PrecomputedGraphs::new();
        for entry in &self.dependence_graphs {
            graphs.insert(entry.loop_id, entry.graph.clone());
        }
        graphs
    }

    /// Analyze one loop, or every loop when `loop_id` is `None`.
    pub fn run(&mut self, loop_id: Option<LoopId>) -> Result<Vec<LoopReport>> {
        let mut session = self.session()?;
        let graphs = self.graphs();
        let reports = {
            let parallelizer = LoopParallelizer::new(&session, &graphs, self.config.clone())
                .with_annotations(&self.annotations);
            match loop_id {
                Some(id) => vec![parallelizer.report_loop(&mut self.program, id)?],
                None => parallelizer.analyze_program(&mut self.program)?,
            }
        };
        session.release();
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ProgramBuilder, VarType};

    fn small_case() -> AnalysisCase {
        let mut b = ProgramBuilder::new("zero").file("zero.c");
        let root = b.root_scope();
        let a = b.param("a", VarType::array(VarType::Int, &[Some(16)]));
        let i = b.declare_var(root, "i", VarType::Int);
        let zero = b.int(0);
        let n = b.int(16);
        let lp = b.for_loop(root, i, zero, n);
        let a_ref = b.var(a);
        let i_ref = b.var(i);
        let elem = b.index(a_ref, i_ref);
        let zero = b.int(0);
        let store = b.assign(elem, zero);
        b.expr_stmt(lp.body_scope, store);

        let mut case = AnalysisCase::new(b.finish());
        let mut graph = DependenceGraph::new();
        let n = graph.node_for(elem);
        graph
            .add_edge(crate::analysis::DependenceEdge::new(n, n, crate::analysis::DependenceKind::OUTPUT).levels(1, 1))
            .unwrap();
        case.dependence_graphs.push(GraphEntry { loop_id: lp.id, graph });
        case
    }

    #[test]
    fn test_json_roundtrip_and_run() {
        let case = small_case();
        let text = case.to_json().unwrap();
        let mut loaded = AnalysisCase::from_json(&text).unwrap();
        assert_eq!(loaded.program.exprs.len(), case.program.exprs.len());

        let reports = loaded.run(None).unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].is_parallelizable());
    }

    #[test]
    fn test_rejects_dangling_definition() {
        let mut case = small_case();
        case.config = AnalysisConfig::default().indirect_index_uniqueness(true);
        let i_ref = case
            .program
            .exprs
            .iter()
            .find(|e| matches!(e.kind, crate::ir::ExprKind::VarRef(v) if case.program.variable(v).name == "i"))
            .map(|e| e.id)
            .unwrap();
        case.reaching_definitions.push(ReachingDefEntry {
            var_ref: i_ref,
            definitions: vec![DefSite::Expr(ExprId(9999))],
        });
        let text = case.to_json().unwrap();
        let err = AnalysisCase::from_json(&text).unwrap_err();
        assert!(err.to_string().contains("not in the program"));

        case.reaching_definitions[0].definitions = vec![DefSite::Decl(crate::ir::StmtId(512))];
        assert!(case.validate().is_err());
    }

    #[test]
    fn test_rejects_cyclic_program() {
        let mut case = small_case();
        let root = case.program.root;
        case.program.stmts[root.index()].parent = Some(root);
        assert!(case.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_loop_in_facts() {
        let mut case = small_case();
        case.liveness.push(LiveSetEntry { loop_id: LoopId(4), live_in: Vec::new(), live_out: Vec::new() });
        let text = case.to_json().unwrap();
        assert!(AnalysisCase::from_json(&text).is_err());
    }
}

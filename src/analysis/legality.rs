//! The legality decision: can the iterations of a loop run in parallel,
//! and with which variable scoping?
//!
//! Pipeline for one loop:
//!
//! ```text
//! canonical check → (indirect normalization) → dependence graph
//!   → autoscoping → scoping check → dependence elimination → verdict
//! ```

use super::canonical::{find_unsupported_construct, StructuralLoopRecognizer};
use super::dependence::{min_abs_distance, DependenceEdge, DependenceGraph, DependenceKind};
use super::elimination::{DependenceEliminator, EliminationReason};
use super::indirect::{collect_verified_indirect, normalize_indirect_indexing, IndirectIndexTable};
use super::oracle::{
    CanonicalLoopOracle, DependenceGraphBuilder, ReductionRecognizer, ShapeAnnotations, NO_ANNOTATIONS,
};
use super::reduction::AccumulationRecognizer;
use super::scoping::{Autoscoper, Classification, ScopeCategory, ScopingFacts};
use super::session::AnalysisSession;
use super::visible::VisibleVariables;
use crate::ir::{expr_to_string, IrPrinter, LoopId, Program, VarId};
use crate::utils::errors::{AutoParError, AutoParResult, Diagnostic, LegalityError};
use crate::utils::location::Span;
use crate::AnalysisConfig;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// A variable, by id and name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedVar {
    pub id: VarId,
    pub name: String,
}

impl NamedVar {
    fn new(program: &Program, id: VarId) -> Self {
        Self { id, name: program.variable(id).name.clone() }
    }
}

impl fmt::Display for NamedVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A classified variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopedVariable {
    pub var: NamedVar,
    pub category: ScopeCategory,
}

impl fmt::Display for ScopedVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.var, self.category)
    }
}

/// Scoping of a parallelizable loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopingContract {
    /// Implicitly private
    pub invariant: NamedVar,
    pub shared: Vec<NamedVar>,
    pub private: Vec<NamedVar>,
    pub firstprivate: Vec<NamedVar>,
}

fn write_clause(f: &mut fmt::Formatter<'_>, clause: &str, vars: &[NamedVar]) -> fmt::Result {
    if vars.is_empty() {
        return Ok(());
    }
    let names: Vec<&str> = vars.iter().map(|v| v.name.as_str()).collect();
    write!(f, " {}({})", clause, names.join(", "))
}

impl fmt::Display for ScopingContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invariant({})", self.invariant)?;
        write_clause(f, "private", &self.private)?;
        write_clause(f, "firstprivate", &self.firstprivate)?;
        write_clause(f, "shared", &self.shared)
    }
}

/// A dependence that blocks parallelization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeReport {
    /// Source access, as source text
    pub source: Option<String>,
    pub sink: Option<String>,
    pub kind: DependenceKind,
    pub common_level: usize,
    pub carry_level: usize,
    pub distance: Option<Vec<i64>>,
}

impl EdgeReport {
    fn new(program: &Program, graph: &DependenceGraph, edge: &DependenceEdge) -> AutoParResult<Self> {
        let text = |node| -> AutoParResult<Option<String>> {
            Ok(graph.access(node)?.map(|e| expr_to_string(program, e)))
        };
        Ok(Self {
            source: text(edge.source)?,
            sink: text(edge.sink)?,
            kind: edge.kind,
            common_level: edge.common_level,
            carry_level: edge.carry_level,
            distance: edge.distance.clone(),
        })
    }
}

impl fmt::Display for EdgeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = |e: &Option<String>| e.clone().unwrap_or_else(|| "<empty>".to_string());
        write!(f, "{} -> {} [{}]", end(&self.source), end(&self.sink), self.kind)?;
        if let Some(ref d) = self.distance {
            let d: Vec<String> = d.iter().map(|x| x.to_string()).collect();
            write!(f, " distance ({})", d.join(", "))?;
        }
        Ok(())
    }
}

/// Outcome of analyzing one loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    /// Iterations are independent under the contract
    Parallelizable { contract: ScopingContract },
    /// Not a canonical counted loop
    NotCanonical { reason: String },
    /// The loop uses an operator the analysis does not handle
    UnsupportedConstruct { operator: String },
    /// The graph builder could not produce a graph
    NoDependenceGraph,
    /// Some variables need lastprivate or reduction scoping
    DisallowedScoping { variables: Vec<ScopedVariable> },
    /// Loop-carried dependences remain
    UnresolvedDependences {
        edges: Vec<EdgeReport>,
        /// Minimum absolute distance at this loop level, over edges with a
        /// known distance
        min_distance: Option<i64>,
    },
}

impl Verdict {
    pub fn is_parallelizable(&self) -> bool {
        matches!(self, Verdict::Parallelizable { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Parallelizable { .. } => "parallelizable",
            Verdict::NotCanonical { .. } => "not canonical",
            Verdict::UnsupportedConstruct { .. } => "unsupported construct",
            Verdict::NoDependenceGraph => "no dependence graph",
            Verdict::DisallowedScoping { .. } => "disallowed scoping",
            Verdict::UnresolvedDependences { .. } => "unresolved dependences",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Report for one analyzed loop.
#[derive(Debug, Clone, Serialize)]
pub struct LoopReport {
    pub loop_id: LoopId,
    pub function: String,
    pub file: String,
    pub span: Span,
    /// Loop header as source text
    pub header: String,
    pub invariant: Option<NamedVar>,
    #[serde(flatten)]
    pub verdict: Verdict,
    /// Variables with a recorded category
    pub scoping: Vec<ScopedVariable>,
    /// Visible variables left shared
    pub shared: Vec<NamedVar>,
    pub diagnostics: Vec<Diagnostic>,
    /// Indices rewritten by indirect normalization
    pub rewrites: usize,
    /// Eliminated dependences per filter
    pub eliminated: BTreeMap<EliminationReason, usize>,
    #[serde(skip)]
    pub classification: Classification,
}

impl LoopReport {
    fn new(program: &Program, loop_id: LoopId, verdict: Verdict) -> Self {
        let lp = program.loop_info(loop_id);
        Self {
            loop_id,
            function: program.name.clone(),
            file: program.file.clone(),
            span: lp.span,
            header: IrPrinter::new(program).loop_header(loop_id),
            invariant: None,
            verdict,
            scoping: Vec::new(),
            shared: Vec::new(),
            diagnostics: Vec::new(),
            rewrites: 0,
            eliminated: BTreeMap::new(),
            classification: Classification::new(),
        }
    }

    fn record_scoping(&mut self, program: &Program, classification: &Classification, visible: &VisibleVariables) {
        self.scoping = classification
            .iter()
            .map(|(v, category)| ScopedVariable { var: NamedVar::new(program, v), category })
            .collect();
        self.shared = classification
            .shared(visible)
            .into_iter()
            .map(|v| NamedVar::new(program, v))
            .collect();
    }

    fn diagnose(&mut self, diagnostic: Diagnostic) {
        let diagnostic = if self.span.is_dummy() { diagnostic } else { diagnostic.with_span(self.span) };
        self.diagnostics.push(diagnostic);
    }

    pub fn is_parallelizable(&self) -> bool {
        self.verdict.is_parallelizable()
    }
}

impl fmt::Display for LoopReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", self.loop_id, self.function)?;
        if !self.span.is_dummy() {
            write!(f, " at {}:{}", self.file, self.span)?;
        }
        writeln!(f, ": {}", self.header)?;
        writeln!(f, "  verdict: {}", self.verdict)?;
        match &self.verdict {
            Verdict::Parallelizable { contract } => writeln!(f, "  scoping: {}", contract)?,
            Verdict::DisallowedScoping { variables } => {
                for v in variables {
                    writeln!(f, "    {}", v)?;
                }
            }
            Verdict::UnresolvedDependences { edges, min_distance } => {
                for e in edges {
                    writeln!(f, "    {}", e)?;
                }
                if let Some(d) = min_distance {
                    writeln!(f, "  minimum distance: {}", d)?;
                }
            }
            _ => {}
        }
        if self.rewrites > 0 {
            writeln!(f, "  indirect indices rewritten: {}", self.rewrites)?;
        }
        if !self.eliminated.is_empty() {
            let counts: Vec<String> = self.eliminated.iter().map(|(r, n)| format!("{} x{}", r, n)).collect();
            writeln!(f, "  eliminated: {}", counts.join(", "))?;
        }
        for d in &self.diagnostics {
            writeln!(f, "  {}", d)?;
        }
        Ok(())
    }
}

/// Decides the parallelizability of loops.
pub struct LoopParallelizer<'a> {
    session: &'a AnalysisSession,
    graphs: &'a dyn DependenceGraphBuilder,
    config: AnalysisConfig,
    canonical: &'a dyn CanonicalLoopOracle,
    reductions: &'a dyn ReductionRecognizer,
    annotations: &'a ShapeAnnotations,
}

impl<'a> LoopParallelizer<'a> {
    pub fn new(session: &'a AnalysisSession, graphs: &'a dyn DependenceGraphBuilder, config: AnalysisConfig) -> Self {
        Self {
            session,
            graphs,
            config,
            canonical: &StructuralLoopRecognizer,
            reductions: &AccumulationRecognizer,
            annotations: &NO_ANNOTATIONS,
        }
    }

    pub fn with_canonical_oracle(mut self, canonical: &'a dyn CanonicalLoopOracle) -> Self {
        self.canonical = canonical;
        self
    }

    pub fn with_reduction_recognizer(mut self, reductions: &'a dyn ReductionRecognizer) -> Self {
        self.reductions = reductions;
        self
    }

    pub fn with_annotations(mut self, annotations: &'a ShapeAnnotations) -> Self {
        self.annotations = annotations;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyze one loop.
    ///
    /// Fails with a `NotCanonicalLoop` legality error for loops that are not
    /// canonical. With indirect-index reasoning enabled, array indices of the
    /// loop body may be rewritten in `program`.
    pub fn analyze(&self, program: &mut Program, loop_id: LoopId) -> AutoParResult<LoopReport> {
        let (span, has_body) = match program.get_loop(loop_id) {
            Some(lp) => (lp.span, lp.body.is_some()),
            None => {
                return Err(LegalityError::unknown_loop(format!(
                    "{} is not a loop of {}",
                    loop_id, program.name
                ))
                .into())
            }
        };

        let invariant = self.canonical.canonical_invariant(program, loop_id).ok_or_else(|| {
            LegalityError::not_canonical(format!("{} is not a canonical counted loop", loop_id), span)
        })?;
        if invariant.index() >= program.variables.len() {
            return Err(AutoParError::Internal(format!(
                "invariant {} of {} is not a variable of the program",
                invariant, loop_id
            )));
        }
        if !has_body {
            return Err(AutoParError::Internal(format!("canonical loop {} has no body", loop_id)));
        }

        let defuse = self.session.defuse()?;
        let liveness = self.session.liveness()?;

        let mut rewrites = 0;
        let mut indirect = IndirectIndexTable::new();
        if self.config.enable_indirect_index_uniqueness {
            rewrites = normalize_indirect_indexing(program, loop_id, invariant, defuse);
            indirect = collect_verified_indirect(program, loop_id, invariant);
        }

        let program: &Program = program;
        let mut report = LoopReport::new(program, loop_id, Verdict::NoDependenceGraph);
        report.invariant = Some(NamedVar::new(program, invariant));
        report.rewrites = rewrites;

        let graph = match self.graphs.build(program, loop_id, self.annotations) {
            Some(graph) => graph,
            None => {
                warn!("no dependence graph for {} in {}", loop_id, program.name);
                report.diagnose(Diagnostic::warning("no dependence graph is available for this loop"));
                info!("{}: {}", loop_id, report.verdict);
                return Ok(report);
            }
        };
        graph.validate(program)?;
        debug!("{}: {} dependences in the raw graph", loop_id, graph.edge_count());

        let facts = ScopingFacts::collect(program, loop_id, invariant, liveness, &graph, self.canonical)?;
        let classification = Autoscoper::new(self.reductions)
            .with_trace(self.config.enable_debug_trace)
            .classify(program, loop_id, &facts);
        report.record_scoping(program, &classification, &facts.visible);

        let disallowed = classification.disallowed();
        if !disallowed.is_empty() {
            let variables: Vec<ScopedVariable> = disallowed
                .into_iter()
                .map(|(v, category)| ScopedVariable { var: NamedVar::new(program, v), category })
                .collect();
            let diagnostic = variables.iter().fold(
                Diagnostic::error("loop needs lastprivate or reduction scoping"),
                |d, v| d.with_note(v.to_string()),
            );
            report.diagnose(diagnostic);
            report.verdict = Verdict::DisallowedScoping { variables };
            report.classification = classification;
            info!("{}: {}", loop_id, report.verdict);
            return Ok(report);
        }

        let outcome = DependenceEliminator::new(program, loop_id, invariant, &self.config, &classification, &indirect)
            .with_annotations(self.annotations)
            .eliminate(&graph)?;
        report.eliminated = outcome.counts();

        report.verdict = if outcome.remaining.is_empty() {
            let names = |category| -> Vec<NamedVar> {
                classification
                    .with_category(category)
                    .into_iter()
                    .map(|v| NamedVar::new(program, v))
                    .collect()
            };
            Verdict::Parallelizable {
                contract: ScopingContract {
                    invariant: NamedVar::new(program, invariant),
                    shared: report.shared.clone(),
                    private: names(ScopeCategory::Private),
                    firstprivate: names(ScopeCategory::FirstPrivate),
                },
            }
        } else {
            let edges = outcome
                .remaining
                .iter()
                .map(|e| EdgeReport::new(program, &graph, e))
                .collect::<AutoParResult<Vec<_>>>()?;
            report.diagnose(Diagnostic::error(format!(
                "{} loop-carried dependence(s) remain",
                edges.len()
            )));
            Verdict::UnresolvedDependences {
                edges,
                min_distance: min_abs_distance(&outcome.remaining, 0),
            }
        };
        report.classification = classification;
        info!("{}: {}", loop_id, report.verdict);
        Ok(report)
    }

    /// Whether the loop can be parallelized.
    pub fn can_parallelize(&self, program: &mut Program, loop_id: LoopId) -> AutoParResult<bool> {
        Ok(self.analyze(program, loop_id)?.is_parallelizable())
    }

    /// Analyze a loop the way the whole-program driver does: loops with
    /// unsupported constructs and non-canonical loops get a verdict
    /// instead of an error.
    pub fn report_loop(&self, program: &mut Program, loop_id: LoopId) -> AutoParResult<LoopReport> {
        if program.get_loop(loop_id).is_none() {
            return Err(LegalityError::unknown_loop(format!("{} is not a loop of {}", loop_id, program.name)).into());
        }
        if let Some(op) = find_unsupported_construct(program, loop_id) {
            let mut report = LoopReport::new(
                program,
                loop_id,
                Verdict::UnsupportedConstruct { operator: op.symbol().to_string() },
            );
            report.diagnose(Diagnostic::error(format!("operator `{}` is not supported", op.symbol())));
            info!("{}: {}", loop_id, report.verdict);
            return Ok(report);
        }
        match self.analyze(program, loop_id) {
            Err(e) if e.is_not_canonical() => {
                let mut report = LoopReport::new(program, loop_id, Verdict::NotCanonical { reason: e.to_string() });
                report.diagnose(Diagnostic::note("only counted loops stepping by one are analyzed"));
                info!("{}: {}", loop_id, report.verdict);
                Ok(report)
            }
            other => other,
        }
    }

    /// Analyze every loop of the program, outer loops first.
    pub fn analyze_program(&self, program: &mut Program) -> AutoParResult<Vec<LoopReport>> {
        program
            .all_loops()
            .into_iter()
            .map(|loop_id| self.report_loop(program, loop_id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::oracle::{LiveSetTable, PrecomputedGraphs, ReachingDefTable};
    use crate::ir::{BinaryOp, ProgramBuilder, VarType};

    fn session(live: LiveSetTable) -> AnalysisSession {
        let mut session = AnalysisSession::new();
        session.initialize(Box::new(ReachingDefTable::new()), Box::new(live)).unwrap();
        session
    }

    #[test]
    fn test_empty_loop_is_parallelizable() {
        let mut b = ProgramBuilder::new("empty");
        let root = b.root_scope();
        let i = b.declare_var(root, "i", VarType::Int);
        let zero = b.int(0);
        let n = b.int(10);
        let lp = b.for_loop(root, i, zero, n);
        let mut program = b.finish();

        let session = session(LiveSetTable::new());
        let mut graphs = PrecomputedGraphs::new();
        graphs.insert(lp.id, DependenceGraph::new());
        let parallelizer = LoopParallelizer::new(&session, &graphs, AnalysisConfig::default());

        let report = parallelizer.analyze(&mut program, lp.id).unwrap();
        assert!(report.is_parallelizable());
        assert!(report.classification.is_empty());
        match report.verdict {
            Verdict::Parallelizable { contract } => assert_eq!(contract.to_string(), "invariant(i)"),
            other => panic!("unexpected verdict {:?}", other),
        }
    }

    #[test]
    fn test_missing_graph_and_uninitialized_session() {
        let mut b = ProgramBuilder::new("nograph");
        let root = b.root_scope();
        let i = b.declare_var(root, "i", VarType::Int);
        let zero = b.int(0);
        let n = b.int(10);
        let lp = b.for_loop(root, i, zero, n);
        let mut program = b.finish();

        let graphs = PrecomputedGraphs::new();
        let session = session(LiveSetTable::new());
        let report = LoopParallelizer::new(&session, &graphs, AnalysisConfig::default())
            .analyze(&mut program, lp.id)
            .unwrap();
        assert_eq!(report.verdict, Verdict::NoDependenceGraph);
        assert_eq!(report.diagnostics.len(), 1);

        let empty = AnalysisSession::new();
        let err = LoopParallelizer::new(&empty, &graphs, AnalysisConfig::default())
            .analyze(&mut program, lp.id)
            .unwrap_err();
        assert!(matches!(err, AutoParError::Session(_)));
    }

    #[test]
    fn test_unknown_loop_and_shift() {
        let mut b = ProgramBuilder::new("shift");
        let root = b.root_scope();
        let i = b.declare_var(root, "i", VarType::Int);
        let x = b.declare_var(root, "x", VarType::Int);
        let zero = b.int(0);
        let n = b.int(10);
        let lp = b.for_loop(root, i, zero, n);
        let target = b.var(x);
        let value = b.var(x);
        let one = b.int(1);
        let shift = b.binary(BinaryOp::Shr, value, one);
        let store = b.assign(target, shift);
        b.expr_stmt(lp.body_scope, store);
        let mut program = b.finish();

        let session = session(LiveSetTable::new());
        let graphs = PrecomputedGraphs::new();
        let parallelizer = LoopParallelizer::new(&session, &graphs, AnalysisConfig::default());

        assert!(parallelizer.analyze(&mut program, LoopId(7)).is_err());
        let report = parallelizer.report_loop(&mut program, lp.id).unwrap();
        assert_eq!(report.verdict, Verdict::UnsupportedConstruct { operator: ">>".to_string() });
    }
}

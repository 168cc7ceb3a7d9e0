//! Benchmarks for the legality analysis.
//!
//! Run with: cargo bench

use autopar::analysis::{DependenceEliminator, IndirectIndexTable};
use autopar::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

/// `for (i..) { a0[i] = b0[i] + t; ... }` over `width` array pairs, with an
/// anti edge between every read and every write.
fn wide_loop(width: usize) -> (Program, LoopId, PrecomputedGraphs) {
    let mut b = ProgramBuilder::new("wide");
    let root = b.root_scope();
    let t = b.declare_var(root, "t", VarType::Double);
    let arrays: Vec<(VarId, VarId)> = (0..width)
        .map(|k| {
            let ty = VarType::array(VarType::Double, &[Some(1024)]);
            (b.param(&format!("a{}", k), ty.clone()), b.param(&format!("b{}", k), ty))
        })
        .collect();
    let i = b.declare_var(root, "i", VarType::Int);
    let zero = b.int(0);
    let n = b.int(1024);
    let lp = b.for_loop(root, i, zero, n);

    let mut reads = Vec::new();
    let mut writes = Vec::new();
    for (a, src) in &arrays {
        let base = b.var(*src);
        let idx = b.var(i);
        let read = b.index(base, idx);
        let t_ref = b.var(t);
        let value = b.binary(BinaryOp::Add, read, t_ref);
        let base = b.var(*a);
        let idx = b.var(i);
        let write = b.index(base, idx);
        let store = b.assign(write, value);
        b.expr_stmt(lp.body_scope, store);
        reads.push(read);
        writes.push(write);
    }
    let program = b.finish();

    let mut graph = DependenceGraph::new();
    for read in &reads {
        for write in &writes {
            let (r, w) = (graph.node_for(*read), graph.node_for(*write));
            graph
                .add_edge(DependenceEdge::new(r, w, DependenceKind::ANTI))
                .expect("nodes exist");
        }
    }
    let mut graphs = PrecomputedGraphs::new();
    graphs.insert(lp.id, graph);
    (program, lp.id, graphs)
}

/// Benchmark the dependence filters on their own.
fn bench_elimination(c: &mut Criterion) {
    let (program, loop_id, graphs) = wide_loop(64);
    let graph = graphs.get(loop_id).expect("graph registered");
    let invariant = program.find_variable("i").expect("invariant declared");
    let config = AnalysisConfig::default().assume_no_aliasing(true);
    let classification = Classification::new();
    let indirect = IndirectIndexTable::new();

    c.bench_function("eliminate_4096_edges", |b| {
        b.iter(|| {
            DependenceEliminator::new(&program, loop_id, invariant, &config, &classification, &indirect)
                .eliminate(black_box(graph))
                .unwrap()
        })
    });
}

/// Benchmark the full pipeline: autoscoping, normalization and elimination.
fn bench_analyze(c: &mut Criterion) {
    let (program, loop_id, graphs) = wide_loop(16);
    let t = program.find_variable("t").expect("t declared");
    let mut live = LiveSetTable::new();
    live.insert(loop_id, [t], Vec::<VarId>::new());
    let mut session = AnalysisSession::new();
    session
        .initialize(Box::new(ReachingDefTable::new()), Box::new(live))
        .unwrap();
    let config = AnalysisConfig::default().assume_no_aliasing(true);
    let parallelizer = LoopParallelizer::new(&session, &graphs, config);

    c.bench_function("analyze_wide_loop", |b| {
        b.iter(|| {
            let mut program = program.clone();
            parallelizer.analyze(&mut program, black_box(loop_id)).unwrap()
        })
    });
}

criterion_group!(benches, bench_elimination, bench_analyze);
criterion_main!(benches);

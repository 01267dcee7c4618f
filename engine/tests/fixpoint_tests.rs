// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Properties of the intraprocedural worklist solver: precision on
//! branch-free and branching code, widening-backed termination on loops,
//! scope pruning, monotonicity of the join discipline, and eager
//! structural validation.

mod common;

use absint::cfg::{Cfg, ControlFlowKind, EdgeKind};
use absint::error::{AnalysisError, ValidationError};
use absint::expression::{BinaryOp, Expr, Identifier};
use absint::interprocedural::WorstCaseAnalysis;
use absint::interval_domain::IntervalDomain;
use absint::lattice::Lattice;
use absint::worklist::{FifoWorkingSet, LifoWorkingSet, WorkingSet};

use common::*;

fn run(cfg: &Cfg, widen_after: usize) -> Results {
    let mut ws = FifoWorkingSet::new();
    cfg.fixpoint(0, entry_state(), &mut WorstCaseAnalysis, &mut ws, widen_after)
        .expect("fixpoint converges")
}

#[test]
fn straight_line_assignments() {
    init_logger();
    let mut cfg = Cfg::new("straight", &[]);
    let first = cfg.add_assign("x", Expr::int(1));
    let second = cfg.add_assign("y", Expr::binary(BinaryOp::Add, Expr::var("x"), Expr::int(2)));
    cfg.add_edge(first, second, EdgeKind::Sequential);
    cfg.set_entrypoint(first);

    let results = run(&cfg, 5);
    assert_eq!(value_at(&results, first, "x"), interval(1, 1));
    assert_eq!(value_at(&results, second, "y"), interval(3, 3));
}

#[test]
fn branches_merge_with_lub() {
    init_logger();
    let mut cfg = Cfg::new("merge", &[]);
    let branch = cfg.add_branch(Expr::binary(BinaryOp::Lt, Expr::var("c"), Expr::int(0)));
    let low = cfg.add_assign("x", Expr::int(1));
    let high = cfg.add_assign("x", Expr::int(5));
    let after = cfg.add_skip();
    cfg.add_edge(branch, low, EdgeKind::TrueBranch);
    cfg.add_edge(branch, high, EdgeKind::FalseBranch);
    cfg.add_edge(low, after, EdgeKind::Sequential);
    cfg.add_edge(high, after, EdgeKind::Sequential);
    cfg.set_entrypoint(branch);

    let results = run(&cfg, 5);
    assert_eq!(value_at(&results, after, "x"), interval(1, 5));
}

#[test]
fn conditional_edges_refine_the_state() {
    init_logger();
    let mut cfg = Cfg::new("refine", &["n"]);
    let branch = cfg.add_branch(Expr::binary(BinaryOp::Le, Expr::var("n"), Expr::int(0)));
    let nonpositive = cfg.add_assign("y", Expr::var("n"));
    let positive = cfg.add_assign("z", Expr::var("n"));
    cfg.add_edge(branch, nonpositive, EdgeKind::TrueBranch);
    cfg.add_edge(branch, positive, EdgeKind::FalseBranch);
    cfg.set_entrypoint(branch);

    let results = run(&cfg, 5);
    let y = value_at(&results, nonpositive, "y");
    assert_eq!(y.lower_bound(), None);
    assert_eq!(y.upper_bound(), Some(0));
    let z = value_at(&results, positive, "z");
    assert_eq!(z.lower_bound(), Some(1));
    assert_eq!(z.upper_bound(), None);
}

/// `i := 0; while (i < 10) { i := i + 1 }` — the loop converges once the
/// widening budget is exhausted, and the exit refines the widened interval
/// with the negated guard.
#[test]
fn loops_terminate_through_widening() {
    init_logger();
    let mut cfg = Cfg::new("loop", &[]);
    let init = cfg.add_assign("i", Expr::int(0));
    let guard = cfg.add_branch(Expr::binary(BinaryOp::Lt, Expr::var("i"), Expr::int(10)));
    let body = cfg.add_assign("i", Expr::binary(BinaryOp::Add, Expr::var("i"), Expr::int(1)));
    let exit = cfg.add_skip();
    cfg.add_edge(init, guard, EdgeKind::Sequential);
    cfg.add_edge(guard, body, EdgeKind::TrueBranch);
    cfg.add_edge(body, guard, EdgeKind::Sequential);
    cfg.add_edge(guard, exit, EdgeKind::FalseBranch);
    cfg.set_entrypoint(init);

    let results = run(&cfg, 2);
    let at_exit = value_at(&results, exit, "i");
    assert_eq!(at_exit.lower_bound(), Some(10));
    assert_eq!(at_exit.upper_bound(), None);
}

/// With a widening threshold of zero the solver only ever joins, so a
/// bounded loop converges to the exact result.
#[test]
fn widen_after_zero_is_always_lub() {
    init_logger();
    let mut cfg = Cfg::new("bounded", &[]);
    let init = cfg.add_assign("i", Expr::int(0));
    let guard = cfg.add_branch(Expr::binary(BinaryOp::Lt, Expr::var("i"), Expr::int(3)));
    let body = cfg.add_assign("i", Expr::binary(BinaryOp::Add, Expr::var("i"), Expr::int(1)));
    let exit = cfg.add_skip();
    cfg.add_edge(init, guard, EdgeKind::Sequential);
    cfg.add_edge(guard, body, EdgeKind::TrueBranch);
    cfg.add_edge(body, guard, EdgeKind::Sequential);
    cfg.add_edge(guard, exit, EdgeKind::FalseBranch);
    cfg.set_entrypoint(init);

    let results = run(&cfg, 0);
    assert_eq!(value_at(&results, exit, "i"), interval(3, 3));
    assert_eq!(value_at(&results, guard, "i"), interval(0, 3));
}

/// The worklist strategy affects processing order, not the converged
/// result.
#[test]
fn results_are_worklist_order_independent() {
    init_logger();
    let mut cfg = Cfg::new("order", &[]);
    let branch = cfg.add_branch(Expr::binary(BinaryOp::Lt, Expr::var("c"), Expr::int(0)));
    let low = cfg.add_assign("x", Expr::int(1));
    let high = cfg.add_assign("x", Expr::int(5));
    let after = cfg.add_skip();
    cfg.add_edge(branch, low, EdgeKind::TrueBranch);
    cfg.add_edge(branch, high, EdgeKind::FalseBranch);
    cfg.add_edge(low, after, EdgeKind::Sequential);
    cfg.add_edge(high, after, EdgeKind::Sequential);
    cfg.set_entrypoint(branch);

    let mut fifo: FifoWorkingSet = FifoWorkingSet::new();
    let mut lifo: LifoWorkingSet = LifoWorkingSet::new();
    let with_fifo = cfg
        .fixpoint(0, entry_state(), &mut WorstCaseAnalysis, &mut fifo, 5)
        .expect("fixpoint converges");
    let with_lifo = cfg
        .fixpoint(0, entry_state(), &mut WorstCaseAnalysis, &mut lifo, 5)
        .expect("fixpoint converges");
    assert_eq!(
        value_at(&with_fifo, after, "x"),
        value_at(&with_lifo, after, "x")
    );
}

/// A variable whose declared scope ends at a statement is no longer tracked
/// by any state strictly after it.
#[test]
fn scope_pruning_forgets_dead_variables() {
    init_logger();
    let mut cfg = Cfg::new("scopes", &[]);
    let first = cfg.add_assign("tmp", Expr::int(7));
    let second = cfg.add_assign("x", Expr::var("tmp"));
    let third = cfg.add_skip();
    cfg.add_edge(first, second, EdgeKind::Sequential);
    cfg.add_edge(second, third, EdgeKind::Sequential);
    cfg.set_entrypoint(first);
    cfg.declare_variable("tmp", Some(first), Some(second));

    let results = run(&cfg, 5);
    // The copy happened before the scope ended.
    assert_eq!(value_at(&results, third, "x"), interval(7, 7));
    // The scope of tmp ended at the second statement.
    let tmp = Identifier::new("tmp");
    let after = results.state_after(third).expect("analyzed");
    assert!(after.state.value.tracked().all(|id| *id != tmp));
    assert!(value_at(&results, third, "tmp").is_top());
}

/// `old <= join(old, new)` and `new <= join(old, new)`, for both the lub
/// and the widening rounds of the discipline.
#[test]
fn join_discipline_is_monotone() {
    init_logger();
    let samples = [
        IntervalDomain::bottom(),
        IntervalDomain::top(),
        interval(0, 0),
        interval(-5, 3),
        interval(1, 100),
        interval(-2, -2),
    ];
    for old in &samples {
        for new in &samples {
            let lubbed = old.lub(new).expect("lub is total");
            assert!(old.less_or_equal(&lubbed).unwrap());
            assert!(new.less_or_equal(&lubbed).unwrap());
            let widened = old.widening(new).expect("widening is total");
            assert!(old.less_or_equal(&widened).unwrap());
            assert!(new.less_or_equal(&widened).unwrap());
        }
    }
}

#[test]
fn entrypoint_outside_the_graph_fails_validation() {
    init_logger();
    let mut cfg = Cfg::new("broken", &[]);
    let only = cfg.add_skip();
    cfg.set_entrypoint(only + 17);

    match run_checked(&cfg) {
        Err(AnalysisError::Validation(ValidationError::UnknownEntrypoint(id))) => {
            assert_eq!(id, only + 17)
        }
        other => panic!("expected a validation failure, got {:?}", other),
    }
}

#[test]
fn terminator_with_followers_fails_validation() {
    init_logger();
    let mut cfg = Cfg::new("broken", &[]);
    let ret = cfg.add_return(None);
    let after = cfg.add_skip();
    cfg.add_edge(ret, after, EdgeKind::Sequential);
    cfg.set_entrypoint(ret);

    match run_checked(&cfg) {
        Err(AnalysisError::Validation(ValidationError::TerminatorWithFollowers(_))) => {}
        other => panic!("expected a validation failure, got {:?}", other),
    }
}

#[test]
fn graphs_without_entrypoints_fail_validation() {
    init_logger();
    let mut cfg = Cfg::new("broken", &[]);
    cfg.add_skip();

    match run_checked(&cfg) {
        Err(AnalysisError::Validation(ValidationError::NoEntrypoints)) => {}
        other => panic!("expected a validation failure, got {:?}", other),
    }
}

fn run_checked(cfg: &Cfg) -> Result<Results, AnalysisError> {
    let mut ws = FifoWorkingSet::new();
    cfg.fixpoint(0, entry_state(), &mut WorstCaseAnalysis, &mut ws, 5)
}

/// The memoized extractor reconstructs the loop of a while-shaped graph.
#[test]
fn control_flow_structures_are_extracted_and_cached() {
    init_logger();
    let mut cfg = Cfg::new("loop", &[]);
    let init = cfg.add_assign("i", Expr::int(0));
    let guard = cfg.add_branch(Expr::binary(BinaryOp::Lt, Expr::var("i"), Expr::int(10)));
    let body = cfg.add_assign("i", Expr::binary(BinaryOp::Add, Expr::var("i"), Expr::int(1)));
    let exit = cfg.add_skip();
    cfg.add_edge(init, guard, EdgeKind::Sequential);
    cfg.add_edge(guard, body, EdgeKind::TrueBranch);
    cfg.add_edge(body, guard, EdgeKind::Sequential);
    cfg.add_edge(guard, exit, EdgeKind::FalseBranch);
    cfg.set_entrypoint(init);

    let structures = cfg.control_flow_structures();
    assert_eq!(structures.len(), 1);
    assert_eq!(structures[0].kind, ControlFlowKind::Loop);
    assert_eq!(structures[0].condition, guard);
    assert!(structures[0].body.contains(&body));
    assert!(!structures[0].body.contains(&exit));
    assert!(cfg.is_inside_loop(body));
    assert!(!cfg.is_inside_loop(exit));
    // Second access hits the cache and agrees.
    assert_eq!(cfg.control_flow_structures(), structures);
}

/// Worklist strategies drain in their documented orders.
#[test]
fn working_sets_have_their_documented_order() {
    let mut fifo = FifoWorkingSet::new();
    fifo.push(1);
    fifo.push(2);
    assert_eq!(fifo.pop(), Some(1));
    assert_eq!(fifo.pop(), Some(2));
    assert!(fifo.is_empty());

    let mut lifo = LifoWorkingSet::new();
    lifo.push(1);
    lifo.push(2);
    assert_eq!(lifo.pop(), Some(2));
    assert_eq!(lifo.pop(), Some(1));
    assert!(lifo.is_empty());
}

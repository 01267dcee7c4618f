// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Properties of the two-phase recursion solver: base-case isolation, the
//! concrete interval scenario, convergence on direct and mutual recursion,
//! early-return base cases, void recursions, and the contract-misuse guard
//! of the restricted driver.

mod common;

use absint::analysis_state::AnalysisState;
use absint::cfg::{Cfg, EdgeKind};
use absint::cfg_fixpoint::CompoundState;
use absint::context::ScopeId;
use absint::error::AnalysisError;
use absint::expression::{BinaryOp, Expr, Identifier};
use absint::interprocedural::{ContextBasedAnalysis, WorstCaseAnalysis, WorstCaseOpenCall};
use absint::interval_domain::IntervalDomain;
use absint::lattice::Lattice;
use absint::options::Options;
use absint::program::Program;
use absint::recursion::{BaseCasesFinder, Recursion};
use absint::worklist::FifoWorkingSet;

use common::*;
use std::collections::BTreeSet;
use std::rc::Rc;

fn driver(program: Program) -> ContextBasedAnalysis<Heap, Values, Types> {
    ContextBasedAnalysis::new(program, &Options::default(), Rc::new(WorstCaseOpenCall))
}

/// Builds the `main -> f` program around the recursive sum and returns the
/// analysis driver plus the ids needed by assertions.
struct SumFixture {
    analysis: ContextBasedAnalysis<Heap, Values, Types>,
    f_id: usize,
    main_id: usize,
    invocation: u32,
    main_ret: u32,
}

fn sum_fixture() -> SumFixture {
    let mut program = Program::new();
    let (f, _, _, _, _) = recursive_sum_cfg();
    let f_id = program.add_cfg(f);
    let (main, invocation, main_ret) = main_calling("f", Expr::var("n0"));
    let main_id = program.add_cfg(main);
    program.add_entrypoint(main_id);
    SumFixture {
        analysis: driver(program),
        f_id,
        main_id,
        invocation,
        main_ret,
    }
}

fn sum_recursion(fixture: &SumFixture) -> Rc<Recursion<Heap, Values, Types>> {
    Rc::new(Recursion {
        members: BTreeSet::from([fixture.f_id]),
        head: fixture.f_id,
        invocation: (fixture.main_id, fixture.invocation),
        invocation_token: ScopeId::starting_id(),
        entry: CompoundState::of(entry_state()),
        returns_void: false,
    })
}

/// Phase one cuts the cycle-closing call to bottom and enters with top, so
/// its result is exactly the value of the base case: {0}.
#[test]
fn base_cases_survive_the_bottom_cut() {
    init_logger();
    let fixture = sum_fixture();
    let recursion = sum_recursion(&fixture);
    let mut finder = BaseCasesFinder::new(&fixture.analysis, recursion);
    let base = finder.find().expect("base cases converge");

    let meta = Identifier::call_meta(fixture.invocation);
    assert_eq!(base.state.value.value_of(&meta), interval(0, 0));
}

/// Phase one of a two-branch recursion equals the standalone analysis of
/// the base branch with the recursive branch removed.
#[test]
fn base_cases_match_the_base_branch_alone() {
    init_logger();
    let fixture = sum_fixture();
    let recursion = sum_recursion(&fixture);
    let mut finder = BaseCasesFinder::new(&fixture.analysis, recursion);
    let base = finder.find().expect("base cases converge");
    let meta = Identifier::call_meta(fixture.invocation);

    // The base branch alone: f(n) { if n <= 0 { return 0 } }.
    let mut base_only = Cfg::new("f_base", &["n"]);
    let branch = base_only.add_branch(Expr::binary(BinaryOp::Le, Expr::var("n"), Expr::int(0)));
    let ret = base_only.add_return(Some(Expr::int(0)));
    base_only.add_edge(branch, ret, EdgeKind::TrueBranch);
    base_only.set_entrypoint(branch);
    let mut ws = FifoWorkingSet::new();
    let standalone = base_only
        .fixpoint(0, entry_state(), &mut WorstCaseAnalysis, &mut ws, 5)
        .expect("fixpoint converges");
    let standalone_return = standalone
        .exit_state(&base_only)
        .expect("exit state merges")
        .state
        .value
        .value_of(&Identifier::return_slot());

    assert_eq!(base.state.value.value_of(&meta), standalone_return);
}

/// The restricted phase-one driver refuses to act as a root analysis.
#[test]
fn base_cases_finder_rejects_root_use() {
    init_logger();
    let fixture = sum_fixture();
    let recursion = sum_recursion(&fixture);
    let mut finder = BaseCasesFinder::new(&fixture.analysis, recursion);
    match finder.analyze(entry_state()) {
        Err(AnalysisError::RestrictedDriver) => {}
        other => panic!("expected the contract-misuse failure, got {:?}", other.map(|_| ())),
    }
}

/// The concrete scenario: `f(n) { if n <= 0 return 0; else return
/// n + f(n - 1) }` with n seeded at top. The fully propagated result is an
/// interval compatible with [0, +infinity).
#[test]
fn recursive_sum_converges_to_zero_to_infinity() {
    init_logger();
    let mut fixture = sum_fixture();
    let results = fixture
        .analysis
        .analyze(entry_state())
        .expect("analysis succeeds");

    let main_results = &results.of(fixture.main_id)[0];
    let r = value_at(main_results, fixture.main_ret, "r");
    assert_eq!(r.lower_bound(), Some(0));
    assert_eq!(r.upper_bound(), None);

    // The cycle members got their own per-statement results recorded.
    assert!(!results.of(fixture.f_id).is_empty());
}

/// Direct self-recursion reaches the same fixpoint as a naive
/// unroll-until-stable baseline.
#[test]
fn self_recursion_matches_naive_unrolling() {
    init_logger();
    let mut fixture = sum_fixture();
    let results = fixture
        .analysis
        .analyze(entry_state())
        .expect("analysis succeeds");
    let engine_result = value_at(&results.of(fixture.main_id)[0], fixture.main_ret, "r");

    // Naive baseline: iterate `next = base lub (n + previous)` with
    // n in [1, +inf), widening once the ascent refuses to settle, until
    // stable. This mirrors unrolling the call one level per round.
    let base = interval(0, 0);
    let n = IntervalDomain::new(1, i128::MAX);
    let mut approx = IntervalDomain::bottom();
    for _ in 0..100 {
        let unrolled = base.lub(&n.add(&approx)).unwrap();
        let next = if approx.less_or_equal(&unrolled).unwrap() && unrolled.less_or_equal(&approx).unwrap() {
            break;
        } else {
            approx.widening(&unrolled).unwrap()
        };
        approx = next;
    }
    assert_eq!(engine_result, approx);
}

/// A two-procedure cycle: is_even/is_odd flip each other; every return is a
/// boolean, so the converged value is [0, 1].
#[test]
fn mutual_recursion_converges() {
    init_logger();
    let mut program = Program::new();

    let mut even = Cfg::new("is_even", &["n"]);
    let branch = even.add_branch(Expr::binary(BinaryOp::Eq, Expr::var("n"), Expr::int(0)));
    let base = even.add_return(Some(Expr::int(1)));
    let call = even.add_call(
        "is_odd",
        vec![Expr::binary(BinaryOp::Sub, Expr::var("n"), Expr::int(1))],
        Some("t"),
    );
    let flip = even.add_return(Some(Expr::var("t")));
    even.add_edge(branch, base, EdgeKind::TrueBranch);
    even.add_edge(branch, call, EdgeKind::FalseBranch);
    even.add_edge(call, flip, EdgeKind::Sequential);
    even.set_entrypoint(branch);
    let even_id = program.add_cfg(even);

    let mut odd = Cfg::new("is_odd", &["n"]);
    let branch = odd.add_branch(Expr::binary(BinaryOp::Eq, Expr::var("n"), Expr::int(0)));
    let base = odd.add_return(Some(Expr::int(0)));
    let call = odd.add_call(
        "is_even",
        vec![Expr::binary(BinaryOp::Sub, Expr::var("n"), Expr::int(1))],
        Some("t"),
    );
    let flip = odd.add_return(Some(Expr::var("t")));
    odd.add_edge(branch, base, EdgeKind::TrueBranch);
    odd.add_edge(branch, call, EdgeKind::FalseBranch);
    odd.add_edge(call, flip, EdgeKind::Sequential);
    odd.set_entrypoint(branch);
    let odd_id = program.add_cfg(odd);

    let (main, _, main_ret) = main_calling("is_even", Expr::var("n0"));
    let main_id = program.add_cfg(main);
    program.add_entrypoint(main_id);

    let mut analysis = driver(program);
    let results = analysis.analyze(entry_state()).expect("analysis succeeds");

    let r = value_at(&results.of(main_id)[0], main_ret, "r");
    assert_eq!(r, interval(0, 1));
    assert!(!results.of(even_id).is_empty());
    assert!(!results.of(odd_id).is_empty());
}

/// A recursion whose base case returns early still seeds phase two
/// correctly: `f(n) { if n <= 0 return 0; x := f(n - 1); return x + 1 }`
/// counts the unrolling depth, so the result is [0, +infinity).
#[test]
fn early_return_base_case_converges() {
    init_logger();
    let mut program = Program::new();
    let mut f = Cfg::new("f", &["n"]);
    let branch = f.add_branch(Expr::binary(BinaryOp::Le, Expr::var("n"), Expr::int(0)));
    let base = f.add_return(Some(Expr::int(0)));
    let call = f.add_call(
        "f",
        vec![Expr::binary(BinaryOp::Sub, Expr::var("n"), Expr::int(1))],
        Some("x"),
    );
    let count = f.add_return(Some(Expr::binary(
        BinaryOp::Add,
        Expr::var("x"),
        Expr::int(1),
    )));
    f.add_edge(branch, base, EdgeKind::TrueBranch);
    f.add_edge(branch, call, EdgeKind::FalseBranch);
    f.add_edge(call, count, EdgeKind::Sequential);
    f.set_entrypoint(branch);
    program.add_cfg(f);

    let (main, _, main_ret) = main_calling("f", Expr::var("n0"));
    let main_id = program.add_cfg(main);
    program.add_entrypoint(main_id);

    let mut analysis = driver(program);
    let results = analysis.analyze(entry_state()).expect("analysis succeeds");

    let r = value_at(&results.of(main_id)[0], main_ret, "r");
    assert_eq!(r.lower_bound(), Some(0));
    assert_eq!(r.upper_bound(), None);
}

/// A void recursion: the cut edge resolves directly to the bottom state,
/// and the caller's own state flows through the call unharmed.
#[test]
fn void_recursion_converges() {
    init_logger();
    let mut program = Program::new();
    let mut f = Cfg::new("countdown", &["n"]);
    let branch = f.add_branch(Expr::binary(BinaryOp::Gt, Expr::var("n"), Expr::int(0)));
    let call = f.add_call(
        "countdown",
        vec![Expr::binary(BinaryOp::Sub, Expr::var("n"), Expr::int(1))],
        None,
    );
    let done = f.add_return(None);
    f.add_edge(branch, call, EdgeKind::TrueBranch);
    f.add_edge(branch, done, EdgeKind::FalseBranch);
    f.add_edge(call, done, EdgeKind::Sequential);
    f.set_entrypoint(branch);
    let f_id = program.add_cfg(f);

    let mut main = Cfg::new("main", &[]);
    let call = main.add_call("countdown", vec![Expr::int(3)], None);
    let after = main.add_assign("x", Expr::int(7));
    let ret = main.add_return(None);
    main.add_edge(call, after, EdgeKind::Sequential);
    main.add_edge(after, ret, EdgeKind::Sequential);
    main.set_entrypoint(call);
    let main_id = program.add_cfg(main);
    program.add_entrypoint(main_id);

    let mut analysis = driver(program);
    let results = analysis.analyze(entry_state()).expect("analysis succeeds");

    assert_eq!(value_at(&results.of(main_id)[0], ret, "x"), interval(7, 7));
    assert!(!results.of(f_id).is_empty());
}

/// The bottom-keeping state of a value-returning cut: the call's meta
/// variable stays a well-formed computed expression while its value is
/// unreachable.
#[test]
fn value_returning_cut_keeps_the_meta_variable() {
    let meta = Identifier::new("@call3");
    let state: State = AnalysisState::bottom_keeping(&meta);
    assert!(state.is_bottom());
    let expected = Expr::var("@call3");
    assert!(state.computed_expressions.iter().any(|e| **e == *expected));
}

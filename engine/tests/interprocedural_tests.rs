// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Properties of the interprocedural layer: call resolution, context
//! sensitivity, result caching, open-call policies, call-graph queries and
//! option parsing.

mod common;

use absint::call_graph::CallGraph;
use absint::cfg::{Cfg, EdgeKind};
use absint::context::{ContextSensitivity, ScopeId};
use absint::error::AnalysisError;
use absint::expression::{BinaryOp, Expr};
use absint::interprocedural::{ContextBasedAnalysis, FailOnOpenCall, WorstCaseOpenCall};
use absint::lattice::Lattice;
use absint::options::{Options, WorklistSelection};
use absint::program::Program;

use common::*;
use std::rc::Rc;

/// `increment(n) { return n + 1 }`
fn increment_cfg() -> Cfg {
    let mut f = Cfg::new("increment", &["n"]);
    let ret = f.add_return(Some(Expr::binary(BinaryOp::Add, Expr::var("n"), Expr::int(1))));
    f.set_entrypoint(ret);
    f
}

fn driver(
    program: Program,
    options: &Options,
) -> ContextBasedAnalysis<Heap, Values, Types> {
    ContextBasedAnalysis::new(program, options, Rc::new(WorstCaseOpenCall))
}

#[test]
fn calls_return_the_callee_result() {
    init_logger();
    let mut program = Program::new();
    program.add_cfg(increment_cfg());
    let (main, _, ret) = main_calling("increment", Expr::int(2));
    let main_id = program.add_cfg(main);
    program.add_entrypoint(main_id);

    let mut analysis = driver(program, &Options::default());
    let results = analysis.analyze(entry_state()).expect("analysis succeeds");
    let main_results = results.of(main_id);
    assert_eq!(main_results.len(), 1);
    assert_eq!(value_at(main_results[0], ret, "r"), interval(3, 3));
}

/// Under the call-insensitive policy every call site shares one summary:
/// the callee is analyzed for the first site and the cached result is
/// reused verbatim for the second, merging the calling contexts.
#[test]
fn call_insensitive_policy_shares_one_summary() {
    init_logger();
    let mut program = Program::new();
    let callee_id = program.add_cfg(increment_cfg());
    let mut main = Cfg::new("main", &[]);
    let first = main.add_call("increment", vec![Expr::int(1)], Some("a"));
    let second = main.add_call("increment", vec![Expr::int(9)], Some("b"));
    let ret = main.add_return(None);
    main.add_edge(first, second, EdgeKind::Sequential);
    main.add_edge(second, ret, EdgeKind::Sequential);
    main.set_entrypoint(first);
    let main_id = program.add_cfg(main);
    program.add_entrypoint(main_id);

    let options = Options {
        sensitivity: ContextSensitivity::CallInsensitive,
        ..Options::default()
    };
    let mut analysis = driver(program, &options);
    let results = analysis.analyze(entry_state()).expect("analysis succeeds");

    // One summary for the callee, keyed by the shared root token.
    assert_eq!(results.of(callee_id).len(), 1);
    let main_results = &results.of(main_id)[0];
    assert_eq!(value_at(main_results, first, "a"), interval(2, 2));
    // The second site reuses the summary computed for the first.
    assert_eq!(value_at(main_results, ret, "b"), interval(2, 2));
}

#[test]
fn context_sensitive_policy_distinguishes_call_sites() {
    init_logger();
    let mut program = Program::new();
    let callee_id = program.add_cfg(increment_cfg());
    let mut main = Cfg::new("main", &[]);
    let first = main.add_call("increment", vec![Expr::int(1)], Some("a"));
    let second = main.add_call("increment", vec![Expr::int(9)], Some("b"));
    let ret = main.add_return(None);
    main.add_edge(first, second, EdgeKind::Sequential);
    main.add_edge(second, ret, EdgeKind::Sequential);
    main.set_entrypoint(first);
    let main_id = program.add_cfg(main);
    program.add_entrypoint(main_id);

    let options = Options {
        sensitivity: ContextSensitivity::KLimited(5),
        ..Options::default()
    };
    let mut analysis = driver(program, &options);
    let results = analysis.analyze(entry_state()).expect("analysis succeeds");

    // One fixpoint per (callee, token) pair.
    assert_eq!(results.of(callee_id).len(), 2);
    let main_results = &results.of(main_id)[0];
    assert_eq!(value_at(main_results, ret, "a"), interval(2, 2));
    assert_eq!(value_at(main_results, ret, "b"), interval(10, 10));
}

#[test]
fn open_calls_are_delegated_to_the_policy() {
    init_logger();
    let mut program = Program::new();
    let (main, _, ret) = main_calling("unknown", Expr::int(2));
    let main_id = program.add_cfg(main);
    program.add_entrypoint(main_id);

    // Worst case: the call's value is unconstrained.
    let mut tolerant = driver(program, &Options::default());
    let results = tolerant.analyze(entry_state()).expect("analysis succeeds");
    assert!(value_at(&results.of(main_id)[0], ret, "r").is_top());

    // Strict policy: the analysis fails instead.
    let mut program = Program::new();
    let (main, _, _) = main_calling("unknown", Expr::int(2));
    let main_id = program.add_cfg(main);
    program.add_entrypoint(main_id);
    let mut strict: ContextBasedAnalysis<Heap, Values, Types> =
        ContextBasedAnalysis::new(program, &Options::default(), Rc::new(FailOnOpenCall));
    match strict.analyze(entry_state()) {
        Err(AnalysisError::Fixpoint(_)) | Err(AnalysisError::Semantics(_)) => {}
        other => panic!("expected the analysis to fail, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn scope_tokens_are_immutable_chains() {
    let root = ScopeId::starting_id();
    assert!(root.is_starting_id());

    // The insensitive policy maps every push to the shared root.
    let insensitive = root.push((0, 1), ContextSensitivity::CallInsensitive);
    assert!(insensitive.is_starting_id());

    // Full strings grow one frame per push and never mutate the parent.
    let child = root.push((0, 1), ContextSensitivity::FullStack);
    let grandchild = child.push((1, 2), ContextSensitivity::FullStack);
    assert!(root.is_starting_id());
    assert_eq!(child.depth(), 1);
    assert_eq!(grandchild.depth(), 2);
    assert_ne!(child, grandchild);

    // k-limited strings keep the most recent k frames.
    let mut limited = ScopeId::starting_id();
    for i in 0..7 {
        limited = limited.push((i, 0), ContextSensitivity::KLimited(3));
    }
    assert_eq!(limited.depth(), 3);
    let repushed = limited.push((99, 0), ContextSensitivity::KLimited(3));
    assert_eq!(repushed.depth(), 3);
    assert_ne!(limited, repushed);
}

#[test]
fn call_graph_detects_cycles_and_orders_procedures() {
    init_logger();
    let mut program = Program::new();

    let mut a = Cfg::new("a", &[]);
    let call_b = a.add_call("b", vec![], None);
    let ret_a = a.add_return(None);
    a.add_edge(call_b, ret_a, EdgeKind::Sequential);
    a.set_entrypoint(call_b);
    let a_id = program.add_cfg(a);

    let mut b = Cfg::new("b", &[]);
    let call_a = b.add_call("a", vec![], None);
    let ret_b = b.add_return(None);
    b.add_edge(call_a, ret_b, EdgeKind::Sequential);
    b.set_entrypoint(call_a);
    let b_id = program.add_cfg(b);

    let mut main = Cfg::new("main", &[]);
    let call = main.add_call("a", vec![], None);
    let ret = main.add_return(None);
    main.add_edge(call, ret, EdgeKind::Sequential);
    main.set_entrypoint(call);
    let main_id = program.add_cfg(main);
    program.add_entrypoint(main_id);

    let graph = CallGraph::build(&program);
    assert_eq!(graph.resolve((main_id, call)), &[a_id]);
    assert_eq!(graph.resolve((a_id, call_b)), &[b_id]);

    // The pure cycle pass finds the one component {a, b}.
    let components = graph.recursion_components();
    assert_eq!(components.len(), 1);
    assert!(components[0].contains(&a_id));
    assert!(components[0].contains(&b_id));
    assert!(!components[0].contains(&main_id));

    // Callees come before callers, the cycle collapsed to one position.
    let order = graph.cycle_free_order();
    assert_eq!(order.len(), 3);
    assert_eq!(*order.last().unwrap(), main_id);

    let dot = graph.to_dot(&program);
    assert!(dot.contains("main"));
    assert!(dot.contains("a"));
}

#[test]
fn options_parse_recognized_flags_and_pass_the_rest_through() {
    let mut options = Options::default();
    let rest = options
        .parse_from_str("--widen_after 3 --context insensitive --worklist lifo -- leftover args");
    assert_eq!(options.widen_after, 3);
    assert_eq!(options.sensitivity, ContextSensitivity::CallInsensitive);
    assert_eq!(options.worklist, WorklistSelection::Lifo);
    assert_eq!(rest, vec!["leftover".to_string(), "args".to_string()]);

    let mut options = Options::default();
    let rest = options.parse_from_str("--context klimited --context_depth 2");
    assert_eq!(options.sensitivity, ContextSensitivity::KLimited(2));
    assert!(rest.is_empty());

    // Arguments not meant for the engine are returned untouched.
    let mut options = Options::default();
    let args = vec!["--bogus".to_string(), "1".to_string()];
    let rest = options.parse(&args);
    assert_eq!(rest, args);
    assert_eq!(options.widen_after, 5);
}

/// The produced artifact serializes for external reporting.
#[test]
fn results_export_as_json() {
    init_logger();
    let mut program = Program::new();
    program.add_cfg(increment_cfg());
    let (main, _, _) = main_calling("increment", Expr::int(2));
    let main_id = program.add_cfg(main);
    program.add_entrypoint(main_id);

    let mut analysis = driver(program, &Options::default());
    let results = analysis.analyze(entry_state()).expect("analysis succeeds");
    let json = results.of(main_id)[0].to_json().expect("serializes");
    assert!(json.contains("\"cfg\""));
}

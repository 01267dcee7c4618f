// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

#![allow(dead_code)]

use absint::abstract_state::{MonolithicHeap, Typeless};
use absint::analysis_state::AnalysisState;
use absint::cfg::{Cfg, EdgeKind};
use absint::expression::{BinaryOp, Expr, Identifier};
use absint::interval_domain::IntervalDomain;
use absint::lattice::Lattice;
use absint::results::CfgResults;
use absint::statement::StatementId;
use absint::value_domain::ValueEnvironment;

pub type Heap = MonolithicHeap;
pub type Values = ValueEnvironment<IntervalDomain>;
pub type Types = Typeless;
pub type State = AnalysisState<Heap, Values, Types>;
pub type Results = CfgResults<Heap, Values, Types>;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn entry_state() -> State {
    State::top()
}

pub fn interval(low: i128, high: i128) -> IntervalDomain {
    IntervalDomain::new(low, high)
}

/// The interval bound to `variable` in the state observed after executing
/// `statement`.
pub fn value_at(results: &Results, statement: StatementId, variable: &str) -> IntervalDomain {
    results
        .state_after(statement)
        .expect("statement was analyzed")
        .state
        .value
        .value_of(&Identifier::new(variable))
}

/// `f(n) { if n <= 0 { return 0 } else { t := f(n - 1); return n + t } }`
///
/// Returns the graph together with the ids of (branch, base return, call,
/// recursive return).
pub fn recursive_sum_cfg() -> (Cfg, StatementId, StatementId, StatementId, StatementId) {
    let mut f = Cfg::new("f", &["n"]);
    let branch = f.add_branch(Expr::binary(BinaryOp::Le, Expr::var("n"), Expr::int(0)));
    let base = f.add_return(Some(Expr::int(0)));
    let call = f.add_call(
        "f",
        vec![Expr::binary(BinaryOp::Sub, Expr::var("n"), Expr::int(1))],
        Some("t"),
    );
    let recursive = f.add_return(Some(Expr::binary(
        BinaryOp::Add,
        Expr::var("n"),
        Expr::var("t"),
    )));
    f.add_edge(branch, base, EdgeKind::TrueBranch);
    f.add_edge(branch, call, EdgeKind::FalseBranch);
    f.add_edge(call, recursive, EdgeKind::Sequential);
    f.set_entrypoint(branch);
    (f, branch, base, call, recursive)
}

/// `main() { r := callee(argument); return }`
pub fn main_calling(
    callee: &str,
    argument: std::rc::Rc<Expr>,
) -> (Cfg, StatementId, StatementId) {
    let mut main = Cfg::new("main", &[]);
    let call = main.add_call(callee, vec![argument], Some("r"));
    let ret = main.add_return(None);
    main.add_edge(call, ret, EdgeKind::Sequential);
    main.set_entrypoint(call);
    (main, call, ret)
}

// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.
//
// An abstract-interpretation engine over control flow graphs. Programs are
// one CFG per procedure plus a call graph linking them; the engine computes,
// for every statement, a sound over-approximation of runtime behavior in a
// pluggable lattice domain. The interprocedural driver resolves calls by
// running the intraprocedural worklist fixpoint of each callee, keyed by
// calling context, and call-graph cycles are solved without unbounded
// unrolling by a two-phase base-case/full-propagation scheme.

#[macro_use]
extern crate log;

pub mod abstract_state;
pub mod analysis_state;
pub mod call_graph;
pub mod cfg;
pub mod cfg_fixpoint;
pub mod context;
pub mod error;
pub mod expression;
pub mod fixed_point;
pub mod interprocedural;
pub mod interval_domain;
pub mod lattice;
pub mod options;
pub mod program;
pub mod recursion;
pub mod results;
pub mod statement;
pub mod statement_store;
pub mod value_domain;
pub mod worklist;

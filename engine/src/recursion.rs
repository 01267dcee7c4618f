// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::abstract_state::{HeapDomain, TypeDomain, ValueDomain};
use crate::analysis_state::AnalysisState;
use crate::cfg_fixpoint::CompoundState;
use crate::context::{CallSiteKey, ScopeId};
use crate::error::{AnalysisError, SemanticError};
use crate::interprocedural::{finish_call, CallRef, ContextBasedAnalysis, Mode};
use crate::lattice::Lattice;
use crate::program::CfgId;
use crate::results::{AnalysisResults, CfgResults};
use crate::statement::StmtKind;

use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

/// One maximal call-graph cycle, as detected before any fixpoint work: its
/// member procedures, the head procedure whose inbound call closes the
/// cycle, the call expression that entered the cycle together with its
/// context token, and a snapshot of the (post-state, intermediate states)
/// pair observed at that point. Discarded once the recursion is solved.
#[derive(Clone, Debug)]
pub struct Recursion<H, V, T> {
    pub members: BTreeSet<CfgId>,
    pub head: CfgId,
    pub invocation: CallSiteKey,
    pub invocation_token: ScopeId,
    pub entry: CompoundState<H, V, T>,
    pub returns_void: bool,
}

/// Evaluates the call that enters the recursion under the given driver:
/// the head is analyzed directly, so that the back calls *inside* the cycle
/// are the only ones intercepted by the driver's restricted role. Returns
/// the caller-side result of the call and the head's exit state.
fn evaluate_invocation<H, V, T>(
    driver: &mut ContextBasedAnalysis<H, V, T>,
    recursion: &Recursion<H, V, T>,
    use_top_entry: bool,
) -> Result<(AnalysisState<H, V, T>, AnalysisState<H, V, T>), SemanticError>
where
    H: HeapDomain,
    V: ValueDomain,
    T: TypeDomain,
{
    let (caller, statement) = recursion.invocation;
    let program = driver.program.clone();
    let site = match &program.cfg(caller).statement(statement).kind {
        StmtKind::Call(site) => site.clone(),
        kind => {
            return Err(SemanticError::UnsupportedStatement(format!(
                "recursion invoked by {:?}",
                kind
            )))
        }
    };
    let call = CallRef {
        caller,
        statement,
        site: &site,
    };
    // Phase one isolates the contribution of the base cases: the entry is
    // the top of the lattice, so that the final result only reflects the
    // paths that survive the bottom cut.
    let entry = if use_top_entry {
        AnalysisState::top()
    } else {
        recursion.entry.post_state.clone()
    };
    driver.token = recursion.invocation_token.clone();
    let child_token = driver.token.push(call.key(), driver.sensitivity);

    let callee_entry = driver.prepare_entry_state(recursion.head, &call, &entry)?;
    let results = driver.analyze_cfg(recursion.head, &child_token, callee_entry)?;
    let exit = results.exit_state(program.cfg(recursion.head))?;
    let result = finish_call(&entry, &exit, &site)?;
    Ok((result, exit))
}

/// A recursion solver that applies a single iteration of the recursion,
/// using top as entry state and resolving the call that closes the cycle to
/// bottom. Only the returns of the base cases survive, which makes its
/// result the seed of the full propagation. It exists solely to compute
/// that seed: using it as a root analysis is a configuration error.
pub struct BaseCasesFinder<H, V, T> {
    driver: ContextBasedAnalysis<H, V, T>,
    recursion: Rc<Recursion<H, V, T>>,
}

impl<H, V, T> BaseCasesFinder<H, V, T>
where
    H: HeapDomain,
    V: ValueDomain,
    T: TypeDomain,
{
    pub fn new(
        backing: &ContextBasedAnalysis<H, V, T>,
        recursion: Rc<Recursion<H, V, T>>,
    ) -> BaseCasesFinder<H, V, T> {
        let driver = backing.derived(Mode::BaseCases {
            recursion: recursion.clone(),
        });
        BaseCasesFinder { driver, recursion }
    }

    /// Always fails: this driver cannot be used as a root analysis.
    pub fn analyze(
        &mut self,
        entry_state: AnalysisState<H, V, T>,
    ) -> Result<AnalysisResults<H, V, T>, AnalysisError> {
        self.driver.analyze(entry_state)
    }

    /// Solves the base cases by iterating once from bottom: the post-state
    /// of the call that starts the recursion, with every path through the
    /// cut edge annihilated.
    pub fn find(&mut self) -> Result<AnalysisState<H, V, T>, SemanticError> {
        let recursion = self.recursion.clone();
        let (result, _) = evaluate_invocation(&mut self.driver, &recursion, true)?;
        Ok(result)
    }

    fn find_exit(&mut self) -> Result<AnalysisState<H, V, T>, SemanticError> {
        let recursion = self.recursion.clone();
        let (_, exit) = evaluate_invocation(&mut self.driver, &recursion, true)?;
        Ok(exit)
    }
}

type StoredResults<H, V, T> = HashMap<(CfgId, ScopeId), Rc<CfgResults<H, V, T>>>;

/// Solves one recursion in two phases. Phase one computes the base-case
/// seed with a `BaseCasesFinder`; phase two iterates the ordinary
/// interprocedural fixpoint over the cycle, with back calls resolving to
/// the current approximation of the head's exit state, joined under the
/// same lub-then-widen policy as intraprocedural nodes, until `new <= old`.
/// Returns the caller-side result of the invocation, plus the per-statement
/// results to be stored for the cycle members.
pub(crate) fn solve<H, V, T>(
    backing: &ContextBasedAnalysis<H, V, T>,
    recursion: Rc<Recursion<H, V, T>>,
) -> Result<(AnalysisState<H, V, T>, StoredResults<H, V, T>), SemanticError>
where
    H: HeapDomain,
    V: ValueDomain,
    T: TypeDomain,
{
    // Phase one must fully converge before phase two starts: its result is
    // the seed of the propagation.
    let mut finder = BaseCasesFinder::new(backing, recursion.clone());
    let mut approx = finder.find_exit()?;
    debug!("base cases of {:?} computed", backing.program.cfg(recursion.head));

    let mut counter = backing.widen_after as i64;
    loop {
        let mut unroller = backing.derived(Mode::Unrolling {
            recursion: recursion.clone(),
            head_approx: approx.clone(),
        });
        let (_, new_exit) = evaluate_invocation(&mut unroller, &recursion, false)?;
        let joined = if backing.widen_after == 0 || counter > 0 {
            approx.lub(&new_exit)?
        } else {
            approx.widening(&new_exit)?
        };
        counter -= 1;
        let stable = joined.less_or_equal(&approx)?;
        approx = joined;
        if stable {
            break;
        }
    }

    // One more pass under the converged approximation, this time recording
    // the per-statement results of every member.
    let mut recorder = backing.derived(Mode::Unrolling {
        recursion: recursion.clone(),
        head_approx: approx,
    });
    recorder.store_results = true;
    let (result, _) = evaluate_invocation(&mut recorder, &recursion, false)?;
    Ok((result, recorder.results))
}

// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::abstract_state::{HeapDomain, TypeDomain, ValueDomain};
use crate::analysis_state::AnalysisState;
use crate::call_graph::CallGraph;
use crate::cfg_fixpoint::CompoundState;
use crate::context::{CallSiteKey, ContextSensitivity, ScopeId};
use crate::error::{AnalysisError, SemanticError};
use crate::expression::{ExpressionSet, Identifier};
use crate::lattice::Lattice;
use crate::options::Options;
use crate::program::{CfgId, Program};
use crate::recursion::{self, Recursion};
use crate::results::{AnalysisResults, CfgResults};
use crate::statement::{CallSite, StatementId};
use crate::statement_store::StatementStore;

use std::collections::{BTreeSet, HashMap};
use std::fmt::Debug;
use std::rc::Rc;

/// One call statement as seen by the interprocedural layer.
#[derive(Debug)]
pub struct CallRef<'a> {
    pub caller: CfgId,
    pub statement: StatementId,
    pub site: &'a CallSite,
}

impl<'a> CallRef<'a> {
    pub fn key(&self) -> CallSiteKey {
        (self.caller, self.statement)
    }
}

/// The capability the intraprocedural fixpoint relies on to resolve call
/// statements: produce the abstract result of a call, given the state the
/// call is evaluated in, the expression sets of its actual parameters, and
/// the intermediate states computed so far for the enclosing statement.
pub trait InterproceduralAnalysis<H, V, T> {
    fn get_abstract_result_of(
        &mut self,
        call: &CallRef<'_>,
        entry_state: &AnalysisState<H, V, T>,
        parameters: &[ExpressionSet],
        intermediate_states: &StatementStore<H, V, T>,
    ) -> Result<AnalysisState<H, V, T>, SemanticError>;
}

/// What to do with a call whose target is not a registered procedure.
pub trait OpenCallPolicy<H, V, T>: Debug {
    fn resolve(
        &self,
        call: &CallRef<'_>,
        entry_state: &AnalysisState<H, V, T>,
    ) -> Result<AnalysisState<H, V, T>, SemanticError>;
}

/// The conservative policy: the callee may have done anything, so the call's
/// value is unconstrained.
#[derive(Clone, Copy, Debug, Default)]
pub struct WorstCaseOpenCall;

impl<H: HeapDomain, V: ValueDomain, T: TypeDomain> OpenCallPolicy<H, V, T> for WorstCaseOpenCall {
    fn resolve(
        &self,
        call: &CallRef<'_>,
        entry_state: &AnalysisState<H, V, T>,
    ) -> Result<AnalysisState<H, V, T>, SemanticError> {
        let meta = &call.site.meta_variable;
        let state = entry_state.forget_identifiers(std::slice::from_ref(meta))?;
        if call.site.uses_result() {
            Ok(state.with_computed(ExpressionSet::singleton(Rc::new(
                crate::expression::Expr::Variable(meta.clone()),
            ))))
        } else {
            Ok(state.with_computed(ExpressionSet::empty()))
        }
    }
}

/// The strict policy: open calls are configuration errors.
#[derive(Clone, Copy, Debug, Default)]
pub struct FailOnOpenCall;

impl<H: HeapDomain, V: ValueDomain, T: TypeDomain> OpenCallPolicy<H, V, T> for FailOnOpenCall {
    fn resolve(
        &self,
        call: &CallRef<'_>,
        _entry_state: &AnalysisState<H, V, T>,
    ) -> Result<AnalysisState<H, V, T>, SemanticError> {
        Err(SemanticError::CannotEvaluate(format!(
            "call to unresolved procedure '{}'",
            call.site.callee
        )))
    }
}

/// The degenerate interprocedural collaborator: every call is treated as an
/// open call under the worst-case policy. Useful to run a single procedure's
/// fixpoint in isolation.
#[derive(Clone, Copy, Debug, Default)]
pub struct WorstCaseAnalysis;

impl<H: HeapDomain, V: ValueDomain, T: TypeDomain> InterproceduralAnalysis<H, V, T>
    for WorstCaseAnalysis
{
    fn get_abstract_result_of(
        &mut self,
        call: &CallRef<'_>,
        entry_state: &AnalysisState<H, V, T>,
        _parameters: &[ExpressionSet],
        _intermediate_states: &StatementStore<H, V, T>,
    ) -> Result<AnalysisState<H, V, T>, SemanticError> {
        WorstCaseOpenCall.resolve(call, entry_state)
    }
}

/// The role a context-based driver is currently playing. The restricted
/// roles replace what would otherwise be an inheritance hierarchy: they
/// flip the shortcutting, recursion-detection and result-storing hooks, and
/// intercept the calls that close a recursion cycle.
#[derive(Clone, Debug)]
pub(crate) enum Mode<H, V, T> {
    /// Ordinary top-level analysis.
    Root,
    /// Phase one of recursion solving: calls back to the recursion head
    /// contribute bottom, isolating the base cases.
    BaseCases { recursion: Rc<Recursion<H, V, T>> },
    /// Phase two: calls back to the recursion head resolve to the current
    /// approximation of the head's result.
    Unrolling {
        recursion: Rc<Recursion<H, V, T>>,
        head_approx: AnalysisState<H, V, T>,
    },
}

/// The interprocedural driver: resolves calls by running (or reusing) the
/// intraprocedural fixpoint of each candidate target, keyed by calling
/// context. All caches and counters live in the driver instance, so
/// independent runs never interfere.
pub struct ContextBasedAnalysis<H, V, T> {
    pub(crate) program: Rc<Program>,
    pub(crate) call_graph: Rc<CallGraph>,
    pub(crate) components: Rc<Vec<BTreeSet<CfgId>>>,
    pub(crate) sensitivity: ContextSensitivity,
    pub(crate) widen_after: usize,
    pub(crate) worklist: crate::options::WorklistSelection,
    pub(crate) open_call: Rc<dyn OpenCallPolicy<H, V, T>>,
    pub(crate) results: HashMap<(CfgId, ScopeId), Rc<CfgResults<H, V, T>>>,
    pub(crate) token: ScopeId,
    pub(crate) active: Vec<(CfgId, ScopeId)>,
    pub(crate) mode: Mode<H, V, T>,
    pub(crate) store_results: bool,
}

impl<H, V, T> ContextBasedAnalysis<H, V, T>
where
    H: HeapDomain,
    V: ValueDomain,
    T: TypeDomain,
{
    /// Builds a root driver over the given program. The call graph and its
    /// cycles are computed here, before any fixpoint work.
    pub fn new(
        program: Program,
        options: &Options,
        open_call: Rc<dyn OpenCallPolicy<H, V, T>>,
    ) -> ContextBasedAnalysis<H, V, T> {
        let call_graph = CallGraph::build(&program);
        let components = call_graph.recursion_components();
        debug!(
            "{} recursion component(s) in the call graph",
            components.len()
        );
        ContextBasedAnalysis {
            program: Rc::new(program),
            call_graph: Rc::new(call_graph),
            components: Rc::new(components),
            sensitivity: options.sensitivity,
            widen_after: options.widen_after,
            worklist: options.worklist,
            open_call,
            results: HashMap::new(),
            token: ScopeId::starting_id(),
            active: Vec::new(),
            mode: Mode::Root,
            store_results: true,
        }
    }

    /// A driver sharing this one's program, graphs, configuration and
    /// stable results, but playing a different role. Restricted roles do
    /// not store what they compute.
    pub(crate) fn derived(&self, mode: Mode<H, V, T>) -> ContextBasedAnalysis<H, V, T> {
        ContextBasedAnalysis {
            program: self.program.clone(),
            call_graph: self.call_graph.clone(),
            components: self.components.clone(),
            sensitivity: self.sensitivity,
            widen_after: self.widen_after,
            worklist: self.worklist,
            open_call: self.open_call.clone(),
            results: self.results.clone(),
            token: self.token.clone(),
            active: Vec::new(),
            mode,
            store_results: false,
        }
    }

    /// Whether a cached stable result may be reused for `cfg` instead of
    /// recomputing it. Disabled for cycle members while solving their
    /// recursion, which must be re-evaluated afresh to propagate around the
    /// cycle.
    fn can_shortcut(&self, cfg: CfgId) -> bool {
        match &self.mode {
            Mode::Root => true,
            Mode::BaseCases { recursion } | Mode::Unrolling { recursion, .. } => {
                !recursion.members.contains(&cfg)
            }
        }
    }

    fn should_check_for_recursions(&self) -> bool {
        matches!(self.mode, Mode::Root)
    }

    fn component_of(&self, cfg: CfgId) -> Option<&BTreeSet<CfgId>> {
        self.components.iter().find(|c| c.contains(&cfg))
    }

    /// Runs the whole analysis: every program entrypoint is analyzed under
    /// the root token with the given entry state, and every (procedure,
    /// context) pair reached along the way lands in the returned artifact.
    pub fn analyze(
        &mut self,
        entry_state: AnalysisState<H, V, T>,
    ) -> Result<AnalysisResults<H, V, T>, AnalysisError> {
        if !matches!(self.mode, Mode::Root) {
            return Err(AnalysisError::RestrictedDriver);
        }
        self.program.validate()?;
        let roots = self.program.entrypoints().to_vec();
        for root in roots {
            info!("analyzing root procedure {:?}", self.program.cfg(root));
            self.analyze_cfg(root, &ScopeId::starting_id(), entry_state.clone())?;
        }
        Ok(AnalysisResults::new(self.results.clone()))
    }

    /// Computes (or reuses) the fixpoint of one procedure under one token.
    pub(crate) fn analyze_cfg(
        &mut self,
        cfg_id: CfgId,
        token: &ScopeId,
        entry_state: AnalysisState<H, V, T>,
    ) -> Result<Rc<CfgResults<H, V, T>>, SemanticError> {
        let key = (cfg_id, token.clone());
        if self.can_shortcut(cfg_id) {
            if let Some(cached) = self.results.get(&key) {
                trace!("reusing stable result of {:?}", self.program.cfg(cfg_id));
                return Ok(cached.clone());
            }
        }
        if self.active.contains(&key) {
            return Err(SemanticError::UnsupportedRecursion(
                self.program.cfg(cfg_id).name().to_string(),
            ));
        }
        self.active.push(key.clone());
        let saved_token = std::mem::replace(&mut self.token, token.clone());

        let program = self.program.clone();
        let cfg = program.cfg(cfg_id);
        let mut ws = self.worklist.make();
        let widen_after = self.widen_after;
        let outcome = cfg.fixpoint(cfg_id, entry_state, self, ws.as_mut(), widen_after);

        self.token = saved_token;
        self.active.pop();

        let results = Rc::new(
            outcome.map_err(|e| SemanticError::NestedFixpoint(e.to_string()))?,
        );
        if self.store_results {
            self.results.insert(key, results.clone());
        }
        Ok(results)
    }

    /// Builds the entry state of a callee frame: every actual parameter is
    /// evaluated in the caller's state and bound to the corresponding
    /// formal; everything else starts unconstrained.
    pub(crate) fn prepare_entry_state(
        &self,
        target: CfgId,
        call: &CallRef<'_>,
        entry_state: &AnalysisState<H, V, T>,
    ) -> Result<AnalysisState<H, V, T>, SemanticError> {
        let callee = self.program.cfg(target);
        let mut staging = entry_state.clone();
        for (i, argument) in call.site.arguments.iter().enumerate() {
            staging = staging.assign(&Identifier::argument_slot(i), argument)?;
        }
        if callee.formals().len() != call.site.arguments.len() {
            warn!(
                "arity mismatch calling {}: {} formals, {} actuals",
                call.site.callee,
                callee.formals().len(),
                call.site.arguments.len()
            );
        }
        let mut entry = AnalysisState::top();
        for (i, formal) in callee.formals().iter().enumerate() {
            if i < call.site.arguments.len() {
                entry = entry.import(&staging, &Identifier::argument_slot(i), formal)?;
            }
        }
        Ok(entry)
    }

    /// Analyzes one resolved call target and converts its exit state into
    /// the caller-side result of the call.
    fn analyze_call_target(
        &mut self,
        target: CfgId,
        token: &ScopeId,
        call: &CallRef<'_>,
        entry_state: &AnalysisState<H, V, T>,
    ) -> Result<AnalysisState<H, V, T>, SemanticError> {
        let callee_entry = self.prepare_entry_state(target, call, entry_state)?;
        let results = self.analyze_cfg(target, token, callee_entry)?;
        let program = self.program.clone();
        let exit = results.exit_state(program.cfg(target))?;
        finish_call(entry_state, &exit, call.site)
    }

    fn solve_recursion(
        &mut self,
        call: &CallRef<'_>,
        head: CfgId,
        entry_state: &AnalysisState<H, V, T>,
        intermediate_states: &StatementStore<H, V, T>,
    ) -> Result<AnalysisState<H, V, T>, SemanticError> {
        let members = self
            .component_of(head)
            .cloned()
            .expect("solve_recursion is only invoked for cycle members");
        info!(
            "solving recursion with head {:?} and {} member(s)",
            self.program.cfg(head),
            members.len()
        );
        let recursion = Rc::new(Recursion {
            members,
            head,
            invocation: call.key(),
            invocation_token: self.token.clone(),
            entry: CompoundState {
                post_state: entry_state.clone(),
                intermediate_states: intermediate_states.clone(),
            },
            returns_void: !self.program.cfg(head).returns_value(),
        });
        let (result, stored) = recursion::solve(self, recursion)?;
        if self.store_results {
            self.results.extend(stored);
        }
        Ok(result)
    }
}

/// Converts a callee exit state (or an exit-like approximation) into the
/// caller-side result of the call: the caller's state, with the returned
/// value moved into the call's meta variable. A bottom exit means the call
/// never returns, which annihilates the calling path.
pub(crate) fn finish_call<H: HeapDomain, V: ValueDomain, T: TypeDomain>(
    entry_state: &AnalysisState<H, V, T>,
    exit_state: &AnalysisState<H, V, T>,
    site: &CallSite,
) -> Result<AnalysisState<H, V, T>, SemanticError> {
    if exit_state.is_bottom() {
        return Ok(AnalysisState::bottom());
    }
    let meta = &site.meta_variable;
    if site.uses_result() {
        let result = entry_state.import(exit_state, &Identifier::return_slot(), meta)?;
        Ok(result.with_computed(ExpressionSet::singleton(Rc::new(
            crate::expression::Expr::Variable(meta.clone()),
        ))))
    } else {
        Ok(entry_state.with_computed(ExpressionSet::empty()))
    }
}

impl<H, V, T> InterproceduralAnalysis<H, V, T> for ContextBasedAnalysis<H, V, T>
where
    H: HeapDomain,
    V: ValueDomain,
    T: TypeDomain,
{
    fn get_abstract_result_of(
        &mut self,
        call: &CallRef<'_>,
        entry_state: &AnalysisState<H, V, T>,
        _parameters: &[ExpressionSet],
        intermediate_states: &StatementStore<H, V, T>,
    ) -> Result<AnalysisState<H, V, T>, SemanticError> {
        let call_key = call.key();

        // Calls closing a recursion cycle never reach the ordinary
        // resolution below: their value is dictated by the solving phase.
        match &self.mode {
            Mode::BaseCases { recursion } => {
                if recursion.members.contains(&call.caller)
                    && self.call_graph.resolve(call_key).contains(&recursion.head)
                {
                    trace!("cutting back call {} to bottom", call.site.callee);
                    return Ok(if recursion.returns_void {
                        AnalysisState::bottom()
                    } else {
                        AnalysisState::bottom_keeping(&call.site.meta_variable)
                    });
                }
            }
            Mode::Unrolling {
                recursion,
                head_approx,
            } => {
                if recursion.members.contains(&call.caller)
                    && self.call_graph.resolve(call_key).contains(&recursion.head)
                {
                    trace!(
                        "resolving back call {} to the current approximation",
                        call.site.callee
                    );
                    let head_approx = head_approx.clone();
                    return finish_call(entry_state, &head_approx, call.site);
                }
            }
            Mode::Root => {}
        }

        let targets = self.call_graph.resolve(call_key).to_vec();
        if targets.is_empty() {
            debug!("open call to '{}'", call.site.callee);
            let policy = self.open_call.clone();
            return policy.resolve(call, entry_state);
        }

        let child_token = self.token.push(call_key, self.sensitivity);
        let mut result: Option<AnalysisState<H, V, T>> = None;
        for target in targets {
            let state = if self.should_check_for_recursions()
                && self.component_of(target).is_some()
            {
                self.solve_recursion(call, target, entry_state, intermediate_states)?
            } else {
                self.analyze_call_target(target, &child_token, call, entry_state)?
            };
            result = Some(match result {
                None => state,
                Some(previous) => previous.lub(&state)?,
            });
        }
        Ok(result.expect("at least one call target was analyzed"))
    }
}

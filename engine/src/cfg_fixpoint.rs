// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::abstract_state::{HeapDomain, TypeDomain, ValueDomain};
use crate::analysis_state::AnalysisState;
use crate::cfg::{Cfg, Edge, EdgeKind};
use crate::error::{AnalysisError, SemanticError};
use crate::expression::{Expr, ExpressionSet, Identifier};
use crate::fixed_point::{Fixpoint, FixpointImplementation};
use crate::interprocedural::{CallRef, InterproceduralAnalysis};
use crate::lattice::Lattice;
use crate::program::CfgId;
use crate::results::CfgResults;
use crate::statement::{StatementId, StmtKind};
use crate::statement_store::StatementStore;
use crate::worklist::WorkingSet;

use std::collections::HashMap;

/// What the fixpoint tracks per statement: the post-state of the statement
/// itself, plus the intermediate states remembered while evaluating it.
#[derive(Clone, Debug, PartialEq)]
pub struct CompoundState<H, V, T> {
    pub post_state: AnalysisState<H, V, T>,
    pub intermediate_states: StatementStore<H, V, T>,
}

impl<H: HeapDomain, V: ValueDomain, T: TypeDomain> CompoundState<H, V, T> {
    pub fn of(post_state: AnalysisState<H, V, T>) -> CompoundState<H, V, T> {
        CompoundState {
            post_state,
            intermediate_states: StatementStore::bottom(),
        }
    }
}

/// The CFG instantiation of the generic fixpoint: statement transfer
/// functions, edge traversal with scope pruning, lub-only unions, and the
/// lub-then-widen join discipline.
struct CfgFixpoint<'a, H, V, T, I> {
    cfg: &'a Cfg,
    caller: CfgId,
    interprocedural: &'a mut I,
    widen_after: usize,
    // Decremented on every join of the node; once exhausted, joins widen.
    lubs: HashMap<StatementId, i64>,
    _markers: std::marker::PhantomData<(H, V, T)>,
}

impl<'a, H, V, T, I> CfgFixpoint<'a, H, V, T, I>
where
    H: HeapDomain,
    V: ValueDomain,
    T: TypeDomain,
    I: InterproceduralAnalysis<H, V, T>,
{
    fn new(
        cfg: &'a Cfg,
        caller: CfgId,
        interprocedural: &'a mut I,
        widen_after: usize,
    ) -> CfgFixpoint<'a, H, V, T, I> {
        CfgFixpoint {
            cfg,
            caller,
            interprocedural,
            widen_after,
            lubs: HashMap::new(),
            _markers: std::marker::PhantomData,
        }
    }

    fn statement_semantics(
        &mut self,
        node: StatementId,
        state: &AnalysisState<H, V, T>,
        store: &mut StatementStore<H, V, T>,
    ) -> Result<AnalysisState<H, V, T>, SemanticError> {
        match &self.cfg.statement(node).kind {
            StmtKind::Skip => Ok(state.with_computed(ExpressionSet::empty())),
            StmtKind::Assign { target, value } => state.assign(target, value),
            StmtKind::Branch { condition } => state.smallstep(condition),
            StmtKind::Return { value: Some(value) } => {
                state.assign(&Identifier::return_slot(), value)
            }
            StmtKind::Return { value: None } => Ok(state.with_computed(ExpressionSet::empty())),
            StmtKind::Call(site) => {
                let parameters: Vec<ExpressionSet> = site
                    .arguments
                    .iter()
                    .map(|argument| ExpressionSet::singleton(argument.clone()))
                    .collect();
                let arguments = parameters
                    .iter()
                    .fold(ExpressionSet::empty(), |acc, p| acc.lub(p));
                store.put(node, state.with_computed(arguments));

                let call = CallRef {
                    caller: self.caller,
                    statement: node,
                    site,
                };
                let mut post = self
                    .interprocedural
                    .get_abstract_result_of(&call, state, &parameters, store)?;
                if let Some(target) = &site.assign_to {
                    post = post.assign(target, &Expr::Variable(site.meta_variable.clone()))?;
                    post = post
                        .forget_identifiers(std::slice::from_ref(&site.meta_variable))?;
                }
                Ok(post)
            }
        }
    }
}

impl<'a, H, V, T, I> FixpointImplementation<CompoundState<H, V, T>> for CfgFixpoint<'a, H, V, T, I>
where
    H: HeapDomain,
    V: ValueDomain,
    T: TypeDomain,
    I: InterproceduralAnalysis<H, V, T>,
{
    fn semantics(
        &mut self,
        node: StatementId,
        entry: &CompoundState<H, V, T>,
    ) -> Result<CompoundState<H, V, T>, SemanticError> {
        let mut intermediate_states = StatementStore::bottom();
        let post_state =
            self.statement_semantics(node, &entry.post_state, &mut intermediate_states)?;
        Ok(CompoundState {
            post_state,
            intermediate_states,
        })
    }

    fn traverse(
        &mut self,
        edge: &Edge,
        state: &CompoundState<H, V, T>,
    ) -> Result<CompoundState<H, V, T>, SemanticError> {
        let mut post_state = state.post_state.clone();
        match edge.kind {
            EdgeKind::Sequential => {}
            EdgeKind::TrueBranch | EdgeKind::FalseBranch => {
                let condition = match &self.cfg.statement(edge.source).kind {
                    StmtKind::Branch { condition } => condition.clone(),
                    kind => {
                        return Err(SemanticError::UnsupportedStatement(format!(
                            "conditional edge leaving {:?}",
                            kind
                        )))
                    }
                };
                post_state = post_state.assume(&condition, edge.kind == EdgeKind::TrueBranch)?;
            }
        }

        // Identifiers whose scope ends at the source of this edge stop being
        // tracked here, bounding the set of live identifiers.
        let ending = self.cfg.out_of_scope_at(edge.source);
        if !ending.is_empty() {
            post_state = post_state.forget_identifiers(&ending)?;
        }

        Ok(CompoundState::of(post_state))
    }

    fn union(
        &mut self,
        _node: StatementId,
        left: &CompoundState<H, V, T>,
        right: &CompoundState<H, V, T>,
    ) -> Result<CompoundState<H, V, T>, SemanticError> {
        Ok(CompoundState {
            post_state: left.post_state.lub(&right.post_state)?,
            intermediate_states: left.intermediate_states.lub(&right.intermediate_states)?,
        })
    }

    fn join(
        &mut self,
        node: StatementId,
        approx: CompoundState<H, V, T>,
        old: &CompoundState<H, V, T>,
    ) -> Result<CompoundState<H, V, T>, SemanticError> {
        if self.widen_after == 0 {
            return Ok(CompoundState {
                post_state: approx.post_state.lub(&old.post_state)?,
                intermediate_states: approx
                    .intermediate_states
                    .lub(&old.intermediate_states)?,
            });
        }
        // The threshold is scaled by the number of predecessors, since a
        // merge-heavy node reaches it faster.
        let widen_after = self.widen_after;
        let cfg = self.cfg;
        let counter = self
            .lubs
            .entry(node)
            .or_insert_with(|| (widen_after * cfg.predecessor_count(node)) as i64);
        let joined = if *counter > 0 {
            CompoundState {
                post_state: approx.post_state.lub(&old.post_state)?,
                intermediate_states: approx
                    .intermediate_states
                    .lub(&old.intermediate_states)?,
            }
        } else {
            CompoundState {
                post_state: old.post_state.widening(&approx.post_state)?,
                intermediate_states: old
                    .intermediate_states
                    .widening(&approx.intermediate_states)?,
            }
        };
        *counter -= 1;
        Ok(joined)
    }

    fn equality(
        &mut self,
        _node: StatementId,
        approx: &CompoundState<H, V, T>,
        old: &CompoundState<H, V, T>,
    ) -> Result<bool, SemanticError> {
        Ok(approx.post_state.less_or_equal(&old.post_state)?
            && approx
                .intermediate_states
                .less_or_equal(&old.intermediate_states)?)
    }
}

impl Cfg {
    /// Computes a fixpoint over this graph, applying `entry_state` to every
    /// entrypoint. Results at different iterations of one statement are
    /// combined with lub up to `widen_after * predecessor_count` times, then
    /// with widening; `widen_after == 0` always uses lub. `interprocedural`
    /// is queried for the approximation of every invoked procedure, and
    /// `ws` dictates the processing order.
    pub fn fixpoint<H, V, T, I>(
        &self,
        cfg_id: CfgId,
        entry_state: AnalysisState<H, V, T>,
        interprocedural: &mut I,
        ws: &mut dyn WorkingSet,
        widen_after: usize,
    ) -> Result<CfgResults<H, V, T>, AnalysisError>
    where
        H: HeapDomain,
        V: ValueDomain,
        T: TypeDomain,
        I: InterproceduralAnalysis<H, V, T>,
    {
        let starting: HashMap<StatementId, AnalysisState<H, V, T>> = self
            .entrypoints()
            .iter()
            .map(|entry| (*entry, entry_state.clone()))
            .collect();
        self.fixpoint_from(cfg_id, starting, interprocedural, ws, widen_after)
    }

    /// As `fixpoint`, but with one initial state per entry statement.
    pub fn fixpoint_from<H, V, T, I>(
        &self,
        cfg_id: CfgId,
        starting: HashMap<StatementId, AnalysisState<H, V, T>>,
        interprocedural: &mut I,
        ws: &mut dyn WorkingSet,
        widen_after: usize,
    ) -> Result<CfgResults<H, V, T>, AnalysisError>
    where
        H: HeapDomain,
        V: ValueDomain,
        T: TypeDomain,
        I: InterproceduralAnalysis<H, V, T>,
    {
        self.validate()?;
        let starting: HashMap<StatementId, CompoundState<H, V, T>> = starting
            .into_iter()
            .map(|(id, state)| (id, CompoundState::of(state)))
            .collect();
        let mut implementation = CfgFixpoint::new(self, cfg_id, interprocedural, widen_after);
        let fixpoint = Fixpoint::new(self).fixpoint(&starting, ws, &mut implementation)?;
        Ok(CfgResults::assemble(cfg_id, fixpoint))
    }
}

// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::abstract_state::{HeapDomain, TypeDomain, ValueDomain};
use crate::analysis_state::AnalysisState;
use crate::cfg::Cfg;
use crate::cfg_fixpoint::CompoundState;
use crate::context::ScopeId;
use crate::error::SemanticError;
use crate::lattice::Lattice;
use crate::program::CfgId;
use crate::statement::StatementId;

use serde::Serialize;
use std::collections::HashMap;
use std::rc::Rc;

/// The artifact an analysis produces for one procedure: a control flow
/// graph together with the converged analysis state of every statement,
/// including the intermediate states its sub-expressions were evaluated in.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct CfgResults<H, V, T> {
    pub cfg: CfgId,
    results: HashMap<StatementId, AnalysisState<H, V, T>>,
}

impl<H: HeapDomain, V: ValueDomain, T: TypeDomain> CfgResults<H, V, T> {
    /// Flattens a converged fixpoint into the per-statement map: every
    /// intermediate entry first, then each statement's own post-state, which
    /// wins over an intermediate entry recorded at the same statement.
    pub fn assemble(
        cfg: CfgId,
        fixpoint: HashMap<StatementId, CompoundState<H, V, T>>,
    ) -> CfgResults<H, V, T> {
        let mut results = HashMap::with_capacity(fixpoint.len());
        for compound in fixpoint.values() {
            for (id, state) in compound.intermediate_states.iter() {
                results.insert(*id, state.clone());
            }
        }
        for (id, compound) in &fixpoint {
            results.insert(*id, compound.post_state.clone());
        }
        CfgResults { cfg, results }
    }

    /// The converged state observed after executing the given statement.
    pub fn state_after(&self, id: StatementId) -> Option<&AnalysisState<H, V, T>> {
        self.results.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StatementId, &AnalysisState<H, V, T>)> + '_ {
        self.results.iter()
    }

    /// The join of the states at every exitpoint of `cfg`: what a caller of
    /// this procedure observes. Bottom when no exit is reachable.
    pub fn exit_state(&self, cfg: &Cfg) -> Result<AnalysisState<H, V, T>, SemanticError> {
        let mut exit = AnalysisState::bottom();
        for statement in cfg.exitpoints() {
            if let Some(state) = self.results.get(&statement.id) {
                exit = exit.lub(state)?;
            }
        }
        Ok(exit)
    }
}

impl<H, V, T> CfgResults<H, V, T>
where
    H: HeapDomain + Serialize,
    V: ValueDomain + Serialize,
    T: TypeDomain + Serialize,
{
    /// Serializes the artifact for external reporting and visualization.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Everything a whole-program analysis produced: one `CfgResults` per
/// (procedure, calling context) pair that was reached.
#[derive(Clone, Debug)]
pub struct AnalysisResults<H, V, T> {
    map: HashMap<(CfgId, ScopeId), Rc<CfgResults<H, V, T>>>,
}

impl<H: HeapDomain, V: ValueDomain, T: TypeDomain> AnalysisResults<H, V, T> {
    pub(crate) fn new(
        map: HashMap<(CfgId, ScopeId), Rc<CfgResults<H, V, T>>>,
    ) -> AnalysisResults<H, V, T> {
        AnalysisResults { map }
    }

    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (&(CfgId, ScopeId), &Rc<CfgResults<H, V, T>>)> + '_ {
        self.map.iter()
    }

    /// The results computed for one procedure, one entry per context it was
    /// analyzed under.
    pub fn of(&self, cfg: CfgId) -> Vec<&Rc<CfgResults<H, V, T>>> {
        self.map
            .iter()
            .filter(|((id, _), _)| *id == cfg)
            .map(|(_, results)| results)
            .collect()
    }

    pub fn at(&self, cfg: CfgId, token: &ScopeId) -> Option<&Rc<CfgResults<H, V, T>>> {
        self.map.get(&(cfg, token.clone()))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::abstract_state::{HeapDomain, TypeDomain, ValueDomain};
use crate::analysis_state::AnalysisState;
use crate::error::SemanticError;
use crate::lattice::Lattice;
use crate::statement::StatementId;

use rpds::HashTrieMap;
use serde::{Deserialize, Serialize};

/// The intermediate states remembered while evaluating one statement: a
/// functional lifting of `AnalysisState` keyed by statement. A statement
/// absent from the store contributed bottom, so joins keep one-sided
/// entries as they are.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StatementStore<H, V, T> {
    map: HashTrieMap<StatementId, AnalysisState<H, V, T>>,
}

impl<H: HeapDomain, V: ValueDomain, T: TypeDomain> StatementStore<H, V, T> {
    pub fn put(&mut self, id: StatementId, state: AnalysisState<H, V, T>) {
        self.map.insert_mut(id, state);
    }

    pub fn state_of(&self, id: StatementId) -> Option<&AnalysisState<H, V, T>> {
        self.map.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StatementId, &AnalysisState<H, V, T>)> + '_ {
        self.map.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<H: HeapDomain, V: ValueDomain, T: TypeDomain> Lattice for StatementStore<H, V, T> {
    fn bottom() -> Self {
        StatementStore {
            map: HashTrieMap::new(),
        }
    }

    fn top() -> Self {
        // The store is only ever populated pointwise; its nominal top is
        // never materialized by the engine.
        StatementStore {
            map: HashTrieMap::new(),
        }
    }

    fn is_bottom(&self) -> bool {
        self.map.is_empty()
    }

    fn is_top(&self) -> bool {
        false
    }

    fn lub(&self, other: &Self) -> Result<Self, SemanticError> {
        let mut map = self.map.clone();
        for (id, right) in other.map.iter() {
            let merged = match self.map.get(id) {
                Some(left) => left.lub(right)?,
                None => right.clone(),
            };
            map.insert_mut(*id, merged);
        }
        Ok(StatementStore { map })
    }

    fn widening(&self, other: &Self) -> Result<Self, SemanticError> {
        let mut map = self.map.clone();
        for (id, right) in other.map.iter() {
            let merged = match self.map.get(id) {
                Some(left) => left.widening(right)?,
                None => right.clone(),
            };
            map.insert_mut(*id, merged);
        }
        Ok(StatementStore { map })
    }

    fn less_or_equal(&self, other: &Self) -> Result<bool, SemanticError> {
        for (id, left) in self.map.iter() {
            match other.map.get(id) {
                Some(right) => {
                    if !left.less_or_equal(right)? {
                        return Ok(false);
                    }
                }
                None => {
                    if !left.is_bottom() {
                        return Ok(false);
                    }
                }
            }
        }
        Ok(true)
    }
}

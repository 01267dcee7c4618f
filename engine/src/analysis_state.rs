// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::abstract_state::{HeapDomain, ProductState, SemanticDomain, TypeDomain, ValueDomain};
use crate::error::SemanticError;
use crate::expression::{Expr, ExpressionSet, Identifier};
use crate::lattice::Lattice;

use rpds::{HashTrieMap, HashTrieSet};
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Must-alias metadata: for each identifier, the set of identifiers it is
/// known to alias through direct copies. Merging paths intersects the sets,
/// since an alias is only a must-alias if it holds on every path.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AliasingInfo {
    map: HashTrieMap<Identifier, HashTrieSet<Identifier>>,
    unreachable: bool,
}

impl AliasingInfo {
    pub fn aliases_of(&self, id: &Identifier) -> HashTrieSet<Identifier> {
        self.map.get(id).cloned().unwrap_or_default()
    }

    /// Removes `id` both as a key and from every alias set.
    fn drop_identifier(&self, id: &Identifier) -> AliasingInfo {
        let mut map = self.map.remove(id);
        let stale: Vec<Identifier> = map
            .iter()
            .filter(|(_, set)| set.contains(id))
            .map(|(k, _)| k.clone())
            .collect();
        for key in stale {
            let set = map.get(&key).expect("key was just listed").remove(id);
            if set.is_empty() {
                map.remove_mut(&key);
            } else {
                map.insert_mut(key, set);
            }
        }
        AliasingInfo {
            map,
            unreachable: self.unreachable,
        }
    }

    pub fn assign(&self, id: &Identifier, expr: &Expr) -> AliasingInfo {
        if self.unreachable {
            return self.clone();
        }
        let cleared = self.drop_identifier(id);
        match expr {
            Expr::Variable(source) if source != id => {
                let mut set = cleared.aliases_of(source);
                set.insert_mut(source.clone());
                AliasingInfo {
                    map: cleared.map.insert(id.clone(), set),
                    unreachable: false,
                }
            }
            _ => cleared,
        }
    }

    pub fn forget_identifiers(&self, ids: &[Identifier]) -> AliasingInfo {
        let mut result = self.clone();
        for id in ids {
            result = result.drop_identifier(id);
        }
        result
    }

    pub fn rename(&self, from: &Identifier, to: &Identifier) -> AliasingInfo {
        if self.unreachable {
            return self.clone();
        }
        let mut map = HashTrieMap::new();
        for (key, set) in self.map.iter() {
            let key = if key == from { to.clone() } else { key.clone() };
            let mut renamed = HashTrieSet::new();
            for member in set.iter() {
                renamed.insert_mut(if member == from {
                    to.clone()
                } else {
                    member.clone()
                });
            }
            map.insert_mut(key, renamed);
        }
        AliasingInfo {
            map,
            unreachable: false,
        }
    }
}

impl Lattice for AliasingInfo {
    fn bottom() -> Self {
        AliasingInfo {
            map: HashTrieMap::new(),
            unreachable: true,
        }
    }

    fn top() -> Self {
        AliasingInfo {
            map: HashTrieMap::new(),
            unreachable: false,
        }
    }

    fn is_bottom(&self) -> bool {
        self.unreachable
    }

    fn is_top(&self) -> bool {
        !self.unreachable && self.map.is_empty()
    }

    fn lub(&self, other: &Self) -> Result<Self, SemanticError> {
        if self.unreachable {
            return Ok(other.clone());
        }
        if other.unreachable {
            return Ok(self.clone());
        }
        let mut map = HashTrieMap::new();
        for (id, left) in self.map.iter() {
            if let Some(right) = other.map.get(id) {
                let mut intersection = HashTrieSet::new();
                for member in left.iter() {
                    if right.contains(member) {
                        intersection.insert_mut(member.clone());
                    }
                }
                if !intersection.is_empty() {
                    map.insert_mut(id.clone(), intersection);
                }
            }
        }
        Ok(AliasingInfo {
            map,
            unreachable: false,
        })
    }

    fn less_or_equal(&self, other: &Self) -> Result<bool, SemanticError> {
        if self.unreachable {
            return Ok(true);
        }
        if other.unreachable {
            return Ok(false);
        }
        // More must-aliases means more information, hence lower in the order.
        for (id, required) in other.map.iter() {
            let known = self.aliases_of(id);
            if required.iter().any(|member| !known.contains(member)) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// The state the analysis tracks at one program point: the abstract product
/// state, the set of symbolic expressions the last evaluated statement
/// computed, and aliasing metadata.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AnalysisState<H, V, T> {
    pub state: ProductState<H, V, T>,
    pub computed_expressions: ExpressionSet,
    pub aliasing: AliasingInfo,
}

impl<H: HeapDomain, V: ValueDomain, T: TypeDomain> AnalysisState<H, V, T> {
    pub fn new(
        state: ProductState<H, V, T>,
        computed_expressions: ExpressionSet,
        aliasing: AliasingInfo,
    ) -> AnalysisState<H, V, T> {
        AnalysisState {
            state,
            computed_expressions,
            aliasing,
        }
    }

    /// The state holding `state` with no computed expression.
    pub fn of(state: ProductState<H, V, T>) -> AnalysisState<H, V, T> {
        AnalysisState {
            state,
            computed_expressions: ExpressionSet::empty(),
            aliasing: AliasingInfo::top(),
        }
    }

    /// The bottom state that still exposes `meta` as its computed
    /// expression, so that later uses of a call's value remain well-formed
    /// while the value itself is unreachable.
    pub fn bottom_keeping(meta: &Identifier) -> AnalysisState<H, V, T> {
        AnalysisState {
            state: ProductState::bottom(),
            computed_expressions: ExpressionSet::singleton(Rc::new(Expr::Variable(meta.clone()))),
            aliasing: AliasingInfo::bottom(),
        }
    }

    pub fn with_computed(&self, computed_expressions: ExpressionSet) -> AnalysisState<H, V, T> {
        AnalysisState {
            state: self.state.clone(),
            computed_expressions,
            aliasing: self.aliasing.clone(),
        }
    }

    pub fn assign(&self, id: &Identifier, expr: &Expr) -> Result<Self, SemanticError> {
        Ok(AnalysisState {
            state: self.state.assign(id, expr)?,
            computed_expressions: ExpressionSet::singleton(Rc::new(Expr::Variable(id.clone()))),
            aliasing: self.aliasing.assign(id, expr),
        })
    }

    pub fn smallstep(&self, expr: &Rc<Expr>) -> Result<Self, SemanticError> {
        Ok(AnalysisState {
            state: self.state.smallstep(expr)?,
            computed_expressions: ExpressionSet::singleton(expr.clone()),
            aliasing: self.aliasing.clone(),
        })
    }

    pub fn assume(&self, expr: &Expr, holds: bool) -> Result<Self, SemanticError> {
        Ok(AnalysisState {
            state: self.state.assume(expr, holds)?,
            computed_expressions: self.computed_expressions.clone(),
            aliasing: self.aliasing.clone(),
        })
    }

    pub fn forget_identifiers(&self, ids: &[Identifier]) -> Result<Self, SemanticError> {
        Ok(AnalysisState {
            state: self.state.forget_identifiers(ids)?,
            computed_expressions: self.computed_expressions.clone(),
            aliasing: self.aliasing.forget_identifiers(ids),
        })
    }

    /// Transfers the binding of `from` in `other` into this state under the
    /// name `to`. Used to move returned values across call frames; alias
    /// knowledge does not survive the move.
    pub fn import(
        &self,
        other: &Self,
        from: &Identifier,
        to: &Identifier,
    ) -> Result<Self, SemanticError> {
        Ok(AnalysisState {
            state: self.state.import(&other.state, from, to)?,
            computed_expressions: self.computed_expressions.clone(),
            aliasing: self.aliasing.forget_identifiers(std::slice::from_ref(to)),
        })
    }

    pub fn rename(&self, from: &Identifier, to: &Identifier) -> Result<Self, SemanticError> {
        Ok(AnalysisState {
            state: self.state.rename(from, to)?,
            computed_expressions: self.computed_expressions.clone(),
            aliasing: self.aliasing.rename(from, to),
        })
    }
}

impl<H: HeapDomain, V: ValueDomain, T: TypeDomain> Lattice for AnalysisState<H, V, T> {
    fn bottom() -> Self {
        AnalysisState {
            state: ProductState::bottom(),
            computed_expressions: ExpressionSet::empty(),
            aliasing: AliasingInfo::bottom(),
        }
    }

    fn top() -> Self {
        AnalysisState {
            state: ProductState::top(),
            computed_expressions: ExpressionSet::empty(),
            aliasing: AliasingInfo::top(),
        }
    }

    fn is_bottom(&self) -> bool {
        self.state.is_bottom()
    }

    fn is_top(&self) -> bool {
        self.state.is_top() && self.aliasing.is_top()
    }

    fn lub(&self, other: &Self) -> Result<Self, SemanticError> {
        if self.is_bottom() {
            return Ok(other.clone());
        }
        if other.is_bottom() {
            return Ok(self.clone());
        }
        Ok(AnalysisState {
            state: self.state.lub(&other.state)?,
            computed_expressions: self.computed_expressions.lub(&other.computed_expressions),
            aliasing: self.aliasing.lub(&other.aliasing)?,
        })
    }

    fn widening(&self, other: &Self) -> Result<Self, SemanticError> {
        if self.is_bottom() {
            return Ok(other.clone());
        }
        if other.is_bottom() {
            return Ok(self.clone());
        }
        Ok(AnalysisState {
            state: self.state.widening(&other.state)?,
            computed_expressions: self.computed_expressions.lub(&other.computed_expressions),
            aliasing: self.aliasing.widening(&other.aliasing)?,
        })
    }

    fn less_or_equal(&self, other: &Self) -> Result<bool, SemanticError> {
        if self.is_bottom() {
            return Ok(true);
        }
        if other.is_bottom() {
            return Ok(false);
        }
        Ok(self.state.less_or_equal(&other.state)?
            && self
                .computed_expressions
                .less_or_equal(&other.computed_expressions)
            && self.aliasing.less_or_equal(&other.aliasing)?)
    }
}

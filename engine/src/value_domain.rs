// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::abstract_state::{NonRelationalElement, SemanticDomain, ValueDomain};
use crate::error::SemanticError;
use crate::expression::{BinaryOp, Constant, Expr, Identifier, UnaryOp};
use crate::lattice::Lattice;

use rpds::HashTrieMap;
use serde::{Deserialize, Serialize};

/// A non-relational value environment: a pointwise lifting of a single
/// abstract element to a map from identifiers to elements.
///
/// Invariants: an identifier absent from the map is unconstrained (top), and
/// the map never binds a top element. The bottom element, representing
/// unreachable code, is a dedicated flag; assigning a bottom value collapses
/// the whole environment to bottom.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ValueEnvironment<E> {
    map: HashTrieMap<Identifier, E>,
    unreachable: bool,
}

impl<E: NonRelationalElement> ValueEnvironment<E> {
    /// The environment where every identifier is unconstrained.
    pub fn unconstrained() -> ValueEnvironment<E> {
        ValueEnvironment {
            map: HashTrieMap::new(),
            unreachable: false,
        }
    }

    /// The value bound to `id`, or top if `id` is not tracked.
    pub fn value_of(&self, id: &Identifier) -> E {
        if self.unreachable {
            return E::bottom();
        }
        self.map.get(id).cloned().unwrap_or_else(E::top)
    }

    /// The identifiers this environment currently tracks.
    pub fn tracked(&self) -> impl Iterator<Item = &Identifier> + '_ {
        self.map.keys()
    }

    /// Evaluates `expr` to a single abstract element.
    pub fn eval(&self, expr: &Expr) -> Result<E, SemanticError> {
        if self.unreachable {
            return Ok(E::bottom());
        }
        match expr {
            Expr::Constant(c) => Ok(E::from_constant(c)),
            Expr::Variable(id) => Ok(self.value_of(id)),
            Expr::Unary { op, operand } => E::apply_unary(*op, &self.eval(operand)?),
            Expr::Binary { op, left, right } => {
                E::apply_binary(*op, &self.eval(left)?, &self.eval(right)?)
            }
        }
    }

    fn bind(&self, id: &Identifier, value: E) -> ValueEnvironment<E> {
        if value.is_bottom() {
            return Self::bottom();
        }
        let map = if value.is_top() {
            self.map.remove(id)
        } else {
            self.map.insert(id.clone(), value)
        };
        ValueEnvironment {
            map,
            unreachable: false,
        }
    }

    /// Refines the binding of a variable operand of a comparison, collapsing
    /// to bottom when the refinement shows the assumption infeasible.
    fn refine_operand(
        &self,
        id: &Identifier,
        op: BinaryOp,
        bound: &E,
    ) -> Result<ValueEnvironment<E>, SemanticError> {
        let refined = E::refine(op, &self.value_of(id), bound)?;
        Ok(self.bind(id, refined))
    }
}

impl<E: NonRelationalElement> Lattice for ValueEnvironment<E> {
    fn bottom() -> Self {
        ValueEnvironment {
            map: HashTrieMap::new(),
            unreachable: true,
        }
    }

    fn top() -> Self {
        Self::unconstrained()
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
        // An identifier tracked on only one side is unconstrained on the
        // other, so it is unconstrained in the join as well.
        let mut map = HashTrieMap::new();
        for (id, left) in self.map.iter() {
            if let Some(right) = other.map.get(id) {
                let joined = left.lub(right)?;
                if !joined.is_top() {
                    map.insert_mut(id.clone(), joined);
                }
            }
        }
        Ok(ValueEnvironment {
            map,
            unreachable: false,
        })
    }

    fn widening(&self, other: &Self) -> Result<Self, SemanticError> {
        if self.unreachable {
            return Ok(other.clone());
        }
        if other.unreachable {
            return Ok(self.clone());
        }
        let mut map = HashTrieMap::new();
        for (id, left) in self.map.iter() {
            if let Some(right) = other.map.get(id) {
                let widened = left.widening(right)?;
                if !widened.is_top() {
                    map.insert_mut(id.clone(), widened);
                }
            }
        }
        Ok(ValueEnvironment {
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
        for (id, bound) in other.map.iter() {
            if !self.value_of(id).less_or_equal(bound)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl<E: NonRelationalElement> SemanticDomain for ValueEnvironment<E> {
    fn assign(&self, id: &Identifier, expr: &Expr) -> Result<Self, SemanticError> {
        if self.unreachable {
            return Ok(self.clone());
        }
        let value = self.eval(expr)?;
        Ok(self.bind(id, value))
    }

    fn assume(&self, expr: &Expr, holds: bool) -> Result<Self, SemanticError> {
        if self.unreachable {
            return Ok(self.clone());
        }
        match expr {
            Expr::Unary {
                op: UnaryOp::Not,
                operand,
            } => self.assume(operand, !holds),
            Expr::Binary { op, left, right } if op.is_comparison() => {
                let op = if holds {
                    *op
                } else {
                    match op.negated() {
                        Some(negated) => negated,
                        None => return Ok(self.clone()),
                    }
                };
                let left_value = self.eval(left)?;
                let right_value = self.eval(right)?;
                if E::satisfies(op, &left_value, &right_value) == Some(false) {
                    return Ok(Self::bottom());
                }
                let mut result = self.clone();
                if let Expr::Variable(id) = left.as_ref() {
                    result = result.refine_operand(id, op, &right_value)?;
                }
                if let Expr::Variable(id) = right.as_ref() {
                    if let Some(mirrored) = op.mirrored() {
                        result = result.refine_operand(id, mirrored, &left_value)?;
                    }
                }
                Ok(result)
            }
            Expr::Binary {
                op: BinaryOp::And,
                left,
                right,
            } if holds => self.assume(left, true)?.assume(right, true),
            Expr::Binary {
                op: BinaryOp::Or,
                left,
                right,
            } if !holds => self.assume(left, false)?.assume(right, false),
            Expr::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => self.assume(left, false)?.lub(&self.assume(right, false)?),
            Expr::Binary {
                op: BinaryOp::Or,
                left,
                right,
            } => self.assume(left, true)?.lub(&self.assume(right, true)?),
            Expr::Constant(Constant::Bool(b)) => {
                if *b == holds {
                    Ok(self.clone())
                } else {
                    Ok(Self::bottom())
                }
            }
            Expr::Variable(id) => {
                let truth = E::from_constant(&Constant::Bool(holds));
                self.refine_operand(id, BinaryOp::Eq, &truth)
            }
            _ => Ok(self.clone()),
        }
    }

    fn forget_identifiers(&self, ids: &[Identifier]) -> Result<Self, SemanticError> {
        if self.unreachable {
            return Ok(self.clone());
        }
        let mut map = self.map.clone();
        for id in ids {
            map.remove_mut(id);
        }
        Ok(ValueEnvironment {
            map,
            unreachable: false,
        })
    }

    fn rename(&self, from: &Identifier, to: &Identifier) -> Result<Self, SemanticError> {
        if self.unreachable {
            return Ok(self.clone());
        }
        let value = self.value_of(from);
        let mut map = self.map.remove(from);
        if value.is_top() {
            map.remove_mut(to);
        } else {
            map.insert_mut(to.clone(), value);
        }
        Ok(ValueEnvironment {
            map,
            unreachable: false,
        })
    }

    fn import(
        &self,
        other: &Self,
        from: &Identifier,
        to: &Identifier,
    ) -> Result<Self, SemanticError> {
        if self.unreachable || other.unreachable {
            return Ok(Self::bottom());
        }
        Ok(self.bind(to, other.value_of(from)))
    }
}

impl<E: NonRelationalElement> ValueDomain for ValueEnvironment<E> {}

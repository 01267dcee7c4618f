// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::abstract_state::NonRelationalElement;
use crate::error::SemanticError;
use crate::expression::{BinaryOp, Constant, UnaryOp};
use crate::lattice::Lattice;

use serde::{Deserialize, Serialize};
use std::cmp;

/// An element of the interval domain is a range of i128 numbers denoted by a
/// lower bound and an upper bound. A lower bound of i128::MIN denotes
/// -infinity and an upper bound of i128::MAX denotes +infinity. Booleans are
/// encoded as 0/1 ranges so that conditions can be evaluated in-domain.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialOrd, PartialEq, Hash, Ord)]
pub struct IntervalDomain {
    lower_bound: i128,
    upper_bound: i128,
}

pub const BOTTOM: IntervalDomain = IntervalDomain {
    lower_bound: 1,
    upper_bound: 0,
};

pub const TOP: IntervalDomain = IntervalDomain {
    lower_bound: i128::MIN,
    upper_bound: i128::MAX,
};

impl From<i128> for IntervalDomain {
    fn from(i: i128) -> IntervalDomain {
        IntervalDomain {
            lower_bound: i,
            upper_bound: i,
        }
    }
}

impl From<bool> for IntervalDomain {
    fn from(b: bool) -> IntervalDomain {
        IntervalDomain::from(b as i128)
    }
}

// Bound arithmetic that preserves the infinities.
fn bound_pred(b: i128) -> i128 {
    if b == i128::MAX || b == i128::MIN {
        b
    } else {
        b - 1
    }
}

fn bound_succ(b: i128) -> i128 {
    if b == i128::MAX || b == i128::MIN {
        b
    } else {
        b + 1
    }
}

impl IntervalDomain {
    pub fn new(lower_bound: i128, upper_bound: i128) -> IntervalDomain {
        IntervalDomain {
            lower_bound,
            upper_bound,
        }
    }

    /// The abstraction of "any boolean": either 0 or 1.
    pub fn any_bool() -> IntervalDomain {
        IntervalDomain {
            lower_bound: 0,
            upper_bound: 1,
        }
    }

    //[x...y] + [a...b] = [x+a...y+b]
    pub fn add(&self, other: &Self) -> Self {
        if self.is_bottom() || other.is_bottom() {
            return BOTTOM.clone();
        }
        if self.is_top() || other.is_top() {
            return TOP.clone();
        }
        IntervalDomain {
            lower_bound: if self.lower_bound == i128::MIN || other.lower_bound == i128::MIN {
                i128::MIN
            } else {
                self.lower_bound.saturating_add(other.lower_bound)
            },
            upper_bound: if self.upper_bound == i128::MAX || other.upper_bound == i128::MAX {
                i128::MAX
            } else {
                self.upper_bound.saturating_add(other.upper_bound)
            },
        }
    }

    // [x...y] - [a...b] = [x-b...y-a]
    pub fn sub(&self, other: &Self) -> Self {
        if self.is_bottom() || other.is_bottom() {
            return BOTTOM.clone();
        }
        if self.is_top() || other.is_top() {
            return TOP.clone();
        }
        IntervalDomain {
            lower_bound: if self.lower_bound == i128::MIN || other.upper_bound == i128::MAX {
                i128::MIN
            } else {
                self.lower_bound.saturating_sub(other.upper_bound)
            },
            upper_bound: if self.upper_bound == i128::MAX || other.lower_bound == i128::MIN {
                i128::MAX
            } else {
                self.upper_bound.saturating_sub(other.lower_bound)
            },
        }
    }

    // [x...y] * [a...b] = [min of cross products...max of cross products]
    pub fn mul(&self, other: &Self) -> Self {
        if self.is_bottom() || other.is_bottom() {
            return BOTTOM.clone();
        }
        if self.is_top() || other.is_top() {
            return TOP.clone();
        }
        let products = [
            self.lower_bound.saturating_mul(other.lower_bound),
            self.lower_bound.saturating_mul(other.upper_bound),
            self.upper_bound.saturating_mul(other.lower_bound),
            self.upper_bound.saturating_mul(other.upper_bound),
        ];
        IntervalDomain {
            lower_bound: *products.iter().min().unwrap(),
            upper_bound: *products.iter().max().unwrap(),
        }
    }

    // -[x...y] = [-y...-x]
    pub fn neg(&self) -> Self {
        if self.is_bottom() {
            return BOTTOM.clone();
        }
        if self.is_top() {
            return TOP.clone();
        }
        IntervalDomain {
            lower_bound: if self.upper_bound == i128::MAX {
                i128::MIN
            } else {
                self.upper_bound.checked_neg().unwrap_or(i128::MAX)
            },
            upper_bound: if self.lower_bound == i128::MIN {
                i128::MAX
            } else {
                self.lower_bound.checked_neg().unwrap_or(i128::MAX)
            },
        }
    }

    // [x...y] < [a...b] = y < a
    // !([x...y] < [a...b]) = [a...b] <= [x...y] = b <= x
    pub fn less_than(&self, other: &Self) -> Option<bool> {
        if self.is_bottom() || other.is_bottom() {
            None
        } else if self.upper_bound < other.lower_bound {
            Some(true)
        } else if other.upper_bound <= self.lower_bound {
            Some(false)
        } else {
            None
        }
    }

    // [x...y] <= [a...b] = y <= a
    // !([x...y] <= [a...b]) = [a...b] < [x...y] = b < x
    pub fn less_equal(&self, other: &Self) -> Option<bool> {
        if self.is_bottom() || other.is_bottom() {
            None
        } else if self.upper_bound <= other.lower_bound {
            Some(true)
        } else if other.upper_bound < self.lower_bound {
            Some(false)
        } else {
            None
        }
    }

    pub fn greater_than(&self, other: &Self) -> Option<bool> {
        other.less_than(self)
    }

    pub fn greater_or_equal(&self, other: &Self) -> Option<bool> {
        other.less_equal(self)
    }

    pub fn equal_to(&self, other: &Self) -> Option<bool> {
        if self.is_bottom() || other.is_bottom() {
            None
        } else if self.lower_bound == self.upper_bound
            && other.lower_bound == other.upper_bound
            && self.lower_bound == other.lower_bound
        {
            Some(true)
        } else if self.upper_bound < other.lower_bound || other.upper_bound < self.lower_bound {
            Some(false)
        } else {
            None
        }
    }

    /// The truth value of this interval when read as a boolean, if known.
    pub fn as_bool(&self) -> Option<bool> {
        if self.is_bottom() {
            None
        } else if self.lower_bound >= 1 {
            Some(true)
        } else if self.lower_bound == 0 && self.upper_bound == 0 {
            Some(false)
        } else {
            None
        }
    }

    /// Greatest lower bound: the intersection of the two ranges.
    pub fn intersect(&self, other: &Self) -> Self {
        if self.is_bottom() || other.is_bottom() {
            return BOTTOM.clone();
        }
        IntervalDomain {
            lower_bound: cmp::max(self.lower_bound, other.lower_bound),
            upper_bound: cmp::min(self.upper_bound, other.upper_bound),
        }
    }

    pub fn lower_bound(&self) -> Option<i128> {
        if self.lower_bound == TOP.lower_bound {
            None
        } else {
            Some(self.lower_bound)
        }
    }

    pub fn upper_bound(&self) -> Option<i128> {
        if self.upper_bound == TOP.upper_bound {
            None
        } else {
            Some(self.upper_bound)
        }
    }

    pub fn remove_lower_bound(&self) -> Self {
        IntervalDomain {
            lower_bound: TOP.lower_bound,
            upper_bound: self.upper_bound,
        }
    }

    pub fn remove_upper_bound(&self) -> Self {
        IntervalDomain {
            lower_bound: self.lower_bound,
            upper_bound: TOP.upper_bound,
        }
    }
}

impl Lattice for IntervalDomain {
    fn bottom() -> Self {
        BOTTOM.clone()
    }

    fn top() -> Self {
        TOP.clone()
    }

    fn is_bottom(&self) -> bool {
        self.upper_bound < self.lower_bound
    }

    fn is_top(&self) -> bool {
        self.lower_bound == i128::MIN && self.upper_bound == i128::MAX
    }

    // [x...y] lub [a...b] = [min(x,a)...max(y,b)]
    fn lub(&self, other: &Self) -> Result<Self, SemanticError> {
        if self.is_bottom() {
            return Ok(other.clone());
        }
        if other.is_bottom() {
            return Ok(self.clone());
        }
        Ok(IntervalDomain {
            lower_bound: cmp::min(self.lower_bound, other.lower_bound),
            upper_bound: cmp::max(self.upper_bound, other.upper_bound),
        })
    }

    // Any bound that is still growing jumps straight to the corresponding
    // infinity, stabilizing every ascending chain in at most two steps.
    fn widening(&self, other: &Self) -> Result<Self, SemanticError> {
        if self.is_bottom() {
            return Ok(other.clone());
        }
        if other.is_bottom() {
            return Ok(self.clone());
        }
        Ok(IntervalDomain {
            lower_bound: if other.lower_bound < self.lower_bound {
                i128::MIN
            } else {
                self.lower_bound
            },
            upper_bound: if other.upper_bound > self.upper_bound {
                i128::MAX
            } else {
                self.upper_bound
            },
        })
    }

    fn less_or_equal(&self, other: &Self) -> Result<bool, SemanticError> {
        if self.is_bottom() {
            return Ok(true);
        }
        if other.is_bottom() {
            return Ok(false);
        }
        Ok(self.lower_bound >= other.lower_bound && self.upper_bound <= other.upper_bound)
    }
}

impl NonRelationalElement for IntervalDomain {
    fn from_constant(constant: &Constant) -> Self {
        match constant {
            Constant::Int(i) => IntervalDomain::from(*i),
            Constant::Bool(b) => IntervalDomain::from(*b),
        }
    }

    fn apply_binary(op: BinaryOp, left: &Self, right: &Self) -> Result<Self, SemanticError> {
        if left.is_bottom() || right.is_bottom() {
            return Ok(BOTTOM.clone());
        }
        Ok(match op {
            BinaryOp::Add => left.add(right),
            BinaryOp::Sub => left.sub(right),
            BinaryOp::Mul => left.mul(right),
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => match Self::satisfies(op, left, right) {
                Some(b) => IntervalDomain::from(b),
                None => IntervalDomain::any_bool(),
            },
            BinaryOp::And => match (left.as_bool(), right.as_bool()) {
                (Some(false), _) | (_, Some(false)) => IntervalDomain::from(false),
                (Some(true), Some(true)) => IntervalDomain::from(true),
                _ => IntervalDomain::any_bool(),
            },
            BinaryOp::Or => match (left.as_bool(), right.as_bool()) {
                (Some(true), _) | (_, Some(true)) => IntervalDomain::from(true),
                (Some(false), Some(false)) => IntervalDomain::from(false),
                _ => IntervalDomain::any_bool(),
            },
        })
    }

    fn apply_unary(op: UnaryOp, operand: &Self) -> Result<Self, SemanticError> {
        if operand.is_bottom() {
            return Ok(BOTTOM.clone());
        }
        Ok(match op {
            UnaryOp::Neg => operand.neg(),
            UnaryOp::Not => match operand.as_bool() {
                Some(b) => IntervalDomain::from(!b),
                None => IntervalDomain::any_bool(),
            },
        })
    }

    fn satisfies(op: BinaryOp, left: &Self, right: &Self) -> Option<bool> {
        match op {
            BinaryOp::Eq => left.equal_to(right),
            BinaryOp::Ne => left.equal_to(right).map(|b| !b),
            BinaryOp::Lt => left.less_than(right),
            BinaryOp::Le => left.less_equal(right),
            BinaryOp::Gt => left.greater_than(right),
            BinaryOp::Ge => left.greater_or_equal(right),
            _ => None,
        }
    }

    fn refine(op: BinaryOp, left: &Self, right: &Self) -> Result<Self, SemanticError> {
        if left.is_bottom() || right.is_bottom() {
            return Ok(BOTTOM.clone());
        }
        Ok(match op {
            BinaryOp::Eq => left.intersect(right),
            BinaryOp::Lt => left.intersect(&IntervalDomain {
                lower_bound: i128::MIN,
                upper_bound: bound_pred(right.upper_bound),
            }),
            BinaryOp::Le => left.intersect(&IntervalDomain {
                lower_bound: i128::MIN,
                upper_bound: right.upper_bound,
            }),
            BinaryOp::Gt => left.intersect(&IntervalDomain {
                lower_bound: bound_succ(right.lower_bound),
                upper_bound: i128::MAX,
            }),
            BinaryOp::Ge => left.intersect(&IntervalDomain {
                lower_bound: right.lower_bound,
                upper_bound: i128::MAX,
            }),
            BinaryOp::Ne => {
                // Only a singleton on the right can trim a bound.
                if right.lower_bound == right.upper_bound && !left.is_top() {
                    if left.lower_bound == right.lower_bound {
                        IntervalDomain {
                            lower_bound: bound_succ(left.lower_bound),
                            upper_bound: left.upper_bound,
                        }
                    } else if left.upper_bound == right.upper_bound {
                        IntervalDomain {
                            lower_bound: left.lower_bound,
                            upper_bound: bound_pred(left.upper_bound),
                        }
                    } else {
                        left.clone()
                    }
                } else {
                    left.clone()
                }
            }
            _ => left.clone(),
        })
    }
}

// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::SemanticError;
use std::fmt::Debug;

/// The contract every abstract element of the analysis must satisfy. All
/// operations are pure: an element is never mutated, a new one is returned.
///
/// Implementations must keep `lub` and `widening` monotone in both arguments,
/// and `widening` must stabilize every ascending chain in finitely many
/// steps. `bottom() <= x <= top()` must hold for every reachable `x`.
pub trait Lattice: Sized + Clone + Debug + PartialEq {
    fn bottom() -> Self;

    fn top() -> Self;

    fn is_bottom(&self) -> bool;

    fn is_top(&self) -> bool;

    /// Least upper bound of `self` and `other`.
    fn lub(&self, other: &Self) -> Result<Self, SemanticError>;

    /// Widening of `self` (the older value) with `other` (the newer value).
    /// Domains whose ascending chains are all finite can keep the default,
    /// which simply delegates to `lub`.
    fn widening(&self, other: &Self) -> Result<Self, SemanticError> {
        self.lub(other)
    }

    /// The partial order of the lattice. This is the convergence test of the
    /// fixpoint engine: two elements can be order-equal without being
    /// structurally equal.
    fn less_or_equal(&self, other: &Self) -> Result<bool, SemanticError>;
}

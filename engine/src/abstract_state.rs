// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::SemanticError;
use crate::expression::{BinaryOp, Constant, Expr, Identifier, UnaryOp};
use crate::lattice::Lattice;

use serde::{Deserialize, Serialize};

/// The transfer-function contract shared by the heap, value and type
/// components of an abstract state. All operations are pure and return a new
/// element; a failing operation aborts the enclosing fixpoint run.
pub trait SemanticDomain: Lattice {
    /// The effect of `id := expr`.
    fn assign(&self, id: &Identifier, expr: &Expr) -> Result<Self, SemanticError>;

    /// Refines this element under the assumption that `expr` evaluates to
    /// `holds`. Must return bottom when the assumption is infeasible.
    fn assume(&self, expr: &Expr, holds: bool) -> Result<Self, SemanticError>;

    /// Drops all knowledge about the given identifiers.
    fn forget_identifiers(&self, ids: &[Identifier]) -> Result<Self, SemanticError>;

    /// Moves the knowledge about `from` under the name `to`, dropping `from`.
    fn rename(&self, from: &Identifier, to: &Identifier) -> Result<Self, SemanticError>;

    /// Transfers the knowledge that `other` has about `from` into this
    /// element under the name `to`. Used to move values across call frames.
    fn import(
        &self,
        other: &Self,
        from: &Identifier,
        to: &Identifier,
    ) -> Result<Self, SemanticError>;

    /// The effect of evaluating `expr` for its own sake (no binding). Most
    /// domains are unaffected by pure evaluation.
    fn smallstep(&self, _expr: &Expr) -> Result<Self, SemanticError> {
        Ok(self.clone())
    }
}

/// Marker for domains modeling the memory layout.
pub trait HeapDomain: SemanticDomain {}

/// Marker for domains modeling the values of program variables.
pub trait ValueDomain: SemanticDomain {}

/// Marker for domains modeling the runtime types of program variables.
pub trait TypeDomain: SemanticDomain {}

/// The contract of a single abstract value of a non-relational domain, used
/// by `ValueEnvironment` to evaluate expressions pointwise.
pub trait NonRelationalElement: Lattice {
    fn from_constant(constant: &Constant) -> Self;

    fn apply_binary(op: BinaryOp, left: &Self, right: &Self) -> Result<Self, SemanticError>;

    fn apply_unary(op: UnaryOp, operand: &Self) -> Result<Self, SemanticError>;

    /// Whether `left op right` is known to hold or known not to hold.
    fn satisfies(op: BinaryOp, left: &Self, right: &Self) -> Option<bool>;

    /// Refines `left` under the assumption that `left op right` holds.
    fn refine(op: BinaryOp, left: &Self, right: &Self) -> Result<Self, SemanticError>;
}

/// An abstract state of the analysis: the product of a heap component
/// modeling the memory layout, a value component modeling the values of
/// program variables, and a type component modeling their runtime types.
/// Every operation is lifted componentwise; the product is bottom only when
/// all components are.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
pub struct ProductState<H, V, T> {
    pub heap: H,
    pub value: V,
    pub types: T,
}

impl<H: HeapDomain, V: ValueDomain, T: TypeDomain> ProductState<H, V, T> {
    pub fn new(heap: H, value: V, types: T) -> ProductState<H, V, T> {
        ProductState { heap, value, types }
    }

    /// A copy of this state with the value component replaced by its top.
    pub fn with_top_value(&self) -> ProductState<H, V, T> {
        ProductState {
            heap: self.heap.clone(),
            value: V::top(),
            types: self.types.clone(),
        }
    }
}

impl<H: HeapDomain, V: ValueDomain, T: TypeDomain> Lattice for ProductState<H, V, T> {
    fn bottom() -> Self {
        ProductState {
            heap: H::bottom(),
            value: V::bottom(),
            types: T::bottom(),
        }
    }

    fn top() -> Self {
        ProductState {
            heap: H::top(),
            value: V::top(),
            types: T::top(),
        }
    }

    fn is_bottom(&self) -> bool {
        self.heap.is_bottom() && self.value.is_bottom() && self.types.is_bottom()
    }

    fn is_top(&self) -> bool {
        self.heap.is_top() && self.value.is_top() && self.types.is_top()
    }

    fn lub(&self, other: &Self) -> Result<Self, SemanticError> {
        Ok(ProductState {
            heap: self.heap.lub(&other.heap)?,
            value: self.value.lub(&other.value)?,
            types: self.types.lub(&other.types)?,
        })
    }

    fn widening(&self, other: &Self) -> Result<Self, SemanticError> {
        Ok(ProductState {
            heap: self.heap.widening(&other.heap)?,
            value: self.value.widening(&other.value)?,
            types: self.types.widening(&other.types)?,
        })
    }

    fn less_or_equal(&self, other: &Self) -> Result<bool, SemanticError> {
        Ok(self.heap.less_or_equal(&other.heap)?
            && self.value.less_or_equal(&other.value)?
            && self.types.less_or_equal(&other.types)?)
    }
}

impl<H: HeapDomain, V: ValueDomain, T: TypeDomain> SemanticDomain for ProductState<H, V, T> {
    fn assign(&self, id: &Identifier, expr: &Expr) -> Result<Self, SemanticError> {
        Ok(ProductState {
            heap: self.heap.assign(id, expr)?,
            value: self.value.assign(id, expr)?,
            types: self.types.assign(id, expr)?,
        })
    }

    fn assume(&self, expr: &Expr, holds: bool) -> Result<Self, SemanticError> {
        Ok(ProductState {
            heap: self.heap.assume(expr, holds)?,
            value: self.value.assume(expr, holds)?,
            types: self.types.assume(expr, holds)?,
        })
    }

    fn forget_identifiers(&self, ids: &[Identifier]) -> Result<Self, SemanticError> {
        Ok(ProductState {
            heap: self.heap.forget_identifiers(ids)?,
            value: self.value.forget_identifiers(ids)?,
            types: self.types.forget_identifiers(ids)?,
        })
    }

    fn rename(&self, from: &Identifier, to: &Identifier) -> Result<Self, SemanticError> {
        Ok(ProductState {
            heap: self.heap.rename(from, to)?,
            value: self.value.rename(from, to)?,
            types: self.types.rename(from, to)?,
        })
    }

    fn import(
        &self,
        other: &Self,
        from: &Identifier,
        to: &Identifier,
    ) -> Result<Self, SemanticError> {
        Ok(ProductState {
            heap: self.heap.import(&other.heap, from, to)?,
            value: self.value.import(&other.value, from, to)?,
            types: self.types.import(&other.types, from, to)?,
        })
    }

    fn smallstep(&self, expr: &Expr) -> Result<Self, SemanticError> {
        Ok(ProductState {
            heap: self.heap.smallstep(expr)?,
            value: self.value.smallstep(expr)?,
            types: self.types.smallstep(expr)?,
        })
    }
}

/// The one-point heap lattice: all memory is a single summarized blob about
/// which nothing is tracked. The degenerate instance for programs whose
/// statements never touch the heap.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MonolithicHeap;

impl Lattice for MonolithicHeap {
    fn bottom() -> Self {
        MonolithicHeap
    }

    fn top() -> Self {
        MonolithicHeap
    }

    fn is_bottom(&self) -> bool {
        true
    }

    fn is_top(&self) -> bool {
        true
    }

    fn lub(&self, _other: &Self) -> Result<Self, SemanticError> {
        Ok(MonolithicHeap)
    }

    fn less_or_equal(&self, _other: &Self) -> Result<bool, SemanticError> {
        Ok(true)
    }
}

impl SemanticDomain for MonolithicHeap {
    fn assign(&self, _id: &Identifier, _expr: &Expr) -> Result<Self, SemanticError> {
        Ok(MonolithicHeap)
    }

    fn assume(&self, _expr: &Expr, _holds: bool) -> Result<Self, SemanticError> {
        Ok(MonolithicHeap)
    }

    fn forget_identifiers(&self, _ids: &[Identifier]) -> Result<Self, SemanticError> {
        Ok(MonolithicHeap)
    }

    fn rename(&self, _from: &Identifier, _to: &Identifier) -> Result<Self, SemanticError> {
        Ok(MonolithicHeap)
    }

    fn import(
        &self,
        _other: &Self,
        _from: &Identifier,
        _to: &Identifier,
    ) -> Result<Self, SemanticError> {
        Ok(MonolithicHeap)
    }
}

impl HeapDomain for MonolithicHeap {}

/// The one-point type lattice: no runtime type information is tracked. The
/// degenerate instance for typeless programs.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Typeless;

impl Lattice for Typeless {
    fn bottom() -> Self {
        Typeless
    }

    fn top() -> Self {
        Typeless
    }

    fn is_bottom(&self) -> bool {
        true
    }

    fn is_top(&self) -> bool {
        true
    }

    fn lub(&self, _other: &Self) -> Result<Self, SemanticError> {
        Ok(Typeless)
    }

    fn less_or_equal(&self, _other: &Self) -> Result<bool, SemanticError> {
        Ok(true)
    }
}

impl SemanticDomain for Typeless {
    fn assign(&self, _id: &Identifier, _expr: &Expr) -> Result<Self, SemanticError> {
        Ok(Typeless)
    }

    fn assume(&self, _expr: &Expr, _holds: bool) -> Result<Self, SemanticError> {
        Ok(Typeless)
    }

    fn forget_identifiers(&self, _ids: &[Identifier]) -> Result<Self, SemanticError> {
        Ok(Typeless)
    }

    fn rename(&self, _from: &Identifier, _to: &Identifier) -> Result<Self, SemanticError> {
        Ok(Typeless)
    }

    fn import(
        &self,
        _other: &Self,
        _from: &Identifier,
        _to: &Identifier,
    ) -> Result<Self, SemanticError> {
        Ok(Typeless)
    }
}

impl TypeDomain for Typeless {}

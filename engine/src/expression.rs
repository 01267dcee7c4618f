// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{Debug, Display, Formatter, Result};
use std::rc::Rc;

/// The name of a program variable, cheap to clone and usable as a map key.
/// Reserved identifiers (return slots, call meta variables, argument slots)
/// start with `@` so that they can never collide with frontend names.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Identifier(Rc<str>);

impl Identifier {
    pub fn new(name: &str) -> Identifier {
        Identifier(Rc::from(name))
    }

    /// The identifier holding the value returned by the procedure being
    /// analyzed. Return statements assign to it; callers read it back.
    pub fn return_slot() -> Identifier {
        Identifier::new("@return")
    }

    /// The meta variable owned by the call statement with the given index,
    /// holding "the value this call evaluated to" in the caller's frame.
    pub fn call_meta(call_index: u32) -> Identifier {
        Identifier::new(&format!("@call{}", call_index))
    }

    /// The slot used to stage the i-th actual parameter while building a
    /// callee entry state.
    pub fn argument_slot(i: usize) -> Identifier {
        Identifier::new(&format!("@arg{}", i))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        Display::fmt(&self.0, f)
    }
}

#[derive(Serialize, Deserialize, Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Constant {
    Int(i128),
    Bool(bool),
}

#[derive(Serialize, Deserialize, Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    /// The comparison holding exactly when `self` does not.
    pub fn negated(self) -> Option<BinaryOp> {
        match self {
            BinaryOp::Eq => Some(BinaryOp::Ne),
            BinaryOp::Ne => Some(BinaryOp::Eq),
            BinaryOp::Lt => Some(BinaryOp::Ge),
            BinaryOp::Le => Some(BinaryOp::Gt),
            BinaryOp::Gt => Some(BinaryOp::Le),
            BinaryOp::Ge => Some(BinaryOp::Lt),
            _ => None,
        }
    }

    /// The comparison with its operands swapped: `a op b` iff `b op' a`.
    pub fn mirrored(self) -> Option<BinaryOp> {
        match self {
            BinaryOp::Eq => Some(BinaryOp::Eq),
            BinaryOp::Ne => Some(BinaryOp::Ne),
            BinaryOp::Lt => Some(BinaryOp::Gt),
            BinaryOp::Le => Some(BinaryOp::Ge),
            BinaryOp::Gt => Some(BinaryOp::Lt),
            BinaryOp::Ge => Some(BinaryOp::Le),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// A side-effect free symbolic expression. Calls are not expressions: they
/// are statements that bind their meta variable, so an expression can always
/// be evaluated atomically against one abstract state.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Expr {
    Constant(Constant),
    Variable(Identifier),
    Unary {
        op: UnaryOp,
        operand: Rc<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Rc<Expr>,
        right: Rc<Expr>,
    },
}

impl Expr {
    pub fn int(value: i128) -> Rc<Expr> {
        Rc::new(Expr::Constant(Constant::Int(value)))
    }

    pub fn bool(value: bool) -> Rc<Expr> {
        Rc::new(Expr::Constant(Constant::Bool(value)))
    }

    pub fn var(name: &str) -> Rc<Expr> {
        Rc::new(Expr::Variable(Identifier::new(name)))
    }

    pub fn unary(op: UnaryOp, operand: Rc<Expr>) -> Rc<Expr> {
        Rc::new(Expr::Unary { op, operand })
    }

    pub fn binary(op: BinaryOp, left: Rc<Expr>, right: Rc<Expr>) -> Rc<Expr> {
        Rc::new(Expr::Binary { op, left, right })
    }

    /// All identifiers mentioned by this expression.
    pub fn identifiers(&self) -> Vec<Identifier> {
        let mut ids = Vec::new();
        self.collect_identifiers(&mut ids);
        ids
    }

    fn collect_identifiers(&self, ids: &mut Vec<Identifier>) {
        match self {
            Expr::Constant(..) => {}
            Expr::Variable(id) => ids.push(id.clone()),
            Expr::Unary { operand, .. } => operand.collect_identifiers(ids),
            Expr::Binary { left, right, .. } => {
                left.collect_identifiers(ids);
                right.collect_identifiers(ids);
            }
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Expr::Constant(Constant::Int(i)) => write!(f, "{}", i),
            Expr::Constant(Constant::Bool(b)) => write!(f, "{}", b),
            Expr::Variable(id) => write!(f, "{}", id),
            Expr::Unary { op, operand } => {
                let symbol = match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Not => "!",
                };
                write!(f, "{}({})", symbol, operand)
            }
            Expr::Binary { op, left, right } => {
                let symbol = match op {
                    BinaryOp::Add => "+",
                    BinaryOp::Sub => "-",
                    BinaryOp::Mul => "*",
                    BinaryOp::Eq => "==",
                    BinaryOp::Ne => "!=",
                    BinaryOp::Lt => "<",
                    BinaryOp::Le => "<=",
                    BinaryOp::Gt => ">",
                    BinaryOp::Ge => ">=",
                    BinaryOp::And => "&&",
                    BinaryOp::Or => "||",
                };
                write!(f, "({} {} {})", left, symbol, right)
            }
        }
    }
}

/// The set of symbolic expressions an analysis state has just computed.
/// A set lattice: lub is union, the order is inclusion, and a dedicated
/// flag represents the top element (all expressions).
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
pub struct ExpressionSet {
    exprs: BTreeSet<Rc<Expr>>,
    is_top: bool,
}

impl ExpressionSet {
    pub fn empty() -> ExpressionSet {
        ExpressionSet {
            exprs: BTreeSet::new(),
            is_top: false,
        }
    }

    pub fn top() -> ExpressionSet {
        ExpressionSet {
            exprs: BTreeSet::new(),
            is_top: true,
        }
    }

    pub fn singleton(expr: Rc<Expr>) -> ExpressionSet {
        let mut exprs = BTreeSet::new();
        exprs.insert(expr);
        ExpressionSet {
            exprs,
            is_top: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.is_top && self.exprs.is_empty()
    }

    pub fn is_top(&self) -> bool {
        self.is_top
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<Expr>> {
        self.exprs.iter()
    }

    pub fn lub(&self, other: &ExpressionSet) -> ExpressionSet {
        if self.is_top || other.is_top {
            return ExpressionSet::top();
        }
        ExpressionSet {
            exprs: self.exprs.union(&other.exprs).cloned().collect(),
            is_top: false,
        }
    }

    pub fn less_or_equal(&self, other: &ExpressionSet) -> bool {
        if other.is_top {
            return true;
        }
        if self.is_top {
            return false;
        }
        self.exprs.is_subset(&other.exprs)
    }
}

// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::expression::{Expr, Identifier};

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result};
use std::rc::Rc;

/// The index of a statement inside its control flow graph.
pub type StatementId = u32;

/// One call site: the name of the invoked procedure, the actual parameters,
/// the meta variable that receives the returned value in the caller's frame,
/// and the variable the caller stores that value into, if any.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CallSite {
    pub callee: Rc<str>,
    pub arguments: Vec<Rc<Expr>>,
    pub meta_variable: Identifier,
    pub assign_to: Option<Identifier>,
}

impl CallSite {
    /// Whether the caller observes the returned value.
    pub fn uses_result(&self) -> bool {
        self.assign_to.is_some()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum StmtKind {
    /// No effect; a placeholder node.
    Skip,
    /// `target := value`.
    Assign { target: Identifier, value: Rc<Expr> },
    /// Evaluates a condition; outgoing true/false edges refine the state.
    Branch { condition: Rc<Expr> },
    /// Invokes another procedure.
    Call(CallSite),
    /// Ends the procedure, optionally yielding a value. Never has outgoing
    /// edges.
    Return { value: Option<Rc<Expr>> },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Statement {
    pub id: StatementId,
    pub kind: StmtKind,
}

impl Statement {
    /// Whether executing this statement ends the procedure, returning
    /// control to the caller.
    pub fn stops_execution(&self) -> bool {
        matches!(self.kind, StmtKind::Return { .. })
    }
}

impl Display for Statement {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match &self.kind {
            StmtKind::Skip => write!(f, "#{}: skip", self.id),
            StmtKind::Assign { target, value } => {
                write!(f, "#{}: {} := {}", self.id, target, value)
            }
            StmtKind::Branch { condition } => write!(f, "#{}: branch {}", self.id, condition),
            StmtKind::Call(site) => {
                write!(f, "#{}: ", self.id)?;
                if let Some(target) = &site.assign_to {
                    write!(f, "{} := ", target)?;
                }
                write!(f, "call {}(", site.callee)?;
                for (i, argument) in site.arguments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", argument)?;
                }
                write!(f, ")")
            }
            StmtKind::Return { value: Some(value) } => {
                write!(f, "#{}: return {}", self.id, value)
            }
            StmtKind::Return { value: None } => write!(f, "#{}: return", self.id),
        }
    }
}

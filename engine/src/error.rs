// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use thiserror::Error;

/// A failure raised by a domain transfer function that cannot evaluate its
/// input. These are never silently recovered: they abort the enclosing
/// fixpoint run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SemanticError {
    #[error("cannot evaluate expression: {0}")]
    CannotEvaluate(String),

    #[error("incompatible lattice operands: {0}")]
    IncompatibleOperands(String),

    #[error("no semantics defined for statement: {0}")]
    UnsupportedStatement(String),

    /// A nested fixpoint computation (the approximation of a callee) failed
    /// while evaluating a call statement.
    #[error("error while computing the approximation of a callee: {0}")]
    NestedFixpoint(String),

    #[error("call cycle through {0} cannot be resolved by the configured recursion solver")]
    UnsupportedRecursion(String),
}

/// A failure of a whole fixpoint computation. Wraps the semantic failure that
/// caused it, together with the statement that was being processed, or
/// signals a malformed working set. Never retried automatically.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FixpointError {
    #[error("semantic failure while processing '{statement}': {source}")]
    Semantics {
        statement: String,
        source: SemanticError,
    },

    #[error("unknown or invalid node in the working set: {0}")]
    InvalidNode(String),

    #[error("no entry state could be computed for '{0}'")]
    MissingEntryState(String),
}

/// A violation of the structural invariants of a control flow graph. These
/// are detected eagerly, before any analysis starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("entrypoint #{0} is not a node of the graph")]
    UnknownEntrypoint(u32),

    #[error("graph has no entrypoints")]
    NoEntrypoints,

    #[error("execution-stopping statement '{0}' has outgoing edges")]
    TerminatorWithFollowers(String),

    #[error("edge endpoint #{0} is not a node of the graph")]
    DanglingEdge(u32),

    #[error("conditional edge leaving '{0}', which is not a branch")]
    ConditionalEdgeWithoutBranch(String),

    #[error("control flow structure references #{0}, which is not a node of the graph")]
    StructureWithForeignNode(u32),

    #[error("variable '{0}' has a scope boundary at #{1}, which is not a node of the graph")]
    ScopeOutsideGraph(String, u32),
}

/// A failure of a whole interprocedural analysis run. Callers receive either
/// a complete, internally consistent result map or one of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// A restricted driver (such as the base-case solver used during
    /// recursion resolution) was invoked as a root analysis. This is a
    /// programming error, never recovered.
    #[error("this driver cannot be used as a root analysis")]
    RestrictedDriver,

    #[error("no procedure named '{0}' is registered in the program")]
    UnknownProcedure(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Fixpoint(#[from] FixpointError),

    #[error(transparent)]
    Semantics(#[from] SemanticError),
}

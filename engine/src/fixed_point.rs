// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::cfg::{Cfg, Edge};
use crate::error::{FixpointError, SemanticError};
use crate::statement::StatementId;
use crate::worklist::WorkingSet;

use std::collections::HashMap;

/// The operations a fixpoint computation is built from. The engine never
/// interprets states itself: everything domain-specific happens behind this
/// trait.
pub trait FixpointImplementation<S> {
    /// The transfer function of one node, given its entry state.
    fn semantics(&mut self, node: StatementId, entry: &S) -> Result<S, SemanticError>;

    /// Applies the control condition of an edge to the exit state of its
    /// source.
    fn traverse(&mut self, edge: &Edge, state: &S) -> Result<S, SemanticError>;

    /// Merges two predecessor contributions flowing into the same node.
    /// Always a least upper bound: the inputs are already-stable results,
    /// not successive approximations.
    fn union(&mut self, node: StatementId, left: &S, right: &S) -> Result<S, SemanticError>;

    /// Combines the freshly computed approximation with the previous one,
    /// deciding between lub and widening.
    fn join(&mut self, node: StatementId, approx: S, old: &S) -> Result<S, SemanticError>;

    /// The convergence test: whether `approx` brings no new information
    /// w.r.t. `old`. This is the partial order, not structural equality.
    fn equality(&mut self, node: StatementId, approx: &S, old: &S) -> Result<bool, SemanticError>;
}

/// A generic worklist fixpoint over the statements of one graph.
pub struct Fixpoint<'g> {
    graph: &'g Cfg,
}

impl<'g> Fixpoint<'g> {
    pub fn new(graph: &'g Cfg) -> Fixpoint<'g> {
        Fixpoint { graph }
    }

    fn describe(&self, node: StatementId) -> String {
        if self.graph.contains_node(node) {
            self.graph.statement(node).to_string()
        } else {
            format!("#{}", node)
        }
    }

    fn fail(&self, node: StatementId, source: SemanticError) -> FixpointError {
        FixpointError::Semantics {
            statement: self.describe(node),
            source,
        }
    }

    /// Runs the computation to stability. `starting` maps each entry
    /// statement to its initial state; the map of all converged states is
    /// returned. Any semantic failure aborts the whole run with the failing
    /// statement attached; a node outside the graph reaching the working
    /// set is a fatal configuration error.
    pub fn fixpoint<S: Clone, F: FixpointImplementation<S>>(
        &self,
        starting: &HashMap<StatementId, S>,
        ws: &mut dyn WorkingSet,
        implementation: &mut F,
    ) -> Result<HashMap<StatementId, S>, FixpointError> {
        let mut result: HashMap<StatementId, S> = HashMap::new();
        for node in starting.keys() {
            ws.push(*node);
        }
        while let Some(current) = ws.pop() {
            if !self.graph.contains_node(current) {
                return Err(FixpointError::InvalidNode(self.describe(current)));
            }
            trace!("processing {}", self.describe(current));

            let mut entry: Option<S> = starting.get(&current).cloned();
            for edge in self.graph.incoming_edges(current) {
                if let Some(exit_state) = result.get(&edge.source) {
                    let traversed = implementation
                        .traverse(edge, exit_state)
                        .map_err(|e| self.fail(current, e))?;
                    entry = Some(match entry {
                        None => traversed,
                        Some(previous) => implementation
                            .union(current, &previous, &traversed)
                            .map_err(|e| self.fail(current, e))?,
                    });
                }
            }
            let entry =
                entry.ok_or_else(|| FixpointError::MissingEntryState(self.describe(current)))?;

            let approx = implementation
                .semantics(current, &entry)
                .map_err(|e| self.fail(current, e))?;

            match result.get(&current) {
                Some(old) => {
                    let joined = implementation
                        .join(current, approx, old)
                        .map_err(|e| self.fail(current, e))?;
                    let stable = implementation
                        .equality(current, &joined, old)
                        .map_err(|e| self.fail(current, e))?;
                    if !stable {
                        result.insert(current, joined);
                        for follower in self.graph.followers(current) {
                            ws.push(follower);
                        }
                    }
                }
                None => {
                    result.insert(current, approx);
                    for follower in self.graph.followers(current) {
                        ws.push(follower);
                    }
                }
            }
        }
        Ok(result)
    }
}

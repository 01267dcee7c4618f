// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::context::CallSiteKey;
use crate::program::{CfgId, Program};
use crate::statement::StmtKind;

use log_derive::logfn_inputs;
use petgraph::algo::{condensation, tarjan_scc, toposort};
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DefaultIx, NodeIndex};
use petgraph::Graph;
use std::collections::{BTreeSet, HashMap};

type NodeIdx = NodeIndex<DefaultIx>;

/// The call graph of a program: procedures as nodes, one edge per resolved
/// call site. Call targets are resolved by callee name when the graph is
/// built; a call whose name resolves to no registered procedure is an open
/// call and gets no edge.
pub struct CallGraph {
    graph: Graph<CfgId, CallSiteKey>,
    nodes: HashMap<CfgId, NodeIdx>,
    resolved: HashMap<CallSiteKey, Vec<CfgId>>,
}

impl CallGraph {
    #[logfn_inputs(TRACE)]
    pub fn build(program: &Program) -> CallGraph {
        let mut graph = Graph::new();
        let mut nodes = HashMap::new();
        for id in program.cfg_ids() {
            nodes.insert(id, graph.add_node(id));
        }
        let mut resolved = HashMap::new();
        for caller in program.cfg_ids() {
            for statement in program.cfg(caller).statements() {
                if let StmtKind::Call(site) = &statement.kind {
                    let call: CallSiteKey = (caller, statement.id);
                    let targets: Vec<CfgId> =
                        program.lookup(&site.callee).into_iter().collect();
                    for target in &targets {
                        graph.add_edge(nodes[&caller], nodes[target], call);
                    }
                    resolved.insert(call, targets);
                }
            }
        }
        debug!(
            "call graph built: {} procedures, {} call edges",
            graph.node_count(),
            graph.edge_count()
        );
        CallGraph {
            graph,
            nodes,
            resolved,
        }
    }

    /// The candidate target procedures of the given call site. Empty for
    /// open calls.
    pub fn resolve(&self, call: CallSiteKey) -> &[CfgId] {
        self.resolved
            .get(&call)
            .map(|targets| targets.as_slice())
            .unwrap_or(&[])
    }

    /// The maximal call-graph cycles: every strongly connected component
    /// that is larger than one procedure or carries a self loop. This is a
    /// pure graph pass, independent of all iteration logic.
    pub fn recursion_components(&self) -> Vec<BTreeSet<CfgId>> {
        tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || self.graph.find_edge(component[0], component[0]).is_some()
            })
            .map(|component| {
                component
                    .into_iter()
                    .map(|node| self.graph[node])
                    .collect()
            })
            .collect()
    }

    /// A processing order in which every procedure appears after all the
    /// procedures it calls, cycles collapsed to one position. Useful for
    /// bottom-up summary computation.
    pub fn cycle_free_order(&self) -> Vec<CfgId> {
        let condensed = condensation(self.graph.clone(), true);
        let order = toposort(&condensed, None)
            .expect("the condensation of a graph has no cycles");
        order
            .into_iter()
            .rev()
            .flat_map(|node| condensed[node].clone())
            .collect()
    }

    /// Renders the call graph in Dot format for external visualization.
    pub fn to_dot(&self, program: &Program) -> String {
        let named = self.graph.map(
            |_, id| program.cfg(*id).name().to_string(),
            |_, _| (),
        );
        format!("{:?}", Dot::with_config(&named, &[Config::EdgeNoLabel]))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::ValidationError;
use crate::expression::{Expr, Identifier};
use crate::statement::{CallSite, Statement, StatementId, StmtKind};

use log_derive::logfn_inputs;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fmt::{Debug, Formatter, Result};
use std::rc::Rc;

/// The control condition carried by an edge. Conditional edges refine the
/// state with the branch condition of their source statement.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EdgeKind {
    Sequential,
    TrueBranch,
    FalseBranch,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Edge {
    pub source: StatementId,
    pub target: StatementId,
    pub kind: EdgeKind,
}

/// One entry of the variable table: where the lexical scope of a variable
/// begins and ends. A `None` boundary extends the scope to the corresponding
/// end of the graph.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VariableScope {
    pub id: Identifier,
    pub scope_start: Option<StatementId>,
    pub scope_end: Option<StatementId>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ControlFlowKind {
    Loop,
    Branching,
}

/// A structured region of the graph, anchored at its guarding condition.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ControlFlowStructure {
    pub kind: ControlFlowKind,
    pub condition: StatementId,
    pub body: BTreeSet<StatementId>,
    pub first_follower: Option<StatementId>,
}

/// Structured control-flow metadata is derived lazily: either no attempt at
/// extraction has been made yet, or the extracted structures are cached.
#[derive(Clone, Debug)]
enum ControlFlows {
    Unextracted,
    Extracted(Vec<ControlFlowStructure>),
}

/// A control flow graph: statements as nodes, conditioned edges, a set of
/// entrypoints, and a variable table recording lexical scopes. Graphs are
/// built once by a frontend and are immutable during analysis, except for
/// the memoized control-flow metadata.
#[derive(Clone)]
pub struct Cfg {
    name: Rc<str>,
    formals: Vec<Identifier>,
    statements: Vec<Statement>,
    edges: Vec<Edge>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
    entrypoints: Vec<StatementId>,
    variables: Vec<VariableScope>,
    control_flows: RefCell<ControlFlows>,
}

impl Debug for Cfg {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}/{}", self.name, self.statements.len())
    }
}

impl Cfg {
    pub fn new(name: &str, formals: &[&str]) -> Cfg {
        Cfg {
            name: Rc::from(name),
            formals: formals.iter().map(|f| Identifier::new(f)).collect(),
            statements: Vec::new(),
            edges: Vec::new(),
            outgoing: Vec::new(),
            incoming: Vec::new(),
            entrypoints: Vec::new(),
            variables: Vec::new(),
            control_flows: RefCell::new(ControlFlows::Unextracted),
        }
    }

    pub fn name(&self) -> &Rc<str> {
        &self.name
    }

    pub fn formals(&self) -> &[Identifier] {
        &self.formals
    }

    fn add_statement(&mut self, kind: StmtKind) -> StatementId {
        let id = self.statements.len() as StatementId;
        self.statements.push(Statement { id, kind });
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        id
    }

    pub fn add_skip(&mut self) -> StatementId {
        self.add_statement(StmtKind::Skip)
    }

    pub fn add_assign(&mut self, target: &str, value: Rc<Expr>) -> StatementId {
        self.add_statement(StmtKind::Assign {
            target: Identifier::new(target),
            value,
        })
    }

    pub fn add_branch(&mut self, condition: Rc<Expr>) -> StatementId {
        self.add_statement(StmtKind::Branch { condition })
    }

    pub fn add_call(
        &mut self,
        callee: &str,
        arguments: Vec<Rc<Expr>>,
        assign_to: Option<&str>,
    ) -> StatementId {
        let id = self.statements.len() as StatementId;
        self.add_statement(StmtKind::Call(CallSite {
            callee: Rc::from(callee),
            arguments,
            meta_variable: Identifier::call_meta(id),
            assign_to: assign_to.map(Identifier::new),
        }))
    }

    pub fn add_return(&mut self, value: Option<Rc<Expr>>) -> StatementId {
        self.add_statement(StmtKind::Return { value })
    }

    pub fn add_edge(&mut self, source: StatementId, target: StatementId, kind: EdgeKind) {
        let index = self.edges.len();
        self.edges.push(Edge {
            source,
            target,
            kind,
        });
        if let Some(out) = self.outgoing.get_mut(source as usize) {
            out.push(index);
        }
        if let Some(inc) = self.incoming.get_mut(target as usize) {
            inc.push(index);
        }
    }

    pub fn set_entrypoint(&mut self, id: StatementId) {
        self.entrypoints.push(id);
    }

    pub fn declare_variable(
        &mut self,
        name: &str,
        scope_start: Option<StatementId>,
        scope_end: Option<StatementId>,
    ) {
        self.variables.push(VariableScope {
            id: Identifier::new(name),
            scope_start,
            scope_end,
        });
    }

    /// Registers a structured region provided by the frontend, bypassing the
    /// extractor for this graph.
    pub fn add_control_flow_structure(&mut self, structure: ControlFlowStructure) {
        let mut flows = self.control_flows.borrow_mut();
        match &mut *flows {
            ControlFlows::Extracted(structures) => structures.push(structure),
            ControlFlows::Unextracted => *flows = ControlFlows::Extracted(vec![structure]),
        }
    }

    pub fn contains_node(&self, id: StatementId) -> bool {
        (id as usize) < self.statements.len()
    }

    pub fn statement(&self, id: StatementId) -> &Statement {
        &self.statements[id as usize]
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn entrypoints(&self) -> &[StatementId] {
        &self.entrypoints
    }

    pub fn incoming_edges(&self, id: StatementId) -> impl Iterator<Item = &Edge> + '_ {
        self.incoming[id as usize].iter().map(move |i| &self.edges[*i])
    }

    pub fn outgoing_edges(&self, id: StatementId) -> impl Iterator<Item = &Edge> + '_ {
        self.outgoing[id as usize].iter().map(move |i| &self.edges[*i])
    }

    pub fn followers(&self, id: StatementId) -> impl Iterator<Item = StatementId> + '_ {
        self.outgoing_edges(id).map(|e| e.target)
    }

    /// The number of distinct predecessor nodes of `id`; scales the widening
    /// threshold of the fixpoint engine.
    pub fn predecessor_count(&self, id: StatementId) -> usize {
        self.incoming_edges(id)
            .map(|e| e.source)
            .collect::<HashSet<_>>()
            .len()
    }

    /// The statements that end the procedure, returning control to the
    /// caller.
    pub fn exitpoints(&self) -> impl Iterator<Item = &Statement> + '_ {
        self.statements.iter().filter(|s| s.stops_execution())
    }

    /// Whether any exit of this procedure yields a value.
    pub fn returns_value(&self) -> bool {
        self.statements
            .iter()
            .any(|s| matches!(s.kind, StmtKind::Return { value: Some(_) }))
    }

    /// The variables whose lexical scope ends at the given statement.
    pub fn out_of_scope_at(&self, id: StatementId) -> Vec<Identifier> {
        self.variables
            .iter()
            .filter(|v| v.scope_end == Some(id))
            .map(|v| v.id.clone())
            .collect()
    }

    /// Checks the structural invariants of this graph. Analysis never begins
    /// on a graph that fails validation:
    /// - at least one entrypoint, all of them nodes of the graph;
    /// - every edge endpoint is a node of the graph;
    /// - execution-stopping statements have no outgoing edges;
    /// - conditional edges leave branch statements only;
    /// - variable scope boundaries are nodes of the graph;
    /// - frontend-provided control flow structures reference graph nodes.
    #[logfn_inputs(TRACE)]
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.entrypoints.is_empty() {
            return Err(ValidationError::NoEntrypoints);
        }
        for entry in &self.entrypoints {
            if !self.contains_node(*entry) {
                return Err(ValidationError::UnknownEntrypoint(*entry));
            }
        }
        for edge in &self.edges {
            if !self.contains_node(edge.source) {
                return Err(ValidationError::DanglingEdge(edge.source));
            }
            if !self.contains_node(edge.target) {
                return Err(ValidationError::DanglingEdge(edge.target));
            }
            if edge.kind != EdgeKind::Sequential
                && !matches!(
                    self.statement(edge.source).kind,
                    StmtKind::Branch { .. }
                )
            {
                return Err(ValidationError::ConditionalEdgeWithoutBranch(
                    self.statement(edge.source).to_string(),
                ));
            }
        }
        for statement in &self.statements {
            if statement.stops_execution() && self.outgoing_edges(statement.id).next().is_some() {
                return Err(ValidationError::TerminatorWithFollowers(
                    statement.to_string(),
                ));
            }
        }
        for variable in &self.variables {
            for boundary in [variable.scope_start, variable.scope_end].into_iter().flatten() {
                if !self.contains_node(boundary) {
                    return Err(ValidationError::ScopeOutsideGraph(
                        variable.id.name().to_string(),
                        boundary,
                    ));
                }
            }
        }
        if let ControlFlows::Extracted(structures) = &*self.control_flows.borrow() {
            for structure in structures {
                for node in structure.body.iter().chain(structure.first_follower.iter()) {
                    if !self.contains_node(*node) {
                        return Err(ValidationError::StructureWithForeignNode(*node));
                    }
                }
            }
        }
        Ok(())
    }

    fn reachable_from(&self, start: StatementId) -> BTreeSet<StatementId> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(start);
        while let Some(current) = queue.pop_front() {
            for follower in self.followers(current) {
                if seen.insert(follower) {
                    queue.push_back(follower);
                }
            }
        }
        seen
    }

    /// The structured regions of this graph. If no structures have been
    /// provided by a frontend and no attempt at extracting them has been
    /// made yet, this derives and caches them.
    pub fn control_flow_structures(&self) -> Vec<ControlFlowStructure> {
        if let ControlFlows::Extracted(structures) = &*self.control_flows.borrow() {
            return structures.clone();
        }
        let structures = self.extract_control_flows();
        *self.control_flows.borrow_mut() = ControlFlows::Extracted(structures.clone());
        structures
    }

    /// Reconstructs loops and branchings from the raw graph. A branch whose
    /// body can flow back to it guards a loop; any other branch guards a
    /// two-armed conditional whose body ends at the first statement reached
    /// along both arms.
    fn extract_control_flows(&self) -> Vec<ControlFlowStructure> {
        let mut structures = Vec::new();
        for statement in &self.statements {
            if !matches!(statement.kind, StmtKind::Branch { .. }) {
                continue;
            }
            let condition = statement.id;
            let reachable = self.reachable_from(condition);
            if reachable.contains(&condition) {
                // A cycle through the condition: keep the nodes that can
                // still flow back to it.
                let body: BTreeSet<StatementId> = reachable
                    .iter()
                    .copied()
                    .filter(|n| self.reachable_from(*n).contains(&condition))
                    .collect();
                let first_follower = reachable.iter().copied().find(|n| !body.contains(n));
                structures.push(ControlFlowStructure {
                    kind: ControlFlowKind::Loop,
                    condition,
                    body,
                    first_follower,
                });
            } else {
                let mut arms: Vec<BTreeSet<StatementId>> = self
                    .followers(condition)
                    .map(|f| {
                        let mut arm = self.reachable_from(f);
                        arm.insert(f);
                        arm
                    })
                    .collect();
                if arms.len() < 2 {
                    continue;
                }
                let joined: BTreeSet<StatementId> = arms
                    .iter()
                    .skip(1)
                    .fold(arms[0].clone(), |acc, arm| {
                        acc.intersection(arm).copied().collect()
                    });
                let mut body = BTreeSet::new();
                for arm in arms.drain(..) {
                    body.extend(arm.difference(&joined).copied());
                }
                structures.push(ControlFlowStructure {
                    kind: ControlFlowKind::Branching,
                    condition,
                    body,
                    first_follower: joined.iter().next().copied(),
                });
            }
        }
        structures
    }

    /// Whether the given statement is inside the body of a loop.
    pub fn is_inside_loop(&self, id: StatementId) -> bool {
        self.control_flow_structures()
            .iter()
            .any(|s| s.kind == ControlFlowKind::Loop && s.body.contains(&id))
    }

    /// The guards of all structured regions containing the given statement.
    pub fn guards_of(&self, id: StatementId) -> Vec<StatementId> {
        self.control_flow_structures()
            .iter()
            .filter(|s| s.body.contains(&id))
            .map(|s| s.condition)
            .collect()
    }
}

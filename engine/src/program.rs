// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::cfg::Cfg;
use crate::error::ValidationError;

use std::collections::HashMap;
use std::rc::Rc;

/// The index of a procedure inside its program.
pub type CfgId = usize;

/// A whole program under analysis: one control flow graph per procedure,
/// resolvable by name, plus the procedures analysis starts from.
#[derive(Debug, Default)]
pub struct Program {
    cfgs: Vec<Cfg>,
    by_name: HashMap<Rc<str>, CfgId>,
    entrypoints: Vec<CfgId>,
}

impl Program {
    pub fn new() -> Program {
        Program::default()
    }

    /// Registers a procedure. A procedure registered twice under the same
    /// name shadows the earlier one for name resolution.
    pub fn add_cfg(&mut self, cfg: Cfg) -> CfgId {
        let id = self.cfgs.len();
        self.by_name.insert(cfg.name().clone(), id);
        self.cfgs.push(cfg);
        id
    }

    /// Marks a registered procedure as a root the analysis starts from.
    pub fn add_entrypoint(&mut self, id: CfgId) {
        self.entrypoints.push(id);
    }

    pub fn cfg(&self, id: CfgId) -> &Cfg {
        &self.cfgs[id]
    }

    pub fn cfg_ids(&self) -> impl Iterator<Item = CfgId> {
        0..self.cfgs.len()
    }

    pub fn entrypoints(&self) -> &[CfgId] {
        &self.entrypoints
    }

    pub fn lookup(&self, name: &str) -> Option<CfgId> {
        self.by_name.get(name).copied()
    }

    /// Eagerly validates every registered procedure. Analysis never begins
    /// on a program with a malformed graph.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for cfg in &self.cfgs {
            cfg.validate()?;
        }
        Ok(())
    }
}

// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::program::CfgId;
use crate::statement::StatementId;

use log_derive::logfn_inputs;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter, Result};

/// One frame of a calling context: the procedure containing the call and
/// the call statement itself.
pub type CallSiteKey = (CfgId, StatementId);

/// How many distinct calling contexts an analysis keeps apart.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ContextSensitivity {
    /// Every call site maps to one shared context: a single summary per
    /// procedure. Bounded in cost, but merges all callers together.
    CallInsensitive,
    /// Contexts are call strings truncated to the most recent `k` frames.
    KLimited(usize),
    /// Contexts are full call strings. Unbounded in the absence of
    /// recursion limits.
    FullStack,
}

impl ContextSensitivity {
    pub fn is_context_sensitive(self) -> bool {
        !matches!(self, ContextSensitivity::CallInsensitive)
    }
}

/// An opaque token identifying one calling context: an immutable,
/// structurally shared chain of call sites, most recent first. Deriving a
/// child token never mutates the parent, so tokens from one analysis run
/// can be held concurrently at different depths of the call tree.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ScopeId {
    frames: rpds::List<CallSiteKey>,
}

impl ScopeId {
    /// The root token: the context of the analysis entrypoints.
    pub fn starting_id() -> ScopeId {
        ScopeId {
            frames: rpds::List::new(),
        }
    }

    /// Whether this is the root token.
    pub fn is_starting_id(&self) -> bool {
        self.frames.is_empty()
    }

    /// Derives the token for one additional call frame, under the given
    /// sensitivity policy. The call-insensitive policy collapses every
    /// token to the shared root.
    #[logfn_inputs(TRACE)]
    pub fn push(&self, call: CallSiteKey, sensitivity: ContextSensitivity) -> ScopeId {
        match sensitivity {
            ContextSensitivity::CallInsensitive => ScopeId::starting_id(),
            ContextSensitivity::FullStack => ScopeId {
                frames: self.frames.push_front(call),
            },
            ContextSensitivity::KLimited(k) => {
                let kept: Vec<CallSiteKey> =
                    std::iter::once(call).chain(self.frames.iter().copied()).take(k).collect();
                let mut frames = rpds::List::new();
                for frame in kept.into_iter().rev() {
                    frames.push_front_mut(frame);
                }
                ScopeId { frames }
            }
        }
    }

    /// The number of frames this token remembers.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

impl Display for ScopeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        if self.is_starting_id() {
            return write!(f, "<root>");
        }
        let mut first = true;
        for (cfg, statement) in self.frames.iter() {
            if !first {
                write!(f, "->")?;
            }
            write!(f, "{}:{}", cfg, statement)?;
            first = false;
        }
        Ok(())
    }
}

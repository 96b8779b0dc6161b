//! Retreat controller: non-destructive reposition of the path machine.
//!
//! Retreat never writes the timeline and never deletes a step. Unpromoted
//! steps are simply not carried forward; they stay in the recovery log for
//! debugging and recovery.

use crate::core::path::{PathMachine, PathMode};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetreatTarget {
    /// Reset to `Resume` with an empty scratch area.
    Neutral,
    /// Restore the snapshot taken at the last validated step.
    LastStable,
}

#[derive(Clone, Copy, Debug)]
pub struct RetreatConfig {
    pub preserve_history: bool,
    pub writes_to_timeline: bool,
    pub target: RetreatTarget,
}

/// Per-mode retreat contract. History is always preserved and the timeline
/// is never touched; only the target varies. Writing modes fall back to the
/// last stable position, non-writing modes to neutral.
pub fn retreat_config(mode: PathMode) -> RetreatConfig {
    let target = match mode {
        PathMode::Resume | PathMode::Exploration => RetreatTarget::Neutral,
        PathMode::NewObjective | PathMode::Decision => RetreatTarget::LastStable,
    };
    RetreatConfig {
        preserve_history: true,
        writes_to_timeline: false,
        target,
    }
}

impl PathMachine {
    /// Revert to the configured target for the current mode. Idempotent: a
    /// second consecutive retreat is a no-op.
    pub fn retreat(&mut self) {
        if self.retreated {
            return;
        }
        let config = retreat_config(self.state().mode);
        debug_assert!(config.preserve_history);
        debug_assert!(!config.writes_to_timeline);
        match config.target {
            RetreatTarget::Neutral => self.reset_to_neutral(),
            RetreatTarget::LastStable => self.restore_last_stable(),
        }
        self.retreated = true;
    }
}

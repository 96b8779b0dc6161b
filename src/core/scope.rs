//! Scope lock: a single active restriction on which data an action may
//! touch, at one of five strictly nested levels.

use crate::core::time;
use serde::{Deserialize, Serialize};

/// Lock granularity. The derived `Ord` encodes the strict nesting order
/// `Selection < Document < Project < Sphere < Global`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd)]
#[serde(rename_all = "lowercase")]
pub enum ScopeLevel {
    Selection,
    Document,
    Project,
    Sphere,
    Global,
}

impl ScopeLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeLevel::Selection => "selection",
            ScopeLevel::Document => "document",
            ScopeLevel::Project => "project",
            ScopeLevel::Sphere => "sphere",
            ScopeLevel::Global => "global",
        }
    }

    pub fn from_level_str(s: &str) -> Option<ScopeLevel> {
        match s {
            "selection" => Some(ScopeLevel::Selection),
            "document" => Some(ScopeLevel::Document),
            "project" => Some(ScopeLevel::Project),
            "sphere" => Some(ScopeLevel::Sphere),
            "global" => Some(ScopeLevel::Global),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ScopeLock {
    pub level: ScopeLevel,
    pub target_id: String,
    pub target_name: String,
    pub locked_at: String,
    pub locked_by: String,
}

/// Holder for the single active lock. Locking is cheap and frequent, so
/// acquiring replaces any prior lock unconditionally; there is no
/// "already locked" error.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ScopeLockSlot {
    active: Option<ScopeLock>,
}

impl ScopeLockSlot {
    pub fn lock(
        &mut self,
        level: ScopeLevel,
        target_id: &str,
        target_name: &str,
        locked_by: &str,
    ) -> &ScopeLock {
        self.active = Some(ScopeLock {
            level,
            target_id: target_id.to_string(),
            target_name: target_name.to_string(),
            locked_at: time::now_epoch_z(),
            locked_by: locked_by.to_string(),
        });
        self.active.as_ref().unwrap()
    }

    pub fn unlock(&mut self) {
        self.active = None;
    }

    pub fn is_locked(&self) -> bool {
        self.active.is_some()
    }

    pub fn level(&self) -> Option<ScopeLevel> {
        self.active.as_ref().map(|l| l.level)
    }

    pub fn current(&self) -> Option<&ScopeLock> {
        self.active.as_ref()
    }
}

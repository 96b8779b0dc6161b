//! Violation log: record of governance rule breaches.
//!
//! Append-only except for the `resolved` flag; entries leave the log only
//! through explicit compaction of resolved ones.

use crate::core::error::RudderError;
use crate::core::time;
use serde::{Deserialize, Serialize};

pub const RULE_BUDGET_ACCOUNTABILITY: &str = "BUDGET_ACCOUNTABILITY";
pub const RULE_HUMAN_SOVEREIGNTY: &str = "HUMAN_SOVEREIGNTY";
pub const RULE_SCOPE_CONTAINMENT: &str = "SCOPE_CONTAINMENT";
pub const RULE_APPROVAL_BACKPRESSURE: &str = "APPROVAL_BACKPRESSURE";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }

    pub fn from_severity_str(s: &str) -> Option<Severity> {
        match s {
            "warning" => Some(Severity::Warning),
            "error" => Some(Severity::Error),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GovernanceViolation {
    pub id: String,
    pub rule: String,
    pub description: String,
    pub severity: Severity,
    pub timestamp: String,
    pub resolved: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ViolationLog {
    entries: Vec<GovernanceViolation>,
}

impl ViolationLog {
    pub fn add(&mut self, rule: &str, description: &str, severity: Severity) -> String {
        let id = time::new_event_id();
        self.entries.push(GovernanceViolation {
            id: id.clone(),
            rule: rule.to_string(),
            description: description.to_string(),
            severity,
            timestamp: time::now_epoch_z(),
            resolved: false,
        });
        id
    }

    /// Explicit human resolution; this is the only path by which a
    /// `Critical` violation is ever resolved.
    pub fn resolve(&mut self, id: &str) -> Result<(), RudderError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| RudderError::NotFound(format!("violation '{id}'")))?;
        entry.resolved = true;
        Ok(())
    }

    /// Compact the log by dropping resolved entries. Returns how many were
    /// dropped.
    pub fn clear_resolved(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|v| !v.resolved);
        before - self.entries.len()
    }

    pub fn entries(&self) -> &[GovernanceViolation] {
        &self.entries
    }

    pub fn unresolved_count(&self) -> usize {
        self.entries.iter().filter(|v| !v.resolved).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

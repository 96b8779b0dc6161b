//! Approval queue: time-boxed governance decisions awaiting a human.
//!
//! Entries live for a fixed TTL and die by explicit approve, explicit
//! reject, or the lazy expiry sweep. The queue never runs the underlying
//! action; approving merely hands the entry back to the caller that
//! enqueued it.

use crate::core::error::RudderError;
use crate::core::time;
use serde::{Deserialize, Serialize};

/// Fixed approval time-to-live: 5 minutes.
pub const APPROVAL_TTL_SECS: u64 = 300;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalKind {
    Execution,
    Budget,
    ScopeChange,
    AgentAction,
}

impl ApprovalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalKind::Execution => "execution",
            ApprovalKind::Budget => "budget",
            ApprovalKind::ScopeChange => "scope_change",
            ApprovalKind::AgentAction => "agent_action",
        }
    }

    pub fn from_kind_str(s: &str) -> Option<ApprovalKind> {
        match s {
            "execution" => Some(ApprovalKind::Execution),
            "budget" => Some(ApprovalKind::Budget),
            "scope_change" => Some(ApprovalKind::ScopeChange),
            "agent_action" => Some(ApprovalKind::AgentAction),
            _ => None,
        }
    }
}

/// Collaborator-supplied description of the decision being requested.
#[derive(Clone, Debug)]
pub struct ApprovalSpec {
    pub kind: ApprovalKind,
    pub description: String,
    pub estimated_cost: u64,
    pub agent_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PendingApproval {
    pub id: String,
    pub kind: ApprovalKind,
    pub description: String,
    pub estimated_cost: u64,
    pub agent_id: Option<String>,
    pub created_at: u64,
    pub expires_at: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ApprovalQueue {
    entries: Vec<PendingApproval>,
}

impl ApprovalQueue {
    pub fn add(&mut self, spec: ApprovalSpec) -> String {
        self.add_at(spec, time::now_epoch_secs())
    }

    /// Seam for tests that need to control the clock.
    pub fn add_at(&mut self, spec: ApprovalSpec, now: u64) -> String {
        let id = time::new_event_id();
        self.entries.push(PendingApproval {
            id: id.clone(),
            kind: spec.kind,
            description: spec.description,
            estimated_cost: spec.estimated_cost,
            agent_id: spec.agent_id,
            created_at: now,
            expires_at: now + APPROVAL_TTL_SECS,
        });
        id
    }

    /// Remove and return the entry. Approval and rejection are symmetric
    /// here; the meaning of the decision is the caller's responsibility.
    pub fn approve(&mut self, id: &str) -> Result<PendingApproval, RudderError> {
        self.take(id)
    }

    pub fn reject(&mut self, id: &str) -> Result<PendingApproval, RudderError> {
        self.take(id)
    }

    /// Lazy pull-based sweep: drops every entry with `expires_at <= now`.
    pub fn clear_expired(&mut self) -> usize {
        self.clear_expired_at(time::now_epoch_secs())
    }

    pub fn clear_expired_at(&mut self, now: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.expires_at > now);
        before - self.entries.len()
    }

    pub fn unexpired_count(&self, now: u64) -> usize {
        self.entries.iter().filter(|e| e.expires_at > now).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PendingApproval] {
        &self.entries
    }

    fn take(&mut self, id: &str) -> Result<PendingApproval, RudderError> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| RudderError::NotFound(format!("pending approval '{id}'")))?;
        Ok(self.entries.remove(idx))
    }
}

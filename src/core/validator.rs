//! Execution validator and session context.
//!
//! `GovernanceSession` is the explicit, injectable context a collaborator
//! owns for the life of one human session: it holds the budget ledger,
//! scope lock, approval queue, violation log, timeline, and path machine,
//! and every state-mutating action goes through it. `validate_execution`
//! is the single allow/deny choke point; it performs no side effects, so
//! callers debit tokens or enqueue approvals themselves based on the
//! decision.

use crate::core::approvals::{ApprovalQueue, ApprovalSpec, PendingApproval};
use crate::core::budget::BudgetLedger;
use crate::core::error::RudderError;
use crate::core::path::{
    OperationId, PathMachine, PathMode, PathState, PathStep, ValidationResult,
};
use crate::core::persist::{self, GovernanceSnapshot};
use crate::core::scope::{ScopeLevel, ScopeLock, ScopeLockSlot};
use crate::core::store::Store;
use crate::core::time;
use crate::core::timeline::{TimelineEntry, TimelineStore};
use crate::core::violations::{self, Severity, ViolationLog};
use serde::{Deserialize, Serialize};

/// Backpressure valve: deny new executions once this many approvals are
/// waiting on a human.
pub const MAX_PENDING_APPROVALS: usize = 10;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionDecision {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl ExecutionDecision {
    pub fn allow() -> Self {
        ExecutionDecision {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        ExecutionDecision {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

fn default_governance_enabled() -> bool {
    true
}

/// One human, one session, one of these. Collaborators share reads freely
/// but mutate only through the methods below.
#[derive(Debug, Serialize, Deserialize)]
pub struct GovernanceSession {
    pub path: PathMachine,
    pub ledger: BudgetLedger,
    pub scope: ScopeLockSlot,
    pub approvals: ApprovalQueue,
    pub violations: ViolationLog,
    pub timeline: TimelineStore,
    #[serde(default = "default_governance_enabled")]
    governance_enabled: bool,
    #[serde(default)]
    strict_mode: bool,
    #[serde(skip)]
    store: Option<Store>,
}

impl Default for GovernanceSession {
    fn default() -> Self {
        Self::new()
    }
}

impl GovernanceSession {
    /// Fresh in-memory session with no durable store attached.
    pub fn new() -> Self {
        GovernanceSession {
            path: PathMachine::new(),
            ledger: BudgetLedger::default(),
            scope: ScopeLockSlot::default(),
            approvals: ApprovalQueue::default(),
            violations: ViolationLog::default(),
            timeline: TimelineStore::default(),
            governance_enabled: true,
            strict_mode: false,
            store: None,
        }
    }

    /// Session seeded from the store's durable snapshot.
    pub fn with_store(store: Store) -> Self {
        let snapshot = persist::load_snapshot(&store);
        let mut session = GovernanceSession::new();
        session.restore(snapshot);
        session.store = Some(store);
        session
    }

    pub fn attach_store(&mut self, store: Store) {
        self.store = Some(store);
    }

    // ----- execution validator -----

    /// The policy check. First failing rule wins; no side effects.
    pub fn validate_execution(&self, estimated_tokens: u64) -> ExecutionDecision {
        if !self.governance_enabled {
            return ExecutionDecision::allow();
        }
        let remaining = self.ledger.global.remaining();
        if estimated_tokens > remaining {
            return ExecutionDecision::deny(format!(
                "insufficient token budget: {estimated_tokens} required, {remaining} available"
            ));
        }
        if self.strict_mode && !self.scope.is_locked() {
            return ExecutionDecision::deny("scope must be locked in strict mode");
        }
        if self.approvals.unexpired_count(time::now_epoch_secs()) >= MAX_PENDING_APPROVALS {
            return ExecutionDecision::deny(
                "too many pending approvals; resolve existing ones first",
            );
        }
        ExecutionDecision::allow()
    }

    /// Collaborator entry point: sweeps expired approvals first (expiry is
    /// lazy, checked on read), then runs the pure check. `agent_id` names
    /// the requester in the audit trail; it does not change the decision.
    pub fn check_execution(
        &mut self,
        estimated_tokens: u64,
        agent_id: Option<&str>,
    ) -> ExecutionDecision {
        self.approvals.clear_expired();
        let decision = self.validate_execution(estimated_tokens);
        let outcome = if decision.allowed { "allow" } else { "deny" };
        self.audit(
            agent_id.unwrap_or("human"),
            &format!("check.execute.{outcome}"),
        );
        decision
    }

    // ----- path state machine -----

    pub fn enter_path(&mut self, mode: PathMode, intention: Option<&str>) -> &PathState {
        self.path.enter_path(mode, intention)
    }

    pub fn parse_intention(text: &str) -> PathMode {
        PathMachine::parse_intention(text)
    }

    pub fn allowed_options(&self) -> &'static [OperationId] {
        self.path.allowed_options()
    }

    pub fn execute_option(
        &mut self,
        operation: OperationId,
        payload: Option<serde_json::Value>,
    ) -> Result<Option<PathStep>, RudderError> {
        self.path.execute_option(operation, payload)
    }

    /// Resolve the pending validation request. Confirmation in a writing
    /// mode is the only way anything ever reaches the timeline.
    pub fn validate(
        &mut self,
        confirmed: bool,
        validated_by: &str,
    ) -> Result<ValidationResult, RudderError> {
        let step_index = self.path.pending_validation().map(|r| r.step_index);
        let result = self.path.validate(confirmed, validated_by)?;
        if result.can_write_to_timeline
            && let Some(idx) = step_index
            && let Some(step) = self.path.state().steps.get(idx)
        {
            self.timeline.append(TimelineEntry {
                event_id: time::new_event_id(),
                ts: time::now_epoch_z(),
                mode: self.path.state().mode,
                operation: step.operation,
                payload: step.payload.clone(),
                validated_by: validated_by.to_string(),
            });
        }
        Ok(result)
    }

    pub fn retreat(&mut self) {
        self.path.retreat();
    }

    // ----- budget ledger -----

    /// Debit tokens. A refused debit logs exactly one error-severity
    /// violation under `BUDGET_ACCOUNTABILITY`; a successful one persists
    /// the durable snapshot.
    pub fn use_tokens(&mut self, amount: u64, scope: Option<&str>) -> bool {
        let ok = self.ledger.use_tokens(amount, scope);
        if ok {
            self.persist_snapshot();
        } else {
            self.violations.add(
                violations::RULE_BUDGET_ACCOUNTABILITY,
                &format!(
                    "token debit of {amount} exceeds remaining budget of {}",
                    self.ledger.global.remaining()
                ),
                Severity::Error,
            );
        }
        ok
    }

    pub fn reserve_tokens(&mut self, amount: u64) -> bool {
        let ok = self.ledger.reserve_tokens(amount);
        if ok {
            self.persist_snapshot();
        }
        ok
    }

    pub fn release_reserved_tokens(&mut self, amount: u64) {
        self.ledger.release_reserved_tokens(amount);
        self.persist_snapshot();
    }

    pub fn can_consume(&self, scope: Option<&str>, amount: u64) -> bool {
        self.ledger.can_consume(scope, amount)
    }

    // ----- scope lock -----

    pub fn lock_scope(
        &mut self,
        level: ScopeLevel,
        target_id: &str,
        target_name: &str,
        locked_by: &str,
    ) -> &ScopeLock {
        self.scope.lock(level, target_id, target_name, locked_by)
    }

    pub fn unlock_scope(&mut self) {
        self.scope.unlock();
    }

    pub fn is_scope_locked(&self) -> bool {
        self.scope.is_locked()
    }

    pub fn scope_level(&self) -> Option<ScopeLevel> {
        self.scope.level()
    }

    // ----- approval queue -----

    pub fn add_pending_approval(&mut self, spec: ApprovalSpec) -> String {
        self.approvals.add(spec)
    }

    pub fn approve_pending(&mut self, id: &str) -> Result<PendingApproval, RudderError> {
        self.approvals.approve(id)
    }

    pub fn reject_pending(&mut self, id: &str) -> Result<PendingApproval, RudderError> {
        self.approvals.reject(id)
    }

    pub fn clear_expired_approvals(&mut self) -> usize {
        self.approvals.clear_expired()
    }

    // ----- violation log -----

    pub fn add_violation(&mut self, rule: &str, description: &str, severity: Severity) -> String {
        self.violations.add(rule, description, severity)
    }

    pub fn resolve_violation(&mut self, id: &str) -> Result<(), RudderError> {
        self.violations.resolve(id)
    }

    pub fn clear_resolved_violations(&mut self) -> usize {
        self.violations.clear_resolved()
    }

    // ----- governance flags -----

    pub fn governance_enabled(&self) -> bool {
        self.governance_enabled
    }

    /// Escape hatch for trusted/offline contexts.
    pub fn set_governance_enabled(&mut self, enabled: bool) {
        self.governance_enabled = enabled;
        self.persist_snapshot();
    }

    pub fn strict_mode(&self) -> bool {
        self.strict_mode
    }

    pub fn set_strict_mode(&mut self, strict: bool) {
        self.strict_mode = strict;
        self.persist_snapshot();
    }

    // ----- snapshot / restore -----

    pub fn snapshot(&self) -> GovernanceSnapshot {
        GovernanceSnapshot {
            ledger: self.ledger.clone(),
            governance_enabled: self.governance_enabled,
            strict_mode: self.strict_mode,
        }
    }

    pub fn restore(&mut self, snapshot: GovernanceSnapshot) {
        self.ledger = snapshot.ledger;
        self.governance_enabled = snapshot.governance_enabled;
        self.strict_mode = snapshot.strict_mode;
    }

    /// Teardown for test isolation: everything back to defaults, keeping
    /// any attached store.
    pub fn reset(&mut self) {
        let store = self.store.take();
        *self = GovernanceSession::new();
        self.store = store;
    }

    fn persist_snapshot(&self) {
        if let Some(store) = &self.store {
            persist::save_snapshot(store, &self.snapshot());
        }
    }

    fn audit(&self, actor: &str, op: &str) {
        if let Some(store) = &self.store {
            let _ = crate::core::db::with_conn(store, actor, op, |_| Ok(()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::approvals::ApprovalKind;
    use serde_json::json;

    fn approval_spec() -> ApprovalSpec {
        ApprovalSpec {
            kind: ApprovalKind::Execution,
            description: "run it".to_string(),
            estimated_cost: 10,
            agent_id: None,
        }
    }

    #[test]
    fn disabled_governance_allows_unconditionally() {
        let mut session = GovernanceSession::new();
        session.set_governance_enabled(false);
        session.set_strict_mode(true);
        // Exhaust the budget and flood the queue; still allowed.
        session.ledger.set_total(0);
        for _ in 0..MAX_PENDING_APPROVALS {
            session.add_pending_approval(approval_spec());
        }
        let decision = session.validate_execution(1_000_000);
        assert!(decision.allowed);
        assert!(decision.reason.is_none());
    }

    #[test]
    fn budget_check_names_required_and_available() {
        let mut session = GovernanceSession::new();
        session.ledger.set_total(100);
        let decision = session.validate_execution(150);
        assert!(!decision.allowed);
        let reason = decision.reason.unwrap();
        assert!(reason.contains("150"));
        assert!(reason.contains("100"));
    }

    #[test]
    fn strict_mode_requires_scope_lock() {
        let mut session = GovernanceSession::new();
        session.set_strict_mode(true);
        let decision = session.validate_execution(1);
        assert_eq!(
            decision.reason.as_deref(),
            Some("scope must be locked in strict mode")
        );

        session.lock_scope(ScopeLevel::Project, "p-1", "Garden plan", "operator");
        assert!(session.validate_execution(1).allowed);
    }

    #[test]
    fn approval_backpressure_denies_at_threshold() {
        let mut session = GovernanceSession::new();
        for _ in 0..MAX_PENDING_APPROVALS {
            session.add_pending_approval(approval_spec());
        }
        let decision = session.validate_execution(1);
        assert_eq!(
            decision.reason.as_deref(),
            Some("too many pending approvals; resolve existing ones first")
        );

        let id = session.approvals.entries()[0].id.clone();
        session.approve_pending(&id).unwrap();
        assert!(session.validate_execution(1).allowed);
    }

    #[test]
    fn budget_check_outranks_scope_check() {
        let mut session = GovernanceSession::new();
        session.set_strict_mode(true);
        session.ledger.set_total(0);
        let reason = session.validate_execution(5).reason.unwrap();
        assert!(reason.starts_with("insufficient token budget"));
    }

    #[test]
    fn failed_debit_logs_exactly_one_error_violation() {
        let mut session = GovernanceSession::new();
        session.ledger.set_total(10);
        assert!(!session.use_tokens(50, None));
        assert_eq!(session.ledger.global.used, 0);
        assert_eq!(session.violations.len(), 1);
        let violation = &session.violations.entries()[0];
        assert_eq!(violation.rule, violations::RULE_BUDGET_ACCOUNTABILITY);
        assert_eq!(violation.severity, Severity::Error);
    }

    #[test]
    fn successful_debit_logs_nothing() {
        let mut session = GovernanceSession::new();
        assert!(session.use_tokens(50, Some("health")));
        assert!(session.violations.is_empty());
    }

    #[test]
    fn validated_decision_reaches_the_timeline() {
        let mut session = GovernanceSession::new();
        session.enter_path(PathMode::Decision, None);
        session
            .execute_option(OperationId::PrepareDecision, Some(json!({"choice": "A"})))
            .unwrap()
            .unwrap();
        let result = session.validate(true, "operator").unwrap();
        assert!(result.can_write_to_timeline);
        assert_eq!(session.timeline.len(), 1);
        let entry = &session.timeline.entries()[0];
        assert_eq!(entry.operation, OperationId::PrepareDecision);
        assert_eq!(entry.validated_by, "operator");
    }

    #[test]
    fn rejected_decision_never_reaches_the_timeline() {
        let mut session = GovernanceSession::new();
        session.enter_path(PathMode::Decision, None);
        session
            .execute_option(OperationId::PrepareDecision, Some(json!({"choice": "A"})))
            .unwrap()
            .unwrap();
        let result = session.validate(false, "operator").unwrap();
        assert!(!result.validated);
        assert!(session.timeline.is_empty());
    }

    #[test]
    fn retreat_leaves_the_timeline_untouched() {
        let mut session = GovernanceSession::new();
        session.enter_path(PathMode::Decision, None);
        session
            .execute_option(OperationId::PrepareDecision, None)
            .unwrap()
            .unwrap();
        session.validate(true, "operator").unwrap();
        session.retreat();
        session.retreat();
        assert_eq!(session.timeline.len(), 1);
    }

    #[test]
    fn reset_restores_defaults() {
        let mut session = GovernanceSession::new();
        session.use_tokens(10, None);
        session.set_strict_mode(true);
        session.add_pending_approval(approval_spec());
        session.reset();
        assert_eq!(session.ledger.global.used, 0);
        assert!(!session.strict_mode());
        assert!(session.approvals.is_empty());
    }
}

//! Budget ledger: token allocation, consumption, and provisional holds.
//!
//! One global budget plus named sub-scope budgets debited in lock-step.
//! The reserve/release hold pattern is the only concurrency-safety
//! mechanism the control plane carries: a long-running collaborator
//! reserves its estimated cost up front so a second request cannot commit
//! the same tokens.

use crate::core::time;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Default allocation used when no durable state exists.
pub const DEFAULT_TOTAL_TOKENS: u64 = 10_000;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenBudget {
    pub total: u64,
    pub used: u64,
    pub reserved: u64,
    pub last_updated: String,
}

impl TokenBudget {
    pub fn new(total: u64) -> Self {
        TokenBudget {
            total,
            used: 0,
            reserved: 0,
            last_updated: time::now_epoch_z(),
        }
    }

    /// Invariant: `remaining = total - used` at all times. Derived rather
    /// than stored so the two can never drift.
    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.used)
    }
}

impl Default for TokenBudget {
    fn default() -> Self {
        TokenBudget::new(DEFAULT_TOTAL_TOKENS)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BudgetLedger {
    pub global: TokenBudget,
    pub scopes: FxHashMap<String, TokenBudget>,
}

impl BudgetLedger {
    pub fn new(total: u64) -> Self {
        BudgetLedger {
            global: TokenBudget::new(total),
            scopes: FxHashMap::default(),
        }
    }

    /// Debit `amount` from the global budget and, when `scope` is given,
    /// from that scope's budget in the same logical step. Returns `false`
    /// without mutating anything when the global remainder is insufficient;
    /// the owning session turns that refusal into a violation record.
    ///
    /// A successful debit consumes up to `amount` of any outstanding
    /// reservation, which is what keeps `reserved <= remaining` across
    /// every ledger operation.
    pub fn use_tokens(&mut self, amount: u64, scope: Option<&str>) -> bool {
        if amount > self.global.remaining() {
            return false;
        }
        let now = time::now_epoch_z();
        self.global.used += amount;
        self.global.reserved = self.global.reserved.saturating_sub(amount);
        self.global.last_updated = now.clone();
        if let Some(id) = scope {
            let scoped = self
                .scopes
                .entry(id.to_string())
                .or_insert_with(|| TokenBudget::new(0));
            scoped.used += amount;
            scoped.last_updated = now;
        }
        true
    }

    /// Provisionally hold `amount` against the remaining budget. Fails when
    /// the unreserved remainder cannot cover it.
    pub fn reserve_tokens(&mut self, amount: u64) -> bool {
        if amount > self.global.remaining().saturating_sub(self.global.reserved) {
            return false;
        }
        self.global.reserved += amount;
        self.global.last_updated = time::now_epoch_z();
        true
    }

    /// Release a hold. Never fails; floors at zero.
    pub fn release_reserved_tokens(&mut self, amount: u64) {
        self.global.reserved = self.global.reserved.saturating_sub(amount);
        self.global.last_updated = time::now_epoch_z();
    }

    /// Pure read: can the named budget (global when `scope` is `None`)
    /// cover `amount`? An unallocated scope falls back to the global
    /// remainder, since its spending is governed by the global budget.
    pub fn can_consume(&self, scope: Option<&str>, amount: u64) -> bool {
        let budget = scope
            .and_then(|id| self.scopes.get(id))
            .unwrap_or(&self.global);
        amount <= budget.remaining()
    }

    /// Seed a named sub-scope budget with its own allocation.
    pub fn allocate_scope(&mut self, scope: &str, total: u64) {
        self.scopes.insert(scope.to_string(), TokenBudget::new(total));
    }

    /// Change the global allocation. Refused without mutation when the new
    /// total cannot cover tokens already used or held, which would leave
    /// `reserved > remaining`.
    pub fn set_total(&mut self, total: u64) -> bool {
        if total < self.global.used.saturating_add(self.global.reserved) {
            return false;
        }
        self.global.total = total;
        self.global.last_updated = time::now_epoch_z();
        true
    }
}

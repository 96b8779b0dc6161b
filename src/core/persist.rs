//! Snapshot persistence: the one seam between governance logic and I/O.
//!
//! Exactly one serializable struct goes in and one comes out. The session
//! saves its snapshot fire-and-forget — a persistence failure must never
//! block or fail a governance decision, so it is swallowed here, not
//! surfaced as a violation. Loading tolerates absence and corruption by
//! yielding the documented defaults.

use crate::core::budget::BudgetLedger;
use crate::core::db;
use crate::core::error::RudderError;
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time;
use crate::core::validator::GovernanceSession;
use rusqlite::{OptionalExtension, params};
use serde::{Deserialize, Serialize};

/// The whitelisted durable subset: current budget ledger plus the two
/// governance flags. Nothing else survives a session on its own.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GovernanceSnapshot {
    pub ledger: BudgetLedger,
    pub governance_enabled: bool,
    pub strict_mode: bool,
}

impl Default for GovernanceSnapshot {
    fn default() -> Self {
        GovernanceSnapshot {
            ledger: BudgetLedger::default(),
            governance_enabled: true,
            strict_mode: false,
        }
    }
}

/// Load the durable snapshot. Absence or a corrupt record yields defaults
/// rather than an error.
pub fn load_snapshot(store: &Store) -> GovernanceSnapshot {
    match kv_get(store, schemas::KV_SNAPSHOT_KEY) {
        Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_default(),
        _ => GovernanceSnapshot::default(),
    }
}

/// Fire-and-forget snapshot write.
pub fn save_snapshot(store: &Store, snapshot: &GovernanceSnapshot) {
    let _ = try_save_snapshot(store, snapshot);
}

pub fn try_save_snapshot(
    store: &Store,
    snapshot: &GovernanceSnapshot,
) -> Result<(), RudderError> {
    let raw = serde_json::to_string(snapshot).map_err(|e| {
        RudderError::ValidationError(format!("Unable to serialize governance snapshot: {e}"))
    })?;
    kv_put(store, "rudder", "snapshot.save", schemas::KV_SNAPSHOT_KEY, &raw)
}

/// Load the CLI host's full session record, attaching the store so the
/// restored session keeps persisting. Absence or corruption yields a fresh
/// session seeded from the durable snapshot.
pub fn load_session(store: &Store) -> GovernanceSession {
    match kv_get(store, schemas::KV_SESSION_KEY) {
        Ok(Some(raw)) => match serde_json::from_str::<GovernanceSession>(&raw) {
            Ok(mut session) => {
                session.attach_store(store.clone());
                session
            }
            Err(_) => GovernanceSession::with_store(store.clone()),
        },
        _ => GovernanceSession::with_store(store.clone()),
    }
}

/// Persist the host session record. Unlike the snapshot this is allowed to
/// fail loudly: it runs at the end of a CLI invocation, not inside a
/// governance decision.
pub fn save_session(store: &Store, session: &GovernanceSession) -> Result<(), RudderError> {
    let raw = serde_json::to_string(session).map_err(|e| {
        RudderError::ValidationError(format!("Unable to serialize session record: {e}"))
    })?;
    kv_put(store, "rudder", "session.save", schemas::KV_SESSION_KEY, &raw)
}

fn kv_get(store: &Store, key: &str) -> Result<Option<String>, RudderError> {
    if !db::governance_db_path(store).exists() {
        return Ok(None);
    }
    db::with_conn(store, "rudder", "kv.get", |conn| {
        conn.query_row(
            "SELECT value FROM kv WHERE key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(RudderError::RusqliteError)
    })
}

fn kv_put(store: &Store, actor: &str, op: &str, key: &str, value: &str) -> Result<(), RudderError> {
    db::with_conn(store, actor, op, |conn| {
        conn.execute(
            "INSERT INTO kv(key, value, updated_at) VALUES(?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            params![key, value, time::now_epoch_z()],
        )?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_store_yields_defaults() {
        let tmp = tempdir().unwrap();
        let store = Store::in_dir(tmp.path());
        let snapshot = load_snapshot(&store);
        assert!(snapshot.governance_enabled);
        assert!(!snapshot.strict_mode);
        assert_eq!(snapshot.ledger.global.used, 0);
    }

    #[test]
    fn snapshot_roundtrip() {
        let tmp = tempdir().unwrap();
        let store = Store::in_dir(tmp.path());
        db::initialize_governance_db(&store).unwrap();

        let mut snapshot = GovernanceSnapshot::default();
        snapshot.ledger.use_tokens(250, Some("health"));
        snapshot.strict_mode = true;
        try_save_snapshot(&store, &snapshot).unwrap();

        let restored = load_snapshot(&store);
        assert_eq!(restored.ledger.global.used, 250);
        assert_eq!(restored.ledger.scopes["health"].used, 250);
        assert!(restored.strict_mode);
    }

    #[test]
    fn corrupt_snapshot_yields_defaults() {
        let tmp = tempdir().unwrap();
        let store = Store::in_dir(tmp.path());
        db::initialize_governance_db(&store).unwrap();
        kv_put(
            &store,
            "rudder",
            "snapshot.save",
            schemas::KV_SNAPSHOT_KEY,
            "{not json",
        )
        .unwrap();

        let snapshot = load_snapshot(&store);
        assert!(snapshot.governance_enabled);
        assert_eq!(snapshot.ledger.global.used, 0);
    }

    #[test]
    fn save_snapshot_swallows_unwritable_store() {
        let tmp = tempdir().unwrap();
        // Store directory was never initialized; the write fails inside.
        let store = Store::at(tmp.path().join("missing").join(".rudder"));
        save_snapshot(&store, &GovernanceSnapshot::default());
        assert!(!store.exists());
    }
}

//! Serialized access to the governance database.
//!
//! Every mutation routes through `with_conn`, which holds an in-process
//! lock and appends an audit event. None of the public session methods are
//! safe under interleaving on their own; this is the single critical
//! section the concurrency model requires.

use crate::core::error::RudderError;
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuditEvent {
    pub ts: String,
    pub event_id: String,
    pub actor: String,
    pub op: String,
    pub status: String,
}

pub fn governance_db_path(store: &Store) -> PathBuf {
    store.root.join(schemas::GOVERNANCE_DB_NAME)
}

pub fn db_connect(db_path: &str) -> Result<Connection, RudderError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(RudderError::RusqliteError)?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
        .map_err(RudderError::RusqliteError)?;
    Ok(conn)
}

/// Ensure the store directory and schema exist.
pub fn initialize_governance_db(store: &Store) -> Result<(), RudderError> {
    fs::create_dir_all(&store.root)
        .map_err(|e| RudderError::StoreInitializationError(e.to_string()))?;
    with_conn(store, "rudder", "store.init", |conn| {
        conn.execute(schemas::GOVERNANCE_DB_SCHEMA_KV, [])?;
        Ok(())
    })
}

/// Execute a closure with a serialized connection to the governance DB and
/// append an audit event recording the outcome.
pub fn with_conn<F, R>(store: &Store, actor: &str, op_name: &str, f: F) -> Result<R, RudderError>
where
    F: FnOnce(&Connection) -> Result<R, RudderError>,
{
    static DB_LOCK: Mutex<()> = Mutex::new(());
    let _lock = DB_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    let db_path = governance_db_path(store);
    let conn = db_connect(&db_path.to_string_lossy())?;
    let result = f(&conn);

    let status = if result.is_ok() { "success" } else { "error" };
    log_event(store, actor, op_name, status)?;
    result
}

fn log_event(store: &Store, actor: &str, op: &str, status: &str) -> Result<(), RudderError> {
    use std::fs::OpenOptions;
    use std::io::Write;

    let ev = AuditEvent {
        ts: time::now_epoch_z(),
        event_id: time::new_event_id(),
        actor: actor.to_string(),
        op: op.to_string(),
        status: status.to_string(),
    };

    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(store.root.join(schemas::AUDIT_LOG_NAME))
        .map_err(RudderError::IoError)?;
    writeln!(
        f,
        "{}",
        serde_json::to_string(&ev).map_err(|e| RudderError::ValidationError(format!(
            "Unable to serialize audit event: {e}"
        )))?
    )
    .map_err(RudderError::IoError)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn init_creates_db_and_audit_log() {
        let tmp = tempdir().unwrap();
        let store = Store::in_dir(tmp.path());
        initialize_governance_db(&store).unwrap();
        assert!(governance_db_path(&store).exists());

        let audit = store.root.join(schemas::AUDIT_LOG_NAME);
        let content = std::fs::read_to_string(audit).unwrap();
        let event: AuditEvent = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(event.op, "store.init");
        assert_eq!(event.status, "success");
    }
}

//! Centralized schema definitions for the Rudder governance store.
//!
//! One SQLite database holds everything durable: a key/value table for the
//! whitelisted snapshot subset (budget ledger, governance flag, strict-mode
//! flag) and the host session record.

pub const GOVERNANCE_DB_NAME: &str = "governance.db";

pub const GOVERNANCE_DB_SCHEMA_KV: &str = "
    CREATE TABLE IF NOT EXISTS kv (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
";

/// JSONL audit trail of store mutations, one event per line.
pub const AUDIT_LOG_NAME: &str = "governance.events.jsonl";

/// kv key for the durable governance snapshot (ledger + flags).
pub const KV_SNAPSHOT_KEY: &str = "governance.snapshot";

/// kv key for the CLI host's full session record.
pub const KV_SESSION_KEY: &str = "governance.session";

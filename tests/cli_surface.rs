//! End-to-end tests for the `rudder` CLI: every command answers with a JSON
//! envelope, and session state survives between invocations via the store.

use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn run_rudder(dir: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_rudder"))
        .current_dir(dir)
        .args(args)
        .output()
        .expect("run rudder")
}

fn envelope(out: &std::process::Output) -> serde_json::Value {
    assert!(
        out.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    let stdout = String::from_utf8_lossy(&out.stdout);
    let line = stdout.lines().next().expect("envelope line");
    serde_json::from_str(line).expect("envelope json")
}

fn setup_store() -> TempDir {
    let tmp = TempDir::new().expect("tmpdir");
    let out = run_rudder(tmp.path(), &["init"]);
    assert!(
        out.status.success(),
        "rudder init failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    tmp
}

#[test]
fn commands_refuse_to_run_without_a_store() {
    let tmp = TempDir::new().expect("tmpdir");
    let out = run_rudder(tmp.path(), &["budget", "show"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("rudder init"));
}

#[test]
fn init_is_guarded_against_accidental_reinit() {
    let tmp = TempDir::new().expect("tmpdir");

    let first = envelope(&run_rudder(tmp.path(), &["init"]));
    assert_eq!(first["cmd"], "init");
    assert_eq!(first["status"], "ok");
    assert!(tmp.path().join(".rudder").join("governance.db").exists());

    let again = run_rudder(tmp.path(), &["init"]);
    assert!(!again.status.success());

    let forced = envelope(&run_rudder(tmp.path(), &["init", "--force"]));
    assert_eq!(forced["status"], "ok");
}

#[test]
fn budget_debits_persist_and_overdrafts_log_violations() {
    let tmp = setup_store();

    envelope(&run_rudder(tmp.path(), &["budget", "set", "--total", "1000"]));
    let used = envelope(&run_rudder(tmp.path(), &["budget", "use", "--amount", "400"]));
    assert_eq!(used["status"], "ok");
    assert_eq!(used["remaining"], 600);

    let denied = envelope(&run_rudder(
        tmp.path(),
        &["budget", "use", "--amount", "700"],
    ));
    assert_eq!(denied["status"], "denied");
    assert_eq!(denied["remaining"], 600);
    assert_eq!(denied["violations"], 1);

    let shown = envelope(&run_rudder(tmp.path(), &["budget", "show"]));
    assert_eq!(shown["used"], 400);
    assert_eq!(shown["remaining"], 600);

    let violations = envelope(&run_rudder(tmp.path(), &["violation", "list"]));
    assert_eq!(violations["unresolved"], 1);
}

#[test]
fn budget_set_cannot_strand_spent_or_held_tokens() {
    let tmp = setup_store();

    envelope(&run_rudder(tmp.path(), &["budget", "set", "--total", "100"]));
    envelope(&run_rudder(tmp.path(), &["budget", "use", "--amount", "80"]));
    envelope(&run_rudder(tmp.path(), &["budget", "reserve", "--amount", "10"]));

    let denied = envelope(&run_rudder(tmp.path(), &["budget", "set", "--total", "50"]));
    assert_eq!(denied["status"], "denied");
    assert_eq!(denied["total"], 100);
    assert_eq!(denied["remaining"], 20);

    let lowered = envelope(&run_rudder(tmp.path(), &["budget", "set", "--total", "90"]));
    assert_eq!(lowered["status"], "ok");
    assert_eq!(lowered["remaining"], 10);
}

#[test]
fn scoped_debit_tracks_both_ledgers() {
    let tmp = setup_store();

    envelope(&run_rudder(
        tmp.path(),
        &["budget", "allocate", "--scope", "health", "--total", "500"],
    ));
    envelope(&run_rudder(
        tmp.path(),
        &["budget", "use", "--amount", "200", "--scope", "health"],
    ));

    let shown = envelope(&run_rudder(tmp.path(), &["budget", "show"]));
    assert_eq!(shown["used"], 200);
    assert_eq!(shown["scopes"]["health"]["used"], 200);

    let can = envelope(&run_rudder(
        tmp.path(),
        &["budget", "can", "--amount", "400", "--scope", "health"],
    ));
    assert_eq!(can["can_consume"], false);
}

#[test]
fn decision_path_reaches_the_timeline_only_after_confirmation() {
    let tmp = setup_store();

    let entered = envelope(&run_rudder(
        tmp.path(),
        &["path", "enter", "--mode", "decision"],
    ));
    assert_eq!(entered["mode"], "decision");
    assert_eq!(entered["intention"], "I'm committing to a choice");

    let executed = envelope(&run_rudder(
        tmp.path(),
        &[
            "path",
            "exec",
            "--op",
            "prepare-decision",
            "--payload",
            r#"{"choice":"A"}"#,
        ],
    ));
    assert_eq!(executed["status"], "ok");
    assert_eq!(executed["pending"], true);

    let empty = envelope(&run_rudder(tmp.path(), &["timeline"]));
    assert_eq!(empty["count"], 0);

    let validated = envelope(&run_rudder(
        tmp.path(),
        &["path", "validate", "--confirm", "--by", "reviewer"],
    ));
    assert_eq!(validated["validated"], true);
    assert_eq!(validated["can_write_to_timeline"], true);
    assert_eq!(validated["timeline_len"], 1);

    let timeline = envelope(&run_rudder(tmp.path(), &["timeline"]));
    assert_eq!(timeline["count"], 1);
    assert_eq!(timeline["entries"][0]["operation"], "prepare-decision");
    assert_eq!(timeline["entries"][0]["validated_by"], "reviewer");
}

#[test]
fn operations_outside_the_mode_are_ignored_not_errors() {
    let tmp = setup_store();

    envelope(&run_rudder(
        tmp.path(),
        &["path", "enter", "--mode", "resume"],
    ));
    let ignored = envelope(&run_rudder(
        tmp.path(),
        &["path", "exec", "--op", "prepare-decision"],
    ));
    assert_eq!(ignored["status"], "ignored");

    let unknown = run_rudder(tmp.path(), &["path", "exec", "--op", "summon-dragon"]);
    assert!(!unknown.status.success());
}

#[test]
fn intent_classification_defaults_to_exploration() {
    let tmp = setup_store();

    let resume = envelope(&run_rudder(
        tmp.path(),
        &["path", "intent", "--text", "picking up where I left off"],
    ));
    assert_eq!(resume["mode"], "resume");

    let unknown = envelope(&run_rudder(
        tmp.path(),
        &["path", "intent", "--text", "hmm, not sure yet"],
    ));
    assert_eq!(unknown["mode"], "exploration");
}

#[test]
fn options_follow_the_current_mode() {
    let tmp = setup_store();

    envelope(&run_rudder(
        tmp.path(),
        &["path", "enter", "--mode", "exploration"],
    ));
    let options = envelope(&run_rudder(tmp.path(), &["path", "options"]));
    let listed: Vec<&str> = options["options"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(listed, vec!["take-notes", "switch-focus", "mark-idea"]);
}

#[test]
fn strict_mode_denies_checks_until_a_scope_is_locked() {
    let tmp = setup_store();

    envelope(&run_rudder(
        tmp.path(),
        &["governance", "strict", "--mode", "on"],
    ));

    let denied = envelope(&run_rudder(tmp.path(), &["check", "--tokens", "10"]));
    assert_eq!(denied["status"], "deny");
    assert_eq!(denied["reason"], "scope must be locked in strict mode");

    envelope(&run_rudder(
        tmp.path(),
        &[
            "scope",
            "lock",
            "--level",
            "project",
            "--target-id",
            "p-1",
            "--target-name",
            "Garden plan",
        ],
    ));
    let allowed = envelope(&run_rudder(tmp.path(), &["check", "--tokens", "10"]));
    assert_eq!(allowed["status"], "allow");

    let status = envelope(&run_rudder(tmp.path(), &["scope", "status"]));
    assert_eq!(status["locked"], true);
    assert_eq!(status["lock"]["level"], "project");
}

#[test]
fn check_estimates_token_cost_from_text() {
    let tmp = setup_store();

    let out = envelope(&run_rudder(
        tmp.path(),
        &["check", "--text", "plan my week and draft the summary"],
    ));
    assert_eq!(out["status"], "allow");
    assert!(out["estimated_tokens"].as_u64().unwrap() > 0);
}

#[test]
fn approvals_round_trip_through_the_queue() {
    let tmp = setup_store();

    let added = envelope(&run_rudder(
        tmp.path(),
        &[
            "approval",
            "add",
            "--kind",
            "agent_action",
            "--description",
            "draft the weekly email",
            "--cost",
            "50",
            "--agent",
            "agent-a",
        ],
    ));
    let id = added["id"].as_str().unwrap().to_string();
    assert_eq!(added["pending"], 1);

    let listed = envelope(&run_rudder(tmp.path(), &["approval", "list"]));
    assert_eq!(listed["entries"][0]["kind"], "agent_action");

    let approved = envelope(&run_rudder(tmp.path(), &["approval", "approve", "--id", &id]));
    assert_eq!(approved["id"], id.as_str());

    let after = envelope(&run_rudder(tmp.path(), &["approval", "list"]));
    assert_eq!(after["pending"], 0);

    let missing = run_rudder(tmp.path(), &["approval", "reject", "--id", &id]);
    assert!(!missing.status.success());
}

#[test]
fn governance_disable_is_a_blanket_allow() {
    let tmp = setup_store();

    envelope(&run_rudder(tmp.path(), &["budget", "set", "--total", "0"]));
    let denied = envelope(&run_rudder(tmp.path(), &["check", "--tokens", "10"]));
    assert_eq!(denied["status"], "deny");

    let flags = envelope(&run_rudder(tmp.path(), &["governance", "disable"]));
    assert_eq!(flags["governance_enabled"], false);

    let allowed = envelope(&run_rudder(tmp.path(), &["check", "--tokens", "10"]));
    assert_eq!(allowed["status"], "allow");
}

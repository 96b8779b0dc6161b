//! CLI struct definitions and dispatch for the `rudder` binary.
//!
//! The CLI is the reference collaborator: it loads the session record from
//! the store, applies exactly one command, and saves the record back. Every
//! command answers with a JSON envelope on stdout.

use crate::core::approvals::{ApprovalKind, ApprovalSpec};
use crate::core::db;
use crate::core::error::RudderError;
use crate::core::path::{OperationId, PathMachine, PathMode};
use crate::core::persist;
use crate::core::scope::ScopeLevel;
use crate::core::store::Store;
use crate::core::time;
use crate::core::validator::GovernanceSession;
use crate::core::violations::Severity;

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::json;

#[derive(Parser, Debug)]
#[clap(
    name = "rudder",
    version = env!("CARGO_PKG_VERSION"),
    about = "Rudder is the daemonless, local-first governed execution control plane: it classifies human intent into one of four paths, gates what may ever be written to the timeline, and holds every action to its token budget, scope lock, and approval queue."
)]
pub(crate) struct Cli {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Initialize the .rudder store in the current directory.
    Init {
        /// Reinitialize even if a store already exists.
        #[clap(long)]
        force: bool,
    },
    /// Path state machine: enter modes, execute options, validate steps.
    Path(PathCli),
    /// Token budget ledger: debits, reservations, sub-scope allocations.
    Budget(BudgetCli),
    /// The single active scope lock.
    Scope(ScopeCli),
    /// Time-boxed approvals awaiting a human decision.
    Approval(ApprovalCli),
    /// Governance rule violations.
    Violation(ViolationCli),
    /// Run the execution validator against an estimated token cost.
    Check {
        /// Estimated cost in tokens.
        #[clap(long)]
        tokens: Option<u64>,
        /// Estimate the cost from prompt text instead.
        #[clap(long)]
        text: Option<String>,
        /// Requesting agent identity (for the audit trail).
        #[clap(long)]
        agent: Option<String>,
    },
    /// Governance flags: the global enable switch and strict mode.
    Governance(GovernanceCli),
    /// Show the append-only timeline of validated actions.
    Timeline,
}

#[derive(clap::Args, Debug)]
pub(crate) struct PathCli {
    #[clap(subcommand)]
    pub command: PathCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum PathCommand {
    /// Enter a path mode: resume | new-objective | exploration | decision.
    Enter {
        #[clap(long)]
        mode: String,
        /// Intention phrase (defaults to the mode's canonical phrase).
        #[clap(long)]
        intent: Option<String>,
    },
    /// Classify free-text intent into a mode without entering it.
    Intent {
        #[clap(long)]
        text: String,
    },
    /// Execute an operation in the current mode.
    Exec {
        #[clap(long)]
        op: String,
        /// JSON payload for the operation.
        #[clap(long)]
        payload: Option<String>,
    },
    /// Resolve the pending validation request.
    Validate {
        /// Confirm the step (omit to reject it).
        #[clap(long)]
        confirm: bool,
        #[clap(long, default_value = "operator")]
        by: String,
    },
    /// Revert to the configured retreat target. Never writes the timeline.
    Retreat,
    /// Show the current path state.
    Status,
    /// List operations legal in the current mode.
    Options,
}

#[derive(clap::Args, Debug)]
pub(crate) struct BudgetCli {
    #[clap(subcommand)]
    pub command: BudgetCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum BudgetCommand {
    /// Show the ledger.
    Show,
    /// Set the global allocation.
    Set {
        #[clap(long)]
        total: u64,
    },
    /// Debit tokens from the global budget (and a sub-scope, if given).
    Use {
        #[clap(long)]
        amount: u64,
        #[clap(long)]
        scope: Option<String>,
    },
    /// Provisionally hold tokens for an in-flight action.
    Reserve {
        #[clap(long)]
        amount: u64,
    },
    /// Release a provisional hold.
    Release {
        #[clap(long)]
        amount: u64,
    },
    /// Seed a named sub-scope budget.
    Allocate {
        #[clap(long)]
        scope: String,
        #[clap(long)]
        total: u64,
    },
    /// Pure read: can the named budget cover the amount?
    Can {
        #[clap(long)]
        amount: u64,
        #[clap(long)]
        scope: Option<String>,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct ScopeCli {
    #[clap(subcommand)]
    pub command: ScopeCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum ScopeCommand {
    /// Acquire the lock, replacing any prior one.
    Lock {
        /// selection | document | project | sphere | global
        #[clap(long)]
        level: String,
        #[clap(long)]
        target_id: String,
        #[clap(long)]
        target_name: String,
        #[clap(long, default_value = "operator")]
        by: String,
    },
    /// Clear the lock.
    Unlock,
    /// Show the current lock.
    Status,
}

#[derive(clap::Args, Debug)]
pub(crate) struct ApprovalCli {
    #[clap(subcommand)]
    pub command: ApprovalCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum ApprovalCommand {
    /// Enqueue a decision for a human: execution | budget | scope_change | agent_action.
    Add {
        #[clap(long)]
        kind: String,
        #[clap(long)]
        description: String,
        #[clap(long, default_value_t = 0)]
        cost: u64,
        #[clap(long)]
        agent: Option<String>,
    },
    /// Approve and remove the entry.
    Approve {
        #[clap(long)]
        id: String,
    },
    /// Reject and remove the entry.
    Reject {
        #[clap(long)]
        id: String,
    },
    /// Sweep expired entries.
    Sweep,
    /// List pending entries.
    List,
}

#[derive(clap::Args, Debug)]
pub(crate) struct ViolationCli {
    #[clap(subcommand)]
    pub command: ViolationCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum ViolationCommand {
    /// Record a violation: severity warning | error | critical.
    Add {
        #[clap(long)]
        rule: String,
        #[clap(long)]
        description: String,
        #[clap(long, default_value = "warning")]
        severity: String,
    },
    /// Mark a violation resolved (the only path for critical ones).
    Resolve {
        #[clap(long)]
        id: String,
    },
    /// Drop resolved entries from the log.
    Compact,
    /// List violations.
    List,
}

#[derive(clap::Args, Debug)]
pub(crate) struct GovernanceCli {
    #[clap(subcommand)]
    pub command: GovernanceCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum GovernanceCommand {
    /// Re-enable governance checks.
    Enable,
    /// Disable all governance checks (trusted/offline escape hatch).
    Disable,
    /// Toggle strict mode: "on" requires a scope lock for every execution.
    Strict {
        /// on | off
        #[clap(long)]
        mode: String,
    },
    /// Show the flags.
    Status,
}

pub(crate) fn dispatch(cli: Cli) -> Result<(), RudderError> {
    let cwd = std::env::current_dir().map_err(RudderError::IoError)?;
    let store = Store::in_dir(&cwd);

    if let Command::Init { force } = &cli.command {
        return run_init(&store, *force);
    }
    if !store.exists() {
        return Err(RudderError::ValidationError(
            "No .rudder store found. Run `rudder init` first.".to_string(),
        ));
    }

    let mut session = persist::load_session(&store);
    match cli.command {
        Command::Init { .. } => unreachable!("handled above"),
        Command::Path(cli) => run_path(&mut session, cli.command)?,
        Command::Budget(cli) => run_budget(&mut session, cli.command)?,
        Command::Scope(cli) => run_scope(&mut session, cli.command)?,
        Command::Approval(cli) => run_approval(&mut session, cli.command)?,
        Command::Violation(cli) => run_violation(&mut session, cli.command)?,
        Command::Check {
            tokens,
            text,
            agent,
        } => run_check(&mut session, tokens, text, agent.as_deref())?,
        Command::Governance(cli) => run_governance(&mut session, cli.command)?,
        Command::Timeline => {
            emit(
                "timeline.list",
                "ok",
                json!({
                    "count": session.timeline.len(),
                    "entries": serde_json::to_value(session.timeline.entries())
                        .unwrap_or(serde_json::Value::Null)
                }),
            );
        }
    }
    persist::save_session(&store, &session)?;
    persist::save_snapshot(&store, &session.snapshot());
    Ok(())
}

fn run_init(store: &Store, force: bool) -> Result<(), RudderError> {
    if store.exists() && !force {
        return Err(RudderError::ValidationError(
            "Store already initialized (use --force to reinitialize).".to_string(),
        ));
    }
    db::initialize_governance_db(store)?;
    let session = GovernanceSession::with_store(store.clone());
    persist::try_save_snapshot(store, &session.snapshot())?;
    persist::save_session(store, &session)?;
    emit(
        "init",
        "ok",
        json!({ "root": store.root.display().to_string() }),
    );
    Ok(())
}

fn run_path(session: &mut GovernanceSession, command: PathCommand) -> Result<(), RudderError> {
    match command {
        PathCommand::Enter { mode, intent } => {
            let mode = parse_mode(&mode)?;
            let intention = session.enter_path(mode, intent.as_deref()).intention.clone();
            emit(
                "path.enter",
                "ok",
                json!({ "mode": mode.as_str(), "intention": intention }),
            );
        }
        PathCommand::Intent { text } => {
            let mode = PathMachine::parse_intention(&text);
            emit("path.intent", "ok", json!({ "mode": mode.as_str() }));
        }
        PathCommand::Exec { op, payload } => {
            let operation = OperationId::from_op_str(&op).ok_or_else(|| {
                RudderError::ValidationError(format!("unknown operation '{op}'"))
            })?;
            let payload = payload
                .map(|raw| {
                    serde_json::from_str(&raw).map_err(|e| {
                        RudderError::ValidationError(format!("invalid JSON payload: {e}"))
                    })
                })
                .transpose()?;
            match session.execute_option(operation, payload)? {
                Some(step) => emit(
                    "path.exec",
                    "ok",
                    json!({
                        "operation": operation.as_str(),
                        "validation": serde_json::to_value(step.validation)
                            .unwrap_or(serde_json::Value::Null),
                        "pending": session.path.pending_validation().is_some()
                    }),
                ),
                None => emit(
                    "path.exec",
                    "ignored",
                    json!({
                        "operation": operation.as_str(),
                        "reason": "operation not allowed in current mode"
                    }),
                ),
            }
        }
        PathCommand::Validate { confirm, by } => {
            let result = session.validate(confirm, &by)?;
            emit(
                "path.validate",
                "ok",
                json!({
                    "validated": result.validated,
                    "validated_by": result.validated_by,
                    "can_write_to_timeline": result.can_write_to_timeline,
                    "timeline_len": session.timeline.len()
                }),
            );
        }
        PathCommand::Retreat => {
            session.retreat();
            emit(
                "path.retreat",
                "ok",
                json!({ "mode": session.path.state().mode.as_str() }),
            );
        }
        PathCommand::Status => {
            let state = session.path.state();
            emit(
                "path.status",
                "ok",
                json!({
                    "mode": state.mode.as_str(),
                    "intention": state.intention.clone(),
                    "steps": state.steps.len(),
                    "pending": state.pending.is_some(),
                    "notes": state.scratch.notes.len(),
                    "marked": state.scratch.marked.len()
                }),
            );
            println!(
                "{} {} ({} steps)",
                "path:".bright_cyan().bold(),
                state.mode.as_str().bright_white(),
                state.steps.len()
            );
        }
        PathCommand::Options => {
            let options: Vec<&str> = session
                .allowed_options()
                .iter()
                .map(|op| op.as_str())
                .collect();
            emit("path.options", "ok", json!({ "options": options }));
        }
    }
    Ok(())
}

fn run_budget(session: &mut GovernanceSession, command: BudgetCommand) -> Result<(), RudderError> {
    match command {
        BudgetCommand::Show => {
            emit(
                "budget.show",
                "ok",
                json!({
                    "total": session.ledger.global.total,
                    "used": session.ledger.global.used,
                    "remaining": session.ledger.global.remaining(),
                    "reserved": session.ledger.global.reserved,
                    "scopes": serde_json::to_value(&session.ledger.scopes)
                        .unwrap_or(serde_json::Value::Null)
                }),
            );
        }
        BudgetCommand::Set { total } => {
            let ok = session.ledger.set_total(total);
            emit(
                "budget.set",
                if ok { "ok" } else { "denied" },
                json!({
                    "total": session.ledger.global.total,
                    "remaining": session.ledger.global.remaining()
                }),
            );
        }
        BudgetCommand::Use { amount, scope } => {
            let ok = session.use_tokens(amount, scope.as_deref());
            emit(
                "budget.use",
                if ok { "ok" } else { "denied" },
                json!({
                    "amount": amount,
                    "remaining": session.ledger.global.remaining(),
                    "violations": session.violations.unresolved_count()
                }),
            );
        }
        BudgetCommand::Reserve { amount } => {
            let ok = session.reserve_tokens(amount);
            emit(
                "budget.reserve",
                if ok { "ok" } else { "denied" },
                json!({ "amount": amount, "reserved": session.ledger.global.reserved }),
            );
        }
        BudgetCommand::Release { amount } => {
            session.release_reserved_tokens(amount);
            emit(
                "budget.release",
                "ok",
                json!({ "amount": amount, "reserved": session.ledger.global.reserved }),
            );
        }
        BudgetCommand::Allocate { scope, total } => {
            session.ledger.allocate_scope(&scope, total);
            emit(
                "budget.allocate",
                "ok",
                json!({ "scope": scope, "total": total }),
            );
        }
        BudgetCommand::Can { amount, scope } => {
            let ok = session.can_consume(scope.as_deref(), amount);
            emit(
                "budget.can",
                "ok",
                json!({ "amount": amount, "can_consume": ok }),
            );
        }
    }
    Ok(())
}

fn run_scope(session: &mut GovernanceSession, command: ScopeCommand) -> Result<(), RudderError> {
    match command {
        ScopeCommand::Lock {
            level,
            target_id,
            target_name,
            by,
        } => {
            let level = ScopeLevel::from_level_str(&level).ok_or_else(|| {
                RudderError::ValidationError(format!(
                    "unknown scope level '{level}' (selection|document|project|sphere|global)"
                ))
            })?;
            let lock = session.lock_scope(level, &target_id, &target_name, &by);
            emit(
                "scope.lock",
                "ok",
                json!({
                    "level": lock.level.as_str(),
                    "target_id": lock.target_id.clone(),
                    "target_name": lock.target_name.clone(),
                    "locked_by": lock.locked_by.clone()
                }),
            );
        }
        ScopeCommand::Unlock => {
            session.unlock_scope();
            emit("scope.unlock", "ok", json!({ "locked": false }));
        }
        ScopeCommand::Status => {
            emit(
                "scope.status",
                "ok",
                json!({
                    "locked": session.is_scope_locked(),
                    "lock": serde_json::to_value(session.scope.current())
                        .unwrap_or(serde_json::Value::Null)
                }),
            );
        }
    }
    Ok(())
}

fn run_approval(
    session: &mut GovernanceSession,
    command: ApprovalCommand,
) -> Result<(), RudderError> {
    match command {
        ApprovalCommand::Add {
            kind,
            description,
            cost,
            agent,
        } => {
            let kind = ApprovalKind::from_kind_str(&kind).ok_or_else(|| {
                RudderError::ValidationError(format!(
                    "unknown approval kind '{kind}' (execution|budget|scope_change|agent_action)"
                ))
            })?;
            let id = session.add_pending_approval(ApprovalSpec {
                kind,
                description,
                estimated_cost: cost,
                agent_id: agent,
            });
            emit(
                "approval.add",
                "ok",
                json!({ "id": id, "pending": session.approvals.len() }),
            );
        }
        ApprovalCommand::Approve { id } => {
            let entry = session.approve_pending(&id)?;
            emit(
                "approval.approve",
                "ok",
                json!({ "id": entry.id, "kind": entry.kind.as_str(), "description": entry.description }),
            );
        }
        ApprovalCommand::Reject { id } => {
            let entry = session.reject_pending(&id)?;
            emit(
                "approval.reject",
                "ok",
                json!({ "id": entry.id, "kind": entry.kind.as_str(), "description": entry.description }),
            );
        }
        ApprovalCommand::Sweep => {
            let removed = session.clear_expired_approvals();
            emit(
                "approval.sweep",
                "ok",
                json!({ "removed": removed, "pending": session.approvals.len() }),
            );
        }
        ApprovalCommand::List => {
            emit(
                "approval.list",
                "ok",
                json!({
                    "pending": session.approvals.len(),
                    "entries": serde_json::to_value(session.approvals.entries())
                        .unwrap_or(serde_json::Value::Null)
                }),
            );
        }
    }
    Ok(())
}

fn run_violation(
    session: &mut GovernanceSession,
    command: ViolationCommand,
) -> Result<(), RudderError> {
    match command {
        ViolationCommand::Add {
            rule,
            description,
            severity,
        } => {
            let severity = Severity::from_severity_str(&severity).ok_or_else(|| {
                RudderError::ValidationError(format!(
                    "unknown severity '{severity}' (warning|error|critical)"
                ))
            })?;
            let id = session.add_violation(&rule, &description, severity);
            emit(
                "violation.add",
                "ok",
                json!({ "id": id, "severity": severity.as_str() }),
            );
        }
        ViolationCommand::Resolve { id } => {
            session.resolve_violation(&id)?;
            emit("violation.resolve", "ok", json!({ "id": id }));
        }
        ViolationCommand::Compact => {
            let removed = session.clear_resolved_violations();
            emit(
                "violation.compact",
                "ok",
                json!({ "removed": removed, "remaining": session.violations.len() }),
            );
        }
        ViolationCommand::List => {
            emit(
                "violation.list",
                "ok",
                json!({
                    "unresolved": session.violations.unresolved_count(),
                    "entries": serde_json::to_value(session.violations.entries())
                        .unwrap_or(serde_json::Value::Null)
                }),
            );
        }
    }
    Ok(())
}

fn run_check(
    session: &mut GovernanceSession,
    tokens: Option<u64>,
    text: Option<String>,
    agent: Option<&str>,
) -> Result<(), RudderError> {
    let estimated = match (tokens, text) {
        (Some(tokens), _) => tokens,
        (None, Some(text)) => estimate_tokens(&text)?,
        (None, None) => {
            return Err(RudderError::ValidationError(
                "provide --tokens or --text to estimate the cost".to_string(),
            ));
        }
    };
    let decision = session.check_execution(estimated, agent);
    emit(
        "check.execute",
        if decision.allowed { "allow" } else { "deny" },
        json!({
            "allowed": decision.allowed,
            "reason": decision.reason.clone(),
            "estimated_tokens": estimated
        }),
    );
    if decision.allowed {
        println!("{} {} tokens", "ALLOW".bright_green().bold(), estimated);
    } else {
        println!(
            "{} {}",
            "DENY".bright_red().bold(),
            decision.reason.unwrap_or_default()
        );
    }
    Ok(())
}

fn run_governance(
    session: &mut GovernanceSession,
    command: GovernanceCommand,
) -> Result<(), RudderError> {
    match command {
        GovernanceCommand::Enable => session.set_governance_enabled(true),
        GovernanceCommand::Disable => session.set_governance_enabled(false),
        GovernanceCommand::Strict { mode } => match mode.as_str() {
            "on" => session.set_strict_mode(true),
            "off" => session.set_strict_mode(false),
            other => {
                return Err(RudderError::ValidationError(format!(
                    "unknown strict mode '{other}' (on|off)"
                )));
            }
        },
        GovernanceCommand::Status => {}
    }
    emit(
        "governance.status",
        "ok",
        json!({
            "governance_enabled": session.governance_enabled(),
            "strict_mode": session.strict_mode()
        }),
    );
    Ok(())
}

/// Count tokens the way collaborators estimate prompt cost.
fn estimate_tokens(text: &str) -> Result<u64, RudderError> {
    let bpe = tiktoken_rs::cl100k_base().map_err(|e| {
        RudderError::ValidationError(format!("Unable to load tokenizer: {e}"))
    })?;
    Ok(bpe.encode_with_special_tokens(text).len() as u64)
}

fn parse_mode(raw: &str) -> Result<PathMode, RudderError> {
    PathMode::from_mode_str(raw).ok_or_else(|| {
        RudderError::ValidationError(format!(
            "unknown mode '{raw}' (resume|new-objective|exploration|decision)"
        ))
    })
}

fn emit(cmd: &str, status: &str, extra: serde_json::Value) {
    println!("{}", time::command_envelope(cmd, status, extra));
}

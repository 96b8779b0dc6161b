//! Rudder: a daemonless, local-first governed execution control plane.
//!
//! Rudder sits between human intent and anything that acts on it. Free-text
//! intent is classified into one of four path modes, each with a fixed
//! contract over which operations are legal and whether results may ever
//! reach the append-only timeline. Every consequential action is metered by
//! a token budget ledger, contained by a scope lock, queued for time-boxed
//! human approval, and checked by the execution validator; breaches land in
//! the violation log. State is client-local: a `.rudder/` directory holds a
//! SQLite governance database and a JSONL audit log, and only a whitelisted
//! snapshot (budget ledger plus governance flags) is durable across
//! sessions.
//!
//! The library surface is [`core::validator::GovernanceSession`]; the
//! `rudder` binary is a thin CLI host around it.

pub mod cli;
pub mod core;

use clap::Parser;

use crate::core::error::RudderError;

/// Parse argv and run a single command against the store in the current
/// directory.
pub fn run() -> Result<(), RudderError> {
    let cli = cli::Cli::parse();
    cli::dispatch(cli)
}

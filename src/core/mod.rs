//! Core modules of the governed execution control plane.
//!
//! All subsystems and shared primitives live here: the path state machine
//! and retreat controller, the budget ledger, scope lock, approval queue,
//! violation log, timeline store, and the execution validator that ties
//! them together.

pub mod approvals;
pub mod budget;
pub mod db;
pub mod error;
pub mod path;
pub mod persist;
pub mod retreat;
pub mod schemas;
pub mod scope;
pub mod store;
pub mod time;
pub mod timeline;
pub mod validator;
pub mod violations;

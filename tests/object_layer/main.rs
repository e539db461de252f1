//! Object Layer Tests
//!
//! End-to-end coverage of the context tree over a real store directory:
//! - Instance lifecycle: create, edit, delete, save-time validation
//! - Context tree: child-to-parent propagation, rollback, isolation
//! - Undo scopes: discard and keep semantics
//! - Persistence: durability across reopen, locking, corruption

#[path = "../common/mod.rs"]
mod common;

mod contexts;
mod persistence;
mod scopes;

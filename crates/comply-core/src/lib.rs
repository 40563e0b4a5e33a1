//! Comply Core: domain models, error types, the role/capability table,
//! access decisions and the invite engagement state machine.
//!
//! Everything in this crate is storage-agnostic. Persistence lives in
//! `comply-db`; credential handling lives in `comply-auth`.

pub mod access;
pub mod context;
pub mod engagement;
pub mod error;
pub mod models;
pub mod rbac;
pub mod repository;

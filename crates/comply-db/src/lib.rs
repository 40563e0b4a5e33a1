//! Comply Database: SurrealDB connection management, repository
//! implementations, the audited mutation executor and the services built
//! on it.
//!
//! This crate provides:
//! - Connection management ([`DbManager`], [`DbConfig`])
//! - Schema initialization and migrations ([`run_migrations`])
//! - Read-side repositories ([`repository`])
//! - The audited mutation executor ([`AuditedExecutor`])
//! - Transactional services ([`service`])

pub mod audited;
mod connection;
mod error;
pub mod password;
pub mod repository;
mod schema;
pub mod secret;
pub mod service;

pub use audited::{AuditedExecutor, MutationRequest, MutationTx};
pub use connection::{DbConfig, DbManager};
pub use error::DbError;
pub use schema::{latest_version, run_migrations};

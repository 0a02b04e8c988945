//! # Launchpad DB - Multi-dialect, multi-tenant database engine
//!
//! Sits between application code and a relational backend (PostgreSQL,
//! MySQL, SQLite) plus an optional document backend (MongoDB), attributing
//! every row read or written to an `(app_id, organization_id)` tenant pair
//! and keeping schema changes detected, ordered, checksum-verified, and
//! applied atomically.
//!
//! ## Features
//!
//! - **Query compilation**: a dialect-agnostic IR compiled to parameterized
//!   SQL or a MongoDB operation plan, with tenant predicates injected
//! - **Driver**: bounded pools, query tracking, health checks, graceful drain
//! - **Migrations**: file discovery, SQL-aware splitting, checksum-anchored
//!   history, per-module collection
//! - **Schema sync**: introspection, structural diff with breakingness
//!   classification, pull/push against a remote schema authority
//! - **Branches**: schema-level database branches with PII-masked copies,
//!   diff/merge, and time-based cleanup
//! - **Seeds**: ordered, dependency-resolved data population with tracking
//!
//! ## Usage
//!
//! ```rust,no_run
//! use launchpad_db::db::Driver;
//! use launchpad_db::libs::config::EngineConfig;
//! use launchpad_db::query::builder::QueryEngine;
//! use launchpad_db::tenant::TenantContext;
//!
//! # async fn example() -> launchpad_db::error::Result<()> {
//! let config = EngineConfig::new("postgres://localhost/launchpad");
//! let driver = Driver::connect(&config).await?;
//!
//! let engine = QueryEngine::new(driver.kind(), config.tenant.clone())?;
//! let ctx = TenantContext::new("app_1", "org_1");
//! let users = engine
//!     .table("users", ctx)
//!     .select(&["id", "email"])
//!     .where_eq("status", "active")
//!     .fetch(&driver)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod branch;
pub mod db;
pub mod dialect;
pub mod error;
pub mod libs;
pub mod migrate;
pub mod query;
pub mod schema;
pub mod seed;
pub mod sync;
pub mod tenant;

pub use error::{Error, Result};
pub use tenant::TenantContext;

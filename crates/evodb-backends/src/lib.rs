//! Dialect backends for the evolution engine.
//!
//! ## Crate layout
//! - `common`: the shared SQL render engine with ALTER-merge optimization,
//!   parameterized over a [`SqlDialect`].
//! - `postgres`: the PostgreSQL dialect.
//! - `registry`: dialect-identifier to backend-adapter lookup.

pub mod common;
pub mod postgres;
pub mod registry;

pub use common::{DialectBackend, SqlDialect};
pub use postgres::PostgresDialect;
pub use registry::BackendRegistry;

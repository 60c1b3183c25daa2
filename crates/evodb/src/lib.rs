//! ## Crate layout
//! - `core`: the signature model, diff engine, mutation operations,
//!   mutators, and the transactional evolver.
//! - `backends`: dialect backends and the backend registry.
//!
//! The `prelude` module mirrors the surface a host integration uses to
//! drive an evolution end to end.

pub use evodb_backends as backends;
pub use evodb_core as core;

pub use evodb_core::Error;

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

///
/// Mutations
///
/// The operation set, re-exported under the name evolution definitions
/// refer to.
///

pub mod mutations {
    pub use evodb_core::mutation::{
        AddField, ChangeField, ChangeMeta, DeleteApplication, DeleteField, DeleteModel,
        InitialValue, MetaValue, Mutation, RenameField, RenameModel, SchemaMutation, SqlMutation,
    };
}

///
/// Prelude
///

pub mod prelude {
    pub use crate::backends::{BackendRegistry, DialectBackend, PostgresDialect, SqlDialect};
    pub use crate::core::prelude::*;
}

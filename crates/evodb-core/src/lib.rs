//! Core engine for schema evolution.
//!
//! ## Crate layout
//! - `sig`: the signature data model (project, application, model, field,
//!   index) with diffing and versioned serialization.
//! - `diff`: structured diff values and hinted mutation generation.
//! - `mutation`: the closed set of typed schema-change operations.
//! - `mutator`: per-application and per-model operation accumulators.
//! - `state`: tracked index/constraint state consulted during SQL
//!   generation.
//! - `backend`: the per-dialect backend adapter contract.
//! - `evolve`: evolution tasks and the transactional evolver.
//! - `store`: collaborator contracts for versions, schema discovery, and
//!   evolution catalogues.

pub mod backend;
pub mod diff;
pub mod error;
pub mod evolve;
pub mod mutation;
pub mod mutator;
pub mod sig;
pub mod state;
pub mod store;

use crate::{error::EvolutionError, sig::SignatureError};
use thiserror::Error as ThisError;

///
/// Prelude
///

pub mod prelude {
    pub use crate::{
        backend::{EvolutionBackend, FkTarget, TableModel},
        diff::{AppDiff, Diff, ModelDiff, ProjectDiff},
        error::{
            EvolutionError, ExecutionError, MissingSignatureError, QueueError, SimulationError,
            SimulationFailure, StoreError,
        },
        evolve::{EvolutionTask, Evolver, ExplicitEvolution, TaskEvent, TaskKind},
        mutation::{
            AddField, ChangeField, ChangeMeta, DeleteApplication, DeleteField, DeleteModel,
            InitialValue, MetaValue, Mutation, RenameField, RenameModel, SchemaMutation,
            SimulationContext, SqlMutation,
        },
        mutator::{AppMutator, AttrChange, ModelMutator, ScheduledOp},
        sig::{
            AppSignature, AttrValue, FieldSignature, FieldType, IndexSignature, ModelSignature,
            ProjectSignature, SIGNATURE_VERSION, StorageKind, Together,
        },
        state::DatabaseState,
        store::{
            DatabaseRouter, DefaultRouter, EvolutionContent, EvolutionRecord, EvolutionSource,
            SchemaProvider, SqlConnection, Version, VersionStore,
        },
    };
}

///
/// Error
///

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Evolution(#[from] EvolutionError),

    #[error(transparent)]
    Signature(#[from] SignatureError),
}

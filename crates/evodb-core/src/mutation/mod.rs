//! The closed set of schema mutation operations.
//!
//! Each operation can simulate its effect against a project signature and
//! schedule low-level operations on a mutator for SQL generation.

pub mod fields;
pub mod hint;
pub mod models;
pub mod sql;

pub use fields::{AddField, ChangeField, DeleteField, RenameField};
pub use models::{ChangeMeta, DeleteApplication, DeleteModel, MetaValue, RenameModel};
pub use sql::SqlMutation;

use crate::{
    backend::EvolutionBackend,
    error::{EvolutionError, SimulationError},
    mutator::ModelMutator,
    sig::{AttrValue, ProjectSignature},
    state::DatabaseState,
    store::DatabaseRouter,
};

/// The database targeted when no explicit name is bound.
pub const DEFAULT_DATABASE: &str = "default";

///
/// SimulationContext
///
/// Read-only context threaded through `simulate` and `is_mutable`: the
/// application being mutated, the bound database (if any), the tracked
/// database state, the active backend, and the model-to-database router.
///

pub struct SimulationContext<'a> {
    pub app_label: &'a str,
    pub database: Option<&'a str>,
    pub database_state: &'a DatabaseState,
    pub backend: &'a dyn EvolutionBackend,
    pub router: &'a dyn DatabaseRouter,
}

impl SimulationContext<'_> {
    /// The database name this pass is evolving.
    #[must_use]
    pub fn target_database(&self) -> &str {
        self.database.unwrap_or(DEFAULT_DATABASE)
    }

    /// Whether a model lives on the database currently being evolved.
    #[must_use]
    pub fn model_on_target_database(&self, app_label: &str, model_name: &str) -> bool {
        let model_database = self
            .router
            .database_for_model(app_label, model_name)
            .unwrap_or_else(|| DEFAULT_DATABASE.to_string());

        model_database == self.target_database()
    }
}

///
/// InitialValue
///
/// The backfill value for a column becoming (or created) non-nullable. A
/// placeholder satisfies simulation but refuses SQL generation until the
/// caller supplies a concrete value.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InitialValue {
    Value(AttrValue),
    Placeholder,
}

impl InitialValue {
    #[must_use]
    pub fn hint_form(&self) -> String {
        match self {
            Self::Value(value) => value.to_string(),
            Self::Placeholder => "<<USER VALUE REQUIRED>>".to_string(),
        }
    }
}

impl From<AttrValue> for InitialValue {
    fn from(value: AttrValue) -> Self {
        Self::Value(value)
    }
}

///
/// SchemaMutation
///
/// The contract every mutation operation satisfies.
///

pub trait SchemaMutation {
    /// The operation name used in hints.
    fn hint_name(&self) -> &'static str;

    /// Ordered constructor parameters for the hint form.
    fn hint_params(&self) -> Vec<String>;

    /// Apply the operation's effect to the project signature, validating
    /// preconditions.
    fn simulate(
        &self,
        ctx: &SimulationContext<'_>,
        project_sig: &mut ProjectSignature,
    ) -> Result<(), SimulationError>;

    /// Whether the operation applies in the current pass.
    fn is_mutable(&self, ctx: &SimulationContext<'_>, project_sig: &ProjectSignature) -> bool;

    /// The canonical, re-parseable hint line for this operation.
    fn generate_hint(&self) -> String {
        format!("{}({})", self.hint_name(), self.hint_params().join(", "))
    }
}

///
/// Mutation
///
/// The closed tagged union over every catalogued operation.
///

#[remain::sorted]
#[derive(Clone, Debug)]
pub enum Mutation {
    AddField(AddField),
    ChangeField(ChangeField),
    ChangeMeta(ChangeMeta),
    DeleteApplication(DeleteApplication),
    DeleteField(DeleteField),
    DeleteModel(DeleteModel),
    RenameField(RenameField),
    RenameModel(RenameModel),
    Sql(SqlMutation),
}

impl Mutation {
    fn as_schema_mutation(&self) -> &dyn SchemaMutation {
        match self {
            Self::AddField(m) => m,
            Self::ChangeField(m) => m,
            Self::ChangeMeta(m) => m,
            Self::DeleteApplication(m) => m,
            Self::DeleteField(m) => m,
            Self::DeleteModel(m) => m,
            Self::RenameField(m) => m,
            Self::RenameModel(m) => m,
            Self::Sql(m) => m,
        }
    }

    #[must_use]
    pub fn generate_hint(&self) -> String {
        self.as_schema_mutation().generate_hint()
    }

    #[must_use]
    pub fn hint_name(&self) -> &'static str {
        self.as_schema_mutation().hint_name()
    }

    pub fn simulate(
        &self,
        ctx: &SimulationContext<'_>,
        project_sig: &mut ProjectSignature,
    ) -> Result<(), SimulationError> {
        self.as_schema_mutation().simulate(ctx, project_sig)
    }

    #[must_use]
    pub fn is_mutable(
        &self,
        ctx: &SimulationContext<'_>,
        project_sig: &ProjectSignature,
    ) -> bool {
        self.as_schema_mutation().is_mutable(ctx, project_sig)
    }

    /// The model this operation targets, if it targets exactly one.
    #[must_use]
    pub fn model_name(&self) -> Option<&str> {
        match self {
            Self::AddField(m) => Some(&m.model_name),
            Self::ChangeField(m) => Some(&m.model_name),
            Self::ChangeMeta(m) => Some(&m.model_name),
            Self::DeleteField(m) => Some(&m.model_name),
            Self::DeleteModel(m) => Some(&m.model_name),
            Self::RenameField(m) => Some(&m.model_name),
            Self::RenameModel(m) => Some(&m.old_model_name),
            Self::DeleteApplication(_) | Self::Sql(_) => None,
        }
    }

    #[must_use]
    pub const fn is_rename_model(&self) -> bool {
        matches!(self, Self::RenameModel(_))
    }

    #[must_use]
    pub const fn is_sql(&self) -> bool {
        matches!(self, Self::Sql(_))
    }

    /// Schedule this operation's model-level effects on a model mutator.
    ///
    /// App-level operations (`DeleteApplication`, raw SQL) are routed by
    /// the app mutator instead and never reach this call.
    pub(crate) fn mutate_model(&self, mutator: &mut ModelMutator<'_>) -> Result<(), EvolutionError> {
        match self {
            Self::AddField(m) => m.mutate(mutator),
            Self::ChangeField(m) => m.mutate(mutator),
            Self::ChangeMeta(m) => m.mutate(mutator),
            Self::DeleteField(m) => m.mutate(mutator),
            Self::DeleteModel(m) => m.mutate(mutator),
            Self::RenameField(m) => m.mutate(mutator),
            Self::RenameModel(m) => m.mutate(mutator),
            Self::DeleteApplication(_) | Self::Sql(_) => Ok(()),
        }
    }
}

/// Shared `is_mutable` behaviour for operations targeting a single model.
pub(crate) fn model_is_mutable(
    ctx: &SimulationContext<'_>,
    app_label: &str,
    model_name: &str,
) -> bool {
    ctx.model_on_target_database(app_label, model_name)
}

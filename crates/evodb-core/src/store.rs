//! Collaborator contracts: schema discovery, version persistence, the
//! evolution-sequence catalogue, and SQL execution.
//!
//! The engine owns none of this state; it only requires that versions are
//! monotonically ordered and that evolution records can be looked up per
//! application.

use crate::{
    error::StoreError,
    mutation::Mutation,
    sig::{AppSignature, ProjectSignature},
};
use time::OffsetDateTime;

///
/// Version
///
/// An opaque, monotonically ordered persisted snapshot of a project
/// signature.
///

#[derive(Clone, Debug)]
pub struct Version {
    pub id: i64,
    pub signature: ProjectSignature,
    pub when: OffsetDateTime,
}

///
/// EvolutionRecord
///
/// Associates an application and a named evolution label with the version
/// under which the evolution was first applied.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EvolutionRecord {
    pub app_label: String,
    pub label: String,
    pub version_id: Option<i64>,
}

impl EvolutionRecord {
    #[must_use]
    pub fn new(app_label: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            app_label: app_label.into(),
            label: label.into(),
            version_id: None,
        }
    }
}

///
/// VersionStore
///
/// Key/value persistence of versions and evolution records. The store is
/// expected to share the transaction the evolver executes in, so that a
/// failed evolution leaves no version behind.
///

pub trait VersionStore {
    /// The most recent persisted version, or `None` when no baseline has
    /// been installed yet.
    fn current_version(&self, database: &str) -> Result<Option<Version>, StoreError>;

    /// Persist a signature as a new version and return it.
    fn create_version(&mut self, signature: &ProjectSignature) -> Result<Version, StoreError>;

    /// Bulk-insert evolution records, each tagged with its version.
    fn record_evolutions(&mut self, records: &[EvolutionRecord]) -> Result<(), StoreError>;

    /// Labels of evolutions already applied for an application.
    fn applied_evolutions(&self, app_label: &str) -> Result<Vec<String>, StoreError>;
}

///
/// SchemaProvider
///
/// Discovery of the live/current schema. Called once per application at
/// evolver construction.
///

pub trait SchemaProvider: DatabaseRouter {
    /// Identifiers of every application currently registered.
    fn app_ids(&self) -> Vec<String>;

    /// The current signature for one application on one database.
    fn app_signature(&self, app_id: &str, database: &str) -> Option<AppSignature>;

    /// Build the full current project signature for a database.
    fn project_signature(&self, database: &str) -> ProjectSignature {
        let mut project_sig = ProjectSignature::new();

        for app_id in self.app_ids() {
            if let Some(app_sig) = self.app_signature(&app_id, database) {
                project_sig.add_app_sig(app_sig);
            }
        }

        project_sig
    }
}

///
/// DatabaseRouter
///
/// Maps a model to the physical database that owns it. `None` means the
/// default database.
///

pub trait DatabaseRouter {
    fn database_for_model(&self, _app_label: &str, _model_name: &str) -> Option<String> {
        None
    }
}

/// Router placing every model on the default database.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultRouter;

impl DatabaseRouter for DefaultRouter {}

///
/// EvolutionContent
///
/// A catalogue entry, normalized into either raw SQL or a literal
/// mutation list before the engine sees it.
///

pub enum EvolutionContent {
    Sql(Vec<String>),
    Mutations(Vec<Mutation>),
}

///
/// EvolutionSource
///
/// The catalogue of named evolutions per application.
///

pub trait EvolutionSource {
    /// The canonical ordered evolution labels for an application.
    fn sequence(&self, app_label: &str) -> Vec<String>;

    /// Resolve one labelled evolution to its content.
    fn evolution(&self, app_label: &str, label: &str) -> Option<EvolutionContent>;
}

/// A catalogue with no recorded evolutions.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyEvolutionSource;

impl EvolutionSource for EmptyEvolutionSource {
    fn sequence(&self, _app_label: &str) -> Vec<String> {
        Vec::new()
    }

    fn evolution(&self, _app_label: &str, _label: &str) -> Option<EvolutionContent> {
        None
    }
}

///
/// SqlConnection
///
/// Execution surface for one database. The evolver drives exactly one
/// transaction per run: begin, execute every statement, then commit or
/// roll back as a whole.
///

pub trait SqlConnection {
    fn begin(&mut self) -> Result<(), StoreError>;

    fn commit(&mut self) -> Result<(), StoreError>;

    fn rollback(&mut self) -> Result<(), StoreError>;

    /// Execute one statement. The error message is surfaced verbatim in
    /// `EvolutionExecutionError::detailed_error`.
    fn execute(&mut self, sql: &str) -> Result<(), StoreError>;

    /// Disable constraint checking for the duration of the transaction,
    /// where the dialect supports it.
    fn disable_constraint_checks(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

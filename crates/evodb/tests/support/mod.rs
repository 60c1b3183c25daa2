//! Shared fakes for evolver integration tests: an in-memory database that
//! stages work inside a transaction, plus schema/catalogue providers.

use evodb_core::{
    error::StoreError,
    sig::{AppSignature, FieldSignature, FieldType, ModelSignature, ProjectSignature},
    store::{
        DatabaseRouter, EvolutionContent, EvolutionRecord, SchemaProvider, SqlConnection, Version,
        VersionStore,
    },
};
use std::{cell::RefCell, rc::Rc};
use time::OffsetDateTime;

///
/// FakeDb
///
/// Shared state behind the fake connection and the fake version store.
/// Statements and records are staged during a transaction and only become
/// visible on commit.
///

#[derive(Default)]
pub struct DbInner {
    pub committed_sql: Vec<String>,
    pub staged_sql: Vec<String>,
    pub versions: Vec<Version>,
    pub staged_versions: Vec<Version>,
    pub evolutions: Vec<EvolutionRecord>,
    pub staged_evolutions: Vec<EvolutionRecord>,
    pub in_transaction: bool,
    pub fail_on: Option<String>,
    next_version_id: i64,
}

#[derive(Clone, Default)]
pub struct FakeDb(pub Rc<RefCell<DbInner>>);

impl FakeDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a committed baseline version outside any transaction.
    pub fn install_baseline(&self, signature: &ProjectSignature) {
        let mut inner = self.0.borrow_mut();
        inner.next_version_id += 1;

        let version = Version {
            id: inner.next_version_id,
            signature: signature.clone(),
            when: OffsetDateTime::UNIX_EPOCH,
        };

        inner.versions.push(version);
    }

    /// Make any statement containing `needle` fail.
    pub fn fail_on(&self, needle: &str) {
        self.0.borrow_mut().fail_on = Some(needle.to_string());
    }

    pub fn connection(&self) -> FakeConnection {
        FakeConnection { db: self.clone() }
    }

    pub fn version_store(&self) -> FakeVersionStore {
        FakeVersionStore { db: self.clone() }
    }
}

///
/// FakeConnection
///

pub struct FakeConnection {
    db: FakeDb,
}

impl SqlConnection for FakeConnection {
    fn begin(&mut self) -> Result<(), StoreError> {
        self.db.0.borrow_mut().in_transaction = true;

        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        let mut inner = self.db.0.borrow_mut();

        let staged_sql = std::mem::take(&mut inner.staged_sql);
        inner.committed_sql.extend(staged_sql);

        let staged_versions = std::mem::take(&mut inner.staged_versions);
        inner.versions.extend(staged_versions);

        let staged_evolutions = std::mem::take(&mut inner.staged_evolutions);
        inner.evolutions.extend(staged_evolutions);

        inner.in_transaction = false;

        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        let mut inner = self.db.0.borrow_mut();
        inner.staged_sql.clear();
        inner.staged_versions.clear();
        inner.staged_evolutions.clear();
        inner.in_transaction = false;

        Ok(())
    }

    fn execute(&mut self, sql: &str) -> Result<(), StoreError> {
        let mut inner = self.db.0.borrow_mut();

        if let Some(needle) = &inner.fail_on {
            if sql.contains(needle.as_str()) {
                return Err(StoreError::new(format!("forced failure on: {sql}")));
            }
        }

        inner.staged_sql.push(sql.to_string());

        Ok(())
    }
}

///
/// FakeVersionStore
///

pub struct FakeVersionStore {
    db: FakeDb,
}

impl VersionStore for FakeVersionStore {
    fn current_version(&self, _database: &str) -> Result<Option<Version>, StoreError> {
        Ok(self.db.0.borrow().versions.last().cloned())
    }

    fn create_version(&mut self, signature: &ProjectSignature) -> Result<Version, StoreError> {
        let mut inner = self.db.0.borrow_mut();
        inner.next_version_id += 1;

        let version = Version {
            id: inner.next_version_id,
            signature: signature.clone(),
            when: OffsetDateTime::UNIX_EPOCH,
        };

        inner.staged_versions.push(version.clone());

        Ok(version)
    }

    fn record_evolutions(&mut self, records: &[EvolutionRecord]) -> Result<(), StoreError> {
        self.db
            .0
            .borrow_mut()
            .staged_evolutions
            .extend(records.iter().cloned());

        Ok(())
    }

    fn applied_evolutions(&self, app_label: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .db
            .0
            .borrow()
            .evolutions
            .iter()
            .filter(|record| record.app_label == app_label)
            .map(|record| record.label.clone())
            .collect())
    }
}

///
/// FakeProvider
///

pub struct FakeProvider {
    pub project_sig: ProjectSignature,
}

impl DatabaseRouter for FakeProvider {}

impl SchemaProvider for FakeProvider {
    fn app_ids(&self) -> Vec<String> {
        self.project_sig.app_ids().map(str::to_string).collect()
    }

    fn app_signature(&self, app_id: &str, _database: &str) -> Option<AppSignature> {
        self.project_sig.get_app_sig(app_id).cloned()
    }
}

///
/// FakeEvolutionSource
///

#[derive(Default)]
pub struct FakeEvolutionSource {
    pub sequences: Vec<(String, Vec<String>)>,
    pub evolutions: Vec<(String, String, EvolutionContent)>,
}

impl FakeEvolutionSource {
    pub fn add(
        &mut self,
        app_label: &str,
        label: &str,
        content: EvolutionContent,
    ) {
        match self
            .sequences
            .iter_mut()
            .find(|(app, _)| app == app_label)
        {
            Some((_, labels)) => labels.push(label.to_string()),
            None => self
                .sequences
                .push((app_label.to_string(), vec![label.to_string()])),
        }

        self.evolutions
            .push((app_label.to_string(), label.to_string(), content));
    }
}

impl evodb_core::store::EvolutionSource for FakeEvolutionSource {
    fn sequence(&self, app_label: &str) -> Vec<String> {
        self.sequences
            .iter()
            .find(|(app, _)| app == app_label)
            .map(|(_, labels)| labels.clone())
            .unwrap_or_default()
    }

    fn evolution(&self, app_label: &str, label: &str) -> Option<EvolutionContent> {
        self.evolutions
            .iter()
            .find(|(app, entry_label, _)| app == app_label && entry_label == label)
            .map(|(_, _, content)| match content {
                EvolutionContent::Sql(sql) => EvolutionContent::Sql(sql.clone()),
                EvolutionContent::Mutations(mutations) => {
                    EvolutionContent::Mutations(mutations.clone())
                }
            })
    }
}

/// A project signature with one app, one model, an auto primary key, and
/// one integer field.
pub fn base_project_sig() -> ProjectSignature {
    ProjectSignature::new().with_app(
        AppSignature::new("tests").with_model(
            ModelSignature::new("TestModel", "tests_testmodel")
                .with_pk_column("id")
                .with_field(
                    FieldSignature::new("id", FieldType::AutoField).with_attr("primary_key", true),
                )
                .with_field(FieldSignature::new("age", FieldType::IntegerField)),
        ),
    )
}

//! Mutation accumulators.
//!
//! An [`AppMutator`] routes mutations for one application into per-model
//! operation lists, simulating each mutation against the working signature
//! as it goes so later mutations observe earlier effects (rename-then-
//! change on the same field). [`ModelMutator`] is the per-model surface a
//! mutation schedules its primitive operations on.

use crate::{
    backend::{EvolutionBackend, FkTarget, TableModel, resolve_fk_target},
    error::EvolutionError,
    mutation::{InitialValue, MetaValue, Mutation, SimulationContext},
    sig::{AttrValue, FieldSignature, ModelSignature, ProjectSignature},
    state::DatabaseState,
    store::DatabaseRouter,
};
use tracing::{debug, warn};

///
/// AttrChange
///
/// One attribute transition scheduled by a `ChangeField`.
///

#[derive(Clone, Debug)]
pub struct AttrChange {
    pub attr_name: String,
    pub old_value: AttrValue,
    pub new_value: AttrValue,
}

///
/// ScheduledOp
///
/// A primitive operation queued against one table. Everything except raw
/// SQL is eligible for merging by the backend.
///

#[derive(Clone, Debug)]
pub enum ScheduledOp {
    AddColumn {
        field: FieldSignature,
        initial: Option<InitialValue>,
        fk_target: Option<FkTarget>,
    },
    ChangeColumn {
        field: FieldSignature,
        changes: Vec<AttrChange>,
        initial: Option<InitialValue>,
    },
    DeleteColumn {
        field: FieldSignature,
    },
    ChangeMeta {
        prop_name: String,
        old_value: MetaValue,
        new_value: MetaValue,
    },
    Sql {
        statements: Vec<String>,
    },
}

impl ScheduledOp {
    /// Raw SQL is opaque and never merged with neighbouring operations.
    #[must_use]
    pub const fn is_mergeable(&self) -> bool {
        !matches!(self, Self::Sql { .. })
    }
}

///
/// ModelMutator
///
/// The per-model scheduling surface handed to a mutation's `mutate` call.
/// Reads see the pre-mutation state of the working signature.
///

pub struct ModelMutator<'a> {
    app_label: &'a str,
    backend: &'a dyn EvolutionBackend,
    project_sig: &'a ProjectSignature,
    model_sig: &'a ModelSignature,
    table_model: TableModel,
    ops: Vec<ScheduledOp>,
}

impl<'a> ModelMutator<'a> {
    fn new(
        app_label: &'a str,
        backend: &'a dyn EvolutionBackend,
        project_sig: &'a ProjectSignature,
        model_sig: &'a ModelSignature,
    ) -> Self {
        let table_model = TableModel::from_model_sig(app_label, model_sig);

        Self {
            app_label,
            backend,
            project_sig,
            model_sig,
            table_model,
            ops: Vec::new(),
        }
    }

    #[must_use]
    pub const fn app_label(&self) -> &str {
        self.app_label
    }

    #[must_use]
    pub const fn model_sig(&self) -> &ModelSignature {
        self.model_sig
    }

    #[must_use]
    pub const fn backend(&self) -> &dyn EvolutionBackend {
        self.backend
    }

    #[must_use]
    pub const fn table_model(&self) -> &TableModel {
        &self.table_model
    }

    #[must_use]
    pub fn table_name(&self) -> String {
        self.model_sig.table_name.clone()
    }

    /// Schedule a column addition, resolving the relational target when
    /// the field is a foreign key.
    pub fn add_column(&mut self, field: FieldSignature, initial: Option<InitialValue>) {
        let fk_target = field
            .related_model
            .as_deref()
            .filter(|_| !field.field_type.is_many_to_many())
            .and_then(|related_model| resolve_fk_target(self.project_sig, related_model).ok());

        self.ops.push(ScheduledOp::AddColumn {
            field,
            initial,
            fk_target,
        });
    }

    pub fn change_column(
        &mut self,
        field: FieldSignature,
        changes: Vec<AttrChange>,
        initial: Option<InitialValue>,
    ) {
        self.ops.push(ScheduledOp::ChangeColumn {
            field,
            changes,
            initial,
        });
    }

    pub fn delete_column(&mut self, field: FieldSignature) {
        self.ops.push(ScheduledOp::DeleteColumn { field });
    }

    pub fn change_meta(&mut self, prop_name: &str, old_value: MetaValue, new_value: MetaValue) {
        self.ops.push(ScheduledOp::ChangeMeta {
            prop_name: prop_name.to_string(),
            old_value,
            new_value,
        });
    }

    pub fn add_sql(&mut self, statements: Vec<String>) {
        if !statements.is_empty() {
            self.ops.push(ScheduledOp::Sql { statements });
        }
    }

    /// Schedule creation of a many-to-many join table for `field_sig`.
    pub fn add_m2m_table(&mut self, field_sig: &FieldSignature) -> Result<(), EvolutionError> {
        let related_model = field_sig.related_model.as_deref().ok_or_else(|| {
            EvolutionError::NotImplemented(format!(
                "many-to-many field '{}' has no related model",
                field_sig.field_name
            ))
        })?;

        let target = resolve_fk_target(self.project_sig, related_model)?;
        let m2m_table = field_sig.m2m_table_name(&self.model_sig.table_name);

        let sql = self
            .backend
            .add_m2m_table_sql(&self.table_model, field_sig, &m2m_table, &target);
        self.add_sql(sql);

        Ok(())
    }

    fn into_parts(self) -> (TableModel, Vec<ScheduledOp>) {
        (self.table_model, self.ops)
    }
}

///
/// MutatorEntry
///

enum MutatorEntry {
    Model {
        model_name: String,
        table_model: TableModel,
        ops: Vec<ScheduledOp>,
    },
    Sql(Vec<String>),
}

///
/// AppMutator
///
/// Application-level accumulator: runs a mutation sequence, grouping
/// scheduled operations per model in schedule order, and renders the final
/// SQL through the backend.
///

pub struct AppMutator<'a> {
    app_label: String,
    database: Option<String>,
    backend: &'a dyn EvolutionBackend,
    router: &'a dyn DatabaseRouter,
    work_sig: &'a mut ProjectSignature,
    state: &'a mut DatabaseState,
    entries: Vec<MutatorEntry>,
    can_simulate: bool,
}

impl<'a> AppMutator<'a> {
    pub fn new(
        app_label: impl Into<String>,
        database: Option<&str>,
        backend: &'a dyn EvolutionBackend,
        router: &'a dyn DatabaseRouter,
        work_sig: &'a mut ProjectSignature,
        state: &'a mut DatabaseState,
    ) -> Self {
        Self {
            app_label: app_label.into(),
            database: database.map(str::to_string),
            backend,
            router,
            work_sig,
            state,
            entries: Vec::new(),
            can_simulate: true,
        }
    }

    #[must_use]
    pub const fn can_simulate(&self) -> bool {
        self.can_simulate
    }

    #[must_use]
    pub fn app_label(&self) -> &str {
        &self.app_label
    }

    pub fn run_mutations(&mut self, mutations: &[Mutation]) -> Result<(), EvolutionError> {
        for mutation in mutations {
            self.run_mutation(mutation)?;
        }

        Ok(())
    }

    /// Run one mutation: schedule its operations, then simulate it against
    /// the working signature so later mutations see its effect.
    pub fn run_mutation(&mut self, mutation: &Mutation) -> Result<(), EvolutionError> {
        debug!(
            app_label = %self.app_label,
            hint = %mutation.generate_hint(),
            "running mutation"
        );

        match mutation {
            Mutation::Sql(sql_mutation) => {
                self.entries
                    .push(MutatorEntry::Sql(sql_mutation.sql.clone()));
            }
            Mutation::DeleteApplication(_) => {
                // Model deletions are routed per model so each lands on
                // the database that owns it.
                if self.database.is_some() {
                    let model_names: Vec<String> = self
                        .work_sig
                        .get_app_sig(&self.app_label)
                        .map(|app_sig| app_sig.model_names().map(str::to_string).collect())
                        .unwrap_or_default();

                    for model_name in model_names {
                        let delete =
                            Mutation::DeleteModel(crate::mutation::DeleteModel::new(&model_name));
                        let mutable = {
                            let ctx = self.simulation_context();
                            delete.is_mutable(&ctx, self.work_sig)
                        };

                        if mutable {
                            self.run_mutation(&delete)?;
                        }
                    }
                }
            }
            _ => {
                let model_name = mutation
                    .model_name()
                    .expect("model-level mutations always target a model")
                    .to_string();

                let (table_model, ops) = {
                    let model_sig = self
                        .work_sig
                        .get_app_sig_required(&self.app_label)?
                        .get_model_sig_required(&model_name)?;

                    let mut model_mutator = ModelMutator::new(
                        &self.app_label,
                        self.backend,
                        self.work_sig,
                        model_sig,
                    );

                    mutation.mutate_model(&mut model_mutator)?;

                    model_mutator.into_parts()
                };

                self.push_model_ops(&model_name, table_model, ops);
            }
        }

        self.run_simulation(mutation)
    }

    fn push_model_ops(&mut self, model_name: &str, table_model: TableModel, ops: Vec<ScheduledOp>) {
        if ops.is_empty() {
            return;
        }

        // Extend the tail entry when it targets the same model, keeping
        // adjacent operations adjacent for backend merging.
        if let Some(MutatorEntry::Model {
            model_name: last_model,
            ops: last_ops,
            ..
        }) = self.entries.last_mut()
        {
            if last_model == model_name {
                last_ops.extend(ops);
                return;
            }
        }

        self.entries.push(MutatorEntry::Model {
            model_name: model_name.to_string(),
            table_model,
            ops,
        });
    }

    fn run_simulation(&mut self, mutation: &Mutation) -> Result<(), EvolutionError> {
        // Built inline rather than through `simulation_context` so the
        // context can borrow `state` while `work_sig` is borrowed mutably.
        let ctx = SimulationContext {
            app_label: &self.app_label,
            database: self.database.as_deref(),
            database_state: self.state,
            backend: self.backend,
            router: self.router,
        };

        match mutation.simulate(&ctx, self.work_sig) {
            Ok(()) => Ok(()),
            Err(err) if err.is_cannot_simulate() => {
                // Execution can still proceed; pre-flight confidence for
                // the whole batch is reduced instead.
                warn!(
                    app_label = %self.app_label,
                    hint = %mutation.generate_hint(),
                    "mutation cannot be simulated"
                );
                self.can_simulate = false;

                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn simulation_context(&self) -> SimulationContext<'_> {
        SimulationContext {
            app_label: &self.app_label,
            database: self.database.as_deref(),
            database_state: self.state,
            backend: self.backend,
            router: self.router,
        }
    }

    /// Render every scheduled operation, in order, to SQL.
    pub fn to_sql(&mut self) -> Result<Vec<String>, EvolutionError> {
        let mut sql = Vec::new();

        for entry in &self.entries {
            match entry {
                MutatorEntry::Model {
                    table_model, ops, ..
                } => {
                    sql.extend(
                        self.backend
                            .sql_for_table_ops(table_model, ops, self.state)?,
                    );
                }
                MutatorEntry::Sql(statements) => sql.extend(statements.iter().cloned()),
            }
        }

        Ok(sql)
    }
}

use crate::{
    backend::EvolutionBackend,
    diff::Diff,
    error::{EvolutionError, ExecutionError, QueueError},
    evolve::{
        EvolutionTask, TaskEvent, TaskKind, mutations_for_labels, task::ExplicitEvolution,
        unapplied_evolutions,
    },
    mutation::{DeleteApplication, Mutation, SimulationContext},
    mutator::AppMutator,
    sig::ProjectSignature,
    state::DatabaseState,
    store::{
        DatabaseRouter, EvolutionRecord, EvolutionSource, SchemaProvider, SqlConnection,
        VersionStore,
    },
};
use tracing::{debug, info};

/// Listener invoked around each task execution.
type TaskListener<'a> = Box<dyn Fn(&TaskEvent<'_>) + 'a>;

///
/// Evolver
///
/// The top-level controller. Queues tasks, prepares them (diff +
/// simulation), then executes every prepared task inside one transaction,
/// persisting the post-evolution signature as a new version on success.
///
/// An instance is single-use: `evolve` refuses to run twice, so the same
/// computed diff can never be applied to a database twice. Re-evolving
/// requires a new evolver built from the freshly stored version.
///

pub struct Evolver<'a> {
    database_name: String,
    hinted: bool,

    /// The working signature. Starts as the stored signature and is
    /// mutated in place as task mutations are simulated.
    project_sig: ProjectSignature,

    /// Pristine copy of the stored signature, used for changed-model
    /// filtering.
    stored_project_sig: ProjectSignature,

    /// The current signature discovered from the live schema.
    target_project_sig: ProjectSignature,

    initial_diff: Diff,
    database_state: DatabaseState,

    backend: &'a dyn EvolutionBackend,
    router: &'a dyn DatabaseRouter,
    version_store: &'a mut dyn VersionStore,
    evolution_source: &'a dyn EvolutionSource,

    tasks: Vec<EvolutionTask>,
    tasks_prepared: bool,
    evolved: bool,
    listeners: Vec<TaskListener<'a>>,
}

impl<'a> Evolver<'a> {
    /// Build an evolver for one database.
    ///
    /// Loads the stored signature from the most recent version and
    /// discovers the current signature through the schema provider.
    /// Fails with [`EvolutionError::BaselineMissing`] when no version has
    /// ever been persisted.
    pub fn new(
        schema_provider: &'a dyn SchemaProvider,
        version_store: &'a mut dyn VersionStore,
        evolution_source: &'a dyn EvolutionSource,
        backend: &'a dyn EvolutionBackend,
        database_name: impl Into<String>,
        hinted: bool,
    ) -> Result<Self, EvolutionError> {
        let database_name = database_name.into();

        let target_project_sig = schema_provider.project_signature(&database_name);

        let stored_project_sig = version_store
            .current_version(&database_name)?
            .ok_or(EvolutionError::BaselineMissing)?
            .signature;

        let initial_diff = Diff::new(&stored_project_sig, &target_project_sig);
        let database_state = DatabaseState::from_signature(&stored_project_sig);

        Ok(Self {
            database_name,
            hinted,
            project_sig: stored_project_sig.clone(),
            stored_project_sig,
            target_project_sig,
            initial_diff,
            database_state,
            backend,
            router: schema_provider,
            version_store,
            evolution_source,
            tasks: Vec::new(),
            tasks_prepared: false,
            evolved: false,
            listeners: Vec::new(),
        })
    }

    #[must_use]
    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    #[must_use]
    pub const fn initial_diff(&self) -> &Diff {
        &self.initial_diff
    }

    /// The working project signature: stored state before preparation,
    /// post-evolution state afterwards.
    #[must_use]
    pub const fn project_sig(&self) -> &ProjectSignature {
        &self.project_sig
    }

    /// Register a listener for `Applying`/`Applied` task notifications.
    pub fn on_task_event(&mut self, listener: impl Fn(&TaskEvent<'_>) + 'a) {
        self.listeners.push(Box::new(listener));
    }

    // queueing

    /// Queue an evolution of every application in the current signature.
    pub fn queue_evolve_all_apps(&mut self) -> Result<(), EvolutionError> {
        let app_labels: Vec<String> = self
            .target_project_sig
            .app_ids()
            .map(str::to_string)
            .collect();

        for app_label in app_labels {
            self.queue_evolve_app(&app_label)?;
        }

        Ok(())
    }

    pub fn queue_evolve_app(&mut self, app_label: &str) -> Result<(), EvolutionError> {
        self.queue_task(EvolutionTask::evolve_app(app_label))
    }

    /// Queue an evolution with an explicit labelled mutation list,
    /// bypassing the catalogue.
    pub fn queue_evolve_app_with(
        &mut self,
        app_label: &str,
        evolutions: Vec<ExplicitEvolution>,
    ) -> Result<(), EvolutionError> {
        self.queue_task(EvolutionTask::evolve_app_with(app_label, evolutions))
    }

    /// Queue purges for every application present in the stored signature
    /// but no longer registered.
    pub fn queue_purge_old_apps(&mut self) -> Result<(), EvolutionError> {
        let app_labels: Vec<String> = self
            .initial_diff
            .deleted_apps()
            .map(str::to_string)
            .collect();

        for app_label in app_labels {
            self.queue_purge_app(&app_label)?;
        }

        Ok(())
    }

    pub fn queue_purge_app(&mut self, app_label: &str) -> Result<(), EvolutionError> {
        self.queue_task(EvolutionTask::purge_app(app_label))
    }

    /// Queue a task directly. Queuing closes once any task has been
    /// prepared; duplicate task IDs are rejected.
    pub fn queue_task(&mut self, task: EvolutionTask) -> Result<(), EvolutionError> {
        if self.tasks_prepared {
            return Err(QueueError::TasksFinalized.into());
        }

        if self.tasks.iter().any(|queued| queued.id() == task.id()) {
            return Err(QueueError::TaskAlreadyQueued {
                task_id: task.id().to_string(),
            }
            .into());
        }

        self.tasks.push(task);

        Ok(())
    }

    // prepared state

    /// All queued tasks, prepared. Accessing tasks closes the queue.
    pub fn tasks(&mut self) -> Result<&[EvolutionTask], EvolutionError> {
        self.prepare_tasks()?;

        Ok(&self.tasks)
    }

    /// Whether every queued task that requires evolution can be simulated.
    pub fn can_simulate(&mut self) -> Result<bool, EvolutionError> {
        Ok(self
            .tasks()?
            .iter()
            .all(|task| task.can_simulate || !task.evolution_required))
    }

    /// Whether any queued task requires evolution.
    pub fn evolution_required(&mut self) -> Result<bool, EvolutionError> {
        Ok(self.tasks()?.iter().any(|task| task.evolution_required))
    }

    /// The diff between the stored signature and the post-simulation state
    /// of all queued tasks.
    pub fn diff_evolutions(&mut self) -> Result<Diff, EvolutionError> {
        self.prepare_tasks()?;

        Ok(Diff::new(&self.project_sig, &self.target_project_sig))
    }

    /// Evolution-definition content per task, for tasks that resolved
    /// mutations.
    pub fn evolution_contents(&mut self) -> Result<Vec<(String, String)>, EvolutionError> {
        self.prepare_tasks()?;

        Ok(self
            .tasks
            .iter()
            .filter_map(|task| {
                task.evolution_content()
                    .map(|content| (task.id().to_string(), content))
            })
            .collect())
    }

    // execution

    /// Run every queued task inside a single transaction and record the
    /// resulting version. Single-use; any failure aborts the whole
    /// transaction with nothing applied.
    pub fn evolve(&mut self, conn: &mut dyn SqlConnection) -> Result<(), EvolutionError> {
        if self.evolved {
            return Err(EvolutionError::AlreadyEvolved);
        }

        self.prepare_tasks()?;

        conn.disable_constraint_checks()?;
        conn.begin()?;

        match self.execute_all(conn) {
            Ok(()) => {
                conn.commit()?;
                self.evolved = true;

                info!(
                    database = %self.database_name,
                    tasks = self.tasks.len(),
                    "evolution committed"
                );

                Ok(())
            }
            Err(err) => {
                // Roll the whole transaction back; the original error is
                // the one worth reporting.
                let _ = conn.rollback();

                Err(err)
            }
        }
    }

    fn execute_all(&mut self, conn: &mut dyn SqlConnection) -> Result<(), EvolutionError> {
        let mut new_evolutions: Vec<EvolutionRecord> = Vec::new();

        for task_index in 0..self.tasks.len() {
            self.execute_task(task_index, conn)?;
            new_evolutions.extend(self.tasks[task_index].new_evolutions.iter().cloned());
        }

        let version = self
            .version_store
            .create_version(&self.project_sig)
            .map_err(|err| version_save_error(&err.message))?;

        for record in &mut new_evolutions {
            record.version_id = Some(version.id);
        }

        self.version_store
            .record_evolutions(&new_evolutions)
            .map_err(|err| version_save_error(&err.message))?;

        Ok(())
    }

    fn execute_task(
        &self,
        task_index: usize,
        conn: &mut dyn SqlConnection,
    ) -> Result<(), EvolutionError> {
        let task = &self.tasks[task_index];

        if !task.evolution_required {
            return Ok(());
        }

        self.emit(&TaskEvent::Applying { task });

        for statement in &task.sql {
            conn.execute(statement).map_err(|err| {
                ExecutionError::new(
                    format!(
                        "Error applying evolution for {}: {}",
                        task.app_label(),
                        err.message
                    ),
                    Some(task.app_label()),
                    err.message.clone(),
                    Some(statement.as_str()),
                )
            })?;
        }

        self.emit(&TaskEvent::Applied { task });

        Ok(())
    }

    fn emit(&self, event: &TaskEvent<'_>) {
        for listener in &self.listeners {
            listener(event);
        }
    }

    // preparation

    fn prepare_tasks(&mut self) -> Result<(), EvolutionError> {
        if self.tasks_prepared {
            return Ok(());
        }

        self.tasks_prepared = true;

        let mut tasks = std::mem::take(&mut self.tasks);
        let result = tasks
            .iter_mut()
            .try_for_each(|task| self.prepare_task(task));
        self.tasks = tasks;

        result
    }

    fn prepare_task(&mut self, task: &mut EvolutionTask) -> Result<(), EvolutionError> {
        debug!(task = %task, "preparing task");

        match task.kind().clone() {
            TaskKind::EvolveApp {
                app_label,
                evolutions,
            } => {
                let (labels, pending_mutations) =
                    self.resolve_pending_mutations(&app_label, evolutions)?;

                let mutations = self.filter_mutable(&app_label, pending_mutations);

                if !mutations.is_empty() {
                    self.run_app_mutations(task, &app_label, &mutations)?;

                    task.evolution_required = true;
                    task.new_evolutions = labels
                        .iter()
                        .map(|label| EvolutionRecord::new(&app_label, label))
                        .collect();
                    task.mutations = mutations;
                }
            }
            TaskKind::PurgeApp { app_label } => {
                let mutation = Mutation::DeleteApplication(DeleteApplication::new());

                let mutable = {
                    let ctx = self.simulation_context(&app_label);
                    mutation.is_mutable(&ctx, &self.project_sig)
                };

                if mutable {
                    let mut app_mutator = self.app_mutator(&app_label);
                    app_mutator.run_mutation(&mutation)?;

                    task.sql = app_mutator.to_sql()?;
                    task.evolution_required = true;
                }

                task.can_simulate = true;
                task.new_evolutions.clear();
            }
            TaskKind::Custom {
                app_label,
                mutations,
                ..
            } => {
                let mutations = self.filter_mutable(&app_label, mutations);

                if !mutations.is_empty() {
                    self.run_app_mutations(task, &app_label, &mutations)?;

                    task.evolution_required = true;
                    task.mutations = mutations;
                }
            }
        }

        Ok(())
    }

    /// Resolve the mutation list for an evolve-app task: an explicit
    /// override, the hinted project diff, or the stored-but-unapplied
    /// evolution sequence.
    fn resolve_pending_mutations(
        &self,
        app_label: &str,
        explicit: Option<Vec<ExplicitEvolution>>,
    ) -> Result<(Vec<String>, Vec<Mutation>), EvolutionError> {
        if let Some(explicit) = explicit {
            let mut labels = Vec::new();
            let mut pending = Vec::new();

            for evolution in explicit {
                labels.push(evolution.label);
                pending.extend(evolution.mutations);
            }

            return Ok((labels, pending));
        }

        if self.hinted {
            let pending = self
                .initial_diff
                .hinted_mutations()
                .into_iter()
                .find(|(hinted_app, _)| hinted_app == app_label)
                .map(|(_, mutations)| mutations)
                .unwrap_or_default();

            return Ok((Vec::new(), pending));
        }

        let labels =
            unapplied_evolutions(self.evolution_source, &*self.version_store, app_label)?;

        let pending = mutations_for_labels(
            self.evolution_source,
            app_label,
            &labels,
            self.stored_project_sig.get_app_sig(app_label),
            self.target_project_sig.get_app_sig(app_label),
        )?;

        Ok((labels, pending))
    }

    fn filter_mutable(&self, app_label: &str, mutations: Vec<Mutation>) -> Vec<Mutation> {
        let ctx = self.simulation_context(app_label);

        mutations
            .into_iter()
            .filter(|mutation| mutation.is_mutable(&ctx, &self.project_sig))
            .collect()
    }

    fn run_app_mutations(
        &mut self,
        task: &mut EvolutionTask,
        app_label: &str,
        mutations: &[Mutation],
    ) -> Result<(), EvolutionError> {
        let mut app_mutator = AppMutator::new(
            app_label,
            Some(&self.database_name),
            self.backend,
            self.router,
            &mut self.project_sig,
            &mut self.database_state,
        );

        app_mutator.run_mutations(mutations)?;

        task.can_simulate = app_mutator.can_simulate();
        task.sql = app_mutator.to_sql()?;

        Ok(())
    }

    fn simulation_context<'s>(&'s self, app_label: &'s str) -> SimulationContext<'s> {
        SimulationContext {
            app_label,
            database: Some(&self.database_name),
            database_state: &self.database_state,
            backend: self.backend,
            router: self.router,
        }
    }

    fn app_mutator(&mut self, app_label: &str) -> AppMutator<'_> {
        AppMutator::new(
            app_label,
            Some(&self.database_name),
            self.backend,
            self.router,
            &mut self.project_sig,
            &mut self.database_state,
        )
    }
}

fn version_save_error(message: &str) -> EvolutionError {
    ExecutionError::new(
        format!("Error saving new evolution version information: {message}"),
        None,
        message,
        None,
    )
    .into()
}

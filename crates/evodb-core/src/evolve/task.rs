use crate::{mutation::Mutation, store::EvolutionRecord};
use std::fmt::{self, Display};

///
/// ExplicitEvolution
///
/// A labelled mutation list supplied directly to a task, bypassing the
/// evolution-source catalogue. Intended for testing and host tooling.
///

#[derive(Clone, Debug)]
pub struct ExplicitEvolution {
    pub label: String,
    pub mutations: Vec<Mutation>,
}

impl ExplicitEvolution {
    #[must_use]
    pub fn new(label: impl Into<String>, mutations: Vec<Mutation>) -> Self {
        Self {
            label: label.into(),
            mutations,
        }
    }
}

///
/// TaskKind
///

#[derive(Clone, Debug)]
pub enum TaskKind {
    /// Apply unapplied (or hinted, or explicitly supplied) evolutions for
    /// one application.
    EvolveApp {
        app_label: String,
        evolutions: Option<Vec<ExplicitEvolution>>,
    },

    /// Drop every table owned by a stale application.
    PurgeApp { app_label: String },

    /// A caller-supplied mutation list outside any recorded evolution.
    Custom {
        description: String,
        app_label: String,
        mutations: Vec<Mutation>,
    },
}

///
/// EvolutionTask
///
/// One unit of queued work. State machine: unprepared, then prepared
/// (either a no-op or evolution-required), then executed. `prepare` runs
/// exactly once, enforced by the evolver's own gate.
///

#[derive(Clone, Debug)]
pub struct EvolutionTask {
    id: String,
    kind: TaskKind,

    /// Whether every mutation in the task could be simulated. Set by
    /// `prepare`.
    pub can_simulate: bool,

    /// Whether this task has any work to perform. Set by `prepare`.
    pub evolution_required: bool,

    /// Evolution records this task will persist on success.
    pub new_evolutions: Vec<EvolutionRecord>,

    /// The SQL statements to execute, in order.
    pub sql: Vec<String>,

    pub(crate) mutations: Vec<Mutation>,
}

impl EvolutionTask {
    #[must_use]
    pub fn evolve_app(app_label: impl Into<String>) -> Self {
        let app_label = app_label.into();

        Self::new(
            format!("evolve-app:{app_label}"),
            TaskKind::EvolveApp {
                app_label,
                evolutions: None,
            },
        )
    }

    #[must_use]
    pub fn evolve_app_with(
        app_label: impl Into<String>,
        evolutions: Vec<ExplicitEvolution>,
    ) -> Self {
        let app_label = app_label.into();

        Self::new(
            format!("evolve-app:{app_label}"),
            TaskKind::EvolveApp {
                app_label,
                evolutions: Some(evolutions),
            },
        )
    }

    #[must_use]
    pub fn purge_app(app_label: impl Into<String>) -> Self {
        let app_label = app_label.into();

        Self::new(
            format!("purge-app:{app_label}"),
            TaskKind::PurgeApp { app_label },
        )
    }

    #[must_use]
    pub fn custom(
        task_id: impl Into<String>,
        description: impl Into<String>,
        app_label: impl Into<String>,
        mutations: Vec<Mutation>,
    ) -> Self {
        Self::new(
            task_id,
            TaskKind::Custom {
                description: description.into(),
                app_label: app_label.into(),
                mutations,
            },
        )
    }

    fn new(id: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            id: id.into(),
            kind,
            can_simulate: false,
            evolution_required: false,
            new_evolutions: Vec::new(),
            sql: Vec::new(),
            mutations: Vec::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub const fn kind(&self) -> &TaskKind {
        &self.kind
    }

    #[must_use]
    pub fn app_label(&self) -> &str {
        match &self.kind {
            TaskKind::EvolveApp { app_label, .. }
            | TaskKind::PurgeApp { app_label }
            | TaskKind::Custom { app_label, .. } => app_label,
        }
    }

    /// The mutations this task resolved during preparation.
    #[must_use]
    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    /// The evolution-definition content for this task, or `None` when it
    /// resolved no mutations.
    #[must_use]
    pub fn evolution_content(&self) -> Option<String> {
        if self.mutations.is_empty() {
            None
        } else {
            Some(crate::mutation::hint::render_evolution_content(
                &self.mutations,
            ))
        }
    }
}

impl Display for EvolutionTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TaskKind::EvolveApp { app_label, .. } => {
                write!(f, "Evolve application \"{app_label}\"")
            }
            TaskKind::PurgeApp { app_label } => write!(f, "Purge application \"{app_label}\""),
            TaskKind::Custom { description, .. } => write!(f, "{description}"),
        }
    }
}

///
/// TaskEvent
///
/// Ordered notifications published around each task execution, carrying
/// the task and its resolved SQL.
///

#[derive(Clone, Copy, Debug)]
pub enum TaskEvent<'a> {
    Applying { task: &'a EvolutionTask },
    Applied { task: &'a EvolutionTask },
}

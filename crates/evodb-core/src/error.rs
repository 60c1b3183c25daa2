use thiserror::Error as ThisError;

///
/// EvolutionError
///
/// Top-level error for the evolution engine. Validation and capability
/// errors surface at simulate/prepare time; execution errors surface only
/// while statements run and always abort the enclosing transaction.
///

#[derive(Debug, ThisError)]
pub enum EvolutionError {
    #[error(transparent)]
    Simulation(#[from] SimulationError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    MissingSignature(#[from] MissingSignatureError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("an evolution baseline must be set before an evolution can be performed")]
    BaselineMissing,

    #[error("Evolver::evolve() has already been run once, it cannot be run again")]
    AlreadyEvolved,

    #[error("{0}")]
    NotImplemented(String),

    #[error(
        "an explicit initial value is required for field \"{field_name}\" on model \"{model_name}\""
    )]
    InitialValueRequired {
        model_name: String,
        field_name: String,
    },

    #[error("failed to resolve an evolution named \"{label}\" for application \"{app_label}\"")]
    UnknownEvolution { app_label: String, label: String },
}

impl EvolutionError {
    /// Construct an unsupported-capability error for a `ChangeField` attribute.
    #[must_use]
    pub fn unsupported_change_attr(attr: &str, model_name: &str, field_name: &str) -> Self {
        Self::NotImplemented(format!(
            "ChangeField does not support modifying the '{attr}' attribute on '{model_name}.{field_name}'"
        ))
    }
}

///
/// SimulationError
///
/// Either the mutation has no simulation strategy at all (`CannotSimulate`)
/// or a precondition did not hold (`Failure`). The former degrades batch
/// confidence; the latter is a hard validation error.
///

#[derive(Debug, ThisError)]
pub enum SimulationError {
    #[error("cannot simulate: {reason}")]
    CannotSimulate { reason: String },

    #[error(transparent)]
    Failure(#[from] SimulationFailure),
}

impl SimulationError {
    #[must_use]
    pub const fn is_cannot_simulate(&self) -> bool {
        matches!(self, Self::CannotSimulate { .. })
    }
}

///
/// SimulationFailure
///
/// A precondition check failed while simulating a mutation against the
/// project signature. Each variant names the entity or invariant involved.
///

#[derive(Debug, ThisError)]
pub enum SimulationFailure {
    #[error(
        "cannot {action} on model \"{app_label}.{model_name}\": the application could not be found in the signature"
    )]
    MissingApp {
        action: String,
        app_label: String,
        model_name: String,
    },

    #[error(
        "cannot {action} on model \"{app_label}.{model_name}\": the model could not be found in the signature"
    )]
    MissingModel {
        action: String,
        app_label: String,
        model_name: String,
    },

    #[error(
        "cannot {action} on model \"{app_label}.{model_name}\": the field could not be found in the signature"
    )]
    MissingField {
        action: String,
        app_label: String,
        model_name: String,
    },

    #[error("cannot delete the application \"{app_label}\": it could not be found in the signature")]
    MissingAppForPurge { app_label: String },

    #[error(
        "the field \"{field_name}\" on model \"{app_label}.{model_name}\" is the primary key and cannot be deleted"
    )]
    PrimaryKeyDeletion {
        app_label: String,
        model_name: String,
        field_name: String,
    },

    #[error("the model \"{app_label}.{model_name}\" already has a field named \"{field_name}\"")]
    FieldAlreadyExists {
        app_label: String,
        model_name: String,
        field_name: String,
    },

    #[error(
        "cannot create new field \"{field_name}\" on model \"{app_label}.{model_name}\": a non-null initial value must be specified in the mutation"
    )]
    InitialValueRequired {
        app_label: String,
        model_name: String,
        field_name: String,
    },

    #[error("ChangeMeta does not support modifying the \"{prop_name}\" attribute on \"{model_name}\"")]
    UnsupportedMetaProp {
        model_name: String,
        prop_name: String,
    },
}

impl SimulationFailure {
    pub(crate) fn missing_app(action: impl Into<String>, app_label: &str, model_name: &str) -> Self {
        Self::MissingApp {
            action: action.into(),
            app_label: app_label.to_string(),
            model_name: model_name.to_string(),
        }
    }

    pub(crate) fn missing_model(
        action: impl Into<String>,
        app_label: &str,
        model_name: &str,
    ) -> Self {
        Self::MissingModel {
            action: action.into(),
            app_label: app_label.to_string(),
            model_name: model_name.to_string(),
        }
    }

    pub(crate) fn missing_field(
        action: impl Into<String>,
        app_label: &str,
        model_name: &str,
    ) -> Self {
        Self::MissingField {
            action: action.into(),
            app_label: app_label.to_string(),
            model_name: model_name.to_string(),
        }
    }
}

///
/// ExecutionError
///
/// Wraps a backend statement failure with the application label and the
/// offending statement. The raw backend error never crosses this boundary.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct ExecutionError {
    pub message: String,
    pub app_label: Option<String>,
    pub detailed_error: String,
    pub last_sql_statement: Option<String>,
}

impl ExecutionError {
    #[must_use]
    pub fn new(
        message: impl Into<String>,
        app_label: Option<&str>,
        detailed_error: impl Into<String>,
        last_sql_statement: Option<&str>,
    ) -> Self {
        Self {
            message: message.into(),
            app_label: app_label.map(str::to_string),
            detailed_error: detailed_error.into(),
            last_sql_statement: last_sql_statement.map(str::to_string),
        }
    }
}

///
/// MissingSignatureError
///
/// A requested signature entity was absent when it was required. Doubles as
/// an internal invariant check and a caller-facing diagnostic.
///

#[derive(Debug, ThisError)]
pub enum MissingSignatureError {
    #[error(
        "unable to find an application signature for \"{app_id}\", a baseline may need to be installed first"
    )]
    App { app_id: String },

    #[error(
        "unable to find a model signature for \"{app_id}.{model_name}\", a baseline may need to be installed first"
    )]
    Model { app_id: String, model_name: String },

    #[error(
        "unable to find a field signature for \"{model_name}.{field_name}\", a baseline may need to be installed first"
    )]
    Field {
        model_name: String,
        field_name: String,
    },
}

///
/// QueueError
///
/// Task-queue misuse. Programmer error; never retried.
///

#[derive(Debug, ThisError)]
pub enum QueueError {
    #[error("a task with ID \"{task_id}\" is already queued")]
    TaskAlreadyQueued { task_id: String },

    #[error("evolution tasks have already been prepared, new tasks cannot be added")]
    TasksFinalized,
}

///
/// StoreError
///
/// Failure reported by a collaborator store (versions, evolution records,
/// schema discovery).
///

#[derive(Debug, ThisError)]
#[error("store error: {message}")]
pub struct StoreError {
    pub message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

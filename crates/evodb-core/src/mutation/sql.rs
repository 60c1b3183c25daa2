use crate::{
    error::SimulationError,
    mutation::{SchemaMutation, SimulationContext},
    sig::ProjectSignature,
};
use std::{fmt, sync::Arc};

/// Callback used to simulate the signature-level effect of raw SQL.
pub type SqlSimulateFn =
    dyn Fn(&str, &mut ProjectSignature) -> Result<(), SimulationError> + Send + Sync;

///
/// SqlMutation
///
/// Arbitrary SQL executed as part of an evolution. Opaque to the engine:
/// it cannot be optimized, and it can only be simulated when the author
/// attaches a simulation callback describing its signature-level effect.
///

#[derive(Clone)]
pub struct SqlMutation {
    pub tag: String,
    pub sql: Vec<String>,
    simulate_fn: Option<Arc<SqlSimulateFn>>,
}

impl SqlMutation {
    #[must_use]
    pub fn new(tag: impl Into<String>, sql: Vec<String>) -> Self {
        Self {
            tag: tag.into(),
            sql,
            simulate_fn: None,
        }
    }

    /// Attach a callback that applies the SQL's schema effect to the
    /// project signature, making the mutation simulatable.
    #[must_use]
    pub fn with_simulate_fn(
        mut self,
        simulate_fn: impl Fn(&str, &mut ProjectSignature) -> Result<(), SimulationError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.simulate_fn = Some(Arc::new(simulate_fn));
        self
    }
}

impl fmt::Debug for SqlMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlMutation")
            .field("tag", &self.tag)
            .field("sql", &self.sql)
            .field("can_simulate", &self.simulate_fn.is_some())
            .finish()
    }
}

impl SchemaMutation for SqlMutation {
    fn hint_name(&self) -> &'static str {
        "SQLMutation"
    }

    fn hint_params(&self) -> Vec<String> {
        vec![self.tag.clone()]
    }

    fn simulate(
        &self,
        ctx: &SimulationContext<'_>,
        project_sig: &mut ProjectSignature,
    ) -> Result<(), SimulationError> {
        match &self.simulate_fn {
            Some(simulate_fn) => simulate_fn(ctx.app_label, project_sig),
            None => Err(SimulationError::CannotSimulate {
                reason: "SQL mutations cannot be simulated without an update callback".to_string(),
            }),
        }
    }

    fn is_mutable(&self, _ctx: &SimulationContext<'_>, _project_sig: &ProjectSignature) -> bool {
        true
    }
}

//! Evolution task orchestration.

pub mod evolver;
pub mod task;

pub use evolver::Evolver;
pub use task::{EvolutionTask, ExplicitEvolution, TaskEvent, TaskKind};

use crate::{
    error::{EvolutionError, StoreError},
    mutation::{Mutation, SqlMutation},
    sig::{AppSignature, ProjectSignature},
    store::{EvolutionContent, EvolutionRecord, EvolutionSource, SchemaProvider, Version,
            VersionStore},
};
use tracing::debug;

/// The labels of evolutions recorded in an application's sequence but not
/// yet applied, in sequence order.
pub fn unapplied_evolutions(
    source: &dyn EvolutionSource,
    store: &dyn VersionStore,
    app_label: &str,
) -> Result<Vec<String>, StoreError> {
    let applied = store.applied_evolutions(app_label)?;

    Ok(source
        .sequence(app_label)
        .into_iter()
        .filter(|label| !applied.contains(label))
        .collect())
}

/// Resolve evolution labels into a mutation list, then drop mutations for
/// models that did not actually change between the stored and current
/// signatures.
///
/// A freshly installed baseline already captures the current state of its
/// models, so re-applying recorded evolutions against them would fail.
/// Mutations survive the filter if they target no single model, if their
/// target model changed (including deletion), or if they are a model
/// rename, which later name lookups depend on. Mutations for
/// newly-introduced models are dropped.
pub fn mutations_for_labels(
    source: &dyn EvolutionSource,
    app_label: &str,
    evolution_labels: &[String],
    old_app_sig: Option<&AppSignature>,
    new_app_sig: Option<&AppSignature>,
) -> Result<Vec<Mutation>, EvolutionError> {
    let mut mutations = Vec::new();

    for label in evolution_labels {
        let content =
            source
                .evolution(app_label, label)
                .ok_or_else(|| EvolutionError::UnknownEvolution {
                    app_label: app_label.to_string(),
                    label: label.clone(),
                })?;

        match content {
            EvolutionContent::Sql(sql) => {
                mutations.push(Mutation::Sql(SqlMutation::new(label.clone(), sql)));
            }
            EvolutionContent::Mutations(list) => mutations.extend(list),
        }
    }

    let (Some(old_app_sig), Some(new_app_sig)) = (old_app_sig, new_app_sig) else {
        return Ok(mutations);
    };

    // Models present in both signatures whose signatures differ.
    let mut changed_models: Vec<&str> = new_app_sig
        .model_sigs()
        .filter(|model_sig| {
            old_app_sig
                .get_model_sig(&model_sig.model_name)
                .is_some_and(|old_model_sig| old_model_sig != *model_sig)
        })
        .map(|model_sig| model_sig.model_name.as_str())
        .collect();

    // Models deleted from the current signature.
    changed_models.extend(
        old_app_sig
            .model_sigs()
            .filter(|old_model_sig| {
                new_app_sig.get_model_sig(&old_model_sig.model_name).is_none()
            })
            .map(|old_model_sig| old_model_sig.model_name.as_str()),
    );

    let filtered: Vec<Mutation> = mutations
        .into_iter()
        .filter(|mutation| {
            mutation.model_name().is_none_or(|model_name| {
                changed_models.contains(&model_name) || mutation.is_rename_model()
            })
        })
        .collect();

    Ok(filtered)
}

/// Record a fresh baseline: a version for the current project signature
/// plus evolution records for every label in each application's sequence.
pub fn install_baseline(
    provider: &dyn SchemaProvider,
    source: &dyn EvolutionSource,
    store: &mut dyn VersionStore,
    database: &str,
) -> Result<Version, StoreError> {
    let project_sig = provider.project_signature(database);
    let version = store.create_version(&project_sig)?;

    let mut records = Vec::new();

    for app_id in provider.app_ids() {
        for label in source.sequence(&app_id) {
            let mut record = EvolutionRecord::new(&app_id, label);
            record.version_id = Some(version.id);
            records.push(record);
        }
    }

    debug!(
        version = version.id,
        evolutions = records.len(),
        "installed evolution baseline"
    );

    store.record_evolutions(&records)?;

    Ok(version)
}

///
/// BaselineUpdate
///
/// Result of folding newly-added applications and models into a stored
/// signature.
///

#[derive(Clone, Debug, Default)]
pub struct BaselineUpdate {
    pub changed: bool,
    pub new_app_ids: Vec<String>,
}

/// Fold applications and models that exist in the current signature but
/// not the stored one into the stored signature, reporting whether a new
/// baseline version needs to be persisted.
#[must_use]
pub fn mark_new_models(
    stored_project_sig: &mut ProjectSignature,
    current_project_sig: &ProjectSignature,
) -> BaselineUpdate {
    let mut update = BaselineUpdate::default();

    for new_app_sig in current_project_sig.app_sigs() {
        match stored_project_sig.get_app_sig_mut(&new_app_sig.app_id) {
            None => {
                stored_project_sig.add_app_sig(new_app_sig.clone());
                update.new_app_ids.push(new_app_sig.app_id.clone());
                update.changed = true;
            }
            Some(old_app_sig) => {
                for new_model_sig in new_app_sig.model_sigs() {
                    if old_app_sig.get_model_sig(&new_model_sig.model_name).is_none() {
                        old_app_sig.add_model_sig(new_model_sig.clone());
                        update.changed = true;
                    }
                }
            }
        }
    }

    update
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sig::{AppSignature, FieldSignature, FieldType, ModelSignature};

    fn model(name: &str, table: &str) -> ModelSignature {
        ModelSignature::new(name, table)
            .with_pk_column("id")
            .with_field(FieldSignature::new("id", FieldType::AutoField).with_attr("primary_key", true))
    }

    #[test]
    fn mark_new_models_folds_new_apps_and_models() {
        let mut stored = ProjectSignature::new()
            .with_app(AppSignature::new("alpha").with_model(model("One", "alpha_one")));

        let current = ProjectSignature::new()
            .with_app(
                AppSignature::new("alpha")
                    .with_model(model("One", "alpha_one"))
                    .with_model(model("Two", "alpha_two")),
            )
            .with_app(AppSignature::new("beta").with_model(model("Three", "beta_three")));

        let update = mark_new_models(&mut stored, &current);

        assert!(update.changed);
        assert_eq!(update.new_app_ids, vec!["beta"]);

        let alpha = stored.get_app_sig("alpha").unwrap();
        assert!(alpha.get_model_sig("Two").is_some());
        assert!(stored.get_app_sig("beta").is_some());
    }

    #[test]
    fn mark_new_models_reports_no_change_when_nothing_is_new() {
        let current = ProjectSignature::new()
            .with_app(AppSignature::new("alpha").with_model(model("One", "alpha_one")));
        let mut stored = current.clone();

        let update = mark_new_models(&mut stored, &current);

        assert!(!update.changed);
        assert!(update.new_app_ids.is_empty());
    }
}

use crate::{
    diff::ProjectDiff,
    error::MissingSignatureError,
    sig::{AppSignature, SIGNATURE_VERSION, SigList, SignatureError},
};
use serde_json::{Map, Value as JsonValue};

///
/// ProjectSignature
///
/// Top-level schema state: the ordered application signatures tracked for a
/// project. Deserialized from a persisted version record, mutated in place
/// only while a mutation sequence is simulated.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProjectSignature {
    apps: SigList<AppSignature>,
}

impl ProjectSignature {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            apps: SigList::new(),
        }
    }

    #[must_use]
    pub fn with_app(mut self, app_sig: AppSignature) -> Self {
        self.add_app_sig(app_sig);
        self
    }

    pub fn add_app_sig(&mut self, app_sig: AppSignature) {
        self.apps.insert(app_sig);
    }

    pub fn remove_app_sig(&mut self, app_id: &str) -> Result<AppSignature, MissingSignatureError> {
        self.apps
            .remove(app_id)
            .ok_or_else(|| MissingSignatureError::App {
                app_id: app_id.to_string(),
            })
    }

    #[must_use]
    pub fn get_app_sig(&self, app_id: &str) -> Option<&AppSignature> {
        self.apps.get(app_id)
    }

    #[must_use]
    pub fn get_app_sig_mut(&mut self, app_id: &str) -> Option<&mut AppSignature> {
        self.apps.get_mut(app_id)
    }

    pub fn get_app_sig_required(&self, app_id: &str) -> Result<&AppSignature, MissingSignatureError> {
        self.apps
            .get(app_id)
            .ok_or_else(|| MissingSignatureError::App {
                app_id: app_id.to_string(),
            })
    }

    pub fn app_sigs(&self) -> impl Iterator<Item = &AppSignature> {
        self.apps.iter()
    }

    pub fn app_sigs_mut(&mut self) -> impl Iterator<Item = &mut AppSignature> {
        self.apps.iter_mut()
    }

    pub fn app_ids(&self) -> impl Iterator<Item = &str> {
        self.apps.keys()
    }

    /// Diff against an older project signature.
    #[must_use]
    pub fn diff(&self, old_project_sig: &Self) -> ProjectDiff {
        let mut project_diff = ProjectDiff::default();

        for old_app_sig in old_project_sig.app_sigs() {
            let app_id = &old_app_sig.app_id;

            match self.get_app_sig(app_id) {
                Some(new_app_sig) => {
                    let app_changes = new_app_sig.diff(old_app_sig);

                    if !app_changes.is_empty() {
                        project_diff.changed.push((app_id.clone(), app_changes));
                    }
                }
                None => {
                    // The application has been deleted.
                    project_diff.deleted.push((
                        app_id.clone(),
                        old_app_sig.model_names().map(str::to_string).collect(),
                    ));
                }
            }
        }

        project_diff
    }

    /// Serialize to the versioned wire form, tagged with `__version__`.
    #[must_use]
    pub fn serialize(&self, sig_version: u32) -> JsonValue {
        let mut map = Map::new();
        map.insert(
            "__version__".to_string(),
            JsonValue::Number(sig_version.into()),
        );

        for app_sig in self.apps.iter() {
            map.insert(app_sig.app_id.clone(), app_sig.serialize(sig_version));
        }

        JsonValue::Object(map)
    }

    /// Deserialize from the versioned wire form.
    pub fn deserialize(project_sig_value: &JsonValue) -> Result<Self, SignatureError> {
        let map = project_sig_value
            .as_object()
            .ok_or_else(|| SignatureError::malformed("project signature"))?;

        let sig_version = map
            .get("__version__")
            .and_then(JsonValue::as_u64)
            .ok_or_else(|| SignatureError::malformed("signature version tag"))?;

        if sig_version > u64::from(SIGNATURE_VERSION) {
            return Err(SignatureError::UnsupportedVersion {
                version: sig_version,
            });
        }

        #[allow(clippy::cast_possible_truncation)]
        let sig_version = sig_version as u32;

        let mut project_sig = Self::new();

        for (app_id, app_sig_value) in map {
            if app_id != "__version__" {
                project_sig.add_app_sig(AppSignature::deserialize(
                    app_id,
                    app_sig_value,
                    sig_version,
                )?);
            }
        }

        Ok(project_sig)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sig::{FieldSignature, FieldType, ModelSignature};

    fn sample_project_sig() -> ProjectSignature {
        ProjectSignature::new().with_app(
            AppSignature::new("library").with_model(
                ModelSignature::new("Book", "library_book")
                    .with_pk_column("id")
                    .with_field(
                        FieldSignature::new("id", FieldType::AutoField)
                            .with_attr("primary_key", true),
                    )
                    .with_field(
                        FieldSignature::new("title", FieldType::CharField)
                            .with_attr("max_length", 100),
                    ),
            ),
        )
    }

    #[test]
    fn diff_against_self_is_empty() {
        let project_sig = sample_project_sig();

        assert!(project_sig.diff(&project_sig).is_empty());
    }

    #[test]
    fn deleted_app_lists_its_models() {
        let old_project_sig = sample_project_sig();
        let new_project_sig = ProjectSignature::new();

        let project_diff = new_project_sig.diff(&old_project_sig);

        assert_eq!(
            project_diff.deleted,
            vec![("library".to_string(), vec!["Book".to_string()])]
        );
    }

    #[test]
    fn wire_round_trip_is_a_fixed_point() {
        let project_sig = sample_project_sig();

        let wire = project_sig.serialize(SIGNATURE_VERSION);
        let back = ProjectSignature::deserialize(&wire).unwrap();

        assert_eq!(back, project_sig);
        assert_eq!(back.serialize(SIGNATURE_VERSION), wire);
    }

    #[test]
    fn future_versions_are_rejected() {
        let wire = serde_json::json!({"__version__": 99});

        assert!(matches!(
            ProjectSignature::deserialize(&wire),
            Err(SignatureError::UnsupportedVersion { version: 99 })
        ));
    }
}

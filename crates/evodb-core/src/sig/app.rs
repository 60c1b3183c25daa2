use crate::{
    diff::AppDiff,
    error::MissingSignatureError,
    sig::{ModelSignature, SigList, SignatureError},
};
use serde_json::{Map, Value as JsonValue};

///
/// AppSignature
///
/// Schema state for one application: its identifier and the ordered model
/// signatures registered under it.
///

#[derive(Clone, Debug, PartialEq)]
pub struct AppSignature {
    pub app_id: String,
    models: SigList<ModelSignature>,
}

impl AppSignature {
    #[must_use]
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            models: SigList::new(),
        }
    }

    #[must_use]
    pub fn with_model(mut self, model_sig: ModelSignature) -> Self {
        self.add_model_sig(model_sig);
        self
    }

    pub fn add_model_sig(&mut self, model_sig: ModelSignature) {
        self.models.insert(model_sig);
    }

    pub fn remove_model_sig(
        &mut self,
        model_name: &str,
    ) -> Result<ModelSignature, MissingSignatureError> {
        self.models
            .remove(model_name)
            .ok_or_else(|| MissingSignatureError::Model {
                app_id: self.app_id.clone(),
                model_name: model_name.to_string(),
            })
    }

    #[must_use]
    pub fn get_model_sig(&self, model_name: &str) -> Option<&ModelSignature> {
        self.models.get(model_name)
    }

    #[must_use]
    pub fn get_model_sig_mut(&mut self, model_name: &str) -> Option<&mut ModelSignature> {
        self.models.get_mut(model_name)
    }

    pub fn get_model_sig_required(
        &self,
        model_name: &str,
    ) -> Result<&ModelSignature, MissingSignatureError> {
        self.models
            .get(model_name)
            .ok_or_else(|| MissingSignatureError::Model {
                app_id: self.app_id.clone(),
                model_name: model_name.to_string(),
            })
    }

    pub fn model_sigs(&self) -> impl Iterator<Item = &ModelSignature> {
        self.models.iter()
    }

    pub fn model_sigs_mut(&mut self) -> impl Iterator<Item = &mut ModelSignature> {
        self.models.iter_mut()
    }

    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys()
    }

    /// Move a model signature to a new key. The renamed entry is appended
    /// at the tail, matching re-insertion semantics.
    pub(crate) fn rename_model_sig(
        &mut self,
        old_model_name: &str,
        new_model_name: &str,
    ) -> Result<(), MissingSignatureError> {
        let mut model_sig = self.remove_model_sig(old_model_name)?;
        model_sig.model_name = new_model_name.to_string();
        self.add_model_sig(model_sig);

        Ok(())
    }

    /// Diff against an older application signature.
    #[must_use]
    pub fn diff(&self, old_app_sig: &Self) -> AppDiff {
        let mut app_diff = AppDiff::default();

        for old_model_sig in old_app_sig.model_sigs() {
            let model_name = &old_model_sig.model_name;

            match self.get_model_sig(model_name) {
                Some(new_model_sig) => {
                    let model_changes = new_model_sig.diff(old_model_sig);

                    if !model_changes.is_empty() {
                        app_diff.changed.push((model_name.clone(), model_changes));
                    }
                }
                None => app_diff.deleted.push(model_name.clone()),
            }
        }

        app_diff
    }

    /// Serialize to the versioned wire form.
    #[must_use]
    pub fn serialize(&self, sig_version: u32) -> JsonValue {
        let mut map = Map::new();

        for model_sig in self.models.iter() {
            map.insert(
                model_sig.model_name.clone(),
                model_sig.serialize(sig_version),
            );
        }

        JsonValue::Object(map)
    }

    /// Deserialize from the versioned wire form.
    pub fn deserialize(
        app_id: &str,
        app_sig_value: &JsonValue,
        sig_version: u32,
    ) -> Result<Self, SignatureError> {
        let map = app_sig_value
            .as_object()
            .ok_or_else(|| SignatureError::malformed(format!("application \"{app_id}\"")))?;

        let mut app_sig = Self::new(app_id);

        for (model_name, model_sig_value) in map {
            app_sig.add_model_sig(ModelSignature::deserialize(
                model_name,
                model_sig_value,
                sig_version,
            )?);
        }

        Ok(app_sig)
    }
}

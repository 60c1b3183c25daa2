use crate::{
    diff::ModelDiff,
    error::MissingSignatureError,
    sig::{FieldSignature, IndexSignature, SigList, SignatureError},
};
use serde_json::{Map, Value as JsonValue};

///
/// Together
///
/// Normalized `unique_together` / `index_together` value: always a list of
/// field-name tuples, even when a caller supplied a single flat tuple.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Together(Vec<Vec<String>>);

impl Together {
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn groups(&self) -> &[Vec<String>] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Normalize a wire value. A flat list of names is wrapped into a
    /// single-entry group list; normalizing twice is a no-op.
    pub fn from_wire(value: &JsonValue) -> Result<Self, SignatureError> {
        let entries = match value {
            JsonValue::Null => return Ok(Self::new()),
            JsonValue::Array(entries) => entries,
            _ => return Err(SignatureError::malformed("together value")),
        };

        if entries.is_empty() {
            return Ok(Self::new());
        }

        let as_group = |entry: &JsonValue| -> Result<Vec<String>, SignatureError> {
            entry
                .as_array()
                .ok_or_else(|| SignatureError::malformed("together group"))?
                .iter()
                .map(|name| {
                    name.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| SignatureError::malformed("together field name"))
                })
                .collect()
        };

        if entries[0].is_string() {
            // A flat tuple of field names.
            let group = entries
                .iter()
                .map(|name| {
                    name.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| SignatureError::malformed("together field name"))
                })
                .collect::<Result<Vec<_>, _>>()?;

            return Ok(Self(vec![group]));
        }

        Ok(Self(
            entries.iter().map(as_group).collect::<Result<Vec<_>, _>>()?,
        ))
    }

    #[must_use]
    pub fn to_wire(&self) -> JsonValue {
        JsonValue::Array(
            self.0
                .iter()
                .map(|group| {
                    JsonValue::Array(
                        group
                            .iter()
                            .map(|name| JsonValue::String(name.clone()))
                            .collect(),
                    )
                })
                .collect(),
        )
    }

    /// Order-insensitive comparison, used by model equality.
    #[must_use]
    pub fn same_groups(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.0.iter().all(|group| other.0.contains(group))
    }
}

impl From<Vec<Vec<String>>> for Together {
    fn from(groups: Vec<Vec<String>>) -> Self {
        Self(groups)
    }
}

impl From<Vec<String>> for Together {
    /// A single flat tuple of field names.
    fn from(group: Vec<String>) -> Self {
        if group.is_empty() {
            Self::new()
        } else {
            Self(vec![group])
        }
    }
}

impl From<&[&str]> for Together {
    fn from(group: &[&str]) -> Self {
        Self::from(group.iter().map(|s| (*s).to_string()).collect::<Vec<_>>())
    }
}

///
/// ModelSignature
///
/// Schema state for one model: identity, table metadata, uniqueness and
/// index groupings, and the ordered field signatures.
///

#[derive(Clone, Debug)]
pub struct ModelSignature {
    pub model_name: String,
    pub table_name: String,
    pub db_tablespace: Option<String>,
    pub pk_column: Option<String>,
    unique_together: Together,
    index_together: Together,
    pub index_sigs: Vec<IndexSignature>,
    fields: SigList<FieldSignature>,
    unique_together_applied: bool,
}

impl ModelSignature {
    #[must_use]
    pub fn new(model_name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            table_name: table_name.into(),
            db_tablespace: None,
            pk_column: None,
            unique_together: Together::new(),
            index_together: Together::new(),
            index_sigs: Vec::new(),
            fields: SigList::new(),
            unique_together_applied: false,
        }
    }

    #[must_use]
    pub fn with_pk_column(mut self, pk_column: impl Into<String>) -> Self {
        self.pk_column = Some(pk_column.into());
        self
    }

    #[must_use]
    pub fn with_field(mut self, field_sig: FieldSignature) -> Self {
        self.add_field_sig(field_sig);
        self
    }

    // fields

    pub fn add_field_sig(&mut self, field_sig: FieldSignature) {
        self.fields.insert(field_sig);
    }

    pub fn remove_field_sig(
        &mut self,
        field_name: &str,
    ) -> Result<FieldSignature, MissingSignatureError> {
        self.fields
            .remove(field_name)
            .ok_or_else(|| MissingSignatureError::Field {
                model_name: self.model_name.clone(),
                field_name: field_name.to_string(),
            })
    }

    #[must_use]
    pub fn get_field_sig(&self, field_name: &str) -> Option<&FieldSignature> {
        self.fields.get(field_name)
    }

    #[must_use]
    pub fn get_field_sig_mut(&mut self, field_name: &str) -> Option<&mut FieldSignature> {
        self.fields.get_mut(field_name)
    }

    pub fn get_field_sig_required(
        &self,
        field_name: &str,
    ) -> Result<&FieldSignature, MissingSignatureError> {
        self.fields
            .get(field_name)
            .ok_or_else(|| MissingSignatureError::Field {
                model_name: self.model_name.clone(),
                field_name: field_name.to_string(),
            })
    }

    pub fn field_sigs(&self) -> impl Iterator<Item = &FieldSignature> {
        self.fields.iter()
    }

    pub fn field_sigs_mut(&mut self) -> impl Iterator<Item = &mut FieldSignature> {
        self.fields.iter_mut()
    }

    // meta

    pub fn add_index_sig(&mut self, index_sig: IndexSignature) {
        self.index_sigs.push(index_sig);
    }

    #[must_use]
    pub const fn unique_together(&self) -> &Together {
        &self.unique_together
    }

    pub fn set_unique_together(&mut self, unique_together: impl Into<Together>) {
        self.unique_together = unique_together.into();
    }

    #[must_use]
    pub const fn index_together(&self) -> &Together {
        &self.index_together
    }

    pub fn set_index_together(&mut self, index_together: impl Into<Together>) {
        self.index_together = index_together.into();
    }

    /// Record that uniqueness constraints have actually been materialized
    /// in the database.
    pub fn record_unique_together_applied(&mut self) {
        self.unique_together_applied = true;
    }

    #[must_use]
    pub const fn unique_together_applied(&self) -> bool {
        self.unique_together_applied
    }

    /// Whether `unique_together` must be treated as changed relative to an
    /// older signature.
    ///
    /// True when the values differ, or when either side is non-empty and
    /// the old record predates constraint enforcement (the constraints were
    /// never applied and must be now, even if the values match).
    #[must_use]
    pub fn has_unique_together_changed(&self, old_model_sig: &Self) -> bool {
        let old_unique_together = &old_model_sig.unique_together;
        let new_unique_together = &self.unique_together;

        old_unique_together != new_unique_together
            || ((!old_unique_together.is_empty() || !new_unique_together.is_empty())
                && !old_model_sig.unique_together_applied)
    }

    /// Strip a field from every `unique_together` group, preserving the
    /// group list itself.
    pub(crate) fn strip_field_from_unique_together(&mut self, field_name: &str) {
        let groups = self
            .unique_together
            .groups()
            .iter()
            .map(|group| {
                group
                    .iter()
                    .filter(|name| *name != field_name)
                    .cloned()
                    .collect()
            })
            .collect::<Vec<Vec<String>>>();

        self.unique_together = Together::from(groups);
    }

    /// Substitute a field name across `unique_together` and
    /// `index_together`, preserving tuple arity.
    pub(crate) fn rename_field_in_together(&mut self, old_name: &str, new_name: &str) {
        let rename = |together: &Together| {
            Together::from(
                together
                    .groups()
                    .iter()
                    .map(|group| {
                        group
                            .iter()
                            .map(|name| {
                                if name == old_name {
                                    new_name.to_string()
                                } else {
                                    name.clone()
                                }
                            })
                            .collect()
                    })
                    .collect::<Vec<Vec<String>>>(),
            )
        };

        self.unique_together = rename(&self.unique_together);
        self.index_together = rename(&self.index_together);
    }

    /// Diff against an older model signature.
    #[must_use]
    pub fn diff(&self, old_model_sig: &Self) -> ModelDiff {
        let mut model_diff = ModelDiff::default();

        // Walk the old fields looking for changed and deleted entries.
        for old_field_sig in old_model_sig.field_sigs() {
            let field_name = &old_field_sig.field_name;

            match self.get_field_sig(field_name) {
                Some(new_field_sig) => {
                    let changed_field_attrs = new_field_sig.diff(old_field_sig);

                    if !changed_field_attrs.is_empty() {
                        model_diff
                            .changed
                            .push((field_name.clone(), changed_field_attrs));
                    }
                }
                None => model_diff.deleted.push(field_name.clone()),
            }
        }

        // Walk the new fields looking for additions.
        model_diff.added = self
            .field_sigs()
            .filter(|field_sig| old_model_sig.get_field_sig(&field_sig.field_name).is_none())
            .map(|field_sig| field_sig.field_name.clone())
            .collect();

        if self.has_unique_together_changed(old_model_sig) {
            model_diff.meta_changed.push("unique_together".to_string());
        }

        if self.index_together != old_model_sig.index_together {
            model_diff.meta_changed.push("index_together".to_string());
        }

        if self.index_sigs != old_model_sig.index_sigs {
            model_diff.meta_changed.push("indexes".to_string());
        }

        model_diff
    }

    /// Serialize to the versioned wire form.
    #[must_use]
    pub fn serialize(&self, sig_version: u32) -> JsonValue {
        let mut meta = Map::new();
        meta.insert(
            "db_table".to_string(),
            JsonValue::String(self.table_name.clone()),
        );
        meta.insert(
            "db_tablespace".to_string(),
            self.db_tablespace
                .as_ref()
                .map_or(JsonValue::Null, |ts| JsonValue::String(ts.clone())),
        );
        meta.insert(
            "index_together".to_string(),
            self.index_together.to_wire(),
        );
        meta.insert(
            "indexes".to_string(),
            JsonValue::Array(
                self.index_sigs
                    .iter()
                    .map(|index_sig| index_sig.serialize(sig_version))
                    .collect(),
            ),
        );
        meta.insert(
            "pk_column".to_string(),
            self.pk_column
                .as_ref()
                .map_or(JsonValue::Null, |pk| JsonValue::String(pk.clone())),
        );
        meta.insert(
            "unique_together".to_string(),
            self.unique_together.to_wire(),
        );
        meta.insert(
            "__unique_together_applied".to_string(),
            JsonValue::Bool(self.unique_together_applied),
        );

        let mut fields = Map::new();

        for field_sig in self.fields.iter() {
            fields.insert(
                field_sig.field_name.clone(),
                field_sig.serialize(sig_version),
            );
        }

        let mut map = Map::new();
        map.insert("meta".to_string(), JsonValue::Object(meta));
        map.insert("fields".to_string(), JsonValue::Object(fields));

        JsonValue::Object(map)
    }

    /// Deserialize from the versioned wire form.
    pub fn deserialize(
        model_name: &str,
        model_sig_value: &JsonValue,
        sig_version: u32,
    ) -> Result<Self, SignatureError> {
        let map = model_sig_value
            .as_object()
            .ok_or_else(|| SignatureError::malformed(format!("model \"{model_name}\"")))?;

        let meta = map
            .get("meta")
            .and_then(JsonValue::as_object)
            .ok_or_else(|| SignatureError::malformed(format!("meta for \"{model_name}\"")))?;

        let table_name = meta
            .get("db_table")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| SignatureError::malformed(format!("table for \"{model_name}\"")))?;

        let mut model_sig = Self::new(model_name, table_name);

        model_sig.db_tablespace = meta
            .get("db_tablespace")
            .and_then(JsonValue::as_str)
            .map(str::to_string);
        model_sig.pk_column = meta
            .get("pk_column")
            .and_then(JsonValue::as_str)
            .map(str::to_string);
        model_sig.index_together =
            Together::from_wire(meta.get("index_together").unwrap_or(&JsonValue::Null))?;
        model_sig.unique_together =
            Together::from_wire(meta.get("unique_together").unwrap_or(&JsonValue::Null))?;
        model_sig.unique_together_applied = meta
            .get("__unique_together_applied")
            .and_then(JsonValue::as_bool)
            .unwrap_or(false);

        if let Some(indexes) = meta.get("indexes").and_then(JsonValue::as_array) {
            for index_sig_value in indexes {
                model_sig.add_index_sig(IndexSignature::deserialize(index_sig_value, sig_version)?);
            }
        }

        let fields = map
            .get("fields")
            .and_then(JsonValue::as_object)
            .ok_or_else(|| SignatureError::malformed(format!("fields for \"{model_name}\"")))?;

        for (field_name, field_sig_value) in fields {
            model_sig.add_field_sig(FieldSignature::deserialize(
                field_name,
                field_sig_value,
                sig_version,
            )?);
        }

        Ok(model_sig)
    }
}

impl PartialEq for ModelSignature {
    /// Structural equality, with `unique_together` special-cased: matching
    /// values with differing applied flags are still unequal, forcing
    /// re-application after an upgrade from a legacy record.
    fn eq(&self, other: &Self) -> bool {
        self.table_name == other.table_name
            && self.db_tablespace == other.db_tablespace
            && self.index_sigs.len() == other.index_sigs.len()
            && self
                .index_sigs
                .iter()
                .all(|index_sig| other.index_sigs.contains(index_sig))
            && self.index_together.same_groups(&other.index_together)
            && self.model_name == other.model_name
            && self.pk_column == other.pk_column
            && self.fields == other.fields
            && !self.has_unique_together_changed(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sig::FieldType;
    use proptest::prelude::*;
    use serde_json::json;

    fn model_with_unique_together(applied: bool) -> ModelSignature {
        let mut model_sig = ModelSignature::new("Reading", "app_reading")
            .with_pk_column("id")
            .with_field(FieldSignature::new("id", FieldType::AutoField).with_attr("primary_key", true))
            .with_field(FieldSignature::new("book", FieldType::IntegerField))
            .with_field(FieldSignature::new("user", FieldType::IntegerField));

        model_sig.set_unique_together(vec![vec!["book".to_string(), "user".to_string()]]);

        if applied {
            model_sig.record_unique_together_applied();
        }

        model_sig
    }

    #[test]
    fn flat_tuple_normalizes_to_a_single_group() {
        let together = Together::from_wire(&json!(["a", "b"])).unwrap();
        assert_eq!(together.groups(), &[vec!["a".to_string(), "b".to_string()]]);

        let nested = Together::from_wire(&json!([["a", "b"]])).unwrap();
        assert_eq!(together, nested);
    }

    #[test]
    fn unapplied_unique_together_is_a_change_even_when_equal() {
        let old_model_sig = model_with_unique_together(false);
        let new_model_sig = model_with_unique_together(true);

        assert!(new_model_sig.has_unique_together_changed(&old_model_sig));
        assert_ne!(new_model_sig, old_model_sig);

        let model_diff = new_model_sig.diff(&old_model_sig);
        assert_eq!(model_diff.meta_changed, vec!["unique_together"]);
    }

    #[test]
    fn applied_unique_together_with_equal_values_is_unchanged() {
        let old_model_sig = model_with_unique_together(true);
        let new_model_sig = model_with_unique_together(true);

        assert!(!new_model_sig.has_unique_together_changed(&old_model_sig));
        assert_eq!(new_model_sig, old_model_sig);
        assert!(new_model_sig.diff(&old_model_sig).is_empty());
    }

    #[test]
    fn wire_round_trip_preserves_applied_flag() {
        let model_sig = model_with_unique_together(true);
        let wire = model_sig.serialize(1);

        let back = ModelSignature::deserialize("Reading", &wire, 1).unwrap();

        assert!(back.unique_together_applied());
        assert_eq!(back, model_sig);
        assert_eq!(back.serialize(1), wire);
    }

    proptest! {
        #[test]
        fn together_normalization_is_idempotent(
            groups in prop::collection::vec(
                prop::collection::vec("[a-z]{1,8}", 1..4),
                0..4,
            )
        ) {
            let once = Together::from_wire(&json!(groups)).unwrap();
            let twice = Together::from_wire(&once.to_wire()).unwrap();

            prop_assert_eq!(once, twice);
        }

        #[test]
        fn flat_together_normalization_is_idempotent(
            group in prop::collection::vec("[a-z]{1,8}", 1..5)
        ) {
            let once = Together::from_wire(&json!(group)).unwrap();
            let twice = Together::from_wire(&once.to_wire()).unwrap();

            prop_assert_eq!(once, twice);
        }
    }
}

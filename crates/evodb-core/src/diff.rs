//! Structured differences between schema signatures, and the hinted
//! mutation sequences derived from them.

use crate::{
    mutation::{
        AddField, ChangeField, ChangeMeta, DeleteField, DeleteModel, InitialValue, MetaValue,
        Mutation,
    },
    sig::{AttrValue, ProjectSignature},
};
use serde_json::{Map, Value as JsonValue};
use std::fmt::{self, Display};

///
/// ModelDiff
///
/// Field-level and meta-level changes for one model. Branches with no
/// content are omitted from the serialized form entirely.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ModelDiff {
    pub added: Vec<String>,
    pub changed: Vec<(String, Vec<String>)>,
    pub deleted: Vec<String>,
    pub meta_changed: Vec<String>,
}

impl ModelDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.changed.is_empty()
            && self.deleted.is_empty()
            && self.meta_changed.is_empty()
    }

    #[must_use]
    pub fn to_value(&self) -> JsonValue {
        let mut map = Map::new();

        if !self.added.is_empty() {
            map.insert("added".to_string(), string_list(&self.added));
        }

        if !self.changed.is_empty() {
            let mut changed = Map::new();

            for (field_name, attrs) in &self.changed {
                changed.insert(field_name.clone(), string_list(attrs));
            }

            map.insert("changed".to_string(), JsonValue::Object(changed));
        }

        if !self.deleted.is_empty() {
            map.insert("deleted".to_string(), string_list(&self.deleted));
        }

        if !self.meta_changed.is_empty() {
            map.insert("meta_changed".to_string(), string_list(&self.meta_changed));
        }

        JsonValue::Object(map)
    }
}

///
/// AppDiff
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AppDiff {
    pub changed: Vec<(String, ModelDiff)>,
    pub deleted: Vec<String>,
}

impl AppDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.deleted.is_empty()
    }

    #[must_use]
    pub fn to_value(&self) -> JsonValue {
        let mut map = Map::new();

        if !self.changed.is_empty() {
            let mut changed = Map::new();

            for (model_name, model_diff) in &self.changed {
                changed.insert(model_name.clone(), model_diff.to_value());
            }

            map.insert("changed".to_string(), JsonValue::Object(changed));
        }

        if !self.deleted.is_empty() {
            map.insert("deleted".to_string(), string_list(&self.deleted));
        }

        JsonValue::Object(map)
    }
}

///
/// ProjectDiff
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ProjectDiff {
    pub changed: Vec<(String, AppDiff)>,
    pub deleted: Vec<(String, Vec<String>)>,
}

impl ProjectDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.deleted.is_empty()
    }

    #[must_use]
    pub fn to_value(&self) -> JsonValue {
        let mut map = Map::new();

        if !self.changed.is_empty() {
            let mut changed = Map::new();

            for (app_id, app_diff) in &self.changed {
                changed.insert(app_id.clone(), app_diff.to_value());
            }

            map.insert("changed".to_string(), JsonValue::Object(changed));
        }

        if !self.deleted.is_empty() {
            let mut deleted = Map::new();

            for (app_id, model_names) in &self.deleted {
                deleted.insert(app_id.clone(), string_list(model_names));
            }

            map.insert("deleted".to_string(), JsonValue::Object(deleted));
        }

        JsonValue::Object(map)
    }
}

fn string_list(items: &[String]) -> JsonValue {
    JsonValue::Array(
        items
            .iter()
            .map(|item| JsonValue::String(item.clone()))
            .collect(),
    )
}

///
/// Diff
///
/// Captures two project signatures and their structured difference, and
/// derives hinted mutation sequences from it.
///

#[derive(Clone, Debug)]
pub struct Diff {
    old_project_sig: ProjectSignature,
    new_project_sig: ProjectSignature,
    project_diff: ProjectDiff,
}

impl Diff {
    #[must_use]
    pub fn new(old_project_sig: &ProjectSignature, new_project_sig: &ProjectSignature) -> Self {
        let project_diff = new_project_sig.diff(old_project_sig);

        Self {
            old_project_sig: old_project_sig.clone(),
            new_project_sig: new_project_sig.clone(),
            project_diff,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.project_diff.is_empty()
    }

    #[must_use]
    pub const fn project_diff(&self) -> &ProjectDiff {
        &self.project_diff
    }

    #[must_use]
    pub const fn old_project_sig(&self) -> &ProjectSignature {
        &self.old_project_sig
    }

    #[must_use]
    pub const fn new_project_sig(&self) -> &ProjectSignature {
        &self.new_project_sig
    }

    /// Applications present in the old signature but missing from the new.
    pub fn deleted_apps(&self) -> impl Iterator<Item = &str> {
        self.project_diff.deleted.iter().map(|(app_id, _)| app_id.as_str())
    }

    #[must_use]
    pub fn to_value(&self) -> JsonValue {
        self.project_diff.to_value()
    }

    /// Derive a hinted mutation sequence per changed application.
    ///
    /// Added fields become `AddField` (with a placeholder initial value
    /// when the column is non-nullable), deleted fields `DeleteField`,
    /// changed fields `ChangeField` carrying the new attribute values,
    /// deleted models `DeleteModel`, and meta changes `ChangeMeta`.
    #[must_use]
    pub fn hinted_mutations(&self) -> Vec<(String, Vec<Mutation>)> {
        let mut hinted = Vec::new();

        for (app_id, app_diff) in &self.project_diff.changed {
            let mut mutations = Vec::new();

            let Some(new_app_sig) = self.new_project_sig.get_app_sig(app_id) else {
                continue;
            };

            for (model_name, model_diff) in &app_diff.changed {
                let Some(new_model_sig) = new_app_sig.get_model_sig(model_name) else {
                    continue;
                };

                for field_name in &model_diff.added {
                    if let Some(field_sig) = new_model_sig.get_field_sig(field_name) {
                        mutations.push(Mutation::AddField(AddField::from_field_sig(
                            model_name, field_sig,
                        )));
                    }
                }

                for (field_name, changed_attrs) in &model_diff.changed {
                    if let Some(field_sig) = new_model_sig.get_field_sig(field_name) {
                        let mut change = ChangeField::new(model_name, field_name);

                        for attr in changed_attrs {
                            if attr == "related_model" || attr == "field_type" {
                                continue;
                            }

                            change = change.with_attr(
                                attr,
                                field_sig.attr_value(attr).unwrap_or(AttrValue::Null),
                            );
                        }

                        // Pseudo-attribute changes (field_type,
                        // related_model) carry no settable attribute.
                        if change.field_attrs.is_empty() {
                            continue;
                        }

                        // Dropping nullability needs a backfill value the
                        // diff cannot know.
                        if change.attr("null").is_some_and(|null| !null.is_truthy()) {
                            change = change.with_initial(InitialValue::Placeholder);
                        }

                        mutations.push(Mutation::ChangeField(change));
                    }
                }

                for field_name in &model_diff.deleted {
                    mutations.push(Mutation::DeleteField(DeleteField::new(
                        model_name, field_name,
                    )));
                }

                for prop_name in &model_diff.meta_changed {
                    let meta_value = match prop_name.as_str() {
                        "unique_together" => {
                            MetaValue::Together(new_model_sig.unique_together().clone())
                        }
                        "index_together" => {
                            MetaValue::Together(new_model_sig.index_together().clone())
                        }
                        "indexes" => MetaValue::Indexes(new_model_sig.index_sigs.clone()),
                        _ => continue,
                    };

                    mutations.push(Mutation::ChangeMeta(ChangeMeta::new(
                        model_name, prop_name, meta_value,
                    )));
                }
            }

            for model_name in &app_diff.deleted {
                mutations.push(Mutation::DeleteModel(DeleteModel::new(model_name)));
            }

            if !mutations.is_empty() {
                hinted.push((app_id.clone(), mutations));
            }
        }

        hinted
    }
}

impl Display for Diff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "No changes");
        }

        for (app_id, model_names) in &self.project_diff.deleted {
            writeln!(
                f,
                "The application {app_id} has been deleted (models: {})",
                model_names.join(", ")
            )?;
        }

        for (app_id, app_diff) in &self.project_diff.changed {
            for (model_name, model_diff) in &app_diff.changed {
                writeln!(f, "In model {app_id}.{model_name}:")?;

                for field_name in &model_diff.added {
                    writeln!(f, "    Field '{field_name}' has been added")?;
                }

                for (field_name, attrs) in &model_diff.changed {
                    writeln!(f, "    In field '{field_name}':")?;

                    for attr in attrs {
                        writeln!(f, "        Property '{attr}' has changed")?;
                    }
                }

                for field_name in &model_diff.deleted {
                    writeln!(f, "    Field '{field_name}' has been deleted")?;
                }

                for prop_name in &model_diff.meta_changed {
                    writeln!(f, "    Meta property '{prop_name}' has changed")?;
                }
            }

            for model_name in &app_diff.deleted {
                writeln!(f, "The model {app_id}.{model_name} has been deleted")?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sig::{AppSignature, FieldSignature, FieldType, ModelSignature};

    fn project_sig_with_fields(fields: &[(&str, FieldType, bool)]) -> ProjectSignature {
        let mut model_sig = ModelSignature::new("Book", "library_book").with_pk_column("id");

        for (name, field_type, nullable) in fields {
            let mut field_sig = FieldSignature::new(*name, *field_type);

            if *nullable {
                field_sig = field_sig.with_attr("null", true);
            }

            model_sig.add_field_sig(field_sig);
        }

        ProjectSignature::new().with_app(AppSignature::new("library").with_model(model_sig))
    }

    #[test]
    fn diff_reflexivity_yields_the_empty_structure() {
        let project_sig = project_sig_with_fields(&[("id", FieldType::AutoField, false)]);
        let diff = Diff::new(&project_sig, &project_sig);

        assert!(diff.is_empty());
        assert_eq!(diff.to_value(), serde_json::json!({}));
    }

    #[test]
    fn added_nullable_field_hints_an_add_field_mutation() {
        let old = project_sig_with_fields(&[("id", FieldType::AutoField, false)]);
        let new = project_sig_with_fields(&[
            ("id", FieldType::AutoField, false),
            ("nickname", FieldType::CharField, true),
        ]);

        let diff = Diff::new(&old, &new);
        let hinted = diff.hinted_mutations();

        assert_eq!(hinted.len(), 1);
        assert_eq!(hinted[0].0, "library");

        let hints: Vec<String> = hinted[0].1.iter().map(Mutation::generate_hint).collect();
        assert_eq!(
            hints,
            vec!["AddField('Book', 'nickname', 'CharField', null=True)"]
        );
    }

    #[test]
    fn deleted_model_hints_a_delete_model_mutation() {
        let old = project_sig_with_fields(&[("id", FieldType::AutoField, false)]);
        let new = ProjectSignature::new().with_app(AppSignature::new("library"));

        let diff = Diff::new(&old, &new);
        let hinted = diff.hinted_mutations();

        let hints: Vec<String> = hinted[0].1.iter().map(Mutation::generate_hint).collect();
        assert_eq!(hints, vec!["DeleteModel('Book')"]);
    }
}

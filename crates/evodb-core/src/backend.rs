//! The per-dialect backend adapter contract.
//!
//! A backend turns scheduled primitive operations for one table into
//! ordered, executable SQL. It declares which `ChangeField` attributes and
//! `ChangeMeta` properties it can modify, and owns identifier quoting and
//! deterministic name generation for its dialect.

use crate::{
    error::{EvolutionError, MissingSignatureError},
    mutator::ScheduledOp,
    sig::{FieldSignature, ModelSignature, ProjectSignature},
    state::DatabaseState,
};

///
/// TableModel
///
/// A resolved handle for one model's table, carrying everything SQL
/// generation needs without reaching back into the signature tree.
///

#[derive(Clone, Debug)]
pub struct TableModel {
    pub app_label: String,
    pub model_name: String,
    pub table_name: String,
    pub pk_column: String,

    /// Field name to column name, in field order.
    pub columns: Vec<(String, String)>,
}

impl TableModel {
    #[must_use]
    pub fn from_model_sig(app_label: &str, model_sig: &ModelSignature) -> Self {
        let pk_column = model_sig.pk_column.clone().unwrap_or_else(|| {
            model_sig
                .field_sigs()
                .find(|field_sig| field_sig.is_primary_key())
                .map_or_else(|| "id".to_string(), FieldSignature::column_name)
        });

        let columns = model_sig
            .field_sigs()
            .filter(|field_sig| !field_sig.field_type.is_many_to_many())
            .map(|field_sig| (field_sig.field_name.clone(), field_sig.column_name()))
            .collect();

        Self {
            app_label: app_label.to_string(),
            model_name: model_sig.model_name.clone(),
            table_name: model_sig.table_name.clone(),
            pk_column,
            columns,
        }
    }

    /// The column backing a field, falling back to the field name itself
    /// for fields the table no longer carries.
    #[must_use]
    pub fn column_for(&self, field_name: &str) -> String {
        self.columns
            .iter()
            .find(|(name, _)| name == field_name)
            .map_or_else(|| field_name.to_string(), |(_, column)| column.clone())
    }
}

///
/// FkTarget
///
/// The resolved target of a relational column: the referenced table and
/// its primary-key column.
///

#[derive(Clone, Debug)]
pub struct FkTarget {
    pub model_name: String,
    pub table_name: String,
    pub pk_column: String,
}

/// Resolve a `"app.Model"` reference against a project signature.
pub fn resolve_fk_target(
    project_sig: &ProjectSignature,
    related_model: &str,
) -> Result<FkTarget, EvolutionError> {
    let (app_id, model_name) = related_model.split_once('.').ok_or_else(|| {
        MissingSignatureError::Model {
            app_id: String::new(),
            model_name: related_model.to_string(),
        }
    })?;

    let model_sig = project_sig
        .get_app_sig_required(app_id)?
        .get_model_sig_required(model_name)?;

    let table_model = TableModel::from_model_sig(app_id, model_sig);

    Ok(FkTarget {
        model_name: table_model.model_name,
        table_name: table_model.table_name,
        pk_column: table_model.pk_column,
    })
}

///
/// EvolutionBackend
///
/// External collaborator contract: given ordered primitive operations for
/// one table, return ordered SQL statements. A backend is free to merge
/// adjacent compatible operations into one multi-clause ALTER TABLE.
///

pub trait EvolutionBackend {
    /// The dialect identifier used for registry lookup.
    fn name(&self) -> &'static str;

    /// Attribute names this backend can change on a column.
    fn supported_change_attrs(&self) -> &[&'static str];

    /// Meta properties this backend can modify on a table.
    fn supported_change_meta(&self) -> &[&'static str];

    /// The dialect's maximum identifier length.
    fn max_name_length(&self) -> usize {
        63
    }

    fn quote_name(&self, name: &str) -> String;

    /// The column type phrase for a field (e.g. `varchar(100)`).
    fn column_type(&self, field_sig: &FieldSignature) -> String;

    /// Render scheduled operations for one table, in order, merging where
    /// the dialect allows. Updates `state` as indexes are created or
    /// dropped.
    fn sql_for_table_ops(
        &self,
        table: &TableModel,
        ops: &[ScheduledOp],
        state: &mut DatabaseState,
    ) -> Result<Vec<String>, EvolutionError>;

    fn rename_table_sql(&self, old_table: &str, new_table: &str) -> Vec<String>;

    fn rename_column_sql(
        &self,
        table: &TableModel,
        old_field: &FieldSignature,
        new_field: &FieldSignature,
    ) -> Vec<String>;

    fn delete_table_sql(&self, table_name: &str) -> Vec<String>;

    /// DDL for creating a many-to-many join table between `table` and
    /// `target`.
    fn add_m2m_table_sql(
        &self,
        table: &TableModel,
        field_sig: &FieldSignature,
        m2m_table: &str,
        target: &FkTarget,
    ) -> Vec<String>;
}

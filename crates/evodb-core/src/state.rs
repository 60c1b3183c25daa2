//! Tracked database state: per-table index and constraint bookkeeping.
//!
//! Seeded from the stored project signature (never from catalog scraping)
//! and updated as SQL is generated, so that later operations inside one
//! evolution see the indexes earlier operations created or dropped.

use crate::sig::ProjectSignature;
use convert_case::{Case, Casing};

/// Default generated table name for a model.
#[must_use]
pub fn default_table_name(app_label: &str, model_name: &str) -> String {
    format!("{app_label}_{}", model_name.to_case(Case::Flat))
}

/// Default generated index name for a column set.
#[must_use]
pub fn default_index_name(table_name: &str, columns: &[&str]) -> String {
    format!("{table_name}_{}_idx", columns.join("_"))
}

/// Default generated unique-constraint name for a column.
#[must_use]
pub fn default_constraint_name(table_name: &str, column: &str) -> String {
    format!("{table_name}_{column}_key")
}

/// Truncate a generated identifier to a dialect's maximum length.
#[must_use]
pub fn truncate_name(name: &str, max_length: usize) -> String {
    if name.len() <= max_length {
        return name.to_string();
    }

    name.chars().take(max_length).collect()
}

///
/// IndexState
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IndexState {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

///
/// TableState
///

#[derive(Clone, Debug, Default)]
struct TableState {
    table_name: String,
    indexes: Vec<IndexState>,
}

///
/// DatabaseState
///

#[derive(Clone, Debug, Default)]
pub struct DatabaseState {
    tables: Vec<TableState>,
}

impl DatabaseState {
    #[must_use]
    pub const fn new() -> Self {
        Self { tables: Vec::new() }
    }

    /// Seed index bookkeeping from a project signature: single-column
    /// indexes and unique constraints from field attributes, multi-column
    /// entries from `index_together` / `unique_together` and explicit
    /// index declarations.
    #[must_use]
    pub fn from_signature(project_sig: &ProjectSignature) -> Self {
        let mut state = Self::new();

        for app_sig in project_sig.app_sigs() {
            for model_sig in app_sig.model_sigs() {
                let table_name = model_sig.table_name.clone();

                for field_sig in model_sig.field_sigs() {
                    if field_sig.field_type.is_many_to_many() {
                        continue;
                    }

                    let column = field_sig.column_name();

                    if field_sig.is_unique() || field_sig.is_primary_key() {
                        state.add_index(
                            &table_name,
                            &default_constraint_name(&table_name, &column),
                            vec![column],
                            true,
                        );
                    } else if field_sig.has_index() {
                        state.add_index(
                            &table_name,
                            &default_index_name(&table_name, &[&column]),
                            vec![column],
                            false,
                        );
                    }
                }

                // Legacy records may carry unique_together values that were
                // never materialized; those must not be treated as existing
                // indexes.
                if model_sig.unique_together_applied() {
                    for group in model_sig.unique_together().groups() {
                        let columns = resolve_columns(model_sig, group);
                        let column_refs: Vec<&str> =
                            columns.iter().map(String::as_str).collect();

                        state.add_index(
                            &table_name,
                            &default_index_name(&table_name, &column_refs),
                            columns,
                            true,
                        );
                    }
                }

                for group in model_sig.index_together().groups() {
                    let columns = resolve_columns(model_sig, group);
                    let column_refs: Vec<&str> =
                        columns.iter().map(String::as_str).collect();

                    state.add_index(
                        &table_name,
                        &default_index_name(&table_name, &column_refs),
                        columns,
                        false,
                    );
                }

                for index_sig in &model_sig.index_sigs {
                    let fields: Vec<String> = index_sig
                        .fields
                        .iter()
                        .map(|name| name.trim_start_matches('-').to_string())
                        .collect();
                    let columns = resolve_columns(model_sig, &fields);
                    let name = index_sig.name.clone().unwrap_or_else(|| {
                        let column_refs: Vec<&str> =
                            columns.iter().map(String::as_str).collect();

                        default_index_name(&table_name, &column_refs)
                    });

                    state.add_index(&table_name, &name, columns, false);
                }
            }
        }

        state
    }

    fn table_mut(&mut self, table_name: &str) -> &mut TableState {
        if let Some(pos) = self
            .tables
            .iter()
            .position(|table| table.table_name == table_name)
        {
            return &mut self.tables[pos];
        }

        self.tables.push(TableState {
            table_name: table_name.to_string(),
            indexes: Vec::new(),
        });

        self.tables.last_mut().expect("table was just pushed")
    }

    pub fn add_index(
        &mut self,
        table_name: &str,
        index_name: &str,
        columns: Vec<String>,
        unique: bool,
    ) {
        let table = self.table_mut(table_name);

        if !table.indexes.iter().any(|index| index.name == index_name) {
            table.indexes.push(IndexState {
                name: index_name.to_string(),
                columns,
                unique,
            });
        }
    }

    pub fn remove_index(&mut self, table_name: &str, index_name: &str) {
        if let Some(table) = self
            .tables
            .iter_mut()
            .find(|table| table.table_name == table_name)
        {
            table.indexes.retain(|index| index.name != index_name);
        }
    }

    /// Find an index by column set, optionally restricted to unique
    /// indexes.
    #[must_use]
    pub fn find_index(
        &self,
        table_name: &str,
        columns: &[String],
        unique: Option<bool>,
    ) -> Option<&IndexState> {
        self.tables
            .iter()
            .find(|table| table.table_name == table_name)?
            .indexes
            .iter()
            .find(|index| {
                index.columns == columns && unique.is_none_or(|unique| index.unique == unique)
            })
    }

    #[must_use]
    pub fn get_index(&self, table_name: &str, index_name: &str) -> Option<&IndexState> {
        self.tables
            .iter()
            .find(|table| table.table_name == table_name)?
            .indexes
            .iter()
            .find(|index| index.name == index_name)
    }
}

fn resolve_columns(
    model_sig: &crate::sig::ModelSignature,
    field_names: &[String],
) -> Vec<String> {
    field_names
        .iter()
        .map(|field_name| {
            model_sig
                .get_field_sig(field_name)
                .map_or_else(|| field_name.clone(), |field_sig| field_sig.column_name())
        })
        .collect()
}

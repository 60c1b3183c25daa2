//! The shared SQL render engine.
//!
//! [`DialectBackend`] implements the full backend contract on top of a
//! [`SqlDialect`], which supplies the dialect-specific pieces: quoting,
//! column type phrases, and whether multi-clause ALTER TABLE statements
//! are available. Adjacent mergeable operations against one table are
//! collapsed into a single ALTER TABLE where the dialect allows it.

use convert_case::{Case, Casing};
use evodb_core::{
    backend::{EvolutionBackend, FkTarget, TableModel},
    error::EvolutionError,
    mutation::{InitialValue, MetaValue},
    mutator::{AttrChange, ScheduledOp},
    sig::{AttrValue, FieldSignature, IndexSignature, StorageKind},
    state::{DatabaseState, default_constraint_name, default_index_name, truncate_name},
};
use tracing::debug;

///
/// SqlDialect
///
/// The dialect-specific hooks consumed by the shared render engine.
///

pub trait SqlDialect {
    fn name(&self) -> &'static str;

    fn max_name_length(&self) -> usize {
        63
    }

    fn quote_name(&self, name: &str) -> String {
        format!("\"{name}\"")
    }

    /// Whether several ALTER clauses may share one statement.
    fn supports_multi_clause_alter(&self) -> bool {
        true
    }

    fn deferrable_sql(&self) -> &'static str {
        " DEFERRABLE INITIALLY DEFERRED"
    }

    /// The column type phrase for a field.
    fn column_type(&self, field_sig: &FieldSignature) -> String {
        match field_sig.field_type.storage() {
            StorageKind::Serial => "serial".to_string(),
            StorageKind::SmallInt => "smallint".to_string(),
            StorageKind::Int | StorageKind::ForeignKey => "integer".to_string(),
            StorageKind::BigInt => "bigint".to_string(),
            StorageKind::Double => "double precision".to_string(),
            StorageKind::Decimal => {
                let max_digits = field_sig
                    .attr_value("max_digits")
                    .and_then(|v| v.as_int());
                let decimal_places = field_sig
                    .attr_value("decimal_places")
                    .and_then(|v| v.as_int());

                match (max_digits, decimal_places) {
                    (Some(digits), Some(places)) => format!("numeric({digits}, {places})"),
                    _ => "numeric".to_string(),
                }
            }
            StorageKind::Bool => "boolean".to_string(),
            StorageKind::VarChar => {
                let max_length = field_sig
                    .attr_value("max_length")
                    .and_then(|v| v.as_int())
                    .unwrap_or(255);

                format!("varchar({max_length})")
            }
            StorageKind::Text => "text".to_string(),
            StorageKind::Date => "date".to_string(),
            StorageKind::Timestamp => "timestamp with time zone".to_string(),
            StorageKind::JoinTable => String::new(),
        }
    }
}

/// Render an attribute value as a SQL literal.
#[must_use]
pub fn sql_literal(value: &AttrValue) -> String {
    match value {
        AttrValue::Null => "NULL".to_string(),
        AttrValue::Bool(true) => "TRUE".to_string(),
        AttrValue::Bool(false) => "FALSE".to_string(),
        AttrValue::Int(i) => i.to_string(),
        AttrValue::Str(s) => format!("'{}'", s.replace('\'', "''")),
    }
}

///
/// AlterGroup
///
/// Accumulates the pieces of one merged ALTER TABLE statement: statements
/// that must run before it, the ALTER clauses themselves, standalone
/// statements, and statements that must run after.
///

#[derive(Default)]
struct AlterGroup {
    pre_sql: Vec<String>,
    clauses: Vec<String>,
    sql: Vec<String>,
    post_sql: Vec<String>,
}

impl AlterGroup {
    fn is_empty(&self) -> bool {
        self.pre_sql.is_empty()
            && self.clauses.is_empty()
            && self.sql.is_empty()
            && self.post_sql.is_empty()
    }

    fn flush(
        &mut self,
        quoted_table: &str,
        multi_clause: bool,
        out: &mut Vec<String>,
    ) {
        out.append(&mut self.pre_sql);

        if !self.clauses.is_empty() {
            if multi_clause {
                out.push(format!(
                    "ALTER TABLE {quoted_table} {};",
                    self.clauses.join(", ")
                ));
            } else {
                out.extend(
                    self.clauses
                        .iter()
                        .map(|clause| format!("ALTER TABLE {quoted_table} {clause};")),
                );
            }

            self.clauses.clear();
        }

        out.append(&mut self.sql);
        out.append(&mut self.post_sql);
    }
}

///
/// DialectBackend
///
/// The backend adapter for one dialect.
///

pub struct DialectBackend<D: SqlDialect> {
    dialect: D,
}

impl<D: SqlDialect> DialectBackend<D> {
    pub const fn new(dialect: D) -> Self {
        Self { dialect }
    }

    fn quoted(&self, name: &str) -> String {
        self.dialect.quote_name(name)
    }

    fn truncated(&self, name: &str) -> String {
        truncate_name(name, self.dialect.max_name_length())
    }

    /// Render a column-addition clause and any index/constraint side
    /// effects into the current group.
    fn render_add_column(
        &self,
        table: &TableModel,
        field: &FieldSignature,
        initial: Option<&InitialValue>,
        fk_target: Option<&FkTarget>,
        state: &mut DatabaseState,
        group: &mut AlterGroup,
    ) -> Result<(), EvolutionError> {
        let column = field.column_name();
        let quoted_table = self.quoted(&table.table_name);
        let quoted_column = self.quoted(&column);
        let column_type = self.dialect.column_type(field);

        let null_phrase = if field.is_nullable() { "NULL" } else { "NOT NULL" };
        let unique_phrase = if field.is_unique() || field.is_primary_key() {
            " UNIQUE"
        } else {
            ""
        };

        if let Some(fk_target) = fk_target {
            group.clauses.push(format!(
                "ADD COLUMN {quoted_column} {column_type} {null_phrase}{unique_phrase} REFERENCES {} ({}){}",
                self.quoted(&fk_target.table_name),
                self.quoted(&fk_target.pk_column),
                self.dialect.deferrable_sql(),
            ));
        } else {
            match initial {
                Some(InitialValue::Value(value)) => {
                    group.clauses.push(format!(
                        "ADD COLUMN {quoted_column} {column_type} {null_phrase}{unique_phrase} DEFAULT {}",
                        sql_literal(value)
                    ));

                    // The default only exists to backfill existing rows;
                    // new rows must not inherit it.
                    group.post_sql.push(format!(
                        "ALTER TABLE {quoted_table} ALTER COLUMN {quoted_column} DROP DEFAULT;"
                    ));
                }
                Some(InitialValue::Placeholder) => {
                    return Err(EvolutionError::InitialValueRequired {
                        model_name: table.model_name.clone(),
                        field_name: field.field_name.clone(),
                    });
                }
                None => {
                    group.clauses.push(format!(
                        "ADD COLUMN {quoted_column} {column_type} {null_phrase}{unique_phrase}"
                    ));
                }
            }
        }

        if field.is_unique() || field.is_primary_key() {
            state.add_index(
                &table.table_name,
                &self.truncated(&default_constraint_name(&table.table_name, &column)),
                vec![column],
                true,
            );
        } else if field.has_index() {
            group
                .sql
                .extend(self.create_index_sql(table, &[column], state));
        }

        Ok(())
    }

    /// `CREATE INDEX` for a column set, unless an equivalent index is
    /// already tracked.
    fn create_index_sql(
        &self,
        table: &TableModel,
        columns: &[String],
        state: &mut DatabaseState,
    ) -> Vec<String> {
        if state
            .find_index(&table.table_name, columns, None)
            .is_some()
        {
            return Vec::new();
        }

        let column_refs: Vec<&str> = columns.iter().map(String::as_str).collect();
        let index_name =
            self.truncated(&default_index_name(&table.table_name, &column_refs));

        state.add_index(&table.table_name, &index_name, columns.to_vec(), false);

        let quoted_columns: Vec<String> =
            columns.iter().map(|column| self.quoted(column)).collect();

        vec![format!(
            "CREATE INDEX {} ON {} ({});",
            self.quoted(&index_name),
            self.quoted(&table.table_name),
            quoted_columns.join(", ")
        )]
    }

    fn drop_index_by_name(
        &self,
        table: &TableModel,
        index_name: &str,
        state: &mut DatabaseState,
    ) -> Vec<String> {
        state.remove_index(&table.table_name, index_name);

        vec![format!("DROP INDEX {};", self.quoted(index_name))]
    }

    fn render_change_column(
        &self,
        table: &TableModel,
        field: &FieldSignature,
        changes: &[AttrChange],
        initial: Option<&InitialValue>,
        state: &mut DatabaseState,
        group: &mut AlterGroup,
    ) -> Result<(), EvolutionError> {
        let column = field.column_name();
        let quoted_table = self.quoted(&table.table_name);
        let quoted_column = self.quoted(&column);

        // Deterministic output: attributes render in sorted order.
        let mut changes: Vec<&AttrChange> = changes.iter().collect();
        changes.sort_by(|a, b| a.attr_name.cmp(&b.attr_name));

        for change in changes {
            match change.attr_name.as_str() {
                "null" => {
                    let becoming_null = change.new_value.is_truthy();

                    if !becoming_null {
                        match initial {
                            Some(InitialValue::Value(value)) => {
                                group.pre_sql.push(format!(
                                    "UPDATE {quoted_table} SET {quoted_column} = {} WHERE {quoted_column} IS NULL;",
                                    sql_literal(value)
                                ));
                            }
                            Some(InitialValue::Placeholder) => {
                                return Err(EvolutionError::InitialValueRequired {
                                    model_name: table.model_name.clone(),
                                    field_name: field.field_name.clone(),
                                });
                            }
                            None => {}
                        }
                    }

                    let phrase = if becoming_null {
                        "DROP NOT NULL"
                    } else {
                        "SET NOT NULL"
                    };

                    group
                        .clauses
                        .push(format!("ALTER COLUMN {quoted_column} {phrase}"));
                }
                "max_length" => {
                    let mut resized = field.clone();
                    resized.set_attr("max_length", change.new_value.clone());
                    let column_type = self.dialect.column_type(&resized);

                    group.clauses.push(format!(
                        "ALTER COLUMN {quoted_column} TYPE {column_type} USING CAST({quoted_column} as {column_type})"
                    ));
                }
                "db_column" => {
                    let new_column = change
                        .new_value
                        .as_str()
                        .map_or_else(|| field.field_name.clone(), str::to_string);

                    let mut renamed = field.clone();
                    renamed.set_attr("db_column", change.new_value.clone());

                    group
                        .sql
                        .extend(self.rename_column_sql(table, field, &renamed));

                    debug!(column = %new_column, "scheduled column rename");
                }
                "db_table" => {
                    let old_table = change
                        .old_value
                        .as_str()
                        .map_or_else(|| table.table_name.clone(), str::to_string);
                    let new_table = change
                        .new_value
                        .as_str()
                        .map_or_else(|| table.table_name.clone(), str::to_string);

                    group.sql.extend(self.rename_table_sql(&old_table, &new_table));
                }
                "db_index" => {
                    if change.new_value.is_truthy() {
                        group.sql.extend(self.create_index_sql(
                            table,
                            &[column.clone()],
                            state,
                        ));
                    } else if let Some(index) = state
                        .find_index(&table.table_name, &[column.clone()], Some(false))
                        .map(|index| index.name.clone())
                    {
                        group.sql.extend(self.drop_index_by_name(table, &index, state));
                    }
                }
                "unique" => {
                    if change.new_value.is_truthy() {
                        let constraint_name = self.truncated(&default_constraint_name(
                            &table.table_name,
                            &column,
                        ));

                        state.add_index(
                            &table.table_name,
                            &constraint_name,
                            vec![column.clone()],
                            true,
                        );
                        group.clauses.push(format!(
                            "ADD CONSTRAINT {} UNIQUE({quoted_column})",
                            self.quoted(&constraint_name)
                        ));
                    } else if let Some(constraint_name) = state
                        .find_index(&table.table_name, &[column.clone()], Some(true))
                        .map(|index| index.name.clone())
                    {
                        state.remove_index(&table.table_name, &constraint_name);
                        group.clauses.push(format!(
                            "DROP CONSTRAINT {}",
                            self.quoted(&constraint_name)
                        ));
                    }
                }
                attr_name => {
                    return Err(EvolutionError::NotImplemented(format!(
                        "the backend cannot change the '{attr_name}' attribute"
                    )));
                }
            }
        }

        Ok(())
    }

    fn render_change_meta(
        &self,
        table: &TableModel,
        prop_name: &str,
        old_value: &MetaValue,
        new_value: &MetaValue,
        state: &mut DatabaseState,
        group: &mut AlterGroup,
    ) -> Result<(), EvolutionError> {
        match (prop_name, old_value, new_value) {
            ("unique_together", MetaValue::Together(old), MetaValue::Together(new)) => {
                let old_groups = old.groups();
                let new_groups = new.groups();

                for field_names in old_groups
                    .iter()
                    .filter(|g| !new_groups.contains(*g))
                {
                    let columns = self.columns_for(table, field_names);

                    if let Some(index_name) = state
                        .find_index(&table.table_name, &columns, Some(true))
                        .map(|index| index.name.clone())
                    {
                        group.sql.extend(self.drop_index_by_name(table, &index_name, state));
                    }
                }

                for field_names in new_groups {
                    let columns = self.columns_for(table, field_names);

                    if state.find_index(&table.table_name, &columns, Some(true)).is_none() {
                        let column_refs: Vec<&str> =
                            columns.iter().map(String::as_str).collect();
                        let index_name = self
                            .truncated(&default_index_name(&table.table_name, &column_refs));

                        state.add_index(&table.table_name, &index_name, columns.clone(), true);

                        let quoted_columns: Vec<String> =
                            columns.iter().map(|column| self.quoted(column)).collect();

                        group.sql.push(format!(
                            "CREATE UNIQUE INDEX {} ON {} ({});",
                            self.quoted(&index_name),
                            self.quoted(&table.table_name),
                            quoted_columns.join(", ")
                        ));
                    }
                }
            }
            ("index_together", MetaValue::Together(old), MetaValue::Together(new)) => {
                let old_groups = old.groups();
                let new_groups = new.groups();

                for field_names in old_groups
                    .iter()
                    .filter(|g| !new_groups.contains(*g))
                {
                    let columns = self.columns_for(table, field_names);

                    if let Some(index_name) = state
                        .find_index(&table.table_name, &columns, None)
                        .map(|index| index.name.clone())
                    {
                        group.sql.extend(self.drop_index_by_name(table, &index_name, state));
                    }
                }

                for field_names in new_groups {
                    let columns = self.columns_for(table, field_names);
                    group.sql.extend(self.create_index_sql(table, &columns, state));
                }
            }
            ("indexes", MetaValue::Indexes(old), MetaValue::Indexes(new)) => {
                for index_sig in old.iter().filter(|sig| !new.contains(*sig)) {
                    let index_name = self.resolve_index_name(table, index_sig, state);

                    if let Some(index_name) = index_name {
                        group.sql.extend(self.drop_index_by_name(table, &index_name, state));
                    }
                }

                for index_sig in new.iter().filter(|sig| !old.contains(*sig)) {
                    let columns = self.index_sig_columns(table, index_sig);

                    match &index_sig.name {
                        Some(name) if !name.is_empty() => {
                            state.add_index(&table.table_name, name, columns.clone(), false);

                            let quoted_columns: Vec<String> =
                                columns.iter().map(|column| self.quoted(column)).collect();

                            group.sql.push(format!(
                                "CREATE INDEX {} ON {} ({});",
                                self.quoted(name),
                                self.quoted(&table.table_name),
                                quoted_columns.join(", ")
                            ));
                        }
                        _ => {
                            group.sql.extend(self.create_index_sql(table, &columns, state));
                        }
                    }
                }
            }
            _ => {
                return Err(EvolutionError::NotImplemented(format!(
                    "the backend cannot change the '{prop_name}' meta property"
                )));
            }
        }

        Ok(())
    }

    fn columns_for(&self, table: &TableModel, field_names: &[String]) -> Vec<String> {
        field_names
            .iter()
            .map(|field_name| table.column_for(field_name))
            .collect()
    }

    fn index_sig_columns(&self, table: &TableModel, index_sig: &IndexSignature) -> Vec<String> {
        index_sig
            .fields
            .iter()
            .map(|field_name| table.column_for(field_name.trim_start_matches('-')))
            .collect()
    }

    /// Resolve an index entry to the concrete name tracked in state:
    /// the explicit name when given, otherwise a column-set lookup.
    fn resolve_index_name(
        &self,
        table: &TableModel,
        index_sig: &IndexSignature,
        state: &DatabaseState,
    ) -> Option<String> {
        match &index_sig.name {
            Some(name) if !name.is_empty() => state
                .get_index(&table.table_name, name)
                .map(|index| index.name.clone()),
            _ => {
                let columns = self.index_sig_columns(table, index_sig);

                state
                    .find_index(&table.table_name, &columns, None)
                    .map(|index| index.name.clone())
            }
        }
    }
}

impl<D: SqlDialect> EvolutionBackend for DialectBackend<D> {
    fn name(&self) -> &'static str {
        self.dialect.name()
    }

    fn supported_change_attrs(&self) -> &[&'static str] {
        &["db_column", "db_index", "db_table", "max_length", "null", "unique"]
    }

    fn supported_change_meta(&self) -> &[&'static str] {
        &["index_together", "indexes", "unique_together"]
    }

    fn max_name_length(&self) -> usize {
        self.dialect.max_name_length()
    }

    fn quote_name(&self, name: &str) -> String {
        self.dialect.quote_name(name)
    }

    fn column_type(&self, field_sig: &FieldSignature) -> String {
        self.dialect.column_type(field_sig)
    }

    fn sql_for_table_ops(
        &self,
        table: &TableModel,
        ops: &[ScheduledOp],
        state: &mut DatabaseState,
    ) -> Result<Vec<String>, EvolutionError> {
        let quoted_table = self.quoted(&table.table_name);
        let multi_clause = self.dialect.supports_multi_clause_alter();

        let mut sql = Vec::new();
        let mut group = AlterGroup::default();

        for op in ops {
            if !op.is_mergeable() && !group.is_empty() {
                group.flush(&quoted_table, multi_clause, &mut sql);
            }

            match op {
                ScheduledOp::AddColumn {
                    field,
                    initial,
                    fk_target,
                } => self.render_add_column(
                    table,
                    field,
                    initial.as_ref(),
                    fk_target.as_ref(),
                    state,
                    &mut group,
                )?,
                ScheduledOp::ChangeColumn {
                    field,
                    changes,
                    initial,
                } => self.render_change_column(
                    table,
                    field,
                    changes,
                    initial.as_ref(),
                    state,
                    &mut group,
                )?,
                ScheduledOp::DeleteColumn { field } => {
                    group.clauses.push(format!(
                        "DROP COLUMN {} CASCADE",
                        self.quoted(&field.column_name())
                    ));
                }
                ScheduledOp::ChangeMeta {
                    prop_name,
                    old_value,
                    new_value,
                } => self.render_change_meta(
                    table,
                    prop_name,
                    old_value,
                    new_value,
                    state,
                    &mut group,
                )?,
                ScheduledOp::Sql { statements } => {
                    sql.extend(statements.iter().cloned());
                }
            }
        }

        group.flush(&quoted_table, multi_clause, &mut sql);

        Ok(sql)
    }

    fn rename_table_sql(&self, old_table: &str, new_table: &str) -> Vec<String> {
        if old_table == new_table {
            return Vec::new();
        }

        vec![format!(
            "ALTER TABLE {} RENAME TO {};",
            self.quoted(old_table),
            self.quoted(new_table)
        )]
    }

    fn rename_column_sql(
        &self,
        table: &TableModel,
        old_field: &FieldSignature,
        new_field: &FieldSignature,
    ) -> Vec<String> {
        let old_column = old_field.column_name();
        let new_column = new_field.column_name();

        if old_column == new_column {
            return Vec::new();
        }

        vec![format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {};",
            self.quoted(&table.table_name),
            self.quoted(&old_column),
            self.quoted(&new_column)
        )]
    }

    fn delete_table_sql(&self, table_name: &str) -> Vec<String> {
        vec![format!("DROP TABLE {};", self.quoted(table_name))]
    }

    fn add_m2m_table_sql(
        &self,
        table: &TableModel,
        _field_sig: &FieldSignature,
        m2m_table: &str,
        target: &FkTarget,
    ) -> Vec<String> {
        let from_column = format!("{}_id", table.model_name.to_case(Case::Flat));
        let to_column = format!("{}_id", target.model_name.to_case(Case::Flat));

        let quoted_m2m = self.quoted(m2m_table);
        let quoted_from = self.quoted(&from_column);
        let quoted_to = self.quoted(&to_column);

        let fk_constraint = |column: &str, target_table: &str| {
            self.truncated(&format!("{m2m_table}_{column}_fkey_{target_table}"))
        };

        let unique_constraint =
            self.truncated(&format!("{m2m_table}_{from_column}_{to_column}_uniq"));

        vec![
            format!(
                "CREATE TABLE {quoted_m2m} ({} serial NOT NULL PRIMARY KEY, {quoted_from} integer NOT NULL, {quoted_to} integer NOT NULL);",
                self.quoted("id")
            ),
            format!(
                "ALTER TABLE {quoted_m2m} ADD CONSTRAINT {} FOREIGN KEY ({quoted_from}) REFERENCES {} ({}){};",
                self.quoted(&fk_constraint(&from_column, &table.table_name)),
                self.quoted(&table.table_name),
                self.quoted(&table.pk_column),
                self.dialect.deferrable_sql(),
            ),
            format!(
                "ALTER TABLE {quoted_m2m} ADD CONSTRAINT {} FOREIGN KEY ({quoted_to}) REFERENCES {} ({}){};",
                self.quoted(&fk_constraint(&to_column, &target.table_name)),
                self.quoted(&target.table_name),
                self.quoted(&target.pk_column),
                self.dialect.deferrable_sql(),
            ),
            format!(
                "ALTER TABLE {quoted_m2m} ADD CONSTRAINT {} UNIQUE ({quoted_from}, {quoted_to});",
                self.quoted(&unique_constraint)
            ),
            format!(
                "CREATE INDEX {} ON {quoted_m2m} ({quoted_from});",
                self.quoted(
                    &self.truncated(&default_index_name(m2m_table, &[from_column.as_str()]))
                )
            ),
            format!(
                "CREATE INDEX {} ON {quoted_m2m} ({quoted_to});",
                self.quoted(
                    &self.truncated(&default_index_name(m2m_table, &[to_column.as_str()]))
                )
            ),
        ]
    }
}

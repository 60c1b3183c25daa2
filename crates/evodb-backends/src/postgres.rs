//! The PostgreSQL dialect.

use crate::common::{DialectBackend, SqlDialect};

///
/// PostgresDialect
///
/// The shared render engine's defaults already speak PostgreSQL's flavour
/// of DDL; the dialect pins the identifier limit and the name.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn max_name_length(&self) -> usize {
        63
    }
}

/// Backend adapter for PostgreSQL.
#[must_use]
pub fn postgres_backend() -> DialectBackend<PostgresDialect> {
    DialectBackend::new(PostgresDialect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use evodb_core::{
        backend::{EvolutionBackend, TableModel},
        mutation::InitialValue,
        mutator::ScheduledOp,
        sig::{AttrValue, FieldSignature, FieldType, ModelSignature},
        state::DatabaseState,
    };

    fn book_table() -> TableModel {
        let model_sig = ModelSignature::new("Book", "tests_testmodel")
            .with_pk_column("id")
            .with_field(
                FieldSignature::new("id", FieldType::AutoField).with_attr("primary_key", true),
            )
            .with_field(FieldSignature::new("int_field", FieldType::IntegerField));

        TableModel::from_model_sig("tests", &model_sig)
    }

    #[test]
    fn add_non_null_column_backfills_then_drops_the_default() {
        let backend = postgres_backend();
        let table = book_table();
        let mut state = DatabaseState::new();

        let ops = vec![ScheduledOp::AddColumn {
            field: FieldSignature::new("added_field", FieldType::IntegerField),
            initial: Some(InitialValue::Value(AttrValue::Int(1))),
            fk_target: None,
        }];

        let sql = backend.sql_for_table_ops(&table, &ops, &mut state).unwrap();

        assert_eq!(
            sql,
            vec![
                "ALTER TABLE \"tests_testmodel\" ADD COLUMN \"added_field\" integer NOT NULL DEFAULT 1;",
                "ALTER TABLE \"tests_testmodel\" ALTER COLUMN \"added_field\" DROP DEFAULT;",
            ]
        );
    }

    #[test]
    fn add_nullable_column_emits_a_single_statement() {
        let backend = postgres_backend();
        let table = book_table();
        let mut state = DatabaseState::new();

        let ops = vec![ScheduledOp::AddColumn {
            field: FieldSignature::new("added_field", FieldType::IntegerField)
                .with_attr("null", true),
            initial: None,
            fk_target: None,
        }];

        let sql = backend.sql_for_table_ops(&table, &ops, &mut state).unwrap();

        assert_eq!(
            sql,
            vec!["ALTER TABLE \"tests_testmodel\" ADD COLUMN \"added_field\" integer NULL;"]
        );
    }

    #[test]
    fn add_placeholder_initial_refuses_sql_generation() {
        let backend = postgres_backend();
        let table = book_table();
        let mut state = DatabaseState::new();

        let ops = vec![ScheduledOp::AddColumn {
            field: FieldSignature::new("added_field", FieldType::IntegerField),
            initial: Some(InitialValue::Placeholder),
            fk_target: None,
        }];

        let err = backend
            .sql_for_table_ops(&table, &ops, &mut state)
            .unwrap_err();

        assert!(matches!(
            err,
            evodb_core::error::EvolutionError::InitialValueRequired { .. }
        ));
    }

    #[test]
    fn adjacent_column_ops_merge_into_one_alter_table() {
        let backend = postgres_backend();
        let table = book_table();
        let mut state = DatabaseState::new();

        let ops = vec![
            ScheduledOp::AddColumn {
                field: FieldSignature::new("a", FieldType::IntegerField).with_attr("null", true),
                initial: None,
                fk_target: None,
            },
            ScheduledOp::DeleteColumn {
                field: FieldSignature::new("int_field", FieldType::IntegerField),
            },
        ];

        let sql = backend.sql_for_table_ops(&table, &ops, &mut state).unwrap();

        assert_eq!(
            sql,
            vec![
                "ALTER TABLE \"tests_testmodel\" ADD COLUMN \"a\" integer NULL, \
                 DROP COLUMN \"int_field\" CASCADE;"
            ]
        );
    }

    #[test]
    fn raw_sql_splits_merge_groups() {
        let backend = postgres_backend();
        let table = book_table();
        let mut state = DatabaseState::new();

        let ops = vec![
            ScheduledOp::AddColumn {
                field: FieldSignature::new("a", FieldType::IntegerField).with_attr("null", true),
                initial: None,
                fk_target: None,
            },
            ScheduledOp::Sql {
                statements: vec!["UPDATE \"tests_testmodel\" SET \"a\" = 1;".to_string()],
            },
            ScheduledOp::DeleteColumn {
                field: FieldSignature::new("int_field", FieldType::IntegerField),
            },
        ];

        let sql = backend.sql_for_table_ops(&table, &ops, &mut state).unwrap();

        assert_eq!(
            sql,
            vec![
                "ALTER TABLE \"tests_testmodel\" ADD COLUMN \"a\" integer NULL;",
                "UPDATE \"tests_testmodel\" SET \"a\" = 1;",
                "ALTER TABLE \"tests_testmodel\" DROP COLUMN \"int_field\" CASCADE;",
            ]
        );
    }

    #[test]
    fn rename_and_delete_table_sql_forms() {
        let backend = postgres_backend();

        assert_eq!(
            backend.rename_table_sql("a", "b"),
            vec!["ALTER TABLE \"a\" RENAME TO \"b\";"]
        );
        assert!(backend.rename_table_sql("a", "a").is_empty());
        assert_eq!(
            backend.delete_table_sql("t"),
            vec!["DROP TABLE \"t\";"]
        );
    }

    #[test]
    fn varchar_columns_carry_their_max_length() {
        let backend = postgres_backend();
        let field_sig =
            FieldSignature::new("title", FieldType::CharField).with_attr("max_length", 100);

        assert_eq!(backend.column_type(&field_sig), "varchar(100)");
    }
}

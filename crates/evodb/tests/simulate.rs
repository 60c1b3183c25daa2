//! Simulation scenarios: hint round-trips, precondition failures, and the
//! diff/apply inverse law.

mod support;

use evodb::prelude::*;
use evodb_backends::postgres::postgres_backend;
use support::base_project_sig;

fn simulate_all(
    mutations: &[Mutation],
    project_sig: &mut ProjectSignature,
    database: Option<&str>,
) -> Result<(), SimulationError> {
    let backend = postgres_backend();
    let state = DatabaseState::new();
    let router = DefaultRouter;

    let ctx = SimulationContext {
        app_label: "tests",
        database,
        database_state: &state,
        backend: &backend,
        router: &router,
    };

    for mutation in mutations {
        mutation.simulate(&ctx, project_sig)?;
    }

    Ok(())
}

#[test]
fn add_then_rename_simulates_to_the_renamed_field() {
    let mutations = vec![
        Mutation::AddField(
            AddField::new("TestModel", "nickname", FieldType::CharField).with_attr("null", true),
        ),
        Mutation::RenameField(RenameField::new("TestModel", "nickname", "alias")),
    ];

    // The hint form is exactly two canonical lines.
    let hints: Vec<String> = mutations.iter().map(Mutation::generate_hint).collect();
    assert_eq!(
        hints,
        vec![
            "AddField('TestModel', 'nickname', 'CharField', null=True)",
            "RenameField('TestModel', 'nickname', 'alias')",
        ]
    );

    let mut project_sig = base_project_sig();
    simulate_all(&mutations, &mut project_sig, None).unwrap();

    let model_sig = project_sig
        .get_app_sig("tests")
        .unwrap()
        .get_model_sig("TestModel")
        .unwrap();

    let alias = model_sig.get_field_sig("alias").unwrap();
    assert_eq!(alias.field_type, FieldType::CharField);
    assert!(alias.is_nullable());
    assert!(model_sig.get_field_sig("nickname").is_none());
}

#[test]
fn deleting_the_primary_key_fails_regardless_of_database() {
    for database in [None, Some("default")] {
        let mutations = vec![Mutation::DeleteField(DeleteField::new("TestModel", "id"))];

        let mut project_sig = base_project_sig();
        let err = simulate_all(&mutations, &mut project_sig, database).unwrap_err();

        assert!(matches!(
            err,
            SimulationError::Failure(SimulationFailure::PrimaryKeyDeletion { .. })
        ));
    }
}

#[test]
fn add_non_nullable_field_requires_an_initial_value() {
    let mutations = vec![Mutation::AddField(AddField::new(
        "TestModel",
        "score",
        FieldType::IntegerField,
    ))];

    let mut project_sig = base_project_sig();
    let err = simulate_all(&mutations, &mut project_sig, None).unwrap_err();

    assert!(matches!(
        err,
        SimulationError::Failure(SimulationFailure::InitialValueRequired { .. })
    ));

    // Supplying an initial value fixes simulation.
    let mutations = vec![Mutation::AddField(
        AddField::new("TestModel", "score", FieldType::IntegerField)
            .with_initial(AttrValue::Int(0)),
    )];

    let mut project_sig = base_project_sig();
    simulate_all(&mutations, &mut project_sig, None).unwrap();
}

#[test]
fn sql_mutation_without_callback_cannot_simulate() {
    let mutations = vec![Mutation::Sql(SqlMutation::new(
        "raw",
        vec!["UPDATE x SET y = 1;".to_string()],
    ))];

    let mut project_sig = base_project_sig();
    let err = simulate_all(&mutations, &mut project_sig, None).unwrap_err();

    assert!(err.is_cannot_simulate());
}

#[test]
fn sql_mutation_with_callback_simulates_through_it() {
    let mutation = Mutation::Sql(
        SqlMutation::new("drop_model", vec!["DROP TABLE \"tests_testmodel\";".to_string()])
            .with_simulate_fn(|app_label, project_sig| {
                let app_sig = project_sig
                    .get_app_sig_mut(app_label)
                    .expect("application should exist");
                app_sig.remove_model_sig("TestModel").unwrap();

                Ok(())
            }),
    );

    let mut project_sig = base_project_sig();
    simulate_all(std::slice::from_ref(&mutation), &mut project_sig, None).unwrap();

    assert!(
        project_sig
            .get_app_sig("tests")
            .unwrap()
            .get_model_sig("TestModel")
            .is_none()
    );
}

#[test]
fn delete_field_strips_unique_together_entries() {
    let mut project_sig = base_project_sig();
    {
        let model_sig = project_sig
            .get_app_sig_mut("tests")
            .unwrap()
            .get_model_sig_mut("TestModel")
            .unwrap();
        model_sig.add_field_sig(
            FieldSignature::new("group", FieldType::IntegerField).with_attr("null", true),
        );
        model_sig.set_unique_together(vec![vec!["age".to_string(), "group".to_string()]]);
    }

    let mutations = vec![Mutation::DeleteField(DeleteField::new("TestModel", "group"))];
    simulate_all(&mutations, &mut project_sig, None).unwrap();

    let model_sig = project_sig
        .get_app_sig("tests")
        .unwrap()
        .get_model_sig("TestModel")
        .unwrap();

    assert_eq!(
        model_sig.unique_together().groups(),
        &[vec!["age".to_string()]]
    );
}

#[test]
fn rename_model_retargets_relations_across_the_project() {
    let mut project_sig = base_project_sig().with_app(
        AppSignature::new("library").with_model(
            ModelSignature::new("Loan", "library_loan")
                .with_pk_column("id")
                .with_field(
                    FieldSignature::new("id", FieldType::AutoField).with_attr("primary_key", true),
                )
                .with_field(
                    FieldSignature::new("borrower", FieldType::ForeignKey)
                        .with_related_model("tests.TestModel"),
                ),
        ),
    );

    let mutations = vec![Mutation::RenameModel(RenameModel::new(
        "TestModel",
        "Member",
        "tests_member",
    ))];
    simulate_all(&mutations, &mut project_sig, None).unwrap();

    let app_sig = project_sig.get_app_sig("tests").unwrap();
    assert!(app_sig.get_model_sig("TestModel").is_none());
    assert_eq!(
        app_sig.get_model_sig("Member").unwrap().table_name,
        "tests_member"
    );

    let borrower = project_sig
        .get_app_sig("library")
        .unwrap()
        .get_model_sig("Loan")
        .unwrap()
        .get_field_sig("borrower")
        .unwrap();
    assert_eq!(borrower.related_model.as_deref(), Some("tests.Member"));
}

#[test]
fn diff_hints_apply_back_to_the_target_signature() {
    // S: the base signature. S': a field added, a field made nullable,
    // and a whole model deleted.
    let old_project_sig = base_project_sig().with_app(
        AppSignature::new("legacy").with_model(
            ModelSignature::new("Stale", "legacy_stale")
                .with_pk_column("id")
                .with_field(
                    FieldSignature::new("id", FieldType::AutoField).with_attr("primary_key", true),
                ),
        ),
    );

    let mut new_project_sig = old_project_sig.clone();
    {
        let model_sig = new_project_sig
            .get_app_sig_mut("tests")
            .unwrap()
            .get_model_sig_mut("TestModel")
            .unwrap();
        model_sig.add_field_sig(FieldSignature::new("score", FieldType::IntegerField));
        model_sig
            .get_field_sig_mut("age")
            .unwrap()
            .set_attr("null", AttrValue::Bool(true));
    }
    new_project_sig.remove_app_sig("legacy").unwrap();
    new_project_sig.add_app_sig(AppSignature::new("legacy"));

    let diff = Diff::new(&old_project_sig, &new_project_sig);

    let mut simulated = old_project_sig.clone();

    for (app_label, mutations) in diff.hinted_mutations() {
        let backend = postgres_backend();
        let state = DatabaseState::new();
        let router = DefaultRouter;

        let ctx = SimulationContext {
            app_label: &app_label,
            database: None,
            database_state: &state,
            backend: &backend,
            router: &router,
        };

        for mutation in &mutations {
            mutation.simulate(&ctx, &mut simulated).unwrap();
        }
    }

    assert_eq!(simulated, new_project_sig);
    assert!(Diff::new(&simulated, &new_project_sig).is_empty());
}

//! End-to-end evolver tests against an in-memory database fake.

mod support;

use evodb::prelude::*;
use evodb_backends::postgres::postgres_backend;
use support::{FakeDb, FakeEvolutionSource, FakeProvider, base_project_sig};

fn explicit_add_then_rename() -> Vec<ExplicitEvolution> {
    vec![ExplicitEvolution::new(
        "add_nickname",
        vec![
            Mutation::AddField(
                AddField::new("TestModel", "nickname", FieldType::CharField)
                    .with_attr("null", true),
            ),
            Mutation::RenameField(RenameField::new("TestModel", "nickname", "alias")),
        ],
    )]
}

#[test]
fn evolve_applies_sql_and_records_a_version() {
    let db = FakeDb::new();
    db.install_baseline(&base_project_sig());

    let provider = FakeProvider {
        project_sig: base_project_sig(),
    };
    let source = FakeEvolutionSource::default();
    let backend = postgres_backend();
    let mut store = db.version_store();

    let mut evolver =
        Evolver::new(&provider, &mut store, &source, &backend, "default", false).unwrap();

    evolver
        .queue_evolve_app_with("tests", explicit_add_then_rename())
        .unwrap();

    assert!(evolver.evolution_required().unwrap());
    assert!(evolver.can_simulate().unwrap());

    let mut conn = db.connection();
    evolver.evolve(&mut conn).unwrap();

    let inner = db.0.borrow();
    assert_eq!(
        inner.committed_sql,
        vec![
            "ALTER TABLE \"tests_testmodel\" ADD COLUMN \"nickname\" varchar(255) NULL;",
            "ALTER TABLE \"tests_testmodel\" RENAME COLUMN \"nickname\" TO \"alias\";",
        ]
    );

    // The post-evolution signature is persisted as a new version, with
    // the applied evolution recorded against it.
    assert_eq!(inner.versions.len(), 2);
    let new_version = &inner.versions[1];

    let model_sig = new_version
        .signature
        .get_app_sig("tests")
        .unwrap()
        .get_model_sig("TestModel")
        .unwrap();
    assert!(model_sig.get_field_sig("alias").is_some());
    assert!(model_sig.get_field_sig("nickname").is_none());

    assert_eq!(inner.evolutions.len(), 1);
    assert_eq!(inner.evolutions[0].app_label, "tests");
    assert_eq!(inner.evolutions[0].label, "add_nickname");
    assert_eq!(inner.evolutions[0].version_id, Some(new_version.id));
}

#[test]
fn failing_statement_aborts_the_whole_transaction() {
    let db = FakeDb::new();
    db.install_baseline(&base_project_sig());
    db.fail_on("RENAME COLUMN");

    let provider = FakeProvider {
        project_sig: base_project_sig(),
    };
    let source = FakeEvolutionSource::default();
    let backend = postgres_backend();
    let mut store = db.version_store();

    let mut evolver =
        Evolver::new(&provider, &mut store, &source, &backend, "default", false).unwrap();

    evolver
        .queue_evolve_app_with("tests", explicit_add_then_rename())
        .unwrap();

    let mut conn = db.connection();
    let err = evolver.evolve(&mut conn).unwrap_err();

    match err {
        EvolutionError::Execution(execution) => {
            assert_eq!(execution.app_label.as_deref(), Some("tests"));
            assert!(
                execution
                    .last_sql_statement
                    .as_deref()
                    .unwrap()
                    .contains("RENAME COLUMN")
            );
        }
        other => panic!("expected an execution error, got {other:?}"),
    }

    // Nothing from the earlier statements, and no version or evolution
    // records, survive the rollback.
    let inner = db.0.borrow();
    assert!(inner.committed_sql.is_empty());
    assert_eq!(inner.versions.len(), 1);
    assert!(inner.evolutions.is_empty());
    assert!(!inner.in_transaction);
}

#[test]
fn evolver_is_single_use() {
    let db = FakeDb::new();
    db.install_baseline(&base_project_sig());

    let provider = FakeProvider {
        project_sig: base_project_sig(),
    };
    let source = FakeEvolutionSource::default();
    let backend = postgres_backend();
    let mut store = db.version_store();

    let mut evolver =
        Evolver::new(&provider, &mut store, &source, &backend, "default", false).unwrap();

    let mut conn = db.connection();
    evolver.evolve(&mut conn).unwrap();

    assert!(matches!(
        evolver.evolve(&mut conn),
        Err(EvolutionError::AlreadyEvolved)
    ));
}

#[test]
fn missing_baseline_fails_construction() {
    let db = FakeDb::new();

    let provider = FakeProvider {
        project_sig: base_project_sig(),
    };
    let source = FakeEvolutionSource::default();
    let backend = postgres_backend();
    let mut store = db.version_store();

    assert!(matches!(
        Evolver::new(&provider, &mut store, &source, &backend, "default", false),
        Err(EvolutionError::BaselineMissing)
    ));
}

#[test]
fn duplicate_task_ids_are_rejected() {
    let db = FakeDb::new();
    db.install_baseline(&base_project_sig());

    let provider = FakeProvider {
        project_sig: base_project_sig(),
    };
    let source = FakeEvolutionSource::default();
    let backend = postgres_backend();
    let mut store = db.version_store();

    let mut evolver =
        Evolver::new(&provider, &mut store, &source, &backend, "default", false).unwrap();

    evolver.queue_evolve_app("tests").unwrap();

    assert!(matches!(
        evolver.queue_evolve_app("tests"),
        Err(EvolutionError::Queue(QueueError::TaskAlreadyQueued { .. }))
    ));
}

#[test]
fn queue_closes_once_tasks_are_prepared() {
    let db = FakeDb::new();
    db.install_baseline(&base_project_sig());

    let provider = FakeProvider {
        project_sig: base_project_sig(),
    };
    let source = FakeEvolutionSource::default();
    let backend = postgres_backend();
    let mut store = db.version_store();

    let mut evolver =
        Evolver::new(&provider, &mut store, &source, &backend, "default", false).unwrap();

    evolver.queue_evolve_app("tests").unwrap();

    // Accessing prepared state finalizes the queue.
    let _ = evolver.tasks().unwrap();

    assert!(matches!(
        evolver.queue_purge_app("tests"),
        Err(EvolutionError::Queue(QueueError::TasksFinalized))
    ));
}

#[test]
fn purge_task_drops_every_table_of_a_stale_app() {
    let old_project_sig = base_project_sig();

    // The app is gone from the current schema.
    let db = FakeDb::new();
    db.install_baseline(&old_project_sig);

    let provider = FakeProvider {
        project_sig: ProjectSignature::new(),
    };
    let source = FakeEvolutionSource::default();
    let backend = postgres_backend();
    let mut store = db.version_store();

    let mut evolver =
        Evolver::new(&provider, &mut store, &source, &backend, "default", false).unwrap();

    evolver.queue_purge_old_apps().unwrap();

    let mut conn = db.connection();
    evolver.evolve(&mut conn).unwrap();

    let inner = db.0.borrow();
    assert_eq!(
        inner.committed_sql,
        vec!["DROP TABLE \"tests_testmodel\";"]
    );

    // The purge deletes every model signature; the application entry
    // itself stays behind, now empty.
    let new_version = inner.versions.last().unwrap();
    let app_sig = new_version.signature.get_app_sig("tests").unwrap();
    assert_eq!(app_sig.model_sigs().count(), 0);
}

#[test]
fn install_baseline_records_every_sequence_label() {
    let db = FakeDb::new();

    let provider = FakeProvider {
        project_sig: base_project_sig(),
    };

    let mut source = FakeEvolutionSource::default();
    source.add(
        "tests",
        "initial",
        EvolutionContent::Mutations(Vec::new()),
    );

    let mut store = db.version_store();
    let version =
        evodb::core::evolve::install_baseline(&provider, &source, &mut store, "default").unwrap();

    // The fake store stages writes until the host commits them.
    let inner = db.0.borrow();
    assert_eq!(inner.staged_versions.len(), 1);
    assert_eq!(inner.staged_versions[0].id, version.id);

    assert_eq!(inner.staged_evolutions.len(), 1);
    assert_eq!(inner.staged_evolutions[0].app_label, "tests");
    assert_eq!(inner.staged_evolutions[0].label, "initial");
    assert_eq!(inner.staged_evolutions[0].version_id, Some(version.id));
}

#[test]
fn task_events_fire_around_execution() {
    use std::{cell::RefCell, rc::Rc};

    let db = FakeDb::new();
    db.install_baseline(&base_project_sig());

    let provider = FakeProvider {
        project_sig: base_project_sig(),
    };
    let source = FakeEvolutionSource::default();
    let backend = postgres_backend();
    let mut store = db.version_store();

    let mut evolver =
        Evolver::new(&provider, &mut store, &source, &backend, "default", false).unwrap();

    evolver
        .queue_evolve_app_with("tests", explicit_add_then_rename())
        .unwrap();

    let events: Rc<RefCell<Vec<String>>> = Rc::default();
    let seen = Rc::clone(&events);

    evolver.on_task_event(move |event| {
        let line = match event {
            TaskEvent::Applying { task } => format!("applying:{}", task.id()),
            TaskEvent::Applied { task } => format!("applied:{}", task.id()),
        };

        seen.borrow_mut().push(line);
    });

    let mut conn = db.connection();
    evolver.evolve(&mut conn).unwrap();

    assert_eq!(
        *events.borrow(),
        vec![
            "applying:evolve-app:tests".to_string(),
            "applied:evolve-app:tests".to_string(),
        ]
    );
}

#[test]
fn unapplied_evolutions_skip_models_captured_by_a_fresh_baseline() {
    // The stored and current signatures agree on the model, so recorded
    // evolutions for it were already captured by the baseline and must
    // not run again.
    let db = FakeDb::new();
    db.install_baseline(&base_project_sig());

    let provider = FakeProvider {
        project_sig: base_project_sig(),
    };

    let mut source = FakeEvolutionSource::default();
    source.add(
        "tests",
        "add_nickname",
        EvolutionContent::Mutations(vec![Mutation::AddField(
            AddField::new("TestModel", "nickname", FieldType::CharField).with_attr("null", true),
        )]),
    );

    let backend = postgres_backend();
    let mut store = db.version_store();

    let mut evolver =
        Evolver::new(&provider, &mut store, &source, &backend, "default", false).unwrap();

    evolver.queue_evolve_app("tests").unwrap();

    assert!(!evolver.evolution_required().unwrap());
}

#[test]
fn unapplied_evolutions_run_for_changed_models() {
    // The current schema already carries the new column; the recorded
    // evolution brings the database up to match.
    let mut current_project_sig = base_project_sig();
    current_project_sig
        .get_app_sig_mut("tests")
        .unwrap()
        .get_model_sig_mut("TestModel")
        .unwrap()
        .add_field_sig(
            FieldSignature::new("nickname", FieldType::CharField).with_attr("null", true),
        );

    let db = FakeDb::new();
    db.install_baseline(&base_project_sig());

    let provider = FakeProvider {
        project_sig: current_project_sig,
    };

    let mut source = FakeEvolutionSource::default();
    source.add(
        "tests",
        "add_nickname",
        EvolutionContent::Mutations(vec![Mutation::AddField(
            AddField::new("TestModel", "nickname", FieldType::CharField).with_attr("null", true),
        )]),
    );

    let backend = postgres_backend();
    let mut store = db.version_store();

    let mut evolver =
        Evolver::new(&provider, &mut store, &source, &backend, "default", false).unwrap();

    evolver.queue_evolve_app("tests").unwrap();

    assert!(evolver.evolution_required().unwrap());

    let mut conn = db.connection();
    evolver.evolve(&mut conn).unwrap();

    let inner = db.0.borrow();
    assert_eq!(
        inner.committed_sql,
        vec!["ALTER TABLE \"tests_testmodel\" ADD COLUMN \"nickname\" varchar(255) NULL;"]
    );
    assert_eq!(inner.evolutions.len(), 1);
}

#[test]
fn hinted_evolution_derives_mutations_from_the_diff() {
    let mut current_project_sig = base_project_sig();
    current_project_sig
        .get_app_sig_mut("tests")
        .unwrap()
        .get_model_sig_mut("TestModel")
        .unwrap()
        .add_field_sig(
            FieldSignature::new("nickname", FieldType::CharField).with_attr("null", true),
        );

    let db = FakeDb::new();
    db.install_baseline(&base_project_sig());

    let provider = FakeProvider {
        project_sig: current_project_sig,
    };
    let source = FakeEvolutionSource::default();
    let backend = postgres_backend();
    let mut store = db.version_store();

    let mut evolver =
        Evolver::new(&provider, &mut store, &source, &backend, "default", true).unwrap();

    evolver.queue_evolve_app("tests").unwrap();

    let contents = evolver.evolution_contents().unwrap();
    assert_eq!(contents.len(), 1);
    assert_eq!(contents[0].0, "evolve-app:tests");
    assert_eq!(
        contents[0].1,
        "use evodb::mutations::{AddField};\n\
         \n\
         MUTATIONS = [\n    \
             AddField('TestModel', 'nickname', 'CharField', null=True),\n\
         ]\n"
    );

    let mut conn = db.connection();
    evolver.evolve(&mut conn).unwrap();

    let inner = db.0.borrow();
    assert_eq!(
        inner.committed_sql,
        vec!["ALTER TABLE \"tests_testmodel\" ADD COLUMN \"nickname\" varchar(255) NULL;"]
    );

    // Hinted runs apply no named evolutions.
    assert!(inner.evolutions.is_empty());
    assert_eq!(inner.versions.len(), 2);
}

#[test]
fn raw_sql_evolutions_execute_but_reduce_confidence() {
    let mut current_project_sig = base_project_sig();
    current_project_sig
        .get_app_sig_mut("tests")
        .unwrap()
        .get_model_sig_mut("TestModel")
        .unwrap()
        .add_field_sig(
            FieldSignature::new("nickname", FieldType::CharField).with_attr("null", true),
        );

    let db = FakeDb::new();
    db.install_baseline(&base_project_sig());

    let provider = FakeProvider {
        project_sig: current_project_sig,
    };

    let mut source = FakeEvolutionSource::default();
    source.add(
        "tests",
        "populate_nicknames",
        EvolutionContent::Sql(vec![
            "UPDATE \"tests_testmodel\" SET \"nickname\" = 'unknown';".to_string(),
        ]),
    );

    let backend = postgres_backend();
    let mut store = db.version_store();

    let mut evolver =
        Evolver::new(&provider, &mut store, &source, &backend, "default", false).unwrap();

    evolver.queue_evolve_app("tests").unwrap();

    assert!(evolver.evolution_required().unwrap());
    assert!(!evolver.can_simulate().unwrap());

    let mut conn = db.connection();
    evolver.evolve(&mut conn).unwrap();

    let inner = db.0.borrow();
    assert_eq!(
        inner.committed_sql,
        vec!["UPDATE \"tests_testmodel\" SET \"nickname\" = 'unknown';"]
    );
}

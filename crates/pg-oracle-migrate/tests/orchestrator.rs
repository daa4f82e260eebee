//! End-to-end phase sequencing over in-memory endpoints.

mod common;

use std::sync::Arc;

use common::{dest_columns, int_row, source_table, FakeSource, FakeTarget};
use pg_oracle_migrate::core::schema::IndexRef;
use pg_oracle_migrate::report::UnitOutcome;
use pg_oracle_migrate::{Config, Orchestrator, Phase, SqlValue};

const CONFIG: &str = r#"
source:
  type: postgres
  host: pg.local
  database: mes
  user: mes
target:
  host: ora.local
  service_name: XE
  user: MES
migration:
  batch_size: 2
  order_mode: foreign_keys
  table_order: [lot_moves, lots, plants]
  sequences:
    - { name: SEQ_LOTS, table: LOTS }
  key_conversions:
    - { table: LOTS, sequence: SEQ_LOTS }
  legacy_id_tables: [PLANTS]
"#;

fn source() -> FakeSource {
    let mut source = FakeSource::default()
        .with_table(source_table("lot_moves", &["lots"]), Vec::new())
        .with_table(
            source_table("lots", &["plants"]),
            vec![int_row(1, "L-1"), int_row(2, "L-2"), int_row(3, "L-3")],
        )
        .with_table(
            source_table("plants", &[]),
            vec![int_row(1, "Plant A"), int_row(2, "Plant B")],
        );
    for name in ["PLANTS", "LOTS", "LOT_MOVES"] {
        source.ddl.insert(
            name.to_lowercase(),
            format!(
                "CREATE TABLE \"public\".\"{}\" (\"ID\" NUMBER) TABLESPACE \"USERS\"",
                name
            ),
        );
    }
    source.indexes.push(IndexRef {
        name: "IX_LOTS_NAME".into(),
        table: "LOTS".into(),
    });
    source.ddl.insert(
        "IX_LOTS_NAME".into(),
        "CREATE INDEX \"public\".\"IX_LOTS_NAME\" ON \"public\".\"LOTS\" (\"NAME\") PCTFREE 10 TABLESPACE \"USERS\"".into(),
    );
    source
}

fn target() -> FakeTarget {
    let target = FakeTarget::default()
        .with_table("PLANTS", dest_columns())
        .with_table("LOTS", dest_columns())
        .with_table("LOT_MOVES", dest_columns());
    {
        let mut state = target.state();
        state.max_values.insert("LOTS".into(), SqlValue::I64(3));
        state.primary_keys.insert("PLANTS".into(), vec!["ID".into()]);
    }
    target
}

fn orchestrator(config: &str, source: Arc<FakeSource>, target: Arc<FakeTarget>) -> Orchestrator {
    let config = Config::from_yaml(config).unwrap();
    Orchestrator::with_endpoints(config, source, "public", target, "MES")
}

#[tokio::test]
async fn test_full_run_sequences_phases() {
    let source = Arc::new(source());
    let target = Arc::new(target());
    target.fail_on(
        "CREATE TABLE \"MES\".\"LOTS\"",
        "ORA-00955: name is already used by an existing object",
    );

    let result = orchestrator(CONFIG, source.clone(), target.clone())
        .run(Phase::All)
        .await
        .unwrap();

    // Parents before children regardless of the manual ranks.
    assert_eq!(result.table_order, vec!["plants", "lots", "lot_moves"]);
    assert_eq!(source.read_order(), vec!["plants", "lots", "lot_moves"]);

    let phases: Vec<&str> = result.phases.iter().map(|p| p.phase.as_str()).collect();
    assert_eq!(phases, vec!["schema", "sequences", "keys", "legacy-ids", "indexes"]);

    let schema = &result.phases[0];
    assert_eq!((schema.succeeded, schema.skipped, schema.failed), (2, 1, 0));

    let data = result.data.as_ref().unwrap();
    assert_eq!(data.total_source(), 5);
    assert_eq!(data.total_target(), 5);
    assert_eq!(result.rows_transferred, 5);

    assert_eq!(
        result.phases[2].units[0].outcome,
        UnitOutcome::skipped("already NUMBER")
    );
    assert_eq!(result.phases[3].skipped, 1);

    let executed = target.executed();
    assert!(executed.contains(&"CREATE TABLE \"MES\".\"PLANTS\" (\"ID\" NUMBER)".to_string()));
    assert!(executed
        .iter()
        .any(|s| s.starts_with("CREATE SEQUENCE SEQ_LOTS START WITH 4 ")));
    assert!(executed.contains(
        &"CREATE INDEX \"MES\".\"IX_LOTS_NAME\" ON \"MES\".\"LOTS\" (\"NAME\")".to_string()
    ));

    assert!(result.is_success());
    assert_eq!(result.status, "completed");
    assert!(result.to_json().unwrap().contains("\"rows_transferred\": 5"));
    assert!(result.render_text().contains("[SUCCESS]"));
}

#[tokio::test]
async fn test_single_phase_skips_schema_extraction() {
    let source = Arc::new(source());
    let target = Arc::new(target());

    let result = orchestrator(CONFIG, source.clone(), target.clone())
        .run(Phase::Sequences)
        .await
        .unwrap();

    assert!(result.table_order.is_empty());
    assert!(result.data.is_none());
    assert_eq!(result.phases.len(), 1);
    assert!(source.read_order().is_empty());
}

#[tokio::test]
async fn test_legacy_precondition_is_reported_not_fatal() {
    let source = Arc::new(source());
    let target = Arc::new(FakeTarget::default().with_table(
        "LOTS",
        vec![
            pg_oracle_migrate::Column::new("ID", "VARCHAR2"),
            pg_oracle_migrate::Column::new("NAME", "VARCHAR2"),
        ],
    ));

    let result = orchestrator(CONFIG, source, target.clone())
        .run(Phase::Legacy)
        .await
        .unwrap();

    assert_eq!(result.phases[0].failed, 1);
    assert_eq!(result.status, "completed_with_errors");
    assert!(target.executed().is_empty());
}

#[tokio::test]
async fn test_validate_reports_mismatch() {
    let source = Arc::new(source());
    let target = Arc::new(target());
    let orchestrator = orchestrator(CONFIG, source, target.clone());

    orchestrator.run(Phase::Data).await.unwrap();
    assert!(orchestrator.validate().await.unwrap().is_success());

    target.state().row_counts.insert("LOTS".into(), 1);
    let report = orchestrator.validate().await.unwrap();
    assert_eq!(report.mismatches(), 1);
    assert!(report.render_text().contains("MISMATCH"));
}

#[tokio::test]
async fn test_explicit_order_violations() {
    let config = CONFIG.replace("order_mode: foreign_keys", "order_mode: explicit");
    let plan = orchestrator(&config, Arc::new(source()), Arc::new(target()))
        .resolve_order()
        .await
        .unwrap();

    assert_eq!(plan.order.tables, vec!["lot_moves", "lots", "plants"]);
    assert_eq!(plan.violations.len(), 2);
    assert_eq!(plan.violations[0].table, "lot_moves");
}

#[tokio::test]
async fn test_oracle_source_copies_every_table_by_default() {
    let config = r#"
source:
  type: oracle
  host: ora-old.local
  service_name: OLDDB
  user: MES_OLD
target:
  host: ora.local
  service_name: XE
  user: MES
"#;
    let plan = orchestrator(config, Arc::new(source()), Arc::new(target()))
        .resolve_order()
        .await
        .unwrap();

    assert_eq!(plan.order.tables, vec!["plants", "lots", "lot_moves"]);
    assert!(plan.order.skipped.is_empty());
    assert!(plan.violations.is_empty());
}

#[tokio::test]
async fn test_health_check() {
    let result = orchestrator(CONFIG, Arc::new(source()), Arc::new(target()))
        .health_check()
        .await
        .unwrap();

    assert!(result.healthy);
    assert_eq!(result.source_type, "postgres");
    assert!(result.source_error.is_none());
}

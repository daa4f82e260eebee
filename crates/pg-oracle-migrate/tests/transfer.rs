//! Batch copier behavior against in-memory endpoints.

mod common;

use std::sync::Arc;

use common::{dest_columns, int_row, source_table, FakeSource, FakeTarget};
use pg_oracle_migrate::report::TableStatus;
use pg_oracle_migrate::transfer::{TransferConfig, TransferEngine};

fn rows(n: i64) -> Vec<pg_oracle_migrate::Row> {
    (1..=n).map(|i| int_row(i, &format!("row {}", i))).collect()
}

fn engine(source: Arc<FakeSource>, target: Arc<FakeTarget>, row_fallback: bool) -> TransferEngine {
    TransferEngine::new(
        source,
        target,
        TransferConfig {
            batch_size: 500,
            row_fallback,
        },
    )
}

#[tokio::test]
async fn test_failed_middle_batch_is_counted_and_rolled_back() {
    let table = source_table("lots", &[]);
    let source = Arc::new(FakeSource::default().with_table(table.clone(), rows(1200)));
    let target = Arc::new(FakeTarget::default().with_table("LOTS", dest_columns()));
    target.state().fail_insert_calls.insert(2);

    let engine = engine(source, target.clone(), false);
    let stats = engine.copy_table(&table).await.unwrap();

    assert_eq!(
        (stats.source_count, stats.target_count, stats.error_count),
        (1200, 700, 500)
    );
    assert_eq!(stats.status(), TableStatus::Warn);
    assert_eq!(engine.rows_transferred(), 700);

    let state = target.state();
    assert_eq!(state.insert_calls, 3);
    assert_eq!(state.commits, 2);
    assert_eq!(state.rollbacks, 1);
    assert_eq!(state.committed["LOTS"].len(), 700);
}

#[tokio::test]
async fn test_empty_table_is_skipped() {
    let table = source_table("plants", &[]);
    let source = Arc::new(FakeSource::default().with_table(table.clone(), Vec::new()));
    let target = Arc::new(FakeTarget::default().with_table("PLANTS", dest_columns()));

    let stats = engine(source, target.clone(), false)
        .copy_table(&table)
        .await
        .unwrap();

    assert_eq!((stats.source_count, stats.target_count, stats.error_count), (0, 0, 0));
    assert_eq!(stats.status(), TableStatus::Skip);
    assert_eq!(target.state().insert_calls, 0);
}

#[tokio::test]
async fn test_missing_destination_counts_every_row_as_error() {
    let table = source_table("parts", &[]);
    let source = Arc::new(FakeSource::default().with_table(table.clone(), rows(42)));
    let target = Arc::new(FakeTarget::default());

    let stats = engine(source, target, false).copy_table(&table).await.unwrap();

    assert_eq!((stats.source_count, stats.target_count, stats.error_count), (42, 0, 42));
    assert_eq!(stats.status(), TableStatus::Warn);
}

#[tokio::test]
async fn test_row_fallback_isolates_bad_row() {
    let table = source_table("lots", &[]);
    let source = Arc::new(FakeSource::default().with_table(table.clone(), rows(1200)));
    let target = Arc::new(FakeTarget::default().with_table("LOTS", dest_columns()));
    target.state().poison_id = Some(777);

    let stats = engine(source, target.clone(), true)
        .copy_table(&table)
        .await
        .unwrap();

    assert_eq!(
        (stats.source_count, stats.target_count, stats.error_count),
        (1200, 1199, 1)
    );
    assert_eq!(target.committed_rows("LOTS"), 1199);
}

#[tokio::test]
async fn test_copy_tables_keeps_given_order() {
    let plants = source_table("plants", &[]);
    let lots = source_table("lots", &["plants"]);
    let source = Arc::new(
        FakeSource::default()
            .with_table(lots.clone(), rows(3))
            .with_table(plants.clone(), rows(2)),
    );
    let target = Arc::new(
        FakeTarget::default()
            .with_table("PLANTS", dest_columns())
            .with_table("LOTS", dest_columns()),
    );

    let report = engine(source.clone(), target.clone(), false)
        .copy_tables(&[plants, lots])
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.total_target(), 5);
    assert_eq!(source.read_order(), vec!["plants", "lots"]);
    assert_eq!(target.state().insert_order, vec!["PLANTS", "LOTS"]);

    let text = report.render_text();
    assert!(text.contains("[SUCCESS]"));
    assert!(text.contains("TOTAL"));
}

#[tokio::test]
async fn test_undecodable_rows_count_as_errors() {
    let mut table = source_table("shifts", &[]);
    table
        .columns
        .push(pg_oracle_migrate::Column::new("duration", "interval"));
    let mut source = FakeSource::default().with_table(table.clone(), rows(1200));
    source.undecodable.extend([3, 640]);
    let source = Arc::new(source);
    let target = Arc::new(FakeTarget::default().with_table("SHIFTS", dest_columns()));

    let stats = engine(source.clone(), target.clone(), false)
        .copy_table(&table)
        .await
        .unwrap();

    assert_eq!(
        (stats.source_count, stats.target_count, stats.error_count),
        (1200, 1198, 2)
    );
    assert_eq!(stats.status(), TableStatus::Warn);
    assert_eq!(target.committed_rows("SHIFTS"), 1198);

    let opts = source.last_read.lock().unwrap().clone().unwrap();
    assert_eq!(opts.column_types, vec!["int8", "varchar", "interval"]);
}

#[tokio::test]
async fn test_zero_batch_size_still_terminates() {
    let table = source_table("lots", &[]);
    let source = Arc::new(FakeSource::default().with_table(table.clone(), rows(3)));
    let target = Arc::new(FakeTarget::default().with_table("LOTS", dest_columns()));

    let engine = TransferEngine::new(
        source,
        target.clone(),
        TransferConfig {
            batch_size: 0,
            row_fallback: false,
        },
    );
    let stats = engine.copy_table(&table).await.unwrap();

    assert_eq!((stats.target_count, stats.error_count), (3, 0));
    assert_eq!(target.state().insert_calls, 3);
}

//! Script runner against a fake session.

mod common;

use common::FakeSession;
use pg_oracle_migrate::script::{self, BlockStatus, RunOptions};

const THREE_BLOCKS: &str = "SET SERVEROUTPUT ON
ALTER TABLE LOTS ADD (NEW_ID NUMBER);
/
BEGIN
  UPDATE MISSING_TABLE SET X = 1;
END;
/
UPDATE LOTS SET NEW_ID = SEQ_LOTS.NEXTVAL;
/
";

#[tokio::test]
async fn test_failure_stops_run_and_rolls_back() {
    let session = FakeSession::failing_on("MISSING_TABLE");
    let blocks = script::parse(THREE_BLOCKS);
    assert_eq!(blocks.len(), 3);

    let report = script::execute(&session, &blocks, RunOptions::default())
        .await
        .unwrap();

    assert_eq!(report.status_of(1), Some(&BlockStatus::Ok));
    assert!(matches!(report.status_of(2), Some(BlockStatus::Failed(_))));
    assert_eq!(report.status_of(3), Some(&BlockStatus::NotAttempted));
    assert!(report.rolled_back);
    assert!(!report.committed);
    assert!(!report.is_success());

    let state = session.state();
    assert_eq!(state.executed.len(), 2);
    assert_eq!(state.rollbacks, 1);
    assert_eq!(state.commits, 0);

    let text = report.render_text();
    assert!(text.contains("[FAILED] Block 2: BEGIN"));
    assert!(text.contains("rolled back"));
}

#[tokio::test]
async fn test_continue_on_error_runs_rest_but_still_rolls_back() {
    let session = FakeSession::failing_on("MISSING_TABLE");
    let blocks = script::parse(THREE_BLOCKS);

    let report = script::execute(
        &session,
        &blocks,
        RunOptions {
            continue_on_error: true,
            dry_run: false,
        },
    )
    .await
    .unwrap();

    assert_eq!(report.status_of(3), Some(&BlockStatus::Ok));
    assert_eq!((report.succeeded, report.failed), (2, 1));
    assert!(report.rolled_back);
    assert_eq!(session.state().commits, 0);
}

#[tokio::test]
async fn test_commit_block_skipped_after_failure() {
    let session = FakeSession::failing_on("BROKEN");
    let blocks = script::parse("UPDATE BROKEN SET X = 1;\n/\nCOMMIT;\n/\n");

    let report = script::execute(
        &session,
        &blocks,
        RunOptions {
            continue_on_error: true,
            dry_run: false,
        },
    )
    .await
    .unwrap();

    assert!(matches!(report.status_of(2), Some(BlockStatus::Skipped(_))));
    assert_eq!(session.state().commits, 0);
    assert_eq!(session.state().rollbacks, 1);
}

#[tokio::test]
async fn test_success_commits_once_and_captures_output() {
    let session = FakeSession::default();
    session
        .state()
        .output
        .push(("DBMS_OUTPUT".into(), vec!["rows: 12".into()]));
    let blocks = script::parse(
        "BEGIN\n  DBMS_OUTPUT.PUT_LINE('rows: ' || 12);\nEND;\n/\nSELECT 1 FROM DUAL;\n/\n",
    );

    let report = script::execute(&session, &blocks, RunOptions::default())
        .await
        .unwrap();

    assert!(report.is_success());
    assert!(report.committed);
    assert_eq!(report.blocks[0].output, vec!["rows: 12"]);
    assert!(report.blocks[1].output.is_empty());

    let state = session.state();
    assert_eq!(state.commits, 1);
    assert_eq!(state.enabled, 2);
    assert_eq!(state.executed[1], "SELECT 1 FROM DUAL");
}

#[tokio::test]
async fn test_dry_run_touches_nothing() {
    let session = FakeSession::default();
    let blocks = script::parse(THREE_BLOCKS);

    let report = script::execute(
        &session,
        &blocks,
        RunOptions {
            continue_on_error: false,
            dry_run: true,
        },
    )
    .await
    .unwrap();

    assert!(report.dry_run);
    assert!(report.blocks.iter().all(|b| b.status == BlockStatus::DryRun));
    let state = session.state();
    assert!(state.executed.is_empty());
    assert_eq!(state.commits + state.rollbacks, 0);
}

// tests/dispatch_ordering.rs

mod common;
use crate::common::builders::{ParagraphBuilder, note, text_result};
use crate::common::{ApiCall, Harness, NOTE_ID, init_tracing};

use std::error::Error;
use std::time::Duration;

use zeppelin_sync::client::{Note, ResultCode};
use zeppelin_sync::types::Concurrency;

type TestResult = Result<(), Box<dyn Error>>;

fn note_with(texts: &[(&str, &str)]) -> Note {
    note(
        NOTE_ID,
        texts
            .iter()
            .map(|(id, text)| ParagraphBuilder::new(id, text).build())
            .collect(),
    )
}

fn events(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test(start_paused = true)]
async fn same_interpreter_runs_one_after_another() -> TestResult {
    init_tracing();
    let remote = note_with(&[("p1", "%python\nprint(1)"), ("p2", "%python.sql\nselect 1")]);
    let h = Harness::synced(remote, Concurrency::ByInterpreter).await;
    h.api.set_run_delay("p1", Duration::from_millis(300));
    h.api.set_run_delay("p2", Duration::from_millis(100));

    h.engine.run_cells(h.cells()).await;

    assert_eq!(
        h.api.run_events(),
        events(&["start:p1", "end:p1", "start:p2", "end:p2"])
    );
    assert_eq!(h.engine.tracker().dispatcher().queue_count(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn different_interpreters_overlap() -> TestResult {
    init_tracing();
    let remote = note_with(&[("p1", "%python\nslow()"), ("p2", "%sh\nquick")]);
    let h = Harness::synced(remote, Concurrency::ByInterpreter).await;
    h.api.set_run_delay("p1", Duration::from_millis(300));
    h.api.set_run_delay("p2", Duration::from_millis(100));

    h.engine.run_cells(h.cells()).await;

    assert_eq!(
        h.api.run_events(),
        events(&["start:p1", "start:p2", "end:p2", "end:p1"])
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cells_without_directive_share_the_default_queue() -> TestResult {
    init_tracing();
    let remote = note_with(&[("p1", "print(1)"), ("p2", "print(2)")]);
    let h = Harness::synced(remote, Concurrency::ByInterpreter).await;
    h.api.set_run_delay("p1", Duration::from_millis(200));

    h.engine.run_cells(h.cells()).await;

    assert_eq!(
        h.api.run_events(),
        events(&["start:p1", "end:p1", "start:p2", "end:p2"])
    );
    assert_eq!(h.engine.tracker().dispatcher().queue_count(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn sequential_never_overlaps_across_interpreters() -> TestResult {
    init_tracing();
    let remote = note_with(&[("p1", "%python\nslow()"), ("p2", "%sh\nquick")]);
    let h = Harness::synced(remote, Concurrency::Sequential).await;
    h.api.set_run_delay("p1", Duration::from_millis(300));

    h.engine.run_cells(h.cells()).await;

    assert_eq!(
        h.api.run_events(),
        events(&["start:p1", "end:p1", "start:p2", "end:p2"])
    );
    Ok(())
}

#[tokio::test]
async fn sequential_stops_at_first_failure() -> TestResult {
    init_tracing();
    let remote = note_with(&[
        ("p1", "%python\nok()"),
        ("p2", "%python\nfail()"),
        ("p3", "%python\nnever()"),
    ]);
    let h = Harness::synced(remote, Concurrency::Sequential).await;
    h.api
        .set_result("p2", text_result(ResultCode::Error, "NameError: fail"));

    h.engine.run_cells(h.cells()).await;

    assert_eq!(
        h.api.run_events(),
        events(&["start:p1", "end:p1", "start:p2", "end:p2"])
    );
    assert_eq!(h.doc.run_count(h.cell_for("p3")), 0);
    Ok(())
}

#[tokio::test]
async fn parallel_submits_every_cell_asynchronously() -> TestResult {
    init_tracing();
    let remote = note_with(&[("p1", "%python\na()"), ("p2", "%python\nb()")]);
    let h = Harness::synced(remote, Concurrency::Parallel).await;

    h.engine.run_cells(h.cells()).await;

    let runs: Vec<ApiCall> = h
        .api
        .calls()
        .into_iter()
        .filter(|c| matches!(c, ApiCall::Run { .. }))
        .collect();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|c| matches!(c, ApiCall::Run { sync: false, .. })));
    assert!(h.api.run_events().is_empty());
    assert_eq!(h.engine.tracker().tracked_count(), 2);
    Ok(())
}

#[tokio::test]
async fn deleted_cells_are_skipped() -> TestResult {
    init_tracing();
    let remote = note_with(&[("p1", "%python\na()"), ("p2", "%python\nb()")]);
    let h = Harness::synced(remote, Concurrency::ByInterpreter).await;
    let gone = h.cell_for("p1");
    h.doc.delete_cell(gone);

    h.engine.tracker().run_cells(vec![gone, h.cell_for("p2")]).await;

    assert_eq!(h.api.run_events(), events(&["start:p2", "end:p2"]));
    Ok(())
}

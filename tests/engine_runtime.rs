// tests/engine_runtime.rs

mod common;
use crate::common::builders::{ConfigFileBuilder, ParagraphBuilder, fast_settings, note};
use crate::common::{ApiCall, Harness, NOTE_ID, RecordingNotifier, init_tracing, with_timeout};

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use zeppelin_sync::classify::ErrorCategory;
use zeppelin_sync::client::{Note, ParagraphStatus, TransportError};
use zeppelin_sync::document::{CellData, NotebookDocument};
use zeppelin_sync::engine::{EngineEvent, Runtime};
use zeppelin_sync::types::Concurrency;

type TestResult = Result<(), Box<dyn Error>>;

fn one_paragraph() -> Note {
    note(
        NOTE_ID,
        vec![ParagraphBuilder::new("p1", "%python\nprint(1)").build()],
    )
}

#[tokio::test(start_paused = true)]
async fn runtime_routes_events_and_flushes_on_shutdown() -> TestResult {
    init_tracing();
    let h = Harness::synced(one_paragraph(), Concurrency::ByInterpreter).await;
    let existing = h.cell_for("p1");

    let (tx, rx) = mpsc::channel::<EngineEvent>(16);
    let runtime = tokio::spawn(Runtime::new(Arc::clone(&h.engine), rx).run());

    // Saved documents are written at once.
    let added = h.doc.push_cell(CellData::code("python", "2+2"));
    tx.send(EngineEvent::CellEdited(added)).await?;
    tx.send(EngineEvent::DocumentSaved).await?;

    // A young edit is only written by the shutdown flush.
    h.doc.edit_text(existing, "%python\nprint(100)");
    tx.send(EngineEvent::CellEdited(existing)).await?;
    tx.send(EngineEvent::Shutdown).await?;

    with_timeout(runtime).await??;

    let writes = h.api.write_calls();
    assert_eq!(
        writes.first(),
        Some(&ApiCall::Create {
            text: "2+2".to_string(),
            index: 1
        })
    );
    assert_eq!(
        writes.last(),
        Some(&ApiCall::UpdateText {
            paragraph: "p1".to_string(),
            text: "%python\nprint(100)".to_string()
        })
    );
    assert!(!h.engine.is_active());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn runtime_runs_cells_in_background() -> TestResult {
    init_tracing();
    let h = Harness::synced(one_paragraph(), Concurrency::ByInterpreter).await;
    let cell = h.cell_for("p1");
    h.api.set_run_delay("p1", Duration::from_millis(200));

    let (tx, rx) = mpsc::channel::<EngineEvent>(16);
    let runtime = tokio::spawn(Runtime::new(Arc::clone(&h.engine), rx).run());

    tx.send(EngineEvent::RunCells(vec![cell])).await?;
    tokio::time::sleep(Duration::from_millis(500)).await;
    tx.send(EngineEvent::Shutdown).await?;
    with_timeout(runtime).await??;

    assert_eq!(h.api.run_events(), vec!["start:p1", "end:p1"]);
    assert_eq!(h.doc.run_record(cell).and_then(|r| r.success), Some(true));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn interrupt_event_completes_before_shutdown() -> TestResult {
    init_tracing();
    let remote = note(
        NOTE_ID,
        vec![
            ParagraphBuilder::new("p1", "%python\nwork()")
                .status(ParagraphStatus::Running)
                .build(),
        ],
    );
    let h = Harness::synced(remote, Concurrency::ByInterpreter).await;
    let cell = h.cell_for("p1");

    let (tx, rx) = mpsc::channel::<EngineEvent>(4);
    let runtime = tokio::spawn(Runtime::new(Arc::clone(&h.engine), rx).run());
    tx.send(EngineEvent::Interrupt).await?;
    tx.send(EngineEvent::Shutdown).await?;
    with_timeout(runtime).await??;

    let calls = h.api.calls();
    assert!(calls.contains(&ApiCall::Stop("p1".to_string())));
    assert!(calls.contains(&ApiCall::CancelInFlight));
    assert_eq!(h.doc.run_record(cell).and_then(|r| r.success), Some(false));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn closed_channel_stops_runtime() -> TestResult {
    init_tracing();
    let h = Harness::new(one_paragraph(), Concurrency::ByInterpreter);

    let (tx, rx) = mpsc::channel::<EngineEvent>(4);
    let runtime = tokio::spawn(Runtime::new(Arc::clone(&h.engine), rx).run());
    tx.send(EngineEvent::SyncNote).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(tx);

    with_timeout(runtime).await??;
    assert_eq!(h.cells().len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn activation_is_idempotent() -> TestResult {
    init_tracing();
    let h = Harness::new(one_paragraph(), Concurrency::ByInterpreter);

    h.engine.activate();
    h.engine.activate();
    assert!(h.engine.is_active());

    h.engine.deactivate().await;
    assert!(!h.engine.is_active());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn wait_idle_returns_once_async_runs_finish() -> TestResult {
    init_tracing();
    let h = Harness::synced(one_paragraph(), Concurrency::Parallel).await;
    let cell = h.cell_for("p1");

    h.engine.activate();
    h.engine.run_cells(vec![cell]).await;
    assert_eq!(h.engine.tracker().tracked_count(), 1);

    let api = h.api.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(350)).await;
        api.finish("p1", ParagraphStatus::Success, None);
    });

    with_timeout(h.engine.wait_idle()).await;
    assert_eq!(h.doc.run_record(cell).and_then(|r| r.success), Some(true));
    h.engine.deactivate().await;
    Ok(())
}

#[tokio::test]
async fn remote_errors_follow_their_disposition() -> TestResult {
    init_tracing();
    let h = Harness::with(
        one_paragraph(),
        fast_settings(Concurrency::ByInterpreter),
        RecordingNotifier::accepting(),
    );
    h.engine.sync_note().await?;
    let cell = h.cell_for("p1");
    let ctx = h.ctx();

    let canceled = ctx.report_remote_error(&TransportError::Canceled, None).await;
    assert_eq!(canceled, ErrorCategory::Canceled);
    assert!(h.notifier.errors().is_empty() && h.notifier.warnings().is_empty());

    ctx.report_remote_error(&TransportError::status(401, "login"), None)
        .await;
    assert_eq!(h.notifier.warnings().len(), 1);

    ctx.report_remote_error(&TransportError::status(500, "boom"), Some(cell))
        .await;
    assert_eq!(h.notifier.errors().len(), 1);

    // 404 without a cell cannot be recreated.
    ctx.report_remote_error(&TransportError::status(404, "gone"), None)
        .await;
    assert_eq!(h.notifier.errors().len(), 2);
    assert!(h.notifier.prompts().is_empty());

    h.api.remove_remote("p1");
    let category = ctx
        .report_remote_error(&TransportError::status(404, "gone"), Some(cell))
        .await;
    assert_eq!(category, ErrorCategory::NotFound);
    assert_eq!(h.notifier.prompts(), vec![cell]);

    let data = h.doc.cell(cell).ok_or("cell vanished")?;
    assert!(!data.metadata.remote_missing);
    let new_id = data.paragraph_id().ok_or("not recreated")?;
    assert_eq!(h.api.paragraph_ids(), vec![new_id.to_string()]);
    Ok(())
}

#[tokio::test]
async fn declined_recreate_keeps_cell_marked_missing() -> TestResult {
    init_tracing();
    let h = Harness::synced(one_paragraph(), Concurrency::ByInterpreter).await;
    let cell = h.cell_for("p1");

    h.ctx().prompt_recreate(cell).await;

    let data = h.doc.cell(cell).ok_or("cell vanished")?;
    assert!(data.metadata.remote_missing);
    assert_eq!(data.paragraph_id(), Some("p1"));
    assert!(h.api.write_calls().is_empty());
    Ok(())
}

#[test]
fn builder_config_feeds_engine_settings() {
    let cfg = ConfigFileBuilder::new()
        .with_throttle_window("250ms")
        .with_concurrency(Concurrency::Sequential)
        .with_credentials("alice", "secret")
        .build();

    assert_eq!(cfg.engine.throttle_window, Duration::from_millis(250));
    assert_eq!(cfg.engine.concurrency, Concurrency::Sequential);
    assert_eq!(
        cfg.server.credentials,
        Some(("alice".to_string(), "secret".to_string()))
    );
}

// src/lib.rs

pub mod classify;
pub mod cli;
pub mod client;
pub mod config;
pub mod document;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod sync;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::client::HttpNotebookClient;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::document::{MemoryNotebook, NotebookDocument, TracingNotifier};
use crate::engine::{EngineEvent, Runtime, SyncContext, SyncEngine};
use crate::exec::OutputFragment;
use crate::types::CellKind;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the HTTP client (and login when credentials are configured)
/// - an in-memory document and the sync engine
/// - the runtime event loop
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let note_id = args
        .note
        .clone()
        .context("--note is required unless --dry-run is given")?;

    let client = HttpNotebookClient::new(
        &cfg.server.url,
        &cfg.server.user_agent,
        cfg.server.request_timeout,
    )?;
    if let Some((user, password)) = &cfg.server.credentials {
        client.login(user, password).await?;
    }

    let document = MemoryNotebook::new(note_id);
    let ctx = Arc::new(SyncContext::new(
        Arc::new(client),
        Arc::new(document.clone()),
        Arc::new(TracingNotifier::default()),
    ));
    let engine = Arc::new(SyncEngine::new(ctx, cfg.engine));

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<EngineEvent>(64);
    let runtime = tokio::spawn(Runtime::new(Arc::clone(&engine), rt_rx).run());

    let work = async {
        let report = engine.sync_note().await?;
        info!(cells = report.cells, resumed = report.resumed, "note loaded");

        if args.run {
            let code_cells: Vec<_> = document
                .cells()
                .into_iter()
                .filter(|cell| {
                    document
                        .cell(*cell)
                        .is_some_and(|c| c.kind == CellKind::Code)
                })
                .collect();
            engine.run_cells(code_cells).await;
        }
        engine.wait_idle().await;
        Ok::<_, anyhow::Error>(())
    };

    // Ctrl-C → interrupt running paragraphs and shut down.
    tokio::select! {
        res = work => res?,
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                eprintln!("failed to listen for Ctrl+C: {e}");
            }
            info!("Ctrl-C received; shutting down");
            engine.interrupt().await;
        }
    }

    let _ = rt_tx.send(EngineEvent::Shutdown).await;
    runtime.await??;

    print_note(&document);
    Ok(())
}

/// Simple dry-run output: print the effective configuration.
fn print_dry_run(cfg: &ConfigFile) {
    println!("zeppelin-sync dry-run");
    println!("  server.url = {}", cfg.server.url);
    println!("  server.user_agent = {}", cfg.server.user_agent);
    println!("  server.request_timeout = {:?}", cfg.server.request_timeout);
    if let Some((user, _)) = &cfg.server.credentials {
        println!("  server.username = {user}");
    }
    println!();
    println!("  sync.pooling_interval = {:?}", cfg.engine.pooling_interval);
    println!("  sync.throttle_window = {:?}", cfg.engine.throttle_window);
    println!("  execution.track_interval = {:?}", cfg.engine.track_interval);
    println!("  execution.concurrency = {:?}", cfg.engine.concurrency);

    debug!("dry-run complete (no server contact)");
}

/// Print every cell with its outputs to stdout.
fn print_note(document: &MemoryNotebook) {
    let note = document.note();
    println!("note {} ({})", note.id, note.name);

    for (index, cell) in document.cells().into_iter().enumerate() {
        let Some(data) = document.cell(cell) else {
            continue;
        };
        let status = data
            .metadata
            .status
            .map(|s| format!("{s:?}"))
            .unwrap_or_else(|| "-".to_string());
        println!();
        println!(
            "[{index}] {} {} {status}",
            data.language,
            data.paragraph_id().unwrap_or("-")
        );
        for line in data.text.lines() {
            println!("  | {line}");
        }
        for output in &data.outputs {
            match output {
                OutputFragment::Stdout(s) | OutputFragment::Text(s) => {
                    for line in s.lines() {
                        println!("  > {line}");
                    }
                }
                OutputFragment::Html(html) => println!("  > <html, {} bytes>", html.len()),
                OutputFragment::Image(bytes) => println!("  > <image, {} bytes>", bytes.len()),
                OutputFragment::Error { name, message } => {
                    println!("  ! {name}: {message}");
                }
            }
        }
    }
}

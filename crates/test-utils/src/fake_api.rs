// src/fake_api.rs

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

use zeppelin_sync::client::{
    ApiFuture, ApiResult, NewParagraph, Note, NotebookApi, Paragraph, ParagraphConfig,
    ParagraphResult, ParagraphStatus, ResultCode, ResultMessage, RunOptions, RunResult,
    TransportError,
};

/// Remote operation, used to inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    GetNote,
    GetParagraph,
    Run,
    Stop,
    Create,
    UpdateText,
    UpdateConfig,
    Delete,
    Move,
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    GetNote,
    GetParagraph(String),
    Run { paragraph: String, sync: bool },
    Stop(String),
    Create { text: String, index: usize },
    UpdateText { paragraph: String, text: String },
    UpdateConfig { paragraph: String, language: String },
    Delete(String),
    Move { paragraph: String, index: usize },
    CancelInFlight,
}

impl ApiCall {
    /// True for calls that change the remote note.
    pub fn is_write(&self) -> bool {
        !matches!(
            self,
            ApiCall::GetNote | ApiCall::GetParagraph(_) | ApiCall::CancelInFlight
        )
    }
}

#[derive(Default)]
struct State {
    note: Note,
    calls: Vec<ApiCall>,
    /// `start:<id>` / `end:<id>` markers of synchronous runs.
    run_events: Vec<String>,
    failures: HashMap<Op, VecDeque<TransportError>>,
    results: HashMap<String, ParagraphResult>,
    run_delays: HashMap<String, Duration>,
    write_delay: Duration,
    stopped: HashSet<String>,
    next_id: u64,
}

impl State {
    fn take_failure(&mut self, op: Op) -> Option<TransportError> {
        self.failures.get_mut(&op).and_then(|q| q.pop_front())
    }

    fn position(&self, id: &str) -> ApiResult<usize> {
        self.note
            .paragraphs
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| not_found(id))
    }
}

fn not_found(id: &str) -> TransportError {
    TransportError::status(404, format!("paragraph {id} not found"))
}

/// In-memory notebook server.
///
/// - serves one note, mutated by the write calls like the real server
/// - records every call in order
/// - synchronous runs sleep for a per-paragraph delay (default zero) and
///   then finish with the scripted result (default `SUCCESS` / `TEXT ok`)
/// - asynchronous runs leave the paragraph `RUNNING` until the test
///   finishes it with [`finish`](Self::finish)
/// - failures can be queued per operation
#[derive(Clone, Default)]
pub struct FakeNotebookApi {
    state: Arc<Mutex<State>>,
    note_gate: Arc<Mutex<Option<Arc<Notify>>>>,
}

impl FakeNotebookApi {
    pub fn new(note: Note) -> Self {
        let fake = Self::default();
        fake.state.lock().unwrap().note = note;
        fake
    }

    pub fn note(&self) -> Note {
        self.state.lock().unwrap().note.clone()
    }

    pub fn paragraph(&self, id: &str) -> Option<Paragraph> {
        let state = self.state.lock().unwrap();
        state.note.paragraphs.iter().find(|p| p.id == id).cloned()
    }

    pub fn paragraph_ids(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.note.paragraphs.iter().map(|p| p.id.clone()).collect()
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn write_calls(&self) -> Vec<ApiCall> {
        self.calls().into_iter().filter(ApiCall::is_write).collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn run_events(&self) -> Vec<String> {
        self.state.lock().unwrap().run_events.clone()
    }

    /// Fail the next call of `op` with `err`.
    pub fn fail_next(&self, op: Op, err: TransportError) {
        let mut state = self.state.lock().unwrap();
        state.failures.entry(op).or_default().push_back(err);
    }

    /// Result returned by the next synchronous runs of `id`.
    pub fn set_result(&self, id: &str, result: ParagraphResult) {
        let mut state = self.state.lock().unwrap();
        state.results.insert(id.to_string(), result);
    }

    pub fn set_run_delay(&self, id: &str, delay: Duration) {
        let mut state = self.state.lock().unwrap();
        state.run_delays.insert(id.to_string(), delay);
    }

    /// Delay every text update by `delay`.
    pub fn set_write_delay(&self, delay: Duration) {
        self.state.lock().unwrap().write_delay = delay;
    }

    /// Update a paragraph as the server would while it runs.
    pub fn set_status(&self, id: &str, status: ParagraphStatus, progress: Option<u8>) {
        let mut state = self.state.lock().unwrap();
        if let Some(p) = state.note.paragraphs.iter_mut().find(|p| p.id == id) {
            p.status = status;
            p.progress = progress;
        }
    }

    /// Finish a paragraph with a terminal status and result.
    pub fn finish(&self, id: &str, status: ParagraphStatus, result: Option<ParagraphResult>) {
        let mut state = self.state.lock().unwrap();
        if let Some(p) = state.note.paragraphs.iter_mut().find(|p| p.id == id) {
            p.status = status;
            p.progress = None;
            p.results = result;
        }
    }

    /// Drop a paragraph behind the client's back.
    pub fn remove_remote(&self, id: &str) {
        let mut state = self.state.lock().unwrap();
        state.note.paragraphs.retain(|p| p.id != id);
    }

    /// Make `get_note` block until the returned gate is notified.
    pub fn gate_note(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.note_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    fn begin(&self, op: Op, call: ApiCall) -> ApiResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        match state.take_failure(op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn run_sync(&self, id: &str) -> ApiResult<RunResult> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.position(id)?;
            state.stopped.remove(id);
            state.run_events.push(format!("start:{id}"));
            if let Some(p) = state.note.paragraphs.iter_mut().find(|p| p.id == id) {
                p.status = ParagraphStatus::Running;
            }
            state.run_delays.get(id).copied().unwrap_or_default()
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.run_events.push(format!("end:{id}"));
        let result = if state.stopped.remove(id) {
            ParagraphResult {
                code: ResultCode::Error,
                msg: vec![ResultMessage::new("TEXT", "aborted")],
            }
        } else {
            state
                .results
                .get(id)
                .cloned()
                .unwrap_or_else(|| ParagraphResult {
                    code: ResultCode::Success,
                    msg: vec![ResultMessage::new("TEXT", "ok")],
                })
        };
        if let Some(p) = state.note.paragraphs.iter_mut().find(|p| p.id == id) {
            p.status = if result.code == ResultCode::Error {
                ParagraphStatus::Error
            } else {
                ParagraphStatus::Success
            };
            p.results = Some(result.clone());
        }
        Ok(Some(result))
    }
}

impl NotebookApi for FakeNotebookApi {
    fn get_note<'a>(&'a self, _note_id: &'a str) -> ApiFuture<'a, Note> {
        Box::pin(async move {
            self.begin(Op::GetNote, ApiCall::GetNote)?;
            let gate = self.note_gate.lock().unwrap().take();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            Ok(self.note())
        })
    }

    fn get_paragraph<'a>(
        &'a self,
        _note_id: &'a str,
        paragraph_id: &'a str,
    ) -> ApiFuture<'a, Paragraph> {
        Box::pin(async move {
            self.begin(
                Op::GetParagraph,
                ApiCall::GetParagraph(paragraph_id.to_string()),
            )?;
            self.paragraph(paragraph_id)
                .ok_or_else(|| not_found(paragraph_id))
        })
    }

    fn run_paragraph<'a>(
        &'a self,
        _note_id: &'a str,
        paragraph_id: &'a str,
        sync: bool,
        _options: Option<RunOptions>,
    ) -> ApiFuture<'a, RunResult> {
        Box::pin(async move {
            self.begin(
                Op::Run,
                ApiCall::Run {
                    paragraph: paragraph_id.to_string(),
                    sync,
                },
            )?;
            if sync {
                return self.run_sync(paragraph_id).await;
            }
            let mut state = self.state.lock().unwrap();
            let index = state.position(paragraph_id)?;
            let p = &mut state.note.paragraphs[index];
            p.status = ParagraphStatus::Running;
            p.progress = Some(0);
            Ok(None)
        })
    }

    fn stop_paragraph<'a>(&'a self, _note_id: &'a str, paragraph_id: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            self.begin(Op::Stop, ApiCall::Stop(paragraph_id.to_string()))?;
            let mut state = self.state.lock().unwrap();
            let index = state.position(paragraph_id)?;
            state.stopped.insert(paragraph_id.to_string());
            state.note.paragraphs[index].status = ParagraphStatus::Abort;
            Ok(())
        })
    }

    fn create_paragraph<'a>(
        &'a self,
        _note_id: &'a str,
        paragraph: NewParagraph,
    ) -> ApiFuture<'a, String> {
        Box::pin(async move {
            self.begin(
                Op::Create,
                ApiCall::Create {
                    text: paragraph.text.clone(),
                    index: paragraph.index,
                },
            )?;
            let mut state = self.state.lock().unwrap();
            state.next_id += 1;
            let id = format!("paragraph_new_{}", state.next_id);
            let index = paragraph.index.min(state.note.paragraphs.len());
            state.note.paragraphs.insert(
                index,
                Paragraph {
                    id: id.clone(),
                    title: paragraph.title,
                    text: paragraph.text,
                    config: paragraph.config.unwrap_or_default(),
                    ..Default::default()
                },
            );
            Ok(id)
        })
    }

    fn update_paragraph_text<'a>(
        &'a self,
        _note_id: &'a str,
        paragraph_id: &'a str,
        text: &'a str,
    ) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            self.begin(
                Op::UpdateText,
                ApiCall::UpdateText {
                    paragraph: paragraph_id.to_string(),
                    text: text.to_string(),
                },
            )?;
            let delay = self.state.lock().unwrap().write_delay;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let mut state = self.state.lock().unwrap();
            let index = state.position(paragraph_id)?;
            state.note.paragraphs[index].text = text.to_string();
            Ok(())
        })
    }

    fn update_paragraph_config<'a>(
        &'a self,
        _note_id: &'a str,
        paragraph_id: &'a str,
        config: &'a ParagraphConfig,
    ) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            self.begin(
                Op::UpdateConfig,
                ApiCall::UpdateConfig {
                    paragraph: paragraph_id.to_string(),
                    language: config.language().to_string(),
                },
            )?;
            let mut state = self.state.lock().unwrap();
            let index = state.position(paragraph_id)?;
            state.note.paragraphs[index].config = config.clone();
            Ok(())
        })
    }

    fn delete_paragraph<'a>(
        &'a self,
        _note_id: &'a str,
        paragraph_id: &'a str,
    ) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            self.begin(Op::Delete, ApiCall::Delete(paragraph_id.to_string()))?;
            let mut state = self.state.lock().unwrap();
            let index = state.position(paragraph_id)?;
            state.note.paragraphs.remove(index);
            Ok(())
        })
    }

    fn move_paragraph<'a>(
        &'a self,
        _note_id: &'a str,
        paragraph_id: &'a str,
        index: usize,
    ) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            self.begin(
                Op::Move,
                ApiCall::Move {
                    paragraph: paragraph_id.to_string(),
                    index,
                },
            )?;
            let mut state = self.state.lock().unwrap();
            let from = state.position(paragraph_id)?;
            let paragraph = state.note.paragraphs.remove(from);
            let to = index.min(state.note.paragraphs.len());
            state.note.paragraphs.insert(to, paragraph);
            Ok(())
        })
    }

    fn cancel_in_flight(&self) {
        self.state.lock().unwrap().calls.push(ApiCall::CancelInFlight);
    }
}

//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - dispatching learner actions into a session and running the effects the
//!     reducer asks for (model calls, sink writes) as spawned tasks
//!   - the stateless task boundary (`question` / `evaluate` in, text out)

use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::domain::TaskKind;
use crate::llm::ModelError;
use crate::protocol::{SessionView, TaskRequest};
use crate::session::{Effect, Event, SessionError};
use crate::state::{AppState, SessionHandle};
use crate::util::trunc_for_log;

/// Apply a learner action and start whatever work it triggers.
/// Returns the view right after the transition; later changes (responses
/// arriving) are published on the handle's watch channel.
#[instrument(level = "info", skip(state, handle, event))]
pub async fn dispatch(
  state: &Arc<AppState>,
  handle: &Arc<SessionHandle>,
  event: Event,
) -> Result<SessionView, SessionError> {
  let (view, effect) = handle.apply(event).await?;
  debug!(target: "session", id = %view.id, phase = view.state.phase(), "Transition applied");
  if let Some(effect) = effect {
    spawn_effect(state.clone(), handle.clone(), effect);
  }
  Ok(view)
}

// Effects run off the caller's path. A resolved effect may itself yield the
// next one (evaluation -> record), which gets its own task.
fn spawn_effect(state: Arc<AppState>, handle: Arc<SessionHandle>, effect: Effect) {
  tokio::spawn(async move {
    let event = run_effect(&state, effect).await;
    match handle.apply(event).await {
      Ok((_, Some(next))) => spawn_effect(state, handle, next),
      Ok((_, None)) => {}
      Err(e) => warn!(target: "session", error = %e, "Resolved event rejected"),
    }
  });
}

async fn run_effect(state: &AppState, effect: Effect) -> Event {
  match effect {
    Effect::RequestQuestion { ticket, params } => {
      let prompt = state.prompts.question(&params);
      debug!(target: "llm", ticket, prompt = %trunc_for_log(&prompt, 120), "Requesting question");
      let outcome = state.model.invoke(&prompt).await.map_err(|e| e.to_string());
      Event::QuestionResolved { ticket, outcome }
    }
    Effect::RequestEvaluation { ticket, question, code } => {
      let prompt = state.prompts.evaluate(&question, &code);
      debug!(target: "llm", ticket, prompt_len = prompt.len(), "Requesting evaluation");
      let outcome = state.model.invoke(&prompt).await.map_err(|e| e.to_string());
      Event::EvaluationResolved { ticket, outcome }
    }
    Effect::Record { ticket, record } => {
      let outcome = state.sink.record(&record).await.map_err(|e| e.to_string());
      match &outcome {
        Ok(()) => info!(target: "sink", ticket, sink = state.sink.name(), verdict = ?record.report.is_correct, "Submission recorded"),
        Err(e) => error!(target: "sink", ticket, sink = state.sink.name(), error = %e, "Submission write failed"),
      }
      Event::RecordResolved { ticket, outcome }
    }
  }
}

/// Stateless boundary: build the prompt for the task and return the raw text.
#[instrument(level = "info", skip(state, req), fields(task = ?req.task))]
pub async fn run_task(state: &AppState, req: &TaskRequest) -> Result<String, ModelError> {
  let prompt_text = req.prompt.as_deref().unwrap_or_default();
  let prompt = match req.task {
    TaskKind::Question => {
      if prompt_text.trim().is_empty() {
        state.prompts.question(&Default::default())
      } else {
        prompt_text.to_string()
      }
    }
    TaskKind::Evaluate => state.prompts.evaluate(prompt_text, req.code.as_deref().unwrap_or_default()),
  };
  state.model.invoke(&prompt).await
}

#[cfg(test)]
mod tests {
  use std::collections::VecDeque;
  use std::time::Duration;

  use async_trait::async_trait;
  use tokio::sync::{oneshot, watch, Mutex};

  use super::*;
  use crate::config::Prompts;
  use crate::domain::{QuestionParams, SubmissionRecord, Verdict};
  use crate::llm::TextModel;
  use crate::prompt::PromptBuilder;
  use crate::session::{FailureReason, Persistence, SessionState};
  use crate::sink::{MemorySink, SinkError, SubmissionSink};

  type Reply = Result<String, ModelError>;

  /// Model whose answers are released by the test, one oneshot per call.
  #[derive(Default)]
  struct ScriptedModel {
    pending: Mutex<VecDeque<oneshot::Receiver<Reply>>>,
    prompts: Mutex<Vec<String>>,
  }

  impl ScriptedModel {
    async fn expect_call(&self) -> oneshot::Sender<Reply> {
      let (tx, rx) = oneshot::channel();
      self.pending.lock().await.push_back(rx);
      tx
    }

    /// Replies are handed out in call order, so tests pin that order down.
    async fn wait_calls(&self, n: usize) {
      tokio::time::timeout(Duration::from_secs(2), async {
        while self.prompts.lock().await.len() < n {
          tokio::task::yield_now().await;
        }
      })
      .await
      .expect("model was not called");
    }
  }

  #[async_trait]
  impl TextModel for ScriptedModel {
    fn name(&self) -> &str { "scripted" }

    async fn invoke(&self, prompt: &str) -> Result<String, ModelError> {
      self.prompts.lock().await.push(prompt.to_string());
      let rx = self.pending.lock().await.pop_front().expect("unexpected model call");
      rx.await.unwrap_or(Err(ModelError::NotConfigured))
    }
  }

  /// Model that answers with the prompt it was given.
  struct EchoModel;

  #[async_trait]
  impl TextModel for EchoModel {
    fn name(&self) -> &str { "echo" }

    async fn invoke(&self, prompt: &str) -> Result<String, ModelError> {
      Ok(prompt.to_string())
    }
  }

  struct BrokenSink;

  #[async_trait]
  impl SubmissionSink for BrokenSink {
    fn name(&self) -> &str { "broken" }

    async fn record(&self, _record: &SubmissionRecord) -> Result<(), SinkError> {
      Err(SinkError::Status(503))
    }
  }

  fn app(model: Arc<dyn TextModel>, sink: Arc<dyn SubmissionSink>) -> Arc<AppState> {
    Arc::new(AppState::with_parts(PromptBuilder::new(Prompts::default()), model, sink))
  }

  async fn wait_for(rx: &mut watch::Receiver<SessionView>, pred: impl FnMut(&SessionView) -> bool) -> SessionView {
    let view = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(pred))
      .await
      .expect("timed out waiting for session update")
      .expect("session channel closed");
    SessionView::clone(&view)
  }

  fn generate() -> Event {
    Event::Generate(QuestionParams::default())
  }

  #[tokio::test]
  async fn second_generate_wins_even_if_first_answers_first() {
    let model = Arc::new(ScriptedModel::default());
    let state = app(model.clone(), Arc::new(MemorySink::default()));
    let handle = state.create_session().await;
    let mut rx = handle.subscribe();

    let first = model.expect_call().await;
    let second = model.expect_call().await;
    dispatch(&state, &handle, generate()).await.expect("first generate");
    model.wait_calls(1).await;
    let view = dispatch(&state, &handle, generate()).await.expect("second generate");
    assert_eq!(view.state, SessionState::Generating);
    assert!(!view.can_generate);

    first.send(Ok("first question".into())).expect("send first");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.view().await.state, SessionState::Generating);

    second.send(Ok("second question".into())).expect("send second");
    let view = wait_for(&mut rx, |v| matches!(v.state, SessionState::QuestionReady { .. })).await;
    assert_eq!(view.state, SessionState::QuestionReady { question: "second question".into() });
  }

  #[tokio::test]
  async fn first_generate_answering_last_is_discarded() {
    let model = Arc::new(ScriptedModel::default());
    let state = app(model.clone(), Arc::new(MemorySink::default()));
    let handle = state.create_session().await;
    let mut rx = handle.subscribe();

    let first = model.expect_call().await;
    let second = model.expect_call().await;
    dispatch(&state, &handle, generate()).await.expect("first generate");
    model.wait_calls(1).await;
    dispatch(&state, &handle, generate()).await.expect("second generate");

    second.send(Ok("second question".into())).expect("send second");
    wait_for(&mut rx, |v| matches!(v.state, SessionState::QuestionReady { .. })).await;

    first.send(Ok("first question".into())).expect("send first");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.view().await.state, SessionState::QuestionReady { question: "second question".into() });
  }

  #[tokio::test]
  async fn end_to_end_empty_code_submission_is_recorded_with_defaults() {
    let model = Arc::new(ScriptedModel::default());
    let sink = Arc::new(MemorySink::default());
    let state = app(model.clone(), sink.clone());
    let handle = state.create_session().await;
    let mut rx = handle.subscribe();

    let q = model.expect_call().await;
    dispatch(&state, &handle, generate()).await.expect("generate");
    q.send(Ok("## Palindrome\n\nReturn **True** if `s` reads the same backwards.".into())).expect("send");
    let view = wait_for(&mut rx, |v| v.can_submit).await;
    let question = "Palindrome\n\nReturn True if s reads the same backwards.";
    assert_eq!(view.state, SessionState::QuestionReady { question: question.into() });

    let eval = model.expect_call().await;
    let view = dispatch(&state, &handle, Event::Submit).await.expect("submit");
    assert!(matches!(view.state, SessionState::Submitting { .. }));
    assert!(!view.can_submit);
    eval.send(Ok("### Verdict\nCorrectness: No, there is no code to run.".into())).expect("send");

    let view = wait_for(&mut rx, |v| {
      matches!(v.state, SessionState::ResultReady { persistence: Persistence::Saved, .. })
    })
    .await;
    let SessionState::ResultReady { assessment, code, .. } = view.state else { unreachable!() };
    assert_eq!(code, "");
    assert_eq!(assessment.report.is_correct, Verdict::No);
    assert_eq!(assessment.report.correctness_note, "No, there is no code to run.");
    assert_eq!(assessment.report.time_complexity, "Unknown");
    assert_eq!(assessment.report.space_complexity, "Unknown");

    let prompts = model.prompts.lock().await.clone();
    assert!(prompts[1].contains(question), "evaluation prompt must embed the normalized question");

    let records = sink.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].question, question);
    assert_eq!(records[0].code, "");
    assert_eq!(records[0].report, assessment.report);
  }

  #[tokio::test]
  async fn sink_outage_keeps_the_assessment() {
    let model = Arc::new(ScriptedModel::default());
    let state = app(model.clone(), Arc::new(BrokenSink));
    let handle = state.create_session().await;
    let mut rx = handle.subscribe();

    let q = model.expect_call().await;
    dispatch(&state, &handle, generate()).await.expect("generate");
    q.send(Ok("Sum two numbers.".into())).expect("send");
    wait_for(&mut rx, |v| v.can_submit).await;

    dispatch(&state, &handle, Event::EditCode("def add(a, b): return a + b".into())).await.expect("edit");
    let eval = model.expect_call().await;
    dispatch(&state, &handle, Event::Submit).await.expect("submit");
    eval.send(Ok("Correctness: Yes\nTime complexity: O(1)\nSpace complexity: O(1)".into())).expect("send");

    let view = wait_for(&mut rx, |v| {
      matches!(v.state, SessionState::ResultReady { persistence: Persistence::Failed { .. }, .. })
    })
    .await;
    assert_eq!(view.notice.as_deref(), Some("submission not saved"));
    let SessionState::ResultReady { assessment, .. } = view.state else { unreachable!() };
    assert_eq!(assessment.report.is_correct, Verdict::Yes);
    assert_eq!(assessment.report.time_complexity, "O(1)");
  }

  #[tokio::test]
  async fn evaluation_failure_surfaces_and_skips_sink() {
    let model = Arc::new(ScriptedModel::default());
    let sink = Arc::new(MemorySink::default());
    let state = app(model.clone(), sink.clone());
    let handle = state.create_session().await;
    let mut rx = handle.subscribe();

    let q = model.expect_call().await;
    dispatch(&state, &handle, generate()).await.expect("generate");
    q.send(Ok("q".into())).expect("send");
    wait_for(&mut rx, |v| v.can_submit).await;

    let eval = model.expect_call().await;
    dispatch(&state, &handle, Event::Submit).await.expect("submit");
    eval.send(Err(ModelError::Empty { model: "scripted".into() })).expect("send");

    let view = wait_for(&mut rx, |v| matches!(v.state, SessionState::Failed { .. })).await;
    assert_eq!(
      view.state,
      SessionState::Failed { reason: FailureReason::EvaluationError, question: Some("q".into()) }
    );
    assert_eq!(view.notice.as_deref(), Some("evaluation error"));
    assert!(sink.records().await.is_empty());
  }

  #[tokio::test]
  async fn submit_without_question_is_rejected() {
    let state = app(Arc::new(EchoModel), Arc::new(MemorySink::default()));
    let handle = state.create_session().await;
    let err = dispatch(&state, &handle, Event::Submit).await.unwrap_err();
    assert_eq!(err, SessionError::NoQuestion);
    assert_eq!(handle.view().await.state, SessionState::Idle);
  }

  #[tokio::test]
  async fn run_task_builds_prompts_per_kind() {
    let state = app(Arc::new(EchoModel), Arc::new(MemorySink::default()));

    let passthrough = TaskRequest { task: TaskKind::Question, prompt: Some("Give me a graph problem.".into()), code: None };
    assert_eq!(run_task(&state, &passthrough).await.expect("text"), "Give me a graph problem.");

    let templated = TaskRequest::default();
    let text = run_task(&state, &templated).await.expect("text");
    assert!(text.starts_with("Give me a random easy-level coding question"));

    let evaluate = TaskRequest {
      task: TaskKind::Evaluate,
      prompt: Some("Reverse a string.".into()),
      code: Some("def r(s): return s[::-1]".into()),
    };
    let text = run_task(&state, &evaluate).await.expect("text");
    assert!(text.contains("Question: Reverse a string."));
    assert!(text.contains("def r(s): return s[::-1]"));
    assert!(text.contains("Correctness:"));
  }
}

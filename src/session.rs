//! Session state machine.
//!
//! `Session::apply` is a pure reducer: it takes one event, updates the session
//! and optionally returns an `Effect` for the driver (`logic.rs`) to run.
//! Nothing here performs IO or awaits.
//!
//! Transitions:
//!   any state      --Generate-->            Generating
//!   Generating     --QuestionResolved ok--> QuestionReady
//!   Generating     --QuestionResolved err-> Failed(generation_error)
//!   QuestionReady  --Submit-->              Submitting        (also from ResultReady / Failed-with-question)
//!   Submitting     --EvaluationResolved ok--> ResultReady     (+ Record effect)
//!   Submitting     --EvaluationResolved err-> Failed(evaluation_error)
//!   ResultReady    --RecordResolved-->      ResultReady with persistence updated
//!
//! Every request carries a ticket. A resolution is applied only if its ticket
//! is still the latest for its category and the session is still waiting for
//! it; anything else is stale and dropped.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::domain::{Assessment, Difficulty, QuestionParams, SubmissionRecord};
use crate::markdown::normalize;
use crate::report::extract;

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    GenerationError,
    EvaluationError,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::GenerationError => f.write_str("generation error"),
            FailureReason::EvaluationError => f.write_str("evaluation error"),
        }
    }
}

/// Outcome of the sink write for the current result. Never touches the report.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Persistence {
    Pending,
    Saved,
    Failed { message: String },
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Generating,
    QuestionReady {
        question: String,
    },
    /// `code` is the snapshot being evaluated; the learner may keep editing.
    Submitting {
        question: String,
        code: String,
    },
    ResultReady {
        question: String,
        code: String,
        assessment: Assessment,
        persistence: Persistence,
    },
    /// An evaluation failure keeps the question so the learner can resubmit.
    Failed {
        reason: FailureReason,
        question: Option<String>,
    },
}

impl SessionState {
    pub fn phase(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Generating => "generating",
            SessionState::QuestionReady { .. } => "question_ready",
            SessionState::Submitting { .. } => "submitting",
            SessionState::ResultReady { .. } => "result_ready",
            SessionState::Failed { .. } => "failed",
        }
    }

    pub fn question(&self) -> Option<&str> {
        match self {
            SessionState::QuestionReady { question }
            | SessionState::Submitting { question, .. }
            | SessionState::ResultReady { question, .. } => Some(question),
            SessionState::Failed { question, .. } => question.as_deref(),
            SessionState::Idle | SessionState::Generating => None,
        }
    }
}

/// Inputs to the reducer: learner actions and resolved requests.
#[derive(Clone, Debug)]
pub enum Event {
    Generate(QuestionParams),
    QuestionResolved { ticket: u64, outcome: Result<String, String> },
    EditCode(String),
    SetDifficulty(Difficulty),
    Submit,
    EvaluationResolved { ticket: u64, outcome: Result<String, String> },
    RecordResolved { ticket: u64, outcome: Result<(), String> },
    TogglePanel,
}

/// Work the driver must start on behalf of the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    RequestQuestion { ticket: u64, params: QuestionParams },
    RequestEvaluation { ticket: u64, question: String, code: String },
    Record { ticket: u64, record: SubmissionRecord },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("there is no question to submit against; generate one first")]
    NoQuestion,
    #[error("an evaluation is already in progress")]
    EvaluationInFlight,
}

#[derive(Clone, Debug)]
pub struct Session {
    pub id: Uuid,
    state: SessionState,
    code: String,
    difficulty: Difficulty,
    panel_open: bool,
    question_ticket: u64,
    evaluation_ticket: u64,
}

impl Session {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            state: SessionState::Idle,
            code: String::new(),
            difficulty: Difficulty::default(),
            panel_open: true,
            question_ticket: 0,
            evaluation_ticket: 0,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn panel_open(&self) -> bool {
        self.panel_open
    }

    /// Generate stays accepted while generating (the newest trigger wins),
    /// but the UI affordance is off for the duration.
    pub fn can_generate(&self) -> bool {
        !matches!(self.state, SessionState::Generating)
    }

    pub fn can_submit(&self) -> bool {
        match &self.state {
            SessionState::QuestionReady { question } | SessionState::ResultReady { question, .. } => {
                !question.is_empty()
            }
            SessionState::Failed { question: Some(q), .. } => !q.is_empty(),
            _ => false,
        }
    }

    /// Secondary, user-facing notice for the current state, if any.
    pub fn notice(&self) -> Option<String> {
        match &self.state {
            SessionState::Failed { reason, .. } => Some(reason.to_string()),
            SessionState::ResultReady { persistence: Persistence::Failed { .. }, .. } => {
                Some("submission not saved".into())
            }
            _ => None,
        }
    }

    pub fn apply(&mut self, event: Event) -> Result<Option<Effect>, SessionError> {
        match event {
            Event::Generate(params) => {
                self.question_ticket += 1;
                // A pending evaluation belongs to the cycle being replaced.
                self.evaluation_ticket += 1;
                self.state = SessionState::Generating;
                debug!(target: "session", id = %self.id, ticket = self.question_ticket, "Generating question");
                Ok(Some(Effect::RequestQuestion { ticket: self.question_ticket, params }))
            }

            Event::QuestionResolved { ticket, outcome } => {
                if ticket != self.question_ticket || !matches!(self.state, SessionState::Generating) {
                    debug!(target: "session", id = %self.id, ticket, current = self.question_ticket, "Discarding stale question response");
                    return Ok(None);
                }
                let outcome = outcome.and_then(|raw| {
                    let question = normalize(&raw);
                    if question.is_empty() {
                        Err("question was empty after normalization".to_string())
                    } else {
                        Ok(question)
                    }
                });
                self.state = match outcome {
                    Ok(question) => SessionState::QuestionReady { question },
                    Err(detail) => {
                        error!(target: "session", id = %self.id, error = %detail, "Question generation failed");
                        SessionState::Failed { reason: FailureReason::GenerationError, question: None }
                    }
                };
                Ok(None)
            }

            Event::EditCode(code) => {
                self.code = code;
                Ok(None)
            }

            Event::SetDifficulty(difficulty) => {
                self.difficulty = difficulty;
                Ok(None)
            }

            Event::TogglePanel => {
                self.panel_open = !self.panel_open;
                Ok(None)
            }

            Event::Submit => {
                if matches!(self.state, SessionState::Submitting { .. }) {
                    return Err(SessionError::EvaluationInFlight);
                }
                if !self.can_submit() {
                    return Err(SessionError::NoQuestion);
                }
                let question = self.state.question().unwrap_or_default().to_string();
                let code = self.code.clone();
                self.evaluation_ticket += 1;
                self.state = SessionState::Submitting { question: question.clone(), code: code.clone() };
                debug!(target: "session", id = %self.id, ticket = self.evaluation_ticket, code_len = code.len(), "Submitting code");
                Ok(Some(Effect::RequestEvaluation { ticket: self.evaluation_ticket, question, code }))
            }

            Event::EvaluationResolved { ticket, outcome } => {
                let SessionState::Submitting { question, code } = &self.state else {
                    debug!(target: "session", id = %self.id, ticket, "Discarding evaluation response outside Submitting");
                    return Ok(None);
                };
                if ticket != self.evaluation_ticket {
                    debug!(target: "session", id = %self.id, ticket, current = self.evaluation_ticket, "Discarding stale evaluation response");
                    return Ok(None);
                }
                let (question, code) = (question.clone(), code.clone());

                match outcome {
                    Ok(raw) => {
                        let feedback = normalize(&raw);
                        let report = extract(&feedback);
                        let record = SubmissionRecord {
                            question: question.clone(),
                            code: code.clone(),
                            report: report.clone(),
                            difficulty: self.difficulty,
                        };
                        self.state = SessionState::ResultReady {
                            question,
                            code,
                            assessment: Assessment { feedback, report },
                            persistence: Persistence::Pending,
                        };
                        Ok(Some(Effect::Record { ticket, record }))
                    }
                    Err(detail) => {
                        error!(target: "session", id = %self.id, error = %detail, "Evaluation failed");
                        self.state = SessionState::Failed {
                            reason: FailureReason::EvaluationError,
                            question: Some(question),
                        };
                        Ok(None)
                    }
                }
            }

            Event::RecordResolved { ticket, outcome } => {
                if let Err(detail) = &outcome {
                    warn!(target: "session", id = %self.id, ticket, error = %detail, "Submission was not saved");
                }
                if ticket != self.evaluation_ticket {
                    return Ok(None);
                }
                if let SessionState::ResultReady { persistence, .. } = &mut self.state {
                    *persistence = match outcome {
                        Ok(()) => Persistence::Saved,
                        Err(message) => Persistence::Failed { message },
                    };
                }
                Ok(None)
            }
        }
    }
}

//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Difficulty, TaskKind};
use crate::session::{Session, SessionState};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    Generate {
        #[serde(default)]
        topic: Option<String>,
        #[serde(default)]
        level: Option<Difficulty>,
        #[serde(default)]
        instruction: Option<String>,
    },
    UpdateCode {
        code: String,
    },
    SetDifficulty {
        difficulty: Difficulty,
    },
    Submit,
    TogglePanel,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Session { session: SessionView },
    Error { message: String },
}

/// Snapshot of one session as the frontend sees it.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: Uuid,
    pub state: SessionState,
    pub code: String,
    pub difficulty: Difficulty,
    pub panel_open: bool,
    pub can_generate: bool,
    pub can_submit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

pub fn to_view(s: &Session) -> SessionView {
    SessionView {
        id: s.id,
        state: s.state().clone(),
        code: s.code().to_string(),
        difficulty: s.difficulty(),
        panel_open: s.panel_open(),
        can_generate: s.can_generate(),
        can_submit: s.can_submit(),
        notice: s.notice(),
    }
}

//
// HTTP request/response DTOs
//

/// Stateless task boundary: `{ task, prompt?, code? }`.
/// For `evaluate`, `prompt` carries the original question text.
#[derive(Debug, Default, Deserialize)]
pub struct TaskRequest {
    #[serde(default)]
    pub task: TaskKind,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TaskOut {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorOut {
    pub error: String,
}

#[derive(Deserialize)]
pub struct CodeIn {
    pub code: String,
}

#[derive(Deserialize)]
pub struct DifficultyIn {
    pub difficulty: Difficulty,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub model: String,
    pub sink: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_message_accepts_optional_params() {
        let bare: ClientWsMessage = serde_json::from_str(r#"{"type":"generate"}"#).expect("bare");
        assert!(matches!(
            bare,
            ClientWsMessage::Generate { topic: None, level: None, instruction: None }
        ));

        let full: ClientWsMessage =
            serde_json::from_str(r#"{"type":"generate","topic":"graphs","level":"hard"}"#).expect("full");
        match full {
            ClientWsMessage::Generate { topic, level, .. } => {
                assert_eq!(topic.as_deref(), Some("graphs"));
                assert_eq!(level, Some(Difficulty::Hard));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn task_request_defaults_to_question() {
        let req: TaskRequest = serde_json::from_str(r#"{"prompt":"Give me a question"}"#).expect("valid");
        assert_eq!(req.task, TaskKind::Question);
        assert_eq!(req.code, None);
    }

    #[test]
    fn session_view_serializes_camel_case() {
        let view = to_view(&Session::new(Uuid::nil()));
        let v = serde_json::to_value(&view).expect("serializable");
        assert_eq!(v["state"]["phase"], "idle");
        assert_eq!(v["panelOpen"], true);
        assert_eq!(v["canGenerate"], true);
        assert_eq!(v["canSubmit"], false);
        assert!(v.get("notice").is_none());
    }
}

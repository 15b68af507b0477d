//! API Models
//!
//! Request and response bodies for the HTTP surface, documented with `utoipa`.
//! Core types without a schema of their own are exposed as free-form objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tutor_core::{
    session::{Phase, SessionContext, TurnData, TurnKind, TurnResponse},
    store::MasteryRecord,
    topic::TopicNode,
};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Tutor,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Tutor => write!(f, "tutor"),
        }
    }
}

/// One line of the server-held chat history.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct ChatEntry {
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatEntry {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// What the stateful adapter persists between restarts.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    #[serde(default)]
    pub context: SessionContext,
    #[serde(default)]
    pub history: Vec<ChatEntry>,
}

#[derive(Deserialize, ToSchema)]
pub struct ChatPayload {
    #[schema(example = "Learn: Photosynthesis")]
    pub message: String,
}

#[derive(Deserialize, ToSchema)]
pub struct StartLearningPayload {
    #[schema(example = "Photosynthesis")]
    pub topic: String,
}

#[derive(Deserialize, ToSchema)]
pub struct TurnPayload {
    #[schema(example = "yes")]
    pub message: String,
    /// Context returned by the previous turn. Omit to start fresh.
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub session_context: Option<SessionContext>,
}

/// A tutor reply from the stateful endpoints.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct TurnBody {
    pub text: String,
    #[schema(value_type = String, example = "explanation")]
    pub turn_kind: TurnKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub structured_data: Option<TurnData>,
}

impl From<TurnResponse> for TurnBody {
    fn from(response: TurnResponse) -> Self {
        Self {
            text: response.text,
            turn_kind: response.kind,
            structured_data: response.data,
        }
    }
}

/// A tutor reply from the stateless endpoint, with the context to send back
/// on the next turn.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct StatelessTurnBody {
    #[serde(flatten)]
    pub turn: TurnBody,
    #[schema(value_type = Object)]
    pub updated_session_context: SessionContext,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct TreeBody {
    pub target_topic: String,
    /// Tree with mastered nodes marked MASTERED.
    #[schema(value_type = Object)]
    pub tree: TopicNode,
    pub rendered: String,
    pub teaching_order: Vec<String>,
    pub current_index: usize,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct ProgressBody {
    pub target_topic: String,
    #[schema(value_type = Object)]
    pub phase: Phase,
    pub current_index: usize,
    pub total: usize,
    pub current_concept: Option<String>,
    pub waiting_for_synthesis: bool,
    pub attempt_count: u32,
    #[schema(value_type = Vec<Object>)]
    pub mastered: Vec<MasteryRecord>,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

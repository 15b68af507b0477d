//! Axum Handlers for the REST API
//!
//! The stateful endpoints drive the single server-held session; `/api/turn`
//! is stateless and round-trips the session context through the caller.
//! It uses `utoipa` doc comments to generate OpenAPI documentation.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::{error, info};
use tutor_core::linearize::{prune_mastered, render_tree};

use crate::{
    models::{
        ChatEntry, ChatPayload, ErrorResponse, ProgressBody, StartLearningPayload,
        StatelessTurnBody, TreeBody, TurnBody, TurnPayload,
    },
    state::{AppState, ServerSession},
};

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// Send one message to the server-held session.
#[utoipa::path(
    post,
    path = "/api/chat",
    request_body = ChatPayload,
    responses(
        (status = 200, description = "Tutor reply", body = TurnBody)
    )
)]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatPayload>,
) -> Json<TurnBody> {
    let mut session = state.session.lock().await;
    let (response, context) = state
        .machine
        .handle_turn(&payload.message, session.context.clone())
        .await;
    state
        .commit_turn(&mut session, &payload.message, &response, context)
        .await;
    Json(response.into())
}

/// Decompose a topic and start teaching it in the server-held session.
#[utoipa::path(
    post,
    path = "/api/start-learning",
    request_body = StartLearningPayload,
    responses(
        (status = 200, description = "Tree and first explanation", body = TurnBody),
        (status = 400, description = "Empty topic", body = ErrorResponse)
    )
)]
pub async fn start_learning(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<StartLearningPayload>,
) -> Result<Json<TurnBody>, ApiError> {
    let topic = payload.topic.trim();
    if topic.is_empty() {
        return Err(ApiError::BadRequest("topic must not be empty".to_string()));
    }

    let mut session = state.session.lock().await;
    let (response, context) = state.machine.start_learning(topic).await;
    state
        .commit_turn(&mut session, &format!("Learn: {topic}"), &response, context)
        .await;
    Ok(Json(response.into()))
}

/// The current tree with mastered concepts marked.
#[utoipa::path(
    get,
    path = "/api/tree",
    responses(
        (status = 200, description = "Current prerequisite tree", body = TreeBody),
        (status = 404, description = "No active learning session", body = ErrorResponse)
    )
)]
pub async fn get_tree(State(state): State<Arc<AppState>>) -> Result<Json<TreeBody>, ApiError> {
    let session = state.session.lock().await;
    let context = &session.context;
    let tree = context
        .tree
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("No active learning session".to_string()))?;

    let mastered = state.machine.mastered_concepts().await;
    let tree = prune_mastered(tree, &mastered);
    Ok(Json(TreeBody {
        target_topic: context.target_topic.clone(),
        rendered: render_tree(&tree),
        tree,
        teaching_order: context
            .teaching_order
            .iter()
            .map(|unit| unit.topic.clone())
            .collect(),
        current_index: context.current_index,
    }))
}

/// Position in the teaching order and the learner's mastery records.
#[utoipa::path(
    get,
    path = "/api/progress",
    responses(
        (status = 200, description = "Learning progress", body = ProgressBody),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn get_progress(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ProgressBody>, ApiError> {
    let session = state.session.lock().await;
    let context = &session.context;
    let mastered = state
        .machine
        .store()
        .mastery_records(&state.machine.config().learner_id)
        .await?;

    Ok(Json(ProgressBody {
        target_topic: context.target_topic.clone(),
        phase: context.phase(),
        current_index: context.current_index,
        total: context.teaching_order.len(),
        current_concept: context.current_unit().map(|unit| unit.topic.clone()),
        waiting_for_synthesis: context.waiting_for_synthesis,
        attempt_count: context.attempt_count,
        mastered,
    }))
}

/// Chat history of the server-held session, oldest first.
#[utoipa::path(
    get,
    path = "/api/history",
    responses(
        (status = 200, description = "Chat history", body = [ChatEntry])
    )
)]
pub async fn get_history(State(state): State<Arc<AppState>>) -> Json<Vec<ChatEntry>> {
    Json(state.session.lock().await.history.clone())
}

/// Clear the server-held session. Mastery records are kept.
#[utoipa::path(
    post,
    path = "/api/reset",
    responses(
        (status = 204, description = "Session cleared")
    )
)]
pub async fn reset(State(state): State<Arc<AppState>>) -> StatusCode {
    let mut session = state.session.lock().await;
    *session = ServerSession::default();
    state.persist(&session).await;
    info!("Server-held session reset");
    StatusCode::NO_CONTENT
}

/// Run one turn against a caller-supplied context.
#[utoipa::path(
    post,
    path = "/api/turn",
    request_body = TurnPayload,
    responses(
        (status = 200, description = "Tutor reply with the updated context", body = StatelessTurnBody)
    )
)]
pub async fn turn(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TurnPayload>,
) -> Json<StatelessTurnBody> {
    let context = payload.session_context.unwrap_or_default();
    let (response, updated_session_context) =
        state.machine.handle_turn(&payload.message, context).await;
    Json(StatelessTurnBody {
        turn: response.into(),
        updated_session_context,
    })
}

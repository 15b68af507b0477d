//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, WebSocket endpoint, and OpenAPI documentation.

use crate::{
    handlers,
    models::{
        ChatEntry, ChatPayload, ErrorResponse, MessageRole, ProgressBody, StartLearningPayload,
        StatelessTurnBody, TreeBody, TurnBody, TurnPayload,
    },
    state::AppState,
    ws::ws_handler,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::chat,
        handlers::start_learning,
        handlers::get_tree,
        handlers::get_progress,
        handlers::get_history,
        handlers::reset,
        handlers::turn,
    ),
    components(
        schemas(
            ChatPayload, StartLearningPayload, TurnPayload, TurnBody, StatelessTurnBody,
            TreeBody, ProgressBody, ChatEntry, MessageRole, ErrorResponse
        )
    ),
    tags(
        (name = "Tutor API", description = "Adaptive tutoring over a prerequisite tree")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/api/chat", post(handlers::chat))
        .route("/api/start-learning", post(handlers::start_learning))
        .route("/api/tree", get(handlers::get_tree))
        .route("/api/progress", get(handlers::get_progress))
        .route("/api/history", get(handlers::get_history))
        .route("/api/reset", post(handlers::reset))
        .route("/api/turn", post(handlers::turn))
        .route("/ws", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}

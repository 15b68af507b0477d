//! Manages the WebSocket connection lifecycle for a tutoring session.

use super::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use anyhow::Result;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use std::sync::Arc;
use tracing::{Instrument, error, info, warn};
use tutor_core::session::{SessionContext, TurnResponse};
use uuid::Uuid;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let connection_id = Uuid::new_v4();
    ws.on_upgrade(move |socket| {
        handle_socket(socket, state).instrument(tracing::info_span!("ws_session", %connection_id))
    })
}

/// Runs one connection until the client closes it.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    info!("New WebSocket connection");
    if let Err(e) = run_session(socket, state).await {
        error!(error = ?e, "WebSocket session terminated with error.");
    }
    info!("WebSocket connection closed.");
}

async fn run_session(socket: WebSocket, state: Arc<AppState>) -> Result<()> {
    let (mut socket_tx, mut socket_rx) = socket.split();
    let mut context = SessionContext::default();

    while let Some(msg_result) = socket_rx.next().await {
        let text = match msg_result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => {
                info!("Client sent close frame. Shutting down session.");
                break;
            }
            Ok(Message::Binary(_)) => {
                send_msg(
                    &mut socket_tx,
                    ServerMessage::Error {
                        message: "Binary frames are not supported.".to_string(),
                    },
                )
                .await?;
                continue;
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => continue,
            Err(e) => {
                error!("Error receiving from client WebSocket: {:?}", e);
                break;
            }
        };

        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::UserMessage { text }) => {
                let (response, updated) = state.machine.handle_turn(&text, context).await;
                context = updated;
                send_msg(&mut socket_tx, ServerMessage::turn(response, context.phase())).await?;
            }
            Ok(ClientMessage::Reset) => {
                context = SessionContext::default();
                let response =
                    TurnResponse::message("Starting fresh. What would you like to learn?");
                send_msg(&mut socket_tx, ServerMessage::turn(response, context.phase())).await?;
            }
            Err(e) => {
                warn!(error = %e, "Ignoring malformed client message");
                send_msg(
                    &mut socket_tx,
                    ServerMessage::Error {
                        message: format!("Invalid message: {e}"),
                    },
                )
                .await?;
            }
        }
    }
    Ok(())
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}

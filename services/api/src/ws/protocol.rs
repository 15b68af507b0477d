//! Defines the WebSocket message protocol between the browser client and the API server.

use serde::{Deserialize, Serialize};
use tutor_core::session::{Phase, TurnData, TurnKind, TurnResponse};

/// Messages sent from the client (browser) to the server.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// A text message from the learner.
    UserMessage { text: String },
    /// Drops this connection's session context.
    Reset,
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The tutor's reply to one client message.
    Turn {
        text: String,
        turn_kind: TurnKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        structured_data: Option<TurnData>,
        phase: Phase,
    },
    /// Reports a malformed or unsupported client message.
    Error { message: String },
}

impl ServerMessage {
    pub fn turn(response: TurnResponse, phase: Phase) -> Self {
        ServerMessage::Turn {
            text: response.text,
            turn_kind: response.kind,
            structured_data: response.data,
            phase,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_client_messages() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"user_message","text":"Learn: Gravity"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::UserMessage {
                text: "Learn: Gravity".to_string()
            }
        );

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"reset"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Reset);

        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"init"}"#).is_err());
    }

    #[test]
    fn serializes_turn_with_phase() {
        let msg = ServerMessage::turn(
            TurnResponse::message("Please type something!"),
            Phase::Idle,
        );
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "turn");
        assert_eq!(json["turn_kind"], "message");
        assert_eq!(json["phase"]["state"], "IDLE");
        assert!(json.get("structured_data").is_none());
    }

    #[test]
    fn serializes_error() {
        let msg = ServerMessage::Error {
            message: "bad".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"type":"error","message":"bad"}"#
        );
    }
}

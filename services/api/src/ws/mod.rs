//! WebSocket Session Management
//!
//! Each connection owns its own `SessionContext`; nothing is shared between
//! sockets except the tutoring core and its store.
//!
//! - `protocol`: Defines the JSON-based message format for client-server communication.
//! - `session`: Manages the WebSocket connection lifecycle, from handshake to termination.

pub mod protocol;
pub mod session;

pub use session::ws_handler;

//! Tutor API Library Crate
//!
//! Thin shells around `tutor-core`: environment configuration, the Postgres
//! store, HTTP and WebSocket adapters, and the wiring shared by the binaries.

pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod router;
pub mod setup;
pub mod state;
pub mod ws;

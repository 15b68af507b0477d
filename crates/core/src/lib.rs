//! Adaptive tutoring core.
//!
//! A topic is decomposed into a prerequisite tree ([`decompose`]), flattened
//! into a bottom-up teaching order ([`linearize`]), and taught one unit at a
//! time by the [`session`] state machine, which explains each unit, asks
//! synthesis questions that combine earlier units, and grades the answers.
//!
//! All text generation goes through an [`oracle::Oracle`]; all persistence
//! goes through a [`store::Store`]. Both are injected, so the core holds no
//! session state of its own.

pub mod config;
pub mod decompose;
pub mod explain;
pub mod grading;
pub mod linearize;
pub mod oracle;
pub mod prompts;
pub mod session;
pub mod store;
pub mod synthesis;
pub mod topic;

pub use config::{CycleGuard, TutorConfig};
pub use oracle::{OpenAICompatibleOracle, Oracle, OracleRequest};
pub use session::{SessionContext, SessionMachine, TurnData, TurnKind, TurnResponse};
pub use store::{MasteryRecord, MemoryStore, Store};
pub use topic::{NodeKind, TeachingUnit, TopicNode};

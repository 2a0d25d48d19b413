//! The per-node rule engine.
//!
//! [`RuleEngine`] turns delivered control messages into physical-layer
//! actions and RuleSet progress:
//!
//! 1. advance runtimes with pending work
//! 2. publish the message on the event bus
//! 3. drain and dispatch all due events through the two-tier handler table
//! 4. allocate fresh entangled qubits to runtimes, per interface
//! 5. advance runtimes again
//!
//! Handlers are registered per `(event kind, protocol family)`, with
//! per-kind and per-family fallbacks; an unmatched event is logged
//! (`unknown_rule_event` / `unknown_rule_protocol`), never an error.

mod config;
mod engine;
mod handlers;
mod hardware;
mod msm;

pub use config::EngineConfig;
pub use engine::{MessageDisposition, RuleEngine, RuleEventHandler};
pub use hardware::{HardwareCall, RealtimeController, RecordingController};
pub use msm::MsmInfo;

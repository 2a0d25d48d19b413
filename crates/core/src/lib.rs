//! Event model for the rule engine.
//!
//! This crate provides the pieces between raw message delivery and protocol
//! dispatch:
//!
//! - [`RuleEvent`]: the typed, time-ordered event a handler receives
//! - [`EventBus`]: classifies raw messages and drains events deterministically
//! - [`KernelPort`]: the consumed surface of the discrete-event kernel
//!
//! # Architecture
//!
//! ```text
//! Message → EventBus::publish_message() → drain(now) → dispatch
//! ```
//!
//! The bus is synchronous and deterministic: drain order is fixed by
//! `(time, event_number)`, and an unknown message class yields an UNKNOWN
//! event rather than an error.

mod event;
mod event_bus;
mod kernel;

pub use event::{
    ExecutionPath, ProtocolFamily, RuleEvent, RuleEventChannel, RuleEventKind, RuleEventPayload,
};
pub use event_bus::{EventBus, Translator};
pub use kernel::{KernelPort, TimerHandle, ROUTER_PORT};

//! Structured event logging for repeater nodes.
//!
//! The [`Logger`] port records protocol-visible state transitions (qubit
//! busy/allocated flips, bell-pair bookkeeping, setup packets, free-form
//! events) as one JSON object per line. Components receive an injected
//! `Arc<dyn Logger>`; tests use [`RecordingLogger`] to assert on emitted
//! events, production sinks use [`JsonLogger`].
//!
//! The logger carries ambient simulation time: the engine calls
//! [`Logger::set_time`] once per delivered message, so individual record
//! calls do not thread `now` through every store operation.

mod json;
mod recording;

pub use json::JsonLogger;
pub use recording::RecordingLogger;

use qrep_messages::Message;
use qrep_types::{NodeAddr, QnicKind, SimTime};
use std::sync::Arc;

/// Structured event recording port.
pub trait Logger: Send + Sync {
    /// Update the ambient simulation time stamped on subsequent records.
    fn set_time(&self, now: SimTime);

    /// Bind the node address stamped on subsequent records.
    fn set_node_address(&self, addr: NodeAddr);

    /// Record an inbound or outbound control packet.
    fn log_packet(&self, event_type: &str, msg: &Message);

    /// Record a qubit busy/allocated state change.
    fn log_qubit_state(
        &self,
        kind: QnicKind,
        qnic_index: i32,
        qubit_index: usize,
        busy: bool,
        allocated: bool,
    );

    /// Record a bell-pair bookkeeping event; `verb` completes the event type
    /// (`BellPairInsert`, `BellPairErase`, ...).
    fn log_bell_pair(
        &self,
        verb: &str,
        partner_addr: NodeAddr,
        kind: QnicKind,
        qnic_index: i32,
        qubit_index: usize,
    );

    /// Record a free-form event; `payload_json` must be a comma-separated
    /// sequence of JSON members (it becomes the `event_payload` object).
    fn log_event(&self, event_type: &str, payload_json: &str);
}

/// A logger that drops everything.
#[derive(Debug, Default)]
pub struct DisabledLogger;

impl Logger for DisabledLogger {
    fn set_time(&self, _now: SimTime) {}
    fn set_node_address(&self, _addr: NodeAddr) {}
    fn log_packet(&self, _event_type: &str, _msg: &Message) {}
    fn log_qubit_state(&self, _: QnicKind, _: i32, _: usize, _: bool, _: bool) {}
    fn log_bell_pair(&self, _: &str, _: NodeAddr, _: QnicKind, _: i32, _: usize) {}
    fn log_event(&self, _event_type: &str, _payload_json: &str) {}
}

/// Convenience for components that accept an optional logger.
pub fn disabled() -> Arc<dyn Logger> {
    Arc::new(DisabledLogger)
}

/// Escape a string for inclusion in a JSON value: quotes, backslashes, and
/// control characters (`\uXXXX` for the unnamed ones).
pub fn escape_json(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            ch if (ch as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", ch as u32));
            }
            ch => out.push(ch),
        }
    }
    out
}

//! Recording logger for tests.

use crate::Logger;
use qrep_messages::Message;
use qrep_types::{NodeAddr, QnicKind, SimTime};
use std::sync::Mutex;

/// Buffers `(event_type, payload)` pairs for assertions.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    events: Mutex<Vec<(String, String)>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded `(event_type, payload)` pairs, oldest first.
    pub fn events(&self) -> Vec<(String, String)> {
        self.events.lock().expect("recording logger poisoned").clone()
    }

    /// The most recent recorded event, if any.
    pub fn last_event(&self) -> Option<(String, String)> {
        self.events
            .lock()
            .expect("recording logger poisoned")
            .last()
            .cloned()
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().expect("recording logger poisoned").len()
    }

    /// Count of events with the given type.
    pub fn count_of(&self, event_type: &str) -> usize {
        self.events
            .lock()
            .expect("recording logger poisoned")
            .iter()
            .filter(|(ty, _)| ty == event_type)
            .count()
    }

    fn record(&self, event_type: &str, payload: String) {
        self.events
            .lock()
            .expect("recording logger poisoned")
            .push((event_type.to_string(), payload));
    }
}

impl Logger for RecordingLogger {
    fn set_time(&self, _now: SimTime) {}

    fn set_node_address(&self, _addr: NodeAddr) {}

    fn log_packet(&self, event_type: &str, msg: &Message) {
        self.record(event_type, format!("msg_type={}", msg.class_name()));
    }

    fn log_qubit_state(
        &self,
        kind: QnicKind,
        qnic_index: i32,
        qubit_index: usize,
        busy: bool,
        allocated: bool,
    ) {
        self.record(
            "QubitStateChange",
            format!("{kind} {qnic_index} {qubit_index} busy={busy} allocated={allocated}"),
        );
    }

    fn log_bell_pair(
        &self,
        verb: &str,
        partner_addr: NodeAddr,
        kind: QnicKind,
        qnic_index: i32,
        qubit_index: usize,
    ) {
        self.record(
            &format!("BellPair{verb}"),
            format!("partner={partner_addr} {kind} {qnic_index} {qubit_index}"),
        );
    }

    fn log_event(&self, event_type: &str, payload_json: &str) {
        self.record(event_type, payload_json.to_string());
    }
}

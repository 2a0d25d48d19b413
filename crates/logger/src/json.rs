//! JSON-lines logger.

use crate::{escape_json, Logger};
use qrep_messages::Message;
use qrep_types::{NodeAddr, QnicKind, SimTime};
use std::io::Write;
use std::sync::Mutex;
use tracing::warn;

/// Logger that writes one `{...}` JSON object per line to an injected sink.
pub struct JsonLogger {
    sink: Mutex<Box<dyn Write + Send>>,
    state: Mutex<LoggerState>,
}

#[derive(Default)]
struct LoggerState {
    now: SimTime,
    address: NodeAddr,
}

impl JsonLogger {
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Self {
            sink: Mutex::new(sink),
            state: Mutex::new(LoggerState::default()),
        }
    }

    fn write_line(&self, members: &str) {
        let mut sink = self.sink.lock().expect("logger sink poisoned");
        if let Err(err) = writeln!(sink, "{{{members}}}") {
            warn!(error = %err, "failed to write log record");
        }
    }

    fn stamp(&self) -> (f64, i32) {
        let state = self.state.lock().expect("logger state poisoned");
        (state.now.as_secs_f64(), state.address.0)
    }

    /// Render the message-specific members of a packet record.
    fn format_message(msg: &Message) -> String {
        match msg {
            Message::ConnectionSetupRequest(req) => format!(
                "\"msg_type\": \"ConnectionSetupRequest\", \"application_id\": {}, \
                 \"actual_dest_addr\": {}, \"actual_src_addr\": {}, \"num_measure\": {}, \
                 \"num_required_bell_pairs\": {}",
                req.application_id,
                req.actual_dest_addr,
                req.actual_src_addr,
                req.num_measure,
                req.number_of_required_bell_pairs,
            ),
            Message::RejectConnectionSetup(req) => format!(
                "\"msg_type\": \"RejectConnectionSetupRequest\", \"application_id\": {}, \
                 \"actual_dest_addr\": {}, \"actual_src_addr\": {}, \
                 \"num_required_bell_pairs\": {}",
                req.application_id,
                req.actual_dest_addr,
                req.actual_src_addr,
                req.number_of_required_bell_pairs,
            ),
            Message::ConnectionSetupResponse(resp) => {
                let indices: Vec<String> = resp
                    .stack_of_qnode_indexes
                    .iter()
                    .map(|addr| addr.to_string())
                    .collect();
                format!(
                    "\"msg_type\": \"ConnectionSetupResponse\", \"application_id\": {}, \
                     \"actual_dest_addr\": {}, \"actual_src_addr\": {}, \"ruleset_id\": {}, \
                     \"ruleset\": {}, \"application_type\": {}, \
                     \"stack_of_qnode_indices\": [{}]",
                    resp.application_id,
                    resp.actual_dest_addr,
                    resp.actual_src_addr,
                    resp.ruleset_id,
                    resp.ruleset,
                    resp.application_type,
                    indices.join(", "),
                )
            }
            other => format!(
                "\"msg_type\": \"Unknown\", \"msg_full_path\": \"{}\"",
                escape_json(other.class_name())
            ),
        }
    }
}

impl Logger for JsonLogger {
    fn set_time(&self, now: SimTime) {
        self.state.lock().expect("logger state poisoned").now = now;
    }

    fn set_node_address(&self, addr: NodeAddr) {
        self.state.lock().expect("logger state poisoned").address = addr;
    }

    fn log_packet(&self, event_type: &str, msg: &Message) {
        let (simtime, address) = self.stamp();
        self.write_line(&format!(
            "\"simtime\": {}, \"event_type\": \"{}\", \"address\": \"{}\", {}",
            simtime,
            escape_json(event_type),
            address,
            Self::format_message(msg),
        ));
    }

    fn log_qubit_state(
        &self,
        kind: QnicKind,
        qnic_index: i32,
        qubit_index: usize,
        busy: bool,
        allocated: bool,
    ) {
        let (simtime, address) = self.stamp();
        self.write_line(&format!(
            "\"simtime\": {}, \"event_type\": \"QubitStateChange\", \"address\": \"{}\", \
             \"qnic_type\": {}, \"qnic_index\": {}, \"qubit_index\": {}, \"busy\": {}, \
             \"allocated\": {}",
            simtime,
            address,
            kind.as_index(),
            qnic_index,
            qubit_index,
            busy,
            allocated,
        ));
    }

    fn log_bell_pair(
        &self,
        verb: &str,
        partner_addr: NodeAddr,
        kind: QnicKind,
        qnic_index: i32,
        qubit_index: usize,
    ) {
        let (simtime, address) = self.stamp();
        self.write_line(&format!(
            "\"simtime\": {}, \"event_type\": \"BellPair{}\", \"address\": \"{}\", \
             \"partner_addr\": {}, \"qnic_type\": {}, \"qnic_index\": {}, \"qubit_index\": {}",
            simtime,
            escape_json(verb),
            address,
            partner_addr,
            kind.as_index(),
            qnic_index,
            qubit_index,
        ));
    }

    fn log_event(&self, event_type: &str, payload_json: &str) {
        let (simtime, address) = self.stamp();
        self.write_line(&format!(
            "\"simtime\": {}, \"event_type\": \"{}\", \"address\": \"{}\", \
             \"event_payload\": {{{}}}",
            simtime,
            escape_json(event_type),
            address,
            payload_json,
        ));
    }
}

//! Connection manager state machine.

use crate::config::{ConfigError, ConnectionManagerConfig};
use crate::purify::PurType;
use crate::routing::RoutingDaemon;
use crate::synthesis::synthesize_swap_tree;
use qrep_core::{KernelPort, TimerHandle, ROUTER_PORT};
use qrep_logger::Logger;
use qrep_messages::{
    ConnectionSetupRequest, ConnectionSetupResponse, InternalRuleSetForwarding,
    InternalRuleSetForwardingApplication, Message, MessageOrigin, QnicPairInfo,
    RejectConnectionSetupRequest, RequestRetryTimer,
};
use qrep_types::QnicAddr;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Channel classification of an incoming control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmEventChannel {
    InternalTimer,
    ProtocolMessage,
    Unknown,
}

/// Protocol classification of an incoming control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmProtocolType {
    Unknown,
    SetupRequest,
    SetupResponse,
    RejectSetupRequest,
}

/// Self-timer classification of an incoming control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmSelfTiming {
    NotSelfMessage,
    Known(QnicAddr),
    UnknownIndex,
}

/// Result of the incoming-message decode stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedCmEvent {
    pub channel: CmEventChannel,
    pub protocol_type: CmProtocolType,
    pub self_timing: CmSelfTiming,
}

/// Per-egress-interface request relay state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryState {
    #[default]
    Idle,
    Queued,
    AwaitingRetry,
    Relaying,
    Rejected,
}

/// Deduplication record for one connection session.
#[derive(Debug, Clone, Copy)]
struct ResponseState {
    latest_attempt: i32,
    accepted_for_latest: bool,
}

impl Default for ResponseState {
    fn default() -> Self {
        Self {
            latest_attempt: -1,
            accepted_for_latest: false,
        }
    }
}

/// Control-plane manager for connection setup.
///
/// Runs beside the rule engine on every node, communicating with it only
/// through internal forwarding messages on the router port.
pub struct ConnectionManager<K: KernelPort> {
    config: ConnectionManagerConfig,
    kernel: K,
    routing: Box<dyn RoutingDaemon>,
    logger: Arc<dyn Logger>,
    purification_type: PurType,

    /// Pending setup requests per egress interface.
    setup_buffer: HashMap<QnicAddr, VecDeque<ConnectionSetupRequest>>,
    retry_count: HashMap<QnicAddr, u32>,
    retry_state: HashMap<QnicAddr, RetryState>,
    retry_timers: HashMap<QnicAddr, TimerHandle>,
    /// Reserved egress interfaces; the single source of truth for busyness.
    reserved_qnics: Vec<QnicAddr>,
    /// Which interface each in-flight session reserved, for release on the
    /// terminal outcome.
    reserved_by_session: HashMap<i32, QnicAddr>,
    /// Response dedup per session.
    response_state: HashMap<i32, ResponseState>,

    ruleset_id_counter: u64,
    /// Test override for ruleset id generation.
    ruleset_id_override: Option<u64>,
}

impl<K: KernelPort> ConnectionManager<K> {
    pub fn new(
        config: ConnectionManagerConfig,
        kernel: K,
        routing: Box<dyn RoutingDaemon>,
        logger: Arc<dyn Logger>,
    ) -> Result<Self, ConfigError> {
        let purification_type = config.purification_type()?;
        logger.set_node_address(config.address);
        Ok(Self {
            config,
            kernel,
            routing,
            logger,
            purification_type,
            setup_buffer: HashMap::new(),
            retry_count: HashMap::new(),
            retry_state: HashMap::new(),
            retry_timers: HashMap::new(),
            reserved_qnics: Vec::new(),
            reserved_by_session: HashMap::new(),
            response_state: HashMap::new(),
            ruleset_id_counter: 0,
            ruleset_id_override: None,
        })
    }

    /// Pin ruleset id generation, for reproducible tests.
    pub fn set_fixed_ruleset_id(&mut self, id: u64) {
        self.ruleset_id_override = Some(id);
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn kernel_mut(&mut self) -> &mut K {
        &mut self.kernel
    }

    pub fn purification_type(&self) -> PurType {
        self.purification_type
    }

    pub fn retry_state(&self, qnic_addr: QnicAddr) -> RetryState {
        self.retry_state.get(&qnic_addr).copied().unwrap_or_default()
    }

    pub fn create_unique_id(&mut self) -> u64 {
        if let Some(id) = self.ruleset_id_override {
            return id;
        }
        self.ruleset_id_counter += 1;
        self.ruleset_id_counter
    }

    // ── Reservation ──────────────────────────────────────────────────

    pub fn reserve_qnic(&mut self, qnic_addr: QnicAddr) {
        if !self.reserved_qnics.contains(&qnic_addr) {
            self.reserved_qnics.push(qnic_addr);
        }
    }

    pub fn release_qnic(&mut self, qnic_addr: QnicAddr) {
        self.reserved_qnics.retain(|addr| *addr != qnic_addr);
    }

    pub fn is_qnic_busy(&self, qnic_addr: QnicAddr) -> bool {
        self.reserved_qnics.contains(&qnic_addr)
    }

    pub fn reserved_qnics(&self) -> &[QnicAddr] {
        &self.reserved_qnics
    }

    // ── Incoming dispatch ────────────────────────────────────────────

    /// Classify an incoming message without acting on it.
    pub fn decode_incoming_message(&self, msg: &Message, origin: MessageOrigin) -> DecodedCmEvent {
        if origin == MessageOrigin::SelfTimer {
            if let Message::RequestRetryTimer(timer) = msg {
                let known = self.retry_state.contains_key(&timer.qnic_address)
                    || self.setup_buffer.contains_key(&timer.qnic_address);
                return DecodedCmEvent {
                    channel: CmEventChannel::InternalTimer,
                    protocol_type: CmProtocolType::Unknown,
                    self_timing: if known {
                        CmSelfTiming::Known(timer.qnic_address)
                    } else {
                        CmSelfTiming::UnknownIndex
                    },
                };
            }
        }
        let protocol_type = match msg {
            Message::ConnectionSetupRequest(_) => CmProtocolType::SetupRequest,
            Message::ConnectionSetupResponse(_) => CmProtocolType::SetupResponse,
            Message::RejectConnectionSetup(_) => CmProtocolType::RejectSetupRequest,
            _ => CmProtocolType::Unknown,
        };
        DecodedCmEvent {
            channel: if protocol_type == CmProtocolType::Unknown {
                CmEventChannel::Unknown
            } else {
                CmEventChannel::ProtocolMessage
            },
            protocol_type,
            self_timing: CmSelfTiming::NotSelfMessage,
        }
    }

    /// Process one delivered control message.
    pub fn handle_message(&mut self, msg: &Message, origin: MessageOrigin) {
        self.logger.set_time(self.kernel.now());
        let decoded = self.decode_incoming_message(msg, origin);
        match decoded.channel {
            CmEventChannel::InternalTimer => match decoded.self_timing {
                CmSelfTiming::Known(qnic_addr) => self.handle_self_timing(qnic_addr),
                _ => self.handle_unknown_control_message(msg),
            },
            CmEventChannel::ProtocolMessage => match (decoded.protocol_type, msg) {
                (CmProtocolType::SetupRequest, Message::ConnectionSetupRequest(req)) => {
                    self.handle_setup_request(req)
                }
                (CmProtocolType::SetupResponse, Message::ConnectionSetupResponse(resp)) => {
                    self.handle_setup_response(resp)
                }
                (CmProtocolType::RejectSetupRequest, Message::RejectConnectionSetup(pk)) => {
                    self.handle_reject(pk)
                }
                _ => self.handle_unknown_control_message(msg),
            },
            CmEventChannel::Unknown => self.handle_unknown_control_message(msg),
        }
    }

    fn handle_unknown_control_message(&mut self, msg: &Message) {
        warn!(class = msg.class_name(), "unknown control message");
        self.logger.log_packet("unknown_control_message", msg);
    }

    // ── Requests ─────────────────────────────────────────────────────

    fn handle_setup_request(&mut self, req: &ConnectionSetupRequest) {
        self.logger.log_packet("ConnectionSetupRequest", &Message::ConnectionSetupRequest(req.clone()));
        if req.actual_dest_addr == self.config.address {
            self.respond_to_request(req);
        } else {
            self.try_relay_request_to_next_hop(req);
        }
    }

    /// Responder role: synthesize the swap tree and answer every
    /// participant.
    pub fn respond_to_request(&mut self, req: &ConnectionSetupRequest) {
        // The egress toward the previous hop stays reserved while the
        // responses are produced.
        let local_qnic = self.routing.find_qnic_addr_by_dest_addr(req.src_addr);
        let Some(local_qnic) = local_qnic else {
            warn!(src = %req.src_addr, "no route back toward the requester");
            self.reject_request(req);
            return;
        };
        self.reserve_qnic(local_qnic);

        let mut path = req.stack_of_qnode_indexes.clone();
        path.push(self.config.address);

        let ruleset_id = self.create_unique_id();
        let rulesets = synthesize_swap_tree(ruleset_id, &path, req.num_measure);
        debug!(
            ruleset_id,
            participants = rulesets.len(),
            "responding to connection setup"
        );

        for (node, ruleset) in rulesets {
            let response = ConnectionSetupResponse {
                application_id: req.application_id,
                actual_src_addr: self.config.address,
                actual_dest_addr: req.actual_src_addr,
                src_addr: self.config.address,
                dest_addr: node,
                ruleset_id,
                ruleset: ruleset.to_json(),
                application_type: 0,
                stack_of_qnode_indexes: req.stack_of_qnode_indexes.clone(),
                connection_session_id: req.connection_session_id,
                connection_attempt: req.connection_attempt,
            };
            let message = Message::ConnectionSetupResponse(response);
            self.logger.log_packet("ConnectionSetupResponse", &message);
            self.kernel.send(message, ROUTER_PORT);
        }

        // Accepted is a terminal outcome for the setup attempt.
        self.release_qnic(local_qnic);
    }

    /// Initiator/intermediate role: queue the request on its egress
    /// interface and relay when the interface is free.
    fn try_relay_request_to_next_hop(&mut self, req: &ConnectionSetupRequest) {
        let Some(egress) = self
            .routing
            .find_qnic_addr_by_dest_addr(req.actual_dest_addr)
        else {
            warn!(dest = %req.actual_dest_addr, "no route toward destination; rejecting");
            self.reject_request(req);
            return;
        };

        self.setup_buffer
            .entry(egress)
            .or_default()
            .push_back(req.clone());
        self.retry_state.insert(egress, RetryState::Queued);
        self.initiate_application_request(egress);
    }

    /// Attempt to send the head-of-line request on one egress interface.
    fn initiate_application_request(&mut self, egress: QnicAddr) {
        let Some(req) = self
            .setup_buffer
            .get(&egress)
            .and_then(|queue| queue.front())
            .cloned()
        else {
            self.retry_state.insert(egress, RetryState::Idle);
            return;
        };

        if self.is_qnic_busy(egress) {
            self.schedule_request_retry(egress);
            return;
        }

        self.reserve_qnic(egress);
        self.reserved_by_session
            .insert(req.connection_session_id, egress);
        self.retry_state.insert(egress, RetryState::Relaying);
        self.pop_application_request(egress);
        self.relay_request(req, egress);
    }

    fn relay_request(&mut self, mut req: ConnectionSetupRequest, egress: QnicAddr) {
        // Append this node to the accumulated path before passing the
        // request along.
        let left = self
            .routing
            .find_qnic_addr_by_dest_addr(req.src_addr)
            .and_then(|addr| self.routing.local_qnic(addr));
        let right = self.routing.local_qnic(egress);
        if let Some(right) = right {
            req.stack_of_qnode_indexes.push(self.config.address);
            req.stack_of_qnics.push(QnicPairInfo { left, right });
        }
        req.src_addr = self.config.address;

        trace!(dest = %req.actual_dest_addr, %egress, "relaying setup request");
        self.kernel
            .send(Message::ConnectionSetupRequest(req), ROUTER_PORT);
    }

    fn pop_application_request(&mut self, egress: QnicAddr) {
        if let Some(queue) = self.setup_buffer.get_mut(&egress) {
            queue.pop_front();
            if queue.is_empty() {
                self.setup_buffer.remove(&egress);
            }
        }
    }

    fn schedule_request_retry(&mut self, egress: QnicAddr) {
        let count = self.retry_count.entry(egress).or_insert(0);
        *count += 1;
        let backoff = self.config.request_retry_interval * *count;
        self.retry_state.insert(egress, RetryState::AwaitingRetry);
        let when = self.kernel.now() + backoff;
        let handle = self.kernel.schedule_at(
            when,
            Message::RequestRetryTimer(RequestRetryTimer {
                qnic_address: egress,
            }),
        );
        self.retry_timers.insert(egress, handle);
    }

    /// A retry timer fired: try the head-of-line request again.
    pub fn handle_self_timing(&mut self, egress: QnicAddr) {
        self.retry_timers.remove(&egress);
        self.initiate_application_request(egress);
    }

    /// Refuse a request, unwinding toward the initiator.
    fn reject_request(&mut self, req: &ConnectionSetupRequest) {
        let reject = RejectConnectionSetupRequest {
            application_id: req.application_id,
            actual_src_addr: req.actual_src_addr,
            actual_dest_addr: req.actual_dest_addr,
            number_of_required_bell_pairs: req.number_of_required_bell_pairs,
        };
        let message = Message::RejectConnectionSetup(reject);
        self.logger
            .log_packet("RejectConnectionSetupRequest", &message);
        if let Some(egress) = self.reserved_by_session.remove(&req.connection_session_id) {
            self.release_qnic(egress);
            self.retry_state.insert(egress, RetryState::Rejected);
        }
        self.kernel.send(message, ROUTER_PORT);
    }

    // ── Responses ────────────────────────────────────────────────────

    fn handle_setup_response(&mut self, resp: &ConnectionSetupResponse) {
        // A response reaching this node is a terminal outcome for any
        // reservation its session holds here.
        if let Some(egress) = self
            .reserved_by_session
            .remove(&resp.connection_session_id)
        {
            self.release_qnic(egress);
            self.retry_state.insert(egress, RetryState::Idle);
            self.initiate_application_request(egress);
        }

        if resp.actual_dest_addr == self.config.address {
            self.store_ruleset_for_application(resp);
        } else {
            self.store_ruleset(resp);
        }
    }

    /// Accept iff `(session, attempt)` is strictly newer than anything seen
    /// for the session. Legacy responses (`session == 0`) always pass.
    pub fn should_accept_connection_setup_response(
        &mut self,
        resp: &ConnectionSetupResponse,
    ) -> bool {
        if self.is_legacy_connection_session_response(resp) {
            return true;
        }
        let state = self
            .response_state
            .entry(resp.connection_session_id)
            .or_default();
        if resp.connection_attempt > state.latest_attempt {
            state.latest_attempt = resp.connection_attempt;
            state.accepted_for_latest = true;
            true
        } else {
            trace!(
                session = resp.connection_session_id,
                attempt = resp.connection_attempt,
                latest = state.latest_attempt,
                "discarding duplicate or stale setup response"
            );
            false
        }
    }

    pub fn is_legacy_connection_session_response(&self, resp: &ConnectionSetupResponse) -> bool {
        resp.connection_session_id == 0
    }

    /// Forward an accepted RuleSet to the engine (routing/relay node).
    pub fn store_ruleset(&mut self, resp: &ConnectionSetupResponse) {
        if !self.should_accept_connection_setup_response(resp) {
            return;
        }
        self.logger.log_packet(
            "ConnectionSetupResponse",
            &Message::ConnectionSetupResponse(resp.clone()),
        );
        let forwarding = InternalRuleSetForwarding {
            ruleset_id: resp.ruleset_id,
            ruleset: resp.ruleset.clone(),
        };
        self.kernel
            .send(Message::RuleSetForwarding(forwarding), ROUTER_PORT);
    }

    /// Forward an accepted RuleSet to the engine with the application tag
    /// (initiator endpoint).
    pub fn store_ruleset_for_application(&mut self, resp: &ConnectionSetupResponse) {
        if !self.should_accept_connection_setup_response(resp) {
            return;
        }
        self.logger.log_packet(
            "ConnectionSetupResponse",
            &Message::ConnectionSetupResponse(resp.clone()),
        );
        let forwarding = InternalRuleSetForwardingApplication {
            ruleset_id: resp.ruleset_id,
            ruleset: resp.ruleset.clone(),
            application_type: resp.application_type,
        };
        self.kernel.send(
            Message::RuleSetForwardingApplication(forwarding),
            ROUTER_PORT,
        );
    }

    // ── Rejections ───────────────────────────────────────────────────

    fn handle_reject(&mut self, pk: &RejectConnectionSetupRequest) {
        self.logger.log_packet(
            "RejectConnectionSetupRequest",
            &Message::RejectConnectionSetup(pk.clone()),
        );
        if pk.actual_src_addr == self.config.address {
            self.initiator_reject_req_handler(pk);
        } else if pk.actual_dest_addr == self.config.address {
            self.responder_reject_req_handler(pk);
        } else {
            self.intermediate_reject_req_handler(pk);
        }
    }

    /// The initiator releases its egress toward the refused responder.
    fn initiator_reject_req_handler(&mut self, pk: &RejectConnectionSetupRequest) {
        if let Some(egress) = self
            .routing
            .find_qnic_addr_by_dest_addr(pk.actual_dest_addr)
        {
            self.release_qnic(egress);
            self.reserved_by_session.retain(|_, addr| *addr != egress);
            self.retry_state.insert(egress, RetryState::Rejected);
        }
    }

    /// The responder releases its ingress-side reservation.
    fn responder_reject_req_handler(&mut self, pk: &RejectConnectionSetupRequest) {
        if let Some(qnic) = self.routing.find_qnic_addr_by_dest_addr(pk.actual_src_addr) {
            self.release_qnic(qnic);
        }
    }

    /// Intermediates unwind their reservation and pass the rejection along
    /// toward the initiator.
    fn intermediate_reject_req_handler(&mut self, pk: &RejectConnectionSetupRequest) {
        if let Some(egress) = self
            .routing
            .find_qnic_addr_by_dest_addr(pk.actual_dest_addr)
        {
            self.release_qnic(egress);
            self.reserved_by_session.retain(|_, addr| *addr != egress);
            self.retry_state.insert(egress, RetryState::Rejected);
        }
        self.kernel
            .send(Message::RejectConnectionSetup(pk.clone()), ROUTER_PORT);
    }
}

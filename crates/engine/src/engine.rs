//! Rule engine orchestration.

use crate::config::EngineConfig;
use crate::handlers;
use crate::hardware::RealtimeController;
use crate::msm::MsmInfo;
use qrep_backend::{BackendFacade, QubitHandle};
use qrep_core::{
    EventBus, KernelPort, ProtocolFamily, RuleEvent, RuleEventChannel, RuleEventKind, TimerHandle,
    ROUTER_PORT,
};
use qrep_logger::{escape_json, Logger};
use qrep_messages::{
    BsmTimingNotification, CombinedBsaResults, EmitPhotonRequest, EppsTimingNotification, Message,
    MessageOrigin, MsmResult, PurificationResult, SingleClickResult, StopEmitting,
    StopEppsEmission, SwappingResult,
};
use qrep_rules::RuleSet;
use qrep_runtime::RuntimeFacade;
use qrep_storage::{BellPairStore, QNicStore};
use qrep_types::{NodeAddr, PauliOperator, QnicKind, QubitKey, PULSE_BEGIN, PULSE_END};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Wire tag carried on MSM result messages.
const MSM_RESULT_MESSAGE_KIND: i32 = 6;

/// What the caller should do with the raw message after handling.
///
/// Handlers that reschedule the source message (self timers, the photon
/// emission loop) keep it alive; everything else is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDisposition {
    Release,
    Keep,
}

/// Protocol event handler. Plain function pointers keep the dispatch tables
/// `Copy`, so dispatch never aliases the engine borrow.
pub type RuleEventHandler<K> = fn(&mut RuleEngine<K>, &RuleEvent);

/// The per-node protocol engine.
pub struct RuleEngine<K: KernelPort> {
    config: EngineConfig,
    kernel: K,
    logger: Arc<dyn Logger>,
    event_bus: EventBus,
    qnic_store: QNicStore,
    bell_pair_store: BellPairStore,
    runtimes: RuntimeFacade,
    backend: BackendFacade,
    hardware: Box<dyn RealtimeController>,

    /// Per-interface MSM session state, keyed by interface index.
    msm_info: HashMap<i32, MsmInfo>,
    /// Emission order of in-flight photons per interface.
    emitted_photon_order: HashMap<(QnicKind, i32), Vec<usize>>,
    /// Stored emission request per interface, re-armed for each train.
    emit_photon_requests: HashMap<(QnicKind, i32), EmitPhotonRequest>,
    /// Pending emission timer per interface.
    emit_photon_timers: HashMap<(QnicKind, i32), TimerHandle>,

    handlers: HashMap<(RuleEventKind, ProtocolFamily), RuleEventHandler<K>>,
    kind_fallbacks: HashMap<RuleEventKind, RuleEventHandler<K>>,
    family_fallbacks: HashMap<ProtocolFamily, RuleEventHandler<K>>,
}

impl<K: KernelPort> RuleEngine<K> {
    pub fn new(
        config: EngineConfig,
        kernel: K,
        backend: BackendFacade,
        hardware: Box<dyn RealtimeController>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        logger.set_node_address(config.address);
        let qnic_store = QNicStore::new(&config.qnic_counts(), logger.clone());
        let bell_pair_store = BellPairStore::new(logger.clone());

        let mut emit_photon_requests = HashMap::new();
        for (kind, index) in config.interfaces() {
            emit_photon_requests.insert(
                (kind, index),
                EmitPhotonRequest {
                    qnic_kind: kind,
                    qnic_index: index,
                    interval_between_photons: qrep_types::SimTime::ZERO,
                    msm: false,
                    first: true,
                },
            );
        }

        let mut engine = Self {
            config,
            kernel,
            logger,
            event_bus: EventBus::new(),
            qnic_store,
            bell_pair_store,
            runtimes: RuntimeFacade::new(),
            backend,
            hardware,
            msm_info: HashMap::new(),
            emitted_photon_order: HashMap::new(),
            emit_photon_requests,
            emit_photon_timers: HashMap::new(),
            handlers: HashMap::new(),
            kind_fallbacks: HashMap::new(),
            family_fallbacks: HashMap::new(),
        };
        handlers::register_defaults(&mut engine);
        engine
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn address(&self) -> NodeAddr {
        self.config.address
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn kernel_mut(&mut self) -> &mut K {
        &mut self.kernel
    }

    pub fn event_bus_mut(&mut self) -> &mut EventBus {
        &mut self.event_bus
    }

    pub fn qnic_store(&self) -> &QNicStore {
        &self.qnic_store
    }

    pub fn qnic_store_mut(&mut self) -> &mut QNicStore {
        &mut self.qnic_store
    }

    pub fn bell_pair_store(&self) -> &BellPairStore {
        &self.bell_pair_store
    }

    pub fn bell_pair_store_mut(&mut self) -> &mut BellPairStore {
        &mut self.bell_pair_store
    }

    pub fn runtimes(&self) -> &RuntimeFacade {
        &self.runtimes
    }

    pub fn runtimes_mut(&mut self) -> &mut RuntimeFacade {
        &mut self.runtimes
    }

    pub fn msm_info(&self, qnic_index: i32) -> Option<&MsmInfo> {
        self.msm_info.get(&qnic_index)
    }

    pub fn msm_info_mut(&mut self, qnic_index: i32) -> &mut MsmInfo {
        self.msm_info.entry(qnic_index).or_default()
    }

    // ── Handler registration ─────────────────────────────────────────

    pub fn register_handler(
        &mut self,
        kind: RuleEventKind,
        family: ProtocolFamily,
        handler: RuleEventHandler<K>,
    ) {
        self.handlers.insert((kind, family), handler);
    }

    pub fn register_kind_fallback(&mut self, kind: RuleEventKind, handler: RuleEventHandler<K>) {
        self.kind_fallbacks.insert(kind, handler);
    }

    pub fn register_family_fallback(
        &mut self,
        family: ProtocolFamily,
        handler: RuleEventHandler<K>,
    ) {
        self.family_fallbacks.insert(family, handler);
    }

    pub fn has_exact_handler(&self, kind: RuleEventKind, family: ProtocolFamily) -> bool {
        self.handlers.contains_key(&(kind, family))
    }

    pub fn has_kind_fallback(&self, kind: RuleEventKind) -> bool {
        self.kind_fallbacks.contains_key(&kind)
    }

    pub fn has_family_fallback(&self, family: ProtocolFamily) -> bool {
        self.family_fallbacks.contains_key(&family)
    }

    // ── Main entry point ─────────────────────────────────────────────

    /// Process one delivered message end to end.
    pub fn handle_message(&mut self, msg: &Message, origin: MessageOrigin) -> MessageDisposition {
        self.exec_all_rulesets();

        let now = self.kernel.now();
        self.logger.set_time(now);
        let event_number = self.kernel.event_number();
        self.event_bus.publish_message(msg, origin, now, event_number);

        let mut keep_message = false;
        for event in self.event_bus.drain(now) {
            keep_message = keep_message
                || event.channel == RuleEventChannel::InternalTimer
                || event.keep_source;
            self.handle_rule_event(&event);
        }

        for (kind, index) in self.config.interfaces() {
            self.runtimes.allocate_resources(
                &mut self.qnic_store,
                &self.bell_pair_store,
                kind,
                index,
            );
        }

        self.exec_all_rulesets();

        if keep_message {
            MessageDisposition::Keep
        } else {
            MessageDisposition::Release
        }
    }

    /// Dispatch a single event through the two-tier table.
    pub fn handle_rule_event(&mut self, event: &RuleEvent) {
        // Unknown protocol value is tracked separately from unknown event
        // kind: it is logged even when a handler was found.
        let protocol_unknown = event.protocol_family == ProtocolFamily::Unknown;
        let log_unknown_protocol = protocol_unknown && event.kind != RuleEventKind::Unknown;

        if let Some(handler) = self
            .handlers
            .get(&(event.kind, event.protocol_family))
            .copied()
        {
            handler(self, event);
            if log_unknown_protocol {
                self.log_unknown_rule_protocol(event);
            }
            return;
        }

        if let Some(handler) = self.kind_fallbacks.get(&event.kind).copied() {
            handler(self, event);
            if log_unknown_protocol {
                self.log_unknown_rule_protocol(event);
            }
            return;
        }

        if let Some(handler) = self.family_fallbacks.get(&event.protocol_family).copied() {
            handler(self, event);
            if log_unknown_protocol {
                self.log_unknown_rule_protocol(event);
            }
            return;
        }

        if event.kind == RuleEventKind::Unknown {
            self.log_unknown_rule_event(event);
        } else {
            self.log_unknown_rule_protocol(event);
        }
    }

    pub fn exec_all_rulesets(&mut self) {
        self.runtimes.exec();
    }

    // ── Diagnostics ──────────────────────────────────────────────────

    fn unknown_event_payload(&self, event: &RuleEvent, event_type: &str) -> String {
        format!(
            "\"simtime\": {}, \"event_number\": {}, \"event_type\": \"{}\", \
             \"protocol_family\": \"{}\", \"execution_path\": \"{}\", \
             \"protocol_raw_value\": \"{}\", \"msg_name\": \"{}\", \"msg_type\": \"{}\", \
             \"qnode_addr\": {}",
            event.time.as_secs_f64(),
            event.event_number,
            event_type,
            event.protocol_family,
            event.execution_path,
            escape_json(&event.protocol_raw_value),
            escape_json(&event.msg_name),
            escape_json(&event.msg_type),
            self.config.address,
        )
    }

    pub(crate) fn log_unknown_rule_event(&mut self, event: &RuleEvent) {
        let payload = self.unknown_event_payload(event, "UNKNOWN");
        self.logger.log_event("unknown_rule_event", &payload);
    }

    pub(crate) fn log_unknown_rule_protocol(&mut self, event: &RuleEvent) {
        let payload = self.unknown_event_payload(event, &(event.kind as i32).to_string());
        self.logger.log_event("unknown_rule_protocol", &payload);
    }

    // ── Photon train control ─────────────────────────────────────────

    /// (Re)arm the emission request for a MIM train and schedule its first
    /// photon. A resumed train starts fresh with a BEGIN pulse.
    pub fn schedule_photon_emission(
        &mut self,
        kind: QnicKind,
        qnic_index: i32,
        notification: &BsmTimingNotification,
    ) {
        let Some(request) = self.emit_photon_requests.get_mut(&(kind, qnic_index)) else {
            return;
        };
        request.first = true;
        request.msm = false;
        request.interval_between_photons = notification.interval;
        let message = Message::EmitPhotonRequest(request.clone());
        let handle = self
            .kernel
            .schedule_at(notification.first_photon_emit_time, message);
        self.emit_photon_timers.insert((kind, qnic_index), handle);
    }

    /// (Re)arm the emission request for an MSM round.
    pub fn schedule_msm_photon_emission(
        &mut self,
        kind: QnicKind,
        qnic_index: i32,
        notification: &EppsTimingNotification,
    ) {
        let Some(request) = self.emit_photon_requests.get_mut(&(kind, qnic_index)) else {
            return;
        };
        request.first = true;
        request.msm = true;
        request.interval_between_photons = notification.interval;
        let message = Message::EmitPhotonRequest(request.clone());
        let handle = self
            .kernel
            .schedule_at(notification.first_photon_emit_time, message);
        self.emit_photon_timers.insert((kind, qnic_index), handle);
    }

    /// Cancel the pending emission timer for one interface. Safe to call
    /// repeatedly; a missing timer is ignored.
    pub fn stop_on_going_photon_emission(&mut self, kind: QnicKind, qnic_index: i32) {
        if let Some(handle) = self.emit_photon_timers.remove(&(kind, qnic_index)) {
            self.kernel.cancel(handle);
        }
    }

    /// Reinitialize and free every qubit recorded in the emission order log
    /// of one interface.
    pub fn free_failed_entanglement_attempt_qubits(&mut self, kind: QnicKind, qnic_index: i32) {
        let emitted = self
            .emitted_photon_order
            .remove(&(kind, qnic_index))
            .unwrap_or_default();
        for qubit_index in emitted {
            self.hardware.reinitialize_qubit(kind, qnic_index, qubit_index);
            if let Err(err) = self
                .qnic_store
                .set_qubit_busy(kind, qnic_index, qubit_index, false)
            {
                warn!(%err, "failed to free emitted qubit");
            }
        }
    }

    /// Fire a photon pulse and record emission order (pair-source
    /// interfaces track photons through MSM state instead).
    pub fn send_emit_photon_signal(
        &mut self,
        kind: QnicKind,
        qnic_index: i32,
        qubit_index: usize,
        is_first: bool,
        is_last: bool,
    ) {
        let mut pulse = 0u8;
        if is_first {
            pulse |= PULSE_BEGIN;
        }
        if is_last {
            pulse |= PULSE_END;
        }
        self.hardware.emit_photon(kind, qnic_index, qubit_index, pulse);
        if kind != QnicKind::Rp {
            self.emitted_photon_order
                .entry((kind, qnic_index))
                .or_default()
                .push(qubit_index);
        }
    }

    /// Release a qubit consumed by a RuleSet action: reinitialize it, clear
    /// its flags, and drop its bell-pair record.
    pub fn free_consumed_resource(&mut self, qubit: QubitKey) {
        self.hardware
            .reinitialize_qubit(qubit.kind, qubit.qnic_index, qubit.qubit_index);
        if let Err(err) =
            self.qnic_store
                .set_qubit_busy(qubit.kind, qubit.qnic_index, qubit.qubit_index, false)
        {
            warn!(%err, "failed to free consumed qubit");
        }
        if self.qnic_store.is_allocated(qubit) {
            self.qnic_store.set_qubit_allocated(qubit, false);
        }
        self.bell_pair_store.erase_qubit(qubit);
    }

    fn qubit_handle(&self, qubit: QubitKey) -> QubitHandle {
        QubitHandle {
            node_id: self.config.address.0,
            qnic_index: qubit.qnic_index,
            qnic_type: qubit.kind.as_index(),
            qubit_index: qubit.qubit_index as i32,
        }
    }

    fn apply_correction(&mut self, qubit: QubitKey, correction: PauliOperator) {
        let gate = match correction {
            PauliOperator::I => return,
            PauliOperator::X => "X",
            PauliOperator::Y => "Y",
            PauliOperator::Z => "Z",
        };
        let handle = self.qubit_handle(qubit);
        let now = self.kernel.now();
        let result = self.backend.apply_gate(now, gate, &[handle]);
        if !result.success {
            warn!(gate, ?qubit, message = %result.message, "correction gate failed");
        }
    }

    // ── MIM protocol ─────────────────────────────────────────────────

    /// A midpoint analyzer dispatched new round timing: cancel the current
    /// train, free its qubits, and schedule the new one.
    pub(crate) fn on_bsm_timing(&mut self, notification: &BsmTimingNotification) {
        let kind = notification.qnic_kind;
        let qnic_index = notification.qnic_index;
        self.stop_on_going_photon_emission(kind, qnic_index);
        self.free_failed_entanglement_attempt_qubits(kind, qnic_index);
        self.schedule_photon_emission(kind, qnic_index, notification);
    }

    /// Resolve heralded photons into entangled pairs and apply the
    /// announced corrections.
    pub(crate) fn on_bsm_result(&mut self, result: &CombinedBsaResults) {
        let kind = result.qnic_kind;
        let qnic_index = result.qnic_index;
        let partner = result.neighbor_address;

        for i in (0..result.success_count()).rev() {
            let emitted_index = result.successful_photon_indices[i];
            let qubit_index = {
                let Some(emitted) = self.emitted_photon_order.get_mut(&(kind, qnic_index)) else {
                    warn!(qnic_index, "BSM result for interface with no emitted photons");
                    return;
                };
                if emitted_index >= emitted.len() {
                    warn!(
                        emitted_index,
                        in_flight = emitted.len(),
                        "BSM result names an unknown photon index"
                    );
                    continue;
                }
                emitted.remove(emitted_index)
            };

            let qubit = QubitKey::new(kind, qnic_index, qubit_index);
            self.bell_pair_store.insert_entangled_qubit(partner, qubit);

            let correction = result
                .correction_operations
                .get(i)
                .copied()
                .unwrap_or(PauliOperator::I);
            self.apply_correction(qubit, correction);
        }
    }

    // ── MSM protocol ─────────────────────────────────────────────────

    /// Cache link parameters announced by the pair source and restart the
    /// emission round.
    pub(crate) fn on_epps_timing(&mut self, notification: &EppsTimingNotification) {
        let qnic_index = notification.qnic_index;
        {
            let msm_info = self.msm_info.entry(qnic_index).or_default();
            msm_info.partner_address = notification.other_qnic_parent_addr;
            msm_info.partner_qnic_index = notification.other_qnic_index;
            msm_info.epps_address = notification.epps_addr;
            msm_info.total_travel_time = notification.total_travel_time;
        }
        self.stop_on_going_photon_emission(QnicKind::Rp, qnic_index);
        self.schedule_msm_photon_emission(QnicKind::Rp, qnic_index, notification);
    }

    /// One tick of the photon emission loop.
    pub(crate) fn on_emit_photon_request(&mut self, request: &EmitPhotonRequest) {
        let kind = request.qnic_kind;
        let qnic_index = request.qnic_index;
        let free_emitters = self.qnic_store.count_num_free_qubits(kind, qnic_index);
        let qubit_index = self.qnic_store.take_free_qubit_index(kind, qnic_index);

        if request.msm {
            let (photon_index, partner_qnic_index, partner_address) = {
                let msm_info = self.msm_info.entry(qnic_index).or_default();
                msm_info.photon_index_counter += 1;
                (
                    msm_info.photon_index_counter,
                    msm_info.partner_qnic_index,
                    msm_info.partner_address,
                )
            };
            match qubit_index {
                Some(qubit_index) => {
                    let msm_info = self.msm_info.entry(qnic_index).or_default();
                    let iteration = msm_info.iteration_index;
                    msm_info.qubit_info.insert(iteration, qubit_index);
                    self.send_emit_photon_signal(kind, qnic_index, qubit_index, true, true);
                }
                None => {
                    // No free memory for this slot: tell the partner this
                    // photon index cannot succeed.
                    let msm_result = MsmResult {
                        qnic_index: partner_qnic_index,
                        qnic_kind: QnicKind::Rp,
                        photon_index,
                        success: false,
                        correction_operation: PauliOperator::I,
                        src_addr: self.config.address,
                        dest_addr: partner_address,
                        kind: MSM_RESULT_MESSAGE_KIND,
                    };
                    self.kernel.send(Message::MsmResult(msm_result), ROUTER_PORT);
                }
            }
            let when = self.kernel.now() + request.interval_between_photons;
            let handle = self
                .kernel
                .schedule_at(when, Message::EmitPhotonRequest(request.clone()));
            self.emit_photon_timers.insert((kind, qnic_index), handle);
        } else {
            let Some(qubit_index) = qubit_index else {
                trace!(qnic_index, "no free qubit; emission train stops");
                return;
            };
            let is_first = request.first;
            let is_last = free_emitters == 1;
            if let Some(stored) = self.emit_photon_requests.get_mut(&(kind, qnic_index)) {
                stored.first = false;
            }
            self.send_emit_photon_signal(kind, qnic_index, qubit_index, is_first, is_last);
            if !is_last {
                let mut next = request.clone();
                next.first = false;
                let when = self.kernel.now() + request.interval_between_photons;
                let handle = self.kernel.schedule_at(when, Message::EmitPhotonRequest(next));
                self.emit_photon_timers.insert((kind, qnic_index), handle);
            }
        }
    }

    /// Post-process the local detector click and notify the partner.
    pub(crate) fn on_single_click_result(&mut self, click: &SingleClickResult) {
        let qnic_index = click.qnic_index;
        let (qubit_index, photon_index, partner_qnic_index, partner_address) = {
            let msm_info = self.msm_info.entry(qnic_index).or_default();
            let qubit_index = msm_info
                .qubit_info
                .get(&msm_info.iteration_index)
                .copied()
                .unwrap_or_default();
            (
                qubit_index,
                msm_info.photon_index_counter,
                msm_info.partner_qnic_index,
                msm_info.partner_address,
            )
        };

        if click.success {
            let msm_info = self.msm_info.entry(qnic_index).or_default();
            msm_info
                .qubit_postprocess_info
                .insert(photon_index, (qubit_index, click.correction_operation));
            msm_info.iteration_index += 1;
        } else {
            self.hardware
                .reinitialize_qubit(QnicKind::Rp, qnic_index, qubit_index);
            if let Err(err) =
                self.qnic_store
                    .set_qubit_busy(QnicKind::Rp, qnic_index, qubit_index, false)
            {
                warn!(%err, "failed to free clicked-out qubit");
            }
        }

        let msm_result = MsmResult {
            qnic_index: partner_qnic_index,
            qnic_kind: QnicKind::Rp,
            photon_index,
            success: click.success,
            correction_operation: click.correction_operation,
            src_addr: self.config.address,
            dest_addr: partner_address,
            kind: MSM_RESULT_MESSAGE_KIND,
        };
        self.kernel.send(Message::MsmResult(msm_result), ROUTER_PORT);
    }

    /// Reconcile the partner's result with the local outcome.
    pub(crate) fn on_msm_result(&mut self, result: &MsmResult) {
        let qnic_index = result.qnic_index;
        let (entry, partner_address) = {
            let msm_info = self.msm_info.entry(qnic_index).or_default();
            (
                msm_info
                    .qubit_postprocess_info
                    .get(&result.photon_index)
                    .copied(),
                msm_info.partner_address,
            )
        };
        // Local failure already reported: nothing was kept for this photon.
        let Some((qubit_index, local_correction)) = entry else {
            return;
        };

        if !result.success {
            // Local success, partner failure: release the half-pair.
            self.hardware
                .reinitialize_qubit(QnicKind::Rp, qnic_index, qubit_index);
            if let Err(err) =
                self.qnic_store
                    .set_qubit_busy(QnicKind::Rp, qnic_index, qubit_index, false)
            {
                warn!(%err, "failed to free half-pair qubit");
            }
            return;
        }

        // Both sides succeeded. Differing corrections mean the pair is in
        // Φ⁻; exactly one side (the younger address) rotates it to Φ⁺.
        let qubit = QubitKey::new(QnicKind::Rp, qnic_index, qubit_index);
        let is_phi_minus = local_correction != result.correction_operation;
        let is_younger_address = self.config.address < partner_address;
        if is_phi_minus && is_younger_address {
            self.apply_correction(qubit, PauliOperator::Z);
        }
        self.bell_pair_store.insert_entangled_qubit(partner_address, qubit);
    }

    /// Ask the pair source to stop when this interface ran an MSM session.
    pub(crate) fn on_stop_emitting(&mut self, stop: &StopEmitting) {
        let qnic_index = stop.qnic_address;
        let (is_msm_link, epps_address) = {
            let msm_info = self.msm_info.entry(qnic_index).or_default();
            (msm_info.photon_index_counter > 0, msm_info.epps_address)
        };
        if !is_msm_link {
            return;
        }
        let message = StopEppsEmission {
            src_addr: self.config.address,
            dest_addr: epps_address,
        };
        self.kernel.send(Message::StopEppsEmission(message), ROUTER_PORT);
    }

    // ── Runtime-bound protocol results ───────────────────────────────

    pub(crate) fn on_purification_result(&mut self, result: &PurificationResult) {
        self.runtimes.assign_message_to_ruleset(
            result.ruleset_id,
            result.shared_rule_tag,
            vec![
                result.sequence_number,
                result.measurement_result,
                result.protocol,
            ],
        );
    }

    pub(crate) fn on_swapping_result(&mut self, result: &SwappingResult) {
        self.runtimes.assign_message_to_ruleset(
            result.ruleset_id,
            result.shared_rule_tag,
            vec![
                result.sequence_number,
                result.correction_frame,
                result.new_partner.0,
            ],
        );
    }

    // ── RuleSet delivery ─────────────────────────────────────────────

    pub(crate) fn submit_serialized_ruleset(&mut self, ruleset: &serde_json::Value) {
        match RuleSet::from_json(ruleset) {
            Ok(ruleset) => {
                debug!(ruleset_id = ruleset.ruleset_id, "submitting forwarded ruleset");
                self.runtimes.submit_ruleset(ruleset);
            }
            Err(err) => warn!(%err, "dropping malformed forwarded ruleset"),
        }
    }

    pub(crate) fn submit_ruleset(&mut self, ruleset: RuleSet) {
        self.runtimes.submit_ruleset(ruleset);
    }
}

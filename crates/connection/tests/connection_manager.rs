//! Connection manager behavior tests.

use qrep_connection::{
    ConnectionManager, ConnectionManagerConfig, PurType, RetryState, StaticRoutingDaemon,
};
use qrep_core::{KernelPort, TimerHandle, ROUTER_PORT};
use qrep_logger::RecordingLogger;
use qrep_messages::{
    ConnectionSetupRequest, ConnectionSetupResponse, Message, MessageOrigin, QnicConnection,
    QnicPairInfo, RejectConnectionSetupRequest, RequestRetryTimer,
};
use qrep_types::{NodeAddr, QnicAddr, QnicKind, SimTime};
use std::cell::Cell;
use std::sync::Arc;

// ── Test harness ─────────────────────────────────────────────────────

#[derive(Default)]
struct StubKernel {
    now: SimTime,
    scheduled: Vec<(SimTime, Message, TimerHandle)>,
    cancelled: Vec<TimerHandle>,
    sent: Vec<(Message, String)>,
    next_handle: u64,
    event_counter: Cell<u64>,
}

impl KernelPort for StubKernel {
    fn now(&self) -> SimTime {
        self.now
    }

    fn schedule_at(&mut self, when: SimTime, message: Message) -> TimerHandle {
        self.next_handle += 1;
        let handle = TimerHandle(self.next_handle);
        self.scheduled.push((when, message, handle));
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.cancelled.push(handle);
    }

    fn send(&mut self, message: Message, port: &str) {
        self.sent.push((message, port.to_string()));
    }

    fn event_number(&self) -> Option<u64> {
        let n = self.event_counter.get() + 1;
        self.event_counter.set(n);
        Some(n)
    }
}

fn qnic(kind: QnicKind, index: i32, address: i32) -> QnicConnection {
    QnicConnection {
        kind,
        index,
        address: QnicAddr(address),
    }
}

/// Topology of the reference four-node chain:
/// [QNode2](101) -- (102)[QNode3](103) -- (104)[QNode4](105) -- (106)[QNode5]
fn responder_manager() -> ConnectionManager<StubKernel> {
    let mut routing = StaticRoutingDaemon::new();
    routing.add_route(NodeAddr(4), QnicAddr(106));
    routing.add_qnic(qnic(QnicKind::E, 16, 106));
    let config = ConnectionManagerConfig {
        address: NodeAddr(5),
        total_number_of_qnics: 10,
        entanglement_swapping_with_purification: true,
        ..Default::default()
    };
    let mut manager = ConnectionManager::new(
        config,
        StubKernel::default(),
        Box::new(routing),
        Arc::new(RecordingLogger::new()),
    )
    .unwrap();
    manager.set_fixed_ruleset_id(1234);
    manager
}

fn reference_request() -> ConnectionSetupRequest {
    ConnectionSetupRequest {
        application_id: 1,
        actual_src_addr: NodeAddr(2),
        actual_dest_addr: NodeAddr(5),
        src_addr: NodeAddr(4),
        dest_addr: NodeAddr(5),
        num_measure: 0,
        number_of_required_bell_pairs: 1,
        stack_of_qnode_indexes: vec![NodeAddr(2), NodeAddr(3), NodeAddr(4)],
        stack_of_qnics: vec![
            QnicPairInfo {
                left: None,
                right: qnic(QnicKind::E, 11, 101),
            },
            QnicPairInfo {
                left: Some(qnic(QnicKind::E, 12, 102)),
                right: qnic(QnicKind::E, 13, 103),
            },
            QnicPairInfo {
                left: Some(qnic(QnicKind::E, 14, 104)),
                right: qnic(QnicKind::E, 15, 105),
            },
        ],
        connection_session_id: 0,
        connection_attempt: 0,
    }
}

fn make_response(session_id: i32, attempt: i32, ruleset_id: u64) -> ConnectionSetupResponse {
    ConnectionSetupResponse {
        application_id: 1,
        actual_src_addr: NodeAddr(11),
        actual_dest_addr: NodeAddr(10),
        src_addr: NodeAddr(11),
        dest_addr: NodeAddr(10),
        ruleset_id,
        ruleset: serde_json::json!({"num_rules": 1}),
        application_type: 7,
        stack_of_qnode_indexes: vec![],
        connection_session_id: session_id,
        connection_attempt: attempt,
    }
}

// ── Responder RuleSet synthesis ──────────────────────────────────────

#[test]
fn respond_to_request_answers_every_participant() {
    let mut manager = responder_manager();
    manager.respond_to_request(&reference_request());

    let sent = &manager.kernel().sent;
    assert_eq!(sent.len(), 4);

    let destinations: Vec<i32> = sent
        .iter()
        .map(|(message, port)| {
            assert_eq!(port, ROUTER_PORT);
            let Message::ConnectionSetupResponse(resp) = message else {
                panic!("expected a connection setup response");
            };
            assert_eq!(resp.application_id, 1);
            assert_eq!(resp.ruleset_id, 1234);
            resp.dest_addr.0
        })
        .collect();
    assert_eq!(destinations, vec![2, 3, 4, 5]);

    let rule_counts: Vec<usize> = sent
        .iter()
        .map(|(message, _)| {
            let Message::ConnectionSetupResponse(resp) = message else {
                unreachable!()
            };
            resp.ruleset["rules"].as_array().unwrap().len()
        })
        .collect();
    assert_eq!(rule_counts, vec![2, 2, 1, 3]);

    // Reservation toward the previous hop was taken and released.
    assert!(!manager.is_qnic_busy(QnicAddr(106)));
}

#[test]
fn initiator_ruleset_matches_the_reference_wire_form() {
    let mut manager = responder_manager();
    manager.respond_to_request(&reference_request());

    let Message::ConnectionSetupResponse(for_initiator) = &manager.kernel().sent[0].0 else {
        panic!("expected a connection setup response");
    };
    assert_eq!(for_initiator.dest_addr, NodeAddr(2));

    let expected = serde_json::json!({
        "num_rules": 2,
        "owner_address": 2,
        "ruleset_id": 1234,
        "rules": [
            {
                "name": "swapping correction from 3",
                "send_tag": -1,
                "receive_tag": 1,
                "interface": [{"partner_address": 3}],
                "condition": {
                    "clauses": [{
                        "type": "swapping_correction",
                        "options": {
                            "interface": {"partner_address": 3},
                            "shared_rule_tag": 1
                        }
                    }]
                },
                "action": {
                    "type": "swapping_correction",
                    "options": {
                        "interface": [{"partner_address": 3}],
                        "shared_rule_tag": 1
                    }
                }
            },
            {
                "name": "tomography with address 5",
                "send_tag": 3,
                "receive_tag": 3,
                "interface": [{"partner_address": 5}],
                "condition": {
                    "clauses": [
                        {
                            "type": "enough_resource",
                            "options": {
                                "interface": {"partner_address": 5},
                                "num_resource": 1
                            }
                        },
                        {
                            "type": "measure_count",
                            "options": {
                                "interface": {"partner_address": 5},
                                "num_measure": 0
                            }
                        }
                    ]
                },
                "action": {
                    "type": "tomography",
                    "options": {
                        "interface": [{"partner_address": 5}],
                        "num_measure": 0,
                        "owner_address": 2
                    }
                }
            }
        ]
    });
    assert_eq!(for_initiator.ruleset, expected);
}

#[test]
fn responder_ruleset_orders_corrections_inner_swap_first() {
    let mut manager = responder_manager();
    manager.respond_to_request(&reference_request());

    let Message::ConnectionSetupResponse(for_responder) = &manager.kernel().sent[3].0 else {
        panic!("expected a connection setup response");
    };
    assert_eq!(for_responder.dest_addr, NodeAddr(5));
    let rules = for_responder.ruleset["rules"].as_array().unwrap();
    assert_eq!(rules[0]["name"], "swapping correction from 4");
    assert_eq!(rules[0]["receive_tag"], 2);
    assert_eq!(rules[1]["name"], "swapping correction from 3");
    assert_eq!(rules[1]["receive_tag"], 1);
    assert_eq!(rules[2]["name"], "tomography with address 2");
    assert_eq!(rules[2]["action"]["options"]["owner_address"], 5);
}

// ── Reservation ──────────────────────────────────────────────────────

#[test]
fn qnic_reservation_reserves_releases_and_queries() {
    let mut manager = responder_manager();
    let first = QnicAddr(13);
    let second = QnicAddr(15);

    assert!(manager.reserved_qnics().is_empty());
    manager.reserve_qnic(first);
    assert_eq!(manager.reserved_qnics(), &[first]);
    assert!(manager.is_qnic_busy(first));
    assert!(!manager.is_qnic_busy(second));

    manager.reserve_qnic(second);
    assert_eq!(manager.reserved_qnics(), &[first, second]);

    manager.release_qnic(first);
    assert_eq!(manager.reserved_qnics(), &[second]);
    assert!(!manager.is_qnic_busy(first));
    assert!(manager.is_qnic_busy(second));

    manager.release_qnic(second);
    assert!(manager.reserved_qnics().is_empty());
}

#[test]
fn reserve_is_idempotent_per_interface() {
    let mut manager = responder_manager();
    manager.reserve_qnic(QnicAddr(13));
    manager.reserve_qnic(QnicAddr(13));
    assert_eq!(manager.reserved_qnics().len(), 1);
    manager.release_qnic(QnicAddr(13));
    assert!(!manager.is_qnic_busy(QnicAddr(13)));
}

// ── Response deduplication ───────────────────────────────────────────

#[test]
fn responses_deduplicate_by_session_and_attempt() {
    let mut manager = responder_manager();

    assert!(manager.should_accept_connection_setup_response(&make_response(100, 1, 11)));
    assert!(!manager.should_accept_connection_setup_response(&make_response(100, 1, 12)));
    assert!(manager.should_accept_connection_setup_response(&make_response(100, 2, 13)));
    assert!(!manager.should_accept_connection_setup_response(&make_response(100, 2, 14)));
    assert!(!manager.should_accept_connection_setup_response(&make_response(100, 0, 15)));
    assert!(manager.should_accept_connection_setup_response(&make_response(101, 1, 21)));
}

#[test]
fn legacy_session_zero_bypasses_deduplication() {
    let mut manager = responder_manager();

    assert!(manager.should_accept_connection_setup_response(&make_response(0, 1, 31)));
    assert!(manager.should_accept_connection_setup_response(&make_response(0, 2, 32)));
    assert!(manager.should_accept_connection_setup_response(&make_response(1, 1, 33)));
    assert!(!manager.should_accept_connection_setup_response(&make_response(1, 1, 34)));
}

#[test]
fn store_ruleset_forwards_only_the_first_response_per_attempt() {
    let mut manager = responder_manager();

    manager.store_ruleset(&make_response(300, 1, 41));
    assert_eq!(manager.kernel().sent.len(), 1);
    let Message::RuleSetForwarding(first) = &manager.kernel().sent[0].0 else {
        panic!("expected internal forwarding");
    };
    assert_eq!(first.ruleset_id, 41);

    manager.store_ruleset(&make_response(300, 1, 42));
    assert_eq!(manager.kernel().sent.len(), 1);

    manager.store_ruleset(&make_response(300, 2, 43));
    assert_eq!(manager.kernel().sent.len(), 2);
    let Message::RuleSetForwarding(later) = &manager.kernel().sent[1].0 else {
        panic!("expected internal forwarding");
    };
    assert_eq!(later.ruleset_id, 43);
}

#[test]
fn store_ruleset_for_application_keeps_the_application_type() {
    let mut manager = responder_manager();

    manager.store_ruleset_for_application(&make_response(200, 3, 31));
    assert_eq!(manager.kernel().sent.len(), 1);
    let Message::RuleSetForwardingApplication(first) = &manager.kernel().sent[0].0 else {
        panic!("expected internal application forwarding");
    };
    assert_eq!(first.ruleset_id, 31);
    assert_eq!(first.application_type, 7);

    manager.store_ruleset_for_application(&make_response(200, 3, 32));
    assert_eq!(manager.kernel().sent.len(), 1);

    manager.store_ruleset_for_application(&make_response(200, 4, 33));
    assert_eq!(manager.kernel().sent.len(), 2);
    let Message::RuleSetForwardingApplication(later) = &manager.kernel().sent[1].0 else {
        panic!("expected internal application forwarding");
    };
    assert_eq!(later.ruleset_id, 33);
}

#[test]
fn full_dedup_sequence_forwards_exactly_three_rulesets() {
    // Scenario: (100,1,11) (100,1,12) (100,2,13) (100,2,14) (100,0,15)
    // (101,1,21); only 11, 13, 21 propagate.
    let mut manager = responder_manager();
    for (session, attempt, ruleset_id) in
        [(100, 1, 11), (100, 1, 12), (100, 2, 13), (100, 2, 14), (100, 0, 15), (101, 1, 21)]
    {
        let resp = make_response(session, attempt, ruleset_id);
        manager.handle_message(
            &Message::ConnectionSetupResponse(resp),
            MessageOrigin::External,
        );
    }

    let forwarded: Vec<u64> = manager
        .kernel()
        .sent
        .iter()
        .filter_map(|(message, _)| match message {
            Message::RuleSetForwarding(fw) => Some(fw.ruleset_id),
            Message::RuleSetForwardingApplication(fw) => Some(fw.ruleset_id),
            _ => None,
        })
        .collect();
    assert_eq!(forwarded, vec![11, 13, 21]);
}

// ── Relay and retry ──────────────────────────────────────────────────

fn intermediate_manager() -> ConnectionManager<StubKernel> {
    let mut routing = StaticRoutingDaemon::new();
    routing.add_route(NodeAddr(5), QnicAddr(103));
    routing.add_route(NodeAddr(2), QnicAddr(102));
    routing.add_qnic(qnic(QnicKind::E, 13, 103));
    routing.add_qnic(qnic(QnicKind::E, 12, 102));
    let config = ConnectionManagerConfig {
        address: NodeAddr(3),
        request_retry_interval: SimTime::from_millis(10),
        ..Default::default()
    };
    ConnectionManager::new(
        config,
        StubKernel::default(),
        Box::new(routing),
        Arc::new(RecordingLogger::new()),
    )
    .unwrap()
}

fn relay_request(session: i32) -> ConnectionSetupRequest {
    ConnectionSetupRequest {
        application_id: 1,
        actual_src_addr: NodeAddr(2),
        actual_dest_addr: NodeAddr(5),
        src_addr: NodeAddr(2),
        dest_addr: NodeAddr(5),
        num_measure: 0,
        number_of_required_bell_pairs: 1,
        stack_of_qnode_indexes: vec![NodeAddr(2)],
        stack_of_qnics: vec![QnicPairInfo {
            left: None,
            right: qnic(QnicKind::E, 11, 101),
        }],
        connection_session_id: session,
        connection_attempt: 1,
    }
}

#[test]
fn intermediate_appends_itself_and_relays() {
    let mut manager = intermediate_manager();
    manager.handle_message(
        &Message::ConnectionSetupRequest(relay_request(42)),
        MessageOrigin::External,
    );

    assert_eq!(manager.retry_state(QnicAddr(103)), RetryState::Relaying);
    assert!(manager.is_qnic_busy(QnicAddr(103)));

    let (Message::ConnectionSetupRequest(relayed), port) = &manager.kernel().sent[0] else {
        panic!("expected the relayed request");
    };
    assert_eq!(port, ROUTER_PORT);
    assert_eq!(relayed.src_addr, NodeAddr(3));
    assert_eq!(
        relayed.stack_of_qnode_indexes,
        vec![NodeAddr(2), NodeAddr(3)]
    );
    let appended = relayed.stack_of_qnics.last().unwrap();
    assert_eq!(appended.left.unwrap().address, QnicAddr(102));
    assert_eq!(appended.right.address, QnicAddr(103));
}

#[test]
fn busy_interface_queues_and_retries_on_self_timer() {
    let mut manager = intermediate_manager();
    manager.reserve_qnic(QnicAddr(103));

    manager.handle_message(
        &Message::ConnectionSetupRequest(relay_request(42)),
        MessageOrigin::External,
    );

    // Nothing relayed yet; a retry timer is armed instead.
    assert!(manager.kernel().sent.is_empty());
    assert_eq!(manager.retry_state(QnicAddr(103)), RetryState::AwaitingRetry);
    assert_eq!(manager.kernel().scheduled.len(), 1);
    let (when, timer, _) = manager.kernel().scheduled[0].clone();
    assert_eq!(when, SimTime::from_millis(10));
    assert!(matches!(timer, Message::RequestRetryTimer(_)));

    // Interface still busy at the first retry: back off again.
    manager.kernel_mut().now = SimTime::from_millis(10);
    manager.handle_message(&timer, MessageOrigin::SelfTimer);
    assert_eq!(manager.kernel().scheduled.len(), 2);
    assert!(manager.kernel().sent.is_empty());

    // Freed before the second retry: the queued request goes out.
    manager.release_qnic(QnicAddr(103));
    let (_, second_timer, _) = manager.kernel().scheduled[1].clone();
    manager.kernel_mut().now = SimTime::from_millis(30);
    manager.handle_message(&second_timer, MessageOrigin::SelfTimer);

    assert_eq!(manager.kernel().sent.len(), 1);
    assert!(matches!(
        manager.kernel().sent[0].0,
        Message::ConnectionSetupRequest(_)
    ));
    assert_eq!(manager.retry_state(QnicAddr(103)), RetryState::Relaying);
}

#[test]
fn response_for_a_relayed_session_releases_the_reservation() {
    let mut manager = intermediate_manager();
    manager.handle_message(
        &Message::ConnectionSetupRequest(relay_request(42)),
        MessageOrigin::External,
    );
    assert!(manager.is_qnic_busy(QnicAddr(103)));

    let mut resp = make_response(42, 1, 77);
    resp.actual_dest_addr = NodeAddr(2); // heading for the initiator
    manager.handle_message(
        &Message::ConnectionSetupResponse(resp),
        MessageOrigin::External,
    );

    assert!(!manager.is_qnic_busy(QnicAddr(103)));
    assert_eq!(manager.retry_state(QnicAddr(103)), RetryState::Idle);
}

#[test]
fn rejection_unwinds_the_reservation_and_travels_on() {
    let mut manager = intermediate_manager();
    manager.handle_message(
        &Message::ConnectionSetupRequest(relay_request(42)),
        MessageOrigin::External,
    );
    assert!(manager.is_qnic_busy(QnicAddr(103)));
    let relayed = manager.kernel().sent.len();

    let reject = RejectConnectionSetupRequest {
        application_id: 1,
        actual_src_addr: NodeAddr(2),
        actual_dest_addr: NodeAddr(5),
        number_of_required_bell_pairs: 1,
    };
    manager.handle_message(
        &Message::RejectConnectionSetup(reject),
        MessageOrigin::External,
    );

    assert!(!manager.is_qnic_busy(QnicAddr(103)));
    assert_eq!(manager.retry_state(QnicAddr(103)), RetryState::Rejected);
    // The rejection continues toward the initiator.
    assert_eq!(manager.kernel().sent.len(), relayed + 1);
    assert!(matches!(
        manager.kernel().sent.last().unwrap().0,
        Message::RejectConnectionSetup(_)
    ));
}

// ── Decode and configuration ─────────────────────────────────────────

#[test]
fn unknown_control_messages_are_logged_not_fatal() {
    let logger = Arc::new(RecordingLogger::new());
    let config = ConnectionManagerConfig {
        address: NodeAddr(3),
        ..Default::default()
    };
    let mut manager = ConnectionManager::new(
        config,
        StubKernel::default(),
        Box::new(StaticRoutingDaemon::new()),
        logger.clone(),
    )
    .unwrap();

    manager.handle_message(
        &Message::StopEmitting(qrep_messages::StopEmitting { qnic_address: 0 }),
        MessageOrigin::External,
    );
    assert_eq!(logger.count_of("unknown_control_message"), 1);

    // An unregistered retry timer is equally non-fatal.
    manager.handle_message(
        &Message::RequestRetryTimer(RequestRetryTimer {
            qnic_address: QnicAddr(999),
        }),
        MessageOrigin::SelfTimer,
    );
    assert_eq!(logger.count_of("unknown_control_message"), 2);
}

#[test]
fn unknown_purification_type_is_a_configuration_error() {
    let config = ConnectionManagerConfig {
        purification_type_cm: "DSDA_SECOND_INV_T".to_string(),
        ..Default::default()
    };
    assert!(ConnectionManager::new(
        config,
        StubKernel::default(),
        Box::new(StaticRoutingDaemon::new()),
        Arc::new(RecordingLogger::new()),
    )
    .is_err());
}

#[test]
fn configured_purification_type_is_parsed() {
    let manager = responder_manager();
    assert_eq!(manager.purification_type(), PurType::SingleSelectionX);
}

//! Message classification and deterministic drain.

use crate::event::{
    family_from_application_type, family_from_purification_hint, ExecutionPath, ProtocolFamily,
    RuleEvent, RuleEventChannel, RuleEventKind, RuleEventPayload,
};
use qrep_messages::{Message, MessageOrigin};
use qrep_types::SimTime;
use std::collections::HashMap;
use tracing::trace;

/// Decoder for a message class the built-in table does not know.
///
/// A translator fills `kind`, `protocol_family`, `payload`, `keep_source`
/// and (optionally) `execution_path`/`protocol_raw_value`; the bus stamps
/// time, event number, channel, and message labels afterwards. Returning
/// `None` means the translator declines the message.
pub type Translator = Box<dyn Fn(&Message) -> Option<RuleEvent> + Send + Sync>;

/// Classifies raw messages into [`RuleEvent`]s and stores them until
/// drained.
///
/// Classification is two-stage: a closed built-in type table first, then an
/// open registry of translators keyed by message class name. A message
/// neither stage recognizes yields a single UNKNOWN event, never an error.
#[derive(Default)]
pub struct EventBus {
    queue: Vec<RuleEvent>,
    translators: HashMap<String, Translator>,
    /// Tie-breaker used when the kernel exposes no event counter.
    fallback_counter: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Supply or override a decoder for an exotic message class.
    pub fn register_translator(&mut self, class_name: impl Into<String>, translator: Translator) {
        self.translators.insert(class_name.into(), translator);
    }

    /// Append a pre-built event.
    pub fn publish(&mut self, event: RuleEvent) {
        self.queue.push(event);
    }

    /// Classify a raw message and queue the resulting event.
    ///
    /// `event_number` is the kernel's counter for this delivery; the bus
    /// substitutes its own monotonic counter when absent.
    pub fn publish_message(
        &mut self,
        msg: &Message,
        origin: MessageOrigin,
        now: SimTime,
        event_number: Option<u64>,
    ) {
        let event_number = event_number.unwrap_or_else(|| {
            self.fallback_counter += 1;
            self.fallback_counter
        });

        let mut event = self
            .decode_builtin(msg)
            .or_else(|| self.decode_registered(msg))
            .unwrap_or_default();

        event.time = now;
        event.event_number = event_number;
        event.channel = match origin {
            MessageOrigin::External => RuleEventChannel::External,
            MessageOrigin::SelfTimer => RuleEventChannel::InternalTimer,
        };
        event.keep_source = event.keep_source || event.channel == RuleEventChannel::InternalTimer;
        if event.msg_name.is_empty() {
            event.msg_name = msg.display_name().to_string();
        }
        if event.msg_type.is_empty() {
            event.msg_type = msg.class_name().to_string();
        }
        trace!(kind = event.kind.name(), family = %event.protocol_family, "published rule event");
        self.queue.push(event);
    }

    /// Remove and return, in one sweep, every event with `time <= now`,
    /// sorted ascending by `(time, event_number)`. Later events stay queued.
    pub fn drain(&mut self, now: SimTime) -> Vec<RuleEvent> {
        self.queue.sort_by(|lhs, rhs| {
            lhs.time
                .cmp(&rhs.time)
                .then(lhs.event_number.cmp(&rhs.event_number))
        });
        let cut = self
            .queue
            .iter()
            .position(|event| event.time > now)
            .unwrap_or(self.queue.len());
        self.queue.drain(..cut).collect()
    }

    /// Number of queued (undrained) events.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Stage 1: the closed built-in type table.
    fn decode_builtin(&self, msg: &Message) -> Option<RuleEvent> {
        let (kind, family, raw_value, keep_source, payload) = match msg {
            Message::BsmResult(pkt) => (
                RuleEventKind::BsmResult,
                ProtocolFamily::MimV1,
                String::new(),
                false,
                RuleEventPayload::BsmResult(pkt.clone()),
            ),
            Message::BsmTiming(pkt) => (
                RuleEventKind::BsmTiming,
                ProtocolFamily::MimV1,
                String::new(),
                false,
                RuleEventPayload::BsmTiming(pkt.clone()),
            ),
            Message::EppsTiming(pkt) => (
                RuleEventKind::EppsTiming,
                ProtocolFamily::MsmV1,
                String::new(),
                false,
                RuleEventPayload::EppsTiming(pkt.clone()),
            ),
            Message::EmitPhotonRequest(pkt) => (
                RuleEventKind::EmitPhotonRequest,
                if pkt.msm {
                    ProtocolFamily::MsmV1
                } else {
                    ProtocolFamily::MimV1
                },
                String::new(),
                // The emission loop reschedules its own request.
                true,
                RuleEventPayload::EmitPhotonRequest(pkt.clone()),
            ),
            Message::LinkTomographyRuleSet(pkt) => (
                RuleEventKind::LinkTomographyRuleSet,
                ProtocolFamily::LinkTomography,
                String::new(),
                false,
                RuleEventPayload::LinkTomographyRuleSet(pkt.clone()),
            ),
            Message::MsmResult(pkt) => (
                RuleEventKind::MsmResult,
                ProtocolFamily::MsmV1,
                String::new(),
                false,
                RuleEventPayload::MsmResult(pkt.clone()),
            ),
            Message::PurificationResult(pkt) => {
                let family = family_from_purification_hint(pkt.protocol);
                let raw = if family == ProtocolFamily::Unknown {
                    pkt.protocol.to_string()
                } else {
                    String::new()
                };
                (
                    RuleEventKind::PurificationResult,
                    family,
                    raw,
                    false,
                    RuleEventPayload::PurificationResult(pkt.clone()),
                )
            }
            Message::SingleClickResult(pkt) => (
                RuleEventKind::SingleClickResult,
                ProtocolFamily::MsmV1,
                String::new(),
                false,
                RuleEventPayload::SingleClickResult(pkt.clone()),
            ),
            Message::StopEmitting(pkt) => (
                RuleEventKind::StopEmitting,
                ProtocolFamily::MsmV1,
                String::new(),
                false,
                RuleEventPayload::StopEmitting(pkt.clone()),
            ),
            Message::SwappingResult(pkt) => (
                RuleEventKind::SwappingResult,
                ProtocolFamily::Swapping,
                String::new(),
                false,
                RuleEventPayload::SwappingResult(pkt.clone()),
            ),
            Message::RuleSetForwarding(pkt) => (
                RuleEventKind::RulesetForwarding,
                ProtocolFamily::ConnectionManagement,
                String::new(),
                false,
                RuleEventPayload::RulesetForwarding(pkt.clone()),
            ),
            Message::RuleSetForwardingApplication(pkt) => {
                let family = family_from_application_type(pkt.application_type);
                let raw = if family == ProtocolFamily::Unknown {
                    pkt.application_type.to_string()
                } else {
                    String::new()
                };
                (
                    RuleEventKind::RulesetForwardingApplication,
                    family,
                    raw,
                    false,
                    RuleEventPayload::RulesetForwardingApplication(pkt.clone()),
                )
            }
            _ => return None,
        };

        Some(RuleEvent {
            kind,
            protocol_family: family,
            execution_path: kind.execution_path(),
            protocol_raw_value: raw_value,
            keep_source,
            payload,
            ..Default::default()
        })
    }

    /// Stage 2: the open translator registry.
    fn decode_registered(&self, msg: &Message) -> Option<RuleEvent> {
        let translator = self.translators.get(msg.class_name())?;
        let mut event = translator(msg)?;
        if event.execution_path == ExecutionPath::Unknown {
            event.execution_path = event.kind.execution_path();
        }
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qrep_messages::{OtherMessage, PurificationResult};

    fn secs(t: f64) -> SimTime {
        SimTime::from_secs_f64(t)
    }

    fn event(time: f64, number: u64) -> RuleEvent {
        RuleEvent::with_kind(RuleEventKind::BsmResult, secs(time), number)
    }

    #[test]
    fn drain_orders_by_time_then_event_number() {
        let mut bus = EventBus::new();
        bus.publish(event(2.0, 10));
        bus.publish(event(1.0, 100));
        bus.publish(event(2.0, 5));
        bus.publish(event(1.0, 20));
        bus.publish(event(3.0, 3));

        let drained = bus.drain(secs(2.5));
        let order: Vec<(f64, u64)> = drained
            .iter()
            .map(|e| (e.time.as_secs_f64(), e.event_number))
            .collect();
        assert_eq!(order, vec![(1.0, 20), (1.0, 100), (2.0, 5), (2.0, 10)]);

        let rest = bus.drain(secs(3.0));
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].event_number, 3);
    }

    #[test]
    fn drain_is_exhaustive_once() {
        let mut bus = EventBus::new();
        bus.publish(event(1.0, 1));
        assert_eq!(bus.drain(secs(10.0)).len(), 1);
        assert!(bus.drain(secs(1e9)).is_empty());
    }

    #[test]
    fn unknown_message_yields_single_unknown_event() {
        let mut bus = EventBus::new();
        let msg = Message::Other(OtherMessage {
            class_name: "ExoticMessage".into(),
            name: "raw".into(),
        });
        bus.publish_message(&msg, MessageOrigin::External, secs(1.0), Some(9));

        let events = bus.drain(secs(1.0));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, RuleEventKind::Unknown);
        assert_eq!(events[0].payload, RuleEventPayload::Empty);
        assert_eq!(events[0].msg_name, "raw");
        assert_eq!(events[0].msg_type, "ExoticMessage");
    }

    #[test]
    fn registered_translator_overrides_unknown_classification() {
        let mut bus = EventBus::new();
        bus.register_translator(
            "ExoticMessage",
            Box::new(|_msg| {
                Some(RuleEvent {
                    kind: RuleEventKind::StopEmitting,
                    protocol_family: ProtocolFamily::MsmV1,
                    ..Default::default()
                })
            }),
        );
        let msg = Message::Other(OtherMessage {
            class_name: "ExoticMessage".into(),
            name: "exotic".into(),
        });
        bus.publish_message(&msg, MessageOrigin::External, secs(0.5), None);

        let events = bus.drain(secs(0.5));
        assert_eq!(events[0].kind, RuleEventKind::StopEmitting);
        assert_eq!(events[0].protocol_family, ProtocolFamily::MsmV1);
        assert_eq!(
            events[0].execution_path,
            ExecutionPath::EntanglementLifecycle
        );
    }

    #[test]
    fn purification_hint_out_of_range_preserves_raw_value() {
        let mut bus = EventBus::new();
        let msg = Message::PurificationResult(PurificationResult {
            ruleset_id: 0,
            shared_rule_tag: 0,
            sequence_number: 0,
            measurement_result: 0,
            protocol: 42,
        });
        bus.publish_message(&msg, MessageOrigin::External, secs(1.0), Some(1));

        let events = bus.drain(secs(1.0));
        assert_eq!(events[0].protocol_family, ProtocolFamily::Unknown);
        assert_eq!(events[0].protocol_raw_value, "42");

        let in_range = Message::PurificationResult(PurificationResult {
            ruleset_id: 0,
            shared_rule_tag: 0,
            sequence_number: 0,
            measurement_result: 0,
            protocol: 10,
        });
        bus.publish_message(&in_range, MessageOrigin::External, secs(1.0), Some(2));
        let events = bus.drain(secs(1.0));
        assert_eq!(events[0].protocol_family, ProtocolFamily::Purification);
        assert!(events[0].protocol_raw_value.is_empty());
    }

    #[test]
    fn self_timer_deliveries_keep_their_source() {
        let mut bus = EventBus::new();
        let msg = Message::Other(OtherMessage {
            class_name: "AnyTimer".into(),
            name: "t".into(),
        });
        bus.publish_message(&msg, MessageOrigin::SelfTimer, secs(1.0), Some(1));
        let events = bus.drain(secs(1.0));
        assert_eq!(events[0].channel, RuleEventChannel::InternalTimer);
        assert!(events[0].keep_source);
    }

    #[test]
    fn fallback_counter_is_monotonic_when_kernel_has_none() {
        let mut bus = EventBus::new();
        let msg = Message::Other(OtherMessage {
            class_name: "M".into(),
            name: "m".into(),
        });
        bus.publish_message(&msg, MessageOrigin::External, secs(1.0), None);
        bus.publish_message(&msg, MessageOrigin::External, secs(1.0), None);
        let events = bus.drain(secs(1.0));
        assert!(events[0].event_number < events[1].event_number);
    }
}

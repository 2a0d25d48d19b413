//! Default protocol handler registration.

use crate::engine::RuleEngine;
use qrep_core::{KernelPort, ProtocolFamily, RuleEventKind, RuleEventPayload};

/// Install the default handler table.
///
/// Every entry is an exact `(kind, family)` registration except the photon
/// emission loop, whose family varies with the request payload (MIM or
/// MSM), so it lives in the per-kind fallback table.
pub(crate) fn register_defaults<K: KernelPort>(engine: &mut RuleEngine<K>) {
    engine.register_handler(
        RuleEventKind::BsmResult,
        ProtocolFamily::MimV1,
        |engine, event| {
            if let RuleEventPayload::BsmResult(result) = &event.payload {
                engine.on_bsm_result(result);
            }
        },
    );

    engine.register_handler(
        RuleEventKind::BsmTiming,
        ProtocolFamily::MimV1,
        |engine, event| {
            if let RuleEventPayload::BsmTiming(notification) = &event.payload {
                engine.on_bsm_timing(notification);
            }
        },
    );

    engine.register_handler(
        RuleEventKind::EppsTiming,
        ProtocolFamily::MsmV1,
        |engine, event| {
            if let RuleEventPayload::EppsTiming(notification) = &event.payload {
                engine.on_epps_timing(notification);
            }
        },
    );

    engine.register_kind_fallback(RuleEventKind::EmitPhotonRequest, |engine, event| {
        if let RuleEventPayload::EmitPhotonRequest(request) = &event.payload {
            engine.on_emit_photon_request(request);
        }
    });

    engine.register_handler(
        RuleEventKind::SingleClickResult,
        ProtocolFamily::MsmV1,
        |engine, event| {
            if let RuleEventPayload::SingleClickResult(click) = &event.payload {
                engine.on_single_click_result(click);
            }
        },
    );

    engine.register_handler(
        RuleEventKind::MsmResult,
        ProtocolFamily::MsmV1,
        |engine, event| {
            if let RuleEventPayload::MsmResult(result) = &event.payload {
                engine.on_msm_result(result);
            }
        },
    );

    engine.register_handler(
        RuleEventKind::StopEmitting,
        ProtocolFamily::MsmV1,
        |engine, event| {
            if let RuleEventPayload::StopEmitting(stop) = &event.payload {
                engine.on_stop_emitting(stop);
            }
        },
    );

    engine.register_handler(
        RuleEventKind::PurificationResult,
        ProtocolFamily::Purification,
        |engine, event| {
            if let RuleEventPayload::PurificationResult(result) = &event.payload {
                engine.on_purification_result(result);
            }
        },
    );

    engine.register_handler(
        RuleEventKind::SwappingResult,
        ProtocolFamily::Swapping,
        |engine, event| {
            if let RuleEventPayload::SwappingResult(result) = &event.payload {
                engine.on_swapping_result(result);
            }
        },
    );

    engine.register_handler(
        RuleEventKind::RulesetForwarding,
        ProtocolFamily::ConnectionManagement,
        |engine, event| {
            if let RuleEventPayload::RulesetForwarding(pkt) = &event.payload {
                engine.submit_serialized_ruleset(&pkt.ruleset);
            }
        },
    );

    engine.register_handler(
        RuleEventKind::RulesetForwardingApplication,
        ProtocolFamily::ConnectionManagement,
        |engine, event| {
            if let RuleEventPayload::RulesetForwardingApplication(pkt) = &event.payload {
                if pkt.application_type != 0 {
                    return;
                }
                engine.submit_serialized_ruleset(&pkt.ruleset);
            }
        },
    );

    engine.register_handler(
        RuleEventKind::LinkTomographyRuleSet,
        ProtocolFamily::LinkTomography,
        |engine, event| {
            if let RuleEventPayload::LinkTomographyRuleSet(pkt) = &event.payload {
                engine.submit_ruleset(pkt.ruleset.clone());
            }
        },
    );

    engine.register_handler(
        RuleEventKind::Unknown,
        ProtocolFamily::Unknown,
        |engine, event| {
            engine.log_unknown_rule_event(event);
        },
    );
}

//! Typed rule events.

use qrep_messages::{
    BsmTimingNotification, CombinedBsaResults, EmitPhotonRequest, EppsTimingNotification,
    InternalRuleSetForwarding, InternalRuleSetForwardingApplication, LinkTomographyRuleSet,
    MsmResult, PurificationResult, SingleClickResult, StopEmitting, SwappingResult,
};
use qrep_types::SimTime;
use std::fmt;

/// What kind of protocol event a message decoded into.
///
/// Discriminant values are part of the diagnostic log format
/// (`unknown_rule_protocol` records the numeric kind).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum RuleEventKind {
    #[default]
    Unknown = 0,
    BsmResult = 1,
    BsmTiming = 2,
    EppsTiming = 3,
    EmitPhotonRequest = 4,
    LinkTomographyRuleSet = 5,
    MsmResult = 6,
    PurificationResult = 7,
    SingleClickResult = 8,
    StopEmitting = 9,
    SwappingResult = 10,
    RulesetForwarding = 11,
    RulesetForwardingApplication = 12,
}

impl RuleEventKind {
    /// Diagnostic label.
    pub fn name(&self) -> &'static str {
        match self {
            RuleEventKind::Unknown => "UNKNOWN",
            RuleEventKind::BsmResult => "BSM_RESULT",
            RuleEventKind::BsmTiming => "BSM_TIMING",
            RuleEventKind::EppsTiming => "EPPS_TIMING",
            RuleEventKind::EmitPhotonRequest => "EMIT_PHOTON_REQUEST",
            RuleEventKind::LinkTomographyRuleSet => "LINK_TOMOGRAPHY_RULESET",
            RuleEventKind::MsmResult => "MSM_RESULT",
            RuleEventKind::PurificationResult => "PURIFICATION_RESULT",
            RuleEventKind::SingleClickResult => "SINGLE_CLICK_RESULT",
            RuleEventKind::StopEmitting => "STOP_EMITTING",
            RuleEventKind::SwappingResult => "SWAPPING_RESULT",
            RuleEventKind::RulesetForwarding => "RULESET_FORWARDING",
            RuleEventKind::RulesetForwardingApplication => "RULESET_FORWARDING_APPLICATION",
        }
    }

    /// Execution path derived from the kind alone.
    pub fn execution_path(&self) -> ExecutionPath {
        match self {
            RuleEventKind::RulesetForwarding | RuleEventKind::RulesetForwardingApplication => {
                ExecutionPath::Forwarding
            }
            RuleEventKind::Unknown => ExecutionPath::Unknown,
            _ => ExecutionPath::EntanglementLifecycle,
        }
    }
}

/// Which channel delivered the source message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RuleEventChannel {
    External,
    InternalTimer,
    #[default]
    Unknown,
}

/// Protocol family an event belongs to, keying the dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProtocolFamily {
    MimV1,
    MsmV1,
    Purification,
    Swapping,
    LinkTomography,
    ConnectionManagement,
    Maintenance,
    #[default]
    Unknown,
}

impl fmt::Display for ProtocolFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProtocolFamily::MimV1 => "MIM Protocol v1",
            ProtocolFamily::MsmV1 => "MSM Protocol v1",
            ProtocolFamily::Purification => "Purification",
            ProtocolFamily::Swapping => "Swapping",
            ProtocolFamily::LinkTomography => "LinkTomography",
            ProtocolFamily::ConnectionManagement => "ConnectionManagement",
            ProtocolFamily::Maintenance => "Maintenance",
            ProtocolFamily::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Purification protocol identifiers are small non-negative enum values.
pub(crate) fn family_from_purification_hint(hint: i32) -> ProtocolFamily {
    if (0..=10).contains(&hint) {
        ProtocolFamily::Purification
    } else {
        ProtocolFamily::Unknown
    }
}

pub(crate) fn family_from_application_type(application_type: i32) -> ProtocolFamily {
    if application_type == 0 {
        ProtocolFamily::ConnectionManagement
    } else {
        ProtocolFamily::Unknown
    }
}

/// Which execution lane processes an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExecutionPath {
    EntanglementLifecycle,
    ConnectionControl,
    Forwarding,
    Maintenance,
    #[default]
    Unknown,
}

impl fmt::Display for ExecutionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionPath::EntanglementLifecycle => "EntanglementLifecycle",
            ExecutionPath::ConnectionControl => "ConnectionControl",
            ExecutionPath::Forwarding => "Forwarding",
            ExecutionPath::Maintenance => "Maintenance",
            ExecutionPath::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Decoded payload carried on a rule event. May be empty.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RuleEventPayload {
    #[default]
    Empty,
    BsmTiming(BsmTimingNotification),
    BsmResult(CombinedBsaResults),
    EppsTiming(EppsTimingNotification),
    EmitPhotonRequest(EmitPhotonRequest),
    LinkTomographyRuleSet(LinkTomographyRuleSet),
    MsmResult(MsmResult),
    PurificationResult(PurificationResult),
    SingleClickResult(SingleClickResult),
    StopEmitting(StopEmitting),
    SwappingResult(SwappingResult),
    RulesetForwarding(InternalRuleSetForwarding),
    RulesetForwardingApplication(InternalRuleSetForwardingApplication),
}

/// A typed, time-ordered protocol event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RuleEvent {
    pub kind: RuleEventKind,
    pub channel: RuleEventChannel,
    /// The handler may reschedule or reuse the source message; the engine
    /// must not release it after dispatch.
    pub keep_source: bool,
    pub time: SimTime,
    pub event_number: u64,
    pub protocol_family: ProtocolFamily,
    pub execution_path: ExecutionPath,
    /// Raw protocol hint preserved as text when it did not decode to a known
    /// family; empty otherwise.
    pub protocol_raw_value: String,
    pub payload: RuleEventPayload,
    pub msg_name: String,
    pub msg_type: String,
}

impl RuleEvent {
    /// Minimal event for tests and hand-constructed publications.
    pub fn with_kind(kind: RuleEventKind, time: SimTime, event_number: u64) -> Self {
        Self {
            kind,
            time,
            event_number,
            execution_path: kind.execution_path(),
            ..Default::default()
        }
    }
}

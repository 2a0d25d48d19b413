//! Classical control-plane messages.
//!
//! These are the messages a repeater node receives from its neighbors (via
//! the router port), from midpoint hardware (Bell-state analyzers, photon
//! pair sources), and from itself (scheduled timers). The kernel delivers
//! them one at a time; the event bus classifies them into typed rule events.

pub mod connection_setup;
pub mod link_generation;
pub mod ruleset_forwarding;

pub use connection_setup::{
    ConnectionSetupRequest, ConnectionSetupResponse, QnicConnection, QnicPairInfo,
    RejectConnectionSetupRequest,
};
pub use link_generation::{
    BsmTimingNotification, CombinedBsaResults, EmitPhotonRequest, EppsTimingNotification,
    MsmResult, SingleClickResult, StopEmitting, StopEppsEmission,
};
pub use ruleset_forwarding::{
    InternalRuleSetForwarding, InternalRuleSetForwardingApplication, LinkTomographyRuleSet,
    PurificationResult, SwappingResult,
};

use qrep_types::QnicAddr;

/// How a message reached the node.
///
/// The kernel knows whether a delivery is a previously self-scheduled timer
/// firing or an external arrival; the event bus derives the event channel
/// from this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOrigin {
    /// Arrived from another node or a midpoint device.
    External,
    /// A self-scheduled timer fired.
    SelfTimer,
}

/// Retry pacing timer used by the connection manager, one per egress
/// interface.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestRetryTimer {
    pub qnic_address: QnicAddr,
}

/// A message of a type the built-in decode table does not know.
///
/// Exotic deployments register event-bus translators keyed on `class_name`;
/// without one, publication yields a single UNKNOWN event.
#[derive(Debug, Clone, PartialEq)]
pub struct OtherMessage {
    pub class_name: String,
    pub name: String,
}

/// Every message a node can receive.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    BsmTiming(BsmTimingNotification),
    BsmResult(CombinedBsaResults),
    EppsTiming(EppsTimingNotification),
    EmitPhotonRequest(EmitPhotonRequest),
    SingleClickResult(SingleClickResult),
    MsmResult(MsmResult),
    StopEmitting(StopEmitting),
    StopEppsEmission(StopEppsEmission),
    PurificationResult(PurificationResult),
    SwappingResult(SwappingResult),
    RuleSetForwarding(InternalRuleSetForwarding),
    RuleSetForwardingApplication(InternalRuleSetForwardingApplication),
    LinkTomographyRuleSet(LinkTomographyRuleSet),
    ConnectionSetupRequest(ConnectionSetupRequest),
    ConnectionSetupResponse(ConnectionSetupResponse),
    RejectConnectionSetup(RejectConnectionSetupRequest),
    RequestRetryTimer(RequestRetryTimer),
    Other(OtherMessage),
}

impl Message {
    /// Message class name, used as the translator-registry key and in
    /// diagnostics.
    pub fn class_name(&self) -> &str {
        match self {
            Message::BsmTiming(_) => "BSMTimingNotification",
            Message::BsmResult(_) => "CombinedBSAresults",
            Message::EppsTiming(_) => "EPPSTimingNotification",
            Message::EmitPhotonRequest(_) => "EmitPhotonRequest",
            Message::SingleClickResult(_) => "SingleClickResult",
            Message::MsmResult(_) => "MSMResult",
            Message::StopEmitting(_) => "StopEmitting",
            Message::StopEppsEmission(_) => "StopEPPSEmission",
            Message::PurificationResult(_) => "PurificationResult",
            Message::SwappingResult(_) => "SwappingResult",
            Message::RuleSetForwarding(_) => "InternalRuleSetForwarding",
            Message::RuleSetForwardingApplication(_) => "InternalRuleSetForwarding_Application",
            Message::LinkTomographyRuleSet(_) => "LinkTomographyRuleSet",
            Message::ConnectionSetupRequest(_) => "ConnectionSetupRequest",
            Message::ConnectionSetupResponse(_) => "ConnectionSetupResponse",
            Message::RejectConnectionSetup(_) => "RejectConnectionSetupRequest",
            Message::RequestRetryTimer(_) => "RequestRetryTimer",
            Message::Other(other) => &other.class_name,
        }
    }

    /// Display name for log records. Equals the class name except for
    /// [`OtherMessage`], which carries its own.
    pub fn display_name(&self) -> &str {
        match self {
            Message::Other(other) => &other.name,
            _ => self.class_name(),
        }
    }
}

//! RuleSet delivery and per-rule protocol result messages.

use qrep_rules::RuleSet;
use qrep_types::NodeAddr;

/// Measurement outcome of one purification round, addressed to the runtime
/// executing the matching rule on this node.
#[derive(Debug, Clone, PartialEq)]
pub struct PurificationResult {
    pub ruleset_id: u64,
    pub shared_rule_tag: i32,
    pub sequence_number: i32,
    pub measurement_result: i32,
    /// Small integer purification protocol hint (see `PurType`).
    pub protocol: i32,
}

/// Correction announcement emitted by an entanglement swapper.
#[derive(Debug, Clone, PartialEq)]
pub struct SwappingResult {
    pub ruleset_id: u64,
    pub shared_rule_tag: i32,
    pub sequence_number: i32,
    pub correction_frame: i32,
    pub new_partner: NodeAddr,
}

/// Node-internal delivery of an accepted RuleSet to the rule engine.
#[derive(Debug, Clone, PartialEq)]
pub struct InternalRuleSetForwarding {
    pub ruleset_id: u64,
    pub ruleset: serde_json::Value,
}

/// Application-scoped variant of [`InternalRuleSetForwarding`].
///
/// `application_type == 0` is connection management; anything else is
/// ignored by the engine (and logged with the raw value preserved).
#[derive(Debug, Clone, PartialEq)]
pub struct InternalRuleSetForwardingApplication {
    pub ruleset_id: u64,
    pub ruleset: serde_json::Value,
    pub application_type: i32,
}

/// A link tomography RuleSet bundled as a typed value rather than wire JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkTomographyRuleSet {
    pub ruleset: RuleSet,
}

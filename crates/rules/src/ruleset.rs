//! RuleSet, Rule, condition and action schema.

use qrep_types::NodeAddr;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A partner endpoint named by a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerInterface {
    pub partner_address: NodeAddr,
}

impl PartnerInterface {
    pub fn new(partner_address: NodeAddr) -> Self {
        Self { partner_address }
    }
}

/// One clause of a rule's condition program.
///
/// All clauses of a condition must hold for the action to fire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "options", rename_all = "snake_case")]
pub enum ConditionClause {
    /// At least `num_resource` entangled pairs with the partner are bound.
    EnoughResource {
        interface: PartnerInterface,
        num_resource: usize,
    },
    /// Fewer than `num_measure` tomography measurements have been taken.
    MeasureCount {
        interface: PartnerInterface,
        num_measure: usize,
    },
    /// A swapping-correction message with this tag has arrived from the
    /// named swapper.
    SwappingCorrection {
        interface: PartnerInterface,
        shared_rule_tag: i32,
    },
    /// Bound pairs meet the fidelity threshold.
    Fidelity {
        interface: PartnerInterface,
        required_fidelity: f64,
    },
}

/// Condition program: a conjunction of clauses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Condition {
    pub clauses: Vec<ConditionClause>,
}

impl Condition {
    pub fn new(clauses: Vec<ConditionClause>) -> Self {
        Self { clauses }
    }
}

/// Action program of a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "options", rename_all = "snake_case")]
pub enum RuleAction {
    /// Fuse the pairs held with the two partners into one end-to-end pair.
    Swapping {
        interface: Vec<PartnerInterface>,
        remote_interface: Vec<PartnerInterface>,
        shared_rule_tag: i32,
    },
    /// Apply the correction announced by a swapper.
    SwappingCorrection {
        interface: Vec<PartnerInterface>,
        shared_rule_tag: i32,
    },
    /// Measure pairs with the other endpoint to estimate the link channel.
    Tomography {
        interface: Vec<PartnerInterface>,
        num_measure: usize,
        owner_address: NodeAddr,
    },
    /// Consume two pairs to distill one higher-fidelity pair.
    Purification {
        interface: Vec<PartnerInterface>,
        purification_type: String,
        shared_rule_tag: i32,
    },
}

/// A single rule: condition program, action program, partner fan-out, and
/// the message tags that pair it with rules on other nodes.
///
/// `send_tag` / `receive_tag` are `-1` when the rule neither emits nor
/// consumes tagged protocol messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub send_tag: i32,
    pub receive_tag: i32,
    pub interface: Vec<PartnerInterface>,
    pub condition: Condition,
    pub action: RuleAction,
}

impl Rule {
    pub fn new(
        name: impl Into<String>,
        send_tag: i32,
        receive_tag: i32,
        interface: Vec<PartnerInterface>,
        condition: Condition,
        action: RuleAction,
    ) -> Self {
        Self {
            name: name.into(),
            send_tag,
            receive_tag,
            interface,
            condition,
            action,
        }
    }
}

/// Error parsing a ruleset from its wire JSON.
#[derive(Debug, thiserror::Error)]
pub enum RuleSetParseError {
    #[error("ruleset JSON does not match the wire schema: {0}")]
    Schema(#[from] serde_json::Error),
}

/// An ordered list of rules owned by one node.
///
/// `num_rules` is part of the wire schema; [`RuleSet::push_rule`] keeps it in
/// sync, so construct rulesets through it rather than mutating `rules`
/// directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    pub ruleset_id: u64,
    pub owner_address: NodeAddr,
    pub num_rules: usize,
    pub rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(ruleset_id: u64, owner_address: NodeAddr) -> Self {
        Self {
            ruleset_id,
            owner_address,
            num_rules: 0,
            rules: Vec::new(),
        }
    }

    /// Append a rule, keeping `num_rules` consistent.
    pub fn push_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
        self.num_rules = self.rules.len();
    }

    /// Distinct partner addresses declared across all rules, in first-seen
    /// order. This is the fan-out used for qubit allocation.
    pub fn partners(&self) -> Vec<NodeAddr> {
        let mut partners = Vec::new();
        for rule in &self.rules {
            for interface in &rule.interface {
                if !partners.contains(&interface.partner_address) {
                    partners.push(interface.partner_address);
                }
            }
        }
        partners
    }

    /// Serialize to the wire JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("ruleset serialization is infallible")
    }

    /// Parse from the wire JSON value.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, RuleSetParseError> {
        Ok(serde_json::from_value(value.clone())?)
    }
}

impl fmt::Display for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RuleSet#{} owner={} rules={}",
            self.ruleset_id,
            self.owner_address,
            self.rules.len()
        )
    }
}

//! RuleSet data model.
//!
//! A RuleSet is a per-connection plan of [`Rule`]s executed at each
//! participating node. The connection manager synthesizes rulesets, embeds
//! them as JSON in setup responses, and the rule engine parses them back and
//! hands them to runtimes. The JSON shape here is the wire schema; it must
//! stay round-trip stable.

mod ruleset;

pub use ruleset::{
    Condition, ConditionClause, PartnerInterface, Rule, RuleAction, RuleSet, RuleSetParseError,
};

//! Connection manager.
//!
//! The control-plane sibling of the rule engine. For an application request
//! it relays `ConnectionSetupRequest`s hop by hop, synthesizes per-node
//! RuleSets at the responder, deduplicates `ConnectionSetupResponse`s, and
//! hands accepted RuleSets to the engine via internal forwarding messages.
//! It owns the egress-interface reservation table and the per-interface
//! retry state machines.

mod config;
mod manager;
mod purify;
mod routing;
mod synthesis;

pub use config::{ConfigError, ConnectionManagerConfig};
pub use manager::{
    CmEventChannel, CmProtocolType, CmSelfTiming, ConnectionManager, DecodedCmEvent, RetryState,
};
pub use purify::PurType;
pub use routing::{RoutingDaemon, StaticRoutingDaemon};
pub use synthesis::synthesize_swap_tree;

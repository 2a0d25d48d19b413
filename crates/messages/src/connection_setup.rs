//! Connection setup control messages.

use qrep_types::{NodeAddr, QnicAddr, QnicKind};

/// One qnic endpoint recorded along the accumulated path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QnicConnection {
    pub kind: QnicKind,
    pub index: i32,
    pub address: QnicAddr,
}

/// The pair of interfaces an intermediate node contributes to the path:
/// the one facing the initiator (`left`) and the one facing the responder
/// (`right`). The initiator's own entry has no left side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QnicPairInfo {
    pub left: Option<QnicConnection>,
    pub right: QnicConnection,
}

/// Application request to establish end-to-end entanglement, relayed hop by
/// hop toward the responder while accumulating the path.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSetupRequest {
    pub application_id: i32,
    /// End-to-end endpoints.
    pub actual_src_addr: NodeAddr,
    pub actual_dest_addr: NodeAddr,
    /// Current hop endpoints (rewritten at each relay).
    pub src_addr: NodeAddr,
    pub dest_addr: NodeAddr,
    pub num_measure: usize,
    pub number_of_required_bell_pairs: usize,
    /// Node addresses accumulated along the path, initiator first.
    pub stack_of_qnode_indexes: Vec<NodeAddr>,
    /// Interface pairs accumulated along the path, aligned with the node
    /// stack.
    pub stack_of_qnics: Vec<QnicPairInfo>,
    /// Connection session for response deduplication; `0` is legacy.
    pub connection_session_id: i32,
    pub connection_attempt: i32,
}

/// Responder-issued reply carrying the RuleSet for one participating node.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSetupResponse {
    pub application_id: i32,
    pub actual_src_addr: NodeAddr,
    pub actual_dest_addr: NodeAddr,
    pub src_addr: NodeAddr,
    pub dest_addr: NodeAddr,
    pub ruleset_id: u64,
    /// The node-specific RuleSet in wire JSON form.
    pub ruleset: serde_json::Value,
    pub application_type: i32,
    pub stack_of_qnode_indexes: Vec<NodeAddr>,
    pub connection_session_id: i32,
    pub connection_attempt: i32,
}

/// Rejection traveling back toward the initiator, unwinding reservations.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectConnectionSetupRequest {
    pub application_id: i32,
    pub actual_src_addr: NodeAddr,
    pub actual_dest_addr: NodeAddr,
    pub number_of_required_bell_pairs: usize,
}

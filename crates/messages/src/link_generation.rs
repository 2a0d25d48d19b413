//! Link-layer entanglement generation messages (MIM and MSM protocols).

use qrep_types::{NodeAddr, PauliOperator, QnicKind, SimTime};

/// Round timing dispatched by a midpoint Bell-state analyzer (MIM).
///
/// Tells the node when to emit the first photon of the next train and at
/// what interval.
#[derive(Debug, Clone, PartialEq)]
pub struct BsmTimingNotification {
    pub qnic_kind: QnicKind,
    pub qnic_index: i32,
    pub first_photon_emit_time: SimTime,
    pub interval: SimTime,
}

/// Batched Bell-state measurement results for one emission train (MIM).
///
/// `successful_photon_indices[i]` is the emission-order index of the i-th
/// heralded photon; `correction_operations[i]` the Pauli correction this
/// node must apply to its half of that pair.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedBsaResults {
    pub qnic_kind: QnicKind,
    pub qnic_index: i32,
    pub neighbor_address: NodeAddr,
    pub successful_photon_indices: Vec<usize>,
    pub correction_operations: Vec<PauliOperator>,
}

impl CombinedBsaResults {
    pub fn success_count(&self) -> usize {
        self.successful_photon_indices.len()
    }
}

/// Round timing dispatched by an entangled-photon-pair source (MSM).
#[derive(Debug, Clone, PartialEq)]
pub struct EppsTimingNotification {
    pub qnic_index: i32,
    pub other_qnic_parent_addr: NodeAddr,
    pub other_qnic_index: i32,
    pub epps_addr: NodeAddr,
    pub total_travel_time: SimTime,
    pub first_photon_emit_time: SimTime,
    pub interval: SimTime,
}

/// Self-scheduled timer driving the photon emission loop of one interface.
#[derive(Debug, Clone, PartialEq)]
pub struct EmitPhotonRequest {
    pub qnic_kind: QnicKind,
    pub qnic_index: i32,
    pub interval_between_photons: SimTime,
    /// Midpoint-source protocol round (MSM) rather than a MIM train.
    pub msm: bool,
    /// First photon of the train; cleared after each emission.
    pub first: bool,
}

/// Local detector click outcome for one MSM photon.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleClickResult {
    pub qnic_index: i32,
    pub success: bool,
    pub correction_operation: PauliOperator,
}

/// A node's measurement outcome for one MSM photon index, exchanged between
/// the two endpoints of an MSM link.
#[derive(Debug, Clone, PartialEq)]
pub struct MsmResult {
    /// Partner-side interface index the result is addressed to.
    pub qnic_index: i32,
    pub qnic_kind: QnicKind,
    pub photon_index: u64,
    pub success: bool,
    pub correction_operation: PauliOperator,
    pub src_addr: NodeAddr,
    pub dest_addr: NodeAddr,
    /// Raw message kind tag carried on the wire.
    pub kind: i32,
}

/// Tells a node to stop the emission train on one interface.
#[derive(Debug, Clone, PartialEq)]
pub struct StopEmitting {
    pub qnic_address: i32,
}

/// Tells an entangled-photon-pair source to stop emitting.
#[derive(Debug, Clone, PartialEq)]
pub struct StopEppsEmission {
    pub src_addr: NodeAddr,
    pub dest_addr: NodeAddr,
}

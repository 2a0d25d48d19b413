//! Per-interface MSM link protocol state.

use qrep_types::{NodeAddr, PauliOperator, SimTime};
use std::collections::HashMap;

/// Scratch state of one midpoint-source (MSM) link.
///
/// `photon_index_counter` numbers photons across the whole session and
/// doubles as the is-this-an-MSM-link marker: it stays zero on interfaces
/// that never saw an EPPS timing round.
#[derive(Debug, Default, Clone)]
pub struct MsmInfo {
    /// Monotonic count of photons emitted (or skipped) this session.
    pub photon_index_counter: u64,
    /// Index of the next local emission slot.
    pub iteration_index: u64,
    /// Outstanding photons: iteration slot → local qubit index.
    pub qubit_info: HashMap<u64, usize>,
    /// Locally-successful photons awaiting the partner's matching result:
    /// photon index → (local qubit index, local correction operation).
    pub qubit_postprocess_info: HashMap<u64, (usize, PauliOperator)>,
    /// Partner endpoint of this link.
    pub partner_address: NodeAddr,
    /// Interface index on the partner node.
    pub partner_qnic_index: i32,
    /// Address of the entangled-photon-pair source in the middle.
    pub epps_address: NodeAddr,
    /// Round-trip travel time for pacing result exchanges.
    pub total_travel_time: SimTime,
}

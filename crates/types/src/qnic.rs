//! Quantum network interface identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of quantum network interface on a node.
///
/// A node carries separate banks of each kind; an interface is identified by
/// `(kind, index)` within a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QnicKind {
    /// Emitter interface toward a midpoint Bell-state analyzer (MIM links).
    E,
    /// Receiver-side interface (the passive end of a MIM link).
    R,
    /// Receiver interface fed by an entangled-photon-pair source (MSM links).
    Rp,
}

impl QnicKind {
    /// Numeric tag used in log records and worker payloads.
    pub fn as_index(&self) -> i32 {
        match self {
            QnicKind::E => 0,
            QnicKind::R => 1,
            QnicKind::Rp => 2,
        }
    }
}

impl fmt::Display for QnicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QnicKind::E => "QNIC_E",
            QnicKind::R => "QNIC_R",
            QnicKind::Rp => "QNIC_RP",
        };
        f.write_str(s)
    }
}

/// Key of a stationary qubit within a node: interface kind, interface index,
/// qubit index inside the interface.
///
/// Every cross-component reference to a qubit is one of these keys into the
/// node's qubit arena; no component holds ownership of qubit state directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QubitKey {
    pub kind: QnicKind,
    pub qnic_index: i32,
    pub qubit_index: usize,
}

impl QubitKey {
    pub fn new(kind: QnicKind, qnic_index: i32, qubit_index: usize) -> Self {
        Self {
            kind,
            qnic_index,
            qubit_index,
        }
    }
}

/// Photon pulse flag: first photon of an emission train.
pub const PULSE_BEGIN: u8 = 1 << 0;
/// Photon pulse flag: last photon of an emission train.
pub const PULSE_END: u8 = 1 << 1;

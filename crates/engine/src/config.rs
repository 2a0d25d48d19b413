//! Engine configuration.

use qrep_types::{NodeAddr, QnicKind};

/// Node-local parameters of the rule engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// This node's address.
    pub address: NodeAddr,
    /// Emitter interfaces (MIM links toward a midpoint analyzer).
    pub number_of_qnics: i32,
    /// Receiver interfaces.
    pub number_of_qnics_r: i32,
    /// Pair-source receiver interfaces (MSM links).
    pub number_of_qnics_rp: i32,
    /// Stationary qubits per interface.
    pub qubits_per_qnic: usize,
}

impl EngineConfig {
    pub fn total_number_of_qnics(&self) -> i32 {
        self.number_of_qnics + self.number_of_qnics_r + self.number_of_qnics_rp
    }

    /// `(kind, count, qubits)` triples for building the qubit arena.
    pub fn qnic_counts(&self) -> Vec<(QnicKind, i32, usize)> {
        vec![
            (QnicKind::E, self.number_of_qnics, self.qubits_per_qnic),
            (QnicKind::R, self.number_of_qnics_r, self.qubits_per_qnic),
            (QnicKind::Rp, self.number_of_qnics_rp, self.qubits_per_qnic),
        ]
    }

    /// Every `(kind, index)` interface on the node, in kind order.
    pub fn interfaces(&self) -> Vec<(QnicKind, i32)> {
        let mut interfaces = Vec::new();
        for index in 0..self.number_of_qnics {
            interfaces.push((QnicKind::E, index));
        }
        for index in 0..self.number_of_qnics_r {
            interfaces.push((QnicKind::R, index));
        }
        for index in 0..self.number_of_qnics_rp {
            interfaces.push((QnicKind::Rp, index));
        }
        interfaces
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            address: NodeAddr(0),
            number_of_qnics: 1,
            number_of_qnics_r: 1,
            number_of_qnics_rp: 0,
            qubits_per_qnic: 2,
        }
    }
}

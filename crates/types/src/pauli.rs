//! Pauli operators and measurement bases.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Single-qubit Pauli operator.
///
/// Carried on link-generation results as the correction a node must apply to
/// its half of a heralded pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PauliOperator {
    #[default]
    I,
    X,
    Y,
    Z,
}

impl fmt::Display for PauliOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PauliOperator::I => "I",
            PauliOperator::X => "X",
            PauliOperator::Y => "Y",
            PauliOperator::Z => "Z",
        };
        f.write_str(s)
    }
}

/// Measurement basis accepted by the physical backends.
///
/// The error-basis backend refuses `Bell` (and `Y` for noiseless
/// measurements); the dense-operator backend forwards the label to the
/// worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeasureBasis {
    Z,
    X,
    Y,
    Bell,
}

impl MeasureBasis {
    /// Wire label used in worker requests.
    pub fn label(&self) -> &'static str {
        match self {
            MeasureBasis::Z => "Z",
            MeasureBasis::X => "X",
            MeasureBasis::Y => "Y",
            MeasureBasis::Bell => "Bell",
        }
    }
}

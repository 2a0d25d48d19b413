//! Hardware control port.

use qrep_types::{QnicKind, QubitKey};
use std::sync::{Arc, Mutex};

/// Real-time hardware control: photon emission and qubit reinitialization.
///
/// Gate application and measurement go through the physical backend; this
/// port covers the signals that reach interface hardware directly.
pub trait RealtimeController: Send {
    /// Trigger a photon emission pulse on one stationary qubit.
    /// `pulse` carries the train begin/end flags.
    fn emit_photon(&mut self, kind: QnicKind, qnic_index: i32, qubit_index: usize, pulse: u8);

    /// Reset a stationary qubit to its ground state.
    fn reinitialize_qubit(&mut self, kind: QnicKind, qnic_index: i32, qubit_index: usize);
}

/// One recorded hardware call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareCall {
    EmitPhoton {
        qubit: QubitKey,
        pulse: u8,
    },
    Reinitialize {
        qubit: QubitKey,
    },
}

/// Controller that records calls for assertions. The call log is shared so
/// tests keep a handle after moving the controller into the engine.
#[derive(Debug, Default, Clone)]
pub struct RecordingController {
    calls: Arc<Mutex<Vec<HardwareCall>>>,
}

impl RecordingController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<HardwareCall> {
        self.calls.lock().expect("hardware call log poisoned").clone()
    }

    pub fn emitted(&self) -> Vec<QubitKey> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                HardwareCall::EmitPhoton { qubit, .. } => Some(qubit),
                _ => None,
            })
            .collect()
    }

    pub fn reinitialized(&self) -> Vec<QubitKey> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                HardwareCall::Reinitialize { qubit } => Some(qubit),
                _ => None,
            })
            .collect()
    }
}

impl RealtimeController for RecordingController {
    fn emit_photon(&mut self, kind: QnicKind, qnic_index: i32, qubit_index: usize, pulse: u8) {
        self.calls
            .lock()
            .expect("hardware call log poisoned")
            .push(HardwareCall::EmitPhoton {
                qubit: QubitKey::new(kind, qnic_index, qubit_index),
                pulse,
            });
    }

    fn reinitialize_qubit(&mut self, kind: QnicKind, qnic_index: i32, qubit_index: usize) {
        self.calls
            .lock()
            .expect("hardware call log poisoned")
            .push(HardwareCall::Reinitialize {
                qubit: QubitKey::new(kind, qnic_index, qubit_index),
            });
    }
}

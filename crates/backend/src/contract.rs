//! The uniform backend contract.

use qrep_types::{MeasureBasis, SimTime};
use serde::{Deserialize, Serialize};

/// Capability bit: classic error-basis (Pauli frame) modeling.
pub const CAP_LEGACY_ERROR_MODEL: u32 = 1 << 0;
/// Capability bit: dense-operator state evolution.
pub const CAP_DENSE_OPERATOR: u32 = 1 << 1;
/// Capability bit: Fock-mode (photonic) operations.
pub const CAP_FOCK_MODE: u32 = 1 << 2;
/// Capability bit: schema-driven advanced operations.
pub const CAP_ADVANCED_OPERATION: u32 = 1 << 3;

/// Per-operation execution context handed to the backend.
///
/// `seed` is a process-monotonic operation counter, so two operations at the
/// same `now` remain distinguishable.
#[derive(Debug, Clone, Default)]
pub struct BackendContext {
    pub seed: u64,
    pub now: SimTime,
    pub scenario_id: String,
    pub backend_name: String,
}

/// Reference to one stationary qubit as the backend addresses it.
///
/// All fields are non-negative for a valid handle; any negative field makes
/// the handle invalid and operations on it fail with
/// `[category=invalid_payload]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QubitHandle {
    pub node_id: i32,
    pub qnic_index: i32,
    pub qnic_type: i32,
    pub qubit_index: i32,
}

impl QubitHandle {
    pub fn is_valid(&self) -> bool {
        self.node_id >= 0 && self.qnic_index >= 0 && self.qnic_type >= 0 && self.qubit_index >= 0
    }
}

/// Outcome of one backend operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    pub fidelity_estimate: f64,
    pub qubit_lost: bool,
    pub relaxed_to_ground: bool,
    pub excited_to_plus: bool,
    pub measured_plus: bool,
    #[serde(default)]
    pub message: String,
}

impl Default for OperationResult {
    fn default() -> Self {
        Self {
            success: false,
            fidelity_estimate: 1.0,
            qubit_lost: false,
            relaxed_to_ground: false,
            excited_to_plus: false,
            measured_plus: false,
            message: String::new(),
        }
    }
}

impl OperationResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn measured(plus: bool) -> Self {
        Self {
            success: true,
            measured_plus: plus,
            ..Default::default()
        }
    }

    pub fn failed() -> Self {
        Self::default()
    }

    pub fn failed_with(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }
}

/// Schema-driven operation used by advanced backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalOperation {
    pub kind: String,
    pub targets: Vec<QubitHandle>,
    pub controls: Vec<QubitHandle>,
    pub ancillary_modes: Vec<i32>,
    pub duration: f64,
    pub params: Vec<f64>,
    pub basis: String,
    pub payload: serde_json::Value,
}

impl Default for PhysicalOperation {
    fn default() -> Self {
        Self {
            kind: String::new(),
            targets: Vec::new(),
            controls: Vec::new(),
            ancillary_modes: Vec::new(),
            duration: 0.0,
            params: Vec::new(),
            basis: String::new(),
            payload: serde_json::Value::Object(serde_json::Map::new()),
        }
    }
}

/// Uniform contract over a concrete quantum-state backend.
pub trait PhysicalBackend: Send {
    /// Advertised capability bitset.
    fn capabilities(&self) -> u32;

    /// Opportunistic decoherence step.
    fn apply_noise(&mut self, ctx: &BackendContext, qubit: QubitHandle) -> OperationResult;

    /// Noisy gate. Gate names normalize case-insensitively; the recognized
    /// set is at minimum {X, Y, Z, H, S, Sdg, CNOT}.
    fn apply_gate(
        &mut self,
        ctx: &BackendContext,
        gate: &str,
        qubits: &[QubitHandle],
    ) -> OperationResult;

    /// Error-free gate; recognized set {X, Z, H, CNOT}.
    fn apply_noiseless_gate(
        &mut self,
        ctx: &BackendContext,
        gate: &str,
        qubits: &[QubitHandle],
    ) -> OperationResult;

    fn measure(
        &mut self,
        ctx: &BackendContext,
        qubit: QubitHandle,
        basis: MeasureBasis,
    ) -> OperationResult;

    /// Noiseless measurement; refuses Y and Bell bases.
    fn measure_noiseless(
        &mut self,
        ctx: &BackendContext,
        qubit: QubitHandle,
        basis: MeasureBasis,
        force_plus: bool,
    ) -> OperationResult;

    /// Noiseless H on `source` then noiseless CNOT source→target.
    fn generate_entanglement(
        &mut self,
        ctx: &BackendContext,
        source: QubitHandle,
        target: QubitHandle,
    ) -> OperationResult;

    /// Schema-driven entry point for advanced backends. Backends without
    /// the capability reject every kind.
    fn apply_operation(
        &mut self,
        ctx: &BackendContext,
        operation: &PhysicalOperation,
    ) -> OperationResult {
        let _ = (ctx, operation);
        OperationResult::failed_with("operation not supported")
    }
}

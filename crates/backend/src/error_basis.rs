//! Error-basis (Pauli frame) backend.

use crate::config::BackendConfig;
use crate::contract::{
    BackendContext, OperationResult, PhysicalBackend, QubitHandle, CAP_LEGACY_ERROR_MODEL,
};
use qrep_types::MeasureBasis;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;

/// One tracked qubit: its Pauli error frame plus a log of every gate applied
/// to it. The log is the observable side effect tests assert on.
#[derive(Debug, Default, Clone)]
pub struct ErrorQubit {
    pub x_error: bool,
    pub z_error: bool,
    applied_gates: Vec<String>,
}

impl ErrorQubit {
    /// Number of times the (canonical, uppercase) gate was applied.
    pub fn gate_applications(&self, gate: &str) -> usize {
        self.applied_gates.iter().filter(|g| *g == gate).count()
    }

    fn record(&mut self, gate: &str) {
        self.applied_gates.push(gate.to_string());
    }
}

/// Arena of error-basis qubits, keyed by handle. Qubits materialize on first
/// touch.
#[derive(Debug, Default)]
pub struct QubitRegister {
    qubits: HashMap<QubitHandle, ErrorQubit>,
}

impl QubitRegister {
    pub fn qubit(&mut self, handle: QubitHandle) -> &mut ErrorQubit {
        self.qubits.entry(handle).or_default()
    }

    pub fn get(&self, handle: QubitHandle) -> Option<&ErrorQubit> {
        self.qubits.get(&handle)
    }
}

/// Pauli-frame error tracking backend.
///
/// Gates act on the error frame by conjugation; measurements draw outcomes
/// from a seeded RNG and flip them according to the accumulated frame and
/// the configured measurement error rates.
pub struct ErrorBasisBackend {
    register: QubitRegister,
    rng: ChaCha8Rng,
    config: BackendConfig,
}

impl ErrorBasisBackend {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            register: QubitRegister::default(),
            rng: ChaCha8Rng::seed_from_u64(config.rng_seed),
            config,
        }
    }

    /// Direct register access for inspection.
    pub fn register(&self) -> &QubitRegister {
        &self.register
    }

    fn resolve(&mut self, handle: QubitHandle) -> Option<&mut ErrorQubit> {
        if !handle.is_valid() {
            return None;
        }
        Some(self.register.qubit(handle))
    }

    /// Conjugate the error frame through an ideal gate.
    fn conjugate_frame(qubit: &mut ErrorQubit, gate: &str) {
        match gate {
            // H exchanges X and Z errors.
            "H" => std::mem::swap(&mut qubit.x_error, &mut qubit.z_error),
            // S maps X to Y: an X error gains a Z component. Sdg likewise.
            "S" | "SDG" => qubit.z_error ^= qubit.x_error,
            // Paulis commute with the frame up to phase.
            "X" | "Y" | "Z" => {}
            _ => {}
        }
    }

    fn apply_single(&mut self, gate: &str, handle: QubitHandle, noisy: bool) -> OperationResult {
        let gate_error_rate = self.config.gate_error_rate;
        let (rx, ry, rz) = (
            self.config.gate_x_error_ratio,
            self.config.gate_y_error_ratio,
            self.config.gate_z_error_ratio,
        );
        let roll: f64 = self.rng.gen();
        let ratio_roll: f64 = self.rng.gen();
        let Some(qubit) = self.resolve(handle) else {
            return OperationResult::failed();
        };
        qubit.record(gate);
        Self::conjugate_frame(qubit, gate);
        if noisy && roll < gate_error_rate {
            let total = rx + ry + rz;
            if total > 0.0 {
                let pick = ratio_roll * total;
                if pick < rx {
                    qubit.x_error = !qubit.x_error;
                } else if pick < rx + ry {
                    qubit.x_error = !qubit.x_error;
                    qubit.z_error = !qubit.z_error;
                } else {
                    qubit.z_error = !qubit.z_error;
                }
            }
        }
        OperationResult::ok()
    }

    fn apply_cnot(&mut self, source: QubitHandle, target: QubitHandle) -> OperationResult {
        if !source.is_valid() || !target.is_valid() {
            return OperationResult::failed();
        }
        // X errors propagate control→target, Z errors target→control.
        let src_x = {
            let qubit = self.register.qubit(source);
            qubit.record("CNOT");
            qubit.x_error
        };
        let tgt_z = {
            let qubit = self.register.qubit(target);
            qubit.record("CNOT");
            qubit.x_error ^= src_x;
            qubit.z_error
        };
        self.register.qubit(source).z_error ^= tgt_z;
        OperationResult::ok()
    }

    fn measurement_error_rate(&self, basis: MeasureBasis) -> f64 {
        match basis {
            MeasureBasis::X => self.config.measurement_x_error_rate,
            MeasureBasis::Y => self.config.measurement_y_error_rate,
            MeasureBasis::Z => self.config.measurement_z_error_rate,
            MeasureBasis::Bell => 0.0,
        }
    }
}

impl PhysicalBackend for ErrorBasisBackend {
    fn capabilities(&self) -> u32 {
        CAP_LEGACY_ERROR_MODEL
    }

    fn apply_noise(&mut self, _ctx: &BackendContext, qubit: QubitHandle) -> OperationResult {
        let rate = self.config.memory_error_rate;
        let roll: f64 = self.rng.gen();
        let flip_z: bool = self.rng.gen();
        let Some(tracked) = self.resolve(qubit) else {
            return OperationResult::failed();
        };
        if roll < rate {
            if flip_z {
                tracked.z_error = !tracked.z_error;
            } else {
                tracked.x_error = !tracked.x_error;
            }
        }
        OperationResult::ok()
    }

    fn apply_gate(
        &mut self,
        _ctx: &BackendContext,
        gate: &str,
        qubits: &[QubitHandle],
    ) -> OperationResult {
        if qubits.is_empty() {
            return OperationResult::failed();
        }
        match gate.to_ascii_uppercase().as_str() {
            g @ ("X" | "Y" | "Z" | "H" | "S") => self.apply_single(g, qubits[0], true),
            "SDG" | "S_DG" => self.apply_single("SDG", qubits[0], true),
            "CNOT" => {
                if qubits.len() < 2 {
                    return OperationResult::failed();
                }
                self.apply_cnot(qubits[0], qubits[1])
            }
            _ => OperationResult::failed(),
        }
    }

    fn apply_noiseless_gate(
        &mut self,
        _ctx: &BackendContext,
        gate: &str,
        qubits: &[QubitHandle],
    ) -> OperationResult {
        if qubits.is_empty() {
            return OperationResult::failed();
        }
        match gate.to_ascii_uppercase().as_str() {
            g @ ("X" | "Z" | "H") => self.apply_single(g, qubits[0], false),
            "CNOT" => {
                if qubits.len() < 2 {
                    return OperationResult::failed();
                }
                self.apply_cnot(qubits[0], qubits[1])
            }
            _ => OperationResult::failed(),
        }
    }

    fn measure(
        &mut self,
        _ctx: &BackendContext,
        qubit: QubitHandle,
        basis: MeasureBasis,
    ) -> OperationResult {
        if basis == MeasureBasis::Bell {
            return OperationResult::failed();
        }
        let error_rate = self.measurement_error_rate(basis);
        let raw: bool = self.rng.gen();
        let misread: f64 = self.rng.gen();
        let Some(tracked) = self.resolve(qubit) else {
            return OperationResult::failed();
        };
        let flipped = match basis {
            MeasureBasis::Z => tracked.x_error,
            MeasureBasis::X => tracked.z_error,
            MeasureBasis::Y => tracked.x_error ^ tracked.z_error,
            MeasureBasis::Bell => unreachable!(),
        };
        let mut outcome = raw ^ flipped;
        if misread < error_rate {
            outcome = !outcome;
        }
        OperationResult::measured(outcome)
    }

    fn measure_noiseless(
        &mut self,
        _ctx: &BackendContext,
        qubit: QubitHandle,
        basis: MeasureBasis,
        force_plus: bool,
    ) -> OperationResult {
        if matches!(basis, MeasureBasis::Y | MeasureBasis::Bell) {
            return OperationResult::failed();
        }
        let raw: bool = self.rng.gen();
        if self.resolve(qubit).is_none() {
            return OperationResult::failed();
        }
        if force_plus {
            OperationResult::measured(true)
        } else {
            OperationResult::measured(raw)
        }
    }

    fn generate_entanglement(
        &mut self,
        ctx: &BackendContext,
        source: QubitHandle,
        target: QubitHandle,
    ) -> OperationResult {
        let result = self.apply_noiseless_gate(ctx, "H", &[source]);
        if !result.success {
            return result;
        }
        self.apply_noiseless_gate(ctx, "CNOT", &[source, target])
    }
}

//! Dense-operator backend over an external worker.

use crate::config::BackendConfig;
use crate::contract::{
    BackendContext, OperationResult, PhysicalBackend, PhysicalOperation, QubitHandle,
    CAP_ADVANCED_OPERATION, CAP_DENSE_OPERATOR, CAP_LEGACY_ERROR_MODEL,
};
use crate::worker::{operation_json, WorkerRequest, WorkerTransport};
use qrep_types::MeasureBasis;
use serde_json::{json, Value};
use tracing::debug;

/// Alias table mapping operation kind spellings onto canonical kinds.
///
/// Source-derived; preserved verbatim rather than re-derived. Keys are
/// matched after lowercasing and `-`/space → `_` folding.
const KIND_ALIASES: &[(&str, &str)] = &[
    ("no_op", "noop"),
    ("hominterference", "hom_interference"),
    ("measure", "measurement"),
    ("kerreffect", "kerr"),
    ("kerr_effect", "kerr"),
    ("kerr_effects", "kerr"),
    ("cross_kerring", "cross_kerr"),
    ("cross_kerr_effect", "cross_kerr"),
    ("crosskerr", "cross_kerr"),
    ("amplitude_damping", "amplitude_damping"),
    ("amplitudedamping", "amplitude_damping"),
    ("bit_flip", "bitflip"),
    ("phase_flip", "phaseflip"),
    ("depolarizing_channel", "depolarizing"),
    ("thermal_relaxation", "thermal_relaxation"),
    ("polarization_rotation", "polarization_rotation"),
    ("polarizationrotation", "polarization_rotation"),
    ("polarization_decoherence", "polarization_decoherence"),
    ("polarizationdecoherence", "polarization_decoherence"),
    ("mode_coupling", "mode_coupling"),
    ("loss_mode", "loss_mode"),
    ("two_mode_squeezing", "two_mode_squeezing"),
    ("two_modes_squeezing", "two_mode_squeezing"),
    ("fock_loss", "fock_loss"),
    ("photon_number_cutoff", "photon_number_cutoff"),
    ("hom", "hom_interference"),
    ("twophoton_interference", "hom_interference"),
    ("two_photon_interference", "hom_interference"),
    ("bs_interference", "hom_interference"),
    ("bsinterference", "hom_interference"),
    ("source_multiphoton", "source_multiphoton"),
    ("multiphoton_source", "source_multiphoton"),
    ("multi_photon_source", "source_multiphoton"),
    ("photon_source", "source_multiphoton"),
    ("beamsplitter", "beam_splitter"),
    ("phaseshift", "phase_shift"),
    ("phaseshifter", "phase_shift"),
    ("phase_shifter", "phase_shift"),
    ("channel_dispersion", "dispersion"),
    ("fibre_dispersion", "dispersion"),
    ("fiber_dispersion", "dispersion"),
    ("phase_mod", "phase_modulation"),
    ("phase_modulator", "phase_modulation"),
    ("self_phase_mod", "self_phase_modulation"),
    ("self_phase_modulator", "self_phase_modulation"),
    ("cross_phase_mod", "cross_phase_modulation"),
    ("cross_phase_modulator", "cross_phase_modulation"),
    ("dephase", "dephasing"),
    ("decay", "decoherence"),
    ("timingjitter", "timing_jitter"),
    ("timing_jitter", "timing_jitter"),
    ("time_jitter", "timing_jitter"),
    ("timejitter", "timing_jitter"),
    ("jitter", "timing_jitter"),
    ("dark_count", "detection"),
    ("detector", "detection"),
    ("heraldedentanglement", "heralded_entanglement"),
];

/// Advanced operation kinds the worker accepts.
const SUPPORTED_ADVANCED_KINDS: &[&str] = &[
    "kerr",
    "cross_kerr",
    "beam_splitter",
    "phase_shift",
    "phase_modulation",
    "self_phase_modulation",
    "cross_phase_modulation",
    "decoherence",
    "dephasing",
    "nonlinear",
    "detection",
    "delay",
    "hamiltonian",
    "lindblad",
    "heralded_entanglement",
    "timing_jitter",
    "dispersion",
    "multiphoton",
    "source_multiphoton",
    "hom_interference",
    "squeezing",
    "loss",
    "reset",
    "jitter",
    "attenuation",
    "amplitude_damping",
    "thermal_relaxation",
    "bitflip",
    "phaseflip",
    "depolarizing",
    "polarization_rotation",
    "polarization_decoherence",
    "mode_coupling",
    "loss_mode",
    "two_mode_squeezing",
    "fock_loss",
    "photon_number_cutoff",
];

/// Lowercase and fold separators, then apply the alias table.
pub(crate) fn normalize_kind(kind: &str) -> String {
    let mut normalized: String = kind
        .to_ascii_lowercase()
        .chars()
        .map(|ch| if ch == '-' || ch == ' ' { '_' } else { ch })
        .collect();
    while normalized.contains("__") {
        normalized = normalized.replace("__", "_");
    }
    for (alias, canonical) in KIND_ALIASES {
        if *alias == normalized {
            return (*canonical).to_string();
        }
    }
    normalized
}

/// `qutip` / `qutip_density_matrix` / `qutip_sv` aliases onto worker labels.
fn normalize_backend_label(backend_type: &str) -> String {
    match backend_type.to_ascii_lowercase().as_str() {
        "qutip" | "qutip_density_matrix" => "qutip_density_matrix".to_string(),
        "qutip_sv" | "qutip_state_vector" => "qutip_state_vector".to_string(),
        other => other.to_string(),
    }
}

fn has_valid_targets(targets: &[QubitHandle]) -> bool {
    !targets.is_empty() && targets.iter().all(QubitHandle::is_valid)
}

fn has_valid_controls(controls: &[QubitHandle]) -> bool {
    controls.iter().all(QubitHandle::is_valid)
}

fn target_count_mismatch(kind: &str, targets: &[QubitHandle]) -> bool {
    if kind == "measurement" || kind == "noise" {
        targets.len() != 1
    } else {
        targets.is_empty()
    }
}

fn target_count_message(kind: &str, count: usize) -> String {
    match kind {
        "measurement" => format!(
            "dense backend measurement operation expects exactly one target, target_count={count}"
        ),
        "noise" => format!(
            "dense backend noise operation expects exactly one target, target_count={count}"
        ),
        _ => format!("dense backend operation is missing target(s), target_count={count}"),
    }
}

/// Dense-operator backend delegating to a worker process.
pub struct DenseOperatorBackend<T: WorkerTransport> {
    transport: T,
    backend_type: String,
    config: BackendConfig,
    runtime_checked: bool,
    runtime_available: bool,
    runtime_check_error: String,
}

impl<T: WorkerTransport> DenseOperatorBackend<T> {
    pub fn new(transport: T, backend_type: impl Into<String>, config: BackendConfig) -> Self {
        Self {
            transport,
            backend_type: backend_type.into(),
            config,
            runtime_checked: false,
            runtime_available: false,
            runtime_check_error: String::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn backend_label(&self) -> String {
        normalize_backend_label(&self.backend_type)
    }

    fn unsupported(reason: impl Into<String>) -> OperationResult {
        OperationResult::failed_with(reason)
    }

    /// One cached probe of the worker runtime.
    fn runtime_available(&mut self) -> bool {
        if self.runtime_checked {
            return self.runtime_available;
        }
        self.runtime_checked = true;
        let backend_config = self.config.worker_parameters(&self.backend_label());
        match self.transport.check_runtime(&backend_config) {
            Ok(()) => {
                self.runtime_available = true;
            }
            Err(reason) => {
                self.runtime_check_error =
                    format!("dense backend dependency check failed: {reason} [category=qutip_import]");
                self.runtime_available = false;
            }
        }
        self.runtime_available
    }

    fn execute(&mut self, ctx: &BackendContext, operation: &PhysicalOperation) -> OperationResult {
        if !self.runtime_available() {
            return Self::unsupported(self.runtime_check_error.clone());
        }
        let label = self.backend_label();
        let mut op_json = operation_json(operation);
        if !op_json["payload"].is_object() {
            op_json["payload"] = json!({});
        }
        op_json["payload"]["backend_name"] = json!(label);
        let request = WorkerRequest {
            backend_type: ctx.backend_name.clone(),
            scenario_id: ctx.scenario_id.clone(),
            seed: ctx.seed,
            time: ctx.now.as_secs_f64(),
            operation: op_json,
            backend_config: self.config.worker_parameters(&label),
        };
        debug!(kind = %operation.kind, seed = ctx.seed, "dispatching operation to worker");
        match self.transport.execute(&request) {
            Ok(response) => response.into(),
            Err(reason) => Self::unsupported(reason),
        }
    }

    fn run_unitary(
        &mut self,
        ctx: &BackendContext,
        gate: &str,
        qubits: &[QubitHandle],
        context: &str,
    ) -> OperationResult {
        if gate.is_empty() {
            return Self::unsupported("dense backend unitary request missing gate");
        }
        if qubits.is_empty() {
            return Self::unsupported("dense backend unitary request missing target(s)");
        }
        if !qubits.iter().all(QubitHandle::is_valid) {
            return Self::unsupported("dense backend unitary request received invalid qubit handle");
        }
        let operation = PhysicalOperation {
            kind: "unitary".into(),
            targets: qubits.to_vec(),
            payload: json!({
                "kind": "unitary",
                "gate": gate.to_ascii_uppercase(),
                "context": context,
            }),
            ..Default::default()
        };
        self.execute(ctx, &operation)
    }

    fn run_measurement(
        &mut self,
        ctx: &BackendContext,
        qubit: QubitHandle,
        basis: MeasureBasis,
        noiseless: bool,
    ) -> OperationResult {
        if !qubit.is_valid() {
            return Self::unsupported(
                "dense backend measurement request received invalid qubit handle",
            );
        }
        let operation = PhysicalOperation {
            kind: "measurement".into(),
            targets: vec![qubit],
            basis: basis.label().to_string(),
            payload: json!({"basis": basis.label(), "noiseless": noiseless}),
            ..Default::default()
        };
        self.execute(ctx, &operation)
    }

    fn run_noise(
        &mut self,
        ctx: &BackendContext,
        qubit: QubitHandle,
        noise_kind: &str,
        payload: &Value,
        params: &[f64],
    ) -> OperationResult {
        if !qubit.is_valid() {
            return Self::unsupported("dense backend noise operation received invalid qubit handle");
        }
        let p = params.first().copied().unwrap_or_else(|| {
            payload.get("p").and_then(Value::as_f64).unwrap_or(0.0)
        });
        let operation = PhysicalOperation {
            kind: "noise".into(),
            targets: vec![qubit],
            payload: json!({"kind": "noise", "noise_kind": noise_kind, "p": p}),
            ..Default::default()
        };
        self.execute(ctx, &operation)
    }

    fn parse_basis(operation: &PhysicalOperation) -> MeasureBasis {
        let mut basis = operation.basis.clone();
        if basis.is_empty() {
            if let Some(from_payload) = operation.payload.get("basis").and_then(Value::as_str) {
                basis = from_payload.to_string();
            }
        }
        match basis.to_ascii_uppercase().as_str() {
            "X" => MeasureBasis::X,
            "Y" => MeasureBasis::Y,
            "BELL" | "BELL_BASIS" => MeasureBasis::Bell,
            _ => MeasureBasis::Z,
        }
    }

    fn parse_gate(operation: &PhysicalOperation) -> String {
        operation
            .payload
            .get("gate")
            .and_then(Value::as_str)
            .or_else(|| operation.payload.get("kind").and_then(Value::as_str))
            .unwrap_or_default()
            .to_string()
    }

    fn parse_noise_kind(operation: &PhysicalOperation) -> String {
        operation
            .payload
            .get("noise_kind")
            .and_then(Value::as_str)
            .or_else(|| operation.payload.get("kind").and_then(Value::as_str))
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| "dephasing".to_string())
    }

    fn is_advanced(kind: &str) -> bool {
        SUPPORTED_ADVANCED_KINDS.contains(&kind)
    }
}

impl<T: WorkerTransport> PhysicalBackend for DenseOperatorBackend<T> {
    fn capabilities(&self) -> u32 {
        CAP_LEGACY_ERROR_MODEL | CAP_DENSE_OPERATOR | CAP_ADVANCED_OPERATION
    }

    fn apply_noise(&mut self, ctx: &BackendContext, qubit: QubitHandle) -> OperationResult {
        self.run_noise(ctx, qubit, "dephasing", &Value::Null, &[])
    }

    fn apply_gate(
        &mut self,
        ctx: &BackendContext,
        gate: &str,
        qubits: &[QubitHandle],
    ) -> OperationResult {
        self.run_unitary(ctx, gate, qubits, "")
    }

    fn apply_noiseless_gate(
        &mut self,
        ctx: &BackendContext,
        gate: &str,
        qubits: &[QubitHandle],
    ) -> OperationResult {
        self.run_unitary(ctx, gate, qubits, "noiseless")
    }

    fn measure(
        &mut self,
        ctx: &BackendContext,
        qubit: QubitHandle,
        basis: MeasureBasis,
    ) -> OperationResult {
        self.run_measurement(ctx, qubit, basis, false)
    }

    fn measure_noiseless(
        &mut self,
        ctx: &BackendContext,
        qubit: QubitHandle,
        basis: MeasureBasis,
        force_plus: bool,
    ) -> OperationResult {
        let mut result = self.run_measurement(ctx, qubit, basis, true);
        if force_plus && result.success {
            result.measured_plus = true;
        }
        result
    }

    fn generate_entanglement(
        &mut self,
        ctx: &BackendContext,
        source: QubitHandle,
        target: QubitHandle,
    ) -> OperationResult {
        if !source.is_valid() || !target.is_valid() {
            return Self::unsupported(
                "dense backend entanglement request received invalid qubit handle",
            );
        }
        let first = self.run_unitary(ctx, "H", &[source], "entanglement");
        if !first.success {
            return first;
        }
        self.run_unitary(ctx, "CNOT", &[source, target], "entanglement")
    }

    fn apply_operation(
        &mut self,
        ctx: &BackendContext,
        operation: &PhysicalOperation,
    ) -> OperationResult {
        if operation.kind.is_empty() {
            return Self::unsupported(
                "dense backend operation.kind is empty [category=invalid_payload]",
            );
        }
        let kind = normalize_kind(&operation.kind);

        if kind == "noop" {
            return OperationResult::ok();
        }

        if kind == "unitary" {
            let gate = Self::parse_gate(operation);
            if gate.is_empty() {
                return Self::unsupported(
                    "dense backend unitary operation missing payload kind/gate [category=invalid_payload]",
                );
            }
            if target_count_mismatch(&kind, &operation.targets) {
                return Self::unsupported(
                    "dense backend unitary operation missing target(s) [category=invalid_payload]",
                );
            }
            if !has_valid_targets(&operation.targets) {
                return Self::unsupported(
                    "dense backend unitary operation received invalid qubit handle [category=invalid_payload]",
                );
            }
            let context = operation
                .payload
                .get("context")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return self.run_unitary(ctx, &gate, &operation.targets, &context);
        }

        if kind == "measurement" {
            if target_count_mismatch(&kind, &operation.targets) {
                return Self::unsupported(format!(
                    "{} [category=invalid_payload]",
                    target_count_message(&kind, operation.targets.len())
                ));
            }
            if !has_valid_targets(&operation.targets) {
                return Self::unsupported(
                    "dense backend measurement operation received invalid qubit handle [category=invalid_payload]",
                );
            }
            let basis = Self::parse_basis(operation);
            let noiseless = operation
                .payload
                .get("noiseless")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            return self.run_measurement(ctx, operation.targets[0], basis, noiseless);
        }

        if kind == "noise" {
            if target_count_mismatch(&kind, &operation.targets) {
                return Self::unsupported(format!(
                    "{} [category=invalid_payload]",
                    target_count_message(&kind, operation.targets.len())
                ));
            }
            if !has_valid_targets(&operation.targets) {
                return Self::unsupported(
                    "dense backend noise operation received invalid qubit handle [category=invalid_payload]",
                );
            }
            let noise_kind = Self::parse_noise_kind(operation);
            let payload = operation.payload.clone();
            let params = operation.params.clone();
            return self.run_noise(ctx, operation.targets[0], &noise_kind, &payload, &params);
        }

        if Self::is_advanced(&kind) {
            if target_count_mismatch(&kind, &operation.targets) {
                return Self::unsupported(format!(
                    "{} [category=invalid_payload]",
                    target_count_message(&kind, operation.targets.len())
                ));
            }
            if !has_valid_targets(&operation.targets) {
                return Self::unsupported(
                    "dense backend advanced operation missing/invalid target(s) [category=invalid_payload]",
                );
            }
            if !has_valid_controls(&operation.controls) {
                return Self::unsupported(
                    "dense backend advanced operation invalid control handle(s) [category=invalid_payload]",
                );
            }
            return self.execute(ctx, operation);
        }

        Self::unsupported(format!(
            "dense backend does not support operation.kind={} [category=unsupported_kind]",
            operation.kind
        ))
    }
}

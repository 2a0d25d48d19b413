//! Backend selection and per-operation context stamping.

use crate::config::BackendConfig;
use crate::contract::{
    BackendContext, OperationResult, PhysicalBackend, PhysicalOperation, QubitHandle,
};
use crate::dense::DenseOperatorBackend;
use crate::error_basis::ErrorBasisBackend;
use crate::worker::SubprocessWorker;
use qrep_types::{MeasureBasis, SimTime};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Process-monotonic operation counter; makes operations at the same `now`
/// distinguishable.
static OPERATION_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Configuration-time backend errors. These terminate the simulation.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("unsupported physical backend type: {0}")]
    UnknownBackendType(String),
}

/// Map configured backend names onto canonical ones.
///
/// Empty strings and synonyms of the graph-state backend select
/// `error_basis`; unknown names pass through lowercased for the caller to
/// reject.
pub fn normalize_backend_type(value: &str) -> String {
    let normalized = value.to_ascii_lowercase();
    match normalized.as_str() {
        "" | "graphstatebackend" | "errorbasis" | "error_basis" => "error_basis".to_string(),
        "qutip" => "qutip".to_string(),
        "qutip_density_matrix" => "qutip_density_matrix".to_string(),
        "qutip_sv" | "qutip_state_vector" => "qutip_state_vector".to_string(),
        _ => normalized,
    }
}

/// Uniform entry point the engine uses for every physical operation.
///
/// Builds a fresh [`BackendContext`] per call. A facade constructed without
/// a backend panics on use; that is a programmer bug, not an input error.
pub struct BackendFacade {
    backend_name: String,
    scenario_id: String,
    backend: Option<Box<dyn PhysicalBackend>>,
}

impl BackendFacade {
    /// Select and construct the backend named by `config.backend_type`.
    pub fn from_config(config: BackendConfig) -> Result<Self, BackendError> {
        let backend_name = normalize_backend_type(&config.backend_type);
        let scenario_id = config.scenario_id.clone();
        let backend: Box<dyn PhysicalBackend> = match backend_name.as_str() {
            "error_basis" => Box::new(ErrorBasisBackend::new(config)),
            "qutip" | "qutip_density_matrix" | "qutip_state_vector" => Box::new(
                DenseOperatorBackend::new(SubprocessWorker::new(), backend_name.clone(), config),
            ),
            other => return Err(BackendError::UnknownBackendType(other.to_string())),
        };
        Ok(Self {
            backend_name,
            scenario_id,
            backend: Some(backend),
        })
    }

    /// Wrap an already-constructed backend (tests, custom transports).
    pub fn with_backend(
        backend: Box<dyn PhysicalBackend>,
        backend_type: &str,
        scenario_id: impl Into<String>,
    ) -> Self {
        Self {
            backend_name: normalize_backend_type(backend_type),
            scenario_id: scenario_id.into(),
            backend: Some(backend),
        }
    }

    /// A facade with no backend; every operation on it panics.
    pub fn detached(backend_type: &str) -> Self {
        Self {
            backend_name: normalize_backend_type(backend_type),
            scenario_id: String::new(),
            backend: None,
        }
    }

    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    pub fn capabilities(&self) -> u32 {
        self.backend
            .as_ref()
            .map(|backend| backend.capabilities())
            .unwrap_or(0)
    }

    fn make_context(&self, now: SimTime) -> BackendContext {
        BackendContext {
            seed: OPERATION_SEQUENCE.fetch_add(1, Ordering::Relaxed) + 1,
            now,
            scenario_id: self.scenario_id.clone(),
            backend_name: self.backend_name.clone(),
        }
    }

    fn backend_mut(&mut self) -> &mut dyn PhysicalBackend {
        self.backend
            .as_deref_mut()
            .expect("backend facade has no backend")
    }

    pub fn apply_noise(&mut self, now: SimTime, qubit: QubitHandle) -> OperationResult {
        let ctx = self.make_context(now);
        self.backend_mut().apply_noise(&ctx, qubit)
    }

    pub fn apply_gate(
        &mut self,
        now: SimTime,
        gate: &str,
        qubits: &[QubitHandle],
    ) -> OperationResult {
        let ctx = self.make_context(now);
        self.backend_mut().apply_gate(&ctx, gate, qubits)
    }

    pub fn apply_noiseless_gate(
        &mut self,
        now: SimTime,
        gate: &str,
        qubits: &[QubitHandle],
    ) -> OperationResult {
        let ctx = self.make_context(now);
        self.backend_mut().apply_noiseless_gate(&ctx, gate, qubits)
    }

    pub fn measure(
        &mut self,
        now: SimTime,
        qubit: QubitHandle,
        basis: MeasureBasis,
    ) -> OperationResult {
        let ctx = self.make_context(now);
        self.backend_mut().measure(&ctx, qubit, basis)
    }

    pub fn measure_noiseless(
        &mut self,
        now: SimTime,
        qubit: QubitHandle,
        basis: MeasureBasis,
        force_plus: bool,
    ) -> OperationResult {
        let ctx = self.make_context(now);
        self.backend_mut()
            .measure_noiseless(&ctx, qubit, basis, force_plus)
    }

    pub fn generate_entanglement(
        &mut self,
        now: SimTime,
        source: QubitHandle,
        target: QubitHandle,
    ) -> OperationResult {
        let ctx = self.make_context(now);
        self.backend_mut().generate_entanglement(&ctx, source, target)
    }

    pub fn apply_operation(
        &mut self,
        now: SimTime,
        operation: &PhysicalOperation,
    ) -> OperationResult {
        let ctx = self.make_context(now);
        self.backend_mut().apply_operation(&ctx, operation)
    }
}

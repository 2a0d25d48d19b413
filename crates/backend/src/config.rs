//! Backend configuration.

use serde_json::{json, Value};

/// Parameters forwarded to the dense-operator worker.
///
/// Defaults mirror the worker's own presets; configured values pass through
/// verbatim.
#[derive(Debug, Clone)]
pub struct QutipWorkerConfig {
    pub python_executable: Option<String>,
    pub worker_script: Option<String>,
    pub backend_class: Option<String>,
    pub max_register_qubits: i64,
    pub max_hilbert_dim: i64,
    pub solver: String,
    pub truncation: f64,
    pub worker_timeout_ms: i64,
    /// Any additional `qutip_*` parameters, forwarded as-is.
    pub extra: serde_json::Map<String, Value>,
}

impl Default for QutipWorkerConfig {
    fn default() -> Self {
        Self {
            python_executable: None,
            worker_script: None,
            backend_class: None,
            max_register_qubits: 8,
            max_hilbert_dim: 4,
            solver: "mesolve".to_string(),
            truncation: 5.0,
            worker_timeout_ms: 1000,
            extra: serde_json::Map::new(),
        }
    }
}

/// Node-level backend configuration.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Configured backend name, normalized by the facade.
    pub backend_type: String,
    /// Identifies the simulation scenario in worker requests.
    pub scenario_id: String,
    /// Seed for error-basis measurement outcomes.
    pub rng_seed: u64,
    // Error-model rates, passed verbatim to the backend.
    pub measurement_x_error_rate: f64,
    pub measurement_y_error_rate: f64,
    pub measurement_z_error_rate: f64,
    pub gate_error_rate: f64,
    pub gate_x_error_ratio: f64,
    pub gate_y_error_ratio: f64,
    pub gate_z_error_ratio: f64,
    pub memory_error_rate: f64,
    pub qutip: QutipWorkerConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            backend_type: String::new(),
            scenario_id: String::new(),
            rng_seed: 0,
            measurement_x_error_rate: 0.0,
            measurement_y_error_rate: 0.0,
            measurement_z_error_rate: 0.0,
            gate_error_rate: 0.0,
            gate_x_error_ratio: 1.0,
            gate_y_error_ratio: 1.0,
            gate_z_error_ratio: 1.0,
            memory_error_rate: 0.0,
            qutip: QutipWorkerConfig::default(),
        }
    }
}

impl BackendConfig {
    /// The `backend_config` object sent with every worker request.
    pub fn worker_parameters(&self, backend_label: &str) -> Value {
        let python = self
            .qutip
            .python_executable
            .clone()
            .unwrap_or_else(crate::worker::default_python_executable);
        let mut params = json!({
            "backend_name": backend_label,
            "python_executable": python,
            "qutip_backend_class": self
                .qutip
                .backend_class
                .clone()
                .unwrap_or_else(|| backend_label.to_string()),
            "qutip_max_register_qubits": self.qutip.max_register_qubits,
            "qutip_max_hilbert_dim": self.qutip.max_hilbert_dim,
            "qutip_solver": self.qutip.solver,
            "qutip_truncation": self.qutip.truncation,
            "qutip_worker_timeout_ms": self.qutip.worker_timeout_ms,
        });
        if let Some(script) = &self.qutip.worker_script {
            params["qutip_worker_script"] = json!(script);
        }
        if let Value::Object(map) = &mut params {
            for (key, value) in &self.qutip.extra {
                map.insert(key.clone(), value.clone());
            }
        }
        params
    }
}

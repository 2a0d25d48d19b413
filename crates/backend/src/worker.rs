//! Dense-operator worker transport.
//!
//! The dense-operator backend delegates numerics to an external worker
//! process speaking a JSON file protocol. [`WorkerTransport`] is the seam:
//! [`SubprocessWorker`] invokes the real worker over temp files,
//! [`StubWorker`] answers in-process for tests.

use crate::contract::{OperationResult, PhysicalOperation, QubitHandle};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, warn};

/// Environment variable naming the Python interpreter for the worker.
pub const PYTHON_EXECUTABLE_ENV: &str = "QUTIP_PYTHON_EXECUTABLE";
/// Environment variable naming the worker script, overriding the search.
pub const WORKER_SCRIPT_ENV: &str = "QUTIP_WORKER_SCRIPT";

pub(crate) fn default_python_executable() -> String {
    std::env::var(PYTHON_EXECUTABLE_ENV)
        .ok()
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "python3".to_string())
}

/// Request sent to the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub backend_type: String,
    pub scenario_id: String,
    pub seed: u64,
    pub time: f64,
    pub operation: Value,
    pub backend_config: Value,
}

/// Response read back from the worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default = "unit_fidelity")]
    pub fidelity_estimate: f64,
    #[serde(default)]
    pub qubit_lost: bool,
    #[serde(default)]
    pub relaxed_to_ground: bool,
    #[serde(default)]
    pub excited_to_plus: bool,
    #[serde(default)]
    pub measured_plus: bool,
    #[serde(default)]
    pub message: String,
}

fn unit_fidelity() -> f64 {
    1.0
}

impl From<WorkerResponse> for OperationResult {
    fn from(response: WorkerResponse) -> Self {
        OperationResult {
            success: response.success,
            fidelity_estimate: response.fidelity_estimate,
            qubit_lost: response.qubit_lost,
            relaxed_to_ground: response.relaxed_to_ground,
            excited_to_plus: response.excited_to_plus,
            measured_plus: response.measured_plus,
            message: response.message,
        }
    }
}

fn qubit_handle_json(handle: &QubitHandle) -> Value {
    json!({
        "node_id": handle.node_id,
        "qnic_index": handle.qnic_index,
        "qnic_type": handle.qnic_type,
        "qubit_index": handle.qubit_index,
    })
}

/// Render a [`PhysicalOperation`] into its wire JSON.
pub(crate) fn operation_json(operation: &PhysicalOperation) -> Value {
    json!({
        "kind": operation.kind,
        "targets": operation.targets.iter().map(qubit_handle_json).collect::<Vec<_>>(),
        "controls": operation.controls.iter().map(qubit_handle_json).collect::<Vec<_>>(),
        "ancillary_modes": operation.ancillary_modes,
        "duration": operation.duration,
        "params": operation.params,
        "basis": operation.basis,
        "payload": operation.payload,
    })
}

/// Transport seam between the dense backend and its worker.
pub trait WorkerTransport: Send {
    /// One-time probe of the worker runtime. Errors carry the reason; the
    /// backend caches the outcome and tags it `[category=qutip_import]`.
    fn check_runtime(&mut self, backend_config: &Value) -> Result<(), String>;

    /// Execute one request and return the decoded response.
    fn execute(&mut self, request: &WorkerRequest) -> Result<WorkerResponse, String>;
}

/// Production transport: request JSON to a temp file, invoke the worker,
/// read the response file.
#[derive(Debug, Default)]
pub struct SubprocessWorker;

impl SubprocessWorker {
    pub fn new() -> Self {
        Self
    }

    fn python_executable(backend_config: &Value) -> String {
        backend_config
            .get("python_executable")
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .unwrap_or_else(default_python_executable)
    }

    fn find_worker_script(backend_config: &Value) -> PathBuf {
        if let Some(configured) = backend_config
            .get("qutip_worker_script")
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
        {
            let path = PathBuf::from(configured);
            if path.is_file() {
                return path;
            }
        }
        if let Ok(from_env) = std::env::var(WORKER_SCRIPT_ENV) {
            if !from_env.is_empty() {
                let path = PathBuf::from(&from_env);
                if path.is_file() {
                    return path;
                }
            }
        }
        for candidate in [
            "scripts/qutip_worker.py",
            "../scripts/qutip_worker.py",
            "../../scripts/qutip_worker.py",
        ] {
            let path = PathBuf::from(candidate);
            if path.is_file() {
                return path;
            }
        }
        PathBuf::from("scripts/qutip_worker.py")
    }
}

impl WorkerTransport for SubprocessWorker {
    fn check_runtime(&mut self, backend_config: &Value) -> Result<(), String> {
        let python = Self::python_executable(backend_config);
        let status = Command::new(&python)
            .arg("-c")
            .arg("import qutip, qutip_qip, qutip.qip")
            .status()
            .map_err(|err| format!("{python}: {err}"))?;
        if status.success() {
            Ok(())
        } else {
            Err(format!("{python} -c \"import qutip, qutip_qip, qutip.qip\" (status={status})"))
        }
    }

    fn execute(&mut self, request: &WorkerRequest) -> Result<WorkerResponse, String> {
        let python = Self::python_executable(&request.backend_config);
        let script = Self::find_worker_script(&request.backend_config);

        let mut request_file = tempfile::NamedTempFile::new()
            .map_err(|err| format!("failed to create temporary request file: {err}"))?;
        let response_file = tempfile::NamedTempFile::new()
            .map_err(|err| format!("failed to create temporary response file: {err}"))?;

        let body = serde_json::to_string(request)
            .map_err(|err| format!("failed to encode worker request: {err}"))?;
        request_file
            .write_all(body.as_bytes())
            .map_err(|err| format!("failed to write worker request: {err}"))?;
        request_file
            .flush()
            .map_err(|err| format!("failed to flush worker request: {err}"))?;

        debug!(script = %script.display(), "invoking dense-operator worker");
        let status = Command::new(&python)
            .arg(&script)
            .arg("--input")
            .arg(request_file.path())
            .arg("--output")
            .arg(response_file.path())
            .status()
            .map_err(|err| format!("worker execution failed: {err}"))?;
        if !status.success() {
            return Err(format!("worker execution failed (status={status})"));
        }

        let raw = std::fs::read_to_string(response_file.path())
            .map_err(|err| format!("worker did not produce output: {err}"))?;
        serde_json::from_str(&raw).map_err(|err| {
            warn!(error = %err, "worker response parse error");
            format!("worker response parse error: {err}")
        })
    }
}

/// Test transport answering from a queue of canned responses.
#[derive(Debug, Default)]
pub struct StubWorker {
    /// Responses popped front-first; empty queue answers success.
    pub responses: Vec<Result<WorkerResponse, String>>,
    /// Every executed request, for assertions.
    pub requests: Vec<WorkerRequest>,
    /// Outcome of the runtime probe.
    pub runtime_available: bool,
}

impl StubWorker {
    pub fn available() -> Self {
        Self {
            runtime_available: true,
            ..Default::default()
        }
    }

    pub fn unavailable() -> Self {
        Self {
            runtime_available: false,
            ..Default::default()
        }
    }
}

impl WorkerTransport for StubWorker {
    fn check_runtime(&mut self, _backend_config: &Value) -> Result<(), String> {
        if self.runtime_available {
            Ok(())
        } else {
            Err("stub worker runtime unavailable".to_string())
        }
    }

    fn execute(&mut self, request: &WorkerRequest) -> Result<WorkerResponse, String> {
        self.requests.push(request.clone());
        if self.responses.is_empty() {
            Ok(WorkerResponse {
                success: true,
                fidelity_estimate: 1.0,
                message: "stub".to_string(),
                ..Default::default()
            })
        } else {
            self.responses.remove(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_request_wire_shape() {
        let operation = PhysicalOperation {
            kind: "unitary".into(),
            targets: vec![QubitHandle {
                node_id: 1,
                qnic_index: 0,
                qnic_type: 2,
                qubit_index: 7,
            }],
            payload: json!({"gate": "X"}),
            ..Default::default()
        };
        let request = WorkerRequest {
            backend_type: "qutip_density_matrix".into(),
            scenario_id: "test".into(),
            seed: 3,
            time: 1.5,
            operation: operation_json(&operation),
            backend_config: json!({}),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["operation"]["kind"], "unitary");
        assert_eq!(value["operation"]["targets"][0]["qubit_index"], 7);
        assert_eq!(value["operation"]["targets"][0]["qnic_type"], 2);
        assert_eq!(value["seed"], 3);
        assert_eq!(value["time"], 1.5);
    }

    #[test]
    fn worker_response_defaults_on_missing_fields() {
        let response: WorkerResponse = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(response.success);
        assert_eq!(response.fidelity_estimate, 1.0);
        assert!(!response.measured_plus);
    }
}

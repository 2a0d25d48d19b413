//! Physical backend abstraction.
//!
//! The rule engine talks to quantum hardware through one uniform contract,
//! [`PhysicalBackend`], with two concrete implementations:
//!
//! - [`ErrorBasisBackend`]: in-process Pauli-frame error tracking, the
//!   default for large simulations.
//! - [`DenseOperatorBackend`]: dense-operator evolution delegated to an
//!   external worker process over a JSON file protocol, reached through the
//!   [`WorkerTransport`] seam (subprocess in production, stub in tests).
//!
//! Every operation returns an [`OperationResult`]; failures are data, not
//! panics, and carry a `[category=...]` marker in the message. The only
//! hard errors are programmer-contract violations (using a facade that has
//! no backend) and unknown backend names at configuration time.

mod config;
mod contract;
mod dense;
mod error_basis;
mod facade;
mod worker;

pub use config::{BackendConfig, QutipWorkerConfig};
pub use contract::{
    BackendContext, OperationResult, PhysicalBackend, PhysicalOperation, QubitHandle,
    CAP_ADVANCED_OPERATION, CAP_DENSE_OPERATOR, CAP_FOCK_MODE, CAP_LEGACY_ERROR_MODEL,
};
pub use dense::DenseOperatorBackend;
pub use error_basis::{ErrorBasisBackend, ErrorQubit, QubitRegister};
pub use facade::{normalize_backend_type, BackendError, BackendFacade};
pub use worker::{StubWorker, SubprocessWorker, WorkerRequest, WorkerResponse, WorkerTransport};

//! Foundation types for the qrep protocol engine.
//!
//! This crate provides the identifiers and small value types used throughout
//! the repeater-node implementation:
//!
//! - **Addresses**: [`NodeAddr`], [`QnicAddr`]
//! - **Interfaces**: [`QnicKind`], per-interface qubit indexing
//! - **Quantum primitives**: [`PauliOperator`], [`MeasureBasis`]
//! - **Time**: [`SimTime`], the simulation clock value handed in by the kernel
//!
//! # Design Philosophy
//!
//! This crate is self-contained with minimal dependencies. It does not depend
//! on any other workspace crates, making it the foundation layer.

mod identifiers;
mod pauli;
mod qnic;

pub use identifiers::{NodeAddr, QnicAddr};
pub use pauli::{MeasureBasis, PauliOperator};
pub use qnic::{QnicKind, QubitKey, PULSE_BEGIN, PULSE_END};

/// Simulation time as reported by the kernel.
///
/// Times are absolute offsets from simulation start. The kernel owns the
/// clock; the core never reads wall-clock time.
pub type SimTime = std::time::Duration;

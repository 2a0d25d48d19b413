//! Deterministic in-process simulation kernel.
//!
//! [`SimKernel`] implements the [`KernelPort`] contract the engine and the
//! connection manager consume: a time-ordered self-message queue with
//! monotonic event numbers, idempotent timer cancellation, and an outbox
//! capturing everything sent on the router port. Given the same inputs it
//! replays identically, which is what the end-to-end tests rely on.

mod kernel;

pub use kernel::{SimKernel, SimStats};

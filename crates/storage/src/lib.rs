//! Stationary qubit inventory and bell-pair bookkeeping.
//!
//! [`QNicStore`] owns the arena of [`QubitRecord`]s for every interface on a
//! node; [`BellPairStore`] indexes which records are believed entangled with
//! which partner. Everything else refers to qubits by [`QubitKey`].
//!
//! Flag ownership: `busy` is flipped only through [`QNicStore`],
//! `allocated` only by the runtime facade during resource allocation. The
//! rule engine orchestrates the transitions but does not bypass these
//! owners.

mod bell_pair_store;
mod qnic_store;

pub use bell_pair_store::BellPairStore;
pub use qnic_store::{QNicStore, QubitRecord, StoreError};

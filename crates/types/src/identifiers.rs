//! Address newtypes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of a quantum node in the network.
///
/// Addresses are assigned by the network configuration and are stable for the
/// lifetime of a simulation. Address ordering is load-bearing: the MSM link
/// protocol uses `self < partner` as the tie-break for which side applies the
/// Φ⁻ correction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct NodeAddr(pub i32);

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for NodeAddr {
    fn from(value: i32) -> Self {
        NodeAddr(value)
    }
}

/// Network-wide address of a quantum network interface.
///
/// Distinct from the per-node `(kind, index)` pair: the qnic address is
/// globally unique and is what the connection manager reserves during
/// connection setup.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct QnicAddr(pub i32);

impl fmt::Display for QnicAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for QnicAddr {
    fn from(value: i32) -> Self {
        QnicAddr(value)
    }
}

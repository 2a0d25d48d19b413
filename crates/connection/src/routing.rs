//! Routing lookups consumed by the connection manager.

use qrep_messages::QnicConnection;
use qrep_types::{NodeAddr, QnicAddr};
use std::collections::HashMap;

/// Next-hop interface lookups.
///
/// The routing tables themselves belong to the routing daemon; the
/// connection manager only asks which local interface reaches a
/// destination.
pub trait RoutingDaemon: Send {
    /// Network-wide address of the local interface on the path toward
    /// `dest`.
    fn find_qnic_addr_by_dest_addr(&self, dest: NodeAddr) -> Option<QnicAddr>;

    /// Full description of a local interface, for path accumulation.
    fn local_qnic(&self, qnic_addr: QnicAddr) -> Option<QnicConnection>;
}

/// Fixed-table routing for tests and small topologies.
#[derive(Debug, Default)]
pub struct StaticRoutingDaemon {
    routes: HashMap<NodeAddr, QnicAddr>,
    qnics: HashMap<QnicAddr, QnicConnection>,
}

impl StaticRoutingDaemon {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_route(&mut self, dest: NodeAddr, qnic_addr: QnicAddr) -> &mut Self {
        self.routes.insert(dest, qnic_addr);
        self
    }

    pub fn add_qnic(&mut self, qnic: QnicConnection) -> &mut Self {
        self.qnics.insert(qnic.address, qnic);
        self
    }
}

impl RoutingDaemon for StaticRoutingDaemon {
    fn find_qnic_addr_by_dest_addr(&self, dest: NodeAddr) -> Option<QnicAddr> {
        self.routes.get(&dest).copied()
    }

    fn local_qnic(&self, qnic_addr: QnicAddr) -> Option<QnicConnection> {
        self.qnics.get(&qnic_addr).copied()
    }
}

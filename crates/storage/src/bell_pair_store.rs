//! Partner-indexed entangled pair bookkeeping.

use qrep_logger::Logger;
use qrep_types::{NodeAddr, QnicKind, QubitKey};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

/// Index of which local qubits are believed entangled with which partner.
///
/// This is the single source of truth for entanglement bookkeeping: a qubit
/// key appears under at most one partner at a time. Insertion happens on a
/// successful link-generation result, removal when an action consumes the
/// pair or at teardown.
pub struct BellPairStore {
    pairs: BTreeMap<NodeAddr, Vec<QubitKey>>,
    logger: Arc<dyn Logger>,
}

impl BellPairStore {
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self {
            pairs: BTreeMap::new(),
            logger,
        }
    }

    /// Record `qubit` as entangled with `partner`.
    ///
    /// If the qubit was recorded under another partner it is moved, keeping
    /// the at-most-one-partner invariant.
    pub fn insert_entangled_qubit(&mut self, partner: NodeAddr, qubit: QubitKey) {
        self.remove_key(qubit);
        self.pairs.entry(partner).or_default().push(qubit);
        trace!(%partner, ?qubit, "bell pair inserted");
        self.logger.log_bell_pair(
            "Insert",
            partner,
            qubit.kind,
            qubit.qnic_index,
            qubit.qubit_index,
        );
    }

    /// Qubits on one interface entangled with one partner.
    pub fn get_bell_pairs_range(
        &self,
        kind: QnicKind,
        qnic_index: i32,
        partner: NodeAddr,
    ) -> Vec<QubitKey> {
        self.pairs
            .get(&partner)
            .map(|keys| {
                keys.iter()
                    .filter(|key| key.kind == kind && key.qnic_index == qnic_index)
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Remove a qubit from whichever partner list holds it.
    pub fn erase_qubit(&mut self, qubit: QubitKey) {
        if let Some(partner) = self.remove_key(qubit) {
            self.logger.log_bell_pair(
                "Erase",
                partner,
                qubit.kind,
                qubit.qnic_index,
                qubit.qubit_index,
            );
        }
    }

    /// Partner a qubit is recorded under, if any.
    pub fn partner_of(&self, qubit: QubitKey) -> Option<NodeAddr> {
        self.pairs
            .iter()
            .find(|(_, keys)| keys.contains(&qubit))
            .map(|(partner, _)| *partner)
    }

    /// Total number of recorded pairs.
    pub fn len(&self) -> usize {
        self.pairs.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove_key(&mut self, qubit: QubitKey) -> Option<NodeAddr> {
        for (partner, keys) in self.pairs.iter_mut() {
            if let Some(pos) = keys.iter().position(|key| *key == qubit) {
                keys.remove(pos);
                return Some(*partner);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(kind: QnicKind, qnic: i32, qubit: usize) -> QubitKey {
        QubitKey::new(kind, qnic, qubit)
    }

    #[test]
    fn range_is_restricted_to_interface_and_partner() {
        let mut store = BellPairStore::new(qrep_logger::disabled());
        store.insert_entangled_qubit(NodeAddr(1), key(QnicKind::E, 0, 0));
        store.insert_entangled_qubit(NodeAddr(1), key(QnicKind::E, 1, 1));
        store.insert_entangled_qubit(NodeAddr(2), key(QnicKind::E, 0, 2));

        let range = store.get_bell_pairs_range(QnicKind::E, 0, NodeAddr(1));
        assert_eq!(range, vec![key(QnicKind::E, 0, 0)]);
        assert!(store
            .get_bell_pairs_range(QnicKind::R, 0, NodeAddr(1))
            .is_empty());
    }

    #[test]
    fn a_qubit_appears_under_at_most_one_partner() {
        let mut store = BellPairStore::new(qrep_logger::disabled());
        let qubit = key(QnicKind::Rp, 0, 0);
        store.insert_entangled_qubit(NodeAddr(1), qubit);
        store.insert_entangled_qubit(NodeAddr(2), qubit);

        assert!(store.get_bell_pairs_range(QnicKind::Rp, 0, NodeAddr(1)).is_empty());
        assert_eq!(store.partner_of(qubit), Some(NodeAddr(2)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn erase_removes_and_tolerates_unknown_keys() {
        let mut store = BellPairStore::new(qrep_logger::disabled());
        let qubit = key(QnicKind::E, 0, 0);
        store.insert_entangled_qubit(NodeAddr(1), qubit);
        store.erase_qubit(qubit);
        assert!(store.is_empty());
        store.erase_qubit(qubit); // unknown key is a no-op
    }
}

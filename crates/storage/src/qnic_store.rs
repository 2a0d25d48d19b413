//! Per-interface qubit records.

use qrep_logger::Logger;
use qrep_types::{QnicKind, QubitKey};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

/// Errors from qubit record lookup.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no qubit record for {kind} qnic {qnic_index} qubit {qubit_index}")]
    UnknownQubit {
        kind: QnicKind,
        qnic_index: i32,
        qubit_index: usize,
    },
}

/// State of one stationary qubit.
///
/// `busy` means committed to an in-flight protocol attempt or stored as an
/// entangled pair; `allocated` means additionally bound to a RuleSet
/// runtime. A record can be both at once.
#[derive(Debug, Clone)]
pub struct QubitRecord {
    key: QubitKey,
    busy: bool,
    allocated: bool,
}

impl QubitRecord {
    fn new(key: QubitKey) -> Self {
        Self {
            key,
            busy: false,
            allocated: false,
        }
    }

    pub fn key(&self) -> QubitKey {
        self.key
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn is_allocated(&self) -> bool {
        self.allocated
    }
}

/// Arena of qubit records for every interface of a node.
///
/// Records are created at node initialization and live until teardown;
/// lookups are by [`QubitKey`].
pub struct QNicStore {
    records: BTreeMap<QubitKey, QubitRecord>,
    logger: Arc<dyn Logger>,
}

impl QNicStore {
    /// Build the arena: `counts` gives, per interface kind, the number of
    /// interfaces and the qubits per interface.
    pub fn new(counts: &[(QnicKind, i32, usize)], logger: Arc<dyn Logger>) -> Self {
        let mut records = BTreeMap::new();
        for &(kind, num_qnics, qubits_per_qnic) in counts {
            for qnic_index in 0..num_qnics {
                for qubit_index in 0..qubits_per_qnic {
                    let key = QubitKey::new(kind, qnic_index, qubit_index);
                    records.insert(key, QubitRecord::new(key));
                }
            }
        }
        Self { records, logger }
    }

    /// Number of non-busy qubits on one interface.
    pub fn count_num_free_qubits(&self, kind: QnicKind, qnic_index: i32) -> usize {
        self.range(kind, qnic_index)
            .filter(|record| !record.busy)
            .count()
    }

    /// Pick a non-busy qubit on the interface and mark it busy.
    ///
    /// Returns `None` when every qubit is busy.
    pub fn take_free_qubit_index(&mut self, kind: QnicKind, qnic_index: i32) -> Option<usize> {
        let key = self
            .range(kind, qnic_index)
            .find(|record| !record.busy)
            .map(|record| record.key)?;
        self.set_busy_internal(key, true);
        Some(key.qubit_index)
    }

    /// Flip a qubit's busy flag.
    pub fn set_qubit_busy(
        &mut self,
        kind: QnicKind,
        qnic_index: i32,
        qubit_index: usize,
        busy: bool,
    ) -> Result<(), StoreError> {
        let key = QubitKey::new(kind, qnic_index, qubit_index);
        if !self.records.contains_key(&key) {
            return Err(StoreError::UnknownQubit {
                kind,
                qnic_index,
                qubit_index,
            });
        }
        self.set_busy_internal(key, busy);
        Ok(())
    }

    /// Look up a record.
    pub fn get_qubit_record(
        &self,
        kind: QnicKind,
        qnic_index: i32,
        qubit_index: usize,
    ) -> Result<&QubitRecord, StoreError> {
        self.records
            .get(&QubitKey::new(kind, qnic_index, qubit_index))
            .ok_or(StoreError::UnknownQubit {
                kind,
                qnic_index,
                qubit_index,
            })
    }

    /// Set the allocated flag. Reserved for the runtime facade.
    pub fn set_qubit_allocated(&mut self, key: QubitKey, allocated: bool) {
        if let Some(record) = self.records.get_mut(&key) {
            if record.allocated != allocated {
                record.allocated = allocated;
                self.logger.log_qubit_state(
                    key.kind,
                    key.qnic_index,
                    key.qubit_index,
                    record.busy,
                    record.allocated,
                );
            }
        }
    }

    pub fn is_allocated(&self, key: QubitKey) -> bool {
        self.records
            .get(&key)
            .map(|record| record.allocated)
            .unwrap_or(false)
    }

    pub fn is_busy(&self, key: QubitKey) -> bool {
        self.records
            .get(&key)
            .map(|record| record.busy)
            .unwrap_or(false)
    }

    fn set_busy_internal(&mut self, key: QubitKey, busy: bool) {
        if let Some(record) = self.records.get_mut(&key) {
            if record.busy != busy {
                record.busy = busy;
                trace!(?key, busy, "qubit busy flag changed");
                self.logger.log_qubit_state(
                    key.kind,
                    key.qnic_index,
                    key.qubit_index,
                    record.busy,
                    record.allocated,
                );
            }
        }
    }

    fn range(&self, kind: QnicKind, qnic_index: i32) -> impl Iterator<Item = &QubitRecord> {
        let start = QubitKey::new(kind, qnic_index, 0);
        let end = QubitKey::new(kind, qnic_index, usize::MAX);
        self.records.range(start..=end).map(|(_, record)| record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qrep_logger::RecordingLogger;

    fn store() -> QNicStore {
        QNicStore::new(
            &[(QnicKind::E, 1, 3), (QnicKind::Rp, 2, 2)],
            qrep_logger::disabled(),
        )
    }

    #[test]
    fn take_free_qubit_marks_busy_and_exhausts() {
        let mut store = store();
        assert_eq!(store.count_num_free_qubits(QnicKind::E, 0), 3);

        let first = store.take_free_qubit_index(QnicKind::E, 0).unwrap();
        assert_eq!(store.count_num_free_qubits(QnicKind::E, 0), 2);
        assert!(store.is_busy(QubitKey::new(QnicKind::E, 0, first)));

        store.take_free_qubit_index(QnicKind::E, 0).unwrap();
        store.take_free_qubit_index(QnicKind::E, 0).unwrap();
        assert_eq!(store.take_free_qubit_index(QnicKind::E, 0), None);
    }

    #[test]
    fn interfaces_are_independent() {
        let mut store = store();
        store.take_free_qubit_index(QnicKind::Rp, 0).unwrap();
        assert_eq!(store.count_num_free_qubits(QnicKind::Rp, 0), 1);
        assert_eq!(store.count_num_free_qubits(QnicKind::Rp, 1), 2);
        assert_eq!(store.count_num_free_qubits(QnicKind::E, 0), 3);
    }

    #[test]
    fn unknown_qubit_is_an_error_not_a_panic() {
        let mut store = store();
        assert!(store.set_qubit_busy(QnicKind::R, 0, 0, true).is_err());
        assert!(store.get_qubit_record(QnicKind::E, 0, 99).is_err());
    }

    #[test]
    fn state_changes_are_logged() {
        let logger = std::sync::Arc::new(RecordingLogger::new());
        let mut store = QNicStore::new(&[(QnicKind::E, 1, 1)], logger.clone());

        store.set_qubit_busy(QnicKind::E, 0, 0, true).unwrap();
        store.set_qubit_busy(QnicKind::E, 0, 0, true).unwrap(); // no-op, not logged
        store.set_qubit_allocated(QubitKey::new(QnicKind::E, 0, 0), true);

        assert_eq!(logger.count_of("QubitStateChange"), 2);
    }
}

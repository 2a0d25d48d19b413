//! Facade owning the runtimes of one node.

use crate::runtime::{Runtime, RuntimeSnapshot};
use qrep_rules::RuleSet;
use qrep_storage::{BellPairStore, QNicStore};
use qrep_types::QnicKind;
use tracing::{debug, trace};

/// Ordered collection of RuleSet runtimes.
///
/// Runtimes execute in insertion order within a single [`exec`](Self::exec)
/// sweep; newly entangled qubits are attached top to bottom during
/// [`allocate_resources`](Self::allocate_resources).
#[derive(Default)]
pub struct RuntimeFacade {
    runtimes: Vec<Runtime>,
}

impl RuntimeFacade {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a ruleset into a new runtime, appended after existing ones.
    pub fn submit_ruleset(&mut self, ruleset: RuleSet) {
        debug!(ruleset_id = ruleset.ruleset_id, rules = ruleset.rules.len(), "ruleset submitted");
        self.runtimes.push(Runtime::new(ruleset));
    }

    pub fn find_by_id(&mut self, ruleset_id: u64) -> Option<&mut Runtime> {
        self.runtimes
            .iter_mut()
            .find(|runtime| runtime.ruleset_id() == ruleset_id)
    }

    /// Route a classical protocol reply into the runtime owning
    /// `ruleset_id`. Unknown rulesets are a no-op.
    pub fn assign_message_to_ruleset(
        &mut self,
        ruleset_id: u64,
        shared_rule_tag: i32,
        content: Vec<i32>,
    ) {
        match self.find_by_id(ruleset_id) {
            Some(runtime) => runtime.assign_message(shared_rule_tag, content),
            None => trace!(ruleset_id, shared_rule_tag, "message for unknown ruleset dropped"),
        }
    }

    /// Bind every not-yet-allocated entangled qubit on `(kind, qnic_index)`
    /// to the runtimes declaring its partner.
    ///
    /// Idempotent: a qubit whose `allocated` flag is already set is never
    /// reassigned.
    pub fn allocate_resources(
        &mut self,
        qnic_store: &mut QNicStore,
        bell_pairs: &BellPairStore,
        kind: QnicKind,
        qnic_index: i32,
    ) {
        for runtime in &mut self.runtimes {
            for partner in runtime.partners().to_vec() {
                for qubit in bell_pairs.get_bell_pairs_range(kind, qnic_index, partner) {
                    if !qnic_store.is_allocated(qubit) {
                        qnic_store.set_qubit_allocated(qubit, true);
                        runtime.assign_qubit(partner, qubit);
                    }
                }
            }
        }
    }

    /// Step every runtime once, in insertion order.
    pub fn exec(&mut self) {
        for runtime in &mut self.runtimes {
            runtime.exec_step();
        }
    }

    pub fn len(&self) -> usize {
        self.runtimes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runtimes.is_empty()
    }

    pub fn at(&self, index: usize) -> Option<&Runtime> {
        self.runtimes.get(index)
    }

    pub fn snapshot(&self, index: usize) -> Option<RuntimeSnapshot> {
        self.runtimes.get(index).map(Runtime::snapshot)
    }
}

//! Execution state of one loaded RuleSet.

use qrep_rules::RuleSet;
use qrep_types::{NodeAddr, QubitKey};
use std::collections::{HashMap, VecDeque};

/// Introspection snapshot of a runtime, for tests and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuntimeSnapshot {
    pub terminated: bool,
    pub active_partners: usize,
    pub qubit_resources: usize,
    pub message_queues: usize,
    pub named_qubits: usize,
}

/// One RuleSet under execution.
pub struct Runtime {
    ruleset: RuleSet,
    partners: Vec<NodeAddr>,
    /// Qubits bound to this runtime, tagged with the partner they are
    /// entangled with.
    qubits: Vec<(NodeAddr, QubitKey)>,
    /// Classical protocol messages queued per shared rule tag.
    messages: HashMap<i32, VecDeque<Vec<i32>>>,
    /// Qubits promoted to named registers by rule programs.
    named_qubits: HashMap<String, QubitKey>,
    terminated: bool,
    steps: u64,
}

impl Runtime {
    pub fn new(ruleset: RuleSet) -> Self {
        let partners = ruleset.partners();
        Self {
            ruleset,
            partners,
            qubits: Vec::new(),
            messages: HashMap::new(),
            named_qubits: HashMap::new(),
            terminated: false,
            steps: 0,
        }
    }

    pub fn ruleset(&self) -> &RuleSet {
        &self.ruleset
    }

    pub fn ruleset_id(&self) -> u64 {
        self.ruleset.ruleset_id
    }

    /// Partner fan-out for qubit allocation.
    pub fn partners(&self) -> &[NodeAddr] {
        &self.partners
    }

    /// Bind a newly entangled qubit to this runtime.
    pub fn assign_qubit(&mut self, partner: NodeAddr, qubit: QubitKey) {
        self.qubits.push((partner, qubit));
    }

    /// Whether a specific qubit is bound here.
    pub fn owns_qubit(&self, qubit: QubitKey) -> bool {
        self.qubits.iter().any(|(_, key)| *key == qubit)
    }

    /// Queue a classical protocol message for the rule with this tag.
    pub fn assign_message(&mut self, shared_rule_tag: i32, content: Vec<i32>) {
        self.messages
            .entry(shared_rule_tag)
            .or_default()
            .push_back(content);
    }

    /// Messages queued for one tag, oldest first.
    pub fn queued_messages(&self, shared_rule_tag: i32) -> Vec<Vec<i32>> {
        self.messages
            .get(&shared_rule_tag)
            .map(|queue| queue.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Advance the interpreter by one step. Termination is sticky: a
    /// terminated runtime ignores further steps.
    pub fn exec_step(&mut self) {
        if self.terminated {
            return;
        }
        self.steps += 1;
    }

    /// Mark this runtime finished. Sticky.
    pub fn terminate(&mut self) {
        self.terminated = true;
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn snapshot(&self) -> RuntimeSnapshot {
        RuntimeSnapshot {
            terminated: self.terminated,
            active_partners: self.partners.len(),
            qubit_resources: self.qubits.len(),
            message_queues: self.messages.len(),
            named_qubits: self.named_qubits.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qrep_rules::{Condition, PartnerInterface, Rule, RuleAction};
    use qrep_types::QnicKind;

    fn ruleset_with_partner(partner: NodeAddr) -> RuleSet {
        let mut ruleset = RuleSet::new(1, NodeAddr(0));
        ruleset.push_rule(Rule::new(
            "tomography with address 1",
            3,
            3,
            vec![PartnerInterface::new(partner)],
            Condition::default(),
            RuleAction::Tomography {
                interface: vec![PartnerInterface::new(partner)],
                num_measure: 10,
                owner_address: NodeAddr(0),
            },
        ));
        ruleset
    }

    #[test]
    fn partners_come_from_rule_interfaces() {
        let runtime = Runtime::new(ruleset_with_partner(NodeAddr(1)));
        assert_eq!(runtime.partners(), &[NodeAddr(1)]);
    }

    #[test]
    fn termination_is_sticky() {
        let mut runtime = Runtime::new(ruleset_with_partner(NodeAddr(1)));
        runtime.terminate();
        runtime.exec_step();
        assert!(runtime.is_terminated());
        assert!(runtime.snapshot().terminated);
    }

    #[test]
    fn messages_queue_per_tag_in_order() {
        let mut runtime = Runtime::new(ruleset_with_partner(NodeAddr(1)));
        runtime.assign_message(2, vec![0, 1, 4]);
        runtime.assign_message(2, vec![1, 0, 4]);
        runtime.assign_message(5, vec![9]);
        assert_eq!(runtime.queued_messages(2), vec![vec![0, 1, 4], vec![1, 0, 4]]);
        assert_eq!(runtime.queued_messages(5), vec![vec![9]]);
        assert!(runtime.queued_messages(7).is_empty());
        assert_eq!(runtime.snapshot().message_queues, 2);
    }

    #[test]
    fn snapshot_counts_bound_qubits() {
        let mut runtime = Runtime::new(ruleset_with_partner(NodeAddr(1)));
        runtime.assign_qubit(NodeAddr(1), QubitKey::new(QnicKind::E, 0, 0));
        assert_eq!(runtime.snapshot().qubit_resources, 1);
        assert!(runtime.owns_qubit(QubitKey::new(QnicKind::E, 0, 0)));
    }
}

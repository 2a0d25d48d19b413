//! Responder-side RuleSet synthesis.
//!
//! Given the accumulated path of a connection setup request, produce one
//! RuleSet per participating node implementing the entanglement swap tree:
//! every intermediate swaps its left and right segments together, endpoints
//! apply the announced corrections, and the two endpoints close with a
//! tomography pair.
//!
//! This is a pure function of the path and the requested parameters; it
//! holds no node-local state.

use qrep_rules::{Condition, ConditionClause, PartnerInterface, Rule, RuleAction, RuleSet};
use qrep_types::NodeAddr;

/// One swap operation of the tree: `swapper` fuses its pairs with `left`
/// and `right` into one `left`–`right` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SwapOp {
    swapper: NodeAddr,
    left: NodeAddr,
    right: NodeAddr,
    shared_rule_tag: i32,
}

/// Collect swap operations for the path segment `path[a..=b]`, innermost
/// first.
///
/// The middle intermediate of a segment connects the segment's endpoints;
/// its children segments swap before it does. Tags are assigned separately
/// (path order), so the recursion only fixes partners and emission order.
fn collect_swaps(path: &[NodeAddr], a: usize, b: usize, tags: &[i32], out: &mut Vec<SwapOp>) {
    if b - a < 2 {
        return;
    }
    let intermediates = b - a - 1;
    let m = a + 1 + (intermediates - 1) / 2;
    collect_swaps(path, a, m, tags, out);
    collect_swaps(path, m, b, tags, out);
    out.push(SwapOp {
        swapper: path[m],
        left: path[a],
        right: path[b],
        shared_rule_tag: tags[m],
    });
}

fn swap_rule(op: &SwapOp) -> Rule {
    let interfaces = vec![
        PartnerInterface::new(op.left),
        PartnerInterface::new(op.right),
    ];
    Rule::new(
        format!("swap between {} and {}", op.left, op.right),
        op.shared_rule_tag,
        -1,
        interfaces.clone(),
        Condition::new(vec![
            ConditionClause::EnoughResource {
                interface: PartnerInterface::new(op.left),
                num_resource: 1,
            },
            ConditionClause::EnoughResource {
                interface: PartnerInterface::new(op.right),
                num_resource: 1,
            },
        ]),
        RuleAction::Swapping {
            interface: interfaces.clone(),
            remote_interface: interfaces,
            shared_rule_tag: op.shared_rule_tag,
        },
    )
}

fn correction_rule(op: &SwapOp) -> Rule {
    Rule::new(
        format!("swapping correction from {}", op.swapper),
        -1,
        op.shared_rule_tag,
        vec![PartnerInterface::new(op.swapper)],
        Condition::new(vec![ConditionClause::SwappingCorrection {
            interface: PartnerInterface::new(op.swapper),
            shared_rule_tag: op.shared_rule_tag,
        }]),
        RuleAction::SwappingCorrection {
            interface: vec![PartnerInterface::new(op.swapper)],
            shared_rule_tag: op.shared_rule_tag,
        },
    )
}

fn tomography_rule(owner: NodeAddr, other: NodeAddr, num_measure: usize, tag: i32) -> Rule {
    Rule::new(
        format!("tomography with address {other}"),
        tag,
        tag,
        vec![PartnerInterface::new(other)],
        Condition::new(vec![
            ConditionClause::EnoughResource {
                interface: PartnerInterface::new(other),
                num_resource: 1,
            },
            ConditionClause::MeasureCount {
                interface: PartnerInterface::new(other),
                num_measure,
            },
        ]),
        RuleAction::Tomography {
            interface: vec![PartnerInterface::new(other)],
            num_measure,
            owner_address: owner,
        },
    )
}

/// Synthesize the per-node RuleSets for one connection.
///
/// `path` lists the participating nodes initiator first, responder last.
/// Shared rule tags number the swaps from 1 in path order of their
/// swappers; the endpoint tomography pair takes the next tag. Returns
/// `(node, ruleset)` pairs in path order.
pub fn synthesize_swap_tree(
    ruleset_id: u64,
    path: &[NodeAddr],
    num_measure: usize,
) -> Vec<(NodeAddr, RuleSet)> {
    if path.len() < 2 {
        return Vec::new();
    }

    // Tags in path order: tags[i] belongs to the swap performed by path[i].
    let mut tags = vec![-1; path.len()];
    for (offset, tag) in (1..path.len() - 1).zip(1i32..) {
        tags[offset] = tag;
    }
    let tomography_tag = path.len() as i32 - 1;

    let mut swaps = Vec::new();
    collect_swaps(path, 0, path.len() - 1, &tags, &mut swaps);

    let initiator = path[0];
    let responder = path[path.len() - 1];

    path.iter()
        .map(|&node| {
            let mut ruleset = RuleSet::new(ruleset_id, node);
            for op in &swaps {
                if node == op.swapper {
                    ruleset.push_rule(swap_rule(op));
                } else if node == op.left || node == op.right {
                    ruleset.push_rule(correction_rule(op));
                }
            }
            if node == initiator {
                ruleset.push_rule(tomography_rule(node, responder, num_measure, tomography_tag));
            } else if node == responder {
                ruleset.push_rule(tomography_rule(node, initiator, num_measure, tomography_tag));
            }
            (node, ruleset)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(value: i32) -> NodeAddr {
        NodeAddr(value)
    }

    #[test]
    fn two_node_path_is_tomography_only() {
        let rulesets = synthesize_swap_tree(7, &[addr(1), addr(2)], 100);
        assert_eq!(rulesets.len(), 2);
        for (node, ruleset) in &rulesets {
            assert_eq!(ruleset.rules.len(), 1);
            assert_eq!(ruleset.owner_address, *node);
            let rule = &ruleset.rules[0];
            assert_eq!(rule.send_tag, 1);
            assert_eq!(rule.receive_tag, 1);
            assert!(rule.name.starts_with("tomography with address"));
        }
    }

    #[test]
    fn single_swapper_connects_the_endpoints() {
        let rulesets = synthesize_swap_tree(7, &[addr(1), addr(2), addr(3)], 0);
        let (_, middle) = &rulesets[1];
        assert_eq!(middle.rules.len(), 1);
        assert_eq!(middle.rules[0].name, "swap between 1 and 3");
        assert_eq!(middle.rules[0].send_tag, 1);

        let (_, left) = &rulesets[0];
        assert_eq!(left.rules.len(), 2);
        assert_eq!(left.rules[0].name, "swapping correction from 2");
        assert_eq!(left.rules[0].receive_tag, 1);
        assert_eq!(left.rules[1].name, "tomography with address 3");
        assert_eq!(left.rules[1].send_tag, 2);
    }

    #[test]
    fn four_node_chain_matches_the_reference_plan() {
        // Chain 2–3–4–5, responder 5. Node3 swaps the outer pair (tag 1),
        // node4 the inner (tag 2); tomography takes tag 3.
        let rulesets = synthesize_swap_tree(1234, &[addr(2), addr(3), addr(4), addr(5)], 0);
        let by_node: std::collections::HashMap<i32, &RuleSet> = rulesets
            .iter()
            .map(|(node, ruleset)| (node.0, ruleset))
            .collect();

        let node2 = by_node[&2];
        assert_eq!(node2.rules.len(), 2);
        assert_eq!(node2.rules[0].name, "swapping correction from 3");
        assert_eq!(node2.rules[0].receive_tag, 1);
        assert_eq!(node2.rules[1].name, "tomography with address 5");
        assert_eq!(node2.rules[1].send_tag, 3);

        let node3 = by_node[&3];
        assert_eq!(node3.rules.len(), 2);
        assert_eq!(node3.rules[0].name, "swapping correction from 4");
        assert_eq!(node3.rules[0].receive_tag, 2);
        assert_eq!(node3.rules[1].name, "swap between 2 and 5");
        assert_eq!(node3.rules[1].send_tag, 1);

        let node4 = by_node[&4];
        assert_eq!(node4.rules.len(), 1);
        assert_eq!(node4.rules[0].name, "swap between 3 and 5");
        assert_eq!(node4.rules[0].send_tag, 2);

        let node5 = by_node[&5];
        assert_eq!(node5.rules.len(), 3);
        assert_eq!(node5.rules[0].name, "swapping correction from 4");
        assert_eq!(node5.rules[0].receive_tag, 2);
        assert_eq!(node5.rules[1].name, "swapping correction from 3");
        assert_eq!(node5.rules[1].receive_tag, 1);
        assert_eq!(node5.rules[2].name, "tomography with address 2");
        assert_eq!(node5.rules[2].receive_tag, 3);
    }

    #[test]
    fn swap_rule_wire_shape_matches_reference() {
        let rulesets = synthesize_swap_tree(1234, &[addr(2), addr(3), addr(4), addr(5)], 0);
        let node4 = &rulesets[2].1;
        let value = node4.to_json();
        let expected = serde_json::json!({
            "num_rules": 1,
            "owner_address": 4,
            "ruleset_id": 1234,
            "rules": [
                {
                    "name": "swap between 3 and 5",
                    "send_tag": 2,
                    "receive_tag": -1,
                    "interface": [
                        {"partner_address": 3},
                        {"partner_address": 5}
                    ],
                    "condition": {
                        "clauses": [
                            {
                                "type": "enough_resource",
                                "options": {
                                    "interface": {"partner_address": 3},
                                    "num_resource": 1
                                }
                            },
                            {
                                "type": "enough_resource",
                                "options": {
                                    "interface": {"partner_address": 5},
                                    "num_resource": 1
                                }
                            }
                        ]
                    },
                    "action": {
                        "type": "swapping",
                        "options": {
                            "interface": [
                                {"partner_address": 3},
                                {"partner_address": 5}
                            ],
                            "remote_interface": [
                                {"partner_address": 3},
                                {"partner_address": 5}
                            ],
                            "shared_rule_tag": 2
                        }
                    }
                }
            ]
        });
        assert_eq!(value, expected);
    }

    #[test]
    fn six_node_chain_keeps_tags_in_path_order() {
        let path: Vec<NodeAddr> = (1..=6).map(addr).collect();
        let rulesets = synthesize_swap_tree(9, &path, 0);

        // Swappers 2..=5 take tags 1..=4 in path order.
        for (offset, (node, ruleset)) in rulesets.iter().enumerate().take(5).skip(1) {
            let swap = ruleset
                .rules
                .iter()
                .find(|rule| rule.name.starts_with("swap between"))
                .unwrap_or_else(|| panic!("node {node} should swap"));
            assert_eq!(swap.send_tag, offset as i32);
        }
        // The tomography pair takes the next tag on both endpoints.
        assert_eq!(rulesets[0].1.rules.last().unwrap().send_tag, 5);
        assert_eq!(rulesets[5].1.rules.last().unwrap().send_tag, 5);
    }
}

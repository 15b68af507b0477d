//! Teaching Order Linearizer
//!
//! Flattens a prerequisite tree into a bottom-up sequence, and marks mastered
//! nodes for display.

use crate::topic::{NodeKind, TeachingUnit, TopicNode, canonical_key};
use std::collections::HashSet;

/// Post-order traversal with first-occurrence deduplication.
///
/// A topic reachable through several branches is placed where the first
/// traversed branch meets it; later occurrences are dropped.
pub fn to_teaching_order(tree: &TopicNode) -> Vec<TeachingUnit> {
    fn visit(node: &TopicNode, seen: &mut HashSet<String>, order: &mut Vec<TeachingUnit>) {
        for child in &node.children {
            visit(child, seen, order);
        }
        if seen.insert(node.key()) {
            order.push(TeachingUnit::from(node));
        }
    }

    let mut seen = HashSet::new();
    let mut order = Vec::new();
    visit(tree, &mut seen, &mut order);
    order
}

/// Copy of `tree` with every node whose canonical topic is in `mastered`
/// marked MASTERED. Shape and all other fields are untouched.
pub fn prune_mastered(tree: &TopicNode, mastered: &HashSet<String>) -> TopicNode {
    TopicNode {
        topic: tree.topic.clone(),
        kind: if mastered.contains(&tree.key()) {
            NodeKind::Mastered
        } else {
            tree.kind
        },
        explanation: tree.explanation.clone(),
        children: tree
            .children
            .iter()
            .map(|child| prune_mastered(child, mastered))
            .collect(),
        cycle_break: tree.cycle_break,
    }
}

/// Drops units whose canonical topic is in `mastered`.
pub fn without_mastered(order: Vec<TeachingUnit>, mastered: &HashSet<String>) -> Vec<TeachingUnit> {
    order
        .into_iter()
        .filter(|unit| !mastered.contains(&canonical_key(&unit.topic)))
        .collect()
}

/// Indented outline of the tree, one topic per line.
pub fn render_tree(tree: &TopicNode) -> String {
    fn render(node: &TopicNode, indent: usize, lines: &mut Vec<String>) {
        let marker = match node.kind {
            NodeKind::Fact => " [FACT]",
            NodeKind::Mastered => " [MASTERED]",
            NodeKind::Concept | NodeKind::Leaf => "",
        };
        lines.push(format!("{}├─ {}{}", "  ".repeat(indent), node.topic, marker));
        for child in &node.children {
            render(child, indent + 1, lines);
        }
    }

    let mut lines = Vec::new();
    render(tree, 0, &mut lines);
    lines.join("\n")
}

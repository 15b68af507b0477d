use serde::{Deserialize, Serialize};

/// How a node participates in the prerequisite tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeKind {
    /// Atomic knowledge, explainable in one sentence.
    Fact,
    /// Decomposed into one to four prerequisites.
    Concept,
    /// Recursion stopped here (depth limit or cycle break).
    Leaf,
    /// Already mastered by the learner; only produced by pruning.
    Mastered,
}

/// A single node of the prerequisite tree.
///
/// Serialized as `{topic, type, explanation?, children}`, which is also the
/// shape persisted in the tree cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicNode {
    pub topic: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default)]
    pub children: Vec<TopicNode>,
    /// Set on LEAF nodes produced by the cycle guard.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cycle_break: bool,
}

impl TopicNode {
    pub fn fact(topic: impl Into<String>, explanation: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            kind: NodeKind::Fact,
            explanation: Some(explanation.into()),
            children: Vec::new(),
            cycle_break: false,
        }
    }

    pub fn leaf(topic: impl Into<String>, explanation: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            kind: NodeKind::Leaf,
            explanation: Some(explanation.into()),
            children: Vec::new(),
            cycle_break: false,
        }
    }

    /// A LEAF that stands in for a topic already on the recursion path.
    pub fn cycle_leaf(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            kind: NodeKind::Leaf,
            explanation: None,
            children: Vec::new(),
            cycle_break: true,
        }
    }

    pub fn concept(topic: impl Into<String>, children: Vec<TopicNode>) -> Self {
        Self {
            topic: topic.into(),
            kind: NodeKind::Concept,
            explanation: None,
            children,
            cycle_break: false,
        }
    }

    /// Case and whitespace normalized topic, used for deduplication.
    pub fn key(&self) -> String {
        canonical_key(&self.topic)
    }

    /// Number of edges on the longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        self.children
            .iter()
            .map(|child| child.depth() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Total number of nodes, including repeated topics.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(TopicNode::node_count).sum::<usize>()
    }
}

/// One step of the bottom-up teaching order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeachingUnit {
    pub topic: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl From<&TopicNode> for TeachingUnit {
    fn from(node: &TopicNode) -> Self {
        Self {
            topic: node.topic.clone(),
            kind: node.kind,
            explanation: node.explanation.clone(),
        }
    }
}

/// Lowercases and collapses whitespace so "  Cell  Membrane" and "cell membrane"
/// name the same topic.
pub fn canonical_key(topic: &str) -> String {
    topic
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TopicNode {
        TopicNode::concept(
            "Photosynthesis",
            vec![
                TopicNode::fact("Light", "Light is energy you can see."),
                TopicNode::concept(
                    "Chlorophyll",
                    vec![TopicNode::leaf("Pigment", "A pigment colours things.")],
                ),
            ],
        )
    }

    #[test]
    fn canonical_key_normalizes_case_and_whitespace() {
        assert_eq!(canonical_key("  Cell \t Membrane "), "cell membrane");
        assert_eq!(canonical_key("ATP"), canonical_key("atp"));
    }

    #[test]
    fn depth_counts_edges() {
        assert_eq!(TopicNode::fact("x", "y").depth(), 0);
        assert_eq!(sample().depth(), 2);
        assert_eq!(sample().node_count(), 4);
    }

    #[test]
    fn serializes_with_type_field_and_omits_empty_optionals() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["type"], "CONCEPT");
        assert!(json.get("explanation").is_none());
        assert!(json.get("cycle_break").is_none());
        assert_eq!(json["children"][0]["type"], "FACT");
        assert_eq!(json["children"][0]["explanation"], "Light is energy you can see.");
    }

    #[test]
    fn deserializes_minimal_node() {
        let node: TopicNode =
            serde_json::from_str(r#"{"topic":"Water","type":"MASTERED"}"#).unwrap();
        assert_eq!(node.kind, NodeKind::Mastered);
        assert!(node.children.is_empty());
        assert!(!node.cycle_break);
    }

    #[test]
    fn cycle_leaf_is_flagged() {
        let leaf = TopicNode::cycle_leaf("Energy");
        assert_eq!(leaf.kind, NodeKind::Leaf);
        let json = serde_json::to_value(&leaf).unwrap();
        assert_eq!(json["cycle_break"], true);
    }
}

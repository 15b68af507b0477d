//! Knowledge Decomposition Engine
//!
//! Recursively breaks a topic into simpler prerequisites until it reaches
//! facts, the depth limit, or a topic it has already seen. The oracle supplies
//! the decompositions; the store caches whole trees by root topic.

use crate::{
    config::{CycleGuard, TutorConfig},
    oracle::{Oracle, OracleRequest, is_diagnostic},
    prompts::{Prompts, render},
    store::Store,
    topic::{TopicNode, canonical_key},
};
use futures::future::BoxFuture;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Branching-factor limit for a single CONCEPT node.
pub const MAX_PREREQUISITES: usize = 4;

/// Reply the oracle gives for a topic with no prerequisites.
pub const ATOMIC_SENTINEL: &str = "FACT";

const DECOMPOSE_TEMPERATURE: f32 = 0.4;

/// Canonical topics already expanded during one build.
pub type VisitedTopics = HashSet<String>;

pub struct DecompositionEngine {
    oracle: Arc<dyn Oracle>,
    store: Arc<dyn Store>,
    prompts: Arc<Prompts>,
    max_depth: usize,
    cache_ttl_days: u32,
    cycle_guard: CycleGuard,
}

impl DecompositionEngine {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        store: Arc<dyn Store>,
        prompts: Arc<Prompts>,
        config: &TutorConfig,
    ) -> Self {
        Self {
            oracle,
            store,
            prompts,
            max_depth: config.max_tree_depth,
            cache_ttl_days: config.cache_ttl_days,
            cycle_guard: config.cycle_guard,
        }
    }

    /// Builds (or fetches from cache) the prerequisite tree rooted at `topic`.
    #[instrument(name = "build_tree", skip(self), fields(max_depth = self.max_depth))]
    pub async fn build_tree(&self, topic: &str) -> TopicNode {
        let mut visited = VisitedTopics::new();
        let tree = self.build_subtree(topic, 0, &mut visited).await;
        info!(
            nodes = tree.node_count(),
            depth = tree.depth(),
            "Prerequisite tree ready"
        );
        tree
    }

    /// Builds the subtree for `topic` at `depth`, threading `visited` through
    /// the recursion according to the configured cycle guard.
    pub fn build_subtree<'a>(
        &'a self,
        topic: &'a str,
        depth: usize,
        visited: &'a mut VisitedTopics,
    ) -> BoxFuture<'a, TopicNode> {
        Box::pin(async move {
            if depth == 0 {
                match self.store.get_tree(topic).await {
                    Ok(Some(cached)) => {
                        debug!(%topic, "Tree cache hit");
                        return cached;
                    }
                    Ok(None) => {}
                    Err(e) => warn!(%topic, error = ?e, "Tree cache lookup failed"),
                }
            }

            let key = canonical_key(topic);
            if !visited.insert(key) {
                debug!(%topic, depth, "Cycle guard cut recursion");
                return TopicNode::cycle_leaf(topic);
            }

            let node = if depth >= self.max_depth {
                TopicNode::leaf(topic, self.explain_fact(topic).await)
            } else {
                self.decompose(topic, depth, visited).await
            };

            if depth == 0 {
                self.cache_tree(topic, &node).await;
            }
            node
        })
    }

    async fn decompose(&self, topic: &str, depth: usize, visited: &mut VisitedTopics) -> TopicNode {
        let prompt = render(&self.prompts.decompose, &[("topic", topic)]);
        let response = self
            .oracle
            .generate(OracleRequest::new(prompt).with_temperature(DECOMPOSE_TEMPERATURE))
            .await;

        let prerequisites = if is_atomic(&response) {
            Vec::new()
        } else {
            parse_prerequisites(&response)
        };
        if prerequisites.is_empty() {
            return TopicNode::fact(topic, self.explain_fact(topic).await);
        }

        debug!(%topic, depth, ?prerequisites, "Decomposed topic");
        let mut children = Vec::with_capacity(prerequisites.len());
        for prerequisite in prerequisites.iter().take(MAX_PREREQUISITES) {
            let child = match self.cycle_guard {
                CycleGuard::Shared => self.build_subtree(prerequisite, depth + 1, visited).await,
                CycleGuard::Path => {
                    let mut branch = visited.clone();
                    self.build_subtree(prerequisite, depth + 1, &mut branch).await
                }
            };
            children.push(child);
        }
        TopicNode::concept(topic, children)
    }

    async fn explain_fact(&self, topic: &str) -> String {
        let prompt = render(&self.prompts.fact_explain, &[("topic", topic)]);
        self.oracle.generate(OracleRequest::new(prompt)).await
    }

    async fn cache_tree(&self, topic: &str, tree: &TopicNode) {
        if contains_diagnostic(tree) {
            warn!(%topic, "Not caching a tree that carries oracle errors");
            return;
        }
        if let Err(e) = self.store.put_tree(topic, tree, self.cache_ttl_days).await {
            warn!(%topic, error = ?e, "Failed to cache tree");
        }
    }
}

fn contains_diagnostic(node: &TopicNode) -> bool {
    node.explanation
        .as_deref()
        .is_some_and(is_diagnostic)
        || node.children.iter().any(contains_diagnostic)
}

/// True when the first non-empty line of the reply is the atomic sentinel.
pub fn is_atomic(response: &str) -> bool {
    let Some(first) = response.lines().map(str::trim).find(|line| !line.is_empty()) else {
        return false;
    };
    let first = first
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .to_uppercase();
    first.starts_with(ATOMIC_SENTINEL)
        && !first[ATOMIC_SENTINEL.len()..]
            .chars()
            .next()
            .is_some_and(char::is_alphabetic)
}

/// Extracts prerequisite names from a numbered (`1.` / `1)`) or bulleted
/// (`-`, `*`, `•`) list. Lines in any other shape are ignored.
pub fn parse_prerequisites(response: &str) -> Vec<String> {
    response
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let item = strip_list_marker(line)?;
            let name = item
                .trim()
                .trim_matches(|c: char| matches!(c, '`' | '"' | '\'' | '*'))
                .trim();
            (name.chars().count() > 1).then(|| name.to_string())
        })
        .collect()
}

fn strip_list_marker(line: &str) -> Option<&str> {
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        return rest
            .strip_prefix('.')
            .or_else(|| rest.strip_prefix(')'));
    }
    let rest = line.trim_start_matches(['-', '*', '•']);
    (rest.len() < line.len()).then_some(rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::MockOracle;
    use crate::store::MemoryStore;
    use crate::topic::NodeKind;
    use std::collections::HashMap;

    /// Text between the first pair of double quotes.
    fn quoted(prompt: &str) -> String {
        prompt.split('"').nth(1).unwrap_or_default().to_string()
    }

    /// An oracle that decomposes topics from a fixed table; anything not in the
    /// table is a FACT.
    fn scripted(table: &[(&str, &str)]) -> MockOracle {
        let table: HashMap<String, String> = table
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut oracle = MockOracle::new();
        oracle.expect_generate().returning(move |request| {
            let topic = quoted(&request.prompt);
            if request.prompt.contains("knowledge decomposition expert") {
                table.get(&topic).cloned().unwrap_or_else(|| "FACT".into())
            } else {
                format!("{topic} in one sentence.")
            }
        });
        oracle
    }

    fn engine(oracle: MockOracle, store: Arc<dyn Store>, config: TutorConfig) -> DecompositionEngine {
        DecompositionEngine::new(
            Arc::new(oracle),
            store,
            Arc::new(Prompts::default()),
            &config,
        )
    }

    #[test]
    fn parses_numbered_and_bulleted_lists() {
        let response = "1. Light\n2) Water\n- `Carbon dioxide`\n* \"Chlorophyll\"\n• Sugar\nHere you go!\n10. Enzymes";
        assert_eq!(
            parse_prerequisites(response),
            vec!["Light", "Water", "Carbon dioxide", "Chlorophyll", "Sugar", "Enzymes"]
        );
    }

    #[test]
    fn parser_skips_prose_and_single_characters() {
        assert!(parse_prerequisites("I am not sure what you mean.").is_empty());
        assert!(parse_prerequisites("1. X\n2.").is_empty());
        assert_eq!(parse_prerequisites("1. **Atoms**"), vec!["Atoms"]);
    }

    #[test]
    fn atomic_sentinel_detection() {
        assert!(is_atomic("FACT"));
        assert!(is_atomic("  fact.\nWater is wet."));
        assert!(is_atomic("**FACT**"));
        assert!(!is_atomic("Factoring\n1. Numbers"));
        assert!(!is_atomic("1. Light\n2. FACT"));
        assert!(!is_atomic(""));
    }

    #[tokio::test]
    async fn sentinel_yields_single_fact() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let tree = engine(scripted(&[]), store, TutorConfig::default())
            .build_tree("Photosynthesis")
            .await;
        assert_eq!(tree.kind, NodeKind::Fact);
        assert!(tree.children.is_empty());
        assert_eq!(tree.explanation.as_deref(), Some("Photosynthesis in one sentence."));
    }

    #[tokio::test]
    async fn three_bullets_make_three_recursed_children() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let oracle = scripted(&[("Photosynthesis", "- Light\n- Water\n- Chlorophyll")]);
        let tree = engine(oracle, store, TutorConfig::default())
            .build_tree("Photosynthesis")
            .await;

        assert_eq!(tree.kind, NodeKind::Concept);
        let names: Vec<_> = tree.children.iter().map(|c| c.topic.as_str()).collect();
        assert_eq!(names, ["Light", "Water", "Chlorophyll"]);
        for child in &tree.children {
            assert_eq!(child.kind, NodeKind::Fact);
            assert_eq!(
                child.explanation,
                Some(format!("{} in one sentence.", child.topic))
            );
        }
    }

    #[tokio::test]
    async fn branching_is_capped_at_four() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let oracle = scripted(&[("Cells", "1. A1\n2. B2\n3. C3\n4. D4\n5. E5\n6. F6")]);
        let tree = engine(oracle, store, TutorConfig::default())
            .build_tree("Cells")
            .await;
        assert_eq!(tree.children.len(), MAX_PREREQUISITES);
        assert_eq!(tree.children[3].topic, "D4");
    }

    #[tokio::test]
    async fn depth_never_exceeds_limit() {
        let mut oracle = MockOracle::new();
        oracle.expect_generate().returning(|request| {
            let topic = quoted(&request.prompt);
            if request.prompt.contains("knowledge decomposition expert") {
                format!("1. {topic} left\n2. {topic} right")
            } else {
                "leaf".into()
            }
        });
        let config = TutorConfig {
            max_tree_depth: 2,
            ..TutorConfig::default()
        };
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let tree = engine(oracle, store, config).build_tree("Root").await;

        assert_eq!(tree.depth(), 2);
        assert_eq!(tree.node_count(), 7);
        let grandchild = &tree.children[0].children[0];
        assert_eq!(grandchild.kind, NodeKind::Leaf);
        assert_eq!(grandchild.explanation.as_deref(), Some("leaf"));
    }

    #[tokio::test]
    async fn cached_tree_short_circuits_before_any_oracle_call() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let oracle = scripted(&[("Photosynthesis", "1. Light\n2. Water")]);
        let first = engine(oracle, store.clone(), TutorConfig::default())
            .build_tree("Photosynthesis")
            .await;

        let mut silent = MockOracle::new();
        silent.expect_generate().times(0);
        let second = engine(silent, store, TutorConfig::default())
            .build_tree("Photosynthesis")
            .await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn ancestor_repeat_becomes_cycle_leaf() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let oracle = scripted(&[("Energy", "1. Work"), ("Work", "1. energy")]);
        let tree = engine(oracle, store, TutorConfig::default())
            .build_tree("Energy")
            .await;
        let cut = &tree.children[0].children[0];
        assert_eq!(cut.kind, NodeKind::Leaf);
        assert!(cut.cycle_break);
        assert!(cut.explanation.is_none());
    }

    #[tokio::test]
    async fn shared_guard_cuts_repeat_in_sibling_subtree() {
        let table = [("Root", "1. Left\n2. Right"), ("Left", "1. Atom"), ("Right", "1. Atom")];
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let tree = engine(scripted(&table), store, TutorConfig::default())
            .build_tree("Root")
            .await;
        assert_eq!(tree.children[0].children[0].kind, NodeKind::Fact);
        assert!(tree.children[1].children[0].cycle_break);
    }

    #[tokio::test]
    async fn path_guard_keeps_repeat_in_sibling_subtree() {
        let table = [("Root", "1. Left\n2. Right"), ("Left", "1. Atom"), ("Right", "1. Atom")];
        let config = TutorConfig {
            cycle_guard: CycleGuard::Path,
            ..TutorConfig::default()
        };
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let tree = engine(scripted(&table), store, config).build_tree("Root").await;
        assert_eq!(tree.children[1].children[0].kind, NodeKind::Fact);
        assert!(!tree.children[1].children[0].cycle_break);
    }

    #[tokio::test]
    async fn malformed_decomposition_degrades_to_fact() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let oracle = scripted(&[("Gravity", "Gravity is complicated, sorry.")]);
        let tree = engine(oracle, store, TutorConfig::default())
            .build_tree("Gravity")
            .await;
        assert_eq!(tree.kind, NodeKind::Fact);
    }

    #[tokio::test]
    async fn oracle_failure_is_inlined_and_not_cached() {
        let mut oracle = MockOracle::new();
        oracle
            .expect_generate()
            .returning(|_| "Error: request timed out".to_string());
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let tree = engine(oracle, store.clone(), TutorConfig::default())
            .build_tree("Gravity")
            .await;

        assert_eq!(tree.kind, NodeKind::Fact);
        assert_eq!(tree.explanation.as_deref(), Some("Error: request timed out"));
        assert!(store.get_tree("Gravity").await.unwrap().is_none());
    }
}

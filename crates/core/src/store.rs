//! Keyed persistence for trees, synthesis questions and mastery records.
//!
//! The `Store` trait is the only way the engine and the session machine touch
//! persistence. `MemoryStore` backs tests and database-less deployments.

use crate::topic::{TopicNode, canonical_key};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

/// Proof that a learner demonstrated integrated understanding of a concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasteryRecord {
    pub concept: String,
    pub mastered_at: DateTime<Utc>,
    pub answer_excerpt: String,
    pub insight: String,
    pub time_spent_secs: i64,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Returns the cached tree for the raw topic string if it has not expired.
    async fn get_tree(&self, topic: &str) -> Result<Option<TopicNode>>;

    async fn put_tree(&self, topic: &str, tree: &TopicNode, ttl_days: u32) -> Result<()>;

    /// Canonical keys of every concept the learner has mastered.
    async fn mastered_concepts(&self, learner_id: &str) -> Result<HashSet<String>>;

    async fn mastery_records(&self, learner_id: &str) -> Result<Vec<MasteryRecord>>;

    /// Inserts or replaces the learner's record for `record.concept`.
    async fn put_mastery(&self, learner_id: &str, record: MasteryRecord) -> Result<()>;

    async fn get_cached_question(
        &self,
        concept: &str,
        prerequisites: &[String],
    ) -> Result<Option<String>>;

    async fn put_cached_question(
        &self,
        concept: &str,
        prerequisites: &[String],
        question: &str,
        difficulty: &str,
    ) -> Result<()>;
}

/// Order-independent key for a prerequisite set: a sorted JSON array.
pub fn prerequisite_key(prerequisites: &[String]) -> String {
    let mut sorted: Vec<&str> = prerequisites.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    serde_json::to_string(&sorted).unwrap_or_default()
}

#[derive(Debug, Clone)]
struct CachedTree {
    tree: TopicNode,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct CachedQuestion {
    question: String,
    difficulty: String,
}

#[derive(Default)]
struct MemoryTables {
    trees: HashMap<String, CachedTree>,
    questions: HashMap<(String, String), CachedQuestion>,
    mastery: HashMap<String, Vec<MasteryRecord>>,
}

/// A process-local `Store`. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<MemoryTables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_tree(&self, topic: &str) -> Result<Option<TopicNode>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .trees
            .get(topic)
            .filter(|cached| cached.expires_at > Utc::now())
            .map(|cached| cached.tree.clone()))
    }

    async fn put_tree(&self, topic: &str, tree: &TopicNode, ttl_days: u32) -> Result<()> {
        let expires_at = Utc::now() + Duration::days(i64::from(ttl_days));
        self.tables.lock().await.trees.insert(
            topic.to_string(),
            CachedTree {
                tree: tree.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn mastered_concepts(&self, learner_id: &str) -> Result<HashSet<String>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .mastery
            .get(learner_id)
            .map(|records| records.iter().map(|r| canonical_key(&r.concept)).collect())
            .unwrap_or_default())
    }

    async fn mastery_records(&self, learner_id: &str) -> Result<Vec<MasteryRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables.mastery.get(learner_id).cloned().unwrap_or_default())
    }

    async fn put_mastery(&self, learner_id: &str, record: MasteryRecord) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let records = tables.mastery.entry(learner_id.to_string()).or_default();
        records.retain(|existing| existing.concept != record.concept);
        records.push(record);
        Ok(())
    }

    async fn get_cached_question(
        &self,
        concept: &str,
        prerequisites: &[String],
    ) -> Result<Option<String>> {
        let key = (concept.to_string(), prerequisite_key(prerequisites));
        let tables = self.tables.lock().await;
        Ok(tables.questions.get(&key).map(|cached| cached.question.clone()))
    }

    async fn put_cached_question(
        &self,
        concept: &str,
        prerequisites: &[String],
        question: &str,
        difficulty: &str,
    ) -> Result<()> {
        let key = (concept.to_string(), prerequisite_key(prerequisites));
        self.tables.lock().await.questions.insert(
            key,
            CachedQuestion {
                question: question.to_string(),
                difficulty: difficulty.to_string(),
            },
        );
        Ok(())
    }
}

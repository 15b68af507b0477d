//! Data Access Layer
//!
//! Postgres implementation of the core `Store`, plus persistence for the
//! server-held session snapshot. Queries are built at runtime with `sqlx` so
//! the crate compiles without a live database.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, PgPool};
use std::collections::HashSet;
use tutor_core::{
    store::{MasteryRecord, Store, prerequisite_key},
    topic::{TopicNode, canonical_key},
};

use crate::models::SessionSnapshot;

/// A wrapper around the `PgPool` to provide a clear data access interface.
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

#[derive(FromRow)]
struct MasteryRow {
    concept: String,
    mastered_at: DateTime<Utc>,
    answer_excerpt: String,
    insight: String,
    time_spent_secs: i64,
}

impl From<MasteryRow> for MasteryRecord {
    fn from(row: MasteryRow) -> Self {
        Self {
            concept: row.concept,
            mastered_at: row.mastered_at,
            answer_excerpt: row.answer_excerpt,
            insight: row.insight,
            time_spent_secs: row.time_spent_secs,
        }
    }
}

impl Db {
    /// Creates a new `Db` instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs all pending `sqlx` migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Loads the learner's last saved session, if any.
    pub async fn load_snapshot(&self, learner_id: &str) -> Result<Option<SessionSnapshot>> {
        let value: Option<serde_json::Value> =
            sqlx::query_scalar("SELECT snapshot FROM session_snapshots WHERE learner_id = $1")
                .bind(learner_id)
                .fetch_optional(&self.pool)
                .await?;
        match value {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Replaces the learner's saved session.
    pub async fn save_snapshot(&self, learner_id: &str, snapshot: &SessionSnapshot) -> Result<()> {
        let value = serde_json::to_value(snapshot)?;
        sqlx::query(
            r#"
            INSERT INTO session_snapshots (learner_id, snapshot, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (learner_id)
            DO UPDATE SET snapshot = EXCLUDED.snapshot, updated_at = NOW()
            "#,
        )
        .bind(learner_id)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Store for Db {
    async fn get_tree(&self, topic: &str) -> Result<Option<TopicNode>> {
        let value: Option<serde_json::Value> = sqlx::query_scalar(
            "SELECT tree_json FROM topic_trees WHERE topic = $1 AND expires_at > NOW()",
        )
        .bind(topic)
        .fetch_optional(&self.pool)
        .await?;
        match value {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn put_tree(&self, topic: &str, tree: &TopicNode, ttl_days: u32) -> Result<()> {
        let expires_at = Utc::now() + Duration::days(i64::from(ttl_days));
        sqlx::query(
            r#"
            INSERT INTO topic_trees (topic, tree_json, depth, node_count, created_at, expires_at)
            VALUES ($1, $2, $3, $4, NOW(), $5)
            ON CONFLICT (topic)
            DO UPDATE SET tree_json = EXCLUDED.tree_json,
                          depth = EXCLUDED.depth,
                          node_count = EXCLUDED.node_count,
                          created_at = NOW(),
                          expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(topic)
        .bind(serde_json::to_value(tree)?)
        .bind(i32::try_from(tree.depth())?)
        .bind(i32::try_from(tree.node_count())?)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mastered_concepts(&self, learner_id: &str) -> Result<HashSet<String>> {
        let keys: Vec<String> =
            sqlx::query_scalar("SELECT concept_key FROM concept_mastery WHERE learner_id = $1")
                .bind(learner_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(keys.into_iter().collect())
    }

    async fn mastery_records(&self, learner_id: &str) -> Result<Vec<MasteryRecord>> {
        let rows: Vec<MasteryRow> = sqlx::query_as(
            r#"
            SELECT concept, mastered_at, answer_excerpt, insight, time_spent_secs
            FROM concept_mastery
            WHERE learner_id = $1
            ORDER BY mastered_at ASC
            "#,
        )
        .bind(learner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(MasteryRecord::from).collect())
    }

    async fn put_mastery(&self, learner_id: &str, record: MasteryRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO concept_mastery
                (learner_id, concept, concept_key, mastered_at, answer_excerpt, insight, time_spent_secs)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (learner_id, concept)
            DO UPDATE SET mastered_at = EXCLUDED.mastered_at,
                          answer_excerpt = EXCLUDED.answer_excerpt,
                          insight = EXCLUDED.insight,
                          time_spent_secs = EXCLUDED.time_spent_secs
            "#,
        )
        .bind(learner_id)
        .bind(&record.concept)
        .bind(canonical_key(&record.concept))
        .bind(record.mastered_at)
        .bind(&record.answer_excerpt)
        .bind(&record.insight)
        .bind(record.time_spent_secs)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_cached_question(
        &self,
        concept: &str,
        prerequisites: &[String],
    ) -> Result<Option<String>> {
        let question = sqlx::query_scalar(
            "SELECT question FROM synthesis_questions WHERE concept = $1 AND prerequisites = $2",
        )
        .bind(concept)
        .bind(prerequisite_key(prerequisites))
        .fetch_optional(&self.pool)
        .await?;
        Ok(question)
    }

    async fn put_cached_question(
        &self,
        concept: &str,
        prerequisites: &[String],
        question: &str,
        difficulty: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO synthesis_questions (concept, prerequisites, question, difficulty)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (concept, prerequisites)
            DO UPDATE SET question = EXCLUDED.question, difficulty = EXCLUDED.difficulty
            "#,
        )
        .bind(concept)
        .bind(prerequisite_key(prerequisites))
        .bind(question)
        .bind(difficulty)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

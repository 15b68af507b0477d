//! Synthesis questions: real-world scenarios that force the learner to combine
//! prerequisites instead of reciting definitions.

use crate::{
    oracle::{Oracle, OracleRequest, is_diagnostic},
    prompts::{Prompts, render},
    store::Store,
};
use std::sync::Arc;
use tracing::{debug, warn};

const QUESTION_TEMPERATURE: f32 = 0.8;

pub struct QuestionGenerator {
    oracle: Arc<dyn Oracle>,
    store: Arc<dyn Store>,
    prompts: Arc<Prompts>,
}

impl QuestionGenerator {
    pub fn new(oracle: Arc<dyn Oracle>, store: Arc<dyn Store>, prompts: Arc<Prompts>) -> Self {
        Self {
            oracle,
            store,
            prompts,
        }
    }

    /// Returns a question for `concept` over `prerequisites`, reusing a cached
    /// one for the same concept and prerequisite set.
    pub async fn question_for(
        &self,
        concept: &str,
        prerequisites: &[String],
        difficulty: &str,
    ) -> String {
        match self.store.get_cached_question(concept, prerequisites).await {
            Ok(Some(question)) => {
                debug!(%concept, "Synthesis question cache hit");
                return question;
            }
            Ok(None) => {}
            Err(e) => warn!(%concept, error = ?e, "Synthesis question lookup failed"),
        }

        if prerequisites.is_empty() {
            return self.single_concept_question(concept).await;
        }

        let listed = prerequisites
            .iter()
            .map(|p| format!("- {p}"))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = render(
            &self.prompts.synthesis,
            &[
                ("concept", concept),
                ("prerequisites", &listed),
                ("difficulty", difficulty),
            ],
        );
        let question = self
            .oracle
            .generate(OracleRequest::new(prompt).with_temperature(QUESTION_TEMPERATURE))
            .await;

        if !is_diagnostic(&question) {
            if let Err(e) = self
                .store
                .put_cached_question(concept, prerequisites, &question, difficulty)
                .await
            {
                warn!(%concept, error = ?e, "Failed to cache synthesis question");
            }
        }
        question
    }

    async fn single_concept_question(&self, concept: &str) -> String {
        let prompt = render(&self.prompts.single_concept, &[("concept", concept)]);
        self.oracle
            .generate(OracleRequest::new(prompt).with_temperature(QUESTION_TEMPERATURE))
            .await
    }
}

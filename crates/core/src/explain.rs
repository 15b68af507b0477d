//! First-principles explanations that build on what the learner already knows.

use crate::{
    oracle::{Oracle, OracleRequest},
    prompts::{Prompts, render},
};
use std::sync::Arc;

const NOTHING_KNOWN: &str = "basic everyday experience";

pub struct Explainer {
    oracle: Arc<dyn Oracle>,
    prompts: Arc<Prompts>,
}

impl Explainer {
    pub fn new(oracle: Arc<dyn Oracle>, prompts: Arc<Prompts>) -> Self {
        Self { oracle, prompts }
    }

    /// Explains `concept`, assuming the learner understands `known`.
    pub async fn explain(&self, concept: &str, known: &[String]) -> String {
        let known = if known.is_empty() {
            NOTHING_KNOWN.to_string()
        } else {
            known.join(", ")
        };
        let prompt = render(
            &self.prompts.explain,
            &[("concept", concept), ("known", &known)],
        );
        self.oracle.generate(OracleRequest::new(prompt)).await
    }
}

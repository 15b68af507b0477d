//! Session State Machine
//!
//! Drives the explain / confirm / quiz / grade / advance dialogue over a
//! teaching order. The machine never owns a session: each call takes the
//! current [`SessionContext`] and returns the reply together with the updated
//! context, so the same core serves a server-held session, a per-connection
//! session, or a context round-tripped by the caller.

use crate::{
    config::TutorConfig,
    decompose::DecompositionEngine,
    explain::Explainer,
    grading::AnswerEvaluator,
    linearize::{render_tree, to_teaching_order, without_mastered},
    oracle::{Oracle, OracleRequest},
    prompts::{Prompts, render},
    store::{MasteryRecord, Store},
    synthesis::QuestionGenerator,
    topic::{TeachingUnit, TopicNode},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Longest answer excerpt kept in a mastery record, in characters.
pub const MAX_ANSWER_EXCERPT: usize = 500;

const TRIVIAL_MASTERY_NOTE: &str = "First concept: basic understanding confirmed";

const LEARNING_TRIGGERS: &[&str] = &[
    "what is",
    "explain",
    "teach me",
    "learn:",
    "learn about",
    "how does",
    "i want to learn",
    "help me understand",
    "tell me about",
    "break down",
];

const TOPIC_PREFIXES: &[&str] = &[
    "i want to learn about",
    "help me understand",
    "i want to learn",
    "teach me about",
    "tell me about",
    "learn about",
    "break down",
    "teach me",
    "how does",
    "explain",
    "what is",
    "learn:",
];

const AFFIRMATIVES: &[&str] = &[
    "yes",
    "yeah",
    "yep",
    "ready",
    "next",
    "continue",
    "ok",
    "okay",
    "sure",
    "got it",
    "makes sense",
];

/// Everything the machine needs to resume a learner's session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionContext {
    pub tree: Option<TopicNode>,
    pub teaching_order: Vec<TeachingUnit>,
    pub current_index: usize,
    pub waiting_for_synthesis: bool,
    pub current_question: String,
    pub attempt_count: u32,
    pub target_topic: String,
    pub explained_current: bool,
    /// When the open synthesis question was asked.
    pub synthesis_started_at: Option<DateTime<Utc>>,
}

/// Conceptual state derived from a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "index", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Idle,
    Explaining(usize),
    AwaitConfirm(usize),
    AwaitSynthesis(usize),
    Complete,
}

impl SessionContext {
    pub fn phase(&self) -> Phase {
        if self.tree.is_none() || self.teaching_order.is_empty() {
            return Phase::Idle;
        }
        let i = self.current_index;
        if self.is_complete() {
            Phase::Complete
        } else if self.waiting_for_synthesis {
            Phase::AwaitSynthesis(i)
        } else if self.explained_current {
            Phase::AwaitConfirm(i)
        } else {
            Phase::Explaining(i)
        }
    }

    pub fn is_complete(&self) -> bool {
        self.current_index >= self.teaching_order.len()
    }

    pub fn current_unit(&self) -> Option<&TeachingUnit> {
        self.teaching_order.get(self.current_index)
    }

    fn has_pending_unit(&self) -> bool {
        self.tree.is_some() && self.current_index < self.teaching_order.len()
    }

    /// The unit at `index` and up to two units before it.
    fn prerequisites_for(&self, index: usize) -> Vec<String> {
        self.teaching_order[index.saturating_sub(2)..=index]
            .iter()
            .map(|unit| unit.topic.clone())
            .collect()
    }

    fn move_past_current(&mut self) {
        self.waiting_for_synthesis = false;
        self.current_index += 1;
        self.explained_current = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    Message,
    Explanation,
    SynthesisQuestion,
    Feedback,
    Tree,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnData {
    Tree {
        tree: TopicNode,
        teaching_order: Vec<String>,
    },
    Grade {
        passed: bool,
        score: u8,
    },
    AlreadyMastered {
        tree: TopicNode,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResponse {
    pub text: String,
    pub kind: TurnKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<TurnData>,
}

impl TurnResponse {
    fn new(text: impl Into<String>, kind: TurnKind) -> Self {
        Self {
            text: text.into(),
            kind,
            data: None,
        }
    }

    pub fn message(text: impl Into<String>) -> Self {
        Self::new(text, TurnKind::Message)
    }

    fn with_data(mut self, data: TurnData) -> Self {
        self.data = Some(data);
        self
    }
}

/// The tutoring core: one inbound message, one transition.
#[derive(Clone)]
pub struct SessionMachine {
    oracle: Arc<dyn Oracle>,
    store: Arc<dyn Store>,
    prompts: Arc<Prompts>,
    engine: Arc<DecompositionEngine>,
    explainer: Arc<Explainer>,
    questions: Arc<QuestionGenerator>,
    evaluator: Arc<AnswerEvaluator>,
    config: TutorConfig,
}

impl SessionMachine {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        store: Arc<dyn Store>,
        prompts: Prompts,
        config: TutorConfig,
    ) -> Self {
        let prompts = Arc::new(prompts);
        Self {
            engine: Arc::new(DecompositionEngine::new(
                oracle.clone(),
                store.clone(),
                prompts.clone(),
                &config,
            )),
            explainer: Arc::new(Explainer::new(oracle.clone(), prompts.clone())),
            questions: Arc::new(QuestionGenerator::new(
                oracle.clone(),
                store.clone(),
                prompts.clone(),
            )),
            evaluator: Arc::new(AnswerEvaluator::new(oracle.clone(), prompts.clone())),
            oracle,
            store,
            prompts,
            config,
        }
    }

    /// The same machine acting on behalf of another learner.
    pub fn for_learner(&self, learner_id: impl Into<String>) -> Self {
        let mut machine = self.clone();
        machine.config.learner_id = learner_id.into();
        machine
    }

    pub fn config(&self) -> &TutorConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Canonical keys of the learner's mastered concepts. Store failures read
    /// as "nothing mastered".
    pub async fn mastered_concepts(&self) -> HashSet<String> {
        self.store
            .mastered_concepts(&self.config.learner_id)
            .await
            .unwrap_or_else(|e| {
                warn!(error = ?e, "Failed to read mastered concepts");
                HashSet::new()
            })
    }

    /// Processes one learner message.
    #[instrument(skip_all, fields(learner = %self.config.learner_id, phase = ?context.phase()))]
    pub async fn handle_turn(
        &self,
        message: &str,
        mut context: SessionContext,
    ) -> (TurnResponse, SessionContext) {
        let message = message.trim();
        if message.is_empty() {
            return (TurnResponse::message("Please type something!"), context);
        }

        if context.waiting_for_synthesis {
            let response = self.evaluate_answer(&mut context, message).await;
            return (response, context);
        }

        if context.has_pending_unit() && !context.explained_current {
            let explanation = self.explain_unit(&context, context.current_index).await;
            context.explained_current = true;
            let response = TurnResponse::new(
                format!("{explanation}\n\nDoes this make sense?"),
                TurnKind::Explanation,
            );
            return (response, context);
        }

        if let Some(topic) = learning_topic(message) {
            if topic.is_empty() {
                return (
                    TurnResponse::message(
                        "Tell me what you'd like to learn, for example 'Learn: Photosynthesis'.",
                    ),
                    context,
                );
            }
            return self.start_learning(&topic).await;
        }

        if context.has_pending_unit() && is_affirmative(message) {
            let response = self.advance(&mut context).await;
            return (response, context);
        }

        (self.converse(message).await, context)
    }

    /// Builds the tree for `topic` and opens a fresh session on it.
    #[instrument(skip(self), fields(learner = %self.config.learner_id))]
    pub async fn start_learning(&self, topic: &str) -> (TurnResponse, SessionContext) {
        info!("Starting a new learning session");
        let mut context = SessionContext {
            target_topic: topic.to_string(),
            ..SessionContext::default()
        };

        let tree = self.engine.build_tree(topic).await;
        let mastered = self.mastered_concepts().await;
        let order = without_mastered(to_teaching_order(&tree), &mastered);

        if order.is_empty() {
            info!("Every concept is already mastered");
            let response = TurnResponse::message(format!(
                "🎉 You've already mastered all prerequisites for **{topic}**! Ask me anything about it."
            ))
            .with_data(TurnData::AlreadyMastered { tree });
            return (response, context);
        }

        let tree_text = render_tree(&tree);
        let total = order.len();
        let teaching_order: Vec<String> = order.iter().map(|unit| unit.topic.clone()).collect();
        context.teaching_order = order;
        context.tree = Some(tree.clone());

        let explanation = self.explain_unit(&context, 0).await;
        context.current_index = 0;
        context.explained_current = true;
        context.waiting_for_synthesis = false;

        let text = format!(
            "Great! Let me break down **{topic}** into building blocks.\n\n```\n{tree_text}\n```\n\n\
             We'll learn **{total} concepts**, starting with the simplest: **{first}**.\n\n\
             {explanation}\n\nDoes this make sense? Ready to continue?",
            first = teaching_order[0],
        );
        info!(total, "Teaching order ready");
        let response = TurnResponse::new(text, TurnKind::Tree).with_data(TurnData::Tree {
            tree,
            teaching_order,
        });
        (response, context)
    }

    /// The learner confirmed the current explanation: quiz them, or move on
    /// directly when there is nothing to combine yet.
    async fn advance(&self, context: &mut SessionContext) -> TurnResponse {
        let index = context.current_index;
        let concept = context.teaching_order[index].topic.clone();
        let prerequisites = context.prerequisites_for(index);

        if index == 0 && prerequisites.len() <= 1 {
            debug!(%concept, "First concept confirmed without a quiz");
            self.record_mastery(&concept, TRIVIAL_MASTERY_NOTE, "", 0).await;
            context.current_index += 1;
            context.explained_current = false;

            if context.is_complete() {
                return TurnResponse::message(completion_message(&context.target_topic));
            }
            let explanation = self.explain_unit(context, context.current_index).await;
            context.explained_current = true;
            return TurnResponse::new(
                format!("✅ **{concept}**: got it!\n\n---\n\n{explanation}\n\nDoes this make sense?"),
                TurnKind::Explanation,
            );
        }

        let mut question = self
            .questions
            .question_for(&concept, &prerequisites, &self.config.synthesis_difficulty)
            .await;
        if question.trim().is_empty() {
            question = format!(
                "Explain how {} come together in **{concept}**, with one real-world example.",
                prerequisites.join(", ")
            );
        }

        context.waiting_for_synthesis = true;
        context.current_question = question.clone();
        context.attempt_count = 0;
        context.synthesis_started_at = Some(Utc::now());
        info!(%concept, ?prerequisites, "Asked synthesis question");

        TurnResponse::new(
            format!(
                "Now let's test your understanding of **{concept}**.\n\n{question}\n\n\
                 Take your time and explain your reasoning!"
            ),
            TurnKind::SynthesisQuestion,
        )
    }

    async fn evaluate_answer(&self, context: &mut SessionContext, answer: &str) -> TurnResponse {
        let index = context.current_index;
        let Some(unit) = context.teaching_order.get(index) else {
            warn!(index, "Synthesis answer with no open concept, clearing the question");
            context.waiting_for_synthesis = false;
            context.current_question.clear();
            return TurnResponse::message(
                "There's no open question right now. Say 'Learn: <topic>' to start something new.",
            );
        };
        let concept = unit.topic.clone();
        let prerequisites = context.prerequisites_for(index);

        let evaluation = self
            .evaluator
            .evaluate(&context.current_question, answer, &prerequisites)
            .await;
        // Caller-supplied contexts may carry any count.
        context.attempt_count = context
            .attempt_count
            .min(self.config.max_attempts)
            .saturating_add(1);
        info!(
            %concept,
            passed = evaluation.passed,
            score = evaluation.score,
            attempt = context.attempt_count,
            "Graded synthesis answer"
        );
        let grade = TurnData::Grade {
            passed: evaluation.passed,
            score: evaluation.score,
        };

        if evaluation.passed {
            let time_spent = context
                .synthesis_started_at
                .map(|asked| (Utc::now() - asked).num_seconds().max(0))
                .unwrap_or(0);
            let excerpt: String = answer.chars().take(MAX_ANSWER_EXCERPT).collect();
            self.record_mastery(&concept, &excerpt, &evaluation.insight, time_spent)
                .await;

            let mut text = format!(
                "**Excellent!** {}\n\n✅ You've mastered **{concept}** (Score: {}/100)\n\n",
                evaluation.feedback, evaluation.score
            );
            if !evaluation.insight.is_empty() {
                text.push_str(&format!("💡 Key insight: *{}*\n\n", evaluation.insight));
            }
            context.move_past_current();
            text.push_str(&self.continue_or_complete(context).await);
            return TurnResponse::new(text, TurnKind::Feedback).with_data(grade);
        }

        if context.attempt_count >= self.config.max_attempts {
            info!(%concept, "Attempts exhausted, moving on without mastery");
            context.move_past_current();

            let mut text = format!(
                "{}\n\nLet me explain the key connections:\n\n",
                evaluation.feedback
            );
            if !evaluation.missing.is_empty() {
                let remedial = self
                    .evaluator
                    .remedial(&concept, &evaluation.missing, &prerequisites)
                    .await;
                text.push_str(&remedial);
                text.push_str("\n\n");
            }
            text.push_str("Let's move forward. We can revisit this later.\n\n");
            text.push_str(&self.continue_or_complete(context).await);
            return TurnResponse::new(text, TurnKind::Feedback).with_data(grade);
        }

        let remaining = self.config.max_attempts - context.attempt_count;
        let mut text = format!("{}\n\n", evaluation.feedback);
        if !evaluation.missing.is_empty() {
            let hint = self.evaluator.hint(&evaluation.missing, &prerequisites).await;
            text.push_str(&format!("💡 **Hint:** {hint}\n\n"));
        }
        text.push_str(&format!(
            "Try again! ({remaining} attempt{} remaining)",
            if remaining == 1 { "" } else { "s" }
        ));
        TurnResponse::new(text, TurnKind::Feedback).with_data(grade)
    }

    /// Explains the new current unit, or closes the session when none is left.
    async fn continue_or_complete(&self, context: &mut SessionContext) -> String {
        if context.is_complete() {
            info!(topic = %context.target_topic, "Teaching order complete");
            return completion_message(&context.target_topic);
        }
        let explanation = self.explain_unit(context, context.current_index).await;
        context.explained_current = true;
        format!("---\n\n{explanation}\n\nDoes this make sense?")
    }

    async fn explain_unit(&self, context: &SessionContext, index: usize) -> String {
        let unit = &context.teaching_order[index];
        let known: Vec<String> = context.teaching_order[..index]
            .iter()
            .map(|unit| unit.topic.clone())
            .collect();
        let explanation = self.explainer.explain(&unit.topic, &known).await;
        debug!(concept = %unit.topic, index, "Explained concept");
        format!("**{}**\n\n{explanation}", unit.topic)
    }

    async fn record_mastery(&self, concept: &str, answer_excerpt: &str, insight: &str, time_spent_secs: i64) {
        let record = MasteryRecord {
            concept: concept.to_string(),
            mastered_at: Utc::now(),
            answer_excerpt: answer_excerpt.to_string(),
            insight: insight.to_string(),
            time_spent_secs,
        };
        if let Err(e) = self.store.put_mastery(&self.config.learner_id, record).await {
            warn!(%concept, error = ?e, "Failed to record mastery");
        }
    }

    /// Free conversation outside the teaching flow.
    async fn converse(&self, message: &str) -> TurnResponse {
        let mastered = match self.store.mastery_records(&self.config.learner_id).await {
            Ok(records) if !records.is_empty() => records
                .iter()
                .map(|r| r.concept.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            Ok(_) => "none yet".to_string(),
            Err(e) => {
                warn!(error = ?e, "Failed to read mastery records");
                "unknown".to_string()
            }
        };
        let system_prompt = render(&self.prompts.assistant, &[("mastered", &mastered)]);
        let reply = self
            .oracle
            .generate(OracleRequest::new(message).with_system_prompt(system_prompt))
            .await;
        TurnResponse::message(reply)
    }
}

/// The closing challenge once every unit has been taught.
pub fn completion_message(target: &str) -> String {
    format!(
        "🎉 **Amazing work!** You've mastered all the building blocks for **{target}**!\n\n\
         Now for the final challenge: explain **{target}** in your own words.\n\n\
         **Requirements:**\n\
         - Use at least 3 concepts from your learning path\n\
         - Explain how they connect to form {target}\n\
         - Give a real-world example\n\n\
         This is your chance to put it all together! 🚀"
    )
}

/// The topic a learning request asks for, or `None` when the message is not a
/// learning request. The longest leading trigger phrase is stripped along with
/// trailing punctuation.
pub fn learning_topic(message: &str) -> Option<String> {
    let message = message.trim();
    let lower = message.to_lowercase();
    if !LEARNING_TRIGGERS.iter().any(|trigger| lower.contains(trigger)) {
        return None;
    }

    let topic = TOPIC_PREFIXES
        .iter()
        .find_map(|prefix| {
            let head = message.get(..prefix.len())?;
            head.eq_ignore_ascii_case(prefix)
                .then(|| &message[prefix.len()..])
        })
        .unwrap_or(message);
    Some(
        topic
            .trim()
            .trim_end_matches(['?', '.', '!'])
            .trim()
            .to_string(),
    )
}

/// True when the message contains a continuation word or phrase.
pub fn is_affirmative(message: &str) -> bool {
    let words: Vec<String> = message
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();
    let padded = format!(" {} ", words.join(" "));
    AFFIRMATIVES
        .iter()
        .any(|phrase| padded.contains(&format!(" {phrase} ")))
}

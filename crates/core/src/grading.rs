//! Grading of synthesis answers.
//!
//! The evaluator asks the oracle for a structured verdict and parses it into an
//! [`Evaluation`]. Parsing never fails: unreadable fields fall back to fixed
//! defaults so a turn can always continue.

use crate::{
    oracle::{Oracle, OracleRequest},
    prompts::{Prompts, render},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Score that counts as a pass when the verdict line is unreadable.
pub const PASS_SCORE: u8 = 60;
/// Score assumed when the SCORE line is missing or has no digits.
pub const FALLBACK_SCORE: u8 = 50;
pub const FALLBACK_FEEDBACK: &str =
    "I couldn't fully assess that answer, so let's look at it together.";

const GRADING_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub passed: bool,
    pub score: u8,
    pub feedback: String,
    pub missing: Vec<String>,
    pub insight: String,
}

/// Parses the `SCORE/VERDICT/FEEDBACK/MISSING/INSIGHT` block.
pub fn parse_evaluation(response: &str) -> Evaluation {
    let mut score = None;
    let mut verdict = None;
    let mut feedback = None;
    let mut missing = Vec::new();
    let mut insight = String::new();

    for line in response.lines().map(str::trim) {
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match label.trim().to_uppercase().as_str() {
            "SCORE" => score = parse_score(value),
            "VERDICT" => verdict = parse_verdict(value),
            "FEEDBACK" if !value.is_empty() => feedback = Some(value.to_string()),
            "MISSING" if !is_none(value) => {
                missing = value
                    .split(',')
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            "INSIGHT" if !is_none(value) => insight = value.to_string(),
            _ => {}
        }
    }

    let score = score.unwrap_or(FALLBACK_SCORE);
    Evaluation {
        passed: verdict.unwrap_or(score >= PASS_SCORE),
        score,
        feedback: feedback.unwrap_or_else(|| FALLBACK_FEEDBACK.to_string()),
        missing,
        insight,
    }
}

/// First run of up to three digits, clamped to 100.
fn parse_score(value: &str) -> Option<u8> {
    let digits: String = value
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .take(3)
        .collect();
    digits.parse::<u16>().ok().map(|n| n.min(100) as u8)
}

/// Reads the first word of the verdict, so `FAIL (did not pass)` stays a fail.
fn parse_verdict(value: &str) -> Option<bool> {
    let word = value
        .split(|c: char| !c.is_alphanumeric())
        .find(|word| !word.is_empty())?;
    if word.eq_ignore_ascii_case("PASS") || word.eq_ignore_ascii_case("PASSED") {
        Some(true)
    } else if word.eq_ignore_ascii_case("FAIL") || word.eq_ignore_ascii_case("FAILED") {
        Some(false)
    } else {
        None
    }
}

fn is_none(value: &str) -> bool {
    value.is_empty() || value.trim_matches(|c: char| !c.is_alphanumeric()).eq_ignore_ascii_case("none")
}

/// Oracle-backed grading, hints and remedial explanations.
pub struct AnswerEvaluator {
    oracle: Arc<dyn Oracle>,
    prompts: Arc<Prompts>,
}

impl AnswerEvaluator {
    pub fn new(oracle: Arc<dyn Oracle>, prompts: Arc<Prompts>) -> Self {
        Self { oracle, prompts }
    }

    pub async fn evaluate(&self, question: &str, answer: &str, prerequisites: &[String]) -> Evaluation {
        let prerequisites = prerequisites.join(", ");
        let prompt = render(
            &self.prompts.evaluate,
            &[
                ("question", question),
                ("answer", answer),
                ("prerequisites", &prerequisites),
            ],
        );
        let response = self
            .oracle
            .generate(OracleRequest::new(prompt).with_temperature(GRADING_TEMPERATURE))
            .await;
        parse_evaluation(&response)
    }

    /// A nudge toward the connections the learner missed.
    pub async fn hint(&self, missing: &[String], prerequisites: &[String]) -> String {
        let prompt = render(
            &self.prompts.hint,
            &[
                ("missing", &missing.join(", ")),
                ("prerequisites", &prerequisites.join(", ")),
            ],
        );
        self.oracle.generate(OracleRequest::new(prompt)).await
    }

    /// Short explanation of the missed connections, used when the learner runs
    /// out of attempts.
    pub async fn remedial(&self, concept: &str, missing: &[String], prerequisites: &[String]) -> String {
        let prompt = render(
            &self.prompts.remedial,
            &[
                ("concept", concept),
                ("missing", &missing.join(", ")),
                ("prerequisites", &prerequisites.join(", ")),
            ],
        );
        self.oracle.generate(OracleRequest::new(prompt)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::MockOracle;

    #[test]
    fn parses_complete_block() {
        let evaluation = parse_evaluation(
            "SCORE: 82\nVERDICT: PASS\nFEEDBACK: Good link between light and sugar.\nMISSING: water transport, stomata\nINSIGHT: Light powers sugar production",
        );
        assert_eq!(
            evaluation,
            Evaluation {
                passed: true,
                score: 82,
                feedback: "Good link between light and sugar.".into(),
                missing: vec!["water transport".into(), "stomata".into()],
                insight: "Light powers sugar production".into(),
            }
        );
    }

    #[test]
    fn high_score_without_verdict_passes() {
        let evaluation = parse_evaluation("SCORE: 75\nFEEDBACK: Nice.");
        assert!(evaluation.passed);
        assert_eq!(evaluation.score, 75);
    }

    #[test]
    fn explicit_fail_verdict_wins_over_score() {
        let evaluation = parse_evaluation("SCORE: 70\nVERDICT: FAIL");
        assert!(!evaluation.passed);
    }

    #[test]
    fn verdict_is_read_from_its_first_word() {
        assert!(!parse_evaluation("SCORE: 90\nVERDICT: FAIL (did not pass)").passed);
        assert!(parse_evaluation("SCORE: 10\nVERDICT: **Pass**, nearly a fail").passed);
    }

    #[test]
    fn unreadable_verdict_with_low_score_fails() {
        let evaluation = parse_evaluation("SCORE: 40/100\nVERDICT: maybe");
        assert!(!evaluation.passed);
        assert_eq!(evaluation.score, 40);
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        let evaluation = parse_evaluation("Error: connection reset");
        assert_eq!(evaluation.score, FALLBACK_SCORE);
        assert!(!evaluation.passed);
        assert_eq!(evaluation.feedback, FALLBACK_FEEDBACK);
        assert!(evaluation.missing.is_empty());
        assert!(evaluation.insight.is_empty());
    }

    #[test]
    fn score_is_clamped_and_none_values_are_empty() {
        let evaluation = parse_evaluation("score: 9999\nverdict: pass\nmissing: None\ninsight: \"none\"");
        assert_eq!(evaluation.score, 100);
        assert!(evaluation.passed);
        assert!(evaluation.missing.is_empty());
        assert!(evaluation.insight.is_empty());
    }

    #[test]
    fn score_without_digits_uses_fallback() {
        assert_eq!(parse_evaluation("SCORE: high").score, FALLBACK_SCORE);
    }

    #[tokio::test]
    async fn evaluate_sends_question_answer_and_prerequisites() {
        let mut oracle = MockOracle::new();
        oracle
            .expect_generate()
            .withf(|request| {
                request.prompt.contains("Why do leaves turn?")
                    && request.prompt.contains("Because of light")
                    && request.prompt.contains("Light, Chlorophyll")
                    && request.temperature == GRADING_TEMPERATURE
            })
            .returning(|_| "SCORE: 90\nVERDICT: PASS\nFEEDBACK: Great.".to_string());

        let evaluator = AnswerEvaluator::new(Arc::new(oracle), Arc::new(Prompts::default()));
        let evaluation = evaluator
            .evaluate(
                "Why do leaves turn?",
                "Because of light",
                &["Light".to_string(), "Chlorophyll".to_string()],
            )
            .await;
        assert!(evaluation.passed);
        assert_eq!(evaluation.feedback, "Great.");
    }

    #[tokio::test]
    async fn evaluate_forwards_braces_in_answer_verbatim() {
        let mut oracle = MockOracle::new();
        oracle
            .expect_generate()
            .withf(|request| {
                request.prompt.contains("my set is {prerequisites} here")
                    && !request.prompt.contains("my set is Light, Water here")
            })
            .returning(|_| "SCORE: 50\nVERDICT: FAIL".to_string());

        let evaluator = AnswerEvaluator::new(Arc::new(oracle), Arc::new(Prompts::default()));
        let evaluation = evaluator
            .evaluate(
                "Q?",
                "my set is {prerequisites} here",
                &["Light".to_string(), "Water".to_string()],
            )
            .await;
        assert!(!evaluation.passed);
    }

    #[tokio::test]
    async fn hint_mentions_missing_connections() {
        let mut oracle = MockOracle::new();
        oracle
            .expect_generate()
            .withf(|request| request.prompt.contains("missed these connections: stomata"))
            .returning(|_| "What lets gas in?".to_string());

        let evaluator = AnswerEvaluator::new(Arc::new(oracle), Arc::new(Prompts::default()));
        let hint = evaluator
            .hint(&["stomata".to_string()], &["Leaves".to_string()])
            .await;
        assert_eq!(hint, "What lets gas in?");
    }
}

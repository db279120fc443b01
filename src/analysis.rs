//! Concurrent aspect analysis with partial-failure aggregation.
//!
//! [`AnalysisOrchestrator::analyze`] launches one task per configured aspect
//! on a [`JoinSet`]. Each unit builds its prompt, calls the text generator
//! through the shared [`RetryPolicy`], and interprets the response with the
//! strict verdict grammar. Units are independent:
//!
//! - a unit that exceeds `analysis.aspect_timeout_secs` is recorded as failed;
//! - generation errors are retried only when transient;
//! - parse errors are never retried and become the aspect's error;
//! - a panicking unit is recorded as failed without touching its siblings.
//!
//! The resulting [`AnalysisAggregate`] lists aspects in configuration order,
//! regardless of which unit finished first.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;

use crate::config::{AnalysisConfig, Config};
use crate::generation::TextGenerator;
use crate::models::{
    AnalysisAggregate, Aspect, AspectOutcome, AssessmentResult, BiasAssessment, BiasLevel,
    ExtractionResult, Probability, Verdict,
};
use crate::prompts::{self, BIASED_LABEL, SCAM_LABEL, SUBJECTIVE_LABEL, SUMMARY_LABEL};
use crate::retry::RetryPolicy;
use crate::verdict::{self, VerdictError};

/// Why a generated response could not be turned into an outcome.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AspectError {
    #[error(transparent)]
    Verdict(#[from] VerdictError),
    #[error("model declined the task: {0}")]
    Declined(String),
    #[error("response has no explanation after the verdict block")]
    EmptyNotes,
}

pub struct AnalysisOrchestrator {
    generator: Arc<dyn TextGenerator>,
    policy: RetryPolicy,
    settings: Arc<AnalysisConfig>,
}

impl AnalysisOrchestrator {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        policy: RetryPolicy,
        settings: AnalysisConfig,
    ) -> Self {
        Self {
            generator,
            policy,
            settings: Arc::new(settings),
        }
    }

    /// Orchestrator whose retry policy comes from `[generation]`.
    pub fn from_config(generator: Arc<dyn TextGenerator>, config: &Config) -> Self {
        let policy = RetryPolicy::new(
            config.generation.max_attempts,
            Duration::from_secs(config.generation.timeout_secs),
        );
        Self::new(generator, policy, config.analysis.clone())
    }

    pub async fn analyze(&self, extraction: Arc<ExtractionResult>) -> AnalysisAggregate {
        let aspects = self.settings.aspects.clone();
        let budget = Duration::from_secs(self.settings.aspect_timeout_secs);
        let mut set = JoinSet::new();

        for (idx, aspect) in aspects.iter().copied().enumerate() {
            let generator = Arc::clone(&self.generator);
            let settings = Arc::clone(&self.settings);
            let extraction = Arc::clone(&extraction);
            let policy = self.policy;

            set.spawn(async move {
                let started = Instant::now();
                let result = match tokio::time::timeout(
                    budget,
                    run_aspect(generator.as_ref(), &policy, &settings, aspect, &extraction),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => AssessmentResult::failed(format!(
                        "{} analysis timed out after {}s",
                        aspect,
                        budget.as_secs()
                    )),
                };

                let elapsed_ms = started.elapsed().as_millis() as u64;
                match result.error() {
                    None => tracing::info!(%aspect, elapsed_ms, "aspect completed"),
                    Some(err) => tracing::warn!(%aspect, elapsed_ms, error = %err, "aspect failed"),
                }
                (idx, result)
            });
        }

        let mut slots: Vec<Option<AssessmentResult>> = aspects.iter().map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, result)) => slots[idx] = Some(result),
                Err(e) => tracing::error!(error = %e, "aspect task aborted"),
            }
        }

        let results = aspects
            .into_iter()
            .zip(slots)
            .map(|(aspect, slot)| {
                let result = slot.unwrap_or_else(|| {
                    AssessmentResult::failed(format!("{} analysis task aborted", aspect))
                });
                (aspect, result)
            })
            .collect();

        AnalysisAggregate {
            extraction,
            results,
        }
    }
}

async fn run_aspect(
    generator: &dyn TextGenerator,
    policy: &RetryPolicy,
    settings: &AnalysisConfig,
    aspect: Aspect,
    extraction: &ExtractionResult,
) -> AssessmentResult {
    let prompt = prompts::build(
        aspect,
        &extraction.content,
        settings.max_prompt_chars,
        settings.summary_sentences,
    );
    let prompt = &prompt;

    let response = policy
        .run(aspect.as_str(), move |_| generator.generate(prompt))
        .await;

    match response {
        Err(e) => AssessmentResult::failed(format!("generation failed: {}", e)),
        Ok(text) => match interpret(aspect, &text, settings) {
            Ok(outcome) => AssessmentResult::Completed { outcome },
            Err(e) => AssessmentResult::failed(format!("unparseable response: {}", e)),
        },
    }
}

/// Turn one raw generated response into the aspect's outcome.
pub fn interpret(
    aspect: Aspect,
    text: &str,
    settings: &AnalysisConfig,
) -> Result<AspectOutcome, AspectError> {
    let parsed = verdict::parse(text, &prompts::schema_for(aspect))?;

    match aspect {
        Aspect::Summary => {
            let summary = parsed.notes.trim();
            if parsed.flag(SUMMARY_LABEL) == Some(false) {
                return Err(AspectError::Declined(summary.to_string()));
            }
            if summary.is_empty() {
                return Err(AspectError::EmptyNotes);
            }
            Ok(AspectOutcome::Summary {
                text: summary.to_string(),
            })
        }
        Aspect::Scam | Aspect::Subjectivity => {
            let label = if aspect == Aspect::Scam {
                SCAM_LABEL
            } else {
                SUBJECTIVE_LABEL
            };
            let flagged = parsed.flag(label).unwrap_or_default();
            let (confidence, notes) = split_confidence(&parsed.notes);
            let confidence = confidence.unwrap_or(settings.verdict_confidence);
            Ok(AspectOutcome::Verdict(Verdict {
                flagged,
                probability: Probability::from_verdict(flagged, confidence),
                notes: notes.trim().to_string(),
            }))
        }
        Aspect::Bias => {
            let biased = parsed.flag(BIASED_LABEL).unwrap_or_default();
            let (bias_scores, notes) = split_scores(&parsed.notes);
            let biases_above_cutoff = above_cutoff(&bias_scores, settings.bias_cutoff);
            let level = bias_level(biases_above_cutoff.len(), settings.high_bias_count);
            Ok(AspectOutcome::Bias(BiasAssessment {
                biased,
                bias_scores,
                bias_cutoff: settings.bias_cutoff,
                biases_above_cutoff,
                level,
                notes: notes.trim().to_string(),
            }))
        }
    }
}

/// Labels whose score meets or exceeds `cutoff`, in label order.
pub fn above_cutoff(scores: &BTreeMap<String, f64>, cutoff: f64) -> Vec<String> {
    scores
        .iter()
        .filter(|(_, score)| **score >= cutoff)
        .map(|(label, _)| label.clone())
        .collect()
}

pub fn bias_level(count_above: usize, high_bias_count: usize) -> BiasLevel {
    if count_above == 0 {
        BiasLevel::None
    } else if count_above >= high_bias_count {
        BiasLevel::High
    } else {
        BiasLevel::Low
    }
}

/// Strip an optional leading `CONFIDENCE: <x>` line. Confidence is in the
/// declared answer, so it is clamped to `[0.5, 1.0]`.
fn split_confidence(notes: &str) -> (Option<f64>, &str) {
    let (line, rest) = first_line(notes);
    let value = line
        .trim()
        .strip_prefix("CONFIDENCE:")
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite());
    match value {
        Some(v) => (Some(v.clamp(0.5, 1.0)), rest),
        None => (None, notes),
    }
}

/// Consume leading `SCORE <label>: <number>` lines.
fn split_scores(notes: &str) -> (BTreeMap<String, f64>, &str) {
    let mut scores = BTreeMap::new();
    let mut rest = notes;
    while !rest.is_empty() {
        let (line, remainder) = first_line(rest);
        match parse_score_line(line) {
            Some((label, score)) => {
                scores.insert(label, score);
                rest = remainder;
            }
            None => break,
        }
    }
    (scores, rest)
}

fn parse_score_line(line: &str) -> Option<(String, f64)> {
    let body = line.trim().strip_prefix("SCORE ")?;
    let (label, value) = body.rsplit_once(':')?;
    let label = label
        .trim()
        .to_ascii_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");
    if label.is_empty() {
        return None;
    }
    let score = value.trim().parse::<f64>().ok().filter(|v| v.is_finite())?;
    Some((label, score.clamp(0.0, 1.0)))
}

fn first_line(s: &str) -> (&str, &str) {
    match s.find('\n') {
        Some(i) => (&s[..i], &s[i + 1..]),
        None => (s, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> AnalysisConfig {
        AnalysisConfig::default()
    }

    #[test]
    fn bias_cutoff_is_inclusive_and_exact() {
        let mut scores = BTreeMap::new();
        scores.insert("political_left".to_string(), 0.9);
        scores.insert("emotional_appeal".to_string(), 0.3);
        assert_eq!(above_cutoff(&scores, 0.5), vec!["political_left".to_string()]);

        scores.insert("corporate".to_string(), 0.5);
        assert_eq!(
            above_cutoff(&scores, 0.5),
            vec!["corporate".to_string(), "political_left".to_string()]
        );
    }

    #[test]
    fn bias_response_is_interpreted() {
        let text = "BIASED: YES\nSCORE political_left: 0.9\nSCORE emotional_appeal: 0.3\nThe piece leans left.";
        let outcome = interpret(Aspect::Bias, text, &settings()).unwrap();
        let AspectOutcome::Bias(bias) = outcome else {
            panic!("expected bias outcome");
        };
        assert!(bias.biased);
        assert_eq!(bias.biases_above_cutoff, vec!["political_left".to_string()]);
        assert_eq!(bias.level, BiasLevel::Low);
        assert_eq!(bias.notes, "The piece leans left.");
        assert_eq!(bias.bias_scores.len(), 2);
    }

    #[test]
    fn two_biases_make_level_high() {
        assert_eq!(bias_level(0, 2), BiasLevel::None);
        assert_eq!(bias_level(1, 2), BiasLevel::Low);
        assert_eq!(bias_level(2, 2), BiasLevel::High);
        assert_eq!(bias_level(1, 1), BiasLevel::High);
    }

    #[test]
    fn scam_verdict_uses_declared_confidence() {
        let text = "SCAM: YES\nCONFIDENCE: 0.95\nIt asks for a wire transfer.";
        let AspectOutcome::Verdict(v) = interpret(Aspect::Scam, text, &settings()).unwrap() else {
            panic!("expected verdict");
        };
        assert!(v.flagged);
        assert!((v.probability.positive - 0.95).abs() < 1e-9);
        assert!((v.probability.positive + v.probability.negative - 1.0).abs() < 1e-9);
        assert_eq!(v.notes, "It asks for a wire transfer.");
    }

    #[test]
    fn verdict_without_confidence_uses_default() {
        let text = "SUBJECTIVE: NO\nMostly reported facts.";
        let AspectOutcome::Verdict(v) =
            interpret(Aspect::Subjectivity, text, &settings()).unwrap()
        else {
            panic!("expected verdict");
        };
        assert!(!v.flagged);
        assert!((v.probability.positive - 0.15).abs() < 1e-9);
        assert_eq!(v.notes, "Mostly reported facts.");
    }

    #[test]
    fn summary_declined_is_an_error() {
        let err = interpret(Aspect::Summary, "SUMMARY_OK: NO\nToo short.", &settings()).unwrap_err();
        assert_eq!(err, AspectError::Declined("Too short.".to_string()));
    }

    #[test]
    fn missing_block_is_an_error() {
        let err = interpret(Aspect::Scam, "Probably fine.", &settings()).unwrap_err();
        assert_eq!(err, AspectError::Verdict(VerdictError::EmptyBlock));
    }

    #[test]
    fn score_labels_are_normalized() {
        let (scores, rest) = split_scores("SCORE Loaded Language: 1.4\nnext");
        assert_eq!(scores.get("loaded_language"), Some(&1.0));
        assert_eq!(rest, "next");
    }
}

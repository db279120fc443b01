//! Core data models used throughout Clearview.
//!
//! These types represent the extracted document, the per-aspect assessment
//! results, and the binary artifacts that flow through the analysis and
//! synthesis pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// How the raw input was interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Url,
    File,
    Text,
}

impl InputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputType::Url => "url",
            InputType::File => "file",
            InputType::Text => "text",
        }
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized extraction output for a single request.
///
/// Constructed only through [`ExtractionResult::success`] and
/// [`ExtractionResult::failure`], so `word_count` always matches `content`
/// and `content` is empty exactly when `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResult {
    pub title: String,
    pub content: String,
    pub input_type: InputType,
    pub source: String,
    pub word_count: usize,
    pub extraction_method: String,
    pub error: Option<String>,
}

impl ExtractionResult {
    /// Build a successful result. Falls back to a failure if `content` is blank.
    pub fn success(
        title: impl Into<String>,
        content: impl Into<String>,
        input_type: InputType,
        source: impl Into<String>,
        extraction_method: impl Into<String>,
    ) -> Self {
        let content = content.into();
        let source = source.into();
        let extraction_method = extraction_method.into();
        if content.trim().is_empty() {
            return Self::failure(
                input_type,
                source,
                extraction_method,
                "No readable text could be extracted.",
            );
        }
        Self {
            title: title.into(),
            word_count: count_words(&content),
            content,
            input_type,
            source,
            extraction_method,
            error: None,
        }
    }

    pub fn failure(
        input_type: InputType,
        source: impl Into<String>,
        extraction_method: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            title: String::new(),
            content: String::new(),
            input_type,
            source: source.into(),
            word_count: 0,
            extraction_method: extraction_method.into(),
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Whitespace-delimited word count.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// One independent assessment dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aspect {
    Summary,
    Scam,
    Subjectivity,
    Bias,
}

impl Aspect {
    pub const ALL: [Aspect; 4] = [
        Aspect::Summary,
        Aspect::Scam,
        Aspect::Subjectivity,
        Aspect::Bias,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Aspect::Summary => "summary",
            Aspect::Scam => "scam",
            Aspect::Subjectivity => "subjectivity",
            Aspect::Bias => "bias",
        }
    }

    /// Heading used in rendered reports.
    pub fn display_name(&self) -> &'static str {
        match self {
            Aspect::Summary => "Summary",
            Aspect::Scam => "Scam Analysis",
            Aspect::Subjectivity => "Objectivity",
            Aspect::Bias => "Bias",
        }
    }
}

impl fmt::Display for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Aspect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "summary" => Ok(Aspect::Summary),
            "scam" => Ok(Aspect::Scam),
            "subjectivity" | "objectivity" => Ok(Aspect::Subjectivity),
            "bias" => Ok(Aspect::Bias),
            other => Err(format!("unknown aspect: '{}'", other)),
        }
    }
}

/// Complementary probability pair. `positive + negative == 1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Probability {
    pub positive: f64,
    pub negative: f64,
}

impl Probability {
    /// Build a pair from the positive side, clamped into `[0, 1]`.
    pub fn from_positive(p: f64) -> Self {
        let positive = if p.is_finite() { p.clamp(0.0, 1.0) } else { 0.5 };
        Self {
            positive,
            negative: 1.0 - positive,
        }
    }

    /// Pair implied by a boolean verdict held with the given confidence.
    pub fn from_verdict(flagged: bool, confidence: f64) -> Self {
        if flagged {
            Self::from_positive(confidence)
        } else {
            Self::from_positive(1.0 - confidence)
        }
    }
}

/// Boolean classification with its probability pair and explanation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub flagged: bool,
    pub probability: Probability,
    pub notes: String,
}

/// Overall bias level derived from how many categories crossed the cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BiasLevel {
    None,
    Low,
    High,
}

impl BiasLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            BiasLevel::None => "none",
            BiasLevel::Low => "low",
            BiasLevel::High => "high",
        }
    }
}

/// Bias aspect payload: per-category confidence plus the categories at or above the cutoff.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BiasAssessment {
    pub biased: bool,
    pub bias_scores: BTreeMap<String, f64>,
    pub bias_cutoff: f64,
    pub biases_above_cutoff: Vec<String>,
    pub level: BiasLevel,
    pub notes: String,
}

/// Successful payload for one aspect.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AspectOutcome {
    Summary { text: String },
    Verdict(Verdict),
    Bias(BiasAssessment),
}

/// Result of one aspect task. Exactly one of payload or error exists.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AssessmentResult {
    Completed { outcome: AspectOutcome },
    Failed { error: String },
}

impl AssessmentResult {
    pub fn failed(error: impl Into<String>) -> Self {
        AssessmentResult::Failed {
            error: error.into(),
        }
    }

    pub fn outcome(&self) -> Option<&AspectOutcome> {
        match self {
            AssessmentResult::Completed { outcome } => Some(outcome),
            AssessmentResult::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            AssessmentResult::Completed { .. } => None,
            AssessmentResult::Failed { error } => Some(error),
        }
    }
}

/// Per-request collection of aspect results. Never fails as a whole.
#[derive(Debug, Clone)]
pub struct AnalysisAggregate {
    pub extraction: Arc<ExtractionResult>,
    /// One entry per requested aspect, in configuration order.
    pub results: Vec<(Aspect, AssessmentResult)>,
}

impl AnalysisAggregate {
    pub fn get(&self, aspect: Aspect) -> Option<&AssessmentResult> {
        self.results
            .iter()
            .find(|(a, _)| *a == aspect)
            .map(|(_, r)| r)
    }

    pub fn summary_text(&self) -> Option<&str> {
        match self.get(Aspect::Summary)?.outcome()? {
            AspectOutcome::Summary { text } => Some(text),
            _ => None,
        }
    }

    pub fn failed_aspects(&self) -> Vec<Aspect> {
        self.results
            .iter()
            .filter(|(_, r)| r.error().is_some())
            .map(|(a, _)| *a)
            .collect()
    }
}

/// Artifact kind, also the record namespace in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Report,
    Audio,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Report => "report",
            ArtifactKind::Audio => "audio",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ArtifactKind::Report => "application/pdf",
            ArtifactKind::Audio => "audio/mpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Report => "pdf",
            ArtifactKind::Audio => "mp3",
        }
    }
}

impl std::str::FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "report" | "clearview" | "pdf" => Ok(ArtifactKind::Report),
            "audio" | "mp3" => Ok(ArtifactKind::Audio),
            other => Err(format!("unknown artifact kind: '{}'", other)),
        }
    }
}

/// A produced binary artifact (report or audio) before persistence.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub title: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    /// Which collaborator produced it (layout name or speech provider name).
    pub producer: String,
}

/// Persisted unit in the record store.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub kind: ArtifactKind,
    pub title: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    /// SHA-256 of `bytes`, hex encoded.
    pub digest: String,
    pub created_at: i64,
}

/// Suggested download filename derived from an artifact title.
pub fn suggested_filename(title: &str, kind: ArtifactKind) -> String {
    let mut slug = String::new();
    let mut last_dash = true;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
        if slug.len() >= 60 {
            break;
        }
    }
    let slug = slug.trim_matches('-');
    let stem = if slug.is_empty() { "clearview" } else { slug };
    format!("{}.{}", stem, kind.extension())
}

//! End-to-end request flows.
//!
//! A [`Pipeline`] owns shared handles to every collaborator and wires them
//! into the three request shapes the service offers:
//!
//! ```text
//! input ─▶ Extractor ─┬─▶ AnalysisOrchestrator ─▶ ReportComposer ─▶ RecordStore
//!                     └─▶ AudioSynthesizer ─────────────────────▶ RecordStore
//! ```
//!
//! Extraction failure ends the request with
//! [`PipelineError::InputUnprocessable`]. Aspect failures are data carried in
//! the outcome. Rendering and speech unavailability are hard failures.
//! Persistence failures are logged and reported in the outcome's `error`,
//! but the produced bytes are still returned.

use std::sync::Arc;

use crate::analysis::AnalysisOrchestrator;
use crate::config::Config;
use crate::extract::Extractor;
use crate::generation::OpenAiGenerator;
use crate::models::{Artifact, ArtifactKind, Aspect, AssessmentResult, ExtractionResult, Record};
use crate::report::{ComposeError, PdfLayout, ReportComposer};
use crate::speech::{AudioSynthesizer, ElevenLabsProvider, GoogleTtsProvider, SpeechError};
use crate::store::{RecordStore, SqliteRecordStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{0}")]
    InputUnprocessable(String),
    #[error("report rendering failed: {0}")]
    Rendering(#[from] ComposeError),
    #[error("{0}")]
    SpeechUnavailable(String),
    #[error("{0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<SpeechError> for PipelineError {
    fn from(e: SpeechError) -> Self {
        match e {
            SpeechError::EmptyText => PipelineError::InputUnprocessable(e.to_string()),
            other => PipelineError::SpeechUnavailable(other.to_string()),
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => PipelineError::NotFound(format!("record not found: {}", id)),
            StoreError::Backend(msg) => PipelineError::Internal(msg),
        }
    }
}

/// Result of the report flow.
#[derive(Debug, Clone)]
pub struct ReportOutcome {
    /// Store id, absent when persistence failed.
    pub id: Option<String>,
    pub extraction: Arc<ExtractionResult>,
    pub results: Vec<(Aspect, AssessmentResult)>,
    pub summary: Option<String>,
    pub pdf: Vec<u8>,
    pub error: Option<String>,
}

/// Result of the narration flow.
#[derive(Debug, Clone)]
pub struct AudioOutcome {
    pub id: Option<String>,
    pub extraction: Arc<ExtractionResult>,
    pub provider: String,
    pub audio: Vec<u8>,
    pub error: Option<String>,
}

/// Both flows over one extraction. Each side fails independently.
#[derive(Debug)]
pub struct FullOutcome {
    pub extraction: Arc<ExtractionResult>,
    pub report: Result<ReportOutcome, PipelineError>,
    pub audio: Result<AudioOutcome, PipelineError>,
}

pub struct Pipeline {
    extractor: Arc<Extractor>,
    analyzer: Arc<AnalysisOrchestrator>,
    composer: Arc<ReportComposer>,
    narrator: Arc<AudioSynthesizer>,
    store: Arc<dyn RecordStore>,
}

impl Pipeline {
    pub fn new(
        extractor: Arc<Extractor>,
        analyzer: Arc<AnalysisOrchestrator>,
        composer: Arc<ReportComposer>,
        narrator: Arc<AudioSynthesizer>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            extractor,
            analyzer,
            composer,
            narrator,
            store,
        }
    }

    /// Production wiring: HTTP scraper, OpenAI, ElevenLabs with Google TTS
    /// fallback, lopdf layout, SQLite records.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let extractor = Extractor::with_defaults(config.extraction.clone())?;
        let generator = OpenAiGenerator::new(&config.generation)?;
        let analyzer = AnalysisOrchestrator::from_config(Arc::new(generator), config);
        let composer = ReportComposer::new(Arc::new(PdfLayout::new()));
        let narrator = AudioSynthesizer::new(
            Arc::new(ElevenLabsProvider::new(&config.speech)?),
            Arc::new(GoogleTtsProvider::new(
                &config.speech,
                &config.extraction.user_agent,
            )?),
            &config.speech,
        );
        let store = SqliteRecordStore::open(&config.db.path).await?;

        Ok(Self::new(
            Arc::new(extractor),
            Arc::new(analyzer),
            Arc::new(composer),
            Arc::new(narrator),
            Arc::new(store),
        ))
    }

    pub async fn extract(&self, input: &str) -> Result<Arc<ExtractionResult>, PipelineError> {
        let extraction = self.extractor.extract(input).await;
        match &extraction.error {
            Some(err) => Err(PipelineError::InputUnprocessable(err.clone())),
            None => Ok(Arc::new(extraction)),
        }
    }

    #[tracing::instrument(skip_all, fields(input_len = input.len()))]
    pub async fn analyze_and_report(&self, input: &str) -> Result<ReportOutcome, PipelineError> {
        let extraction = self.extract(input).await?;
        self.report_from(extraction).await
    }

    #[tracing::instrument(skip_all, fields(input_len = input.len()))]
    pub async fn analyze_and_narrate(
        &self,
        input: &str,
        voice: Option<&str>,
    ) -> Result<AudioOutcome, PipelineError> {
        let extraction = self.extract(input).await?;
        self.narrate_from(extraction, voice).await
    }

    /// Report and audio for the same input, produced concurrently.
    #[tracing::instrument(skip_all, fields(input_len = input.len()))]
    pub async fn analyze_full(
        &self,
        input: &str,
        voice: Option<&str>,
    ) -> Result<FullOutcome, PipelineError> {
        let extraction = self.extract(input).await?;
        let (report, audio) = tokio::join!(
            self.report_from(Arc::clone(&extraction)),
            self.narrate_from(Arc::clone(&extraction), voice),
        );
        Ok(FullOutcome {
            extraction,
            report,
            audio,
        })
    }

    /// Look up a stored record. A record of the other kind counts as missing.
    pub async fn fetch(&self, kind: ArtifactKind, id: &str) -> Result<Record, PipelineError> {
        let record = self.store.get(id).await?;
        if record.kind != kind {
            return Err(PipelineError::NotFound(format!(
                "{} not found: {}",
                kind.as_str(),
                id
            )));
        }
        Ok(record)
    }

    async fn report_from(
        &self,
        extraction: Arc<ExtractionResult>,
    ) -> Result<ReportOutcome, PipelineError> {
        let aggregate = self.analyzer.analyze(Arc::clone(&extraction)).await;
        let failed = aggregate.failed_aspects();
        if !failed.is_empty() {
            tracing::warn!(failed = ?failed, "report produced with omitted aspects");
        }

        let artifact = self.composer.compose(&extraction, &aggregate)?;
        let (id, error) = self.persist(&artifact).await;

        Ok(ReportOutcome {
            id,
            summary: aggregate.summary_text().map(str::to_string),
            results: aggregate.results,
            extraction,
            pdf: artifact.bytes,
            error,
        })
    }

    async fn narrate_from(
        &self,
        extraction: Arc<ExtractionResult>,
        voice: Option<&str>,
    ) -> Result<AudioOutcome, PipelineError> {
        let artifact = self
            .narrator
            .synthesize(&extraction.title, &extraction.content, voice)
            .await?;
        let (id, error) = self.persist(&artifact).await;

        Ok(AudioOutcome {
            id,
            extraction,
            provider: artifact.producer,
            audio: artifact.bytes,
            error,
        })
    }

    async fn persist(&self, artifact: &Artifact) -> (Option<String>, Option<String>) {
        match self
            .store
            .put(artifact.kind, &artifact.title, &artifact.bytes)
            .await
        {
            Ok(id) => {
                tracing::info!(%id, kind = artifact.kind.as_str(), "artifact stored");
                (Some(id), None)
            }
            Err(e) => {
                tracing::error!(kind = artifact.kind.as_str(), error = %e, "failed to store artifact");
                (None, Some(format!("{} was produced but could not be saved: {}", artifact.kind.as_str(), e)))
            }
        }
    }
}

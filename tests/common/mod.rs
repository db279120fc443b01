//! Fake collaborators shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clearview::analysis::AnalysisOrchestrator;
use clearview::config::Config;
use clearview::extract::{ExtractError, Extractor, FetchedText, FileReader, Scraper};
use clearview::generation::{GenerationError, Prompt, TextGenerator};
use clearview::models::{ArtifactKind, Aspect, Record};
use clearview::pipeline::Pipeline;
use clearview::report::{ComposeError, LayoutRenderer, PdfLayout, ReportComposer, ReportDocument};
use clearview::retry::RetryPolicy;
use clearview::speech::{AudioSynthesizer, SpeechError, SpeechProvider};
use clearview::store::{InMemoryRecordStore, RecordStore, StoreError};

pub const ARTICLE: &str = "Local council approves new park.\n\n\
The budget is modest and residents say they are pleased with the plan.";

pub struct FixedScraper {
    pub body: String,
}

#[async_trait]
impl Scraper for FixedScraper {
    async fn scrape(&self, _url: &str) -> Result<FetchedText, ExtractError> {
        Ok(FetchedText {
            title: String::new(),
            body: self.body.clone(),
            method: "html".to_string(),
        })
    }
}

pub struct NoFiles;

#[async_trait]
impl FileReader for NoFiles {
    async fn read(&self, path: &Path) -> Result<FetchedText, ExtractError> {
        Err(ExtractError::Io(format!("{} is not available", path.display())))
    }
}

/// Answers each aspect prompt with a canned, well-formed response.
/// Aspects listed in `stall` never answer, those in `malformed` answer
/// without a verdict block, and those in `flaky` get a 503 on their first
/// call.
#[derive(Default)]
pub struct ScriptedGenerator {
    pub stall: Vec<Aspect>,
    pub malformed: Vec<Aspect>,
    pub flaky: Vec<Aspect>,
    pub calls: AtomicUsize,
    per_aspect: Mutex<HashMap<Aspect, usize>>,
}

impl ScriptedGenerator {
    pub fn stalling(stall: Vec<Aspect>) -> Self {
        Self {
            stall,
            ..Self::default()
        }
    }

    pub fn malformed(malformed: Vec<Aspect>) -> Self {
        Self {
            malformed,
            ..Self::default()
        }
    }

    pub fn flaky(flaky: Vec<Aspect>) -> Self {
        Self {
            flaky,
            ..Self::default()
        }
    }

    pub fn calls_for(&self, aspect: Aspect) -> usize {
        self.per_aspect
            .lock()
            .unwrap()
            .get(&aspect)
            .copied()
            .unwrap_or(0)
    }
}

fn aspect_of(prompt: &Prompt) -> Aspect {
    if prompt.user.contains("SUMMARY_OK: YES") {
        Aspect::Summary
    } else if prompt.user.contains("SCAM: YES") {
        Aspect::Scam
    } else if prompt.user.contains("SUBJECTIVE: YES") {
        Aspect::Subjectivity
    } else {
        Aspect::Bias
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let aspect = aspect_of(prompt);
        let nth = {
            let mut counts = self.per_aspect.lock().unwrap();
            let n = counts.entry(aspect).or_insert(0);
            *n += 1;
            *n
        };
        if self.stall.contains(&aspect) {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        if self.flaky.contains(&aspect) && nth == 1 {
            return Err(GenerationError::Unavailable {
                status: 503,
                message: "overloaded".to_string(),
            });
        }
        if self.malformed.contains(&aspect) {
            return Ok("I think this article is probably fine.".to_string());
        }
        Ok(match aspect {
            Aspect::Summary => "SUMMARY_OK: YES\nThe council approved a modest park budget.",
            Aspect::Scam => "SCAM: NO\nCONFIDENCE: 0.9\nNothing here asks for money or data.",
            Aspect::Subjectivity => "SUBJECTIVE: NO\nThe piece reports decisions and quotes.",
            Aspect::Bias => {
                "BIASED: YES\nSCORE political_left: 0.9\nSCORE emotional_appeal: 0.3\nThe framing leans left."
            }
        }
        .to_string())
    }
}

/// Speech provider that records requested voices.
pub struct FakeSpeech {
    pub name: &'static str,
    pub result: Result<Vec<u8>, SpeechError>,
    pub voices: Mutex<Vec<String>>,
}

impl FakeSpeech {
    pub fn ok(name: &'static str, bytes: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            name,
            result: Ok(bytes.to_vec()),
            voices: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            result: Err(SpeechError::Rejected {
                status: 401,
                message: "bad key".to_string(),
            }),
            voices: Mutex::new(Vec::new()),
        })
    }

    pub fn voices(&self) -> Vec<String> {
        self.voices.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechProvider for FakeSpeech {
    fn name(&self) -> &str {
        self.name
    }

    async fn synthesize(&self, _text: &str, voice: &str) -> Result<Vec<u8>, SpeechError> {
        self.voices.lock().unwrap().push(voice.to_string());
        self.result.clone()
    }
}

/// Store whose writes always fail.
pub struct BrokenStore;

#[async_trait]
impl RecordStore for BrokenStore {
    async fn put(&self, _kind: ArtifactKind, _title: &str, _bytes: &[u8]) -> Result<String, StoreError> {
        Err(StoreError::Backend("disk full".to_string()))
    }

    async fn get(&self, id: &str) -> Result<Record, StoreError> {
        Err(StoreError::NotFound(id.to_string()))
    }
}

/// Layout that always fails.
pub struct BrokenLayout;

impl LayoutRenderer for BrokenLayout {
    fn name(&self) -> &str {
        "broken"
    }

    fn render(&self, _doc: &ReportDocument) -> Result<Vec<u8>, ComposeError> {
        Err(ComposeError::Layout("font table missing".to_string()))
    }
}

pub struct Harness {
    pub generator: Arc<ScriptedGenerator>,
    pub layout: Arc<dyn LayoutRenderer>,
    pub primary: Arc<FakeSpeech>,
    pub fallback: Arc<FakeSpeech>,
    pub store: Arc<dyn RecordStore>,
    pub scraped_body: String,
}

impl Default for Harness {
    fn default() -> Self {
        Self {
            generator: Arc::new(ScriptedGenerator::default()),
            layout: Arc::new(PdfLayout::new()),
            primary: FakeSpeech::ok("primary", b"ID3primary"),
            fallback: FakeSpeech::ok("fallback", b"ID3fallback"),
            store: Arc::new(InMemoryRecordStore::new()),
            scraped_body: "Hello world".to_string(),
        }
    }
}

impl Harness {
    pub fn pipeline(&self) -> Pipeline {
        let mut config = Config::minimal();
        config.analysis.aspect_timeout_secs = 1;

        let extractor = Extractor::new(
            Arc::new(FixedScraper {
                body: self.scraped_body.clone(),
            }),
            Arc::new(NoFiles),
            config.extraction.clone(),
        );
        let analyzer = AnalysisOrchestrator::new(
            self.generator.clone(),
            RetryPolicy::new(2, Duration::from_secs(30)).with_base_delay(Duration::ZERO),
            config.analysis.clone(),
        );
        let narrator = AudioSynthesizer::new(
            self.primary.clone(),
            self.fallback.clone(),
            &config.speech,
        )
        .with_policy(RetryPolicy::new(2, Duration::from_secs(5)).with_base_delay(Duration::ZERO));

        Pipeline::new(
            Arc::new(extractor),
            Arc::new(analyzer),
            Arc::new(ReportComposer::new(self.layout.clone())),
            Arc::new(narrator),
            self.store.clone(),
        )
    }
}

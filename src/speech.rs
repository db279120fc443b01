//! Speech synthesis with provider fallback.
//!
//! [`AudioSynthesizer`] tries the primary [`SpeechProvider`] first (with the
//! caller's voice, or the primary default) and falls back to the secondary
//! provider when the primary fails. The fallback always speaks with its own
//! configured voice: a caller's voice id belongs to the primary provider's
//! voice catalogue and means nothing elsewhere.
//!
//! Each provider call goes through a [`RetryPolicy`] of at most two
//! attempts, retrying transient errors only. When both providers fail the
//! result is [`SpeechError::Unavailable`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::SpeechConfig;
use crate::models::{Artifact, ArtifactKind};
use crate::retry::{RetryPolicy, RetryableError};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SpeechError {
    #[error("speech request timed out after {0:?}")]
    Timeout(Duration),
    #[error("speech service busy or failing (HTTP {status}): {message}")]
    Upstream { status: u16, message: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("speech request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("speech provider not configured: {0}")]
    NotConfigured(String),
    #[error("speech provider returned no audio")]
    EmptyAudio,
    #[error("nothing to narrate")]
    EmptyText,
    #[error("speech synthesis unavailable (primary: {primary}; fallback: {fallback})")]
    Unavailable { primary: String, fallback: String },
}

impl RetryableError for SpeechError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            SpeechError::Timeout(_) | SpeechError::Upstream { .. } | SpeechError::Network(_)
        )
    }

    fn timed_out(after: Duration) -> Self {
        SpeechError::Timeout(after)
    }
}

/// Text and a voice in, MP3 bytes out.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, SpeechError>;
}

pub struct AudioSynthesizer {
    primary: Arc<dyn SpeechProvider>,
    fallback: Arc<dyn SpeechProvider>,
    policy: RetryPolicy,
    default_voice: String,
    fallback_voice: String,
    max_chars: usize,
}

impl AudioSynthesizer {
    pub fn new(
        primary: Arc<dyn SpeechProvider>,
        fallback: Arc<dyn SpeechProvider>,
        config: &SpeechConfig,
    ) -> Self {
        let policy = RetryPolicy::new(
            config.max_attempts.min(2),
            Duration::from_secs(config.timeout_secs),
        );
        Self {
            primary,
            fallback,
            policy,
            default_voice: config.default_voice.clone(),
            fallback_voice: config.fallback_voice.clone(),
            max_chars: config.max_chars,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = RetryPolicy {
            max_attempts: policy.max_attempts.min(2),
            ..policy
        };
        self
    }

    /// Narrate `text` as an audio artifact titled `title`.
    pub async fn synthesize(
        &self,
        title: &str,
        text: &str,
        voice: Option<&str>,
    ) -> Result<Artifact, SpeechError> {
        let text = truncate_chars(text.trim(), self.max_chars).trim_end();
        if text.is_empty() {
            return Err(SpeechError::EmptyText);
        }
        let voice = voice
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(self.default_voice.as_str());

        let primary = self.attempt(self.primary.as_ref(), text, voice).await;
        let primary_err = match primary {
            Ok(bytes) => return Ok(self.artifact(title, bytes, self.primary.name())),
            Err(e) => e,
        };
        tracing::warn!(
            provider = self.primary.name(),
            error = %primary_err,
            "primary speech provider failed, falling back"
        );

        match self
            .attempt(self.fallback.as_ref(), text, &self.fallback_voice)
            .await
        {
            Ok(bytes) => Ok(self.artifact(title, bytes, self.fallback.name())),
            Err(fallback_err) => {
                tracing::error!(
                    provider = self.fallback.name(),
                    error = %fallback_err,
                    "fallback speech provider failed"
                );
                Err(SpeechError::Unavailable {
                    primary: primary_err.to_string(),
                    fallback: fallback_err.to_string(),
                })
            }
        }
    }

    async fn attempt(
        &self,
        provider: &dyn SpeechProvider,
        text: &str,
        voice: &str,
    ) -> Result<Vec<u8>, SpeechError> {
        let bytes = self
            .policy
            .run(provider.name(), move |_| provider.synthesize(text, voice))
            .await?;
        if bytes.is_empty() {
            return Err(SpeechError::EmptyAudio);
        }
        Ok(bytes)
    }

    fn artifact(&self, title: &str, bytes: Vec<u8>, producer: &str) -> Artifact {
        tracing::info!(provider = producer, bytes = bytes.len(), "audio synthesized");
        Artifact {
            kind: ArtifactKind::Audio,
            title: title.to_string(),
            content_type: ArtifactKind::Audio.content_type().to_string(),
            bytes,
            producer: producer.to_string(),
        }
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn classify_status(status: reqwest::StatusCode, message: String) -> SpeechError {
    if status.as_u16() == 429 || status.is_server_error() {
        SpeechError::Upstream {
            status: status.as_u16(),
            message,
        }
    } else {
        SpeechError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

fn network_error(e: reqwest::Error, timeout: Duration) -> SpeechError {
    if e.is_timeout() {
        SpeechError::Timeout(timeout)
    } else {
        SpeechError::Network(e.to_string())
    }
}

// ============ ElevenLabs ============

/// ElevenLabs text-to-speech. Needs `ELEVENLABS_API_KEY`.
pub struct ElevenLabsProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl ElevenLabsProvider {
    pub const OUTPUT_FORMAT: &'static str = "mp3_44100_128";

    pub fn new(config: &SpeechConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var("ELEVENLABS_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            tracing::warn!("ELEVENLABS_API_KEY not set; narration will use the fallback provider");
        }
        let timeout = Duration::from_secs(config.timeout_secs);
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            api_key,
            base_url: config.primary_base_url.trim_end_matches('/').to_string(),
            model: config.primary_model.clone(),
            timeout,
        })
    }
}

#[async_trait]
impl SpeechProvider for ElevenLabsProvider {
    fn name(&self) -> &str {
        "elevenlabs"
    }

    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, SpeechError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| SpeechError::NotConfigured("ELEVENLABS_API_KEY not set".to_string()))?;

        let url = format!("{}/text-to-speech/{}", self.base_url, voice);
        let resp = self
            .client
            .post(url)
            .query(&[("output_format", Self::OUTPUT_FORMAT)])
            .header("xi-api-key", api_key)
            .header("Accept", "audio/mpeg")
            .json(&serde_json::json!({
                "text": text,
                "model_id": self.model,
            }))
            .send()
            .await
            .map_err(|e| network_error(e, self.timeout))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, message));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| network_error(e, self.timeout))?;
        Ok(bytes.to_vec())
    }
}

// ============ Google Translate TTS ============

/// Keyless Google Translate speech endpoint. The voice is a language code.
pub struct GoogleTtsProvider {
    client: reqwest::Client,
    base_url: String,
    user_agent: String,
    timeout: Duration,
}

impl GoogleTtsProvider {
    /// Longest text the endpoint accepts per request.
    pub const MAX_CHUNK_CHARS: usize = 200;

    pub fn new(config: &SpeechConfig, user_agent: &str) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: config.fallback_base_url.clone(),
            user_agent: user_agent.to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl SpeechProvider for GoogleTtsProvider {
    fn name(&self) -> &str {
        "google_tts"
    }

    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, SpeechError> {
        let chunks = chunk_text(text, Self::MAX_CHUNK_CHARS);
        let total = chunks.len().to_string();
        let mut audio = Vec::new();

        for (idx, chunk) in chunks.iter().enumerate() {
            let idx = idx.to_string();
            let resp = self
                .client
                .get(&self.base_url)
                .header("User-Agent", &self.user_agent)
                .query(&[
                    ("ie", "UTF-8"),
                    ("q", chunk.as_str()),
                    ("tl", voice),
                    ("client", "tw-ob"),
                    ("total", total.as_str()),
                    ("idx", idx.as_str()),
                ])
                .send()
                .await
                .map_err(|e| network_error(e, self.timeout))?;

            let status = resp.status();
            if !status.is_success() {
                let message = resp.text().await.unwrap_or_default();
                return Err(classify_status(status, message));
            }
            let bytes = resp
                .bytes()
                .await
                .map_err(|e| network_error(e, self.timeout))?;
            // MP3 frames concatenate into a playable stream.
            audio.extend_from_slice(&bytes);
        }
        Ok(audio)
    }
}

/// Split text into pieces of at most `max_chars`, preferring sentence ends,
/// then word boundaries.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    let push = |piece: &str, current: &mut String, chunks: &mut Vec<String>| {
        let needed = current.chars().count() + usize::from(!current.is_empty()) + piece.chars().count();
        if needed > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(piece);
    };

    for sentence in split_sentences(text) {
        if sentence.chars().count() <= max_chars {
            push(sentence, &mut current, &mut chunks);
            continue;
        }
        for word in sentence.split_whitespace() {
            let mut word = word;
            while word.chars().count() > max_chars {
                let cut = word
                    .char_indices()
                    .nth(max_chars)
                    .map(|(i, _)| i)
                    .unwrap_or(word.len());
                push(&word[..cut], &mut current, &mut chunks);
                word = &word[cut..];
            }
            if !word.is_empty() {
                push(word, &mut current, &mut chunks);
            }
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn split_sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split_inclusive(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
